pub mod env;
pub mod error;
pub mod migration;
pub mod settings;
