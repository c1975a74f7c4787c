pub mod adapter;
pub mod connection;
pub mod destination;
pub mod error;
pub mod metadata;
pub mod source;
