pub mod rejects;
