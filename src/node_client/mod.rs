pub mod client;
pub mod error;
pub mod types;

pub use client::{Client, NodeRpc};
pub use error::Error;
