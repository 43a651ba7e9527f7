// netlab-api: Async Rust client for the netlab lab orchestration backend

pub mod catalog;
pub mod client;
pub mod error;
pub mod jobs;
pub mod labs;
pub mod models;
pub mod nodes;
pub mod system;
pub mod transport;

pub use client::LabClient;
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};
