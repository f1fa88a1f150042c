mod client;
mod types;

pub use client::GoCdClient;
pub use types::BuildStatus;
