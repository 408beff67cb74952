mod client;
mod models;

pub use client::{sha256_file, ApiError, ReleaseClient, Result};
pub use models::{platform_asset, ReleaseConfig, UpdateStatus};
