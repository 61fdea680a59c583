//! Concurrent model-file download manager (§4.6).

pub mod manager;

pub use manager::DownloadManager;
