//! I/O operations: S3 client construction and archive downloads.

mod fetch;
mod store;

pub use fetch::ArchiveFetcher;
pub use store::create_archive_store;
