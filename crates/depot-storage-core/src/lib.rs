//! Core traits and types for depot storage backends.
//!
//! This crate defines the abstractions shared between the local, AWS, and
//! Google Drive storage implementations:
//! - `RecordStore`: CRUD + listing over structured records, scoped by namespace
//! - `FileStore`: binary object lifecycle (upload, head, delete)
//! - `StorageClient`: the full capability set a backend adapter must provide
//! - `StorageError`: the shared error taxonomy adapters normalize into

mod error;
mod file;
mod namespace;
mod record;
mod store;

pub use error::StorageError;
pub use file::{FileMetadata, FileStorage};
pub use namespace::Namespace;
pub use record::Record;
pub use store::{FileStore, RecordStore, StorageClient};
