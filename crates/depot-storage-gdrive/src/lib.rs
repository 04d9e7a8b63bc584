//! Google Drive storage backend.
//!
//! Records and files are carried as Drive files inside per-namespace
//! folders, addressed through `appProperties` rather than Drive file ids,
//! so the `(namespace, uuid)` contract survives Drive's own id scheme.
//! OAuth2 access tokens are resolved through a caching [`TokenManager`];
//! once the refresh token is rejected the adapter drops out of the ready
//! state and fails fast without touching the network.

mod api;
mod client;
mod token;

pub use api::{DriveApi, DriveFile, FileList};
pub use client::{DriveConfig, DriveStore};
pub use token::TokenManager;
