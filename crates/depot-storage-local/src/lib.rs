//! Local filesystem storage backend.
//!
//! Records and files live under a root directory, one subtree per
//! namespace. The offline analogue of the cloud backends: same contract,
//! no credentials, no network.

mod store;

pub use store::LocalStore;
