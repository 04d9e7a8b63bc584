//! Backend selection for depot storage.
//!
//! Selection is an explicit factory keyed by configuration: callers build a
//! [`BackendConfig`], call [`connect`], and hold the resulting
//! `Arc<dyn StorageClient>` without ever inspecting the concrete backend.
//!
//! The [`Readiness`] flag lives here, in the calling layer, on purpose: the
//! storage core neither sets nor reads it. Navigation/UI code watches it to
//! decide whether to send users to backend selection.

mod factory;
mod ready;

pub use factory::{connect, BackendConfig};
pub use ready::{Readiness, ReadinessWatch};
