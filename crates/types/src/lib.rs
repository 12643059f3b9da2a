//! Core types and traits for the chatvault workspace.
//!
//! This crate defines the shared abstractions used across all layers of the
//! credential lifecycle: error types, workspace identifiers, the credential
//! record and its expiry rules, and the async traits that each backend
//! implements.

pub mod credential;
pub mod error;
pub mod traits;
pub mod workspace;

pub use credential::{CredentialRecord, CredentialStatus, now_secs};
pub use error::VaultError;
pub use traits::{Cache, CredentialStore, RefreshRequest, TokenGrant, TokenRefresher};
pub use workspace::WorkspaceId;
