//! Bot credential lifecycle for installed chat workspaces.
//!
//! The [`TokenManager`] serves valid access tokens, refreshing rotating
//! credentials ahead of expiry. [`refresh`] talks to the authorization
//! server's token endpoint and [`install`] completes new installations.

pub mod install;
pub mod manager;
pub mod marker;
pub mod refresh;

pub use manager::{ManagerSettings, TokenManager};
pub use marker::DebounceMarker;
pub use refresh::HttpRefresher;
