//! Riegel - Client-side session layer for token-authenticated HTTP APIs
//!
//! This library holds an access token, attaches it to outgoing requests, and
//! recovers from token expiry by performing a single coordinated refresh
//! while requests that hit a 401 in the meantime wait for its outcome.
//!
//! # Features
//!
//! - Password-grant login, logout, profile and password operations
//! - Bearer credentials attached to every request
//! - Single-flight token refresh with ordered replay of blocked requests
//! - Pluggable durable storage for the token (memory, file, OS keychain)
//! - Hard redirect hook for sessions that cannot be recovered
//!
//! # Example
//!
//! ```no_run
//! use riegel::prelude::*;
//!
//! # async fn run() -> Result<(), ApiError> {
//! let config = ClientConfig::new("http://localhost:8000/api/v1");
//! let session = SessionManager::connect(&config, MemoryStorage::new())?
//!     .with_navigator(|location: &str| println!("navigate to {}", location));
//!
//! session.initialize().await;
//! if !session.is_authenticated() {
//!     session.login(&Credentials::new("ada", "correct-horse")).await?;
//! }
//!
//! let objectives: serde_json::Value = session
//!     .pipeline()
//!     .send_json(ApiRequest::get("/objectives"))
//!     .await?;
//! println!("{}", objectives);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod flight;
pub mod navigation;
pub mod pipeline;
pub mod request;
pub mod session;
pub mod storage;
pub mod token;
pub mod transport;

#[cfg(test)]
mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{ClientConfig, Endpoints};
    pub use crate::error::ApiError;
    pub use crate::navigation::{guard_route, Navigator, NoopNavigator, RouteDecision};
    pub use crate::pipeline::Pipeline;
    pub use crate::request::{ApiRequest, ApiResponse, Method, RequestBody};
    pub use crate::session::{
        Credentials, Profile, ProfileUpdate, SessionManager, SessionState, SessionStatus,
    };
    pub use crate::storage::{FileStorage, MemoryStorage, SecureStorage, TokenStorage};
    pub use crate::token::TokenStore;
    pub use crate::transport::{ReqwestTransport, Transport};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use crate::testing::FakeServer;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_full_session_flow() {
        let server = Arc::new(FakeServer::new());
        let storage = MemoryStorage::new();
        let session = SessionManager::new(server.clone(), storage.clone(), &ClientConfig::default());

        assert_eq!(
            guard_route("/dashboard", session.is_authenticated(), "/"),
            RouteDecision::Redirect {
                location: "/?authRequired=1".to_string()
            }
        );

        session
            .login(&Credentials::new("ada", "correct-horse"))
            .await
            .unwrap();
        assert_eq!(
            guard_route("/dashboard", session.is_authenticated(), "/"),
            RouteDecision::Allow
        );

        // A fresh manager over the same storage picks the session back up
        let restored = SessionManager::new(server.clone(), storage.clone(), &ClientConfig::default());
        assert_eq!(restored.status(), SessionStatus::Restoring);
        restored.initialize().await;
        assert_eq!(restored.status(), SessionStatus::Authenticated);

        restored.logout();
        assert!(storage.get("token").unwrap().is_none());
    }
}
