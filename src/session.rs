/// Session state and the operations that drive it
use crate::config::{ClientConfig, Endpoints};
use crate::error::{ApiError, Result};
use crate::navigation::Navigator;
use crate::pipeline::Pipeline;
use crate::request::{ApiRequest, ApiResponse};
use crate::storage::TokenStorage;
use crate::token::{TokenGrant, TokenStore};
use crate::transport::{ReqwestTransport, Transport};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Profile of the signed-in user, as returned by the identity endpoint.
///
/// Replaced wholesale on every fetch. Fields this crate does not know about
/// are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub user_name: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Partial profile update; only fields that are set are sent
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Username and password for the password grant
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No token and no user
    Anonymous,
    /// A token is held but no profile has been resolved for it yet
    Restoring,
    /// Profile resolved for the held token
    Authenticated,
}

/// Token plus cached profile, shared by the session manager and the pipeline.
///
/// `is_authenticated` follows the profile alone: holding a token whose
/// profile fetch has not succeeded is not an authenticated session.
///
/// Every `clear` starts a new epoch. A refresh that began in an earlier epoch
/// cannot put its token back into a session that was ended meanwhile.
pub struct SessionState<S: TokenStorage> {
    tokens: TokenStore<S>,
    user: RwLock<Option<Profile>>,
    epoch: Mutex<u64>,
}

impl<S: TokenStorage> SessionState<S> {
    pub fn new(storage: S, storage_key: impl Into<String>) -> Self {
        Self {
            tokens: TokenStore::new(storage, storage_key),
            user: RwLock::new(None),
            epoch: Mutex::new(0),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.tokens.get()
    }

    pub fn set_token(&self, token: Option<String>) {
        self.tokens.set(token);
    }

    pub fn user(&self) -> Option<Profile> {
        self.user.read().clone()
    }

    pub fn set_user(&self, user: Option<Profile>) {
        *self.user.write() = user;
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.read().is_some()
    }

    pub fn status(&self) -> SessionStatus {
        if self.is_authenticated() {
            SessionStatus::Authenticated
        } else if self.tokens.is_present() {
            SessionStatus::Restoring
        } else {
            SessionStatus::Anonymous
        }
    }

    /// Drop user and token. Idempotent; returns whether anything was held.
    pub fn clear(&self) -> bool {
        let mut epoch = self.epoch.lock();
        *epoch += 1;
        let had_user = self.user.write().take().is_some();
        let had_token = self.tokens.is_present();
        self.tokens.clear();
        had_user || had_token
    }

    /// Current session epoch, advanced by every `clear`
    pub fn epoch(&self) -> u64 {
        *self.epoch.lock()
    }

    /// Store `token` only if the session has not been cleared since `epoch`.
    ///
    /// Returns false, leaving the session untouched, when it has.
    pub fn set_token_in_epoch(&self, epoch: u64, token: String) -> bool {
        let current = self.epoch.lock();
        if *current != epoch {
            return false;
        }
        self.tokens.set(Some(token));
        true
    }

    pub fn token_store(&self) -> &TokenStore<S> {
        &self.tokens
    }
}

/// Login, logout, profile and password operations over the request pipeline
pub struct SessionManager<T: Transport, S: TokenStorage> {
    pipeline: Pipeline<T, S>,
    session: Arc<SessionState<S>>,
    endpoints: Endpoints,
}

impl<S: TokenStorage> SessionManager<ReqwestTransport, S> {
    /// Create a session manager talking HTTP to `config.base_url`
    pub fn connect(config: &ClientConfig, storage: S) -> Result<Self> {
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::new(transport, storage, config))
    }
}

impl<T: Transport, S: TokenStorage> SessionManager<T, S> {
    /// Create a session manager. Any token already in `storage` is restored
    /// into memory; call [`SessionManager::initialize`] to resolve its profile.
    pub fn new(transport: T, storage: S, config: &ClientConfig) -> Self {
        let session = Arc::new(SessionState::new(storage, config.storage_key.clone()));
        let pipeline = Pipeline::new(transport, session.clone(), config);

        Self {
            pipeline,
            session,
            endpoints: config.endpoints.clone(),
        }
    }

    /// Set the navigator used for the hard redirect on an unrecoverable session
    pub fn with_navigator(mut self, navigator: impl Navigator + 'static) -> Self {
        self.pipeline = self.pipeline.with_navigator(navigator);
        self
    }

    /// Pipeline for the application's own API calls
    pub fn pipeline(&self) -> &Pipeline<T, S> {
        &self.pipeline
    }

    pub fn session(&self) -> &Arc<SessionState<S>> {
        &self.session
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn user(&self) -> Option<Profile> {
        self.session.user()
    }

    pub fn token(&self) -> Option<String> {
        self.session.token()
    }

    /// Exchange credentials for a token, then load the profile.
    ///
    /// Any failure clears the whole session before it is returned, so a
    /// token is never left behind without a successful profile fetch.
    pub async fn login(&self, credentials: &Credentials) -> Result<Profile> {
        match self.try_login(credentials).await {
            Ok(profile) => {
                tracing::info!(user = %profile.user_name, "Logged in");
                Ok(profile)
            }
            Err(e) => {
                tracing::error!(user = %credentials.username, error = %e, "Login failed");
                self.session.clear();
                Err(e)
            }
        }
    }

    async fn try_login(&self, credentials: &Credentials) -> Result<Profile> {
        let request = ApiRequest::post(self.endpoints.token.clone()).form([
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
            ("grant_type", "password"),
        ]);

        let grant: TokenGrant = self.pipeline.send(request).await?.json()?;
        self.session.set_token(Some(grant.into_access_token()?));

        self.fetch_profile()
            .await?
            .ok_or_else(|| ApiError::InvalidResponse("no profile for issued token".into()))
    }

    /// Clear user and token. No network call; calling it again is a no-op.
    pub fn logout(&self) {
        if self.session.clear() {
            tracing::info!("Logged out");
        }
    }

    /// Load the profile for the held token.
    ///
    /// Returns `Ok(None)` without a network call when no token is held. On
    /// failure the session is cleared and the error returned.
    pub async fn fetch_profile(&self) -> Result<Option<Profile>> {
        if self.session.token().is_none() {
            return Ok(None);
        }

        let fetched = async {
            let response = self
                .pipeline
                .send(ApiRequest::get(self.endpoints.profile.clone()))
                .await?;
            response.json::<Profile>()
        }
        .await;

        match fetched {
            Ok(profile) => {
                self.session.set_user(Some(profile.clone()));
                Ok(Some(profile))
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch profile");
                self.session.clear();
                Err(e)
            }
        }
    }

    /// Change the signed-in user's password.
    ///
    /// Returns the server's acknowledgement. Failures are reported as
    /// [`ApiError::Rejected`] with a human-readable message.
    pub async fn change_password(&self, current_password: &str, new_password: &str) -> Result<Value> {
        let result = async {
            let request = ApiRequest::post(self.endpoints.change_password.clone()).json(
                &serde_json::json!({
                    "current_password": current_password,
                    "new_password": new_password,
                }),
            )?;
            json_or_null(&self.pipeline.send(request).await?)
        }
        .await;

        result.map_err(|e| ApiError::Rejected(e.describe("Failed to change password")))
    }

    /// Apply a partial profile update and cache the server's representation
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile> {
        let result = async {
            let request = ApiRequest::patch(self.endpoints.profile.clone()).json(update)?;
            self.pipeline.send(request).await?.json::<Profile>()
        }
        .await;

        match result {
            Ok(profile) => {
                self.session.set_user(Some(profile.clone()));
                Ok(profile)
            }
            Err(e) => Err(ApiError::Rejected(e.describe("Failed to update profile"))),
        }
    }

    /// Restore the session at startup.
    ///
    /// Resolves the profile for a token restored from storage. Failure is
    /// logged and swallowed: startup is never blocked by a stale token, and
    /// the session simply stays anonymous.
    pub async fn initialize(&self) {
        if self.session.token().is_none() {
            return;
        }

        tracing::debug!("Restoring session from stored token");
        if let Err(e) = self.fetch_profile().await {
            tracing::warn!(error = %e, "Failed to restore session");
        }
    }
}

fn json_or_null(response: &ApiResponse) -> Result<Value> {
    if response.body.is_empty() {
        return Ok(Value::Null);
    }
    response.json()
}
