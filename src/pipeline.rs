//! Authenticated request pipeline
//!
//! Every request passes two hooks: credentials are attached before it is
//! sent, and an unauthorized response is recovered by refreshing the token
//! once and replaying the request. Concurrent 401s share a single refresh
//! through [`RefreshFlight`].

use crate::config::{ClientConfig, Endpoints};
use crate::error::{ApiError, Result};
use crate::flight::{RefreshFlight, Ticket};
use crate::navigation::{Navigator, NoopNavigator};
use crate::request::{ApiRequest, ApiResponse};
use crate::session::SessionState;
use crate::storage::TokenStorage;
use crate::token::TokenGrant;
use crate::transport::Transport;
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub struct Pipeline<T: Transport, S: TokenStorage> {
    transport: T,
    session: Arc<SessionState<S>>,
    endpoints: Endpoints,
    landing_location: String,
    navigator: Arc<dyn Navigator>,
    flight: Arc<RefreshFlight>,
}

impl<T: Transport, S: TokenStorage> Pipeline<T, S> {
    /// Create a pipeline with its own refresh flight
    pub fn new(transport: T, session: Arc<SessionState<S>>, config: &ClientConfig) -> Self {
        Self {
            transport,
            session,
            endpoints: config.endpoints.clone(),
            landing_location: config.landing_location.clone(),
            navigator: Arc::new(NoopNavigator),
            flight: Arc::new(RefreshFlight::new()),
        }
    }

    pub fn with_navigator(mut self, navigator: impl Navigator + 'static) -> Self {
        self.navigator = Arc::new(navigator);
        self
    }

    pub fn session(&self) -> &Arc<SessionState<S>> {
        &self.session
    }

    pub fn is_refreshing(&self) -> bool {
        self.flight.is_refreshing()
    }

    /// Requests currently waiting on the in-flight refresh
    pub fn pending(&self) -> usize {
        self.flight.pending()
    }

    /// Attach `Bearer <token>` unless the request already carries an
    /// Authorization header. Never blocks, never fails.
    pub fn attach_credentials(&self, request: &mut ApiRequest) {
        if request.has_authorization() {
            return;
        }
        if let Some(token) = self.session.token() {
            if !request.set_bearer(&token) {
                tracing::warn!(path = %request.path, "Token is not a valid header value, sending unauthenticated");
            }
        }
    }

    /// Send a request through both hooks.
    ///
    /// A 401 from an ordinary endpoint is recovered by a refresh and one
    /// replay. Everything else reaches the caller exactly as received.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        match self.dispatch(&request).await {
            Err(error) if self.is_recoverable(&request, &error) => {
                self.recover(request, error).await
            }
            result => result,
        }
    }

    /// Send a request and decode its JSON body
    pub async fn send_json<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R> {
        self.send(request).await?.json()
    }

    fn is_recoverable(&self, request: &ApiRequest, error: &ApiError) -> bool {
        error.is_unauthorized()
            && !request.retried
            && !self.endpoints.is_token_endpoint(&request.path)
    }

    /// Attach credentials, send, and turn a non-2xx status into an error
    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut outgoing = request.clone();
        self.attach_credentials(&mut outgoing);

        let response = self.transport.send(outgoing).await?;
        if response.is_success() {
            return Ok(response);
        }

        Err(ApiError::from_status(
            response.status,
            &response.body,
            self.endpoints.is_refresh_endpoint(&request.path),
        ))
    }

    async fn recover(&self, mut request: ApiRequest, error: ApiError) -> Result<ApiResponse> {
        request.retried = true;

        // Check-and-set of the flight happens here, before any await
        match self.flight.join() {
            Ticket::Leader(leader) => {
                tracing::info!(path = %request.path, "Access token rejected, refreshing");
                let epoch = self.session.epoch();

                match self.refresh().await {
                    Ok(token) => {
                        if !self.session.set_token_in_epoch(epoch, token.clone()) {
                            let rejected = leader.settle(None);
                            tracing::info!(
                                rejected = rejected + 1,
                                "Session ended during token refresh, discarding new token"
                            );
                            return Err(error);
                        }
                        let released = leader.settle(Some(token.clone()));
                        tracing::info!(replaying = released + 1, "Access token refreshed");
                        self.replay(request, &token).await
                    }
                    Err(refresh_error) => {
                        self.session.clear();
                        let rejected = leader.settle(None);

                        if matches!(refresh_error, ApiError::SessionExpired) {
                            tracing::error!(rejected = rejected + 1, "Refresh rejected, session expired");
                            self.navigator.hard_redirect(&self.landing_location);
                        } else {
                            tracing::error!(
                                rejected = rejected + 1,
                                error = %refresh_error,
                                "Token refresh failed, session cleared"
                            );
                        }
                        Err(refresh_error)
                    }
                }
            }
            Ticket::Follower(outcome) => match outcome.await {
                Ok(Some(token)) => self.replay(request, &token).await,
                // Refresh failed or was abandoned
                _ => Err(error),
            },
        }
    }

    async fn refresh(&self) -> Result<String> {
        let request = ApiRequest::post(self.endpoints.refresh.clone());
        let grant: TokenGrant = self.dispatch(&request).await?.json()?;
        grant.into_access_token()
    }

    async fn replay(&self, mut request: ApiRequest, token: &str) -> Result<ApiResponse> {
        if !request.set_bearer(token) {
            tracing::warn!(path = %request.path, "Refreshed token is not a valid header value");
        }
        tracing::debug!(method = %request.method, path = %request.path, "Replaying request");
        self.dispatch(&request).await
    }
}
