/// In-process authorization server for unit tests
use crate::error::{ApiError, Result};
use crate::request::{ApiRequest, ApiResponse, RequestBody};
use crate::session::Profile;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// How the fake answers `/oauth/refresh`
#[derive(Debug, Clone)]
pub enum RefreshReply {
    /// 200 with this token, which protected endpoints then accept
    Grant(String),
    /// 200 with this token, which protected endpoints keep rejecting
    GrantRejected(String),
    /// 200 without an access token
    Malformed,
    Unauthorized,
    /// No response at all
    Unavailable,
}

/// A request as the fake received it
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub body: RequestBody,
}

impl Recorded {
    pub fn form_value(&self, name: &str) -> Option<String> {
        match &self.body {
            RequestBody::Form(fields) => fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    pub fn json_body(&self) -> Option<Value> {
        match &self.body {
            RequestBody::Json(value) => Some(value.clone()),
            _ => None,
        }
    }
}

struct FakeState {
    valid_tokens: HashSet<String>,
    password: String,
    profile: Value,
    refresh_reply: RefreshReply,
    profile_failure: Option<u16>,
    offline: bool,
    hold_refresh: bool,
    log: Vec<Recorded>,
}

/// Routes:
/// - `POST /oauth/token`: user `ada`, password `correct-horse`, issues `login-token`
/// - `POST /oauth/refresh`: answers per [`RefreshReply`]
/// - `GET|PATCH /oauth/me`, `POST /oauth/me/change-password`
/// - `GET /status/404`: a plain 404
/// - anything else: a protected resource echoing its path
pub struct FakeServer {
    state: Mutex<FakeState>,
    refresh_calls: AtomicUsize,
    refresh_gate: Notify,
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeServer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                valid_tokens: HashSet::from(["login-token".to_string()]),
                password: "correct-horse".to_string(),
                profile: serde_json::to_value(Self::profile()).unwrap(),
                refresh_reply: RefreshReply::Grant("fresh-token".to_string()),
                profile_failure: None,
                offline: false,
                hold_refresh: false,
                log: Vec::new(),
            }),
            refresh_calls: AtomicUsize::new(0),
            refresh_gate: Notify::new(),
        }
    }

    pub fn profile() -> Profile {
        serde_json::from_value(json!({
            "id": 1,
            "user_name": "ada",
            "first_name": "Ada",
            "last_name": "Lovelace",
            "email": "ada@example.com",
            "created_at": "2025-01-01T00:00:00",
            "updated_at": null
        }))
        .unwrap()
    }

    pub fn set_refresh_reply(&self, reply: RefreshReply) {
        self.state.lock().refresh_reply = reply;
    }

    pub fn fail_profile_with(&self, status: u16) {
        self.state.lock().profile_failure = Some(status);
    }

    /// Every following request fails without a response
    pub fn go_offline(&self) {
        self.state.lock().offline = true;
    }

    /// Park refresh calls until [`FakeServer::open_refresh_gate`]
    pub fn hold_refresh(&self) {
        self.state.lock().hold_refresh = true;
    }

    pub fn open_refresh_gate(&self) {
        self.refresh_gate.notify_one();
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().log.clone()
    }

    fn bearer_is_valid(&self, recorded: &Recorded) -> bool {
        let state = self.state.lock();
        recorded
            .authorization
            .as_deref()
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| state.valid_tokens.contains(token))
    }

    fn refresh(&self) -> ApiResponse {
        let reply = self.state.lock().refresh_reply.clone();
        match reply {
            RefreshReply::Grant(token) => {
                self.state.lock().valid_tokens.insert(token.clone());
                reply_json(200, json!({"access_token": token, "token_type": "bearer"}))
            }
            RefreshReply::GrantRejected(token) => {
                reply_json(200, json!({"access_token": token, "token_type": "bearer"}))
            }
            RefreshReply::Malformed => reply_json(200, json!({"token_type": "bearer"})),
            RefreshReply::Unauthorized => unauthorized(),
            // Handled before routing
            RefreshReply::Unavailable => unreachable!(),
        }
    }

    fn route(&self, recorded: &Recorded) -> ApiResponse {
        match (recorded.method.as_str(), recorded.path.as_str()) {
            ("POST", "/oauth/token") => {
                let state = self.state.lock();
                let valid = recorded.form_value("username").as_deref() == Some("ada")
                    && recorded.form_value("password").as_deref() == Some(state.password.as_str())
                    && recorded.form_value("grant_type").as_deref() == Some("password");
                if valid {
                    reply_json(200, json!({"access_token": "login-token", "token_type": "bearer"}))
                } else {
                    reply_json(401, json!({"detail": "Incorrect username or password"}))
                }
            }
            _ if !self.bearer_is_valid(recorded) => unauthorized(),
            ("GET", "/oauth/me") => {
                let state = self.state.lock();
                match state.profile_failure {
                    Some(status) => reply_json(status, json!({"detail": "Profile unavailable"})),
                    None => reply_json(200, state.profile.clone()),
                }
            }
            ("PATCH", "/oauth/me") => {
                let patch = recorded.json_body().unwrap_or(Value::Null);
                if patch["email"] == "taken@example.com" {
                    return reply_json(400, json!({"detail": "Email already registered"}));
                }
                let mut state = self.state.lock();
                if let (Some(profile), Some(patch)) = (state.profile.as_object_mut(), patch.as_object()) {
                    for (k, v) in patch {
                        profile.insert(k.clone(), v.clone());
                    }
                }
                reply_json(200, state.profile.clone())
            }
            ("POST", "/oauth/me/change-password") => {
                let body = recorded.json_body().unwrap_or(Value::Null);
                let mut state = self.state.lock();
                if body["current_password"] != state.password.as_str() {
                    return reply_json(400, json!({"detail": "Current password is incorrect"}));
                }
                if let Some(new_password) = body["new_password"].as_str() {
                    state.password = new_password.to_string();
                }
                reply_json(200, json!({"msg": "Password updated successfully"}))
            }
            (_, "/status/404") => reply_json(404, json!({"detail": "Not found"})),
            (_, path) => reply_json(200, json!({"path": path})),
        }
    }
}

#[async_trait]
impl crate::transport::Transport for FakeServer {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let recorded = Recorded {
            method: request.method.to_string(),
            path: request.path.clone(),
            authorization: request.authorization().map(str::to_string),
            body: request.body.clone(),
        };

        let (offline, hold, refresh_unavailable) = {
            let mut state = self.state.lock();
            state.log.push(recorded.clone());
            (
                state.offline,
                state.hold_refresh,
                matches!(state.refresh_reply, RefreshReply::Unavailable),
            )
        };

        if offline {
            return Err(ApiError::Transport("connection refused".to_string()));
        }

        if recorded.path == "/oauth/refresh" {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if hold {
                self.refresh_gate.notified().await;
            }
            if refresh_unavailable {
                return Err(ApiError::Transport("operation timed out".to_string()));
            }
            return Ok(self.refresh());
        }

        Ok(self.route(&recorded))
    }
}

fn reply_json(status: u16, body: Value) -> ApiResponse {
    ApiResponse::new(status, body.to_string())
}

fn unauthorized() -> ApiResponse {
    reply_json(401, json!({"detail": "Could not validate credentials"}))
}
