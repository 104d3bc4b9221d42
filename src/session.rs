//! Persisted login state and the sign-in/sign-up flow.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chatcore::events::{CoreEventBus, Event, LogoutReason};
use chatcore::net::{AUTHORIZATION, HttpClient, HttpRequest};
use chatcore::store::{AUTH_HEADER_KEY, SessionStore, StoreError, USER_KEY};
use chatcore::types::User;
use log::{info, warn};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq)]
struct SessionState {
    auth_header: Option<String>,
    user: Option<User>,
}

/// Owns the auth header and the current user, mirrored in a [`SessionStore`].
///
/// Reads are synchronous so request interceptors and route guards can consult
/// the session without awaiting storage.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    state: RwLock<SessionState>,
    event_bus: CoreEventBus,
}

impl SessionManager {
    /// Loads whatever session the store holds. A corrupt user record is
    /// treated as no user.
    pub async fn load(
        store: Arc<dyn SessionStore>,
        event_bus: CoreEventBus,
    ) -> Result<Self, StoreError> {
        let auth_header = store.get_item(AUTH_HEADER_KEY).await?;
        let user = match store.get_item(USER_KEY).await? {
            Some(raw) => match serde_json::from_str::<User>(&raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!("Ignoring unreadable stored user: {e}");
                    None
                }
            },
            None => None,
        };

        if let Some(user) = &user {
            info!("Restored session for user {}", user.id);
        }

        Ok(Self {
            store,
            state: RwLock::new(SessionState { auth_header, user }),
            event_bus,
        })
    }

    pub fn auth_header(&self) -> Option<String> {
        self.read_state().auth_header.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.read_state().user.clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.read_state().user.as_ref().map(|u| u.id.clone())
    }

    /// A stored auth header is what grants access to guarded routes.
    pub fn is_logged_in(&self) -> bool {
        self.read_state().auth_header.is_some()
    }

    pub fn event_bus(&self) -> &CoreEventBus {
        &self.event_bus
    }

    pub async fn store(&self, auth_header: String, user: User) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(&user)?;
        // The header is what marks a stored session as logged in, so it is
        // written last and never lands without its user.
        self.store.set_item(USER_KEY, &serialized).await?;
        if let Err(e) = self.store.set_item(AUTH_HEADER_KEY, &auth_header).await {
            if let Err(cleanup) = self.store.remove_item(USER_KEY).await {
                warn!("Failed to roll back stored user: {cleanup}");
            }
            return Err(e);
        }

        *self.write_state() = SessionState {
            auth_header: Some(auth_header),
            user: Some(user.clone()),
        };
        self.event_bus.dispatch(&Event::LoggedIn(user));
        Ok(())
    }

    /// Forgets the session. Memory is cleared before storage so nothing can
    /// pick up the old credential while the store is being updated.
    pub async fn logout(&self, reason: LogoutReason) -> Result<(), StoreError> {
        let was_logged_in = {
            let mut state = self.write_state();
            let was = state.auth_header.is_some();
            *state = SessionState::default();
            was
        };

        self.store.remove_item(AUTH_HEADER_KEY).await?;
        self.store.remove_item(USER_KEY).await?;

        if was_logged_in {
            info!("Logged out ({reason:?})");
            self.event_bus.dispatch(&Event::LoggedOut { reason });
        }
        Ok(())
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.state.read().expect("RwLock should not be poisoned")
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.state.write().expect("RwLock should not be poisoned")
    }
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] anyhow::Error),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid user record in response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Session storage error: {0}")]
    Store(#[from] StoreError),
}

/// Sign-up form contents.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUp {
    pub name: String,
    pub username: String,
    pub password: String,
    pub password_confirmation: String,
}

pub fn basic_auth_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// Talks to the `/signin` and `/signup` endpoints and records the outcome in
/// the [`SessionManager`].
pub struct LoginService {
    http: Arc<dyn HttpClient>,
    auth_url: String,
    session: Arc<SessionManager>,
}

impl LoginService {
    pub fn new(
        http: Arc<dyn HttpClient>,
        auth_url: impl Into<String>,
        session: Arc<SessionManager>,
    ) -> Self {
        Self {
            http,
            auth_url: auth_url.into().trim_end_matches('/').to_string(),
            session,
        }
    }

    pub async fn sign_in(&self, username: &str, password: &str) -> Result<User, LoginError> {
        if username.is_empty() {
            return Err(LoginError::MissingField("username"));
        }
        if password.is_empty() {
            return Err(LoginError::MissingField("password"));
        }

        let auth_header = basic_auth_header(username, password);
        let request = HttpRequest::post(format!("{}/signin", self.auth_url))
            .with_header(AUTHORIZATION, auth_header.clone());
        let user = self.send_for_user(request).await?;

        self.session.store(auth_header, user.clone()).await?;
        info!("Signed in as {}", user.id);
        Ok(user)
    }

    pub async fn sign_up(&self, form: &SignUp) -> Result<User, LoginError> {
        if form.username.is_empty() {
            return Err(LoginError::MissingField("username"));
        }
        if form.password.is_empty() {
            return Err(LoginError::MissingField("password"));
        }
        if form.password != form.password_confirmation {
            return Err(LoginError::PasswordMismatch);
        }

        let request = HttpRequest::post(format!("{}/signup", self.auth_url)).with_json_body(form)?;
        let user = self.send_for_user(request).await?;

        let auth_header = basic_auth_header(&form.username, &form.password);
        self.session.store(auth_header, user.clone()).await?;
        info!("Signed up as {}", user.id);
        Ok(user)
    }

    pub async fn logout(&self) -> Result<(), LoginError> {
        self.session.logout(LogoutReason::UserInitiated).await?;
        Ok(())
    }

    async fn send_for_user(&self, request: HttpRequest) -> Result<User, LoginError> {
        let response = self.http.execute(request).await?;
        match response.status_code {
            401 | 403 => Err(LoginError::InvalidCredentials),
            _ if response.is_success() => Ok(serde_json::from_slice(&response.body)?),
            status => Err(LoginError::Status {
                status,
                body: response.body_string(),
            }),
        }
    }
}
