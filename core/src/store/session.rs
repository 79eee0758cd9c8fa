//! Session/auth state: who is logged in and with which token.
//!
//! # Design
//! The store is the only writer of the session and of the shared
//! [`TokenHandle`](crate::api::TokenHandle) the API attaches to requests. A
//! session is either complete (user and token) or empty; the store never
//! holds one half without the other, so `is_authenticated` cannot disagree
//! with the data. Persisted state is `{ user, token }` under
//! [`SESSION_KEY`]; the authenticated flag is always recomputed on load.
//!
//! State lives in a `tokio::sync::watch` channel so views can subscribe to
//! changes. It is never locked across an `.await`.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::Api;
use crate::error::{ApiError, StorageError};
use crate::storage::{load_json, save_json, Storage};
use crate::types::{AuthResponse, LoginInput, RegisterInput, User};

pub const SESSION_KEY: &str = "auth-storage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Anonymous,
    Authenticating,
    Authenticated,
}

/// Snapshot of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    user: Option<User>,
    token: Option<String>,
    loading: bool,
}

impl Session {
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.token.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_admin(&self) -> bool {
        self.is_authenticated() && self.user.as_ref().is_some_and(User::is_admin)
    }

    pub fn status(&self) -> AuthStatus {
        if self.loading {
            AuthStatus::Authenticating
        } else if self.is_authenticated() {
            AuthStatus::Authenticated
        } else {
            AuthStatus::Anonymous
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedSession {
    #[serde(default)]
    user: Option<User>,
    #[serde(default)]
    token: Option<String>,
}

/// Clears `loading` when an authentication attempt ends, including when the
/// caller drops it midway.
struct LoadingGuard<'a>(&'a watch::Sender<Session>);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_if_modified(|s| std::mem::replace(&mut s.loading, false));
    }
}

pub struct SessionStore {
    api: Api,
    storage: Arc<dyn Storage>,
    state: watch::Sender<Session>,
}

impl SessionStore {
    /// Rehydrate from `storage`. A blob missing either half, or one that does
    /// not parse, is dropped and the store starts anonymous.
    pub fn restore(api: Api, storage: Arc<dyn Storage>) -> Self {
        let persisted = match load_json::<PersistedSession>(storage.as_ref(), SESSION_KEY) {
            Ok(persisted) => persisted.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "cannot read persisted session; starting anonymous");
                PersistedSession::default()
            }
        };

        let session = match persisted {
            PersistedSession {
                user: Some(user),
                token: Some(token),
            } => Session {
                user: Some(user),
                token: Some(token),
                loading: false,
            },
            PersistedSession { user: None, token: None } => Session::default(),
            _ => {
                warn!("persisted session is incomplete; discarding it");
                if let Err(e) = storage.remove(SESSION_KEY) {
                    warn!(error = %e, "cannot remove incomplete session");
                }
                Session::default()
            }
        };

        api.token().set(session.token.clone());
        debug!(authenticated = session.is_authenticated(), "session restored");
        let (state, _) = watch::channel(session);
        Self { api, storage, state }
    }

    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let input = LoginInput {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.authenticate(self.api.login(&input)).await
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let input = RegisterInput {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.authenticate(self.api.register(&input)).await
    }

    /// Drop the session, the request token and the persisted blob. Purely
    /// local; the in-memory state is cleared even if storage fails.
    pub fn logout(&self) -> Result<(), StorageError> {
        self.state.send_replace(Session::default());
        self.api.token().clear();
        info!("logged out");
        self.storage.remove(SESSION_KEY)
    }

    async fn authenticate<Fut>(&self, request: Fut) -> Result<User, ApiError>
    where
        Fut: Future<Output = Result<AuthResponse, ApiError>>,
    {
        self.state.send_modify(|s| s.loading = true);
        let _loading = LoadingGuard(&self.state);

        let response = request.await.inspect_err(|e| debug!(error = %e, "authentication rejected"))?;

        // The shared token only changes together with the published session.
        let user = match self.api.with_token(&response.token).profile().await {
            Ok(profile) => profile,
            Err(e) => {
                debug!(error = %e, "profile fetch failed; using user from auth response");
                response.user
            }
        };

        let session = Session {
            user: Some(user.clone()),
            token: Some(response.token),
            loading: false,
        };
        self.persist(&session);
        self.api.token().set(session.token.clone());
        self.state.send_replace(session);
        info!(user_id = %user.id, "authenticated");
        Ok(user)
    }

    fn persist(&self, session: &Session) {
        let blob = PersistedSession {
            user: session.user.clone(),
            token: session.token.clone(),
        };
        if let Err(e) = save_json(self.storage.as_ref(), SESSION_KEY, &blob) {
            warn!(error = %e, "cannot persist session");
        }
    }
}
