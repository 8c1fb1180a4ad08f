//! Per-request session context and the auth-driven navigation state machine.

use crate::error::IdentityError;
use crate::identity::IdentityProvider;
use crate::models::Principal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Snapshot of who is making a request, resolved once and passed down explicitly
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    principal: Option<Principal>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { principal: None }
    }

    pub fn authenticated(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn state(&self) -> AuthState {
        if self.principal.is_some() {
            AuthState::Authenticated
        } else {
            AuthState::Anonymous
        }
    }
}

/// Authentication state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthState {
    Anonymous,
    Authenticated,
}

/// Top-level views a client can land on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Root,
    Auth,
    Dashboard,
    Upload,
    Gallery,
}

impl View {
    pub fn path(&self) -> &'static str {
        match self {
            View::Root => "/",
            View::Auth => "/auth",
            View::Dashboard => "/dashboard",
            View::Upload => "/upload",
            View::Gallery => "/gallery",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        match path.trim_end_matches('/') {
            "" => Some(View::Root),
            "/auth" => Some(View::Auth),
            "/dashboard" => Some(View::Dashboard),
            "/upload" => Some(View::Upload),
            "/gallery" => Some(View::Gallery),
            _ => None,
        }
    }
}

/// Decides where to navigate when the auth state is first known or changes.
///
/// Rendering of navigation chrome is not its concern; it only emits targets.
#[derive(Debug, Clone)]
pub struct AuthNavigator {
    state: AuthState,
}

impl Default for AuthNavigator {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthNavigator {
    pub fn new() -> Self {
        Self {
            state: AuthState::Anonymous,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// First resolution of the session. Only the root view redirects.
    pub fn initial(&mut self, current: View, principal: Option<&Principal>) -> Option<View> {
        self.state = state_of(principal);
        if current != View::Root {
            return None;
        }
        match self.state {
            AuthState::Authenticated => Some(View::Dashboard),
            AuthState::Anonymous => Some(View::Auth),
        }
    }

    /// Every later auth transition. Losing the principal always lands on the auth view.
    pub fn on_change(&mut self, principal: Option<&Principal>) -> Option<View> {
        let next = state_of(principal);
        if next != self.state {
            debug!(from = ?self.state, to = ?next, "Auth state changed");
        }
        self.state = next;
        match next {
            AuthState::Anonymous => Some(View::Auth),
            AuthState::Authenticated => None,
        }
    }
}

fn state_of(principal: Option<&Principal>) -> AuthState {
    if principal.is_some() {
        AuthState::Authenticated
    } else {
        AuthState::Anonymous
    }
}

/// A token bound to the identity provider, publishing the principal on every transition
pub struct AuthSession {
    provider: Arc<dyn IdentityProvider>,
    access_token: Option<String>,
    changes: watch::Sender<Option<Principal>>,
}

impl AuthSession {
    pub fn new(provider: Arc<dyn IdentityProvider>, access_token: Option<String>) -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            provider,
            access_token,
            changes,
        }
    }

    /// Stream of the current principal
    pub fn subscribe(&self) -> watch::Receiver<Option<Principal>> {
        self.changes.subscribe()
    }

    /// Last published state
    pub fn snapshot(&self) -> Session {
        Session {
            principal: self.changes.borrow().clone(),
        }
    }

    /// Ask the provider who the token belongs to and publish the answer.
    ///
    /// Provider failures resolve to an anonymous session.
    pub async fn refresh(&self) -> Session {
        let principal = match self.access_token.as_deref() {
            None => None,
            Some(token) => match self.provider.current_principal(token).await {
                Ok(principal) => principal,
                Err(e) => {
                    warn!(error = %e, "Failed to resolve principal");
                    None
                }
            },
        };

        self.changes.send_replace(principal.clone());
        Session { principal }
    }

    /// Revoke the token and publish the anonymous state
    pub async fn sign_out(&self) -> Result<(), IdentityError> {
        if let Some(token) = self.access_token.as_deref() {
            self.provider.sign_out(token).await?;
        }
        self.changes.send_replace(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MockIdentityProvider;

    fn cook() -> Principal {
        Principal::new("U1", Some("cook@example.com".to_string()))
    }

    #[test]
    fn test_initial_redirects_only_from_root() {
        let mut nav = AuthNavigator::new();
        assert_eq!(nav.initial(View::Root, Some(&cook())), Some(View::Dashboard));
        assert_eq!(nav.state(), AuthState::Authenticated);

        let mut nav = AuthNavigator::new();
        assert_eq!(nav.initial(View::Root, None), Some(View::Auth));

        let mut nav = AuthNavigator::new();
        assert_eq!(nav.initial(View::Gallery, None), None);
        assert_eq!(nav.initial(View::Upload, Some(&cook())), None);
    }

    #[test]
    fn test_on_change_navigates_to_auth_when_signed_out() {
        let mut nav = AuthNavigator::new();
        assert_eq!(nav.on_change(Some(&cook())), None);
        assert_eq!(nav.state(), AuthState::Authenticated);
        assert_eq!(nav.on_change(None), Some(View::Auth));
        assert_eq!(nav.state(), AuthState::Anonymous);
    }

    #[test]
    fn test_view_paths() {
        assert_eq!(View::from_path("/"), Some(View::Root));
        assert_eq!(View::from_path("/gallery/"), Some(View::Gallery));
        assert_eq!(View::from_path("/nope"), None);
        assert_eq!(View::Dashboard.path(), "/dashboard");
    }

    #[tokio::test]
    async fn test_refresh_publishes_principal() {
        let mut provider = MockIdentityProvider::new();
        provider
            .expect_current_principal()
            .withf(|token| token == "token-1")
            .returning(|_| Ok(Some(cook())));

        let auth = AuthSession::new(Arc::new(provider), Some("token-1".to_string()));
        let rx = auth.subscribe();

        let session = auth.refresh().await;
        assert_eq!(session.principal(), Some(&cook()));
        assert_eq!(*rx.borrow(), Some(cook()));
        assert_eq!(auth.snapshot().state(), AuthState::Authenticated);
    }

    #[tokio::test]
    async fn test_refresh_without_token_is_anonymous() {
        let provider = MockIdentityProvider::new();
        let auth = AuthSession::new(Arc::new(provider), None);
        assert_eq!(auth.refresh().await, Session::anonymous());
    }

    #[tokio::test]
    async fn test_refresh_provider_error_is_anonymous() {
        let mut provider = MockIdentityProvider::new();
        provider.expect_current_principal().returning(|_| {
            Err(IdentityError::Unexpected {
                status: 500,
                body: "down".to_string(),
            })
        });

        let auth = AuthSession::new(Arc::new(provider), Some("t".to_string()));
        assert_eq!(auth.refresh().await.state(), AuthState::Anonymous);
    }

    #[tokio::test]
    async fn test_sign_out_publishes_none() {
        let mut provider = MockIdentityProvider::new();
        provider
            .expect_current_principal()
            .returning(|_| Ok(Some(cook())));
        provider.expect_sign_out().times(1).returning(|_| Ok(()));

        let auth = AuthSession::new(Arc::new(provider), Some("t".to_string()));
        auth.refresh().await;
        let mut rx = auth.subscribe();
        let mut nav = AuthNavigator::new();
        nav.on_change(rx.borrow_and_update().as_ref());

        auth.sign_out().await.unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(nav.on_change(rx.borrow_and_update().as_ref()), Some(View::Auth));
    }
}
