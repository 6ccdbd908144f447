//! Session manager: the single entry point for token consumers.
//!
//! Access tokens are refreshed lazily, when a caller asks for one and finds
//! it expired. Concurrent callers share one in-flight refresh. Every refresh
//! failure ends the session: the store is cleared and the [`Navigator`] is
//! told to send the user back to the login surface.
//!
//! A refresh is tied to the store generation it started from. If the session
//! is logged out, replaced or saved again meanwhile, the refresh neither
//! persists its tokens nor ends the newer session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::AuthApi;
use crate::models::{AuthResponse, SignupData, UserInfo};

use super::store::{SessionFields, SessionStore};
use super::token::{is_token_expired, TokenData};
use super::SessionError;

/// Role assumed when login or signup responses leave it out
pub const DEFAULT_ROLE: &str = "doctor";

/// Upper bound on the best-effort logout notification.
/// Local cleanup must not wait on a hung backend.
const LOGOUT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Moves the user to the login surface once the session has ended.
pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self);
}

/// Navigator for headless consumers with nowhere to redirect to
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn redirect_to_login(&self) {}
}

/// Where the local session stands, judged from the stored tokens alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No access token held
    Anonymous,
    /// Access token held and unexpired
    Authenticated,
    /// Access token expired, refresh token still unexpired
    Stale,
    /// Access token expired and the refresh token is missing, expired or unreadable
    Invalid,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Anonymous => write!(f, "Anonymous"),
            SessionState::Authenticated => write!(f, "Authenticated"),
            SessionState::Stale => write!(f, "Stale"),
            SessionState::Invalid => write!(f, "Invalid"),
        }
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Option<String>>>;

/// Refresh currently running, tagged so only its own callers clear the slot
struct InFlight {
    id: u64,
    refresh: SharedRefresh,
}

/// The slot is kept outside [`Inner`]: the shared future owns an
/// `Arc<Inner>` and only a `Weak` to the slot, so no cycle forms.
type RefreshSlot = Mutex<Option<InFlight>>;

struct Inner {
    store: SessionStore,
    api: Arc<dyn AuthApi>,
    navigator: Arc<dyn Navigator>,
}

/// Handle to the process's session. Clone is cheap and every clone shares
/// the same store and refresh coordination.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
    in_flight: Arc<RefreshSlot>,
    next_refresh_id: Arc<AtomicU64>,
}

impl SessionManager {
    pub fn new(store: SessionStore, api: Arc<dyn AuthApi>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                api,
                navigator,
            }),
            in_flight: Arc::new(Mutex::new(None)),
            next_refresh_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Hydrate the store from durable storage. Idempotent.
    pub async fn initialize(&self) {
        self.inner.store.initialize();
    }

    /// Access token to attach to an outgoing request.
    ///
    /// Returns the stored token while it is unexpired, otherwise refreshes.
    /// `None` means there is no usable session.
    pub async fn get_valid_access_token(&self) -> Option<String> {
        self.initialize().await;

        let token = self.inner.store.access_token()?;
        if !is_token_expired(&token) {
            return Some(token);
        }

        debug!("Access token expired, refreshing");
        self.refresh_access_token().await
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Joins the refresh already in flight if there is one. Any failure logs
    /// the session out and returns `None`, unless the session changed while
    /// the refresh was running.
    pub async fn refresh_access_token(&self) -> Option<String> {
        self.initialize().await;

        let refresh = {
            let mut slot = self.in_flight.lock().await;
            match slot.as_ref() {
                Some(in_flight) => {
                    debug!(refresh_id = in_flight.id, "Joining in-flight token refresh");
                    in_flight.refresh.clone()
                }
                None => {
                    let id = self.next_refresh_id.fetch_add(1, Ordering::Relaxed);
                    let refresh = refresh_future(
                        id,
                        Arc::clone(&self.inner),
                        Arc::downgrade(&self.in_flight),
                    );
                    *slot = Some(InFlight {
                        id,
                        refresh: refresh.clone(),
                    });
                    refresh
                }
            }
        };

        refresh.await
    }

    /// Caller-initiated refresh, same semantics as [`Self::refresh_access_token`]
    pub async fn force_refresh(&self) -> Option<String> {
        self.refresh_access_token().await
    }

    /// Store a complete token set. The only way into an authenticated session.
    pub async fn save_tokens(&self, data: TokenData) -> Result<(), SessionError> {
        self.inner.store.persist(&data)
    }

    /// Log in with email and password and save the returned tokens.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenData, SessionError> {
        let response = self.inner.api.login(email, password).await?;
        let data = tokens_from_login(&response, email)?;
        self.save_tokens(data.clone()).await?;
        info!(role = %data.role, "Logged in");
        Ok(data)
    }

    /// Register a new account, saving the returned tokens if the backend
    /// issued any.
    ///
    /// A registration without a token is still a success; the user logs in
    /// separately and `Ok(None)` is returned.
    pub async fn signup(&self, signup: &SignupData) -> Result<Option<TokenData>, SessionError> {
        let response = self.inner.api.signup(signup).await?;
        if response.access_token().is_none() {
            info!("Signed up without a session");
            return Ok(None);
        }
        let data = tokens_from_login(&response, &signup.email)?;
        self.save_tokens(data.clone()).await?;
        info!(role = %data.role, "Signed up");
        Ok(Some(data))
    }

    /// End the session: notify the backend if possible, clear local tokens,
    /// then redirect to login. Local cleanup never depends on the network.
    pub async fn logout(&self) {
        self.inner.logout().await;
    }

    /// Drop local tokens without a backend call or a redirect
    pub fn clear_tokens(&self) {
        self.inner.clear_local();
    }

    /// Refresh token present and unexpired. Hydrates the store first.
    pub async fn is_logged_in(&self) -> bool {
        self.initialize().await;
        self.inner.store.is_logged_in()
    }

    pub fn state(&self) -> SessionState {
        let fields = self.inner.store.fields();
        match (fields.access_token, fields.refresh_token) {
            (None, _) => SessionState::Anonymous,
            (Some(access), _) if !is_token_expired(&access) => SessionState::Authenticated,
            (Some(_), Some(refresh)) if !is_token_expired(&refresh) => SessionState::Stale,
            _ => SessionState::Invalid,
        }
    }

    pub fn has_role(&self, expected: &str) -> bool {
        self.inner.store.fields().role.as_deref() == Some(expected)
    }

    pub fn user_info(&self) -> UserInfo {
        let fields = self.inner.store.fields();
        UserInfo {
            email: fields.email,
            role: fields.role,
        }
    }

    pub fn current_access_token(&self) -> Option<String> {
        self.inner.store.access_token()
    }

    pub fn current_refresh_token(&self) -> Option<String> {
        self.inner.store.refresh_token()
    }
}

/// Build the shared refresh future. It clears its own slot when it
/// completes, so a finished refresh is never handed to a later caller even if
/// every awaiter was dropped in between.
fn refresh_future(id: u64, inner: Arc<Inner>, slot: Weak<RefreshSlot>) -> SharedRefresh {
    async move {
        let result = inner.run_refresh().await;
        if let Some(slot) = slot.upgrade() {
            let mut slot = slot.lock().await;
            if slot.as_ref().is_some_and(|in_flight| in_flight.id == id) {
                *slot = None;
            }
        }
        result
    }
    .boxed()
    .shared()
}

impl Inner {
    async fn run_refresh(&self) -> Option<String> {
        let (generation, prior) = self.store.snapshot();

        let Some(refresh_token) = prior.refresh_token.clone() else {
            info!("No refresh token held, ending session");
            self.end_session_if_current(generation).await;
            return None;
        };

        match self.api.refresh(&refresh_token).await {
            Ok(response) => match tokens_from_refresh(&response, &prior) {
                Some(data) => match self.store.persist_if_current(generation, &data) {
                    Ok(true) => {
                        info!("Access token refreshed");
                        return Some(data.access_token);
                    }
                    Ok(false) => {
                        info!("Session changed while refreshing, discarding new tokens");
                        return None;
                    }
                    Err(e) => warn!(error = %e, "Failed to persist refreshed tokens"),
                },
                None => warn!("Refresh response did not contain a complete token set"),
            },
            Err(e) => warn!(error = %e, "Token refresh failed"),
        }

        self.end_session_if_current(generation).await;
        None
    }

    /// Caller-initiated logout. Always clears and redirects.
    async fn logout(&self) {
        self.notify_logout(&self.store.fields()).await;
        self.clear_local();
        self.navigator.redirect_to_login();
        info!("Logged out");
    }

    /// Logout after a failed refresh. A session that was replaced or ended
    /// since `generation` is left alone and no redirect happens.
    async fn end_session_if_current(&self, generation: u64) {
        let (current, fields) = self.store.snapshot();
        if current != generation {
            info!("Session changed while refreshing, keeping it");
            return;
        }

        self.notify_logout(&fields).await;
        match self.store.clear_if_current(generation) {
            Ok(true) => {}
            Ok(false) => {
                info!("Session changed during logout, keeping it");
                return;
            }
            Err(e) => warn!(error = %e, "Failed to remove stored session tokens"),
        }
        self.navigator.redirect_to_login();
        info!("Logged out");
    }

    /// Best-effort backend notification, bounded by [`LOGOUT_NOTIFY_TIMEOUT`]
    async fn notify_logout(&self, fields: &SessionFields) {
        let (Some(email), Some(refresh_token)) =
            (fields.email.as_deref(), fields.refresh_token.as_deref())
        else {
            return;
        };

        let notify = self.api.logout(email, refresh_token);
        match tokio::time::timeout(LOGOUT_NOTIFY_TIMEOUT, notify).await {
            Ok(Ok(())) => debug!("Backend notified of logout"),
            Ok(Err(e)) => warn!(error = %e, "Logout request failed, clearing session anyway"),
            Err(_) => warn!("Logout request timed out, clearing session anyway"),
        }
    }

    fn clear_local(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to remove stored session tokens");
        }
    }
}

/// Token set from a login or signup response. Missing refresh token falls
/// back to the access token, missing role to [`DEFAULT_ROLE`], missing email
/// to the one submitted.
fn tokens_from_login(response: &AuthResponse, email: &str) -> Result<TokenData, SessionError> {
    let access_token = response
        .access_token()
        .ok_or(SessionError::MissingAccessToken)?;
    Ok(TokenData::new(
        access_token,
        response.refresh_token().unwrap_or(access_token),
        response.role().unwrap_or(DEFAULT_ROLE),
        response.email().unwrap_or(email),
    ))
}

/// Token set from a refresh response, keeping prior values for anything the
/// server left out. `None` unless all four fields end up present.
fn tokens_from_refresh(response: &AuthResponse, prior: &SessionFields) -> Option<TokenData> {
    let access_token = response.access_token()?;
    let refresh_token = response
        .refresh_token()
        .or(prior.refresh_token.as_deref())?;
    let role = response.role().or(prior.role.as_deref())?;
    let email = response.email().or(prior.email.as_deref())?;
    Some(TokenData::new(access_token, refresh_token, role, email))
}
