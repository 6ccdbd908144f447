//! Durable session store with an in-memory mirror.
//!
//! The store starts `Uninitialized` and becomes `Ready` after its first
//! hydrate from storage, or after its first write. Every write and clear holds
//! the state lock across the storage call, so readers never observe a half
//! written or half cleared session.
//!
//! Each write and clear also bumps a generation counter under the same lock.
//! Work that started against one generation (a token refresh) can commit
//! with [`SessionStore::persist_if_current`] or
//! [`SessionStore::clear_if_current`], which do nothing once the session has
//! moved on.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use tracing::{debug, warn};

use super::storage::{
    TokenStorage, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, SESSION_KEYS, USER_EMAIL_KEY, USER_ROLE_KEY,
};
use super::token::{is_token_expired, TokenData};
use super::SessionError;

/// In-memory copy of the four session keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFields {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub role: Option<String>,
    pub email: Option<String>,
}

impl From<&TokenData> for SessionFields {
    fn from(data: &TokenData) -> Self {
        Self {
            access_token: Some(data.access_token.clone()),
            refresh_token: Some(data.refresh_token.clone()),
            role: Some(data.role.clone()),
            email: Some(data.email.clone()),
        }
    }
}

#[derive(Debug)]
enum StorePhase {
    Uninitialized,
    Ready(SessionFields),
}

#[derive(Debug)]
struct StoreState {
    phase: StorePhase,
    generation: u64,
}

pub struct SessionStore {
    storage: Box<dyn TokenStorage>,
    state: RwLock<StoreState>,
}

impl SessionStore {
    pub fn new(storage: Box<dyn TokenStorage>) -> Self {
        Self {
            storage,
            state: RwLock::new(StoreState {
                phase: StorePhase::Uninitialized,
                generation: 0,
            }),
        }
    }

    /// Hydrate the mirror from durable storage. Later calls are no-ops.
    ///
    /// A key that cannot be read hydrates as absent; a session that cannot be
    /// read is a logged-out session.
    pub fn initialize(&self) {
        let Ok(mut state) = self.write_state() else {
            return;
        };
        if matches!(state.phase, StorePhase::Ready(_)) {
            return;
        }

        let read = |key: &str| match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Failed to read session key");
                None
            }
        };
        let fields = SessionFields {
            access_token: read(ACCESS_TOKEN_KEY),
            refresh_token: read(REFRESH_TOKEN_KEY),
            role: read(USER_ROLE_KEY),
            email: read(USER_EMAIL_KEY),
        };
        debug!(
            has_access_token = fields.access_token.is_some(),
            has_refresh_token = fields.refresh_token.is_some(),
            "Session store initialized"
        );
        state.phase = StorePhase::Ready(fields);
    }

    pub fn is_initialized(&self) -> bool {
        self.read_state()
            .map(|state| matches!(state.phase, StorePhase::Ready(_)))
            .unwrap_or(false)
    }

    /// Write all four fields to storage and the mirror.
    pub fn persist(&self, data: &TokenData) -> Result<(), SessionError> {
        data.validate()?;
        let mut state = self.write_state()?;
        self.persist_locked(&mut state, data)
    }

    /// Like [`SessionStore::persist`], but only while the session is still at
    /// `generation`. Returns `Ok(false)` and leaves everything untouched
    /// otherwise.
    pub fn persist_if_current(&self, generation: u64, data: &TokenData) -> Result<bool, SessionError> {
        data.validate()?;
        let mut state = self.write_state()?;
        if state.generation != generation {
            return Ok(false);
        }
        self.persist_locked(&mut state, data)?;
        Ok(true)
    }

    /// Remove all four fields from storage and reset the mirror.
    ///
    /// The mirror is reset even when storage fails, so this process never
    /// keeps using a session it was told to drop.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.write_state()?;
        self.clear_locked(&mut state)
    }

    /// Like [`SessionStore::clear`], but only while the session is still at
    /// `generation`. Returns `Ok(false)` and leaves everything untouched
    /// otherwise.
    pub fn clear_if_current(&self, generation: u64) -> Result<bool> {
        let mut state = self.write_state()?;
        if state.generation != generation {
            return Ok(false);
        }
        self.clear_locked(&mut state)?;
        Ok(true)
    }

    /// Current generation. Changes on every persist and clear.
    pub fn generation(&self) -> u64 {
        self.read_state().map(|state| state.generation).unwrap_or(0)
    }

    /// Generation and mirror read under one lock.
    pub fn snapshot(&self) -> (u64, SessionFields) {
        match self.read_state() {
            Ok(state) => (state.generation, Self::fields_of(&state)),
            Err(_) => (0, SessionFields::default()),
        }
    }

    /// Snapshot of the mirror. Empty while uninitialized.
    pub fn fields(&self) -> SessionFields {
        self.snapshot().1
    }

    pub fn access_token(&self) -> Option<String> {
        self.fields().access_token
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.fields().refresh_token
    }

    /// True if a refresh token is held and not expired.
    ///
    /// Always false before [`SessionStore::initialize`]: callers must hydrate
    /// the store before trusting derived state.
    pub fn is_logged_in(&self) -> bool {
        self.fields()
            .refresh_token
            .map(|token| !is_token_expired(&token))
            .unwrap_or(false)
    }

    fn persist_locked(&self, state: &mut StoreState, data: &TokenData) -> Result<(), SessionError> {
        self.storage.set_all(&[
            (ACCESS_TOKEN_KEY, data.access_token.as_str()),
            (REFRESH_TOKEN_KEY, data.refresh_token.as_str()),
            (USER_ROLE_KEY, data.role.as_str()),
            (USER_EMAIL_KEY, data.email.as_str()),
        ])?;
        state.phase = StorePhase::Ready(SessionFields::from(data));
        state.generation += 1;
        debug!(role = %data.role, generation = state.generation, "Session tokens persisted");
        Ok(())
    }

    fn clear_locked(&self, state: &mut StoreState) -> Result<()> {
        let result = self.storage.remove_all(&SESSION_KEYS);
        state.phase = StorePhase::Ready(SessionFields::default());
        state.generation += 1;
        result
    }

    fn fields_of(state: &StoreState) -> SessionFields {
        match &state.phase {
            StorePhase::Ready(fields) => fields.clone(),
            StorePhase::Uninitialized => SessionFields::default(),
        }
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| anyhow!("session state lock poisoned"))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|_| anyhow!("session state lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::auth::storage::MemoryStorage;
    use crate::auth::token::tests::jwt_expiring_in;

    fn sample_tokens() -> TokenData {
        TokenData::new("A", "B", "doctor", "x@y.com")
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let storage = Arc::new(MemoryStorage::default());
        let store = SessionStore::new(Box::new(storage.clone()));
        assert!(!store.is_initialized());

        store.initialize();
        assert!(store.is_initialized());

        // Later writes behind the store's back are not re-read
        storage.set_all(&[(ACCESS_TOKEN_KEY, "late")]).unwrap();
        store.initialize();
        assert_eq!(store.access_token(), None);
    }

    #[test]
    fn test_persist_round_trips_across_restart() {
        let storage = Arc::new(MemoryStorage::default());
        let store = SessionStore::new(Box::new(storage.clone()));
        store.initialize();
        store.persist(&sample_tokens()).unwrap();

        let restarted = SessionStore::new(Box::new(storage));
        restarted.initialize();
        assert_eq!(restarted.fields(), SessionFields::from(&sample_tokens()));
    }

    #[test]
    fn test_persist_before_initialize_makes_store_ready() {
        let store = SessionStore::new(Box::new(MemoryStorage::default()));
        store.persist(&sample_tokens()).unwrap();
        assert!(store.is_initialized());
        assert_eq!(store.access_token().as_deref(), Some("A"));
    }

    #[test]
    fn test_persist_rejects_partial_tokens() {
        let storage = Arc::new(MemoryStorage::default());
        let store = SessionStore::new(Box::new(storage.clone()));
        store.initialize();

        let partial = TokenData::new("A", "B", "", "x@y.com");
        assert!(store.persist(&partial).is_err());
        assert_eq!(store.fields(), SessionFields::default());
        assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn test_clear_removes_every_key() {
        let storage = Arc::new(MemoryStorage::default());
        let store = SessionStore::new(Box::new(storage.clone()));
        store.persist(&sample_tokens()).unwrap();

        store.clear().unwrap();
        assert_eq!(store.fields(), SessionFields::default());
        for key in SESSION_KEYS {
            assert_eq!(storage.get(key).unwrap(), None, "{} should be removed", key);
        }
    }

    #[test]
    fn test_is_logged_in_follows_refresh_token() {
        let storage = Arc::new(MemoryStorage::default());
        let valid_refresh = jwt_expiring_in(Duration::days(7));
        storage
            .set_all(&[(ACCESS_TOKEN_KEY, "A"), (REFRESH_TOKEN_KEY, valid_refresh.as_str())])
            .unwrap();

        let store = SessionStore::new(Box::new(storage));
        assert!(!store.is_logged_in(), "uninitialized store is never logged in");

        store.initialize();
        assert!(store.is_logged_in());

        let expired = TokenData::new("A", jwt_expiring_in(Duration::days(-1)), "doctor", "x@y.com");
        store.persist(&expired).unwrap();
        assert!(!store.is_logged_in());
    }

    #[test]
    fn test_persist_and_clear_bump_generation() {
        let store = SessionStore::new(Box::new(MemoryStorage::default()));
        store.initialize();
        let start = store.generation();

        store.persist(&sample_tokens()).unwrap();
        assert_eq!(store.generation(), start + 1);
        store.clear().unwrap();
        assert_eq!(store.generation(), start + 2);
    }

    #[test]
    fn test_conditional_writes_skip_a_moved_on_session() {
        let storage = Arc::new(MemoryStorage::default());
        let store = SessionStore::new(Box::new(storage.clone()));
        store.persist(&sample_tokens()).unwrap();
        let (started_at, _) = store.snapshot();

        // Logout and a new login land while older work is still running
        store.clear().unwrap();
        let fresh = TokenData::new("A2", "B2", "doctor", "x@y.com");
        store.persist(&fresh).unwrap();

        let late = TokenData::new("C", "B", "doctor", "x@y.com");
        assert!(!store.persist_if_current(started_at, &late).unwrap());
        assert!(!store.clear_if_current(started_at).unwrap());
        assert_eq!(store.fields(), SessionFields::from(&fresh));
        assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("A2"));

        let (current, _) = store.snapshot();
        assert!(store.persist_if_current(current, &late).unwrap());
        assert_eq!(store.access_token().as_deref(), Some("C"));
    }
}
