//! Token lifecycle manager
//!
//! Hands out a usable credential before each request and refreshes it from
//! the identity provider. Concurrent refreshes are collapsed: the first
//! caller asks the provider, later callers wait for that outcome.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chat_core::ClientConfig;
use tokio::sync::oneshot;

use super::credential;
use super::identity::IdentityProvider;
use super::store::{FileTokenStore, TokenStore};

type Waiter = oneshot::Sender<Option<String>>;

#[derive(Default)]
enum RefreshState {
    #[default]
    Idle,
    InFlight(Vec<Waiter>),
}

pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    identity: Arc<dyn IdentityProvider>,
    margin: Duration,
    refresh: Mutex<RefreshState>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("margin", &self.margin)
            .finish_non_exhaustive()
    }
}

/// Resets the refresh state and wakes every waiter, also when the leading
/// refresh future is dropped before finishing.
struct InFlightGuard<'a> {
    state: &'a Mutex<RefreshState>,
    outcome: Option<String>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let previous = std::mem::take(&mut *self.state.lock().unwrap_or_else(PoisonError::into_inner));
        if let RefreshState::InFlight(waiters) = previous {
            for waiter in waiters {
                let _ = waiter.send(self.outcome.clone());
            }
        }
    }
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn TokenStore>,
        identity: Arc<dyn IdentityProvider>,
        margin: Duration,
    ) -> Self {
        Self {
            store,
            identity,
            margin,
            refresh: Mutex::new(RefreshState::Idle),
        }
    }

    /// File-backed store in `config.app_data_dir` with the configured margin.
    pub fn from_config(config: &ClientConfig, identity: Arc<dyn IdentityProvider>) -> Self {
        Self::new(
            Arc::new(FileTokenStore::in_dir(&config.app_data_dir)),
            identity,
            config.token_expiry_margin(),
        )
    }

    pub fn is_expired(&self, token: &str) -> bool {
        credential::is_expired(token, self.margin)
    }

    pub fn stored_token(&self) -> Option<String> {
        self.store.load()
    }

    /// The stored credential, refreshed first when it is present but expired.
    pub async fn valid_token(&self) -> Option<String> {
        let token = self.store.load()?;
        if self.is_expired(&token) {
            log::debug!("Stored credential expired, refreshing");
            return self.refresh().await;
        }
        Some(token)
    }

    /// Fetch the identity provider's current credential and persist it.
    ///
    /// Returns `None` when there is no identity session or the provider
    /// fails. While one refresh is running, other callers share its outcome
    /// instead of asking the provider again.
    pub async fn refresh(&self) -> Option<String> {
        let waiter = {
            let mut state = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);
            match &mut *state {
                RefreshState::InFlight(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                RefreshState::Idle => {
                    *state = RefreshState::InFlight(Vec::new());
                    None
                }
            }
        };

        if let Some(rx) = waiter {
            log::debug!("Refresh already in flight, waiting for its outcome");
            return rx.await.ok().flatten();
        }

        let mut guard = InFlightGuard {
            state: &self.refresh,
            outcome: None,
        };
        let outcome = self.fetch_from_identity().await;
        guard.outcome = outcome.clone();
        drop(guard);
        outcome
    }

    async fn fetch_from_identity(&self) -> Option<String> {
        match self.identity.current_token().await {
            Ok(Some(token)) => {
                if let Err(e) = self.store.save(&token) {
                    log::warn!("Failed to persist refreshed credential: {e}");
                }
                log::info!("Credential refreshed");
                Some(token)
            }
            Ok(None) => {
                log::info!("No identity session, clearing stored credential");
                self.clear_store();
                None
            }
            Err(e) => {
                log::error!("Credential refresh failed: {e:#}");
                None
            }
        }
    }

    pub async fn is_signed_in(&self) -> bool {
        self.identity.is_signed_in().await
    }

    /// Forget the stored credential.
    pub fn sign_out(&self) {
        self.clear_store();
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            log::warn!("Failed to clear stored credential: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credential::{now_secs, token_with_claims};
    use crate::auth::store::MemoryTokenStore;
    use crate::auth::StaticIdentityProvider;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingIdentity {
        calls: AtomicUsize,
        token: Option<String>,
        fail: bool,
        delay: Duration,
    }

    impl CountingIdentity {
        fn new(token: Option<&str>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                token: token.map(str::to_string),
                fail: false,
                delay: Duration::from_millis(50),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IdentityProvider for CountingIdentity {
        async fn current_token(&self) -> anyhow::Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                anyhow::bail!("identity provider unavailable");
            }
            Ok(self.token.clone())
        }

        async fn is_signed_in(&self) -> bool {
            self.token.is_some()
        }
    }

    fn fresh_token() -> String {
        token_with_claims(json!({"sub": "user_1", "exp": now_secs() + 3600}))
    }

    fn expired_token() -> String {
        token_with_claims(json!({"sub": "user_1", "exp": now_secs() - 10}))
    }

    fn manager(store: Arc<MemoryTokenStore>, identity: Arc<CountingIdentity>) -> TokenManager {
        TokenManager::new(store, identity, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_call() {
        let fresh = fresh_token();
        let identity = Arc::new(CountingIdentity::new(Some(&fresh)));
        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager(store.clone(), identity.clone());

        let results = futures::future::join_all((0..5).map(|_| manager.refresh())).await;

        assert_eq!(identity.calls(), 1);
        assert!(results.iter().all(|r| r.as_deref() == Some(fresh.as_str())));
        assert_eq!(store.load(), Some(fresh));
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_all_fail_together() {
        let identity = Arc::new(CountingIdentity {
            fail: true,
            ..CountingIdentity::new(Some("unused"))
        });
        let store = Arc::new(MemoryTokenStore::with_token("old"));
        let manager = manager(store.clone(), identity.clone());

        let results = futures::future::join_all((0..3).map(|_| manager.refresh())).await;

        assert_eq!(identity.calls(), 1);
        assert!(results.iter().all(Option::is_none));
        // Provider errors leave the stored credential alone.
        assert_eq!(store.load().as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_refresh_without_identity_session_clears_store() {
        let identity = Arc::new(CountingIdentity::new(None));
        let store = Arc::new(MemoryTokenStore::with_token("old"));
        let manager = manager(store.clone(), identity);

        assert_eq!(manager.refresh().await, None);
        assert_eq!(store.load(), None);
    }

    #[tokio::test]
    async fn test_dropped_refresh_resets_in_flight_state() {
        let identity = Arc::new(CountingIdentity {
            delay: Duration::from_secs(5),
            ..CountingIdentity::new(Some("slow"))
        });
        let manager = manager(Arc::new(MemoryTokenStore::new()), identity.clone());

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), manager.refresh()).await;
        assert!(abandoned.is_err());

        let state = manager.refresh.lock().unwrap();
        assert!(matches!(*state, RefreshState::Idle));
    }

    #[tokio::test]
    async fn test_sequential_refreshes_each_call_provider() {
        let fresh = fresh_token();
        let identity = Arc::new(CountingIdentity {
            delay: Duration::ZERO,
            ..CountingIdentity::new(Some(&fresh))
        });
        let manager = manager(Arc::new(MemoryTokenStore::new()), identity.clone());

        manager.refresh().await;
        manager.refresh().await;
        assert_eq!(identity.calls(), 2);
    }

    #[tokio::test]
    async fn test_valid_token_uses_fresh_stored_credential() {
        let stored = fresh_token();
        let identity = Arc::new(CountingIdentity::new(Some("other")));
        let manager = manager(
            Arc::new(MemoryTokenStore::with_token(stored.clone())),
            identity.clone(),
        );

        assert_eq!(manager.valid_token().await, Some(stored));
        assert_eq!(identity.calls(), 0);
    }

    #[tokio::test]
    async fn test_valid_token_refreshes_expired_credential() {
        let fresh = fresh_token();
        let identity = Arc::new(CountingIdentity::new(Some(&fresh)));
        let store = Arc::new(MemoryTokenStore::with_token(expired_token()));
        let manager = manager(store.clone(), identity.clone());

        assert_eq!(manager.valid_token().await, Some(fresh.clone()));
        assert_eq!(identity.calls(), 1);
        assert_eq!(store.load(), Some(fresh));
    }

    #[tokio::test]
    async fn test_valid_token_without_stored_credential() {
        let identity = Arc::new(CountingIdentity::new(Some("ignored")));
        let manager = manager(Arc::new(MemoryTokenStore::new()), identity.clone());

        assert_eq!(manager.valid_token().await, None);
        assert_eq!(identity.calls(), 0);
    }

    #[tokio::test]
    async fn test_sign_out_clears_store() {
        let store = Arc::new(MemoryTokenStore::with_token(fresh_token()));
        let manager = TokenManager::new(
            store.clone(),
            Arc::new(StaticIdentityProvider::new()),
            Duration::from_secs(30),
        );

        assert!(!manager.is_signed_in().await);
        manager.sign_out();
        assert_eq!(manager.stored_token(), None);
    }
}
