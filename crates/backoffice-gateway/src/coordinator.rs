//! Single-flight token refresh
//!
//! The coordinator owns the refresh state for one session. The first caller
//! that needs a new access token starts a refresh; every caller arriving
//! while it runs is queued and receives the same outcome. When the refresh
//! settles the state returns to idle, so a later expiry starts a new one.
//!
//! The refresh call runs on its own task. A caller that is dropped while
//! waiting only loses its receiver; the state still returns to idle and the
//! other waiters are still answered.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use backoffice_auth::{RefreshResponse, SessionStore, is_token_valid};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};

use crate::error::RefreshFailure;
use crate::metrics;

/// Result every waiter of one refresh receives.
pub type RefreshOutcome = std::result::Result<String, RefreshFailure>;

/// Performs the refresh call itself.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Refresher>`).
pub trait Refresher: Send + Sync {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = backoffice_auth::Result<RefreshResponse>> + Send + 'a>>;
}

/// Refresher that calls the backend's refresh endpoint.
pub struct HttpRefresher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRefresher {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

impl Refresher for HttpRefresher {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = backoffice_auth::Result<RefreshResponse>> + Send + 'a>> {
        Box::pin(backoffice_auth::refresh_token(
            &self.client,
            &self.base_url,
            refresh_token,
        ))
    }
}

enum State {
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    },
}

struct Inner {
    state: Mutex<State>,
    store: Arc<dyn SessionStore>,
    refresher: Arc<dyn Refresher>,
    margin: Duration,
}

/// Shared handle to the refresh state of one session.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        refresher: Arc<dyn Refresher>,
        margin: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Idle),
                store,
                refresher,
                margin,
            }),
        }
    }

    /// Obtain a freshly refreshed access token, joining the refresh already
    /// in flight if there is one.
    pub async fn acquire_token(&self) -> RefreshOutcome {
        self.join_or_start(None).await
    }

    /// Obtain a replacement for `stale`.
    ///
    /// If no refresh is running and the store already holds a different,
    /// still valid token (another request finished a refresh in the
    /// meantime), that token is returned without a new refresh.
    pub async fn replace_token(&self, stale: &str) -> RefreshOutcome {
        self.join_or_start(Some(stale)).await
    }

    /// Whether a refresh is currently in flight.
    pub async fn is_refreshing(&self) -> bool {
        matches!(*self.inner.state.lock().await, State::Refreshing { .. })
    }

    async fn join_or_start(&self, stale: Option<&str>) -> RefreshOutcome {
        let rx = {
            let mut state = self.inner.state.lock().await;
            let (tx, rx) = oneshot::channel();
            match &mut *state {
                State::Refreshing { waiters } => {
                    waiters.push(tx);
                    debug!(waiters = waiters.len(), "joined in-flight token refresh");
                }
                State::Idle => {
                    if let Some(stale) = stale
                        && let Some(current) = self.inner.store.access_token()
                        && current != stale
                        && is_token_valid(&current, self.inner.margin)
                    {
                        debug!("token already replaced by an earlier refresh");
                        return Ok(current);
                    }

                    *state = State::Refreshing { waiters: vec![tx] };
                    let inner = self.inner.clone();
                    tokio::spawn(async move { inner.run_refresh().await });
                }
            }
            rx
        };

        rx.await.unwrap_or(Err(RefreshFailure::Abandoned))
    }
}

impl Inner {
    async fn run_refresh(&self) {
        let outcome = self.refresh_once().await;

        let waiters = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, State::Idle) {
                State::Refreshing { waiters } => waiters,
                State::Idle => Vec::new(),
            }
        };

        debug!(
            waiters = waiters.len(),
            success = outcome.is_ok(),
            "token refresh settled"
        );
        for waiter in waiters {
            // A closed receiver means that caller went away; nothing to do.
            let _ = waiter.send(outcome.clone());
        }
    }

    /// One refresh call. The session is persisted on success and torn down
    /// on any failure.
    async fn refresh_once(&self) -> RefreshOutcome {
        let Some(refresh_token) = self.store.refresh_token().filter(|t| !t.is_empty()) else {
            warn!("no refresh token in session, signing out");
            self.teardown();
            metrics::record_refresh("missing");
            return Err(RefreshFailure::MissingRefreshToken);
        };

        match self.refresher.refresh(&refresh_token).await {
            Ok(response) => {
                let access_token = response.access_token.clone();
                if let Err(e) = self.store.store_tokens(response.token_pair()) {
                    warn!(error = %e, "failed to persist refreshed tokens");
                }
                if let Some(user) = response.user
                    && let Err(e) = self.store.store_user(user)
                {
                    warn!(error = %e, "failed to persist refreshed user");
                }
                info!("access token refreshed");
                metrics::record_refresh("success");
                Ok(access_token)
            }
            Err(backoffice_auth::Error::Rejected { status, message }) => {
                warn!(status, message = %message, "refresh token rejected, signing out");
                self.teardown();
                metrics::record_refresh("rejected");
                Err(RefreshFailure::Rejected(message))
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, signing out");
                self.teardown();
                metrics::record_refresh("failed");
                Err(RefreshFailure::Failed(e.to_string()))
            }
        }
    }

    fn teardown(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{mint_token, sample_user};
    use backoffice_auth::{MemorySessionStore, TokenPair};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MARGIN: Duration = Duration::from_secs(30);

    /// Refresher double with a call counter and scripted outcome.
    struct FakeRefresher {
        calls: AtomicUsize,
        delay: Duration,
        reject: bool,
        with_user: bool,
    }

    impl FakeRefresher {
        fn ok(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                reject: false,
                with_user: false,
            })
        }

        fn rejecting(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                reject: true,
                with_user: false,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Refresher for FakeRefresher {
        fn refresh<'a>(
            &'a self,
            refresh_token: &'a str,
        ) -> Pin<Box<dyn Future<Output = backoffice_auth::Result<RefreshResponse>> + Send + 'a>>
        {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(self.delay).await;
                if self.reject {
                    return Err(backoffice_auth::Error::Rejected {
                        status: 401,
                        message: "Refresh token inválido".into(),
                    });
                }
                let user = self.with_user.then(|| {
                    let mut user = sample_user();
                    user.name = format!("refreshed via {refresh_token}");
                    user
                });
                Ok(RefreshResponse {
                    access_token: mint_token(900),
                    refresh_token: format!("rt_{n}"),
                    user,
                })
            })
        }
    }

    fn expired_session() -> Arc<MemorySessionStore> {
        Arc::new(MemorySessionStore::with_session(
            TokenPair::new(mint_token(-60), "rt_0"),
            Some(sample_user()),
        ))
    }

    fn coordinator(store: &Arc<MemorySessionStore>, refresher: &Arc<FakeRefresher>) -> RefreshCoordinator {
        RefreshCoordinator::new(store.clone(), refresher.clone(), MARGIN)
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let store = expired_session();
        let refresher = FakeRefresher::ok(Duration::from_millis(100));
        let coordinator = coordinator(&store, &refresher);

        let outcomes =
            futures_util::future::join_all((0..20).map(|_| coordinator.acquire_token())).await;

        assert_eq!(refresher.calls(), 1);
        let first = outcomes[0].clone().unwrap();
        assert!(outcomes.iter().all(|o| o.as_ref() == Ok(&first)));
        assert_eq!(store.access_token(), Some(first));
        assert_eq!(store.refresh_token().as_deref(), Some("rt_1"));
        assert!(!coordinator.is_refreshing().await);
    }

    #[tokio::test]
    async fn failure_reaches_every_waiter_and_clears_session() {
        let store = expired_session();
        let refresher = FakeRefresher::rejecting(Duration::from_millis(50));
        let coordinator = coordinator(&store, &refresher);

        let outcomes =
            futures_util::future::join_all((0..5).map(|_| coordinator.acquire_token())).await;

        assert_eq!(refresher.calls(), 1);
        for outcome in outcomes {
            assert_eq!(
                outcome,
                Err(RefreshFailure::Rejected("Refresh token inválido".into()))
            );
        }
        assert_eq!(store.snapshot(), Default::default());
    }

    #[tokio::test]
    async fn missing_refresh_token_makes_no_call() {
        let store = Arc::new(MemorySessionStore::new());
        let refresher = FakeRefresher::ok(Duration::ZERO);
        let coordinator = coordinator(&store, &refresher);

        let outcome = coordinator.acquire_token().await;

        assert_eq!(outcome, Err(RefreshFailure::MissingRefreshToken));
        assert_eq!(refresher.calls(), 0);
        assert!(!coordinator.is_refreshing().await);
    }

    #[tokio::test]
    async fn empty_refresh_token_counts_as_missing() {
        let store = Arc::new(MemorySessionStore::with_session(
            TokenPair::new(mint_token(-60), ""),
            None,
        ));
        let refresher = FakeRefresher::ok(Duration::ZERO);
        let coordinator = coordinator(&store, &refresher);

        assert_eq!(
            coordinator.acquire_token().await,
            Err(RefreshFailure::MissingRefreshToken)
        );
        assert_eq!(refresher.calls(), 0);
        assert!(store.access_token().is_none());
    }

    #[tokio::test]
    async fn returns_to_idle_so_later_expiry_refreshes_again() {
        let store = expired_session();
        let refresher = FakeRefresher::ok(Duration::ZERO);
        let coordinator = coordinator(&store, &refresher);

        let first = coordinator.acquire_token().await.unwrap();
        let second = coordinator.acquire_token().await.unwrap();

        assert_eq!(refresher.calls(), 2);
        assert_ne!(first, second);
        assert_eq!(store.refresh_token().as_deref(), Some("rt_2"));
    }

    #[tokio::test]
    async fn refreshed_user_snapshot_is_stored() {
        let store = expired_session();
        let refresher = Arc::new(FakeRefresher {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            reject: false,
            with_user: true,
        });
        let coordinator = coordinator(&store, &refresher);

        coordinator.acquire_token().await.unwrap();

        assert_eq!(store.user().unwrap().name, "refreshed via rt_0");
    }

    #[tokio::test]
    async fn replace_token_reuses_newer_valid_token() {
        let fresh = mint_token(900);
        let store = Arc::new(MemorySessionStore::with_session(
            TokenPair::new(&fresh, "rt_0"),
            None,
        ));
        let refresher = FakeRefresher::ok(Duration::ZERO);
        let coordinator = coordinator(&store, &refresher);

        let token = coordinator.replace_token("stale-token").await.unwrap();

        assert_eq!(token, fresh);
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn replace_token_refreshes_when_store_holds_the_stale_token() {
        let stale = mint_token(900);
        let store = Arc::new(MemorySessionStore::with_session(
            TokenPair::new(&stale, "rt_0"),
            None,
        ));
        let refresher = FakeRefresher::ok(Duration::ZERO);
        let coordinator = coordinator(&store, &refresher);

        let token = coordinator.replace_token(&stale).await.unwrap();

        assert_ne!(token, stale);
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn dropped_caller_does_not_strand_refresh() {
        let store = expired_session();
        let refresher = FakeRefresher::ok(Duration::from_millis(50));
        let coordinator = coordinator(&store, &refresher);

        let abandoned = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.acquire_token().await })
        };
        tokio::task::yield_now().await;
        abandoned.abort();

        let token = coordinator.acquire_token().await.unwrap();
        assert_eq!(store.access_token(), Some(token));
        assert!(!coordinator.is_refreshing().await);
        assert_eq!(refresher.calls(), 1);
    }
}
