//! Authentication token cache.
//!
//! One [`TokenCache`] exists per configured credential and is shared by
//! every session of a client. It is the only cross-task mutable state in
//! the SDK, and all access to it goes through the dedupe/join protocol
//! here:
//!
//! - `get_token` returns the cached token without suspending while it is
//!   still valid.
//! - When a refresh is needed, exactly one fetch is in flight at a time;
//!   concurrent callers join the pending refresh and share its outcome,
//!   success or failure.
//! - Every successful refresh schedules a proactive background renewal at
//!   90-95% of the token's lifetime, so callers rarely observe an expired
//!   token at all.
//!
//! The fetch itself retries transient failures with full-jitter backoff,
//! up to a fixed budget, before surfacing [`ClientError::RetriesExhausted`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::backoff;
use crate::error::{ClientError, ClientResult, RemoteError};

/// How many times a refresh may call the fetcher before giving up.
pub const RETRY_ATTEMPTS: u32 = 10;

/// Default base delay for the full-jitter retry backoff.
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(1);

/// A freshly issued token and its lifetime, as reported by the token
/// service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    /// The bearer token.
    pub token: String,
    /// Seconds until the token expires.
    pub expires_in_secs: u64,
}

/// Fetches tokens from the authentication service.
///
/// Implementations perform one network call per `fetch` and classify
/// failures with a [`RemoteError`]; the cache owns all retry logic.
pub trait TokenFetcher: Send + Sync + 'static {
    /// Exchanges the configured credential for a token.
    fn fetch(&self) -> impl Future<Output = Result<TokenGrant, RemoteError>> + Send;
}

/// An installed token. Immutable once constructed; replaced atomically on
/// refresh.
#[derive(Debug, Clone)]
struct TokenState {
    token: String,
    expires_at: Instant,
}

impl TokenState {
    fn is_valid(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

type RefreshOutcome = Result<TokenState, ClientError>;

/// Concurrency-safe cache for one credential's auth token.
///
/// Cheap to clone; clones share the same cache. Dropping the last handle
/// cancels any pending proactive-refresh timer.
pub struct TokenCache<F> {
    inner: Arc<CacheInner<F>>,
}

impl<F> Clone for TokenCache<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CacheInner<F> {
    fetcher: F,
    retry_base: Duration,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    /// The current token, if any. May be expired.
    current: Option<TokenState>,
    /// The in-flight refresh all concurrent callers join, if any.
    /// Cleared as soon as the refresh settles, so the next caller starts
    /// a fresh attempt.
    pending: Option<watch::Receiver<Option<RefreshOutcome>>>,
    /// The scheduled proactive refresh. Replaced (and the old one
    /// aborted) on every successful refresh.
    refresh_timer: Option<JoinHandle<()>>,
}

impl CacheState {
    /// Installs a fetched token. A concurrently installed state with a
    /// later expiry wins; ties favor the already-installed state so
    /// expiry clocks never race backward. Returns whether `fetched` was
    /// installed.
    fn install(&mut self, fetched: TokenState) -> bool {
        match &self.current {
            Some(current) if current.expires_at >= fetched.expires_at => false,
            _ => {
                self.current = Some(fetched);
                true
            }
        }
    }
}

impl<F> CacheInner<F> {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<F> Drop for CacheInner<F> {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = state.refresh_timer.take() {
            timer.abort();
        }
    }
}

impl<F: TokenFetcher> TokenCache<F> {
    /// Creates a cache with the default retry backoff base.
    pub fn new(fetcher: F) -> Self {
        Self::with_retry_base(fetcher, DEFAULT_RETRY_BASE)
    }

    /// Creates a cache with a custom retry backoff base.
    pub fn with_retry_base(fetcher: F, retry_base: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                fetcher,
                retry_base,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Returns a valid token, refreshing if necessary.
    ///
    /// Callable concurrently from any number of tasks; at most one fetch
    /// is ever outstanding. Returns without suspending while the cached
    /// token is still valid.
    pub async fn get_token(&self) -> ClientResult<String> {
        {
            let state = self.inner.lock();
            if let Some(current) = &state.current {
                if current.is_valid(Instant::now()) {
                    return Ok(current.token.clone());
                }
            }
        }
        Ok(self.refresh().await?.token)
    }

    /// Joins the pending refresh, or starts one if none is in flight.
    ///
    /// Always performs (or joins) a real fetch, even if a valid token is
    /// installed; the validity short-circuit lives in `get_token`, not
    /// here, so the proactive timer can force a genuine renewal.
    async fn refresh(&self) -> ClientResult<TokenState> {
        let mut rx = {
            let mut state = self.inner.lock();
            if let Some(rx) = &state.pending {
                rx.clone()
            } else {
                let (tx, rx) = watch::channel(None);
                state.pending = Some(rx.clone());
                // The refresh runs as its own task: a caller that goes
                // away cannot strand the others joined on it.
                tokio::spawn(run_refresh(Arc::clone(&self.inner), tx));
                rx
            }
        };
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ClientError::Internal("token refresh settled without a result".into()))?
            .clone();
        outcome.unwrap_or_else(|| {
            Err(ClientError::Internal(
                "token refresh settled without a result".into(),
            ))
        })
    }
}

/// Drives one deduplicated refresh to completion and fans the outcome out
/// to every joined caller.
async fn run_refresh<F: TokenFetcher>(
    inner: Arc<CacheInner<F>>,
    tx: watch::Sender<Option<RefreshOutcome>>,
) {
    let outcome = match fetch_with_retry(&inner.fetcher, inner.retry_base).await {
        Ok(grant) => {
            let expires_in = Duration::from_secs(grant.expires_in_secs);
            let fetched = TokenState {
                token: grant.token,
                expires_at: Instant::now() + expires_in,
            };
            let mut state = inner.lock();
            state.install(fetched.clone());
            if expires_in > Duration::ZERO {
                let delay = backoff::refresh_delay(expires_in);
                tracing::debug!(?delay, "scheduling proactive token refresh");
                if let Some(old) = state.refresh_timer.take() {
                    old.abort();
                }
                state.refresh_timer = Some(spawn_refresh_timer(Arc::downgrade(&inner), delay));
            }
            state.pending = None;
            // The caller gets the token it fetched even when a
            // later-expiring state stayed installed.
            Ok(fetched)
        }
        Err(err) => {
            tracing::warn!(error = %err, "token refresh failed");
            inner.lock().pending = None;
            Err(err)
        }
    };
    let _ = tx.send(Some(outcome));
}

/// The proactive renewal timer. Holds only a `Weak` so it never keeps a
/// dropped cache alive; the cache aborts it on teardown or replacement.
fn spawn_refresh_timer<F: TokenFetcher>(
    weak: Weak<CacheInner<F>>,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(inner) = weak.upgrade() {
            let cache = TokenCache { inner };
            if let Err(err) = cache.refresh().await {
                tracing::warn!(error = %err, "proactive token refresh failed");
            }
        }
    })
}

/// Calls the fetcher until it succeeds, a non-retryable code arrives, or
/// the attempt budget runs out.
async fn fetch_with_retry<F: TokenFetcher>(
    fetcher: &F,
    retry_base: Duration,
) -> ClientResult<TokenGrant> {
    let mut attempt = 0u32;
    loop {
        match fetcher.fetch().await {
            Ok(grant) => return Ok(grant),
            Err(err) if !err.code.is_retryable() => {
                tracing::debug!(error = %err, "token fetch failed with non-retryable code");
                return Err(err.into());
            }
            Err(err) => {
                attempt += 1;
                if attempt >= RETRY_ATTEMPTS {
                    return Err(ClientError::RetriesExhausted {
                        attempts: attempt,
                        source: err,
                    });
                }
                let delay = backoff::full_jitter(attempt - 1, retry_base);
                tracing::debug!(attempt, ?delay, error = %err, "token fetch failed; retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
