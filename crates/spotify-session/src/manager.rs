//! Token lifecycle: authorization flow, lazy refresh, forced refresh
//!
//! All refreshes go through one guard. A caller that waited on the guard
//! re-reads the store before exchanging anything, so N concurrent callers
//! holding the same stale token produce exactly one refresh-token grant.
//! When that grant fails, callers that were already queued get the same
//! failure instead of each trying again.
//!
//! The exchange runs in a spawned task that owns the guard. Dropping the
//! caller's future (client disconnect, timeout) does not abort a refresh
//! half-way, so a rotated refresh token is never lost.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use spotify_auth::{
    AuthState, Credential, CredentialStore, Error, GrantRequest, OAuthConfig, Result,
    TokenExchanger, build_authorization_url, generate_state, state_matches, unix_millis,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How long an issued `state` stays redeemable.
pub const STATE_TTL: Duration = Duration::from_secs(600);

/// Most authorization requests awaiting their redirect. The oldest is
/// dropped when another is issued.
pub const MAX_PENDING_STATES: usize = 32;

/// Why a refresh was attempted. Used as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshReason {
    Expired,
    Rejected,
}

impl RefreshReason {
    fn label(self) -> &'static str {
        match self {
            RefreshReason::Expired => "expired",
            RefreshReason::Rejected => "rejected",
        }
    }
}

/// Outcome of the last completed refresh, guarded by the refresh lock.
#[derive(Default)]
struct RefreshCycle {
    last_failure: Option<Error>,
}

/// Owns the credential lifecycle for one user.
pub struct TokenManager {
    store: Arc<CredentialStore>,
    exchanger: Arc<dyn TokenExchanger>,
    config: OAuthConfig,
    refresh_guard: Arc<Mutex<RefreshCycle>>,
    /// Bumped each time a refresh exchange completes, while the guard is held.
    refresh_generation: Arc<AtomicU64>,
    /// Issued states, oldest first.
    pending_states: Mutex<VecDeque<(String, Instant)>>,
}

impl TokenManager {
    pub fn new(
        store: Arc<CredentialStore>,
        exchanger: Arc<dyn TokenExchanger>,
        config: OAuthConfig,
    ) -> Self {
        Self {
            store,
            exchanger,
            config,
            refresh_guard: Arc::new(Mutex::new(RefreshCycle::default())),
            refresh_generation: Arc::new(AtomicU64::new(0)),
            pending_states: Mutex::new(VecDeque::with_capacity(MAX_PENDING_STATES)),
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Current authentication state.
    pub async fn auth_state(&self) -> AuthState {
        self.store.state_at(unix_millis()).await
    }

    /// Issue a fresh `state` and return the provider URL to redirect the user to.
    pub async fn authorization_url(&self) -> Result<String> {
        let state = generate_state();
        let url = build_authorization_url(&self.config, &state)?;

        let mut pending = self.pending_states.lock().await;
        prune_expired(&mut pending);
        if pending.len() >= MAX_PENDING_STATES {
            pending.pop_front();
            debug!("pending authorization states full, dropped the oldest");
        }
        pending.push_back((state, Instant::now()));
        debug!(pending = pending.len(), "issued authorization state");
        Ok(url)
    }

    /// Complete the authorization flow with the parameters of the provider's
    /// redirect.
    ///
    /// The `state` must match one issued by [`Self::authorization_url`] and
    /// is consumed on match. No exchange happens when it doesn't.
    pub async fn begin_authorization_flow(
        &self,
        code: Option<&str>,
        state: Option<&str>,
    ) -> Result<()> {
        let state = state
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::AuthorizationDenied("missing state".into()))?;

        if !self.redeem_state(state).await {
            warn!("authorization redirect carried an unknown or expired state");
            return Err(Error::AuthorizationDenied(
                "state does not match an issued authorization request".into(),
            ));
        }

        let code = code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::AuthorizationDenied("missing authorization code".into()))?;

        let credential = self
            .exchanger
            .exchange(GrantRequest::AuthorizationCode {
                code: code.to_string(),
                redirect_uri: self.config.redirect_uri.clone(),
            })
            .await?;

        // Serialize with any refresh still in flight.
        let _guard = self.refresh_guard.lock().await;
        install(&self.store, credential).await;
        info!("authorization flow completed");
        Ok(())
    }

    /// Return an access token that is valid now, refreshing it first if it
    /// has expired.
    pub async fn ensure_fresh(&self) -> Result<String> {
        let credential = self.store.snapshot().await.ok_or(Error::NotAuthenticated)?;
        if !credential.is_expired_at(unix_millis()) {
            return Ok(credential.access_token);
        }
        debug!("access token expired, refreshing");
        self.refresh(credential.access_token, RefreshReason::Expired)
            .await
    }

    /// Refresh regardless of the recorded expiry because the resource API
    /// rejected `rejected_token`.
    ///
    /// Returns the current token without an exchange if another caller has
    /// already replaced `rejected_token`.
    pub async fn force_refresh(&self, rejected_token: &str) -> Result<String> {
        self.refresh(rejected_token.to_string(), RefreshReason::Rejected)
            .await
    }

    async fn refresh(&self, stale_token: String, reason: RefreshReason) -> Result<String> {
        let seen_generation = self.refresh_generation.load(Ordering::SeqCst);
        let mut cycle = Arc::clone(&self.refresh_guard).lock_owned().await;

        let current = self.store.snapshot().await.ok_or(Error::NotAuthenticated)?;
        if current.access_token != stale_token && !current.is_expired_at(unix_millis()) {
            debug!(
                reason = reason.label(),
                "credential already refreshed by a concurrent caller"
            );
            return Ok(current.access_token);
        }

        // A refresh finished while we were queued and it failed: share its error.
        if self.refresh_generation.load(Ordering::SeqCst) != seen_generation {
            if let Some(e) = &cycle.last_failure {
                debug!(reason = reason.label(), error = %e, "reusing concurrent refresh failure");
                return Err(e.clone());
            }
        }

        let Some(refresh_token) = current.refresh_token else {
            warn!("no refresh token stored, re-authorization required");
            record_refresh(reason, "failure");
            return Err(Error::RefreshFailed(Box::new(Error::NotAuthenticated)));
        };
        cycle.last_failure = None;

        let store = Arc::clone(&self.store);
        let exchanger = Arc::clone(&self.exchanger);
        let generation = Arc::clone(&self.refresh_generation);
        let task = tokio::spawn(async move {
            let outcome = match exchanger
                .exchange(GrantRequest::RefreshToken { refresh_token })
                .await
            {
                Ok(credential) => {
                    let access_token = credential.access_token.clone();
                    install(&store, credential).await;
                    info!(reason = reason.label(), "access token refreshed");
                    record_refresh(reason, "success");
                    Ok(access_token)
                }
                Err(e) => {
                    let e = Error::RefreshFailed(Box::new(e));
                    warn!(reason = reason.label(), error = %e, "token refresh failed");
                    record_refresh(reason, "failure");
                    Err(e)
                }
            };
            cycle.last_failure = outcome.as_ref().err().cloned();
            generation.fetch_add(1, Ordering::SeqCst);
            outcome
        });

        task.await.map_err(|e| Error::Aborted(e.to_string()))?
    }

    /// Remove `presented` from the pending set if it matches an unexpired entry.
    async fn redeem_state(&self, presented: &str) -> bool {
        let mut pending = self.pending_states.lock().await;
        prune_expired(&mut pending);

        match pending
            .iter()
            .position(|(issued, _)| state_matches(issued, presented))
        {
            Some(index) => {
                pending.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Drop expired states from the front; entries are in issue order.
fn prune_expired(pending: &mut VecDeque<(String, Instant)>) {
    while pending
        .front()
        .is_some_and(|(_, issued)| issued.elapsed() >= STATE_TTL)
    {
        pending.pop_front();
    }
}

/// Install a credential; a failed disk write keeps the in-memory copy.
async fn install(store: &CredentialStore, credential: Credential) {
    if let Err(e) = store.install(credential).await {
        warn!(error = %e, "failed to persist credential, keeping it in memory only");
    }
}

fn record_refresh(reason: RefreshReason, outcome: &'static str) {
    metrics::counter!(
        "spotify_token_refresh_total",
        "reason" => reason.label(),
        "outcome" => outcome,
    )
    .increment(1);
}
