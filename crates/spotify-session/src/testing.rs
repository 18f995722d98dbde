//! Test doubles shared by the manager and client tests

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::Secret;
use spotify_auth::{
    Credential, Error, GrantRequest, OAuthConfig, Result, TokenExchanger, unix_millis,
};

/// How the fake token endpoint answers.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Issue,
    Reject,
    NetworkDown,
}

/// Counts grants and issues numbered tokens without touching the network.
pub struct FakeExchanger {
    calls: AtomicUsize,
    grants: Mutex<Vec<GrantRequest>>,
    delay: Duration,
    outcome: Outcome,
}

impl FakeExchanger {
    pub fn new(outcome: Outcome) -> Self {
        Self::with_delay(outcome, Duration::ZERO)
    }

    pub fn with_delay(outcome: Outcome, delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            grants: Mutex::new(Vec::new()),
            delay,
            outcome,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn grants(&self) -> Vec<GrantRequest> {
        self.grants.lock().unwrap().clone()
    }
}

impl TokenExchanger for FakeExchanger {
    fn exchange(
        &self,
        grant: GrantRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Credential>> + Send + '_>> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.grants.lock().unwrap().push(grant.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.outcome {
                Outcome::Reject => Err(Error::GrantRejected(r#"{"error":"invalid_grant"}"#.into())),
                Outcome::NetworkDown => Err(Error::Network("connection refused".into())),
                Outcome::Issue => {
                    let (access_token, refresh_token) = match grant {
                        GrantRequest::AuthorizationCode { code, .. } => {
                            (format!("at_code_{code}"), Some("rt_code".to_string()))
                        }
                        GrantRequest::RefreshToken { refresh_token } => {
                            (format!("at_refreshed_{n}"), Some(refresh_token))
                        }
                    };
                    Ok(Credential::issue(
                        access_token,
                        refresh_token,
                        unix_millis(),
                        3600,
                    ))
                }
            }
        })
    }
}

pub fn test_config() -> OAuthConfig {
    OAuthConfig::new("client-id", Secret::new("client-secret".into()))
}

/// Credential that expired long ago.
pub fn expired_credential() -> Credential {
    Credential {
        access_token: "at_stale".into(),
        refresh_token: Some("rt_1".into()),
        expires_at: 0,
    }
}

/// Credential that won't expire during a test.
pub fn valid_credential() -> Credential {
    Credential {
        access_token: "at_valid".into(),
        refresh_token: Some("rt_1".into()),
        expires_at: unix_millis() + 3_600_000,
    }
}
