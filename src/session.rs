// Session state for the remote service: one bearer token per account with a
// hard expiry. The token is the only mutable state shared between callers
// and it never leaves this module except by value.

use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::response::RemoteResult;

// Account credentials for the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account: String,
    pub secret: String,
    pub ws_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub account: String,
}

impl Session {
    // A session is unusable from the instant its expiry is reached.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    // Short prefix for log output; the full token must never be logged.
    pub fn redacted_token(&self) -> String {
        let prefix: String = self.token.chars().take(6).collect();
        format!("{prefix}…")
    }
}

// Holds the current session and serializes its renewal: the lock spans the
// issuance await, so concurrent callers that both find the session absent or
// expired trigger exactly one remote issuance and share its result.
#[derive(Debug, Default)]
pub struct SessionManager {
    current: Mutex<Option<Session>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    // Returns the held session if its expiry is still in the future,
    // otherwise drives `issue` and stores the fresh session. The slot is
    // written only after a successful issuance, so a failed or cancelled
    // renewal leaves the prior state untouched.
    pub async fn ensure_valid_token<F, Fut>(&self, issue: F) -> RemoteResult<Session>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RemoteResult<Session>>,
    {
        let mut current = self.current.lock().await;
        if let Some(session) = current.as_ref() {
            if !session.is_expired_at(Utc::now()) {
                return Ok(session.clone());
            }
        }

        let fresh = issue().await?;
        tracing::debug!(
            account = %fresh.account,
            token = %fresh.redacted_token(),
            "session renewed"
        );
        *current = Some(fresh.clone());
        Ok(fresh)
    }

    // Stores a session obtained outside of `ensure_valid_token`.
    pub async fn replace(&self, session: Session) {
        *self.current.lock().await = Some(session);
    }

    // Clears the held session so the next call re-issues. Called after the
    // remote side rejects the current token or credentials.
    pub async fn invalidate(&self) {
        let mut current = self.current.lock().await;
        if let Some(session) = current.take() {
            tracing::debug!(account = %session.account, "session invalidated");
        }
    }

    pub async fn current(&self) -> Option<Session> {
        self.current.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ServiceError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn session_expiring_in(seconds: i64) -> Session {
        Session {
            token: "TOK123456".to_string(),
            expires_at: Utc::now() + chrono::Duration::seconds(seconds),
            account: "ACME".to_string(),
        }
    }

    #[tokio::test]
    async fn test_issues_when_no_session_held() {
        let manager = SessionManager::new();
        let issued = AtomicUsize::new(0);

        let session = manager
            .ensure_valid_token(|| async {
                issued.fetch_add(1, Ordering::SeqCst);
                Ok(session_expiring_in(3600))
            })
            .await
            .unwrap();

        assert_eq!(issued.load(Ordering::SeqCst), 1);
        assert_eq!(session.token, "TOK123456");
        assert_eq!(manager.current().await, Some(session));
    }

    #[tokio::test]
    async fn test_reuses_unexpired_session() {
        let manager = SessionManager::new();
        manager.replace(session_expiring_in(3600)).await;
        let issued = AtomicUsize::new(0);

        let session = manager
            .ensure_valid_token(|| async {
                issued.fetch_add(1, Ordering::SeqCst);
                Ok(session_expiring_in(7200))
            })
            .await
            .unwrap();

        assert_eq!(issued.load(Ordering::SeqCst), 0);
        assert_eq!(session.token, "TOK123456");
    }

    #[tokio::test]
    async fn test_expired_session_triggers_renewal() {
        let manager = SessionManager::new();
        manager.replace(session_expiring_in(-1)).await;
        let issued = AtomicUsize::new(0);

        manager
            .ensure_valid_token(|| async {
                issued.fetch_add(1, Ordering::SeqCst);
                Ok(session_expiring_in(3600))
            })
            .await
            .unwrap();

        assert_eq!(issued.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expiry_equal_to_now_counts_as_expired() {
        let session = session_expiring_in(0);
        assert!(session.is_expired_at(session.expires_at));
    }

    #[tokio::test]
    async fn test_invalidate_forces_reissue() {
        let manager = SessionManager::new();
        manager.replace(session_expiring_in(3600)).await;
        manager.invalidate().await;
        assert_eq!(manager.current().await, None);

        let issued = AtomicUsize::new(0);
        manager
            .ensure_valid_token(|| async {
                issued.fetch_add(1, Ordering::SeqCst);
                Ok(session_expiring_in(3600))
            })
            .await
            .unwrap();

        assert_eq!(issued.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_issuance_leaves_no_session() {
        let manager = SessionManager::new();

        let result = manager
            .ensure_valid_token(|| async {
                Err(ServiceError::Transport("connection reset".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(manager.current().await, None);
    }

    #[tokio::test]
    async fn test_concurrent_ensure_issues_once() {
        let manager = Arc::new(SessionManager::new());
        let issued = Arc::new(AtomicUsize::new(0));

        let ensure = |manager: Arc<SessionManager>, issued: Arc<AtomicUsize>| async move {
            manager
                .ensure_valid_token(|| async {
                    issued.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(session_expiring_in(3600))
                })
                .await
                .unwrap()
        };

        let (a, b) = tokio::join!(
            tokio::spawn(ensure(Arc::clone(&manager), Arc::clone(&issued))),
            tokio::spawn(ensure(Arc::clone(&manager), Arc::clone(&issued))),
        );

        assert_eq!(issued.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap().token, b.unwrap().token);
    }

    #[test]
    fn test_redacted_token_keeps_only_a_prefix() {
        let session = Session {
            token: "SECRETTOKENVALUE".to_string(),
            expires_at: Utc::now(),
            account: "ACME".to_string(),
        };

        let redacted = session.redacted_token();

        assert!(redacted.starts_with("SECRET"));
        assert!(!redacted.contains("TOKENVALUE"));
    }
}
