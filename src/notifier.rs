use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// ResetNotice
///
/// What a user needs to complete a password reset. Delivered out of band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetNotice {
    pub email: String,
    pub reset_token: String,
}

// 1. ResetNotifier Contract
/// ResetNotifier
///
/// Delivery channel for password-reset tokens. Swappable so that handlers and the
/// reset flow never depend on a concrete mail transport.
#[async_trait]
pub trait ResetNotifier: Send + Sync {
    async fn send_reset(&self, notice: ResetNotice) -> Result<(), String>;
}

// 2. Log-backed implementation
/// LogNotifier
///
/// Writes the notice to the tracing pipeline. The plaintext token is only
/// included when `reveal_token` is set, which `main` does for `Env::Local`.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier {
    reveal_token: bool,
}

impl LogNotifier {
    pub fn new(reveal_token: bool) -> Self {
        Self { reveal_token }
    }
}

#[async_trait]
impl ResetNotifier for LogNotifier {
    async fn send_reset(&self, notice: ResetNotice) -> Result<(), String> {
        if self.reveal_token {
            tracing::info!(email = %notice.email, token = %notice.reset_token, "password reset token issued");
        } else {
            tracing::info!(email = %notice.email, "password reset token issued");
        }
        Ok(())
    }
}

// 3. The Mock Implementation (For Tests)
/// MockNotifier
///
/// Records every notice so tests can read the issued token back.
#[derive(Clone, Default)]
pub struct MockNotifier {
    /// When true, every delivery fails.
    pub should_fail: bool,
    sent: Arc<Mutex<Vec<ResetNotice>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub async fn sent(&self) -> Vec<ResetNotice> {
        self.sent.lock().await.clone()
    }

    /// Token from the most recent notice addressed to `email`.
    pub async fn last_token_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|n| n.email == email)
            .map(|n| n.reset_token.clone())
    }
}

#[async_trait]
impl ResetNotifier for MockNotifier {
    async fn send_reset(&self, notice: ResetNotice) -> Result<(), String> {
        if self.should_fail {
            return Err("Mock Notifier Error: Simulation requested".to_string());
        }
        self.sent.lock().await.push(notice);
        Ok(())
    }
}

pub type NotifierState = Arc<dyn ResetNotifier>;
