use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cms_portal::{
    AuthError, InMemoryRepository, MockNotifier, PasswordResets, StoreError,
    crypto,
    models::{NewUser, ResetRecord},
    repository::{CredentialStore, ResetTokenStore},
    reset::ResetTokenState,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const EMAIL: &str = "ada@example.com";

async fn fixture(notifier: MockNotifier) -> (Arc<InMemoryRepository>, PasswordResets) {
    let repo = Arc::new(InMemoryRepository::new());
    repo.create_user(NewUser {
        name: "Ada".to_string(),
        email: EMAIL.to_string(),
        password_hash: crypto::hash_password("old-password").await.unwrap(),
        is_admin: false,
    })
    .await
    .unwrap();
    let resets = PasswordResets::new(
        repo.clone(),
        repo.clone(),
        Arc::new(notifier),
        Duration::from_secs(3600),
    );
    (repo, resets)
}

async fn current_hash(repo: &InMemoryRepository) -> String {
    repo.find_by_email(EMAIL).await.unwrap().unwrap().password_hash
}

#[tokio::test]
async fn test_request_reset_emits_notice_for_known_email() {
    let notifier = MockNotifier::new();
    let (repo, resets) = fixture(notifier.clone()).await;

    resets.request_reset(EMAIL).await.unwrap();

    let sent = notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].email, EMAIL);
    // Only the digest is persisted.
    let record = repo.find_reset(EMAIL).await.unwrap().unwrap();
    assert_eq!(record.token_hash, crypto::token_digest(&sent[0].reset_token));
    assert!(record.consumed_at.is_none());
}

#[tokio::test]
async fn test_request_reset_for_unknown_email_is_silent() {
    let notifier = MockNotifier::new();
    let (_, resets) = fixture(notifier.clone()).await;

    resets.request_reset("nobody@example.com").await.unwrap();

    assert!(notifier.sent().await.is_empty());
}

#[tokio::test]
async fn test_notifier_failure_surfaces_as_internal() {
    let (_, resets) = fixture(MockNotifier::new_failing()).await;

    let result = resets.request_reset(EMAIL).await;

    assert!(matches!(result, Err(AuthError::Internal(_))));
}

#[tokio::test]
async fn test_complete_reset_changes_password_once() {
    let notifier = MockNotifier::new();
    let (repo, resets) = fixture(notifier.clone()).await;
    resets.request_reset(EMAIL).await.unwrap();
    let token = notifier.last_token_for(EMAIL).await.unwrap();

    assert_eq!(resets.inspect(EMAIL, &token).await.unwrap(), ResetTokenState::Valid);
    resets
        .complete_reset(EMAIL, &token, "new-password")
        .await
        .unwrap();

    let hash = current_hash(&repo).await;
    assert!(crypto::verify_password(&hash, "new-password").await);
    assert!(!crypto::verify_password(&hash, "old-password").await);

    let again = resets.complete_reset(EMAIL, &token, "third-password").await;
    assert!(matches!(
        again,
        Err(AuthError::ResetToken(ResetTokenState::Consumed))
    ));
    assert!(crypto::verify_password(&current_hash(&repo).await, "new-password").await);
}

#[tokio::test]
async fn test_wrong_token_is_invalid_and_changes_nothing() {
    let notifier = MockNotifier::new();
    let (repo, resets) = fixture(notifier).await;
    resets.request_reset(EMAIL).await.unwrap();
    let before = current_hash(&repo).await;

    let result = resets.complete_reset(EMAIL, "invalid-token", "new-password").await;

    assert!(matches!(
        result,
        Err(AuthError::ResetToken(ResetTokenState::Invalid))
    ));
    assert_eq!(current_hash(&repo).await, before);
}

#[tokio::test]
async fn test_no_outstanding_request_is_invalid() {
    let (_, resets) = fixture(MockNotifier::new()).await;

    assert_eq!(
        resets.inspect(EMAIL, "anything").await.unwrap(),
        ResetTokenState::Invalid
    );
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let (repo, resets) = fixture(MockNotifier::new()).await;
    let token = "old-reset-token";
    repo.put_reset(ResetRecord {
        email: EMAIL.to_string(),
        token_hash: crypto::token_digest(token),
        created_at: Utc::now() - ChronoDuration::hours(2),
        consumed_at: None,
    })
    .await
    .unwrap();

    let result = resets.complete_reset(EMAIL, token, "new-password").await;

    assert!(matches!(
        result,
        Err(AuthError::ResetToken(ResetTokenState::Expired))
    ));
}

#[tokio::test]
async fn test_new_request_replaces_previous_token() {
    let notifier = MockNotifier::new();
    let (_, resets) = fixture(notifier.clone()).await;
    resets.request_reset(EMAIL).await.unwrap();
    let first = notifier.last_token_for(EMAIL).await.unwrap();
    resets.request_reset(EMAIL).await.unwrap();
    let second = notifier.last_token_for(EMAIL).await.unwrap();

    assert_eq!(resets.inspect(EMAIL, &first).await.unwrap(), ResetTokenState::Invalid);
    assert_eq!(resets.inspect(EMAIL, &second).await.unwrap(), ResetTokenState::Valid);
}

#[tokio::test]
async fn test_racing_completions_have_one_winner() {
    let notifier = MockNotifier::new();
    let (_, resets) = fixture(notifier.clone()).await;
    resets.request_reset(EMAIL).await.unwrap();
    let token = notifier.last_token_for(EMAIL).await.unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let resets = resets.clone();
            let token = token.clone();
            tokio::spawn(async move {
                resets
                    .complete_reset(EMAIL, &token, &format!("password-{i}"))
                    .await
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => winners += 1,
            Err(AuthError::ResetToken(ResetTokenState::Consumed)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_reset_email_is_matched_case_insensitively() {
    let notifier = MockNotifier::new();
    let (repo, resets) = fixture(notifier.clone()).await;

    resets.request_reset(" ADA@Example.com").await.unwrap();
    let token = notifier.last_token_for(EMAIL).await.unwrap();
    resets
        .complete_reset("Ada@example.COM", &token, "new-password")
        .await
        .unwrap();

    assert!(crypto::verify_password(&current_hash(&repo).await, "new-password").await);
}

// --- Record Replaced Mid-Reset ---

// Delegates to the in-memory store; the first lookup also swaps in a newer
// record, as if a second reset request landed right after it.
struct ReplacedAfterLookup {
    inner: Arc<InMemoryRepository>,
    replacement: Mutex<Option<ResetRecord>>,
}

#[async_trait]
impl ResetTokenStore for ReplacedAfterLookup {
    async fn put_reset(&self, record: ResetRecord) -> Result<(), StoreError> {
        self.inner.put_reset(record).await
    }

    async fn find_reset(&self, email: &str) -> Result<Option<ResetRecord>, StoreError> {
        let found = self.inner.find_reset(email).await?;
        let next = self.replacement.lock().unwrap().take();
        if let Some(record) = next {
            self.inner.put_reset(record).await?;
        }
        Ok(found)
    }

    async fn consume_reset(
        &self,
        email: &str,
        token_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner.consume_reset(email, token_hash, at).await
    }
}

fn reset_record(token: &str) -> ResetRecord {
    ResetRecord {
        email: EMAIL.to_string(),
        token_hash: crypto::token_digest(token),
        created_at: Utc::now(),
        consumed_at: None,
    }
}

#[tokio::test]
async fn test_superseded_token_cannot_consume_its_replacement() {
    let (repo, _) = fixture(MockNotifier::new()).await;
    repo.put_reset(reset_record("first-token")).await.unwrap();
    let store = Arc::new(ReplacedAfterLookup {
        inner: repo.clone(),
        replacement: Mutex::new(Some(reset_record("second-token"))),
    });
    let resets = PasswordResets::new(
        repo.clone(),
        store,
        Arc::new(MockNotifier::new()),
        Duration::from_secs(3600),
    );
    let before = current_hash(&repo).await;

    let result = resets
        .complete_reset(EMAIL, "first-token", "hijacked-password")
        .await;

    assert!(matches!(
        result,
        Err(AuthError::ResetToken(ResetTokenState::Invalid))
    ));
    assert_eq!(current_hash(&repo).await, before);
    assert_eq!(
        resets.inspect(EMAIL, "second-token").await.unwrap(),
        ResetTokenState::Valid
    );
}
