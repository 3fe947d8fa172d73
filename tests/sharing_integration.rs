use async_trait::async_trait;
use mealplan_core::cache::ResponseCache;
use mealplan_core::library::context::{RequestContext, User};
use mealplan_core::library::sharing::{self, AcceptOutcome, Invitation, ShareOutcome};
use mealplan_core::mail::Mailer;
use mealplan_core::model::ShareToken;
use mealplan_core::store::key::{Key, Kind};
use mealplan_core::store::{self, Store};
use mealplan_core::{PlannerError, PlannerResult};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, _from: &str, to: &str, _subject: &str, body: &str) -> PlannerResult<()> {
        self.sent.lock().unwrap().push((to.to_string(), body.to_string()));
        Ok(())
    }
}

struct BrokenMailer;

#[async_trait]
impl Mailer for BrokenMailer {
    async fn send(&self, _from: &str, _to: &str, _subject: &str, _body: &str) -> PlannerResult<()> {
        Err(PlannerError::Mail("relay unreachable".into()))
    }
}

fn invitation(mailer: &dyn Mailer) -> Invitation<'_> {
    Invitation {
        mailer,
        from: "noreply@example.com",
        base_url: "http://planner.test",
        ttl_days: 30,
    }
}

async fn context(store: &Store, cache: &Arc<ResponseCache>, uid: &str) -> PlannerResult<RequestContext> {
    RequestContext::resolve(store, cache, User::new(uid, format!("{uid}@example.com")), None).await
}

async fn share_token(ctx: &RequestContext, mailer: &RecordingMailer, access: &str) -> PlannerResult<Key> {
    match sharing::issue(ctx, &invitation(mailer), access, "bob@example.com").await? {
        ShareOutcome::Sent { token } => Ok(token),
        other => panic!("share not sent: {other:?}"),
    }
}

#[tokio::test]
async fn read_only_share_round_trip() -> PlannerResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let store = Store::open(tmpdir.path()).await?;
    let cache = Arc::new(ResponseCache::new());
    let mailer = RecordingMailer::default();

    let alice = context(&store, &cache, "alice").await?;
    let token = share_token(&alice, &mailer, "read").await?;

    {
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "bob@example.com");
        assert!(sent[0].1.contains(&format!("http://planner.test/shareAccept/{token}")));
    }

    let bob = context(&store, &cache, "bob").await?;
    let outcome = sharing::accept(&bob, &token.encode()).await?;
    assert_eq!(
        outcome,
        AcceptOutcome::Accepted {
            library: alice.library_key.clone()
        }
    );

    let bob = context(&store, &cache, "bob").await?;
    assert_eq!(bob.library_key, alice.library_key);
    assert!(bob.read_only);
    assert!(!bob.is_owner());
    assert!(matches!(bob.ensure_writable(), Err(PlannerError::PermissionDenied)));

    // only the owner can pass the library on
    assert!(matches!(
        sharing::issue(&bob, &invitation(&mailer), "write", "carol@example.com").await,
        Err(PlannerError::PermissionDenied)
    ));

    // tokens are single use
    assert!(matches!(
        sharing::accept(&bob, &token.encode()).await?,
        AcceptOutcome::Expired { .. }
    ));

    let listing = sharing::libraries(&bob).await?;
    assert_eq!(listing.len(), 2);
    assert!(listing[0].owner && !listing[0].current);
    assert!(listing[1].current && listing[1].read_only);
    assert_eq!(listing[1].id, alice.library_key);

    Ok(())
}

#[tokio::test]
async fn accepting_again_replaces_the_permission() -> PlannerResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let store = Store::open(tmpdir.path()).await?;
    let cache = Arc::new(ResponseCache::new());
    let mailer = RecordingMailer::default();

    let alice = context(&store, &cache, "alice").await?;
    let bob = context(&store, &cache, "bob").await?;

    let read = share_token(&alice, &mailer, "read").await?;
    sharing::accept(&bob, &read.encode()).await?;
    let write = share_token(&alice, &mailer, "write").await?;
    sharing::accept(&bob, &write.encode()).await?;

    assert_eq!(store.count(Kind::Permission).await?, 1);
    let bob = context(&store, &cache, "bob").await?;
    assert!(!bob.read_only);
    Ok(())
}

#[tokio::test]
async fn failed_delivery_withdraws_the_token() -> PlannerResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let store = Store::open(tmpdir.path()).await?;
    let cache = Arc::new(ResponseCache::new());
    let alice = context(&store, &cache, "alice").await?;

    let outcome = sharing::issue(&alice, &invitation(&BrokenMailer), "read", "bob@example.com").await?;
    match outcome {
        ShareOutcome::MailFailed { message } => {
            assert!(message.starts_with("Failed to send an email message to 'bob@example.com'."));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(store.count(Kind::Share).await?, 0);
    Ok(())
}

#[tokio::test]
async fn bad_and_stale_tokens_are_refused() -> PlannerResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let store = Store::open(tmpdir.path()).await?;
    let cache = Arc::new(ResponseCache::new());
    let alice = context(&store, &cache, "alice").await?;
    let bob = context(&store, &cache, "bob").await?;

    assert!(matches!(
        sharing::accept(&bob, "not a key").await?,
        AcceptOutcome::InvalidToken { .. }
    ));
    assert!(matches!(
        sharing::accept(&bob, &alice.library_key.encode()).await?,
        AcceptOutcome::InvalidToken { .. }
    ));

    let stale = {
        let mut conn = store.acquire().await?;
        let token = ShareToken {
            expiration_date: 0,
            read_only: false,
        };
        store::put(&mut conn, &Key::incomplete(Kind::Share, Some(&alice.library_key)), &token).await?
    };
    assert!(matches!(
        sharing::accept(&bob, &stale.encode()).await?,
        AcceptOutcome::Expired { .. }
    ));
    assert_eq!(store.count(Kind::Share).await?, 0);
    assert_eq!(store.count(Kind::Permission).await?, 0);
    Ok(())
}

#[tokio::test]
async fn switching_needs_a_permission() -> PlannerResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let store = Store::open(tmpdir.path()).await?;
    let cache = Arc::new(ResponseCache::new());
    let mailer = RecordingMailer::default();

    let alice = context(&store, &cache, "alice").await?;
    let bob = context(&store, &cache, "bob").await?;
    let carol = context(&store, &cache, "carol").await?;

    assert!(matches!(
        sharing::switch(&carol, &alice.library_key.encode()).await,
        Err(PlannerError::PermissionDenied)
    ));

    let token = share_token(&alice, &mailer, "write").await?;
    sharing::accept(&bob, &token.encode()).await?;

    // back to the own library, then over to the shared one again
    sharing::switch(&bob, &bob.own.key.encode()).await?;
    let home = context(&store, &cache, "bob").await?;
    assert_eq!(home.library_key, bob.own.key);

    sharing::switch(&home, &alice.library_key.encode()).await?;
    let away = context(&store, &cache, "bob").await?;
    assert_eq!(away.library_key, alice.library_key);
    Ok(())
}

#[tokio::test]
async fn deleted_library_drops_stale_preferences() -> PlannerResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let store = Store::open(tmpdir.path()).await?;
    let cache = Arc::new(ResponseCache::new());
    let mailer = RecordingMailer::default();

    let alice = context(&store, &cache, "alice").await?;
    let bob = context(&store, &cache, "bob").await?;
    let token = share_token(&alice, &mailer, "write").await?;
    sharing::accept(&bob, &token.encode()).await?;

    sharing::delete_library(&alice).await?;
    assert_eq!(store.count(Kind::Permission).await?, 0);

    let bob = context(&store, &cache, "bob").await?;
    assert_eq!(bob.library_key, bob.own.key);
    assert!(bob.own.library.user_preferred_library.is_none());
    Ok(())
}
