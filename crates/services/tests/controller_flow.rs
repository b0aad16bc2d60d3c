use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use crosspoint_core::QuizBank;
use crosspoint_core::model::{
    Category, PassingThreshold, Question, QuestionDraft, QuestionError, QuestionId,
    QuestionStatus, UserId, VerifiedCategorySet,
};
use crosspoint_core::time::fixed_clock;
use services::{
    AppConfig, ConfigError, ConfigKey, ControllerError, FatalError, FeedService, IdentityError,
    IdentityProvider, LocalIdentityProvider, PostError, Screen, SessionController,
    VerificationService, View,
};
use storage::{
    InMemoryRepository, Listener, NewQuestionRecord, QuestionRepository, Storage, StorageError,
    Subscription, VerificationPatch, VerificationRepository,
};
use tokio::sync::Notify;

fn wire(
    identity: Arc<dyn IdentityProvider>,
    questions: Arc<dyn QuestionRepository>,
    repo: &InMemoryRepository,
) -> SessionController {
    let feed = FeedService::new(fixed_clock(), Arc::new(QuizBank::builtin()), questions);
    let verification = VerificationService::new(PassingThreshold::default(), Arc::new(repo.clone()));
    SessionController::new(identity, feed, verification, Duration::ZERO)
}

fn controller(repo: &InMemoryRepository) -> SessionController {
    wire(
        Arc::new(LocalIdentityProvider::new()),
        Arc::new(repo.clone()),
        repo,
    )
}

fn draft(title: &str, body: &str, category: &str) -> QuestionDraft {
    QuestionDraft::new(title, body, category)
}

#[tokio::test]
async fn loading_comes_first_then_the_feed() {
    let repo = InMemoryRepository::with_clock(fixed_clock());
    let ctrl = controller(&repo);
    assert_eq!(ctrl.render(), Screen::Loading);
    assert!(matches!(
        ctrl.show_post(),
        Err(ControllerError::NotReady(_))
    ));

    ctrl.bootstrap(None).await.unwrap();
    let Screen::Feed(feed) = ctrl.render() else {
        panic!("ready session shows the feed");
    };
    assert!(feed.cards.is_empty());
    assert!(feed.user.display_name().starts_with("User-"));
    assert_eq!(feed.quiz_categories.len(), QuizBank::builtin().len());
    assert_eq!(ctrl.live_subscriptions(), 3);
}

#[tokio::test]
async fn identity_failure_is_sticky_and_replaces_the_ui() {
    let repo = InMemoryRepository::with_clock(fixed_clock());
    let provider = Arc::new(LocalIdentityProvider::without_anonymous());
    provider.register_token("tok", UserId::new("u-1").unwrap(), Some("Ada"));
    let ctrl = wire(provider, Arc::new(repo.clone()), &repo);

    let err = ctrl.bootstrap(None).await.unwrap_err();
    let expected = FatalError::Identity(IdentityError::AnonymousAuthDisabled);
    assert_eq!(err, ControllerError::Fatal(expected.clone()));
    assert_eq!(
        ctrl.render(),
        Screen::Fatal {
            message: expected.user_message()
        }
    );

    // A later valid sign-in does not clear the fatal state.
    assert!(ctrl.bootstrap(Some("tok")).await.is_err());
    assert!(matches!(ctrl.render(), Screen::Fatal { .. }));
    assert_eq!(repo.live_subscriptions(), 0);
}

#[tokio::test]
async fn invalid_token_is_reported_as_such() {
    let repo = InMemoryRepository::with_clock(fixed_clock());
    let ctrl = controller(&repo);
    let err = ctrl.bootstrap(Some("forged")).await.unwrap_err();
    assert_eq!(
        err,
        ControllerError::Fatal(FatalError::Identity(IdentityError::InvalidToken))
    );
}

#[tokio::test]
async fn missing_configuration_names_every_key() {
    let err = AppConfig::from_lookup(|key| {
        (key == "CROSSPOINT_API_KEY").then(|| "key".to_string())
    })
    .unwrap_err();
    let ConfigError::Missing(keys) = &err else {
        panic!("expected missing keys");
    };
    assert_eq!(keys.len(), 5);
    assert!(!keys.contains(&ConfigKey::ApiKey));

    let repo = InMemoryRepository::with_clock(fixed_clock());
    let ctrl = controller(&repo);
    ctrl.fail(FatalError::Config(err));
    let Screen::Fatal { message } = ctrl.render() else {
        panic!("config errors are fatal");
    };
    assert!(message.contains("CROSSPOINT_PROJECT_ID"));
}

#[tokio::test]
async fn feed_lists_newest_first_with_answer_permissions() {
    let repo = InMemoryRepository::with_clock(fixed_clock());
    let ctrl = controller(&repo);
    let me = ctrl.bootstrap(None).await.unwrap();

    for (title, category) in [("t1", "Physics"), ("t2", "Biology"), ("t3", "General")] {
        ctrl.show_post().unwrap();
        ctrl.post_question(&draft(title, "Body", category))
            .await
            .unwrap();
        assert_eq!(ctrl.view(), View::Feed);
    }
    repo.merge_verification(VerificationPatch {
        user_id: me.user_id().clone(),
        display_name: None,
        add_categories: vec![Category::new("Biology").unwrap()],
    })
    .await
    .unwrap();

    let Screen::Feed(feed) = ctrl.render() else {
        panic!("feed expected");
    };
    let titles: Vec<&str> = feed.cards.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["t3", "t2", "t1"]);
    let answerable: Vec<bool> = feed.cards.iter().map(|c| c.can_answer).collect();
    assert_eq!(answerable, vec![true, true, false]);
    assert!(feed.cards.iter().all(|c| c.mine));
    assert_eq!(feed.verified, vec![Category::new("Biology").unwrap()]);
}

#[derive(Default)]
struct CountingFeed {
    inner: InMemoryRepository,
    inserts: AtomicUsize,
    gate: Option<Notify>,
}

#[async_trait]
impl QuestionRepository for CountingFeed {
    async fn insert_question(
        &self,
        question: NewQuestionRecord,
    ) -> Result<QuestionId, StorageError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.inner.insert_question(question).await
    }

    async fn recent_questions(&self, limit: usize) -> Result<Vec<Question>, StorageError> {
        self.inner.recent_questions(limit).await
    }

    async fn subscribe_recent(
        &self,
        limit: usize,
        listener: Listener<Vec<Question>>,
    ) -> Subscription {
        self.inner.subscribe_recent(limit, listener).await
    }
}

#[tokio::test]
async fn empty_body_is_rejected_without_a_write() {
    let repo = InMemoryRepository::with_clock(fixed_clock());
    let feed = Arc::new(CountingFeed::default());
    let ctrl = wire(Arc::new(LocalIdentityProvider::new()), feed.clone(), &repo);
    ctrl.bootstrap(None).await.unwrap();
    ctrl.show_post().unwrap();

    let err = ctrl
        .post_question(&draft("Why is the sky blue?", "   ", "Physics"))
        .await
        .unwrap_err();
    assert_eq!(err, ControllerError::Post(PostError::Invalid(QuestionError::EmptyBody)));
    assert_eq!(feed.inserts.load(Ordering::SeqCst), 0);

    let Screen::Post(post) = ctrl.render() else {
        panic!("a failed post stays on the post view");
    };
    assert_eq!(post.error.as_deref(), Some("question body cannot be empty"));
    assert!(!post.posting);
}

#[tokio::test]
async fn posting_is_not_gated_by_verification() {
    let repo = InMemoryRepository::with_clock(fixed_clock());
    let ctrl = controller(&repo);
    ctrl.bootstrap(None).await.unwrap();
    assert!(!ctrl.can_answer(&Category::new("Physics").unwrap()));
    ctrl.post_question(&draft("Title", "Body", "Physics"))
        .await
        .unwrap();
    assert_eq!(repo.recent_questions(50).await.unwrap().len(), 1);
}

#[tokio::test]
async fn second_post_while_one_is_pending_is_refused() {
    let repo = InMemoryRepository::with_clock(fixed_clock());
    let feed = Arc::new(CountingFeed {
        gate: Some(Notify::new()),
        ..CountingFeed::default()
    });
    let ctrl = Arc::new(wire(
        Arc::new(LocalIdentityProvider::new()),
        feed.clone(),
        &repo,
    ));
    ctrl.bootstrap(None).await.unwrap();
    ctrl.show_post().unwrap();

    let poster = Arc::clone(&ctrl);
    let first =
        tokio::spawn(async move { poster.post_question(&draft("First", "Body", "General")).await });
    while feed.inserts.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    assert_eq!(
        ctrl.post_question(&draft("Second", "Body", "General")).await,
        Err(ControllerError::Post(PostError::InFlight))
    );
    let Screen::Post(post) = ctrl.render() else {
        panic!("post view expected");
    };
    assert!(post.posting);

    if let Some(gate) = &feed.gate {
        gate.notify_one();
    }
    first.await.unwrap().unwrap();
    assert_eq!(feed.inserts.load(Ordering::SeqCst), 1);
    assert_eq!(ctrl.view(), View::Feed);
}

struct BrokenFeed;

#[async_trait]
impl QuestionRepository for BrokenFeed {
    async fn insert_question(
        &self,
        _question: NewQuestionRecord,
    ) -> Result<QuestionId, StorageError> {
        Err(StorageError::Connection("offline".into()))
    }

    async fn recent_questions(&self, _limit: usize) -> Result<Vec<Question>, StorageError> {
        Err(StorageError::Connection("offline".into()))
    }

    async fn subscribe_recent(
        &self,
        _limit: usize,
        listener: Listener<Vec<Question>>,
    ) -> Subscription {
        listener.fail(&StorageError::PermissionDenied("feed".into()));
        Subscription::detached()
    }
}

#[tokio::test]
async fn feed_failures_surface_as_banners_not_fatal_errors() {
    let repo = InMemoryRepository::with_clock(fixed_clock());
    let ctrl = wire(
        Arc::new(LocalIdentityProvider::new()),
        Arc::new(BrokenFeed),
        &repo,
    );
    let me = ctrl.bootstrap(None).await.unwrap();

    let Screen::Feed(feed) = ctrl.render() else {
        panic!("subscription errors are not fatal");
    };
    assert_eq!(feed.banners.len(), 1);
    let banner = feed.banners[0].clone();
    assert!(banner.message.contains("permission denied"));

    // The verification feed keeps working.
    repo.merge_verification(VerificationPatch {
        user_id: me.user_id().clone(),
        display_name: None,
        add_categories: vec![Category::new("Physics").unwrap()],
    })
    .await
    .unwrap();
    assert!(ctrl.can_answer(&Category::new("Physics").unwrap()));

    // Write failures stay local to the post view.
    ctrl.show_post().unwrap();
    let err = ctrl
        .post_question(&draft("Title", "Body", "General"))
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::Post(PostError::Storage(_))));
    assert!(ctrl.fatal().is_none());

    assert!(ctrl.dismiss_banner(banner.id));
    let Screen::Post(post) = ctrl.render() else {
        panic!("post view expected");
    };
    assert!(post.banners.is_empty());
    assert!(post.error.is_some());
}

#[tokio::test]
async fn sign_out_releases_every_subscription() {
    let repo = InMemoryRepository::with_clock(fixed_clock());
    let ctrl = controller(&repo);
    ctrl.bootstrap(None).await.unwrap();
    ctrl.start_quiz("Physics").unwrap();
    assert_eq!(repo.live_subscriptions(), 2);

    ctrl.sign_out().await;
    assert_eq!(repo.live_subscriptions(), 0);
    assert_eq!(ctrl.live_subscriptions(), 0);
    assert!(ctrl.identity().is_none());
    assert_eq!(ctrl.render(), Screen::Loading);

    // Writes made while signed out show up once a session is back.
    repo.insert_question(NewQuestionRecord {
        title: "late".into(),
        body: "Body".into(),
        author_id: UserId::new("someone").unwrap(),
        category: Category::general(),
        status: QuestionStatus::Open,
        created_at_ms: 0,
    })
    .await
    .unwrap();

    ctrl.bootstrap(None).await.unwrap();
    let Screen::Feed(feed) = ctrl.render() else {
        panic!("feed expected");
    };
    assert_eq!(feed.cards.len(), 1);
    assert_eq!(repo.live_subscriptions(), 2);
}

#[tokio::test]
async fn provider_sign_out_ends_the_session() {
    let repo = InMemoryRepository::with_clock(fixed_clock());
    let provider = LocalIdentityProvider::new();
    let ctrl = wire(Arc::new(provider.clone()), Arc::new(repo.clone()), &repo);
    ctrl.bootstrap(None).await.unwrap();

    provider.sign_out().await;
    assert!(ctrl.identity().is_none());
    assert_eq!(repo.live_subscriptions(), 0);
    assert_eq!(ctrl.render(), Screen::Loading);
}

#[tokio::test]
async fn provider_sign_in_moves_the_session_to_the_new_user() {
    let repo = InMemoryRepository::with_clock(fixed_clock());
    let provider = LocalIdentityProvider::new();
    provider.register_token("tok", UserId::new("bob").unwrap(), Some("Bob"));
    let ctrl = wire(Arc::new(provider.clone()), Arc::new(repo.clone()), &repo);
    let anonymous = ctrl.bootstrap(None).await.unwrap();

    let bob = provider.sign_in_with_token("tok").await.unwrap();
    assert_ne!(anonymous.user_id(), bob.user_id());
    tokio::time::timeout(Duration::from_secs(5), async {
        while ctrl
            .identity()
            .is_none_or(|current| current.user_id() != bob.user_id())
            || ctrl.live_subscriptions() < 3
        {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("session follows the provider to the new user");

    let Screen::Feed(feed) = ctrl.render() else {
        panic!("the new user lands on the feed");
    };
    assert_eq!(feed.user.display_name(), "Bob");
    assert_eq!(repo.live_subscriptions(), 2);
    ctrl.show_post().unwrap();
    ctrl.post_question(&draft("Title", "Body", "General"))
        .await
        .unwrap();
    let posted = repo.recent_questions(1).await.unwrap();
    assert_eq!(posted[0].author_id(), bob.user_id());
}

/// Keeps every listener it hands out, even after the caller lets go.
#[derive(Default)]
struct RetainingLedger {
    inner: InMemoryRepository,
    listeners: Mutex<Vec<Listener<Option<VerifiedCategorySet>>>>,
}

#[async_trait]
impl VerificationRepository for RetainingLedger {
    async fn get_verification(
        &self,
        user_id: &UserId,
    ) -> Result<Option<VerifiedCategorySet>, StorageError> {
        self.inner.get_verification(user_id).await
    }

    async fn merge_verification(
        &self,
        patch: VerificationPatch,
    ) -> Result<VerifiedCategorySet, StorageError> {
        self.inner.merge_verification(patch).await
    }

    async fn subscribe_verification(
        &self,
        _user_id: &UserId,
        listener: Listener<Option<VerifiedCategorySet>>,
    ) -> Subscription {
        self.listeners.lock().unwrap().push(listener);
        Subscription::detached()
    }
}

#[tokio::test]
async fn deliveries_to_a_released_session_are_ignored() {
    let repo = InMemoryRepository::with_clock(fixed_clock());
    let ledger = Arc::new(RetainingLedger::default());
    let feed = FeedService::new(
        fixed_clock(),
        Arc::new(QuizBank::builtin()),
        Arc::new(repo.clone()),
    );
    let verification = VerificationService::new(PassingThreshold::default(), ledger.clone());
    let ctrl = SessionController::new(
        Arc::new(LocalIdentityProvider::new()),
        feed,
        verification,
        Duration::ZERO,
    );

    ctrl.bootstrap(None).await.unwrap();
    ctrl.sign_out().await;
    let me = ctrl.bootstrap(None).await.unwrap();

    let physics = Category::new("Physics").unwrap();
    let verified = ledger
        .merge_verification(VerificationPatch {
            user_id: me.user_id().clone(),
            display_name: None,
            add_categories: vec![physics.clone()],
        })
        .await
        .unwrap();

    {
        let listeners = ledger.listeners.lock().unwrap();
        assert_eq!(listeners.len(), 2);
        listeners[0].deliver(Some(verified.clone()));
        listeners[0].fail(&StorageError::PermissionDenied("stale".into()));
    }
    assert!(!ctrl.can_answer(&physics));
    let Screen::Feed(screen) = ctrl.render() else {
        panic!("feed expected");
    };
    assert!(screen.verified.is_empty());
    assert!(screen.banners.is_empty());

    ledger.listeners.lock().unwrap()[1].deliver(Some(verified));
    assert!(ctrl.can_answer(&physics));
}

#[tokio::test]
async fn wiring_from_config_uses_its_limits() {
    let config = AppConfig::from_lookup(|key| match key {
        "CROSSPOINT_FEED_LIMIT" => Some("2".into()),
        "CROSSPOINT_REVEAL_DELAY_MS" => Some("0".into()),
        _ if ConfigKey::REQUIRED.iter().any(|k| k.env_var() == key) => Some("x".into()),
        _ => None,
    })
    .unwrap();
    let storage = Storage::in_memory(fixed_clock());
    let ctrl = SessionController::from_config(
        &config,
        Arc::new(LocalIdentityProvider::new()),
        &storage,
        Arc::new(QuizBank::builtin()),
        fixed_clock(),
    );
    ctrl.bootstrap(None).await.unwrap();
    for title in ["a", "b", "c"] {
        ctrl.post_question(&draft(title, "Body", "General"))
            .await
            .unwrap();
    }
    let Screen::Feed(feed) = ctrl.render() else {
        panic!("feed expected");
    };
    assert_eq!(feed.cards.len(), 2);
}
