use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use crosspoint_core::QuizBank;
use crosspoint_core::model::{Category, PassingThreshold, UserId, VerifiedCategorySet};
use crosspoint_core::time::fixed_clock;
use services::controller::QuizProgress;
use services::{
    ControllerError, FeedService, IdentityProvider, LocalIdentityProvider, QuizError, Screen,
    SessionController, VerificationError, VerificationService,
};
use storage::{
    InMemoryRepository, Listener, StorageError, Subscription, VerificationPatch,
    VerificationRepository,
};

fn bank() -> Arc<QuizBank> {
    Arc::new(QuizBank::builtin())
}

fn controller_with(
    verifications: Arc<dyn VerificationRepository>,
    repo: &InMemoryRepository,
    reveal_delay: Duration,
) -> SessionController {
    let identity: Arc<dyn IdentityProvider> = Arc::new(LocalIdentityProvider::new());
    let feed = FeedService::new(fixed_clock(), bank(), Arc::new(repo.clone()));
    let verification = VerificationService::new(PassingThreshold::default(), verifications);
    SessionController::new(identity, feed, verification, reveal_delay)
}

fn controller(repo: &InMemoryRepository) -> SessionController {
    controller_with(Arc::new(repo.clone()), repo, Duration::ZERO)
}

/// Options to pick for `category`, answering correctly where `pattern` is true.
fn choices(category: &str, pattern: &[bool]) -> Vec<String> {
    let questions = bank()
        .questions(&Category::new(category).unwrap())
        .unwrap();
    assert_eq!(questions.len(), pattern.len());
    questions
        .iter()
        .zip(pattern)
        .map(|(q, correct)| {
            if *correct {
                q.answer().to_string()
            } else {
                q.options()
                    .iter()
                    .find(|o| !q.is_correct(o))
                    .unwrap()
                    .clone()
            }
        })
        .collect()
}

async fn run_quiz(ctrl: &SessionController, category: &str, pattern: &[bool]) -> QuizProgress {
    ctrl.start_quiz(category).unwrap();
    let mut last = None;
    for choice in choices(category, pattern) {
        assert!(ctrl.select_option(&choice));
        last = Some(ctrl.submit_answer().await.unwrap());
    }
    last.unwrap()
}

#[tokio::test]
async fn physics_two_of_three_is_not_passed() {
    let repo = InMemoryRepository::with_clock(fixed_clock());
    let ctrl = controller(&repo);
    let me = ctrl.bootstrap(None).await.unwrap();

    let QuizProgress::Completed { verdict, .. } =
        run_quiz(&ctrl, "Physics", &[true, false, true]).await
    else {
        panic!("quiz should complete");
    };
    assert_eq!((verdict.result.score(), verdict.result.total()), (2, 3));
    assert!(!verdict.passed);
    assert!(repo.get_verification(me.user_id()).await.unwrap().is_none());
    assert!(!ctrl.can_answer(&Category::new("Physics").unwrap()));
}

#[tokio::test]
async fn financial_modeling_pass_is_union_merged() {
    let repo = InMemoryRepository::with_clock(fixed_clock());
    let ctrl = controller(&repo);
    let me = ctrl.bootstrap(None).await.unwrap();
    repo.merge_verification(VerificationPatch {
        user_id: me.user_id().clone(),
        display_name: None,
        add_categories: vec![Category::new("Biology").unwrap()],
    })
    .await
    .unwrap();

    let QuizProgress::Completed { verdict, reveal } =
        run_quiz(&ctrl, "Financial Modeling", &[true]).await
    else {
        panic!("quiz should complete");
    };
    assert!(reveal.correct);
    assert!(verdict.passed);

    let stored = repo.get_verification(me.user_id()).await.unwrap().unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.contains(&Category::new("Financial Modeling").unwrap()));
    assert!(ctrl.can_answer(&Category::new("Financial Modeling").unwrap()));

    let Screen::Feed(feed) = ctrl.render() else {
        panic!("completion returns to the feed");
    };
    assert!(feed.notice.unwrap().starts_with("Passed Financial Modeling"));

    // Retaking an already-verified category leaves the set unchanged.
    run_quiz(&ctrl, "Financial Modeling", &[true]).await;
    let again = repo.get_verification(me.user_id()).await.unwrap().unwrap();
    assert_eq!(again.len(), 2);
}

#[tokio::test]
async fn intermediate_answers_advance_to_the_next_question() {
    let repo = InMemoryRepository::with_clock(fixed_clock());
    let ctrl = controller(&repo);
    ctrl.bootstrap(None).await.unwrap();
    ctrl.start_quiz("Biology").unwrap();

    assert_eq!(ctrl.submit_answer().await, Err(QuizError::NoSelection.into()));

    let first = choices("Biology", &[true, true]).remove(0);
    ctrl.select_option(&first);
    let progress = ctrl.submit_answer().await.unwrap();
    assert!(matches!(progress, QuizProgress::Next { index: 1, .. }));

    let Screen::Quiz(quiz) = ctrl.render() else {
        panic!("still quizzing");
    };
    assert_eq!((quiz.index, quiz.score), (1, 1));
    assert!(quiz.selected.is_none());
    assert!(quiz.input_enabled);
}

#[derive(Default)]
struct FailingLedger {
    merges: AtomicUsize,
}

#[async_trait]
impl VerificationRepository for FailingLedger {
    async fn get_verification(
        &self,
        _user_id: &UserId,
    ) -> Result<Option<VerifiedCategorySet>, StorageError> {
        Ok(None)
    }

    async fn merge_verification(
        &self,
        _patch: VerificationPatch,
    ) -> Result<VerifiedCategorySet, StorageError> {
        self.merges.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::PermissionDenied("rules rejected write".into()))
    }

    async fn subscribe_verification(
        &self,
        _user_id: &UserId,
        listener: Listener<Option<VerifiedCategorySet>>,
    ) -> Subscription {
        listener.deliver(None);
        Subscription::detached()
    }
}

#[tokio::test]
async fn cancelling_during_reveal_writes_nothing() {
    let repo = InMemoryRepository::with_clock(fixed_clock());
    let ledger = Arc::new(FailingLedger::default());
    let ctrl = Arc::new(controller_with(
        ledger.clone(),
        &repo,
        Duration::from_secs(60),
    ));
    ctrl.bootstrap(None).await.unwrap();
    ctrl.start_quiz("Financial Modeling").unwrap();
    let answer = choices("Financial Modeling", &[true]).remove(0);
    assert!(ctrl.select_option(&answer));

    let submitter = Arc::clone(&ctrl);
    let pending = tokio::spawn(async move { submitter.submit_answer().await });
    loop {
        if let Screen::Quiz(quiz) = ctrl.render() {
            if !quiz.input_enabled {
                break;
            }
        }
        tokio::task::yield_now().await;
    }

    // Input is frozen while the answer is revealed.
    assert!(!ctrl.select_option("anything"));
    assert_eq!(
        ctrl.submit_answer().await,
        Err(ControllerError::Quiz(QuizError::NotAnswering))
    );

    assert!(ctrl.cancel_quiz());
    let progress = pending.await.unwrap().unwrap();
    assert!(matches!(progress, QuizProgress::Cancelled { .. }));
    assert_eq!(ledger.merges.load(Ordering::SeqCst), 0);
    assert!(matches!(ctrl.render(), Screen::Feed(_)));
}

#[tokio::test]
async fn failed_verification_write_is_distinct_from_failing_the_quiz() {
    let repo = InMemoryRepository::with_clock(fixed_clock());
    let ledger = Arc::new(FailingLedger::default());
    let ctrl = controller_with(ledger.clone(), &repo, Duration::ZERO);
    ctrl.bootstrap(None).await.unwrap();

    ctrl.start_quiz("Financial Modeling").unwrap();
    ctrl.select_option(&choices("Financial Modeling", &[true])[0]);
    let err = ctrl.submit_answer().await.unwrap_err();
    assert_eq!(
        err,
        ControllerError::Verification(VerificationError::Storage(
            StorageError::PermissionDenied("rules rejected write".into())
        ))
    );
    assert_eq!(ledger.merges.load(Ordering::SeqCst), 1);

    let Screen::Feed(feed) = ctrl.render() else {
        panic!("the quiz still ends");
    };
    assert_eq!(feed.banners.len(), 1);

    // A failed attempt never reaches the ledger.
    ctrl.start_quiz("Financial Modeling").unwrap();
    ctrl.select_option(&choices("Financial Modeling", &[false])[0]);
    let QuizProgress::Completed { verdict, .. } = ctrl.submit_answer().await.unwrap() else {
        panic!("quiz should complete");
    };
    assert!(!verdict.passed);
    assert_eq!(ledger.merges.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_quiz_category_is_rejected() {
    let repo = InMemoryRepository::with_clock(fixed_clock());
    let ctrl = controller(&repo);
    ctrl.bootstrap(None).await.unwrap();
    assert_eq!(
        ctrl.start_quiz("General"),
        Err(ControllerError::Quiz(QuizError::UnknownCategory(
            "General".into()
        )))
    );
}
