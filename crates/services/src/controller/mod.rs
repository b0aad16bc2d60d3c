//! Top-level session state: identity, live feeds, the active view and quiz.
//!
//! The controller owns every session-scoped resource. Subscriptions are
//! acquired once an identity is established and released on sign-out or
//! shutdown. Each acquisition bumps an epoch; callbacks carry the epoch they
//! were registered under and ignore deliveries once it has moved on.

mod screen;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use crosspoint_core::{Clock, QuizBank};
use crosspoint_core::model::{
    Category, Identity, Question, QuestionDraft, QuestionId, VerifiedCategorySet,
};
use storage::{Listener, Storage, StorageError, Subscription};

use crate::config::AppConfig;
use crate::error::{ControllerError, FatalError, PostError, QuizError};
use crate::feed_service::FeedService;
use crate::identity::IdentityProvider;
use crate::quiz::{DeferredTransition, Fired, QuizPhase, QuizSession, QuizStep, Reveal};
use crate::verification_service::{QuizVerdict, VerificationService};

pub use screen::{Banner, FeedCard, FeedScreen, PostScreen, QuizScreen, RevealView, Screen};

/// Top-level view selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Feed,
    Post,
    Quiz,
}

/// What happened after an answer was submitted and its reveal elapsed.
#[derive(Debug, Clone, PartialEq)]
pub enum QuizProgress {
    Next { reveal: Reveal, index: usize },
    Completed { reveal: Reveal, verdict: QuizVerdict },
    /// The quiz was cancelled or the session torn down during the reveal.
    Cancelled { reveal: Reveal },
}

struct ActiveQuiz {
    session: QuizSession,
    pending: Option<Arc<DeferredTransition>>,
}

impl ActiveQuiz {
    fn abandon(mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
        self.session.cancel();
    }
}

struct ControllerState {
    loading: bool,
    fatal: Option<FatalError>,
    identity: Option<Identity>,
    view: View,
    questions: Vec<Question>,
    verified: Option<VerifiedCategorySet>,
    banners: Vec<Banner>,
    next_banner: u64,
    post_error: Option<String>,
    posting: bool,
    quiz: Option<ActiveQuiz>,
    last_verdict: Option<QuizVerdict>,
    subscriptions: Vec<Subscription>,
    epoch: u64,
}

impl ControllerState {
    fn new() -> Self {
        Self {
            loading: true,
            fatal: None,
            identity: None,
            view: View::Feed,
            questions: Vec::new(),
            verified: None,
            banners: Vec::new(),
            next_banner: 0,
            post_error: None,
            posting: false,
            quiz: None,
            last_verdict: None,
            subscriptions: Vec::new(),
            epoch: 0,
        }
    }

    fn push_banner(&mut self, message: String) {
        self.next_banner += 1;
        self.banners.push(Banner {
            id: self.next_banner,
            message,
        });
    }

    fn can_answer(&self, category: &Category) -> bool {
        self.identity.is_some()
            && (category.is_general()
                || self
                    .verified
                    .as_ref()
                    .is_some_and(|verified| verified.contains(category)))
    }

    fn ready_identity(&self) -> Result<Identity, ControllerError> {
        if let Some(fatal) = &self.fatal {
            return Err(ControllerError::Fatal(fatal.clone()));
        }
        match (&self.identity, self.loading) {
            (Some(identity), false) => Ok(identity.clone()),
            _ => Err(ControllerError::NotReady("no signed-in user")),
        }
    }

    fn end_quiz(&mut self) -> bool {
        let Some(quiz) = self.quiz.take() else {
            return false;
        };
        quiz.abandon();
        if self.view == View::Quiz {
            self.view = View::Feed;
        }
        true
    }

    /// Drop back to the signed-out state and hand back the released
    /// subscriptions so the caller can drop them outside the lock.
    fn teardown(&mut self) -> Vec<Subscription> {
        self.epoch += 1;
        self.end_quiz();
        self.identity = None;
        self.loading = true;
        self.view = View::Feed;
        self.questions.clear();
        self.verified = None;
        self.banners.clear();
        self.post_error = None;
        self.posting = false;
        self.last_verdict = None;
        std::mem::take(&mut self.subscriptions)
    }
}

fn lock(state: &Mutex<ControllerState>) -> MutexGuard<'_, ControllerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `apply` against the state if it is still alive and still on `epoch`.
fn with_live_state(
    state: &Weak<Mutex<ControllerState>>,
    epoch: u64,
    apply: impl FnOnce(&mut ControllerState),
) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let mut guard = lock(&state);
    if guard.epoch == epoch {
        apply(&mut guard);
    }
}

/// The services a session attaches to. Identity callbacks carry a clone so a
/// provider-side sign-in can re-attach the feeds on its own.
#[derive(Clone)]
struct Services {
    identity: Arc<dyn IdentityProvider>,
    feed: FeedService,
    verification: VerificationService,
}

impl Services {
    /// Replace the session with one for `identity` and attach its live feeds.
    /// With `expected`, nothing happens unless the session is still on that
    /// epoch and has not failed.
    async fn attach(
        &self,
        state: &Arc<Mutex<ControllerState>>,
        identity: Identity,
        expected: Option<u64>,
    ) {
        let (epoch, released) = {
            let mut guard = lock(state);
            if expected.is_some_and(|expected| guard.epoch != expected || guard.fatal.is_some()) {
                return;
            }
            let released = guard.teardown();
            guard.identity = Some(identity.clone());
            (guard.epoch, released)
        };
        drop(released);

        let weak = Arc::downgrade(state);
        let feed_sub = self.feed.subscribe(feed_listener(&weak, epoch)).await;
        let verified_sub = self
            .verification
            .subscribe(identity.user_id(), verification_listener(&weak, epoch))
            .await;
        let identity_sub = self
            .identity
            .watch(self.identity_listener(&weak, epoch, identity.clone()));

        let stale = {
            let mut guard = lock(state);
            if guard.epoch == epoch {
                guard.subscriptions = vec![feed_sub, verified_sub, identity_sub];
                guard.loading = false;
                None
            } else {
                Some([feed_sub, verified_sub, identity_sub])
            }
        };
        if stale.is_none() {
            tracing::info!(user_id = %identity.user_id(), "session ready");
        }
    }

    /// End the session when the provider drops the user, and move it over
    /// when the provider reports somebody else.
    fn identity_listener(
        &self,
        weak: &Weak<Mutex<ControllerState>>,
        epoch: u64,
        signed_in: Identity,
    ) -> Listener<Option<Identity>> {
        let services = self.clone();
        let weak = weak.clone();
        Listener::updates_only(move |current: Option<Identity>| {
            if current
                .as_ref()
                .is_some_and(|id| id.user_id() == signed_in.user_id())
            {
                return;
            }
            let Some(state) = weak.upgrade() else {
                return;
            };
            let (released, resumed) = {
                let mut guard = lock(&state);
                if guard.epoch != epoch {
                    return;
                }
                let released = guard.teardown();
                (released, guard.epoch)
            };
            drop(released);
            match current {
                None => {
                    tracing::info!(user_id = %signed_in.user_id(), "signed out by the provider");
                }
                Some(next) => services.reattach(&state, next, resumed),
            }
        })
    }

    fn reattach(&self, state: &Arc<Mutex<ControllerState>>, identity: Identity, epoch: u64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                user_id = %identity.user_id(),
                "identity changed outside a runtime, staying signed out"
            );
            return;
        };
        tracing::info!(user_id = %identity.user_id(), "identity changed, re-attaching");
        let services = self.clone();
        let state = Arc::downgrade(state);
        runtime.spawn(async move {
            if let Some(state) = state.upgrade() {
                services.attach(&state, identity, Some(epoch)).await;
            }
        });
    }
}

fn feed_listener(weak: &Weak<Mutex<ControllerState>>, epoch: u64) -> Listener<Vec<Question>> {
    let on_update = weak.clone();
    let on_error = weak.clone();
    Listener::new(
        move |questions: Vec<Question>| {
            with_live_state(&on_update, epoch, |state| state.questions = questions);
        },
        move |err: &StorageError| {
            tracing::warn!(error = %err, "question feed failed");
            let message = format!("Question feed unavailable: {err}");
            with_live_state(&on_error, epoch, |state| state.push_banner(message));
        },
    )
}

fn verification_listener(
    weak: &Weak<Mutex<ControllerState>>,
    epoch: u64,
) -> Listener<Option<VerifiedCategorySet>> {
    let on_update = weak.clone();
    let on_error = weak.clone();
    Listener::new(
        move |verified: Option<VerifiedCategorySet>| {
            with_live_state(&on_update, epoch, |state| state.verified = verified);
        },
        move |err: &StorageError| {
            tracing::warn!(error = %err, "verification feed failed");
            let message = format!("Verification status unavailable: {err}");
            with_live_state(&on_error, epoch, |state| state.push_banner(message));
        },
    )
}

/// Coordinates identity, the two live feeds, posting and quizzes.
pub struct SessionController {
    services: Services,
    reveal_delay: Duration,
    state: Arc<Mutex<ControllerState>>,
}

impl SessionController {
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        feed: FeedService,
        verification: VerificationService,
        reveal_delay: Duration,
    ) -> Self {
        Self {
            services: Services {
                identity,
                feed,
                verification,
            },
            reveal_delay,
            state: Arc::new(Mutex::new(ControllerState::new())),
        }
    }

    /// Wire a controller from resolved configuration and storage.
    #[must_use]
    pub fn from_config(
        config: &AppConfig,
        identity: Arc<dyn IdentityProvider>,
        storage: &Storage,
        bank: Arc<QuizBank>,
        clock: Clock,
    ) -> Self {
        let feed = FeedService::new(clock, bank, Arc::clone(&storage.questions))
            .with_limit(config.feed_limit);
        let verification = VerificationService::new(
            config.passing_threshold,
            Arc::clone(&storage.verifications),
        );
        Self::new(identity, feed, verification, config.reveal_delay)
    }

    fn bank(&self) -> &QuizBank {
        self.services.feed.bank()
    }

    /// Enter the sticky fatal state. Later fatal errors do not replace the
    /// first one.
    pub fn fail(&self, error: FatalError) {
        let released = {
            let mut state = lock(&self.state);
            if state.fatal.is_none() {
                tracing::error!(error = %error, "session failed");
                state.fatal = Some(error);
            }
            state.loading = false;
            let released = std::mem::take(&mut state.subscriptions);
            state.end_quiz();
            state.epoch += 1;
            released
        };
        drop(released);
    }

    /// Sign in (with `token` when given, anonymously otherwise) and attach
    /// the live feeds.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::Fatal` if the session already failed or the
    /// sign-in is refused; the failure is also kept as the sticky fatal state.
    pub async fn bootstrap(&self, token: Option<&str>) -> Result<Identity, ControllerError> {
        {
            let state = lock(&self.state);
            if let Some(fatal) = &state.fatal {
                return Err(ControllerError::Fatal(fatal.clone()));
            }
        }

        let signed_in = match token {
            Some(token) => self.services.identity.sign_in_with_token(token).await,
            None => self.services.identity.sign_in_anonymously().await,
        };
        match signed_in {
            Ok(identity) => {
                self.services
                    .attach(&self.state, identity.clone(), None)
                    .await;
                Ok(identity)
            }
            Err(err) => {
                let fatal = FatalError::Identity(err);
                self.fail(fatal.clone());
                Err(ControllerError::Fatal(fatal))
            }
        }
    }

    /// Release the session and sign out of the provider.
    pub async fn sign_out(&self) {
        let released = lock(&self.state).teardown();
        drop(released);
        self.services.identity.sign_out().await;
        tracing::info!("signed out");
    }

    /// Release every session-scoped resource without signing out.
    pub fn shutdown(&self) {
        let released = {
            let mut state = lock(&self.state);
            let released = state.teardown();
            state.loading = false;
            released
        };
        drop(released);
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        lock(&self.state).identity.clone()
    }

    #[must_use]
    pub fn view(&self) -> View {
        lock(&self.state).view
    }

    #[must_use]
    pub fn fatal(&self) -> Option<FatalError> {
        lock(&self.state).fatal.clone()
    }

    #[must_use]
    pub fn live_subscriptions(&self) -> usize {
        lock(&self.state).subscriptions.len()
    }

    /// Whether the signed-in user may answer questions in `category`.
    #[must_use]
    pub fn can_answer(&self, category: &Category) -> bool {
        lock(&self.state).can_answer(category)
    }

    /// # Errors
    ///
    /// Returns `ControllerError::NotReady` before sign-in completes.
    pub fn show_feed(&self) -> Result<(), ControllerError> {
        let mut state = lock(&self.state);
        state.ready_identity()?;
        state.end_quiz();
        state.view = View::Feed;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ControllerError::NotReady` before sign-in completes.
    pub fn show_post(&self) -> Result<(), ControllerError> {
        let mut state = lock(&self.state);
        state.ready_identity()?;
        state.end_quiz();
        state.post_error = None;
        state.view = View::Post;
        Ok(())
    }

    pub fn dismiss_banner(&self, id: u64) -> bool {
        let mut state = lock(&self.state);
        let before = state.banners.len();
        state.banners.retain(|banner| banner.id != id);
        state.banners.len() != before
    }

    /// Publish a question. The view returns to the feed on success; on
    /// failure the error is kept for the post view and the caller keeps
    /// its draft.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::Post` for validation or write failures and
    /// `PostError::InFlight` while another post is pending.
    pub async fn post_question(&self, draft: &QuestionDraft) -> Result<QuestionId, ControllerError> {
        let (identity, epoch) = {
            let mut state = lock(&self.state);
            let identity = state
                .ready_identity()
                .map_err(|_| PostError::Unauthenticated)?;
            if state.posting {
                return Err(PostError::InFlight.into());
            }
            state.posting = true;
            state.post_error = None;
            (identity, state.epoch)
        };

        let posted = self.services.feed.post_question(Some(&identity), draft).await;

        let mut state = lock(&self.state);
        if state.epoch == epoch {
            state.posting = false;
            match &posted {
                Ok(_) => state.view = View::Feed,
                Err(err) => state.post_error = Some(err.to_string()),
            }
        }
        Ok(posted?)
    }

    /// Begin a fresh quiz in `category`, abandoning any quiz in progress.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::UnknownCategory` when the bank has no quiz for it.
    pub fn start_quiz(&self, category: &str) -> Result<(), ControllerError> {
        let category = Category::new(category)
            .map_err(|_| QuizError::UnknownCategory(category.trim().to_string()))?;
        let questions = self
            .bank()
            .questions(&category)
            .ok_or_else(|| QuizError::UnknownCategory(category.to_string()))?;
        let session = QuizSession::new(category.clone(), questions)?;

        let mut state = lock(&self.state);
        state.ready_identity()?;
        state.end_quiz();
        state.quiz = Some(ActiveQuiz {
            session,
            pending: None,
        });
        state.view = View::Quiz;
        tracing::debug!(%category, "quiz started");
        Ok(())
    }

    /// Pick an option for the current question. Returns `false` when the pick
    /// was ignored.
    pub fn select_option(&self, choice: &str) -> bool {
        lock(&self.state)
            .quiz
            .as_mut()
            .is_some_and(|quiz| quiz.session.select(choice))
    }

    /// Submit the selected option, hold the reveal for the configured delay,
    /// then advance. Completing the last question grades the quiz and
    /// records a pass.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::Quiz` for illegal moves (nothing selected,
    /// a second submit during the reveal) and `ControllerError::Verification`
    /// if a pass could not be recorded.
    pub async fn submit_answer(&self) -> Result<QuizProgress, ControllerError> {
        let (reveal, transition, epoch) = {
            let mut state = lock(&self.state);
            let epoch = state.epoch;
            let quiz = state.quiz.as_mut().ok_or(QuizError::NoActiveQuiz)?;
            let reveal = quiz.session.submit()?;
            let transition = Arc::new(DeferredTransition::new());
            quiz.pending = Some(Arc::clone(&transition));
            (reveal, transition, epoch)
        };

        if transition.wait(self.reveal_delay).await == Fired::Cancelled {
            return Ok(QuizProgress::Cancelled { reveal });
        }

        let step = {
            let mut state = lock(&self.state);
            if state.epoch != epoch {
                return Ok(QuizProgress::Cancelled { reveal });
            }
            let Some(quiz) = state.quiz.as_mut() else {
                return Ok(QuizProgress::Cancelled { reveal });
            };
            let current = quiz
                .pending
                .as_ref()
                .is_some_and(|pending| Arc::ptr_eq(pending, &transition));
            if !current || transition.is_cancelled() {
                return Ok(QuizProgress::Cancelled { reveal });
            }
            quiz.pending = None;
            quiz.session.begin_advance()?;
            let step = quiz.session.advance()?;
            if matches!(step, QuizStep::Completed(_)) {
                state.quiz = None;
                state.view = View::Feed;
            }
            step
        };

        let result = match step {
            QuizStep::Next { index } => return Ok(QuizProgress::Next { reveal, index }),
            QuizStep::Completed(result) => result,
        };

        let identity = lock(&self.state).identity.clone();
        match self
            .services
            .verification
            .complete_quiz(identity.as_ref(), &result)
            .await
        {
            Ok(verdict) => {
                with_live_state(&Arc::downgrade(&self.state), epoch, |state| {
                    state.last_verdict = Some(verdict.clone());
                });
                Ok(QuizProgress::Completed { reveal, verdict })
            }
            Err(err) => {
                with_live_state(&Arc::downgrade(&self.state), epoch, |state| {
                    state.push_banner(format!(
                        "Passed {} but the result could not be saved: {err}",
                        result.category()
                    ));
                });
                Err(err.into())
            }
        }
    }

    /// Abandon the quiz in progress, cancelling a pending reveal.
    pub fn cancel_quiz(&self) -> bool {
        let cancelled = lock(&self.state).end_quiz();
        if cancelled {
            tracing::debug!("quiz cancelled");
        }
        cancelled
    }

    /// Snapshot of what should be on screen.
    #[must_use]
    pub fn render(&self) -> Screen {
        let state = lock(&self.state);
        if state.loading {
            return Screen::Loading;
        }
        if let Some(fatal) = &state.fatal {
            return Screen::Fatal {
                message: fatal.user_message(),
            };
        }
        let Some(user) = state.identity.clone() else {
            return Screen::Loading;
        };
        let banners = state.banners.clone();

        match (state.view, state.quiz.as_ref()) {
            (View::Quiz, Some(quiz)) => render_quiz(&quiz.session, banners),
            (View::Post, _) => Screen::Post(PostScreen {
                user,
                categories: self.bank().postable_categories(),
                posting: state.posting,
                error: state.post_error.clone(),
                banners,
            }),
            _ => {
                let cards = state
                    .questions
                    .iter()
                    .map(|q| FeedCard::new(q, &user, state.can_answer(q.category())))
                    .collect();
                let verified = state
                    .verified
                    .as_ref()
                    .map(|v| v.categories().cloned().collect())
                    .unwrap_or_default();
                Screen::Feed(FeedScreen {
                    user,
                    cards,
                    verified,
                    quiz_categories: self.bank().categories().cloned().collect(),
                    banners,
                    notice: state.last_verdict.as_ref().map(QuizVerdict::message),
                })
            }
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn render_quiz(session: &QuizSession, banners: Vec<Banner>) -> Screen {
    let (index, revealed) = match session.phase() {
        QuizPhase::Answering { index } => (*index, None),
        QuizPhase::Revealed { index, correct } | QuizPhase::Advancing { index, correct } => {
            (*index, Some(*correct))
        }
        QuizPhase::Completed(_) | QuizPhase::Cancelled => (session.total(), None),
    };
    let question = session.current();
    Screen::Quiz(QuizScreen {
        category: session.category().clone(),
        index,
        total: session.total(),
        prompt: question.map(|q| q.prompt().to_string()).unwrap_or_default(),
        options: question.map(|q| q.options().to_vec()).unwrap_or_default(),
        selected: session.selected().map(ToString::to_string),
        score: session.score(),
        revealed: revealed.and_then(|correct| {
            question.map(|q| RevealView {
                answer: q.answer().to_string(),
                correct,
            })
        }),
        input_enabled: revealed.is_none(),
        banners,
    })
}
