mod category;
mod identity;
mod ids;
mod question;
mod verification;

pub use category::{Category, CategoryError, GENERAL_CATEGORY};
pub use identity::{Identity, synthesize_display_name};
pub use ids::{IdError, QuestionId, UserId};
pub use question::{
    NewQuestion, Question, QuestionDraft, QuestionError, QuestionStatus, arrange_feed,
};
pub use verification::{
    PassingThreshold, QuizResult, ScoreError, ThresholdError, VerifiedCategorySet,
};
