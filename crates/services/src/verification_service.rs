use std::sync::Arc;

use crosspoint_core::model::{
    Identity, PassingThreshold, QuizResult, UserId, VerifiedCategorySet,
};
use storage::{Listener, Subscription, VerificationPatch, VerificationRepository};

use crate::error::VerificationError;

/// Outcome of a completed quiz.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizVerdict {
    pub result: QuizResult,
    pub ratio: f64,
    pub passed: bool,
    /// The merged record when the pass was written.
    pub verified: Option<VerifiedCategorySet>,
}

impl QuizVerdict {
    #[must_use]
    pub fn message(&self) -> String {
        let percent = (self.ratio * 100.0).round();
        if self.passed {
            format!(
                "Passed {} with {}/{} ({percent}%). You can now answer {} questions.",
                self.result.category(),
                self.result.score(),
                self.result.total(),
                self.result.category(),
            )
        } else {
            format!(
                "Scored {}/{} ({percent}%) in {}. Try again to get verified.",
                self.result.score(),
                self.result.total(),
                self.result.category(),
            )
        }
    }
}

/// Grades completed quizzes and records passes.
#[derive(Clone)]
pub struct VerificationService {
    threshold: PassingThreshold,
    verifications: Arc<dyn VerificationRepository>,
}

impl VerificationService {
    #[must_use]
    pub fn new(threshold: PassingThreshold, verifications: Arc<dyn VerificationRepository>) -> Self {
        Self {
            threshold,
            verifications,
        }
    }

    #[must_use]
    pub fn threshold(&self) -> PassingThreshold {
        self.threshold
    }

    /// Grade `result` and, on a pass, union its category into the user's
    /// verification record. Failing scores write nothing.
    ///
    /// # Errors
    ///
    /// Returns `VerificationError::Unauthenticated` without an identity, or
    /// `VerificationError::Storage` if the merge fails.
    pub async fn complete_quiz(
        &self,
        identity: Option<&Identity>,
        result: &QuizResult,
    ) -> Result<QuizVerdict, VerificationError> {
        let identity = identity.ok_or(VerificationError::Unauthenticated)?;
        let ratio = result.ratio();
        let passed = self.threshold.is_passed(result);
        tracing::info!(
            user_id = %identity.user_id(),
            category = %result.category(),
            score = result.score(),
            total = result.total(),
            passed,
            "quiz completed"
        );
        if !passed {
            return Ok(QuizVerdict {
                result: result.clone(),
                ratio,
                passed,
                verified: None,
            });
        }

        let merged = self
            .verifications
            .merge_verification(VerificationPatch {
                user_id: identity.user_id().clone(),
                display_name: Some(identity.display_name().to_string()),
                add_categories: vec![result.category().clone()],
            })
            .await
            .inspect_err(|err| {
                tracing::error!(error = %err, "failed to record verification");
            })?;

        Ok(QuizVerdict {
            result: result.clone(),
            ratio,
            passed,
            verified: Some(merged),
        })
    }

    /// # Errors
    ///
    /// Returns `VerificationError::Storage` if the record cannot be read.
    pub async fn verified_categories(
        &self,
        user_id: &UserId,
    ) -> Result<Option<VerifiedCategorySet>, VerificationError> {
        Ok(self.verifications.get_verification(user_id).await?)
    }

    pub async fn subscribe(
        &self,
        user_id: &UserId,
        listener: Listener<Option<VerifiedCategorySet>>,
    ) -> Subscription {
        self.verifications
            .subscribe_verification(user_id, listener)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosspoint_core::model::Category;
    use crosspoint_core::time::fixed_clock;
    use storage::InMemoryRepository;

    fn service() -> (VerificationService, InMemoryRepository) {
        let repo = InMemoryRepository::with_clock(fixed_clock());
        let service = VerificationService::new(PassingThreshold::default(), Arc::new(repo.clone()));
        (service, repo)
    }

    fn ada() -> Identity {
        Identity::new(UserId::new("ada-uid").unwrap(), Some("Ada"), false)
    }

    fn result(category: &str, score: u32, total: u32) -> QuizResult {
        QuizResult::new(Category::new(category).unwrap(), score, total).unwrap()
    }

    #[tokio::test]
    async fn two_of_three_fails_and_writes_nothing() {
        let (service, repo) = service();
        let verdict = service
            .complete_quiz(Some(&ada()), &result("Physics", 2, 3))
            .await
            .unwrap();
        assert!(!verdict.passed);
        assert!(verdict.verified.is_none());
        assert!(
            repo.get_verification(ada().user_id())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn pass_merges_category_and_name() {
        let (service, _) = service();
        service
            .complete_quiz(Some(&ada()), &result("Physics", 3, 3))
            .await
            .unwrap();
        let verdict = service
            .complete_quiz(Some(&ada()), &result("Financial Modeling", 1, 1))
            .await
            .unwrap();
        let verified = verdict.verified.unwrap();
        assert!(verified.contains(&Category::new("Physics").unwrap()));
        assert!(verified.contains(&Category::new("Financial Modeling").unwrap()));
        assert_eq!(verified.display_name(), Some("Ada"));
    }

    #[tokio::test]
    async fn threshold_boundary_is_inclusive() {
        let repo = InMemoryRepository::with_clock(fixed_clock());
        let service =
            VerificationService::new(PassingThreshold::new(0.5).unwrap(), Arc::new(repo));
        let verdict = service
            .complete_quiz(Some(&ada()), &result("Biology", 1, 2))
            .await
            .unwrap();
        assert!(verdict.passed);
    }

    #[tokio::test]
    async fn requires_an_identity() {
        let (service, _) = service();
        assert_eq!(
            service.complete_quiz(None, &result("Physics", 3, 3)).await,
            Err(VerificationError::Unauthenticated)
        );
    }
}
