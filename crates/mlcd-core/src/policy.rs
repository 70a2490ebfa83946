//! Promotion decision policy
//!
//! Decides whether a candidate model replaces the incumbent production model.
//!
//! # Algorithm
//! 1. `best = max(f1_new, f1_incumbent)`, with `f1_incumbent = 0` on cold start
//! 2. `best < floor` is a hard stop ([`PolicyViolation`])
//! 3. `f1_new > f1_incumbent * (1 + margin)` promotes the candidate
//! 4. anything else keeps the incumbent
//!
//! The floor is checked against the better of the two models, not against
//! both. A candidate below the floor can therefore be evaluated (and kept
//! out) as long as the incumbent clears it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default relative improvement required for promotion
pub const DEFAULT_MARGIN: f64 = 0.01;

/// Default minimum acceptable F1 score
pub const DEFAULT_FLOOR: f64 = 0.4;

/// Routing outcome of a promotion decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Candidate replaces the incumbent
    PromoteNew,
    /// Incumbent stays in production
    KeepIncumbent,
}

impl Outcome {
    /// Stable name used in logs and payloads
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PromoteNew => "promote_new",
            Self::KeepIncumbent => "keep_incumbent",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Neither the candidate nor the incumbent clears the floor
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("F1-score of best model {best:.3} below minimum of {floor:.3} (new: {f1_new:.3}, incumbent: {f1_incumbent:.3})")]
pub struct PolicyViolation {
    pub best: f64,
    pub floor: f64,
    pub f1_new: f64,
    pub f1_incumbent: f64,
}

/// Errors from [`PromotionPolicy::decide`]
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum DecisionError {
    /// Quality floor not met
    #[error(transparent)]
    Violation(#[from] PolicyViolation),

    /// Score outside [0, 1] or not a number
    #[error("invalid {which} F1 score: {value}")]
    InvalidScore { which: &'static str, value: f64 },
}

/// Invalid policy parameters
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyConfigError {
    #[error("margin must be a finite, non-negative number, got {0}")]
    InvalidMargin(f64),

    #[error("floor must lie in [0, 1], got {0}")]
    InvalidFloor(f64),
}

/// Result of a promotion decision, kept for audit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PromotionDecision {
    pub outcome: Outcome,
    pub f1_new: f64,
    /// 0 when there is no incumbent
    pub f1_incumbent: f64,
    pub has_incumbent: bool,
    /// Score the candidate had to exceed
    pub threshold: f64,
}

impl PromotionDecision {
    /// Check if the candidate should be promoted
    #[inline]
    #[must_use]
    pub fn should_promote(&self) -> bool {
        self.outcome == Outcome::PromoteNew
    }
}

/// Margin and floor applied to candidate/incumbent F1 scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionPolicy {
    /// Relative improvement threshold
    pub margin: f64,
    /// Minimum acceptable F1 for the better model
    pub floor: f64,
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self {
            margin: DEFAULT_MARGIN,
            floor: DEFAULT_FLOOR,
        }
    }
}

impl PromotionPolicy {
    /// Create validated policy
    ///
    /// # Errors
    /// Returns error if `margin` is negative or non-finite, or `floor` is outside [0, 1]
    pub fn new(margin: f64, floor: f64) -> Result<Self, PolicyConfigError> {
        let policy = Self { margin, floor };
        policy.validate()?;
        Ok(policy)
    }

    /// Check parameter ranges
    ///
    /// # Errors
    /// See [`PromotionPolicy::new`]
    pub fn validate(&self) -> Result<(), PolicyConfigError> {
        if !self.margin.is_finite() || self.margin < 0.0 {
            return Err(PolicyConfigError::InvalidMargin(self.margin));
        }
        if !(0.0..=1.0).contains(&self.floor) {
            return Err(PolicyConfigError::InvalidFloor(self.floor));
        }
        Ok(())
    }

    /// Decide between candidate and incumbent
    ///
    /// `f1_incumbent` is `None` on cold start and counts as 0.
    ///
    /// # Errors
    /// - `DecisionError::Violation` if the better score is below the floor
    /// - `DecisionError::InvalidScore` if a score is NaN or outside [0, 1]
    pub fn decide(
        &self,
        f1_new: f64,
        f1_incumbent: Option<f64>,
    ) -> Result<PromotionDecision, DecisionError> {
        check_score("candidate", f1_new)?;
        let has_incumbent = f1_incumbent.is_some();
        let f1_incumbent = f1_incumbent.unwrap_or(0.0);
        check_score("incumbent", f1_incumbent)?;

        let best = f1_new.max(f1_incumbent);
        if best < self.floor {
            tracing::error!(
                f1_new,
                f1_incumbent,
                floor = self.floor,
                "no model meets the minimum F1 score"
            );
            return Err(PolicyViolation {
                best,
                floor: self.floor,
                f1_new,
                f1_incumbent,
            }
            .into());
        }

        let threshold = f1_incumbent * (1.0 + self.margin);
        let outcome = if f1_new > threshold {
            Outcome::PromoteNew
        } else {
            Outcome::KeepIncumbent
        };

        match outcome {
            Outcome::PromoteNew => tracing::info!(
                %outcome,
                f1_new,
                f1_incumbent,
                threshold,
                "new model is best so far, pushing to production"
            ),
            Outcome::KeepIncumbent => tracing::info!(
                %outcome,
                f1_new,
                f1_incumbent,
                threshold,
                "new model is not better, keeping incumbent"
            ),
        }

        Ok(PromotionDecision {
            outcome,
            f1_new,
            f1_incumbent,
            has_incumbent,
            threshold,
        })
    }
}

fn check_score(which: &'static str, value: f64) -> Result<(), DecisionError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(DecisionError::InvalidScore { which, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy() -> PromotionPolicy {
        PromotionPolicy::default()
    }

    #[test]
    fn defaults() {
        assert_eq!(policy().margin, 0.01);
        assert_eq!(policy().floor, 0.4);
    }

    #[test]
    fn clear_improvement_promotes() {
        let d = policy().decide(0.6, Some(0.5)).unwrap();
        assert_eq!(d.outcome, Outcome::PromoteNew);
        assert!((d.threshold - 0.505).abs() < 1e-12);
        assert!(d.should_promote());
    }

    #[test]
    fn equal_scores_keep_incumbent() {
        let d = policy().decide(0.5, Some(0.5)).unwrap();
        assert_eq!(d.outcome, Outcome::KeepIncumbent);
    }

    #[test]
    fn improvement_within_margin_keeps_incumbent() {
        let d = policy().decide(0.504, Some(0.5)).unwrap();
        assert_eq!(d.outcome, Outcome::KeepIncumbent);
    }

    #[test]
    fn both_below_floor_is_violation() {
        let err = policy().decide(0.3, Some(0.0)).unwrap_err();
        match err {
            DecisionError::Violation(v) => {
                assert_eq!(v.best, 0.3);
                assert_eq!(v.floor, 0.4);
            }
            other => panic!("expected violation, got {other:?}"),
        }
    }

    #[test]
    fn cold_start_below_floor_is_violation() {
        assert!(matches!(
            policy().decide(0.3, None),
            Err(DecisionError::Violation(_))
        ));
    }

    #[test]
    fn cold_start_zero_candidate_fails_floor_first() {
        assert!(matches!(
            policy().decide(0.0, None),
            Err(DecisionError::Violation(_))
        ));
    }

    #[test]
    fn cold_start_promotes_passing_candidate() {
        let d = policy().decide(0.41, None).unwrap();
        assert_eq!(d.outcome, Outcome::PromoteNew);
        assert!(!d.has_incumbent);
        assert_eq!(d.f1_incumbent, 0.0);
    }

    #[test]
    fn weak_candidate_with_good_incumbent_keeps_incumbent() {
        let d = policy().decide(0.1, Some(0.8)).unwrap();
        assert_eq!(d.outcome, Outcome::KeepIncumbent);
    }

    #[test]
    fn invalid_scores_rejected() {
        assert!(matches!(
            policy().decide(f64::NAN, None),
            Err(DecisionError::InvalidScore { which: "candidate", .. })
        ));
        assert!(matches!(
            policy().decide(0.5, Some(1.5)),
            Err(DecisionError::InvalidScore { which: "incumbent", .. })
        ));
    }

    #[test]
    fn policy_validation() {
        assert!(PromotionPolicy::new(0.0, 0.0).is_ok());
        assert_eq!(
            PromotionPolicy::new(-0.1, 0.4),
            Err(PolicyConfigError::InvalidMargin(-0.1))
        );
        assert!(matches!(
            PromotionPolicy::new(f64::INFINITY, 0.4),
            Err(PolicyConfigError::InvalidMargin(_))
        ));
        assert_eq!(
            PromotionPolicy::new(0.01, 1.2),
            Err(PolicyConfigError::InvalidFloor(1.2))
        );
    }

    #[test]
    fn outcome_names() {
        assert_eq!(Outcome::PromoteNew.to_string(), "promote_new");
        assert_eq!(
            serde_json::to_string(&Outcome::KeepIncumbent).unwrap(),
            "\"keep_incumbent\""
        );
    }

    #[test]
    fn violation_message_mentions_scores() {
        let err = policy().decide(0.3, Some(0.2)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "F1-score of best model 0.300 below minimum of 0.400 (new: 0.300, incumbent: 0.200)"
        );
    }

    proptest! {
        #[test]
        fn cold_start_passing_candidate_always_promoted(
            floor in 0.001f64..=1.0,
            margin in 0.0f64..1.0,
            offset in 0.0f64..=1.0,
        ) {
            let policy = PromotionPolicy::new(margin, floor).unwrap();
            let f1_new = floor + (1.0 - floor) * offset;
            let d = policy.decide(f1_new, None).unwrap();
            prop_assert_eq!(d.outcome, Outcome::PromoteNew);
            let d = policy.decide(f1_new, Some(0.0)).unwrap();
            prop_assert_eq!(d.outcome, Outcome::PromoteNew);
        }

        #[test]
        fn both_below_floor_always_violation(
            floor in 0.01f64..=1.0,
            a in 0.0f64..1.0,
            b in 0.0f64..1.0,
        ) {
            let policy = PromotionPolicy::new(0.01, floor).unwrap();
            let f1_new = a * floor * 0.999;
            let f1_incumbent = b * floor * 0.999;
            prop_assert!(matches!(
                policy.decide(f1_new, Some(f1_incumbent)),
                Err(DecisionError::Violation(_))
            ));
        }

        #[test]
        fn no_improvement_beyond_margin_keeps_incumbent(
            floor in 0.0f64..=1.0,
            margin in 0.0f64..0.5,
            inc_offset in 0.0f64..=1.0,
            fraction in 0.0f64..=1.0,
        ) {
            let policy = PromotionPolicy::new(margin, floor).unwrap();
            let f1_incumbent = floor + (1.0 - floor) * inc_offset;
            let f1_new = (f1_incumbent * (1.0 + margin) * fraction).min(1.0);
            let d = policy.decide(f1_new, Some(f1_incumbent)).unwrap();
            prop_assert_eq!(d.outcome, Outcome::KeepIncumbent);
        }
    }
}
