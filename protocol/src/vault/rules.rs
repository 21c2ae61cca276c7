//! # Withdrawal Policy
//!
//! A [`RuleSet`] is a plain value: eight numbers and a flag. Every check on
//! it is a pure function of its fields and the arguments. Governance never
//! edits a rule set in place; it replaces the whole thing.
//!
//! Two presets ship as illustrative defaults. Anything that passes
//! [`RuleSet::validate_parameters`] is acceptable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::BPS_DENOMINATOR;
use crate::predicate::AuthorizationError;

/// A parameter set that makes no sense as policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleSetError {
    /// Zero signers would let anyone (or no one) withdraw.
    #[error("min_signers must be at least 1")]
    ZeroMinSigners,

    /// A penalty above 100% of the amount.
    #[error("penalty of {0} bps exceeds 10000 bps")]
    PenaltyOutOfRange(u32),

    /// Bincode refused to encode the rule set.
    #[error("failed to encode rule set: {0}")]
    Encoding(String),
}

/// Withdrawal policy parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleSet {
    /// Distinct member signatures required on the normal path.
    pub min_signers: usize,
    /// Amounts at or above this are "large".
    pub large_withdrawal_threshold: u64,
    /// Large withdrawals need every member to sign.
    pub large_withdrawal_requires_all: bool,
    /// Penalty charged before `penalty_free_height`, in basis points.
    pub early_withdrawal_penalty_bps: u32,
    /// From this height on, withdrawals are penalty-free.
    pub penalty_free_height: u32,
    /// Blocks after creation before the emergency path opens.
    pub emergency_timeout_blocks: u32,
    /// Hard cap on a single withdrawal.
    pub max_single_withdrawal: u64,
    /// Blocks between large withdrawals.
    pub withdrawal_cooling_period: u32,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::conservative()
    }
}

impl RuleSet {
    /// Two signers, all-hands for large amounts, 10% early penalty.
    pub fn conservative() -> Self {
        use crate::config::conservative::*;
        Self {
            min_signers: MIN_SIGNERS,
            large_withdrawal_threshold: LARGE_WITHDRAWAL_THRESHOLD,
            large_withdrawal_requires_all: LARGE_WITHDRAWAL_REQUIRES_ALL,
            early_withdrawal_penalty_bps: EARLY_WITHDRAWAL_PENALTY_BPS,
            penalty_free_height: PENALTY_FREE_HEIGHT,
            emergency_timeout_blocks: EMERGENCY_TIMEOUT_BLOCKS,
            max_single_withdrawal: MAX_SINGLE_WITHDRAWAL,
            withdrawal_cooling_period: WITHDRAWAL_COOLING_PERIOD,
        }
    }

    /// One signer, no all-hands rule, 5% early penalty.
    pub fn permissive() -> Self {
        use crate::config::permissive::*;
        Self {
            min_signers: MIN_SIGNERS,
            large_withdrawal_threshold: LARGE_WITHDRAWAL_THRESHOLD,
            large_withdrawal_requires_all: LARGE_WITHDRAWAL_REQUIRES_ALL,
            early_withdrawal_penalty_bps: EARLY_WITHDRAWAL_PENALTY_BPS,
            penalty_free_height: PENALTY_FREE_HEIGHT,
            emergency_timeout_blocks: EMERGENCY_TIMEOUT_BLOCKS,
            max_single_withdrawal: MAX_SINGLE_WITHDRAWAL,
            withdrawal_cooling_period: WITHDRAWAL_COOLING_PERIOD,
        }
    }

    /// Early-withdrawal penalty for `amount` at `current_height`.
    ///
    /// Zero at or after `penalty_free_height`. Computed in u128 so
    /// `u64::MAX * 10_000` can't overflow; the result is at most `amount`
    /// whenever the bps is sane, and is clamped to `amount` when it isn't.
    pub fn penalty(&self, amount: u64, current_height: u32) -> u64 {
        if current_height >= self.penalty_free_height {
            return 0;
        }
        let raw = u128::from(amount) * u128::from(self.early_withdrawal_penalty_bps)
            / u128::from(BPS_DENOMINATOR);
        u64::try_from(raw).unwrap_or(u64::MAX).min(amount)
    }

    pub fn is_large(&self, amount: u64) -> bool {
        amount >= self.large_withdrawal_threshold
    }

    /// Signer-count and cap checks, in order: quorum, all-hands, cap.
    pub fn validate(
        &self,
        amount: u64,
        signer_count: usize,
        total_members: usize,
    ) -> Result<(), AuthorizationError> {
        if signer_count < self.min_signers {
            return Err(AuthorizationError::QuorumNotMet {
                required: self.min_signers,
                provided: signer_count,
            });
        }
        if self.is_large(amount) && self.large_withdrawal_requires_all && signer_count != total_members {
            return Err(AuthorizationError::LargeWithdrawalRequiresAll {
                required: total_members,
                provided: signer_count,
            });
        }
        if amount > self.max_single_withdrawal {
            return Err(AuthorizationError::ExceedsMax {
                amount,
                max: self.max_single_withdrawal,
            });
        }
        Ok(())
    }

    /// `true` if a withdrawal of `amount` is clear of the cooling period.
    ///
    /// Only large withdrawals cool down. A `last` above `current_height`
    /// counts as zero blocks elapsed.
    pub fn cooling_ok(&self, current_height: u32, last: Option<u32>, amount: u64) -> bool {
        self.check_cooling(current_height, last, amount).is_ok()
    }

    /// [`cooling_ok`](Self::cooling_ok) with the remaining block count.
    pub fn check_cooling(
        &self,
        current_height: u32,
        last: Option<u32>,
        amount: u64,
    ) -> Result<(), AuthorizationError> {
        let Some(last) = last else {
            return Ok(());
        };
        if !self.is_large(amount) {
            return Ok(());
        }
        let elapsed = current_height.saturating_sub(last);
        if elapsed >= self.withdrawal_cooling_period {
            Ok(())
        } else {
            Err(AuthorizationError::CoolingPeriodActive {
                remaining: self.withdrawal_cooling_period - elapsed,
            })
        }
    }

    /// Reject parameter sets that can't be meaningful policy.
    pub fn validate_parameters(&self) -> Result<(), RuleSetError> {
        if self.min_signers == 0 {
            return Err(RuleSetError::ZeroMinSigners);
        }
        if u64::from(self.early_withdrawal_penalty_bps) > BPS_DENOMINATOR {
            return Err(RuleSetError::PenaltyOutOfRange(self.early_withdrawal_penalty_bps));
        }
        Ok(())
    }

    /// Deterministic bincode encoding. Feeds the private-input digest.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, RuleSetError> {
        bincode::serialize(self).map_err(|e| RuleSetError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn penalty_before_and_after_free_height() {
        let rules = RuleSet {
            penalty_free_height: 1_000,
            ..RuleSet::conservative()
        };
        assert_eq!(rules.penalty(100_000_000, 999), 10_000_000);
        assert_eq!(rules.penalty(100_000_000, 1_000), 0);
        assert_eq!(rules.penalty(100_000_000, 5_000), 0);
        // Floors.
        assert_eq!(rules.penalty(19, 0), 1);
        assert_eq!(rules.penalty(9, 0), 0);
    }

    #[test]
    fn default_presets_are_penalty_free() {
        // penalty_free_height 0 means every height is past it.
        assert_eq!(RuleSet::conservative().penalty(50_000_000, 0), 0);
        assert_eq!(RuleSet::permissive().penalty(50_000_000, 0), 0);
    }

    #[test]
    fn penalty_never_overflows() {
        let rules = RuleSet {
            penalty_free_height: u32::MAX,
            early_withdrawal_penalty_bps: 10_000,
            ..RuleSet::conservative()
        };
        assert_eq!(rules.penalty(u64::MAX, 0), u64::MAX);

        let silly = RuleSet {
            early_withdrawal_penalty_bps: u32::MAX,
            ..rules
        };
        assert_eq!(silly.penalty(u64::MAX, 0), u64::MAX);
    }

    #[test]
    fn conservative_validate() {
        let rules = RuleSet::conservative();
        assert!(matches!(
            rules.validate(5_000_000, 1, 3),
            Err(AuthorizationError::QuorumNotMet { required: 2, provided: 1 })
        ));
        assert!(matches!(
            rules.validate(50_000_000, 2, 3),
            Err(AuthorizationError::LargeWithdrawalRequiresAll { .. })
        ));
        assert!(rules.validate(50_000_000, 3, 3).is_ok());
        assert!(rules.validate(5_000_000, 2, 3).is_ok());
        assert!(matches!(
            rules.validate(100_000_001, 3, 3),
            Err(AuthorizationError::ExceedsMax { .. })
        ));
    }

    #[test]
    fn large_threshold_is_inclusive() {
        let rules = RuleSet::conservative();
        assert!(rules.is_large(10_000_000));
        assert!(!rules.is_large(9_999_999));
    }

    #[test]
    fn permissive_allows_large_with_one_signer() {
        assert!(RuleSet::permissive().validate(60_000_000, 1, 3).is_ok());
    }

    #[test]
    fn cooling_applies_only_to_large_with_history() {
        let rules = RuleSet::conservative();
        assert!(rules.cooling_ok(200, None, 50_000_000));
        assert!(rules.cooling_ok(101, Some(100), 1_000));
        assert!(!rules.cooling_ok(200, Some(100), 50_000_000));
        assert!(rules.cooling_ok(244, Some(100), 50_000_000));
        assert_eq!(
            rules.check_cooling(200, Some(100), 50_000_000),
            Err(AuthorizationError::CoolingPeriodActive { remaining: 44 })
        );
    }

    #[test]
    fn cooling_with_last_in_the_future_is_active() {
        let rules = RuleSet::conservative();
        assert_eq!(
            rules.check_cooling(50, Some(100), 50_000_000),
            Err(AuthorizationError::CoolingPeriodActive { remaining: 144 })
        );
    }

    #[test]
    fn parameter_validation() {
        assert!(RuleSet::conservative().validate_parameters().is_ok());
        assert!(RuleSet::permissive().validate_parameters().is_ok());
        let zero = RuleSet {
            min_signers: 0,
            ..RuleSet::conservative()
        };
        assert_eq!(zero.validate_parameters(), Err(RuleSetError::ZeroMinSigners));
        let steep = RuleSet {
            early_withdrawal_penalty_bps: 10_001,
            ..RuleSet::conservative()
        };
        assert_eq!(steep.validate_parameters(), Err(RuleSetError::PenaltyOutOfRange(10_001)));
    }

    #[test]
    fn canonical_bytes_are_deterministic_and_distinct() {
        let a = RuleSet::conservative().to_canonical_bytes().unwrap();
        let b = RuleSet::conservative().to_canonical_bytes().unwrap();
        let c = RuleSet::permissive().to_canonical_bytes().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
