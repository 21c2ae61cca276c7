use thiserror::Error;

/// Why a withdrawal was not authorized.
///
/// Variants are listed in evaluation order. Only the first failing check is
/// ever reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    /// The vault changed since the predicate was built.
    #[error("vault commitment changed: captured {captured}, current {current}")]
    CommitmentMismatch {
        /// Hex commitment captured at construction.
        captured: String,
        /// Hex commitment at evaluation.
        current: String,
    },

    /// A signer is not a member of the vault.
    #[error("signer {0} is not a vault member")]
    NonMember(String),

    /// A signer appears more than once.
    #[error("signer {0} appears more than once")]
    DuplicateSigner(String),

    #[error("quorum not met: {provided} of {required} required signers")]
    QuorumNotMet { required: usize, provided: usize },

    #[error("large withdrawal requires all {required} members, got {provided}")]
    LargeWithdrawalRequiresAll { required: usize, provided: usize },

    #[error("amount {amount} exceeds single-withdrawal cap {max}")]
    ExceedsMax { amount: u64, max: u64 },

    #[error("cooling period active: {remaining} blocks remaining")]
    CoolingPeriodActive { remaining: u32 },

    #[error("emergency timeout not elapsed: {remaining} blocks remaining")]
    EmergencyNotElapsed { remaining: u32 },

    #[error("emergency withdrawal needs {required} distinct signers, got {provided}")]
    EmergencyInsufficientSigners { required: usize, provided: usize },

    #[error("insufficient balance: net {requested}, available {available}")]
    InsufficientBalance { requested: u64, available: u64 },
}

impl AuthorizationError {
    /// Stable snake_case label, for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CommitmentMismatch { .. } => "commitment_mismatch",
            Self::NonMember(_) => "non_member",
            Self::DuplicateSigner(_) => "duplicate_signer",
            Self::QuorumNotMet { .. } => "quorum_not_met",
            Self::LargeWithdrawalRequiresAll { .. } => "large_withdrawal_requires_all",
            Self::ExceedsMax { .. } => "exceeds_max",
            Self::CoolingPeriodActive { .. } => "cooling_period_active",
            Self::EmergencyNotElapsed { .. } => "emergency_not_elapsed",
            Self::EmergencyInsufficientSigners { .. } => "emergency_insufficient_signers",
            Self::InsufficientBalance { .. } => "insufficient_balance",
        }
    }
}
