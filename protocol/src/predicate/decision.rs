use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::AuthorizationError;

/// Which branch of the predicate approved a withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPath {
    /// Quorum, caps, and cooling were all checked.
    Normal,
    /// The emergency timeout elapsed; policy checks were bypassed.
    Emergency,
}

impl fmt::Display for ApprovalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Emergency => write!(f, "emergency"),
        }
    }
}

/// Outcome of one predicate evaluation. Pure output, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationDecision {
    Approved {
        path: ApprovalPath,
        /// Amount leaving the vault after the penalty.
        net_amount: u64,
        /// Early-withdrawal penalty retained by the vault.
        penalty: u64,
    },
    Denied(AuthorizationError),
}

impl AuthorizationDecision {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }

    /// The denial reason, if any.
    pub fn reason(&self) -> Option<&AuthorizationError> {
        match self {
            Self::Approved { .. } => None,
            Self::Denied(reason) => Some(reason),
        }
    }

    /// Net amount of an approval. Zero when denied.
    pub fn net_amount(&self) -> u64 {
        match self {
            Self::Approved { net_amount, .. } => *net_amount,
            Self::Denied(_) => 0,
        }
    }

    /// Penalty of an approval. Zero when denied.
    pub fn penalty(&self) -> u64 {
        match self {
            Self::Approved { penalty, .. } => *penalty,
            Self::Denied(_) => 0,
        }
    }

    pub fn path(&self) -> Option<ApprovalPath> {
        match self {
            Self::Approved { path, .. } => Some(*path),
            Self::Denied(_) => None,
        }
    }

    /// Convert into a `Result`, for `?` at call sites that only care about
    /// the happy path.
    pub fn into_result(self) -> Result<(ApprovalPath, u64, u64), AuthorizationError> {
        match self {
            Self::Approved {
                path,
                net_amount,
                penalty,
            } => Ok((path, net_amount, penalty)),
            Self::Denied(reason) => Err(reason),
        }
    }
}
