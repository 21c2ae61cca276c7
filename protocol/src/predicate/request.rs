use serde::{Deserialize, Serialize};

use crate::config::APPROVAL_DOMAIN;
use crate::crypto::hash::Digest;
use crate::vault::{MemberId, VaultError};

/// A caller's request to take money out of a vault.
///
/// Not retained past one evaluation. The executor copies what it needs into
/// the withdrawal history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// Gross amount, before any penalty.
    pub amount: u64,
    /// Caller-supplied chain height. Assumed non-decreasing, never checked.
    pub current_height: u32,
    /// Member identities that approved this withdrawal.
    pub signers: Vec<MemberId>,
    #[serde(default)]
    pub is_emergency: bool,
    /// Height of the vault's previous withdrawal, for the cooling check.
    #[serde(default)]
    pub last_withdrawal_height: Option<u32>,
    /// Destination. Opaque to the predicate.
    #[serde(default)]
    pub recipient: Option<String>,
}

impl WithdrawalRequest {
    pub fn new(amount: u64, current_height: u32, signers: Vec<MemberId>) -> Self {
        Self {
            amount,
            current_height,
            signers,
            is_emergency: false,
            last_withdrawal_height: None,
            recipient: None,
        }
    }

    /// Build a request from hex signer identities.
    pub fn from_hex_signers<S: AsRef<str>>(
        amount: u64,
        current_height: u32,
        signers: &[S],
    ) -> Result<Self, VaultError> {
        let signers = signers
            .iter()
            .map(|s| MemberId::parse(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(amount, current_height, signers))
    }

    /// Mark as an emergency withdrawal.
    pub fn emergency(mut self) -> Self {
        self.is_emergency = true;
        self
    }

    pub fn with_last_withdrawal(mut self, height: Option<u32>) -> Self {
        self.last_withdrawal_height = height;
        self
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    /// Canonical bytes a member signs to approve this request against a
    /// specific vault commitment.
    ///
    /// ```text
    /// APPROVAL_DOMAIN ‖ commitment (32) ‖ amount (8, LE) ‖ height (4, LE)
    ///   ‖ emergency (1) ‖ recipient_len (8, LE) ‖ recipient
    /// ```
    ///
    /// Binding the commitment means an approval collected for one vault state
    /// is useless once the state moves on.
    pub fn approval_message(&self, commitment: &Digest) -> Vec<u8> {
        let recipient = self.recipient.as_deref().unwrap_or_default().as_bytes();
        let mut msg = Vec::with_capacity(APPROVAL_DOMAIN.len() + 53 + recipient.len());
        msg.extend_from_slice(APPROVAL_DOMAIN);
        msg.extend_from_slice(commitment);
        msg.extend_from_slice(&self.amount.to_le_bytes());
        msg.extend_from_slice(&self.current_height.to_le_bytes());
        msg.push(u8::from(self.is_emergency));
        // usize never exceeds 64 bits, so the length prefix is lossless.
        msg.extend_from_slice(&(recipient.len() as u64).to_le_bytes());
        msg.extend_from_slice(recipient);
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_flags() {
        let req = WithdrawalRequest::from_hex_signers(5, 10, &["aa", "bb"])
            .unwrap()
            .emergency()
            .with_last_withdrawal(Some(3))
            .with_recipient("bc1qexample");
        assert!(req.is_emergency);
        assert_eq!(req.last_withdrawal_height, Some(3));
        assert_eq!(req.recipient.as_deref(), Some("bc1qexample"));
        assert_eq!(req.signers.len(), 2);
    }

    #[test]
    fn bad_signer_hex_is_rejected() {
        assert!(WithdrawalRequest::from_hex_signers(5, 10, &["aa", "zz"]).is_err());
    }

    #[test]
    fn approval_message_layout() {
        let req = WithdrawalRequest::from_hex_signers(5, 10, &["aa"]).unwrap().with_recipient("bc1q");
        let msg = req.approval_message(&[7u8; 32]);
        let head = APPROVAL_DOMAIN.len() + 32 + 8 + 4 + 1;

        assert_eq!(msg.len(), head + 8 + 4);
        assert_eq!(&msg[head..head + 8], &4u64.to_le_bytes());
        assert_eq!(&msg[head + 8..], b"bc1q");

        let bare = WithdrawalRequest::from_hex_signers(5, 10, &["aa"]).unwrap();
        assert_eq!(bare.approval_message(&[7u8; 32]).len(), head + 8);
    }

    #[test]
    fn approval_message_binds_commitment_and_terms() {
        let req = WithdrawalRequest::from_hex_signers(5, 10, &["aa"]).unwrap();
        let m1 = req.approval_message(&[1u8; 32]);
        assert_ne!(m1, req.approval_message(&[2u8; 32]));

        let mut bigger = req.clone();
        bigger.amount = 6;
        assert_ne!(m1, bigger.approval_message(&[1u8; 32]));

        assert_ne!(m1, req.clone().emergency().approval_message(&[1u8; 32]));
        assert_ne!(m1, req.clone().with_recipient("x").approval_message(&[1u8; 32]));
        assert!(m1.starts_with(APPROVAL_DOMAIN));
    }

    #[test]
    fn json_defaults_optional_fields() {
        let req: WithdrawalRequest =
            serde_json::from_str(r#"{"amount":1,"current_height":2,"signers":["0a"]}"#).unwrap();
        assert!(!req.is_emergency);
        assert_eq!(req.last_withdrawal_height, None);
        assert_eq!(req.recipient, None);
    }
}
