//! # Vault Share Token Ledger
//!
//! Each vault gets one fungible token whose supply is fixed at
//! 100,000,000 units = 100% of the vault. Members are minted their share at
//! creation; after that, tokens move only by transfer. Token balance is
//! voting weight in [`governance`](crate::governance).
//!
//! ## Invariants
//!
//! - `sum(balances) == total_supply`, always. There is no mint after
//!   creation and no burn.
//! - A failed operation changes nothing: balances, allowances, and the log
//!   are all untouched.
//! - The transfer log is append-only.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

use covault_protocol::config::{BPS_DENOMINATOR, TOKEN_DECIMALS, TOKEN_TOTAL_SUPPLY, TOTAL_SHARE_PERCENT};
use covault_protocol::vault::{MemberId, VaultState};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Zero-amount transfers are refused.
    #[error("transfer amount must be positive")]
    InvalidAmount,

    #[error("insufficient funds: {account} has {balance}, needs {amount}")]
    InsufficientFunds {
        account: String,
        balance: u64,
        amount: u64,
    },

    #[error("insufficient allowance: {spender} may move {allowance} for {owner}, needs {amount}")]
    InsufficientAllowance {
        owner: String,
        spender: String,
        allowance: u64,
        amount: u64,
    },

    /// A credit would overflow. Unreachable while the supply invariant
    /// holds, but checked anyway.
    #[error("balance overflow")]
    Overflow,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Display metadata, derived from the vault id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub vault_type: String,
    pub description: String,
}

/// One member's initial mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAllocation {
    pub recipient: MemberId,
    pub amount: u64,
    pub share_percent: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferKind {
    Mint,
    Transfer,
    /// Moved by an approved spender.
    Delegated { spender: MemberId },
}

/// An entry in the append-only transfer log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEntry {
    /// Position in the log, starting at zero.
    pub sequence: u64,
    /// `None` for mints.
    pub from: Option<MemberId>,
    pub to: MemberId,
    pub amount: u64,
    #[serde(flatten)]
    pub kind: TransferKind,
}

/// Per-vault share token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLedger {
    vault_id: String,
    metadata: TokenMetadata,
    total_supply: u64,
    balances: BTreeMap<MemberId, u64>,
    allowances: BTreeMap<MemberId, BTreeMap<MemberId, u64>>,
    allocations: Vec<TokenAllocation>,
    transfer_log: Vec<TransferEntry>,
}

impl TokenLedger {
    /// Create the ledger for `vault` and mint every member's share.
    ///
    /// Each member receives `floor(supply * share / 100)`. Whatever that
    /// leaves unassigned goes to the largest holder (first in stored order
    /// on a tie). With integral shares summing to 100 there is never any
    /// remainder, but the rule is applied regardless.
    pub fn create(vault: &VaultState) -> Self {
        let vault_id = vault.vault_id_hex();
        let metadata = TokenMetadata {
            name: format!("Vault Share Token {}", &vault_id[..8]),
            symbol: format!("VST{}", vault_id[..4].to_uppercase()),
            decimals: TOKEN_DECIMALS,
            vault_type: "MultiPartyVault".to_string(),
            description: format!("Governance token for multi-party vault {vault_id}"),
        };

        let mut allocations: Vec<TokenAllocation> = vault
            .members()
            .iter()
            .map(|m| TokenAllocation {
                recipient: m.identity.clone(),
                amount: (u128::from(TOKEN_TOTAL_SUPPLY) * u128::from(m.share_percent)
                    / u128::from(TOTAL_SHARE_PERCENT)) as u64,
                share_percent: m.share_percent,
            })
            .collect();

        let minted: u64 = allocations.iter().map(|a| a.amount).sum();
        let remainder = TOKEN_TOTAL_SUPPLY - minted;
        let largest = allocations
            .iter()
            .enumerate()
            .fold(None::<(usize, u8)>, |best, (i, a)| match best {
                Some((_, share)) if share >= a.share_percent => best,
                _ => Some((i, a.share_percent)),
            })
            .map(|(i, _)| i);
        if let Some(i) = largest {
            allocations[i].amount += remainder;
            debug!(
                recipient = %allocations[i].recipient.short(),
                remainder,
                "minting remainder assigned"
            );
        }

        let mut ledger = Self {
            vault_id,
            metadata,
            total_supply: TOKEN_TOTAL_SUPPLY,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
            allocations: Vec::new(),
            transfer_log: Vec::new(),
        };
        for alloc in &allocations {
            *ledger.balances.entry(alloc.recipient.clone()).or_default() += alloc.amount;
            ledger.log(None, alloc.recipient.clone(), alloc.amount, TransferKind::Mint);
        }
        ledger.allocations = allocations;

        info!(
            vault_id = %ledger.vault_id,
            symbol = %ledger.metadata.symbol,
            holders = ledger.balances.len(),
            "share token minted"
        );
        ledger
    }

    pub fn vault_id(&self) -> &str {
        &self.vault_id
    }

    pub fn metadata(&self) -> &TokenMetadata {
        &self.metadata
    }

    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    /// Initial mint, in member order.
    pub fn allocations(&self) -> &[TokenAllocation] {
        &self.allocations
    }

    pub fn transfer_log(&self) -> &[TransferEntry] {
        &self.transfer_log
    }

    pub fn balance_of(&self, account: &MemberId) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Accounts with a non-zero balance, in identity order.
    pub fn holders(&self) -> impl Iterator<Item = (&MemberId, u64)> {
        self.balances
            .iter()
            .filter(|(_, balance)| **balance > 0)
            .map(|(id, balance)| (id, *balance))
    }

    /// Sum of all balances. Equals `total_supply` unless something is badly
    /// wrong.
    pub fn circulating(&self) -> u64 {
        self.balances.values().sum()
    }

    /// Move `amount` from `from` to `to`.
    ///
    /// A transfer to self is accepted (and logged) and leaves balances
    /// as they were.
    pub fn transfer(&mut self, from: &MemberId, to: &MemberId, amount: u64) -> Result<(), LedgerError> {
        self.check_transfer(from, to, amount)?;
        self.apply_transfer(from, to, amount);
        self.log(Some(from.clone()), to.clone(), amount, TransferKind::Transfer);
        debug!(from = %from.short(), to = %to.short(), amount, "tokens transferred");
        Ok(())
    }

    /// Set how much `spender` may move on `owner`'s behalf. Overwrites any
    /// previous allowance; zero revokes.
    pub fn approve(&mut self, owner: &MemberId, spender: &MemberId, amount: u64) {
        if amount == 0 {
            if let Some(inner) = self.allowances.get_mut(owner) {
                inner.remove(spender);
                if inner.is_empty() {
                    self.allowances.remove(owner);
                }
            }
        } else {
            self.allowances
                .entry(owner.clone())
                .or_default()
                .insert(spender.clone(), amount);
        }
        debug!(owner = %owner.short(), spender = %spender.short(), amount, "allowance set");
    }

    pub fn allowance(&self, owner: &MemberId, spender: &MemberId) -> u64 {
        self.allowances
            .get(owner)
            .and_then(|inner| inner.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// `spender` moves `amount` from `owner` to `to`, consuming allowance.
    pub fn transfer_from(
        &mut self,
        spender: &MemberId,
        owner: &MemberId,
        to: &MemberId,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let allowance = self.allowance(owner, spender);
        if amount > 0 && allowance < amount {
            return Err(LedgerError::InsufficientAllowance {
                owner: owner.to_hex(),
                spender: spender.to_hex(),
                allowance,
                amount,
            });
        }
        self.check_transfer(owner, to, amount)?;

        self.apply_transfer(owner, to, amount);
        self.approve(owner, spender, allowance - amount);
        self.log(
            Some(owner.clone()),
            to.clone(),
            amount,
            TransferKind::Delegated {
                spender: spender.clone(),
            },
        );
        Ok(())
    }

    /// Voting power as a percentage of supply. Reporting only; thresholds
    /// compare [`voting_power_bps`](Self::voting_power_bps).
    pub fn voting_power(&self, account: &MemberId) -> f64 {
        self.balance_of(account) as f64 / self.total_supply as f64 * 100.0
    }

    /// Voting power in basis points, floored.
    pub fn voting_power_bps(&self, account: &MemberId) -> u64 {
        (u128::from(self.balance_of(account)) * u128::from(BPS_DENOMINATOR)
            / u128::from(self.total_supply)) as u64
    }

    // -- internals --

    fn check_transfer(&self, from: &MemberId, to: &MemberId, amount: u64) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(LedgerError::InsufficientFunds {
                account: from.to_hex(),
                balance,
                amount,
            });
        }
        if from != to && self.balance_of(to).checked_add(amount).is_none() {
            return Err(LedgerError::Overflow);
        }
        Ok(())
    }

    /// Caller has run `check_transfer`.
    fn apply_transfer(&mut self, from: &MemberId, to: &MemberId, amount: u64) {
        if from == to {
            return;
        }
        if let Some(b) = self.balances.get_mut(from) {
            *b -= amount;
        }
        *self.balances.entry(to.clone()).or_default() += amount;
    }

    fn log(&mut self, from: Option<MemberId>, to: MemberId, amount: u64, kind: TransferKind) {
        let sequence = self.transfer_log.len() as u64;
        self.transfer_log.push(TransferEntry {
            sequence,
            from,
            to,
            amount,
            kind,
        });
    }
}
