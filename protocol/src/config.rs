//! # Protocol Configuration & Constants
//!
//! Every magic number in Covault lives here. Domain tags, supply figures,
//! governance thresholds, and the two illustrative policy presets. If you
//! find yourself typing `100_000_000` anywhere else, import it from here.
//!
//! Changing a domain tag changes every digest derived from it, which
//! invalidates every outstanding commitment and proof envelope. Don't.

// ---------------------------------------------------------------------------
// Domain Tags
// ---------------------------------------------------------------------------

/// Prefix mixed into the vault id digest ahead of the sorted member keys.
pub const VAULT_ID_DOMAIN: &[u8] = b"MULTIPARTY_VAULT_V1";

/// BLAKE3 `derive_key` context for the attestation statement transcript.
pub const ATTESTATION_CONTEXT: &str = "covault 2026-01 withdrawal attestation v1";

/// Prefix of the canonical message members sign to approve a withdrawal.
pub const APPROVAL_DOMAIN: &[u8] = b"COVAULT_WITHDRAWAL_APPROVAL_V1";

/// Marker bytes for an approved statement.
pub const VALIDITY_MARKER_VALID: &[u8] = b"VALID";

/// Marker bytes for a rejected statement. Envelopes carrying this never verify.
pub const VALIDITY_MARKER_INVALID: &[u8] = b"INVALID";

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Digest length in bytes. SHA-256 and BLAKE3 both produce 32.
pub const HASH_OUTPUT_LENGTH: usize = 32;

/// Ed25519 public key length.
pub const VERIFYING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length. Always 64 bytes.
pub const SIGNATURE_LENGTH: usize = 64;

// ---------------------------------------------------------------------------
// Vault Parameters
// ---------------------------------------------------------------------------

/// Member shares must sum to exactly this.
pub const TOTAL_SHARE_PERCENT: u32 = 100;

/// Basis-point denominator. 10_000 bps = 100%.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Distinct signers required on the emergency path, regardless of rules.
pub const EMERGENCY_MIN_SIGNERS: usize = 2;

/// Hex characters kept from a receipt id digest.
pub const RECEIPT_ID_HEX_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Governance Parameters
// ---------------------------------------------------------------------------

/// Governance token supply. 100M units = 100% of the vault.
pub const TOKEN_TOTAL_SUPPLY: u64 = 100_000_000;

/// Display precision of the governance token.
pub const TOKEN_DECIMALS: u8 = 8;

/// Minimum voting power to open a proposal, in bps (5%).
pub const MIN_PROPOSAL_POWER_BPS: u64 = 500;

/// Default approval threshold for a proposal, in bps (51%).
pub const DEFAULT_REQUIRED_VOTING_POWER_BPS: u64 = 5_100;

/// Default voting window in blocks (~1 week at 10-minute blocks).
pub const DEFAULT_VOTING_PERIOD_BLOCKS: u32 = 1_008;

/// Default delay between passing and executing, in blocks (~1 day).
pub const DEFAULT_EXECUTION_DELAY_BLOCKS: u32 = 144;

/// Hex characters kept from a proposal id digest.
pub const PROPOSAL_ID_HEX_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Policy Presets
// ---------------------------------------------------------------------------

/// Values for the conservative preset. 1 BTC = 100_000_000 sats.
pub mod conservative {
    pub const MIN_SIGNERS: usize = 2;
    /// 0.1 BTC.
    pub const LARGE_WITHDRAWAL_THRESHOLD: u64 = 10_000_000;
    pub const LARGE_WITHDRAWAL_REQUIRES_ALL: bool = true;
    /// 10%.
    pub const EARLY_WITHDRAWAL_PENALTY_BPS: u32 = 1_000;
    pub const PENALTY_FREE_HEIGHT: u32 = 0;
    /// ~1 year of blocks.
    pub const EMERGENCY_TIMEOUT_BLOCKS: u32 = 52_560;
    /// 1 BTC.
    pub const MAX_SINGLE_WITHDRAWAL: u64 = 100_000_000;
    /// ~1 day.
    pub const WITHDRAWAL_COOLING_PERIOD: u32 = 144;
}

/// Values for the permissive preset. Looser on every axis.
pub mod permissive {
    pub const MIN_SIGNERS: usize = 1;
    /// 0.5 BTC.
    pub const LARGE_WITHDRAWAL_THRESHOLD: u64 = 50_000_000;
    pub const LARGE_WITHDRAWAL_REQUIRES_ALL: bool = false;
    /// 5%.
    pub const EARLY_WITHDRAWAL_PENALTY_BPS: u32 = 500;
    pub const PENALTY_FREE_HEIGHT: u32 = 0;
    /// ~6 months.
    pub const EMERGENCY_TIMEOUT_BLOCKS: u32 = 26_280;
    /// 2 BTC.
    pub const MAX_SINGLE_WITHDRAWAL: u64 = 200_000_000;
    /// ~12 hours.
    pub const WITHDRAWAL_COOLING_PERIOD: u32 = 72;
}
