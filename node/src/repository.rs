//! # Vault Repository
//!
//! Where the node keeps its vaults. The service talks to the
//! [`VaultRepository`] trait, never to a concrete store, so a persistent
//! backend can replace [`InMemoryRepository`] without touching call sites.
//!
//! Every vault is handed out as `Arc<Mutex<VaultRecord>>`. Holding that lock
//! is what serializes evaluate-then-debit and transfer-versus-vote for a
//! single vault; different vaults never contend.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use covault_contracts::GovernanceEngine;
use covault_protocol::vault::MultiPartyVault;

use crate::service::ServiceError;

/// Everything the node knows about one vault.
#[derive(Debug, Clone)]
pub struct VaultRecord {
    /// Stable key. The vault id at creation; it does not follow later
    /// membership changes.
    pub handle: String,
    pub custody: MultiPartyVault,
    pub governance: GovernanceEngine,
    /// Set once an emergency-exit proposal has been applied.
    pub emergency_exit: bool,
}

impl VaultRecord {
    pub fn new(custody: MultiPartyVault) -> Self {
        let governance = GovernanceEngine::new(custody.state());
        Self {
            handle: custody.state().vault_id_hex(),
            custody,
            governance,
            emergency_exit: false,
        }
    }
}

pub type SharedRecord = Arc<Mutex<VaultRecord>>;

/// Storage seam for vault records.
pub trait VaultRepository: Send + Sync {
    /// Store a new vault. Fails if the handle is taken.
    fn create(&self, record: VaultRecord) -> Result<SharedRecord, ServiceError>;

    fn get(&self, handle: &str) -> Option<SharedRecord>;

    /// All handles, sorted.
    fn list(&self) -> Vec<String>;
}

/// Process-local repository backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    vaults: DashMap<String, SharedRecord>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VaultRepository for InMemoryRepository {
    fn create(&self, record: VaultRecord) -> Result<SharedRecord, ServiceError> {
        match self.vaults.entry(record.handle.clone()) {
            Entry::Occupied(e) => Err(ServiceError::VaultExists(e.key().clone())),
            Entry::Vacant(e) => {
                let shared = Arc::new(Mutex::new(record));
                e.insert(Arc::clone(&shared));
                Ok(shared)
            }
        }
    }

    fn get(&self, handle: &str) -> Option<SharedRecord> {
        self.vaults.get(handle).map(|r| Arc::clone(r.value()))
    }

    fn list(&self) -> Vec<String> {
        let mut handles: Vec<String> = self.vaults.iter().map(|r| r.key().clone()).collect();
        handles.sort();
        handles
    }
}
