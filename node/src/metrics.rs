//! # Prometheus Metrics
//!
//! Operational counters for the vault service. `covault-node run --metrics`
//! dumps them in text exposition format once the scenario finishes.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Holds all Prometheus metric handles for the service.
#[derive(Clone)]
pub struct ServiceMetrics {
    registry: Registry,
    /// Vaults currently held by the repository.
    pub vaults: IntGauge,
    /// Withdrawals the predicate approved.
    pub withdrawals_authorized_total: IntCounter,
    /// Withdrawals refused, labelled by denial reason.
    pub withdrawals_denied_total: IntCounterVec,
    /// Withdrawals debited from a vault.
    pub withdrawals_executed_total: IntCounter,
    /// Sum of net amounts debited.
    pub withdrawn_amount_total: IntCounter,
    pub deposits_total: IntCounter,
    pub proposals_created_total: IntCounter,
    pub votes_cast_total: IntCounter,
    /// Proposals whose effect was applied to a vault.
    pub proposals_executed_total: IntCounter,
}

impl ServiceMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("covault".into()), None)?;

        let vaults = IntGauge::new("vaults", "Number of vaults held by this node")?;
        registry.register(Box::new(vaults.clone()))?;

        let withdrawals_authorized_total = IntCounter::new(
            "withdrawals_authorized_total",
            "Withdrawal requests approved by the authorization predicate",
        )?;
        registry.register(Box::new(withdrawals_authorized_total.clone()))?;

        let withdrawals_denied_total = IntCounterVec::new(
            Opts::new(
                "withdrawals_denied_total",
                "Withdrawal requests refused, by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(withdrawals_denied_total.clone()))?;

        let withdrawals_executed_total = IntCounter::new(
            "withdrawals_executed_total",
            "Withdrawals debited from a vault",
        )?;
        registry.register(Box::new(withdrawals_executed_total.clone()))?;

        let withdrawn_amount_total = IntCounter::new(
            "withdrawn_amount_total",
            "Net amount debited across all vaults",
        )?;
        registry.register(Box::new(withdrawn_amount_total.clone()))?;

        let deposits_total = IntCounter::new("deposits_total", "Deposits credited to a vault")?;
        registry.register(Box::new(deposits_total.clone()))?;

        let proposals_created_total =
            IntCounter::new("proposals_created_total", "Governance proposals opened")?;
        registry.register(Box::new(proposals_created_total.clone()))?;

        let votes_cast_total = IntCounter::new("votes_cast_total", "Governance votes accepted")?;
        registry.register(Box::new(votes_cast_total.clone()))?;

        let proposals_executed_total = IntCounter::new(
            "proposals_executed_total",
            "Passed proposals applied to a vault",
        )?;
        registry.register(Box::new(proposals_executed_total.clone()))?;

        Ok(Self {
            registry,
            vaults,
            withdrawals_authorized_total,
            withdrawals_denied_total,
            withdrawals_executed_total,
            withdrawn_amount_total,
            deposits_total,
            proposals_created_total,
            votes_cast_total,
            proposals_executed_total,
        })
    }

    /// Record a denial under its reason label.
    pub fn record_denial(&self, reason: &str) {
        self.withdrawals_denied_total.with_label_values(&[reason]).inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
