//! Prometheus metrics for the coordinator.
//!
//! Exported at the `/metrics` endpoint:
//! - `store_ops`: store operations by result (stored / quorum_failed)
//! - `challenge_rounds`: challenge rounds by result (verified / timeout /
//!   proof_mismatch / commitment_mismatch / bad_signature / transport)
//! - `retrieve_ops`: retrievals by result (ok / unavailable)
//! - `placement_records`: placement records currently tracked

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::{Arc, Mutex};
use tracing::error;

type ResultLabel = [(String, String); 1];

/// Prometheus metrics collection for the coordinator.
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Mutex<Registry>>,

    pub store_ops: Family<ResultLabel, Counter>,
    pub challenge_rounds: Family<ResultLabel, Counter>,
    pub retrieve_ops: Family<ResultLabel, Counter>,
    pub placement_records: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let store_ops = Family::<ResultLabel, Counter>::default();
        registry.register("store_ops", "Store operations by result", store_ops.clone());

        let challenge_rounds = Family::<ResultLabel, Counter>::default();
        registry.register(
            "challenge_rounds",
            "Challenge rounds by result",
            challenge_rounds.clone(),
        );

        let retrieve_ops = Family::<ResultLabel, Counter>::default();
        registry.register(
            "retrieve_ops",
            "Retrieve operations by result",
            retrieve_ops.clone(),
        );

        let placement_records = Gauge::default();
        registry.register(
            "placement_records",
            "Placement records currently tracked",
            placement_records.clone(),
        );

        Self {
            registry: Arc::new(Mutex::new(registry)),
            store_ops,
            challenge_rounds,
            retrieve_ops,
            placement_records,
        }
    }

    /// Count one operation outcome under the `result` label.
    pub fn count(family: &Family<ResultLabel, Counter>, result: &str) {
        family
            .get_or_create(&[("result".to_string(), result.to_string())])
            .inc();
    }

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        match self.registry.lock() {
            Ok(registry) => {
                if let Err(e) = encode(&mut out, &registry) {
                    error!(error = %e, "Failed to encode metrics");
                }
            }
            Err(e) => error!(error = %e, "Metrics registry lock poisoned"),
        }
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
