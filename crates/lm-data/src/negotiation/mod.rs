//! Query tier negotiation
//!
//! A document store builds composite indexes asynchronously after the first
//! query that needs them. Until then the most selective query is rejected,
//! so the negotiator probes tiers from most to least selective and adopts the
//! first one the store accepts. Client-side refinement (see
//! [`QueryPlan::refine`]) hides the difference from consumers.

mod plan;

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::store::DocumentStore;
use crate::StoreError;

pub use plan::{QueryPlan, QueryTarget, QueryTier};

/// Errors that end a negotiation without a plan
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NegotiationError {
    /// Every tier was rejected for a missing index
    #[error("No queryable tier for collection '{collection}': {last}")]
    Exhausted { collection: String, last: StoreError },

    /// A probe failed for a reason a coarser query cannot fix
    #[error("Probe of {tier} tier failed: {source}")]
    Store {
        tier: QueryTier,
        #[source]
        source: StoreError,
    },
}

/// Outcome of one probe read
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeAttempt {
    pub tier: QueryTier,
    /// Number of matching records, or why the probe failed
    pub result: Result<usize, StoreError>,
}

/// An adopted plan and the probes it took to find it
#[derive(Debug, Clone)]
pub struct Negotiation {
    pub plan: QueryPlan,
    pub attempts: Vec<ProbeAttempt>,
}

/// Probes a store for the most selective tier it currently supports
pub struct QueryNegotiator {
    store: Arc<dyn DocumentStore>,
}

impl QueryNegotiator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Find the most selective tier the store accepts right now
    pub async fn negotiate(&self, target: &QueryTarget) -> Result<Negotiation, NegotiationError> {
        let mut attempts = Vec::with_capacity(QueryTier::FALLBACK_ORDER.len());
        let mut last_error = None;

        for tier in QueryTier::FALLBACK_ORDER {
            let plan = QueryPlan::new(tier, target.clone());
            debug!("Probing {} tier on {}", tier, self.store.store_name());

            // Index availability is backend state; only a real read can tell.
            match self.store.get(&plan.query()).await {
                Ok(records) => {
                    attempts.push(ProbeAttempt {
                        tier,
                        result: Ok(records.len()),
                    });
                    info!(
                        "Adopted {} tier for '{}' (owner {}) after {} probe(s)",
                        tier,
                        target.collection,
                        target.owner,
                        attempts.len()
                    );
                    return Ok(Negotiation { plan, attempts });
                }
                Err(err) if err.is_degradable() => {
                    warn!(
                        "Falling back from {} tier for '{}' while the index builds: {}",
                        tier, target.collection, err
                    );
                    attempts.push(ProbeAttempt {
                        tier,
                        result: Err(err.clone()),
                    });
                    last_error = Some(err);
                }
                Err(err) => {
                    return Err(NegotiationError::Store { tier, source: err });
                }
            }
        }

        let last = last_error
            .unwrap_or_else(|| StoreError::MissingIndex("no tier attempted".to_string()));
        Err(NegotiationError::Exhausted {
            collection: target.collection.clone(),
            last,
        })
    }
}
