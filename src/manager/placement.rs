//! Replica placement by geohash proximity
//!
//! Nodes are scored by the length of the geohash prefix they share with the
//! requester's location. Longer shared prefixes mean smaller common cells,
//! so the highest scores are the nearest nodes. Ties fall back to the cargo
//! identity so the same registry state always yields the same replica set.

use crate::common::geohash::{encode, shared_prefix_len};
use crate::common::{RankOrder, Result};
use crate::manager::registry::{Candidate, Registry};

/// ProximityRanker orders registered cargo nodes relative to a query point.
#[derive(Debug, Clone, Copy)]
pub struct ProximityRanker {
    order: RankOrder,
    precision: usize,
}

impl ProximityRanker {
    pub fn new(order: RankOrder, precision: usize) -> Self {
        Self { order, precision }
    }

    /// Up to `k` cargo identities for (lat, lon), best first.
    ///
    /// Never fails on an empty registry; returns fewer than `k` ids when
    /// fewer nodes are registered.
    pub fn rank(&self, registry: &Registry, lat: f64, lon: f64, k: usize) -> Result<Vec<String>> {
        let query = encode(lat, lon, self.precision);
        let candidates = registry.candidates()?;
        let ranked = self.rank_candidates(&query, candidates, k);

        tracing::debug!(
            query = %query,
            requested = k,
            selected = ranked.len(),
            "Ranked cargo nodes"
        );
        Ok(ranked)
    }

    /// Order a candidate snapshot against a query geohash and keep the first `k`.
    pub fn rank_candidates(&self, query: &str, candidates: Vec<Candidate>, k: usize) -> Vec<String> {
        let mut scored: Vec<(usize, String)> = candidates
            .into_iter()
            .map(|c| (shared_prefix_len(query, &c.geohash), c.id))
            .collect();

        let order = self.order;
        scored.sort_by(|a, b| {
            let by_score = match order {
                RankOrder::Nearest => b.0.cmp(&a.0),
                RankOrder::Legacy => a.0.cmp(&b.0),
            };
            by_score.then_with(|| a.1.cmp(&b.1))
        });

        scored.truncate(k);
        scored.into_iter().map(|(_, id)| id).collect()
    }
}
