//! Per-neighbor delivery-predictability store.
//!
//! Implements the probabilistic routing metric: direct contact updates,
//! transitive (A meets B, inherits B's knowledge about C) updates, and lazy
//! exponential aging. Values are aged before every read so callers always
//! observe fresh estimates; unknown hosts silently yield 0.

use std::collections::HashMap;

use crate::{HostId, PredMap, RouterConfig, SimTime};

/// Private delivery-predictability map of a single node.
#[derive(Debug, Clone)]
pub struct PredictabilityStore {
    owner: HostId,
    entries: HashMap<HostId, f64>,
    /// Last sim time the entries were aged.
    last_aged: SimTime,
    seconds_per_unit: f64,
    p_init: f64,
    beta: f64,
    gamma: f64,
}

impl PredictabilityStore {
    /// Create an empty store for `owner` with the configured constants.
    pub fn new(owner: HostId, config: &RouterConfig) -> Self {
        Self {
            owner,
            entries: HashMap::new(),
            last_aged: 0.0,
            seconds_per_unit: f64::from(config.seconds_in_time_unit),
            p_init: config.p_init,
            beta: config.beta,
            gamma: config.gamma,
        }
    }

    /// Current prediction value for `host`, 0 if no entry exists.
    ///
    /// Ages all entries first so reads are always fresh.
    pub fn pred_for(&mut self, host: &HostId, now: SimTime) -> f64 {
        self.age(now);
        self.entries.get(host).copied().unwrap_or(0.0)
    }

    /// Update the prediction for a host we just met:
    /// `P(a,b) = P(a,b)_old + (1 - P(a,b)_old) * P_INIT`.
    ///
    /// Called exactly once per contact-up event per peer.
    pub fn on_contact(&mut self, host: &HostId, now: SimTime) {
        self.age(now);
        let old = self.entries.get(host).copied().unwrap_or(0.0);
        let new = old + (1.0 - old) * self.p_init;
        self.entries.insert(host.clone(), new);
    }

    /// Update transitive (A->B->C) delivery predictions:
    /// `P(a,c) = P(a,c)_old + (1 - P(a,c)_old) * P(a,b) * P(b,c) * BETA`.
    ///
    /// `peer_preds` is the met host's exposed (already aged) map; the
    /// owner's own entry is skipped.
    pub fn on_transitive(&mut self, peer: &HostId, peer_preds: &PredMap, now: SimTime) {
        let p_for_peer = self.pred_for(peer, now);
        for (dest, &p_peer_dest) in peer_preds {
            if *dest == self.owner {
                continue;
            }
            let old = self.entries.get(dest).copied().unwrap_or(0.0);
            let new = old + (1.0 - old) * p_for_peer * p_peer_dest * self.beta;
            self.entries.insert(dest.clone(), new);
        }
    }

    /// Age all entries: `P = P_old * GAMMA^k`, where `k` is the number of
    /// time units elapsed since the last aging.
    ///
    /// A zero elapsed time is a no-op, so aging is idempotent within the
    /// same simulated instant.
    pub fn age(&mut self, now: SimTime) {
        let elapsed_units = (now - self.last_aged) / self.seconds_per_unit;
        if elapsed_units <= 0.0 {
            return;
        }
        let mult = self.gamma.powf(elapsed_units);
        for value in self.entries.values_mut() {
            *value *= mult;
        }
        self.last_aged = now;
    }

    /// An aged copy of the map, for transitive exchange with a peer or for
    /// seeding an aggregation accumulator.
    ///
    /// This read is pure: the decayed values are computed on the fly and
    /// the persistent write-back happens on the next mutating touch.
    pub fn aged_snapshot(&self, now: SimTime) -> PredMap {
        let elapsed_units = (now - self.last_aged) / self.seconds_per_unit;
        if elapsed_units <= 0.0 {
            return self.entries.clone();
        }
        let mult = self.gamma.powf(elapsed_units);
        self.entries
            .iter()
            .map(|(host, value)| (host.clone(), value * mult))
            .collect()
    }

    /// Number of known destinations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no destination is known yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RouterConfig;

    fn store() -> PredictabilityStore {
        let config = RouterConfig::new(1).with_communities_attributes("a:4,b:3");
        PredictabilityStore::new(HostId::new("a1"), &config)
    }

    #[test]
    fn unknown_host_yields_zero() {
        let mut s = store();
        assert_eq!(s.pred_for(&HostId::new("b5"), 0.0), 0.0);
    }

    #[test]
    fn first_contact_sets_p_init() {
        let mut s = store();
        let peer = HostId::new("a2");
        s.on_contact(&peer, 0.0);
        assert_eq!(s.pred_for(&peer, 0.0), 0.75);
    }

    #[test]
    fn repeated_contact_approaches_one() {
        let mut s = store();
        let peer = HostId::new("a2");
        s.on_contact(&peer, 0.0);
        s.on_contact(&peer, 0.0);
        // 0.75 + 0.25 * 0.75
        assert!((s.pred_for(&peer, 0.0) - 0.9375).abs() < 1e-12);
    }

    #[test]
    fn aging_two_units() {
        let mut s = store();
        let peer = HostId::new("a2");
        s.on_contact(&peer, 0.0);
        let aged = s.pred_for(&peer, 2.0);
        assert!((aged - 0.75 * 0.98_f64.powi(2)).abs() < 1e-12);
        assert!((aged - 0.7203).abs() < 1e-12);
    }

    #[test]
    fn aging_is_idempotent_within_an_instant() {
        let mut s = store();
        let peer = HostId::new("a2");
        s.on_contact(&peer, 0.0);
        s.age(5.0);
        let first = s.pred_for(&peer, 5.0);
        s.age(5.0);
        assert_eq!(s.pred_for(&peer, 5.0), first);
    }

    #[test]
    fn transitive_update_skips_owner() {
        let mut s = store();
        let peer = HostId::new("a2");
        s.on_contact(&peer, 0.0);
        let mut peer_map = PredMap::new();
        peer_map.insert(HostId::new("a1"), 0.9); // the owner itself
        peer_map.insert(HostId::new("b5"), 0.8);
        s.on_transitive(&peer, &peer_map, 0.0);
        // own entry untouched, third party gained 0.75 * 0.8 * 0.25
        assert_eq!(s.pred_for(&HostId::new("a1"), 0.0), 0.0);
        assert!((s.pred_for(&HostId::new("b5"), 0.0) - 0.15).abs() < 1e-12);
    }

    #[test]
    fn snapshot_matches_aged_reads() {
        let mut s = store();
        let peer = HostId::new("a2");
        s.on_contact(&peer, 0.0);
        let snap = s.aged_snapshot(2.0);
        assert!((snap[&peer] - s.pred_for(&peer, 2.0)).abs() < 1e-12);
    }
}
