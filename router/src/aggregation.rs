//! Privacy-preserving community aggregation.
//!
//! Computes, at each community leader, a sum of member predictability
//! vectors such that no single relayed message reveals an individual
//! member's true values. Members mask their vectors through pairwise
//! random-number exchanges (a running randomized mask, not a cryptographic
//! commitment) and contribute them only after `k + 1` completed exchanges,
//! giving probabilistic k-anonymity.
//!
//! All accumulators in one round are keyed over the same host universe, so
//! a mask added on one side of an exchange cancels the mask subtracted on
//! the other side entry by entry once both accumulators reach the leader.
//!
//! Member-side state lives in [`MemberAggregation`], leader-side round
//! state in [`LeaderAggregation`], and the resulting community-level
//! belief in [`PublicEstimate`].

use rand::Rng;
use tracing::{debug, trace};

use crate::{HostId, InstanceId, PredMap, RouterError, RouterResult, SimTime};

/// Blind values are drawn uniformly from `1..BLIND_RANGE`, kept well under
/// f64's exact-integer range so paired masks cancel without rounding error.
const BLIND_RANGE: i64 = 1 << 20;

fn apply_blind(accumulator: &mut PredMap, value: i64) {
    let delta = value as f64;
    for entry in accumulator.values_mut() {
        *entry += delta;
    }
}

/// An open blinding exchange on an ordinary member.
///
/// The accumulator is non-empty only while an exchange is in progress; it
/// is flushed to the leader and cleared exactly when the encounter counter
/// reaches `k + 1`.
#[derive(Debug, Clone)]
pub struct BlindingExchange {
    /// Round instance the accumulator was opened for.
    pub instance: InstanceId,
    /// Leader to flush the blinded vector to.
    pub leader: HostId,
    accumulator: PredMap,
    /// Completed exchanges since the accumulator was opened. Repeat
    /// contacts with the same peer are separate encounters, which keeps
    /// minimum-size communities (`k + 1` members) able to finish a round.
    encounters: usize,
    /// An initiated exchange whose reply has not arrived yet: the peer and
    /// the blind we sent but have not applied.
    outstanding: Option<(HostId, i64)>,
}

impl BlindingExchange {
    /// Completed encounters since opening.
    pub fn encounters(&self) -> usize {
        self.encounters
    }

    /// The current (masked) accumulator, for inspection.
    pub fn accumulator(&self) -> &PredMap {
        &self.accumulator
    }
}

/// A flushed contribution ready to be sent to the leader.
#[derive(Debug, Clone)]
pub struct Contribution {
    /// The sufficiently blinded vector.
    pub preds: PredMap,
    /// Instance it belongs to.
    pub instance: InstanceId,
    /// The leader to address.
    pub leader: HostId,
}

/// Outcome of handling an incoming blind request.
#[derive(Debug)]
pub enum BlindOutcome {
    /// The exchange completed on this side: reply with our own blind, and
    /// possibly flush the accumulator.
    Reply {
        /// Freshly generated blind to send back.
        blind: i64,
        /// Present when this exchange was the `k + 1`-th.
        flushed: Option<Contribution>,
    },
    /// No open accumulator for that instance; nothing was mutated on this
    /// side.
    Ignored,
}

/// Member-side aggregation state.
#[derive(Debug)]
pub struct MemberAggregation {
    k_value: usize,
    exchange: Option<BlindingExchange>,
    /// Newest instance id observed; older signals are discarded.
    latest_instance: Option<InstanceId>,
}

impl MemberAggregation {
    /// Create idle member state with the configured anonymity threshold.
    pub fn new(k_value: usize) -> Self {
        Self {
            k_value,
            exchange: None,
            latest_instance: None,
        }
    }

    /// Whether an accumulator is currently open.
    pub fn is_open(&self) -> bool {
        self.exchange.is_some()
    }

    /// The open exchange, for inspection.
    pub fn exchange(&self) -> Option<&BlindingExchange> {
        self.exchange.as_ref()
    }

    /// Handle an aggregation-initiation signal from the community leader.
    ///
    /// A newer instance id supersedes and discards state from any older
    /// instance; an older or already-open instance is a no-op. `snapshot`
    /// must be keyed over the round's full host universe.
    pub fn on_init_signal(
        &mut self,
        leader: &HostId,
        instance: InstanceId,
        snapshot: PredMap,
    ) {
        if matches!(self.latest_instance, Some(latest) if instance <= latest) {
            return;
        }
        if let Some(old) = &self.exchange {
            debug!(
                old_instance = old.instance,
                new_instance = instance,
                "superseding aggregation instance, discarding open accumulator"
            );
        }
        self.latest_instance = Some(instance);
        self.exchange = Some(BlindingExchange {
            instance,
            leader: leader.clone(),
            accumulator: snapshot,
            encounters: 0,
            outstanding: None,
        });
    }

    /// Begin a blinding exchange with a newly contacted peer.
    ///
    /// Returns the blind value to send (with the instance it belongs to),
    /// or `None` when no accumulator is open or an exchange is already
    /// outstanding. Nothing is applied locally until the peer's reply
    /// arrives, so an ignored request mutates neither side.
    pub fn begin_exchange(
        &mut self,
        peer: &HostId,
        rng: &mut impl Rng,
    ) -> Option<(i64, InstanceId)> {
        let exchange = self.exchange.as_mut()?;
        if exchange.outstanding.is_some() {
            return None;
        }
        let blind = rng.gen_range(1..BLIND_RANGE);
        exchange.outstanding = Some((peer.clone(), blind));
        trace!(%peer, "initiating blinding exchange");
        Some((blind, exchange.instance))
    }

    /// Handle a blind request from `from` (the peer initiated).
    ///
    /// On a matching open accumulator: add the peer's blind, subtract a
    /// fresh one of our own, count the encounter and reply.
    pub fn on_blind_request(
        &mut self,
        from: &HostId,
        value: i64,
        instance: InstanceId,
        rng: &mut impl Rng,
    ) -> BlindOutcome {
        let open = match &mut self.exchange {
            Some(e) if e.instance == instance => e,
            _ => return BlindOutcome::Ignored,
        };
        let own = rng.gen_range(1..BLIND_RANGE);
        apply_blind(&mut open.accumulator, value);
        apply_blind(&mut open.accumulator, -own);
        open.encounters += 1;
        trace!(%from, encounters = open.encounters, "blinding exchange completed");
        let flushed = self.flush_if_ready();
        BlindOutcome::Reply {
            blind: own,
            flushed,
        }
    }

    /// Handle the reply to an exchange we initiated: apply the peer's blind
    /// and our own deferred one, count the encounter.
    pub fn on_blind_reply(
        &mut self,
        from: &HostId,
        value: i64,
        instance: InstanceId,
    ) -> Option<Contribution> {
        let exchange = self.exchange.as_mut()?;
        if exchange.instance != instance {
            return None;
        }
        match exchange.outstanding.take() {
            Some((peer, own)) if peer == *from => {
                apply_blind(&mut exchange.accumulator, value);
                apply_blind(&mut exchange.accumulator, -own);
                exchange.encounters += 1;
                self.flush_if_ready()
            }
            other => {
                // reply from an unexpected peer; restore and ignore
                exchange.outstanding = other;
                None
            }
        }
    }

    /// Drop a half-open exchange with a departed peer; nothing was applied.
    pub fn on_contact_down(&mut self, peer: &HostId) {
        if let Some(exchange) = &mut self.exchange {
            if matches!(&exchange.outstanding, Some((p, _)) if p == peer) {
                exchange.outstanding = None;
            }
        }
    }

    fn flush_if_ready(&mut self) -> Option<Contribution> {
        let ready = self
            .exchange
            .as_ref()
            .map(|e| e.encounters >= self.k_value + 1)
            .unwrap_or(false);
        if !ready {
            return None;
        }
        let exchange = self.exchange.take().expect("checked above");
        debug!(
            instance = exchange.instance,
            encounters = exchange.encounters,
            "flushing blinded vector to leader"
        );
        Some(Contribution {
            preds: exchange.accumulator,
            instance: exchange.instance,
            leader: exchange.leader,
        })
    }
}

/// One in-flight aggregation round on a leader.
#[derive(Debug, Clone)]
pub struct AggregationRound {
    /// Instance id `g` (integer sim time at initiation).
    pub instance: InstanceId,
    /// Phase counter `j`, bounded by `0 <= j <= accuracy + 1`.
    pub phase: u32,
    /// Working accumulator, seeded from the leader's own snapshot.
    accumulator: PredMap,
    /// Members whose contribution has been merged.
    responders: Vec<HostId>,
    /// When the round was initiated.
    pub started_at: SimTime,
}

impl AggregationRound {
    /// Members that have responded so far.
    pub fn responder_count(&self) -> usize {
        self.responders.len()
    }
}

/// Leader-side aggregation state.
#[derive(Debug)]
pub struct LeaderAggregation {
    min_interval: f64,
    accuracy: u32,
    round: Option<AggregationRound>,
    last_initiated: SimTime,
    completed_rounds: u64,
}

impl LeaderAggregation {
    /// Create idle leader state.
    pub fn new(min_interval: f64, accuracy: u32) -> Self {
        Self {
            min_interval,
            accuracy,
            round: None,
            last_initiated: 0.0,
            completed_rounds: 0,
        }
    }

    /// The phase tag carried by a finalized aggregate.
    pub fn closing_phase(&self) -> u32 {
        self.accuracy + 1
    }

    /// Whether a round is currently in flight.
    pub fn has_instance(&self) -> bool {
        self.round.is_some()
    }

    /// The in-flight round, for inspection.
    pub fn round(&self) -> Option<&AggregationRound> {
        self.round.as_ref()
    }

    /// Number of rounds finalized so far.
    pub fn completed_rounds(&self) -> u64 {
        self.completed_rounds
    }

    /// Decide whether to initiate a round: only if the minimum interval has
    /// elapsed since the last initiation and no round is in flight.
    ///
    /// On success the round is created with phase 0, its accumulator seeded
    /// from the leader's own aged snapshot (over the full host universe),
    /// and the new instance id is returned.
    pub fn try_initiate(
        &mut self,
        now: SimTime,
        now_int: u64,
        seed: PredMap,
    ) -> Option<InstanceId> {
        if now - self.last_initiated < self.min_interval || self.round.is_some() {
            return None;
        }
        let instance = now_int;
        self.round = Some(AggregationRound {
            instance,
            phase: 0,
            accumulator: seed,
            responders: Vec::new(),
            started_at: now,
        });
        self.last_initiated = now;
        debug!(instance, "initiating aggregation round");
        Some(instance)
    }

    /// Participate in a member-initiated blinding exchange: the leader's
    /// seed is masked the same way member accumulators are, so its own
    /// values are covered by the same cancellation argument.
    pub fn on_blind_request(
        &mut self,
        value: i64,
        instance: InstanceId,
        rng: &mut impl Rng,
    ) -> Option<i64> {
        let round = self.round.as_mut()?;
        if round.instance != instance {
            return None;
        }
        let own = rng.gen_range(1..BLIND_RANGE);
        apply_blind(&mut round.accumulator, value);
        apply_blind(&mut round.accumulator, -own);
        Some(own)
    }

    /// Merge a member's blinded contribution into the round accumulator.
    ///
    /// Returns the finalized public vector once the responder set covers
    /// the full membership minus the leader itself; fewer responses never
    /// finalize. A mismatched instance id aborts the round rather than
    /// corrupt state; a duplicate or stray response is ignored.
    pub fn on_distrib_response(
        &mut self,
        from: &HostId,
        vector: &PredMap,
        instance: InstanceId,
        member_count: usize,
    ) -> RouterResult<Option<PredMap>> {
        let round = match &mut self.round {
            Some(round) => round,
            // stale contribution from an aborted or completed round
            None => return Ok(None),
        };
        if round.instance != instance {
            let expected = round.instance;
            self.round = None;
            return Err(RouterError::ProtocolViolation(format!(
                "contribution for instance {instance} while round {expected} in flight; \
                 round aborted"
            )));
        }
        if round.responders.contains(from) {
            return Ok(None);
        }
        round.responders.push(from.clone());
        for (host, value) in vector {
            *round.accumulator.entry(host.clone()).or_insert(0.0) += value;
        }
        trace!(
            responders = round.responders.len(),
            needed = member_count - 1,
            "merged distribution response"
        );

        if round.responders.len() < member_count - 1 {
            return Ok(None);
        }

        // Full membership responded: finalize as the average over the
        // community (the leader's seed counts as its own contribution).
        let round = self.round.take().expect("checked above");
        let public: PredMap = round
            .accumulator
            .into_iter()
            .map(|(host, sum)| (host, sum / member_count as f64))
            .collect();
        self.completed_rounds += 1;
        debug!(
            instance = round.instance,
            destinations = public.len(),
            "aggregation round finalized"
        );
        Ok(Some(public))
    }
}

/// A node's belief about community-level aggregated predictability.
///
/// Replaced wholesale when a fresh aggregation result arrives, never
/// partially merged mid-round. Incoming sum vectors are slotted by phase
/// tag: a closing-phase vector alone is adopted as-is, and when both the
/// phase-0 ("init") and closing-phase ("final") vectors of one instance
/// are known the estimate resolves to `init - final` clamped at zero.
#[derive(Debug, Default)]
pub struct PublicEstimate {
    instance: InstanceId,
    init: Option<PredMap>,
    fin: Option<PredMap>,
    resolved: PredMap,
}

impl PublicEstimate {
    /// Create an empty estimate.
    pub fn new() -> Self {
        Self::default()
    }

    /// The instance the current estimate was produced by.
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Community-level predictability toward `host`, 0 if unknown.
    pub fn pred_for(&self, host: &HostId) -> f64 {
        self.resolved.get(host).copied().unwrap_or(0.0)
    }

    /// Whether no aggregate has arrived yet.
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    /// The resolved estimate map.
    pub fn resolved(&self) -> &PredMap {
        &self.resolved
    }

    /// Apply an incoming sum vector tagged with phase `j`.
    ///
    /// Vectors from older instances are discarded; a newer instance resets
    /// both slots. Intermediate phases (`0 < j <= accuracy`) belong to the
    /// optional refinement extension and are ignored. Returns whether the
    /// resolved estimate changed.
    pub fn apply_sum(
        &mut self,
        instance: InstanceId,
        j: u32,
        closing_phase: u32,
        vector: &PredMap,
    ) -> bool {
        if instance < self.instance {
            return false;
        }
        if instance > self.instance {
            self.instance = instance;
            self.init = None;
            self.fin = None;
        }
        if j == 0 {
            self.init = Some(vector.clone());
        } else if j == closing_phase {
            self.fin = Some(vector.clone());
        } else {
            return false;
        }
        self.resolve();
        true
    }

    /// Adopt a foreign community's finalized vector: overwrite its keys,
    /// keep everything else. Used by leaders relaying across communities.
    pub fn adopt_foreign(&mut self, vector: &PredMap) {
        for (host, value) in vector {
            self.resolved.insert(host.clone(), *value);
        }
    }

    fn resolve(&mut self) {
        self.resolved = match (&self.init, &self.fin) {
            (Some(init), Some(fin)) => {
                let mut out = PredMap::new();
                for host in init.keys().chain(fin.keys()) {
                    if out.contains_key(host) {
                        continue;
                    }
                    let i = init.get(host).copied().unwrap_or(0.0);
                    let f = fin.get(host).copied().unwrap_or(0.0);
                    out.insert(host.clone(), (i - f).max(0.0));
                }
                out
            }
            (None, Some(only)) | (Some(only), None) => only.clone(),
            (None, None) => PredMap::new(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn snapshot(pairs: &[(&str, f64)]) -> PredMap {
        pairs
            .iter()
            .map(|(h, v)| (HostId::new(*h), *v))
            .collect()
    }

    fn map_sum(map: &PredMap) -> f64 {
        map.values().sum()
    }

    #[test]
    fn init_signal_opens_and_supersedes() {
        let mut member = MemberAggregation::new(2);
        let leader = HostId::new("a0");
        member.on_init_signal(&leader, 100, snapshot(&[("b3", 0.5)]));
        assert!(member.is_open());
        assert_eq!(member.exchange().unwrap().instance, 100);

        // older signal ignored
        member.on_init_signal(&leader, 50, snapshot(&[("b3", 0.9)]));
        assert_eq!(member.exchange().unwrap().instance, 100);

        // newer signal discards the open accumulator
        member.on_init_signal(&leader, 200, snapshot(&[("b3", 0.7)]));
        assert_eq!(member.exchange().unwrap().instance, 200);
        assert_eq!(member.exchange().unwrap().encounters(), 0);
    }

    #[test]
    fn completed_exchange_mutates_both_sides_or_neither() {
        let mut rng = StdRng::seed_from_u64(7);
        let leader = HostId::new("a0");
        let (a, b) = (HostId::new("a1"), HostId::new("a2"));

        let mut member_a = MemberAggregation::new(2);
        let mut member_b = MemberAggregation::new(2);
        let snap_a = snapshot(&[("b3", 0.5), ("b4", 0.25)]);
        let snap_b = snapshot(&[("b3", 0.75), ("b4", 0.0)]);
        member_a.on_init_signal(&leader, 100, snap_a.clone());
        member_b.on_init_signal(&leader, 100, snap_b.clone());

        let (blind_a, instance) = member_a.begin_exchange(&b, &mut rng).unwrap();
        let reply = match member_b.on_blind_request(&a, blind_a, instance, &mut rng) {
            BlindOutcome::Reply { blind, flushed } => {
                assert!(flushed.is_none());
                blind
            }
            BlindOutcome::Ignored => panic!("request must be accepted"),
        };
        assert!(member_a.on_blind_reply(&b, reply, instance).is_none());

        // masks cancel entry by entry across the pair
        for host in [HostId::new("b3"), HostId::new("b4")] {
            let total = member_a.exchange().unwrap().accumulator[&host]
                + member_b.exchange().unwrap().accumulator[&host];
            let expected = snap_a[&host] + snap_b[&host];
            assert!((total - expected).abs() < 1e-6);
        }
        assert_eq!(member_a.exchange().unwrap().encounters(), 1);
        assert_eq!(member_b.exchange().unwrap().encounters(), 1);
    }

    #[test]
    fn request_without_open_accumulator_is_ignored() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut member = MemberAggregation::new(2);
        assert!(matches!(
            member.on_blind_request(&HostId::new("a1"), 42, 100, &mut rng),
            BlindOutcome::Ignored
        ));
    }

    #[test]
    fn repeat_encounters_with_one_peer_count_separately() {
        // a community of exactly k + 1 members has only k reachable peers,
        // so round completion relies on re-encounters being counted
        let mut rng = StdRng::seed_from_u64(7);
        let leader = HostId::new("a0");
        let peer = HostId::new("a2");
        let mut member = MemberAggregation::new(2);
        member.on_init_signal(&leader, 100, snapshot(&[("b3", 0.5)]));

        for round in 0..2 {
            match member.on_blind_request(&peer, 11 + round, 100, &mut rng) {
                BlindOutcome::Reply { flushed, .. } => assert!(flushed.is_none()),
                BlindOutcome::Ignored => panic!("request must be accepted"),
            }
        }
        assert_eq!(member.exchange().unwrap().encounters(), 2);
    }

    #[test]
    fn flush_at_exactly_k_plus_one_encounters() {
        let mut rng = StdRng::seed_from_u64(7);
        let leader = HostId::new("a0");
        let mut member = MemberAggregation::new(2);
        member.on_init_signal(&leader, 100, snapshot(&[("b3", 0.5)]));

        for (i, peer) in ["a2", "a3"].iter().enumerate() {
            match member.on_blind_request(&HostId::new(*peer), 5 + i as i64, 100, &mut rng) {
                BlindOutcome::Reply { flushed, .. } => assert!(flushed.is_none()),
                BlindOutcome::Ignored => panic!("request must be accepted"),
            }
        }
        // third encounter reaches k + 1 = 3 and flushes
        match member.on_blind_request(&HostId::new("a0"), 9, 100, &mut rng) {
            BlindOutcome::Reply { flushed, .. } => {
                let contribution = flushed.expect("must flush at k + 1");
                assert_eq!(contribution.instance, 100);
                assert_eq!(contribution.leader, leader);
            }
            BlindOutcome::Ignored => panic!("request must be accepted"),
        }
        assert!(!member.is_open());
    }

    #[test]
    fn contact_down_clears_half_open_exchange() {
        let mut rng = StdRng::seed_from_u64(7);
        let leader = HostId::new("a0");
        let peer = HostId::new("a2");
        let mut member = MemberAggregation::new(2);
        let snap = snapshot(&[("b3", 0.5)]);
        member.on_init_signal(&leader, 100, snap.clone());

        member.begin_exchange(&peer, &mut rng).unwrap();
        member.on_contact_down(&peer);
        // nothing was applied and the peer may be retried
        assert_eq!(member.exchange().unwrap().accumulator, snap);
        assert!(member.begin_exchange(&peer, &mut rng).is_some());
    }

    #[test]
    fn leader_rate_limits_and_guards_in_flight_rounds() {
        let mut leader = LeaderAggregation::new(600.0, 3);
        assert!(leader.try_initiate(300.0, 300, PredMap::new()).is_none());
        assert_eq!(leader.try_initiate(700.0, 700, PredMap::new()), Some(700));
        // in flight
        assert!(leader.try_initiate(1400.0, 1400, PredMap::new()).is_none());
    }

    #[test]
    fn leader_participates_in_blinding_only_for_its_instance() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut leader = LeaderAggregation::new(0.0, 3);
        assert!(leader.on_blind_request(42, 600, &mut rng).is_none());
        leader
            .try_initiate(600.0, 600, snapshot(&[("b3", 0.5)]))
            .unwrap();
        assert!(leader.on_blind_request(42, 999, &mut rng).is_none());
        assert!(leader.on_blind_request(42, 600, &mut rng).is_some());
    }

    #[test]
    fn leader_finalizes_only_at_full_membership() {
        let mut leader = LeaderAggregation::new(0.0, 3);
        leader
            .try_initiate(600.0, 600, snapshot(&[("b3", 0.5)]))
            .unwrap();

        for peer in ["a1", "a2"] {
            let out = leader
                .on_distrib_response(&HostId::new(peer), &snapshot(&[("b3", 0.25)]), 600, 4)
                .unwrap();
            assert!(out.is_none());
        }
        // duplicate responder ignored
        assert!(leader
            .on_distrib_response(&HostId::new("a1"), &snapshot(&[("b3", 0.25)]), 600, 4)
            .unwrap()
            .is_none());

        let public = leader
            .on_distrib_response(&HostId::new("a3"), &snapshot(&[("b3", 0.25)]), 600, 4)
            .unwrap()
            .expect("third responder completes membership of 4");
        // (0.5 + 3 * 0.25) / 4
        assert!((public[&HostId::new("b3")] - 0.3125).abs() < 1e-12);
        assert!(!leader.has_instance());
        assert_eq!(leader.completed_rounds(), 1);
    }

    #[test]
    fn mismatched_instance_aborts_the_round() {
        let mut leader = LeaderAggregation::new(0.0, 3);
        leader.try_initiate(600.0, 600, PredMap::new()).unwrap();
        let err = leader
            .on_distrib_response(&HostId::new("a1"), &PredMap::new(), 999, 4)
            .unwrap_err();
        assert!(matches!(err, RouterError::ProtocolViolation(_)));
        assert!(!leader.has_instance());
    }

    #[test]
    fn estimate_resolves_init_minus_final() {
        let mut estimate = PublicEstimate::new();
        let closing = 4;
        assert!(estimate.apply_sum(100, closing, closing, &snapshot(&[("b3", 0.25)])));
        assert!((estimate.pred_for(&HostId::new("b3")) - 0.25).abs() < 1e-12);

        // init arrives for the same instance: estimate becomes init - final
        assert!(estimate.apply_sum(100, 0, closing, &snapshot(&[("b3", 0.75), ("b4", 0.5)])));
        assert!((estimate.pred_for(&HostId::new("b3")) - 0.5).abs() < 1e-12);
        assert!((estimate.pred_for(&HostId::new("b4")) - 0.5).abs() < 1e-12);

        // intermediate phases ignored, older instances discarded
        assert!(!estimate.apply_sum(100, 2, closing, &snapshot(&[("b3", 9.0)])));
        assert!(!estimate.apply_sum(50, closing, closing, &snapshot(&[("b3", 9.0)])));

        // newer instance replaces wholesale
        assert!(estimate.apply_sum(200, closing, closing, &snapshot(&[("b4", 0.1)])));
        assert_eq!(estimate.pred_for(&HostId::new("b3")), 0.0);
    }

    #[test]
    fn foreign_adoption_overwrites_only_foreign_keys() {
        let mut estimate = PublicEstimate::new();
        estimate.apply_sum(100, 4, 4, &snapshot(&[("a1", 0.9)]));
        estimate.adopt_foreign(&snapshot(&[("b3", 0.4)]));
        assert!((estimate.pred_for(&HostId::new("a1")) - 0.9).abs() < 1e-12);
        assert!((estimate.pred_for(&HostId::new("b3")) - 0.4).abs() < 1e-12);
    }
}
