//! The protocol message router: the state machine driving contact-time
//! behavior.
//!
//! On every contact-up event the router updates delivery predictability for
//! the met peer, triggers transitive updates, conditionally initiates an
//! aggregation round (leaders) and performs one blinding exchange (members
//! with an open accumulator). On every tick it decides which buffered
//! messages to push across open contacts: exact-recipient delivery first,
//! opportunistic GRTRMax forwarding only when nothing is deliverable.
//!
//! The transport/scheduler collaborator is consumed through the narrow
//! [`Transport`] interface; byte-level transfer progress and buffer
//! management stay on the other side of it.

use std::cmp::Ordering;
use std::sync::Arc;

use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{trace, warn};

use crate::aggregation::{BlindOutcome, Contribution, LeaderAggregation, MemberAggregation, PublicEstimate};
use crate::community::CommunityDirectory;
use crate::encapsulation::MessageEncapsulator;
use crate::message::{MessageId, Payload, WireMessage};
use crate::predictability::PredictabilityStore;
use crate::{
    CommunityId, HostId, PredMap, QueuePolicy, RouterConfig, RouterError, RouterResult, SimTime,
};

/// Kind tag of this router implementation. The protocol only interoperates
/// with routers of the same kind; a mismatch is a fatal configuration
/// error.
pub const ROUTER_KIND: &str = "waypoint";

/// An open contact with a neighboring node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    /// The node on the other side.
    pub peer: HostId,
}

/// Result of offering a message to the transfer subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStart {
    /// Transfer started; the router stops offering for this tick.
    Started,
    /// One endpoint is mid-transfer; retried next tick.
    Busy,
    /// The peer refused the message (it already holds it, or storage).
    Denied,
}

/// What became of a transferred message at its receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reception {
    /// Protocol message processed; the sender may delete its local copy.
    Consumed,
    /// Final delivery to one of the message's destinations.
    Delivered,
    /// Stored for further relay.
    Buffered,
}

/// Narrow interface to the transport/scheduler collaborator, scoped to one
/// node. Peer reads are snapshots of the peer router's state, never direct
/// cross-node mutation.
pub trait Transport {
    /// Current simulated time.
    fn now(&self) -> SimTime;
    /// Current simulated time as an integer.
    fn now_int(&self) -> u64;
    /// Whether this node is mid-transfer.
    fn is_transferring(&self) -> bool;
    /// Contacts currently open at this node.
    fn open_contacts(&self) -> Vec<Contact>;
    /// Snapshot of this node's buffered messages.
    fn buffered_messages(&self) -> Vec<WireMessage>;
    /// Kind tag of the peer's router.
    fn peer_router_kind(&self, peer: &HostId) -> &'static str;
    /// Whether the peer is mid-transfer.
    fn peer_is_transferring(&self, peer: &HostId) -> bool;
    /// Whether the peer already holds (or has consumed) a message.
    fn peer_has_message(&self, peer: &HostId, id: &MessageId) -> bool;
    /// The peer's public predictability toward a destination.
    fn peer_public_pred(&self, peer: &HostId, dest: &HostId) -> f64;
    /// Aged snapshot of the peer's private predictability map.
    fn peer_preds_snapshot(&self, peer: &HostId) -> PredMap;
    /// Create a new message in this node's own buffer.
    fn create_message(&mut self, msg: WireMessage) -> bool;
    /// Offer a message for transfer across a contact.
    fn start_transfer(&mut self, msg: WireMessage, contact: &Contact) -> TransferStart;
}

/// Per-node router state machine.
pub struct ProtocolMessageRouter {
    host: HostId,
    community: CommunityId,
    config: RouterConfig,
    directory: Arc<CommunityDirectory>,
    preds: PredictabilityStore,
    public: PublicEstimate,
    member: MemberAggregation,
    leader: Option<LeaderAggregation>,
    encapsulator: MessageEncapsulator,
    rng: StdRng,
    msg_seq: u64,
}

impl ProtocolMessageRouter {
    /// Build a router for `host`.
    ///
    /// Fails fast on an invalid configuration bundle or a host the
    /// directory never declared. The router is a leader exactly when the
    /// directory designates its host.
    pub fn new(
        host: HostId,
        config: RouterConfig,
        directory: Arc<CommunityDirectory>,
        seed: u64,
    ) -> RouterResult<Self> {
        config.validate()?;
        let community = directory.community_of(&host)?;
        let leader = directory
            .is_leader(&host)
            .then(|| LeaderAggregation::new(config.min_round_interval, config.pred_accuracy));
        let preds = PredictabilityStore::new(host.clone(), &config);
        let encapsulator = MessageEncapsulator::new(config.destination_num, directory.clone());
        Ok(Self {
            host,
            community,
            member: MemberAggregation::new(config.k_value),
            leader,
            preds,
            public: PublicEstimate::new(),
            encapsulator,
            rng: StdRng::seed_from_u64(seed),
            msg_seq: 0,
            directory,
            config,
        })
    }

    /// This router's host identity.
    pub fn host(&self) -> &HostId {
        &self.host
    }

    /// The community the host belongs to.
    pub fn community(&self) -> &CommunityId {
        &self.community
    }

    /// Kind tag, for the same-kind interoperation check.
    pub fn kind(&self) -> &'static str {
        ROUTER_KIND
    }

    /// Whether this node is its community's leader.
    pub fn is_leader(&self) -> bool {
        self.leader.is_some()
    }

    /// Community-level public predictability toward `host`.
    pub fn public_pred_for(&self, host: &HostId) -> f64 {
        self.public.pred_for(host)
    }

    /// The public estimate, for inspection.
    pub fn public_estimate(&self) -> &PublicEstimate {
        &self.public
    }

    /// Private delivery predictability toward `host` (aged).
    pub fn pred_for(&mut self, host: &HostId, now: SimTime) -> f64 {
        self.preds.pred_for(host, now)
    }

    /// Aged snapshot of the private predictability map.
    pub fn preds_snapshot(&self, now: SimTime) -> PredMap {
        self.preds.aged_snapshot(now)
    }

    /// Member-side aggregation state, for inspection.
    pub fn member_aggregation(&self) -> &MemberAggregation {
        &self.member
    }

    /// Leader-side aggregation state, for inspection.
    pub fn leader_aggregation(&self) -> Option<&LeaderAggregation> {
        self.leader.as_ref()
    }

    /// Handle a contact-up event: always update direct and transitive
    /// predictability; leaders conditionally initiate an aggregation round;
    /// members with an open accumulator perform one blinding exchange.
    pub fn on_contact_up(&mut self, peer: &HostId, t: &mut dyn Transport) -> RouterResult<()> {
        let peer_kind = t.peer_router_kind(peer);
        if peer_kind != ROUTER_KIND {
            return Err(RouterError::ProtocolViolation(format!(
                "peer {peer} runs router kind {peer_kind:?}; this protocol only \
                 interoperates with {ROUTER_KIND:?}"
            )));
        }

        let now = t.now();
        self.preds.on_contact(peer, now);
        let peer_snapshot = t.peer_preds_snapshot(peer);
        self.preds.on_transitive(peer, &peer_snapshot, now);

        if self.leader.is_some() {
            let seed = self.universe_snapshot(now);
            let now_int = t.now_int();
            let initiated = self
                .leader
                .as_mut()
                .and_then(|l| l.try_initiate(now, now_int, seed));
            if let Some(instance) = initiated {
                let relay = self.cross_community_relay();
                let id = self.next_message_id();
                t.create_message(WireMessage::control(
                    self.host.clone(),
                    relay,
                    id,
                    now,
                    Payload::InitSignal {
                        leader_host: self.host.clone(),
                        max_instance_id: instance,
                        community_id: self.community.clone(),
                        sum_instance_id: instance,
                    },
                ));
            }
        }

        // One blinding exchange per contact: the initiator role is
        // deterministic so each contact yields a single exchange.
        if self.should_initiate_exchange(peer) {
            if let Some((blind, instance)) = self.member.begin_exchange(peer, &mut self.rng) {
                let id = self.next_message_id();
                t.create_message(WireMessage::control(
                    self.host.clone(),
                    peer.clone(),
                    id,
                    now,
                    Payload::RandomNumberExchange {
                        random_value: blind,
                        sum_instance_id: instance,
                        respond: true,
                    },
                ));
            }
        }

        Ok(())
    }

    /// Handle a contact-down event: clear any half-open blinding exchange
    /// with the departed peer.
    pub fn on_contact_down(&mut self, peer: &HostId) {
        self.member.on_contact_down(peer);
    }

    /// Per-tick lifecycle: skip while mid-transfer, attempt exact-recipient
    /// delivery, and only if nothing was deliverable attempt opportunistic
    /// forwarding. Guaranteed deliveries are never starved by speculative
    /// forwarding.
    pub fn update(&mut self, t: &mut dyn Transport) {
        if t.is_transferring() {
            return;
        }
        if self.exchange_deliverable_messages(t).is_some() {
            return;
        }
        self.try_other_messages(t);
    }

    /// Handle a message that finished transferring to this node.
    pub fn on_message_transferred(
        &mut self,
        msg: &WireMessage,
        t: &mut dyn Transport,
    ) -> Reception {
        let now = t.now();
        match &msg.payload {
            Payload::InitSignal {
                leader_host,
                max_instance_id,
                community_id,
                sum_instance_id: _,
            } => {
                if *community_id == self.community && !self.is_leader() {
                    let snapshot = self.universe_snapshot(now);
                    self.member
                        .on_init_signal(leader_host, *max_instance_id, snapshot);
                }
                // the addressed cross-community leader is the flood terminus
                if msg.to == self.host {
                    Reception::Consumed
                } else {
                    Reception::Buffered
                }
            }

            Payload::RandomNumberExchange {
                random_value,
                sum_instance_id,
                respond,
            } => {
                if msg.to != self.host {
                    return Reception::Buffered;
                }
                if *respond {
                    self.answer_blind_request(msg, *random_value, *sum_instance_id, t);
                } else if let Some(contribution) =
                    self.member
                        .on_blind_reply(&msg.from, *random_value, *sum_instance_id)
                {
                    self.send_contribution(contribution, t);
                }
                Reception::Consumed
            }

            Payload::ResponseDistribPreds {
                calculating_preds,
                sum_instance_id,
                j_value: _,
            } => {
                if msg.to != self.host {
                    return Reception::Buffered;
                }
                self.merge_contribution(&msg.from, calculating_preds, *sum_instance_id, t);
                Reception::Consumed
            }

            Payload::ResponseSumPreds {
                intermediate_preds,
                sum_instance_id,
                j_value,
            } => {
                if msg.to == self.host && self.is_leader() {
                    // finalized aggregate relayed from a peer community;
                    // the vector is keyed over the whole host universe, so
                    // only the originating community's entries are adopted
                    let origin = msg.from.community_prefix();
                    let foreign: PredMap = intermediate_preds
                        .iter()
                        .filter(|(host, _)| host.community_prefix() == origin)
                        .map(|(host, value)| (host.clone(), *value))
                        .collect();
                    self.public.adopt_foreign(&foreign);
                    return Reception::Consumed;
                }
                let closing = self.config.pred_accuracy + 1;
                self.public
                    .apply_sum(*sum_instance_id, *j_value, closing, intermediate_preds);
                if msg.to == self.host {
                    Reception::Consumed
                } else {
                    Reception::Buffered
                }
            }

            // application traffic passes through the protocol unprocessed
            Payload::Encapsulated { destinations, .. } => {
                if destinations.contains(&self.host) {
                    Reception::Delivered
                } else {
                    Reception::Buffered
                }
            }
            Payload::Application { .. } => {
                if msg.to == self.host {
                    Reception::Delivered
                } else {
                    Reception::Buffered
                }
            }
        }
    }

    /// Try messages that can reach their final recipient across an open
    /// contact. Returns the contact a transfer was started on, if any.
    fn exchange_deliverable_messages(&mut self, t: &mut dyn Transport) -> Option<Contact> {
        let contacts = t.open_contacts();
        if contacts.is_empty() {
            return None;
        }
        let messages = t.buffered_messages();

        let mut candidates: Vec<(WireMessage, Contact)> = Vec::new();
        for msg in &messages {
            if msg.payload.is_control() {
                for contact in &contacts {
                    if msg.to == contact.peer && !t.peer_has_message(&contact.peer, &msg.id) {
                        candidates.push((msg.clone(), contact.clone()));
                    }
                }
            } else {
                let wrapped = self.encapsulator.encapsulate(msg, &mut self.rng);
                let Some(destinations) = wrapped.payload.destinations() else {
                    continue;
                };
                for contact in &contacts {
                    if destinations.contains(&contact.peer)
                        && !t.peer_has_message(&contact.peer, &msg.id)
                    {
                        candidates.push((
                            MessageEncapsulator::retarget(&wrapped, &contact.peer),
                            contact.clone(),
                        ));
                    }
                }
            }
        }

        self.order_by_queue_mode(&mut candidates);
        for (msg, contact) in candidates {
            if t.peer_is_transferring(&contact.peer) {
                continue;
            }
            if t.start_transfer(msg, &contact) == TransferStart::Started {
                return Some(contact);
            }
        }
        None
    }

    /// Opportunistic forwarding (GRTRMax): offer a message to a peer only
    /// if the peer's public predictability toward the destination list is
    /// strictly greater than the local one. Control traffic replicates
    /// epidemically within the community regardless of predictability.
    fn try_other_messages(&mut self, t: &mut dyn Transport) -> Option<Contact> {
        let contacts = t.open_contacts();
        if contacts.is_empty() {
            return None;
        }
        let messages = t.buffered_messages();

        let mut candidates: Vec<(f64, WireMessage, Contact)> = Vec::new();
        for contact in &contacts {
            if t.peer_is_transferring(&contact.peer) {
                continue;
            }
            let peer_in_community =
                contact.peer.community_prefix() == self.community.as_str();

            for msg in &messages {
                if t.peer_has_message(&contact.peer, &msg.id) {
                    continue;
                }
                if msg.payload.is_control() {
                    if peer_in_community {
                        let score = t.peer_public_pred(&contact.peer, &msg.to);
                        candidates.push((score, msg.clone(), contact.clone()));
                    }
                } else {
                    let wrapped = self.encapsulator.encapsulate(msg, &mut self.rng);
                    let Some(destinations) = wrapped.payload.destinations() else {
                        continue;
                    };
                    let own = self.best_public(destinations);
                    let peer = destinations
                        .iter()
                        .map(|d| t.peer_public_pred(&contact.peer, d))
                        .fold(0.0, f64::max);
                    if peer > own {
                        candidates.push((
                            peer,
                            MessageEncapsulator::retarget(&wrapped, &contact.peer),
                            contact.clone(),
                        ));
                    }
                }
            }
        }

        if candidates.is_empty() {
            return None;
        }

        // queue policy decides ties, then higher peer predictability first
        self.order_scored_by_queue_mode(&mut candidates);
        candidates.sort_by_key(|(score, _, _)| std::cmp::Reverse(OrderedFloat(*score)));

        for (score, msg, contact) in candidates {
            if t.start_transfer(msg, &contact) == TransferStart::Started {
                trace!(peer = %contact.peer, score, "started opportunistic transfer");
                return Some(contact);
            }
        }
        None
    }

    fn best_public(&self, destinations: &[HostId]) -> f64 {
        destinations
            .iter()
            .map(|d| self.public.pred_for(d))
            .fold(0.0, f64::max)
    }

    fn answer_blind_request(
        &mut self,
        msg: &WireMessage,
        value: i64,
        instance: u64,
        t: &mut dyn Transport,
    ) {
        // leaders answer from their round accumulator so their seed is
        // masked under the same cancellation argument as member vectors
        let leader_reply = self
            .leader
            .as_mut()
            .and_then(|l| l.on_blind_request(value, instance, &mut self.rng));
        if let Some(blind) = leader_reply {
            self.reply_blind(msg, blind, instance, t);
            return;
        }

        match self
            .member
            .on_blind_request(&msg.from, value, instance, &mut self.rng)
        {
            BlindOutcome::Reply { blind, flushed } => {
                self.reply_blind(msg, blind, instance, t);
                if let Some(contribution) = flushed {
                    self.send_contribution(contribution, t);
                }
            }
            BlindOutcome::Ignored => {}
        }
    }

    fn reply_blind(&mut self, request: &WireMessage, blind: i64, instance: u64, t: &mut dyn Transport) {
        let id = self.next_message_id();
        t.create_message(WireMessage::control(
            self.host.clone(),
            request.from.clone(),
            id,
            t.now(),
            Payload::RandomNumberExchange {
                random_value: blind,
                sum_instance_id: instance,
                respond: false,
            },
        ));
    }

    fn send_contribution(&mut self, contribution: Contribution, t: &mut dyn Transport) {
        let id = self.next_message_id();
        t.create_message(WireMessage::control(
            self.host.clone(),
            contribution.leader,
            id,
            t.now(),
            Payload::ResponseDistribPreds {
                calculating_preds: contribution.preds,
                sum_instance_id: contribution.instance,
                j_value: 0,
            },
        ));
    }

    fn merge_contribution(
        &mut self,
        from: &HostId,
        vector: &PredMap,
        instance: u64,
        t: &mut dyn Transport,
    ) {
        let member_count = self.directory.member_count(&self.community);
        let outcome = match self.leader.as_mut() {
            Some(leader) => leader.on_distrib_response(from, vector, instance, member_count),
            // misdelivered contribution; not a leader, nothing to merge
            None => return,
        };
        match outcome {
            Ok(Some(public)) => {
                let closing = self
                    .leader
                    .as_ref()
                    .expect("leader checked above")
                    .closing_phase();
                self.public.apply_sum(instance, closing, closing, &public);
                let relay = self.cross_community_relay();
                let id = self.next_message_id();
                t.create_message(WireMessage::control(
                    self.host.clone(),
                    relay,
                    id,
                    t.now(),
                    Payload::ResponseSumPreds {
                        intermediate_preds: public,
                        sum_instance_id: instance,
                        j_value: closing,
                    },
                ));
            }
            Ok(None) => {}
            Err(err) => {
                warn!(%err, "aggregation round aborted");
            }
        }
    }

    /// Accumulator seeds cover the full host universe (a host's entry for
    /// itself stays 0) so the randomized masks cancel entry by entry when
    /// the leader merges contributions.
    fn universe_snapshot(&self, now: SimTime) -> PredMap {
        let mut snapshot = self.preds.aged_snapshot(now);
        for host in self.directory.hosts() {
            snapshot.entry(host.clone()).or_insert(0.0);
        }
        snapshot
    }

    /// Exactly one unreachable-community relay target per leader; with a
    /// single declared community the flood stays local.
    fn cross_community_relay(&self) -> HostId {
        self.directory
            .peer_leader_excluding(&self.community)
            .cloned()
            .unwrap_or_else(|| self.host.clone())
    }

    fn should_initiate_exchange(&self, peer: &HostId) -> bool {
        if peer.community_prefix() != self.community.as_str() {
            return false;
        }
        // leaders never initiate member exchanges, so toward a leader the
        // member always takes the initiator role; between members the
        // smaller id does
        let peer_is_leader = self
            .directory
            .leader_of(&self.community)
            .map(|l| l == peer)
            .unwrap_or(false);
        peer_is_leader || self.host < *peer
    }

    fn order_by_queue_mode(&mut self, candidates: &mut [(WireMessage, Contact)]) {
        match self.config.queue_policy {
            QueuePolicy::Fifo => candidates.sort_by(|(a, _), (b, _)| Self::fifo_order(a, b)),
            QueuePolicy::Random => candidates.shuffle(&mut self.rng),
        }
    }

    fn order_scored_by_queue_mode(&mut self, candidates: &mut [(f64, WireMessage, Contact)]) {
        match self.config.queue_policy {
            QueuePolicy::Fifo => {
                candidates.sort_by(|(_, a, _), (_, b, _)| Self::fifo_order(a, b))
            }
            QueuePolicy::Random => candidates.shuffle(&mut self.rng),
        }
    }

    fn fifo_order(a: &WireMessage, b: &WireMessage) -> Ordering {
        a.created_at
            .partial_cmp(&b.created_at)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    }

    fn next_message_id(&mut self) -> MessageId {
        self.msg_seq += 1;
        format!("{}-{}", self.host, self.msg_seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config() -> RouterConfig {
        RouterConfig::new(30)
            .with_communities_attributes("a:4,b:4")
            .with_destination_num(1)
    }

    fn router(host: &str) -> ProtocolMessageRouter {
        let config = config();
        let directory = Arc::new(CommunityDirectory::from_config(&config).unwrap());
        ProtocolMessageRouter::new(HostId::new(host), config, directory, 42).unwrap()
    }

    #[derive(Default)]
    struct StubTransport {
        now: SimTime,
        contacts: Vec<Contact>,
        buffer: Vec<WireMessage>,
        peer_kind: Option<&'static str>,
        peer_pub: HashMap<(HostId, HostId), f64>,
        started: Vec<WireMessage>,
        created: Vec<WireMessage>,
    }

    impl Transport for StubTransport {
        fn now(&self) -> SimTime {
            self.now
        }
        fn now_int(&self) -> u64 {
            self.now as u64
        }
        fn is_transferring(&self) -> bool {
            false
        }
        fn open_contacts(&self) -> Vec<Contact> {
            self.contacts.clone()
        }
        fn buffered_messages(&self) -> Vec<WireMessage> {
            self.buffer.clone()
        }
        fn peer_router_kind(&self, _peer: &HostId) -> &'static str {
            self.peer_kind.unwrap_or(ROUTER_KIND)
        }
        fn peer_is_transferring(&self, _peer: &HostId) -> bool {
            false
        }
        fn peer_has_message(&self, _peer: &HostId, _id: &MessageId) -> bool {
            false
        }
        fn peer_public_pred(&self, peer: &HostId, dest: &HostId) -> f64 {
            self.peer_pub
                .get(&(peer.clone(), dest.clone()))
                .copied()
                .unwrap_or(0.0)
        }
        fn peer_preds_snapshot(&self, _peer: &HostId) -> PredMap {
            PredMap::new()
        }
        fn create_message(&mut self, msg: WireMessage) -> bool {
            self.created.push(msg);
            true
        }
        fn start_transfer(&mut self, msg: WireMessage, _contact: &Contact) -> TransferStart {
            self.started.push(msg);
            TransferStart::Started
        }
    }

    #[test]
    fn mismatched_router_kind_is_fatal() {
        let mut r = router("a1");
        let mut t = StubTransport {
            peer_kind: Some("epidemic"),
            ..Default::default()
        };
        let err = r.on_contact_up(&HostId::new("a2"), &mut t).unwrap_err();
        assert!(matches!(err, RouterError::ProtocolViolation(_)));
    }

    #[test]
    fn contact_updates_predictability() {
        let mut r = router("a1");
        let mut t = StubTransport::default();
        r.on_contact_up(&HostId::new("a2"), &mut t).unwrap();
        assert_eq!(r.pred_for(&HostId::new("a2"), 0.0), 0.75);
    }

    #[test]
    fn delivery_is_attempted_before_forwarding() {
        let mut r = router("a1");
        let peer = HostId::new("a2");
        let mut t = StubTransport {
            contacts: vec![Contact { peer: peer.clone() }],
            ..Default::default()
        };
        // a forwardable message the peer is strictly better for...
        t.peer_pub
            .insert((peer.clone(), HostId::new("b5")), 0.9);
        t.buffer.push(WireMessage::application(
            HostId::new("a1"),
            HostId::new("b5"),
            "a1-relay".into(),
            100,
            0.0,
        ));
        // ...and one deliverable to the contact itself
        t.buffer.push(WireMessage::application(
            HostId::new("a1"),
            peer.clone(),
            "a1-direct".into(),
            100,
            0.0,
        ));

        r.update(&mut t);

        // the deliverable message went out first and the attempt stopped
        assert_eq!(t.started.len(), 1);
        assert_eq!(t.started[0].id, "a1-direct");
        assert_eq!(t.started[0].to, peer);
    }

    #[test]
    fn forwarding_requires_strictly_greater_predictability() {
        let mut r = router("a1");
        let peer = HostId::new("a2");
        let mut t = StubTransport {
            contacts: vec![Contact { peer: peer.clone() }],
            ..Default::default()
        };
        // equal predictability on both sides: no forwarding
        t.buffer.push(WireMessage::application(
            HostId::new("a1"),
            HostId::new("b5"),
            "a1-relay".into(),
            100,
            0.0,
        ));
        r.update(&mut t);
        assert!(t.started.is_empty());

        t.peer_pub
            .insert((peer.clone(), HostId::new("b5")), 0.1);
        r.update(&mut t);
        assert_eq!(t.started.len(), 1);
        assert_eq!(t.started[0].to, peer);
    }

    #[test]
    fn leader_floods_init_signal_on_first_contact() {
        let mut r = router("a0");
        assert!(r.is_leader());
        let mut t = StubTransport::default();
        // default min interval is 600 s; nothing yet at t = 0
        r.on_contact_up(&HostId::new("a1"), &mut t).unwrap();
        assert!(t.created.is_empty());

        t.now = 700.0;
        r.on_contact_up(&HostId::new("a1"), &mut t).unwrap();
        assert_eq!(t.created.len(), 1);
        match &t.created[0].payload {
            Payload::InitSignal {
                leader_host,
                max_instance_id,
                community_id,
                ..
            } => {
                assert_eq!(leader_host, &HostId::new("a0"));
                assert_eq!(*max_instance_id, 700);
                assert_eq!(community_id, &CommunityId::new("a"));
            }
            other => panic!("expected init signal, got {other:?}"),
        }
        // addressed across community so the flood has a relay terminus
        assert_eq!(t.created[0].to, HostId::new("b4"));
    }
}
