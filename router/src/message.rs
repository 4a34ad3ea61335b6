//! Wire message types for the routing protocol.
//!
//! The original design carried protocol parameters in an untyped
//! name-to-value property bag; here every message kind is a variant of a
//! closed tagged union with named fields, so handlers are exhaustively
//! checked at compile time and no casts can fail at runtime.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{CommunityId, HostId, InstanceId, SimTime};

/// Unique message identifier (`<origin>-<sequence>` by convention).
pub type MessageId = String;

/// A message in flight between nodes.
///
/// Ownership transfers from sender to receiver on successful transfer; the
/// sender may delete its local copy once final delivery or response
/// generation is confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Originating host.
    pub from: HostId,
    /// Wire-level recipient; the transport rejects transfers whose declared
    /// recipient is not the immediate peer, so relayed copies are
    /// retargeted before each hop.
    pub to: HostId,
    /// Unique identifier, stable across replication.
    pub id: MessageId,
    /// Total size in bytes (payload plus metadata).
    pub size: usize,
    /// Size of the response message this message solicits, if any.
    pub response_size: usize,
    /// Simulated creation time, used by FIFO queue ordering.
    pub created_at: SimTime,
    /// Kind-specific payload.
    pub payload: Payload,
}

/// The closed set of message kinds understood by the router.
///
/// Application payloads pass through the protocol handlers unprocessed;
/// everything else is protocol control traffic that is consumed by its
/// addressed recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// Opaque application data awaiting encapsulation at its origin.
    Application {
        /// Application payload size in bytes.
        bytes: usize,
    },

    /// An application message wrapped for multi-destination delivery.
    Encapsulated {
        /// Pseudonymized source tag (identity today, an obfuscation hook).
        source_pseudo: String,
        /// Decoy-padded recipient list; the true destination is one entry.
        destinations: Vec<HostId>,
        /// Application payload size in bytes.
        bytes: usize,
    },

    /// Leader-flooded signal opening an aggregation round.
    InitSignal {
        /// The initiating community leader.
        leader_host: HostId,
        /// Round instance id `g` (integer sim time at initiation).
        max_instance_id: InstanceId,
        /// Community the round belongs to.
        community_id: CommunityId,
        /// `g + j`, carrying the phase counter alongside the instance.
        sum_instance_id: InstanceId,
    },

    /// One half of a randomized blinding exchange.
    RandomNumberExchange {
        /// Uniformly random integer blind value.
        random_value: i64,
        /// Instance the sender's open accumulator belongs to.
        sum_instance_id: InstanceId,
        /// Whether the recipient should reply with a blind of its own.
        respond: bool,
    },

    /// A member's blinded vector contributed to its leader.
    ResponseDistribPreds {
        /// The blinded predictability vector.
        calculating_preds: HashMap<HostId, f64>,
        /// Instance the contribution belongs to.
        sum_instance_id: InstanceId,
        /// Phase counter at flush time.
        j_value: u32,
    },

    /// The finalized (or phase-tagged partial) community aggregate.
    ResponseSumPreds {
        /// The aggregate vector for the tagged phase.
        intermediate_preds: HashMap<HostId, f64>,
        /// Instance the aggregate belongs to.
        sum_instance_id: InstanceId,
        /// Phase tag: 0 is the seed vector, `accuracy + 1` the closing one.
        j_value: u32,
    },
}

impl Payload {
    /// Whether this is protocol control traffic (replicated only within the
    /// originating community, consumed by its addressed recipient).
    pub fn is_control(&self) -> bool {
        !matches!(
            self,
            Payload::Application { .. } | Payload::Encapsulated { .. }
        )
    }

    /// The decoy-padded destination list, when present.
    pub fn destinations(&self) -> Option<&[HostId]> {
        match self {
            Payload::Encapsulated { destinations, .. } => Some(destinations),
            _ => None,
        }
    }
}

impl WireMessage {
    /// Size of a control message on the wire.
    pub const CONTROL_SIZE: usize = 1024;

    /// Build a control message with the conventional fixed size.
    pub fn control(
        from: HostId,
        to: HostId,
        id: MessageId,
        created_at: SimTime,
        payload: Payload,
    ) -> Self {
        debug_assert!(payload.is_control());
        WireMessage {
            from,
            to,
            id,
            size: Self::CONTROL_SIZE,
            response_size: 0,
            created_at,
            payload,
        }
    }

    /// Build an application message awaiting encapsulation.
    pub fn application(
        from: HostId,
        to: HostId,
        id: MessageId,
        bytes: usize,
        created_at: SimTime,
    ) -> Self {
        WireMessage {
            from,
            to,
            id,
            size: bytes,
            response_size: 0,
            created_at,
            payload: Payload::Application { bytes },
        }
    }
}
