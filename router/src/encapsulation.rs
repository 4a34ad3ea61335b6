//! Multi-destination message encapsulation.
//!
//! Outbound application messages are wrapped with pseudonymous metadata: a
//! source tag (identity today, a hook for future obfuscation) and a
//! destination list that hides the true recipient among randomly chosen
//! decoys. The wire-level `to` field is rewritten per hop because the
//! transport rejects transfers whose declared recipient is not the
//! immediate peer.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::community::CommunityDirectory;
use crate::message::{Payload, WireMessage};
use crate::HostId;

/// Wraps application messages for multi-destination, source-hiding
/// delivery.
#[derive(Debug, Clone)]
pub struct MessageEncapsulator {
    destination_num: usize,
    directory: Arc<CommunityDirectory>,
}

impl MessageEncapsulator {
    /// Create an encapsulator drawing decoys from the directory's host
    /// universe.
    pub fn new(destination_num: usize, directory: Arc<CommunityDirectory>) -> Self {
        Self {
            destination_num,
            directory,
        }
    }

    /// Wrap `msg` with a pseudonymized source tag and a decoy-padded
    /// destination list sized by `destination_num`.
    ///
    /// Deterministic for identical input and RNG seed. A message already
    /// carrying a destination list is replicated unchanged, never
    /// re-encapsulated, so metadata cannot grow across hops.
    pub fn encapsulate(&self, msg: &WireMessage, rng: &mut impl Rng) -> WireMessage {
        let bytes = match &msg.payload {
            Payload::Application { bytes } => *bytes,
            // already wrapped (or control traffic): plain replication
            _ => return msg.clone(),
        };

        let mut destinations = self.decoy_list(&msg.from, &msg.to, rng);
        destinations.push(msg.to.clone());
        destinations.shuffle(rng);

        let source_pseudo = Self::pseudonym(&msg.from);
        let metadata = serde_json::to_string(&(&source_pseudo, &destinations))
            .expect("host ids always serialize");

        WireMessage {
            from: msg.from.clone(),
            to: msg.to.clone(),
            id: msg.id.clone(),
            size: msg.size + metadata.len(),
            response_size: msg.response_size,
            created_at: msg.created_at,
            payload: Payload::Encapsulated {
                source_pseudo,
                destinations,
                bytes,
            },
        }
    }

    /// Rewrite the wire-level `to` field to a concrete physical neighbor
    /// while preserving the destination list.
    pub fn retarget(msg: &WireMessage, neighbor: &HostId) -> WireMessage {
        let mut out = msg.clone();
        out.to = neighbor.clone();
        out
    }

    /// Pseudonymized encoding of a host identity. Currently the identity
    /// encoding; obfuscation slots in here.
    pub fn pseudonym(host: &HostId) -> String {
        host.to_string()
    }

    fn decoy_list(
        &self,
        source: &HostId,
        recipient: &HostId,
        rng: &mut impl Rng,
    ) -> Vec<HostId> {
        let wanted = self.destination_num.saturating_sub(1);
        let candidates: Vec<&HostId> = self
            .directory
            .hosts()
            .iter()
            .filter(|h| *h != source && *h != recipient)
            .collect();
        candidates
            .choose_multiple(rng, wanted)
            .map(|h| (*h).clone())
            .collect()
    }
}
