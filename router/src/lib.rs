//! # Waypoint Routing Core
//!
//! This library implements the routing core of an opportunistic
//! (delay-tolerant) network node: a probabilistic store-and-forward protocol
//! that decides, for every contact between two mobile nodes, which messages
//! to exchange, combined with a privacy-preserving distributed aggregation
//! protocol that produces community-level delivery-probability estimates
//! without any single node learning another node's private values.
//!
//! ## Architecture
//!
//! The protocol consists of several components, leaf first:
//!
//! - **PredictabilityStore**: per-neighbor delivery-probability map with
//!   aging and transitive updates ([`predictability`])
//! - **CommunityDirectory**: immutable mapping of community ids to member
//!   counts and leader identities ([`community`])
//! - **BlindingAggregator**: randomized secret-blinding protocol for
//!   k-anonymous community aggregation ([`aggregation`])
//! - **MessageEncapsulator**: multi-destination encapsulation with decoy
//!   recipients ([`encapsulation`])
//! - **ProtocolMessageRouter**: the message-kind state machine that drives
//!   contact-time behavior ([`router`])
//! - **Simulation driver**: a single-threaded cooperative harness for
//!   driving routers through contact traces ([`sim`])
//!
//! ## Usage
//!
//! ```rust
//! use waypoint_router::{RouterConfig, sim::Simulation};
//!
//! let config = RouterConfig::new(30)
//!     .with_communities_attributes("a:4,b:3")
//!     .with_k_value(2);
//!
//! let mut sim = Simulation::new(config, 7).unwrap();
//! sim.contact_up("a1", "a2").unwrap();
//! sim.run_ticks(10, 1.0);
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod aggregation;
pub mod community;
pub mod encapsulation;
pub mod message;
pub mod predictability;
pub mod router;
pub mod sim;

pub use aggregation::{LeaderAggregation, MemberAggregation, PublicEstimate};
pub use community::CommunityDirectory;
pub use encapsulation::MessageEncapsulator;
pub use message::{Payload, WireMessage};
pub use predictability::PredictabilityStore;
pub use router::{
    Contact, ProtocolMessageRouter, Reception, TransferStart, Transport, ROUTER_KIND,
};

/// Simulated time in seconds.
pub type SimTime = f64;

/// Aggregation protocol instance identifier (integer sim time at initiation).
pub type InstanceId = u64;

/// A delivery-predictability vector keyed by destination host.
pub type PredMap = HashMap<HostId, f64>;

/// Delivery predictability initialization constant.
pub const P_INIT: f64 = 0.75;

/// Delivery predictability transitivity scaling constant default value.
pub const DEFAULT_BETA: f64 = 0.25;

/// Delivery predictability aging constant.
pub const GAMMA: f64 = 0.98;

/// Default number of entries in an encapsulated destination list.
pub const DEFAULT_DESTINATION_NUM: usize = 4;

/// Default number of refinement rounds carried by the phase counter.
///
/// The drafts of this protocol used values between 3 and 6; this
/// implementation fixes the default at 3.
pub const DEFAULT_PRED_ACCURACY: u32 = 3;

/// Default anonymity threshold `k`, constant such that `2 <= k < |C|`.
pub const DEFAULT_K_VALUE: usize = 2;

/// Default minimum interval between aggregation rounds, in simulated seconds.
pub const DEFAULT_MIN_ROUND_INTERVAL: f64 = 600.0;

/// Opaque, stable identity of a node.
///
/// The textual encoding allows unambiguous community extraction: all hosts
/// sharing the leading alphabetic prefix belong to one community (`"b7"` is
/// host 7 in community `"b"`). A host's community never changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostId(String);

impl HostId {
    /// Create a host identifier from its textual encoding.
    pub fn new(id: impl Into<String>) -> Self {
        HostId(id.into())
    }

    /// The textual encoding of this identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The leading alphabetic prefix, shared by all members of a community.
    pub fn community_prefix(&self) -> &str {
        let end = self
            .0
            .find(|c: char| !c.is_alphabetic())
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HostId {
    fn from(s: &str) -> Self {
        HostId::new(s)
    }
}

/// Identifier of a community (the shared host-id prefix).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommunityId(String);

impl CommunityId {
    /// Create a community identifier.
    pub fn new(id: impl Into<String>) -> Self {
        CommunityId(id.into())
    }

    /// The textual encoding of this identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommunityId {
    fn from(s: &str) -> Self {
        CommunityId::new(s)
    }
}

/// Ordering policy applied to the send queue when predictability ties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueuePolicy {
    /// Oldest message first (by creation time, then id).
    #[default]
    Fifo,
    /// Shuffle with the router's seeded RNG.
    Random,
}

/// Configuration bundle accepted by router construction.
///
/// `seconds_in_time_unit` is required (it sizes the aging unit and must be
/// tweaked per scenario); everything else has a documented default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// How many seconds one time unit is when aging delivery predictions.
    pub seconds_in_time_unit: u32,

    /// Transitivity scaling constant (beta).
    pub beta: f64,

    /// Aging constant (gamma).
    pub gamma: f64,

    /// Delivery predictability initialization constant.
    pub p_init: f64,

    /// Number of entries in an encapsulated destination list.
    pub destination_num: usize,

    /// Number of refinement rounds bounded by the phase counter
    /// (`0 <= j <= pred_accuracy + 1`).
    pub pred_accuracy: u32,

    /// Anonymity threshold `k`; a member flushes its blinded vector after
    /// `k + 1` distinct completed exchanges.
    pub k_value: usize,

    /// Minimum interval between aggregation round initiations, in
    /// simulated seconds.
    pub min_round_interval: f64,

    /// Comma-separated `communityId:memberCount` pairs used to derive
    /// leader identities and community sizes (e.g. `"a:5,b:4"`).
    pub communities_attributes: String,

    /// Send-queue ordering policy for predictability ties.
    pub queue_policy: QueuePolicy,
}

impl RouterConfig {
    /// Create a configuration with the required aging unit size and default
    /// values for everything else.
    pub fn new(seconds_in_time_unit: u32) -> Self {
        Self {
            seconds_in_time_unit,
            beta: DEFAULT_BETA,
            gamma: GAMMA,
            p_init: P_INIT,
            destination_num: DEFAULT_DESTINATION_NUM,
            pred_accuracy: DEFAULT_PRED_ACCURACY,
            k_value: DEFAULT_K_VALUE,
            min_round_interval: DEFAULT_MIN_ROUND_INTERVAL,
            communities_attributes: String::new(),
            queue_policy: QueuePolicy::Fifo,
        }
    }

    /// Set the transitivity scaling constant.
    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    /// Set the aging constant.
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set the destination-list size.
    pub fn with_destination_num(mut self, n: usize) -> Self {
        self.destination_num = n;
        self
    }

    /// Set the number of refinement rounds.
    pub fn with_pred_accuracy(mut self, accuracy: u32) -> Self {
        self.pred_accuracy = accuracy;
        self
    }

    /// Set the anonymity threshold.
    pub fn with_k_value(mut self, k: usize) -> Self {
        self.k_value = k;
        self
    }

    /// Set the minimum inter-round interval.
    pub fn with_min_round_interval(mut self, seconds: f64) -> Self {
        self.min_round_interval = seconds;
        self
    }

    /// Set the community declaration string.
    pub fn with_communities_attributes(mut self, attrs: &str) -> Self {
        self.communities_attributes = attrs.to_string();
        self
    }

    /// Set the send-queue ordering policy.
    pub fn with_queue_policy(mut self, policy: QueuePolicy) -> Self {
        self.queue_policy = policy;
        self
    }

    /// Validate the scalar settings.
    ///
    /// Community-level constraints (member counts versus `k_value`) are
    /// checked when the [`CommunityDirectory`] is built from this bundle;
    /// both are fatal at startup.
    pub fn validate(&self) -> RouterResult<()> {
        if self.seconds_in_time_unit == 0 {
            return Err(RouterError::Config(
                "secondsInTimeUnit must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.p_init) {
            return Err(RouterError::Config(format!(
                "p_init {} outside [0, 1]",
                self.p_init
            )));
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return Err(RouterError::Config(format!(
                "gamma {} outside (0, 1]",
                self.gamma
            )));
        }
        if self.beta < 0.0 {
            return Err(RouterError::Config(format!("beta {} negative", self.beta)));
        }
        if self.destination_num == 0 {
            return Err(RouterError::Config(
                "destination_num must be at least 1".into(),
            ));
        }
        if self.k_value < 2 {
            return Err(RouterError::Config(format!(
                "kValue {} below the minimum of 2",
                self.k_value
            )));
        }
        if self.min_round_interval < 0.0 {
            return Err(RouterError::Config(
                "min_round_interval must not be negative".into(),
            ));
        }
        if self.communities_attributes.is_empty() {
            return Err(RouterError::Config(
                "communitiesAttributes is required".into(),
            ));
        }
        Ok(())
    }
}

/// Errors raised by the routing core.
///
/// Configuration errors are fatal at startup; protocol violations indicate a
/// defect in how the simulation is driven and abort the affected round
/// rather than corrupt state. Everything else in this core is transient and
/// silently retried on the next tick or contact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// Invalid configuration, reported at construction.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Protocol precondition violation (mismatched router kinds, mismatched
    /// aggregation instance ids).
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

/// Result type for routing-core operations.
pub type RouterResult<T> = Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_community_prefix() {
        assert_eq!(HostId::new("a12").community_prefix(), "a");
        assert_eq!(HostId::new("crew7").community_prefix(), "crew");
        assert_eq!(HostId::new("b0").community_prefix(), "b");
    }

    #[test]
    fn config_defaults() {
        let config = RouterConfig::new(30).with_communities_attributes("a:4");
        assert_eq!(config.beta, DEFAULT_BETA);
        assert_eq!(config.k_value, DEFAULT_K_VALUE);
        assert_eq!(config.pred_accuracy, DEFAULT_PRED_ACCURACY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_rejects_missing_communities() {
        let config = RouterConfig::new(30);
        assert!(matches!(
            config.validate(),
            Err(RouterError::Config(_))
        ));
    }

    #[test]
    fn config_rejects_small_k() {
        let config = RouterConfig::new(30)
            .with_communities_attributes("a:4")
            .with_k_value(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_rejects_zero_time_unit() {
        let config = RouterConfig::new(0).with_communities_attributes("a:4");
        assert!(config.validate().is_err());
    }
}
