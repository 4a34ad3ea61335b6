//! Shared helpers for the integration tests: configuration presets and
//! contact-trace choreography for driving aggregation rounds.
#![allow(dead_code)]

use waypoint_router::sim::Simulation;
use waypoint_router::{HostId, RouterConfig};

/// A configuration with fast aging and no round rate limiting, suitable
/// for short synthetic contact traces.
pub fn test_config(communities: &str) -> RouterConfig {
    RouterConfig::new(1)
        .with_communities_attributes(communities)
        .with_min_round_interval(0.0)
}

/// Hosts of one community, leader first (declaration order).
pub fn community_hosts(sim: &Simulation, prefix: &str) -> Vec<HostId> {
    sim.directory()
        .hosts()
        .iter()
        .filter(|h| h.community_prefix() == prefix)
        .cloned()
        .collect()
}

/// One contact session: raise the contact, run enough ticks for the
/// control-message round trips it triggers, tear it down.
pub fn contact_session(sim: &mut Simulation, a: &HostId, b: &HostId) {
    sim.contact_up(a.clone(), b.clone()).expect("declared hosts");
    sim.run_ticks(8, 1.0);
    sim.contact_down(a.clone(), b.clone());
}

/// Open a community's aggregation round: the leader meets every member
/// once, which initiates the round and floods the init signal.
pub fn open_round(sim: &mut Simulation, prefix: &str) {
    let hosts = community_hosts(sim, prefix);
    let (leader, members) = hosts.split_first().expect("community is non-empty");
    for member in members {
        contact_session(sim, leader, member);
    }
}

/// One ring pass among the members: every member completes one blinding
/// exchange with each ring neighbor (two encounters per pass for three or
/// more members, one per pair session for two).
pub fn ring_pass(sim: &mut Simulation, prefix: &str) {
    let hosts = community_hosts(sim, prefix);
    let members = &hosts[1..];
    let n = members.len();
    if n < 2 {
        return;
    }
    for i in 0..n {
        contact_session(sim, &members[i], &members[(i + 1) % n]);
    }
}

/// Closing pass: the leader meets every member, giving each its final
/// encounter; flushed contributions are delivered during the same session.
pub fn leader_pass(sim: &mut Simulation, prefix: &str) {
    let hosts = community_hosts(sim, prefix);
    let (leader, members) = hosts.split_first().expect("community is non-empty");
    for member in members {
        contact_session(sim, leader, member);
    }
}

/// Drive one complete aggregation round for a community with `k_value = 2`:
/// open, two encounters per member via the ring, the third via the leader,
/// then one more leader pass to spread the finalized aggregate.
pub fn drive_full_round(sim: &mut Simulation, prefix: &str) {
    open_round(sim, prefix);
    ring_pass(sim, prefix);
    leader_pass(sim, prefix);
    leader_pass(sim, prefix);
}
