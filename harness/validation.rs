//! Scenario-driven protocol validation.
//!
//! A [`ScenarioSpec`] declares a network (the community attributes), a
//! deterministic seed and a list of timed events: contacts, application
//! traffic, scheduler runs. The [`ScenarioRunner`] replays it against a
//! fresh simulation and condenses the outcome into a [`ScenarioReport`]
//! with runtime property checks.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use waypoint_router::sim::Simulation;
use waypoint_router::{CommunityId, RouterConfig, RouterError};

/// Errors raised while replaying a scenario.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The routing core rejected the configuration or an event.
    #[error("scenario rejected by the routing core: {0}")]
    Router(#[from] RouterError),

    /// Report serialization failed.
    #[error("report serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One timed step of a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScenarioEvent {
    /// Raise a symmetric contact.
    ContactUp {
        /// One endpoint.
        a: String,
        /// The other endpoint.
        b: String,
    },
    /// Tear a contact down.
    ContactDown {
        /// One endpoint.
        a: String,
        /// The other endpoint.
        b: String,
    },
    /// Create an application message in the originator's buffer.
    CreateMessage {
        /// Originating host.
        from: String,
        /// Destination host.
        to: String,
        /// Payload size in bytes.
        bytes: usize,
    },
    /// Run the scheduler for a number of ticks.
    Run {
        /// Tick count.
        ticks: usize,
        /// Seconds per tick.
        dt: f64,
    },
    /// Let simulated time pass without scheduler activity.
    AdvanceClock {
        /// Seconds to skip.
        seconds: f64,
    },
}

/// A declarative scenario: network shape plus an event trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Scenario name, echoed in the report.
    pub name: String,
    /// Aging unit size for the routers.
    pub seconds_in_time_unit: u32,
    /// Community declaration string (`"a:4,b:3"`).
    pub communities_attributes: String,
    /// Anonymity threshold.
    pub k_value: usize,
    /// Minimum interval between aggregation rounds.
    pub min_round_interval: f64,
    /// Seed for all randomized decisions.
    pub seed: u64,
    /// The event trace, replayed in order.
    pub events: Vec<ScenarioEvent>,
}

impl ScenarioSpec {
    fn to_config(&self) -> RouterConfig {
        RouterConfig::new(self.seconds_in_time_unit)
            .with_communities_attributes(&self.communities_attributes)
            .with_k_value(self.k_value)
            .with_min_round_interval(self.min_round_interval)
    }
}

/// Per-community agreement on the public predictability estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityAgreement {
    /// The community.
    pub community: String,
    /// Members excluding the leader.
    pub member_count: usize,
    /// Members whose estimate matches the leader's entry for entry.
    pub agreeing_members: usize,
    /// Rounds the community's leader has finalized.
    pub leader_rounds: u64,
}

/// Condensed outcome of a scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name.
    pub name: String,
    /// Simulated time at the end of the trace.
    pub sim_time: f64,
    /// Application messages created by the trace.
    pub created_messages: usize,
    /// Distinct application messages that reached a destination.
    pub delivered_messages: usize,
    /// Delivered over created, 0 when nothing was created.
    pub delivery_ratio: f64,
    /// Aggregation rounds finalized across all leaders.
    pub completed_rounds: u64,
    /// Leaders with a round still in flight.
    pub rounds_in_flight: usize,
    /// Agreement per community, in declaration order.
    pub agreement: Vec<CommunityAgreement>,
    /// Runtime property violations observed during the run.
    pub violations: Vec<String>,
}

/// Replays a [`ScenarioSpec`] and produces a [`ScenarioReport`].
pub struct ScenarioRunner {
    spec: ScenarioSpec,
}

impl ScenarioRunner {
    /// Create a runner for a scenario.
    pub fn new(spec: ScenarioSpec) -> Self {
        Self { spec }
    }

    /// Replay the event trace and collect the report.
    pub fn run(&self) -> Result<ScenarioReport, ValidationError> {
        let config = self.spec.to_config();
        let mut sim = Simulation::new(config, self.spec.seed)?;
        let mut created: HashSet<String> = HashSet::new();

        info!(name = %self.spec.name, events = self.spec.events.len(), "replaying scenario");
        for event in &self.spec.events {
            match event {
                ScenarioEvent::ContactUp { a, b } => sim.contact_up(a.as_str(), b.as_str())?,
                ScenarioEvent::ContactDown { a, b } => {
                    sim.contact_down(a.as_str(), b.as_str());
                }
                ScenarioEvent::CreateMessage { from, to, bytes } => {
                    let id = sim.create_app_message(from.as_str(), to.as_str(), *bytes)?;
                    created.insert(id);
                }
                ScenarioEvent::Run { ticks, dt } => sim.run_ticks(*ticks, *dt),
                ScenarioEvent::AdvanceClock { seconds } => sim.advance_clock(*seconds),
            }
        }

        Ok(self.collect(&sim, &created))
    }

    fn collect(&self, sim: &Simulation, created: &HashSet<String>) -> ScenarioReport {
        let mut violations = Vec::new();

        let delivered: HashSet<&str> = sim
            .deliveries()
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        for id in &delivered {
            if !created.contains(*id) {
                violations.push(format!("delivery of a message the trace never created: {id}"));
            }
        }
        let delivery_ratio = if created.is_empty() {
            0.0
        } else {
            delivered.len() as f64 / created.len() as f64
        };
        if delivery_ratio > 1.0 {
            violations.push(format!("delivery ratio {delivery_ratio} above 1"));
        }

        let mut completed_rounds = 0;
        let mut rounds_in_flight = 0;
        let mut agreement = Vec::new();
        let communities: Vec<CommunityId> = sim.directory().communities().cloned().collect();
        for community in communities {
            let leader_host = sim
                .directory()
                .leader_of(&community)
                .expect("declared community has a leader")
                .clone();
            let leader = sim
                .router(leader_host)
                .expect("leader host exists")
                .leader_aggregation()
                .expect("leader host has leader state");
            completed_rounds += leader.completed_rounds();
            if leader.has_instance() {
                rounds_in_flight += 1;
            }

            agreement.push(self.community_agreement(sim, &community, leader.completed_rounds()));
        }

        debug!(
            delivered = delivered.len(),
            created = created.len(),
            completed_rounds,
            "scenario finished"
        );
        ScenarioReport {
            name: self.spec.name.clone(),
            sim_time: sim.clock(),
            created_messages: created.len(),
            delivered_messages: delivered.len(),
            delivery_ratio,
            completed_rounds,
            rounds_in_flight,
            agreement,
            violations,
        }
    }

    fn community_agreement(
        &self,
        sim: &Simulation,
        community: &CommunityId,
        leader_rounds: u64,
    ) -> CommunityAgreement {
        let hosts: Vec<_> = sim
            .directory()
            .hosts()
            .iter()
            .filter(|h| h.community_prefix() == community.as_str())
            .cloned()
            .collect();
        let leader_host = sim
            .directory()
            .leader_of(community)
            .expect("declared community has a leader");
        let reference = sim
            .router(leader_host.clone())
            .expect("leader host exists")
            .public_estimate()
            .resolved()
            .clone();

        let members: Vec<_> = hosts.iter().filter(|h| *h != leader_host).collect();
        let agreeing = members
            .iter()
            .filter(|host| {
                let estimate = sim
                    .router((**host).clone())
                    .expect("member host exists")
                    .public_estimate();
                !reference.is_empty()
                    && reference
                        .iter()
                        .all(|(dest, value)| (estimate.pred_for(dest) - value).abs() < 1e-9)
            })
            .count();

        CommunityAgreement {
            community: community.to_string(),
            member_count: members.len(),
            agreeing_members: agreeing,
            leader_rounds,
        }
    }
}
