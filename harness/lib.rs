//! Waypoint scenario validation and statistics.
//!
//! This crate drives the `waypoint-router` simulation through declarative
//! contact-trace scenarios and checks runtime properties of the protocol:
//! aggregation round completeness, community agreement on the public
//! estimate, and delivery accounting. Reports serialize to JSON for
//! archival and comparison across runs.
//!
//! ## Usage
//!
//! ```rust
//! use waypoint_harness::{ScenarioEvent, ScenarioRunner, ScenarioSpec};
//!
//! let spec = ScenarioSpec {
//!     name: "smoke".into(),
//!     seconds_in_time_unit: 1,
//!     communities_attributes: "a:4,b:3".into(),
//!     k_value: 2,
//!     min_round_interval: 0.0,
//!     seed: 7,
//!     events: vec![
//!         ScenarioEvent::ContactUp { a: "a1".into(), b: "a2".into() },
//!         ScenarioEvent::CreateMessage { from: "a1".into(), to: "a2".into(), bytes: 100 },
//!         ScenarioEvent::Run { ticks: 5, dt: 1.0 },
//!     ],
//! };
//!
//! let report = ScenarioRunner::new(spec).run().unwrap();
//! assert_eq!(report.delivered_messages, 1);
//! ```

#![warn(missing_docs)]

pub mod validation;

pub use validation::{
    CommunityAgreement, ScenarioEvent, ScenarioReport, ScenarioRunner, ScenarioSpec,
    ValidationError,
};

/// Run a scenario and export its report as pretty-printed JSON.
pub fn run_and_export(spec: ScenarioSpec) -> anyhow::Result<String> {
    let report = ScenarioRunner::new(spec).run()?;
    Ok(serde_json::to_string_pretty(&report)?)
}
