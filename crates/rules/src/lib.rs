//! Rule Graph: a directed graph of Services with named Dependants edges,
//! plus the five traversal policies the Action Engine drives Start, Stop,
//! Restart, Monitor, and Unmonitor through (spec §4.4).

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod graph;

pub use error::GraphError;
pub use graph::{Graph, RestartPlan};
