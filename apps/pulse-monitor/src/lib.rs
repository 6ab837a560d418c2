// [apps/pulse-monitor/src/lib.rs]
//! Composition root for the Pulse monitoring core: polls PVE/PBS
//! sources, maintains `ClusterState`, broadcasts live updates, evaluates
//! alert rules, and drives the durable notification queue.

pub mod aggregator;
pub mod alerting;
pub mod config;
pub mod handlers;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod vmid;
