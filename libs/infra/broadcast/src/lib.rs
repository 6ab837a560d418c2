// [libs/infra/broadcast/src/lib.rs]
//! Live WebSocket broadcaster: fans snapshot/delta/alert/health
//! frames out to every connected UI client, with per-client backpressure
//! so one slow client cannot stall the others.

pub mod frame;
pub mod handler;
pub mod hub;
pub mod queue;
pub mod route;

pub use frame::Frame;
pub use hub::BroadcastHub;
pub use route::{upgrade, WsAppState};
