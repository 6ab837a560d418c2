// [libs/core/alert-engine/src/lib.rs]
//! Threshold evaluation, hysteresis, grouping, and cooldown for the
//! alert engine. Everything here is synchronous and takes `now` as an explicit
//! parameter so it can be driven by either a real clock or a test clock;
//! the tokio timers that call it on a cadence live in `pulse-monitor`.

pub mod cooldown;
pub mod fsm;
pub mod grouping;
pub mod rules;

pub use cooldown::CooldownTracker;
pub use fsm::{AlertFsm, AlertState, Transition};
pub use grouping::GroupingWindow;
pub use rules::select_effective_rule;
