// [libs/core/alert-engine/src/fsm.rs]
//! Per-(resource, metric) threshold FSM.
//!
//! States: `clear`, `pending(since)`, `active`, `resolving(since)`. The
//! `Active -> Resolving` edge requires the value to have fallen back past
//! the threshold by at least `hysteresis` (relative fraction of the
//! threshold magnitude), which is what damps flapping right at the line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pulse_domain::alert::Comparator;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AlertState {
    Clear,
    Pending { since: DateTime<Utc> },
    Active,
    Resolving { since: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    Started,
    Resolved,
}

/// A single evaluation step. Pure function of `(state, triggered,
/// resolved_past_hysteresis, now, dwell)`; no I/O, no shared mutable state.
pub struct AlertFsm;

impl AlertFsm {
    /// Advances `state` given the latest sample. `comparator`/`threshold`
    /// classify `value` as triggered; `hysteresis` is the fraction of
    /// `threshold` the value must fall back past before `Active` is
    /// allowed to move to `Resolving`.
    pub fn step(
        state: AlertState,
        comparator: Comparator,
        threshold: f64,
        hysteresis: f64,
        value: f64,
        dwell_time: chrono::Duration,
        now: DateTime<Utc>,
    ) -> (AlertState, Transition) {
        let triggered = comparator.evaluate(value, threshold);
        let resolved_with_margin = has_cleared_with_hysteresis(comparator, threshold, hysteresis, value);

        match state {
            AlertState::Clear => {
                if triggered {
                    (AlertState::Pending { since: now }, Transition::None)
                } else {
                    (AlertState::Clear, Transition::None)
                }
            }
            AlertState::Pending { since } => {
                if !triggered {
                    (AlertState::Clear, Transition::None)
                } else if now - since >= dwell_time {
                    (AlertState::Active, Transition::Started)
                } else {
                    (AlertState::Pending { since }, Transition::None)
                }
            }
            AlertState::Active => {
                if resolved_with_margin {
                    (AlertState::Resolving { since: now }, Transition::None)
                } else {
                    (AlertState::Active, Transition::None)
                }
            }
            AlertState::Resolving { since } => {
                if triggered {
                    (AlertState::Active, Transition::None)
                } else if now - since >= dwell_time {
                    (AlertState::Clear, Transition::Resolved)
                } else {
                    (AlertState::Resolving { since }, Transition::None)
                }
            }
        }
    }
}

fn has_cleared_with_hysteresis(comparator: Comparator, threshold: f64, hysteresis: f64, value: f64) -> bool {
    let margin = threshold.abs() * hysteresis;
    match comparator {
        Comparator::Gt | Comparator::Ge => value <= threshold - margin,
        Comparator::Lt | Comparator::Le => value >= threshold + margin,
        Comparator::Eq => (value - threshold).abs() > margin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(seconds, 0).unwrap()
    }

    /// threshold=80, hysteresis=5%, dwell=30s, values 75 -> 82 -> 83 ->
    /// 82 -> 74 sampled every 15s starting at t=0.
    #[test]
    fn lifecycle_with_hysteresis_matches_e2e_scenario() {
        let dwell = ChronoDuration::seconds(30);
        let comparator = Comparator::Gt;
        let threshold = 80.0;
        let hysteresis = 0.05;

        let mut state = AlertState::Clear;

        let (s, t) = AlertFsm::step(state, comparator, threshold, hysteresis, 75.0, dwell, at(0));
        state = s;
        assert_eq!(t, Transition::None);
        assert_eq!(state, AlertState::Clear);

        let (s, t) = AlertFsm::step(state, comparator, threshold, hysteresis, 82.0, dwell, at(30));
        state = s;
        assert_eq!(t, Transition::None);
        assert!(matches!(state, AlertState::Pending { .. }));

        // dwell has now elapsed since pending began at t=30
        let (s, t) = AlertFsm::step(state, comparator, threshold, hysteresis, 83.0, dwell, at(60));
        state = s;
        assert_eq!(t, Transition::Started);
        assert_eq!(state, AlertState::Active);

        // 82 is still > 80, and not below threshold - hysteresis (76) -> stays active
        let (s, t) = AlertFsm::step(state, comparator, threshold, hysteresis, 82.0, dwell, at(75));
        state = s;
        assert_eq!(t, Transition::None);
        assert_eq!(state, AlertState::Active);

        // 74 < 80 - 4 (80*0.05) = 76 -> begins resolving
        let (s, t) = AlertFsm::step(state, comparator, threshold, hysteresis, 74.0, dwell, at(90));
        state = s;
        assert_eq!(t, Transition::None);
        assert!(matches!(state, AlertState::Resolving { .. }));

        // dwell elapses while staying below threshold
        let (s, t) = AlertFsm::step(state, comparator, threshold, hysteresis, 74.0, dwell, at(121));
        assert_eq!(t, Transition::Resolved);
        assert_eq!(s, AlertState::Clear);
    }

    #[test]
    fn resolving_reverts_to_active_if_value_re_triggers() {
        let dwell = ChronoDuration::seconds(30);
        let state = AlertState::Resolving { since: at(0) };
        let (next, transition) = AlertFsm::step(state, Comparator::Gt, 80.0, 0.05, 85.0, dwell, at(10));
        assert_eq!(transition, Transition::None);
        assert_eq!(next, AlertState::Active);
    }

    #[test]
    fn pending_reverts_to_clear_if_value_drops_before_dwell() {
        let dwell = ChronoDuration::seconds(30);
        let state = AlertState::Pending { since: at(0) };
        let (next, transition) = AlertFsm::step(state, Comparator::Gt, 80.0, 0.05, 70.0, dwell, at(10));
        assert_eq!(transition, Transition::None);
        assert_eq!(next, AlertState::Clear);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use proptest::prelude::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(seconds, 0).unwrap()
    }

    proptest! {
        /// An `Active` alert only starts resolving once the value has
        /// fallen back past the threshold by at least the hysteresis
        /// margin; anything short of that margin must hold `Active`.
        #[test]
        fn active_only_resolves_past_hysteresis_margin(
            threshold in 1.0f64..1000.0,
            hysteresis in 0.0f64..0.5,
            value in 1.0f64..1000.0,
        ) {
            let dwell = ChronoDuration::seconds(30);
            let (next, transition) = AlertFsm::step(
                AlertState::Active,
                Comparator::Gt,
                threshold,
                hysteresis,
                value,
                dwell,
                at(0),
            );

            prop_assert_eq!(transition, Transition::None);
            let crossed_margin = value <= threshold - threshold.abs() * hysteresis;
            if crossed_margin {
                prop_assert!(matches!(next, AlertState::Resolving { .. }));
            } else {
                prop_assert_eq!(next, AlertState::Active);
            }
        }

        /// `Resolving` always reverts to `Active` the instant the value
        /// re-triggers, regardless of how long it had been resolving.
        #[test]
        fn resolving_reverts_to_active_on_any_retrigger(
            threshold in 1.0f64..1000.0,
            elapsed in 0i64..3600,
            value in 80.0f64..1000.0,
        ) {
            let dwell = ChronoDuration::seconds(30);
            let state = AlertState::Resolving { since: at(0) };
            let (next, transition) = AlertFsm::step(state, Comparator::Gt, threshold, 0.05, value, dwell, at(elapsed));

            if value > threshold {
                prop_assert_eq!(next, AlertState::Active);
                prop_assert_eq!(transition, Transition::None);
            }
        }
    }
}
