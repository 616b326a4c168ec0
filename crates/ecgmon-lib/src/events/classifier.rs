use super::kind::{EventKind, EventSet, EventState};
use super::rules::{RuleInputs, RULES};
use crate::config::RuleThresholds;
use log::debug;

/// Latched, edge-counted event states driven by the rule table.
#[derive(Debug, Clone)]
pub struct EventClassifier {
    thresholds: RuleThresholds,
    states: [EventState; EventKind::COUNT],
    active: EventSet,
}

impl EventClassifier {
    pub fn new(thresholds: RuleThresholds) -> Self {
        Self {
            thresholds,
            states: [EventState::default(); EventKind::COUNT],
            active: EventSet::empty(),
        }
    }

    pub fn thresholds(&self) -> &RuleThresholds {
        &self.thresholds
    }

    /// Run every rule once, in table order, and return the resulting active set.
    ///
    /// Composite rules see the state their dependencies reached earlier in this same pass.
    /// Evaluating again with identical inputs changes nothing.
    pub fn evaluate(&mut self, inputs: &RuleInputs) -> EventSet {
        for rule in &RULES {
            let holds = rule.holds(inputs, &self.thresholds, self.active);
            self.set_event(rule.event, holds);
        }
        self.active
    }

    /// Latch `kind` on or off; a count is added only on the inactive→active edge.
    pub fn set_event(&mut self, kind: EventKind, condition: bool) {
        let state = &mut self.states[kind.index()];
        if condition && !state.active {
            state.active = true;
            state.occurrence_count += 1;
            debug!("{} raised (occurrence {})", kind, state.occurrence_count);
        } else if !condition && state.active {
            state.active = false;
            debug!("{} cleared", kind);
        }
        self.active.set(kind, condition);
    }

    pub fn active(&self) -> EventSet {
        self.active
    }

    pub fn state(&self, kind: EventKind) -> EventState {
        self.states[kind.index()]
    }

    pub fn occurrence_count(&self, kind: EventKind) -> u64 {
        self.states[kind.index()].occurrence_count
    }

    /// States in rule-table order.
    pub fn states(&self) -> impl Iterator<Item = (EventKind, EventState)> + '_ {
        EventKind::ALL
            .into_iter()
            .map(move |kind| (kind, self.states[kind.index()]))
    }

    pub fn reset(&mut self) {
        self.states = [EventState::default(); EventKind::COUNT];
        self.active = EventSet::empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> EventClassifier {
        EventClassifier::new(RuleThresholds::default())
    }

    fn inputs() -> RuleInputs {
        RuleInputs {
            now: 10.0,
            value: 0,
            amplitude_threshold: 15_000,
            current_bpm: Some(70),
            last_signal_timestamp: Some(9.5),
            ..RuleInputs::default()
        }
    }

    #[test]
    fn counts_only_rising_edges() {
        let mut c = classifier();
        let slow = RuleInputs {
            current_bpm: Some(40),
            ..inputs()
        };
        for _ in 0..5 {
            c.evaluate(&slow);
        }
        assert_eq!(c.occurrence_count(EventKind::Bradycardia), 1);
        c.evaluate(&inputs());
        assert!(!c.state(EventKind::Bradycardia).active);
        c.evaluate(&slow);
        assert_eq!(c.occurrence_count(EventKind::Bradycardia), 2);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let mut c = classifier();
        let i = RuleInputs {
            current_bpm: Some(120),
            value: 20_000,
            rr_mean: Some(0.5),
            rr_variance: Some(0.05),
            ..inputs()
        };
        let first = c.evaluate(&i);
        let counts: Vec<u64> = c.states().map(|(_, s)| s.occurrence_count).collect();
        let second = c.evaluate(&i);
        assert_eq!(first, second);
        let again: Vec<u64> = c.states().map(|(_, s)| s.occurrence_count).collect();
        assert_eq!(counts, again);
    }

    #[test]
    fn composite_sees_same_cycle_state() {
        let mut c = classifier();
        let i = RuleInputs {
            current_bpm: Some(120),
            rr_mean: Some(0.5),
            rr_variance: Some(0.05),
            ..inputs()
        };
        let active = c.evaluate(&i);
        assert!(active.contains(EventKind::Tachycardia));
        assert!(active.contains(EventKind::IrregularRhythm));
        // raised on the first pass, without a lagging cycle
        assert!(active.contains(EventKind::Myocarditis));
        assert_eq!(c.occurrence_count(EventKind::Myocarditis), 1);

        let calm = c.evaluate(&inputs());
        assert!(!calm.contains(EventKind::Myocarditis));
    }

    #[test]
    fn undefined_features_are_false() {
        let mut c = classifier();
        c.set_event(EventKind::LongQt, true);
        let active = c.evaluate(&inputs());
        assert!(!active.contains(EventKind::LongQt));
        assert!(active.is_empty());
    }

    #[test]
    fn reset_clears_counts() {
        let mut c = classifier();
        c.evaluate(&RuleInputs {
            current_bpm: Some(30),
            ..inputs()
        });
        c.reset();
        assert!(c.active().is_empty());
        assert!(c.states().all(|(_, s)| s == EventState::default()));
    }
}
