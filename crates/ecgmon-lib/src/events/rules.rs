use super::kind::{EventKind, EventSet};
use crate::config::RuleThresholds;

/// Everything a rule may look at for one evaluation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RuleInputs {
    /// Evaluation time (seconds)
    pub now: f64,
    /// Raw value of the sample being evaluated
    pub value: i64,
    /// Detector amplitude threshold
    pub amplitude_threshold: i64,
    /// Heart rate from the last accepted interval; `None` before the second beat
    pub current_bpm: Option<u32>,
    /// Last threshold crossing, or the session start when no crossing has happened yet
    pub last_signal_timestamp: Option<f64>,
    pub rr_mean: Option<f64>,
    pub rr_variance: Option<f64>,
    pub qrs_width_mean: Option<f64>,
    pub qt_mean: Option<f64>,
}

type Predicate = fn(&RuleInputs, &RuleThresholds, EventSet) -> bool;

/// One row of the rule table.
#[derive(Clone, Copy)]
pub struct Rule {
    pub event: EventKind,
    /// Events whose state this rule reads. They must appear earlier in [`RULES`] so the
    /// single pass sees their already-updated state.
    pub depends_on: &'static [EventKind],
    predicate: Predicate,
}

impl Rule {
    pub fn holds(&self, inputs: &RuleInputs, thresholds: &RuleThresholds, active: EventSet) -> bool {
        (self.predicate)(inputs, thresholds, active)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("event", &self.event)
            .field("depends_on", &self.depends_on)
            .finish()
    }
}

/// Markers scored by the myocarditis composite.
pub const MYOCARDITIS_MARKERS: [EventKind; 3] = [
    EventKind::Tachycardia,
    EventKind::IrregularRhythm,
    EventKind::EarlyRepolarization,
];

/// Rule table in evaluation order.
pub const RULES: [Rule; EventKind::COUNT] = [
    Rule {
        event: EventKind::Bradycardia,
        depends_on: &[],
        predicate: bradycardia,
    },
    Rule {
        event: EventKind::Tachycardia,
        depends_on: &[],
        predicate: tachycardia,
    },
    Rule {
        event: EventKind::VentricularTachycardia,
        depends_on: &[],
        predicate: ventricular_tachycardia,
    },
    Rule {
        event: EventKind::Asystole,
        depends_on: &[],
        predicate: asystole,
    },
    Rule {
        event: EventKind::IrregularRhythm,
        depends_on: &[],
        predicate: irregular_rhythm,
    },
    Rule {
        event: EventKind::SinusNodeDysfunction,
        depends_on: &[],
        predicate: sinus_node_dysfunction,
    },
    Rule {
        event: EventKind::FirstDegreeAvBlock,
        depends_on: &[],
        predicate: first_degree_av_block,
    },
    Rule {
        event: EventKind::BundleBranchBlock,
        depends_on: &[],
        predicate: bundle_branch_block,
    },
    Rule {
        event: EventKind::LongQt,
        depends_on: &[],
        predicate: long_qt,
    },
    Rule {
        event: EventKind::ShortQt,
        depends_on: &[],
        predicate: short_qt,
    },
    Rule {
        event: EventKind::EarlyRepolarization,
        depends_on: &[],
        predicate: early_repolarization,
    },
    Rule {
        event: EventKind::Myocarditis,
        depends_on: &MYOCARDITIS_MARKERS,
        predicate: myocarditis,
    },
];

fn bradycardia(i: &RuleInputs, t: &RuleThresholds, _: EventSet) -> bool {
    i.current_bpm.is_some_and(|bpm| bpm < t.brady_bpm)
}

fn tachycardia(i: &RuleInputs, t: &RuleThresholds, _: EventSet) -> bool {
    i.current_bpm.is_some_and(|bpm| bpm > t.tachy_bpm)
}

fn ventricular_tachycardia(i: &RuleInputs, t: &RuleThresholds, _: EventSet) -> bool {
    i.current_bpm.is_some_and(|bpm| bpm > t.vtach_bpm)
}

fn asystole(i: &RuleInputs, t: &RuleThresholds, _: EventSet) -> bool {
    i.last_signal_timestamp
        .is_some_and(|last| i.now - last > t.asystole_s)
}

fn irregular_rhythm(i: &RuleInputs, t: &RuleThresholds, _: EventSet) -> bool {
    i.rr_variance.is_some_and(|var| var > t.var_irregular)
}

fn sinus_node_dysfunction(i: &RuleInputs, t: &RuleThresholds, _: EventSet) -> bool {
    match (i.rr_variance, i.rr_mean) {
        (Some(var), Some(mean)) => var > t.var_sinus && mean > t.rr_mean_sinus,
        _ => false,
    }
}

fn first_degree_av_block(i: &RuleInputs, t: &RuleThresholds, _: EventSet) -> bool {
    match (i.rr_variance, i.rr_mean) {
        (Some(var), Some(mean)) => mean > t.rr_mean_avblock && var < t.var_avblock_tight,
        _ => false,
    }
}

fn bundle_branch_block(i: &RuleInputs, t: &RuleThresholds, _: EventSet) -> bool {
    i.qrs_width_mean.is_some_and(|qrs| qrs > t.qrs_width_bbb)
}

fn long_qt(i: &RuleInputs, t: &RuleThresholds, _: EventSet) -> bool {
    i.qt_mean.is_some_and(|qt| qt > t.qt_long)
}

fn short_qt(i: &RuleInputs, t: &RuleThresholds, _: EventSet) -> bool {
    i.qt_mean.is_some_and(|qt| qt < t.qt_short)
}

fn early_repolarization(i: &RuleInputs, t: &RuleThresholds, _: EventSet) -> bool {
    // no established rate counts as below the ceiling
    let slow_enough = i.current_bpm.map_or(true, |bpm| bpm < t.st_max_bpm);
    i.value as f64 > i.amplitude_threshold as f64 * t.st_amplitude_ratio && slow_enough
}

fn myocarditis(_: &RuleInputs, t: &RuleThresholds, active: EventSet) -> bool {
    active.count_of(&MYOCARDITIS_MARKERS) >= t.myocarditis_min_score
}
