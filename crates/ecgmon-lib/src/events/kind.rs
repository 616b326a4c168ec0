use serde::{Deserialize, Serialize};
use std::fmt;

/// Cardiac and signal-quality conditions reported by the rule engine.
///
/// Declaration order is the rule-table evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "Bradycardia")]
    Bradycardia,
    #[serde(rename = "Tachycardia")]
    Tachycardia,
    #[serde(rename = "Ventricular Tachycardia")]
    VentricularTachycardia,
    #[serde(rename = "Asystole / Flatline")]
    Asystole,
    #[serde(rename = "Irregular Rhythm")]
    IrregularRhythm,
    #[serde(rename = "Sinus Node Dysfunction")]
    SinusNodeDysfunction,
    #[serde(rename = "First-Degree AV Block (possible)")]
    FirstDegreeAvBlock,
    #[serde(rename = "Bundle Branch Block (possible)")]
    BundleBranchBlock,
    #[serde(rename = "Long QT (possible)")]
    LongQt,
    #[serde(rename = "Short QT (possible)")]
    ShortQt,
    #[serde(rename = "Early Repolarization / ST Elevation (possible)")]
    EarlyRepolarization,
    #[serde(rename = "Myocarditis (possible)")]
    Myocarditis,
}

impl EventKind {
    pub const COUNT: usize = 12;

    pub const ALL: [EventKind; EventKind::COUNT] = [
        EventKind::Bradycardia,
        EventKind::Tachycardia,
        EventKind::VentricularTachycardia,
        EventKind::Asystole,
        EventKind::IrregularRhythm,
        EventKind::SinusNodeDysfunction,
        EventKind::FirstDegreeAvBlock,
        EventKind::BundleBranchBlock,
        EventKind::LongQt,
        EventKind::ShortQt,
        EventKind::EarlyRepolarization,
        EventKind::Myocarditis,
    ];

    pub fn label(self) -> &'static str {
        match self {
            EventKind::Bradycardia => "Bradycardia",
            EventKind::Tachycardia => "Tachycardia",
            EventKind::VentricularTachycardia => "Ventricular Tachycardia",
            EventKind::Asystole => "Asystole / Flatline",
            EventKind::IrregularRhythm => "Irregular Rhythm",
            EventKind::SinusNodeDysfunction => "Sinus Node Dysfunction",
            EventKind::FirstDegreeAvBlock => "First-Degree AV Block (possible)",
            EventKind::BundleBranchBlock => "Bundle Branch Block (possible)",
            EventKind::LongQt => "Long QT (possible)",
            EventKind::ShortQt => "Short QT (possible)",
            EventKind::EarlyRepolarization => "Early Repolarization / ST Elevation (possible)",
            EventKind::Myocarditis => "Myocarditis (possible)",
        }
    }

    pub fn from_label(label: &str) -> Option<EventKind> {
        EventKind::ALL.into_iter().find(|kind| kind.label() == label)
    }

    /// Composite events are computed from other events in the same pass.
    pub fn is_composite(self) -> bool {
        matches!(self, EventKind::Myocarditis)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Set of events, stored as a bit mask so every recorded sample can carry one cheaply.
/// Iterates and serializes in rule-table order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<EventKind>", into = "Vec<EventKind>")]
pub struct EventSet(u16);

impl EventSet {
    pub const fn empty() -> Self {
        EventSet(0)
    }

    pub fn insert(&mut self, kind: EventKind) {
        self.0 |= kind.bit();
    }

    pub fn remove(&mut self, kind: EventKind) {
        self.0 &= !kind.bit();
    }

    pub fn set(&mut self, kind: EventKind, on: bool) {
        if on {
            self.insert(kind);
        } else {
            self.remove(kind);
        }
    }

    pub fn contains(self, kind: EventKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Members of `self` missing from `other`.
    pub fn difference(self, other: EventSet) -> EventSet {
        EventSet(self.0 & !other.0)
    }

    /// How many of `kinds` are in the set.
    pub fn count_of(self, kinds: &[EventKind]) -> usize {
        kinds.iter().filter(|&&kind| self.contains(kind)).count()
    }

    pub fn iter(self) -> impl Iterator<Item = EventKind> {
        EventKind::ALL
            .into_iter()
            .filter(move |&kind| self.contains(kind))
    }

    pub fn labels(self) -> Vec<&'static str> {
        self.iter().map(EventKind::label).collect()
    }
}

impl FromIterator<EventKind> for EventSet {
    fn from_iter<I: IntoIterator<Item = EventKind>>(iter: I) -> Self {
        let mut set = EventSet::empty();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

impl From<Vec<EventKind>> for EventSet {
    fn from(kinds: Vec<EventKind>) -> Self {
        kinds.into_iter().collect()
    }
}

impl From<EventSet> for Vec<EventKind> {
    fn from(set: EventSet) -> Self {
        set.iter().collect()
    }
}

/// Comma-joined labels, the per-sample flag column of the export.
impl fmt::Display for EventSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, kind) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(kind.label())?;
        }
        Ok(())
    }
}

/// Latched state of one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventState {
    pub active: bool,
    /// Number of inactive→active transitions since the last reset.
    pub occurrence_count: u64,
}
