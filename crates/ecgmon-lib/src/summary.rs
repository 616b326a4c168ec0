use crate::events::EventKind;
use serde::{Deserialize, Serialize};

/// How prominent an event was relative to all recorded occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Concern {
    Normal,
    Elevated,
    High,
}

impl Concern {
    pub fn from_share(share_pct: f64) -> Self {
        if share_pct > 40.0 {
            Concern::High
        } else if share_pct > 20.0 {
            Concern::Elevated
        } else {
            Concern::Normal
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub event: EventKind,
    pub occurrences: u64,
    /// Share of all occurrences in the session, percent
    pub share_pct: f64,
    pub concern: Concern,
}

/// Per-event share of the session's occurrence counts, most frequent first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub total_occurrences: u64,
    pub entries: Vec<SummaryEntry>,
}

impl EventSummary {
    pub fn from_counts(counts: impl IntoIterator<Item = (EventKind, u64)>) -> Self {
        let mut counts: Vec<(EventKind, u64)> =
            counts.into_iter().filter(|&(_, c)| c > 0).collect();
        counts.sort_by_key(|&(kind, _)| kind);
        // stable: ties keep rule-table order
        counts.sort_by(|a, b| b.1.cmp(&a.1));

        let total_occurrences: u64 = counts.iter().map(|&(_, c)| c).sum();
        let denominator = total_occurrences.max(1) as f64;
        let entries = counts
            .into_iter()
            .map(|(event, occurrences)| {
                let share_pct = occurrences as f64 * 100.0 / denominator;
                SummaryEntry {
                    event,
                    occurrences,
                    share_pct,
                    concern: Concern::from_share(share_pct),
                }
            })
            .collect();
        Self {
            total_occurrences,
            entries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares_and_concern_levels() {
        let summary = EventSummary::from_counts([
            (EventKind::Bradycardia, 5),
            (EventKind::Asystole, 3),
            (EventKind::LongQt, 2),
            (EventKind::Myocarditis, 0),
        ]);
        assert_eq!(summary.total_occurrences, 10);
        assert_eq!(summary.entries.len(), 3);
        let first = &summary.entries[0];
        assert_eq!(first.event, EventKind::Bradycardia);
        assert!((first.share_pct - 50.0).abs() < 1e-9);
        assert_eq!(first.concern, Concern::High);
        assert_eq!(summary.entries[1].concern, Concern::Elevated);
        // exactly 20% is not above the cut-off
        assert_eq!(summary.entries[2].concern, Concern::Normal);
    }

    #[test]
    fn ties_keep_rule_order() {
        let summary = EventSummary::from_counts([
            (EventKind::ShortQt, 1),
            (EventKind::Tachycardia, 1),
        ]);
        let order: Vec<EventKind> = summary.entries.iter().map(|e| e.event).collect();
        assert_eq!(order, vec![EventKind::Tachycardia, EventKind::ShortQt]);
    }

    #[test]
    fn empty_session_has_no_entries() {
        let summary = EventSummary::from_counts(EventKind::ALL.map(|k| (k, 0)));
        assert!(summary.is_empty());
        assert_eq!(summary.total_occurrences, 0);
    }
}
