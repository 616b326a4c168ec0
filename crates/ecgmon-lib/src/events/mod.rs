pub mod classifier;
pub mod kind;
pub mod rules;

pub use classifier::EventClassifier;
pub use kind::{EventKind, EventSet, EventState};
pub use rules::{Rule, RuleInputs, RULES};
