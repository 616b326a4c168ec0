pub mod features;
pub mod window;

pub use features::{FeatureBuffers, FeatureId, FeatureStats};
pub use window::FeatureWindow;
