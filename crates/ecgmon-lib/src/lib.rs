pub mod config;
pub mod detectors;
pub mod events;
pub mod io;
pub mod metrics;
pub mod query;
pub mod session;
pub mod signal;
pub mod summary;

pub use config::*;
pub use detectors::*;
pub use events::*;
pub use metrics::*;
pub use query::{LiveView, Query};
pub use session::*;
pub use signal::*;
pub use summary::*;
