pub mod recording;
pub mod text;

pub use recording::{read_recording, write_export, write_recording, ExportPaths};
pub use text::{parse_value_series, read_value_series};
