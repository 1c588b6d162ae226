pub mod config;
pub mod fetch;
pub mod normalize;
pub mod process;
pub mod schema;
pub mod sink;

pub use config::JobConfig;
pub use normalize::{parse_line, NormalizedRecord, FIELD_NAMES};
pub use process::{run, RunSummary};
