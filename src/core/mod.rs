pub mod config;
pub mod reducer;
pub mod series;
pub mod version;

pub use config::DatabaseConfig;
pub use reducer::{reduce, UpdateAction, UpdateState};
pub use series::{DataSeries, MajorSeries, SeriesSet};
pub use version::{DataVersion, VersionNumber, VersionSpec};
