pub mod applier;
pub mod retry;

pub use applier::{apply_update, UpdateRegistry};
pub use retry::{retry_delay, ReachabilityProbe, RetryEvent, UpdateWithRetry};
