mod tracker;

pub use tracker::{SessionStatsTracker, TickOutcome};
