mod scheduler;

pub use scheduler::{
    BreakDecision, BreakEvent, BreakScheduler, CheckpointWindow, SchedulerConfig, ZeroAlertPolicy,
};
