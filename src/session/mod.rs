pub mod commands;
pub mod context;
pub mod controller;
mod loop_worker;
mod services;

pub use context::{BreakOutcome, FrameOutcome, SessionContext, SessionSnapshot};
pub use controller::SessionController;
