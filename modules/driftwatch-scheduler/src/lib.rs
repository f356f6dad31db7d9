//! Cycle scheduler: owns the process-lifetime loop, enforces at-most-one
//! running cycle, retries failed cycles, and dispatches notifications.

pub mod notify;
pub mod scheduler;

pub use scheduler::Scheduler;
