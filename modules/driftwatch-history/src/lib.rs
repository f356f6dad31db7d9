//! Cycle history: one `scan_history` row per cycle, consulted by the
//! scheduler to compute the next fire time.

mod record;
mod store;

pub use record::{CycleCompletion, CycleRecord, CycleStatus};
pub use store::HistoryStore;
