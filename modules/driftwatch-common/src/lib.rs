pub mod config;
pub mod error;
pub mod session;
pub mod types;
pub mod urlnorm;

pub use config::{Config, DifferConfig, SchedulerConfig, WorkflowConfig};
pub use error::DriftwatchError;
pub use session::new_session_id;
pub use types::*;
pub use urlnorm::canonicalize_url;
