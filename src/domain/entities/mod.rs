pub mod descriptor;
pub mod failure;
pub mod run_log;
pub mod state;

pub use descriptor::JobDescriptor;
pub use failure::{CapturedFailure, JobFault};
pub use run_log::RunLogEntry;
pub use state::JobState;
