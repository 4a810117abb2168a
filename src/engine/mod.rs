pub mod cache;
pub mod dedup;
pub mod dispatcher;
pub mod identity;
pub mod mention;
pub mod pacing;
pub mod scroll;
pub mod session;

pub use dedup::{DedupStore, SkipReason};
pub use dispatcher::{Collaborators, Dispatcher, ItemReport, StepResult};
pub use identity::PostKey;
pub use pacing::{Cancellation, Pacer};
pub use session::{EngagementSession, SessionReport, Termination};
