pub mod activity;
pub mod coordinator;
pub mod scheduler;
pub mod token_codec;
pub mod tokens;

pub use activity::ActivityTracker;
pub use coordinator::{RefreshCoordinator, RefreshError, RefreshTransport};
pub use scheduler::{
    RefreshScheduler, RefreshTiming, SchedulerState, SessionEndCallback, SessionEndReason,
};
pub use token_codec::{Identity, IdentityError, ParseError, ParsedToken};
pub use tokens::{TokenPair, TokenStore};
