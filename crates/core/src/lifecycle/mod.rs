pub mod engine;
pub mod states;

pub use engine::{transition, LifecycleError, QueryLifecycle};
pub use states::{QueryEvent, QueryState, TransitionOutcome};
