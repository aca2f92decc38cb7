//! Workflow status state machine.
//!
//! Pure transition logic; persistence of the resulting status is the state store's job.

pub mod errors;
pub mod events;
pub mod states;
pub mod transitions;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::WorkflowEvent;
pub use states::WorkflowStatus;
pub use transitions::{can_transition, determine_target_state, TransitionRecord};
