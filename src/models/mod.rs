pub mod definition;
pub mod instance;
pub mod messages;

// Re-export core models for easy access
pub use definition::{DefinitionRef, StepDefinition, WorkflowDefinition};
pub use instance::{OutstandingAttempt, WorkflowInstance};
pub use messages::{IdempotencyKey, StepMessage, StepOutcome, StepResult};
