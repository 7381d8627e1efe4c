//! Escalation hand-off and asynchronous dispatch.

pub mod queue;
pub mod scheduler;
pub mod task;

pub use queue::{CompletionGuard, EscalationQueue};
pub use scheduler::Dispatcher;
pub use task::{DispatchResult, EscalationTask};
