//! Background escalation of overdue requests.

pub mod scheduler;

pub use scheduler::EscalationScheduler;
