//! Service layer for the flowrun Control Plane.
//!
//! Services encapsulate the object operations behind the HTTP API and the
//! bootstrap loader.

pub mod execution;
pub mod workflow;

pub use execution::ExecutionService;
pub use workflow::WorkflowService;
