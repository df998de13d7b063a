//! flowrun Control Plane Library
//!
//! Reconciliation-based execution of workflow templates:
//!
//! - **Object model**: Workflows, executions, steps, threads and runs stored
//!   as versioned objects with owner references
//! - **Engine**: Level-triggered reconciler turning a manifest into a chain
//!   of step objects and folding their states back into the execution
//! - **Controller**: Work queue and workers driven by the store's change feed
//! - **HTTP API**: Template, execution and run endpoints
//!
//! ## Modules
//!
//! - [`api`]: Object kinds and their specs and statuses
//! - [`store`]: Storage contract, in-memory and PostgreSQL backends
//! - [`engine`]: Chain building, aggregation, threads, correlation
//! - [`controller`]: Work queue and worker pool
//! - [`config`]: Configuration loading from environment variables
//! - [`error`]: Custom error types with Axum integration
//! - [`handlers`]: HTTP route handlers
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use flowrun_control_plane::{
//!     controller::{Controller, ControllerConfig},
//!     store::{Client, MemoryStore},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::new(Arc::new(MemoryStore::new()));
//!     let controller = Arc::new(Controller::new(client, ControllerConfig::default()));
//!     let handle = controller.start().await?;
//!     // ... create workflows and executions through the client
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod controller;
pub mod db;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod result_ext;
pub mod services;
pub mod state;
pub mod store;

pub use error::{AppError, AppResult};
pub use result_ext::ResultExt;
