#![allow(clippy::doc_markdown)] // Allow technical terms like CUDA, cuBLAS in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # PhOS Core
//!
//! Resource-handle virtualization and checkpoint insertion for a GPU compute runtime.
//!
//! ## Overview
//!
//! Every device resource a client creates (contexts, streams, modules, module globals,
//! buffers) is represented by a virtual [`handle::Handle`]. The client only ever sees a
//! mocked *client address*; the real *server address* is bound later, when the handle
//! is restored on the device. This indirection is what lets a client's resources be
//! checkpointed and recreated without the client noticing.
//!
//! ## Architecture
//!
//! Per connected client there is one parser thread ([`parser::ParserPipeline`]). It
//! drains the client's command and request queues, runs the registered parsing function
//! for each request against the client's handle managers, appends an operation to the
//! client's [`dag::OperationDag`], and either replies directly or forwards the request
//! to the worker. On a fixed cadence it inserts checkpoint operations, naive (every
//! stateful handle) or incremental (only handles modified since the last one). A
//! checkpoint captures once the worker has finished every op forwarded before it.
//!
//! ## Module Organization
//!
//! - [`handle`] - handles, per-kind capabilities, handle managers, restore procedures
//! - [`checkpoint`] - versioned checkpoint bags, cadence timer, persistence
//! - [`dag`] - per-client operation log
//! - [`parser`] - parsing function table, checkpoint insertion, parser daemon
//! - [`api`] - request context and API metadata
//! - [`transport`] - per-client queues and control commands
//! - [`device`] - device runtime binding
//! - [`client`] / [`workspace`] - per-client and process-wide state
//! - [`config`] - layered configuration
//! - [`error`] - structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use phos_core::api::ApiRegistry;
//! use phos_core::config::PhosConfig;
//! use phos_core::device::InMemoryDevice;
//! use phos_core::parser::ParserRegistry;
//! use phos_core::workspace::Workspace;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! phos_core::logging::init_structured_logging();
//!
//! let workspace = Workspace::new(
//!     PhosConfig::default(),
//!     ApiRegistry::default(),
//!     ParserRegistry::default(),
//!     Arc::new(InMemoryDevice::new()),
//! )?;
//! let endpoints = workspace.handshake(std::process::id())?;
//! workspace.set_client_ready(endpoints.client_id)?;
//! let exit = workspace.teardown(endpoints.client_id)?;
//! println!("processed {} requests", exit.stats.processed);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod checkpoint;
pub mod client;
pub mod config;
pub mod constants;
pub mod dag;
pub mod device;
pub mod error;
pub mod handle;
pub mod logging;
pub mod parser;
pub mod transport;
pub mod workspace;

pub use api::{ApiMeta, ApiRegistry, ApiRequest};
pub use checkpoint::{CheckpointBag, CheckpointSlot, CheckpointStore, DirectoryStore};
pub use client::Client;
pub use config::{CheckpointPolicy, ConfigManager, PhosConfig};
pub use constants::{ApiExecuteStatus, ApiFamily, ApiType, HandleStatus};
pub use dag::{Operation, OperationDag, WorkerProgress};
pub use device::{DeviceRuntime, InMemoryDevice};
pub use error::{PhosError, Result};
pub use handle::{AllocationRequest, Handle, HandleKey, HandleManager, ResourceKind};
pub use parser::{ParserFn, ParserPipeline, ParserRegistry, PipelineExit, PipelineStats};
pub use transport::{ClientEndpoints, Command, CommandCompletion, CommandKind};
pub use workspace::Workspace;
