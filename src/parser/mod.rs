//! # Parser Stage
//!
//! Validates each intercepted API call against the client's virtual resources and routes
//! it either straight back to the client or on to the worker for real device execution.
//!
//! Request state machine:
//!
//! ```text
//! Received -> Parsing -> ParseFailed
//!                     -> ReturnAfterParse      (always for resource deletion)
//!                     -> ReturnWithoutWorker   (set by the parsing function)
//!                     -> ForwardedToWorker
//! ```
//!
//! ## Module Organization
//!
//! - [`registry`] - API id to parsing function table
//! - [`checkpoint`] - naive and incremental checkpoint insertion
//! - [`pipeline`] - the per-client daemon thread

pub mod checkpoint;
pub mod pipeline;
pub mod registry;

pub use checkpoint::insert_checkpoint;
pub use pipeline::{ParserPipeline, PipelineExit, PipelineStats};
pub use registry::{ParserFn, ParserRegistry};
