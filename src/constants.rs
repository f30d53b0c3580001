//! # System Constants
//!
//! Status enums, API classification and reserved identifiers shared by every stage
//! of the runtime (transport, parser, worker).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved identifiers that never collide with generated API ids
pub mod reserved {
    /// API id carried by checkpoint operations inserted into a client DAG
    pub const CHECKPOINT_API_ID: u64 = u64::MAX - 1;
}

/// Raw command type ids as they appear on the command queues
pub mod command_ids {
    pub const OOB_PRE_DUMP_START: u32 = 0x0100;
    pub const OOB_DUMP_START: u32 = 0x0101;
    pub const WORKER_PRE_DUMP_DONE: u32 = 0x0200;
    /// Parser to worker direction; must never reach the parser
    pub const PARSER_PRE_DUMP_BARRIER: u32 = 0x0300;
}

/// Lifecycle status of a virtualized resource handle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum HandleStatus {
    #[default]
    Null = 0,
    /// Mocked on the parser side, not yet materialized on the device
    Pending = 1,
    /// Backed by a real device resource; server address is valid
    Active = 2,
    Deleted = 3,
}

impl HandleStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted)
    }

    /// Whether `self -> next` is a legal lifecycle step
    pub fn can_transition_to(&self, next: HandleStatus) -> bool {
        matches!(
            (self, next),
            (Self::Null, Self::Pending)
                | (Self::Pending, Self::Active)
                | (Self::Pending, Self::Deleted)
                | (Self::Active, Self::Deleted)
        )
    }
}

impl fmt::Display for HandleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Semantic class of an API, drives completion routing in the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
    CreateResource,
    DeleteResource,
    GetResource,
    SetResource,
    Checkpoint,
}

/// Library family an API belongs to; each family has its own return-code space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFamily {
    CudaRuntime,
    CudaDriver,
    CuBlas,
    Internal,
}

/// Execution status of one API request as it moves through the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiExecuteStatus {
    Received,
    Parsing,
    ParseFailed,
    /// Reply right after parsing; mocked bookkeeping is already complete
    ReturnAfterParse,
    /// Reply right after parsing; the request never needs the worker
    ReturnWithoutWorker,
    ForwardedToWorker,
}

impl ApiExecuteStatus {
    /// Statuses that are answered by the parser without the worker
    pub fn returns_from_parser(&self) -> bool {
        matches!(
            self,
            Self::ParseFailed | Self::ReturnAfterParse | Self::ReturnWithoutWorker
        )
    }
}
