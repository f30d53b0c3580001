//! Control commands exchanged on the command queues.

use crate::constants::command_ids;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stage a command kind is allowed to originate from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    OutOfBand,
    Worker,
    Parser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    PreDumpStart,
    DumpStart,
    WorkerPreDumpDone,
    PreDumpBarrier,
}

impl CommandKind {
    pub fn from_type_id(type_id: u32) -> Option<Self> {
        match type_id {
            command_ids::OOB_PRE_DUMP_START => Some(Self::PreDumpStart),
            command_ids::OOB_DUMP_START => Some(Self::DumpStart),
            command_ids::WORKER_PRE_DUMP_DONE => Some(Self::WorkerPreDumpDone),
            command_ids::PARSER_PRE_DUMP_BARRIER => Some(Self::PreDumpBarrier),
            _ => None,
        }
    }

    pub fn type_id(&self) -> u32 {
        match self {
            Self::PreDumpStart => command_ids::OOB_PRE_DUMP_START,
            Self::DumpStart => command_ids::OOB_DUMP_START,
            Self::WorkerPreDumpDone => command_ids::WORKER_PRE_DUMP_DONE,
            Self::PreDumpBarrier => command_ids::PARSER_PRE_DUMP_BARRIER,
        }
    }

    pub fn source(&self) -> CommandSource {
        match self {
            Self::PreDumpStart | Self::DumpStart => CommandSource::OutOfBand,
            Self::WorkerPreDumpDone => CommandSource::Worker,
            Self::PreDumpBarrier => CommandSource::Parser,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Raw id as sent; resolved by the receiving stage
    pub type_id: u32,
    pub client_id: Uuid,
    pub issued_at: DateTime<Utc>,
}

impl Command {
    pub fn new(type_id: u32, client_id: Uuid) -> Self {
        Self {
            type_id,
            client_id,
            issued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandCompletion {
    pub kind: CommandKind,
    pub client_id: Uuid,
    pub result: Result<()>,
}
