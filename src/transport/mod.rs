//! # Transport Queues
//!
//! Per-client queue wiring between the transport, the parser and the worker. Every
//! direction is an unbounded crossbeam MPMC channel, FIFO per direction.
//!
//! ```text
//! transport --requests-->  parser --worker_wq--> worker
//!     ^                      |  \                  |
//!     +------replies---------+   +----replies------+
//! oob ------commands------> parser <--commands---- worker
//!     <----completions------+
//! ```
//!
//! The worker reports each executed request through [`WorkerEndpoints::reply`], which
//! completes the request's version in the client's [`WorkerProgress`] before the reply is
//! queued.

pub mod command;

pub use command::{Command, CommandCompletion, CommandKind, CommandSource};

use crate::api::ApiRequest;
use crate::dag::WorkerProgress;
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use uuid::Uuid;

/// Parser-side ends of a client's queues
#[derive(Debug)]
pub struct ParserEndpoints {
    pub api_wq: Receiver<ApiRequest>,
    pub oob_cmd: Receiver<Command>,
    pub worker_cmd: Receiver<Command>,
    pub worker_wq: Sender<ApiRequest>,
    pub api_cq: Sender<ApiRequest>,
    pub cmd_cq: Sender<CommandCompletion>,
}

/// Worker-side ends of a client's queues
#[derive(Debug, Clone)]
pub struct WorkerEndpoints {
    pub requests: Receiver<ApiRequest>,
    pub replies: Sender<ApiRequest>,
    pub commands: Sender<Command>,
    pub progress: Arc<WorkerProgress>,
}

impl WorkerEndpoints {
    /// Complete an executed request and queue its reply; false if the reply queue is closed
    pub fn reply(&self, mut request: ApiRequest) -> bool {
        if let Some(version) = request.dag_version {
            self.progress.complete(version);
        }
        request.mark_returned();
        self.replies.send(request).is_ok()
    }
}

/// Ends handed out to the transport layer on handshake
#[derive(Debug, Clone)]
pub struct ClientEndpoints {
    pub client_id: Uuid,
    pub requests: Sender<ApiRequest>,
    pub replies: Receiver<ApiRequest>,
    pub commands: Sender<Command>,
    pub completions: Receiver<CommandCompletion>,
    pub worker: WorkerEndpoints,
}

impl ClientEndpoints {
    /// Queue an out-of-band command for the client's parser
    pub fn send_command(&self, type_id: u32) -> bool {
        self.commands
            .send(Command::new(type_id, self.client_id))
            .is_ok()
    }
}

/// Create the full queue set for one client
pub fn channel_set(
    client_id: Uuid,
    progress: Arc<WorkerProgress>,
) -> (ParserEndpoints, ClientEndpoints) {
    let (api_wq_tx, api_wq_rx) = unbounded();
    let (oob_tx, oob_rx) = unbounded();
    let (worker_cmd_tx, worker_cmd_rx) = unbounded();
    let (worker_wq_tx, worker_wq_rx) = unbounded();
    let (api_cq_tx, api_cq_rx) = unbounded();
    let (cmd_cq_tx, cmd_cq_rx) = unbounded();

    let parser = ParserEndpoints {
        api_wq: api_wq_rx,
        oob_cmd: oob_rx,
        worker_cmd: worker_cmd_rx,
        worker_wq: worker_wq_tx,
        api_cq: api_cq_tx.clone(),
        cmd_cq: cmd_cq_tx,
    };
    let client = ClientEndpoints {
        client_id,
        requests: api_wq_tx,
        replies: api_cq_rx,
        commands: oob_tx,
        completions: cmd_cq_rx,
        worker: WorkerEndpoints {
            requests: worker_wq_rx,
            replies: api_cq_tx,
            commands: worker_cmd_tx,
            progress,
        },
    };
    (parser, client)
}
