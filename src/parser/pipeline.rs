//! Per-client parser daemon.
//!
//! One dedicated thread per client busy-polls the client's command and request queues,
//! runs the registered parsing function for each request, routes it to a direct reply or
//! to the worker, and inserts checkpoint operations on the configured cadence.
//!
//! While a checkpoint op waits for the worker to finish the ops logged before it, no new
//! request is drained; a dump completes only once its checkpoint has been captured.

use super::checkpoint::insert_checkpoint;
use crate::api::{ApiRegistry, ApiRequest};
use crate::checkpoint::DirectoryStore;
use crate::client::Client;
use crate::config::CheckpointPolicy;
use crate::constants::{ApiExecuteStatus, ApiFamily, ApiType};
use crate::dag::Operation;
use crate::error::{PhosError, Result};
use crate::logging::{log_error, log_pipeline_event};
use crate::transport::{Command, CommandCompletion, CommandKind, CommandSource, ParserEndpoints};
use crate::workspace::Workspace;
use crossbeam::utils::Backoff;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const IDLE_PARK: Duration = Duration::from_micros(200);

/// Loop counters for one pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub processed: u64,
    pub parse_failed: u64,
    pub returned_early: u64,
    pub forwarded: u64,
    pub checkpoints_inserted: u64,
    pub checkpoint_failures: u64,
    pub commands_handled: u64,
}

/// What a pipeline hands back when its thread ends
#[derive(Debug)]
pub struct PipelineExit {
    pub client: Client,
    /// Set when the loop halted on a protocol defect rather than a stop request
    pub defect: Option<PhosError>,
    pub stats: PipelineStats,
}

/// Handle to a running parser thread
#[derive(Debug)]
pub struct ParserPipeline {
    client_id: Uuid,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<PipelineExit>>,
}

impl ParserPipeline {
    pub fn spawn(
        workspace: Arc<Workspace>,
        client: Client,
        endpoints: ParserEndpoints,
    ) -> Result<Self> {
        let client_id = client.id();
        let stop = Arc::new(AtomicBool::new(false));
        let loop_stop = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name(format!("phos-parser-{}", client.pid()))
            .spawn(move || {
                let store = DirectoryStore::new(&workspace.config().checkpoint.directory);
                PipelineLoop {
                    workspace: &workspace,
                    client,
                    endpoints,
                    store,
                    stats: PipelineStats::default(),
                    pending: VecDeque::new(),
                }
                .run(&loop_stop)
            })
            .map_err(|err| PhosError::precondition(format!("spawning parser thread: {err}")))?;

        log_pipeline_event(&client_id.to_string(), "started", None);
        Ok(Self {
            client_id,
            stop,
            thread: Some(thread),
        })
    }

    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    /// False once the loop has returned, either on request or after a defect
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Set the stop flag and join; in-flight requests are not drained
    pub fn stop(mut self) -> Result<PipelineExit> {
        self.stop.store(true, Ordering::Release);
        let thread = self
            .thread
            .take()
            .ok_or_else(|| PhosError::not_found(format!("parser thread of {}", self.client_id)))?;
        let exit = thread.join().map_err(|_| {
            PhosError::protocol_defect(format!("parser thread of {} panicked", self.client_id))
        })?;
        log_pipeline_event(
            &self.client_id.to_string(),
            "stopped",
            exit.defect.as_ref().map(|d| d.to_string()).as_deref(),
        );
        Ok(exit)
    }
}

impl Drop for ParserPipeline {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

/// Checkpoint op inserted but not captured yet
#[derive(Debug)]
struct PendingCheckpoint {
    version: u64,
    /// Requester of the dump this checkpoint belongs to
    dump_for: Option<Uuid>,
}

struct PipelineLoop<'a> {
    workspace: &'a Workspace,
    client: Client,
    endpoints: ParserEndpoints,
    store: DirectoryStore,
    stats: PipelineStats,
    pending: VecDeque<PendingCheckpoint>,
}

impl PipelineLoop<'_> {
    fn run(mut self, stop: &AtomicBool) -> PipelineExit {
        let client_id = self.client.id();
        let backoff = Backoff::new();
        let mut defect = None;

        while !stop.load(Ordering::Acquire) {
            if !self.client.is_ready() {
                Self::idle(&backoff);
                continue;
            }
            match self.iteration() {
                Ok(true) => backoff.reset(),
                Ok(false) => Self::idle(&backoff),
                Err(err) => {
                    error!(client_id = %client_id, error = %err, "parser pipeline halted");
                    log_error(
                        "parser_pipeline",
                        "iteration",
                        &err.to_string(),
                        Some(&client_id.to_string()),
                    );
                    defect = Some(err);
                    break;
                }
            }
        }

        info!(client_id = %client_id, stats = ?self.stats, "🔁 PARSER: loop exited");
        PipelineExit {
            client: self.client,
            defect,
            stats: self.stats,
        }
    }

    fn idle(backoff: &Backoff) {
        if backoff.is_completed() {
            thread::park_timeout(IDLE_PARK);
        } else {
            backoff.snooze();
        }
    }

    /// One pass over every input queue; `Ok(true)` if anything was processed
    fn iteration(&mut self) -> Result<bool> {
        let mut progressed = false;

        while let Ok(command) = self.endpoints.oob_cmd.try_recv() {
            self.handle_command(command, CommandSource::OutOfBand)?;
            progressed = true;
        }
        while let Ok(command) = self.endpoints.worker_cmd.try_recv() {
            self.handle_command(command, CommandSource::Worker)?;
            progressed = true;
        }

        progressed |= self.settle_checkpoints();
        if self.client.has_pending_capture() {
            return Ok(progressed);
        }

        let max_batch = self.workspace.config().parser.max_batch;
        let mut drained = 0;
        while max_batch == 0 || drained < max_batch {
            let Ok(request) = self.endpoints.api_wq.try_recv() else {
                break;
            };
            self.handle_request(request)?;
            drained += 1;
            progressed = true;
        }

        let now = Instant::now();
        if self.client.is_time_for_ckpt(now) {
            let policy = self.client.policy();
            if let Some(version) = self.checkpoint(policy) {
                self.pending.push_back(PendingCheckpoint {
                    version,
                    dump_for: None,
                });
            }
            self.client.reset_ckpt_timer(now);
            progressed |= self.settle_checkpoints();
        }

        Ok(progressed)
    }

    fn handle_command(&mut self, command: Command, source: CommandSource) -> Result<()> {
        let kind = CommandKind::from_type_id(command.type_id).ok_or_else(|| {
            PhosError::protocol_defect(format!(
                "unknown command type {:#06x} from {source:?}",
                command.type_id
            ))
        })?;
        if kind.source() != source {
            return Err(PhosError::protocol_defect(format!(
                "{kind:?} command arrived on the {source:?} queue"
            )));
        }

        let result = match kind {
            CommandKind::PreDumpStart | CommandKind::WorkerPreDumpDone => Ok(()),
            CommandKind::DumpStart => {
                let policy = match self.client.policy() {
                    CheckpointPolicy::Disabled => CheckpointPolicy::Naive,
                    enabled => enabled,
                };
                match self.checkpoint(policy) {
                    Some(version) => {
                        debug!(client_id = %self.client.id(), version, "dump waiting on capture");
                        self.pending.push_back(PendingCheckpoint {
                            version,
                            dump_for: Some(command.client_id),
                        });
                        return Ok(());
                    }
                    None => self.finish_dump(true),
                }
            }
            CommandKind::PreDumpBarrier => {
                return Err(PhosError::protocol_defect("parser received its own barrier"))
            }
        };
        self.complete_command(kind, command.client_id, result);
        Ok(())
    }

    fn complete_command(&mut self, kind: CommandKind, client_id: Uuid, result: Result<()>) {
        debug!(
            client_id = %self.client.id(),
            command = ?kind,
            ok = result.is_ok(),
            "command handled"
        );
        self.stats.commands_handled += 1;
        let completion = CommandCompletion {
            kind,
            client_id,
            result,
        };
        if self.endpoints.cmd_cq.send(completion).is_err() {
            debug!(client_id = %self.client.id(), "command completion queue closed");
        }
    }

    /// Run captures the worker has caught up with and finish their checkpoints in order
    fn settle_checkpoints(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        self.client.capture_settled(self.workspace.device());

        let mut settled = false;
        while let Some(front) = self.pending.front() {
            let version = front.version;
            let Some(failed) = self
                .client
                .dag()
                .get(version)
                .and_then(Operation::outcome)
                .map(|outcome| outcome.failed.len())
            else {
                break;
            };
            let dump_for = self.pending.pop_front().and_then(|p| p.dump_for);
            settled = true;

            if failed > 0 {
                self.stats.checkpoint_failures += 1;
                warn!(
                    client_id = %self.client.id(),
                    version,
                    failed,
                    "checkpoint capture incomplete, retrying at next cadence tick"
                );
            }
            if let Some(requester) = dump_for {
                let result = self.finish_dump(failed == 0);
                self.complete_command(CommandKind::DumpStart, requester, result);
            }
        }
        settled
    }

    /// Persist the latest captured state once the dump's checkpoint is in
    fn finish_dump(&mut self, clean: bool) -> Result<()> {
        if !clean {
            return Err(PhosError::Persistence(
                "checkpoint captured with failures".to_string(),
            ));
        }
        self.client.reset_ckpt_timer(Instant::now());
        let persisted = self.client.persist_latest(&self.store)?;
        info!(
            client_id = %self.client.id(),
            persisted,
            directory = %self.store.root().display(),
            "📸 CHECKPOINT: dump persisted"
        );
        Ok(())
    }

    /// Insert one checkpoint op, returning its version; `None` under the disabled policy
    fn checkpoint(&mut self, policy: CheckpointPolicy) -> Option<u64> {
        let version = insert_checkpoint(&mut self.client, policy, self.workspace.device())?;
        self.stats.checkpoints_inserted += 1;
        Some(version)
    }

    fn handle_request(&mut self, mut request: ApiRequest) -> Result<()> {
        request.status = ApiExecuteStatus::Parsing;
        self.stats.processed += 1;

        let Some(meta) = self.workspace.api_registry().get(request.api_id).cloned() else {
            warn!(client_id = %self.client.id(), api_id = request.api_id, "unknown api id");
            let result = Err(PhosError::not_found(format!("api {}", request.api_id)));
            request.return_code =
                ApiRegistry::cast_retval(&result, ApiFamily::Internal);
            request.status = ApiExecuteStatus::ParseFailed;
            self.stats.parse_failed += 1;
            self.reply(request);
            return Ok(());
        };
        let parse = self
            .workspace
            .parser_registry()
            .get(request.api_id)
            .ok_or_else(|| {
                PhosError::protocol_defect(format!(
                    "no parser registered for {} ({})",
                    meta.name, meta.api_id
                ))
            })?;

        request.timing.parse_start = Some(Instant::now());
        let result = parse(self.workspace, &mut self.client, &mut request);
        request.timing.parse_end = Some(Instant::now());
        request.return_code = ApiRegistry::cast_retval(&result, meta.family);

        if let Err(err) = result {
            if err.is_fatal() {
                return Err(err);
            }
            warn!(
                client_id = %self.client.id(),
                api = meta.name,
                return_code = request.return_code,
                error = %err,
                "parse failed"
            );
            request.status = ApiExecuteStatus::ParseFailed;
            self.stats.parse_failed += 1;
            self.reply(request);
            return Ok(());
        }

        let op = Operation::api(request.api_id, request.handles().to_vec());
        request.dag_version = Some(self.client.launch_op(op, self.workspace.device()));

        if meta.api_type == ApiType::DeleteResource {
            request.status = ApiExecuteStatus::ReturnAfterParse;
        } else if request.status == ApiExecuteStatus::Parsing {
            request.status = ApiExecuteStatus::ForwardedToWorker;
        }

        if request.status.returns_from_parser() {
            self.stats.returned_early += 1;
            self.reply(request);
        } else {
            self.stats.forwarded += 1;
            let progress = self.client.worker_progress();
            if let Some(version) = request.dag_version {
                progress.forward(version);
            }
            if let Err(err) = self.endpoints.worker_wq.send(request) {
                debug!(client_id = %self.client.id(), "worker queue closed");
                if let Some(version) = err.into_inner().dag_version {
                    progress.complete(version);
                }
            }
        }
        Ok(())
    }

    fn reply(&self, mut request: ApiRequest) {
        request.mark_returned();
        if self.endpoints.api_cq.send(request).is_err() {
            debug!(client_id = %self.client.id(), "reply queue closed");
        }
    }
}
