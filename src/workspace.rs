//! # Workspace
//!
//! Process-wide state shared by every client pipeline: configuration, the API metadata
//! and parsing tables, the device binding, and the table of connected clients.

use crate::api::ApiRegistry;
use crate::client::Client;
use crate::config::PhosConfig;
use crate::device::DeviceRuntime;
use crate::error::{PhosError, Result};
use crate::logging::log_pipeline_event;
use crate::parser::{ParserPipeline, ParserRegistry, PipelineExit};
use crate::transport::{channel_set, ClientEndpoints};
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

struct ClientSlot {
    pid: u32,
    ready: Arc<AtomicBool>,
    pipeline: ParserPipeline,
}

pub struct Workspace {
    config: PhosConfig,
    api_registry: ApiRegistry,
    parser_registry: ParserRegistry,
    device: Arc<dyn DeviceRuntime>,
    clients: DashMap<Uuid, ClientSlot>,
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("config", &self.config)
            .field("apis", &self.api_registry.len())
            .field("parsers", &self.parser_registry.len())
            .field("clients", &self.clients.len())
            .finish()
    }
}

impl Workspace {
    pub fn new(
        config: PhosConfig,
        api_registry: ApiRegistry,
        parser_registry: ParserRegistry,
        device: Arc<dyn DeviceRuntime>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        info!(
            apis = api_registry.len(),
            parsers = parser_registry.len(),
            policy = ?config.checkpoint.policy,
            "🏗️ WORKSPACE: initialized"
        );
        Ok(Arc::new(Self {
            config,
            api_registry,
            parser_registry,
            device,
            clients: DashMap::new(),
        }))
    }

    pub fn config(&self) -> &PhosConfig {
        &self.config
    }

    pub fn api_registry(&self) -> &ApiRegistry {
        &self.api_registry
    }

    pub fn parser_registry(&self) -> &ParserRegistry {
        &self.parser_registry
    }

    pub fn device(&self) -> &dyn DeviceRuntime {
        self.device.as_ref()
    }

    /// Register a new client process, start its parser and hand back its queue ends
    ///
    /// The client starts not ready; its pipeline idles until [`Self::set_client_ready`].
    pub fn handshake(self: &Arc<Self>, pid: u32) -> Result<ClientEndpoints> {
        let mut client = Client::new(pid, &self.config);
        client.init(self.config.parser.pooled_handles, self.device())?;

        let client_id = client.id();
        let ready = client.ready_flag();
        let (parser_endpoints, client_endpoints) = channel_set(client_id, client.worker_progress());
        let pipeline = ParserPipeline::spawn(Arc::clone(self), client, parser_endpoints)?;

        self.clients.insert(
            client_id,
            ClientSlot {
                pid,
                ready,
                pipeline,
            },
        );
        log_pipeline_event(&client_id.to_string(), "handshake", Some(&format!("pid {pid}")));
        Ok(client_endpoints)
    }

    pub fn set_client_ready(&self, client_id: Uuid) -> Result<()> {
        let slot = self
            .clients
            .get(&client_id)
            .ok_or_else(|| PhosError::not_found(format!("client {client_id}")))?;
        slot.ready.store(true, Ordering::Release);
        info!(client_id = %client_id, pid = slot.pid, "client ready");
        Ok(())
    }

    pub fn is_client_running(&self, client_id: Uuid) -> bool {
        self.clients
            .get(&client_id)
            .is_some_and(|slot| slot.pipeline.is_running())
    }

    pub fn client_ids(&self) -> Vec<Uuid> {
        self.clients.iter().map(|entry| *entry.key()).collect()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Stop the client's pipeline and return its final state
    pub fn teardown(&self, client_id: Uuid) -> Result<PipelineExit> {
        let (_, slot) = self
            .clients
            .remove(&client_id)
            .ok_or_else(|| PhosError::not_found(format!("client {client_id}")))?;
        let exit = slot.pipeline.stop()?;
        if let Some(defect) = &exit.defect {
            warn!(client_id = %client_id, defect = %defect, "client pipeline had halted");
        }
        log_pipeline_event(&client_id.to_string(), "teardown", None);
        Ok(exit)
    }

    /// Tear down every connected client
    pub fn shutdown(&self) -> Vec<Result<PipelineExit>> {
        self.client_ids()
            .into_iter()
            .map(|client_id| self.teardown(client_id))
            .collect()
    }
}
