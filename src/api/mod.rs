//! # API Requests
//!
//! The request context that travels transport -> parser -> (worker) -> transport, plus
//! the per-API metadata table and the per-family return-code mapping.

pub mod registry;

pub use registry::{ApiMeta, ApiRegistry};

use crate::constants::ApiExecuteStatus;
use crate::error::{PhosError, Result};
use crate::handle::Handle;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Timestamps recorded while a request moves through the parser
#[derive(Debug, Clone, Copy)]
pub struct RequestTiming {
    pub received: Instant,
    pub parse_start: Option<Instant>,
    pub parse_end: Option<Instant>,
    pub returned: Option<Instant>,
}

impl RequestTiming {
    fn new() -> Self {
        Self {
            received: Instant::now(),
            parse_start: None,
            parse_end: None,
            returned: None,
        }
    }

    pub fn parse_duration(&self) -> Option<std::time::Duration> {
        Some(self.parse_end?.saturating_duration_since(self.parse_start?))
    }
}

/// One intercepted API call
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub api_id: u64,
    pub client_id: Uuid,
    /// Per-call sequence number assigned by the transport
    pub seq: u64,
    params: Vec<Vec<u8>>,
    pub status: ApiExecuteStatus,
    pub return_code: i32,
    pub ret_data: Vec<u8>,
    /// Handles the parsing function touched; listed on the request's DAG op
    handles: Vec<Arc<Handle>>,
    /// Parent handles the worker needs to materialize the touched handles
    parents: Vec<Arc<Handle>>,
    pub dag_version: Option<u64>,
    pub timing: RequestTiming,
}

impl ApiRequest {
    pub fn new(api_id: u64, client_id: Uuid, seq: u64) -> Self {
        Self {
            api_id,
            client_id,
            seq,
            params: Vec::new(),
            status: ApiExecuteStatus::Received,
            return_code: 0,
            ret_data: Vec::new(),
            handles: Vec::new(),
            parents: Vec::new(),
            dag_version: None,
            timing: RequestTiming::new(),
        }
    }

    pub fn with_param(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.params.push(bytes.into());
        self
    }

    pub fn with_u64(self, value: u64) -> Self {
        self.with_param(value.to_le_bytes().to_vec())
    }

    pub fn with_str(self, value: &str) -> Self {
        self.with_param(value.as_bytes().to_vec())
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn param(&self, index: usize) -> Result<&[u8]> {
        self.params.get(index).map(Vec::as_slice).ok_or_else(|| {
            PhosError::precondition(format!(
                "api {} expects parameter {index}, got {}",
                self.api_id,
                self.params.len()
            ))
        })
    }

    pub fn param_u64(&self, index: usize) -> Result<u64> {
        let raw = self.param(index)?;
        let bytes: [u8; 8] = raw.try_into().map_err(|_| {
            PhosError::precondition(format!(
                "api {} parameter {index} is {} bytes, expected 8",
                self.api_id,
                raw.len()
            ))
        })?;
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn param_str(&self, index: usize) -> Result<&str> {
        std::str::from_utf8(self.param(index)?).map_err(|err| {
            PhosError::precondition(format!("api {} parameter {index}: {err}", self.api_id))
        })
    }

    pub fn set_ret_u64(&mut self, value: u64) {
        self.ret_data = value.to_le_bytes().to_vec();
    }

    pub fn ret_u64(&self) -> Option<u64> {
        let bytes: [u8; 8] = self.ret_data.as_slice().try_into().ok()?;
        Some(u64::from_le_bytes(bytes))
    }

    pub fn record_handle(&mut self, handle: Arc<Handle>) {
        self.handles.push(handle);
    }

    pub fn record_parent(&mut self, handle: Arc<Handle>) {
        self.parents.push(handle);
    }

    pub fn handles(&self) -> &[Arc<Handle>] {
        &self.handles
    }

    pub fn parents(&self) -> &[Arc<Handle>] {
        &self.parents
    }

    pub(crate) fn mark_returned(&mut self) {
        self.timing.returned = Some(Instant::now());
    }
}
