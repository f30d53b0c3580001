//! Per-API parsing function table.

use crate::api::ApiRequest;
use crate::client::Client;
use crate::error::Result;
use crate::workspace::Workspace;
use std::collections::HashMap;
use std::fmt;

/// Semantic validation and resource-graph mutation for one API
pub type ParserFn = fn(&Workspace, &mut Client, &mut ApiRequest) -> Result<()>;

/// Mapping from API id to its parsing function, populated once at startup
#[derive(Clone, Default)]
pub struct ParserRegistry {
    functions: HashMap<u64, ParserFn>,
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.functions.keys().collect();
        ids.sort();
        f.debug_struct("ParserRegistry").field("api_ids", &ids).finish()
    }
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a generated registration list; a repeated id keeps the last entry
    pub fn from_registrations(registrations: impl IntoIterator<Item = (u64, ParserFn)>) -> Self {
        Self {
            functions: registrations.into_iter().collect(),
        }
    }

    pub fn register(&mut self, api_id: u64, function: ParserFn) -> Option<ParserFn> {
        self.functions.insert(api_id, function)
    }

    pub fn get(&self, api_id: u64) -> Option<ParserFn> {
        self.functions.get(&api_id).copied()
    }

    pub fn contains(&self, api_id: u64) -> bool {
        self.functions.contains_key(&api_id)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
