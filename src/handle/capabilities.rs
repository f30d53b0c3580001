//! Per-resource-kind behavior descriptions.
//!
//! Differences between resource kinds (parent arity, pooling, capture strategy) are
//! data attached to each [`ResourceKind`], not a type hierarchy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of virtualized device resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Context,
    Stream,
    Module,
    Var,
    Memory,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        Self::Context,
        Self::Stream,
        Self::Module,
        Self::Var,
        Self::Memory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Stream => "stream",
            Self::Module => "module",
            Self::Var => "var",
            Self::Memory => "memory",
        }
    }

    pub fn capabilities(&self) -> &'static ResourceCapabilities {
        match self {
            Self::Context => &CONTEXT_CAPABILITIES,
            Self::Stream => &STREAM_CAPABILITIES,
            Self::Module => &MODULE_CAPABILITIES,
            Self::Var => &VAR_CAPABILITIES,
            Self::Memory => &MEMORY_CAPABILITIES,
        }
    }

    /// Kinds whose handles are listed in checkpoint operations
    pub fn is_stateful(&self) -> bool {
        self.capabilities().capture != CaptureStrategy::Stateless
    }

    pub fn stateful_kinds() -> impl Iterator<Item = ResourceKind> {
        Self::ALL.into_iter().filter(|kind| kind.is_stateful())
    }

    /// Base of the mocked client address range handed out for this kind
    pub(crate) fn client_addr_base(&self) -> u64 {
        let slot: u64 = match self {
            Self::Context => 1,
            Self::Stream => 2,
            Self::Module => 3,
            Self::Var => 4,
            Self::Memory => 5,
        };
        slot << 40
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a handle's state is captured by a checkpoint operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStrategy {
    /// Nothing to checkpoint
    Stateless,
    /// Copy device-side bytes into a checkpoint slot
    Materialize,
    /// Record a marker; state is rebuilt by re-running restore
    ReDerive,
}

/// Number of parent handles of one kind an allocation requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentArity {
    ExactlyOne,
    AtLeastOne,
}

impl ParentArity {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Self::ExactlyOne => count == 1,
            Self::AtLeastOne => count >= 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentRequirement {
    pub kind: ResourceKind,
    pub arity: ParentArity,
    /// Parent must already be Active when the child is allocated
    pub require_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceCapabilities {
    pub required_parents: &'static [ParentRequirement],
    pub supports_pooling: bool,
    pub capture: CaptureStrategy,
    /// Manager init eagerly allocates an implicit default handle
    pub has_default_handle: bool,
}

static CONTEXT_CAPABILITIES: ResourceCapabilities = ResourceCapabilities {
    required_parents: &[],
    supports_pooling: false,
    capture: CaptureStrategy::Stateless,
    has_default_handle: true,
};

static STREAM_CAPABILITIES: ResourceCapabilities = ResourceCapabilities {
    required_parents: &[ParentRequirement {
        kind: ResourceKind::Context,
        arity: ParentArity::AtLeastOne,
        require_active: false,
    }],
    supports_pooling: true,
    capture: CaptureStrategy::ReDerive,
    has_default_handle: true,
};

static MODULE_CAPABILITIES: ResourceCapabilities = ResourceCapabilities {
    required_parents: &[ParentRequirement {
        kind: ResourceKind::Context,
        arity: ParentArity::ExactlyOne,
        require_active: false,
    }],
    supports_pooling: false,
    capture: CaptureStrategy::ReDerive,
    has_default_handle: false,
};

static VAR_CAPABILITIES: ResourceCapabilities = ResourceCapabilities {
    required_parents: &[ParentRequirement {
        kind: ResourceKind::Module,
        arity: ParentArity::ExactlyOne,
        require_active: true,
    }],
    supports_pooling: false,
    capture: CaptureStrategy::Materialize,
    has_default_handle: false,
};

static MEMORY_CAPABILITIES: ResourceCapabilities = ResourceCapabilities {
    required_parents: &[ParentRequirement {
        kind: ResourceKind::Context,
        arity: ParentArity::ExactlyOne,
        require_active: false,
    }],
    supports_pooling: false,
    capture: CaptureStrategy::Materialize,
    has_default_handle: false,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stateful_kinds_exclude_contexts() {
        let stateful: Vec<_> = ResourceKind::stateful_kinds().collect();
        assert!(!stateful.contains(&ResourceKind::Context));
        assert_eq!(stateful.len(), 4);
    }

    #[test]
    fn test_parent_arity() {
        assert!(ParentArity::ExactlyOne.accepts(1));
        assert!(!ParentArity::ExactlyOne.accepts(2));
        assert!(!ParentArity::AtLeastOne.accepts(0));
        assert!(ParentArity::AtLeastOne.accepts(3));
    }

    #[test]
    fn test_var_requires_an_active_module() {
        let caps = ResourceKind::Var.capabilities();
        assert_eq!(caps.required_parents.len(), 1);
        assert_eq!(caps.required_parents[0].kind, ResourceKind::Module);
        assert!(caps.required_parents[0].require_active);
        assert_eq!(caps.capture, CaptureStrategy::Materialize);
    }
}
