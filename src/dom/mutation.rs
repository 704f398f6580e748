use super::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(super) u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    /// Nodes were inserted under `target`.
    ChildList { added: Vec<NodeId> },
    /// Nodes were detached from `target`.
    Removed { removed: Vec<NodeId> },
    /// The text of `target` changed.
    CharacterData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub kind: MutationKind,
}

impl MutationRecord {
    pub fn child_list(target: NodeId, added: Vec<NodeId>) -> Self {
        Self {
            target,
            kind: MutationKind::ChildList { added },
        }
    }

    pub fn removal(target: NodeId, removed: Vec<NodeId>) -> Self {
        Self {
            target,
            kind: MutationKind::Removed { removed },
        }
    }

    pub fn character_data(target: NodeId) -> Self {
        Self {
            target,
            kind: MutationKind::CharacterData,
        }
    }
}
