use crate::block::{Block, BlockId, LiteralValue, Rectangle, Role};
use crate::error::GraphError;
use crate::graph::{BlockGraph, RemovedSubtree};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// An invertible edit to the block graph
#[derive(Debug, Clone, PartialEq)]
pub enum UndoAction {
    Create {
        id: BlockId,
        block: Block,
    },

    /// Cascade delete; the subtree keeps every internal edge
    Delete {
        removed: RemovedSubtree,
    },

    Move {
        id: BlockId,
        previous: Rectangle,
        next: Rectangle,
    },

    Reparent {
        id: BlockId,
        previous: Option<Role>,
        next: Option<Role>,
        /// Occupant of `next` that was pushed down the chain (or bumped)
        displaced: Option<BlockId>,
    },

    Relabel {
        id: BlockId,
        previous: String,
        next: String,
    },

    SetLiteral {
        id: BlockId,
        previous: LiteralValue,
        next: LiteralValue,
    },

    SetDefault {
        id: BlockId,
        param: String,
        previous: Option<LiteralValue>,
        next: Option<LiteralValue>,
    },

    /// One user gesture; undone back to front
    Group(Vec<UndoAction>),
}

impl UndoAction {
    /// Apply the inverse of this action
    pub fn revert(&self, graph: &mut BlockGraph) -> Result<(), GraphError> {
        match self {
            UndoAction::Create { id, .. } => {
                graph.remove_subtree(*id)?;
            }
            UndoAction::Delete { removed } => {
                graph.restore(removed.clone())?;
            }
            UndoAction::Move { id, previous, .. } => {
                graph.move_to(*id, previous.origin())?;
                graph.set_geometry(*id, *previous)?;
            }
            UndoAction::Reparent {
                id,
                previous,
                next,
                displaced,
            } => {
                if next.is_some() {
                    graph.detach(*id)?;
                }
                if let (Some(displaced), Some(role)) = (displaced, next) {
                    graph.reparent(*displaced, role.clone())?;
                }
                if let Some(role) = previous {
                    graph.reparent(*id, role.clone())?;
                }
            }
            UndoAction::Relabel { id, previous, .. } => {
                graph.set_label(*id, previous.clone())?;
            }
            UndoAction::SetLiteral { id, previous, .. } => {
                graph.set_literal(*id, previous.clone())?;
            }
            UndoAction::SetDefault {
                id,
                param,
                previous,
                ..
            } => {
                graph.set_param_default(*id, param, previous.clone())?;
            }
            UndoAction::Group(actions) => {
                for action in actions.iter().rev() {
                    action.revert(graph)?;
                }
            }
        }
        Ok(())
    }

    /// Apply this action's forward effect again
    pub fn reapply(&self, graph: &mut BlockGraph) -> Result<(), GraphError> {
        match self {
            UndoAction::Create { block, .. } => {
                graph.insert_block(block.clone())?;
            }
            UndoAction::Delete { removed } => {
                if removed.healed.is_some() {
                    graph.delete_healing(removed.root)?;
                } else {
                    graph.remove_subtree(removed.root)?;
                }
            }
            UndoAction::Move { id, next, .. } => {
                graph.move_to(*id, next.origin())?;
                graph.set_geometry(*id, *next)?;
            }
            UndoAction::Reparent { id, next, .. } => match next {
                Some(role) => {
                    graph.reparent(*id, role.clone())?;
                }
                None => {
                    graph.detach(*id)?;
                }
            },
            UndoAction::Relabel { id, next, .. } => {
                graph.set_label(*id, next.clone())?;
            }
            UndoAction::SetLiteral { id, next, .. } => {
                graph.set_literal(*id, next.clone())?;
            }
            UndoAction::SetDefault { id, param, next, .. } => {
                graph.set_param_default(*id, param, next.clone())?;
            }
            UndoAction::Group(actions) => {
                for action in actions {
                    action.reapply(graph)?;
                }
            }
        }
        Ok(())
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            UndoAction::Create { .. } => "create",
            UndoAction::Delete { .. } => "delete",
            UndoAction::Move { .. } => "move",
            UndoAction::Reparent { .. } => "reparent",
            UndoAction::Relabel { .. } => "relabel",
            UndoAction::SetLiteral { .. } => "set_literal",
            UndoAction::SetDefault { .. } => "set_default",
            UndoAction::Group(_) => "group",
        }
    }
}

/// A recorded action with timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub action: UndoAction,
}

impl HistoryEntry {
    fn new(action: UndoAction) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
        }
    }
}

/// Bounded undo and redo stacks
#[derive(Debug, Clone)]
pub struct UndoManager {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: VecDeque<HistoryEntry>,
    capacity: usize,
    replaying: bool,
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new(100)
    }
}

impl UndoManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            capacity,
            replaying: false,
        }
    }

    /// Push an action and clear the redo stack. Ignored while replaying.
    pub fn record(&mut self, action: UndoAction) {
        if self.replaying {
            tracing::trace!(action = action.name(), "ignored during replay");
            return;
        }
        self.redo_stack.clear();
        push_bounded(&mut self.undo_stack, HistoryEntry::new(action), self.capacity);
    }

    /// Revert the most recent action. `Ok(false)` when there is nothing to undo.
    pub fn undo(&mut self, graph: &mut BlockGraph) -> Result<bool, GraphError> {
        let Some(entry) = self.undo_stack.pop_back() else {
            return Ok(false);
        };
        self.replaying = true;
        let result = entry.action.revert(graph);
        self.replaying = false;

        match result {
            Ok(()) => {
                tracing::debug!(action = entry.action.name(), "undo");
                push_bounded(&mut self.redo_stack, entry, self.capacity);
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(action = entry.action.name(), error = %err, "undo failed");
                self.undo_stack.push_back(entry);
                Err(err)
            }
        }
    }

    /// Re-apply the most recently undone action
    pub fn redo(&mut self, graph: &mut BlockGraph) -> Result<bool, GraphError> {
        let Some(entry) = self.redo_stack.pop_back() else {
            return Ok(false);
        };
        self.replaying = true;
        let result = entry.action.reapply(graph);
        self.replaying = false;

        match result {
            Ok(()) => {
                tracing::debug!(action = entry.action.name(), "redo");
                push_bounded(&mut self.undo_stack, entry, self.capacity);
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(action = entry.action.name(), error = %err, "redo failed");
                self.redo_stack.push_back(entry);
                Err(err)
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    /// Undo entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.undo_stack.iter()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

fn push_bounded(stack: &mut VecDeque<HistoryEntry>, entry: HistoryEntry, capacity: usize) {
    if capacity == 0 {
        return;
    }
    stack.push_back(entry);
    while stack.len() > capacity {
        stack.pop_front();
    }
}
