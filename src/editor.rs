use crate::block::{BlockBody, BlockId, BlockKind, LiteralValue, Point, Rectangle, Role};
use crate::codegen::{CodeGenerator, GeneratedProgram, TypeScriptEmitter};
use crate::config::EditorConfig;
use crate::connection::{ConnectionEngine, DragSession, DragUpdate, DropOutcome};
use crate::error::{GraphError, SnapshotError};
use crate::graph::BlockGraph;
use crate::history::{UndoAction, UndoManager};
use crate::serialization::{DroppedEdge, LoadedWorkspace, RuleState, WorkspaceSerializer};
use crate::validation::{ValidationResult, Validator};

/// Editing session: the graph plus the engine, history and generator
/// that act on it. Every mutating call records one undoable action.
pub struct Editor {
    graph: BlockGraph,
    engine: ConnectionEngine,
    history: UndoManager,
    generator: CodeGenerator<TypeScriptEmitter>,
    rule_state: RuleState,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(&EditorConfig::default())
    }
}

impl Editor {
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            graph: BlockGraph::new(),
            engine: ConnectionEngine::from_config(config),
            history: UndoManager::new(config.history.capacity),
            generator: CodeGenerator::new(TypeScriptEmitter::from_config(&config.codegen)),
            rule_state: RuleState::new(),
        }
    }

    pub fn graph(&self) -> &BlockGraph {
        &self.graph
    }

    pub fn engine(&self) -> &ConnectionEngine {
        &self.engine
    }

    pub fn history(&self) -> &UndoManager {
        &self.history
    }

    pub fn rule_state(&self) -> &RuleState {
        &self.rule_state
    }

    pub fn rule_state_mut(&mut self) -> &mut RuleState {
        &mut self.rule_state
    }

    // ========== Blocks ==========

    /// Spawn a block of `kind` with its default body
    pub fn spawn(&mut self, kind: BlockKind, geometry: Rectangle) -> BlockId {
        self.spawn_body(BlockBody::for_kind(kind), geometry)
    }

    pub fn spawn_body(&mut self, body: BlockBody, geometry: Rectangle) -> BlockId {
        let id = self.graph.spawn(body, geometry);
        if let Some(block) = self.graph.get(id) {
            self.history.record(UndoAction::Create {
                id,
                block: block.clone(),
            });
        }
        id
    }

    /// Cascade delete; returns every removed id
    pub fn delete(&mut self, id: BlockId) -> Result<Vec<BlockId>, GraphError> {
        let removed = self.graph.remove_subtree(id)?;
        let ids = removed.ids();
        self.history.record(UndoAction::Delete { removed });
        Ok(ids)
    }

    /// Delete keeping the chain successor in place
    pub fn delete_healing(&mut self, id: BlockId) -> Result<Vec<BlockId>, GraphError> {
        let removed = self.graph.delete_healing(id)?;
        let ids = removed.ids();
        self.history.record(UndoAction::Delete { removed });
        Ok(ids)
    }

    /// Move a block and its descendants without touching ownership
    pub fn move_block(&mut self, id: BlockId, origin: Point) -> Result<(), GraphError> {
        let previous = self.graph.move_to(id, origin)?;
        let next = self.block_geometry(id)?;
        if previous != next {
            self.history.record(UndoAction::Move { id, previous, next });
        }
        Ok(())
    }

    /// Attach `id` to `role` directly, bypassing proximity search
    pub fn connect(&mut self, id: BlockId, role: Role) -> Result<(), GraphError> {
        let result = self.graph.reparent(id, role.clone())?;
        if result.previous.as_ref() != Some(&role) {
            self.history.record(UndoAction::Reparent {
                id,
                previous: result.previous,
                next: Some(role),
                displaced: result.displaced,
            });
        }
        Ok(())
    }

    /// Make `id` top-level
    pub fn detach(&mut self, id: BlockId) -> Result<(), GraphError> {
        let previous = self.graph.detach(id)?;
        if previous.is_some() {
            self.history.record(UndoAction::Reparent {
                id,
                previous,
                next: None,
                displaced: None,
            });
        }
        Ok(())
    }

    pub fn relabel(&mut self, id: BlockId, label: impl Into<String>) -> Result<(), GraphError> {
        let next = label.into();
        let previous = self.graph.set_label(id, next.clone())?;
        if previous != next {
            self.history.record(UndoAction::Relabel { id, previous, next });
        }
        Ok(())
    }

    pub fn set_literal(&mut self, id: BlockId, value: LiteralValue) -> Result<(), GraphError> {
        let previous = self.graph.set_literal(id, value.clone())?;
        if previous != value {
            self.history.record(UndoAction::SetLiteral {
                id,
                previous,
                next: value,
            });
        }
        Ok(())
    }

    pub fn set_default(
        &mut self,
        id: BlockId,
        param: &str,
        default: Option<LiteralValue>,
    ) -> Result<(), GraphError> {
        let previous = self.graph.set_param_default(id, param, default.clone())?;
        if previous != default {
            self.history.record(UndoAction::SetDefault {
                id,
                param: param.to_string(),
                previous,
                next: default,
            });
        }
        Ok(())
    }

    fn block_geometry(&self, id: BlockId) -> Result<Rectangle, GraphError> {
        self.graph
            .get(id)
            .map(|b| b.geometry)
            .ok_or(GraphError::UnknownBlock(id))
    }

    // ========== Dragging ==========

    pub fn begin_drag(&self, id: BlockId) -> Result<DragSession, GraphError> {
        self.engine.begin_drag(&self.graph, id)
    }

    pub fn drag_to(
        &mut self,
        session: &mut DragSession,
        position: Point,
    ) -> Result<DragUpdate, GraphError> {
        self.engine.drag_to(&mut self.graph, session, position)
    }

    /// Release a drag, recording the gesture as one undoable group
    pub fn end_drag(&mut self, session: DragSession) -> Result<DropOutcome, GraphError> {
        let outcome = self.engine.end_drag(&mut self.graph, session)?;

        let mut actions = Vec::new();
        if outcome.moved() {
            actions.push(UndoAction::Move {
                id: outcome.block,
                previous: outcome.from,
                next: outcome.to,
            });
        }
        if outcome.reparented() || outcome.displaced.is_some() {
            actions.push(UndoAction::Reparent {
                id: outcome.block,
                previous: outcome.previous_owner.clone(),
                next: outcome.owner.clone(),
                displaced: outcome.displaced,
            });
        }
        match actions.len() {
            0 => {}
            1 => self.history.record(actions.remove(0)),
            _ => self.history.record(UndoAction::Group(actions)),
        }
        Ok(outcome)
    }

    pub fn cancel_drag(&mut self, session: DragSession) -> Result<(), GraphError> {
        self.engine.cancel_drag(&mut self.graph, session)
    }

    // ========== History ==========

    pub fn undo(&mut self) -> Result<bool, GraphError> {
        self.history.undo(&mut self.graph)
    }

    pub fn redo(&mut self) -> Result<bool, GraphError> {
        self.history.redo(&mut self.graph)
    }

    // ========== Output ==========

    pub fn generate(&self) -> GeneratedProgram {
        self.generator.generate(&self.graph)
    }

    pub fn validate(&self) -> ValidationResult {
        Validator::validate(&self.graph)
    }

    pub fn export_json(&self) -> Result<String, SnapshotError> {
        WorkspaceSerializer::to_json(&self.graph, &self.rule_state)
    }

    /// Replace the workspace with a snapshot. On error nothing changes.
    pub fn import_json(&mut self, json: &str) -> Result<Vec<DroppedEdge>, SnapshotError> {
        let loaded = WorkspaceSerializer::from_json(json)?;
        Ok(self.load(loaded))
    }

    /// Adopt an already-validated workspace; history starts over
    pub fn load(&mut self, workspace: LoadedWorkspace) -> Vec<DroppedEdge> {
        self.graph = workspace.graph;
        self.rule_state = workspace.rule_state;
        self.history.clear();
        workspace.dropped_edges
    }
}
