use crate::block::{Block, BlockId, Point, Rectangle, Role};
use crate::config::{EditorConfig, LayoutConfig, SnapConfig, SnapPolicy};
use crate::error::GraphError;
use crate::graph::BlockGraph;
use std::collections::BTreeSet;

/// Connection point kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnchorRole {
    Previous,
    Next,
    DockLeft,
    DockRight,
    Output,
    Slot,
    Param,
}

impl AnchorRole {
    /// Whether a moved block's `source` anchor can meet this target anchor
    pub fn pairs_with(self, source: AnchorRole) -> bool {
        matches!(
            (self, source),
            (AnchorRole::Next, AnchorRole::Previous)
                | (AnchorRole::Slot, AnchorRole::Previous)
                | (AnchorRole::DockRight, AnchorRole::DockLeft)
                | (AnchorRole::Param, AnchorRole::Output)
        )
    }

    pub fn is_source(self) -> bool {
        matches!(
            self,
            AnchorRole::Previous | AnchorRole::DockLeft | AnchorRole::Output
        )
    }
}

/// A connection point on a block, in canvas coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub block: BlockId,
    pub role: AnchorRole,
    pub position: Point,
    /// Role a block takes when attached here (target anchors only)
    pub connects: Option<Role>,
    /// Block currently attached here
    pub occupant: Option<BlockId>,
}

/// A compatible (source, target) pair within the snap radius
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub source: Anchor,
    pub target: Anchor,
    pub role: Role,
    pub distance: f32,
}

/// Result of [`ConnectionEngine::attempt_connect`]
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectOutcome {
    Connected {
        previous: Option<Role>,
        role: Role,
        displaced: Option<BlockId>,
        distance: f32,
    },
    /// Nothing in range; the block is free and grid-aligned
    Free {
        previous: Option<Role>,
        position: Point,
    },
}

impl ConnectOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectOutcome::Connected { .. })
    }
}

/// Transient state of one press-drag-release gesture
#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub block: BlockId,
    /// Geometry at press time
    pub origin: Rectangle,
    /// Owner at press time
    pub original_owner: Option<Role>,
    /// Set once the eager detach has fired
    pub detached: bool,
}

impl DragSession {
    /// True while the block still hangs from its press-time owner
    pub fn is_anchored(&self) -> bool {
        self.original_owner.is_some() && !self.detached
    }
}

/// Feedback for the renderer during a drag
#[derive(Debug, Clone, PartialEq)]
pub struct DragUpdate {
    /// The eager detach fired on this step
    pub detached: bool,
    /// Connection that would be made if released now
    pub preview: Option<Candidate>,
}

/// Everything that changed when a drag was released
#[derive(Debug, Clone, PartialEq)]
pub struct DropOutcome {
    pub block: BlockId,
    pub from: Rectangle,
    pub to: Rectangle,
    pub previous_owner: Option<Role>,
    pub owner: Option<Role>,
    pub displaced: Option<BlockId>,
    pub connected: bool,
}

impl DropOutcome {
    pub fn moved(&self) -> bool {
        self.from != self.to
    }

    pub fn reparented(&self) -> bool {
        self.previous_owner != self.owner
    }
}

/// Proximity-based connection search and drag handling
#[derive(Debug, Clone, Default)]
pub struct ConnectionEngine {
    snap: SnapConfig,
    layout: LayoutConfig,
}

impl ConnectionEngine {
    pub fn new(snap: SnapConfig, layout: LayoutConfig) -> Self {
        Self { snap, layout }
    }

    pub fn from_config(config: &EditorConfig) -> Self {
        Self::new(config.snap.clone(), config.layout.clone())
    }

    pub fn snap(&self) -> &SnapConfig {
        &self.snap
    }

    // ========== Anchors ==========

    /// All anchors of a block: sources first, then targets in
    /// parameter, slot, next, dock order
    pub fn anchors(&self, block: &Block) -> Vec<Anchor> {
        let id = block.id;
        let g = block.geometry;
        let kind = block.kind();
        let row = self.layout.row_height;
        let mut out = Vec::new();

        let source = |role, position| Anchor {
            block: id,
            role,
            position,
            connects: None,
            occupant: None,
        };
        if kind.is_value() {
            out.push(source(AnchorRole::Output, g.origin()));
        }
        if kind.chains() {
            out.push(source(AnchorRole::Previous, g.origin()));
        }
        if kind.docks() {
            out.push(source(AnchorRole::DockLeft, g.origin()));
        }

        for (i, param) in block.body.params().iter().enumerate() {
            out.push(Anchor {
                block: id,
                role: AnchorRole::Param,
                position: Point::new(g.right(), g.y + row * i as f32),
                connects: Some(Role::Value {
                    parent: id,
                    param: param.name.clone(),
                }),
                occupant: param.value,
            });
        }
        for (i, slot) in block.body.slots().iter().enumerate() {
            out.push(Anchor {
                block: id,
                role: AnchorRole::Slot,
                position: Point::new(g.x + self.layout.slot_indent, g.y + row * (i + 1) as f32),
                connects: Some(Role::Slot {
                    container: id,
                    slot: slot.name.clone(),
                }),
                occupant: slot.head,
            });
        }
        let docked = matches!(block.owner, Some(Role::Dock { .. }));
        if kind.chains() && !docked {
            out.push(Anchor {
                block: id,
                role: AnchorRole::Next,
                position: Point::new(g.x, g.bottom()),
                connects: Some(Role::Next { previous: id }),
                occupant: block.next,
            });
        }
        if kind.docks() {
            out.push(Anchor {
                block: id,
                role: AnchorRole::DockRight,
                position: Point::new(g.right(), g.y),
                connects: Some(Role::Dock { left: id }),
                occupant: block.dock_right,
            });
        }
        out
    }

    /// Anchors the moved block can connect from
    pub fn source_anchors(&self, block: &Block) -> Vec<Anchor> {
        self.anchors(block)
            .into_iter()
            .filter(|a| a.role.is_source())
            .collect()
    }

    /// Open target anchors for `moved`: every anchor outside its subtree
    /// that is empty or already holds `moved`, in id order
    pub fn target_anchors(&self, graph: &BlockGraph, moved: BlockId) -> Vec<Anchor> {
        let excluded: BTreeSet<BlockId> = graph.descendants(moved).collect();
        graph
            .blocks()
            .filter(|b| !excluded.contains(&b.id))
            .flat_map(|b| self.anchors(b))
            .filter(|a| a.connects.is_some())
            .filter(|a| a.occupant.map_or(true, |o| o == moved))
            .collect()
    }

    // ========== Candidate Search ==========

    /// Compatible candidate within the snap radius, chosen by the
    /// configured policy
    pub fn find_candidate(&self, graph: &BlockGraph, moved: BlockId) -> Option<Candidate> {
        let block = graph.get(moved)?;
        let sources = self.source_anchors(block);
        let mut best: Option<Candidate> = None;

        for target in self.target_anchors(graph, moved) {
            let Some(role) = target.connects.clone() else {
                continue;
            };
            for source in sources.iter().filter(|s| target.role.pairs_with(s.role)) {
                let distance = source.position.distance(target.position);
                if distance > self.snap.snap_radius {
                    continue;
                }
                if let Err(err) = graph.can_reparent(moved, &role) {
                    tracing::debug!(block = %moved, role = %role, error = %err, "candidate rejected");
                    continue;
                }
                let candidate = Candidate {
                    source: source.clone(),
                    target: target.clone(),
                    role: role.clone(),
                    distance,
                };
                match self.snap.policy {
                    SnapPolicy::FirstFound => return Some(candidate),
                    SnapPolicy::Nearest => {
                        if best.as_ref().map_or(true, |b| distance < b.distance) {
                            best = Some(candidate);
                        }
                    }
                }
            }
        }
        best
    }

    /// Attach `moved` to the chosen candidate, aligning its source anchor
    /// onto the target anchor. With no candidate the block is left free
    /// and its position is snapped to the grid.
    pub fn attempt_connect(
        &self,
        graph: &mut BlockGraph,
        moved: BlockId,
    ) -> Result<ConnectOutcome, GraphError> {
        let origin = graph
            .get(moved)
            .ok_or(GraphError::UnknownBlock(moved))?
            .geometry
            .origin();

        if let Some(candidate) = self.find_candidate(graph, moved) {
            let aligned = Point::new(
                origin.x + candidate.target.position.x - candidate.source.position.x,
                origin.y + candidate.target.position.y - candidate.source.position.y,
            );
            graph.move_to(moved, aligned)?;
            let result = graph.reparent(moved, candidate.role.clone())?;
            tracing::debug!(
                block = %moved,
                role = %candidate.role,
                distance = candidate.distance,
                "connected"
            );
            return Ok(ConnectOutcome::Connected {
                previous: result.previous,
                role: candidate.role,
                displaced: result.displaced,
                distance: candidate.distance,
            });
        }

        let previous = graph.detach(moved)?;
        let position = self.snap_to_grid(origin);
        graph.move_to(moved, position)?;
        Ok(ConnectOutcome::Free { previous, position })
    }

    /// Nearest grid point; a non-positive grid leaves the point as is
    pub fn snap_to_grid(&self, point: Point) -> Point {
        let grid = self.snap.grid_size;
        if grid.is_nan() || grid <= 0.0 {
            return point;
        }
        Point::new(
            (point.x / grid).round() * grid,
            (point.y / grid).round() * grid,
        )
    }

    // ========== Drag Sessions ==========

    /// Start dragging `block`
    pub fn begin_drag(&self, graph: &BlockGraph, block: BlockId) -> Result<DragSession, GraphError> {
        let record = graph.get(block).ok_or(GraphError::UnknownBlock(block))?;
        Ok(DragSession {
            block,
            origin: record.geometry,
            original_owner: record.owner.clone(),
            detached: false,
        })
    }

    /// Move the dragged block (and what it owns) to `position`. Once the
    /// block has travelled past the detach radius it leaves its owner.
    pub fn drag_to(
        &self,
        graph: &mut BlockGraph,
        session: &mut DragSession,
        position: Point,
    ) -> Result<DragUpdate, GraphError> {
        graph.move_to(session.block, position)?;

        let mut detached = false;
        if session.is_anchored()
            && session.origin.origin().distance(position) > self.snap.detach_radius
        {
            graph.detach(session.block)?;
            session.detached = true;
            detached = true;
            tracing::debug!(block = %session.block, "detached during drag");
        }

        let preview = if session.is_anchored() {
            None
        } else {
            self.find_candidate(graph, session.block)
        };
        Ok(DragUpdate { detached, preview })
    }

    /// Release the drag. A block that never detached returns to where it
    /// was; otherwise a connection is attempted.
    pub fn end_drag(
        &self,
        graph: &mut BlockGraph,
        session: DragSession,
    ) -> Result<DropOutcome, GraphError> {
        let block = session.block;
        let (owner, displaced, connected) = if session.is_anchored() {
            graph.move_to(block, session.origin.origin())?;
            (session.original_owner.clone(), None, true)
        } else {
            match self.attempt_connect(graph, block)? {
                ConnectOutcome::Connected {
                    role, displaced, ..
                } => (Some(role), displaced, true),
                ConnectOutcome::Free { .. } => (None, None, false),
            }
        };

        let to = graph
            .get(block)
            .ok_or(GraphError::UnknownBlock(block))?
            .geometry;
        Ok(DropOutcome {
            block,
            from: session.origin,
            to,
            previous_owner: session.original_owner,
            owner,
            displaced,
            connected,
        })
    }

    /// Abort the drag, restoring position and the original owner
    pub fn cancel_drag(&self, graph: &mut BlockGraph, session: DragSession) -> Result<(), GraphError> {
        graph.move_to(session.block, session.origin.origin())?;
        if session.detached {
            if let Some(role) = session.original_owner {
                graph.reparent(session.block, role)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockBody, BlockKind, LiteralBody, StatementBody, ValueType};
    use crate::config::SnapConfig;

    fn engine() -> ConnectionEngine {
        ConnectionEngine::default()
    }

    fn at(x: f32, y: f32) -> Rectangle {
        Rectangle::new(x, y, 120.0, 40.0)
    }

    fn conditions(container: BlockId) -> Role {
        Role::Slot {
            container,
            slot: "conditions".to_string(),
        }
    }

    #[test]
    fn test_anchor_geometry() {
        let mut graph = BlockGraph::new();
        let rule = graph.create(BlockKind::RuleSet, at(100.0, 100.0));
        let anchors = engine().anchors(graph.get(rule).unwrap());

        let slots: Vec<_> = anchors
            .iter()
            .filter(|a| a.role == AnchorRole::Slot)
            .map(|a| a.position)
            .collect();
        assert_eq!(
            slots,
            vec![
                Point::new(116.0, 124.0),
                Point::new(116.0, 148.0),
                Point::new(116.0, 172.0)
            ]
        );
        let next = anchors.iter().find(|a| a.role == AnchorRole::Next).unwrap();
        assert_eq!(next.position, Point::new(100.0, 140.0));
    }

    #[test]
    fn test_connect_into_slot_aligns_block() {
        let mut graph = BlockGraph::new();
        let rule = graph.create(BlockKind::RuleSet, at(100.0, 100.0));
        // "conditions" slot anchor sits at (116, 148)
        let condition = graph.create(BlockKind::Condition, at(120.0, 155.0));

        let outcome = engine().attempt_connect(&mut graph, condition).unwrap();
        assert!(outcome.is_connected());
        assert_eq!(graph.slot_chain(rule, "conditions"), vec![condition]);
        assert_eq!(
            graph.get(condition).unwrap().geometry.origin(),
            Point::new(116.0, 148.0)
        );
    }

    #[test]
    fn test_no_candidate_snaps_to_grid() {
        let mut graph = BlockGraph::new();
        let _rule = graph.create(BlockKind::RuleSet, at(0.0, 0.0));
        let action = graph.create(BlockKind::Action, at(507.0, 312.0));

        let outcome = engine().attempt_connect(&mut graph, action).unwrap();
        assert_eq!(
            outcome,
            ConnectOutcome::Free {
                previous: None,
                position: Point::new(500.0, 320.0)
            }
        );
        assert!(graph.get(action).unwrap().is_free());
    }

    #[test]
    fn test_zero_grid_keeps_position() {
        let snap = SnapConfig {
            grid_size: 0.0,
            ..SnapConfig::default()
        };
        let engine = ConnectionEngine::new(snap, crate::config::LayoutConfig::default());
        let point = Point::new(507.0, 312.0);
        assert_eq!(engine.snap_to_grid(point), point);

        let mut graph = BlockGraph::new();
        let action = graph.create(BlockKind::Action, at(507.0, 312.0));
        let outcome = engine.attempt_connect(&mut graph, action).unwrap();
        assert_eq!(
            outcome,
            ConnectOutcome::Free {
                previous: None,
                position: point
            }
        );
    }

    #[test]
    fn test_type_gate_is_hard() {
        let mut graph = BlockGraph::new();
        let action = graph.spawn(
            BlockBody::Action(StatementBody::new("kill").with_param("target", ValueType::Player)),
            at(0.0, 0.0),
        );
        // parameter anchor at (120, 0); literal output exactly on it
        let number = graph.spawn(
            BlockBody::Literal(LiteralBody::new(5.0)),
            Rectangle::new(120.0, 0.0, 30.0, 20.0),
        );
        assert!(engine().find_candidate(&graph, number).is_none());
        let outcome = engine().attempt_connect(&mut graph, number).unwrap();
        assert!(!outcome.is_connected());
        assert!(graph.get(action).unwrap().param("target").unwrap().value.is_none());
    }

    #[test]
    fn test_container_rejected_from_statement_chain() {
        let mut graph = BlockGraph::new();
        let action = graph.create(BlockKind::Action, at(0.0, 0.0));
        // exactly on the action's next anchor
        let rule = graph.create(BlockKind::RuleSet, at(0.0, 40.0));
        let outcome = engine().attempt_connect(&mut graph, rule).unwrap();
        assert!(!outcome.is_connected());
        assert!(graph.get(action).unwrap().next.is_none());
    }

    #[test]
    fn test_first_found_vs_nearest() {
        let mut graph = BlockGraph::new();
        let first = graph.create(BlockKind::RuleSet, at(0.0, 0.0));
        let second = graph.create(BlockKind::RuleSet, at(10.0, 0.0));
        // anchors: first (16, 48), second (26, 48); block at (24, 48)
        let condition = graph.create(BlockKind::Condition, at(24.0, 48.0));

        let candidate = engine().find_candidate(&graph, condition).unwrap();
        assert_eq!(candidate.role, conditions(first));

        let nearest = ConnectionEngine::new(
            SnapConfig {
                policy: SnapPolicy::Nearest,
                ..SnapConfig::default()
            },
            LayoutConfig::default(),
        );
        let candidate = nearest.find_candidate(&graph, condition).unwrap();
        assert_eq!(candidate.role, conditions(second));
    }

    #[test]
    fn test_own_subtree_is_not_a_target() {
        let mut graph = BlockGraph::new();
        let top = graph.create(BlockKind::Action, at(0.0, 0.0));
        let below = graph.create(BlockKind::Action, at(0.0, 40.0));
        graph.reparent(below, Role::Next { previous: top }).unwrap();

        let targets = engine().target_anchors(&graph, top);
        assert!(targets.iter().all(|a| a.block != below && a.block != top));
    }

    #[test]
    fn test_short_drag_snaps_back() {
        let mut graph = BlockGraph::new();
        let rule = graph.create(BlockKind::RuleSet, at(0.0, 0.0));
        let condition = graph.create(BlockKind::Condition, at(16.0, 48.0));
        graph.reparent(condition, conditions(rule)).unwrap();

        let engine = engine();
        let mut session = engine.begin_drag(&graph, condition).unwrap();
        let update = engine
            .drag_to(&mut graph, &mut session, Point::new(20.0, 52.0))
            .unwrap();
        assert!(!update.detached);

        let outcome = engine.end_drag(&mut graph, session).unwrap();
        assert!(!outcome.moved());
        assert!(!outcome.reparented());
        assert_eq!(graph.get(condition).unwrap().owner, Some(conditions(rule)));
    }

    #[test]
    fn test_long_drag_detaches_and_rehomes() {
        let mut graph = BlockGraph::new();
        let rule = graph.create(BlockKind::RuleSet, at(0.0, 0.0));
        let other = graph.create(BlockKind::RuleSet, at(400.0, 0.0));
        let condition = graph.create(BlockKind::Condition, at(16.0, 48.0));
        graph.reparent(condition, conditions(rule)).unwrap();

        let engine = engine();
        let mut session = engine.begin_drag(&graph, condition).unwrap();
        let update = engine
            .drag_to(&mut graph, &mut session, Point::new(200.0, 200.0))
            .unwrap();
        assert!(update.detached);
        assert!(graph.get(condition).unwrap().is_free());

        let update = engine
            .drag_to(&mut graph, &mut session, Point::new(420.0, 50.0))
            .unwrap();
        assert_eq!(update.preview.map(|c| c.role), Some(conditions(other)));

        let outcome = engine.end_drag(&mut graph, session).unwrap();
        assert!(outcome.connected);
        assert_eq!(outcome.previous_owner, Some(conditions(rule)));
        assert_eq!(outcome.owner, Some(conditions(other)));
        assert!(graph.check_invariants().is_empty());
    }

    #[test]
    fn test_cancel_drag_restores_owner() {
        let mut graph = BlockGraph::new();
        let rule = graph.create(BlockKind::RuleSet, at(0.0, 0.0));
        let condition = graph.create(BlockKind::Condition, at(16.0, 48.0));
        graph.reparent(condition, conditions(rule)).unwrap();
        let before = graph.clone();

        let engine = engine();
        let mut session = engine.begin_drag(&graph, condition).unwrap();
        engine
            .drag_to(&mut graph, &mut session, Point::new(300.0, 300.0))
            .unwrap();
        engine.cancel_drag(&mut graph, session).unwrap();
        assert_eq!(graph, before);
    }
}
