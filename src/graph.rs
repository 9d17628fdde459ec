use crate::block::{
    Block, BlockBody, BlockId, BlockKind, GlobalVariable, LiteralValue, Point, Rectangle, Role,
};
use crate::error::GraphError;
use std::collections::{BTreeMap, BTreeSet};
use ulid::Ulid;

/// Arena of blocks keyed by id. Every ownership edge is stored twice: as
/// the `owner` role on the child and as the forward pointer on the owner.
#[derive(Debug, Clone, Default)]
pub struct BlockGraph {
    /// All blocks, ordered by id (creation order)
    blocks: BTreeMap<BlockId, Block>,

    /// Last id handed out, keeps ids monotonic within one millisecond
    last_issued: Option<Ulid>,
}

/// Result of a successful reparent
#[derive(Debug, Clone, PartialEq)]
pub struct Reparented {
    /// Role the block held before the call
    pub previous: Option<Role>,
    /// Former occupant of the target role, re-attached after the moved
    /// chain (or bumped to top level for parameter values)
    pub displaced: Option<BlockId>,
}

/// A detached subtree, kept whole so it can be put back by undo
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedSubtree {
    pub root: BlockId,
    /// Role the root held when it was removed
    pub owner: Option<Role>,
    /// Removed blocks in depth-first order, internal edges intact
    pub blocks: Vec<Block>,
    /// Chain successor that took the root's place (`delete_healing` only)
    pub healed: Option<BlockId>,
}

impl RemovedSubtree {
    pub fn ids(&self) -> Vec<BlockId> {
        self.blocks.iter().map(|b| b.id).collect()
    }
}

impl PartialEq for BlockGraph {
    fn eq(&self, other: &Self) -> bool {
        self.blocks == other.blocks
    }
}

impl BlockGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from already-linked blocks (deserialization)
    pub(crate) fn from_blocks(blocks: BTreeMap<BlockId, Block>) -> Self {
        let last_issued = blocks.keys().next_back().map(|id| id.0);
        Self {
            blocks,
            last_issued,
        }
    }

    fn next_id(&mut self) -> BlockId {
        let fresh = Ulid::new();
        let id = match self.last_issued.and_then(|last| last.increment()) {
            Some(bumped) if bumped > fresh => bumped,
            _ => fresh,
        };
        self.last_issued = Some(id);
        BlockId(id)
    }

    // ========== Block CRUD Operations ==========

    /// Create an unowned block of `kind` with its default body
    pub fn create(&mut self, kind: BlockKind, geometry: Rectangle) -> BlockId {
        self.spawn(BlockBody::for_kind(kind), geometry)
    }

    /// Create an unowned block with an explicit body
    pub fn spawn(&mut self, body: BlockBody, geometry: Rectangle) -> BlockId {
        let id = self.next_id();
        let block = Block::new(id, body, geometry);
        tracing::trace!(block = %id, kind = %block.kind(), "block created");
        self.blocks.insert(id, block);
        id
    }

    /// Get a block by ID
    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.blocks.contains_key(&id)
    }

    /// All blocks in id order
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// All block ids in id order
    pub fn ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.keys().copied()
    }

    pub(crate) fn block_map(&self) -> &BTreeMap<BlockId, Block> {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn block(&self, id: BlockId) -> Result<&Block, GraphError> {
        self.blocks.get(&id).ok_or(GraphError::UnknownBlock(id))
    }

    fn block_mut(&mut self, id: BlockId) -> Result<&mut Block, GraphError> {
        self.blocks.get_mut(&id).ok_or(GraphError::UnknownBlock(id))
    }

    /// Insert a fully-formed block, e.g. when undoing a delete
    pub(crate) fn insert_block(&mut self, block: Block) -> Result<(), GraphError> {
        if self.blocks.contains_key(&block.id) {
            return Err(GraphError::DuplicateBlock(block.id));
        }
        if self.last_issued.map_or(true, |last| last < block.id.0) {
            self.last_issued = Some(block.id.0);
        }
        self.blocks.insert(block.id, block);
        Ok(())
    }

    // ========== Field Edits ==========

    /// Rename a block, returning the old label
    pub fn set_label(&mut self, id: BlockId, label: impl Into<String>) -> Result<String, GraphError> {
        let block = self.block_mut(id)?;
        Ok(std::mem::replace(&mut block.label, label.into()))
    }

    /// Replace the value of a Literal block, returning the old value.
    /// The new value must fit the literal's declared type.
    pub fn set_literal(
        &mut self,
        id: BlockId,
        value: LiteralValue,
    ) -> Result<LiteralValue, GraphError> {
        let block = self.block_mut(id)?;
        let kind = block.kind();
        match &mut block.body {
            BlockBody::Literal(literal) => {
                if !literal.value_type.compatible_with(value.value_type()) {
                    return Err(GraphError::IncompatibleKind {
                        block: id,
                        kind,
                        role: "literal value".to_string(),
                        reason: format!(
                            "declared {}, got {}",
                            literal.value_type,
                            value.value_type()
                        ),
                    });
                }
                Ok(std::mem::replace(&mut literal.value, value))
            }
            _ => Err(GraphError::NotEditable {
                block: id,
                operation: "literal values",
            }),
        }
    }

    /// Set or clear a parameter slot's literal default, returning the old one
    pub fn set_param_default(
        &mut self,
        id: BlockId,
        param: &str,
        default: Option<LiteralValue>,
    ) -> Result<Option<LiteralValue>, GraphError> {
        let block = self.block_mut(id)?;
        let slot = block.param_mut(param).ok_or_else(|| GraphError::UnknownSlot {
            block: id,
            slot: param.to_string(),
        })?;
        Ok(std::mem::replace(&mut slot.default, default))
    }

    /// Enable or disable a RuleSet, returning the old flag
    pub fn set_enabled(&mut self, id: BlockId, enabled: bool) -> Result<bool, GraphError> {
        match &mut self.block_mut(id)?.body {
            BlockBody::RuleSet(rule) => Ok(std::mem::replace(&mut rule.enabled, enabled)),
            _ => Err(GraphError::NotEditable {
                block: id,
                operation: "enabling",
            }),
        }
    }

    /// Declare a global variable on a Module
    pub fn add_global(&mut self, id: BlockId, global: GlobalVariable) -> Result<(), GraphError> {
        match &mut self.block_mut(id)?.body {
            BlockBody::Module(module) => {
                module.globals.push(global);
                Ok(())
            }
            _ => Err(GraphError::NotEditable {
                block: id,
                operation: "global variables",
            }),
        }
    }

    // ========== Geometry ==========

    /// Replace a single block's cached geometry, returning the old one
    pub fn set_geometry(&mut self, id: BlockId, geometry: Rectangle) -> Result<Rectangle, GraphError> {
        let block = self.block_mut(id)?;
        Ok(std::mem::replace(&mut block.geometry, geometry))
    }

    /// Move a block's top-left corner to `origin`, carrying every
    /// descendant along by the same offset. Returns the old geometry.
    pub fn move_to(&mut self, id: BlockId, origin: Point) -> Result<Rectangle, GraphError> {
        let previous = self.block(id)?.geometry;
        let (dx, dy) = (origin.x - previous.x, origin.y - previous.y);
        if dx == 0.0 && dy == 0.0 {
            return Ok(previous);
        }
        let moved: Vec<BlockId> = self.descendants(id).collect();
        for member in moved {
            if let Some(block) = self.blocks.get_mut(&member) {
                block.geometry = block.geometry.translated(dx, dy);
            }
        }
        Ok(previous)
    }

    /// Blocks whose geometry intersects `region`, in id order
    pub fn query_region(&self, region: &Rectangle) -> Vec<BlockId> {
        self.blocks
            .values()
            .filter(|b| b.geometry.intersects(region))
            .map(|b| b.id)
            .collect()
    }

    // ========== Traversal ==========

    /// Lazy depth-first walk over `id` and everything it owns
    /// (values, slot contents, docked peers, chain successors).
    pub fn descendants(&self, id: BlockId) -> Descendants<'_> {
        let stack = if self.blocks.contains_key(&id) {
            vec![id]
        } else {
            Vec::new()
        };
        Descendants { graph: self, stack }
    }

    /// `id` followed by its `next` successors
    pub fn chain(&self, id: BlockId) -> Vec<BlockId> {
        self.follow(id, |b| b.next)
    }

    /// `id` followed by the blocks docked to its right
    pub fn dock_chain(&self, id: BlockId) -> Vec<BlockId> {
        self.follow(id, |b| b.dock_right)
    }

    fn follow(&self, id: BlockId, step: impl Fn(&Block) -> Option<BlockId>) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut current = self.blocks.get(&id);
        while let Some(block) = current {
            if out.len() > self.blocks.len() {
                break;
            }
            out.push(block.id);
            current = step(block).and_then(|next| self.blocks.get(&next));
        }
        out
    }

    /// Statement chain hanging from a named container slot
    pub fn slot_chain(&self, container: BlockId, slot: &str) -> Vec<BlockId> {
        self.blocks
            .get(&container)
            .and_then(|c| c.slot(slot))
            .and_then(|s| s.head)
            .map(|head| self.chain(head))
            .unwrap_or_default()
    }

    /// First block of the vertical chain `id` belongs to
    pub fn chain_head(&self, id: BlockId) -> BlockId {
        let mut head = id;
        for _ in 0..=self.blocks.len() {
            match self.blocks.get(&head).and_then(|b| b.owner.as_ref()) {
                Some(Role::Next { previous }) => head = *previous,
                _ => break,
            }
        }
        head
    }

    /// Free (top-level) blocks in id order
    pub fn roots(&self) -> Vec<BlockId> {
        self.blocks
            .values()
            .filter(|b| b.is_free())
            .map(|b| b.id)
            .collect()
    }

    /// Current occupant of a role's forward pointer
    pub fn occupant(&self, role: &Role) -> Option<BlockId> {
        let owner = self.blocks.get(&role.owner_block())?;
        match role {
            Role::Next { .. } => owner.next,
            Role::Dock { .. } => owner.dock_right,
            Role::Slot { slot, .. } => owner.slot(slot).and_then(|s| s.head),
            Role::Value { param, .. } => owner.param(param).and_then(|p| p.value),
        }
    }

    fn set_forward(&mut self, role: &Role, target: Option<BlockId>) {
        let Some(owner) = self.blocks.get_mut(&role.owner_block()) else {
            return;
        };
        match role {
            Role::Next { .. } => owner.next = target,
            Role::Dock { .. } => owner.dock_right = target,
            Role::Slot { slot, .. } => {
                if let Some(s) = owner.slot_mut(slot) {
                    s.head = target;
                }
            }
            Role::Value { param, .. } => {
                if let Some(p) = owner.param_mut(param) {
                    p.value = target;
                }
            }
        }
    }

    // ========== Ownership ==========

    /// Kinds a `next` position after `previous` accepts: the accepted
    /// set of the slot the chain hangs from, or the free chain's own family.
    fn chain_accepts(&self, previous: BlockId) -> Result<Vec<BlockKind>, String> {
        let first = self
            .blocks
            .get(&previous)
            .ok_or_else(|| format!("missing block {}", previous))?;
        if !first.kind().chains() {
            return Err(format!("{} blocks have no next anchor", first.kind()));
        }
        let head = self.block(self.chain_head(previous)).map_err(|e| e.to_string())?;
        match &head.owner {
            None => Ok(free_chain_accepts(head.kind())),
            Some(Role::Slot { container, slot }) => self
                .blocks
                .get(container)
                .and_then(|c| c.slot(slot))
                .map(|s| s.accepts.clone())
                .ok_or_else(|| format!("slot '{}' of {} is missing", slot, container)),
            Some(Role::Dock { .. }) => Err("docked blocks do not chain vertically".to_string()),
            Some(role) => Err(format!("chain head {} is held as {}", head.id, role)),
        }
    }

    fn check_chain_accepted(&self, id: BlockId, accepts: &[BlockKind]) -> Result<(), String> {
        for member in self.chain(id) {
            let kind = self.blocks.get(&member).map(|b| b.kind());
            if let Some(kind) = kind {
                if !accepts.contains(&kind) {
                    return Err(format!("{} is not among the accepted kinds {:?}", kind, accepts));
                }
            }
        }
        Ok(())
    }

    /// Check whether `id` may take `role`, without mutating anything
    pub fn can_reparent(&self, id: BlockId, role: &Role) -> Result<(), GraphError> {
        let block = self.block(id)?;
        let owner_id = role.owner_block();
        let owner = self
            .blocks
            .get(&owner_id)
            .ok_or_else(|| GraphError::MissingReference {
                what: role.to_string(),
                target: owner_id,
            })?;

        if self.descendants(id).any(|d| d == owner_id) {
            return Err(GraphError::WouldCreateCycle {
                block: id,
                target: owner_id,
            });
        }

        let reject = |reason: String| GraphError::IncompatibleKind {
            block: id,
            kind: block.kind(),
            role: role.to_string(),
            reason,
        };

        match role {
            Role::Slot { slot, .. } => {
                let target = owner.slot(slot).ok_or_else(|| GraphError::UnknownSlot {
                    block: owner_id,
                    slot: slot.clone(),
                })?;
                self.check_chain_accepted(id, &target.accepts).map_err(reject)?;
            }
            Role::Next { .. } => {
                let accepts = self.chain_accepts(owner_id).map_err(reject)?;
                self.check_chain_accepted(id, &accepts).map_err(reject)?;
            }
            Role::Dock { .. } => {
                if !owner.kind().docks() {
                    return Err(reject(format!("{} blocks have no dock anchor", owner.kind())));
                }
                if block.kind() != owner.kind() {
                    return Err(reject(format!("only {} blocks dock here", owner.kind())));
                }
                if block.next.is_some() {
                    return Err(reject("a block with successors cannot dock".to_string()));
                }
            }
            Role::Value { param, .. } => {
                let slot = owner.param(param).ok_or_else(|| GraphError::UnknownSlot {
                    block: owner_id,
                    slot: param.clone(),
                })?;
                let produced = block
                    .body
                    .value_type()
                    .ok_or_else(|| reject("only value blocks nest into parameters".to_string()))?;
                if !slot.accepts.compatible_with(produced) {
                    return Err(reject(format!(
                        "parameter expects {}, block produces {}",
                        slot.accepts, produced
                    )));
                }
            }
        }
        Ok(())
    }

    /// Clear `id`'s current ownership and install `role`. An occupied
    /// target is spliced: the old occupant follows the moved chain.
    pub fn reparent(&mut self, id: BlockId, role: Role) -> Result<Reparented, GraphError> {
        let previous = self.block(id)?.owner.clone();
        if previous.as_ref() == Some(&role) {
            return Ok(Reparented {
                previous,
                displaced: None,
            });
        }

        if let Err(err) = self.can_reparent(id, &role) {
            tracing::debug!(block = %id, role = %role, error = %err, "reparent rejected");
            return Err(err);
        }

        self.unlink(id);
        let displaced = self.install(id, role);
        if let Some(displaced) = displaced {
            tracing::debug!(block = %id, displaced = %displaced, "occupied role spliced");
        }
        Ok(Reparented {
            previous,
            displaced,
        })
    }

    /// Make `id` free, returning the role it held
    pub fn detach(&mut self, id: BlockId) -> Result<Option<Role>, GraphError> {
        self.block(id)?;
        Ok(self.unlink(id))
    }

    fn unlink(&mut self, id: BlockId) -> Option<Role> {
        let role = self.blocks.get_mut(&id)?.owner.take()?;
        self.set_forward(&role, None);
        Some(role)
    }

    /// Install an already-validated role; returns the displaced occupant
    fn install(&mut self, id: BlockId, role: Role) -> Option<BlockId> {
        let occupant = self.occupant(&role);
        self.set_forward(&role, Some(id));
        if let Some(block) = self.blocks.get_mut(&id) {
            block.owner = Some(role.clone());
        }

        let occupant = occupant?;
        let new_role = match role {
            Role::Next { .. } | Role::Slot { .. } => {
                let tail = self.chain(id).last().copied().unwrap_or(id);
                Some(Role::Next { previous: tail })
            }
            Role::Dock { .. } => {
                let tail = self.dock_chain(id).last().copied().unwrap_or(id);
                Some(Role::Dock { left: tail })
            }
            Role::Value { .. } => None,
        };
        match new_role {
            Some(new_role) => {
                self.set_forward(&new_role, Some(occupant));
                if let Some(block) = self.blocks.get_mut(&occupant) {
                    block.owner = Some(new_role);
                }
            }
            None => {
                if let Some(block) = self.blocks.get_mut(&occupant) {
                    block.owner = None;
                }
            }
        }
        Some(occupant)
    }

    // ========== Deletion ==========

    /// Remove `id` and everything it transitively owns, returning the ids
    pub fn delete(&mut self, id: BlockId) -> Result<Vec<BlockId>, GraphError> {
        Ok(self.remove_subtree(id)?.ids())
    }

    /// Remove `id` and everything it owns, keeping the records for undo
    pub fn remove_subtree(&mut self, id: BlockId) -> Result<RemovedSubtree, GraphError> {
        self.block(id)?;
        let members: Vec<BlockId> = self.descendants(id).collect();
        let owner = self.unlink(id);
        let blocks = members
            .iter()
            .filter_map(|member| self.blocks.remove(member))
            .collect();
        tracing::debug!(block = %id, removed = members.len(), "subtree removed");
        Ok(RemovedSubtree {
            root: id,
            owner,
            blocks,
            healed: None,
        })
    }

    /// Delete `id` and what it owns, except its chain successor, which
    /// takes over `id`'s position
    pub fn delete_healing(&mut self, id: BlockId) -> Result<RemovedSubtree, GraphError> {
        let successor = self.block(id)?.next;
        if let Some(successor) = successor {
            self.unlink(successor);
        }
        let mut removed = self.remove_subtree(id)?;
        if let Some(successor) = successor {
            if let Some(role) = removed.owner.clone() {
                self.install(successor, role);
            }
            removed.healed = Some(successor);
        }
        Ok(removed)
    }

    /// Put a removed subtree back exactly where it was
    pub fn restore(&mut self, removed: RemovedSubtree) -> Result<(), GraphError> {
        for block in &removed.blocks {
            if self.blocks.contains_key(&block.id) {
                return Err(GraphError::DuplicateBlock(block.id));
            }
        }
        if let Some(role) = &removed.owner {
            let owner_id = role.owner_block();
            if !self.blocks.contains_key(&owner_id) {
                return Err(GraphError::MissingReference {
                    what: role.to_string(),
                    target: owner_id,
                });
            }
            let expected = removed.healed;
            if let Some(occupant) = self.occupant(role) {
                if Some(occupant) != expected {
                    return Err(GraphError::Occupied {
                        role: role.to_string(),
                        occupant,
                    });
                }
            }
        }
        if let Some(healed) = removed.healed {
            self.block(healed)?;
            self.unlink(healed);
        }

        let RemovedSubtree {
            root,
            owner,
            blocks,
            healed,
        } = removed;
        for block in blocks {
            self.insert_block(block)?;
        }
        if let Some(role) = owner {
            self.install(root, role);
        }
        if let Some(healed) = healed {
            self.install(healed, Role::Next { previous: root });
        }
        Ok(())
    }

    // ========== Invariants ==========

    /// Structural violations, empty when the graph is consistent
    pub fn check_invariants(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for block in self.blocks.values() {
            for child in block.owned_children() {
                if !self.blocks.contains_key(&child) {
                    problems.push(format!("{} points at missing block {}", block.id, child));
                }
            }

            let Some(role) = &block.owner else {
                continue;
            };
            let owner_id = role.owner_block();
            if !self.blocks.contains_key(&owner_id) {
                problems.push(format!("{} is owned by missing block {}", block.id, owner_id));
                continue;
            }
            if self.occupant(role) != Some(block.id) {
                problems.push(format!("{} claims {} but is not linked there", block.id, role));
            }
            if let Some(problem) = self.placement_problem(block, role) {
                problems.push(problem);
            }
        }

        // Every forward pointer must be answered by the child's owner role.
        let mut seen = BTreeSet::new();
        for block in self.blocks.values() {
            for child in block.owned_children() {
                if !seen.insert(child) {
                    problems.push(format!("{} has more than one owner", child));
                }
                let answered = self
                    .blocks
                    .get(&child)
                    .and_then(|c| c.owner.as_ref())
                    .map_or(false, |r| r.owner_block() == block.id);
                if self.blocks.contains_key(&child) && !answered {
                    problems.push(format!("{} links {} without a matching owner", block.id, child));
                }
            }
        }

        for id in self.blocks.keys() {
            let mut current = *id;
            let mut steps = 0;
            while let Some(role) = self.blocks.get(&current).and_then(|b| b.owner.as_ref()) {
                current = role.owner_block();
                steps += 1;
                if current == *id || steps > self.blocks.len() {
                    problems.push(format!("{} is part of an ownership cycle", id));
                    break;
                }
            }
        }

        problems
    }

    fn placement_problem(&self, block: &Block, role: &Role) -> Option<String> {
        let kind = block.kind();
        let owner = self.blocks.get(&role.owner_block())?;
        let reason = match role {
            Role::Slot { slot, .. } => match owner.slot(slot) {
                Some(target) if target.accepts.contains(&kind) => None,
                Some(_) => Some(format!("{} is not accepted by {}", kind, role)),
                None => Some(format!("{} has no slot '{}'", owner.kind(), slot)),
            },
            Role::Next { previous } => match self.chain_accepts(*previous) {
                Ok(accepts) if accepts.contains(&kind) => None,
                Ok(accepts) => Some(format!("{} is not among the chain kinds {:?}", kind, accepts)),
                Err(reason) => Some(reason),
            },
            Role::Dock { .. } => {
                if !kind.docks() || owner.kind() != kind {
                    Some(format!("{} cannot dock beside {}", kind, owner.kind()))
                } else if block.next.is_some() {
                    Some("a docked block cannot have successors".to_string())
                } else {
                    None
                }
            }
            Role::Value { param, .. } => match (owner.param(param), block.body.value_type()) {
                (Some(slot), Some(produced)) if slot.accepts.compatible_with(produced) => None,
                (Some(slot), Some(produced)) => Some(format!(
                    "parameter expects {}, block produces {}",
                    slot.accepts, produced
                )),
                (None, _) => Some(format!("{} has no parameter '{}'", owner.kind(), param)),
                (_, None) => Some("only value blocks nest into parameters".to_string()),
            },
        };
        reason.map(|reason| format!("{} block {} cannot hold {}: {}", kind, block.id, role, reason))
    }
}

fn free_chain_accepts(kind: BlockKind) -> Vec<BlockKind> {
    match kind {
        BlockKind::RuleSet | BlockKind::Subroutine => {
            vec![BlockKind::RuleSet, BlockKind::Subroutine]
        }
        kind if kind.is_statement() => vec![kind],
        _ => Vec::new(),
    }
}

/// Pre-order iterator returned by [`BlockGraph::descendants`]
pub struct Descendants<'a> {
    graph: &'a BlockGraph,
    stack: Vec<BlockId>,
}

impl Iterator for Descendants<'_> {
    type Item = BlockId;

    fn next(&mut self) -> Option<BlockId> {
        let id = self.stack.pop()?;
        if let Some(block) = self.graph.blocks.get(&id) {
            self.stack.extend(block.owned_children().into_iter().rev());
        }
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{LiteralBody, StatementBody, ValueType};
    use assert_matches::assert_matches;

    fn rect() -> Rectangle {
        Rectangle::new(0.0, 0.0, 120.0, 40.0)
    }

    fn slot(container: BlockId, name: &str) -> Role {
        Role::Slot {
            container,
            slot: name.to_string(),
        }
    }

    /// Module > RuleSet > (Condition, Action)
    fn rule_graph() -> (BlockGraph, BlockId, BlockId, BlockId, BlockId) {
        let mut graph = BlockGraph::new();
        let module = graph.create(BlockKind::Module, rect());
        let rule = graph.create(BlockKind::RuleSet, rect());
        let condition = graph.create(BlockKind::Condition, rect());
        let action = graph.create(BlockKind::Action, rect());
        graph.reparent(condition, slot(rule, "conditions")).unwrap();
        graph.reparent(action, slot(rule, "actions")).unwrap();
        graph.reparent(rule, slot(module, "rules")).unwrap();
        (graph, module, rule, condition, action)
    }

    #[test]
    fn test_create_is_free_and_ordered() {
        let mut graph = BlockGraph::new();
        let a = graph.create(BlockKind::Action, rect());
        let b = graph.create(BlockKind::Action, rect());
        assert!(a < b);
        assert_eq!(graph.roots(), vec![a, b]);
        assert!(graph.get(a).unwrap().is_free());
    }

    #[test]
    fn test_reparent_into_slots() {
        let (graph, module, rule, condition, action) = rule_graph();
        assert_eq!(graph.slot_chain(rule, "conditions"), vec![condition]);
        assert_eq!(graph.slot_chain(rule, "actions"), vec![action]);
        assert_eq!(graph.slot_chain(module, "rules"), vec![rule]);
        assert_eq!(graph.roots(), vec![module]);
        assert!(graph.check_invariants().is_empty());
    }

    #[test]
    fn test_kind_gating() {
        let (mut graph, _module, rule, _condition, _action) = rule_graph();
        let action = graph.create(BlockKind::Action, rect());
        let before = graph.clone();

        let err = graph.reparent(action, slot(rule, "conditions")).unwrap_err();
        assert_matches!(err, GraphError::IncompatibleKind { .. });
        assert_eq!(graph, before);

        let inner = graph.create(BlockKind::RuleSet, rect());
        let err = graph
            .reparent(inner, Role::Next { previous: action })
            .unwrap_err();
        assert_matches!(err, GraphError::IncompatibleKind { .. });
    }

    #[test]
    fn test_value_type_gate() {
        let mut graph = BlockGraph::new();
        let action = graph.spawn(
            BlockBody::Action(StatementBody::new("kill").with_param("target", ValueType::Player)),
            rect(),
        );
        let number = graph.spawn(BlockBody::Literal(LiteralBody::new(3.0)), rect());
        let role = Role::Value {
            parent: action,
            param: "target".to_string(),
        };
        let err = graph.reparent(number, role).unwrap_err();
        assert_matches!(err, GraphError::IncompatibleKind { ref reason, .. } if reason.contains("player"));
        assert!(graph.get(number).unwrap().is_free());
    }

    #[test]
    fn test_reparent_clears_previous_owner() {
        let (mut graph, _module, rule, condition, _action) = rule_graph();
        let other = graph.create(BlockKind::RuleSet, rect());
        let result = graph.reparent(condition, slot(other, "conditions")).unwrap();
        assert_eq!(result.previous, Some(slot(rule, "conditions")));
        assert!(graph.slot_chain(rule, "conditions").is_empty());
        assert_eq!(graph.slot_chain(other, "conditions"), vec![condition]);
        assert!(graph.check_invariants().is_empty());
    }

    #[test]
    fn test_splice_into_occupied_slot() {
        let (mut graph, _module, rule, condition, _action) = rule_graph();
        let first = graph.create(BlockKind::Condition, rect());
        let second = graph.create(BlockKind::Condition, rect());
        graph.reparent(second, Role::Next { previous: first }).unwrap();

        let result = graph.reparent(first, slot(rule, "conditions")).unwrap();
        assert_eq!(result.displaced, Some(condition));
        assert_eq!(
            graph.slot_chain(rule, "conditions"),
            vec![first, second, condition]
        );
        assert!(graph.check_invariants().is_empty());
    }

    #[test]
    fn test_value_bump() {
        let mut graph = BlockGraph::new();
        let action = graph.spawn(
            BlockBody::Action(StatementBody::new("wait").with_param("seconds", ValueType::Number)),
            rect(),
        );
        let one = graph.spawn(BlockBody::Literal(LiteralBody::new(1.0)), rect());
        let two = graph.spawn(BlockBody::Literal(LiteralBody::new(2.0)), rect());
        let role = Role::Value {
            parent: action,
            param: "seconds".to_string(),
        };
        graph.reparent(one, role.clone()).unwrap();
        let result = graph.reparent(two, role).unwrap();
        assert_eq!(result.displaced, Some(one));
        assert!(graph.get(one).unwrap().is_free());
        assert!(graph.check_invariants().is_empty());
    }

    #[test]
    fn test_cycle_rejected() {
        let mut graph = BlockGraph::new();
        let a = graph.create(BlockKind::Action, rect());
        let b = graph.create(BlockKind::Action, rect());
        graph.reparent(b, Role::Next { previous: a }).unwrap();
        let err = graph.reparent(a, Role::Next { previous: b }).unwrap_err();
        assert_matches!(err, GraphError::WouldCreateCycle { .. });
        let err = graph.reparent(a, Role::Next { previous: a }).unwrap_err();
        assert_matches!(err, GraphError::WouldCreateCycle { .. });
    }

    #[test]
    fn test_dock_rules() {
        let mut graph = BlockGraph::new();
        let left = graph.create(BlockKind::Condition, rect());
        let right = graph.create(BlockKind::Condition, rect());
        let action = graph.create(BlockKind::Action, rect());
        graph.reparent(right, Role::Dock { left }).unwrap();
        assert_eq!(graph.dock_chain(left), vec![left, right]);

        let err = graph.reparent(action, Role::Dock { left: right }).unwrap_err();
        assert_matches!(err, GraphError::IncompatibleKind { .. });

        let below = graph.create(BlockKind::Condition, rect());
        let err = graph.reparent(below, Role::Next { previous: right }).unwrap_err();
        assert_matches!(err, GraphError::IncompatibleKind { .. });
    }

    #[test]
    fn test_descendants_and_delete() {
        let (mut graph, module, rule, condition, action) = rule_graph();
        let walked: Vec<_> = graph.descendants(rule).collect();
        assert_eq!(walked, vec![rule, condition, action]);

        let removed = graph.delete(rule).unwrap();
        assert_eq!(removed, vec![rule, condition, action]);
        assert_eq!(graph.len(), 1);
        assert!(graph.slot_chain(module, "rules").is_empty());
        assert_eq!(graph.descendants(rule).count(), 0);
    }

    #[test]
    fn test_remove_and_restore() {
        let (mut graph, _module, rule, _condition, _action) = rule_graph();
        let before = graph.clone();
        let removed = graph.remove_subtree(rule).unwrap();
        graph.restore(removed).unwrap();
        assert_eq!(graph, before);
    }

    #[test]
    fn test_delete_healing() {
        let mut graph = BlockGraph::new();
        let rule = graph.create(BlockKind::RuleSet, rect());
        let a = graph.create(BlockKind::Action, rect());
        let b = graph.create(BlockKind::Action, rect());
        let c = graph.create(BlockKind::Action, rect());
        graph.reparent(a, slot(rule, "actions")).unwrap();
        graph.reparent(b, Role::Next { previous: a }).unwrap();
        graph.reparent(c, Role::Next { previous: b }).unwrap();
        let before = graph.clone();

        let removed = graph.delete_healing(b).unwrap();
        assert_eq!(removed.ids(), vec![b]);
        assert_eq!(graph.slot_chain(rule, "actions"), vec![a, c]);
        assert!(graph.check_invariants().is_empty());

        graph.restore(removed).unwrap();
        assert_eq!(graph, before);
    }

    #[test]
    fn test_move_translates_descendants() {
        let (mut graph, _module, rule, condition, _action) = rule_graph();
        graph.move_to(rule, Point::new(50.0, 30.0)).unwrap();
        assert_eq!(graph.get(rule).unwrap().geometry.origin(), Point::new(50.0, 30.0));
        assert_eq!(graph.get(condition).unwrap().geometry.origin(), Point::new(50.0, 30.0));
    }

    #[test]
    fn test_query_region() {
        let mut graph = BlockGraph::new();
        let near = graph.create(BlockKind::Action, Rectangle::new(0.0, 0.0, 50.0, 20.0));
        let _far = graph.create(BlockKind::Action, Rectangle::new(500.0, 500.0, 50.0, 20.0));
        assert_eq!(
            graph.query_region(&Rectangle::new(10.0, 10.0, 100.0, 100.0)),
            vec![near]
        );
    }

    #[test]
    fn test_field_edits() {
        let mut graph = BlockGraph::new();
        let literal = graph.spawn(BlockBody::Literal(LiteralBody::new(1.0)), rect());
        let action = graph.create(BlockKind::Action, rect());

        assert_eq!(graph.set_label(action, "Heal").unwrap(), "Action");
        assert_eq!(
            graph.set_literal(literal, LiteralValue::Number(5.0)).unwrap(),
            LiteralValue::Number(1.0)
        );
        assert_matches!(
            graph.set_literal(literal, LiteralValue::Boolean(true)),
            Err(GraphError::IncompatibleKind { .. })
        );
        assert_matches!(
            graph.set_literal(action, LiteralValue::Number(1.0)),
            Err(GraphError::NotEditable { .. })
        );
    }
}
