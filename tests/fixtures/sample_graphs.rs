// Helper functions to build test graphs with various configurations
#![allow(dead_code)]

use rule_blocks::{
    BlockBody, BlockGraph, BlockId, BlockKind, LiteralBody, Rectangle, Role, StatementBody,
    SubroutineBody, ValueType,
};

pub fn rect(x: f32, y: f32) -> Rectangle {
    Rectangle::new(x, y, 120.0, 40.0)
}

pub fn slot(container: BlockId, name: &str) -> Role {
    Role::Slot {
        container,
        slot: name.to_string(),
    }
}

pub fn value(parent: BlockId, param: &str) -> Role {
    Role::Value {
        parent,
        param: param.to_string(),
    }
}

/// A Module holding one RuleSet with one Condition and one Action
pub struct RuleFixture {
    pub graph: BlockGraph,
    pub module: BlockId,
    pub rule: BlockId,
    pub condition: BlockId,
    pub action: BlockId,
}

/// Module M > RuleSet R > {Condition C in "conditions", Action A in "actions"}
pub fn module_with_rule() -> RuleFixture {
    let mut graph = BlockGraph::new();
    let module = graph.create(BlockKind::Module, rect(0.0, 0.0));
    let rule = graph.create(BlockKind::RuleSet, rect(300.0, 0.0));
    let condition = graph.create(BlockKind::Condition, rect(600.0, 0.0));
    let action = graph.create(BlockKind::Action, rect(600.0, 100.0));

    graph.reparent(condition, slot(rule, "conditions")).unwrap();
    graph.reparent(action, slot(rule, "actions")).unwrap();
    graph.reparent(rule, slot(module, "rules")).unwrap();

    RuleFixture {
        graph,
        module,
        rule,
        condition,
        action,
    }
}

/// Two free RuleSets whose "conditions" slots sit 20px apart, and a
/// Condition dropped between them. Returns (graph, first, second, condition).
pub fn two_rules_and_condition() -> (BlockGraph, BlockId, BlockId, BlockId) {
    let mut graph = BlockGraph::new();
    // conditions anchor = (x + 16, y + 48)
    let first = graph.create(BlockKind::RuleSet, rect(0.0, 0.0));
    let second = graph.create(BlockKind::RuleSet, rect(20.0, 0.0));
    let condition = graph.create(BlockKind::Condition, rect(28.0, 50.0));
    (graph, first, second, condition)
}

/// Module > Subroutine "Award" > Action `give_points(<literal>)`
pub fn subroutine_with_literal(literal: f64) -> (BlockGraph, BlockId, BlockId) {
    let mut graph = BlockGraph::new();
    let module = graph.create(BlockKind::Module, rect(0.0, 0.0));
    let sub = graph.spawn(
        BlockBody::Subroutine(SubroutineBody::named("Award")),
        rect(20.0, 40.0),
    );
    let action = graph.spawn(
        BlockBody::Action(StatementBody::new("give_points").with_param("points", ValueType::Number)),
        rect(40.0, 80.0),
    );
    let number = graph.spawn(BlockBody::Literal(LiteralBody::new(literal)), rect(200.0, 80.0));

    graph.reparent(number, value(action, "points")).unwrap();
    graph.reparent(action, slot(sub, "actions")).unwrap();
    graph.reparent(sub, slot(module, "rules")).unwrap();
    (graph, sub, number)
}

/// An Action with a Player-typed parameter and a free Number literal
pub fn player_slot_and_number() -> (BlockGraph, BlockId, BlockId) {
    let mut graph = BlockGraph::new();
    let action = graph.spawn(
        BlockBody::Action(StatementBody::new("kill").with_param("target", ValueType::Player)),
        rect(0.0, 0.0),
    );
    // target anchor = (right, y) = (120, 0)
    let number = graph.spawn(BlockBody::Literal(LiteralBody::new(7.0)), rect(125.0, 3.0));
    (graph, action, number)
}
