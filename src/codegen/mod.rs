//! Graph-to-text lowering.
//!
//! [`CodeGenerator`] walks the graph from root Module blocks and lowers every
//! reachable block to text fragments through an [`Emitter`]. The generator
//! owns traversal, name resolution and diagnostics; the emitter owns the
//! target-language text. Generation never aborts: anything it cannot lower
//! becomes a marked placeholder plus a diagnostic.

pub mod naming;
pub mod typescript;

pub use typescript::TypeScriptEmitter;

use crate::block::{Block, BlockBody, BlockId, BlockKind, LiteralValue, ParamSlot};
use crate::graph::BlockGraph;
use crate::tag::TagAllocator;
use std::collections::{BTreeMap, BTreeSet};

/// Trigger used by RuleSets with an empty `event` slot
pub const ONGOING_TRIGGER: &str = "ongoing";

/// Output of one generation pass
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedProgram {
    pub text: String,
    pub diagnostics: Vec<GenerationDiagnostic>,
}

impl GeneratedProgram {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// A non-fatal problem found while lowering
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationDiagnostic {
    pub block: Option<BlockId>,
    pub message: String,
}

/// A subroutine ready for emission
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredSubroutine {
    pub block: BlockId,
    pub name: String,
    pub identifier: String,
    pub body: Vec<String>,
}

/// A RuleSet ready for emission
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredRule {
    pub block: BlockId,
    pub label: String,
    pub conditions_fn: String,
    pub actions_fn: String,
    pub trigger: String,
    pub enabled: bool,
    /// Condition expressions, ANDed together
    pub conditions: Vec<String>,
    /// Action statements in order
    pub actions: Vec<String>,
}

/// A module-level variable with its emitted name
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredGlobal {
    pub name: String,
    pub identifier: String,
    pub initial: LiteralValue,
}

/// A Module ready for emission
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredModule {
    pub block: BlockId,
    pub label: String,
    /// Name of the exported dispatcher function
    pub dispatcher: String,
    pub globals: Vec<LoweredGlobal>,
    pub subroutines: Vec<LoweredSubroutine>,
    pub rules: Vec<LoweredRule>,
}

impl LoweredModule {
    /// Enabled rules grouped by trigger, triggers in first-seen order
    pub fn dispatch_table(&self) -> Vec<(&str, Vec<&LoweredRule>)> {
        let mut table: Vec<(&str, Vec<&LoweredRule>)> = Vec::new();
        for rule in self.rules.iter().filter(|r| r.enabled) {
            match table.iter_mut().find(|(trigger, _)| *trigger == rule.trigger) {
                Some((_, rules)) => rules.push(rule),
                None => table.push((rule.trigger.as_str(), vec![rule])),
            }
        }
        table
    }
}

/// One emit method per block kind; returns immutable text fragments
pub trait Emitter {
    /// Leading comment, if any
    fn banner(&self) -> Option<String>;

    fn global(&self, module: &LoweredModule, global: &LoweredGlobal) -> String;

    fn literal(&self, value: &LiteralValue) -> String;

    fn expression(&self, operator: &str, args: &[String]) -> String;

    /// Marker for an unfilled parameter slot
    fn undefined(&self) -> String;

    /// Expression standing in for something that could not be lowered
    fn placeholder(&self, reason: &str) -> String;

    /// Statement standing in for something that could not be lowered
    fn placeholder_statement(&self, reason: &str) -> String;

    fn condition(&self, opcode: &str, args: &[String]) -> String;

    fn action(&self, opcode: &str, args: &[String]) -> String;

    fn subroutine_call(&self, identifier: &str) -> String;

    fn subroutine(&self, subroutine: &LoweredSubroutine) -> String;

    /// Condition function followed by action function
    fn rule_set(&self, rule: &LoweredRule) -> String;

    /// Exported dispatcher for a module
    fn dispatcher(&self, module: &LoweredModule) -> String;
}

/// Walks a [`BlockGraph`] and produces program text through an [`Emitter`]
#[derive(Debug, Clone, Default)]
pub struct CodeGenerator<E: Emitter> {
    emitter: E,
}

impl<E: Emitter> CodeGenerator<E> {
    pub fn new(emitter: E) -> Self {
        Self { emitter }
    }

    pub fn emitter(&self) -> &E {
        &self.emitter
    }

    /// Lower every root Module. Output depends only on graph contents.
    pub fn generate(&self, graph: &BlockGraph) -> GeneratedProgram {
        let mut lowering = Lowering::new(graph, &self.emitter);
        let modules = lowering.lower_modules();

        let mut sections: Vec<String> = Vec::new();
        if let Some(banner) = self.emitter.banner() {
            sections.push(banner);
        }

        let globals: Vec<String> = modules
            .iter()
            .flat_map(|m| m.globals.iter().map(move |g| self.emitter.global(m, g)))
            .collect();
        if !globals.is_empty() {
            sections.push(globals.join("\n"));
        }

        for module in &modules {
            for subroutine in &module.subroutines {
                sections.push(self.emitter.subroutine(subroutine));
            }
            for rule in &module.rules {
                sections.push(self.emitter.rule_set(rule));
            }
            sections.push(self.emitter.dispatcher(module));
        }

        let mut text = sections.join("\n\n");
        text.push('\n');

        let diagnostics = lowering.diagnostics;
        for diagnostic in &diagnostics {
            tracing::warn!(
                block = ?diagnostic.block,
                message = %diagnostic.message,
                "placeholder emitted"
            );
        }
        tracing::info!(
            modules = modules.len(),
            rules = modules.iter().map(|m| m.rules.len()).sum::<usize>(),
            diagnostics = diagnostics.len(),
            "generation finished"
        );

        GeneratedProgram { text, diagnostics }
    }
}

/// Per-pass state: name tables and collected diagnostics
struct Lowering<'a, E: Emitter> {
    graph: &'a BlockGraph,
    emitter: &'a E,
    tags: TagAllocator,
    /// Subroutine name -> emitted identifier
    subroutines: BTreeMap<String, String>,
    /// Every top-level identifier handed out so far
    emitted: BTreeSet<String>,
    diagnostics: Vec<GenerationDiagnostic>,
}

impl<'a, E: Emitter> Lowering<'a, E> {
    fn new(graph: &'a BlockGraph, emitter: &'a E) -> Self {
        Self {
            graph,
            emitter,
            tags: TagAllocator::new(),
            subroutines: BTreeMap::new(),
            emitted: BTreeSet::new(),
            diagnostics: Vec::new(),
        }
    }

    fn diagnose(&mut self, block: Option<BlockId>, message: impl Into<String>) {
        self.diagnostics.push(GenerationDiagnostic {
            block,
            message: message.into(),
        });
    }

    fn lower_modules(&mut self) -> Vec<LoweredModule> {
        let graph = self.graph;
        let modules: Vec<&Block> = graph
            .roots()
            .into_iter()
            .filter_map(|id| graph.get(id))
            .filter(|b| b.kind() == BlockKind::Module)
            .collect();

        // Subroutine names are global, so register them all before lowering
        // any statement that might call one.
        let members: Vec<(BlockId, Vec<BlockId>)> = modules
            .iter()
            .map(|m| (m.id, self.walk_chain(m.id, "rules")))
            .collect();
        let mut identifiers: BTreeMap<BlockId, String> = BTreeMap::new();
        for (_, chain) in &members {
            for id in chain {
                if let Some(BlockBody::Subroutine(sub)) = graph.get(*id).map(|b| &b.body) {
                    let identifier = self.register_subroutine(*id, &sub.name);
                    identifiers.insert(*id, identifier);
                }
            }
        }

        let mut lowered = Vec::new();
        for (module, (_, chain)) in modules.iter().zip(members) {
            let base = format!("dispatch_{}", naming::identifier(&module.label));
            let dispatcher = self.allocate(&base);
            if dispatcher != base {
                self.diagnose(
                    Some(module.id),
                    format!(
                        "duplicate module name '{}', dispatcher renamed to {}",
                        module.label, dispatcher
                    ),
                );
            }
            let globals = match &module.body {
                BlockBody::Module(body) => body
                    .globals
                    .iter()
                    .map(|global| self.lower_global(module.id, &global.name, &global.initial))
                    .collect(),
                _ => Vec::new(),
            };
            let mut out = LoweredModule {
                block: module.id,
                label: module.label.clone(),
                dispatcher,
                globals,
                subroutines: Vec::new(),
                rules: Vec::new(),
            };
            for id in chain {
                let Some(block) = graph.get(id) else {
                    continue;
                };
                match &block.body {
                    BlockBody::Subroutine(sub) => {
                        let identifier = identifiers
                            .get(&id)
                            .cloned()
                            .unwrap_or_else(|| naming::identifier(&sub.name));
                        let body = self.lower_actions(id, "actions");
                        out.subroutines.push(LoweredSubroutine {
                            block: id,
                            name: sub.name.clone(),
                            identifier,
                            body,
                        });
                    }
                    BlockBody::RuleSet(_) => out.rules.push(self.lower_rule(block)),
                    _ => self.diagnose(Some(id), format!("{} block in a module's rules", block.kind())),
                }
            }
            lowered.push(out);
        }
        lowered
    }

    /// Reserve `base`, or `base_2`, `base_3`... if it is taken
    fn allocate(&mut self, base: &str) -> String {
        let mut identifier = base.to_string();
        let mut n = 2;
        while self.emitted.contains(&identifier) {
            identifier = format!("{}_{}", base, n);
            n += 1;
        }
        self.emitted.insert(identifier.clone());
        identifier
    }

    fn register_subroutine(&mut self, id: BlockId, name: &str) -> String {
        let identifier = self.allocate(&format!("sub_{}", naming::identifier(name)));
        if self.subroutines.contains_key(name) {
            self.diagnose(Some(id), format!("duplicate subroutine name '{}'", name));
        } else {
            self.subroutines.insert(name.to_string(), identifier.clone());
        }
        identifier
    }

    fn lower_global(&mut self, module: BlockId, name: &str, initial: &LiteralValue) -> LoweredGlobal {
        let base = naming::identifier(name);
        let identifier = self.allocate(&base);
        if identifier != base {
            self.diagnose(
                Some(module),
                format!("duplicate global name '{}', renamed to {}", name, identifier),
            );
        }
        LoweredGlobal {
            name: name.to_string(),
            identifier,
            initial: initial.clone(),
        }
    }

    fn lower_rule(&mut self, rule: &Block) -> LoweredRule {
        let graph = self.graph;
        let tag = self.tags.next_tag();
        let slug = naming::identifier(&rule.label);
        let enabled = match &rule.body {
            BlockBody::RuleSet(body) => body.enabled,
            _ => false,
        };

        let trigger = match self.walk_chain(rule.id, "event").first() {
            Some(event) => match graph.get(*event).and_then(|b| b.body.statement()) {
                Some(statement) => statement.opcode.clone(),
                None => {
                    self.diagnose(Some(*event), "event slot holds a non-event block");
                    ONGOING_TRIGGER.to_string()
                }
            },
            None => ONGOING_TRIGGER.to_string(),
        };

        let conditions = self.lower_conditions(rule.id);
        let actions = self.lower_actions(rule.id, "actions");
        LoweredRule {
            block: rule.id,
            label: rule.label.clone(),
            conditions_fn: self.allocate(&format!("rule_{}_{}_conditions", tag, slug)),
            actions_fn: self.allocate(&format!("rule_{}_{}_actions", tag, slug)),
            trigger,
            enabled,
            conditions,
            actions,
        }
    }

    /// Chain hanging from `slot`, each member followed by its docked peers.
    /// A dangling link ends the chain with a diagnostic.
    fn walk_chain(&mut self, container: BlockId, slot: &str) -> Vec<BlockId> {
        let graph = self.graph;
        let head = graph
            .get(container)
            .and_then(|c| c.slot(slot))
            .and_then(|s| s.head);
        let mut out = Vec::new();
        let mut current = head;
        while let Some(id) = current {
            let Some(block) = graph.get(id) else {
                self.diagnose(Some(id), format!("missing block {} in '{}'", id, slot));
                break;
            };
            out.extend(graph.dock_chain(id));
            current = block.next;
            if out.len() > graph.len() {
                break;
            }
        }
        out
    }

    fn lower_conditions(&mut self, rule: BlockId) -> Vec<String> {
        let graph = self.graph;
        let members = self.walk_chain(rule, "conditions");
        let mut out = Vec::new();
        for id in members {
            let lowered = match graph.get(id) {
                Some(block) if block.kind() == BlockKind::Condition => {
                    let args = self.lower_params(block);
                    let opcode = block.body.statement().map(|s| s.opcode.as_str()).unwrap_or("");
                    self.emitter.condition(opcode, &args)
                }
                Some(block) => {
                    self.diagnose(Some(id), format!("{} block in a condition list", block.kind()));
                    self.emitter.placeholder(&format!("{} is not a condition", block.kind()))
                }
                None => self.emitter.placeholder("missing block"),
            };
            out.push(lowered);
        }
        out
    }

    fn lower_actions(&mut self, container: BlockId, slot: &str) -> Vec<String> {
        let graph = self.graph;
        let members = self.walk_chain(container, slot);
        let mut out = Vec::new();
        for id in members {
            let Some(block) = graph.get(id) else {
                out.push(self.emitter.placeholder_statement("missing block"));
                continue;
            };
            let lowered = match &block.body {
                BlockBody::Action(statement) => match &statement.subroutine {
                    Some(name) => match self.subroutines.get(name).cloned() {
                        Some(identifier) => self.emitter.subroutine_call(&identifier),
                        None => {
                            self.diagnose(Some(id), format!("unknown subroutine '{}'", name));
                            self.emitter
                                .placeholder_statement(&format!("unknown subroutine '{}'", name))
                        }
                    },
                    None => {
                        let args = self.lower_params(block);
                        self.emitter.action(&statement.opcode, &args)
                    }
                },
                _ => {
                    self.diagnose(Some(id), format!("{} block in an action list", block.kind()));
                    self.emitter
                        .placeholder_statement(&format!("{} is not an action", block.kind()))
                }
            };
            out.push(lowered);
        }
        out
    }

    fn lower_params(&mut self, block: &Block) -> Vec<String> {
        block
            .body
            .params()
            .iter()
            .map(|param| self.lower_param(block.id, param, 0))
            .collect()
    }

    fn lower_param(&mut self, parent: BlockId, param: &ParamSlot, depth: usize) -> String {
        let Some(value) = param.value else {
            return match &param.default {
                Some(literal) => self.emitter.literal(literal),
                None => self.emitter.undefined(),
            };
        };
        let graph = self.graph;
        let Some(block) = graph.get(value) else {
            self.diagnose(
                Some(parent),
                format!("parameter '{}' references missing block {}", param.name, value),
            );
            return self.emitter.placeholder("missing value");
        };
        if depth > graph.len() {
            self.diagnose(Some(value), "value nesting does not terminate");
            return self.emitter.placeholder("recursive value");
        }

        let produced = block.body.value_type();
        if !produced.map_or(false, |t| param.accepts.compatible_with(t)) {
            self.diagnose(
                Some(value),
                format!("{} block does not fit parameter '{}'", block.kind(), param.name),
            );
            return self.emitter.placeholder(&format!("{} in '{}'", block.kind(), param.name));
        }

        match &block.body {
            BlockBody::Literal(literal) => self.emitter.literal(&literal.value),
            BlockBody::Expression(expression) => {
                let args: Vec<String> = expression
                    .params
                    .iter()
                    .map(|p| self.lower_param(block.id, p, depth + 1))
                    .collect();
                self.emitter.expression(&expression.operator, &args)
            }
            _ => self.emitter.placeholder("not a value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{
        BlockBody, ExpressionBody, GlobalVariable, LiteralBody, Rectangle, Role, StatementBody,
        SubroutineBody, ValueType,
    };
    use pretty_assertions::assert_eq;

    fn rect() -> Rectangle {
        Rectangle::new(0.0, 0.0, 100.0, 40.0)
    }

    fn slot(container: BlockId, name: &str) -> Role {
        Role::Slot {
            container,
            slot: name.to_string(),
        }
    }

    fn generator() -> CodeGenerator<TypeScriptEmitter> {
        CodeGenerator::new(TypeScriptEmitter::default())
    }

    #[test]
    fn test_empty_graph() {
        let program = generator().generate(&BlockGraph::new());
        assert!(program.is_clean());
        assert!(program.text.starts_with("// Generated by rule_blocks"));
    }

    #[test]
    fn test_rule_with_expression_condition() {
        let mut graph = BlockGraph::new();
        let module = graph.create(BlockKind::Module, rect());
        graph.set_label(module, "Main").unwrap();
        let rule = graph.create(BlockKind::RuleSet, rect());
        graph.set_label(rule, "Low Health").unwrap();
        let condition = graph.spawn(
            BlockBody::Condition(
                StatementBody::new("less_than")
                    .with_param("left", ValueType::Number)
                    .with_param("right", ValueType::Number),
            ),
            rect(),
        );
        let health = graph.spawn(
            BlockBody::Expression(ExpressionBody::new("player_health", ValueType::Number)),
            rect(),
        );
        let limit = graph.spawn(BlockBody::Literal(LiteralBody::new(25.0)), rect());
        let action = graph.spawn(BlockBody::Action(StatementBody::new("heal")), rect());

        graph
            .reparent(health, Role::Value { parent: condition, param: "left".into() })
            .unwrap();
        graph
            .reparent(limit, Role::Value { parent: condition, param: "right".into() })
            .unwrap();
        graph.reparent(condition, slot(rule, "conditions")).unwrap();
        graph.reparent(action, slot(rule, "actions")).unwrap();
        graph.reparent(rule, slot(module, "rules")).unwrap();

        let program = generator().generate(&graph);
        assert!(program.is_clean());
        assert!(program
            .text
            .contains("function rule_00_low_health_conditions(): boolean {\n  return (player_health() < 25);\n}"));
        assert!(program.text.contains("  heal();\n"));
        assert!(program.text.contains("export function dispatch_main(trigger: string): void {"));
        assert!(program.text.contains("case \"ongoing\":"));
    }

    #[test]
    fn test_docked_conditions_are_anded() {
        let mut graph = BlockGraph::new();
        let module = graph.create(BlockKind::Module, rect());
        let rule = graph.create(BlockKind::RuleSet, rect());
        let first = graph.spawn(BlockBody::Condition(StatementBody::new("is_alive")), rect());
        let docked = graph.spawn(BlockBody::Condition(StatementBody::new("is_grounded")), rect());
        let below = graph.spawn(BlockBody::Condition(StatementBody::new("has_key")), rect());
        graph.reparent(docked, Role::Dock { left: first }).unwrap();
        graph.reparent(below, Role::Next { previous: first }).unwrap();
        graph.reparent(first, slot(rule, "conditions")).unwrap();
        graph.reparent(rule, slot(module, "rules")).unwrap();

        let program = generator().generate(&graph);
        assert!(program
            .text
            .contains("return is_alive() && is_grounded() && has_key();"));
    }

    #[test]
    fn test_unfilled_and_defaulted_params() {
        let mut graph = BlockGraph::new();
        let module = graph.create(BlockKind::Module, rect());
        let rule = graph.create(BlockKind::RuleSet, rect());
        let action = graph.spawn(
            BlockBody::Action(
                StatementBody::new("damage")
                    .with_param("target", ValueType::Player)
                    .with_slot(crate::block::ParamSlot::new("amount", ValueType::Number).with_default(10.0)),
            ),
            rect(),
        );
        graph.reparent(action, slot(rule, "actions")).unwrap();
        graph.reparent(rule, slot(module, "rules")).unwrap();

        let program = generator().generate(&graph);
        assert!(program.text.contains("damage(undefined, 10);"));
    }

    #[test]
    fn test_subroutine_call_by_name() {
        let mut graph = BlockGraph::new();
        let module = graph.create(BlockKind::Module, rect());
        let rule = graph.create(BlockKind::RuleSet, rect());
        let sub = graph.spawn(BlockBody::Subroutine(SubroutineBody::named("Respawn All")), rect());
        let inner = graph.spawn(BlockBody::Action(StatementBody::new("respawn")), rect());
        let call = graph.spawn(BlockBody::Action(StatementBody::call("Respawn All")), rect());
        let missing = graph.spawn(BlockBody::Action(StatementBody::call("Nope")), rect());

        graph.reparent(inner, slot(sub, "actions")).unwrap();
        graph.reparent(call, slot(rule, "actions")).unwrap();
        graph.reparent(missing, Role::Next { previous: call }).unwrap();
        graph.reparent(rule, slot(module, "rules")).unwrap();
        graph.reparent(sub, Role::Next { previous: rule }).unwrap();

        let program = generator().generate(&graph);
        assert!(program.text.contains("function sub_respawn_all(): void {\n  respawn();\n}"));
        assert!(program.text.contains("  sub_respawn_all();\n"));
        assert!(program.text.contains("/* PLACEHOLDER: unknown subroutine 'Nope' */"));
        assert_eq!(program.diagnostics.len(), 1);
        assert_eq!(program.diagnostics[0].block, Some(missing));
    }

    #[test]
    fn test_disabled_rule_not_dispatched() {
        let mut graph = BlockGraph::new();
        let module = graph.create(BlockKind::Module, rect());
        let rule = graph.create(BlockKind::RuleSet, rect());
        graph.set_enabled(rule, false).unwrap();
        graph.reparent(rule, slot(module, "rules")).unwrap();

        let program = generator().generate(&graph);
        assert!(program.text.contains("function rule_00_rule_conditions(): boolean"));
        assert!(!program.text.contains("if (rule_00_rule_conditions())"));
    }

    fn module_with_score(graph: &mut BlockGraph, label: &str) -> BlockId {
        let module = graph.create(BlockKind::Module, rect());
        graph.set_label(module, label).unwrap();
        graph
            .add_global(
                module,
                GlobalVariable {
                    name: "score".to_string(),
                    initial: LiteralValue::Number(0.0),
                },
            )
            .unwrap();
        let rule = graph.create(BlockKind::RuleSet, rect());
        graph.reparent(rule, slot(module, "rules")).unwrap();
        module
    }

    #[test]
    fn test_modules_with_colliding_names() {
        let mut graph = BlockGraph::new();
        module_with_score(&mut graph, "Main");
        let second = module_with_score(&mut graph, "main");

        let program = generator().generate(&graph);
        assert_eq!(program.text.matches("export function dispatch_main(").count(), 1);
        assert_eq!(program.text.matches("export function dispatch_main_2(").count(), 1);
        assert!(program
            .diagnostics
            .iter()
            .any(|d| d.block == Some(second) && d.message.starts_with("duplicate module name 'main'")));
    }

    #[test]
    fn test_globals_with_colliding_names() {
        let mut graph = BlockGraph::new();
        let first = module_with_score(&mut graph, "Alpha");
        graph
            .add_global(
                first,
                GlobalVariable {
                    name: "Score".to_string(),
                    initial: LiteralValue::Boolean(true),
                },
            )
            .unwrap();
        module_with_score(&mut graph, "Beta");

        let program = generator().generate(&graph);
        assert_eq!(program.text.matches("let score = ").count(), 1);
        assert!(program.text.contains("let score_2 = true; // Alpha"));
        assert!(program.text.contains("let score_3 = 0; // Beta"));
        let renamed = program
            .diagnostics
            .iter()
            .filter(|d| d.message.starts_with("duplicate global name"))
            .count();
        assert_eq!(renamed, 2);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let mut graph = BlockGraph::new();
        let module = graph.create(BlockKind::Module, rect());
        for _ in 0..3 {
            let rule = graph.create(BlockKind::RuleSet, rect());
            let action = graph.create(BlockKind::Action, rect());
            graph.reparent(action, slot(rule, "actions")).unwrap();
            graph.reparent(rule, slot(module, "rules")).unwrap();
        }
        let first = generator().generate(&graph);
        let second = generator().generate(&graph);
        assert_eq!(first.text, second.text);
    }
}
