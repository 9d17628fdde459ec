use crate::block::{BlockBody, BlockId, BlockKind, Role};
use crate::graph::BlockGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Validation severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationSeverity {
    Info,    // advisory, generation unaffected
    Warning, // generated output is likely not what was meant
    Error,   // generated output contains placeholders or the graph is broken
}

/// Validation issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    pub message: String,
    pub affected_blocks: Vec<BlockId>,
    pub issue_type: ValidationIssueType,
}

/// Types of validation issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationIssueType {
    OrphanBlock,
    DetachedContainer,
    MissingReference,
    EmptyRuleSet,
    UnfilledParameter,
    InvariantViolation,
}

/// Complete validation result
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Create a new empty validation result
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// Add an issue
    pub fn add_issue(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == ValidationSeverity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == ValidationSeverity::Warning)
    }

    /// Get all errors
    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.with_severity(ValidationSeverity::Error)
    }

    /// Get all warnings
    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.with_severity(ValidationSeverity::Warning)
    }

    /// Get all info messages
    pub fn info(&self) -> Vec<&ValidationIssue> {
        self.with_severity(ValidationSeverity::Info)
    }

    fn with_severity(&self, severity: ValidationSeverity) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == severity).collect()
    }

    /// Issues of one type
    pub fn of_type(&self, issue_type: ValidationIssueType) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.issue_type == issue_type)
            .collect()
    }

    /// Check if validation passed (no errors)
    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }
}

/// Structural checks over a block graph
pub struct Validator;

impl Validator {
    /// Run all validations on a graph
    pub fn validate(graph: &BlockGraph) -> ValidationResult {
        let mut result = ValidationResult::new();

        for problem in graph.check_invariants() {
            result.add_issue(ValidationIssue {
                severity: ValidationSeverity::Error,
                message: problem,
                affected_blocks: vec![],
                issue_type: ValidationIssueType::InvariantViolation,
            });
        }

        let subroutines = Self::callable_subroutines(graph);

        for block in graph.blocks() {
            let kind = block.kind();

            if block.is_free() && kind.is_statement() {
                let chain = graph.chain(block.id);
                result.add_issue(ValidationIssue {
                    severity: ValidationSeverity::Info,
                    message: format!(
                        "{} '{}' is not attached to any rule and will not be generated",
                        kind.title(),
                        block.label
                    ),
                    affected_blocks: chain,
                    issue_type: ValidationIssueType::OrphanBlock,
                });
            }

            if matches!(kind, BlockKind::RuleSet | BlockKind::Subroutine)
                && !Self::inside_module(graph, block.id)
            {
                result.add_issue(ValidationIssue {
                    severity: ValidationSeverity::Warning,
                    message: format!(
                        "{} '{}' is outside any module and will not be generated",
                        kind.title(),
                        block.label
                    ),
                    affected_blocks: vec![block.id],
                    issue_type: ValidationIssueType::DetachedContainer,
                });
            }

            if kind == BlockKind::RuleSet
                && block.slot("actions").and_then(|s| s.head).is_none()
            {
                result.add_issue(ValidationIssue {
                    severity: ValidationSeverity::Warning,
                    message: format!("Rule '{}' has no actions", block.label),
                    affected_blocks: vec![block.id],
                    issue_type: ValidationIssueType::EmptyRuleSet,
                });
            }

            if let BlockBody::Action(statement) = &block.body {
                if let Some(name) = &statement.subroutine {
                    if !subroutines.contains(name.as_str()) {
                        result.add_issue(ValidationIssue {
                            severity: ValidationSeverity::Error,
                            message: format!("Call to unknown subroutine '{}'", name),
                            affected_blocks: vec![block.id],
                            issue_type: ValidationIssueType::MissingReference,
                        });
                    }
                }
            }

            let unfilled: Vec<&str> = block
                .body
                .params()
                .iter()
                .filter(|p| p.value.is_none() && p.default.is_none())
                .map(|p| p.name.as_str())
                .collect();
            if !unfilled.is_empty() {
                result.add_issue(ValidationIssue {
                    severity: ValidationSeverity::Warning,
                    message: format!(
                        "'{}' has unfilled parameter(s): {}",
                        block.label,
                        unfilled.join(", ")
                    ),
                    affected_blocks: vec![block.id],
                    issue_type: ValidationIssueType::UnfilledParameter,
                });
            }
        }

        result
    }

    /// Whether the chain holding `id` hangs from a Module's slot
    fn inside_module(graph: &BlockGraph, id: BlockId) -> bool {
        let head = graph.chain_head(id);
        match graph.get(head).and_then(|b| b.owner.as_ref()) {
            Some(Role::Slot { container, .. }) => graph
                .get(*container)
                .map_or(false, |c| c.kind() == BlockKind::Module),
            _ => false,
        }
    }

    /// Names of subroutines that generation will emit
    fn callable_subroutines(graph: &BlockGraph) -> BTreeSet<&str> {
        graph
            .blocks()
            .filter(|b| Self::inside_module(graph, b.id))
            .filter_map(|b| match &b.body {
                BlockBody::Subroutine(sub) => Some(sub.name.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Extension trait for BlockGraph to add validation
pub trait ValidatedGraph {
    /// Validate the graph
    fn validate(&self) -> ValidationResult;

    /// Get blocks with validation issues, at their highest severity
    fn blocks_with_issues(&self, result: &ValidationResult) -> HashMap<BlockId, ValidationSeverity>;
}

impl ValidatedGraph for BlockGraph {
    fn validate(&self) -> ValidationResult {
        Validator::validate(self)
    }

    fn blocks_with_issues(&self, result: &ValidationResult) -> HashMap<BlockId, ValidationSeverity> {
        let mut blocks = HashMap::new();

        for issue in &result.issues {
            for block_id in &issue.affected_blocks {
                blocks
                    .entry(*block_id)
                    .and_modify(|severity| {
                        // Keep the highest severity
                        if issue.severity as u8 > *severity as u8 {
                            *severity = issue.severity;
                        }
                    })
                    .or_insert(issue.severity);
            }
        }

        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{LiteralBody, Rectangle, StatementBody, SubroutineBody, ValueType};

    fn rect() -> Rectangle {
        Rectangle::new(0.0, 0.0, 100.0, 40.0)
    }

    fn slot(container: BlockId, name: &str) -> Role {
        Role::Slot {
            container,
            slot: name.to_string(),
        }
    }

    #[test]
    fn test_orphan_statement_is_advisory() {
        let mut graph = BlockGraph::new();
        let action = graph.create(BlockKind::Action, rect());

        let result = Validator::validate(&graph);
        assert!(result.is_valid());
        let info = result.info();
        assert!(info
            .iter()
            .any(|i| i.issue_type == ValidationIssueType::OrphanBlock
                && i.affected_blocks == vec![action]));
    }

    #[test]
    fn test_detached_and_empty_rule() {
        let mut graph = BlockGraph::new();
        let rule = graph.create(BlockKind::RuleSet, rect());

        let result = Validator::validate(&graph);
        assert!(result.has_warnings());
        assert_eq!(result.of_type(ValidationIssueType::DetachedContainer).len(), 1);
        assert_eq!(result.of_type(ValidationIssueType::EmptyRuleSet)[0].affected_blocks, vec![rule]);
    }

    #[test]
    fn test_missing_subroutine_reference() {
        let mut graph = BlockGraph::new();
        let module = graph.create(BlockKind::Module, rect());
        let rule = graph.create(BlockKind::RuleSet, rect());
        let call = graph.spawn(BlockBody::Action(StatementBody::call("Respawn")), rect());
        graph.reparent(rule, slot(module, "rules")).unwrap();
        graph.reparent(call, slot(rule, "actions")).unwrap();

        let result = Validator::validate(&graph);
        assert!(result.has_errors());
        assert_eq!(
            result.errors()[0].issue_type,
            ValidationIssueType::MissingReference
        );

        // A subroutine outside the module does not count
        let sub = graph.spawn(BlockBody::Subroutine(SubroutineBody::named("Respawn")), rect());
        assert!(Validator::validate(&graph).has_errors());

        graph.reparent(sub, Role::Next { previous: rule }).unwrap();
        assert!(Validator::validate(&graph).is_valid());
    }

    #[test]
    fn test_unfilled_parameter() {
        let mut graph = BlockGraph::new();
        let action = graph.spawn(
            BlockBody::Action(StatementBody::new("heal").with_param("amount", ValueType::Number)),
            rect(),
        );

        let result = Validator::validate(&graph);
        assert_eq!(result.of_type(ValidationIssueType::UnfilledParameter).len(), 1);

        let literal = graph.spawn(BlockBody::Literal(LiteralBody::new(5.0)), rect());
        graph
            .reparent(
                literal,
                Role::Value {
                    parent: action,
                    param: "amount".to_string(),
                },
            )
            .unwrap();
        let result = Validator::validate(&graph);
        assert!(result.of_type(ValidationIssueType::UnfilledParameter).is_empty());
    }

    #[test]
    fn test_valid_graph() {
        let mut graph = BlockGraph::new();
        let module = graph.create(BlockKind::Module, rect());
        let rule = graph.create(BlockKind::RuleSet, rect());
        let action = graph.create(BlockKind::Action, rect());
        graph.reparent(rule, slot(module, "rules")).unwrap();
        graph.reparent(action, slot(rule, "actions")).unwrap();

        let result = graph.validate();
        assert!(result.is_valid());
        assert!(!result.has_warnings());
    }

    #[test]
    fn test_blocks_with_issues() {
        let mut graph = BlockGraph::new();
        let call = graph.spawn(BlockBody::Action(StatementBody::call("Missing")), rect());

        let result = graph.validate();
        let blocks = graph.blocks_with_issues(&result);

        // Orphan (info) and missing reference (error) on the same block
        assert_eq!(blocks[&call], ValidationSeverity::Error);
    }
}
