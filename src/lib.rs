// Rule Blocks - Core Library

pub mod block;
pub mod codegen;
pub mod config;
pub mod connection;
pub mod editor;
pub mod error;
pub mod graph;
pub mod history;
pub mod logging;
pub mod serialization;
pub mod tag;
pub mod validation;

// Re-export main types for convenience
pub use block::{
    Block, BlockBody, BlockId, BlockKind, ContainerSlot, ExpressionBody, GlobalVariable,
    LiteralBody, LiteralValue, ModuleBody, ParamSlot, Point, Rectangle, Role, RuleSetBody,
    StatementBody, SubroutineBody, ValueType,
};
pub use codegen::{CodeGenerator, Emitter, GeneratedProgram, GenerationDiagnostic, TypeScriptEmitter};
pub use config::{EditorConfig, SnapPolicy};
pub use connection::{ConnectOutcome, ConnectionEngine, DragSession, DropOutcome};
pub use editor::Editor;
pub use error::{GraphError, SnapshotError};
pub use graph::{BlockGraph, RemovedSubtree};
pub use history::{UndoAction, UndoManager};
pub use serialization::{
    LoadedWorkspace, Manifest, Project, RuleState, WorkspaceSerializer, WorkspaceSnapshot,
};
pub use validation::{
    ValidatedGraph, ValidationIssue, ValidationIssueType, ValidationResult, ValidationSeverity,
    Validator,
};
