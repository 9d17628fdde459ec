use crate::block::{Block, BlockId};
use crate::codegen::naming;
use crate::error::SnapshotError;
use crate::graph::BlockGraph;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Current workspace snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Free-form named values saved alongside the graph
pub type RuleState = BTreeMap<String, serde_json::Value>;

/// Persisted form of a workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub version: u32,
    pub blocks: BTreeMap<BlockId, Block>,
    #[serde(default)]
    pub rule_state: RuleState,
}

/// An edge removed on import because its target did not exist
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedEdge {
    pub block: BlockId,
    pub edge: String,
    pub target: BlockId,
}

/// A successfully imported workspace
#[derive(Debug, Clone)]
pub struct LoadedWorkspace {
    pub graph: BlockGraph,
    pub rule_state: RuleState,
    pub dropped_edges: Vec<DroppedEdge>,
}

/// Converts a [`BlockGraph`] to and from [`WorkspaceSnapshot`]
pub struct WorkspaceSerializer;

impl WorkspaceSerializer {
    pub fn serialize(graph: &BlockGraph, rule_state: &RuleState) -> WorkspaceSnapshot {
        WorkspaceSnapshot {
            version: SNAPSHOT_VERSION,
            blocks: graph.block_map().clone(),
            rule_state: rule_state.clone(),
        }
    }

    pub fn to_json(graph: &BlockGraph, rule_state: &RuleState) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(&Self::serialize(graph, rule_state))?)
    }

    pub fn from_json(json: &str) -> Result<LoadedWorkspace, SnapshotError> {
        let snapshot: WorkspaceSnapshot = serde_json::from_str(json)?;
        Self::deserialize(snapshot)
    }

    /// Validate a snapshot and build a graph from it. Dangling edges are
    /// dropped; any other inconsistency rejects the whole snapshot.
    pub fn deserialize(snapshot: WorkspaceSnapshot) -> Result<LoadedWorkspace, SnapshotError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }

        for (key, block) in &snapshot.blocks {
            if *key != block.id {
                return Err(SnapshotError::Malformed(format!(
                    "block stored under {} has id {}",
                    key, block.id
                )));
            }
        }

        let mut blocks = snapshot.blocks;
        let dropped_edges = drop_dangling_edges(&mut blocks);
        for dropped in &dropped_edges {
            tracing::warn!(
                block = %dropped.block,
                edge = %dropped.edge,
                target = %dropped.target,
                "dropped dangling edge"
            );
        }

        let graph = BlockGraph::from_blocks(blocks);
        let problems = graph.check_invariants();
        if !problems.is_empty() {
            return Err(SnapshotError::Malformed(problems.join("; ")));
        }

        tracing::info!(
            blocks = graph.len(),
            dropped = dropped_edges.len(),
            "workspace imported"
        );
        Ok(LoadedWorkspace {
            graph,
            rule_state: snapshot.rule_state,
            dropped_edges,
        })
    }
}

fn drop_dangling_edges(blocks: &mut BTreeMap<BlockId, Block>) -> Vec<DroppedEdge> {
    let known: std::collections::BTreeSet<BlockId> = blocks.keys().copied().collect();
    let mut dropped = Vec::new();

    for block in blocks.values_mut() {
        let id = block.id;
        let mut record = |edge: String, target: BlockId| {
            dropped.push(DroppedEdge {
                block: id,
                edge,
                target,
            })
        };

        if let Some(role) = &block.owner {
            let owner = role.owner_block();
            if !known.contains(&owner) {
                record(format!("owner ({})", role), owner);
                block.owner = None;
            }
        }
        if let Some(next) = block.next.filter(|n| !known.contains(n)) {
            record("next".to_string(), next);
            block.next = None;
        }
        if let Some(right) = block.dock_right.filter(|n| !known.contains(n)) {
            record("dock_right".to_string(), right);
            block.dock_right = None;
        }
        for slot in block.body.slots_mut() {
            if let Some(head) = slot.head.filter(|h| !known.contains(h)) {
                record(format!("slot '{}'", slot.name), head);
                slot.head = None;
            }
        }
        for param in block.body.params_mut() {
            if let Some(value) = param.value.filter(|v| !known.contains(v)) {
                record(format!("parameter '{}'", param.name), value);
                param.value = None;
            }
        }
    }
    dropped
}

/// Read a standalone workspace snapshot file
pub fn load_workspace_file(path: &Path) -> Result<LoadedWorkspace> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open workspace file: {}", path.display()))?;
    let reader = BufReader::new(file);
    let snapshot: WorkspaceSnapshot = serde_json::from_reader(reader)
        .with_context(|| format!("Failed to parse workspace file: {}", path.display()))?;
    WorkspaceSerializer::deserialize(snapshot)
        .with_context(|| format!("Rejected workspace file: {}", path.display()))
}

/// Write a standalone workspace snapshot file
pub fn save_workspace_file(path: &Path, graph: &BlockGraph, rule_state: &RuleState) -> Result<()> {
    let snapshot = WorkspaceSerializer::serialize(graph, rule_state);
    let file = File::create(path)
        .with_context(|| format!("Failed to create workspace file: {}", path.display()))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &snapshot)
        .with_context(|| format!("Failed to write workspace file: {}", path.display()))?;
    tracing::info!(path = %path.display(), blocks = graph.len(), "workspace exported");
    Ok(())
}

/// Project manifest containing metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub name: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Manifest {
    /// Create a new manifest
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            name: name.into(),
            created: now,
            modified: now,
        }
    }

    /// Update the modified timestamp
    pub fn touch(&mut self) {
        self.modified = Utc::now();
    }

    /// Save manifest to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create manifest file: {}", path.display()))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .with_context(|| format!("Failed to write manifest to: {}", path.display()))?;
        Ok(())
    }

    /// Load manifest from file
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open manifest file: {}", path.display()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse manifest from: {}", path.display()))
    }
}

/// Workspace directory: manifest, snapshot, generated output
pub struct Project {
    /// Root directory of the project
    root_dir: PathBuf,
}

impl Project {
    /// Create a new project at the given path
    pub fn create(path: &Path, name: &str) -> Result<Self> {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create project directory: {}", path.display()))?;

        let generated_dir = path.join("generated");
        fs::create_dir_all(&generated_dir).with_context(|| {
            format!("Failed to create generated directory: {}", generated_dir.display())
        })?;

        Manifest::new(name).save(&path.join("manifest.json"))?;
        save_workspace_file(&path.join("workspace.json"), &BlockGraph::new(), &RuleState::new())?;

        Ok(Self {
            root_dir: path.to_path_buf(),
        })
    }

    /// Open an existing project
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(anyhow!("Project directory does not exist: {}", path.display()));
        }
        for required in ["manifest.json", "workspace.json"] {
            if !path.join(required).exists() {
                return Err(anyhow!(
                    "{} not found in project directory: {}",
                    required,
                    path.display()
                ));
            }
        }
        Ok(Self {
            root_dir: path.to_path_buf(),
        })
    }

    /// Get the root directory
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root_dir.join("manifest.json")
    }

    pub fn workspace_path(&self) -> PathBuf {
        self.root_dir.join("workspace.json")
    }

    pub fn generated_dir(&self) -> PathBuf {
        self.root_dir.join("generated")
    }

    pub fn load_manifest(&self) -> Result<Manifest> {
        Manifest::load(&self.manifest_path())
    }

    /// Save the workspace and bump the manifest's modified time
    pub fn save(&self, graph: &BlockGraph, rule_state: &RuleState) -> Result<()> {
        let mut manifest = self.load_manifest()?;
        manifest.touch();
        manifest.save(&self.manifest_path())?;
        save_workspace_file(&self.workspace_path(), graph, rule_state)
    }

    /// Load manifest and workspace
    pub fn load(&self) -> Result<(Manifest, LoadedWorkspace)> {
        let manifest = self.load_manifest()?;
        let workspace = load_workspace_file(&self.workspace_path())?;
        Ok((manifest, workspace))
    }

    /// Write generated code to `generated/<name>.ts`
    pub fn write_generated(&self, text: &str) -> Result<PathBuf> {
        let manifest = self.load_manifest()?;
        let dir = self.generated_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create generated directory: {}", dir.display()))?;
        let path = dir.join(format!("{}.ts", naming::identifier(&manifest.name)));
        fs::write(&path, text)
            .with_context(|| format!("Failed to write generated code: {}", path.display()))?;
        Ok(path)
    }
}
