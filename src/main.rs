use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use rule_blocks::block::{ExpressionBody, LiteralBody};
use rule_blocks::serialization::{load_workspace_file, save_workspace_file};
use rule_blocks::{
    logging, BlockBody, BlockGraph, BlockId, BlockKind, CodeGenerator, EditorConfig,
    GlobalVariable, GraphError, LiteralValue, LoadedWorkspace, ParamSlot, Project, Rectangle,
    Role, RuleState, StatementBody, SubroutineBody, TypeScriptEmitter, ValueType, Validator,
};

#[derive(Parser)]
#[command(name = "rule_blocks", version, about = "Compile block-programming workspaces to TypeScript")]
struct Cli {
    /// Editor configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level filter (RUST_LOG takes precedence)
    #[arg(long, env = "RULE_BLOCKS_LOG", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate TypeScript from a workspace file or project directory
    Compile(CompileArgs),

    /// Report structural problems; exits non-zero on errors
    Check(CheckArgs),

    /// Write a demonstration workspace
    Sample(SampleArgs),
}

#[derive(clap::Args)]
struct CompileArgs {
    /// Workspace JSON file or project directory
    workspace: PathBuf,

    /// Output file (stdout by default, generated/ for projects)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(clap::Args)]
struct CheckArgs {
    /// Workspace JSON file or project directory
    workspace: PathBuf,
}

#[derive(clap::Args)]
struct SampleArgs {
    /// Where to write the workspace
    #[arg(short, long, default_value = "sample_workspace.json")]
    output: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("error: {:#}", err);
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let mut config = match &cli.config {
        Some(path) => EditorConfig::load(path)?,
        None => EditorConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    logging::init(&config)?;
    logging::log_config(&config);

    match cli.command {
        Command::Compile(args) => compile(&config, args),
        Command::Check(args) => check(args),
        Command::Sample(args) => {
            let graph = sample_graph()?;
            save_workspace_file(&args.output, &graph, &RuleState::new())?;
            println!("wrote {}", args.output.display());
            Ok(0)
        }
    }
}

/// Load either a project directory or a bare snapshot file
fn open_workspace(path: &Path) -> Result<(Option<Project>, LoadedWorkspace)> {
    if path.is_dir() {
        let project = Project::open(path)?;
        let (_, workspace) = project.load()?;
        Ok((Some(project), workspace))
    } else {
        Ok((None, load_workspace_file(path)?))
    }
}

fn report_dropped(workspace: &LoadedWorkspace) {
    for dropped in &workspace.dropped_edges {
        eprintln!(
            "warning: dropped {} of {} (missing block {})",
            dropped.edge, dropped.block, dropped.target
        );
    }
}

fn compile(config: &EditorConfig, args: CompileArgs) -> Result<i32> {
    let (project, workspace) = open_workspace(&args.workspace)?;
    report_dropped(&workspace);

    let generator = CodeGenerator::new(TypeScriptEmitter::from_config(&config.codegen));
    let program = generator.generate(&workspace.graph);
    for diagnostic in &program.diagnostics {
        match diagnostic.block {
            Some(block) => eprintln!("warning: {} ({})", diagnostic.message, block),
            None => eprintln!("warning: {}", diagnostic.message),
        }
    }

    match (args.output, project) {
        (Some(path), _) => {
            std::fs::write(&path, &program.text)
                .with_context(|| format!("Failed to write output: {}", path.display()))?;
            eprintln!("wrote {}", path.display());
        }
        (None, Some(project)) => {
            let path = project.write_generated(&program.text)?;
            eprintln!("wrote {}", path.display());
        }
        (None, None) => print!("{}", program.text),
    }
    Ok(0)
}

fn check(args: CheckArgs) -> Result<i32> {
    let (_, workspace) = open_workspace(&args.workspace)?;
    report_dropped(&workspace);

    let result = Validator::validate(&workspace.graph);
    for issue in &result.issues {
        println!("{:?}: {} [{:?}]", issue.severity, issue.message, issue.issue_type);
    }
    println!(
        "{} block(s), {} error(s), {} warning(s)",
        workspace.graph.len(),
        result.errors().len(),
        result.warnings().len()
    );
    Ok(if result.is_valid() { 0 } else { 1 })
}

fn at(x: f32, y: f32) -> Rectangle {
    Rectangle::new(x, y, 160.0, 40.0)
}

fn slot(container: BlockId, name: &str) -> Role {
    Role::Slot {
        container,
        slot: name.to_string(),
    }
}

fn value(parent: BlockId, param: &str) -> Role {
    Role::Value {
        parent,
        param: param.to_string(),
    }
}

/// Arena module: one subroutine and one rule that heals low-health players
fn sample_graph() -> Result<BlockGraph, GraphError> {
    let mut graph = BlockGraph::new();

    let module = graph.create(BlockKind::Module, at(0.0, 0.0));
    graph.set_label(module, "Arena")?;
    graph.add_global(
        module,
        GlobalVariable {
            name: "kill_bonus".to_string(),
            initial: LiteralValue::Number(5.0),
        },
    )?;

    let respawn = graph.spawn(
        BlockBody::Subroutine(SubroutineBody::named("Respawn All")),
        at(20.0, 40.0),
    );
    let respawn_action = graph.spawn(
        BlockBody::Action(StatementBody::new("respawn_all_players")),
        at(40.0, 80.0),
    );
    graph.reparent(respawn, slot(module, "rules"))?;
    graph.reparent(respawn_action, slot(respawn, "actions"))?;

    let rule = graph.create(BlockKind::RuleSet, at(20.0, 160.0));
    graph.set_label(rule, "Low Health")?;
    graph.reparent(rule, Role::Next { previous: respawn })?;

    let event = graph.spawn(
        BlockBody::Event(StatementBody::new("player_damaged")),
        at(40.0, 200.0),
    );
    graph.reparent(event, slot(rule, "event"))?;

    let condition = graph.spawn(
        BlockBody::Condition(
            StatementBody::new("less_than")
                .with_param("left", ValueType::Number)
                .with_slot(ParamSlot::new("right", ValueType::Number).with_default(25.0)),
        ),
        at(40.0, 240.0),
    );
    let health = graph.spawn(
        BlockBody::Expression(ExpressionBody::new("player_health", ValueType::Number)),
        at(220.0, 240.0),
    );
    graph.reparent(health, value(condition, "left"))?;
    graph.reparent(condition, slot(rule, "conditions"))?;

    let heal = graph.spawn(
        BlockBody::Action(StatementBody::new("heal").with_param("amount", ValueType::Number)),
        at(40.0, 280.0),
    );
    let amount = graph.spawn(BlockBody::Literal(LiteralBody::new(10.0)), at(220.0, 280.0));
    graph.reparent(amount, value(heal, "amount"))?;
    graph.reparent(heal, slot(rule, "actions"))?;

    let call = graph.spawn(
        BlockBody::Action(StatementBody::call("Respawn All")),
        at(40.0, 320.0),
    );
    graph.reparent(call, Role::Next { previous: heal })?;

    Ok(graph)
}
