/// Example: Assembling a rule by dragging blocks
///
/// This example demonstrates:
/// - Spawning blocks through the editor
/// - Dragging blocks onto slots so the connection engine snaps them
/// - Nesting a value into a parameter slot
/// - Undo and redo of a whole drag gesture
/// - Generating TypeScript and saving the project

use anyhow::Result;
use rule_blocks::*;

fn at(x: f32, y: f32) -> Rectangle {
    Rectangle::new(x, y, 120.0, 40.0)
}

fn main() -> Result<()> {
    println!("=== Rule Blocks: Rule Workflow Example ===\n");

    let mut editor = Editor::default();

    // Step 1: Spawn the blocks
    println!("Step 1: Spawning blocks...");
    let module = editor.spawn(BlockKind::Module, at(0.0, 0.0));
    editor.relabel(module, "Arena")?;
    let rule = editor.spawn(BlockKind::RuleSet, at(300.0, 300.0));
    editor.relabel(rule, "Low Health")?;
    let condition = editor.spawn_body(
        BlockBody::Condition(
            StatementBody::new("less_than")
                .with_param("left", ValueType::Number)
                .with_slot(ParamSlot::new("right", ValueType::Number).with_default(25.0)),
        ),
        at(500.0, 100.0),
    );
    let heal = editor.spawn_body(
        BlockBody::Action(StatementBody::new("heal").with_param("amount", ValueType::Number)),
        at(500.0, 200.0),
    );
    println!("  ✓ {} blocks on the canvas", editor.graph().len());

    // Step 2: Drag the rule into the module, then statements into the rule
    println!("\nStep 2: Dragging blocks into place...");
    for (block, drop_at) in [
        (rule, Point::new(18.0, 26.0)),
        (heal, Point::new(33.0, 97.0)),
        (condition, Point::new(33.0, 73.0)),
    ] {
        let mut session = editor.begin_drag(block)?;
        editor.drag_to(&mut session, drop_at)?;
        let outcome = editor.end_drag(session)?;
        match &outcome.owner {
            Some(role) => println!("  ✓ snapped into {}", role),
            None => println!("  ✗ left free at ({}, {})", outcome.to.x, outcome.to.y),
        }
    }

    // Step 3: Fill parameters
    println!("\nStep 3: Filling parameters...");
    let amount = editor.spawn_body(BlockBody::Literal(LiteralBody::new(10.0)), at(700.0, 200.0));
    editor.connect(
        amount,
        Role::Value {
            parent: heal,
            param: "amount".to_string(),
        },
    )?;
    let health = editor.spawn_body(
        BlockBody::Expression(ExpressionBody::new("player_health", ValueType::Number)),
        at(700.0, 100.0),
    );
    editor.connect(
        health,
        Role::Value {
            parent: condition,
            param: "left".to_string(),
        },
    )?;
    println!("  ✓ heal amount and health check wired");

    // A Number can never fill a Player slot
    let target = editor.spawn_body(
        BlockBody::Action(StatementBody::new("kill").with_param("target", ValueType::Player)),
        at(700.0, 400.0),
    );
    let number = editor.spawn_body(BlockBody::Literal(LiteralBody::new(3.0)), at(900.0, 400.0));
    if let Err(err) = editor.connect(
        number,
        Role::Value {
            parent: target,
            param: "target".to_string(),
        },
    ) {
        println!("  ✓ rejected: {}", err);
    }
    editor.delete(target)?;
    editor.delete(number)?;

    // Step 4: Validate and generate
    println!("\nStep 4: Validating and generating...");
    let validation = editor.validate();
    println!(
        "  ✓ {} error(s), {} warning(s)",
        validation.errors().len(),
        validation.warnings().len()
    );
    let program = editor.generate();
    println!("\n{}", program.text);

    // Step 5: Undo the two deletions and redo them
    println!("Step 5: Undo / redo...");
    editor.undo()?;
    editor.undo()?;
    println!("  ✓ after two undos: {} blocks", editor.graph().len());
    editor.redo()?;
    editor.redo()?;
    println!("  ✓ after two redos: {} blocks", editor.graph().len());
    assert_eq!(editor.generate().text, program.text);

    // Step 6: Save the project
    println!("\nStep 6: Saving project...");
    let project_path = std::env::temp_dir().join("rule_blocks_demo");
    let project = Project::create(&project_path, "Arena")?;
    project.save(editor.graph(), editor.rule_state())?;
    let generated = project.write_generated(&program.text)?;
    println!("  ✓ saved to {}", project_path.display());
    println!("  ✓ generated {}", generated.display());

    println!("\n✅ Workflow example completed successfully!");

    Ok(())
}
