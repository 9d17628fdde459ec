use super::naming;
use super::{Emitter, LoweredGlobal, LoweredModule, LoweredRule, LoweredSubroutine};
use crate::block::LiteralValue;
use crate::config::CodegenConfig;

/// Emits TypeScript source
#[derive(Debug, Clone)]
pub struct TypeScriptEmitter {
    indent: String,
    banner: bool,
}

impl Default for TypeScriptEmitter {
    fn default() -> Self {
        Self::from_config(&CodegenConfig::default())
    }
}

impl TypeScriptEmitter {
    pub fn from_config(config: &CodegenConfig) -> Self {
        Self {
            indent: " ".repeat(config.indent_width),
            banner: config.banner,
        }
    }

    fn indented(&self, level: usize, line: &str) -> String {
        format!("{}{}", self.indent.repeat(level), line)
    }

    fn block_body(&self, lines: &[String]) -> String {
        lines
            .iter()
            .map(|line| self.indented(1, line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Infix operator for a binary opcode
fn binary_operator(opcode: &str) -> Option<&'static str> {
    Some(match opcode {
        "equals" => "===",
        "not_equals" => "!==",
        "less_than" => "<",
        "greater_than" => ">",
        "and" => "&&",
        "or" => "||",
        "add" => "+",
        "subtract" => "-",
        "multiply" => "*",
        "divide" => "/",
        _ => return None,
    })
}

fn number_literal(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn string_literal(s: &str) -> String {
    // A JSON string is a valid TypeScript string literal.
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s.escape_default()))
}

impl Emitter for TypeScriptEmitter {
    fn banner(&self) -> Option<String> {
        self.banner
            .then(|| "// Generated by rule_blocks. Do not edit.".to_string())
    }

    fn global(&self, module: &LoweredModule, global: &LoweredGlobal) -> String {
        format!(
            "let {} = {}; // {}",
            global.identifier,
            self.literal(&global.initial),
            naming::comment_text(&module.label)
        )
    }

    fn literal(&self, value: &LiteralValue) -> String {
        match value {
            LiteralValue::Number(n) => number_literal(*n),
            LiteralValue::Boolean(b) => b.to_string(),
            LiteralValue::Text(s) => string_literal(s),
        }
    }

    fn expression(&self, operator: &str, args: &[String]) -> String {
        match (binary_operator(operator), args) {
            (Some(op), [left, right]) => format!("({} {} {})", left, op, right),
            _ => format!("{}({})", naming::identifier(operator), args.join(", ")),
        }
    }

    fn undefined(&self) -> String {
        "undefined".to_string()
    }

    fn placeholder(&self, reason: &str) -> String {
        format!("undefined /* PLACEHOLDER: {} */", naming::comment_text(reason))
    }

    fn placeholder_statement(&self, reason: &str) -> String {
        format!("/* PLACEHOLDER: {} */", naming::comment_text(reason))
    }

    fn condition(&self, opcode: &str, args: &[String]) -> String {
        self.expression(opcode, args)
    }

    fn action(&self, opcode: &str, args: &[String]) -> String {
        format!("{}({});", naming::identifier(opcode), args.join(", "))
    }

    fn subroutine_call(&self, identifier: &str) -> String {
        format!("{}();", identifier)
    }

    fn subroutine(&self, subroutine: &LoweredSubroutine) -> String {
        let mut out = format!("// Subroutine: {}\n", naming::comment_text(&subroutine.name));
        out.push_str(&format!("function {}(): void {{\n", subroutine.identifier));
        if !subroutine.body.is_empty() {
            out.push_str(&self.block_body(&subroutine.body));
            out.push('\n');
        }
        out.push('}');
        out
    }

    fn rule_set(&self, rule: &LoweredRule) -> String {
        let condition = if rule.conditions.is_empty() {
            "true".to_string()
        } else {
            rule.conditions.join(" && ")
        };
        let disabled = if rule.enabled { "" } else { " (disabled)" };

        let mut out = format!("// Rule: {}{}\n", naming::comment_text(&rule.label), disabled);
        out.push_str(&format!("function {}(): boolean {{\n", rule.conditions_fn));
        out.push_str(&self.indented(1, &format!("return {};", condition)));
        out.push_str("\n}\n\n");
        out.push_str(&format!("function {}(): void {{\n", rule.actions_fn));
        if !rule.actions.is_empty() {
            out.push_str(&self.block_body(&rule.actions));
            out.push('\n');
        }
        out.push('}');
        out
    }

    fn dispatcher(&self, module: &LoweredModule) -> String {
        let mut lines = vec![
            format!("export function {}(trigger: string): void {{", module.dispatcher),
            self.indented(1, "switch (trigger) {"),
        ];
        for (trigger, rules) in module.dispatch_table() {
            lines.push(self.indented(2, &format!("case {}:", string_literal(trigger))));
            for rule in rules {
                lines.push(self.indented(3, &format!("if ({}()) {{", rule.conditions_fn)));
                lines.push(self.indented(4, &format!("{}();", rule.actions_fn)));
                lines.push(self.indented(3, "}"));
            }
            lines.push(self.indented(3, "break;"));
        }
        lines.push(self.indented(1, "}"));
        lines.push("}".to_string());
        lines.join("\n")
    }
}
