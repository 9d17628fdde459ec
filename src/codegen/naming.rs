use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref CAMEL_BOUNDARY: Regex = Regex::new(r"([a-z0-9])([A-Z])").unwrap();
    static ref NON_WORD: Regex = Regex::new(r"[^a-z0-9]+").unwrap();

    /// TypeScript keywords and globals a generated name must not shadow
    static ref RESERVED: HashSet<&'static str> = [
        "break", "case", "catch", "class", "const", "continue", "debugger", "default",
        "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for",
        "function", "if", "import", "in", "instanceof", "new", "null", "return", "super",
        "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while", "with",
        "as", "implements", "interface", "let", "package", "private", "protected", "public",
        "static", "yield", "any", "boolean", "number", "string", "symbol", "type", "from",
        "of", "await", "async", "undefined", "trigger",
    ]
    .into_iter()
    .collect();
}

/// Lower snake-case TypeScript identifier for a label or name
pub fn identifier(raw: &str) -> String {
    let spaced = CAMEL_BOUNDARY.replace_all(raw.trim(), "${1}_${2}");
    let lowered = spaced.to_lowercase();
    let mut name = NON_WORD
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string();

    if name.is_empty() {
        name.push_str("unnamed");
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    if is_reserved(&name) {
        name.push('_');
    }
    name
}

pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(name)
}

/// Text safe to place inside a `/* */` or `//` comment
pub fn comment_text(raw: &str) -> String {
    raw.replace("*/", "* /").replace(['\n', '\r'], " ")
}
