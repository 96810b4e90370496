use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Session-wide settings. Every field has a default, so an empty YAML
/// document is a valid configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub markers: GrammarMarkers,
    /// Program tokens that end a parser line.
    pub terminators: Vec<String>,
    pub scoping: Scoping,
    pub statements: StatementNames,
    /// Declared type names mapped to registry type names.
    pub type_aliases: BTreeMap<String, String>,
    /// Upper bound on executed statements before the interpreter gives up.
    pub step_limit: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GrammarMarkers {
    pub end_group: String,
    pub end_grammar: String,
    pub separator: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Scoping {
    #[default]
    Off,
    Static,
}

/// Grammar symbol names the compiler and the declaration walker treat as
/// statements or statement parts.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StatementNames {
    pub assign: String,
    pub conditional: String,
    pub while_loop: String,
    pub repeat_loop: String,
    pub print: String,
    pub call: String,
    pub condition: String,
    pub body: String,
    pub array: String,
    pub else_branch: String,
    pub type_decl: String,
    pub var_decl: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let type_aliases = [
            ("int", "PRIM_INT"),
            ("integer", "PRIM_INT"),
            ("real", "PRIM_REAL"),
            ("float", "PRIM_REAL"),
            ("string", "PRIM_STRING"),
            ("bool", "PRIM_BOOL"),
            ("boolean", "PRIM_BOOL"),
        ]
        .into_iter()
        .map(|(alias, target)| (alias.to_string(), target.to_string()))
        .collect();

        Self {
            markers: GrammarMarkers::default(),
            terminators: vec![";".to_string(), "}".to_string()],
            scoping: Scoping::default(),
            statements: StatementNames::default(),
            type_aliases,
            step_limit: 1_000_000,
        }
    }
}

impl Default for GrammarMarkers {
    fn default() -> Self {
        Self {
            end_group: "#".to_string(),
            end_grammar: "##".to_string(),
            separator: "->".to_string(),
        }
    }
}

impl Default for StatementNames {
    fn default() -> Self {
        Self {
            assign: "assign_stmt".to_string(),
            conditional: "if_stmt".to_string(),
            while_loop: "while_stmt".to_string(),
            repeat_loop: "repeat_stmt".to_string(),
            print: "print_stmt".to_string(),
            call: "function_stmt".to_string(),
            condition: "condition".to_string(),
            body: "body".to_string(),
            array: "array".to_string(),
            else_branch: "else_stmt".to_string(),
            type_decl: "type_decl".to_string(),
            var_decl: "var_decl".to_string(),
        }
    }
}

impl StatementNames {
    pub fn is_loop(&self, symbol: &str) -> bool {
        symbol == self.while_loop || symbol == self.repeat_loop
    }
}

impl SessionConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).context("Parsing session config")
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw =
            fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("Loading {}", path.display()))
    }

    pub fn is_terminator(&self, text: &str) -> bool {
        self.terminators.iter().any(|terminator| terminator == text)
    }

    pub fn resolve_type_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.type_aliases
            .get(name)
            .map(String::as_str)
            .unwrap_or(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn empty_document_uses_defaults() {
        let config = SessionConfig::from_yaml_str("").expect("empty config");
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.markers.separator, "->");
        assert!(config.is_terminator("}"));
    }

    #[test]
    fn partial_document_overrides_selected_fields() {
        let config = SessionConfig::from_yaml_str(indoc! {"
            scoping: static
            terminators: [';']
            statements:
              while_loop: loop_stmt
            step_limit: 50
        "})
        .expect("valid config");

        assert_eq!(config.scoping, Scoping::Static);
        assert!(!config.is_terminator("}"));
        assert_eq!(config.statements.while_loop, "loop_stmt");
        assert_eq!(config.statements.assign, "assign_stmt");
        assert!(config.statements.is_loop("loop_stmt"));
        assert_eq!(config.step_limit, 50);
    }

    #[test]
    fn resolves_type_aliases() {
        let config = SessionConfig::default();
        assert_eq!(config.resolve_type_name("int"), "PRIM_INT");
        assert_eq!(config.resolve_type_name("meters"), "meters");
    }

    #[test]
    fn rejects_unknown_scoping_mode() {
        let err = SessionConfig::from_yaml_str("scoping: dynamic").expect_err("invalid mode");
        assert!(err.to_string().contains("Parsing session config"));
    }
}
