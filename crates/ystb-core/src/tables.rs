//! In-memory forms of the engine's variable table, label table and script list.

use crate::types::{Scope, ScopeModifier, ValueType};
use serde::{Deserialize, Serialize};

/// Constant initial value of a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Initializer {
    Int(i64),
    Float(f64),
    /// Encoded string-literal instruction bytes; empty for the default.
    Str(Vec<u8>),
}

impl Initializer {
    pub fn default_for(ty: ValueType) -> Self {
        match ty {
            ValueType::Float => Initializer::Float(0.0),
            ValueType::Str => Initializer::Str(Vec::new()),
            _ => Initializer::Int(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub scope: Scope,
    pub modifier: ScopeModifier,
    pub file_id: u16,
    pub index: u16,
    #[serde(default)]
    pub dims: Vec<u32>,
    pub value_type: ValueType,
    pub init: Initializer,
    /// Source name; not part of the engine's table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Variable {
    pub fn is_builtin(&self) -> bool {
        self.modifier == ScopeModifier::BuiltinEngine
    }

    /// Name used when rendering a reference to this variable.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if self.is_builtin() {
            return format!("__Sys{}", self.index);
        }
        format!(
            "{}{}{}{}",
            self.scope.prefix_char(),
            self.modifier.bank_suffix(),
            self.value_type.short_name(),
            self.index
        )
    }
}

/// Variables indexed by their final index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableTable {
    pub vars: Vec<Variable>,
}

impl VariableTable {
    pub fn get(&self, index: u16) -> Option<&Variable> {
        self.vars.get(index as usize).filter(|v| v.index == index)
    }

    pub fn builtins(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter().filter(|v| v.is_builtin())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    /// Command index from 300 on, command-stream byte offset before.
    pub position: u32,
    pub file_id: u16,
    pub if_depth: u16,
    pub loop_depth: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptDescriptor {
    pub id: u16,
    pub path: String,
    /// Negative for pure-declaration files.
    pub var_count: i32,
    pub label_count: u32,
    pub text_count: u32,
}

impl ScriptDescriptor {
    pub fn is_declaration_file(&self) -> bool {
        self.var_count < 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(scope: Scope, modifier: ScopeModifier, ty: ValueType, index: u16) -> Variable {
        Variable {
            scope,
            modifier,
            file_id: 0,
            index,
            dims: vec![],
            value_type: ty,
            init: Initializer::default_for(ty),
            name: None,
        }
    }

    #[test]
    fn synthesized_names() {
        assert_eq!(
            var(Scope::Global, ScopeModifier::BuiltinEngine, ValueType::Int, 12).display_name(),
            "__Sys12"
        );
        assert_eq!(
            var(Scope::Global, ScopeModifier::AltGroup2, ValueType::Str, 1003).display_name(),
            "g2Str1003"
        );
        assert_eq!(
            var(Scope::Local, ScopeModifier::Default, ValueType::Float, 1010).display_name(),
            "lFlt1010"
        );
        let mut named = var(Scope::ScriptFile, ScopeModifier::Default, ValueType::Int, 5);
        named.name = Some("count".into());
        assert_eq!(named.display_name(), "count");
    }

    #[test]
    fn lookup_checks_index() {
        let table = VariableTable {
            vars: vec![
                var(Scope::Global, ScopeModifier::BuiltinEngine, ValueType::Int, 0),
                var(Scope::Global, ScopeModifier::Default, ValueType::Int, 7),
            ],
        };
        assert!(table.get(0).is_some());
        assert!(table.get(1).is_none());
        assert_eq!(table.builtins().count(), 1);
    }
}
