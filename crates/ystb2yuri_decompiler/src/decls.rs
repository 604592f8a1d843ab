//! Declaration files rebuilt from the variable table, for format versions
//! that keep global declarations out of the bytecode.

use crate::error::Result;
use crate::reconstruct::string_literal;
use ystb_core::ast::{DeclKind, Expr, Program, RefForm, Stmt, StmtKind, VarRef};
use ystb_core::command::SkipRule;
use ystb_core::expr::{decode_all, Instruction};
use ystb_core::nls::Encoding;
use ystb_core::tables::{Initializer, VariableTable};
use ystb_core::types::{Scope, ValueType};

/// Whether `version` reads global declarations from the variable table only.
pub fn needs_declaration_file(version: u32) -> bool {
    SkipRule::GlobalDefinition.omitted_at(version)
}

fn init_is_default(init: &Initializer) -> bool {
    match init {
        Initializer::Int(v) => *v == 0,
        Initializer::Float(v) => *v == 0.0,
        Initializer::Str(b) => b.is_empty(),
    }
}

fn init_expr(init: &Initializer, encoding: Encoding) -> Result<Option<Expr>> {
    if init_is_default(init) {
        return Ok(None);
    }
    Ok(Some(match init {
        Initializer::Int(v) => Expr::Int(*v),
        Initializer::Float(v) => Expr::Float(*v),
        Initializer::Str(bytes) => match decode_all(bytes)?.as_slice() {
            [Instruction::Str(text)] => string_literal(encoding, text),
            _ => Expr::Raw(encoding.decode(bytes).into_owned()),
        },
    }))
}

/// One declaration statement per non-builtin variable of `scope`, in index order.
pub fn declaration_program(vars: &VariableTable, scope: Scope, encoding: Encoding) -> Result<Program> {
    let mut body = Vec::new();
    for v in vars.vars.iter().filter(|v| v.scope == scope && !v.is_builtin()) {
        let form = if v.value_type == ValueType::Str {
            RefForm::Str
        } else {
            RefForm::Num
        };
        let var = VarRef::new(v.display_name(), form);
        let target = if v.dims.is_empty() {
            Expr::Var(var)
        } else {
            Expr::Index(var, v.dims.iter().map(|d| Expr::Int(i64::from(*d))).collect())
        };
        let kind = DeclKind {
            scope,
            modifier: v.modifier,
            value_type: v.value_type,
        };
        let init = init_expr(&v.init, encoding)?;
        let line = u32::try_from(body.len() + 1).unwrap_or(u32::MAX);
        body.push(Stmt::new(StmtKind::Declare { kind, target, init }, line));
    }
    log::debug!("synthesized {} {scope:?} declaration(s)", body.len());
    Ok(Program { body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Syntax;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use ystb_core::tables::Variable;
    use ystb_core::types::ScopeModifier;

    fn var(index: u16, scope: Scope, modifier: ScopeModifier, value_type: ValueType, init: Initializer) -> Variable {
        Variable {
            scope,
            modifier,
            file_id: 0,
            index,
            dims: Vec::new(),
            value_type,
            init,
            name: None,
        }
    }

    fn table() -> VariableTable {
        let title = Instruction::Str(b"\"hi\"".to_vec()).encode().unwrap();
        let mut arr = var(3, Scope::Global, ScopeModifier::Default, ValueType::Int, Initializer::Int(0));
        arr.dims = vec![2, 3];
        arr.name = Some("arr".into());
        let mut x = var(1, Scope::Global, ScopeModifier::Default, ValueType::Int, Initializer::Int(5));
        x.name = Some("x".into());
        VariableTable {
            vars: vec![
                var(0, Scope::Global, ScopeModifier::BuiltinEngine, ValueType::Int, Initializer::Int(7)),
                x,
                var(2, Scope::Global, ScopeModifier::Default, ValueType::Str, Initializer::Str(title)),
                arr,
                var(4, Scope::Global, ScopeModifier::AltGroup2, ValueType::Float, Initializer::Float(0.5)),
                var(5, Scope::ScriptFile, ScopeModifier::Default, ValueType::Int, Initializer::Int(1)),
                var(6, Scope::FunctionGroup, ScopeModifier::Default, ValueType::Str, Initializer::Str(Vec::new())),
            ],
        }
    }

    #[test]
    fn globals_in_both_dialects() {
        let p = declaration_program(&table(), Scope::Global, Encoding::Utf8).unwrap();
        assert_eq!(
            Syntax::Yuri.render(&p),
            indoc! {r#"
                G_INT[x.N] = 5
                G_STR[gStr2.S] = "hi"
                G_INT[arr.N(2, 3)]
                G_FLT2[g2Flt4.N] = 0.5
            "#}
        );
        assert_eq!(
            Syntax::Yuris.render(&p),
            indoc! {r#"
                G_INT[@x=5]
                G_STR[$gStr2="hi"]
                G_INT[@arr(2, 3)]
                G_FLT2[@g2Flt4=0.5]
            "#}
        );
    }

    #[test]
    fn group_variables() {
        let p = declaration_program(&table(), Scope::FunctionGroup, Encoding::Utf8).unwrap();
        assert_eq!(Syntax::Yuri.render(&p), "F_STR[fStr6.S]\n");
    }

    #[test]
    fn versions_without_bytecode_declarations() {
        assert!(needs_declaration_file(300));
        assert!(needs_declaration_file(290));
        assert!(!needs_declaration_file(250));
        assert!(!needs_declaration_file(289));
    }
}
