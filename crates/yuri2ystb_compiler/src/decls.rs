//! Variable definitions of declaration files and constant folding of initializers.

use crate::error::{CompileError, ErrorKind};
use ystb_core::ast::{Expr, Program, RefForm, StmtKind};
use ystb_core::expr::{quote_literal, unquote_literal, BinaryOp, Instruction};
use ystb_core::nls::Encoding;
use ystb_core::tables::Initializer;
use ystb_core::types::{Scope, ScopeModifier, ValueType};

#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl ConstValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            ConstValue::Int(_) => ValueType::Int,
            ConstValue::Float(_) => ValueType::Float,
            ConstValue::Str(_) => ValueType::Str,
        }
    }

    /// Coerce to a declared type; floats accept integers.
    pub fn coerce(self, ty: ValueType) -> Option<ConstValue> {
        match (ty, self) {
            (ValueType::Int, v @ ConstValue::Int(_)) => Some(v),
            (ValueType::Float, ConstValue::Int(i)) => Some(ConstValue::Float(i as f64)),
            (ValueType::Float, v @ ConstValue::Float(_)) => Some(v),
            (ValueType::Str, v @ ConstValue::Str(_)) => Some(v),
            _ => None,
        }
    }

    pub fn default_for(ty: ValueType) -> Self {
        match ty {
            ValueType::Float => ConstValue::Float(0.0),
            ValueType::Str => ConstValue::Str(String::new()),
            _ => ConstValue::Int(0),
        }
    }

    pub fn to_initializer(&self, encoding: Encoding) -> ystb_core::Result<Initializer> {
        Ok(match self {
            ConstValue::Int(i) => Initializer::Int(*i),
            ConstValue::Float(f) => Initializer::Float(*f),
            ConstValue::Str(s) if s.is_empty() => Initializer::Str(Vec::new()),
            ConstValue::Str(s) => Initializer::Str(Instruction::Str(encoding.encode(&quote_literal(s))?).encode()?),
        })
    }
}

/// A global, group or script variable definition.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDef {
    pub name: String,
    pub modifier: ScopeModifier,
    pub dims: Vec<u32>,
    pub value_type: ValueType,
    pub init: ConstValue,
}

fn not_const(e: &Expr) -> ErrorKind {
    ErrorKind::MalformedExpression(format!("not a constant expression: {e:?}"))
}

fn overflow(op: BinaryOp) -> ErrorKind {
    ErrorKind::MalformedExpression(format!("constant {op:?} overflows"))
}

/// Evaluate an expression made only of literals.
pub fn fold(e: &Expr) -> Result<ConstValue, ErrorKind> {
    Ok(match e {
        Expr::Int(i) => ConstValue::Int(*i),
        Expr::Float(f) => ConstValue::Float(*f),
        Expr::Str(s) => ConstValue::Str(s.clone()),
        Expr::Raw(s) => ConstValue::Str(unquote_literal(s).unwrap_or_else(|| s.clone())),
        Expr::Neg(x) => match fold(x)? {
            ConstValue::Int(i) => ConstValue::Int(i.checked_neg().ok_or(ErrorKind::MalformedExpression(
                "constant negation overflows".into(),
            ))?),
            ConstValue::Float(f) => ConstValue::Float(-f),
            ConstValue::Str(_) => return Err(ErrorKind::TypeMismatch("negated string constant".into())),
        },
        Expr::Binary(op, l, r) => fold_binary(*op, fold(l)?, fold(r)?)?,
        _ => return Err(not_const(e)),
    })
}

fn fold_binary(op: BinaryOp, l: ConstValue, r: ConstValue) -> Result<ConstValue, ErrorKind> {
    use ConstValue::*;
    if op.is_comparison() || op.is_logical() {
        return Err(ErrorKind::MalformedExpression(format!("{op:?} in a constant expression")));
    }
    Ok(match (l, r) {
        (Int(a), Int(b)) => Int(match op {
            BinaryOp::Add => a.checked_add(b).ok_or_else(|| overflow(op))?,
            BinaryOp::Sub => a.checked_sub(b).ok_or_else(|| overflow(op))?,
            BinaryOp::Mul => a.checked_mul(b).ok_or_else(|| overflow(op))?,
            BinaryOp::Div | BinaryOp::Mod if b == 0 => {
                return Err(ErrorKind::MalformedExpression("constant division by zero".into()))
            }
            BinaryOp::Div => a.checked_div(b).ok_or_else(|| overflow(op))?,
            BinaryOp::Mod => a.checked_rem(b).ok_or_else(|| overflow(op))?,
            BinaryOp::BitAnd => a & b,
            BinaryOp::BitOr => a | b,
            BinaryOp::BitXor => a ^ b,
            _ => return Err(ErrorKind::MalformedExpression(format!("{op:?} on constants"))),
        }),
        (Str(a), Str(b)) if op == BinaryOp::Add => Str(a + &b),
        (Str(_), _) | (_, Str(_)) => {
            return Err(ErrorKind::TypeMismatch(format!("{op:?} on a string constant")))
        }
        (a, b) => {
            let as_f = |v: ConstValue| match v {
                Int(i) => i as f64,
                Float(f) => f,
                Str(_) => 0.0,
            };
            let (a, b) = (as_f(a), as_f(b));
            Float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Mod => a % b,
                _ => return Err(ErrorKind::TypeMismatch(format!("{op:?} on a float constant"))),
            })
        }
    })
}

pub fn fold_dims(idx: &[Expr]) -> Result<Vec<u32>, ErrorKind> {
    idx.iter()
        .map(|d| match fold(d)? {
            ConstValue::Int(n) => {
                u32::try_from(n).map_err(|_| ErrorKind::MalformedExpression(format!("bad array dimension {n}")))
            }
            other => Err(ErrorKind::NonIntegerIndex(format!("array dimension {other:?}"))),
        })
        .collect()
}

/// Split a declaration target into name and dimensions, checking its suffix.
pub fn decl_target(target: &Expr, ty: ValueType) -> Result<(String, Vec<u32>), ErrorKind> {
    let (var, dims) = match target {
        Expr::Var(v) => (v, Vec::new()),
        Expr::Index(v, idx) => (v, fold_dims(idx)?),
        other => {
            return Err(ErrorKind::MalformedExpression(format!(
                "declaration target must be a variable: {other:?}"
            )))
        }
    };
    let want = if ty == ValueType::Str { RefForm::Str } else { RefForm::Num };
    if var.form != want {
        return Err(ErrorKind::TypeMismatch(format!(
            "`{}` declared {ty} but referenced as .{}",
            var.name,
            var.form.suffix()
        )));
    }
    Ok((var.name.clone(), dims))
}

/// Fold an initializer and check it against the declared type.
pub fn fold_init(init: Option<&Expr>, ty: ValueType) -> Result<ConstValue, ErrorKind> {
    let Some(e) = init else {
        return Ok(ConstValue::default_for(ty));
    };
    let v = fold(e)?;
    let found = v.value_type();
    v.coerce(ty)
        .ok_or_else(|| ErrorKind::TypeMismatch(format!("{ty} variable initialized with a {found} constant")))
}

/// Read the definitions of a `global.yuri` (`Scope::Global`) or
/// `global_f.yuri` (`Scope::FunctionGroup`) file.
pub fn collect(program: &Program, scope: Scope, file: &str) -> Result<Vec<VarDef>, CompileError> {
    let mut out = Vec::new();
    for stmt in &program.body {
        let err = |kind: ErrorKind| CompileError::new(file, stmt.line.0, kind);
        match &stmt.kind {
            StmtKind::Pass => {}
            StmtKind::Call(c) if c.command == "END" && c.args.is_empty() => {}
            StmtKind::Declare { kind, target, init } => {
                if kind.scope != scope {
                    return Err(err(ErrorKind::ScopeViolation(format!(
                        "{} in a {:?} declaration file",
                        kind.command_name(),
                        scope
                    ))));
                }
                let (name, dims) = decl_target(target, kind.value_type).map_err(err)?;
                let init = fold_init(init.as_ref(), kind.value_type).map_err(err)?;
                out.push(VarDef {
                    name,
                    modifier: kind.modifier,
                    dims,
                    value_type: kind.value_type,
                    init,
                });
            }
            _ => {
                return Err(err(ErrorKind::ScopeViolation(
                    "only declarations are allowed in a declaration file".into(),
                )))
            }
        }
    }
    Ok(out)
}
