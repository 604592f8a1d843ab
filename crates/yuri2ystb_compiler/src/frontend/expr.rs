//! Type checking and postfix lowering of expressions.

use super::FileCompiler;
use crate::error::ErrorKind;
use ystb_core::ast::{CastKind, Expr, RefForm, VarRef};
use ystb_core::expr::{quote_literal, BinaryOp, Instruction, RefMode};
use ystb_core::types::{ValueType, V300};

type Res<T> = Result<T, ErrorKind>;

fn mismatch(msg: impl Into<String>) -> ErrorKind {
    ErrorKind::TypeMismatch(msg.into())
}

impl FileCompiler<'_> {
    /// Lower `e` into `out`, returning its static type.
    pub(super) fn expr(&mut self, e: &Expr, out: &mut Vec<Instruction>) -> Res<ValueType> {
        match e {
            Expr::Int(v) => {
                out.push(Instruction::int(*v));
                Ok(ValueType::Int)
            }
            Expr::Float(v) => {
                out.push(Instruction::Float(*v));
                Ok(ValueType::Float)
            }
            Expr::Str(s) => {
                out.push(Instruction::Str(self.env.encoding.encode(&quote_literal(s))?));
                Ok(ValueType::Str)
            }
            Expr::Raw(s) => {
                out.push(Instruction::Str(self.env.encoding.encode(s)?));
                Ok(ValueType::Str)
            }
            // Stands in for nothing; the engine reads it as zero.
            Expr::Empty => Ok(ValueType::Int),
            Expr::Var(v) => self.var_ref(v, RefMode::Value, out),
            Expr::Array(v) => self.var_ref(v, RefMode::ArrayRef, out),
            Expr::Index(v, idx) if idx.is_empty() => self.var_ref(v, RefMode::ArrayRef, out),
            Expr::Index(v, idx) => {
                let ty = self.var_ref(v, RefMode::IndexBegin, out)?;
                for i in idx {
                    let it = self.expr(i, out)?;
                    if it != ValueType::Int {
                        return Err(ErrorKind::NonIntegerIndex(format!("{it} index into `{}`", v.name)));
                    }
                    out.push(Instruction::Nop);
                }
                if let Some(last) = out.last_mut() {
                    *last = Instruction::IndexEnd;
                }
                Ok(ty)
            }
            Expr::Neg(x) => {
                let ty = self.expr(x, out)?;
                if ty == ValueType::Str {
                    return Err(mismatch("negation of a string"));
                }
                out.push(Instruction::Neg);
                Ok(ty)
            }
            Expr::Cast(kind, x) => {
                let ty = self.expr(x, out)?;
                match kind {
                    CastKind::ToStr if ty == ValueType::Str => Err(mismatch("str() of a string")),
                    CastKind::ToInt if ty != ValueType::Str => Err(mismatch(format!("int() of a {ty}"))),
                    CastKind::ToStr => {
                        out.push(Instruction::ToStr);
                        Ok(ValueType::Str)
                    }
                    CastKind::ToInt => {
                        out.push(Instruction::ToInt);
                        Ok(ValueType::Int)
                    }
                }
            }
            Expr::Binary(op, l, r) => {
                let lt = self.expr(l, out)?;
                let rt = self.expr(r, out)?;
                out.push(Instruction::Binary(*op));
                binary_type(*op, lt, rt)
            }
        }
    }

    fn var_ref(&mut self, v: &VarRef, mode: RefMode, out: &mut Vec<Instruction>) -> Res<ValueType> {
        let (ty, index) = self.resolve(&v.name)?;
        match v.form {
            RefForm::StrAddress if self.env.version < V300 => {
                return Err(mismatch(format!("`{}.AS` needs format version 300 or later", v.name)))
            }
            RefForm::StrOfNum if self.env.version >= V300 => {
                return Err(mismatch(format!("`{}.SN` is only valid before format version 300", v.name)))
            }
            _ => {}
        }
        if v.form.wants_string_var() != (ty == ValueType::Str) {
            return Err(mismatch(format!("`{}` is a {ty} variable, referenced as .{}", v.name, v.form.suffix())));
        }
        out.push(Instruction::Var {
            mode,
            qualifier: v.form.qualifier(),
            index,
        });
        Ok(v.form.result_type(ty))
    }
}

fn binary_type(op: BinaryOp, lt: ValueType, rt: ValueType) -> Res<ValueType> {
    use ValueType::*;
    if op.is_logical() {
        for t in [lt, rt] {
            if !matches!(t, Int | Unknown) {
                return Err(mismatch(format!("{t} operand of {op:?}")));
            }
        }
        return Ok(Int);
    }
    if (lt == Str) != (rt == Str) {
        return Err(mismatch(format!("{op:?} between {lt} and {rt}")));
    }
    if op.is_comparison() {
        return Ok(Int);
    }
    Ok(match (lt, rt) {
        (Str, Str) => Str,
        (Float, _) | (_, Float) => Float,
        _ => Int,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_typing() {
        use ValueType::*;
        assert_eq!(binary_type(BinaryOp::Add, Int, Float), Ok(Float));
        assert_eq!(binary_type(BinaryOp::Add, Str, Str), Ok(Str));
        assert_eq!(binary_type(BinaryOp::Eq, Str, Str), Ok(Int));
        assert_eq!(binary_type(BinaryOp::Lt, Float, Int), Ok(Int));
        assert!(binary_type(BinaryOp::Add, Str, Int).is_err());
        assert!(binary_type(BinaryOp::Eq, Int, Str).is_err());
        assert!(binary_type(BinaryOp::And, Float, Int).is_err());
        assert!(binary_type(BinaryOp::Or, Str, Str).is_err());
        assert_eq!(binary_type(BinaryOp::BitAnd, Int, Int), Ok(Int));
    }
}
