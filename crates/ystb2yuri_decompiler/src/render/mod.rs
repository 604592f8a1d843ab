//! Source printers over the reconstructed tree.
//!
//! Both output dialects share the expression printer below and differ only in
//! the handful of spellings a [`Dialect`] supplies.

pub mod yuri;
pub mod yuris;

use ystb_core::ast::{CastKind, Expr, VarRef};
use ystb_core::expr::{quote_literal, BinaryOp};

pub trait Dialect {
    fn variable(&self, v: &VarRef) -> String;

    fn string(&self, s: &str) -> String {
        quote_literal(s)
    }

    fn raw(&self, s: &str) -> String {
        s.to_string()
    }

    /// Spelling of [`Expr::Empty`].
    fn empty(&self) -> &'static str;

    /// Function-like prefix of a cast, `int` in `int(x)`.
    fn cast(&self, kind: CastKind) -> &'static str;

    fn logical(&self, op: BinaryOp) -> &'static str;

    /// Extra grouping for the operand of a negation.
    fn group_negated(&self, _operand: &Expr) -> bool {
        false
    }
}

fn symbol<D: Dialect + ?Sized>(d: &D, op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::BitAnd => "&",
        BinaryOp::BitOr => "|",
        BinaryOp::BitXor => "^",
        BinaryOp::And | BinaryOp::Or => d.logical(op),
    }
}

fn operand<D: Dialect + ?Sized>(d: &D, e: &Expr, group: bool) -> String {
    if group {
        format!("({})", expr(d, e))
    } else {
        expr(d, e)
    }
}

/// Print `e` with the fewest parentheses that keep its shape: a left
/// operand is grouped when it binds looser than its operator, a right operand
/// when it binds no tighter.
pub fn expr<D: Dialect + ?Sized>(d: &D, e: &Expr) -> String {
    match e {
        Expr::Int(v) => v.to_string(),
        Expr::Float(v) => format!("{v:?}"),
        Expr::Str(s) => d.string(s),
        Expr::Raw(s) => d.raw(s),
        Expr::Empty => d.empty().to_string(),
        Expr::Var(v) => d.variable(v),
        Expr::Array(v) => format!("{}()", d.variable(v)),
        Expr::Index(v, idx) => {
            let idx: Vec<String> = idx.iter().map(|i| expr(d, i)).collect();
            format!("{}({})", d.variable(v), idx.join(", "))
        }
        Expr::Neg(x) => {
            let group = e.precedence() <= x.precedence() || d.group_negated(x);
            format!("-{}", operand(d, x, group))
        }
        Expr::Cast(kind, x) => format!("{}({})", d.cast(*kind), expr(d, x)),
        Expr::Binary(op, l, r) => {
            let p = e.precedence();
            format!(
                "{} {} {}",
                operand(d, l, p < l.precedence()),
                symbol(d, *op),
                operand(d, r, p <= r.precedence())
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::yuri::Yuri;
    use super::yuris::Yuris;
    use super::*;
    use ystb_core::ast::RefForm;

    fn num(name: &str) -> Expr {
        Expr::var(name, RefForm::Num)
    }

    fn bin(op: BinaryOp, l: Expr, r: Expr) -> Expr {
        Expr::binary(op, l, r)
    }

    #[test]
    fn groups_only_where_needed() {
        let e = bin(BinaryOp::Mul, bin(BinaryOp::Add, num("a"), num("b")), num("c"));
        assert_eq!(expr(&Yuri, &e), "(a.N + b.N) * c.N");

        let e = bin(BinaryOp::Add, num("a"), bin(BinaryOp::Mul, num("b"), num("c")));
        assert_eq!(expr(&Yuri, &e), "a.N + b.N * c.N");

        let e = bin(BinaryOp::Sub, bin(BinaryOp::Sub, num("a"), num("b")), num("c"));
        assert_eq!(expr(&Yuri, &e), "a.N - b.N - c.N");

        let e = bin(BinaryOp::Sub, num("a"), bin(BinaryOp::Sub, num("b"), num("c")));
        assert_eq!(expr(&Yuri, &e), "a.N - (b.N - c.N)");

        let e = bin(BinaryOp::Eq, bin(BinaryOp::Lt, num("a"), Expr::Int(1)), num("c"));
        assert_eq!(expr(&Yuri, &e), "a.N < 1 == c.N");
    }

    #[test]
    fn negation() {
        let e = Expr::Neg(Box::new(bin(BinaryOp::Add, num("a"), Expr::Int(1))));
        assert_eq!(expr(&Yuri, &e), "-(a.N + 1)");
        assert_eq!(expr(&Yuris, &e), "-(@a + 1)");

        let e = Expr::Neg(Box::new(Expr::Neg(Box::new(num("a")))));
        assert_eq!(expr(&Yuri, &e), "-(-a.N)");

        let e = bin(BinaryOp::Mul, Expr::Neg(Box::new(num("a"))), num("b"));
        assert_eq!(expr(&Yuri, &e), "-a.N * b.N");

        let e = Expr::Neg(Box::new(Expr::Int(1)));
        assert_eq!(expr(&Yuri, &e), "-(1)");
        assert_eq!(expr(&Yuris, &e), "-1");
        assert_eq!(expr(&Yuri, &Expr::Int(-1)), "-1");
    }

    #[test]
    fn dialect_spellings() {
        let e = bin(
            BinaryOp::And,
            Expr::Cast(CastKind::ToInt, Box::new(Expr::var("s", RefForm::Str))),
            Expr::Empty,
        );
        assert_eq!(expr(&Yuri, &e), "int(s.S) and none");
        assert_eq!(expr(&Yuris, &e), "@($s) && ");

        let e = Expr::Index(VarRef::new("arr", RefForm::Num), vec![num("i"), Expr::Int(2)]);
        assert_eq!(expr(&Yuri, &e), "arr.N(i.N, 2)");
        assert_eq!(expr(&Yuris, &e), "@arr(@i, 2)");
        assert_eq!(expr(&Yuris, &Expr::Array(VarRef::new("t", RefForm::StrAddress))), "&$t()");
        assert_eq!(expr(&Yuri, &Expr::Float(1.0)), "1.0");
        assert_eq!(expr(&Yuris, &Expr::Str("a\"b".into())), "\"a\\\"b\"");
    }
}
