//! The block-structured `yuri` dialect, readable back by the compiler.

use super::{expr, Dialect};
use std::fmt::Write as _;
use ystb_core::ast::{Block, CastKind, Expr, Program, StmtKind, VarRef};
use ystb_core::expr::{quote_literal, unquote_literal, BinaryOp};

const INDENT: &str = "    ";

pub struct Yuri;

impl Dialect for Yuri {
    fn variable(&self, v: &VarRef) -> String {
        format!("{}.{}", v.name, v.form.suffix())
    }

    // No verbatim literal syntax; fall back to the nearest quoted string.
    fn raw(&self, s: &str) -> String {
        match unquote_literal(s) {
            Some(inner) => quote_literal(&inner),
            None => quote_literal(s),
        }
    }

    fn empty(&self) -> &'static str {
        "none"
    }

    fn cast(&self, kind: CastKind) -> &'static str {
        match kind {
            CastKind::ToInt => "int",
            CastKind::ToStr => "str",
        }
    }

    fn logical(&self, op: BinaryOp) -> &'static str {
        if op == BinaryOp::And {
            "and"
        } else {
            "or"
        }
    }

    // `-1` reads back as a literal, so an explicit negation of one is kept as `-(1)`.
    fn group_negated(&self, operand: &Expr) -> bool {
        matches!(operand, Expr::Int(_) | Expr::Float(_))
    }
}

pub fn render(program: &Program) -> String {
    let mut out = String::new();
    block(&mut out, &program.body, 0);
    out
}

fn e(x: &Expr) -> String {
    expr(&Yuri, x)
}

fn block(out: &mut String, body: &Block, depth: usize) {
    let pad = INDENT.repeat(depth);
    for s in body {
        match &s.kind {
            StmtKind::Pass => {
                let _ = writeln!(out, "{pad}pass");
            }
            StmtKind::Label(name) => {
                let _ = writeln!(out, "{pad}label {}", quote_literal(name));
            }
            StmtKind::Word(text) => {
                let _ = writeln!(out, "{pad}{}", quote_literal(text));
            }
            StmtKind::ReturnCode(code) => {
                let _ = writeln!(out, "{pad}yield {code}");
            }
            StmtKind::Eval(x) => {
                let _ = writeln!(out, "{pad}_[{}]", e(x));
            }
            StmtKind::Let { target, op, value } => {
                let _ = writeln!(out, "{pad}{} {} {}", e(target), op.symbol(), e(value));
            }
            StmtKind::Declare { kind, target, init } => {
                let _ = write!(out, "{pad}{}[{}]", kind.command_name(), e(target));
                if let Some(init) = init {
                    let _ = write!(out, " = {}", e(init));
                }
                out.push('\n');
            }
            StmtKind::Call(call) => {
                let args: Vec<String> = call
                    .args
                    .iter()
                    .map(|a| match &a.value {
                        Some(v) => format!("{} = {}", a.name, e(v)),
                        None => format!("{} = _", a.name),
                    })
                    .collect();
                let head = format!("{}({})", call.command, args.join(", "));
                if call.augments.is_empty() {
                    let _ = writeln!(out, "{pad}{head}");
                } else {
                    let _ = writeln!(out, "{pad}with {head} do");
                    for aug in &call.augments {
                        let _ = writeln!(out, "{pad}{INDENT}{} {} {}", aug.name, aug.op.symbol(), e(&aug.value));
                    }
                    let _ = writeln!(out, "{pad}end");
                }
            }
            StmtKind::If { arms, else_arm, .. } => {
                for (i, arm) in arms.iter().enumerate() {
                    let kw = if i == 0 { "if" } else { "elseif" };
                    let _ = writeln!(out, "{pad}{kw} {} then", e(&arm.cond));
                    block(out, &arm.body, depth + 1);
                }
                if let Some(arm) = else_arm {
                    let _ = writeln!(out, "{pad}else");
                    block(out, &arm.body, depth + 1);
                }
                let _ = writeln!(out, "{pad}end");
            }
            StmtKind::While { cond, body, .. } => {
                let _ = writeln!(out, "{pad}while {} do", e(cond));
                block(out, body, depth + 1);
                let _ = writeln!(out, "{pad}end");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use ystb_core::ast::{Augment, Call, CallArg, DeclKind, ElseArm, IfArm, Line, RefForm, Stmt};
    use ystb_core::types::AssignOp;

    fn num(name: &str) -> Expr {
        Expr::var(name, RefForm::Num)
    }

    fn stmt(kind: StmtKind) -> Stmt {
        Stmt::new(kind, 1)
    }

    #[test]
    fn renders_nested_blocks() {
        let body = vec![
            stmt(StmtKind::Label("top".into())),
            stmt(StmtKind::Declare {
                kind: DeclKind::parse("INT").unwrap(),
                target: num("n"),
                init: Some(Expr::Int(3)),
            }),
            stmt(StmtKind::If {
                arms: vec![
                    IfArm {
                        cond: Expr::binary(BinaryOp::Gt, num("n"), Expr::Int(0)),
                        body: vec![stmt(StmtKind::Word("hi".into())), stmt(StmtKind::ReturnCode(1))],
                        line: Line(3),
                    },
                    IfArm {
                        cond: Expr::binary(BinaryOp::Eq, num("n"), Expr::Int(0)),
                        body: vec![stmt(StmtKind::Pass)],
                        line: Line(5),
                    },
                ],
                else_arm: Some(ElseArm {
                    body: vec![stmt(StmtKind::While {
                        cond: Expr::Int(-1),
                        body: vec![stmt(StmtKind::Let {
                            target: num("n"),
                            op: AssignOp::Sub,
                            value: Expr::Int(1),
                        })],
                        end_line: Line(9),
                    })],
                    line: Line(7),
                }),
                end_line: Line(10),
            }),
        ];
        let text = render(&Program { body });
        assert_eq!(
            text,
            indoc! {r#"
                label "top"
                INT[n.N] = 3
                if n.N > 0 then
                    "hi"
                    yield 1
                elseif n.N == 0 then
                    pass
                else
                    while -1 do
                        n.N -= 1
                    end
                end
            "#}
        );
    }

    #[test]
    fn renders_calls() {
        let plain = Call {
            command: "GOSUB".into(),
            args: vec![
                CallArg {
                    name: "LBL".into(),
                    value: Some(Expr::Str("sub".into())),
                },
                CallArg {
                    name: "PINT1".into(),
                    value: Some(Expr::Int(2)),
                },
            ],
            augments: Vec::new(),
        };
        let with = Call {
            command: "SE".into(),
            args: vec![
                CallArg {
                    name: "FILE".into(),
                    value: Some(Expr::Str("a.ogg".into())),
                },
                CallArg {
                    name: "VOL".into(),
                    value: None,
                },
            ],
            augments: vec![Augment {
                name: "VOL".into(),
                op: AssignOp::Add,
                value: Expr::Int(10),
            }],
        };
        let body = vec![
            stmt(StmtKind::Call(plain)),
            stmt(StmtKind::Call(with)),
            stmt(StmtKind::Eval(Expr::Cast(CastKind::ToStr, Box::new(num("n"))))),
        ];
        assert_eq!(
            render(&Program { body }),
            indoc! {r#"
                GOSUB(LBL = "sub", PINT1 = 2)
                with SE(FILE = "a.ogg", VOL = _) do
                    VOL += 10
                end
                _[str(n.N)]
            "#}
        );
    }

    #[test]
    fn raw_literals_fall_back_to_quoted_text() {
        assert_eq!(Yuri.raw("'abc'"), "\"'abc'\"");
        assert_eq!(Yuri.raw("\"a\\qb\""), "\"a\\\\qb\"");
    }
}
