//! The engine's own compact `yuris` dialect: bracketed commands, grouped
//! back onto their original source lines and joined with `;`.

use super::{expr, Dialect};
use ystb_core::ast::{Block, Call, CastKind, Expr, Program, RefForm, StmtKind, VarRef};
use ystb_core::expr::BinaryOp;

pub struct Yuris;

impl Dialect for Yuris {
    fn variable(&self, v: &VarRef) -> String {
        let sigil = match v.form {
            RefForm::Num => "@",
            RefForm::Str => "$",
            RefForm::IntAddress => "&@",
            RefForm::StrAddress => "&$",
            RefForm::StrOfNum => "$@",
        };
        format!("{sigil}{}", v.name)
    }

    fn empty(&self) -> &'static str {
        ""
    }

    fn cast(&self, kind: CastKind) -> &'static str {
        match kind {
            CastKind::ToInt => "@",
            CastKind::ToStr => "$",
        }
    }

    fn logical(&self, op: BinaryOp) -> &'static str {
        if op == BinaryOp::And {
            "&&"
        } else {
            "||"
        }
    }
}

/// A command's text, or something that only affects where later text goes.
enum Piece {
    Label(String),
    At { line: u32, what: At },
}

enum At {
    Text(String),
    /// `END[]`, dropped when it closes the script.
    BareEnd,
    Prep(u32),
}

fn e(x: &Expr) -> String {
    expr(&Yuris, x)
}

fn call_text(call: &Call) -> String {
    let args: Vec<String> = call
        .args
        .iter()
        .map(|a| {
            let name = if a.name == "LBL" { "#" } else { a.name.as_str() };
            match &a.value {
                Some(v) => format!("{name}={}", e(v)),
                None => match call.augments.iter().find(|g| g.name == a.name) {
                    Some(aug) => format!("{name}{}{}", aug.op.symbol(), e(&aug.value)),
                    None => format!("{name}="),
                },
            }
        })
        .collect();
    format!("{}[{}]", call.command, args.join(" "))
}

fn flatten(body: &Block, out: &mut Vec<Piece>) {
    let at = |line: u32, text: String| Piece::At {
        line,
        what: At::Text(text),
    };
    for s in body {
        let line = s.line.0;
        match &s.kind {
            StmtKind::Pass => {}
            StmtKind::Label(name) => out.push(Piece::Label(name.clone())),
            StmtKind::Word(text) => out.push(at(line, text.clone())),
            StmtKind::ReturnCode(code) => out.push(Piece::At {
                line,
                what: At::Prep(*code),
            }),
            StmtKind::Eval(x) => out.push(at(line, format!("_[{}]", e(x)))),
            StmtKind::Let { target, op, value } => out.push(at(line, format!("{}{}{}", e(target), op.symbol(), e(value)))),
            StmtKind::Declare { kind, target, init } => {
                let text = match init {
                    Some(init) => format!("{}[{}={}]", kind.command_name(), e(target), e(init)),
                    None => format!("{}[{}]", kind.command_name(), e(target)),
                };
                out.push(at(line, text));
            }
            StmtKind::Call(call) if call.command == "END" && call.args.is_empty() => out.push(Piece::At {
                line,
                what: At::BareEnd,
            }),
            StmtKind::Call(call) => out.push(at(line, call_text(call))),
            StmtKind::If {
                arms,
                else_arm,
                end_line,
            } => {
                for (i, arm) in arms.iter().enumerate() {
                    let kw = if i == 0 { "IF" } else { "ELSE" };
                    out.push(at(arm.line.0, format!("{kw}[{}]", e(&arm.cond))));
                    flatten(&arm.body, out);
                }
                if let Some(arm) = else_arm {
                    out.push(at(arm.line.0, "ELSE[]".to_string()));
                    flatten(&arm.body, out);
                }
                out.push(at(end_line.0, "IFEND[]".to_string()));
            }
            StmtKind::While { cond, body, end_line } => {
                let head = match cond {
                    Expr::Int(-1) => "LOOP[]".to_string(),
                    c => format!("LOOP[SET={}]", e(c)),
                };
                out.push(at(line, head));
                flatten(body, out);
                out.push(at(end_line.0, "LOOPEND[]".to_string()));
            }
        }
    }
}

/// Lay the program out on its source lines. Labels go in front of the next
/// command, or at the end of the previous line when the next command would
/// otherwise start a line of its own after a blank one.
pub fn render(program: &Program) -> String {
    let mut pieces = Vec::new();
    flatten(&program.body, &mut pieces);
    let last_at = pieces.iter().rposition(|p| matches!(p, Piece::At { .. }));

    let mut lines: Vec<Vec<String>> = Vec::new();
    let mut preps: Vec<String> = Vec::new();
    let mut labels: Vec<String> = Vec::new();
    let mut prev = 1u32;
    for (i, piece) in pieces.into_iter().enumerate() {
        let (line, what) = match piece {
            Piece::Label(name) => {
                labels.push(format!("#={name}"));
                continue;
            }
            Piece::At { line, what } => (line, what),
        };
        // Lines never run backwards in the output.
        let lno = line.max(prev);
        prev = lno;
        let cur = lno as usize - 1;
        if lines.len() <= cur {
            lines.resize_with(cur + 1, Vec::new);
        }
        lines[cur].append(&mut preps);
        if !labels.is_empty() {
            let here = cur == 0 || !lines[cur].is_empty() || !lines[cur - 1].is_empty();
            let dest = if here { cur } else { cur - 1 };
            lines[dest].append(&mut labels);
        }
        match what {
            At::Text(text) => lines[cur].push(text),
            At::BareEnd if Some(i) == last_at => {}
            At::BareEnd => lines[cur].push("END[]".to_string()),
            At::Prep(0) => {}
            At::Prep(code) => preps.push(format!("PREP[TEXTVAL={code}]")),
        }
    }
    if !preps.is_empty() || !labels.is_empty() {
        if lines.is_empty() {
            lines.push(Vec::new());
        }
        if let Some(last) = lines.last_mut() {
            last.append(&mut preps);
            last.append(&mut labels);
        }
    }

    let mut out = String::new();
    for line in &lines {
        out.push_str(&line.join(";"));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use ystb_core::ast::{Augment, CallArg, DeclKind, ElseArm, IfArm, Line, Stmt};
    use ystb_core::types::AssignOp;

    fn num(name: &str) -> Expr {
        Expr::var(name, RefForm::Num)
    }

    fn call(command: &str, args: Vec<(&str, Expr)>, line: u32) -> Stmt {
        Stmt::new(
            StmtKind::Call(Call {
                command: command.into(),
                args: args
                    .into_iter()
                    .map(|(n, v)| CallArg {
                        name: n.into(),
                        value: Some(v),
                    })
                    .collect(),
                augments: Vec::new(),
            }),
            line,
        )
    }

    #[test]
    fn groups_commands_by_line() {
        let body = vec![
            Stmt::new(
                StmtKind::Declare {
                    kind: DeclKind::parse("STR").unwrap(),
                    target: Expr::var("s", RefForm::Str),
                    init: Some(Expr::Str("x".into())),
                },
                1,
            ),
            Stmt::new(
                StmtKind::If {
                    arms: vec![
                        IfArm {
                            cond: Expr::binary(BinaryOp::Eq, num("n"), Expr::Int(1)),
                            body: vec![call("WAIT", vec![("TIME", Expr::Int(5))], 2)],
                            line: Line(2),
                        },
                        IfArm {
                            cond: Expr::binary(BinaryOp::And, num("n"), num("m")),
                            body: vec![Stmt::new(StmtKind::Pass, 3)],
                            line: Line(3),
                        },
                    ],
                    else_arm: Some(ElseArm {
                        body: vec![Stmt::new(
                            StmtKind::Let {
                                target: num("n"),
                                op: AssignOp::Add,
                                value: Expr::Int(1),
                            },
                            4,
                        )],
                        line: Line(4),
                    }),
                    end_line: Line(4),
                },
                2,
            ),
            Stmt::new(
                StmtKind::While {
                    cond: Expr::Int(-1),
                    body: vec![Stmt::new(StmtKind::Eval(Expr::Empty), 6)],
                    end_line: Line(7),
                },
                6,
            ),
            call("END", Vec::new(), 8),
        ];
        assert_eq!(
            render(&Program { body }),
            indoc! {r#"
                STR[$s="x"]
                IF[@n == 1];WAIT[TIME=5]
                ELSE[@n && @m]
                ELSE[];@n+=1;IFEND[]

                LOOP[];_[]
                LOOPEND[]

            "#}
        );
    }

    #[test]
    fn labels_preps_and_trailing_end() {
        let body = vec![
            Stmt::new(StmtKind::Label("start".into()), 1),
            Stmt::new(StmtKind::Word("hello".into()), 1),
            Stmt::new(StmtKind::ReturnCode(1), 1),
            Stmt::new(StmtKind::Word("again".into()), 2),
            Stmt::new(StmtKind::ReturnCode(0), 2),
            Stmt::new(StmtKind::Label("gap".into()), 4),
            Stmt::new(
                StmtKind::Call(Call {
                    command: "SE".into(),
                    args: vec![
                        CallArg {
                            name: "FILE".into(),
                            value: Some(Expr::Str("a".into())),
                        },
                        CallArg {
                            name: "VOL".into(),
                            value: None,
                        },
                    ],
                    augments: vec![Augment {
                        name: "VOL".into(),
                        op: AssignOp::Sub,
                        value: Expr::Int(5),
                    }],
                }),
                4,
            ),
            call("GOSUB", vec![("LBL", Expr::Str("start".into()))], 4),
            call("END", Vec::new(), 5),
            Stmt::new(StmtKind::Label("tail".into()), 5),
        ];
        assert_eq!(
            render(&Program { body }),
            indoc! {r#"
                #=start;hello
                PREP[TEXTVAL=1];again
                #=gap
                SE[FILE="a" VOL-=5];GOSUB[#="start"]
                #=tail
            "#}
        );
    }

    #[test]
    fn inner_end_is_kept() {
        let body = vec![call("END", Vec::new(), 1), call("WAIT", vec![("TIME", Expr::Int(1))], 2)];
        assert_eq!(render(&Program { body }), "END[]\nWAIT[TIME=1]\n");
    }
}
