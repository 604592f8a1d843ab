use super::lexer::{tokenize, Tok, Token};
use super::SyntaxError;
use ystb_core::ast::{
    Augment, Block, Call, CallArg, CastKind, DeclKind, ElseArm, Expr, IfArm, Line, Program, RefForm, Stmt,
    StmtKind, VarRef,
};
use ystb_core::expr::BinaryOp;
use ystb_core::types::AssignOp;

type Result<T> = std::result::Result<T, SyntaxError>;

const KEYWORDS: [&str; 16] = [
    "and", "or", "if", "then", "elseif", "else", "end", "while", "do", "with", "pass", "label", "yield",
    "none", "int", "str",
];

struct Parser {
    toks: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.toks[self.pos.min(self.toks.len() - 1)]
    }

    fn peek_at(&self, n: usize) -> &Tok {
        &self.toks[(self.pos + n).min(self.toks.len() - 1)].tok
    }

    fn next(&mut self) -> Token {
        let t = self.peek().clone();
        if self.pos < self.toks.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn err<T>(&self, message: impl Into<String>) -> Result<T> {
        Err(SyntaxError {
            line: self.peek().line,
            message: message.into(),
        })
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(&self.peek().tok, Tok::Punct(q) if *q == p)
    }

    fn is_word(&self, w: &str) -> bool {
        matches!(&self.peek().tok, Tok::Ident(s) if s == w)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        let hit = self.is_punct(p);
        if hit {
            self.next();
        }
        hit
    }

    fn expect_punct(&mut self, p: &str) -> Result<u32> {
        if self.is_punct(p) {
            Ok(self.next().line)
        } else {
            self.err(format!("expected `{p}`, found {}", describe(&self.peek().tok)))
        }
    }

    fn expect_word(&mut self, w: &str) -> Result<u32> {
        if self.is_word(w) {
            Ok(self.next().line)
        } else {
            self.err(format!("expected `{w}`, found {}", describe(&self.peek().tok)))
        }
    }

    fn ident(&mut self) -> Result<String> {
        match &self.peek().tok {
            Tok::Ident(s) if !KEYWORDS.contains(&s.as_str()) => {
                let s = s.clone();
                self.next();
                Ok(s)
            }
            other => self.err(format!("expected a name, found {}", describe(other))),
        }
    }

    fn block(&mut self, terminators: &[&str]) -> Result<Block> {
        let mut out = Vec::new();
        loop {
            match &self.peek().tok {
                Tok::Eof => return Ok(out),
                Tok::Ident(w) if terminators.contains(&w.as_str()) => return Ok(out),
                _ => out.push(self.stmt()?),
            }
        }
    }

    fn stmt(&mut self) -> Result<Stmt> {
        let line = self.peek().line;
        let kind = match self.peek().tok.clone() {
            Tok::Str(s) => {
                self.next();
                StmtKind::Word(s)
            }
            Tok::Ident(w) => match w.as_str() {
                "pass" => {
                    self.next();
                    StmtKind::Pass
                }
                "label" => {
                    self.next();
                    match self.next().tok {
                        Tok::Str(s) => StmtKind::Label(s),
                        other => return self.err(format!("expected a label name, found {}", describe(&other))),
                    }
                }
                "yield" => {
                    self.next();
                    match self.next().tok {
                        Tok::Int(n) => match u32::try_from(n) {
                            Ok(n) => StmtKind::ReturnCode(n),
                            Err(_) => return self.err(format!("return code {n} out of range")),
                        },
                        other => return self.err(format!("expected a return code, found {}", describe(&other))),
                    }
                }
                "if" => return self.if_stmt(),
                "while" => {
                    self.next();
                    let cond = self.expr()?;
                    self.expect_word("do")?;
                    let body = self.block(&["end"])?;
                    let end_line = self.expect_word("end")?;
                    StmtKind::While {
                        cond,
                        body,
                        end_line: Line(end_line),
                    }
                }
                "with" => self.with_stmt()?,
                _ => match self.peek_at(1) {
                    Tok::Punct("[") => self.bracket_stmt()?,
                    Tok::Punct("(") => {
                        let command = self.ident()?;
                        let args = self.call_args(false)?;
                        StmtKind::Call(Call {
                            command,
                            args,
                            augments: Vec::new(),
                        })
                    }
                    _ => {
                        let target = self.var_primary()?;
                        let op = match self.next().tok {
                            Tok::Punct(p) => AssignOp::from_symbol(p),
                            _ => None,
                        };
                        let Some(op) = op else {
                            return self.err("expected an assignment operator");
                        };
                        let value = self.expr()?;
                        StmtKind::Let { target, op, value }
                    }
                },
            },
            other => return self.err(format!("unexpected {}", describe(&other))),
        };
        Ok(Stmt::new(kind, line))
    }

    fn if_stmt(&mut self) -> Result<Stmt> {
        let line = self.expect_word("if")?;
        let mut arms = Vec::new();
        let cond = self.expr()?;
        self.expect_word("then")?;
        let body = self.block(&["elseif", "else", "end"])?;
        arms.push(IfArm {
            cond,
            body,
            line: Line(line),
        });
        while self.is_word("elseif") {
            let line = self.next().line;
            let cond = self.expr()?;
            self.expect_word("then")?;
            let body = self.block(&["elseif", "else", "end"])?;
            arms.push(IfArm {
                cond,
                body,
                line: Line(line),
            });
        }
        let else_arm = if self.is_word("else") {
            let line = self.next().line;
            let body = self.block(&["end"])?;
            Some(ElseArm { body, line: Line(line) })
        } else {
            None
        };
        let end_line = self.expect_word("end")?;
        Ok(Stmt::new(
            StmtKind::If {
                arms,
                else_arm,
                end_line: Line(end_line),
            },
            line,
        ))
    }

    fn with_stmt(&mut self) -> Result<StmtKind> {
        self.expect_word("with")?;
        let command = self.ident()?;
        let args = self.call_args(true)?;
        self.expect_word("do")?;
        let mut augments = Vec::new();
        while !self.is_word("end") {
            let name = self.ident()?;
            let op = match self.next().tok {
                Tok::Punct(p) => AssignOp::from_symbol(p).filter(|op| *op != AssignOp::Assign),
                _ => None,
            };
            let Some(op) = op else {
                return self.err(format!("`{name}` needs a compound assignment"));
            };
            let value = self.expr()?;
            augments.push(Augment { name, op, value });
        }
        self.expect_word("end")?;
        Ok(StmtKind::Call(Call {
            command,
            args,
            augments,
        }))
    }

    /// `_[expr]` or a declaration `INT[name.N] = init`.
    fn bracket_stmt(&mut self) -> Result<StmtKind> {
        let name = self.ident()?;
        self.expect_punct("[")?;
        if name == "_" {
            let e = self.expr()?;
            self.expect_punct("]")?;
            return Ok(StmtKind::Eval(e));
        }
        let Some(kind) = DeclKind::parse(&name) else {
            return self.err(format!("`{name}` is not a declaration command"));
        };
        let target = self.var_primary()?;
        self.expect_punct("]")?;
        let init = if self.eat_punct("=") { Some(self.expr()?) } else { None };
        Ok(StmtKind::Declare { kind, target, init })
    }

    fn call_args(&mut self, allow_placeholder: bool) -> Result<Vec<CallArg>> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        if self.eat_punct(")") {
            return Ok(args);
        }
        loop {
            let name = self.ident()?;
            self.expect_punct("=")?;
            let placeholder = self.is_word("_") && matches!(self.peek_at(1), Tok::Punct(",") | Tok::Punct(")"));
            let value = if placeholder {
                if !allow_placeholder {
                    return self.err(format!("placeholder for `{name}` outside a `with` block"));
                }
                self.next();
                None
            } else {
                Some(self.expr()?)
            };
            args.push(CallArg { name, value });
            if self.eat_punct(")") {
                return Ok(args);
            }
            self.expect_punct(",")?;
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        self.binary(BinaryOp::Or.precedence())
    }

    fn peek_binop(&self) -> Option<BinaryOp> {
        Some(match &self.peek().tok {
            Tok::Punct(p) => match *p {
                "*" => BinaryOp::Mul,
                "/" => BinaryOp::Div,
                "%" => BinaryOp::Mod,
                "+" => BinaryOp::Add,
                "-" => BinaryOp::Sub,
                "<" => BinaryOp::Lt,
                "<=" => BinaryOp::Le,
                ">" => BinaryOp::Gt,
                ">=" => BinaryOp::Ge,
                "==" => BinaryOp::Eq,
                "!=" => BinaryOp::Ne,
                "&" => BinaryOp::BitAnd,
                "^" => BinaryOp::BitXor,
                "|" => BinaryOp::BitOr,
                _ => return None,
            },
            Tok::Ident(w) if w == "and" => BinaryOp::And,
            Tok::Ident(w) if w == "or" => BinaryOp::Or,
            _ => return None,
        })
    }

    fn binary(&mut self, max: u8) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.peek_binop() {
            if op.precedence() > max {
                break;
            }
            self.next();
            let rhs = self.binary(op.precedence() - 1)?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat_punct("+") {
            return self.unary();
        }
        if self.eat_punct("-") {
            return match self.peek().tok.clone() {
                Tok::Int(n) => {
                    self.next();
                    self.int_literal(-n)
                }
                Tok::Float(f) => {
                    self.next();
                    Ok(Expr::Float(-f))
                }
                _ => Ok(Expr::Neg(Box::new(self.unary()?))),
            };
        }
        self.primary()
    }

    fn int_literal(&self, n: i128) -> Result<Expr> {
        match i64::try_from(n) {
            Ok(v) => Ok(Expr::Int(v)),
            Err(_) => self.err(format!("integer literal {n} does not fit in 64 bits")),
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.peek().tok.clone() {
            Tok::Int(n) => {
                self.next();
                self.int_literal(n)
            }
            Tok::Float(f) => {
                self.next();
                Ok(Expr::Float(f))
            }
            Tok::Str(s) => {
                self.next();
                Ok(Expr::Str(s))
            }
            Tok::Punct("(") => {
                self.next();
                let e = self.expr()?;
                self.expect_punct(")")?;
                Ok(e)
            }
            Tok::Ident(w) if w == "none" => {
                self.next();
                Ok(Expr::Empty)
            }
            Tok::Ident(w) if w == "int" || w == "str" => {
                self.next();
                self.expect_punct("(")?;
                let e = self.expr()?;
                self.expect_punct(")")?;
                let kind = if w == "int" { CastKind::ToInt } else { CastKind::ToStr };
                Ok(Expr::Cast(kind, Box::new(e)))
            }
            Tok::Ident(_) => self.var_primary(),
            other => self.err(format!("expected an expression, found {}", describe(&other))),
        }
    }

    /// `name.SFX`, `name.SFX()` or `name.SFX(i, ...)`.
    fn var_primary(&mut self) -> Result<Expr> {
        let name = self.ident()?;
        self.expect_punct(".")?;
        let form = match &self.peek().tok {
            Tok::Ident(s) => RefForm::from_suffix(s),
            _ => None,
        };
        let Some(form) = form else {
            return self.err(format!("`{name}` needs one of the suffixes N, S, AN, AS, SN"));
        };
        self.next();
        let var = VarRef { name, form };
        if !self.eat_punct("(") {
            return Ok(Expr::Var(var));
        }
        if self.eat_punct(")") {
            return Ok(Expr::Array(var));
        }
        let mut idx = vec![self.expr()?];
        while self.eat_punct(",") {
            idx.push(self.expr()?);
        }
        self.expect_punct(")")?;
        Ok(Expr::Index(var, idx))
    }
}

fn describe(t: &Tok) -> String {
    match t {
        Tok::Ident(s) => format!("`{s}`"),
        Tok::Int(n) => format!("`{n}`"),
        Tok::Float(f) => format!("`{f:?}`"),
        Tok::Str(_) => "a string".into(),
        Tok::Punct(p) => format!("`{p}`"),
        Tok::Eof => "end of file".into(),
    }
}

pub fn parse_program(src: &str) -> Result<Program> {
    let mut p = Parser {
        toks: tokenize(src)?,
        pos: 0,
    };
    let body = p.block(&[])?;
    if p.peek().tok != Tok::Eof {
        return p.err(format!("unexpected {}", describe(&p.peek().tok)));
    }
    Ok(Program { body })
}

/// Parse a single expression, for tests and tools.
pub fn parse_expr(src: &str) -> Result<Expr> {
    let mut p = Parser {
        toks: tokenize(src)?,
        pos: 0,
    };
    let e = p.expr()?;
    if p.peek().tok != Tok::Eof {
        return p.err(format!("trailing {}", describe(&p.peek().tok)));
    }
    Ok(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn num(name: &str) -> Expr {
        Expr::var(name, RefForm::Num)
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(
            parse_expr("a.N + b.N * 2 - 1").unwrap(),
            Expr::binary(
                BinaryOp::Sub,
                Expr::binary(BinaryOp::Add, num("a"), Expr::binary(BinaryOp::Mul, num("b"), Expr::Int(2))),
                Expr::Int(1)
            )
        );
        assert_eq!(
            parse_expr("a.N < 1 and b.N == 2 or c.N").unwrap(),
            Expr::binary(
                BinaryOp::Or,
                Expr::binary(
                    BinaryOp::And,
                    Expr::binary(BinaryOp::Lt, num("a"), Expr::Int(1)),
                    Expr::binary(BinaryOp::Eq, num("b"), Expr::Int(2))
                ),
                num("c")
            )
        );
        // relational binds tighter than bitwise in this table
        assert_eq!(
            parse_expr("a.N & b.N < 3").unwrap(),
            Expr::binary(BinaryOp::BitAnd, num("a"), Expr::binary(BinaryOp::Lt, num("b"), Expr::Int(3)))
        );
    }

    #[test]
    fn negative_literals_fold() {
        assert_eq!(parse_expr("-5").unwrap(), Expr::Int(-5));
        assert_eq!(parse_expr("-(5)").unwrap(), Expr::Neg(Box::new(Expr::Int(5))));
        assert_eq!(parse_expr("-a.N").unwrap(), Expr::Neg(Box::new(num("a"))));
        assert_eq!(parse_expr("+a.N").unwrap(), num("a"));
        assert_eq!(parse_expr("-9223372036854775808").unwrap(), Expr::Int(i64::MIN));
        assert!(parse_expr("9223372036854775808").is_err());
    }

    #[test]
    fn references_and_casts() {
        assert_eq!(
            parse_expr("arr.N(i.N, 2)").unwrap(),
            Expr::Index(VarRef::new("arr", RefForm::Num), vec![num("i"), Expr::Int(2)])
        );
        assert_eq!(parse_expr("arr.S()").unwrap(), Expr::Array(VarRef::new("arr", RefForm::Str)));
        assert_eq!(
            parse_expr("str(n.N) + s.S").unwrap(),
            Expr::binary(
                BinaryOp::Add,
                Expr::Cast(CastKind::ToStr, Box::new(num("n"))),
                Expr::var("s", RefForm::Str)
            )
        );
        assert_eq!(parse_expr("none").unwrap(), Expr::Empty);
        assert!(parse_expr("x.Q").is_err());
    }

    #[test]
    fn statements() {
        let src = indoc! {r#"
            -- header
            label "top"
            INT[n.N] = 3
            STR[s.S]
            n.N += 1
            "hello"
            yield 1
            _[n.N]
            SE(FILE = "a.ogg", VOL = 50)
            with SE(FILE = "b.ogg", VOL = _) do
                VOL -= 10
            end
        "#};
        let p = parse_program(src).unwrap();
        let kinds: Vec<StmtKind> = p.body.iter().map(|s| s.kind.clone()).collect();
        let lines: Vec<u32> = p.body.iter().map(|s| s.line.0).collect();
        assert_eq!(lines, vec![2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(kinds[0], StmtKind::Label("top".into()));
        assert_eq!(
            kinds[1],
            StmtKind::Declare {
                kind: DeclKind::parse("INT").unwrap(),
                target: num("n"),
                init: Some(Expr::Int(3)),
            }
        );
        assert_eq!(
            kinds[3],
            StmtKind::Let {
                target: num("n"),
                op: AssignOp::Add,
                value: Expr::Int(1)
            }
        );
        assert_eq!(kinds[5], StmtKind::ReturnCode(1));
        assert_eq!(
            kinds[8],
            StmtKind::Call(Call {
                command: "SE".into(),
                args: vec![
                    CallArg {
                        name: "FILE".into(),
                        value: Some(Expr::Str("b.ogg".into()))
                    },
                    CallArg {
                        name: "VOL".into(),
                        value: None
                    },
                ],
                augments: vec![Augment {
                    name: "VOL".into(),
                    op: AssignOp::Sub,
                    value: Expr::Int(10)
                }],
            })
        );
    }

    #[test]
    fn if_chain() {
        let src = indoc! {"
            if a.N then
                pass
            elseif b.N then
                x.N = 1
            else
                x.N = 2
            end
            while 1 do
                pass
            end
        "};
        let p = parse_program(src).unwrap();
        let StmtKind::If { arms, else_arm, end_line } = &p.body[0].kind else {
            panic!("not an if");
        };
        assert_eq!(arms.len(), 2);
        assert_eq!(arms[1].line.0, 3);
        assert_eq!(else_arm.as_ref().unwrap().line.0, 5);
        assert_eq!(end_line.0, 7);
        assert!(matches!(p.body[1].kind, StmtKind::While { .. }));
    }

    #[test]
    fn errors_carry_lines() {
        assert_eq!(parse_program("pass\nif a.N then\n").unwrap_err().line, 3);
        assert!(parse_program("SE(VOL = _)").is_err());
        assert!(parse_program("FOO[x.N]").is_err());
        assert!(parse_program("with SE(VOL = _) do VOL = 1 end").is_err());
    }
}
