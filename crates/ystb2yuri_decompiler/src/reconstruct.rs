//! Rebuilds the structured program tree from a disassembled command stream.
//!
//! Expressions are replayed on an operand stack; `IF`/`ELSE`/`IFEND` and
//! `LOOP`/`LOOPEND` are folded back into nested blocks with a frame stack.
//! Labels are re-inserted in front of the command they point at.

use crate::error::{DecompileError, Result};
use std::collections::{BTreeMap, HashMap};
use ystb_core::ast::{
    Augment, Block, Call, CallArg, CastKind, DeclKind, ElseArm, Expr, IfArm, Line, Program, RefForm, Stmt, StmtKind,
    VarRef,
};
use ystb_core::catalog::{CommandCatalog, CommandCodes};
use ystb_core::command::{ArgPayload, Argument, Command};
use ystb_core::disasm::{disassemble, Script};
use ystb_core::expr::{decode_all, quote_literal, unquote_literal, Instruction, IntWidth, RefMode};
use ystb_core::nls::Encoding;
use ystb_core::tables::{Label, VariableTable};
use ystb_core::types::{AssignOp, Scope, TypeQualifier, ValueType, V300};
use ystb_core::ystb::OpenOptions;

/// A string literal as written in the bytecode. Canonically quoted text
/// becomes [`Expr::Str`]; anything else is kept verbatim.
pub(crate) fn string_literal(encoding: Encoding, bytes: &[u8]) -> Expr {
    let text = encoding.decode(bytes);
    match unquote_literal(&text) {
        Some(s) if quote_literal(&s) == text => Expr::Str(s),
        _ => Expr::Raw(text.into_owned()),
    }
}

enum Slot {
    /// Start of an indexed reference.
    Marker,
    Node(Expr),
}

/// Branch whose statements are being collected in an `If` frame.
enum Branch {
    Arm(Expr, u32),
    Else(u32),
}

enum Frame {
    Root(Block),
    If {
        arms: Vec<IfArm>,
        open: Branch,
        body: Block,
        line: u32,
    },
    While {
        cond: Expr,
        body: Block,
        line: u32,
    },
}

impl Frame {
    fn body(&mut self) -> &mut Block {
        match self {
            Frame::Root(body) | Frame::If { body, .. } | Frame::While { body, .. } => body,
        }
    }
}

/// An empty branch still needs a statement.
fn close_block(body: &mut Block, line: u32) {
    if body.is_empty() {
        body.push(Stmt::new(StmtKind::Pass, line));
    }
}

/// Per-file state: locals are only known once their declaration is seen.
struct FileState {
    version: u32,
    index: usize,
    locals: HashMap<u16, (String, ValueType)>,
    frames: Vec<Frame>,
}

impl FileState {
    fn push(&mut self, stmt: Stmt) {
        if let Some(frame) = self.frames.last_mut() {
            frame.body().push(stmt);
        }
    }

    fn pop_frame(&mut self, want: impl Fn(&Frame) -> bool) -> Option<Frame> {
        match self.frames.last() {
            Some(f) if want(f) => self.frames.pop(),
            _ => None,
        }
    }

    fn unbalanced(&self, reason: impl Into<String>) -> DecompileError {
        DecompileError::UnbalancedControl {
            index: self.index,
            reason: reason.into(),
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> DecompileError {
        DecompileError::MalformedExpression {
            index: self.index,
            reason: reason.into(),
        }
    }
}

pub struct Decompiler<'a> {
    catalog: &'a CommandCatalog,
    codes: CommandCodes,
    vars: &'a VariableTable,
    labels: &'a [Label],
    encoding: Encoding,
    local_names: HashMap<u16, String>,
}

impl<'a> Decompiler<'a> {
    pub fn new(catalog: &'a CommandCatalog, vars: &'a VariableTable, labels: &'a [Label], encoding: Encoding) -> Self {
        Self {
            catalog,
            codes: catalog.codes(),
            vars,
            labels,
            encoding,
            local_names: HashMap::new(),
        }
    }

    /// Names for local variable indices. Locals without one get a
    /// synthesized name such as `lInt1042`.
    pub fn with_local_names(mut self, names: impl IntoIterator<Item = (u16, String)>) -> Self {
        self.local_names.extend(names);
        self
    }

    /// Open, disassemble and rebuild one sealed script.
    pub fn decompile_bytes(&self, file_id: u16, data: &[u8], opts: &OpenOptions) -> Result<Program> {
        let script = disassemble(data, opts, self.catalog, self.encoding)?;
        self.decompile(file_id, &script)
    }

    /// Rebuild the program of script `file_id`.
    pub fn decompile(&self, file_id: u16, script: &Script) -> Result<Program> {
        let mut st = FileState {
            version: script.version,
            index: 0,
            locals: HashMap::new(),
            frames: vec![Frame::Root(Vec::new())],
        };
        let mut labels: BTreeMap<u32, Vec<&str>> = BTreeMap::new();
        for l in self.labels.iter().filter(|l| l.file_id == file_id) {
            labels.entry(l.position).or_default().push(&l.name);
        }

        for (i, cmd) in script.commands.iter().enumerate() {
            st.index = i;
            let pos = if st.version >= V300 {
                cmd.placement.index
            } else {
                cmd.placement.offset
            };
            for name in labels.remove(&pos).unwrap_or_default() {
                st.push(Stmt::new(StmtKind::Label(name.to_string()), cmd.line));
            }
            self.command(&mut st, cmd)?;
        }

        if st.frames.len() != 1 {
            return Err(st.unbalanced("block left open at end of script"));
        }
        let last_line = script.commands.last().map_or(0, |c| c.line);
        for name in labels.into_values().flatten() {
            log::debug!("script {file_id}: label {name} points past the last command");
            st.push(Stmt::new(StmtKind::Label(name.to_string()), last_line));
        }
        let body = match st.frames.pop() {
            Some(Frame::Root(body)) => body,
            _ => return Err(st.unbalanced("block left open at end of script")),
        };
        log::debug!(
            "script {file_id}: {} command(s), {} top-level statement(s)",
            script.commands.len(),
            body.len()
        );
        Ok(Program { body })
    }

    fn command(&self, st: &mut FileState, cmd: &Command) -> Result<()> {
        let code = cmd.code;
        let line = cmd.line;
        let name = self.catalog.name_of(code).ok_or(DecompileError::UnknownCommand(code))?;
        let c = &self.codes;
        let nargs = cmd.args.len();

        if CommandCodes::is(code, c.if_) {
            let cond = self.arg_expr(st, cmd, 0)?;
            st.frames.push(Frame::If {
                arms: Vec::new(),
                open: Branch::Arm(cond, line),
                body: Vec::new(),
                line,
            });
        } else if CommandCodes::is(code, c.else_) {
            let next = match nargs {
                0 => Branch::Else(line),
                3 => Branch::Arm(self.arg_expr(st, cmd, 0)?, line),
                n => return Err(st.unbalanced(format!("ELSE with {n} argument(s)"))),
            };
            let outside = st.unbalanced("ELSE outside an IF");
            match st.frames.last_mut() {
                Some(Frame::If { arms, open, body, .. }) if matches!(open, Branch::Arm(..)) => {
                    close_block(body, line);
                    let done = std::mem::replace(open, next);
                    if let Branch::Arm(cond, arm_line) = done {
                        arms.push(IfArm {
                            cond,
                            body: std::mem::take(body),
                            line: Line(arm_line),
                        });
                    }
                }
                _ => return Err(outside),
            }
        } else if CommandCodes::is(code, c.ifblend) {
            // Implied by the ELSE that follows.
        } else if CommandCodes::is(code, c.ifend) {
            let Some(Frame::If {
                mut arms,
                open,
                mut body,
                line: head,
            }) = st.pop_frame(|f| matches!(f, Frame::If { .. }))
            else {
                return Err(st.unbalanced("IFEND without an IF"));
            };
            close_block(&mut body, line);
            let else_arm = match open {
                Branch::Arm(cond, arm_line) => {
                    arms.push(IfArm {
                        cond,
                        body,
                        line: Line(arm_line),
                    });
                    None
                }
                Branch::Else(else_line) => Some(ElseArm {
                    body,
                    line: Line(else_line),
                }),
            };
            st.push(Stmt::new(
                StmtKind::If {
                    arms,
                    else_arm,
                    end_line: Line(line),
                },
                head,
            ));
        } else if CommandCodes::is(code, c.loop_) {
            let cond = self.arg_expr(st, cmd, 0)?;
            st.frames.push(Frame::While {
                cond,
                body: Vec::new(),
                line,
            });
        } else if CommandCodes::is(code, c.loopend) {
            let Some(Frame::While {
                cond,
                mut body,
                line: head,
            }) = st.pop_frame(|f| matches!(f, Frame::While { .. }))
            else {
                return Err(st.unbalanced("LOOPEND without a LOOP"));
            };
            close_block(&mut body, line);
            st.push(Stmt::new(
                StmtKind::While {
                    cond,
                    body,
                    end_line: Line(line),
                },
                head,
            ));
        } else if CommandCodes::is(code, c.let_) && nargs == 2 {
            let target = self.arg_expr(st, cmd, 0)?;
            let value = self.arg_expr(st, cmd, 1)?;
            let op = cmd.args[0].assign;
            st.push(Stmt::new(StmtKind::Let { target, op, value }, line));
        } else if CommandCodes::is(code, c.eval) && nargs == 1 {
            let e = self.arg_expr(st, cmd, 0)?;
            st.push(Stmt::new(StmtKind::Eval(e), line));
        } else if CommandCodes::is(code, c.word) {
            let text = match cmd.args.first().map(|a| &a.payload) {
                Some(ArgPayload::Text(t)) => t.clone(),
                _ => return Err(st.malformed("WORD without text")),
            };
            st.push(Stmt::new(StmtKind::Word(text), line));
        } else if CommandCodes::is(code, c.returncode) {
            let value = match cmd.args.first().map(|a| &a.payload) {
                Some(ArgPayload::Value(v)) => *v,
                _ => return Err(st.malformed("RETURNCODE without a value")),
            };
            st.push(Stmt::new(StmtKind::ReturnCode(value), line));
        } else if let Some(kind) = DeclKind::parse(name).filter(|_| nargs == 2) {
            let stmt = self.declare(st, cmd, kind)?;
            st.push(Stmt::new(stmt, line));
        } else {
            let call = self.call(st, cmd, name)?;
            st.push(Stmt::new(StmtKind::Call(call), line));
        }
        Ok(())
    }

    fn declare(&self, st: &mut FileState, cmd: &Command, kind: DeclKind) -> Result<StmtKind> {
        let lhs = cmd.args[0].instructions().unwrap_or(&[]);
        if kind.scope == Scope::Local {
            let Some(Instruction::Var { index, .. }) = lhs.first() else {
                return Err(st.malformed("declaration without a target variable"));
            };
            let name = self
                .local_names
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("l{}{}", kind.value_type.short_name(), index));
            st.locals.insert(*index, (name, kind.value_type));
        }
        let target = self.arg_expr(st, cmd, 0)?;
        let rhs = cmd.args[1].instructions().unwrap_or(&[]);
        let default_init = [Instruction::Int {
            width: IntWidth::W64,
            value: 0,
        }];
        let init = if rhs.is_empty() || rhs == default_init {
            None
        } else {
            Some(self.arg_expr(st, cmd, 1)?)
        };
        Ok(StmtKind::Declare { kind, target, init })
    }

    fn call(&self, st: &FileState, cmd: &Command, name: &str) -> Result<Call> {
        let mut args = Vec::with_capacity(cmd.args.len());
        let mut augments = Vec::new();
        for (i, arg) in cmd.args.iter().enumerate() {
            let arg_name = match self.catalog.arg_name(cmd.code, arg.id) {
                Some("#") => "LBL".to_string(),
                Some(n) => n.to_string(),
                None => {
                    log::warn!("{name}: unknown argument id {}", arg.id);
                    format!("ARG{}", arg.id)
                }
            };
            let value = self.arg_expr(st, cmd, i)?;
            if arg.assign == AssignOp::Assign {
                args.push(CallArg {
                    name: arg_name,
                    value: Some(value),
                });
            } else {
                args.push(CallArg {
                    name: arg_name.clone(),
                    value: None,
                });
                augments.push(Augment {
                    name: arg_name,
                    op: arg.assign,
                    value,
                });
            }
        }
        Ok(Call {
            command: name.to_string(),
            args,
            augments,
        })
    }

    fn arg_expr(&self, st: &FileState, cmd: &Command, i: usize) -> Result<Expr> {
        let Some(arg) = cmd.args.get(i) else {
            return Err(st.malformed(format!("missing argument {i}")));
        };
        self.argument(st, arg)
    }

    fn argument(&self, st: &FileState, arg: &Argument) -> Result<Expr> {
        match &arg.payload {
            ArgPayload::Expr(ins) => self.expr(st, ins),
            ArgPayload::Raw(bytes) => self.expr(st, &decode_all(bytes)?),
            ArgPayload::None => Ok(Expr::Empty),
            other => Err(st.malformed(format!("expected an expression, found {other:?}"))),
        }
    }

    /// Replay postfix instructions into a single tree.
    fn expr(&self, st: &FileState, ins: &[Instruction]) -> Result<Expr> {
        if ins.is_empty() {
            return Ok(Expr::Empty);
        }
        let mut stack: Vec<Slot> = Vec::new();
        let pop = |stack: &mut Vec<Slot>| -> Result<Expr> {
            match stack.pop() {
                Some(Slot::Node(e)) => Ok(e),
                Some(Slot::Marker) => Err(st.malformed("operator applied to an open index")),
                None => Err(st.malformed("operand stack underflow")),
            }
        };
        for i in ins {
            match i {
                Instruction::Int { value, .. } => stack.push(Slot::Node(Expr::Int(*value))),
                Instruction::Float(v) => stack.push(Slot::Node(Expr::Float(*v))),
                Instruction::Str(bytes) => stack.push(Slot::Node(string_literal(self.encoding, bytes))),
                Instruction::Var { mode, qualifier, index } => {
                    let var = self.variable(st, *qualifier, *index)?;
                    match mode {
                        RefMode::Value => stack.push(Slot::Node(Expr::Var(var))),
                        RefMode::ArrayRef => stack.push(Slot::Node(Expr::Array(var))),
                        RefMode::IndexBegin => {
                            stack.push(Slot::Marker);
                            stack.push(Slot::Node(Expr::Var(var)));
                        }
                    }
                }
                Instruction::Nop => {}
                Instruction::IndexEnd => {
                    let mut dims = Vec::new();
                    loop {
                        match stack.pop() {
                            Some(Slot::Node(e)) => dims.push(e),
                            Some(Slot::Marker) => break,
                            None => return Err(st.malformed("index end without a start")),
                        }
                    }
                    let base = dims.pop();
                    let Some(Expr::Var(var)) = base else {
                        return Err(st.malformed("indexed reference without a variable"));
                    };
                    if dims.is_empty() {
                        return Err(st.malformed(format!("no index for `{}`", var.name)));
                    }
                    dims.reverse();
                    stack.push(Slot::Node(Expr::Index(var, dims)));
                }
                Instruction::Neg => {
                    let x = pop(&mut stack)?;
                    stack.push(Slot::Node(Expr::Neg(Box::new(x))));
                }
                Instruction::ToInt | Instruction::ToStr => {
                    let x = pop(&mut stack)?;
                    let kind = if matches!(i, Instruction::ToInt) {
                        CastKind::ToInt
                    } else {
                        CastKind::ToStr
                    };
                    stack.push(Slot::Node(Expr::Cast(kind, Box::new(x))));
                }
                Instruction::Binary(op) => {
                    // A missing operand reads as nothing rather than an error.
                    let rhs = if stack.is_empty() { Expr::Empty } else { pop(&mut stack)? };
                    let lhs = if stack.is_empty() { Expr::Empty } else { pop(&mut stack)? };
                    stack.push(Slot::Node(Expr::binary(*op, lhs, rhs)));
                }
            }
        }
        match (stack.pop(), stack.is_empty()) {
            (Some(Slot::Node(e)), true) => Ok(e),
            _ => Err(st.malformed("expression does not reduce to one value")),
        }
    }

    fn variable(&self, st: &FileState, qualifier: TypeQualifier, index: u16) -> Result<VarRef> {
        let (name, ty) = match (self.vars.get(index), st.locals.get(&index)) {
            (Some(v), _) => (v.display_name(), v.value_type),
            (None, Some((name, ty))) => (name.clone(), *ty),
            (None, None) => {
                return Err(DecompileError::UndefinedVariable {
                    index: st.index,
                    var: index,
                })
            }
        };
        let string_var = ty == ValueType::Str;
        match RefForm::from_qualifier(qualifier, string_var, st.version) {
            Some(form) => Ok(VarRef::new(name, form)),
            None => Err(DecompileError::TypeMismatch {
                index: st.index,
                reason: format!("{ty} variable `{name}` referenced with qualifier {qualifier:?}"),
            }),
        }
    }
}
