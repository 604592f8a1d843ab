//! Per-file front end: lowers a program tree into commands and assembles them.
//!
//! Variables are handed provisional indices from [`USER_VAR_BASE`] upwards, one
//! per symbol. The assembler reports where each of those indices landed in the
//! expression data so the linker can patch in the final index later.

mod expr;

use crate::decls::{decl_target, fold_init, VarDef};
use crate::error::{CompileError, ErrorKind};
use crate::syntax::parse_program;
use std::collections::{HashMap, HashSet};
use ystb_core::asm::assemble_observed;
use ystb_core::ast::{Block, Call, DeclKind, ElseArm, Expr, IfArm, Program, Stmt, StmtKind};
use ystb_core::catalog::CommandCatalog;
use ystb_core::command::{ArgPayload, Argument, Command, CommandId, SkipRule};
use ystb_core::expr::{Instruction, IntWidth, VAR_INDEX_OFFSET};
use ystb_core::nls::Encoding;
use ystb_core::types::{Scope, ValueType, USER_VAR_BASE, V300};
use ystb_core::ystb::Segments;

type Res<T> = Result<T, ErrorKind>;

/// Read-only tables shared by every file of a build.
#[derive(Debug, Clone, Copy)]
pub struct Environment<'a> {
    pub catalog: &'a CommandCatalog,
    /// Engine variables by name.
    pub constants: &'a HashMap<String, (ValueType, u16)>,
    pub globals: &'a HashMap<String, ValueType>,
    /// Function-group variables visible from the file's directory.
    pub groups: &'a HashMap<String, ValueType>,
    pub version: u32,
    pub encoding: Encoding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Script,
    /// `global.yuri`
    GlobalDecl,
    /// `global_f.yuri`
    GroupDecl,
}

impl FileKind {
    fn allows(self, scope: Scope) -> bool {
        match self {
            FileKind::Script => matches!(scope, Scope::Local | Scope::ScriptFile),
            FileKind::GlobalDecl => scope == Scope::Global,
            FileKind::GroupDecl => scope == Scope::FunctionGroup,
        }
    }
}

/// A variable the file refers to, with every expression-data offset holding its index.
#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    /// Global or function-group variable, resolved by name at link time.
    External { name: String, offsets: Vec<usize> },
    Local {
        name: String,
        value_type: ValueType,
        offsets: Vec<usize>,
    },
    Script { def: VarDef, offsets: Vec<usize> },
}

impl Symbol {
    pub fn offsets(&self) -> &[usize] {
        match self {
            Symbol::External { offsets, .. } | Symbol::Local { offsets, .. } | Symbol::Script { offsets, .. } => {
                offsets
            }
        }
    }

    fn offsets_mut(&mut self) -> &mut Vec<usize> {
        match self {
            Symbol::External { offsets, .. } | Symbol::Local { offsets, .. } | Symbol::Script { offsets, .. } => {
                offsets
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelDef {
    pub name: String,
    /// Command index from 300 on, byte offset before.
    pub position: u32,
    pub if_depth: u16,
    pub loop_depth: u16,
}

/// Output of one file, ready for linking.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFile {
    /// Source path relative to the project root, `/`-separated.
    pub path: String,
    pub kind: FileKind,
    pub text_count: u32,
    pub script_var_count: u32,
    pub local_var_count: u32,
    pub labels: Vec<LabelDef>,
    pub symbols: Vec<Symbol>,
    /// Unpatched and unencrypted.
    pub segments: Segments,
}

impl CompiledFile {
    /// Directory part of [`CompiledFile::path`], the function-group key.
    pub fn dir(&self) -> &str {
        self.path.rsplit_once('/').map_or("", |(d, _)| d)
    }
}

struct PendingLabel {
    name: String,
    command: CommandId,
    if_depth: u16,
    loop_depth: u16,
}

pub(crate) struct FileCompiler<'a> {
    env: &'a Environment<'a>,
    kind: FileKind,
    commands: Vec<Command>,
    symbols: Vec<Symbol>,
    labels: Vec<PendingLabel>,
    label_names: HashSet<String>,
    locals: HashMap<String, (ValueType, u16)>,
    script_vars: HashMap<String, (ValueType, u16)>,
    externals: HashMap<String, (ValueType, u16)>,
    text_count: u32,
    script_var_count: u32,
    local_var_count: u32,
    if_depth: u16,
    loop_depth: u16,
}

impl<'a> FileCompiler<'a> {
    fn new(env: &'a Environment<'a>, kind: FileKind) -> Self {
        Self {
            env,
            kind,
            commands: Vec::new(),
            symbols: Vec::new(),
            labels: Vec::new(),
            label_names: HashSet::new(),
            locals: HashMap::new(),
            script_vars: HashMap::new(),
            externals: HashMap::new(),
            text_count: 0,
            script_var_count: 0,
            local_var_count: 0,
            if_depth: 0,
            loop_depth: 0,
        }
    }

    fn add_symbol(&mut self, sym: Symbol) -> Res<u16> {
        let idx = u16::try_from(self.symbols.len())
            .ok()
            .and_then(|n| n.checked_add(USER_VAR_BASE))
            .ok_or_else(|| ErrorKind::MalformedExpression("too many variables in one file".into()))?;
        self.symbols.push(sym);
        Ok(idx)
    }

    /// Look a name up: locals, script variables, already referenced
    /// externals, engine variables, then groups and globals.
    fn resolve(&mut self, name: &str) -> Res<(ValueType, u16)> {
        if let Some(&hit) = self
            .locals
            .get(name)
            .or_else(|| self.script_vars.get(name))
            .or_else(|| self.externals.get(name))
            .or_else(|| self.env.constants.get(name))
        {
            return Ok(hit);
        }
        let ty = self
            .env
            .groups
            .get(name)
            .or_else(|| self.env.globals.get(name))
            .copied()
            .ok_or_else(|| ErrorKind::UndefinedReference(name.to_string()))?;
        let idx = self.add_symbol(Symbol::External {
            name: name.to_string(),
            offsets: Vec::new(),
        })?;
        self.externals.insert(name.to_string(), (ty, idx));
        Ok((ty, idx))
    }

    fn code(&self, name: &str) -> Res<u8> {
        self.env
            .catalog
            .code_of(name)
            .ok_or_else(|| ErrorKind::UnknownCommand(name.to_string()))
    }

    fn emit(&mut self, name: &str, line: u32, args: Vec<Argument>) -> Res<CommandId> {
        let code = self.code(name)?;
        Ok(self.push(Command::new(code, line, args)))
    }

    fn push(&mut self, cmd: Command) -> CommandId {
        self.commands.push(cmd);
        CommandId(self.commands.len() - 1)
    }

    fn patch(&mut self, slot: (CommandId, usize), target: CommandId) {
        if let Some(arg) = self.commands.get_mut(slot.0 .0).and_then(|c| c.args.get_mut(slot.1)) {
            arg.payload = ArgPayload::Target(target);
        }
    }

    fn expr_arg(&mut self, e: &Expr) -> Res<Argument> {
        let mut ins = Vec::new();
        let ty = self.expr(e, &mut ins)?;
        Ok(Argument::new(0, ty, ArgPayload::Expr(ins)))
    }

    fn block(&mut self, body: &Block) -> Result<(), (u32, ErrorKind)> {
        body.iter().try_for_each(|s| self.stmt(s))
    }

    fn stmt(&mut self, s: &Stmt) -> Result<(), (u32, ErrorKind)> {
        let line = s.line.0;
        let at = |kind: ErrorKind| (line, kind);
        match &s.kind {
            StmtKind::Pass => {}
            StmtKind::Label(name) => {
                if !self.label_names.insert(name.clone()) {
                    return Err(at(ErrorKind::DuplicateDeclaration(format!("label {name}"))));
                }
                let command = self.push(Command::new(0, 0, Vec::new()).with_skip(SkipRule::Always));
                self.labels.push(PendingLabel {
                    name: name.clone(),
                    command,
                    if_depth: self.if_depth,
                    loop_depth: self.loop_depth,
                });
            }
            StmtKind::Word(text) => {
                let arg = Argument::new(0, ValueType::Unknown, ArgPayload::Text(text.clone()));
                self.emit("WORD", line, vec![arg]).map_err(at)?;
            }
            StmtKind::ReturnCode(code) => {
                self.text_count += 1;
                let id = u16::try_from(self.text_count)
                    .map_err(|_| at(ErrorKind::MalformedExpression("too many text lines".into())))?;
                let arg = Argument::new(id, ValueType::Unknown, ArgPayload::Value(*code));
                self.emit("RETURNCODE", line, vec![arg]).map_err(at)?;
            }
            StmtKind::Eval(e) => {
                let arg = self.expr_arg(e).map_err(at)?;
                self.emit("_", line, vec![arg]).map_err(at)?;
            }
            StmtKind::Let { target, op, value } => {
                let mut lhs = self.expr_arg(target).map_err(at)?;
                lhs.assign = *op;
                let rhs = self.expr_arg(value).map_err(at)?;
                self.emit("LET", line, vec![lhs, rhs]).map_err(at)?;
            }
            StmtKind::Declare { kind, target, init } => {
                self.declare(*kind, target, init.as_ref(), line).map_err(at)?;
            }
            StmtKind::Call(call) => self.call(call, line).map_err(at)?,
            StmtKind::If {
                arms,
                else_arm,
                end_line,
            } => self.if_chain(arms, else_arm.as_ref(), end_line.0)?,
            StmtKind::While { cond, body, end_line } => {
                self.loop_depth += 1;
                let cond = self.expr_arg(cond).map_err(at)?;
                let head = self.emit("LOOP", line, vec![cond, Argument::slot()]).map_err(at)?;
                self.block(body)?;
                let end = self.emit("LOOPEND", end_line.0, Vec::new()).map_err(|k| (end_line.0, k))?;
                self.patch((head, 1), end);
                self.loop_depth -= 1;
            }
        }
        Ok(())
    }

    /// `IF(cond, ->next branch, ->IFEND)`, then per further arm `IFBLEND` and
    /// `ELSE(cond, ->next branch, ->IFEND)` or a bare `ELSE`, then `IFEND`.
    fn if_chain(&mut self, arms: &[IfArm], else_arm: Option<&ElseArm>, end_line: u32) -> Result<(), (u32, ErrorKind)> {
        self.if_depth += 1;
        let mut next_branch: Option<(CommandId, usize)> = None;
        let mut to_end = Vec::new();
        for (i, arm) in arms.iter().enumerate() {
            let line = arm.line.0;
            let at = |kind: ErrorKind| (line, kind);
            let cond = self.expr_arg(&arm.cond).map_err(at)?;
            let args = vec![cond, Argument::slot(), Argument::slot()];
            let id = if i == 0 {
                self.emit("IF", line, args).map_err(at)?
            } else {
                self.emit("IFBLEND", line, Vec::new()).map_err(at)?;
                self.emit("ELSE", line, args).map_err(at)?
            };
            if let Some(slot) = next_branch {
                self.patch(slot, id);
            }
            next_branch = Some((id, 1));
            to_end.push((id, 2));
            self.block(&arm.body)?;
        }
        if let Some(arm) = else_arm {
            let line = arm.line.0;
            self.emit("IFBLEND", line, Vec::new()).map_err(|k| (line, k))?;
            let id = self.emit("ELSE", line, Vec::new()).map_err(|k| (line, k))?;
            if let Some(slot) = next_branch.take() {
                self.patch(slot, id);
            }
            self.block(&arm.body)?;
        }
        let end = self.emit("IFEND", end_line, Vec::new()).map_err(|k| (end_line, k))?;
        for slot in next_branch.into_iter().chain(to_end) {
            self.patch(slot, end);
        }
        self.if_depth -= 1;
        Ok(())
    }

    fn call(&mut self, call: &Call, line: u32) -> Res<()> {
        let code = self.code(&call.command)?;
        let mut args: Vec<(&str, Option<Argument>)> = Vec::with_capacity(call.args.len());
        for a in &call.args {
            if args.iter().any(|(n, _)| *n == a.name) {
                return Err(ErrorKind::Syntax(format!("argument `{}` given twice", a.name)));
            }
            let value = match &a.value {
                Some(e) => Some(self.expr_arg(e)?),
                None => None,
            };
            args.push((a.name.as_str(), value));
        }
        for aug in &call.augments {
            let Some((_, slot)) = args.iter_mut().find(|(n, _)| *n == aug.name) else {
                return Err(ErrorKind::Syntax(format!("`{}` is not an argument of this call", aug.name)));
            };
            if slot.is_some() {
                return Err(ErrorKind::Syntax(format!("argument `{}` is already set", aug.name)));
            }
            let mut arg = self.expr_arg(&aug.value)?;
            arg.assign = aug.op;
            *slot = Some(arg);
        }
        let mut out = Vec::with_capacity(args.len());
        for (name, arg) in args {
            let mut arg = arg.ok_or_else(|| ErrorKind::Syntax(format!("no assignment for argument `{name}`")))?;
            let slot_name = if name == "LBL" { "#" } else { name };
            arg.id = self
                .env
                .catalog
                .arg_id(code, slot_name)
                .ok_or_else(|| ErrorKind::UnknownArgument {
                    command: call.command.clone(),
                    arg: name.to_string(),
                })?;
            out.push(arg);
        }
        let nargs = out.len() as u16;
        let mut cmd = Command::new(code, line, out);
        let codes = self.env.catalog.codes();
        if codes.return_ == Some(code) {
            cmd.param_count = nargs;
        } else if codes.gosub == Some(code) {
            cmd.param_count = nargs.saturating_sub(1);
        }
        self.push(cmd);
        Ok(())
    }

    fn declare(&mut self, kind: DeclKind, target: &Expr, init: Option<&Expr>, line: u32) -> Res<()> {
        if !self.kind.allows(kind.scope) {
            return Err(ErrorKind::ScopeViolation(format!(
                "{} is not allowed in a {:?} file",
                kind.command_name(),
                self.kind
            )));
        }
        let ty = kind.value_type;
        let (name, dims) = decl_target(target, ty)?;
        let value = fold_init(init, ty)?;
        let taken = |m: &HashMap<String, _>| m.contains_key(&name);
        match kind.scope {
            Scope::Local | Scope::ScriptFile => {
                let env = self.env;
                let clash = self.script_vars.contains_key(&name)
                    || taken(env.groups)
                    || taken(env.globals)
                    || env.constants.contains_key(&name)
                    || (kind.scope == Scope::ScriptFile && self.locals.contains_key(&name));
                if clash {
                    return Err(ErrorKind::DuplicateDeclaration(name));
                }
                if kind.scope == Scope::Local {
                    self.local_var_count += 1;
                    let idx = self.add_symbol(Symbol::Local {
                        name: name.clone(),
                        value_type: ty,
                        offsets: Vec::new(),
                    })?;
                    self.locals.insert(name, (ty, idx));
                } else {
                    self.script_var_count += 1;
                    let def = VarDef {
                        name: name.clone(),
                        modifier: kind.modifier,
                        dims,
                        value_type: ty,
                        init: value,
                    };
                    let idx = self.add_symbol(Symbol::Script {
                        def,
                        offsets: Vec::new(),
                    })?;
                    self.script_vars.insert(name, (ty, idx));
                }
            }
            // Declared beforehand from the declaration files; referenced like any external.
            Scope::Global | Scope::FunctionGroup => {}
        }
        let lhs = self.expr_arg(target)?;
        let rhs = match init {
            Some(e) => self.expr_arg(e)?,
            None if ty == ValueType::Str => Argument::new(0, ty, ArgPayload::Expr(Vec::new())),
            None => Argument::new(
                0,
                ty,
                ArgPayload::Expr(vec![Instruction::Int {
                    width: IntWidth::W64,
                    value: 0,
                }]),
            ),
        };
        let skip = match kind.scope {
            Scope::Global | Scope::FunctionGroup => SkipRule::GlobalDefinition,
            _ => SkipRule::Never,
        };
        let code = self.code(&kind.command_name())?;
        self.push(Command::new(code, line, vec![lhs, rhs]).with_skip(skip));
        Ok(())
    }

    fn finish(mut self, path: &str) -> Result<CompiledFile, CompileError> {
        let env = self.env;
        let symbols = &mut self.symbols;
        let segments = assemble_observed(&mut self.commands, env.version, env.encoding, &mut |pos: usize, ins: &Instruction| {
            if let Instruction::Var { index, .. } = ins {
                if let Some(sym) = index
                    .checked_sub(USER_VAR_BASE)
                    .and_then(|i| symbols.get_mut(i as usize))
                {
                    sym.offsets_mut().push(pos + VAR_INDEX_OFFSET);
                }
            }
        })
        .map_err(|e| CompileError::new(path, 0, e.into()))?;
        let labels = self
            .labels
            .iter()
            .map(|l| {
                let p = self.commands[l.command.0].placement;
                LabelDef {
                    name: l.name.clone(),
                    position: if env.version >= V300 { p.index } else { p.offset },
                    if_depth: l.if_depth,
                    loop_depth: l.loop_depth,
                }
            })
            .collect();
        log::debug!(
            "{path}: {} command(s), {} symbol(s), {} label(s)",
            self.commands.len(),
            self.symbols.len(),
            self.labels.len()
        );
        Ok(CompiledFile {
            path: path.to_string(),
            kind: self.kind,
            text_count: self.text_count,
            script_var_count: self.script_var_count,
            local_var_count: self.local_var_count,
            labels,
            symbols: self.symbols,
            segments,
        })
    }
}

/// Lower and assemble one parsed file.
pub fn compile_program(
    program: &Program,
    env: &Environment<'_>,
    kind: FileKind,
    path: &str,
) -> Result<CompiledFile, CompileError> {
    let mut fc = FileCompiler::new(env, kind);
    fc.block(&program.body)
        .map_err(|(line, kind)| CompileError::new(path, line, kind))?;
    fc.finish(path)
}

/// Parse, lower and assemble one source file.
pub fn compile_source(
    src: &str,
    env: &Environment<'_>,
    kind: FileKind,
    path: &str,
) -> Result<CompiledFile, CompileError> {
    let program = parse_program(src).map_err(|e| CompileError::syntax(path, e))?;
    compile_program(&program, env, kind, path)
}
