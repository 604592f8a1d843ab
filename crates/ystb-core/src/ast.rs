//! Structured program tree shared by the compiler front end and the decompiler.

use crate::expr::BinaryOp;
use crate::types::{AssignOp, Scope, ScopeModifier, TypeQualifier, ValueType};

/// Source line of a node. Provenance only: always equal under `==`, so
/// structural comparison ignores where a statement came from.
#[derive(Debug, Clone, Copy, Default)]
pub struct Line(pub u32);

impl PartialEq for Line {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

/// Addressing form of a variable reference (`name.N`, `name.AS`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefForm {
    /// `.N`: numeric value.
    Num,
    /// `.S`: string value.
    Str,
    /// `.AN`: address of a numeric variable, int-typed.
    IntAddress,
    /// `.AS`: address of a string variable, int-typed.
    StrAddress,
    /// `.SN`: numeric variable read as a string.
    StrOfNum,
}

impl RefForm {
    pub const ALL: [RefForm; 5] = [
        RefForm::Num,
        RefForm::Str,
        RefForm::IntAddress,
        RefForm::StrAddress,
        RefForm::StrOfNum,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            RefForm::Num => "N",
            RefForm::Str => "S",
            RefForm::IntAddress => "AN",
            RefForm::StrAddress => "AS",
            RefForm::StrOfNum => "SN",
        }
    }

    pub fn from_suffix(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.suffix() == s)
    }

    pub fn qualifier(self) -> TypeQualifier {
        match self {
            RefForm::Num => TypeQualifier::Num,
            RefForm::Str => TypeQualifier::Str,
            RefForm::IntAddress => TypeQualifier::IntAddress,
            RefForm::StrAddress | RefForm::StrOfNum => TypeQualifier::StrAddress,
        }
    }

    /// Whether the referenced variable must be string-typed.
    pub fn wants_string_var(self) -> bool {
        matches!(self, RefForm::Str | RefForm::StrAddress)
    }

    /// Type of the reference expression itself.
    pub fn result_type(self, var_type: ValueType) -> ValueType {
        match self {
            RefForm::Num => var_type,
            RefForm::Str | RefForm::StrOfNum => ValueType::Str,
            RefForm::IntAddress | RefForm::StrAddress => ValueType::Int,
        }
    }

    /// Inverse of [`RefForm::qualifier`]; the `0x23` byte changed meaning at 300.
    pub fn from_qualifier(q: TypeQualifier, string_var: bool, version: u32) -> Option<Self> {
        let form = match q {
            TypeQualifier::Num => RefForm::Num,
            TypeQualifier::Str => RefForm::Str,
            TypeQualifier::IntAddress => RefForm::IntAddress,
            TypeQualifier::StrAddress if version >= crate::types::V300 => RefForm::StrAddress,
            TypeQualifier::StrAddress => RefForm::StrOfNum,
        };
        (form.wants_string_var() == string_var).then_some(form)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarRef {
    pub name: String,
    pub form: RefForm,
}

impl VarRef {
    pub fn new(name: impl Into<String>, form: RefForm) -> Self {
        Self {
            name: name.into(),
            form,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastKind {
    ToInt,
    ToStr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    /// Literal already in engine syntax, emitted verbatim.
    Raw(String),
    /// Neutral operand standing in for a missing stack value.
    Empty,
    Var(VarRef),
    /// Whole-array reference, `name.N()`.
    Array(VarRef),
    Index(VarRef, Vec<Expr>),
    Neg(Box<Expr>),
    Cast(CastKind, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn var(name: impl Into<String>, form: RefForm) -> Self {
        Expr::Var(VarRef::new(name, form))
    }

    /// Binding strength for printing, lower binds tighter; leaves are -1.
    pub fn precedence(&self) -> i8 {
        match self {
            Expr::Neg(_) => 2,
            Expr::Binary(op, ..) => op.precedence() as i8,
            _ => -1,
        }
    }
}

/// A declaration command such as `INT`, `S_STR` or `G_FLT2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclKind {
    pub scope: Scope,
    pub modifier: ScopeModifier,
    pub value_type: ValueType,
}

impl DeclKind {
    pub fn command_name(&self) -> String {
        let prefix = match self.scope {
            Scope::Local => "",
            Scope::Global => "G_",
            Scope::ScriptFile => "S_",
            Scope::FunctionGroup => "F_",
        };
        let ty = match self.value_type {
            ValueType::Float => "FLT",
            ValueType::Str => "STR",
            _ => "INT",
        };
        format!("{prefix}{ty}{}", self.modifier.bank_suffix())
    }

    pub fn parse(name: &str) -> Option<Self> {
        let (scope, rest) = if let Some(r) = name.strip_prefix("G_") {
            (Scope::Global, r)
        } else if let Some(r) = name.strip_prefix("S_") {
            (Scope::ScriptFile, r)
        } else if let Some(r) = name.strip_prefix("F_") {
            (Scope::FunctionGroup, r)
        } else {
            (Scope::Local, name)
        };
        let value_type = match rest.get(..3)? {
            "INT" => ValueType::Int,
            "FLT" => ValueType::Float,
            "STR" => ValueType::Str,
            _ => return None,
        };
        let modifier = match &rest[3..] {
            "" => ScopeModifier::Default,
            "2" if scope == Scope::Global => ScopeModifier::AltGroup2,
            "3" if scope == Scope::Global => ScopeModifier::AltGroup3,
            _ => return None,
        };
        Some(Self {
            scope,
            modifier,
            value_type,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallArg {
    pub name: String,
    /// `None` is the `_` placeholder filled by a matching augment.
    pub value: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Augment {
    pub name: String,
    pub op: AssignOp,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub command: String,
    pub args: Vec<CallArg>,
    pub augments: Vec<Augment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfArm {
    pub cond: Expr,
    pub body: Block,
    pub line: Line,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseArm {
    pub body: Block,
    pub line: Line,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Explicit empty block.
    Pass,
    Label(String),
    /// A text line (`WORD`).
    Word(String),
    ReturnCode(u32),
    /// The `_` expression command.
    Eval(Expr),
    Let {
        target: Expr,
        op: AssignOp,
        value: Expr,
    },
    Declare {
        kind: DeclKind,
        target: Expr,
        init: Option<Expr>,
    },
    Call(Call),
    If {
        arms: Vec<IfArm>,
        else_arm: Option<ElseArm>,
        end_line: Line,
    },
    While {
        cond: Expr,
        body: Block,
        end_line: Line,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: Line,
}

impl Stmt {
    pub fn new(kind: StmtKind, line: u32) -> Self {
        Self {
            kind,
            line: Line(line),
        }
    }
}

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub body: Block,
}
