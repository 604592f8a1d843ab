use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_VERSION: u32 = 200;
pub const MAX_VERSION: u32 = 500;
/// First version with the 8-byte inline return-code record and the second key.
pub const V290: u32 = 290;
/// First version with separate command/argument/line sections.
pub const V300: u32 = 300;

/// Provisional variable indices handed out by the front end start here.
/// Engine builtins always sit below it.
pub const USER_VAR_BASE: u16 = 1000;

pub fn check_version(version: u32) -> Result<u32> {
    if (MIN_VERSION..=MAX_VERSION).contains(&version) {
        Ok(version)
    } else {
        Err(Error::VersionUnsupported(version))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueType {
    #[default]
    Unknown = 0,
    Int = 1,
    Float = 2,
    Str = 3,
}

impl ValueType {
    /// Only the low two bits of the on-disk type byte are meaningful.
    pub fn from_bits(b: u8) -> Self {
        match b & 0b11 {
            1 => ValueType::Int,
            2 => ValueType::Float,
            3 => ValueType::Str,
            _ => ValueType::Unknown,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ValueType::Int | ValueType::Float)
    }

    /// Fragment used in synthesized variable names and declaration commands.
    pub fn short_name(self) -> &'static str {
        match self {
            ValueType::Unknown => "Unk",
            ValueType::Int => "Int",
            ValueType::Float => "Flt",
            ValueType::Str => "Str",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueType::Unknown => "unknown",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Str => "string",
        };
        f.write_str(s)
    }
}

/// Addressing-mode byte carried by every variable reference instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeQualifier {
    /// `&$` at 300 and later, `$@` before.
    StrAddress = 0x23,
    Str = 0x24,
    Num = 0x40,
    IntAddress = 0x60,
}

impl TypeQualifier {
    pub fn from_u8(b: u8) -> Option<Self> {
        Some(match b {
            0x23 => TypeQualifier::StrAddress,
            0x24 => TypeQualifier::Str,
            0x40 => TypeQualifier::Num,
            0x60 => TypeQualifier::IntAddress,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Scope {
    Global = 1,
    ScriptFile = 2,
    FunctionGroup = 3,
    Local = 4,
}

impl Scope {
    pub fn prefix_char(self) -> char {
        match self {
            Scope::Global => 'g',
            Scope::ScriptFile => 's',
            Scope::FunctionGroup => 'f',
            Scope::Local => 'l',
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ScopeModifier {
    BuiltinEngine = 0,
    #[default]
    Default = 1,
    AltGroup2 = 2,
    AltGroup3 = 3,
}

impl ScopeModifier {
    /// Bank suffix used by declaration command names (`G_INT2`) and synthesized names.
    pub fn bank_suffix(self) -> &'static str {
        match self {
            ScopeModifier::AltGroup2 => "2",
            ScopeModifier::AltGroup3 => "3",
            _ => "",
        }
    }
}

/// Compound-assignment operator of an argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AssignOp {
    #[default]
    Assign = 0,
    Add = 1,
    Sub = 2,
    Mul = 3,
    Div = 4,
    Mod = 5,
    BitAnd = 6,
    BitOr = 7,
    BitXor = 8,
}

impl AssignOp {
    pub const ALL: [AssignOp; 9] = [
        AssignOp::Assign,
        AssignOp::Add,
        AssignOp::Sub,
        AssignOp::Mul,
        AssignOp::Div,
        AssignOp::Mod,
        AssignOp::BitAnd,
        AssignOp::BitOr,
        AssignOp::BitXor,
    ];

    pub fn from_u8(b: u8) -> Option<Self> {
        Self::ALL.get(b as usize).copied()
    }

    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
            AssignOp::Mod => "%=",
            AssignOp::BitAnd => "&=",
            AssignOp::BitOr => "|=",
            AssignOp::BitXor => "^=",
        }
    }

    pub fn from_symbol(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.symbol() == s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_domain() {
        assert_eq!(check_version(200), Ok(200));
        assert_eq!(check_version(500), Ok(500));
        assert_eq!(check_version(199), Err(Error::VersionUnsupported(199)));
        assert_eq!(check_version(501), Err(Error::VersionUnsupported(501)));
    }

    #[test]
    fn type_bits_are_masked() {
        assert_eq!(ValueType::from_bits(0x07), ValueType::Str);
        assert_eq!(ValueType::from_bits(0x05), ValueType::Int);
    }

    #[test]
    fn assign_op_symbols() {
        for op in AssignOp::ALL {
            assert_eq!(AssignOp::from_symbol(op.symbol()), Some(op));
            assert_eq!(AssignOp::from_u8(op as u8), Some(op));
        }
        assert_eq!(AssignOp::from_u8(9), None);
    }
}
