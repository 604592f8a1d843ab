//! Postfix expression instruction codec.
//!
//! Every instruction is `opcode:u8, operand_len:u16, operand`. The one
//! exception is [`Instruction::IndexEnd`], which declares a 1-byte operand but
//! is always written as four bytes `29 01 00 00`.

use crate::error::{Error, Result};
use crate::types::TypeQualifier;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

/// Byte distance from the start of a variable reference to its index field.
pub const VAR_INDEX_OFFSET: usize = 4;

const OP_I8: u8 = 0x42;
const OP_I16: u8 = 0x57;
const OP_I32: u8 = 0x49;
const OP_I64: u8 = 0x4C;
const OP_F64: u8 = 0x46;
const OP_STR: u8 = 0x4D;
const OP_VAR: u8 = 0x48;
const OP_ARR: u8 = 0x76;
const OP_IDXBEG: u8 = 0x56;
const OP_IDXEND: u8 = 0x29;
const OP_NOP: u8 = 0x2C;
const OP_TOI: u8 = 0x69;
const OP_TOS: u8 = 0x73;
const OP_NEG: u8 = 0x52;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    /// Narrowest signed width that holds `v`.
    pub fn narrowest(v: i64) -> Self {
        if i8::try_from(v).is_ok() {
            IntWidth::W8
        } else if i16::try_from(v).is_ok() {
            IntWidth::W16
        } else if i32::try_from(v).is_ok() {
            IntWidth::W32
        } else {
            IntWidth::W64
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            IntWidth::W8 => 1,
            IntWidth::W16 => 2,
            IntWidth::W32 => 4,
            IntWidth::W64 => 8,
        }
    }

    fn opcode(self) -> u8 {
        match self {
            IntWidth::W8 => OP_I8,
            IntWidth::W16 => OP_I16,
            IntWidth::W32 => OP_I32,
            IntWidth::W64 => OP_I64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefMode {
    Value,
    /// Whole array, no subscript.
    ArrayRef,
    /// Opens a subscript list closed by [`Instruction::IndexEnd`].
    IndexBegin,
}

impl RefMode {
    fn opcode(self) -> u8 {
        match self {
            RefMode::Value => OP_VAR,
            RefMode::ArrayRef => OP_ARR,
            RefMode::IndexBegin => OP_IDXBEG,
        }
    }
}

/// Binary operators, shared by the instruction stream and the program tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 16] = [
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Mod,
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Lt,
        BinaryOp::Le,
        BinaryOp::Gt,
        BinaryOp::Ge,
        BinaryOp::Eq,
        BinaryOp::Ne,
        BinaryOp::BitAnd,
        BinaryOp::BitOr,
        BinaryOp::BitXor,
        BinaryOp::And,
        BinaryOp::Or,
    ];

    pub fn opcode(self) -> u8 {
        match self {
            BinaryOp::Mul => 0x2A,
            BinaryOp::Div => 0x2F,
            BinaryOp::Mod => 0x25,
            BinaryOp::Add => 0x2B,
            BinaryOp::Sub => 0x2D,
            BinaryOp::Lt => 0x3C,
            BinaryOp::Le => 0x53,
            BinaryOp::Gt => 0x3E,
            BinaryOp::Ge => 0x5A,
            BinaryOp::Eq => 0x3D,
            BinaryOp::Ne => 0x21,
            BinaryOp::BitAnd => 0x41,
            BinaryOp::BitOr => 0x4F,
            BinaryOp::BitXor => 0x5E,
            BinaryOp::And => 0x26,
            BinaryOp::Or => 0x7C,
        }
    }

    pub fn from_opcode(op: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.opcode() == op)
    }

    /// Binding strength, lower binds tighter. Unary negation is 2.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 3,
            BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 6,
            BinaryOp::Eq | BinaryOp::Ne => 7,
            BinaryOp::BitAnd => 8,
            BinaryOp::BitXor => 9,
            BinaryOp::BitOr => 10,
            BinaryOp::And => 11,
            BinaryOp::Or => 12,
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Int { width: IntWidth, value: i64 },
    Float(f64),
    /// Encoded bytes of a quote-delimited literal, see [`quote_literal`].
    Str(Vec<u8>),
    Var {
        mode: RefMode,
        qualifier: TypeQualifier,
        index: u16,
    },
    IndexEnd,
    Nop,
    Neg,
    ToInt,
    ToStr,
    Binary(BinaryOp),
}

impl Instruction {
    /// Integer literal in its narrowest width.
    pub fn int(value: i64) -> Self {
        Instruction::Int {
            width: IntWidth::narrowest(value),
            value,
        }
    }

    pub fn var(qualifier: TypeQualifier, index: u16) -> Self {
        Instruction::Var {
            mode: RefMode::Value,
            qualifier,
            index,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Instruction::Int { width, .. } => 3 + width.bytes(),
            Instruction::Float(_) => 3 + 8,
            Instruction::Str(b) => 3 + b.len(),
            Instruction::Var { .. } => 3 + 3,
            Instruction::IndexEnd => 4,
            _ => 3,
        }
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Instruction::Int { width, value } => {
                let fits = IntWidth::narrowest(*value) <= *width;
                if !fits {
                    return Err(Error::malformed(
                        out.len(),
                        format!("integer {value} does not fit in {width:?}"),
                    ));
                }
                out.push(width.opcode());
                put_u16(out, width.bytes() as u16);
                match width {
                    IntWidth::W8 => out.push(*value as i8 as u8),
                    IntWidth::W16 => put_i16(out, *value as i16),
                    IntWidth::W32 => put_i32(out, *value as i32),
                    IntWidth::W64 => put_i64(out, *value),
                }
            }
            Instruction::Float(v) => {
                out.push(OP_F64);
                put_u16(out, 8);
                put_f64(out, *v);
            }
            Instruction::Str(bytes) => {
                let len = u16::try_from(bytes.len()).map_err(|_| {
                    Error::malformed(out.len(), format!("string literal too long: {}", bytes.len()))
                })?;
                out.push(OP_STR);
                put_u16(out, len);
                out.extend_from_slice(bytes);
            }
            Instruction::Var {
                mode,
                qualifier,
                index,
            } => {
                out.push(mode.opcode());
                put_u16(out, 3);
                out.push(*qualifier as u8);
                put_u16(out, *index);
            }
            Instruction::IndexEnd => out.extend_from_slice(&[OP_IDXEND, 1, 0, 0]),
            Instruction::Nop => bare(out, OP_NOP),
            Instruction::Neg => bare(out, OP_NEG),
            Instruction::ToInt => bare(out, OP_TOI),
            Instruction::ToStr => bare(out, OP_TOS),
            Instruction::Binary(op) => bare(out, op.opcode()),
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Decode one instruction at `pos`, returning it and the bytes consumed.
    pub fn decode(buf: &[u8], pos: usize) -> Result<(Instruction, usize)> {
        let head = buf
            .get(pos..pos + 3)
            .ok_or_else(|| Error::malformed(pos, "truncated instruction tag"))?;
        let op = head[0];
        let len = LittleEndian::read_u16(&head[1..3]) as usize;
        let operand = |n: usize| read_operand(buf, pos, op, len, n);

        let ins = match op {
            OP_I8 => Instruction::Int {
                width: IntWidth::W8,
                value: operand(1)?[0] as i8 as i64,
            },
            OP_I16 => Instruction::Int {
                width: IntWidth::W16,
                value: LittleEndian::read_i16(operand(2)?) as i64,
            },
            OP_I32 => Instruction::Int {
                width: IntWidth::W32,
                value: LittleEndian::read_i32(operand(4)?) as i64,
            },
            OP_I64 => Instruction::Int {
                width: IntWidth::W64,
                value: LittleEndian::read_i64(operand(8)?),
            },
            OP_F64 => Instruction::Float(LittleEndian::read_f64(operand(8)?)),
            OP_STR => Instruction::Str(operand(len)?.to_vec()),
            OP_VAR | OP_ARR | OP_IDXBEG => {
                let b = operand(3)?;
                let qualifier = TypeQualifier::from_u8(b[0]).ok_or_else(|| {
                    Error::malformed(pos, format!("unknown type qualifier 0x{:02X}", b[0]))
                })?;
                let mode = match op {
                    OP_VAR => RefMode::Value,
                    OP_ARR => RefMode::ArrayRef,
                    _ => RefMode::IndexBegin,
                };
                Instruction::Var {
                    mode,
                    qualifier,
                    index: LittleEndian::read_u16(&b[1..3]),
                }
            }
            OP_IDXEND => {
                operand(1)?;
                return Ok((Instruction::IndexEnd, 4));
            }
            _ => {
                operand(0)?;
                match op {
                    OP_NOP => Instruction::Nop,
                    OP_NEG => Instruction::Neg,
                    OP_TOI => Instruction::ToInt,
                    OP_TOS => Instruction::ToStr,
                    _ => Instruction::Binary(BinaryOp::from_opcode(op).ok_or_else(|| {
                        Error::malformed(pos, format!("unknown opcode 0x{op:02X}"))
                    })?),
                }
            }
        };
        Ok((ins, 3 + len))
    }
}

fn read_operand(buf: &[u8], pos: usize, op: u8, len: usize, want: usize) -> Result<&[u8]> {
    if len != want {
        return Err(Error::malformed(
            pos,
            format!("opcode 0x{op:02X} with operand length {len}, expected {want}"),
        ));
    }
    buf.get(pos + 3..pos + 3 + want)
        .ok_or_else(|| Error::malformed(pos, format!("truncated operand of opcode 0x{op:02X}")))
}

fn bare(out: &mut Vec<u8>, op: u8) {
    out.push(op);
    put_u16(out, 0);
}

// Writes into a Vec cannot fail.
fn put_u16(out: &mut Vec<u8>, v: u16) {
    let _ = out.write_u16::<LittleEndian>(v);
}

fn put_i16(out: &mut Vec<u8>, v: i16) {
    let _ = out.write_i16::<LittleEndian>(v);
}

fn put_i32(out: &mut Vec<u8>, v: i32) {
    let _ = out.write_i32::<LittleEndian>(v);
}

fn put_i64(out: &mut Vec<u8>, v: i64) {
    let _ = out.write_i64::<LittleEndian>(v);
}

fn put_f64(out: &mut Vec<u8>, v: f64) {
    let _ = out.write_f64::<LittleEndian>(v);
}

pub fn encode_all(ins: &[Instruction]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(ins.iter().map(Instruction::encoded_len).sum());
    for i in ins {
        i.encode_into(&mut out)?;
    }
    Ok(out)
}

/// Decode until the buffer is exhausted.
pub fn decode_all(buf: &[u8]) -> Result<Vec<Instruction>> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        let (ins, n) = Instruction::decode(buf, pos)?;
        out.push(ins);
        pos += n;
    }
    Ok(out)
}

/// Quote-delimited literal text with `\\`, `\n`, `\t` and `\"` escaped.
pub fn quote_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Inverse of [`quote_literal`]. Unknown escapes are kept verbatim.
pub fn unquote_literal(s: &str) -> Option<String> {
    let inner = s.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Some(out)
}
