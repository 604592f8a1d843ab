use crate::expr::Instruction;
use crate::types::{AssignOp, ValueType, V290, V300};

/// Stable index of a command inside its owning list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub usize);

/// Whether a command is dropped from the physical stream for a given version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SkipRule {
    #[default]
    Never,
    /// Pure markers such as label definitions.
    Always,
    /// Global/group declarations, read from the variable table at 290 and from 300 on.
    GlobalDefinition,
}

impl SkipRule {
    pub fn omitted_at(self, version: u32) -> bool {
        match self {
            SkipRule::Never => false,
            SkipRule::Always => true,
            SkipRule::GlobalDefinition => version >= V300 || version == V290,
        }
    }
}

/// Final physical position, filled by the assembler's layout pass
/// (or by the disassembler when reading).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Placement {
    /// Ordinal among surviving commands.
    pub index: u32,
    /// Byte offset in the command stream.
    pub offset: u32,
    /// Expression-data offset at which this command's arguments start.
    pub expr_offset: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgPayload {
    None,
    /// Branch target, written as the target's index (300+) or byte offset.
    Target(CommandId),
    Expr(Vec<Instruction>),
    /// Raw text, encoded with the script's text encoding.
    Text(String),
    /// Pre-serialized expression bytes.
    Raw(Vec<u8>),
    /// Inline integer result field (return codes).
    Value(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub id: u16,
    pub value_type: ValueType,
    pub assign: AssignOp,
    pub payload: ArgPayload,
}

impl Argument {
    pub fn new(id: u16, value_type: ValueType, payload: ArgPayload) -> Self {
        Self {
            id,
            value_type,
            assign: AssignOp::Assign,
            payload,
        }
    }

    /// Placeholder for a branch slot filled in later.
    pub fn slot() -> Self {
        Self::new(0, ValueType::Unknown, ArgPayload::None)
    }

    /// Size of the on-disk argument record.
    pub fn record_size(&self, version: u32) -> usize {
        if version >= V300 || !matches!(self.payload, ArgPayload::Value(_)) {
            12
        } else if version == V290 {
            8
        } else {
            4
        }
    }

    pub fn instructions(&self) -> Option<&[Instruction]> {
        match &self.payload {
            ArgPayload::Expr(ins) => Some(ins),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub code: u8,
    pub line: u32,
    pub args: Vec<Argument>,
    /// Number of arguments passed as parameters (`GOSUB`, `RETURN`).
    pub param_count: u16,
    pub skip: SkipRule,
    pub placement: Placement,
}

impl Command {
    pub fn new(code: u8, line: u32, args: Vec<Argument>) -> Self {
        Self {
            code,
            line,
            args,
            param_count: 0,
            skip: SkipRule::Never,
            placement: Placement::default(),
        }
    }

    pub fn with_skip(mut self, skip: SkipRule) -> Self {
        self.skip = skip;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_rules() {
        assert!(SkipRule::Always.omitted_at(200));
        assert!(!SkipRule::Never.omitted_at(500));
        assert!(!SkipRule::GlobalDefinition.omitted_at(289));
        assert!(SkipRule::GlobalDefinition.omitted_at(290));
        assert!(!SkipRule::GlobalDefinition.omitted_at(291));
        assert!(SkipRule::GlobalDefinition.omitted_at(300));
    }

    #[test]
    fn record_sizes() {
        let value = Argument::new(1, ValueType::Unknown, ArgPayload::Value(1));
        assert_eq!(value.record_size(200), 4);
        assert_eq!(value.record_size(290), 8);
        assert_eq!(value.record_size(295), 4);
        assert_eq!(value.record_size(300), 12);
        let text = Argument::new(0, ValueType::Unknown, ArgPayload::Text("a".into()));
        assert_eq!(text.record_size(200), 12);
    }
}
