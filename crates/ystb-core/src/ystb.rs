//! The YSTB container: a 32-byte header followed by XOR-obfuscated sections.

use crate::cipher::XorKey;
use crate::error::{Error, Result};
use crate::types::{check_version, V300};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

pub const MAGIC: &[u8; 4] = b"YSTB";
pub const HEADER_LEN: usize = 32;

/// Plaintext sections of one compiled script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segments {
    /// Before 300: commands and their argument records are interleaved.
    Legacy {
        version: u32,
        commands: Vec<u8>,
        expressions: Vec<u8>,
    },
    Sectioned {
        version: u32,
        command_count: u32,
        commands: Vec<u8>,
        arguments: Vec<u8>,
        expressions: Vec<u8>,
        lines: Vec<u8>,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// Trust this version instead of the header's.
    pub version: Option<u32>,
    pub key: Option<XorKey>,
}

impl Segments {
    pub fn version(&self) -> u32 {
        match self {
            Segments::Legacy { version, .. } | Segments::Sectioned { version, .. } => *version,
        }
    }

    pub fn expressions(&self) -> &[u8] {
        match self {
            Segments::Legacy { expressions, .. } | Segments::Sectioned { expressions, .. } => {
                expressions
            }
        }
    }

    pub fn expressions_mut(&mut self) -> &mut Vec<u8> {
        match self {
            Segments::Legacy { expressions, .. } | Segments::Sectioned { expressions, .. } => {
                expressions
            }
        }
    }

    pub fn header(&self) -> [u8; HEADER_LEN] {
        let mut h = Vec::with_capacity(HEADER_LEN);
        h.extend_from_slice(MAGIC);
        let fields: Vec<u32> = match self {
            Segments::Legacy {
                version,
                commands,
                expressions,
            } => vec![
                *version,
                commands.len() as u32,
                expressions.len() as u32,
                (HEADER_LEN + commands.len()) as u32,
            ],
            Segments::Sectioned {
                version,
                command_count,
                commands,
                arguments,
                expressions,
                lines,
            } => vec![
                *version,
                *command_count,
                commands.len() as u32,
                arguments.len() as u32,
                expressions.len() as u32,
                lines.len() as u32,
            ],
        };
        for f in fields {
            let _ = h.write_u32::<LittleEndian>(f);
        }
        let mut out = [0u8; HEADER_LEN];
        out[..h.len()].copy_from_slice(&h);
        out
    }

    fn sections(&self) -> Vec<&[u8]> {
        match self {
            Segments::Legacy {
                commands,
                expressions,
                ..
            } => vec![commands, expressions],
            Segments::Sectioned {
                commands,
                arguments,
                expressions,
                lines,
                ..
            } => vec![commands, arguments, expressions, lines],
        }
    }

    /// Header plus every section obfuscated with `key` (or the version default).
    pub fn seal(&self, key: Option<XorKey>) -> Vec<u8> {
        let key = key.unwrap_or_else(|| XorKey::for_version(self.version()));
        let mut out = self.header().to_vec();
        for section in self.sections() {
            let start = out.len();
            out.extend_from_slice(section);
            key.apply(&mut out[start..]);
        }
        out
    }

    /// Validate the header, then split and de-obfuscate the sections.
    pub fn open(data: &[u8], opts: &OpenOptions) -> Result<Segments> {
        if data.len() < HEADER_LEN {
            return Err(Error::truncated(data.len(), HEADER_LEN - data.len()));
        }
        if &data[..4] != MAGIC {
            return Err(Error::FormatMismatch(format!(
                "bad magic {:02X?}, expected \"YSTB\"",
                &data[..4]
            )));
        }
        let field = |i: usize| LittleEndian::read_u32(&data[4 + i * 4..8 + i * 4]) as usize;
        let version = check_version(opts.version.unwrap_or(field(0) as u32))?;
        let key = opts.key.unwrap_or_else(|| XorKey::for_version(version));
        let reserved = if version < V300 { 20 } else { 28 };
        if data[reserved..HEADER_LEN].iter().any(|&b| b != 0) {
            return Err(Error::FormatMismatch(format!(
                "reserved header bytes 0x{reserved:X}..0x20 are not zero"
            )));
        }

        let mut cursor = HEADER_LEN;
        let mut take = |len: usize| -> Result<Vec<u8>> {
            let end = cursor
                .checked_add(len)
                .filter(|&end| end <= data.len())
                .ok_or_else(|| Error::truncated(cursor, len.saturating_sub(data.len() - cursor)))?;
            let mut section = data[cursor..end].to_vec();
            key.apply(&mut section);
            cursor = end;
            Ok(section)
        };

        let segments = if version < V300 {
            let (lcmd, lexp, oexp) = (field(1), field(2), field(3));
            if HEADER_LEN + lcmd != oexp {
                return Err(Error::FormatMismatch(format!(
                    "expression offset 0x{oexp:X} != 32 + command length 0x{lcmd:X}"
                )));
            }
            Segments::Legacy {
                version,
                commands: take(lcmd)?,
                expressions: take(lexp)?,
            }
        } else {
            let (ncmd, lcmd, larg, lexp, llno) = (field(1), field(2), field(3), field(4), field(5));
            if ncmd * 4 != lcmd || lcmd != llno {
                return Err(Error::FormatMismatch(format!(
                    "command count {ncmd} disagrees with section lengths {lcmd}/{llno}"
                )));
            }
            if larg % 12 != 0 {
                return Err(Error::FormatMismatch(format!(
                    "argument section length {larg} is not a multiple of 12"
                )));
            }
            Segments::Sectioned {
                version,
                command_count: ncmd as u32,
                commands: take(lcmd)?,
                arguments: take(larg)?,
                expressions: take(lexp)?,
                lines: take(llno)?,
            }
        };
        log::debug!(
            "opened YSTB v{} with {} byte(s) of expression data",
            version,
            segments.expressions().len()
        );
        Ok(segments)
    }
}
