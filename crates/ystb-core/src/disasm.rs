use crate::catalog::{CommandCatalog, CommandCodes};
use crate::command::{ArgPayload, Argument, Command, CommandId, Placement};
use crate::error::{Error, Result};
use crate::expr::decode_all;
use crate::nls::Encoding;
use crate::types::{AssignOp, ValueType, V290};
use crate::ystb::{OpenOptions, Segments};
use byteorder::{ByteOrder, LittleEndian};
use std::collections::HashMap;
use std::fmt::Write;

/// A decoded script. Every command's placement holds its physical position.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub version: u32,
    pub commands: Vec<Command>,
}

#[derive(Clone, Copy)]
enum Shape {
    Data,
    Text,
    Slot,
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let s = self
            .buf
            .get(self.pos..self.pos + n)
            .ok_or_else(|| Error::truncated(self.pos, self.pos + n - self.buf.len()))?;
        self.pos += n;
        Ok(s)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }
}

/// Record fields before the payload is interpreted.
struct RawArg {
    id: u16,
    value_type: ValueType,
    assign: AssignOp,
    a: u32,
    b: u32,
}

fn read_head(r: &mut Reader<'_>) -> Result<(u16, ValueType, AssignOp)> {
    let at = r.pos;
    let id = r.u16()?;
    let value_type = ValueType::from_bits(r.u8()?);
    let aop = r.u8()?;
    let assign = AssignOp::from_u8(aop)
        .ok_or_else(|| Error::FormatMismatch(format!("bad assign op {aop} at 0x{at:X}")))?;
    Ok((id, value_type, assign))
}

fn read_full(r: &mut Reader<'_>) -> Result<RawArg> {
    let (id, value_type, assign) = read_head(r)?;
    Ok(RawArg {
        id,
        value_type,
        assign,
        a: r.u32()?,
        b: r.u32()?,
    })
}

fn shapes(code: u8, narg: u8, codes: &CommandCodes) -> Result<Vec<Shape>> {
    let want = |n: u8, name: &str| {
        if narg == n {
            Ok(())
        } else {
            Err(Error::FormatMismatch(format!("{name} with {narg} argument(s), expected {n}")))
        }
    };
    if (CommandCodes::is(code, codes.if_) || CommandCodes::is(code, codes.else_)) && narg == 3 {
        return Ok(vec![Shape::Data, Shape::Slot, Shape::Slot]);
    }
    if CommandCodes::is(code, codes.else_) {
        want(0, "ELSE")?;
        return Ok(vec![]);
    }
    if CommandCodes::is(code, codes.loop_) {
        want(2, "LOOP")?;
        return Ok(vec![Shape::Data, Shape::Slot]);
    }
    if CommandCodes::is(code, codes.word) {
        want(1, "WORD")?;
        return Ok(vec![Shape::Text]);
    }
    Ok(vec![Shape::Data; narg as usize])
}

struct Decoder<'a> {
    version: u32,
    codes: CommandCodes,
    encoding: Encoding,
    expressions: &'a [u8],
}

impl Decoder<'_> {
    fn payload(&self, raw: &RawArg, shape: Shape) -> Result<ArgPayload> {
        if let Shape::Slot = shape {
            return Ok(ArgPayload::Target(CommandId(raw.a as usize)));
        }
        let (len, off) = (raw.a as usize, raw.b as usize);
        let data = self
            .expressions
            .get(off..off + len)
            .ok_or_else(|| Error::truncated(off, (off + len).saturating_sub(self.expressions.len())))?;
        Ok(match shape {
            Shape::Text => ArgPayload::Text(self.encoding.decode(data).into_owned()),
            _ => ArgPayload::Expr(decode_all(data).map_err(|e| match e {
                Error::MalformedExpression { offset, reason } => Error::MalformedExpression {
                    offset: off + offset,
                    reason,
                },
                other => other,
            })?),
        })
    }

    fn args(&self, r: &mut Reader<'_>, code: u8, narg: u8) -> Result<Vec<Argument>> {
        shapes(code, narg, &self.codes)?
            .into_iter()
            .map(|shape| {
                let raw = read_full(r)?;
                Ok(Argument {
                    id: raw.id,
                    value_type: raw.value_type,
                    assign: raw.assign,
                    payload: self.payload(&raw, shape)?,
                })
            })
            .collect()
    }

    fn legacy(&self, commands: &[u8]) -> Result<Vec<Command>> {
        let mut r = Reader::new(commands);
        let mut out = Vec::new();
        while !r.at_end() {
            let offset = r.pos as u32;
            let code = r.u8()?;
            let narg = r.u8()?;
            let line = r.u32()?;
            let args = if CommandCodes::is(code, self.codes.returncode) {
                if narg != 1 {
                    return Err(Error::FormatMismatch(format!(
                        "RETURNCODE with {narg} argument(s) at 0x{offset:X}"
                    )));
                }
                let (id, value_type, assign) = read_head(&mut r)?;
                let value = if self.version == V290 { r.u32()? } else { 0 };
                vec![Argument {
                    id,
                    value_type,
                    assign,
                    payload: ArgPayload::Value(value),
                }]
            } else {
                self.args(&mut r, code, narg)?
            };
            let mut cmd = Command::new(code, line, args);
            cmd.placement = Placement {
                index: out.len() as u32,
                offset,
                expr_offset: 0,
            };
            out.push(cmd);
        }
        Ok(out)
    }

    fn sectioned(&self, count: u32, commands: &[u8], arguments: &[u8], lines: &[u8]) -> Result<Vec<Command>> {
        let mut rc = Reader::new(commands);
        let mut ra = Reader::new(arguments);
        let mut rl = Reader::new(lines);
        let mut out = Vec::with_capacity(count as usize);
        for index in 0..count {
            let offset = rc.pos as u32;
            let code = rc.u8()?;
            let narg = rc.u8()?;
            let param_count = rc.u16()?;
            let line = rl.u32()?;
            let args = if CommandCodes::is(code, self.codes.returncode) {
                if narg != 1 {
                    return Err(Error::FormatMismatch(format!(
                        "RETURNCODE with {narg} argument(s) at command {index}"
                    )));
                }
                let raw = read_full(&mut ra)?;
                vec![Argument {
                    id: raw.id,
                    value_type: raw.value_type,
                    assign: raw.assign,
                    payload: ArgPayload::Value(raw.a),
                }]
            } else {
                self.args(&mut ra, code, narg)?
            };
            let mut cmd = Command::new(code, line, args);
            cmd.param_count = param_count;
            cmd.placement = Placement {
                index,
                offset,
                expr_offset: 0,
            };
            out.push(cmd);
        }
        if !ra.at_end() {
            return Err(Error::FormatMismatch(format!(
                "{} trailing byte(s) in argument section",
                arguments.len() - ra.pos
            )));
        }
        Ok(out)
    }
}

/// Branch slots were read as raw positions; map them onto command ids.
fn resolve_targets(commands: &mut [Command], sectioned: bool) -> Result<()> {
    let by_offset: HashMap<u32, usize> = commands
        .iter()
        .enumerate()
        .map(|(i, c)| (c.placement.offset, i))
        .collect();
    let count = commands.len();
    for (index, cmd) in commands.iter_mut().enumerate() {
        for arg in cmd.args.iter_mut() {
            let ArgPayload::Target(CommandId(pos)) = arg.payload else {
                continue;
            };
            let resolved = if sectioned {
                (pos < count).then_some(pos)
            } else {
                u32::try_from(pos).ok().and_then(|p| by_offset.get(&p).copied())
            };
            let Some(i) = resolved else {
                return Err(Error::FormatMismatch(format!(
                    "branch target {pos} of command {index} (0x{:02X}) points at no command",
                    cmd.code
                )));
            };
            arg.payload = ArgPayload::Target(CommandId(i));
        }
    }
    Ok(())
}

pub fn disassemble_segments(seg: &Segments, catalog: &CommandCatalog, encoding: Encoding) -> Result<Script> {
    let dec = Decoder {
        version: seg.version(),
        codes: catalog.codes(),
        encoding,
        expressions: seg.expressions(),
    };
    let mut commands = match seg {
        Segments::Legacy { commands, .. } => dec.legacy(commands)?,
        Segments::Sectioned {
            command_count,
            commands,
            arguments,
            lines,
            ..
        } => dec.sectioned(*command_count, commands, arguments, lines)?,
    };
    resolve_targets(&mut commands, matches!(seg, Segments::Sectioned { .. }))?;
    Ok(Script {
        version: seg.version(),
        commands,
    })
}

pub fn disassemble(
    data: &[u8],
    opts: &OpenOptions,
    catalog: &CommandCatalog,
    encoding: Encoding,
) -> Result<Script> {
    disassemble_segments(&Segments::open(data, opts)?, catalog, encoding)
}

impl Script {
    /// Human-readable dump, one command per line followed by its arguments.
    pub fn listing(&self, catalog: &CommandCatalog) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "YSTB ver={} ncmd={}", self.version, self.commands.len());
        for (i, cmd) in self.commands.iter().enumerate() {
            let name = catalog.name_of(cmd.code).unwrap_or("?");
            let _ = writeln!(
                out,
                "[{i}] off={} lno={} npar={} {}:{}",
                cmd.placement.offset, cmd.line, cmd.param_count, cmd.code, name
            );
            for (j, arg) in cmd.args.iter().enumerate() {
                let aname = catalog.arg_name(cmd.code, arg.id).unwrap_or("");
                let _ = writeln!(
                    out,
                    "- [{j}] {aname} typ={} aop={} {:?}",
                    arg.value_type,
                    arg.assign.symbol(),
                    arg.payload
                );
            }
        }
        out
    }
}
