//! Two-pass command assembler.
//!
//! The first pass lays out surviving commands so branch targets know their
//! final index/offset; the second pass writes the records.

use crate::command::{ArgPayload, Argument, Command};
use crate::error::{Error, Result};
use crate::expr::Instruction;
use crate::nls::Encoding;
use crate::types::{check_version, V290, V300};
use crate::ystb::Segments;
use byteorder::{LittleEndian, WriteBytesExt};

pub const LEGACY_COMMAND_LEN: usize = 6;
pub const COMMAND_LEN: usize = 4;
pub const ARGUMENT_LEN: usize = 12;

/// Called with the expression-data offset of every instruction as it is written.
pub type InstructionObserver<'a> = dyn FnMut(usize, &Instruction) + 'a;

pub fn assemble(commands: &mut [Command], version: u32, encoding: Encoding) -> Result<Segments> {
    assemble_observed(commands, version, encoding, &mut |_, _| {})
}

pub fn assemble_observed(
    commands: &mut [Command],
    version: u32,
    encoding: Encoding,
    observer: &mut InstructionObserver<'_>,
) -> Result<Segments> {
    let version = check_version(version)?;
    let sectioned = version >= V300;

    // Layout. Skipped commands take the position of the next survivor.
    let mut expressions = Vec::new();
    let mut arg_data: Vec<Vec<(u32, u32)>> = Vec::with_capacity(commands.len());
    let (mut index, mut offset) = (0u32, 0u32);
    for cmd in commands.iter_mut() {
        cmd.placement.index = index;
        cmd.placement.offset = offset;
        cmd.placement.expr_offset = expressions.len() as u32;
        if cmd.skip.omitted_at(version) {
            arg_data.push(Vec::new());
            continue;
        }
        index += 1;
        let record = if sectioned { COMMAND_LEN } else { LEGACY_COMMAND_LEN };
        offset += record as u32;
        let mut spans = Vec::with_capacity(cmd.args.len());
        for arg in &cmd.args {
            if !sectioned {
                offset += arg.record_size(version) as u32;
            }
            let start = expressions.len();
            write_payload(arg, &mut expressions, encoding, observer)?;
            spans.push((start as u32, (expressions.len() - start) as u32));
        }
        arg_data.push(spans);
    }

    let mut cmds = Vec::new();
    let mut args = Vec::new();
    let mut lines = Vec::new();
    for (cmd, spans) in commands.iter().zip(&arg_data) {
        if cmd.skip.omitted_at(version) {
            continue;
        }
        let narg = u8::try_from(cmd.args.len()).map_err(|_| {
            Error::malformed(0, format!("command 0x{:02X} has {} arguments", cmd.code, cmd.args.len()))
        })?;
        cmds.push(cmd.code);
        cmds.push(narg);
        if sectioned {
            cmds.write_u16::<LittleEndian>(cmd.param_count).ok();
            lines.write_u32::<LittleEndian>(cmd.line).ok();
        } else {
            cmds.write_u32::<LittleEndian>(cmd.line).ok();
        }
        let out = if sectioned { &mut args } else { &mut cmds };
        for (arg, &(start, len)) in cmd.args.iter().zip(spans) {
            write_record(arg, start, len, version, commands, out)?;
        }
    }

    log::debug!(
        "assembled {} command(s), {} byte(s) of expressions for v{}",
        index,
        expressions.len(),
        version
    );
    Ok(if sectioned {
        Segments::Sectioned {
            version,
            command_count: index,
            commands: cmds,
            arguments: args,
            expressions,
            lines,
        }
    } else {
        Segments::Legacy {
            version,
            commands: cmds,
            expressions,
        }
    })
}

fn write_payload(
    arg: &Argument,
    out: &mut Vec<u8>,
    encoding: Encoding,
    observer: &mut InstructionObserver<'_>,
) -> Result<()> {
    match &arg.payload {
        ArgPayload::None | ArgPayload::Target(_) | ArgPayload::Value(_) => {}
        ArgPayload::Text(s) => out.extend_from_slice(&encoding.encode(s)?),
        ArgPayload::Raw(b) => out.extend_from_slice(b),
        ArgPayload::Expr(ins) => {
            for i in ins {
                let pos = out.len();
                i.encode_into(out)?;
                observer(pos, i);
            }
        }
    }
    Ok(())
}

fn write_record(
    arg: &Argument,
    start: u32,
    len: u32,
    version: u32,
    commands: &[Command],
    out: &mut Vec<u8>,
) -> Result<()> {
    out.write_u16::<LittleEndian>(arg.id).ok();
    out.push(arg.value_type as u8);
    out.push(arg.assign as u8);
    let (a, b) = match &arg.payload {
        ArgPayload::Value(v) => {
            if version < V300 {
                if version == V290 {
                    out.write_u32::<LittleEndian>(*v).ok();
                }
                return Ok(());
            }
            (*v, 0)
        }
        ArgPayload::Target(id) => {
            let target = commands
                .get(id.0)
                .ok_or_else(|| Error::malformed(0, format!("branch target {} out of range", id.0)))?
                .placement;
            let pos = if version >= V300 {
                target.index
            } else {
                target.offset
            };
            (pos, target.expr_offset)
        }
        ArgPayload::None => (0, 0),
        _ => (len, start),
    };
    out.write_u32::<LittleEndian>(a).ok();
    out.write_u32::<LittleEndian>(b).ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandId, SkipRule};
    use crate::types::ValueType;
    use pretty_assertions::assert_eq;

    const IF: u8 = 1;
    const IFEND: u8 = 2;
    const LABEL: u8 = 3;
    const RC: u8 = 4;

    fn program() -> Vec<Command> {
        let cond = Argument::new(0, ValueType::Int, ArgPayload::Expr(vec![Instruction::int(1)]));
        vec![
            Command::new(
                IF,
                1,
                vec![
                    cond,
                    Argument::new(0, ValueType::Unknown, ArgPayload::Target(CommandId(2))),
                    Argument::new(0, ValueType::Unknown, ArgPayload::Target(CommandId(2))),
                ],
            ),
            Command::new(LABEL, 2, vec![]).with_skip(SkipRule::Always),
            Command::new(IFEND, 3, vec![]),
            Command::new(RC, 4, vec![Argument::new(1, ValueType::Unknown, ArgPayload::Value(7))]),
        ]
    }

    #[test]
    fn sectioned_layout() {
        let mut cmds = program();
        let seg = assemble(&mut cmds, 300, Encoding::ShiftJis).unwrap();
        let Segments::Sectioned {
            command_count,
            commands,
            arguments,
            expressions,
            lines,
            ..
        } = seg
        else {
            panic!("expected sectioned output");
        };
        assert_eq!(command_count, 3);
        assert_eq!(commands.len(), 3 * COMMAND_LEN);
        assert_eq!(lines.len(), 3 * 4);
        assert_eq!(arguments.len(), 4 * ARGUMENT_LEN);
        assert_eq!(expressions, Instruction::int(1).encode().unwrap());
        // the skipped label shares its position with IFEND
        assert_eq!(cmds[1].placement.index, 1);
        assert_eq!(cmds[2].placement.index, 1);
        assert_eq!(hex::encode(&arguments[12..24]), "000000000100000004000000");
        assert_eq!(hex::encode(&arguments[36..48]), "010000000700000000000000");
        assert_eq!(hex::encode(&lines), "010000000300000004000000");
    }

    #[test]
    fn legacy_layout() {
        let mut cmds = program();
        let seg = assemble(&mut cmds, 250, Encoding::ShiftJis).unwrap();
        let Segments::Legacy { commands, .. } = &seg else {
            panic!("expected legacy output");
        };
        // IF: 6 + 3 * 12, IFEND: 6, RETURNCODE: 6 + 4
        assert_eq!(commands.len(), 42 + 6 + 10);
        assert_eq!(cmds[2].placement.offset, 42);
        assert_eq!(cmds[3].placement.offset, 48);
        // branch targets hold the byte offset of IFEND
        assert_eq!(&commands[6 + 12 + 4..6 + 12 + 8], &42u32.to_le_bytes());

        let mut cmds = program();
        let Segments::Legacy { commands, .. } = assemble(&mut cmds, 290, Encoding::ShiftJis).unwrap() else {
            panic!("expected legacy output");
        };
        assert_eq!(commands.len(), 42 + 6 + 14);
    }

    #[test]
    fn observer_sees_instruction_offsets() {
        let mut cmds = vec![Command::new(
            9,
            1,
            vec![
                Argument::new(0, ValueType::Str, ArgPayload::Text("ab".into())),
                Argument::new(
                    0,
                    ValueType::Int,
                    ArgPayload::Expr(vec![Instruction::int(1000), Instruction::int(1)]),
                ),
            ],
        )];
        let mut seen = Vec::new();
        assemble_observed(&mut cmds, 494, Encoding::Utf8, &mut |pos, ins| {
            seen.push((pos, ins.clone()))
        })
        .unwrap();
        assert_eq!(
            seen,
            vec![(2, Instruction::int(1000)), (7, Instruction::int(1))]
        );
    }
}
