use crate::error::{Error, Result};
use crate::types::ValueType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgDesc {
    pub name: String,
    #[serde(default)]
    pub value_type: ValueType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDesc {
    pub name: String,
    #[serde(default)]
    pub args: Vec<ArgDesc>,
}

/// The engine's command table. A command's code is its position in the table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<CommandDesc>", into = "Vec<CommandDesc>")]
pub struct CommandCatalog {
    commands: Vec<CommandDesc>,
    by_name: HashMap<String, u8>,
}

impl TryFrom<Vec<CommandDesc>> for CommandCatalog {
    type Error = Error;

    fn try_from(commands: Vec<CommandDesc>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(commands.len());
        for (i, c) in commands.iter().enumerate() {
            let code = u8::try_from(i).map_err(|_| {
                Error::FormatMismatch(format!(
                    "command table holds {} entries, at most 256 fit a code",
                    commands.len()
                ))
            })?;
            by_name.insert(c.name.clone(), code);
        }
        Ok(Self { commands, by_name })
    }
}

impl From<CommandCatalog> for Vec<CommandDesc> {
    fn from(c: CommandCatalog) -> Self {
        c.commands
    }
}

impl CommandCatalog {
    pub fn commands(&self) -> &[CommandDesc] {
        &self.commands
    }

    pub fn code_of(&self, name: &str) -> Option<u8> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, code: u8) -> Option<&CommandDesc> {
        self.commands.get(code as usize)
    }

    pub fn name_of(&self, code: u8) -> Option<&str> {
        self.get(code).map(|c| c.name.as_str())
    }

    pub fn arg_id(&self, code: u8, arg: &str) -> Option<u16> {
        self.get(code)?
            .args
            .iter()
            .position(|a| a.name == arg)
            .map(|i| i as u16)
    }

    pub fn arg_name(&self, code: u8, id: u16) -> Option<&str> {
        self.get(code)?.args.get(id as usize).map(|a| a.name.as_str())
    }

    pub fn codes(&self) -> CommandCodes {
        CommandCodes {
            if_: self.code_of("IF"),
            else_: self.code_of("ELSE"),
            ifblend: self.code_of("IFBLEND"),
            ifend: self.code_of("IFEND"),
            loop_: self.code_of("LOOP"),
            loopend: self.code_of("LOOPEND"),
            let_: self.code_of("LET"),
            word: self.code_of("WORD"),
            returncode: self.code_of("RETURNCODE"),
            eval: self.code_of("_"),
            end: self.code_of("END"),
            gosub: self.code_of("GOSUB"),
            return_: self.code_of("RETURN"),
        }
    }
}

/// Codes of the commands with structural meaning, resolved by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandCodes {
    pub if_: Option<u8>,
    pub else_: Option<u8>,
    pub ifblend: Option<u8>,
    pub ifend: Option<u8>,
    pub loop_: Option<u8>,
    pub loopend: Option<u8>,
    pub let_: Option<u8>,
    pub word: Option<u8>,
    pub returncode: Option<u8>,
    pub eval: Option<u8>,
    pub end: Option<u8>,
    pub gosub: Option<u8>,
    pub return_: Option<u8>,
}

impl CommandCodes {
    #[inline]
    pub fn is(code: u8, which: Option<u8>) -> bool {
        which == Some(code)
    }
}
