//! Core model of the YSTB script bytecode used by the YU-RIS engine.
//!
//! * [`expr`]: the postfix expression instruction codec.
//! * [`asm`] / [`disasm`]: the versioned command/argument layout, both ways.
//! * [`ystb`] / [`cipher`]: the container header and section obfuscation.
//! * [`ast`]: the structured program tree both tool directions work on.

pub mod asm;
pub mod ast;
pub mod catalog;
pub mod cipher;
pub mod command;
pub mod disasm;
pub mod error;
pub mod expr;
pub mod nls;
pub mod tables;
pub mod types;
pub mod ystb;

pub use error::{Error, Result};
