//! Decompiler from YSTB bytecode back to source.
//!
//! [`Decompiler`] rebuilds the shared program tree from a disassembled
//! script; [`render`] prints that tree as `yuri` (re-compilable) or `yuris`
//! (the engine's compact dialect).

pub mod decls;
pub mod error;
pub mod reconstruct;
pub mod render;

pub use decls::{declaration_program, needs_declaration_file};
pub use error::DecompileError;
pub use reconstruct::Decompiler;

use ystb_core::ast::Program;

/// Output dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Syntax {
    Yuri,
    Yuris,
}

impl Syntax {
    pub fn render(self, program: &Program) -> String {
        match self {
            Syntax::Yuri => render::yuri::render(program),
            Syntax::Yuris => render::yuris::render(program),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Syntax::Yuri => "yuri",
            Syntax::Yuris => "yuris",
        }
    }
}

impl std::str::FromStr for Syntax {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yuri" => Ok(Syntax::Yuri),
            "yuris" => Ok(Syntax::Yuris),
            other => Err(format!("unknown output syntax `{other}`")),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_catalog() -> ystb_core::catalog::CommandCatalog {
    serde_yaml::from_str(include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../testcase/catalog.yaml")))
        .expect("catalog fixture")
}
