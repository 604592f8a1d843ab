//! Compiler from `yuri` source to linked YSTB bytecode.
//!
//! Files are parsed and lowered independently ([`frontend`]), with references
//! to variables declared elsewhere left as symbols. [`link`] then assigns every
//! variable its final index and patches those symbols in place. [`project`]
//! drives the whole thing for a source tree.

pub mod decls;
pub mod error;
pub mod frontend;
pub mod link;
pub mod meta;
pub mod project;
pub mod syntax;

pub use error::{BuildFailure, CompileError, ErrorKind, LinkError};
pub use frontend::{compile_source, CompiledFile, Environment, FileKind};
pub use link::{link, Linked};
pub use meta::ProjectMeta;
pub use project::{build, scan_sources, Build, CompileCache, SourceFile};

#[cfg(test)]
pub(crate) fn test_catalog() -> ystb_core::catalog::CommandCatalog {
    serde_yaml::from_str(include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../testcase/catalog.yaml")))
        .expect("catalog fixture")
}
