//! Cross-file linker: final variable indices, index patching, and the
//! label table and script list of a build.
//!
//! Index order is fixed: engine builtins, globals, function-group variables
//! (one directory after another), script variables file by file, and finally
//! every local of every file.

use crate::decls::VarDef;
use crate::frontend::{CompiledFile, FileKind, Symbol};
use crate::error::LinkError;
use byteorder::{ByteOrder, LittleEndian};
use rayon::prelude::*;
use std::collections::HashMap;
use ystb_core::nls::Encoding;
use ystb_core::tables::{Label, ScriptDescriptor, Variable, VariableTable};
use ystb_core::types::{Scope, ValueType, USER_VAR_BASE};
use ystb_core::ystb::Segments;

/// A local variable's final index. Locals never enter the variable table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVar {
    pub file_id: u16,
    pub index: u16,
    pub name: String,
    pub value_type: ValueType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Linked {
    pub variables: VariableTable,
    pub locals: Vec<LocalVar>,
    pub labels: Vec<Label>,
    pub scripts: Vec<ScriptDescriptor>,
    /// Patched, still unencrypted; parallel to `scripts`.
    pub segments: Vec<Segments>,
    pub total_vars: u32,
    pub total_texts: u32,
}

type Patches = Vec<(Vec<usize>, u16)>;

struct Allocator {
    vars: Vec<Variable>,
}

impl Allocator {
    fn next(&self) -> Result<u16, LinkError> {
        u16::try_from(self.vars.len()).map_err(|_| LinkError::IndexOverflow(self.vars.len()))
    }

    fn define(&mut self, def: &VarDef, scope: Scope, file_id: u16, encoding: Encoding) -> Result<u16, LinkError> {
        let index = self.next()?;
        self.vars.push(Variable {
            scope,
            modifier: def.modifier,
            file_id,
            index,
            dims: def.dims.clone(),
            value_type: def.value_type,
            init: def.init.to_initializer(encoding)?,
            name: Some(def.name.clone()),
        });
        Ok(index)
    }
}

fn script_path(path: &str) -> String {
    path.strip_suffix(".yuri").unwrap_or(path).replace('/', "\\")
}

fn patch(file: &CompiledFile, patches: &Patches) -> Result<Segments, LinkError> {
    let mut seg = file.segments.clone();
    let data = seg.expressions_mut();
    for (offsets, index) in patches {
        for &off in offsets {
            let slot = data.get_mut(off..off + 2).ok_or_else(|| LinkError::OffsetOutOfRange {
                file: file.path.clone(),
                offset: off,
            })?;
            LittleEndian::write_u16(slot, *index);
        }
    }
    Ok(seg)
}

/// Link compiled files, given in their fixed build order.
///
/// `builtins` are the engine's variables; only those below the first user
/// index are kept. `groups` pairs a directory with its `global_f` definitions.
pub fn link(
    files: &[CompiledFile],
    builtins: &[Variable],
    globals: &[VarDef],
    groups: &[(String, Vec<VarDef>)],
    encoding: Encoding,
    parallel: bool,
) -> Result<Linked, LinkError> {
    let mut alloc = Allocator {
        vars: builtins
            .iter()
            .take(USER_VAR_BASE as usize)
            .cloned()
            .collect(),
    };

    let mut global_index = HashMap::new();
    for def in globals {
        let idx = alloc.define(def, Scope::Global, 0, encoding)?;
        global_index.insert(def.name.as_str(), idx);
    }
    let mut group_index: HashMap<&str, HashMap<&str, u16>> = HashMap::new();
    for (dir, defs) in groups {
        let map = group_index.entry(dir.as_str()).or_default();
        for def in defs {
            let idx = alloc.define(def, Scope::FunctionGroup, 0, encoding)?;
            map.insert(def.name.as_str(), idx);
        }
    }

    let script_vars: usize = files.iter().map(|f| f.script_var_count as usize).sum();
    let mut local_next = alloc.vars.len() + script_vars;
    let mut locals = Vec::new();
    let mut labels = Vec::new();
    let mut scripts = Vec::with_capacity(files.len());
    let mut patches: Vec<Patches> = Vec::with_capacity(files.len());
    let empty = HashMap::new();

    for (i, file) in files.iter().enumerate() {
        let file_id = u16::try_from(i).map_err(|_| LinkError::IndexOverflow(i))?;
        let group = group_index.get(file.dir()).unwrap_or(&empty);
        let mut file_patches = Vec::with_capacity(file.symbols.len());
        for sym in &file.symbols {
            let index = match sym {
                Symbol::External { name, .. } => group
                    .get(name.as_str())
                    .or_else(|| global_index.get(name.as_str()))
                    .copied()
                    .ok_or_else(|| LinkError::Unresolved {
                        file: file.path.clone(),
                        name: name.clone(),
                    })?,
                Symbol::Local { name, value_type, .. } => {
                    let index = u16::try_from(local_next).map_err(|_| LinkError::IndexOverflow(local_next))?;
                    local_next += 1;
                    locals.push(LocalVar {
                        file_id,
                        index,
                        name: name.clone(),
                        value_type: *value_type,
                    });
                    index
                }
                Symbol::Script { def, .. } => alloc.define(def, Scope::ScriptFile, file_id, encoding)?,
            };
            file_patches.push((sym.offsets().to_vec(), index));
        }
        patches.push(file_patches);

        labels.extend(file.labels.iter().map(|l| Label {
            name: l.name.clone(),
            position: l.position,
            file_id,
            if_depth: l.if_depth,
            loop_depth: l.loop_depth,
        }));
        let var_count = match file.kind {
            FileKind::Script => (file.local_var_count + file.script_var_count) as i32,
            FileKind::GlobalDecl | FileKind::GroupDecl => -1,
        };
        scripts.push(ScriptDescriptor {
            id: file_id,
            path: script_path(&file.path),
            var_count,
            label_count: file.labels.len() as u32,
            text_count: file.text_count,
        });
    }

    let segments = if parallel {
        files
            .par_iter()
            .zip(patches.par_iter())
            .map(|(f, p)| patch(f, p))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        files
            .iter()
            .zip(&patches)
            .map(|(f, p)| patch(f, p))
            .collect::<Result<Vec<_>, _>>()?
    };

    let total_texts = files.iter().map(|f| f.text_count).sum();
    log::debug!(
        "linked {} file(s): {} table variable(s), {} local(s), {} label(s)",
        files.len(),
        alloc.vars.len(),
        locals.len(),
        labels.len()
    );
    Ok(Linked {
        variables: VariableTable { vars: alloc.vars },
        locals,
        labels,
        scripts,
        segments,
        total_vars: local_next as u32,
        total_texts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decls::ConstValue;
    use crate::frontend::{compile_source, Environment};
    use crate::test_catalog;
    use pretty_assertions::assert_eq;
    use ystb_core::catalog::CommandCatalog;
    use ystb_core::tables::Initializer;
    use ystb_core::types::ScopeModifier;

    fn def(name: &str, ty: ValueType, init: ConstValue) -> VarDef {
        VarDef {
            name: name.into(),
            modifier: ScopeModifier::Default,
            dims: vec![],
            value_type: ty,
            init,
        }
    }

    fn builtin(index: u16) -> Variable {
        Variable {
            scope: Scope::Global,
            modifier: ScopeModifier::BuiltinEngine,
            file_id: 0,
            index,
            dims: vec![],
            value_type: ValueType::Int,
            init: Initializer::Int(0),
            name: None,
        }
    }

    struct Project {
        catalog: CommandCatalog,
        globals: Vec<VarDef>,
        groups: Vec<(String, Vec<VarDef>)>,
    }

    impl Project {
        fn new() -> Self {
            Self {
                catalog: test_catalog(),
                globals: vec![def("x", ValueType::Int, ConstValue::Int(5))],
                groups: vec![("ev".into(), vec![def("hp", ValueType::Int, ConstValue::Int(0))])],
            }
        }

        fn compile(&self, sources: &[(&str, &str)]) -> Vec<CompiledFile> {
            let constants = HashMap::new();
            let globals: HashMap<String, ValueType> =
                self.globals.iter().map(|d| (d.name.clone(), d.value_type)).collect();
            sources
                .iter()
                .map(|(path, src)| {
                    let group: HashMap<String, ValueType> = self
                        .groups
                        .iter()
                        .filter(|(dir, _)| path.starts_with(&format!("{dir}/")))
                        .flat_map(|(_, defs)| defs.iter().map(|d| (d.name.clone(), d.value_type)))
                        .collect();
                    let env = Environment {
                        catalog: &self.catalog,
                        constants: &constants,
                        globals: &globals,
                        groups: &group,
                        version: 300,
                        encoding: Encoding::Utf8,
                    };
                    compile_source(src, &env, FileKind::Script, path).unwrap()
                })
                .collect()
        }

        fn link(&self, files: &[CompiledFile], parallel: bool) -> Linked {
            let builtins: Vec<Variable> = (0..3).map(builtin).collect();
            link(files, &builtins, &self.globals, &self.groups, Encoding::Utf8, parallel).unwrap()
        }
    }

    fn index_at(seg: &Segments, off: usize) -> u16 {
        LittleEndian::read_u16(&seg.expressions()[off..off + 2])
    }

    #[test]
    fn assigns_indices_in_order() {
        let p = Project::new();
        let files = p.compile(&[
            ("a.yuri", "INT[i.N] = 1\nS_STR[name.S] = \"n\"\nx.N = x.N + i.N\n"),
            ("ev/b.yuri", "S_INT[n.N]\nINT[j.N]\nhp.N = n.N + j.N + x.N\n"),
        ]);
        let linked = p.link(&files, false);
        // 3 builtins, x = 3, hp = 4, name = 5, n = 6, then locals i = 7, j = 8
        let names: Vec<(Option<&str>, u16, u16)> = linked
            .variables
            .vars
            .iter()
            .map(|v| (v.name.as_deref(), v.index, v.file_id))
            .collect();
        assert_eq!(
            names,
            vec![
                (None, 0, 0),
                (None, 1, 0),
                (None, 2, 0),
                (Some("x"), 3, 0),
                (Some("hp"), 4, 0),
                (Some("name"), 5, 0),
                (Some("n"), 6, 1),
            ]
        );
        assert_eq!(linked.variables.vars[3].init, Initializer::Int(5));
        assert_eq!(linked.variables.vars[4].scope, Scope::FunctionGroup);
        let locals: Vec<(&str, u16, u16)> = linked
            .locals
            .iter()
            .map(|l| (l.name.as_str(), l.index, l.file_id))
            .collect();
        assert_eq!(locals, vec![("i", 7, 0), ("j", 8, 1)]);
        assert_eq!(linked.total_vars, 9);

        // every recorded site now holds its variable's final index
        for (file, seg) in files.iter().zip(&linked.segments) {
            for sym in &file.symbols {
                let want = match sym {
                    Symbol::External { name, .. } if name == "x" => 3,
                    Symbol::External { .. } => 4,
                    Symbol::Script { def, .. } if def.name == "name" => 5,
                    Symbol::Script { .. } => 6,
                    Symbol::Local { name, .. } if name == "i" => 7,
                    Symbol::Local { .. } => 8,
                };
                assert!(!sym.offsets().is_empty());
                for &off in sym.offsets() {
                    assert_eq!(index_at(seg, off), want);
                }
            }
        }
        assert_eq!(
            linked.scripts.iter().map(|s| (s.path.as_str(), s.var_count)).collect::<Vec<_>>(),
            vec![("a", 2), ("ev\\b", 2)]
        );
    }

    #[test]
    fn deterministic_and_parallel_agnostic() {
        let p = Project::new();
        let sources = [
            ("a.yuri", "INT[i.N]\nlabel \"top\"\nx.N = i.N\n\"hello\"\nyield 1\n"),
            ("ev/b.yuri", "S_FLT[f.N] = 2\nhp.N = x.N\n"),
            ("ev/c.yuri", "INT[k.N]\nk.N = hp.N\n"),
        ];
        let files = p.compile(&sources);
        let first = p.link(&files, false);
        assert_eq!(first, p.link(&files, false));
        assert_eq!(first, p.link(&files, true));
        assert_eq!(first.labels[0].name, "top");
        assert_eq!(first.labels[0].position, 1);
        assert_eq!(first.total_texts, 1);
        assert_eq!(first.scripts[0].label_count, 1);
    }

    #[test]
    fn unresolved_and_out_of_range() {
        let p = Project::new();
        let mut files = p.compile(&[("ev/b.yuri", "hp.N = 1\n")]);
        // the same file outside its group directory cannot see `hp`
        files[0].path = "b.yuri".into();
        let builtins = Vec::new();
        let err = link(&files, &builtins, &p.globals, &p.groups, Encoding::Utf8, false).unwrap_err();
        assert_eq!(
            err,
            LinkError::Unresolved {
                file: "b.yuri".into(),
                name: "hp".into()
            }
        );

        let mut files = p.compile(&[("a.yuri", "x.N = 1\n")]);
        if let Symbol::External { offsets, .. } = &mut files[0].symbols[0] {
            offsets.push(10_000);
        }
        let err = link(&files, &builtins, &p.globals, &p.groups, Encoding::Utf8, true).unwrap_err();
        assert!(matches!(err, LinkError::OffsetOutOfRange { offset: 10_000, .. }));
    }

    #[test]
    fn declaration_files_are_listed_without_variables() {
        let p = Project::new();
        let catalog = &p.catalog;
        let constants = HashMap::new();
        let globals: HashMap<String, ValueType> = [("x".to_string(), ValueType::Int)].into();
        let groups = HashMap::new();
        let env = Environment {
            catalog,
            constants: &constants,
            globals: &globals,
            groups: &groups,
            version: 250,
            encoding: Encoding::Utf8,
        };
        let decl = compile_source("G_INT[x.N] = 5\n", &env, FileKind::GlobalDecl, "global.yuri").unwrap();
        let linked = link(&[decl.clone()], &[], &p.globals, &[], Encoding::Utf8, false).unwrap();
        assert_eq!(linked.scripts[0].var_count, -1);
        assert!(linked.scripts[0].is_declaration_file());
        assert_eq!(linked.scripts[0].path, "global");
        let off = decl.symbols[0].offsets()[0];
        assert_eq!(index_at(&linked.segments[0], off), 0);
    }
}
