//! Whole-project build: scan, declaration collection, per-file compilation
//! (parallel or serial, with a content-hash cache), linking and sealing.

use crate::decls::{collect, VarDef};
use crate::error::{BuildFailure, CompileError, ErrorKind};
use crate::frontend::{compile_source, CompiledFile, Environment, FileKind};
use crate::link::{link, Linked};
use crate::meta::ProjectMeta;
use crate::syntax::parse_program;
use anyhow::{Context, Result};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use ystb_core::types::{Scope, ValueType};

pub const SOURCE_EXT: &str = "yuri";

/// One source file, its path relative to the project root with `/` separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub text: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    fn dir(&self) -> &str {
        self.path.rsplit_once('/').map_or("", |(d, _)| d)
    }

    /// `None` for macro files, which are never compiled.
    fn kind(&self) -> Option<FileKind> {
        let base = self.path.rsplit('/').next().unwrap_or(&self.path);
        match base.split('.').next().unwrap_or(base) {
            "macro" => None,
            "global" => Some(FileKind::GlobalDecl),
            "global_f" => Some(FileKind::GroupDecl),
            _ => Some(FileKind::Script),
        }
    }
}

/// Read every `.yuri` file below `root`.
pub fn scan_sources(root: &Path) -> Result<Vec<SourceFile>> {
    let pattern = format!("{}/**/*.{SOURCE_EXT}", glob::Pattern::escape(&root.to_string_lossy()));
    let mut out = Vec::new();
    for entry in glob::glob(&pattern).context("bad source pattern")? {
        let path = entry.context("scan sources")?;
        if !path.is_file() {
            continue;
        }
        let rel = path
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let text = std::fs::read_to_string(&path).with_context(|| format!("read source: {}", path.display()))?;
        out.push(SourceFile::new(rel, text));
    }
    Ok(out)
}

/// Compiled files from earlier builds, keyed by path and content digest.
#[derive(Debug, Default)]
pub struct CompileCache {
    entries: HashMap<String, (String, CompiledFile)>,
}

impl CompileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get(&self, path: &str, digest: &str) -> Option<&CompiledFile> {
        self.entries
            .get(path)
            .filter(|(d, _)| d == digest)
            .map(|(_, f)| f)
    }

    fn insert(&mut self, digest: String, file: CompiledFile) {
        self.entries.insert(file.path.clone(), (digest, file));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Build {
    pub linked: Linked,
    /// Sealed `YSTB` images, parallel to `linked.scripts`.
    pub binaries: Vec<Vec<u8>>,
    pub compiled: usize,
    pub reused: usize,
}

struct Job<'a> {
    source: &'a SourceFile,
    kind: FileKind,
    digest: String,
}

fn type_map(defs: &[VarDef]) -> HashMap<String, ValueType> {
    defs.iter().map(|d| (d.name.clone(), d.value_type)).collect()
}

fn hash_env(h: &mut Sha256, label: &str, map: &HashMap<String, ValueType>) {
    let sorted: BTreeMap<_, _> = map.iter().collect();
    h.update(label.as_bytes());
    for (name, ty) in sorted {
        h.update(name.as_bytes());
        h.update([0, *ty as u8]);
    }
}

/// Collect global and function-group definitions, in file order.
fn declarations(
    files: &[(&SourceFile, FileKind)],
) -> Result<(Vec<VarDef>, Vec<(String, Vec<VarDef>)>), Vec<CompileError>> {
    let mut errors = Vec::new();
    let mut globals: Vec<VarDef> = Vec::new();
    let mut groups: Vec<(String, Vec<VarDef>)> = Vec::new();
    let mut pending: Vec<(&SourceFile, Vec<VarDef>)> = Vec::new();
    for &(src, kind) in files {
        let scope = match kind {
            FileKind::GlobalDecl => Scope::Global,
            FileKind::GroupDecl => Scope::FunctionGroup,
            FileKind::Script => continue,
        };
        let defs = parse_program(&src.text)
            .map_err(|e| CompileError::syntax(&src.path, e))
            .and_then(|p| collect(&p, scope, &src.path));
        match defs {
            Ok(defs) if scope == Scope::Global => {
                for d in defs {
                    if globals.iter().any(|g| g.name == d.name) {
                        errors.push(CompileError::new(&src.path, 0, ErrorKind::DuplicateDeclaration(d.name)));
                    } else {
                        globals.push(d);
                    }
                }
            }
            Ok(defs) => pending.push((src, defs)),
            Err(e) => errors.push(e),
        }
    }
    // group names may not shadow globals; checked once every global is known
    for (src, defs) in pending {
        let dir = src.dir().to_string();
        let at = match groups.iter().position(|(d, _)| *d == dir) {
            Some(i) => i,
            None => {
                groups.push((dir, Vec::new()));
                groups.len() - 1
            }
        };
        for d in defs {
            let clash = globals.iter().any(|g| g.name == d.name) || groups[at].1.iter().any(|g| g.name == d.name);
            if clash {
                errors.push(CompileError::new(&src.path, 0, ErrorKind::DuplicateDeclaration(d.name)));
            } else {
                groups[at].1.push(d);
            }
        }
    }
    if errors.is_empty() {
        Ok((globals, groups))
    } else {
        Err(errors)
    }
}

/// Compile, link and seal a project.
pub fn build(sources: &[SourceFile], meta: &ProjectMeta, cache: &mut CompileCache) -> Result<Build> {
    let mut files = Vec::with_capacity(sources.len());
    for src in sources {
        let Some(kind) = src.kind() else {
            log::debug!("{}: macro file, skipped", src.path);
            continue;
        };
        let key = meta
            .nls
            .encode(&src.path.to_lowercase())
            .with_context(|| format!("{}: path is not representable in {}", src.path, meta.nls.name()))?;
        files.push((key, src, kind));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    let files: Vec<(&SourceFile, FileKind)> = files.into_iter().map(|(_, s, k)| (s, k)).collect();

    let (globals, groups) = declarations(&files).map_err(|errors| BuildFailure { errors })?;
    let constants: HashMap<String, (ValueType, u16)> = meta.constants()?.into_iter().collect();
    let global_types = type_map(&globals);
    let group_types: HashMap<&str, HashMap<String, ValueType>> =
        groups.iter().map(|(dir, defs)| (dir.as_str(), type_map(defs))).collect();
    let no_group = HashMap::new();

    let mut base = Sha256::new();
    base.update(meta.version.to_le_bytes());
    base.update(meta.nls.name().as_bytes());
    hash_env(&mut base, "global", &global_types);
    let mut sorted_constants: Vec<_> = constants.iter().collect();
    sorted_constants.sort();
    for (name, (ty, idx)) in sorted_constants {
        base.update(name.as_bytes());
        base.update([*ty as u8]);
        base.update(idx.to_le_bytes());
    }
    let jobs: Vec<Job<'_>> = files
        .iter()
        .map(|&(source, kind)| {
            let mut h = base.clone();
            hash_env(&mut h, "group", group_types.get(source.dir()).unwrap_or(&no_group));
            h.update([kind as u8]);
            h.update(source.path.as_bytes());
            h.update([0]);
            h.update(source.text.as_bytes());
            Job {
                source,
                kind,
                digest: hex::encode(h.finalize()),
            }
        })
        .collect();

    let compile_one = |job: &Job<'_>| -> Result<CompiledFile, CompileError> {
        let env = Environment {
            catalog: &meta.catalog,
            constants: &constants,
            globals: &global_types,
            groups: group_types.get(job.source.dir()).unwrap_or(&no_group),
            version: meta.version,
            encoding: meta.nls,
        };
        let out = compile_source(&job.source.text, &env, job.kind, &job.source.path);
        if out.is_ok() {
            log::info!("compiled {}", job.source.path);
        }
        out
    };

    let pending: Vec<&Job<'_>> = jobs
        .iter()
        .filter(|j| {
            let hit = cache.get(&j.source.path, &j.digest).is_some();
            if hit {
                log::debug!("{}: unchanged, reusing cached output", j.source.path);
            }
            !hit
        })
        .collect();
    let results: Vec<Result<CompiledFile, CompileError>> = if meta.parallel {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(n) = meta.workers {
            builder = builder.num_threads(n);
        }
        let pool = builder.build().context("start compile workers")?;
        pool.install(|| pending.par_iter().map(|j| compile_one(*j)).collect())
    } else {
        pending.iter().map(|j| compile_one(*j)).collect()
    };

    let compiled = results.len();
    let mut errors = Vec::new();
    let mut fresh = HashMap::new();
    for (job, res) in pending.iter().zip(results) {
        match res {
            Ok(file) => {
                fresh.insert(job.source.path.as_str(), file);
            }
            Err(e) => errors.push(e),
        }
    }
    for job in &pending {
        if let Some(file) = fresh.get(job.source.path.as_str()) {
            cache.insert(job.digest.clone(), file.clone());
        }
    }
    if !errors.is_empty() {
        return Err(BuildFailure { errors }.into());
    }
    let mut outputs = Vec::with_capacity(jobs.len());
    for job in &jobs {
        let file = match fresh.remove(job.source.path.as_str()) {
            Some(f) => f,
            None => cache
                .get(&job.source.path, &job.digest)
                .cloned()
                .with_context(|| format!("{}: missing compiled output", job.source.path))?,
        };
        outputs.push(file);
    }

    let linked = link(&outputs, &meta.builtins, &globals, &groups, meta.nls, meta.parallel).context("link")?;
    let key = meta.xor_key();
    let binaries = linked.segments.iter().map(|s| s.seal(Some(key))).collect();
    log::info!(
        "built {} script(s): {} compiled, {} reused, {} variable(s)",
        outputs.len(),
        compiled,
        outputs.len() - compiled,
        linked.total_vars
    );
    Ok(Build {
        linked,
        binaries,
        compiled,
        reused: jobs.len() - compiled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_catalog;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn meta(parallel: bool) -> ProjectMeta {
        let mut m = ProjectMeta::new(300, test_catalog());
        m.nls = ystb_core::nls::Encoding::Utf8;
        m.parallel = parallel;
        m.workers = Some(3);
        m
    }

    fn sources() -> Vec<SourceFile> {
        vec![
            SourceFile::new("start.yuri", indoc! {r#"
                INT[i.N] = 0
                while i.N < 3 do
                    i.N += 1
                    score.N = score.N + i.N
                end
                GOSUB(LBL = "ev_main")
            "#}),
            SourceFile::new("global.yuri", "G_INT[score.N] = 5\nG_STR[title.S] = \"t\"\n"),
            SourceFile::new("ev/global_f.yuri", "F_INT[hp.N] = 10\n"),
            SourceFile::new("ev/main.yuri", indoc! {r#"
                label "ev_main"
                S_STR[who.S] = "a"
                if hp.N > 0 then
                    "hello"
                    yield 1
                else
                    hp.N = 10
                end
            "#}),
            SourceFile::new("ev/Battle.yuri", "hp.N -= score.N\n"),
            SourceFile::new("macro.yuri", "this is not parsed"),
        ]
    }

    #[test]
    fn builds_in_path_order() {
        let b = build(&sources(), &meta(false), &mut CompileCache::new()).unwrap();
        let paths: Vec<&str> = b.linked.scripts.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["ev\\Battle", "ev\\global_f", "ev\\main", "global", "start"]);
        let counts: Vec<i32> = b.linked.scripts.iter().map(|s| s.var_count).collect();
        assert_eq!(counts, vec![0, -1, 1, -1, 1]);
        // score, title, hp, who, then the local
        assert_eq!(b.linked.variables.len(), 4);
        assert_eq!(b.linked.total_vars, 5);
        assert_eq!(b.binaries.len(), 5);
        assert!(b.binaries.iter().all(|bin| bin.starts_with(b"YSTB")));
        assert_eq!(b.compiled, 5);
    }

    #[test]
    fn parallel_matches_serial() {
        let serial = build(&sources(), &meta(false), &mut CompileCache::new()).unwrap();
        let parallel = build(&sources(), &meta(true), &mut CompileCache::new()).unwrap();
        assert_eq!(serial.binaries, parallel.binaries);
        assert_eq!(serial.linked, parallel.linked);
    }

    #[test]
    fn cache_is_transparent() {
        let mut cache = CompileCache::new();
        let first = build(&sources(), &meta(true), &mut cache).unwrap();
        assert_eq!(cache.len(), 5);
        let second = build(&sources(), &meta(true), &mut cache).unwrap();
        assert_eq!(second.compiled, 0);
        assert_eq!(second.reused, 5);
        assert_eq!(first.binaries, second.binaries);

        // a changed global type invalidates every dependent entry
        let mut changed = sources();
        changed[1].text = "G_INT[score.N] = 5\nG_INT[title.N]\n".into();
        let third = build(&changed, &meta(true), &mut cache).unwrap();
        assert_eq!(third.compiled, 5);
    }

    #[test]
    fn failures_are_aggregated() {
        let mut bad = sources();
        bad[0].text = "nope.N = 1\n".into();
        bad[4].text = "hp.N = title.S + 1\n".into();
        let mut cache = CompileCache::new();
        let err = build(&bad, &meta(true), &mut cache).unwrap_err();
        let failure = err.downcast_ref::<BuildFailure>().unwrap();
        let files: Vec<&str> = failure.errors.iter().map(|e| e.file.as_str()).collect();
        assert_eq!(files, vec!["ev/Battle.yuri", "start.yuri"]);
        // the files that did compile are kept for the next build
        assert_eq!(cache.len(), 3);
        let fixed = build(&sources(), &meta(true), &mut cache).unwrap();
        assert_eq!(fixed.compiled, 2);
        assert_eq!(fixed.reused, 3);
        let clean = build(&sources(), &meta(true), &mut CompileCache::new()).unwrap();
        assert_eq!(fixed.binaries, clean.binaries);
    }

    #[test]
    fn duplicate_declarations_across_files() {
        let mut dup = sources();
        dup.push(SourceFile::new("sub/global.yuri", "G_INT[score.N]\n"));
        let err = build(&dup, &meta(false), &mut CompileCache::new()).unwrap_err();
        let failure = err.downcast_ref::<BuildFailure>().unwrap();
        assert!(matches!(&failure.errors[0].kind, ErrorKind::DuplicateDeclaration(n) if n == "score"));

        let mut shadow = sources();
        shadow[2].text = "F_INT[score.N]\n".into();
        let err = build(&shadow, &meta(false), &mut CompileCache::new()).unwrap_err();
        assert!(err.downcast_ref::<BuildFailure>().is_some());
    }

    #[test]
    fn scans_source_tree() {
        let root = std::env::temp_dir().join(format!("yuri-scan-{}", std::process::id()));
        std::fs::create_dir_all(root.join("ev")).unwrap();
        std::fs::write(root.join("a.yuri"), "pass\n").unwrap();
        std::fs::write(root.join("ev/b.yuri"), "pass\n").unwrap();
        std::fs::write(root.join("ev/notes.txt"), "x").unwrap();
        let mut found: Vec<String> = scan_sources(&root).unwrap().into_iter().map(|s| s.path).collect();
        found.sort();
        std::fs::remove_dir_all(&root).unwrap();
        assert_eq!(found, vec!["a.yuri", "ev/b.yuri"]);
    }
}
