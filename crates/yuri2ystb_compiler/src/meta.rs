use anyhow::{anyhow, bail, Context, Result};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use ystb_core::catalog::CommandCatalog;
use ystb_core::cipher::XorKey;
use ystb_core::nls::Encoding;
use ystb_core::tables::Variable;
use ystb_core::types::{check_version, ValueType, USER_VAR_BASE};

/// Build settings of one project, read from `project.yaml`.
#[derive(Clone, Debug)]
pub struct ProjectMeta {
    pub version: u32,
    /// Overrides the version's default section key.
    pub key: Option<u32>,
    pub nls: Encoding,
    pub parallel: bool,
    /// Worker threads for parallel compilation; rayon's default when absent.
    pub workers: Option<usize>,
    pub catalog: CommandCatalog,
    /// Engine variables, indexed by position.
    pub builtins: Vec<Variable>,
    /// Source names for engine variables, besides `__Sys{index}`.
    pub aliases: BTreeMap<String, u16>,
}

impl ProjectMeta {
    pub fn new(version: u32, catalog: CommandCatalog) -> Self {
        Self {
            version,
            key: None,
            nls: Encoding::default(),
            parallel: true,
            workers: None,
            catalog,
            builtins: Vec::new(),
            aliases: BTreeMap::new(),
        }
    }

    pub fn xor_key(&self) -> XorKey {
        self.key.map_or_else(|| XorKey::for_version(self.version), XorKey::from)
    }

    /// Engine variables visible from source: `__Sys{i}` for every builtin
    /// plus the configured aliases.
    pub fn constants(&self) -> Result<BTreeMap<String, (ValueType, u16)>> {
        let mut out = BTreeMap::new();
        for (i, var) in self.builtins.iter().enumerate() {
            if var.index as usize != i {
                bail!("builtin variable #{i} carries index {}", var.index);
            }
            out.insert(format!("__Sys{i}"), (var.value_type, var.index));
        }
        for (name, &index) in &self.aliases {
            let var = self
                .builtins
                .get(index as usize)
                .ok_or_else(|| anyhow!("alias {name} names missing builtin {index}"))?;
            out.insert(name.clone(), (var.value_type, index));
        }
        Ok(out)
    }

    pub fn from_yaml(txt: &str) -> Result<Self> {
        let doc: Value = serde_yaml::from_str(txt).context("parse yaml")?;
        let map = doc
            .as_mapping()
            .ok_or_else(|| anyhow!("meta must be a mapping"))?;
        let get = |k: &str| -> Option<&Value> { map.get(&Value::String(k.to_string())) };

        let version = as_u32(get("version").ok_or_else(|| anyhow!("meta.version is required"))?, "version")?;
        let version = check_version(version)?;

        let key = get("key").map(|v| as_u32(v, "key")).transpose()?;

        let nls = match get("nls") {
            Some(v) => as_str(v, "nls")?
                .parse::<Encoding>()
                .map_err(|e| anyhow!("meta.nls: {e}"))?,
            None => Encoding::ShiftJis,
        };

        let parallel = match get("parallel") {
            Some(Value::Bool(b)) => *b,
            Some(_) => bail!("parallel must be a bool"),
            None => true,
        };

        let workers = get("workers")
            .map(|v| as_u32(v, "workers").map(|n| n as usize))
            .transpose()?;
        if workers == Some(0) {
            bail!("workers must be at least 1");
        }

        let catalog: CommandCatalog = serde_yaml::from_value(
            get("commands")
                .ok_or_else(|| anyhow!("meta.commands is required"))?
                .clone(),
        )
        .context("meta.commands")?;

        let mut builtins: Vec<Variable> = match get("builtins") {
            Some(v) => serde_yaml::from_value(v.clone()).context("meta.builtins")?,
            None => Vec::new(),
        };
        builtins.truncate(USER_VAR_BASE as usize);

        let aliases = match get("aliases") {
            Some(v) => serde_yaml::from_value(v.clone()).context("meta.aliases")?,
            None => BTreeMap::new(),
        };

        let meta = ProjectMeta {
            version,
            key,
            nls,
            parallel,
            workers,
            catalog,
            builtins,
            aliases,
        };
        meta.constants()?;
        Ok(meta)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let txt = std::fs::read_to_string(path).with_context(|| format!("read meta: {}", path.display()))?;
        Self::from_yaml(&txt).with_context(|| format!("load meta: {}", path.display()))
    }
}

fn as_u32(v: &Value, key: &str) -> Result<u32> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .and_then(|x| u32::try_from(x).ok())
            .ok_or_else(|| anyhow!("{key} must be a u32")),
        _ => bail!("{key} must be a number"),
    }
}

fn as_str<'a>(v: &'a Value, key: &str) -> Result<&'a str> {
    match v {
        Value::String(s) => Ok(s),
        _ => bail!("{key} must be a string"),
    }
}
