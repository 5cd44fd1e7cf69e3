use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use crate::merge::{MergeOptions, NumericMerge};
use crate::ontology::ValidationPolicy;
use crate::vector::DistanceMetric;

/// Contents of `vectorgraph.toml`; every section is optional
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct GraphConfig {
    pub backend: BackendConfig,
    pub vectors: VectorConfig,
    pub embedding: EmbeddingConfig,
    pub merge: MergeConfig,
    pub ontology: OntologyConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// SQLite file
    #[default]
    Local,
    /// In-memory SQLite, discarded on exit
    Memory,
    /// libSQL / Turso over the network
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub path: Option<String>,
    pub url: Option<String>,
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorPlacement {
    /// Embedding tables in the graph backend
    #[default]
    Colocated,
    /// Separate in-process index
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct VectorConfig {
    pub placement: VectorPlacement,
    pub metric: DistanceMetric,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Hash,
    Fastembed,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Hash,
            dimension: 384,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MergeConfig {
    pub threshold: f32,
    pub k: usize,
    pub numeric: NumericMerge,
}

impl Default for MergeConfig {
    fn default() -> Self {
        let options = MergeOptions::default();
        Self {
            threshold: options.threshold,
            k: options.k,
            numeric: options.numeric,
        }
    }
}

impl MergeConfig {
    pub fn options(&self) -> MergeOptions {
        MergeOptions {
            threshold: self.threshold,
            k: self.k,
            numeric: self.numeric,
        }
    }
}

/// Required keys per resource type; validation is off while empty
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct OntologyConfig {
    pub policy: ValidationPolicy,
    pub required: BTreeMap<String, Vec<String>>,
}

impl GraphConfig {
    /// An in-memory configuration (for testing and scratch use)
    pub fn in_memory() -> Self {
        Self {
            backend: BackendConfig {
                kind: BackendKind::Memory,
                ..BackendConfig::default()
            },
            ..Self::default()
        }
    }

    /// Database file for a local backend, relative paths resolved against `base`
    pub fn database_path_in(&self, base: &Path) -> PathBuf {
        match &self.backend.path {
            Some(path) if Path::new(path).is_absolute() => PathBuf::from(path),
            Some(path) => base.join(path),
            None => default_database_path_in(base),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("vectorgraph.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".vectorgraph").join("graph.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<GraphConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: GraphConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &GraphConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn ensure_gitignore(project_root: &Path) -> anyhow::Result<()> {
    let gitignore_path = project_root.join(".gitignore");
    let entry = ".vectorgraph/";

    let mut content = String::new();
    if gitignore_path.exists() {
        content = std::fs::read_to_string(&gitignore_path)?;
        if content.lines().any(|line| line.trim() == entry) {
            return Ok(());
        }
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
    }
    content.push_str(entry);
    content.push('\n');
    std::fs::write(&gitignore_path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let text = r#"
[backend]
kind = "remote"
url = "libsql://example.turso.io"

[vectors]
placement = "memory"
metric = "cosine"

[embedding]
provider = "none"

[merge]
threshold = 0.5
numeric = "sum"

[ontology]
policy = "discard"
[ontology.required]
person = ["name"]
"#;
        let config: GraphConfig = toml::from_str(text).unwrap();
        assert_eq!(config.backend.kind, BackendKind::Remote);
        assert_eq!(config.vectors.placement, VectorPlacement::Memory);
        assert_eq!(config.vectors.metric, DistanceMetric::Cosine);
        assert_eq!(config.embedding.provider, ProviderKind::None);
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.merge.numeric, NumericMerge::Sum);
        assert_eq!(config.merge.k, 3);
        assert_eq!(config.ontology.policy, ValidationPolicy::Discard);
        assert_eq!(config.ontology.required["person"], vec!["name".to_string()]);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: GraphConfig = toml::from_str("").unwrap();
        assert_eq!(config, GraphConfig::default());
        assert_eq!(config.merge.threshold, 0.9);
    }

    #[test]
    fn test_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectorgraph.toml");
        let config = GraphConfig::in_memory();

        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());
        assert_eq!(load_config(Some(&path)).unwrap(), Some(config));
    }

    #[test]
    fn test_database_path_resolution() {
        let base = Path::new("/work");
        let mut config = GraphConfig::default();
        assert_eq!(config.database_path_in(base), PathBuf::from("/work/.vectorgraph/graph.db"));

        config.backend.path = Some("data/g.db".to_string());
        assert_eq!(config.database_path_in(base), PathBuf::from("/work/data/g.db"));
    }

    #[test]
    fn test_gitignore_entry_added_once() {
        let dir = tempfile::tempdir().unwrap();
        ensure_gitignore(dir.path()).unwrap();
        ensure_gitignore(dir.path()).unwrap();

        let content = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(content, ".vectorgraph/\n");
    }
}
