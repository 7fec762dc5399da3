use crate::error::HarnessError;
use crate::external::ExternalHarness;
use crate::types::LibMetadata;
use anyhow::Result;
use indexmap::IndexMap;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct HarnessEntry {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub timeout_secs: Option<u64>,
    pub link: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct HarnessConfig {
    #[serde(default)]
    pub harnesses: IndexMap<String, HarnessEntry>,
}

fn resolve_relative_to_config(path: &str, config_path: &Path) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        return p.to_path_buf();
    }
    match config_path.parent() {
        Some(dir) => dir.join(p),
        None => p.to_path_buf(),
    }
}

pub fn parse_config(content: &str, config_path: &Path) -> Result<HarnessConfig, HarnessError> {
    serde_yaml::from_str(content).map_err(|source| HarnessError::Config {
        path: config_path.to_path_buf(),
        source,
    })
}

/// Reads a harness config and turns each entry into a runnable harness, in
/// file order. Relative `cwd` values resolve against the config's directory.
pub fn load_harnesses(config_path: &Path, quiet: bool) -> Result<Vec<ExternalHarness>> {
    let content = fs::read_to_string(config_path).map_err(|source| HarnessError::Io {
        path: config_path.to_path_buf(),
        source,
    })?;
    let cfg = parse_config(&content, config_path)?;
    Ok(harnesses_from_config(cfg, config_path, quiet))
}

pub fn harnesses_from_config(
    cfg: HarnessConfig,
    config_path: &Path,
    quiet: bool,
) -> Vec<ExternalHarness> {
    cfg.harnesses
        .into_iter()
        .map(|(name, entry)| {
            let metadata = match (&entry.link, &entry.version) {
                (None, None) => None,
                _ => Some(LibMetadata {
                    link: entry.link.clone().unwrap_or_default(),
                    version: entry.version.clone().unwrap_or_default(),
                }),
            };
            ExternalHarness {
                name,
                command: entry.command.trim().to_string(),
                args: entry.args,
                cwd: entry
                    .cwd
                    .as_deref()
                    .map(|c| resolve_relative_to_config(c.trim(), config_path)),
                timeout: entry.timeout_secs.map(Duration::from_secs),
                metadata,
                quiet,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_file_order_and_resolve_cwd() {
        let yaml = r#"
harnesses:
  go-dasl:
    command: go
    args: [run, .]
    cwd: harnesses/go-dasl
    timeout_secs: 600
    link: https://github.com/hyphacoop/go-dasl
  atcute:
    command: node
    args: [main.js, atcute]
    cwd: /abs/js
"#;
        let path = Path::new("/work/harnesses.yaml");
        let cfg = parse_config(yaml, path).unwrap();
        let hs = harnesses_from_config(cfg, path, false);
        assert_eq!(hs.len(), 2);
        assert_eq!(hs[0].name, "go-dasl");
        assert_eq!(hs[0].cwd.as_deref(), Some(Path::new("/work/harnesses/go-dasl")));
        assert_eq!(hs[0].timeout, Some(Duration::from_secs(600)));
        assert_eq!(
            hs[0].metadata.as_ref().map(|m| m.link.as_str()),
            Some("https://github.com/hyphacoop/go-dasl")
        );
        assert_eq!(hs[1].name, "atcute");
        assert_eq!(hs[1].cwd.as_deref(), Some(Path::new("/abs/js")));
        assert!(hs[1].metadata.is_none());
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let err = parse_config("harnesses: [not, a, map]", Path::new("h.yaml")).unwrap_err();
        assert!(matches!(err, HarnessError::Config { .. }));
    }
}
