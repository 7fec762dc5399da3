use crate::error::HarnessError;
use crate::types::{CaseKind, CaseType, FixtureFile, TestCase};
use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

pub const FIXTURE_EXTENSION: &str = "json";

/// Fixture entry as written on disk, before validation.
#[derive(Debug, Deserialize)]
struct RawCase {
    #[serde(rename = "type")]
    case_type: String,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    input: Option<String>,
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

/// Every `.json` file below `root`, sorted so runs are reproducible.
pub fn discover_fixtures(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            HarnessError::Io {
                path,
                source: e.into(),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == FIXTURE_EXTENSION) {
            files.push(path.to_path_buf());
        } else {
            debug!("skipping non-fixture file {}", path.display());
        }
    }
    Ok(files)
}

/// Result-set key for a fixture: its path relative to the root, with `/`
/// separators. Top-level files are keyed by their bare file name.
pub fn fixture_key(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn load_fixtures(root: &Path) -> Result<Vec<FixtureFile>> {
    let files = discover_fixtures(root)?;
    let mut out = Vec::with_capacity(files.len());
    for path in files {
        let name = fixture_key(root, &path);
        out.push(load_fixture_file(name, &path)?);
    }
    debug!("loaded {} fixture files from {}", out.len(), root.display());
    Ok(out)
}

pub fn load_fixture_file(name: String, path: &Path) -> Result<FixtureFile> {
    let content = fs::read_to_string(path).map_err(|source| HarnessError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let cases = parse_cases(&name, &content)?;
    Ok(FixtureFile {
        name,
        path: path.to_path_buf(),
        cases,
    })
}

/// Parses and validates the cases of one fixture file, preserving order.
pub fn parse_cases(file: &str, content: &str) -> Result<Vec<TestCase>, HarnessError> {
    let raw: Vec<RawCase> =
        serde_json::from_str(content).map_err(|source| HarnessError::FixtureParse {
            file: file.to_string(),
            source,
        })?;
    raw.into_iter()
        .enumerate()
        .map(|(index, rc)| validate_case(file, index, rc))
        .collect()
}

fn validate_case(file: &str, index: usize, rc: RawCase) -> Result<TestCase, HarnessError> {
    let case_type =
        CaseType::parse(rc.case_type.trim()).ok_or_else(|| HarnessError::UnknownCaseType {
            file: file.to_string(),
            index,
            case_type: rc.case_type.clone(),
        })?;

    let field = |name: &'static str, value: &Option<String>| -> Result<Vec<u8>, HarnessError> {
        let text = value
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HarnessError::MissingField {
                file: file.to_string(),
                index,
                field: name,
                case_type,
            })?;
        hex::decode(text).map_err(|source| HarnessError::InvalidHex {
            file: file.to_string(),
            index,
            field: name,
            source,
        })
    };

    let kind = match case_type {
        CaseType::Roundtrip => CaseKind::Roundtrip {
            data: field("data", &rc.data)?,
        },
        CaseType::Encode => CaseKind::Encode {
            input: field("input", &rc.input)?,
            output: field("output", &rc.output)?,
        },
        CaseType::Decode => CaseKind::Decode {
            input: field("input", &rc.input)?,
        },
        CaseType::InvalidIn => CaseKind::InvalidIn {
            data: field("data", &rc.data)?,
        },
        CaseType::InvalidOut => CaseKind::InvalidOut {
            data: field("data", &rc.data)?,
        },
    };

    Ok(TestCase {
        id: rc.id.unwrap_or_default(),
        name: rc.name,
        desc: rc.desc,
        tags: rc.tags,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_declared_order_and_metadata() {
        let json = r#"[
            {"type":"roundtrip","data":"a1616100","tags":["basic"],"name":"map","id":"m1"},
            {"type":"invalid_in","data":"FF","tags":["dag-cbor","basic"],"desc":"break"}
        ]"#;
        let cases = parse_cases("f.json", json).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].id, "m1");
        assert_eq!(cases[0].kind, CaseKind::Roundtrip { data: vec![0xa1, 0x61, 0x61, 0x00] });
        assert_eq!(cases[1].id, "");
        assert_eq!(cases[1].tags, vec!["dag-cbor", "basic"]);
        assert_eq!(cases[1].kind, CaseKind::InvalidIn { data: vec![0xff] });
    }

    #[test]
    fn missing_tags_default_to_empty() {
        let cases = parse_cases("f.json", r#"[{"type":"decode","input":"00"}]"#).unwrap();
        assert!(cases[0].tags.is_empty());
    }

    #[test]
    fn encode_requires_output() {
        let err = parse_cases("f.json", r#"[{"type":"encode","input":"00","tags":[]}]"#)
            .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::MissingField { field: "output", index: 0, .. }
        ));
    }

    #[test]
    fn empty_data_counts_as_missing() {
        let err =
            parse_cases("f.json", r#"[{"type":"roundtrip","data":"","tags":[]}]"#).unwrap_err();
        assert!(matches!(err, HarnessError::MissingField { field: "data", .. }));
    }

    #[test]
    fn unknown_type_is_not_reinterpreted() {
        let err =
            parse_cases("f.json", r#"[{"type":"invalid","data":"ff","tags":[]}]"#).unwrap_err();
        match err {
            HarnessError::UnknownCaseType { case_type, file, .. } => {
                assert_eq!(case_type, "invalid");
                assert_eq!(file, "f.json");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn bad_hex_is_fatal() {
        let err = parse_cases("f.json", r#"[{"type":"roundtrip","data":"zz","tags":[]}]"#)
            .unwrap_err();
        assert!(matches!(err, HarnessError::InvalidHex { field: "data", .. }));
    }

    #[test]
    fn nested_keys_use_forward_slashes() {
        let root = Path::new("fixtures");
        let path = root.join("nested").join("more.json");
        assert_eq!(fixture_key(root, &path), "nested/more.json");
        assert_eq!(fixture_key(root, &root.join("top.json")), "top.json");
    }
}
