use crate::types::CaseType;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal harness errors: a fixture, result set or configuration that does not
/// match what the harness expects. These abort the whole run and are never
/// turned into verdicts.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("fixture file {file} is not valid JSON: {source}")]
    FixtureParse {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown test type '{case_type}' in {file} (case {index})")]
    UnknownCaseType {
        file: String,
        index: usize,
        case_type: String,
    },

    #[error("{file} case {index}: field '{field}' is required for {case_type} cases")]
    MissingField {
        file: String,
        index: usize,
        field: &'static str,
        case_type: CaseType,
    },

    #[error("{file} case {index}: field '{field}' is not valid hex: {source}")]
    InvalidHex {
        file: String,
        index: usize,
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    #[error("unknown adapter '{name}' (available: {available})")]
    UnknownAdapter { name: String, available: String },

    #[error("adapter '{0}' is listed more than once")]
    DuplicateAdapter(String),

    #[error("adapter '{adapter}' has no results for fixture file {file}")]
    MissingFile { adapter: String, file: String },

    #[error("adapter '{adapter}' reports results for unknown fixture file {file}")]
    UnexpectedFile { adapter: String, file: String },

    #[error("adapter '{adapter}' is misaligned with {file}: {expected} cases but {found} verdicts")]
    Misaligned {
        adapter: String,
        file: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid results in {path}: {source}")]
    ResultParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid harness config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("external harness '{name}' failed: {details}")]
    ExternalHarness { name: String, details: String },
}
