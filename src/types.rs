use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CaseType {
    Roundtrip,
    Encode,
    Decode,
    InvalidIn,
    InvalidOut,
}

impl CaseType {
    pub const ALL: [CaseType; 5] = [
        CaseType::Roundtrip,
        CaseType::Encode,
        CaseType::Decode,
        CaseType::InvalidIn,
        CaseType::InvalidOut,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CaseType::Roundtrip => "roundtrip",
            CaseType::Encode => "encode",
            CaseType::Decode => "decode",
            CaseType::InvalidIn => "invalid_in",
            CaseType::InvalidOut => "invalid_out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Negative cases pass when the codec refuses the input.
    pub fn expects_rejection(self) -> bool {
        matches!(self, CaseType::InvalidIn | CaseType::InvalidOut)
    }
}

impl fmt::Display for CaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The bytes a case operates on, already validated and hex-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseKind {
    Roundtrip { data: Vec<u8> },
    Encode { input: Vec<u8>, output: Vec<u8> },
    Decode { input: Vec<u8> },
    InvalidIn { data: Vec<u8> },
    InvalidOut { data: Vec<u8> },
}

impl CaseKind {
    pub fn case_type(&self) -> CaseType {
        match self {
            CaseKind::Roundtrip { .. } => CaseType::Roundtrip,
            CaseKind::Encode { .. } => CaseType::Encode,
            CaseKind::Decode { .. } => CaseType::Decode,
            CaseKind::InvalidIn { .. } => CaseType::InvalidIn,
            CaseKind::InvalidOut { .. } => CaseType::InvalidOut,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub id: String,
    pub name: Option<String>,
    pub desc: Option<String>,
    pub tags: Vec<String>,
    pub kind: CaseKind,
}

impl TestCase {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Short label for log lines.
    pub fn label(&self) -> &str {
        match (&self.name, self.id.is_empty()) {
            (Some(name), _) => name.as_str(),
            (None, false) => self.id.as_str(),
            (None, true) => "<unnamed>",
        }
    }
}

/// One fixture file: its key in result sets (path relative to the fixture
/// root, `/`-separated) and its cases in declaration order.
#[derive(Debug, Clone)]
pub struct FixtureFile {
    pub name: String,
    pub path: PathBuf,
    pub cases: Vec<TestCase>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The codec produced bytes that differ from the expected encoding.
    Mismatch { output: String },
    /// The codec raised an error on a case that should have succeeded, or
    /// raised something other than a rejection on a negative case.
    Error { error: String },
    /// A negative case the codec accepted.
    Accepted,
}

/// Outcome of one case against one adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VerdictRecord", into = "VerdictRecord")]
pub enum Verdict {
    /// Carries the rejection message when a negative case passed.
    Passed { expected_error: Option<String> },
    Failed(Failure),
    Skipped,
}

impl Verdict {
    pub fn pass() -> Self {
        Verdict::Passed {
            expected_error: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Verdict::Passed {
            expected_error: Some(message.into()),
        }
    }

    pub fn mismatch(output: &[u8]) -> Self {
        Verdict::Failed(Failure::Mismatch {
            output: hex::encode(output),
        })
    }

    pub fn error(error: impl Into<String>) -> Self {
        Verdict::Failed(Failure::Error {
            error: error.into(),
        })
    }

    pub fn accepted() -> Self {
        Verdict::Failed(Failure::Accepted)
    }

    /// Tri-state pass flag: `None` means skipped.
    pub fn outcome(&self) -> Option<bool> {
        match self {
            Verdict::Passed { .. } => Some(true),
            Verdict::Failed(_) => Some(false),
            Verdict::Skipped => None,
        }
    }
}

/// Wire shape of a verdict: `{"pass": true|false|null, "output"?, "error"?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictRecord {
    #[serde(default)]
    pub pass: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Verdict> for VerdictRecord {
    fn from(v: Verdict) -> Self {
        let (pass, output, error) = match v {
            Verdict::Passed { expected_error } => (Some(true), None, expected_error),
            Verdict::Failed(Failure::Mismatch { output }) => (Some(false), Some(output), None),
            Verdict::Failed(Failure::Error { error }) => (Some(false), None, Some(error)),
            Verdict::Failed(Failure::Accepted) => (Some(false), None, None),
            Verdict::Skipped => (None, None, None),
        };
        VerdictRecord {
            pass,
            output,
            error,
        }
    }
}

impl TryFrom<VerdictRecord> for Verdict {
    type Error = String;

    fn try_from(r: VerdictRecord) -> Result<Self, Self::Error> {
        match (r.pass, r.output, r.error) {
            (_, Some(_), Some(_)) => Err("verdict carries both 'output' and 'error'".to_string()),
            (Some(true), None, expected_error) => Ok(Verdict::Passed { expected_error }),
            (Some(false), Some(output), None) => Ok(Verdict::Failed(Failure::Mismatch { output })),
            (Some(false), None, Some(error)) => Ok(Verdict::Failed(Failure::Error { error })),
            (Some(false), None, None) => Ok(Verdict::Failed(Failure::Accepted)),
            // Some harnesses attach diagnostics to skips; the skip wins.
            (None, None, _) => Ok(Verdict::Skipped),
            (_, Some(_), None) => Err("only failed verdicts may carry 'output'".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibMetadata {
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub version: String,
}

/// Everything one adapter reported for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterResults {
    #[serde(default)]
    pub metadata: LibMetadata,
    pub files: IndexMap<String, Vec<Verdict>>,
}

/// Adapter name -> its results, in run order.
pub type ResultSet = IndexMap<String, AdapterResults>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub pass: usize,
    pub fail: usize,
    pub skip: usize,
}

impl Tally {
    pub fn record(&mut self, verdict: &Verdict) {
        match verdict.outcome() {
            Some(true) => self.pass += 1,
            Some(false) => self.fail += 1,
            None => self.skip += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pass + self.fail + self.skip
    }

    /// Share of executed (non-skipped) cases that passed, in percent.
    pub fn pass_rate(&self) -> f64 {
        let executed = self.pass + self.fail;
        if executed == 0 {
            0.0
        } else {
            self.pass as f64 * 100.0 / executed as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_serializes_null_pass() {
        let json = serde_json::to_string(&Verdict::Skipped).unwrap();
        assert_eq!(json, r#"{"pass":null}"#);
    }

    #[test]
    fn expected_rejection_keeps_message() {
        let json = serde_json::to_string(&Verdict::rejected("bad byte")).unwrap();
        assert_eq!(json, r#"{"pass":true,"error":"bad byte"}"#);
    }

    #[test]
    fn missing_pass_reads_as_skip() {
        let v: Verdict = serde_json::from_str("{}").unwrap();
        assert_eq!(v, Verdict::Skipped);
    }

    #[test]
    fn output_and_error_together_are_rejected() {
        let res: Result<Verdict, _> =
            serde_json::from_str(r#"{"pass":false,"output":"00","error":"x"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn output_on_pass_is_rejected() {
        let res: Result<Verdict, _> = serde_json::from_str(r#"{"pass":true,"output":"00"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn tally_conserves_counts() {
        let mut t = Tally::default();
        for v in [Verdict::pass(), Verdict::accepted(), Verdict::Skipped, Verdict::pass()] {
            t.record(&v);
        }
        assert_eq!((t.pass, t.fail, t.skip), (2, 1, 1));
        assert_eq!(t.total(), 4);
        assert!((t.pass_rate() - 66.666).abs() < 0.01);
    }

    #[test]
    fn case_type_names_match_fixture_strings() {
        assert_eq!(CaseType::parse("invalid_out"), Some(CaseType::InvalidOut));
        assert_eq!(CaseType::parse("invalid"), None);
        assert!(CaseType::InvalidIn.expects_rejection());
        assert!(!CaseType::Decode.expects_rejection());
    }
}
