use crate::error::HarnessError;
use crate::fixture::load_fixture_file;
use crate::types::{CaseKind, CaseType, FixtureFile, ResultSet, Tally, TestCase, Verdict};
use anyhow::Result;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Tags that always get a group, in this order, ahead of any other tag.
pub const SEEDED_TAGS: [&str; 2] = ["basic", "dag-cbor"];

/// Summary categories: display label and the tag that selects cases.
pub const SUMMARY_CATEGORIES: [(&str, &str); 2] = [("Basic", "basic"), ("dag-cbor", "dag-cbor")];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibInfo {
    pub name: String,
    pub link: String,
    pub version: String,
}

/// One case zipped with every adapter's verdict for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseRecord {
    pub file: String,
    pub index: usize,
    pub id: String,
    pub name: Option<String>,
    pub desc: Option<String>,
    #[serde(rename = "type")]
    pub case_type: CaseType,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Per-adapter pass flag, in `libs` order.
    pub bools: Vec<Option<bool>>,
    /// Per-adapter verdict, in `libs` order.
    pub details: Vec<Verdict>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileGroup {
    pub name: String,
    pub results: Vec<CaseRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedReport {
    pub libs: Vec<LibInfo>,
    pub tests_by_file: Vec<FileGroup>,
    pub tests_by_tag: IndexMap<String, Vec<CaseRecord>>,
    /// Category label -> adapter name -> counts.
    pub summary: IndexMap<String, IndexMap<String, Tally>>,
}

impl AggregatedReport {
    /// Counts over every case, per adapter, regardless of tags.
    pub fn overall(&self) -> IndexMap<String, Tally> {
        let mut totals: IndexMap<String, Tally> = self
            .libs
            .iter()
            .map(|l| (l.name.clone(), Tally::default()))
            .collect();
        for record in self.tests_by_file.iter().flat_map(|g| &g.results) {
            for (tally, verdict) in totals.values_mut().zip(&record.details) {
                tally.record(verdict);
            }
        }
        totals
    }
}

fn record_for(file: &str, index: usize, case: &TestCase, details: Vec<Verdict>) -> CaseRecord {
    let (data, input, output) = match &case.kind {
        CaseKind::Roundtrip { data }
        | CaseKind::InvalidIn { data }
        | CaseKind::InvalidOut { data } => (Some(hex::encode(data)), None, None),
        CaseKind::Encode { input, output } => {
            (None, Some(hex::encode(input)), Some(hex::encode(output)))
        }
        CaseKind::Decode { input } => (None, Some(hex::encode(input)), None),
    };
    CaseRecord {
        file: file.to_string(),
        index,
        id: case.id.clone(),
        name: case.name.clone(),
        desc: case.desc.clone(),
        case_type: case.kind.case_type(),
        tags: case.tags.clone(),
        data,
        input,
        output,
        bools: details.iter().map(Verdict::outcome).collect(),
        details,
    }
}

/// Reloads the fixture files named in `results` and aggregates against them.
pub fn aggregate(results: &ResultSet, fixture_root: &Path) -> Result<AggregatedReport> {
    let file_names: Vec<&String> = results
        .values()
        .next()
        .map(|r| r.files.keys().collect())
        .unwrap_or_default();
    let mut files = Vec::with_capacity(file_names.len());
    for name in file_names {
        files.push(load_fixture_file(name.clone(), &fixture_root.join(name))?);
    }
    Ok(aggregate_loaded(results, &files)?)
}

/// Groups verdicts by file and by tag and tallies the summary categories.
/// `files` fixes the file order; every adapter must cover exactly these files
/// with one verdict per case.
pub fn aggregate_loaded(
    results: &ResultSet,
    files: &[FixtureFile],
) -> Result<AggregatedReport, HarnessError> {
    for (adapter, res) in results {
        for file in files {
            let verdicts = res.files.get(&file.name).ok_or_else(|| HarnessError::MissingFile {
                adapter: adapter.clone(),
                file: file.name.clone(),
            })?;
            if verdicts.len() != file.cases.len() {
                return Err(HarnessError::Misaligned {
                    adapter: adapter.clone(),
                    file: file.name.clone(),
                    expected: file.cases.len(),
                    found: verdicts.len(),
                });
            }
        }
        if let Some(extra) = res.files.keys().find(|k| !files.iter().any(|f| &f.name == *k)) {
            return Err(HarnessError::UnexpectedFile {
                adapter: adapter.clone(),
                file: extra.clone(),
            });
        }
    }

    let libs: Vec<LibInfo> = results
        .iter()
        .map(|(name, res)| LibInfo {
            name: name.clone(),
            link: res.metadata.link.clone(),
            version: res.metadata.version.clone(),
        })
        .collect();

    let mut tests_by_tag: IndexMap<String, Vec<CaseRecord>> = SEEDED_TAGS
        .iter()
        .map(|t| (t.to_string(), Vec::new()))
        .collect();
    let mut summary: IndexMap<String, IndexMap<String, Tally>> = SUMMARY_CATEGORIES
        .iter()
        .map(|(label, _)| {
            let per_lib = libs
                .iter()
                .map(|l| (l.name.clone(), Tally::default()))
                .collect();
            (label.to_string(), per_lib)
        })
        .collect();

    let mut tests_by_file = Vec::with_capacity(files.len());
    for file in files {
        let mut group = Vec::with_capacity(file.cases.len());
        for (index, case) in file.cases.iter().enumerate() {
            let details: Vec<Verdict> = results
                .values()
                .map(|res| res.files[&file.name][index].clone())
                .collect();
            let record = record_for(&file.name, index, case, details);

            for (label, tag) in SUMMARY_CATEGORIES {
                if !case.has_tag(tag) {
                    continue;
                }
                if let Some(per_lib) = summary.get_mut(label) {
                    for (tally, verdict) in per_lib.values_mut().zip(&record.details) {
                        tally.record(verdict);
                    }
                }
            }
            for tag in &case.tags {
                tests_by_tag
                    .entry(tag.clone())
                    .or_default()
                    .push(record.clone());
            }
            group.push(record);
        }
        tests_by_file.push(FileGroup {
            name: file.name.clone(),
            results: group,
        });
    }
    debug!(
        files = tests_by_file.len(),
        tags = tests_by_tag.len(),
        libs = libs.len(),
        "aggregated results"
    );

    Ok(AggregatedReport {
        libs,
        tests_by_file,
        tests_by_tag,
        summary,
    })
}
