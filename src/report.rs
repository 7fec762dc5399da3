use crate::aggregate::{AggregatedReport, CaseRecord, FileGroup, LibInfo};
use crate::types::Tally;
use chrono::{DateTime, Utc};
use colored::Colorize;
use indexmap::IndexMap;
use serde::Serialize;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// What the HTML template receives. Borrowed straight from the report; the
/// only thing added is the generation time.
#[derive(Debug, Serialize)]
pub struct RenderModel<'a> {
    pub libs: &'a [LibInfo],
    pub tests_by_file: &'a [FileGroup],
    pub tests_by_tag: &'a IndexMap<String, Vec<CaseRecord>>,
    pub summary: &'a IndexMap<String, IndexMap<String, Tally>>,
    pub generated: String,
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn build_render_model(report: &AggregatedReport, generated: DateTime<Utc>) -> RenderModel<'_> {
    RenderModel {
        libs: &report.libs,
        tests_by_file: &report.tests_by_file,
        tests_by_tag: &report.tests_by_tag,
        summary: &report.summary,
        generated: format_timestamp(generated),
    }
}

fn tally_line(name: &str, width: usize, t: &Tally) -> String {
    let fail = if t.fail > 0 {
        t.fail.to_string().red().bold().to_string()
    } else {
        t.fail.to_string().green().to_string()
    };
    format!(
        "  {}  pass {}  fail {}  skip {}  ({:.1}%)\n",
        format!("{name:<width$}").bold(),
        t.pass.to_string().green(),
        fail,
        t.skip.to_string().yellow(),
        t.pass_rate(),
    )
}

/// Terminal summary: each category, then all cases, per adapter.
pub fn render_human(report: &AggregatedReport) -> String {
    let mut out = String::new();
    let width = report.libs.iter().map(|l| l.name.len()).max().unwrap_or(0);

    for (category, per_lib) in &report.summary {
        out.push_str(&format!("{}\n", category.bold().underline()));
        for (name, t) in per_lib {
            out.push_str(&tally_line(name, width, t));
        }
    }

    out.push_str(&format!("{}\n", "All cases".bold().underline()));
    for (name, t) in &report.overall() {
        out.push_str(&tally_line(name, width, t));
    }

    let tags: Vec<String> = report
        .tests_by_tag
        .iter()
        .map(|(tag, records)| format!("{tag} ({})", records.len()))
        .collect();
    out.push_str(&format!("{} {}\n", "tags:".bold(), tags.join(", ")));
    out
}

pub fn print_human(report: &AggregatedReport) {
    print!("{}", render_human(report));
}
