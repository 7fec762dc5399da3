use crate::adapter::{Adapter, CodecError, ErrorKind, RejectionPolicy};
use crate::codecs::reference_decode;
use crate::error::HarnessError;
use crate::external::ExternalHarness;
use crate::fixture::load_fixtures;
use crate::types::{AdapterResults, CaseKind, FixtureFile, ResultSet, TestCase, Verdict};
use anyhow::Result;
use indexmap::IndexMap;
use rayon::prelude::*;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Run every (file, adapter) pair on the calling thread.
    pub serial: bool,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "codec panicked".to_string()
    }
}

/// Calls into the codec, turning a panic into a `Panic` codec error.
fn guarded<T>(call: impl FnOnce() -> Result<T, CodecError>) -> Result<T, CodecError> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(res) => res,
        Err(payload) => Err(CodecError::panic(panic_message(payload.as_ref()))),
    }
}

/// Verdict for a case that must succeed and produce `expected`.
fn expect_bytes(result: Result<Vec<u8>, CodecError>, expected: &[u8]) -> Verdict {
    match result {
        Ok(actual) if actual == expected => Verdict::pass(),
        Ok(actual) => Verdict::mismatch(&actual),
        Err(e) if e.kind == ErrorKind::Unsupported => Verdict::Skipped,
        Err(e) => Verdict::error(e.message),
    }
}

/// Verdict for a case that must be refused by the codec.
fn expect_rejection<T>(result: Result<T, CodecError>, policy: RejectionPolicy) -> Verdict {
    let err = match result {
        Ok(_) => return Verdict::accepted(),
        Err(e) => e,
    };
    match err.kind {
        ErrorKind::Validation => Verdict::rejected(err.message),
        ErrorKind::Panic if policy.panics_count_as_rejection => Verdict::rejected(err.message),
        ErrorKind::Unsupported => Verdict::Skipped,
        ErrorKind::Panic | ErrorKind::Other => Verdict::error(err.message),
    }
}

/// Runs one case against one adapter.
pub fn execute_case(case: &TestCase, adapter: &Adapter) -> Verdict {
    if adapter.skips(&case.id) {
        debug!(adapter = adapter.name(), id = %case.id, "case on skip list");
        return Verdict::Skipped;
    }
    match &case.kind {
        CaseKind::Roundtrip { data } => expect_bytes(guarded(|| adapter.roundtrip(data)), data),
        CaseKind::Decode { input } => expect_bytes(guarded(|| adapter.roundtrip(input)), input),
        CaseKind::Encode { input, output } => match reference_decode(input) {
            Ok(value) => expect_bytes(guarded(|| adapter.encode_generic(value)), output),
            Err(e) => reference_unusable(case, adapter, &e),
        },
        CaseKind::InvalidIn { data } => {
            expect_rejection(guarded(|| adapter.decode_only(data)), adapter.policy())
        }
        CaseKind::InvalidOut { data } => match reference_decode(data) {
            Ok(value) => expect_rejection(
                guarded(|| adapter.encode_generic(value)),
                adapter.policy(),
            ),
            Err(e) => reference_unusable(case, adapter, &e),
        },
    }
}

fn reference_unusable(case: &TestCase, adapter: &Adapter, err: &CodecError) -> Verdict {
    warn!(
        adapter = adapter.name(),
        case = case.label(),
        "reference decoder cannot build the input value, skipping: {err}"
    );
    Verdict::Skipped
}

/// Verdicts for every case of one file, in file order.
pub fn run_file(file: &FixtureFile, adapter: &Adapter) -> Vec<Verdict> {
    debug!(adapter = adapter.name(), file = %file.name, cases = file.cases.len(), "running file");
    file.cases
        .iter()
        .map(|case| execute_case(case, adapter))
        .collect()
}

/// Runs every file against every adapter. Pairs may run in parallel but the
/// result keeps adapter order, then file order, then case order.
///
/// Adapter names must be unique; [`select_participants`] guarantees this.
/// Passing the same name twice panics instead of letting one adapter's
/// results overwrite the other's.
pub fn run_suite(files: &[FixtureFile], adapters: &[Adapter], opts: RunOptions) -> ResultSet {
    for (i, adapter) in adapters.iter().enumerate() {
        assert!(
            adapters[..i].iter().all(|a| a.name() != adapter.name()),
            "adapter '{}' passed to run_suite twice",
            adapter.name()
        );
    }
    let jobs: Vec<(usize, usize)> = (0..adapters.len())
        .flat_map(|a| (0..files.len()).map(move |f| (a, f)))
        .collect();

    let run = |&(a, f): &(usize, usize)| run_file(&files[f], &adapters[a]);
    let verdicts: Vec<Vec<Verdict>> = if opts.serial {
        jobs.iter().map(run).collect()
    } else {
        jobs.par_iter().map(run).collect()
    };

    let mut verdicts = verdicts.into_iter();
    let mut out = ResultSet::new();
    for adapter in adapters {
        let mut per_file = IndexMap::with_capacity(files.len());
        for file in files {
            per_file.insert(file.name.clone(), verdicts.next().unwrap_or_default());
        }
        out.insert(
            adapter.name().to_string(),
            AdapterResults {
                metadata: adapter.metadata().clone(),
                files: per_file,
            },
        );
    }
    out
}

/// Loads the fixture tree and runs it against `adapters`.
pub fn run_fixture_root(root: &Path, adapters: &[Adapter], opts: RunOptions) -> Result<ResultSet> {
    let files = load_fixtures(root)?;
    info!(
        files = files.len(),
        adapters = adapters.len(),
        "running fixtures from {}",
        root.display()
    );
    Ok(run_suite(&files, adapters, opts))
}

/// Checks that results produced elsewhere line up with the fixture tree: the
/// same files, and one verdict per case. Files are reordered to fixture order.
pub fn align_results(
    adapter: &str,
    mut results: AdapterResults,
    files: &[FixtureFile],
) -> Result<AdapterResults, HarnessError> {
    let mut ordered = IndexMap::with_capacity(files.len());
    for file in files {
        let verdicts =
            results
                .files
                .shift_remove(&file.name)
                .ok_or_else(|| HarnessError::MissingFile {
                    adapter: adapter.to_string(),
                    file: file.name.clone(),
                })?;
        if verdicts.len() != file.cases.len() {
            return Err(HarnessError::Misaligned {
                adapter: adapter.to_string(),
                file: file.name.clone(),
                expected: file.cases.len(),
                found: verdicts.len(),
            });
        }
        ordered.insert(file.name.clone(), verdicts);
    }
    if let Some(extra) = results.files.keys().next() {
        return Err(HarnessError::UnexpectedFile {
            adapter: adapter.to_string(),
            file: extra.clone(),
        });
    }
    Ok(AdapterResults {
        metadata: results.metadata,
        files: ordered,
    })
}

/// Inserts `results` under `name`, refusing duplicates.
pub fn insert_results(
    set: &mut ResultSet,
    name: &str,
    results: AdapterResults,
) -> Result<(), HarnessError> {
    if set.contains_key(name) {
        return Err(HarnessError::DuplicateAdapter(name.to_string()));
    }
    set.insert(name.to_string(), results);
    Ok(())
}

/// Something that produces results for a run: an in-process adapter or an
/// external harness program.
#[derive(Debug)]
pub enum Participant {
    InProcess(Adapter),
    External(ExternalHarness),
}

impl Participant {
    pub fn name(&self) -> &str {
        match self {
            Participant::InProcess(a) => a.name(),
            Participant::External(h) => &h.name,
        }
    }
}

/// Picks the participants named in `requested`, in that order. An empty
/// request selects every adapter, then every harness.
pub fn select_participants(
    requested: &[String],
    adapters: Vec<Adapter>,
    harnesses: Vec<ExternalHarness>,
) -> Result<Vec<Participant>, HarnessError> {
    let mut pool: IndexMap<String, Participant> = IndexMap::new();
    let all = adapters
        .into_iter()
        .map(Participant::InProcess)
        .chain(harnesses.into_iter().map(Participant::External));
    for p in all {
        let name = p.name().to_string();
        if pool.contains_key(&name) {
            return Err(HarnessError::DuplicateAdapter(name));
        }
        pool.insert(name, p);
    }
    if requested.is_empty() {
        return Ok(pool.into_values().collect());
    }

    let available = pool.keys().cloned().collect::<Vec<_>>().join(", ");
    let mut selected = Vec::with_capacity(requested.len());
    for name in requested {
        let name = name.trim();
        match pool.shift_remove(name) {
            Some(p) => selected.push(p),
            None if selected.iter().any(|p: &Participant| p.name() == name) => {
                return Err(HarnessError::DuplicateAdapter(name.to_string()));
            }
            None => {
                return Err(HarnessError::UnknownAdapter {
                    name: name.to_string(),
                    available,
                });
            }
        }
    }
    Ok(selected)
}

/// Runs the fixture tree through every participant and assembles the
/// result set in participant order. External output is checked against the
/// fixtures before it is accepted.
pub fn run_participants(
    root: &Path,
    participants: Vec<Participant>,
    opts: RunOptions,
) -> Result<ResultSet> {
    let files = load_fixtures(root)?;
    info!(
        files = files.len(),
        participants = participants.len(),
        "running fixtures from {}",
        root.display()
    );

    let mut order = Vec::with_capacity(participants.len());
    let mut adapters = Vec::new();
    let mut harnesses = Vec::new();
    for p in participants {
        order.push(p.name().to_string());
        match p {
            Participant::InProcess(a) => adapters.push(a),
            Participant::External(h) => harnesses.push(h),
        }
    }
    for h in &harnesses {
        h.validate()?;
    }

    let mut produced = run_suite(&files, &adapters, opts);
    let run_external = |h: &ExternalHarness| -> Result<(String, AdapterResults)> {
        let results = h.run()?;
        Ok((h.name.clone(), align_results(&h.name, results, &files)?))
    };
    let external: Vec<(String, AdapterResults)> = if opts.serial {
        harnesses.iter().map(run_external).collect::<Result<_>>()?
    } else {
        harnesses.par_iter().map(run_external).collect::<Result<_>>()?
    };
    produced.extend(external);

    let mut out = ResultSet::with_capacity(order.len());
    for name in order {
        if let Some(results) = produced.shift_remove(&name) {
            out.insert(name, results);
        }
    }
    Ok(out)
}
