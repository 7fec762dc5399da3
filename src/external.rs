use crate::error::HarnessError;
use crate::types::{AdapterResults, LibMetadata, Verdict};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};
use wait_timeout::ChildExt;

/// Five minutes per harness run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// A harness program for a codec in another language. It runs the fixture
/// corpus itself and prints its verdicts as JSON on stdout.
#[derive(Debug, Clone)]
pub struct ExternalHarness {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Option<Duration>,
    /// Overrides whatever metadata the harness reports.
    pub metadata: Option<LibMetadata>,
    pub quiet: bool, // silence harness stderr
}

/// Harnesses either print full `{metadata, files}` documents or just the
/// per-file verdict map.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HarnessOutput {
    Full(AdapterResults),
    Bare(IndexMap<String, Vec<Verdict>>),
}

impl ExternalHarness {
    fn failed(&self, details: impl Into<String>) -> HarnessError {
        HarnessError::ExternalHarness {
            name: self.name.clone(),
            details: details.into(),
        }
    }

    /// Fails fast when the command cannot be found.
    pub fn validate(&self) -> Result<()> {
        let cmd = std::path::Path::new(&self.command);
        if cmd.components().count() > 1 {
            let resolved = match &self.cwd {
                Some(dir) if cmd.is_relative() => dir.join(cmd),
                _ => cmd.to_path_buf(),
            };
            if !resolved.exists() {
                return Err(self
                    .failed(format!("command '{}' does not exist", resolved.display()))
                    .into());
            }
            return Ok(());
        }
        let path = which::which(&self.command).map_err(|e| {
            self.failed(format!(
                "command '{}' not found or not executable ({e}); check that it is installed and on PATH",
                self.command
            ))
        })?;
        debug!(harness = %self.name, "using {}", path.display());
        Ok(())
    }

    pub fn run(&self) -> Result<AdapterResults> {
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        info!(harness = %self.name, "running {} {}", self.command, self.args.join(" "));

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(if self.quiet {
                Stdio::null()
            } else {
                Stdio::inherit()
            });
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().with_context(|| {
            format!("failed to start harness '{}' ({})", self.name, self.command)
        })?;

        // Drain stdout on its own thread so a large result document cannot
        // fill the pipe while we wait on the child.
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.failed("stdout not captured"))?;
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });

        // On timeout or a failed wait the child is killed and reaped; the
        // reader thread then sees EOF and finishes on its own.
        match child.wait_timeout(timeout) {
            Ok(Some(status)) if status.success() => {}
            Ok(Some(status)) => {
                return Err(self.failed(format!("exited with {status}")).into());
            }
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(self
                    .failed(format!("timed out after {} s", timeout.as_secs()))
                    .into());
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(self.failed(format!("waiting for the harness failed: {e}")).into());
            }
        }

        let stdout = reader
            .join()
            .map_err(|_| self.failed("stdout reader panicked"))?
            .with_context(|| format!("failed to read output of harness '{}'", self.name))?;
        let mut results = self.parse_output(&stdout)?;
        if let Some(meta) = &self.metadata {
            if !meta.link.is_empty() {
                results.metadata.link = meta.link.clone();
            }
            if !meta.version.is_empty() {
                results.metadata.version = meta.version.clone();
            }
        }
        debug!(harness = %self.name, files = results.files.len(), "harness finished");
        Ok(results)
    }

    pub fn parse_output(&self, stdout: &[u8]) -> Result<AdapterResults, HarnessError> {
        let out: HarnessOutput = serde_json::from_slice(stdout)
            .map_err(|e| self.failed(format!("output is not a result document: {e}")))?;
        Ok(match out {
            HarnessOutput::Full(results) => results,
            HarnessOutput::Bare(files) => AdapterResults {
                metadata: LibMetadata::default(),
                files,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harness() -> ExternalHarness {
        ExternalHarness {
            name: "py".into(),
            command: "python3".into(),
            args: vec![],
            cwd: None,
            timeout: None,
            metadata: None,
            quiet: true,
        }
    }

    #[test]
    fn parses_full_document() {
        let out = br#"{"metadata":{"link":"https://x","version":"1.0"},"files":{"a.json":[{"pass":true},{"pass":null}]}}"#;
        let res = harness().parse_output(out).unwrap();
        assert_eq!(res.metadata.version, "1.0");
        assert_eq!(res.files["a.json"], vec![Verdict::pass(), Verdict::Skipped]);
    }

    #[test]
    fn parses_bare_file_map() {
        let out = br#"{"a.json":[{"pass":false,"output":"00"}]}"#;
        let res = harness().parse_output(out).unwrap();
        assert_eq!(res.metadata, LibMetadata::default());
        assert_eq!(res.files["a.json"], vec![Verdict::mismatch(&[0])]);
    }

    #[test]
    fn garbage_output_names_the_harness() {
        let err = harness().parse_output(b"Traceback ...").unwrap_err();
        assert!(err.to_string().contains("'py'"));
    }

    #[cfg(unix)]
    fn shell(script: &str) -> ExternalHarness {
        ExternalHarness {
            name: "sh".into(),
            command: "sh".into(),
            args: vec!["-c".into(), script.into()],
            cwd: None,
            timeout: Some(Duration::from_secs(10)),
            metadata: None,
            quiet: true,
        }
    }

    #[cfg(unix)]
    #[test]
    fn run_reads_document_and_applies_metadata_override() {
        let mut h = shell(
            r#"printf '%s' '{"metadata":{"link":"https://reported","version":"0.1"},"files":{"a.json":[{"pass":true}]}}'"#,
        );
        h.metadata = Some(LibMetadata {
            link: String::new(),
            version: "9.9".into(),
        });
        let res = h.run().unwrap();
        assert_eq!(res.metadata.link, "https://reported");
        assert_eq!(res.metadata.version, "9.9");
        assert_eq!(res.files["a.json"], vec![Verdict::pass()]);
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_an_error() {
        let err = shell("exit 3").run().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'sh'"), "{msg}");
        assert!(msg.contains("exited with"), "{msg}");
        assert!(msg.contains('3'), "{msg}");
    }

    #[cfg(unix)]
    #[test]
    fn slow_harness_is_killed_after_timeout() {
        let mut h = shell("exec sleep 30");
        h.timeout = Some(Duration::from_secs(1));
        let started = std::time::Instant::now();
        let err = h.run().unwrap_err();
        assert!(err.to_string().contains("timed out after 1 s"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[test]
    fn missing_command_is_reported() {
        let mut h = harness();
        h.command = "definitely-not-a-real-harness-command".into();
        assert!(h.validate().is_err());
    }
}
