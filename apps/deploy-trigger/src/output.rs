use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use runtime_manager_sdk::{DeployResult, RunTask};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write output file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode output {name}: {source}")]
    Encode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("output {0} must be a single line")]
    Multiline(String),
}

/// Destination for `key=value` step outputs read by later pipeline steps.
pub trait OutputSink {
    fn publish(&mut self, name: &str, value: &str) -> Result<(), OutputError>;
}

/// Appends to the file named by `GITHUB_OUTPUT`.
#[derive(Debug, Clone)]
pub struct GithubOutputFile {
    path: PathBuf,
}

impl GithubOutputFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl OutputSink for GithubOutputFile {
    fn publish(&mut self, name: &str, value: &str) -> Result<(), OutputError> {
        let line = output_line(name, value)?;
        let io_err = |source| OutputError::Io {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        writeln!(file, "{line}").map_err(io_err)
    }
}

/// Used outside CI, when there is no output file to write.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOutputSink;

impl OutputSink for LogOutputSink {
    fn publish(&mut self, name: &str, value: &str) -> Result<(), OutputError> {
        let line = output_line(name, value)?;
        info!(output = %line, "step output");
        Ok(())
    }
}

/// In-memory adapter for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct InMemoryOutputSink {
    entries: Vec<(String, String)>,
}

impl InMemoryOutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Last value published under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

impl OutputSink for InMemoryOutputSink {
    fn publish(&mut self, name: &str, value: &str) -> Result<(), OutputError> {
        output_line(name, value)?;
        self.entries.push((name.to_string(), value.to_string()));
        Ok(())
    }
}

fn output_line(name: &str, value: &str) -> Result<String, OutputError> {
    if name.contains(['\n', '\r', '=']) || value.contains(['\n', '\r']) {
        return Err(OutputError::Multiline(name.to_string()));
    }
    Ok(format!("{name}={value}"))
}

/// Publish `tasks`, `run_id` and `run_type`. A skipped run publishes an empty
/// task list.
pub fn publish_run_outputs(
    sink: &mut dyn OutputSink,
    result: &DeployResult,
    skipped: bool,
) -> Result<(), OutputError> {
    let tasks: &[RunTask] = if skipped { &[] } else { &result.tasks };
    let encoded = serde_json::to_string(tasks).map_err(|source| OutputError::Encode {
        name: "tasks".into(),
        source,
    })?;
    sink.publish("tasks", &encoded)?;
    sink.publish("run_id", &result.run_id)?;
    sink.publish("run_type", &result.run_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn result() -> DeployResult {
        DeployResult {
            run_id: "r1".into(),
            run_type: "DEPLOY".into(),
            tasks: vec![RunTask::new("t1"), RunTask::new("t2")],
        }
    }

    #[test]
    fn publishes_run_outputs() {
        let mut sink = InMemoryOutputSink::new();
        publish_run_outputs(&mut sink, &result(), false).unwrap();
        assert_eq!(sink.get("run_id"), Some("r1"));
        assert_eq!(sink.get("run_type"), Some("DEPLOY"));
        assert_eq!(sink.get("tasks"), Some(r#"[{"id":"t1"},{"id":"t2"}]"#));
    }

    #[test]
    fn skipped_runs_publish_empty_tasks() {
        let mut sink = InMemoryOutputSink::new();
        publish_run_outputs(&mut sink, &result(), true).unwrap();
        assert_eq!(sink.get("tasks"), Some("[]"));
        assert_eq!(sink.get("run_id"), Some("r1"));
    }

    #[test]
    fn appends_lines_to_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("github_output");
        fs::write(&path, "previous=1\n").unwrap();

        let mut sink = GithubOutputFile::new(&path);
        publish_run_outputs(&mut sink, &result(), false).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(
            lines,
            [
                "previous=1",
                r#"tasks=[{"id":"t1"},{"id":"t2"}]"#,
                "run_id=r1",
                "run_type=DEPLOY",
            ]
        );
    }

    #[test]
    fn rejects_multiline_values() {
        let mut sink = InMemoryOutputSink::new();
        let err = sink.publish("run_id", "r1\ninjected=1").unwrap_err();
        assert!(matches!(err, OutputError::Multiline(name) if name == "run_id"));
        assert!(sink.entries().is_empty());
    }
}
