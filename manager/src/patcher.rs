use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::api::CatalogId;
use crate::error::{Error, Result};
use crate::events::{EventHub, PROGRESS_TOPIC};
use crate::progress::ProgressSnapshot;

/// External tool that performs the actual patching of an install directory.
///
/// Invoked as `<program> <args..> --app-id <id> --game-dir <dir> [--language <lang>]`.
/// Stdout lines shaped like `{"progress": 40, "message": "..."}` are forwarded to the
/// progress topic; every other stdout line becomes part of the result text.
#[derive(Debug, Clone)]
pub struct PatchTool {
    program: PathBuf,
    args: Vec<String>,
}

impl PatchTool {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub async fn run(
        &self,
        catalog_id: &CatalogId,
        install_dir: &Path,
        language: Option<&str>,
        events: &EventHub,
    ) -> Result<String> {
        if !install_dir.is_dir() {
            return Err(Error::Patch(format!(
                "install directory {} does not exist",
                install_dir.display()
            )));
        }

        emit_progress(events, 0.0, "Starting patch tool");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--app-id")
            .arg(catalog_id.as_str())
            .arg("--game-dir")
            .arg(install_dir);
        if let Some(lang) = language {
            cmd.arg("--language").arg(lang);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::info!(program = %self.program.display(), %catalog_id, "launching patch tool");
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Patch(format!("failed to run {}: {}", self.program.display(), e)))?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let mut output = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                match serde_json::from_str::<ProgressSnapshot>(&line) {
                    Ok(snapshot) => {
                        if let Err(e) = events.emit(PROGRESS_TOPIC, &snapshot) {
                            tracing::warn!(error = %e, "failed to emit progress");
                        }
                    }
                    Err(_) if line.trim().is_empty() => {}
                    Err(_) => {
                        tracing::debug!(line = %line, "patch tool output");
                        output.push(line);
                    }
                }
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            let detail = stderr.trim();
            return Err(Error::Patch(if detail.is_empty() {
                format!("patch tool exited with {status}")
            } else {
                format!("patch tool exited with {status}: {detail}")
            }));
        }

        emit_progress(events, 100.0, "Done");
        if output.is_empty() {
            Ok("Patch applied.".to_string())
        } else {
            Ok(output.join("\n"))
        }
    }
}

fn emit_progress(events: &EventHub, percent: f64, message: &str) {
    let snapshot = ProgressSnapshot::new(percent, message);
    if let Err(e) = events.emit(PROGRESS_TOPIC, &snapshot) {
        tracing::warn!(error = %e, "failed to emit progress");
    }
}
