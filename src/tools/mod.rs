//! Uniform invocation of the external tool scripts.
//!
//! Every external step of the pipeline (format normalization, content
//! extraction, embedding, similarity query, index inspection) runs as a
//! separate interpreter process with the same contract: arguments and/or
//! stdin in, JSON on stdout out, non-zero exit means failure with the
//! diagnostic text on stderr. The orchestrator never special-cases a tool
//! beyond choosing which [`ToolKind`] to invoke.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// The external tools the orchestrator can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Convert an arbitrary document format into canonical PDF.
    NormalizeDocument,
    /// Extract text and structure from a canonical document.
    ExtractDocument,
    /// Transcribe an audio file to text.
    ExtractAudio,
    /// Chunk, embed, and index a batch of parsed results.
    EmbedIndex,
    /// Run a similarity query against a user collection.
    QueryIndex,
    /// List the collections present in the vector index.
    ListCollections,
    /// Dump the contents of a single collection.
    DumpCollection,
}

impl ToolKind {
    /// Script filename implementing the tool, resolved under the tools directory.
    pub fn script_name(self) -> &'static str {
        match self {
            Self::NormalizeDocument => "convert_to_pdf.py",
            Self::ExtractDocument => "pdf_parser.py",
            Self::ExtractAudio => "audio_parser.py",
            Self::EmbedIndex => "embed_parser.py",
            Self::QueryIndex => "query_index.py",
            Self::ListCollections => "list_collections.py",
            Self::DumpCollection => "dump_collection.py",
        }
    }
}

/// Captured output of a completed tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Full stdout of the process.
    pub stdout: String,
    /// Full stderr of the process, kept for diagnostics.
    pub stderr: String,
}

/// Errors raised while invoking an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The process could not be spawned or awaited.
    #[error("Failed to run {tool}: {source}")]
    Spawn {
        /// Script that failed to start.
        tool: &'static str,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The process exited with a non-zero status.
    #[error("{tool} failed: {stderr}")]
    Failed {
        /// Script that failed.
        tool: &'static str,
        /// Diagnostic text captured from stderr.
        stderr: String,
    },
    /// The process succeeded but printed nothing where output was required.
    #[error("{tool} produced no output")]
    EmptyOutput {
        /// Script that stayed silent.
        tool: &'static str,
    },
    /// The process produced output that could not be parsed as JSON.
    #[error("{tool} produced malformed output: {source}")]
    MalformedOutput {
        /// Script whose output failed to parse.
        tool: &'static str,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Interface implemented by tool runners.
///
/// The orchestrator holds this as a boxed trait object so tests can script
/// tool behavior without spawning processes.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Run a tool to completion, optionally feeding `stdin` to the process.
    async fn invoke(
        &self,
        kind: ToolKind,
        args: &[String],
        stdin: Option<String>,
    ) -> Result<ToolOutput, ToolError>;
}

/// Tool runner spawning real interpreter processes.
pub struct ProcessInvoker {
    python_bin: String,
    tools_dir: PathBuf,
}

impl ProcessInvoker {
    /// Build a runner for the given interpreter and script directory.
    pub fn new(python_bin: String, tools_dir: PathBuf) -> Self {
        Self {
            python_bin,
            tools_dir,
        }
    }

    /// Build a runner from the loaded configuration.
    pub fn from_config() -> Self {
        let config = crate::config::get_config();
        Self::new(config.tool_python_bin.clone(), config.tools_dir.clone())
    }
}

#[async_trait]
impl ToolInvoker for ProcessInvoker {
    async fn invoke(
        &self,
        kind: ToolKind,
        args: &[String],
        stdin: Option<String>,
    ) -> Result<ToolOutput, ToolError> {
        let tool = kind.script_name();
        let script = self.tools_dir.join(tool);
        tracing::debug!(tool, args = ?args, has_stdin = stdin.is_some(), "Invoking tool");

        let mut command = Command::new(&self.python_bin);
        command
            .arg(&script)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|source| ToolError::Spawn { tool, source })?;

        // Feed stdin while draining stdout/stderr. Writing the payload first
        // would deadlock once the child fills an output pipe before it
        // finishes reading stdin. The handle is moved into the future so the
        // pipe closes as soon as the write completes.
        let stdin_handle = child.stdin.take();
        let feed = async move {
            if let (Some(mut handle), Some(payload)) = (stdin_handle, stdin) {
                handle.write_all(payload.as_bytes()).await?;
            }
            Ok::<(), std::io::Error>(())
        };

        // No timeout is enforced; a hung tool hangs this request only.
        let (wait_result, feed_result) = tokio::join!(child.wait_with_output(), feed);
        let output = wait_result.map_err(|source| ToolError::Spawn { tool, source })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            tracing::error!(tool, stderr = %stderr.trim(), "Tool failed");
            return Err(ToolError::Failed {
                tool,
                stderr: if stderr.trim().is_empty() {
                    stdout
                } else {
                    stderr
                },
            });
        }

        // A tool may exit successfully without consuming all of stdin; only
        // a genuine write failure is an error.
        if let Err(source) = feed_result
            && source.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(ToolError::Spawn { tool, source });
        }

        tracing::debug!(tool, stdout_bytes = stdout.len(), "Tool completed");
        Ok(ToolOutput { stdout, stderr })
    }
}

/// Extract the first non-blank line of a tool's stdout.
///
/// Tools occasionally emit stray diagnostics on the same stream as their
/// JSON payload; only the first non-blank line is treated as the result.
/// Returns `None` for entirely blank output.
pub fn first_json_line(stdout: &str) -> Option<&str> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
}
