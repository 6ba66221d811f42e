//! External tool invocation
//!
//! Locates and safely invokes the external binaries the pipeline delegates
//! to (poppler utilities, Ghostscript, tesseract, LibreOffice). Configured
//! override paths win over PATH lookup. Every invocation runs under a
//! per-command timeout; exit code and stdout are the only signals consulted.

use std::env;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;

use crate::config::BinaryConfig;
use crate::error::{AppError, Result};

/// Timeout for installation probes (`--version`-class invocations).
const PROBE_TIMEOUT_SECS: u64 = 10;

/// External tools the pipeline depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Pdftotext,
    Pdfinfo,
    Pdftohtml,
    Pdftoppm,
    Ghostscript,
    Tesseract,
    Soffice,
}

impl Tool {
    pub const ALL: [Tool; 7] = [
        Tool::Pdftotext,
        Tool::Pdfinfo,
        Tool::Pdftohtml,
        Tool::Pdftoppm,
        Tool::Ghostscript,
        Tool::Tesseract,
        Tool::Soffice,
    ];

    pub fn command_name(&self) -> &'static str {
        match self {
            Tool::Pdftotext => "pdftotext",
            Tool::Pdfinfo => "pdfinfo",
            Tool::Pdftohtml => "pdftohtml",
            Tool::Pdftoppm => "pdftoppm",
            Tool::Ghostscript => "gs",
            Tool::Tesseract => "tesseract",
            Tool::Soffice => "soffice",
        }
    }

    /// Safe probe flag used by `is_installed`.
    fn probe_flag(&self) -> &'static str {
        match self {
            Tool::Pdftotext | Tool::Pdfinfo | Tool::Pdftohtml | Tool::Pdftoppm => "-v",
            Tool::Ghostscript | Tool::Tesseract | Tool::Soffice => "--version",
        }
    }
}

/// Installation status for the admin diagnostics view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStatus {
    pub tool: Tool,
    pub path: Option<PathBuf>,
    pub installed: bool,
}

/// Resolves and invokes external tools.
#[derive(Debug, Clone)]
pub struct Binaries {
    config: BinaryConfig,
}

impl Binaries {
    pub fn new(config: BinaryConfig) -> Self {
        Self { config }
    }

    pub fn timeout_secs(&self) -> u64 {
        self.config.timeout_secs
    }

    fn override_path(&self, tool: Tool) -> Option<&PathBuf> {
        match tool {
            Tool::Pdftotext => self.config.pdftotext.as_ref(),
            Tool::Pdfinfo => self.config.pdfinfo.as_ref(),
            Tool::Pdftohtml => self.config.pdftohtml.as_ref(),
            Tool::Pdftoppm => self.config.pdftoppm.as_ref(),
            Tool::Ghostscript => self.config.gs.as_ref(),
            Tool::Tesseract => self.config.tesseract.as_ref(),
            Tool::Soffice => self.config.soffice.as_ref(),
        }
    }

    /// Resolve a tool to an invocable path: configured override first, then
    /// PATH lookup.
    pub fn resolve(&self, tool: Tool) -> Result<PathBuf> {
        if let Some(path) = self.override_path(tool) {
            if path.is_file() {
                return Ok(path.clone());
            }
            return Err(AppError::Unavailable(format!(
                "configured path for {} does not exist: {}",
                tool.command_name(),
                path.display()
            )));
        }
        path_lookup(tool.command_name()).ok_or_else(|| {
            AppError::Unavailable(format!("{} not found on PATH", tool.command_name()))
        })
    }

    /// Probe whether a tool is installed and runnable.
    pub async fn is_installed(&self, tool: Tool) -> bool {
        let Ok(path) = self.resolve(tool) else {
            return false;
        };
        let probe = tokio::time::timeout(
            Duration::from_secs(PROBE_TIMEOUT_SECS),
            Command::new(&path).arg(tool.probe_flag()).output(),
        )
        .await;
        match probe {
            Ok(Ok(output)) => {
                // Some poppler builds exit 99 on -v while still printing the
                // version banner.
                output.status.success() || output.status.code() == Some(99)
            }
            _ => false,
        }
    }

    /// Installation report for every tool, for the admin diagnostics view.
    pub async fn diagnostics(&self) -> Vec<ToolStatus> {
        let mut statuses = Vec::with_capacity(Tool::ALL.len());
        for tool in Tool::ALL {
            let path = self.resolve(tool).ok();
            let installed = self.is_installed(tool).await;
            statuses.push(ToolStatus {
                tool,
                path,
                installed,
            });
        }
        statuses
    }

    /// Run a tool and return its stdout.
    pub async fn run<I, S>(&self, tool: Tool, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.output(tool, args).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a tool that writes its results to files rather than stdout.
    pub async fn run_status<I, S>(&self, tool: Tool, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.output(tool, args).await.map(|_| ())
    }

    async fn output<I, S>(&self, tool: Tool, args: I) -> Result<std::process::Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let path = self.resolve(tool)?;
        let mut command = Command::new(&path);
        command.args(args);

        let timeout_secs = self.config.timeout_secs;
        let output = tokio::time::timeout(Duration::from_secs(timeout_secs), command.output())
            .await
            .map_err(|_| AppError::CommandTimeout(timeout_secs))?
            .map_err(|e| {
                AppError::Command(format!("failed to execute {}: {}", tool.command_name(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Command(format!(
                "{} failed (exit {}): {}",
                tool.command_name(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(output)
    }
}

/// Find a command on PATH.
fn path_lookup(name: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
