//! Build pipeline: compiles a unit directory into a loadable artifact.
//!
//! Runs the configured toolchain as a child process:
//!
//! ```text
//! {toolchain} build --lib --manifest-path {unit}/Cargo.toml
//!     --target-dir {compiled}/target --message-format=json-render-diagnostics
//!     [--release] {extra args}
//! ```
//!
//! The `compiler-artifact` record for the `cdylib` target names the built
//! library, which is installed as `{compiled}/{unit}.{DLL_EXTENSION}` via a
//! temp file and rename. Compile does not cache; callers consult
//! [`PluginCompiler::needs_rebuild`] first.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use hookwire_core::config::PluginConfig;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{error, info};

use super::digest;
use crate::error::{PluginError, PluginResult};

/// Outcome of one compile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileResult {
    /// Build unit name.
    pub unit: String,
    /// Whether an artifact was produced and installed.
    pub success: bool,
    /// Installed artifact path.
    pub artifact_path: Option<PathBuf>,
    /// Source digest at compile time.
    pub digest: Option<String>,
    /// When the compile started.
    pub started_at: DateTime<Utc>,
    /// Elapsed time in milliseconds.
    pub duration_ms: u64,
    /// Failure description, including compiler diagnostics.
    pub error: Option<String>,
}

impl CompileResult {
    /// Returns the elapsed time.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Invokes the external toolchain for build units.
#[derive(Debug, Clone)]
pub struct PluginCompiler {
    /// Plugin source root.
    runtime_dir: PathBuf,
    /// Artifact root.
    compiled_dir: PathBuf,
    /// Toolchain program.
    toolchain: String,
    /// Build with `--release`.
    release: bool,
    /// Extra arguments appended to the build command.
    extra_args: Vec<String>,
    /// Digested source extensions.
    extensions: Vec<String>,
}

impl PluginCompiler {
    /// Creates a compiler from plugin configuration.
    pub fn new(config: &PluginConfig) -> Self {
        Self {
            runtime_dir: config.runtime_path(),
            compiled_dir: config.compiled_path(),
            toolchain: config.toolchain.clone(),
            release: config.release,
            extra_args: config.extra_build_args.clone(),
            extensions: config.source_extensions.clone(),
        }
    }

    /// Returns the source directory of a unit.
    pub fn unit_dir(&self, unit: &str) -> PathBuf {
        self.runtime_dir.join(unit)
    }

    /// Returns where a unit's artifact is installed.
    pub fn artifact_path(&self, unit: &str) -> PathBuf {
        self.compiled_dir
            .join(format!("{}.{}", unit_file_stem(unit), std::env::consts::DLL_EXTENSION))
    }

    /// Returns the artifact root.
    pub fn compiled_dir(&self) -> &Path {
        &self.compiled_dir
    }

    /// Returns the digested source extensions.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Compiles a unit. Never fails the caller; the outcome is in the result.
    pub async fn compile(&self, unit: &str) -> CompileResult {
        let started_at = Utc::now();
        let started = Instant::now();
        let mut result = CompileResult {
            unit: unit.to_string(),
            success: false,
            artifact_path: None,
            digest: None,
            started_at,
            duration_ms: 0,
            error: None,
        };

        match self.try_compile(unit, &mut result).await {
            Ok(path) => {
                result.success = true;
                result.artifact_path = Some(path);
            }
            Err(e) => {
                error!(plugin = %unit, error = %e, "Plugin compile failed");
                result.error = Some(e.to_string());
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        if result.success {
            info!(
                plugin = %unit,
                artifact = ?result.artifact_path,
                duration_ms = result.duration_ms,
                "Plugin compiled"
            );
        }
        result
    }

    /// Returns whether the unit's digest differs from `last_digest`.
    ///
    /// Digest failures count as "must rebuild".
    pub async fn needs_rebuild(&self, unit: &str, last_digest: Option<&str>) -> bool {
        let dir = self.unit_dir(unit);
        let extensions = self.extensions.clone();
        let last = last_digest.map(str::to_string);
        tokio::task::spawn_blocking(move || digest::needs_rebuild(&dir, &extensions, last.as_deref()))
            .await
            .unwrap_or(true)
    }

    /// Computes a unit's current digest.
    pub async fn digest(&self, unit: &str) -> PluginResult<String> {
        let dir = self.unit_dir(unit);
        let extensions = self.extensions.clone();
        tokio::task::spawn_blocking(move || digest::digest(&dir, &extensions))
            .await
            .map_err(|e| PluginError::Io(std::io::Error::other(e)))?
    }

    /// Removes a unit's installed artifact. A missing artifact is success.
    pub async fn clean(&self, unit: &str) -> PluginResult<()> {
        let path = self.artifact_path(unit);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(plugin = %unit, artifact = %path.display(), "Artifact removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn try_compile(&self, unit: &str, result: &mut CompileResult) -> PluginResult<PathBuf> {
        let unit_dir = self.unit_dir(unit);
        let source_dir = tokio::fs::canonicalize(&unit_dir)
            .await
            .map_err(|_| PluginError::SourceNotFound(unit_dir.clone()))?;
        if !source_dir.is_dir() {
            return Err(PluginError::SourceNotFound(source_dir));
        }

        let digest = self.digest(unit).await?;
        result.digest = Some(digest.clone());

        tokio::fs::create_dir_all(&self.compiled_dir).await?;
        let compiled_dir = tokio::fs::canonicalize(&self.compiled_dir).await?;

        info!(
            plugin = %unit,
            source = %source_dir.display(),
            digest = %digest,
            "Compiling plugin"
        );

        let mut cmd = Command::new(&self.toolchain);
        cmd.arg("build")
            .arg("--lib")
            .arg("--manifest-path")
            .arg(source_dir.join("Cargo.toml"))
            .arg("--target-dir")
            .arg(compiled_dir.join("target"))
            .arg("--message-format=json-render-diagnostics");
        if self.release {
            cmd.arg("--release");
        }
        cmd.args(&self.extra_args)
            .current_dir(&source_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = cmd.output().await.map_err(|e| PluginError::BuildFailed {
            unit: unit.to_string(),
            diagnostics: format!("failed to run '{}': {e}", self.toolchain),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let scan = scan_build_output(&stdout);
        let diagnostics = join_diagnostics(&stderr, &scan.plain_lines);

        if !output.status.success() {
            return Err(PluginError::BuildFailed {
                unit: unit.to_string(),
                diagnostics: format!("{}\n{}", output.status, diagnostics),
            });
        }

        let built = scan.artifact.ok_or_else(|| PluginError::BuildFailed {
            unit: unit.to_string(),
            diagnostics: format!("no cdylib artifact reported\n{diagnostics}"),
        })?;
        if !tokio::fs::try_exists(&built).await.unwrap_or(false) {
            return Err(PluginError::BuildFailed {
                unit: unit.to_string(),
                diagnostics: format!("reported artifact missing: {}", built.display()),
            });
        }

        let installed = self.artifact_path(unit);
        install(&built, &installed).await?;
        Ok(installed)
    }
}

/// Artifact and non-JSON lines found in the toolchain's stdout.
#[derive(Debug, Default)]
struct BuildScan {
    artifact: Option<PathBuf>,
    plain_lines: Vec<String>,
}

/// Parses `--message-format=json` output for the last cdylib artifact.
fn scan_build_output(stdout: &str) -> BuildScan {
    let mut scan = BuildScan::default();
    let wanted = format!(".{}", std::env::consts::DLL_EXTENSION);

    for line in stdout.lines() {
        let Ok(record) = serde_json::from_str::<serde_json::Value>(line) else {
            if !line.trim().is_empty() {
                scan.plain_lines.push(line.to_string());
            }
            continue;
        };

        if record["reason"] != "compiler-artifact" {
            continue;
        }
        let is_cdylib = record["target"]["kind"]
            .as_array()
            .is_some_and(|kinds| kinds.iter().any(|k| k == "cdylib"));
        if !is_cdylib {
            continue;
        }
        if let Some(found) = record["filenames"].as_array().and_then(|files| {
            files
                .iter()
                .filter_map(|f| f.as_str())
                .find(|f| f.ends_with(&wanted))
        }) {
            scan.artifact = Some(PathBuf::from(found));
        }
    }

    scan
}

fn join_diagnostics(stderr: &str, plain_lines: &[String]) -> String {
    let mut out = stderr.trim_end().to_string();
    for line in plain_lines {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
    }
    out
}

/// Copies the artifact next to its destination, then renames it into place.
async fn install(built: &Path, installed: &Path) -> PluginResult<()> {
    let mut tmp = installed.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::copy(built, &tmp).await?;
    if let Err(e) = tokio::fs::rename(&tmp, installed).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

fn unit_file_stem(unit: &str) -> String {
    Path::new(unit)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| unit.to_string())
}
