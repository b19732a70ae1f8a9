//! Local preprocessing of the active source.
//!
//! Runs the configured compiler in preprocess-only mode, feeding the editor
//! text on stdin and capturing the expanded translation unit from stdout.
//! The invocation happens in the compiler's own directory so relative
//! toolchain lookups behave the way a build would.

use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use correlation::SourceSettings;

use crate::error::ExplorerError;

/// Assemble the preprocessor command line: configured switches, then the
/// user's additional switches (split shell-style), then the fixed
/// preprocess-to-stdout tail.
pub fn command_line(settings: &SourceSettings, additional_switches: &str) -> Vec<String> {
    let mut args = vec![settings.compiler_path.clone()];
    args.extend(settings.switches.iter().cloned());
    args.extend(shlex::split(additional_switches).unwrap_or_default());
    let include_base = Path::new(&settings.source_path)
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    args.push(format!("-I{include_base}"));
    args.extend(["-E", "-o", "-", "-x"].map(String::from));
    args.push(settings.language.to_lowercase());
    args.extend(["-c", "-"].map(String::from));
    args
}

fn working_dir(settings: &SourceSettings) -> String {
    Path::new(&settings.compiler_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ".".into())
}

/// Preprocess `source_text` with the unit's own compiler. Non-zero exit or
/// empty stdout is a [`ExplorerError::Preprocess`]; cancellation kills the
/// child and reports the silent sentinel.
pub async fn preprocess(
    settings: &SourceSettings,
    additional_switches: &str,
    source_text: &str,
    cancel: &CancellationToken,
) -> Result<String, ExplorerError> {
    let args = command_line(settings, additional_switches);
    let command_line = args.join(" ");
    let working_dir = working_dir(settings);
    debug!(command = %command_line, dir = %working_dir, "preprocessing");

    let preprocess_error = |exit_code: i32, stdout: String, stderr: String| {
        ExplorerError::Preprocess {
            command_line: command_line.clone(),
            working_dir: working_dir.clone(),
            exit_code,
            stdout,
            stderr,
        }
    };

    let mut child = Command::new(&args[0])
        .args(&args[1..])
        .current_dir(&working_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| preprocess_error(-1, String::new(), e.to_string()))?;

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(source_text.as_bytes()).await {
            return Err(preprocess_error(-1, String::new(), e.to_string()));
        }
        // Dropping stdin closes the pipe so the child sees end of input.
    }

    let output = tokio::select! {
        _ = cancel.cancelled() => return Err(ExplorerError::Canceled),
        output = child.wait_with_output() => {
            output.map_err(|e| preprocess_error(-1, String::new(), e.to_string()))?
        }
    };

    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if exit_code == 0 && !stdout.is_empty() {
        Ok(stdout)
    } else {
        Err(preprocess_error(exit_code, stdout, stderr))
    }
}
