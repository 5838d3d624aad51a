//! Running the external tools that do the real work.
//!
//! Poppler's `pdfinfo` and `pdftocairo` and the `tesseract` CLI are all run
//! through [`run_tool`], which limits how many of them run at once and turns
//! failures into errors that include the tool's own error output.

use std::{process::Output, sync::LazyLock};

use regex::Regex;
use tokio::{process::Command, sync::Semaphore};
use tracing::Level;

use crate::prelude::*;

/// Semaphore used to limit the number of concurrent `pdftocairo` and
/// `tesseract` processes.
static CPU_SEMAPHORE: LazyLock<Semaphore> =
    LazyLock::new(|| Semaphore::new(num_cpus::get()));

/// Lines of standard error that look like errors.
static ERROR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error").expect("failed to compile regex"));

/// Poppler prints this for damaged cross-reference tables that it repairs on
/// its own.
static DOWNGRADE_TO_WARNING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error: xref num").expect("failed to compile regex")
});

/// Does this line of tool output contain an error?
fn is_error_line(line: &str) -> bool {
    ERROR_REGEX.is_match(line) && !DOWNGRADE_TO_WARNING_REGEX.is_match(line)
}

/// The level at which we log a line of a tool's standard error.
///
/// Poppler reports damage it repairs itself as `Syntax Error: ...` and still
/// exits successfully, so these lines are informational. Everything stays
/// below our default `warn` filter, which keeps failures down to a single
/// line of output.
fn stderr_line_level(line: &str) -> Level {
    if is_error_line(line) {
        Level::INFO
    } else {
        Level::DEBUG
    }
}

/// Run `cmd` to completion while holding a permit from the CPU semaphore, and
/// check it for failure.
///
/// Each of these tools will happily use 100% of a CPU core, so we don't want
/// `--jobs 200` to start 200 of them. The child process is killed if the
/// returned future is dropped, which happens when another page fails first.
#[instrument(level = "debug", skip_all, fields(command = %command_name))]
pub async fn run_tool(command_name: &str, cmd: &mut Command) -> Result<Output> {
    cmd.kill_on_drop(true);
    let permit = CPU_SEMAPHORE
        .acquire()
        .await
        .context("could not acquire CPU permit")?;
    let output = cmd
        .output()
        .await
        .with_context(|| format!("failed to run {}", command_name))?;
    drop(permit);
    check_for_command_failure(command_name, &output)?;
    Ok(output)
}

/// Report any command failures, and include any error output.
///
/// Only the exit status decides whether the command failed. Standard output
/// and standard error are logged at low levels.
pub fn check_for_command_failure(command_name: &str, output: &Output) -> Result<()> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    trace!(
        command_name = command_name,
        output = %stdout,
        "Standard output from command"
    );

    if !output.status.success() {
        return Err(match output.status.code() {
            Some(exit_code) => anyhow!(
                "{} failed with exit code {} and error output:\n{}",
                command_name,
                exit_code,
                stderr.trim(),
            ),
            None => anyhow!(
                "{} failed with error output:\n{}",
                command_name,
                stderr.trim(),
            ),
        });
    }

    for line in stderr.lines().map(str::trim).filter(|line| !line.is_empty()) {
        if stderr_line_level(line) == Level::INFO {
            info!(command_name = command_name, "{}", line);
        } else {
            debug!(command_name = command_name, "{}", line);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn output(code: i32, stderr: &str) -> Output {
        use std::os::unix::process::ExitStatusExt as _;
        Output {
            status: std::process::ExitStatus::from_raw(code << 8),
            stdout: vec![],
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn is_error_line_works() {
        assert!(is_error_line("error: something went wrong"));
        assert!(is_error_line("Syntax Error: Couldn't read xref table"));
        assert!(!is_error_line("Warning: something is odd"));
        assert!(!is_error_line(
            "Internal Error: xref num 1234 not found but needed, document has changes, reconstruct aborted"
        ));
    }

    #[test]
    fn stderr_is_never_logged_above_info() {
        assert_eq!(stderr_line_level("Syntax Error: broken stream"), Level::INFO);
        assert_eq!(stderr_line_level("Syntax Warning: odd font"), Level::DEBUG);
        assert_eq!(
            stderr_line_level("Internal Error: xref num 7 not found"),
            Level::DEBUG
        );
        assert_eq!(stderr_line_level("Estimating resolution as 300"), Level::DEBUG);
    }

    #[test]
    #[cfg(unix)]
    fn nonzero_exit_is_a_failure() {
        let err = check_for_command_failure("pdftocairo", &output(1, "I/O Error\n"))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("pdftocairo failed with exit code 1"), "{msg}");
        assert!(msg.contains("I/O Error"), "{msg}");
    }

    #[test]
    #[cfg(unix)]
    fn repaired_syntax_errors_do_not_fail_a_successful_exit() {
        let stderr = "Syntax Error: broken stream\nSyntax Warning: odd font\n";
        check_for_command_failure("pdftocairo", &output(0, stderr)).unwrap();
        check_for_command_failure("tesseract", &output(0, "Estimating resolution"))
            .unwrap();
    }

    #[tokio::test]
    async fn missing_tool_is_reported_by_name() {
        let mut cmd = Command::new("pdf-ocr-no-such-tool");
        let err = run_tool("pdf-ocr-no-such-tool", &mut cmd).await.unwrap_err();
        assert!(err.to_string().contains("failed to run pdf-ocr-no-such-tool"));
    }
}
