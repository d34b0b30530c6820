use std::{
    io::{BufRead, BufReader, Read},
    process::{Command, ExitStatus, Output, Stdio},
};

use bitflags::bitflags;
use miette::{miette, Context, IntoDiagnostic};
use tracing::{debug, enabled, trace, Level};

use crate::result::{bail, Result};

pub const YT_DL: &str = "youtube-dl";
pub const YT_DLP: &str = "yt-dlp";
pub const FFMPEG: &str = "ffmpeg";
pub const FFXXX_DEFAULT_ARGS: [&str; 3] = ["-hide_banner", "-loglevel", "error"];

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capture: u8 {
        const STDIN = 0b0000001;
        const STDOUT = 0b0000010;
        const STDERR = 0b0000100;
    }
}

/// Run a command, returning its raw output handle.
///
/// IO handles will be captured only if the caller required it or if the log level is Debug.
/// In that last case, `stdout` and `stderr` will be logged.
///
/// The function returns an error only if the command failed to execute.
/// If the program runs but returns a non-0 status code, it will not trigger an error.
pub fn run_command<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
    capture: Capture,
) -> Result<Output> {
    let is_debug = enabled!(Level::DEBUG);
    let get_io = |capture| {
        if capture {
            Stdio::piped()
        } else {
            Stdio::null()
        }
    };

    let mut cmd = Command::new(program);
    let cmd = f(&mut cmd)
        .stdin(get_io(capture.contains(Capture::STDIN)))
        .stdout(get_io(is_debug || capture.contains(Capture::STDOUT)))
        .stderr(get_io(is_debug || capture.contains(Capture::STDERR)));

    debug!("Executing command: {cmd:?}");
    let res = cmd
        .output()
        .into_diagnostic()
        .wrap_err_with(|| format!("Could not run {program}"))?;

    if is_debug {
        debug!("status: {}", res.status);
        debug!("stdout: {} bytes long", res.stdout.len());
        trace!("stdout: {:?}", String::from_utf8_lossy(&res.stdout));
        debug!("stderr: {} bytes long", res.stderr.len());
        trace!("stderr: {:?}", String::from_utf8_lossy(&res.stderr));
    }

    Ok(res)
}

/// Run the command and verify that it has returned a success status code.
pub fn assert_success_command<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
) -> Result<()> {
    let res = run_command(program, f, Capture::STDERR)?;
    if res.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&res.stderr);
        bail(format!(
            "{program} did run but was not successful: {}",
            stderr.trim()
        ))
    }
}

/// Result of a streamed command.
#[derive(Debug)]
pub struct StreamedOutput {
    pub status: ExitStatus,
    pub stderr: String,
}

/// Run a command, handing every stdout line to `on_line` as soon as it is printed.
///
/// `stderr` is drained on a separate thread so that a chatty program cannot
/// block on a full pipe, and is returned once the program exits.
///
/// As with [`run_command`], a non-0 status code is not an error.
pub fn stream_command<F, L>(program: &str, f: F, mut on_line: L) -> Result<StreamedOutput>
where
    F: FnOnce(&mut Command) -> &mut Command,
    L: FnMut(&str),
{
    let mut cmd = Command::new(program);
    let cmd = f(&mut cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("Executing command: {cmd:?}");
    let mut child = cmd
        .spawn()
        .into_diagnostic()
        .wrap_err_with(|| format!("Could not run {program}"))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| miette!("stdout of {program} was not captured"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| miette!("stderr of {program} was not captured"))?;

    let stderr_thread = std::thread::Builder::new()
        .name(format!("{program}-stderr"))
        .spawn(move || {
            let mut buf = Vec::new();
            // A read error only loses diagnostics, the status still tells the outcome
            let _ = stderr.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })?;

    // Lines are decoded lossily: a file path in the console encoding must not stop the read
    let read = BufReader::new(stdout)
        .split(b'\n')
        .try_for_each(|line| {
            let line = line?;
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches('\r');
            trace!("{program}: {line}");
            on_line(line);
            Ok::<_, std::io::Error>(())
        });

    if let Err(err) = read {
        // Do not leave the program running unattended
        let _ = child.kill();
        let _ = child.wait();
        return Err(miette!("Could not read the output of {program}: {err}").into());
    }

    let status = child
        .wait()
        .into_diagnostic()
        .wrap_err_with(|| format!("Could not wait for {program}"))?;
    let stderr = stderr_thread
        .join()
        .map_err(|_| miette!("The stderr reader of {program} panicked"))?;

    debug!("status: {status}");
    trace!("stderr: {stderr:?}");

    Ok(StreamedOutput { status, stderr })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn run_command_captures_stdout() {
        let res = run_command("echo", |cmd| cmd.arg("hello"), Capture::STDOUT).unwrap();
        assert!(res.status.success());
        assert_eq!(String::from_utf8_lossy(&res.stdout).trim(), "hello");
    }

    #[test]
    fn missing_program_is_an_error() {
        assert!(run_command("surely-not-a-real-program-xyz", |cmd| cmd, Capture::empty()).is_err());
    }

    #[test]
    fn failing_status_is_reported() {
        assert!(assert_success_command("false", |cmd| cmd).is_err());
        assert!(assert_success_command("true", |cmd| cmd).is_ok());
    }

    #[test]
    fn stream_command_sees_every_line() {
        let mut lines = Vec::new();
        let out = stream_command(
            "sh",
            |cmd| cmd.args(["-c", "echo one; echo oops >&2; echo two"]),
            |line| lines.push(line.to_owned()),
        )
        .unwrap();

        assert!(out.status.success());
        assert_eq!(lines, ["one", "two"]);
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[test]
    fn stream_command_survives_invalid_utf8() {
        let mut lines = Vec::new();
        let out = stream_command(
            "sh",
            |cmd| cmd.args(["-c", r"echo first; printf '/tmp/Caf\351.mp4\n'; echo last"]),
            |line| lines.push(line.to_owned()),
        )
        .unwrap();

        assert!(out.status.success());
        assert_eq!(lines, ["first", "/tmp/Caf\u{fffd}.mp4", "last"]);
    }
}
