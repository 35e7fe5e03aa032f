use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::debug;

use super::types::{EngineCommand, ProcessResult};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run an engine process to completion, enforcing `cmd.timeout`.
///
/// Stdout and stderr are interleaved into one log in arrival order and each
/// line is traced at debug level as it arrives. Only a failure to start the
/// process is returned as `Err`; exit status and timeouts are in the result.
pub fn run(program: &str, cmd: &EngineCommand) -> Result<ProcessResult> {
    debug!(program, args = ?cmd.args, "invoking engine");

    let mut child = Command::new(program)
        .args(&cmd.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to invoke `{program}`; is it installed and on PATH?"))?;

    let log_buf = Arc::new(Mutex::new(String::new()));

    let stdout = child.stdout.take().context("engine stdout was not captured")?;
    let stderr = child.stderr.take().context("engine stderr was not captured")?;
    let stdout_handle = drain(stdout, log_buf.clone(), "stdout");
    let stderr_handle = drain(stderr, log_buf.clone(), "stderr");

    let (exit_status, timed_out) = wait_with_timeout(&mut child, cmd.timeout);

    let _ = stdout_handle.join();
    let _ = stderr_handle.join();

    let exit_code = exit_status.and_then(|s| s.code());
    let log = log_buf.lock().map(|b| b.clone()).unwrap_or_default();

    Ok(ProcessResult {
        success: exit_code == Some(0),
        exit_code,
        log,
        timed_out,
    })
}

fn drain<R: Read + Send + 'static>(
    stream: R,
    buf: Arc<Mutex<String>>,
    source: &'static str,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            match line {
                Ok(l) => {
                    debug!(target: "dockwright::engine", source, "{l}");
                    if let Ok(mut buf) = buf.lock() {
                        buf.push_str(&l);
                        buf.push('\n');
                    }
                }
                Err(_) => break,
            }
        }
    })
}

fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> (Option<std::process::ExitStatus>, bool) {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return (Some(status), false),
            Ok(None) => {}
            Err(_) => return (None, false),
        }

        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            return (None, true);
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}
