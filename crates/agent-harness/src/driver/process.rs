//! Agent driver (C2).
//!
//! Spawns a CLI child, streams its output with a per-read timeout, and
//! enforces an overall deadline. On timeout the child is terminated then
//! killed; the driver never leaves a zombie process behind.
//!
//! Python's `select.select`-based readable-readiness wait has no single
//! stdlib equivalent for pipes in Rust. This reads stdout on a dedicated
//! background thread that forwards whole lines over a channel; the
//! foreground loop applies the per-read timeout with `recv_timeout`, giving
//! the same bounded-wait semantics.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::driver::provider::CommandInstruction;
use crate::driver::{AgentConfig, Provider};
use crate::error::{HarnessError, HarnessResult};

/// Aggregated per-call metadata extracted from `system`/`result` stream
/// events (cost, turns, api time), spec §3.2.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ExecutionMetadata {
    pub cost_usd: Option<f64>,
    pub duration_ms: Option<f64>,
    pub duration_api_ms: Option<f64>,
    pub num_turns: Option<u64>,
}

impl ExecutionMetadata {
    fn merge_from(&mut self, value: &Value) {
        if let Some(v) = value.get("cost_usd").and_then(Value::as_f64) {
            self.cost_usd = Some(v);
        }
        if let Some(v) = value.get("duration_ms").and_then(Value::as_f64) {
            self.duration_ms = Some(v);
        }
        if let Some(v) = value.get("duration_api_ms").and_then(Value::as_f64) {
            self.duration_api_ms = Some(v);
        }
        if let Some(v) = value.get("num_turns").and_then(Value::as_u64) {
            self.num_turns = Some(v);
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub output: String,
    pub metadata: ExecutionMetadata,
}

enum LineEvent {
    Line(String),
    Eof,
}

pub struct AgentDriver {
    provider: Provider,
    cli_path: String,
    current_child: std::sync::Mutex<Option<u32>>,
}

impl AgentDriver {
    pub fn new(provider: Provider, cli_path: impl Into<String>) -> Self {
        AgentDriver {
            provider,
            cli_path: cli_path.into(),
            current_child: std::sync::Mutex::new(None),
        }
    }

    /// `run(instruction, stdin_data?, cwd?, config) -> (output, metadata)`.
    pub fn run(
        &self,
        instruction: CommandInstruction,
        stdin_data: Option<&str>,
        cwd: Option<&std::path::Path>,
        config: &AgentConfig,
    ) -> HarnessResult<RunOutcome> {
        let argv = self
            .provider
            .build_command(&self.cli_path, &instruction, config)
            .map_err(|reason| HarnessError::ValidatorException { message: reason })?;
        validate_argv(&argv)?;

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(if stdin_data.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd.spawn().map_err(|_| {
            HarnessError::CommandNotFound {
                cmd: argv[0].clone(),
            }
        })?;

        *self.current_child.lock().unwrap() = Some(child.id());

        if let Some(data) = stdin_data {
            if let Some(stdin) = child.stdin.take() {
                let mut stdin = stdin;
                let _ = stdin.write_all(data.as_bytes());
            }
            // Fixed-stdin mode: single blocking call bounded by the overall timeout.
            let outcome = self.run_fixed_stdin(&mut child, config, &argv.join(" "));
            *self.current_child.lock().unwrap() = None;
            return outcome;
        }

        // Streaming mode.
        let outcome = self.run_streaming(&mut child, config, &argv.join(" "), &mut || {});
        *self.current_child.lock().unwrap() = None;
        outcome
    }

    /// Streaming-mode run that invokes `on_first_line` exactly once, when
    /// the first line of stdout arrives. Used by the moderator-with-retry
    /// controller (spec §4.5) to mark "first output" in its audit log for
    /// startup-hang detection, without requiring callers of the ordinary
    /// `run` to pay for the indirection.
    pub fn run_traced(
        &self,
        instruction: CommandInstruction,
        cwd: Option<&std::path::Path>,
        config: &AgentConfig,
        mut on_first_line: impl FnMut(),
    ) -> HarnessResult<RunOutcome> {
        let argv = self
            .provider
            .build_command(&self.cli_path, &instruction, config)
            .map_err(|reason| HarnessError::ValidatorException { message: reason })?;
        validate_argv(&argv)?;

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(Stdio::null());

        let mut child = cmd.spawn().map_err(|_| HarnessError::CommandNotFound {
            cmd: argv[0].clone(),
        })?;
        *self.current_child.lock().unwrap() = Some(child.id());

        let outcome = self.run_streaming(&mut child, config, &argv.join(" "), &mut on_first_line);
        *self.current_child.lock().unwrap() = None;
        outcome
    }

    fn run_fixed_stdin(
        &self,
        child: &mut Child,
        config: &AgentConfig,
        cmd_label: &str,
    ) -> HarnessResult<RunOutcome> {
        let start = Instant::now();
        let timeout = config.timeout_seconds.map(Duration::from_secs_f64);

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let mut stdout = String::new();
                    if let Some(mut out) = child.stdout.take() {
                        use std::io::Read;
                        let _ = out.read_to_string(&mut stdout);
                    }
                    let mut stderr = String::new();
                    if let Some(mut err) = child.stderr.take() {
                        use std::io::Read;
                        let _ = err.read_to_string(&mut stderr);
                    }
                    if status.success() {
                        return Ok(RunOutcome {
                            output: stdout,
                            metadata: ExecutionMetadata::default(),
                        });
                    }
                    return Err(HarnessError::ExecutionError {
                        exit_code: status.code(),
                        stdout,
                        stderr,
                        cmd: cmd_label.to_string(),
                    });
                }
                Ok(None) => {
                    if let Some(t) = timeout {
                        if start.elapsed() >= t {
                            terminate_then_kill(child)?;
                            return Err(HarnessError::TimeoutError {
                                configured_timeout: config.timeout_seconds,
                                actual_duration: start.elapsed().as_secs_f64(),
                            });
                        }
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
                Err(e) => {
                    return Err(HarnessError::Io(e));
                }
            }
        }
    }

    fn run_streaming(
        &self,
        child: &mut Child,
        config: &AgentConfig,
        cmd_label: &str,
        on_first_line: &mut dyn FnMut(),
    ) -> HarnessResult<RunOutcome> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::ValidatorException {
                message: "child stdout not piped".into(),
            })?;

        let (tx, rx) = mpsc::channel::<LineEvent>();
        let reader_handle = std::thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) => {
                        let _ = tx.send(LineEvent::Eof);
                        break;
                    }
                    Ok(_) => {
                        if tx.send(LineEvent::Line(line)).is_err() {
                            break;
                        }
                    }
                    Err(_) => {
                        let _ = tx.send(LineEvent::Eof);
                        break;
                    }
                }
            }
        });

        let overall_timeout = config.timeout_seconds;
        let start = Instant::now();
        let mut collected = String::new();
        let mut metadata = ExecutionMetadata::default();
        let mut line_count = 0usize;
        let mut eof_seen = false;

        loop {
            let remaining = overall_timeout.map(|t| (t - start.elapsed().as_secs_f64()).max(0.0));
            if let Some(r) = remaining {
                if r <= 0.0 && !eof_seen {
                    terminate_then_kill(child)?;
                    let _ = reader_handle.join();
                    return Err(HarnessError::TimeoutError {
                        configured_timeout: overall_timeout,
                        actual_duration: start.elapsed().as_secs_f64(),
                    });
                }
            }

            let per_read_timeout = per_read_timeout_secs(line_count, overall_timeout);
            let wait = Duration::from_secs_f64(per_read_timeout.max(0.001));

            match rx.recv_timeout(wait) {
                Ok(LineEvent::Line(line)) => {
                    line_count += 1;
                    if line_count == 1 {
                        on_first_line();
                    }
                    let parsed = self.provider.parse_stream_line(&line);
                    collected.push_str(&parsed.text);
                    if let Some(meta) = &parsed.metadata {
                        metadata.merge_from(meta);
                    }
                }
                Ok(LineEvent::Eof) => {
                    eof_seen = true;
                }
                Err(RecvTimeoutError::Timeout) => {
                    // No line within this read window; loop back and
                    // re-check the overall deadline.
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    eof_seen = true;
                }
            }

            if eof_seen {
                break;
            }
        }

        let _ = reader_handle.join();

        match child.wait() {
            Ok(status) => {
                if status.success() {
                    Ok(RunOutcome {
                        output: collected,
                        metadata,
                    })
                } else {
                    let mut stderr = String::new();
                    if let Some(mut err) = child.stderr.take() {
                        use std::io::Read;
                        let _ = err.read_to_string(&mut stderr);
                    }
                    Err(HarnessError::ExecutionError {
                        exit_code: status.code(),
                        stdout: collected,
                        stderr,
                        cmd: cmd_label.to_string(),
                    })
                }
            }
            Err(e) => Err(HarnessError::Io(e)),
        }
    }

    /// Forcefully reset a hung child between retry attempts (used by the
    /// moderator-with-retry controller, spec §4.5).
    pub fn kill_current(&self) -> HarnessResult<()> {
        let pid = self.current_child.lock().unwrap().take();
        let Some(pid) = pid else {
            return Ok(());
        };
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                return Err(HarnessError::ProcessKillError {
                    message: format!("kill(-9) failed for pid {pid}: {e}"),
                });
            }
        }
        Ok(())
    }
}

/// Per-read timeout for streaming mode (spec §4.1): the general case is
/// `min(remaining_overall_timeout, 1 second)`; for the first 5 lines it is
/// `min(10, overall_timeout/2)` to detect a startup hang quickly.
fn per_read_timeout_secs(line_count: usize, overall_timeout: Option<f64>) -> f64 {
    if line_count < 5 {
        let half = overall_timeout.map(|t| t / 2.0).unwrap_or(10.0);
        return 10.0_f64.min(half);
    }
    match overall_timeout {
        Some(t) => t.min(1.0).max(0.0),
        None => 1.0,
    }
}

fn terminate_then_kill(child: &mut Child) -> HarnessResult<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        let pid = Pid::from_raw(child.id() as i32);
        let _ = kill(pid, Signal::SIGTERM);
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match child.try_wait() {
                Ok(Some(_)) => return Ok(()),
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(50));
                }
                Ok(None) => break,
                Err(e) => return Err(HarnessError::Io(e)),
            }
        }
        let _ = kill(pid, Signal::SIGKILL);
    }
    child
        .wait()
        .map(|_| ())
        .map_err(|e| HarnessError::ProcessKillError {
            message: e.to_string(),
        })
}

/// Basic injection guard (spec §4.1): reject arguments containing
/// non-absolute paths beginning with `..`, or that otherwise look like
/// shell metacharacter smuggling. Arguments are always plain strings here
/// (we build a `Vec<String>`, never a shell string), so this mainly guards
/// against `..`-relative path traversal in provider-supplied flags.
fn validate_argv(argv: &[String]) -> HarnessResult<()> {
    for arg in argv.iter().skip(1) {
        if arg.starts_with("..") {
            return Err(HarnessError::ValidatorException {
                message: format!("rejected command argument with relative traversal: {arg}"),
            });
        }
    }
    Ok(())
}
