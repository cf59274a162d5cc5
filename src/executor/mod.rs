//! External scanner engine execution.
//!
//! The engine is a third-party scanner invoked as a subprocess. It writes
//! its results to a JSON file; this module owns spawning it with a wall
//! clock timeout and a memory ceiling, validating what it wrote, and
//! retrying once on transient infrastructure failures.

pub mod metrics;
pub mod normalize;
pub mod queue;
pub mod service;
pub mod transient;

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, WardError};
use crate::executor::metrics::ExecutionMetrics;
use crate::executor::queue::ScanGate;
use crate::executor::transient::is_transient;

pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 1024;
pub const DEFAULT_RETRY_COUNT: u32 = 1;

const RSS_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Parameters for one engine invocation.
#[derive(Debug, Clone)]
pub struct ScanEngineParams {
    pub provider: String,
    pub engine_bin: PathBuf,
    pub args: Vec<String>,
    pub output_path: PathBuf,
    pub timeout: Duration,
    pub memory_limit_mb: u64,
    pub retry_count: u32,
}

impl ScanEngineParams {
    pub fn new(provider: impl Into<String>, engine_bin: PathBuf, output_path: PathBuf) -> Self {
        Self {
            provider: provider.into(),
            engine_bin,
            args: Vec::new(),
            output_path,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            retry_count: DEFAULT_RETRY_COUNT,
        }
    }
}

/// What one subprocess run produced, kill reasons included.
#[derive(Debug, Default)]
pub struct EngineRun {
    pub exit_code: Option<i32>,
    pub stderr: String,
    pub timed_out: bool,
    pub memory_limit_exceeded: bool,
    pub peak_rss_kb: u64,
}

impl EngineRun {
    fn succeeded(&self) -> bool {
        !self.timed_out && !self.memory_limit_exceeded && self.exit_code == Some(0)
    }
}

/// A successful engine execution: the parsed result items plus the
/// per-invocation metadata.
#[derive(Debug)]
pub struct EngineOutcome {
    pub items: Vec<Value>,
    pub attempts: u32,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub memory_limit_exceeded: bool,
    /// Wall clock across all attempts.
    pub duration: Duration,
    pub peak_rss_kb: u64,
}

#[async_trait]
pub trait EngineRunner: Send + Sync {
    async fn run(&self, params: &ScanEngineParams) -> Result<EngineRun>;
}

/// Samples resident set size of a live process.
#[async_trait]
pub trait RssSampler: Send + Sync {
    async fn rss_kb(&self, pid: u32) -> Option<u64>;
}

/// Samples RSS via `ps -o rss= -p <pid>`.
pub struct PsRssSampler;

#[async_trait]
impl RssSampler for PsRssSampler {
    async fn rss_kb(&self, pid: u32) -> Option<u64> {
        let output = Command::new("ps")
            .args(["-o", "rss=", "-p", &pid.to_string()])
            .output()
            .await
            .ok()?;
        String::from_utf8_lossy(&output.stdout).trim().parse().ok()
    }
}

/// Runs the engine as a real subprocess under tokio.
pub struct SubprocessRunner {
    sampler: Arc<dyn RssSampler>,
}

impl SubprocessRunner {
    pub fn new() -> Self {
        Self {
            sampler: Arc::new(PsRssSampler),
        }
    }

    pub fn with_sampler(sampler: Arc<dyn RssSampler>) -> Self {
        Self { sampler }
    }
}

impl Default for SubprocessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineRunner for SubprocessRunner {
    async fn run(&self, params: &ScanEngineParams) -> Result<EngineRun> {
        let mut child = Command::new(&params.engine_bin)
            .args(&params.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id();
        let mut stderr_pipe = child.stderr.take();
        let stderr_buf = Arc::new(tokio::sync::Mutex::new(String::new()));
        let mut stderr_task = tokio::spawn({
            let buf = stderr_buf.clone();
            async move {
                let Some(pipe) = stderr_pipe.as_mut() else {
                    return;
                };
                let mut chunk = [0u8; 4096];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf
                            .lock()
                            .await
                            .push_str(&String::from_utf8_lossy(&chunk[..n])),
                    }
                }
            }
        });

        let mut run = EngineRun::default();
        let deadline = tokio::time::sleep(params.timeout);
        tokio::pin!(deadline);
        let mut sample_tick = tokio::time::interval(RSS_SAMPLE_INTERVAL);
        sample_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                status = child.wait() => {
                    run.exit_code = status?.code();
                    break;
                }
                _ = &mut deadline => {
                    run.timed_out = true;
                    child.kill().await?;
                    child.wait().await?;
                    break;
                }
                _ = sample_tick.tick() => {
                    if let Some(pid) = pid {
                        if let Some(rss_kb) = self.sampler.rss_kb(pid).await {
                            run.peak_rss_kb = run.peak_rss_kb.max(rss_kb);
                            if rss_kb > params.memory_limit_mb * 1024 {
                                run.memory_limit_exceeded = true;
                                child.kill().await?;
                                child.wait().await?;
                                break;
                            }
                        }
                    }
                }
            }
        }

        // the kill only reaches the direct child; engine-spawned
        // grandchildren inherit the stderr fd and can hold the pipe open
        // past the deadline, so the drain gets its own bound
        if tokio::time::timeout(STDERR_DRAIN_TIMEOUT, &mut stderr_task)
            .await
            .is_err()
        {
            stderr_task.abort();
        }
        run.stderr = std::mem::take(&mut *stderr_buf.lock().await);
        if run.timed_out {
            run.stderr
                .push_str(&format!("\nengine timeout after {:?}", params.timeout));
        }
        if run.memory_limit_exceeded {
            run.stderr.push_str(&format!(
                "\nengine killed: memory limit {} MB exceeded",
                params.memory_limit_mb
            ));
        }
        Ok(run)
    }
}

/// Drives engine runs through the concurrency gate with retry on
/// transient failures, and validates the output file.
pub struct EngineExecutor {
    runner: Arc<dyn EngineRunner>,
    gate: Arc<ScanGate>,
    metrics: Arc<ExecutionMetrics>,
}

impl EngineExecutor {
    pub fn new(runner: Arc<dyn EngineRunner>, gate: Arc<ScanGate>) -> Self {
        Self {
            runner,
            gate,
            metrics: Arc::new(ExecutionMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        self.metrics.clone()
    }

    pub fn gate(&self) -> Arc<ScanGate> {
        self.gate.clone()
    }

    /// Execute the engine and return the parsed result items with the
    /// invocation metadata.
    pub async fn execute(&self, params: &ScanEngineParams) -> Result<EngineOutcome> {
        let _permit = self.gate.acquire().await;

        let overall = Instant::now();
        let mut attempt = 0u32;
        loop {
            self.metrics.run_started();
            let started = Instant::now();
            let outcome = self.runner.run(params).await;
            let run = match outcome {
                Ok(run) => run,
                Err(err) => {
                    self.metrics.run_finished(started.elapsed(), true);
                    return Err(err);
                }
            };
            self.metrics.record_rss(run.peak_rss_kb);

            if run.succeeded() {
                self.metrics.run_finished(started.elapsed(), false);
                let items = self.read_output(params).await?;
                return Ok(EngineOutcome {
                    items,
                    attempts: attempt + 1,
                    exit_code: run.exit_code,
                    timed_out: run.timed_out,
                    memory_limit_exceeded: run.memory_limit_exceeded,
                    duration: overall.elapsed(),
                    peak_rss_kb: run.peak_rss_kb,
                });
            }

            self.metrics.run_finished(started.elapsed(), true);
            // memory kills and deterministic failures are terminal; only
            // stderr transient signatures earn another attempt
            if attempt < params.retry_count && is_transient(&run.stderr) {
                attempt += 1;
                warn!(
                    provider = %params.provider,
                    attempt,
                    stderr = %run.stderr.trim(),
                    "transient engine failure, retrying"
                );
                continue;
            }
            return Err(WardError::EngineExecution {
                exit_code: run.exit_code,
                timed_out: run.timed_out,
                memory_limit_exceeded: run.memory_limit_exceeded,
            });
        }
    }

    async fn read_output(&self, params: &ScanEngineParams) -> Result<Vec<Value>> {
        let content = tokio::fs::read_to_string(&params.output_path).await?;
        let value: Value = serde_json::from_str(&content)?;
        if !normalize::is_valid_output(&value) {
            return Err(WardError::EngineOutput(
                "expected a non-empty JSON array of result objects".to_string(),
            ));
        }
        let items = value.as_array().cloned().unwrap_or_default();
        debug!(
            provider = %params.provider,
            count = items.len(),
            "engine produced results"
        );
        Ok(items)
    }
}
