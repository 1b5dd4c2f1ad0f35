//! Supervision loop: run the engine, watch its progress, stop it.
//!
//! The supervisor:
//! 1. Spawns the engine through the configured [`EngineBackend`]
//! 2. Reads the backend's progress pipe one line at a time, appending each
//!    raw line to the transcript
//! 3. Feeds parsed progress events to the [`Evaluator`]
//! 4. Kills the engine as soon as the stopping criteria hold
//! 5. Otherwise waits (bounded) for the engine to exit and classifies it
//!
//! The engine's other pipe is drained in the background and only its tail
//! is kept for the report.
//!
//! # Cancel Safety
//! Cancel safe. Dropping the future kills the engine via `kill_on_drop`, but
//! buffered transcript lines are lost. Prefer [`Supervisor::run_until`] for
//! graceful interruption.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::Instrument;
use warden_core::{parse_line, Evaluator, EvaluatorSnapshot, EventKind, RunId};

use crate::backend::{EngineBackend, EngineOutput, EngineProcess, ProgressStream};
use crate::report::{RunOutcome, RunReport};
use crate::transcript::Transcript;
use crate::{SupervisorConfig, SupervisorError};

/// How long the side pipe may keep draining after the engine is gone.
const SIDE_OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// Bytes of side output kept for the report.
const SIDE_OUTPUT_CAP: usize = 64 * 1024;

/// Runs one fuzz target until its stopping criteria are met.
pub struct Supervisor<B: EngineBackend> {
    backend: B,
    config: SupervisorConfig,
}

/// Why the progress loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Satisfied,
    Eof,
    Interrupted,
}

/// Per-run counters and the evaluator they feed.
struct Progress {
    evaluator: Evaluator,
    lines_seen: u64,
    events_seen: u64,
    stop_line: Option<u64>,
}

impl<B: EngineBackend> Supervisor<B> {
    /// Create a supervisor for one run.
    #[must_use]
    pub fn new(backend: B, config: SupervisorConfig) -> Self {
        Self { backend, config }
    }

    /// Run the engine to completion.
    ///
    /// # Errors
    /// See [`Supervisor::run_until`].
    pub async fn run(&self) -> Result<RunReport, SupervisorError> {
        self.run_until(std::future::pending()).await
    }

    /// Run the engine until it finishes, the criteria fire, or `shutdown`
    /// completes.
    ///
    /// An engine crash is not an error: it is reported as
    /// [`RunOutcome::Failure`]. Use [`RunReport::into_result`] to turn it into
    /// one.
    ///
    /// # Errors
    /// Returns [`SupervisorError::EngineNotFound`] or
    /// [`SupervisorError::SpawnFailed`] if the engine cannot start.
    /// Returns [`SupervisorError::FinalWaitTimeout`] if the engine closes its
    /// output but does not exit within the configured wait.
    /// Returns [`SupervisorError::Transcript`] or [`SupervisorError::Io`] on
    /// I/O failure; the engine is killed first.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<RunReport, SupervisorError>
    where
        F: Future<Output = ()>,
    {
        let run_id = RunId::new();
        let span = tracing::info_span!("supervise", %run_id, fuzzer = %self.config.fuzzer);
        self.supervise(run_id, shutdown).instrument(span).await
    }

    async fn supervise<F>(&self, run_id: RunId, shutdown: F) -> Result<RunReport, SupervisorError>
    where
        F: Future<Output = ()>,
    {
        let start = Instant::now();
        let started_at = Utc::now();
        let progress_stream = self.backend.progress_stream();

        tracing::info!(
            transcript = %self.config.transcript_path.display(),
            corpus = %self.config.corpus_dir.display(),
            progress = %progress_stream,
            require_doubled_coverage = self.config.criteria.require_doubled_coverage,
            "running fuzzer"
        );

        // Spawn before touching the transcript so a launch failure leaves no file behind.
        let mut engine = self.backend.spawn(&self.config).await?;
        tracing::info!(pid = ?engine.pid(), "engine started");

        let (progress_pipe, side_pipe) = match engine.take_output(progress_stream) {
            Ok(pipes) => pipes,
            Err(e) => {
                abandon(&mut engine).await;
                return Err(e);
            }
        };
        let side_output = OutputTail::spawn(side_pipe, SIDE_OUTPUT_CAP);

        let mut transcript = match Transcript::open(&self.config.transcript_path, start).await {
            Ok(t) => t,
            Err(e) => {
                abandon(&mut engine).await;
                return Err(e);
            }
        };

        let mut progress = Progress {
            evaluator: Evaluator::starting_at(self.config.criteria, start),
            lines_seen: 0,
            events_seen: 0,
            stop_line: None,
        };

        tokio::pin!(shutdown);
        let consumed =
            consume(progress_pipe, &mut transcript, &mut progress, shutdown.as_mut()).await;
        let concluded = match consumed {
            Ok(end) => {
                self.conclude(end, &mut engine, &progress.evaluator, shutdown.as_mut()).await
            }
            Err(e) => Err(e),
        };
        if concluded.is_err() {
            abandon(&mut engine).await;
        }
        let flushed = transcript.flush().await;

        let side = side_output.finish().await;
        if !side.text.is_empty() {
            tracing::warn!(
                stream = %other_stream(progress_stream),
                dropped_bytes = side.dropped_bytes,
                output = %side.text.trim_end(),
                "engine side output"
            );
        }

        let outcome = concluded?;
        flushed?;

        let report = RunReport {
            run_id,
            fuzzer: self.config.fuzzer.clone(),
            outcome,
            started_at,
            finished_at: Utc::now(),
            lines_seen: progress.lines_seen,
            events_seen: progress.events_seen,
            stop_line: progress.stop_line,
            evaluator: progress.evaluator.snapshot_at(Instant::now()),
            side_output: side.text,
            side_output_dropped: side.dropped_bytes,
        };

        match outcome {
            RunOutcome::Failure { .. } => tracing::error!(%outcome, "{}", report.summary()),
            RunOutcome::Interrupted => tracing::warn!(%outcome, "{}", report.summary()),
            _ => tracing::info!(%outcome, lines = report.lines_seen, "{}", report.summary()),
        }

        Ok(report)
    }

    /// Stop or reap the engine and classify the run.
    async fn conclude<F>(
        &self,
        end: StreamEnd,
        engine: &mut EngineProcess,
        evaluator: &Evaluator,
        mut shutdown: Pin<&mut F>,
    ) -> Result<RunOutcome, SupervisorError>
    where
        F: Future<Output = ()>,
    {
        match end {
            StreamEnd::Satisfied => {
                tracing::info!("criteria satisfied, killing engine");
                engine.terminate().await?;
                Ok(RunOutcome::Satisfied)
            }
            StreamEnd::Interrupted => {
                tracing::warn!("shutdown requested, killing engine");
                engine.terminate().await?;
                Ok(RunOutcome::Interrupted)
            }
            StreamEnd::Eof => {
                let waited = self.config.final_wait;
                let exited = tokio::select! {
                    biased;
                    () = &mut shutdown => None,
                    exited = tokio::time::timeout(waited, engine.process.wait()) => Some(exited),
                };
                let Some(exited) = exited else {
                    tracing::warn!("shutdown requested while waiting for exit, killing engine");
                    engine.terminate().await?;
                    return Ok(RunOutcome::Interrupted);
                };
                let Ok(status) = exited else {
                    return Err(SupervisorError::FinalWaitTimeout {
                        fuzzer: self.config.fuzzer.clone(),
                        waited,
                    });
                };
                let status = status?;
                tracing::info!(exit_code = ?status.code(), "engine exited");
                Ok(RunOutcome::at_exit(status.code(), evaluator.should_stop()))
            }
        }
    }
}

/// Read the progress pipe until the criteria fire, EOF, or shutdown.
async fn consume<R, F>(
    pipe: R,
    transcript: &mut Transcript,
    progress: &mut Progress,
    mut shutdown: Pin<&mut F>,
) -> Result<StreamEnd, SupervisorError>
where
    R: AsyncRead + Unpin,
    F: Future<Output = ()>,
{
    let mut segments = BufReader::new(pipe).split(b'\n');

    loop {
        let segment = tokio::select! {
            biased;
            () = &mut shutdown => return Ok(StreamEnd::Interrupted),
            segment = segments.next_segment() => segment?,
        };
        let Some(raw) = segment else {
            return Ok(StreamEnd::Eof);
        };
        if observe(&raw, transcript, progress).await? {
            return Ok(StreamEnd::Satisfied);
        }
    }
}

/// Archive one raw line and update the evaluator. Returns `true` once the
/// criteria hold.
async fn observe(
    raw: &[u8],
    transcript: &mut Transcript,
    progress: &mut Progress,
) -> Result<bool, SupervisorError> {
    progress.lines_seen += 1;
    transcript.record(raw).await?;

    let line = decode_line(raw);
    let event = match parse_line(&line) {
        Ok(Some(event)) => event,
        Ok(None) => {
            tracing::debug!(line, "engine output");
            return Ok(false);
        }
        Err(e) => {
            tracing::warn!(error = %e, line, "malformed progress line");
            return Ok(false);
        }
    };

    progress.events_seen += 1;
    let now = Instant::now();
    progress.evaluator.update_at(&event, now);

    if event.kind == EventKind::Pulse {
        log_snapshot(&progress.evaluator.snapshot_at(now));
        transcript.flush().await?;
    }

    if progress.evaluator.should_stop_at(now) {
        progress.stop_line = Some(progress.lines_seen);
        return Ok(true);
    }
    Ok(false)
}

fn log_snapshot(snapshot: &EvaluatorSnapshot) {
    tracing::info!(
        iterations = snapshot.latest_iteration_count,
        baseline_cov = ?snapshot.baseline_coverage,
        cov = ?snapshot.latest_coverage,
        baseline_ft = ?snapshot.baseline_features,
        ft = ?snapshot.latest_features,
        since_new_secs = snapshot.since_last_discovery.as_secs(),
        exploration = snapshot.exploration_met,
        volume = snapshot.volume_met,
        stagnation = snapshot.stagnation_met,
        "pulse"
    );
}

fn other_stream(progress: ProgressStream) -> ProgressStream {
    match progress {
        ProgressStream::Stdout => ProgressStream::Stderr,
        ProgressStream::Stderr => ProgressStream::Stdout,
    }
}

/// Kill the engine on an error path, logging rather than masking the cause.
async fn abandon(engine: &mut EngineProcess) {
    if let Err(e) = engine.terminate().await {
        tracing::warn!(error = %e, "failed to kill engine");
    }
}

/// Strip the line terminator and decode lossily for parsing and logs.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Keeps the last `cap` bytes written to it.
#[derive(Debug)]
struct TailBuffer {
    bytes: Vec<u8>,
    cap: usize,
    dropped: u64,
}

impl TailBuffer {
    fn new(cap: usize) -> Self {
        Self { bytes: Vec::new(), cap, dropped: 0 }
    }

    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
        let excess = self.bytes.len().saturating_sub(self.cap);
        if excess > 0 {
            self.bytes.drain(..excess);
            self.dropped = self.dropped.saturating_add(u64::try_from(excess).unwrap_or(u64::MAX));
        }
    }
}

/// What the side pipe left behind.
struct CapturedOutput {
    text: String,
    dropped_bytes: u64,
}

/// Drains the engine's side pipe in the background so a chatty engine
/// cannot block on a full pipe. Only the tail is kept.
struct OutputTail {
    buffer: Arc<Mutex<TailBuffer>>,
    task: Option<JoinHandle<()>>,
}

impl OutputTail {
    fn spawn(pipe: Option<EngineOutput>, cap: usize) -> Self {
        let buffer = Arc::new(Mutex::new(TailBuffer::new(cap)));
        let task = pipe.map(|mut pipe| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 4096];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => buffer.lock().await.push(&chunk[..n]),
                        Err(e) => {
                            tracing::debug!(error = %e, "side output read failed");
                            break;
                        }
                    }
                }
            })
        });
        Self { buffer, task }
    }

    /// Wait briefly for the pipe to close, then return the kept tail.
    async fn finish(mut self) -> CapturedOutput {
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(SIDE_OUTPUT_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }
        let mut buffer = self.buffer.lock().await;
        let bytes = std::mem::take(&mut buffer.bytes);
        CapturedOutput {
            text: String::from_utf8_lossy(&bytes).into_owned(),
            dropped_bytes: buffer.dropped,
        }
    }
}
