//! Run loop.
//!
//! One control thread pulls frames, runs detection and updates the debounce
//! state. Only alert delivery leaves this thread, through `DispatchWorker`.
//!
//! Every exit path (stop signal, frame limit, fatal source error, processing
//! error) goes through `Pipeline::cleanup`, which releases the source and
//! drains the dispatch queue.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::alert::{AlertEvent, DispatchStats, DispatchWorker};
use crate::debounce::{DebounceOutcome, Debouncer};
use crate::detect::DetectionAdapter;
use crate::frame::{Frame, Snapshot};
use crate::ingest::{BackoffPolicy, FrameSource, SourceError};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared stop flag, set from a signal handler or another thread.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early if stop is requested.
    /// Returns true if stop was requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_set() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(STOP_POLL_INTERVAL));
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    /// Pause after each processed frame.
    pub frame_delay: Duration,
    /// Delay policy after a transient source failure.
    pub backoff: BackoffPolicy,
    /// Stop after this many processed frames.
    pub max_frames: Option<u64>,
    pub health_log_interval: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            frame_delay: Duration::from_millis(100),
            backoff: BackoffPolicy::default(),
            max_frames: None,
            health_log_interval: Duration::from_secs(5),
        }
    }
}

/// Why the run loop stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// Stop signal observed.
    Stopped,
    /// `max_frames` reached.
    FrameLimit,
    /// Fatal source error (local device lost).
    SourceFailed(String),
    /// Detection or snapshot error.
    ProcessingFailed(String),
}

impl ExitReason {
    /// Process exit code for the daemon.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitReason::Stopped | ExitReason::FrameLimit => 0,
            ExitReason::SourceFailed(_) => 2,
            ExitReason::ProcessingFailed(_) => 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub alerts_fired: u64,
    pub transient_failures: u64,
    pub dispatch: DispatchStats,
    pub exit: ExitReason,
}

#[derive(Default)]
struct Counters {
    frames_processed: u64,
    alerts_fired: u64,
    transient_failures: u64,
}

pub struct Pipeline {
    source: Box<dyn FrameSource>,
    adapter: DetectionAdapter,
    debouncer: Debouncer,
    worker: DispatchWorker,
    settings: PipelineSettings,
    stop: StopSignal,
}

impl Pipeline {
    pub fn new(
        source: Box<dyn FrameSource>,
        adapter: DetectionAdapter,
        debouncer: Debouncer,
        worker: DispatchWorker,
        settings: PipelineSettings,
        stop: StopSignal,
    ) -> Self {
        Self {
            source,
            adapter,
            debouncer,
            worker,
            settings,
            stop,
        }
    }

    /// Run until stopped or a terminal error, then clean up.
    pub fn run(mut self) -> RunSummary {
        log::info!(
            "smokewatch running: source={} backend={} threshold={} clear_frames={} cooldown={}s",
            self.source.describe(),
            self.adapter.backend_name(),
            self.adapter.confidence_threshold(),
            self.debouncer.config().consecutive_clear_frames,
            self.debouncer.config().cooldown.as_secs()
        );

        let mut counters = Counters::default();
        let exit = self.run_loop(&mut counters);
        self.cleanup(counters, exit)
    }

    fn run_loop(&mut self, counters: &mut Counters) -> ExitReason {
        let mut last_health_log = Instant::now();

        loop {
            if self.stop.is_set() {
                return ExitReason::Stopped;
            }
            if let Some(max) = self.settings.max_frames {
                if counters.frames_processed >= max {
                    return ExitReason::FrameLimit;
                }
            }

            let frame = match self.source.next_frame() {
                Ok(frame) => {
                    self.settings.backoff.reset();
                    frame
                }
                Err(err @ SourceError::DeviceUnavailable(_)) => {
                    log::error!("{}: {}", self.source.describe(), err);
                    return ExitReason::SourceFailed(err.to_string());
                }
                Err(err @ SourceError::TransientFetch(_)) => {
                    counters.transient_failures += 1;
                    let delay = self.settings.backoff.next_delay();
                    log::warn!(
                        "{}: {}; retrying in {:.1}s",
                        self.source.describe(),
                        err,
                        delay.as_secs_f32()
                    );
                    if self.stop.sleep(delay) {
                        return ExitReason::Stopped;
                    }
                    continue;
                }
            };

            if let Err(err) = self.process(&frame, counters) {
                log::error!("frame processing failed: {:#}", err);
                return ExitReason::ProcessingFailed(format!("{:#}", err));
            }
            counters.frames_processed += 1;

            if last_health_log.elapsed() >= self.settings.health_log_interval {
                let stats = self.source.stats();
                log::info!(
                    "source health={} frames={} failures={} alerts={} source={}",
                    self.source.is_healthy(),
                    stats.frames_captured,
                    stats.failures,
                    counters.alerts_fired,
                    stats.source
                );
                last_health_log = Instant::now();
            }

            if self.stop.sleep(self.settings.frame_delay) {
                return ExitReason::Stopped;
            }
        }
    }

    fn process(&mut self, frame: &Frame, counters: &mut Counters) -> Result<()> {
        let inference = self.adapter.infer(frame)?;
        let signal = inference.signal;
        let outcome = self.debouncer.observe(signal.present, frame.captured_at);
        log::debug!(
            "present={} max_conf={:.2} outcome={:?} clear_run={}",
            signal.present,
            signal.max_confidence,
            outcome,
            self.debouncer.clear_run()
        );

        match outcome {
            DebounceOutcome::Fired => {
                counters.alerts_fired += 1;
                log::warn!("smoke detected (confidence {:.2})", signal.max_confidence);
                let snapshot = Snapshot::annotate(frame, &inference.boxes)?;
                self.worker.submit(AlertEvent {
                    snapshot,
                    confidence: signal.max_confidence,
                    captured_at: frame.captured_wall,
                });
            }
            DebounceOutcome::CooldownDropped => {
                log::info!(
                    "smoke detected inside cooldown window (confidence {:.2}); not alerting",
                    signal.max_confidence
                );
            }
            DebounceOutcome::Rearmed => {
                log::info!(
                    "scene clear for {} frames; alerts re-armed",
                    self.debouncer.clear_run()
                );
            }
            DebounceOutcome::Suppressed | DebounceOutcome::Clear => {}
        }
        Ok(())
    }

    fn cleanup(mut self, counters: Counters, exit: ExitReason) -> RunSummary {
        self.source.release();
        let dispatch = self.worker.shutdown();
        let summary = RunSummary {
            frames_processed: counters.frames_processed,
            alerts_fired: counters.alerts_fired,
            transient_failures: counters.transient_failures,
            dispatch,
            exit,
        };
        log::info!(
            "smokewatch stopped ({:?}): frames={} alerts={} delivered={} failed={} dropped={} transient_failures={}",
            summary.exit,
            summary.frames_processed,
            summary.alerts_fired,
            summary.dispatch.delivered,
            summary.dispatch.failed,
            summary.dispatch.dropped,
            summary.transient_failures
        );
        summary
    }
}
