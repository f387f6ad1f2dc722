//! Batch orchestrator
//!
//! Drives one batch run over an ordered code list:
//! IDLE → RUNNING → (COMPLETED | STOPPED | ERROR) → IDLE.
//!
//! Codes are processed strictly one at a time on the engine's single surface.
//! A stop request is observed only between codes, never inside a fetch, so the
//! surface is never left with a half-submitted form.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{Badge, BadgeStats, BatchEvent, BatchSummary, Code, LogLevel, ProcessingResult, RunState};
use crate::infrastructure::automation_engine::{AutomationEngine, EngineError};
use crate::infrastructure::config::BatchConfig;
use crate::infrastructure::site_profile::SiteProfile;

use super::badge_classifier::BadgeClassifier;
use super::event_bus::EventBus;
use super::result_mapper::ResultMapper;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Batch aborted: {0}")]
    Engine(#[from] EngineError),
}

/// Aggregates shared with observers while a run is in flight
#[derive(Debug, Default)]
struct RunSnapshot {
    state: RunState,
    results: Vec<ProcessingResult>,
    badges: BadgeStats,
    succeeded: usize,
    failed: usize,
    last_summary: Option<BatchSummary>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct BatchOrchestrator {
    engine: tokio::sync::Mutex<AutomationEngine>,
    mapper: ResultMapper,
    classifier: BadgeClassifier,
    events: EventBus,
    config: BatchConfig,
    running: AtomicBool,
    cancel: Mutex<CancellationToken>,
    snapshot: Mutex<RunSnapshot>,
}

impl BatchOrchestrator {
    pub fn new(engine: AutomationEngine, profile: Arc<SiteProfile>, config: BatchConfig) -> Self {
        Self {
            engine: tokio::sync::Mutex::new(engine),
            mapper: ResultMapper::new(Arc::clone(&profile)),
            classifier: BadgeClassifier::new(&profile.badge_rules),
            events: EventBus::new(config.event_channel_capacity),
            config,
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            snapshot: Mutex::new(RunSnapshot::default()),
        }
    }

    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn is_processing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn run_state(&self) -> RunState {
        lock(&self.snapshot).state
    }

    pub fn results(&self) -> Vec<ProcessingResult> {
        lock(&self.snapshot).results.clone()
    }

    pub fn badges(&self) -> BadgeStats {
        lock(&self.snapshot).badges
    }

    pub fn last_summary(&self) -> Option<BatchSummary> {
        lock(&self.snapshot).last_summary.clone()
    }

    /// Requests a cooperative stop; the in-flight code still completes.
    ///
    /// Returns false when no batch is running.
    pub fn stop_processing(&self) -> bool {
        {
            // held across the check so a starting run cannot swap in a fresh token in between
            let cancel = lock(&self.cancel);
            if !self.is_processing() {
                debug!("Stop requested while idle, ignoring");
                return false;
            }
            cancel.cancel();
        }
        info!("🛑 Stop requested, finishing current code");
        self.emit_status("Stopping after current code...");
        true
    }

    /// Processes `codes` in order and returns one record per processed code.
    ///
    /// Returns an empty list without doing anything when a batch is already
    /// running. Fatal surface errors abort the run; the records gathered so
    /// far stay available through [`Self::results`].
    pub async fn start_processing(&self, codes: Vec<Code>) -> Result<Vec<ProcessingResult>, BatchError> {
        let token = {
            let mut cancel = lock(&self.cancel);
            if self
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                drop(cancel);
                warn!("⚠️ Batch already running, ignoring start request");
                return Ok(Vec::new());
            }
            let token = CancellationToken::new();
            *cancel = token.clone();
            token
        };
        let run_id = Uuid::new_v4();

        let mut engine = self.engine.lock().await;
        let outcome = self.run(run_id, &codes, &mut engine, &token).await;
        engine.cleanup().await;
        drop(engine);

        let final_state = match &outcome {
            Ok(state) => *state,
            Err(e) => {
                error!("❌ Batch {} aborted: {}", run_id, e);
                RunState::Error
            }
        };
        self.transition(final_state);
        self.publish_summary(run_id, codes.len(), final_state);
        self.transition(RunState::Idle);
        self.running.store(false, Ordering::SeqCst);

        outcome.map(|_| self.results())
    }

    async fn run(
        &self,
        run_id: Uuid,
        codes: &[Code],
        engine: &mut AutomationEngine,
        token: &CancellationToken,
    ) -> Result<RunState, BatchError> {
        let total = codes.len();
        {
            let mut snapshot = lock(&self.snapshot);
            snapshot.results = Vec::with_capacity(total);
            snapshot.badges.reset();
            snapshot.succeeded = 0;
            snapshot.failed = 0;
            snapshot.last_summary = None;
        }
        self.transition(RunState::Running);
        self.events.publish(BatchEvent::BadgeUpdate {
            badges: BadgeStats::default(),
        });

        info!("🚀 Batch {} starting with {} codes", run_id, total);
        self.emit_status("Initializing browser surface...");
        if let Err(e) = engine.initialize().await {
            self.emit_log(LogLevel::Error, format!("Initialization failed: {e}"));
            return Err(e.into());
        }

        self.events.publish(BatchEvent::ProgressUpdate { current: 0, total });
        self.emit_status(format!("Processing {total} codes"));

        for (index, code) in codes.iter().enumerate() {
            if token.is_cancelled() {
                self.emit_log(
                    LogLevel::Warn,
                    format!("Processing stopped by user after {index}/{total} codes"),
                );
                self.emit_status("Stopped");
                return Ok(RunState::Stopped);
            }

            let position = index + 1;
            self.emit_log(LogLevel::Info, format!("Processing code {position}/{total}: {code}"));

            let (record, succeeded) = match engine.fetch_state_for_code(code).await {
                Ok(fetch) if fetch.success => {
                    let record = self.mapper.map(code, fetch.cells());
                    self.emit_log(LogLevel::Info, format!("{code}: {}", record.status()));
                    (record, true)
                }
                Ok(fetch) => {
                    let reason = fetch.error.unwrap_or_else(|| "Unknown error".to_string());
                    self.emit_log(LogLevel::Warn, format!("{code}: {reason}"));
                    (self.mapper.error_result(code, &reason), false)
                }
                Err(e) if e.is_fatal() => {
                    self.emit_log(LogLevel::Error, format!("Fatal error while processing {code}: {e}"));
                    return Err(e.into());
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.emit_log(LogLevel::Warn, format!("{code}: {reason}"));
                    (self.mapper.error_result(code, &reason), false)
                }
            };

            let badge = self.classifier.classify_result(&record);
            if succeeded && badge == Badge::Eccezioni {
                self.emit_log(
                    LogLevel::Warn,
                    format!("Unrecognized status '{}' for {code}, counted as {badge}", record.status()),
                );
            }

            let badges = {
                let mut snapshot = lock(&self.snapshot);
                snapshot.badges.increment(badge);
                if succeeded {
                    snapshot.succeeded += 1;
                } else {
                    snapshot.failed += 1;
                }
                snapshot.results.push(record);
                snapshot.badges
            };
            self.events.publish(BatchEvent::ProgressUpdate { current: position, total });
            self.events.publish(BatchEvent::BadgeUpdate { badges });

            if position < total && !token.is_cancelled() {
                tokio::select! {
                    () = sleep(self.config.inter_code_delay()) => {}
                    () = token.cancelled() => debug!("Inter-code pause cut short by stop request"),
                }
            }
        }

        if token.is_cancelled() {
            // stop arrived while the last code was in flight
            self.emit_log(
                LogLevel::Warn,
                format!("Processing stopped by user after {total}/{total} codes"),
            );
            self.emit_status("Stopped");
            return Ok(RunState::Stopped);
        }

        self.emit_log(LogLevel::Info, format!("Processing complete: {total} codes"));
        self.emit_status("Completed");
        self.events.publish(BatchEvent::ProcessingComplete {
            run_id,
            state: RunState::Completed,
        });
        Ok(RunState::Completed)
    }

    fn publish_summary(&self, run_id: Uuid, total: usize, state: RunState) {
        let summary = {
            let mut snapshot = lock(&self.snapshot);
            let summary = BatchSummary {
                run_id,
                state,
                total,
                processed: snapshot.results.len(),
                succeeded: snapshot.succeeded,
                failed: snapshot.failed,
                badges: snapshot.badges,
            };
            snapshot.last_summary = Some(summary.clone());
            summary
        };

        info!("📊 {} [{}]", summary.message(), summary.badges);
        self.emit_log(LogLevel::Info, summary.message());
        self.events.publish(BatchEvent::Summary(summary));
    }

    fn transition(&self, to: RunState) {
        let from = {
            let mut snapshot = lock(&self.snapshot);
            std::mem::replace(&mut snapshot.state, to)
        };
        if from != to {
            debug!("Run state {} → {}", from, to);
            self.events.publish(BatchEvent::StateChanged { from, to });
        }
    }

    fn emit_status(&self, message: impl Into<String>) {
        self.events.publish(BatchEvent::status(message));
    }

    fn emit_log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => info!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }
        self.events.publish(BatchEvent::log(level, message));
    }
}
