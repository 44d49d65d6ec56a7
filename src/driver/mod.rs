//! Incremental evaluation driver: runs units in order, replaying every earlier
//! successful unit before each new one.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Instant,
};

use tracing::{debug, info};

use crate::{
    annotate::{annotate, Annotation, StyleKind},
    config::EvalSettings,
    execution::Executor,
    segment::{Document, Mode, Segmenter, Unit},
};

pub mod debounce;
pub mod watch;

pub use debounce::Debouncer;
pub use watch::{ChangeTracker, StaleFlag};

/// Result of asking the driver for a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was already running; nothing happened.
    Skipped,
    Completed(Vec<Annotation>),
}

/// Hooks for progress reporting while a cycle runs.
pub trait CycleObserver: Send {
    /// `waiting` is present when the waiting indicator is enabled.
    fn unit_started(&mut self, _index: usize, _total: usize, _unit: &Unit, _waiting: Option<&Annotation>) {}

    fn unit_finished(&mut self, _unit: &Unit, _annotations: &[Annotation]) {}
}

/// Observer that ignores everything.
pub struct Silent;

impl CycleObserver for Silent {}

/// State that lives for exactly one cycle.
#[derive(Debug, Default)]
pub struct CycleSession {
    cumulative: Vec<String>,
}

impl CycleSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every successful unit so far, followed by `unit_code`.
    pub fn program_for(&self, unit_code: &str) -> String {
        if self.cumulative.is_empty() {
            return unit_code.to_string();
        }
        format!("{}\n{}", self.cumulative.join("\n"), unit_code)
    }

    pub fn commit(&mut self, unit_code: &str) {
        self.cumulative.push(unit_code.to_string());
    }

    pub fn cumulative(&self) -> &[String] {
        &self.cumulative
    }
}

struct InProgress<'a>(&'a AtomicBool);

impl<'a> InProgress<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Driver<E> {
    executor: E,
    in_progress: AtomicBool,
}

impl<E: Executor> Driver<E> {
    pub fn new(executor: E) -> Self {
        Self { executor, in_progress: AtomicBool::new(false) }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn is_evaluating(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub async fn evaluate(&self, text: &str, settings: &EvalSettings) -> CycleOutcome {
        self.evaluate_with(text, settings, &mut Silent).await
    }

    pub async fn evaluate_with(
        &self,
        text: &str,
        settings: &EvalSettings,
        observer: &mut dyn CycleObserver,
    ) -> CycleOutcome {
        let Some(_guard) = InProgress::acquire(&self.in_progress) else {
            debug!("skipping evaluation, a cycle is already in progress");
            return CycleOutcome::Skipped;
        };

        let doc = Document::from_text(text);
        let marked = doc.marked_lines(&settings.markers);
        debug!(mode = %settings.mode, lines = doc.len(), marked = marked.len(), "starting cycle");

        if settings.mode == Mode::Explicit && marked.is_empty() {
            debug!("no markers found, nothing to annotate");
            return CycleOutcome::Completed(Vec::new());
        }

        let units = Segmenter::new(settings.mode, &settings.markers).segment(doc.lines());
        let total = units.len();
        let mut session = CycleSession::new();
        let mut annotations = Vec::new();
        let mut evaluated = 0usize;

        for (index, unit) in units.iter().enumerate() {
            if unit.is_blank() {
                continue;
            }
            if evaluated > 0 && !settings.unit_delay.is_zero() {
                tokio::time::sleep(settings.unit_delay).await;
            }

            let waiting = settings
                .show_waiting
                .then(|| Annotation::new(unit.end_line, " ⏳ evaluating…", StyleKind::Waiting));
            observer.unit_started(index, total, unit, waiting.as_ref());

            let program = session.program_for(&unit.code);
            let started = Instant::now();
            let result = self.executor.run(&program, &unit.code, unit.end_line).await;
            let elapsed = started.elapsed();
            evaluated += 1;

            if result.success {
                session.commit(&unit.code);
            } else {
                debug!(
                    start = unit.start_line,
                    end = unit.end_line,
                    error = result.error.as_deref().unwrap_or_default(),
                    "unit failed, excluded from later units"
                );
            }

            let mut produced = annotate(&result, unit, &marked, settings.mode);
            if settings.show_timings && result.success {
                produced.push(Annotation::new(
                    unit.end_line,
                    format!(" ⏱ {} ms", elapsed.as_millis()),
                    StyleKind::Performance,
                ));
            }
            observer.unit_finished(unit, &produced);
            annotations.extend(produced);
        }

        info!(units = evaluated, annotations = annotations.len(), "evaluation complete");
        CycleOutcome::Completed(annotations)
    }
}
