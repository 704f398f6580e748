//! Orchestrator: the single coordination point for translation passes.
//!
//! A pass is triggered by mount, a language change, or a settled mutation
//! burst. It scans, then either restores originals (source language) or
//! resolves translations through the gateway client and writes the ones that
//! differ from what is shown. One pass runs at a time; overlapping triggers
//! are dropped and later triggers pick up anything missed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::dom::{NodeId, SharedDocument};
use crate::guard::{GenerationGuard, InFlight, LanguageGeneration};
use crate::language::LanguageCode;
use crate::notify::Notifier;
use crate::preferences::LanguageStore;
use crate::scanner::{ScannedText, TextScanner};
use crate::state_machine::{PassState, PassStateMachine};
use crate::stats::{metric_names, Counter, PipelineStats};
use crate::translate::GatewayClient;
use crate::watcher::{ChangeKind, DebounceWindows, MutationWatcher, SettledCallback};

const UNAVAILABLE_NOTICE: &str = "Translation is unavailable right now. Showing the original text.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trigger {
    Mount,
    LanguageChanged,
    ContentChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PassOutcome {
    /// Another pass was running; nothing happened.
    SkippedInFlight,
    /// Source language: tracked nodes were set back to their originals.
    Restored,
    /// Translations were resolved and applied (possibly zero writes).
    Applied,
    /// Gateway failed; the page was left as it was.
    FailedOpen,
    /// The language changed while the gateway call was in flight.
    Discarded,
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass_id: String,
    pub trigger: Trigger,
    pub language: LanguageCode,
    pub outcome: PassOutcome,
    /// Translatable text nodes found by the scan.
    pub scanned: usize,
    /// Distinct strings sent to the gateway.
    pub fetched: usize,
    /// Text nodes whose visible text was rewritten.
    pub writes: usize,
}

impl PassReport {
    fn new(pass_id: String, trigger: Trigger, language: LanguageCode, outcome: PassOutcome) -> Self {
        Self {
            pass_id,
            trigger,
            language,
            outcome,
            scanned: 0,
            fetched: 0,
            writes: 0,
        }
    }
}

pub struct Orchestrator {
    document: SharedDocument,
    root: NodeId,
    store: Arc<LanguageStore>,
    gateway: GatewayClient,
    scanner: TextScanner,
    notifier: Notifier,
    stats: Arc<PipelineStats>,
    state: PassStateMachine,
    in_flight: InFlight,
    generation: LanguageGeneration,
    discard_stale: bool,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        document: SharedDocument,
        root: NodeId,
        store: Arc<LanguageStore>,
        gateway: GatewayClient,
        scanner: TextScanner,
        notifier: Notifier,
        stats: Arc<PipelineStats>,
        discard_stale: bool,
    ) -> Self {
        Self {
            document,
            root,
            store,
            gateway,
            scanner,
            notifier,
            stats,
            state: PassStateMachine::new(),
            in_flight: InFlight::new(),
            generation: LanguageGeneration::new(),
            discard_stale,
        }
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn store(&self) -> &Arc<LanguageStore> {
        &self.store
    }

    pub fn state(&self) -> &PassStateMachine {
        &self.state
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_busy()
    }

    /// Initial pass when the page is first shown.
    pub async fn mount(&self) -> PassReport {
        self.run_pass(Trigger::Mount).await
    }

    /// Persist `lang` and run a pass for it. `None` when `lang` was already
    /// selected, in which case nothing runs.
    pub async fn set_language(&self, lang: LanguageCode) -> Option<PassReport> {
        if !self.store.set_current_language(lang) {
            debug!(language = %lang, "language unchanged, no pass");
            return None;
        }
        self.generation.advance();
        Some(self.run_pass(Trigger::LanguageChanged).await)
    }

    /// Watch the orchestrated subtree; each settled burst spawns a pass.
    /// The watcher holds only a weak reference back to the orchestrator.
    pub fn attach_watcher(self: &Arc<Self>, windows: DebounceWindows) -> MutationWatcher {
        let weak = Arc::downgrade(self);
        let on_settled: SettledCallback = Arc::new(move |kind: ChangeKind| {
            let Some(orchestrator) = weak.upgrade() else {
                return;
            };
            debug!(?kind, "content settled, scheduling pass");
            tokio::spawn(async move {
                orchestrator.run_pass(Trigger::ContentChanged).await;
            });
        });
        MutationWatcher::start(Arc::clone(&self.document), self.root, windows, on_settled)
    }

    /// Run one orchestration pass. Never fails: every error path leaves the
    /// page readable and is reported through the returned outcome.
    ///
    /// A discarded pass is rerun for the newly selected language before the
    /// in-flight slot is released, since the language change that made it
    /// stale was dropped while this pass held the slot.
    pub async fn run_pass(&self, trigger: Trigger) -> PassReport {
        let Some(_flight) = self.in_flight.try_begin() else {
            let language = self.store.current_language();
            self.stats.incr(Counter::PassesSkipped);
            debug!(?trigger, language = %language, "pass already in flight, trigger dropped");
            return PassReport::new(
                uuid::Uuid::new_v4().to_string(),
                trigger,
                language,
                PassOutcome::SkippedInFlight,
            );
        };

        loop {
            let report = self.run_attempt(trigger).await;
            if report.outcome != PassOutcome::Discarded {
                return report;
            }
            debug!(stale = %report.language, "rerunning pass for the current language");
        }
    }

    async fn run_attempt(&self, trigger: Trigger) -> PassReport {
        // Guard first: a language change after this point marks the pass stale.
        let generation = self.generation.guard();
        let language = self.store.current_language();
        let pass_id = uuid::Uuid::new_v4().to_string();

        let span = info_span!("pass", pass_id = %pass_id, ?trigger, language = %language);
        let start = Instant::now();
        let report = self
            .execute(
                PassReport::new(pass_id, trigger, language, PassOutcome::Applied),
                generation,
            )
            .instrument(span)
            .await;

        self.state.force_idle();
        self.stats.incr(Counter::PassesRun);
        self.stats.add(Counter::DomWrites, report.writes as u64);
        self.stats
            .record(metric_names::PASS_DONE, start.elapsed().as_micros() as f64);
        info!(
            pass_id = %report.pass_id,
            trigger = ?report.trigger,
            language = %report.language,
            outcome = ?report.outcome,
            scanned = report.scanned,
            fetched = report.fetched,
            writes = report.writes,
            "pass complete"
        );
        report
    }

    async fn execute(&self, mut report: PassReport, generation: GenerationGuard) -> PassReport {
        let language = report.language;

        let _ = self.state.transition(PassState::Scanning);
        let scan_start = Instant::now();
        let scanned = {
            let mut doc = self.document.lock();
            self.scanner.scan(&mut doc, self.root)
        };
        self.stats
            .record(metric_names::SCAN_DONE, scan_start.elapsed().as_micros() as f64);
        report.scanned = scanned.len();

        if language.is_source() {
            let _ = self.state.transition(PassState::Restoring);
            report.writes = self.restore();
            report.outcome = PassOutcome::Restored;
            self.stats.incr(Counter::Restores);
            let _ = self.state.transition(PassState::Idle);
            return report;
        }

        if scanned.is_empty() {
            let _ = self.state.transition(PassState::Idle);
            return report;
        }

        let _ = self.state.transition(PassState::Translating);
        let unique = unique_originals(&scanned);
        let outcome = self.gateway.translate_batch(&unique, language).await;
        report.fetched = outcome.fetched;

        if let Some(error) = &outcome.error {
            warn!(error = %error, "translation pass failed open");
            self.notifier.warn(UNAVAILABLE_NOTICE);
            report.outcome = PassOutcome::FailedOpen;
            let _ = self.state.transition(PassState::Idle);
            return report;
        }

        if self.discard_stale && !generation.is_current() {
            self.stats.incr(Counter::PassesDiscarded);
            info!(
                generation = generation.my_generation(),
                "language changed mid-flight, results discarded"
            );
            report.outcome = PassOutcome::Discarded;
            let _ = self.state.transition(PassState::Idle);
            return report;
        }

        let _ = self.state.transition(PassState::Applying);
        let table: HashMap<&str, &str> = unique
            .iter()
            .map(String::as_str)
            .zip(outcome.translations.iter().map(String::as_str))
            .collect();
        report.writes = self.apply(&scanned, &table, language);
        let _ = self.state.transition(PassState::Idle);
        report
    }

    /// Write translations in scan order. Nodes detached or rewritten by the
    /// page while the gateway call was pending are skipped.
    fn apply(
        &self,
        scanned: &[ScannedText],
        table: &HashMap<&str, &str>,
        language: LanguageCode,
    ) -> usize {
        let mut doc = self.document.lock();
        let mut writes = 0;
        for entry in scanned {
            if !doc.contains(entry.node) {
                continue;
            }
            if doc.markers(entry.node).original.as_deref() != Some(entry.original.as_str()) {
                debug!(node = entry.node.index(), "node content replaced mid-pass, skipped");
                continue;
            }
            let Some(&translation) = table.get(entry.original.as_str()) else {
                continue;
            };
            if doc.write_translation(entry.node, translation) {
                writes += 1;
            }
            doc.markers_mut(entry.node).translated = Some(language);
        }
        writes
    }

    /// Put every tracked text node under the root back to its original text.
    fn restore(&self) -> usize {
        let mut doc = self.document.lock();
        let tracked: Vec<NodeId> = doc
            .descendants(self.root)
            .filter(|&node| doc.text(node).is_some())
            .collect();

        let mut writes = 0;
        for node in tracked {
            let markers = doc.markers(node).clone();
            match (markers.original, markers.translated) {
                (Some(original), _) => {
                    if doc.write_translation(node, &original) {
                        writes += 1;
                    }
                    doc.markers_mut(node).translated = None;
                }
                (None, Some(lang)) => {
                    warn!(node = node.index(), language = %lang, "translated node has no original, left untouched");
                }
                (None, None) => {}
            }
        }
        writes
    }
}

/// Originals in first-seen order, each once.
fn unique_originals(scanned: &[ScannedText]) -> Vec<String> {
    let mut seen = HashSet::new();
    scanned
        .iter()
        .filter(|entry| seen.insert(entry.original.as_str()))
        .map(|entry| entry.original.clone())
        .collect()
}
