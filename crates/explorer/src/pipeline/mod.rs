//! Pipeline orchestrator: settings → remote list → match → preprocess →
//! compile.
//!
//! One long-lived delivery task owns every piece of mutable state: the
//! session store, the active source unit, the caret tracker, and the built
//! output index. The three I/O stages (remote-list fetch, local preprocess,
//! remote compile) run as spawned workers that report back over the command
//! channel; workers never mutate shared state, so no locking exists anywhere
//! in the pipeline.
//!
//! Single-flight per source unit: every run start bumps a generation counter
//! and swaps the cancellation token. A completion tagged with a stale
//! generation is dropped on arrival, which is what makes delivery
//! last-write-wins: a superseded run's result can reach the channel but
//! never the subscribers.

pub mod stage;
pub mod store;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use correlation::{
    nearest_boundary, CaretTracker, CompiledText, OutputIndex, PreprocessedSource,
    RemoteCompilerInfo, SourceLocation, SourceRemoteMatched, SourceSettings,
};

use crate::config::ExplorerConfig;
use crate::error::ExplorerError;
use crate::events::{EventBus, ExplorerEvent};
use crate::preprocessor;
use crate::remote::{CompileOptions, CompileRequest, RemoteClient};

use self::stage::Stage;
use self::store::SessionStore;

/// Explicit refresh requests accepted from the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshSignal {
    /// Drop the remote-list cache and all match state, return to idle.
    Reset,
    /// Force a re-fetch of the remote compiler list.
    Reconnect,
    /// Re-run from matching/preprocessing.
    Preprocess,
    /// Re-run from compiling, using the existing preprocessed text.
    Compile,
}

enum Command {
    SelectSource {
        settings: SourceSettings,
        text: String,
    },
    Edit {
        text: String,
    },
    Caret {
        file: String,
        lines: Vec<u32>,
    },
    Signal(RefreshSignal),
    ChooseMatch {
        compiler_id: String,
    },
    LocateSource {
        offset: usize,
        reply: oneshot::Sender<Option<SourceLocation>>,
    },
    ScrollTarget {
        anchor: usize,
        reply: oneshot::Sender<Option<usize>>,
    },
    // Internal completions, tagged with the generation that started them.
    DebounceElapsed {
        epoch: u64,
    },
    FetchFinished {
        generation: u64,
        result: Result<Vec<RemoteCompilerInfo>, ExplorerError>,
    },
    PreprocessFinished {
        generation: u64,
        result: Result<String, ExplorerError>,
    },
    CompileFinished {
        generation: u64,
        result: Result<CompiledText, ExplorerError>,
    },
}

/// Cheap, cloneable front door to the delivery task.
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl PipelineHandle {
    /// Select a source unit, restarting the pipeline for it.
    pub fn select_source(&self, settings: SourceSettings, text: String) {
        let _ = self.tx.send(Command::SelectSource { settings, text });
    }

    /// Report an edit of the active unit's text. Debounced.
    pub fn edit(&self, text: String) {
        let _ = self.tx.send(Command::Edit { text });
    }

    /// Report the caret lines (1-based) for an editor file.
    pub fn update_caret(&self, file: impl Into<String>, lines: Vec<u32>) {
        let _ = self.tx.send(Command::Caret {
            file: file.into(),
            lines,
        });
    }

    pub fn signal(&self, signal: RefreshSignal) {
        let _ = self.tx.send(Command::Signal(signal));
    }

    /// Override the chosen remote compiler by id and recompile.
    pub fn choose_match(&self, compiler_id: impl Into<String>) {
        let _ = self.tx.send(Command::ChooseMatch {
            compiler_id: compiler_id.into(),
        });
    }

    /// Backward lookup against the current index: which source line owns the
    /// given output offset.
    pub async fn locate_source(&self, offset: usize) -> Option<SourceLocation> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::LocateSource { offset, reply }).is_err() {
            return None;
        }
        rx.await.unwrap_or(None)
    }

    /// Pick the scroll target among the current highlight boundaries.
    pub async fn scroll_target(&self, anchor: usize) -> Option<usize> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::ScrollTarget { anchor, reply }).is_err() {
            return None;
        }
        rx.await.unwrap_or(None)
    }
}

pub struct Pipeline;

impl Pipeline {
    /// Spawn the delivery task on the current runtime. Returns the command
    /// handle and the event bus to subscribe on.
    pub fn spawn(
        config: ExplorerConfig,
        client: Arc<dyn RemoteClient>,
    ) -> (PipelineHandle, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let delivery = Delivery {
            config,
            client,
            bus: bus.clone(),
            tx: tx.clone(),
            rx,
            store: SessionStore::new(),
            unit: None,
            caret: CaretTracker::new(),
            index: None,
            highlight: Vec::new(),
            generation: 0,
            edit_epoch: 0,
        };
        tokio::spawn(delivery.run());
        (PipelineHandle { tx }, bus)
    }
}

/// State of the active source unit.
struct ActiveUnit {
    settings: Arc<SourceSettings>,
    text: String,
    matched: Option<Arc<SourceRemoteMatched>>,
    preprocessed: Option<Arc<PreprocessedSource>>,
    stage: Stage,
    cancel: CancellationToken,
}

struct Delivery {
    config: ExplorerConfig,
    client: Arc<dyn RemoteClient>,
    bus: Arc<EventBus>,
    tx: mpsc::UnboundedSender<Command>,
    rx: mpsc::UnboundedReceiver<Command>,
    store: SessionStore,
    unit: Option<ActiveUnit>,
    caret: CaretTracker,
    index: Option<Arc<OutputIndex>>,
    highlight: Vec<(usize, usize)>,
    generation: u64,
    // Monotonic across source units, so a timer armed for a replaced unit
    // can never collide with a fresh unit's epochs.
    edit_epoch: u64,
}

impl Delivery {
    async fn run(mut self) {
        debug!("pipeline delivery task started");
        while let Some(cmd) = self.rx.recv().await {
            self.handle(cmd);
        }
        debug!("pipeline delivery task stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::SelectSource { settings, text } => self.on_select_source(settings, text),
            Command::Edit { text } => self.on_edit(text),
            Command::Caret { file, lines } => self.on_caret(&file, &lines),
            Command::Signal(signal) => self.on_signal(signal),
            Command::ChooseMatch { compiler_id } => self.on_choose_match(&compiler_id),
            Command::LocateSource { offset, reply } => {
                let located = self
                    .index
                    .as_ref()
                    .and_then(|index| index.locate_source(offset).cloned());
                let _ = reply.send(located);
            }
            Command::ScrollTarget { anchor, reply } => {
                let _ = reply.send(nearest_boundary(anchor, &self.highlight));
            }
            Command::DebounceElapsed { epoch } => self.on_debounce_elapsed(epoch),
            Command::FetchFinished { generation, result } => {
                self.on_fetch_finished(generation, result)
            }
            Command::PreprocessFinished { generation, result } => {
                self.on_preprocess_finished(generation, result)
            }
            Command::CompileFinished { generation, result } => {
                self.on_compile_finished(generation, result)
            }
        }
    }

    fn on_select_source(&mut self, settings: SourceSettings, text: String) {
        if !self.config.enabled {
            return;
        }
        if let Some(unit) = &self.unit {
            unit.cancel.cancel();
        }
        let settings = Arc::new(settings);
        info!(source = %settings.source_name, "source unit selected");
        self.bus
            .publish(ExplorerEvent::SourceSelected(settings.clone()));
        self.unit = Some(ActiveUnit {
            settings,
            text,
            matched: None,
            preprocessed: None,
            stage: Stage::Idle,
            cancel: CancellationToken::new(),
        });
        let entry = if self.store.connected() {
            Stage::Matching
        } else {
            Stage::FetchingRemoteList
        };
        self.start_run(entry);
    }

    fn on_edit(&mut self, text: String) {
        if !self.config.enabled {
            return;
        }
        let Some(unit) = self.unit.as_mut() else {
            return;
        };
        unit.text = text;
        self.edit_epoch += 1;
        let epoch = self.edit_epoch;
        debug!(epoch, "edit received, debouncing");
        let delay = self.config.update_delay();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Command::DebounceElapsed { epoch });
        });
    }

    fn on_debounce_elapsed(&mut self, epoch: u64) {
        if self.unit.is_none() {
            return;
        }
        if self.edit_epoch != epoch {
            debug!(epoch, current = self.edit_epoch, "dropping superseded edit");
            return;
        }
        self.start_run(Stage::Preprocessing);
    }

    fn on_caret(&mut self, file: &str, lines: &[u32]) {
        if self.caret.update(file, lines).is_some() {
            self.publish_highlights();
        }
    }

    fn on_signal(&mut self, signal: RefreshSignal) {
        info!(?signal, "refresh signal");
        match signal {
            RefreshSignal::Reset => {
                if let Some(unit) = self.unit.as_mut() {
                    unit.cancel.cancel();
                    unit.matched = None;
                    unit.preprocessed = None;
                    Self::transition(unit, Stage::Idle);
                }
                self.store.clear_connection();
                self.index = None;
                self.highlight.clear();
                self.bus.publish(ExplorerEvent::Reset);
            }
            RefreshSignal::Reconnect => {
                self.store.clear_connection();
                if self.unit.is_some() {
                    self.start_run(Stage::FetchingRemoteList);
                }
            }
            RefreshSignal::Preprocess => {
                if !self.config.enabled || self.unit.is_none() {
                    return;
                }
                let entry = if self.unit.as_ref().is_some_and(|u| u.matched.is_none()) {
                    Stage::Matching
                } else {
                    Stage::Preprocessing
                };
                self.start_run(entry);
            }
            RefreshSignal::Compile => {
                if !self.config.enabled || self.unit.is_none() {
                    return;
                }
                // Falls back to preprocessing when no preprocessed text exists.
                self.start_run(Stage::Compiling);
            }
        }
    }

    fn on_choose_match(&mut self, compiler_id: &str) {
        let Some(settings) = self.unit.as_ref().map(|u| u.settings.clone()) else {
            return;
        };
        let Some(matches) = self.store.override_chosen(&settings, compiler_id) else {
            warn!(compiler_id, "unknown remote compiler for override");
            return;
        };
        let matched = Arc::new(SourceRemoteMatched {
            settings: (*settings).clone(),
            matches,
        });
        if let Some(unit) = self.unit.as_mut() {
            unit.matched = Some(matched.clone());
            unit.preprocessed = None;
        }
        self.bus.publish(ExplorerEvent::RemoteMatched(matched));
        self.start_run(Stage::Preprocessing);
    }

    /// Begin (or restart) a run at `entry`. Cancels whatever was in flight
    /// and claims a fresh generation.
    fn start_run(&mut self, entry: Stage) {
        self.generation += 1;
        let generation = self.generation;
        {
            let Some(unit) = self.unit.as_mut() else {
                return;
            };
            unit.cancel.cancel();
            unit.cancel = CancellationToken::new();
        }
        match entry {
            Stage::FetchingRemoteList => self.spawn_fetch(generation),
            Stage::Matching => self.run_matching(generation),
            Stage::Preprocessing => self.run_preprocessing(generation),
            Stage::Compiling => self.run_compiling(generation),
            _ => {}
        }
    }

    fn spawn_fetch(&mut self, generation: u64) {
        let Some(unit) = self.unit.as_mut() else {
            return;
        };
        Self::transition(unit, Stage::FetchingRemoteList);
        let cancel = unit.cancel.clone();
        let client = self.client.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = client.list_compilers(&cancel).await;
            let _ = tx.send(Command::FetchFinished { generation, result });
        });
    }

    fn on_fetch_finished(
        &mut self,
        generation: u64,
        result: Result<Vec<RemoteCompilerInfo>, ExplorerError>,
    ) {
        if generation != self.generation {
            debug!(generation, current = self.generation, "dropping stale remote list");
            return;
        }
        match result {
            Ok(list) => {
                info!(count = list.len(), "connected to remote service");
                self.store.set_remote_compilers(list);
                self.run_matching(generation);
            }
            Err(err) => self.fail(err),
        }
    }

    fn run_matching(&mut self, generation: u64) {
        let Some(settings) = self.unit.as_ref().map(|u| u.settings.clone()) else {
            return;
        };
        let matches = self
            .store
            .matches_for(&settings, self.config.allow_minor_version_mismatch);
        let matched = Arc::new(SourceRemoteMatched {
            settings: (*settings).clone(),
            matches,
        });
        if let Some(unit) = self.unit.as_mut() {
            Self::transition(unit, Stage::Matching);
            unit.matched = Some(matched.clone());
            // Anything preprocessed against the old matches is stale.
            unit.preprocessed = None;
        }
        self.bus.publish(ExplorerEvent::RemoteMatched(matched));
        self.run_preprocessing(generation);
    }

    fn run_preprocessing(&mut self, generation: u64) {
        if self.unit.as_ref().is_some_and(|u| u.matched.is_none()) {
            return self.run_matching(generation);
        }
        let preprocess_locally = self.config.preprocess_locally;
        let additional = self.config.additional_switches.clone();
        let Some(unit) = self.unit.as_mut() else {
            return;
        };
        let Some(matched) = unit.matched.clone() else {
            return;
        };
        Self::transition(unit, Stage::Preprocessing);
        if !preprocess_locally {
            let pre = Arc::new(PreprocessedSource {
                matched: (*matched).clone(),
                text: unit.text.clone(),
            });
            unit.preprocessed = Some(pre.clone());
            self.bus.publish(ExplorerEvent::Preprocessed(pre));
            return self.run_compiling(generation);
        }
        let settings = unit.settings.clone();
        let text = unit.text.clone();
        let cancel = unit.cancel.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = preprocessor::preprocess(&settings, &additional, &text, &cancel).await;
            let _ = tx.send(Command::PreprocessFinished { generation, result });
        });
    }

    fn on_preprocess_finished(&mut self, generation: u64, result: Result<String, ExplorerError>) {
        if generation != self.generation {
            debug!(generation, current = self.generation, "dropping stale preprocess result");
            return;
        }
        match result {
            Ok(text) => {
                let Some(unit) = self.unit.as_mut() else {
                    return;
                };
                let Some(matched) = unit.matched.clone() else {
                    return;
                };
                let pre = Arc::new(PreprocessedSource {
                    matched: (*matched).clone(),
                    text,
                });
                unit.preprocessed = Some(pre.clone());
                self.bus.publish(ExplorerEvent::Preprocessed(pre));
                self.run_compiling(generation);
            }
            Err(err) => self.fail(err),
        }
    }

    fn run_compiling(&mut self, generation: u64) {
        let Some(pre) = self.unit.as_ref().and_then(|u| u.preprocessed.clone()) else {
            return self.run_preprocessing(generation);
        };
        let Some(chosen) = pre.matched.matches.chosen.clone() else {
            warn!("no remote compiler matched, compile skipped");
            return;
        };
        let mut user_arguments = pre.matched.settings.language_switch.trim().to_string();
        let additional = self.config.additional_switches.trim();
        if !additional.is_empty() {
            if !user_arguments.is_empty() {
                user_arguments.push(' ');
            }
            user_arguments.push_str(additional);
        }
        let request = CompileRequest {
            source: pre.text.clone(),
            options: CompileOptions {
                user_arguments,
                filters: self.config.filters.clone(),
            },
        };
        let (cancel, source_name) = {
            let Some(unit) = self.unit.as_mut() else {
                return;
            };
            Self::transition(unit, Stage::Compiling);
            (unit.cancel.clone(), unit.settings.source_name.clone())
        };
        info!(source = %source_name, compiler = %chosen.info.id, "compiling");
        self.bus
            .publish(ExplorerEvent::CompileStarted { source_name });
        let client = self.client.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = client.compile(&chosen.info.id, &request, &cancel).await;
            let _ = tx.send(Command::CompileFinished { generation, result });
        });
    }

    fn on_compile_finished(&mut self, generation: u64, result: Result<CompiledText, ExplorerError>) {
        if generation != self.generation {
            debug!(generation, current = self.generation, "dropping stale compile result");
            return;
        }
        match result {
            Ok(text) if text.success() => {
                let text = Arc::new(text);
                let index = Arc::new(OutputIndex::build(&text.asm));
                self.index = Some(index.clone());
                if let Some(unit) = self.unit.as_mut() {
                    Self::transition(unit, Stage::Done);
                }
                self.bus.publish(ExplorerEvent::Compiled { text, index });
                if !self.caret.locations().is_empty() {
                    self.publish_highlights();
                }
            }
            Ok(text) => {
                // The request succeeded; the compilation did not. The prior
                // index stays as it was, never populated from this response.
                let source_text = self
                    .unit
                    .as_ref()
                    .and_then(|u| u.preprocessed.as_ref())
                    .map(|p| p.text.clone())
                    .unwrap_or_default();
                self.fail(ExplorerError::Compile {
                    stderr: text.stderr_text(),
                    source_text,
                });
            }
            Err(err) => self.fail(err),
        }
    }

    fn publish_highlights(&mut self) {
        let locations = self.caret.locations().to_vec();
        let ranges = self
            .index
            .as_ref()
            .map(|index| index.highlight_ranges(&locations))
            .unwrap_or_default();
        self.highlight = ranges.clone();
        self.bus
            .publish(ExplorerEvent::HighlightsChanged { locations, ranges });
    }

    fn fail(&mut self, err: ExplorerError) {
        if err.is_cancellation() {
            debug!("run canceled");
            return;
        }
        if err.invalidates_connection() {
            self.store.mark_disconnected();
        }
        if let Some(unit) = self.unit.as_mut() {
            Self::transition(unit, Stage::Error);
        }
        warn!(kind = err.kind(), "pipeline run failed");
        self.bus.publish(ExplorerEvent::PipelineError(Arc::new(err)));
    }

    fn transition(unit: &mut ActiveUnit, to: Stage) {
        if unit.stage != to {
            debug!(
                source = %unit.settings.source_name,
                from = %unit.stage,
                to = %to,
                "stage transition"
            );
            unit.stage = to;
        }
    }
}
