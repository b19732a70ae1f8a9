//! End-to-end pipeline tests over a scripted fake remote service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Notify};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use correlation::{
    CompiledChunk, CompiledText, RemoteCompilerInfo, SourceLocation, SourceSettings,
};
use explorer::pipeline::Pipeline;
use explorer::remote::{CompileRequest, RemoteClient};
use explorer::{ExplorerConfig, ExplorerError, ExplorerEvent};

fn gcc(id: &str, name: &str) -> RemoteCompilerInfo {
    RemoteCompilerInfo {
        id: id.into(),
        name: name.into(),
        language: "c++".into(),
    }
}

/// Assembly whose first line carries the submitted source, so tests can tell
/// which run's result was delivered.
fn asm_for(source: &str) -> CompiledText {
    CompiledText {
        code: 0,
        stdout: vec![],
        stderr: vec![],
        asm: vec![
            CompiledChunk::new(format!("; built from {source}"), None),
            CompiledChunk::new("mov eax,1", Some(SourceLocation::new("/w/a.cpp", 3))),
            CompiledChunk::new("ret", None),
        ],
    }
}

struct FakeRemote {
    compilers: Vec<RemoteCompilerInfo>,
    compile_calls: AtomicUsize,
    compiled_ids: Mutex<Vec<String>>,
    compiled_sources: Mutex<Vec<String>>,
    /// When set, the first compile call parks here until notified.
    first_compile_gate: Option<Arc<Notify>>,
}

impl FakeRemote {
    fn new(compilers: Vec<RemoteCompilerInfo>) -> Self {
        Self {
            compilers,
            compile_calls: AtomicUsize::new(0),
            compiled_ids: Mutex::new(Vec::new()),
            compiled_sources: Mutex::new(Vec::new()),
            first_compile_gate: None,
        }
    }
}

#[async_trait]
impl RemoteClient for FakeRemote {
    async fn list_compilers(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Vec<RemoteCompilerInfo>, ExplorerError> {
        Ok(self.compilers.clone())
    }

    async fn compile(
        &self,
        compiler_id: &str,
        request: &CompileRequest,
        cancel: &CancellationToken,
    ) -> Result<CompiledText, ExplorerError> {
        let call = self.compile_calls.fetch_add(1, Ordering::SeqCst);
        self.compiled_ids.lock().unwrap().push(compiler_id.to_string());
        self.compiled_sources
            .lock()
            .unwrap()
            .push(request.source.clone());
        if call == 0 {
            if let Some(gate) = &self.first_compile_gate {
                gate.notified().await;
                if cancel.is_cancelled() {
                    return Err(ExplorerError::Canceled);
                }
            }
        }
        Ok(asm_for(&request.source))
    }
}

fn raw_config() -> ExplorerConfig {
    ExplorerConfig {
        url: "http://localhost:10240".into(),
        preprocess_locally: false,
        ..ExplorerConfig::default()
    }
}

fn settings() -> SourceSettings {
    SourceSettings::new("/w/a.cpp", "c++", "", "/usr/bin/gcc-11.2", "GCC", vec![])
}

async fn next_of(
    rx: &mut broadcast::Receiver<ExplorerEvent>,
    event_type: &str,
) -> ExplorerEvent {
    loop {
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {event_type}"))
            .expect("event bus closed");
        if event.event_type() == event_type {
            return event;
        }
    }
}

#[tokio::test]
async fn pipeline_delivers_events_and_answers_queries() {
    let remote = Arc::new(FakeRemote::new(vec![gcc("g1", "gcc 11.2")]));
    let (handle, bus) = Pipeline::spawn(raw_config(), remote.clone());
    let mut rx = bus.subscribe();

    handle.select_source(settings(), "int main() {}".into());

    let mut seen = Vec::new();
    loop {
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out")
            .expect("bus closed");
        seen.push(event.event_type());
        if event.event_type() == "compiled" {
            break;
        }
    }
    assert_eq!(
        seen,
        [
            "source_selected",
            "remote_matched",
            "preprocessed",
            "compile_started",
            "compiled",
        ]
    );

    // "; built from int main() {}" spans [0, 26) unattributed, then
    // "mov eax,1" spans [27, 36) attributed to /w/a.cpp:3.
    assert_eq!(
        handle.locate_source(30).await,
        Some(SourceLocation::new("/w/a.cpp", 3))
    );
    assert_eq!(handle.locate_source(5).await, None);

    handle.update_caret("/w/a.cpp", vec![3]);
    match next_of(&mut rx, "highlights_changed").await {
        ExplorerEvent::HighlightsChanged { ranges, .. } => assert_eq!(ranges, [(27, 36)]),
        _ => unreachable!(),
    }
    assert_eq!(handle.scroll_target(0).await, Some(27));
    assert_eq!(handle.scroll_target(40).await, Some(36));
}

#[tokio::test(start_paused = true)]
async fn superseded_run_is_never_delivered() {
    let gate = Arc::new(Notify::new());
    let mut fake = FakeRemote::new(vec![gcc("g1", "gcc 11.2")]);
    fake.first_compile_gate = Some(gate.clone());
    let remote = Arc::new(fake);

    let (handle, bus) = Pipeline::spawn(raw_config(), remote.clone());
    let mut rx = bus.subscribe();

    handle.select_source(settings(), "first".into());
    next_of(&mut rx, "compile_started").await;

    // The first compile is parked on the gate. An edit supersedes it after
    // the debounce window.
    handle.edit("second".into());
    match next_of(&mut rx, "compiled").await {
        ExplorerEvent::Compiled { index, .. } => {
            assert!(index.text().contains("built from second"));
        }
        _ => unreachable!(),
    }

    // Release the first run; its result must be dropped, not delivered.
    gate.notify_one();
    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());

    assert_eq!(remote.compile_calls.load(Ordering::SeqCst), 2);
    assert_eq!(*remote.compiled_sources.lock().unwrap(), ["first", "second"]);
}

#[tokio::test]
async fn choosing_an_alternative_recompiles_with_it() {
    let remote = Arc::new(FakeRemote::new(vec![
        gcc("g1", "gcc 11.2"),
        gcc("g2", "gcc 11.1"),
    ]));
    let config = ExplorerConfig {
        allow_minor_version_mismatch: true,
        ..raw_config()
    };
    let (handle, bus) = Pipeline::spawn(config, remote.clone());
    let mut rx = bus.subscribe();

    handle.select_source(settings(), "int main() {}".into());
    next_of(&mut rx, "compiled").await;

    handle.choose_match("g2");
    match next_of(&mut rx, "remote_matched").await {
        ExplorerEvent::RemoteMatched(matched) => {
            assert_eq!(matched.matches.chosen.as_ref().unwrap().info.id, "g2");
            // The alternatives list is untouched by the override.
            assert_eq!(matched.matches.alternatives.len(), 2);
        }
        _ => unreachable!(),
    }
    next_of(&mut rx, "compiled").await;

    assert_eq!(*remote.compiled_ids.lock().unwrap(), ["g1", "g2"]);
}
