#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use tokio::time::Instant;

use api::recorder::{RecordingStatus, SourceKind};
use dvrman::capture::{CaptureProcess, CaptureRequest, CaptureTool, Concatenator};
use dvrman::catalog::{
    Catalog, CatalogFile, Channel, ConnectionStatus, ContentSource, OutputProfile, Series,
    Source, StaticCatalog,
};
use dvrman::clock::ManualClock;
use dvrman::config::{Config, Database};
use dvrman::context::Context;
use dvrman::disk::DiskSpace;
use dvrman::dispatch::{Dispatcher, Task};
use dvrman::notify::LogNotifier;
use dvrman::recording::{Recording, SourceRef};
use dvrman::service::{DatabaseService, NewRecording, RecordingPatch, RecordingsService};
use dvrman::stream::{StreamEndpoint, StreamRequest, StreamService};

pub const GIB: u64 = 1024 * 1024 * 1024;

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 18, 20, 0, 0).unwrap()
}

/// What the fake capture process does once spawned
#[derive(Debug, Clone)]
pub enum CaptureMode {
    /// Writes `bytes`, exits with `code` after `after`
    Exit {
        code: i32,
        after: Duration,
        stderr: String,
    },
    /// Writes `bytes`, runs until asked to stop, then exits with 255
    UntilStopped,
    /// Ignores stop requests, only a kill ends it
    IgnoreStop,
}

pub struct FakeCapture {
    pub mode: Mutex<CaptureMode>,
    pub bytes: Vec<u8>,
    pub requests: Mutex<Vec<CaptureRequest>>,
    pub killed: Arc<AtomicBool>,
    pub fail_spawn: AtomicBool,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(CaptureMode::Exit {
                code: 0,
                after: Duration::from_millis(50),
                stderr: String::new(),
            }),
            bytes: b"mpegts-bytes".to_vec(),
            requests: Mutex::new(vec![]),
            killed: Arc::new(AtomicBool::new(false)),
            fail_spawn: AtomicBool::new(false),
        }
    }

    pub fn set_mode(&self, mode: CaptureMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn spawned(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CaptureTool for FakeCapture {
    async fn spawn(&self, req: &CaptureRequest) -> Result<Box<dyn CaptureProcess>> {
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(anyhow!("No such file or directory"));
        }
        self.requests.lock().unwrap().push(req.clone());
        std::fs::write(&req.output, &self.bytes)?;
        let mode = self.mode.lock().unwrap().clone();
        Ok(Box::new(FakeProcess {
            exit_at: Instant::now()
                + match &mode {
                    CaptureMode::Exit { after, .. } => *after,
                    _ => Duration::ZERO,
                },
            mode,
            stopped: false,
            killed: self.killed.clone(),
        }))
    }
}

struct FakeProcess {
    mode: CaptureMode,
    exit_at: Instant,
    stopped: bool,
    killed: Arc<AtomicBool>,
}

#[async_trait]
impl CaptureProcess for FakeProcess {
    async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        if self.killed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        match &self.mode {
            CaptureMode::Exit { code, .. } => {
                tokio::time::sleep_until(self.exit_at).await;
                Ok(Some(*code))
            }
            CaptureMode::UntilStopped if self.stopped => Ok(Some(255)),
            _ => std::future::pending().await,
        }
    }

    async fn request_stop(&mut self) -> std::io::Result<()> {
        self.stopped = true;
        Ok(())
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        self.killed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stderr(&self) -> String {
        match &self.mode {
            CaptureMode::Exit { stderr, .. } => stderr.clone(),
            _ => String::new(),
        }
    }
}

/// Concatenates the manifest entries byte for byte
#[derive(Default)]
pub struct FakeConcat {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl Concatenator for FakeConcat {
    async fn concat(&self, manifest: &Path, output: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("Invalid data found when processing input"));
        }
        let list = std::fs::read_to_string(manifest)?;
        let mut out = Vec::new();
        for line in list.lines() {
            let path = line
                .strip_prefix("file '")
                .and_then(|l| l.strip_suffix('\''))
                .ok_or_else(|| anyhow!("bad manifest line {}", line))?
                .replace("'\\''", "'");
            out.extend(std::fs::read(PathBuf::from(path))?);
        }
        std::fs::write(output, out)?;
        Ok(())
    }
}

pub struct FakeStream {
    pub endpoint: Mutex<Option<StreamEndpoint>>,
    pub requests: Mutex<Vec<StreamRequest>>,
}

impl FakeStream {
    pub fn new() -> Self {
        Self {
            endpoint: Mutex::new(Some(StreamEndpoint {
                stream_id: "stream-1".to_string(),
                stream_endpoint: "/stream/stream-1".to_string(),
            })),
            requests: Mutex::new(vec![]),
        }
    }
}

#[async_trait]
impl StreamService for FakeStream {
    async fn create_stream(&self, req: &StreamRequest) -> Result<Option<StreamEndpoint>> {
        self.requests.lock().unwrap().push(req.clone());
        Ok(self.endpoint.lock().unwrap().clone())
    }
}

/// Static catalog whose connection status and failures are set by the test
pub struct FakeCatalog {
    pub inner: StaticCatalog,
    pub status: Mutex<ConnectionStatus>,
    pub fail: AtomicBool,
}

impl FakeCatalog {
    pub fn new() -> Self {
        let file = CatalogFile {
            sources: vec![ContentSource {
                id: "iptv".to_string(),
                name: "My IPTV".to_string(),
                connection_counted: true,
                ..Default::default()
            }],
            profiles: vec![OutputProfile {
                id: "1".to_string(),
                name: "copy".to_string(),
                format: Some("ts".to_string()),
                args: "-c:v libx264 -b:v 2000k".to_string(),
                ..Default::default()
            }],
            channels: vec![Channel {
                id: "42".to_string(),
                name: "News".to_string(),
                stream_url: Some("http://upstream/42.ts".to_string()),
                source: Some("iptv".to_string()),
                ..Default::default()
            }],
            episodes: vec![],
            series: vec![Series {
                id: "7".to_string(),
                name: "The Show".to_string(),
                ..Default::default()
            }],
        };
        Self {
            inner: StaticCatalog::new(file),
            status: Mutex::new(ConnectionStatus { active: 0, max: 1 }),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn resolve_source(&self, source: &SourceRef) -> Result<Option<Source>> {
        self.inner.resolve_source(source).await
    }

    async fn resolve_profile(&self, id: &str) -> Result<Option<OutputProfile>> {
        self.inner.resolve_profile(id).await
    }

    async fn content_source(&self, id: &str) -> Result<Option<ContentSource>> {
        self.inner.content_source(id).await
    }

    async fn profiles_with_capacity(&self, source: &ContentSource) -> Result<usize> {
        self.inner.profiles_with_capacity(source).await
    }

    async fn connection_status(&self, _source: &ContentSource) -> Result<ConnectionStatus> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("user_info endpoint unreachable"));
        }
        Ok(*self.status.lock().unwrap())
    }
}

pub struct FixedDisk {
    pub free: AtomicU64,
}

impl DiskSpace for FixedDisk {
    fn free_bytes(&self, _path: &Path) -> Result<u64> {
        Ok(self.free.load(Ordering::SeqCst))
    }
}

#[derive(Default)]
pub struct CollectingDispatcher {
    pub jobs: Mutex<Vec<(Task, Option<Duration>)>>,
}

impl CollectingDispatcher {
    pub fn take(&self) -> Vec<(Task, Option<Duration>)> {
        std::mem::take(&mut *self.jobs.lock().unwrap())
    }
}

#[async_trait]
impl Dispatcher for CollectingDispatcher {
    async fn enqueue(&self, task: Task, delay: Option<Duration>) -> Result<()> {
        self.jobs.lock().unwrap().push((task, delay));
        Ok(())
    }
}

pub struct Harness {
    pub ctx: Context,
    pub clock: Arc<ManualClock>,
    pub catalog: Arc<FakeCatalog>,
    pub disk: Arc<FixedDisk>,
    pub stream: Arc<FakeStream>,
    pub capture: Arc<FakeCapture>,
    pub concat: Arc<FakeConcat>,
    pub dispatcher: Arc<CollectingDispatcher>,
    pub dir: TempDir,
}

pub fn test_config(dir: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.database = Database {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        connect_timeout: 5,
    };
    cfg.recorder.recordings_dir = dir.join("recordings");
    cfg.capture.poll_interval = 20;
    cfg.capture.size_refresh_interval = 10;
    cfg.capture.stop_timeout = 200;
    cfg.stream.proxy_host = "http://proxy:8085".to_string();
    cfg
}

pub async fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    harness_with(test_config(dir.path()), dir).await
}

pub async fn harness_with(cfg: Config, dir: TempDir) -> Harness {
    let database = DatabaseService::new(&cfg.database).await.unwrap();
    std::fs::create_dir_all(&cfg.recorder.recordings_dir).unwrap();

    let clock = Arc::new(ManualClock::new(epoch()));
    let catalog = Arc::new(FakeCatalog::new());
    let disk = Arc::new(FixedDisk {
        free: AtomicU64::new(100 * GIB),
    });
    let stream = Arc::new(FakeStream::new());
    let capture = Arc::new(FakeCapture::new());
    let concat = Arc::new(FakeConcat::default());
    let dispatcher = Arc::new(CollectingDispatcher::default());

    let ctx = Context {
        config: Arc::new(cfg),
        db: database.connection,
        clock: clock.clone(),
        catalog: catalog.clone(),
        disk: disk.clone(),
        stream: stream.clone(),
        capture: capture.clone(),
        concat: concat.clone(),
        dispatcher: dispatcher.clone(),
        notifier: Arc::new(LogNotifier),
    };

    Harness {
        ctx,
        clock,
        catalog,
        disk,
        stream,
        capture,
        concat,
        dispatcher,
        dir,
    }
}

impl Harness {
    pub fn now(&self) -> DateTime<Utc> {
        self.ctx.now()
    }

    /// Channel 42 with profile 1, between `start` and `end`
    pub fn channel(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> NewRecording {
        let mut new = NewRecording::new(SourceRef::new(SourceKind::Channel, "42"), "News", start, end);
        new.owner = "alice".to_string();
        new.profile_id = Some("1".to_string());
        new
    }

    pub async fn insert(&self, new: NewRecording) -> Recording {
        RecordingsService::create(&self.ctx.db, new, self.now())
            .await
            .unwrap()
    }

    /// Channel recording that started a minute ago and runs for an hour
    pub async fn live_recording(&self) -> Recording {
        let now = self.now();
        self.insert(self.channel(
            now - chrono::Duration::minutes(1),
            now + chrono::Duration::hours(1),
        ))
        .await
    }

    pub async fn get(&self, id: uuid::Uuid) -> Recording {
        RecordingsService::get(&self.ctx.db, id)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn force(
        &self,
        id: uuid::Uuid,
        from: RecordingStatus,
        to: RecordingStatus,
        patch: RecordingPatch,
    ) {
        assert!(RecordingsService::transition(&self.ctx.db, id, from, to, patch, self.now())
            .await
            .unwrap());
    }

    /// Polls until the stored status matches, for at most two seconds
    pub async fn wait_status(&self, id: uuid::Uuid, status: RecordingStatus) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while self.get(id).await.status != status {
            assert!(Instant::now() < deadline, "status never became {}", status);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
