use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::context::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    /// One capture attempt, see [`crate::executor::run`]
    StartRecording(Uuid),
    /// Merge segments and notify once a recording completed
    ProcessRecording(Uuid),
}

impl Task {
    pub fn recording_id(&self) -> Uuid {
        match self {
            Task::StartRecording(id) | Task::ProcessRecording(id) => *id,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::StartRecording(id) => write!(f, "start_recording({})", id),
            Task::ProcessRecording(id) => write!(f, "process_recording({})", id),
        }
    }
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn enqueue(&self, task: Task, delay: Option<Duration>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    pub task: Task,
    pub delay: Option<Duration>,
}

/// In-process queue drained by [`run_worker`]
#[derive(Debug, Clone)]
pub struct QueueDispatcher {
    tx: mpsc::UnboundedSender<Job>,
}

impl QueueDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Dispatcher for QueueDispatcher {
    async fn enqueue(&self, task: Task, delay: Option<Duration>) -> Result<()> {
        debug!("[dispatch] enqueue {} delay {:?}", task, delay);
        self.tx
            .send(Job { task, delay })
            .map_err(|_| anyhow!("dispatch queue closed"))
    }
}

/// Spawns one task per job until the queue closes or `shutdown` flips
pub async fn run_worker(
    ctx: Context,
    mut rx: mpsc::UnboundedReceiver<Job>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("[dispatch] worker started");
    loop {
        tokio::select! {
            job = rx.recv() => match job {
                Some(job) => {
                    let ctx = ctx.clone();
                    tokio::spawn(async move { run_job(ctx, job).await });
                }
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    info!("[dispatch] worker stopped");
}

pub async fn run_job(ctx: Context, job: Job) {
    if let Some(delay) = job.delay.filter(|d| !d.is_zero()) {
        tokio::time::sleep(delay).await;
    }
    let result = match job.task {
        Task::StartRecording(id) => crate::executor::run(&ctx, id).await.map(|_| ()),
        Task::ProcessRecording(id) => crate::segments::process_recording(&ctx, id).await,
    };
    if let Err(e) = result {
        error!("[dispatch] {} failed: {}", job.task, e);
    }
}
