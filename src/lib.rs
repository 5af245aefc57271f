use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use axum::{extract::Request, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, info_span, warn};

use crate::capture::{FfmpegCapture, FfmpegConcat};
use crate::catalog::{Catalog, StaticCatalog};
use crate::clock::SystemClock;
use crate::config::Config;
use crate::context::Context;
use crate::disk::SysinfoDisk;
use crate::dispatch::{Job, QueueDispatcher};
use crate::notify::{LogNotifier, Notifier, Notifiers, WebhookNotifier};
use crate::service::DatabaseService;
use crate::stream::ProxyStreamService;

pub mod admission;
pub mod capture;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod context;
pub mod disk;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod executor;
pub mod migration;
pub mod monitor;
pub mod naming;
pub mod notify;
pub mod recording;
pub mod result;
pub mod route;
pub mod scheduler;
pub mod segments;
pub mod service;
pub mod stream;
pub mod tick;

/// Production collaborators for `cfg`, plus the receiving end of the dispatch queue
pub async fn build_context(
    cfg: Config,
) -> Result<(Context, tokio::sync::mpsc::UnboundedReceiver<Job>)> {
    let database = DatabaseService::new(&cfg.database).await?;

    tokio::fs::create_dir_all(&cfg.recorder.recordings_dir).await?;
    tokio::fs::create_dir_all(cfg.recorder.temp_dir()).await?;

    let catalog: Arc<dyn Catalog> = match &cfg.catalog.path {
        Some(path) => Arc::new(StaticCatalog::load(path)?),
        None => {
            warn!("[catalog] no catalog configured, every source will be unavailable");
            Arc::new(StaticCatalog::default())
        }
    };

    let mut notifiers: Vec<Box<dyn Notifier>> = vec![Box::new(LogNotifier)];
    if !cfg.webhook.webhooks.is_empty() {
        notifiers.push(Box::new(WebhookNotifier::new(cfg.webhook.webhooks.clone())?));
    }

    let (dispatcher, rx) = QueueDispatcher::new();
    let ctx = Context {
        db: database.connection,
        clock: Arc::new(SystemClock),
        catalog,
        disk: Arc::new(SysinfoDisk),
        stream: Arc::new(ProxyStreamService::new(&cfg.stream)?),
        capture: Arc::new(FfmpegCapture::new(cfg.capture.ffmpeg.clone())),
        concat: Arc::new(FfmpegConcat::new(
            cfg.capture.ffmpeg.clone(),
            std::time::Duration::from_millis(cfg.capture.concat_timeout),
        )),
        dispatcher: Arc::new(dispatcher),
        notifier: Arc::new(Notifiers(notifiers)),
        config: Arc::new(cfg),
    };
    Ok((ctx, rx))
}

pub fn router(ctx: Context) -> Router {
    let cors = ctx.config.http.cors;
    Router::new()
        .merge(route::route())
        .layer(if cors {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
        })
        .with_state(ctx)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                info_span!(
                    "http_request",
                    uri = ?request.uri(),
                    method = ?request.method(),
                )
            }),
        )
}

pub async fn serve<F>(cfg: Config, listener: TcpListener, signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (ctx, rx) = build_context(cfg).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(dispatch::run_worker(ctx.clone(), rx, shutdown_rx.clone()));
    tokio::spawn(tick::scheduler_loop(ctx.clone(), shutdown_rx.clone()));
    tokio::spawn(tick::monitor_loop(ctx.clone(), shutdown_rx));

    info!("Server listening on {}", listener.local_addr()?);
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(async move {
            signal.await;
            let _ = shutdown_tx.send(true);
        })
        .await
        .unwrap_or_else(|e| error!("Application error: {e}"));
    Ok(())
}
