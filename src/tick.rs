use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::context::Context;
use crate::{monitor, scheduler};

pub async fn scheduler_loop(ctx: Context, mut shutdown: watch::Receiver<bool>) {
    let tick = Duration::from_millis(ctx.config.scheduler.tick_time);
    info!("[scheduler] started, tick {:?}", tick);
    loop {
        if let Err(e) = scheduler::sweep(&ctx).await {
            error!("[scheduler] sweep failed: {}", e);
        }
        tokio::select! {
            _ = tokio::time::sleep(tick) => {}
            _ = shutdown.changed() => break,
        }
    }
    info!("[scheduler] stopped");
}

pub async fn monitor_loop(ctx: Context, mut shutdown: watch::Receiver<bool>) {
    let tick = Duration::from_millis(ctx.config.monitor.tick_time);
    info!("[monitor] started, tick {:?}", tick);
    loop {
        tokio::select! {
            _ = tokio::time::sleep(tick) => {}
            _ = shutdown.changed() => break,
        }
        let report = monitor::sweep(&ctx).await;
        if report != monitor::MonitorReport::default() {
            info!(?report, "[monitor] sweep");
        }
    }
    info!("[monitor] stopped");
}
