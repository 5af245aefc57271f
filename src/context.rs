use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;

use crate::capture::{CaptureTool, Concatenator};
use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::config::Config;
use crate::disk::DiskSpace;
use crate::dispatch::Dispatcher;
use crate::notify::Notifier;
use crate::stream::StreamService;

/// Everything a scheduler sweep, monitor sweep or recording attempt talks to
#[derive(Clone)]
pub struct Context {
    pub config: Arc<Config>,
    pub db: DatabaseConnection,
    pub clock: Arc<dyn Clock>,
    pub catalog: Arc<dyn Catalog>,
    pub disk: Arc<dyn DiskSpace>,
    pub stream: Arc<dyn StreamService>,
    pub capture: Arc<dyn CaptureTool>,
    pub concat: Arc<dyn Concatenator>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub notifier: Arc<dyn Notifier>,
}

impl Context {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
