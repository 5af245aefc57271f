use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use api::recorder::SourceKind;

use crate::naming::NamingContext;
use crate::recording::SourceRef;

/// Account that owns channels and episodes and limits concurrent streams
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentSource {
    pub id: String,
    pub name: String,
    /// Capacity is tracked per source profile rather than per account
    #[serde(default)]
    pub profiles_enabled: bool,
    #[serde(default)]
    pub profiles: Vec<SourceProfile>,
    /// Xtream-style account with a connection limit
    #[serde(default)]
    pub connection_counted: bool,
    /// `user_info` endpoint reporting `active_cons` / `max_connections`
    #[serde(default)]
    pub status_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceProfile {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 0 means unlimited
    #[serde(default)]
    pub max_streams: u32,
    #[serde(default)]
    pub active_streams: u32,
}

impl SourceProfile {
    pub fn has_capacity(&self) -> bool {
        self.enabled && (self.max_streams == 0 || self.active_streams < self.max_streams)
    }
}

/// Output encoding template handed to the stream service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Container of the produced stream: `m3u8`, `mp4`, `mkv`, ...
    #[serde(default)]
    pub format: Option<String>,
    /// ffmpeg argument template, e.g. `-c:v libx264 -b:v 2000k`
    #[serde(default)]
    pub args: String,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub stream_url: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub playlist: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub stream_url: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub episode: Option<u32>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub playlist: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Series {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub playlist: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// What a recording points at
#[derive(Debug, Clone)]
pub enum Source {
    Channel(Channel),
    Episode(Episode),
    Series(Series),
}

impl Source {
    pub fn kind(&self) -> SourceKind {
        match self {
            Source::Channel(_) => SourceKind::Channel,
            Source::Episode(_) => SourceKind::Episode,
            Source::Series(_) => SourceKind::Series,
        }
    }

    /// Series are containers and have nothing to play themselves
    pub fn stream_url(&self) -> Option<&str> {
        match self {
            Source::Channel(c) => c.stream_url.as_deref(),
            Source::Episode(e) => e.stream_url.as_deref(),
            Source::Series(_) => None,
        }
    }

    pub fn content_source(&self) -> Option<&str> {
        match self {
            Source::Channel(c) => c.source.as_deref(),
            Source::Episode(e) => e.source.as_deref(),
            Source::Series(_) => None,
        }
    }

    pub fn naming(&self) -> NamingContext {
        let mut ctx = NamingContext::new(self.kind());
        match self {
            Source::Channel(c) => {
                ctx.playlist = c.playlist.clone();
                ctx.category = c.category.clone();
            }
            Source::Episode(e) => {
                ctx.playlist = e.playlist.clone();
                ctx.category = e.category.clone();
                ctx.series = e.series.clone();
                ctx.season = e.season;
                ctx.episode = e.episode;
                ctx.year = e.year.clone();
            }
            Source::Series(s) => {
                ctx.playlist = s.playlist.clone();
                ctx.category = s.category.clone();
                ctx.series = Some(s.name.clone());
                ctx.year = s.year.clone();
            }
        }
        ctx
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub active: u32,
    pub max: u32,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self { active: 0, max: 1 }
    }
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn resolve_source(&self, source: &SourceRef) -> Result<Option<Source>>;

    async fn resolve_profile(&self, id: &str) -> Result<Option<OutputProfile>>;

    async fn content_source(&self, id: &str) -> Result<Option<ContentSource>>;

    /// Number of enabled source profiles with a free stream slot
    async fn profiles_with_capacity(&self, source: &ContentSource) -> Result<usize>;

    async fn connection_status(&self, source: &ContentSource) -> Result<ConnectionStatus>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub sources: Vec<ContentSource>,
    #[serde(default)]
    pub profiles: Vec<OutputProfile>,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub episodes: Vec<Episode>,
    #[serde(default)]
    pub series: Vec<Series>,
}

/// Catalog read once from a TOML file
pub struct StaticCatalog {
    file: CatalogFile,
    client: reqwest::Client,
}

impl StaticCatalog {
    pub fn new(file: CatalogFile) -> Self {
        Self {
            file,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("catalog {}: {}", path.display(), e))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let file: CatalogFile =
            toml::from_str(raw).map_err(|e| anyhow!("catalog parse error: {}", e))?;
        Ok(Self::new(file))
    }
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::new(CatalogFile::default())
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn resolve_source(&self, source: &SourceRef) -> Result<Option<Source>> {
        let found = match source.kind {
            SourceKind::Channel => self
                .file
                .channels
                .iter()
                .find(|c| c.id == source.id)
                .cloned()
                .map(Source::Channel),
            SourceKind::Episode => self
                .file
                .episodes
                .iter()
                .find(|e| e.id == source.id)
                .cloned()
                .map(Source::Episode),
            SourceKind::Series => self
                .file
                .series
                .iter()
                .find(|s| s.id == source.id)
                .cloned()
                .map(Source::Series),
        };
        Ok(found)
    }

    async fn resolve_profile(&self, id: &str) -> Result<Option<OutputProfile>> {
        Ok(self.file.profiles.iter().find(|p| p.id == id).cloned())
    }

    async fn content_source(&self, id: &str) -> Result<Option<ContentSource>> {
        Ok(self.file.sources.iter().find(|s| s.id == id).cloned())
    }

    async fn profiles_with_capacity(&self, source: &ContentSource) -> Result<usize> {
        Ok(source.profiles.iter().filter(|p| p.has_capacity()).count())
    }

    async fn connection_status(&self, source: &ContentSource) -> Result<ConnectionStatus> {
        let Some(url) = source.status_url.as_deref() else {
            return Ok(ConnectionStatus::default());
        };
        let body: Value = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let status = parse_user_info(&body);
        debug!(
            "[catalog] source {} connections {}/{}",
            source.id, status.active, status.max
        );
        Ok(status)
    }
}

/// Xtream reports counts either as numbers or as numeric strings
pub fn parse_user_info(body: &Value) -> ConnectionStatus {
    let info = &body["user_info"];
    let field = |key: &str| -> Option<u32> {
        match &info[key] {
            Value::Number(n) => n.as_u64().map(|n| n as u32),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    };
    let defaults = ConnectionStatus::default();
    ConnectionStatus {
        active: field("active_cons").unwrap_or(defaults.active),
        max: field("max_connections").unwrap_or(defaults.max),
    }
}

fn default_true() -> bool {
    true
}
