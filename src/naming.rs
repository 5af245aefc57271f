use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use api::recorder::SourceKind;

use crate::config::Naming;

/// Folder levels below the recordings directory, applied in configured order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathComponent {
    Type,
    Playlist,
    Category,
    Series,
    Season,
}

/// Optional tokens appended to the title in the file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilenameMetadata {
    Date,
    Time,
    Year,
    Season,
    Episode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplaceChar {
    #[default]
    Space,
    Dash,
    Underscore,
    Period,
    Remove,
}

impl ReplaceChar {
    fn as_char(&self) -> Option<char> {
        match self {
            ReplaceChar::Space => Some(' '),
            ReplaceChar::Dash => Some('-'),
            ReplaceChar::Underscore => Some('_'),
            ReplaceChar::Period => Some('.'),
            ReplaceChar::Remove => None,
        }
    }
}

/// What a source contributes to folder and file names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingContext {
    pub kind: SourceKind,
    pub playlist: Option<String>,
    pub category: Option<String>,
    pub series: Option<String>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// Release year, four digits
    pub year: Option<String>,
}

impl NamingContext {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            playlist: None,
            category: None,
            series: None,
            season: None,
            episode: None,
            year: None,
        }
    }
}

const UNSAFE_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

pub struct Namer<'a> {
    cfg: &'a Naming,
}

impl<'a> Namer<'a> {
    pub fn new(cfg: &'a Naming) -> Self {
        Self { cfg }
    }

    /// `<base>/<components…>/<filename>.<ext>`
    pub fn output_path(
        &self,
        base: &Path,
        title: &str,
        scheduled_start: DateTime<Utc>,
        ctx: &NamingContext,
        format: Option<&str>,
    ) -> PathBuf {
        let dir = self.directory(base, ctx);
        let name = self.filename(title, scheduled_start, ctx);
        dir.join(format!("{}.{}", name, file_extension(format)))
    }

    pub fn directory(&self, base: &Path, ctx: &NamingContext) -> PathBuf {
        let mut path = base.to_path_buf();
        for component in self.cfg.path_structure.iter() {
            let segment = match component {
                PathComponent::Type => Some(type_folder(ctx.kind).to_string()),
                PathComponent::Playlist => ctx.playlist.as_deref().map(|n| self.filter(n)),
                PathComponent::Category => ctx.category.as_deref().map(|n| self.filter(n)),
                PathComponent::Series => match ctx.kind {
                    SourceKind::Episode => ctx.series.as_deref().map(|n| self.filter(n)),
                    _ => None,
                },
                PathComponent::Season => match (ctx.kind, ctx.season) {
                    (SourceKind::Episode, Some(season)) if season > 0 => {
                        Some(format!("Season {:02}", season))
                    }
                    _ => None,
                },
            };
            if let Some(segment) = segment.filter(|s| !s.is_empty()) {
                path.push(self.sanitize(&segment));
            }
        }
        path
    }

    pub fn filename(
        &self,
        title: &str,
        scheduled_start: DateTime<Utc>,
        ctx: &NamingContext,
    ) -> String {
        let metadata = &self.cfg.filename_metadata;
        let mut parts = vec![title.to_string()];

        if metadata.contains(&FilenameMetadata::Date) {
            parts.push(scheduled_start.format("%Y-%m-%d").to_string());
        }
        if metadata.contains(&FilenameMetadata::Time) {
            parts.push(scheduled_start.format("%H-%M").to_string());
        }
        if metadata.contains(&FilenameMetadata::Year) {
            if let Some(year) = ctx.kind_year() {
                parts.push(format!("({})", year));
            }
        }
        if ctx.kind == SourceKind::Episode {
            let mut season_episode = String::new();
            if metadata.contains(&FilenameMetadata::Season) {
                if let Some(season) = ctx.season.filter(|s| *s > 0) {
                    season_episode.push_str(&format!("S{:02}", season));
                }
            }
            if metadata.contains(&FilenameMetadata::Episode) {
                if let Some(episode) = ctx.episode.filter(|e| *e > 0) {
                    season_episode.push_str(&format!("E{:02}", episode));
                }
            }
            if !season_episode.is_empty() {
                parts.push(season_episode);
            }
        }

        self.sanitize(&parts.join(" "))
    }

    /// Drop-pattern filtering, enabled by `name_filter_enabled`
    pub fn filter(&self, name: &str) -> String {
        if !self.cfg.name_filter_enabled {
            return name.to_string();
        }
        let mut name = name.to_string();
        for pattern in self.cfg.name_filter_patterns.iter().filter(|p| !p.is_empty()) {
            name = name.replace(pattern.as_str(), "");
        }
        name.trim().to_string()
    }

    pub fn sanitize(&self, name: &str) -> String {
        let mut name = self.filter(name);

        if self.cfg.clean_special_chars {
            let replacement = self.cfg.replace_char.as_char();
            name = name
                .chars()
                .filter_map(|c| {
                    if UNSAFE_CHARS.contains(&c) || c.is_control() {
                        replacement
                    } else {
                        Some(c)
                    }
                })
                .collect();

            if self.cfg.remove_consecutive_chars {
                if let Some(r) = replacement {
                    name = collapse_runs(&name, r);
                }
            }
        }

        let name = name.trim();
        if name.is_empty() {
            "Unnamed".to_string()
        } else {
            name.to_string()
        }
    }
}

impl NamingContext {
    fn kind_year(&self) -> Option<&str> {
        match self.kind {
            SourceKind::Series | SourceKind::Episode => self.year.as_deref(),
            SourceKind::Channel => None,
        }
    }
}

fn type_folder(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Channel => "Channels",
        SourceKind::Episode => "Episodes",
        SourceKind::Series => "Series",
    }
}

fn collapse_runs(name: &str, c: char) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev: Option<char> = None;
    for ch in name.chars() {
        if ch == c && prev == Some(c) {
            continue;
        }
        out.push(ch);
        prev = Some(ch);
    }
    out
}

/// HLS input is captured into MPEG-TS.
pub fn file_extension(format: Option<&str>) -> &'static str {
    match format {
        Some("mp4") => "mp4",
        Some("mkv") => "mkv",
        Some("mov") => "mov",
        _ => "ts",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn episode_ctx() -> NamingContext {
        NamingContext {
            kind: SourceKind::Episode,
            playlist: Some("My IPTV [HD]".to_string()),
            category: Some("Drama".to_string()),
            series: Some("The Show: Returns".to_string()),
            season: Some(2),
            episode: Some(7),
            year: Some("2019".to_string()),
        }
    }

    #[test]
    fn test_default_layout_uses_type_folder() {
        let cfg = Naming::default();
        let namer = Namer::new(&cfg);
        let start = Utc.with_ymd_and_hms(2026, 1, 18, 20, 30, 0).unwrap();
        let path = namer.output_path(
            Path::new("/rec"),
            "Evening News",
            start,
            &NamingContext::new(SourceKind::Channel),
            None,
        );
        assert_eq!(path, PathBuf::from("/rec/Channels/Evening News.ts"));
    }

    #[test]
    fn test_episode_layout_and_tokens() {
        let cfg = Naming {
            path_structure: vec![
                PathComponent::Category,
                PathComponent::Series,
                PathComponent::Season,
            ],
            filename_metadata: vec![
                FilenameMetadata::Date,
                FilenameMetadata::Time,
                FilenameMetadata::Year,
                FilenameMetadata::Season,
                FilenameMetadata::Episode,
            ],
            ..Naming::default()
        };
        let namer = Namer::new(&cfg);
        let start = Utc.with_ymd_and_hms(2026, 1, 18, 20, 5, 0).unwrap();
        let path = namer.output_path(Path::new("/rec"), "Pilot", start, &episode_ctx(), Some("mkv"));
        assert_eq!(
            path,
            PathBuf::from("/rec/Drama/The Show Returns/Season 02/Pilot 2026-01-18 20-05 (2019) S02E07.mkv")
        );
    }

    #[test]
    fn test_series_and_season_skipped_for_channels() {
        let cfg = Naming {
            path_structure: vec![PathComponent::Series, PathComponent::Season],
            ..Naming::default()
        };
        let namer = Namer::new(&cfg);
        let mut ctx = episode_ctx();
        ctx.kind = SourceKind::Channel;
        assert_eq!(namer.directory(Path::new("/rec"), &ctx), PathBuf::from("/rec"));
    }

    #[test]
    fn test_name_filter_patterns() {
        let cfg = Naming {
            path_structure: vec![PathComponent::Playlist],
            name_filter_enabled: true,
            name_filter_patterns: vec!["[HD]".to_string()],
            ..Naming::default()
        };
        let namer = Namer::new(&cfg);
        assert_eq!(
            namer.directory(Path::new("/rec"), &episode_ctx()),
            PathBuf::from("/rec/My IPTV")
        );
    }

    #[test]
    fn test_replacement_and_collapse() {
        let cfg = Naming {
            replace_char: ReplaceChar::Dash,
            ..Naming::default()
        };
        assert_eq!(Namer::new(&cfg).sanitize("a/:b?c"), "a-b-c");

        let cfg = Naming {
            replace_char: ReplaceChar::Dash,
            remove_consecutive_chars: false,
            ..Naming::default()
        };
        assert_eq!(Namer::new(&cfg).sanitize("a/:b"), "a--b");

        let cfg = Naming {
            replace_char: ReplaceChar::Remove,
            ..Naming::default()
        };
        assert_eq!(Namer::new(&cfg).sanitize("a/:b"), "ab");
    }

    #[test]
    fn test_collapse_only_touches_replacement_char() {
        let cfg = Naming::default();
        // Spaces are the replacement char by default, dashes are left alone.
        assert_eq!(Namer::new(&cfg).sanitize("a  b--c"), "a b--c");
    }

    #[test]
    fn test_cleansing_disabled_keeps_unsafe_chars() {
        let cfg = Naming {
            clean_special_chars: false,
            ..Naming::default()
        };
        assert_eq!(Namer::new(&cfg).sanitize(" a:b "), "a:b");
    }

    #[test]
    fn test_empty_name_becomes_unnamed() {
        let cfg = Naming {
            replace_char: ReplaceChar::Remove,
            ..Naming::default()
        };
        assert_eq!(Namer::new(&cfg).sanitize("???"), "Unnamed");
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension(Some("m3u8")), "ts");
        assert_eq!(file_extension(Some("mp4")), "mp4");
        assert_eq!(file_extension(None), "ts");
    }
}
