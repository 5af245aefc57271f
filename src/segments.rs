use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use api::recorder::RecordingStatus;

use crate::catalog::OutputProfile;
use crate::context::Context;
use crate::error::RecordingError;
use crate::naming::{file_extension, Namer, NamingContext};
use crate::notify::{self, Notification};
use crate::recording::{Recording, Segment};
use crate::service::{RecordingsService, SegmentsService};

type Result<T> = std::result::Result<T, RecordingError>;

pub const MANIFEST_NAME: &str = "concat_list.txt";

/// Owns the files of a recording: segment working directory, final output
/// and the merge between them
pub struct SegmentManager<'a> {
    ctx: &'a Context,
}

impl<'a> SegmentManager<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    pub fn temp_dir(&self, recording_id: Uuid) -> PathBuf {
        self.ctx
            .config
            .recorder
            .temp_dir()
            .join(format!("recording_{}", recording_id))
    }

    pub async fn profile(&self, recording: &Recording) -> Option<OutputProfile> {
        let id = recording.profile_id.as_deref()?;
        match self.ctx.catalog.resolve_profile(id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(recording_id = %recording.id, "[segments] profile lookup failed: {}", e);
                None
            }
        }
    }

    pub async fn output_path(&self, recording: &Recording) -> PathBuf {
        let naming = match self.ctx.catalog.resolve_source(&recording.source).await {
            Ok(Some(source)) => source.naming(),
            Ok(None) => NamingContext::new(recording.source.kind),
            Err(e) => {
                warn!(recording_id = %recording.id, "[segments] source lookup failed: {}", e);
                NamingContext::new(recording.source.kind)
            }
        };
        let profile = self.profile(recording).await;
        Namer::new(&self.ctx.config.naming).output_path(
            &self.ctx.config.recorder.recordings_dir,
            &recording.title,
            recording.scheduled_start,
            &naming,
            profile.as_ref().and_then(|p| p.format.as_deref()),
        )
    }

    /// Next segment of `recording`, numbered `max + 1`, in status `recording`
    pub async fn create_segment(
        &self,
        recording: &Recording,
        format: Option<&str>,
    ) -> Result<Segment> {
        let dir = self.temp_dir(recording.id);
        fs::create_dir_all(&dir).await?;

        let sequence = SegmentsService::next_sequence(&self.ctx.db, recording.id).await?;
        let path = dir.join(format!(
            "segment_{:03}.{}",
            sequence,
            file_extension(format)
        ));
        let segment = SegmentsService::create(
            &self.ctx.db,
            recording.id,
            sequence,
            &path,
            self.ctx.now(),
        )
        .await?;

        debug!(
            recording_id = %recording.id,
            sequence,
            path = %path.display(),
            "[segments] created"
        );
        Ok(segment)
    }

    /// Current size on disk, stored on the segment; `None` while the file is absent
    pub async fn refresh_size(&self, segment: &Segment) -> Result<Option<i64>> {
        match fs::metadata(&segment.file_path).await {
            Ok(meta) => {
                let size = meta.len() as i64;
                SegmentsService::update_size(&self.ctx.db, segment.id, size).await?;
                Ok(Some(size))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Combine the completed segments into the output file.
    ///
    /// `false` when there was nothing to merge or the concatenation failed;
    /// the recording status is never touched.
    pub async fn merge(&self, recording: &Recording) -> Result<bool> {
        let segments = SegmentsService::completed(&self.ctx.db, recording.id).await?;
        if segments.is_empty() {
            error!(recording_id = %recording.id, "[segments] no completed segments");
            return Ok(false);
        }

        let output = self.output_path(recording).await;
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await?;
        }

        if let [segment] = segments.as_slice() {
            move_file(&segment.file_path, &output).await?;
            let size = match segment.file_size_bytes {
                Some(size) => Some(size),
                None => file_size(&output).await,
            };
            RecordingsService::set_output(&self.ctx.db, recording.id, &output, size, self.ctx.now())
                .await?;
            self.remove_temp_dir(recording.id).await;
            info!(
                recording_id = %recording.id,
                output = %output.display(),
                "[segments] moved single segment"
            );
            return Ok(true);
        }

        let manifest = output
            .parent()
            .map(|p| p.join(MANIFEST_NAME))
            .unwrap_or_else(|| PathBuf::from(MANIFEST_NAME));
        fs::write(&manifest, build_manifest(&segments)).await?;

        let result = self.ctx.concat.concat(&manifest, &output).await;
        if let Err(e) = fs::remove_file(&manifest).await {
            debug!("[segments] manifest cleanup: {}", e);
        }

        if let Err(e) = result {
            error!(
                recording_id = %recording.id,
                "[segments] {}",
                RecordingError::MergeFailure(e.to_string())
            );
            return Ok(false);
        }

        let size = file_size(&output).await;
        RecordingsService::set_output(&self.ctx.db, recording.id, &output, size, self.ctx.now())
            .await?;

        for segment in segments.iter() {
            remove_if_exists(&segment.file_path).await;
        }
        self.remove_temp_dir(recording.id).await;

        info!(
            recording_id = %recording.id,
            count = segments.len(),
            output = %output.display(),
            "[segments] merged"
        );
        Ok(true)
    }

    /// Remove output and segment files, prune the output directory if it
    /// became empty, then tombstone the recording
    pub async fn delete_recording(&self, recording: &Recording) -> Result<()> {
        if let Some(output) = recording.output_path.as_deref() {
            remove_if_exists(output).await;
        }

        for segment in SegmentsService::list(&self.ctx.db, recording.id).await? {
            remove_if_exists(&segment.file_path).await;
        }
        self.remove_temp_dir(recording.id).await;

        let dir = match recording.output_path.as_deref().and_then(Path::parent) {
            Some(dir) => dir.to_path_buf(),
            None => {
                let output = self.output_path(recording).await;
                output
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default()
            }
        };
        if dir != self.ctx.config.recorder.recordings_dir && is_empty_dir(&dir).await {
            if let Err(e) = fs::remove_dir(&dir).await {
                debug!("[segments] remove {}: {}", dir.display(), e);
            }
        }

        RecordingsService::mark_deleted(&self.ctx.db, recording.id, self.ctx.now()).await?;
        info!(recording_id = %recording.id, "[segments] recording deleted");
        Ok(())
    }

    async fn remove_temp_dir(&self, recording_id: Uuid) {
        let dir = self.temp_dir(recording_id);
        if is_empty_dir(&dir).await {
            if let Err(e) = fs::remove_dir(&dir).await {
                debug!("[segments] remove {}: {}", dir.display(), e);
            }
        }
    }
}

/// `ProcessRecording`: merge the segments of a completed recording and
/// notify its owner
pub async fn process_recording(ctx: &Context, id: Uuid) -> Result<()> {
    let Some(recording) = RecordingsService::get(&ctx.db, id).await? else {
        debug!(recording_id = %id, "[segments] recording gone, nothing to process");
        return Ok(());
    };
    info!(recording_id = %id, status = %recording.status, "[segments] processing");

    let manager = SegmentManager::new(ctx);
    let segments = SegmentsService::list(&ctx.db, id).await?;
    if !segments.is_empty() && !manager.merge(&recording).await? {
        error!(
            recording_id = %id,
            "[segments] {}",
            RecordingError::MergeFailure("no output produced".to_string())
        );
        return Ok(());
    }

    if recording.status == RecordingStatus::Completed {
        notify::deliver(
            ctx.notifier.as_ref(),
            Notification::completed(recording.id, &recording.owner, &recording.title),
        )
        .await;
    }
    Ok(())
}

/// ffmpeg concat demuxer list, one `file '<path>'` per line
pub fn build_manifest(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| {
            format!(
                "file '{}'",
                s.file_path.to_string_lossy().replace('\'', "'\\''")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rename, falling back to copy and remove across devices
pub async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!("[segments] rename {} failed ({}), copying", from.display(), e);
            fs::copy(from, to).await?;
            fs::remove_file(from).await
        }
    }
}

async fn file_size(path: &Path) -> Option<i64> {
    fs::metadata(path).await.ok().map(|m| m.len() as i64)
}

async fn remove_if_exists(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("[segments] remove {}: {}", path.display(), e),
    }
}

async fn is_empty_dir(dir: &Path) -> bool {
    match fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(_) => false,
    }
}
