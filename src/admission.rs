use anyhow::Result;
use tracing::{debug, error, warn};

use api::recorder::SourceKind;

use crate::catalog::Catalog;
use crate::recording::Recording;

/// Decides whether a recording may claim an upstream connection now.
///
/// Fails closed: any error while asking the catalog denies the start.
pub async fn can_start(catalog: &dyn Catalog, recording: &Recording) -> bool {
    match check(catalog, recording).await {
        Ok(admitted) => admitted,
        Err(e) => {
            error!(
                recording_id = %recording.id,
                "[admission] capacity check failed: {}", e
            );
            false
        }
    }
}

async fn check(catalog: &dyn Catalog, recording: &Recording) -> Result<bool> {
    if recording.profile_id.is_none() {
        warn!(recording_id = %recording.id, "[admission] no output profile");
        return Ok(false);
    }

    match recording.source.kind {
        SourceKind::Series => Ok(true),
        SourceKind::Channel | SourceKind::Episode => {
            let Some(source) = catalog.resolve_source(&recording.source).await? else {
                warn!(recording_id = %recording.id, "[admission] source not found");
                return Ok(false);
            };
            let Some(owner) = source.content_source() else {
                warn!(recording_id = %recording.id, "[admission] source has no content source");
                return Ok(false);
            };
            let Some(content) = catalog.content_source(owner).await? else {
                warn!(
                    recording_id = %recording.id,
                    content_source = owner,
                    "[admission] content source not found"
                );
                return Ok(false);
            };

            if content.profiles_enabled {
                let free = catalog.profiles_with_capacity(&content).await?;
                debug!(
                    recording_id = %recording.id,
                    "[admission] {} profile(s) with capacity", free
                );
                return Ok(free > 0);
            }

            if content.connection_counted {
                let status = catalog.connection_status(&content).await?;
                debug!(
                    recording_id = %recording.id,
                    "[admission] connections {}/{}", status.active, status.max
                );
                return Ok(status.active < status.max);
            }

            Ok(true)
        }
    }
}
