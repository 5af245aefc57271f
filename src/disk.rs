use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use regex::Regex;
use sysinfo::Disks;

use crate::catalog::OutputProfile;
use crate::recording::Recording;

pub const DEFAULT_BYTES_PER_SECOND: u64 = 250_000;

/// Free space of the volume holding a path
pub trait DiskSpace: Send + Sync {
    fn free_bytes(&self, path: &Path) -> Result<u64>;
}

/// Reads the mount table through sysinfo and picks the longest mount point
/// that prefixes the path
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoDisk;

impl DiskSpace for SysinfoDisk {
    fn free_bytes(&self, path: &Path) -> Result<u64> {
        let path = absolute(path);
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|d| path.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .map(|d| d.available_space())
            .ok_or_else(|| anyhow!("no mounted volume holds {}", path.display()))
    }
}

fn absolute(path: &Path) -> PathBuf {
    // The directory may not exist yet; walk up to the closest existing ancestor.
    let mut dir = path.to_path_buf();
    loop {
        if let Ok(canonical) = dir.canonicalize() {
            return canonical;
        }
        if !dir.pop() {
            return std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf());
        }
    }
}

fn bitrate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-b:v\s+(\d+)k").expect("bitrate pattern"))
}

/// `-b:v <N>k` converted to bytes per second, `default` when absent
pub fn bytes_per_second(profile: Option<&OutputProfile>, default: u64) -> u64 {
    profile
        .and_then(|p| bitrate_regex().captures(&p.args))
        .and_then(|c| c[1].parse::<u64>().ok())
        .map(|kbps| kbps.saturating_mul(1000) / 8)
        .unwrap_or(default)
}

pub fn estimate_required_bytes(
    recording: &Recording,
    profile: Option<&OutputProfile>,
    default_bytes_per_second: u64,
) -> u64 {
    let seconds = recording.total_duration_seconds().max(0) as u64;
    seconds.saturating_mul(bytes_per_second(profile, default_bytes_per_second))
}

/// Free space must strictly exceed `required × margin`
pub fn has_enough_disk_space(free: u64, required: u64, margin: f64) -> bool {
    free as f64 > required as f64 * margin
}
