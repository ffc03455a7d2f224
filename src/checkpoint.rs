//! Versioned JSON snapshots of a single-process search.
//!
//! Saving renames the previous file to `<path>.bak` before writing, so a
//! failed write still leaves the last good checkpoint behind.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enumerator::{EnumStats, EnumeratorContext, SearchParams};
use crate::error::CheckpointError;
use crate::evaluator::Limits;
use crate::queue::QueueSnapshot;
use crate::rng::SplitMix64;

pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub run_id: Uuid,
    pub saved_at: DateTime<Utc>,
    pub params: SearchParams,
    pub limits: Limits,
    pub stats: EnumStats,
    /// Present only for randomized searches.
    pub rng: Option<SplitMix64>,
    pub queue: QueueSnapshot,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

/// `<path>.bak`, next to the checkpoint.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

impl Checkpoint {
    pub fn capture(ctx: &EnumeratorContext, queue: QueueSnapshot) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            run_id: ctx.run_id,
            saved_at: Utc::now(),
            params: ctx.params.clone(),
            limits: ctx.settings.limits,
            stats: ctx.stats.clone(),
            rng: ctx.rng,
            queue,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        let write_err = |source| CheckpointError::Write {
            path: path.to_path_buf(),
            source,
        };
        if path.exists() {
            fs::rename(path, backup_path(path)).map_err(write_err)?;
        }
        let file = File::create(path).map_err(write_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|e| write_err(e.into()))?;
        writer.flush().map_err(write_err)?;
        writer.get_ref().sync_all().map_err(write_err)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        let contents = fs::read_to_string(path).map_err(|source| CheckpointError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let decode_err = |source| CheckpointError::Decode {
            path: path.to_path_buf(),
            source,
        };
        let probe: VersionProbe = serde_json::from_str(&contents).map_err(decode_err)?;
        if probe.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: probe.version,
                expected: CHECKPOINT_VERSION,
            });
        }
        serde_json::from_str(&contents).map_err(decode_err)
    }
}
