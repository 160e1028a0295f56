use crate::error::ArchiveError;
use crate::ilog::combined::{CombinedLogfile, clean_stale_temp_files};
use crate::ilog::rawlog::{LogInfo, discover_logs};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

/// Temp files younger than this may belong to a concurrent import.
const STALE_TEMP_AGE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub src_dir: PathBuf,
    pub output_dir: PathBuf,
    pub include_all: bool,
    pub parallel: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Written { portions: usize, lines: usize },
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ChannelImportOutcome {
    pub channel: String,
    pub archive_path: PathBuf,
    pub raw_logs: usize,
    pub status: ChannelStatus,
}

#[derive(Debug, Clone, Default)]
pub struct ImportOutcome {
    pub discovered: usize,
    pub stale_temp_files_removed: usize,
    pub channels: Vec<ChannelImportOutcome>,
}

impl ImportOutcome {
    pub fn failed(&self) -> usize {
        self.channels
            .iter()
            .filter(|c| matches!(c.status, ChannelStatus::Failed(_)))
            .count()
    }
}

pub fn archive_path_for(output_dir: &Path, channel: &str) -> PathBuf {
    output_dir.join(format!("{channel}.log"))
}

/// Group raw logs per channel; non-channel streams only when `include_all`.
pub fn group_by_channel(logs: Vec<LogInfo>, include_all: bool) -> BTreeMap<String, Vec<LogInfo>> {
    let mut out: BTreeMap<String, Vec<LogInfo>> = BTreeMap::new();
    for log in logs {
        if include_all || log.is_channel() {
            out.entry(log.channel.clone()).or_default().push(log);
        }
    }
    out
}

/// Merge `logs` into the archive at `archive_path`, creating it if absent.
pub fn archive_channel(logs: &[LogInfo], archive_path: &Path) -> Result<CombinedLogfile> {
    let mut archive = CombinedLogfile::new(archive_path);
    archive
        .parse()
        .with_context(|| format!("failed to parse archive {}", archive_path.display()))?;

    for log in logs {
        let portion = log
            .load_portion()
            .with_context(|| format!("failed to read {}", log.path.display()))?;
        archive
            .add_portion(portion)
            .with_context(|| format!("failed to merge {}", log.path.display()))?;
    }

    archive
        .write(None)
        .with_context(|| format!("failed to write {}", archive_path.display()))?;
    Ok(archive)
}

fn import_channel(channel: &str, logs: &[LogInfo], output_dir: &Path) -> ChannelImportOutcome {
    let archive_path = archive_path_for(output_dir, channel);
    info!(channel, raw_logs = logs.len(), "reading portions");

    let status = match archive_channel(logs, &archive_path) {
        Ok(archive) => ChannelStatus::Written {
            portions: archive.len(),
            lines: archive.total_lines(),
        },
        Err(err) if matches!(
            err.downcast_ref::<ArchiveError>(),
            Some(ArchiveError::EmptyArchive)
        ) =>
        {
            warn!(channel, "nothing to write");
            ChannelStatus::Skipped("no portions".to_string())
        }
        Err(err) => {
            error!(channel, path = %archive_path.display(), "channel import failed: {err:#}");
            ChannelStatus::Failed(format!("{err:#}"))
        }
    };

    ChannelImportOutcome {
        channel: channel.to_string(),
        archive_path,
        raw_logs: logs.len(),
        status,
    }
}

/// Import every raw log in `src_dir`, one archive per channel, on a bounded worker pool.
/// A failing channel is recorded in its outcome and never stops the others.
pub fn run(opts: &ImportOptions) -> Result<ImportOutcome> {
    fs::create_dir_all(&opts.output_dir)
        .with_context(|| format!("failed to create {}", opts.output_dir.display()))?;
    let stale_temp_files_removed = clean_stale_temp_files(&opts.output_dir, STALE_TEMP_AGE)
        .with_context(|| format!("failed to scan {}", opts.output_dir.display()))?;

    let logs = discover_logs(&opts.src_dir)
        .with_context(|| format!("failed to discover logs in {}", opts.src_dir.display()))?;
    let discovered = logs.len();
    info!(discovered, "discovered raw logs");

    let groups = group_by_channel(logs, opts.include_all)
        .into_iter()
        .collect::<Vec<_>>();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.parallel)
        .thread_name(|i| format!("ilog-import-{i}"))
        .build()
        .context("failed to build import worker pool")?;

    let channels = pool.install(|| {
        groups
            .par_iter()
            .map(|(channel, logs)| import_channel(channel, logs, &opts.output_dir))
            .collect::<Vec<_>>()
    });

    Ok(ImportOutcome {
        discovered,
        stale_temp_files_removed,
        channels,
    })
}
