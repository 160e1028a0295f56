use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{CommandReport, ReportTable};
use crate::ilog::config::IlogConfig;
use crate::ilog::import::{self, ChannelStatus, ImportOptions};

#[derive(Debug, Clone)]
pub struct ImportCommandOptions {
    pub dir: PathBuf,
    pub output: PathBuf,
    pub all: bool,
    pub parallel: Option<usize>,
}

pub fn resolve_options(opts: &ImportCommandOptions, cfg: &IlogConfig) -> ImportOptions {
    ImportOptions {
        src_dir: opts.dir.clone(),
        output_dir: opts.output.clone(),
        include_all: opts.all || cfg.import.all,
        parallel: opts.parallel.unwrap_or(cfg.import.parallel),
    }
}

pub fn run(opts: &ImportCommandOptions, cfg: &IlogConfig) -> Result<CommandReport> {
    let mut report = CommandReport::new("import");
    let resolved = resolve_options(opts, cfg);
    if resolved.parallel == 0 {
        report.issue("invalid --parallel: must be >= 1");
        return Ok(report);
    }

    report.detail(format!("src_dir={}", resolved.src_dir.display()));
    report.detail(format!("output_dir={}", resolved.output_dir.display()));
    report.detail(format!("parallel={}", resolved.parallel));
    report.detail(format!("include_all={}", resolved.include_all));

    let outcome = import::run(&resolved)?;
    report.detail(format!("discovered={}", outcome.discovered));
    report.detail(format!("channels={}", outcome.channels.len()));
    report.detail(format!("failed={}", outcome.failed()));
    if outcome.stale_temp_files_removed > 0 {
        report.detail(format!(
            "stale_temp_files_removed={}",
            outcome.stale_temp_files_removed
        ));
    }

    let mut table = ReportTable::new(["channel", "raw logs", "portions", "lines", "status"]);
    for channel in &outcome.channels {
        let (portions, lines, status) = match &channel.status {
            ChannelStatus::Written { portions, lines } => {
                (portions.to_string(), lines.to_string(), "written".to_string())
            }
            ChannelStatus::Skipped(reason) => (String::new(), String::new(), format!("skipped: {reason}")),
            ChannelStatus::Failed(_) => (String::new(), String::new(), "failed".to_string()),
        };
        table.row([
            channel.channel.clone(),
            channel.raw_logs.to_string(),
            portions,
            lines,
            status,
        ]);
        if let ChannelStatus::Failed(reason) = &channel.status {
            report.issue(format!(
                "could not write {}: {reason}",
                channel.archive_path.display()
            ));
        }
    }
    report.table(table);

    Ok(report)
}
