use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::commands::{CommandReport, ReportTable};
use crate::error::ArchiveError;
use crate::ilog::combined::CombinedLogfile;
use crate::ilog::portion::DISPLAY_DATE_FMT;

const DIGEST_PREFIX_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct InspectOptions {
    pub file: PathBuf,
    pub detail: bool,
}

pub fn run(opts: &InspectOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("inspect");
    let mut archive = CombinedLogfile::open(&opts.file)
        .with_context(|| format!("failed to read archive {}", opts.file.display()))?;

    let (start, end) = match archive.get_range() {
        Ok(range) => range,
        Err(ArchiveError::EmptyArchive) => {
            report.issue(format!("{} has no portions", opts.file.display()));
            return Ok(report);
        }
        Err(err) => return Err(err.into()),
    };

    let file_name = archive
        .path()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut summary = ReportTable::new(["property", "value"]);
    summary.row(["file".to_string(), file_name]);
    summary.row(["channel".to_string(), archive.channel().to_string()]);
    summary.row(["network".to_string(), archive.network().to_string()]);
    summary.row(["portions".to_string(), archive.len().to_string()]);
    summary.row(["lines".to_string(), archive.total_lines().to_string()]);
    summary.row(["start".to_string(), start.format(DISPLAY_DATE_FMT).to_string()]);
    summary.row(["end".to_string(), end.format(DISPLAY_DATE_FMT).to_string()]);
    summary.row([
        "line count discrepancies".to_string(),
        archive.discrepancies().len().to_string(),
    ]);
    report.table(summary);

    for d in archive.discrepancies() {
        report.detail(format!(
            "discrepancy portion={} date={} declared={} actual={}",
            d.name,
            d.date.format(DISPLAY_DATE_FMT),
            d.declared,
            d.actual
        ));
    }

    if opts.detail {
        let mut table = ReportTable::new([
            "portion file",
            "network",
            "channel",
            "date",
            "lines",
            "bytes",
            "sha256",
        ]);
        let mut total_lines = 0usize;
        let mut total_bytes = 0usize;
        for portion in archive.portions() {
            let bytes = portion.byte_len();
            total_lines += portion.lines.len();
            total_bytes += bytes;
            let digest = portion.content_digest();
            table.row([
                portion.meta.name.clone(),
                portion.meta.network.clone(),
                portion.meta.channel.clone(),
                portion.meta.date.format(DISPLAY_DATE_FMT).to_string(),
                portion.lines.len().to_string(),
                bytes.to_string(),
                digest[..DIGEST_PREFIX_LEN].to_string(),
            ]);
        }
        table.row([
            String::new(),
            String::new(),
            String::new(),
            "total:".to_string(),
            total_lines.to_string(),
            total_bytes.to_string(),
            String::new(),
        ]);
        report.table(table);
    }

    Ok(report)
}
