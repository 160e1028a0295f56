use crate::error::{ArchiveError, Result};
use crate::ilog::portion::{LogPortion, PortionMeta, parse_date};
use chrono::NaiveDate;
use regex::Regex;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static LOG_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?P<network>[^_]+)_)?(?P<channel>.+)_(?P<date>[0-9]+)\.log$")
        .expect("log name pattern compiles")
});

/// A raw per-day log file found on disk, described by its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogInfo {
    pub path: PathBuf,
    pub name: String,
    pub network: String,
    pub channel: String,
    pub date: NaiveDate,
}

impl LogInfo {
    pub fn is_channel(&self) -> bool {
        self.channel.starts_with('#')
    }

    /// Read the file into a portion.
    pub fn load_portion(&self) -> Result<LogPortion> {
        let (lines, size) = load_raw_log(&self.path)?;
        Ok(LogPortion::new(
            PortionMeta {
                channel: self.channel.clone(),
                date: self.date,
                lines: lines.len(),
                name: self.name.clone(),
                network: self.network.clone(),
                size,
            },
            lines,
        ))
    }
}

/// Split `[<network>_]<channel>_<YYYYMMDD>.log` into its parts.
pub fn parse_log_name(name: &str) -> Result<(String, String, NaiveDate)> {
    let caps = LOG_NAME
        .captures(name)
        .ok_or_else(|| ArchiveError::UnrecognizedLogName(name.to_string()))?;
    let network = caps
        .name("network")
        .map_or_else(String::new, |m| m.as_str().to_string());
    let channel = caps["channel"].to_string();
    let date = parse_date(&caps["date"])?;
    Ok((network, channel, date))
}

/// Every regular file in `dir`, sorted by name. Any unrecognized name fails the whole batch.
pub fn discover_logs(dir: &Path) -> Result<Vec<LogInfo>> {
    let mut logs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().into_string().map_err(|raw| {
            ArchiveError::UnrecognizedLogName(raw.to_string_lossy().into_owned())
        })?;
        let (network, channel, date) = parse_log_name(&name)?;
        logs.push(LogInfo {
            path: entry.path(),
            name,
            network,
            channel,
            date,
        });
    }
    logs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(logs)
}

/// Lines of a raw log without their `\n` delimiters, and the summed line length.
pub fn load_raw_log(path: &Path) -> Result<(Vec<Vec<u8>>, usize)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    let mut size = 0usize;
    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        size += line.len();
        lines.push(line);
    }
    Ok((lines, size))
}
