use crate::error::{ArchiveError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Date form used inside serialized portion metadata.
pub const ARCHIVE_DATE_FMT: &str = "%Y%m%d";
/// Date form used on the command line and in reports.
pub const DISPLAY_DATE_FMT: &str = "%Y-%m-%d";

/// Parse a day in either `YYYYMMDD` or `YYYY-MM-DD` form; the first form that matches wins.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    [ARCHIVE_DATE_FMT, DISPLAY_DATE_FMT]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| ArchiveError::InvalidDate(raw.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortionMeta {
    pub channel: String,
    pub date: NaiveDate,
    pub lines: usize,
    pub name: String,
    pub network: String,
    pub size: usize,
}

/// Wire shape of the metadata blob. Field order is the serialized key order.
#[derive(Debug, Serialize, Deserialize)]
struct WireMeta {
    #[serde(default)]
    channel: Option<String>,
    date: String,
    #[serde(default)]
    lines: usize,
    name: String,
    #[serde(default)]
    network: Option<String>,
    #[serde(default)]
    size: usize,
}

impl PortionMeta {
    /// Encode as a single-line JSON record.
    pub fn encode(&self) -> Result<String> {
        let wire = WireMeta {
            channel: Some(self.channel.clone()),
            date: self.date.format(ARCHIVE_DATE_FMT).to_string(),
            lines: self.lines,
            name: self.name.clone(),
            network: Some(self.network.clone()),
            size: self.size,
        };
        serde_json::to_string(&wire).map_err(|err| ArchiveError::Format(err.to_string()))
    }

    pub fn decode(blob: &str) -> Result<Self> {
        let wire: WireMeta = serde_json::from_str(blob.trim())
            .map_err(|err| ArchiveError::Format(format!("{err} in `{}`", blob.trim())))?;
        Ok(Self {
            channel: wire.channel.unwrap_or_default(),
            date: parse_date(&wire.date)?,
            lines: wire.lines,
            name: wire.name,
            network: wire.network.unwrap_or_default(),
            size: wire.size,
        })
    }
}

/// One imported day: metadata plus the raw lines without their `\n` delimiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPortion {
    pub meta: PortionMeta,
    pub lines: Vec<Vec<u8>>,
}

impl LogPortion {
    pub fn new(meta: PortionMeta, lines: Vec<Vec<u8>>) -> Self {
        Self { meta, lines }
    }

    pub fn byte_len(&self) -> usize {
        self.lines.iter().map(Vec::len).sum()
    }

    /// SHA-256 of the content as the original file held it, so it can be checked against the raw log.
    pub fn content_digest(&self) -> String {
        let mut hasher = Sha256::new();
        for line in &self.lines {
            hasher.update(line);
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}
