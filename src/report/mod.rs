pub mod text;

use std::io::Write;

use serde::Serialize;

use crate::{FlagReason, GlobalScanResult, SuspicionReason, UserScanResult, error::Result};

pub use text::TextReport;

/// Receives the finished verdicts of a scan run.
pub trait ReportSink {
    fn emit(&mut self, result: &GlobalScanResult) -> Result<()>;
}

#[derive(Serialize)]
pub struct JsonReport {
    pub users_scanned: usize,
    pub images_with_icon: Vec<String>,
    pub suspected_users: Vec<UserReportSection>,
}

#[derive(Serialize)]
pub struct UserReportSection {
    pub user: String,
    pub folder: String,
    pub total_images: usize,
    pub undecodable: usize,
    pub flagged_images: Vec<FlaggedImageSection>,
    pub duplicate_count: usize,
    pub variation_pairs: usize,
    pub reasons: Vec<SuspicionReason>,
}

#[derive(Serialize)]
pub struct FlaggedImageSection {
    pub name: String,
    pub reasons: Vec<FlagReason>,
}

impl From<&UserScanResult> for UserReportSection {
    fn from(user: &UserScanResult) -> Self {
        Self {
            user: user.user.clone(),
            folder: user.folder.display().to_string(),
            total_images: user.total_images,
            undecodable: user.undecodable,
            flagged_images: user
                .flags
                .iter()
                .map(|(name, reasons)| FlaggedImageSection {
                    name: name.to_string(),
                    reasons: reasons.iter().copied().collect(),
                })
                .collect(),
            duplicate_count: user.duplicate_count,
            variation_pairs: user.variation_pairs,
            reasons: user.reasons.clone(),
        }
    }
}

impl From<&GlobalScanResult> for JsonReport {
    fn from(result: &GlobalScanResult) -> Self {
        Self {
            users_scanned: result.users_scanned,
            images_with_icon: result
                .images_with_icon
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            suspected_users: result.suspected_users.iter().map(UserReportSection::from).collect(),
        }
    }
}

impl JsonReport {
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Writes the scan as pretty-printed JSON.
pub struct JsonSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for JsonSink<W> {
    fn emit(&mut self, result: &GlobalScanResult) -> Result<()> {
        let json = JsonReport::from(result).to_json()?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }
}
