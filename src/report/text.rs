use std::io::Write;

use crate::{GlobalScanResult, error::Result, report::ReportSink};

/// Plain-text listing of icon hits followed by the suspected users.
pub struct TextReport<W: Write> {
    writer: W,
    icon_name: String,
}

impl<W: Write> TextReport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            icon_name: "reference".into(),
        }
    }

    pub fn with_icon_name(mut self, name: impl Into<String>) -> Self {
        self.icon_name = name.into();
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for TextReport<W> {
    fn emit(&mut self, result: &GlobalScanResult) -> Result<()> {
        let out = &mut self.writer;

        writeln!(out, "Images with '{}' icon:", self.icon_name)?;
        for path in &result.images_with_icon {
            writeln!(out, "{}", path.display())?;
        }

        writeln!(out)?;
        writeln!(
            out,
            "Suspected Fake Users ({} of {} scanned):",
            result.suspected_users.len(),
            result.users_scanned
        )?;

        for user in &result.suspected_users {
            writeln!(out, "User: {}", user.user)?;
            writeln!(
                out,
                "Flagged {} out of {} images:",
                user.flagged_count(),
                user.total_images
            )?;
            for (name, reasons) in user.flags.iter() {
                let reasons = reasons.iter().map(|r| r.to_string()).collect::<Vec<_>>();
                writeln!(out, " - {} ({})", name, reasons.join(", "))?;
            }
            if user.undecodable > 0 {
                writeln!(out, "Unreadable files: {}", user.undecodable)?;
            }
            for reason in &user.reasons {
                writeln!(out, "Reason: {reason}.")?;
            }
        }

        out.flush()?;
        Ok(())
    }
}
