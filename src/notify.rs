//! Report delivery

use crate::report::{Report, ReportFormat};
use anyhow::Result;
use log::info;

/// Delivers one cycle's report. Delivery is at most once: callers log a
/// failure and move on.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier {
    fn send(&self, report: &Report, subject: &str) -> Result<()>;
}

/// Writes the rendered report through the logger.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    pub format: ReportFormat,
}

impl LogNotifier {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    /// Body logged for one report.
    pub fn body(&self, report: &Report) -> String {
        report.render(self.format)
    }
}

impl Notifier for LogNotifier {
    fn send(&self, report: &Report, subject: &str) -> Result<()> {
        if report.is_empty() {
            info!("{}: no signals", subject);
        }
        info!("{}\n{}", subject, self.body(report));
        Ok(())
    }
}
