//! Report formatting
//!
//! Groups one cycle's signal records by category in the fixed category order
//! and renders them as plain text or HTML.

use crate::config::ReportConfig;
use crate::signals::coordinator::CycleOutcome;
use crate::signals::core::{Diagnostics, SignalCategory, SignalRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Output flavour handed to the notifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    Text,
    Html,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCounts {
    pub considered: usize,
    pub skipped: usize,
    pub filtered_out: usize,
    pub failed: usize,
}

impl From<&CycleOutcome> for ReportCounts {
    fn from(outcome: &CycleOutcome) -> Self {
        Self {
            considered: outcome.considered,
            skipped: outcome.skipped,
            filtered_out: outcome.filtered_out,
            failed: outcome.failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    pub category: SignalCategory,
    pub records: Vec<SignalRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub sections: Vec<ReportSection>,
    pub counts: ReportCounts,
    pub disclaimer: Vec<String>,
}

/// Rating desc, then score desc, then code asc. Missing values sort last.
fn record_order(a: &SignalRecord, b: &SignalRecord) -> Ordering {
    let (da, db) = (&a.diagnostics, &b.diagnostics);
    db.rating
        .cmp(&da.rating)
        .then_with(|| match (da.score, db.score) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.code.cmp(&b.code))
}

impl Report {
    pub fn build(records: Vec<SignalRecord>, counts: ReportCounts, config: &ReportConfig) -> Self {
        let mut grouped: BTreeMap<SignalCategory, Vec<SignalRecord>> = BTreeMap::new();
        for record in records {
            grouped.entry(record.category).or_default().push(record);
        }

        let sections = SignalCategory::ALL
            .iter()
            .filter_map(|&category| {
                let mut records = grouped.remove(&category).unwrap_or_default();
                if records.is_empty() && !config.show_empty_categories {
                    return None;
                }
                records.sort_by(record_order);
                Some(ReportSection { category, records })
            })
            .collect();

        Self {
            sections,
            counts,
            disclaimer: config.disclaimer.clone(),
        }
    }

    pub fn signal_count(&self) -> usize {
        self.sections.iter().map(|s| s.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.signal_count() == 0
    }

    pub fn render(&self, format: ReportFormat) -> String {
        match format {
            ReportFormat::Text => self.render_text(),
            ReportFormat::Html => self.render_html(),
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let c = &self.counts;
        let _ = writeln!(
            out,
            "Considered {} instruments ({} rows skipped, {} outside price band, {} failed)",
            c.considered, c.skipped, c.filtered_out, c.failed
        );

        for section in &self.sections {
            let _ = writeln!(out);
            let _ = writeln!(out, "[{}] {}", section.category, section.records.len());
            if section.records.is_empty() {
                let _ = writeln!(out, "  (none)");
            }
            for record in &section.records {
                let _ = writeln!(
                    out,
                    "  {} {} {:.1} {}",
                    record.code,
                    record.name,
                    record.price,
                    describe(&record.diagnostics)
                );
            }
        }

        let _ = writeln!(out);
        for line in &self.disclaimer {
            let _ = writeln!(out, "{}", line);
        }
        out
    }

    pub fn render_html(&self) -> String {
        let mut out = String::from("<html><body>\n");
        let c = &self.counts;
        let _ = writeln!(
            out,
            "<p>Considered {} instruments ({} rows skipped, {} outside price band, {} failed)</p>",
            c.considered, c.skipped, c.filtered_out, c.failed
        );

        for section in &self.sections {
            let _ = writeln!(
                out,
                "<h3>{} ({})</h3>",
                escape_html(section.category.label()),
                section.records.len()
            );
            out.push_str("<table border=\"1\">\n");
            out.push_str("<tr><th>Code</th><th>Name</th><th>Price</th><th>Details</th></tr>\n");
            for record in &section.records {
                let _ = writeln!(
                    out,
                    "<tr><td>{}</td><td>{}</td><td>{:.1}</td><td>{}</td></tr>",
                    escape_html(&record.code),
                    escape_html(&record.name),
                    record.price,
                    escape_html(&describe(&record.diagnostics))
                );
            }
            out.push_str("</table>\n");
        }

        out.push_str("<hr>\n");
        for line in &self.disclaimer {
            let _ = writeln!(out, "<p><small>{}</small></p>", escape_html(line));
        }
        out.push_str("</body></html>\n");
        out
    }
}

/// Subject line for one cycle, e.g. `Signal report 20240501 1030`.
pub fn subject(prefix: &str, date: &str, time: &str) -> String {
    format!("{} {} {}", prefix, date, time)
}

fn describe(d: &Diagnostics) -> String {
    let mut parts = Vec::new();
    if let Some(rsi) = d.rsi {
        parts.push(format!("RSI {:.1}", rsi));
    }
    if let Some(histogram) = d.macd_histogram {
        parts.push(format!("MACD hist {:.3}", histogram));
    }
    if let Some(level) = d.level {
        parts.push(format!("level {:.2}", level));
    }
    if let Some(ratio) = d.volume_ratio {
        parts.push(format!("volume x{:.2}", ratio));
    }
    if let Some(score) = d.score {
        parts.push(format!("score {:.1}", score));
    }
    if let Some(rating) = d.rating {
        parts.push(format!("rating {}", rating));
    }
    parts.join(", ")
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
