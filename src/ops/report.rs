use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeDelta};
use colored::Colorize;
use directories::ProjectDirs;
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::policy::Policy;

use super::filter::{FilterSummary, SectionEvaluation, SectionSummary};

/// Everything needed to account for a run afterwards.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub started: DateTime<Local>,
    pub finished: DateTime<Local>,
    pub duration_ms: i64,
    pub input: &'a str,
    pub display_name: Option<&'a str>,
    pub policy: &'a Policy,
    pub summary: &'a FilterSummary,
    pub evaluations: &'a [SectionEvaluation],
}

pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialise run report")?;
    fs::write(path, json).with_context(|| format!("Failed to write run report: {:?}", path))
}

pub fn get_log_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("org", "warrant-filter", "warrant-filter")
        .context("Failed to determine platform-specific project directories.")?;

    let log_dir = proj_dirs.data_dir().join("logs");

    if !log_dir.exists() {
        fs::create_dir_all(&log_dir).context("Failed to create log directory")?;
    }

    Ok(log_dir)
}

/// `date_filter_log-<device>-<start>.json`, safe to use as a file name.
pub fn log_file_name(display_name: Option<&str>, started: DateTime<Local>) -> String {
    let device = display_name.unwrap_or("unknown_device");
    let name = format!(
        "date_filter_log-{}-{}.json",
        device,
        started.format("%Y-%m-%d %H:%M:%S")
    );

    name.chars()
        .filter(|c| *c != ':')
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            c => c,
        })
        .collect()
}

fn print_section(label: &str, section: &SectionSummary) {
    eprintln!(
        "{}: {} processed, {} removed",
        label.blue().bold(),
        section.processed,
        section.removed.to_string().yellow()
    );
    for (category, tally) in &section.by_category {
        eprintln!("    {} ({}/{})", category, tally.removed, tally.processed);
    }
}

pub fn print_summary(summary: &FilterSummary, duration: TimeDelta) {
    print_section("Data Files", &summary.data_files);
    print_section("Analyzed Data", &summary.models);
    print_section("Chat Messages", &summary.chat_messages);
    print_section("Device Info", &summary.device_info);

    if summary.failures > 0 {
        eprintln!(
            "{}: {} item(s) could not be evaluated and were kept",
            "Warning".yellow().bold(),
            summary.failures
        );
    }

    let ms = duration.num_milliseconds();
    eprintln!(
        "{}: {} in {}.{:03}s",
        "Filtered out".green().bold(),
        summary.total_removed(),
        ms / 1000,
        ms % 1000
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DateRange;
    use chrono::TimeZone;

    #[test]
    fn log_file_name_is_path_safe() {
        let started = Local
            .with_ymd_and_hms(2016, 11, 22, 9, 5, 7)
            .single()
            .unwrap_or_else(|| panic!("unambiguous local time"));
        assert_eq!(
            log_file_name(Some("Bob's iPhone / 6s"), started),
            "date_filter_log-Bob's_iPhone___6s-2016-11-22_090507.json"
        );
        assert_eq!(
            log_file_name(None, started),
            "date_filter_log-unknown_device-2016-11-22_090507.json"
        );
    }

    #[test]
    fn report_is_written_as_json() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let path = dir.path().join("report.json");

        let range = DateRange::parse("2015-02-20 00:00:00-8", "2015-02-20 23:59:59-8")
            .unwrap_or_else(|e| panic!("{e}"));
        let policy = Policy::new(range);
        let summary = FilterSummary::default();
        let now = Local::now();
        let report = RunReport {
            started: now,
            finished: now,
            duration_ms: 0,
            input: "dump.json",
            display_name: Some("Pixel 3"),
            policy: &policy,
            summary: &summary,
            evaluations: &[],
        };

        write_report(&path, &report).unwrap_or_else(|e| panic!("{e}"));

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap_or_else(|e| panic!("{e}")))
                .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(written["display_name"], "Pixel 3");
        assert_eq!(written["policy"]["exempt_deleted"], true);
        assert_eq!(written["policy"]["range"]["start"], "2015-02-20T00:00:00-08:00");
        assert_eq!(written["summary"]["failures"], 0);
    }
}
