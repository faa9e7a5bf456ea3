//! Export and sharing formats for a reading collection.
//!
//! Callers filter and order readings before formatting; every function here
//! keeps the order it is given.

use std::io::Write;

use anyhow::{Context, Result};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use url::Url;

use crate::{analytics::weekday_name, classify::status_for, reading::Reading};

pub const TABLE_HEADERS: [&str; 7] = ["Date", "Day", "Time", "Type", "Level", "Status", "Notes"];

const SHARE_TITLE: &str = "Blood Sugar Readings:";
const SHARE_BASE_URL: &str = "https://wa.me/";

/// Everything except RFC 3986 unreserved characters, so spaces become `%20`.
const SHARE_TEXT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// One row of the exported table, all cells already rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub date: String,
    pub day: String,
    pub time: String,
    pub reading_type: String,
    pub level: String,
    pub status: String,
    pub notes: String,
}

impl ReportRow {
    pub fn cells(&self) -> [&str; 7] {
        [
            &self.date,
            &self.day,
            &self.time,
            &self.reading_type,
            &self.level,
            &self.status,
            &self.notes,
        ]
    }
}

fn format_date(reading: &Reading) -> String {
    reading.date.format("%Y-%m-%d").to_string()
}

fn format_time(reading: &Reading) -> String {
    reading.time.format("%H:%M").to_string()
}

fn csv_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// CSV text with a header row and one row per reading.
///
/// Notes are always quoted; a missing note is an empty quoted field.
pub fn to_csv(readings: &[Reading]) -> String {
    let mut lines = Vec::with_capacity(readings.len() + 1);
    lines.push(TABLE_HEADERS.join(","));

    for r in readings {
        lines.push(format!(
            "{},{},{},{},{},{},{}",
            format_date(r),
            weekday_name(r.date),
            format_time(r),
            r.reading_type,
            r.level,
            status_for(r.level, r.reading_type),
            csv_quote(r.notes.as_deref().unwrap_or("")),
        ));
    }

    lines.join("\n")
}

/// Row data for a table renderer (PDF and similar).
pub fn to_table(readings: &[Reading]) -> Vec<ReportRow> {
    readings
        .iter()
        .map(|r| ReportRow {
            date: format_date(r),
            day: weekday_name(r.date).to_string(),
            time: format_time(r),
            reading_type: r.reading_type.to_string(),
            level: r.level.to_string(),
            status: status_for(r.level, r.reading_type).to_string(),
            notes: r.notes_or_placeholder().to_string(),
        })
        .collect()
}

fn text_line(date: &str, time: &str, kind: &str, level: &str, status: &str, notes: &str) -> String {
    format!("{date:<10} | {time:<7} | {kind:<9} | {level:>5} | {status:<6} | {notes}")
}

/// Fixed-width, pipe-delimited table for pasting into a message.
///
/// Columns pad to date 10, time 7, type 9, level 5 (right-aligned) and
/// status 6. Longer values are never truncated.
pub fn to_plain_text_block(readings: &[Reading]) -> String {
    let header = text_line("Date", "Time", "Type", "Level", "Status", "Notes");
    let separator = "-".repeat(header.len());

    let mut lines = vec![header, separator];
    lines.extend(readings.iter().map(|r| {
        text_line(
            &format_date(r),
            &format_time(r),
            r.reading_type.as_str(),
            &r.level.to_string(),
            status_for(r.level, r.reading_type).as_str(),
            r.notes_or_placeholder(),
        )
    }));
    lines.join("\n")
}

/// Message body for the share action: title plus the text block in a code
/// fence.
pub fn share_message(readings: &[Reading]) -> String {
    format!("{SHARE_TITLE}\n```\n{}\n```", to_plain_text_block(readings))
}

/// WhatsApp link carrying `message` as pre-filled text.
///
/// The text is percent-encoded with `%20` for spaces so column padding
/// survives apps that do not treat `+` as a space.
pub fn share_link(message: &str) -> Result<Url> {
    let encoded = utf8_percent_encode(message, SHARE_TEXT_ENCODE_SET);
    Url::parse(&format!("{SHARE_BASE_URL}?text={encoded}")).context("Failed to build share link")
}

/// Raw record for machine-readable dumps.
#[derive(Debug, Serialize)]
struct DumpRecord<'a> {
    id: i32,
    user_id: i32,
    reading_type: &'a str,
    level: i32,
    reading_date: String,
    reading_time: String,
    status: &'a str,
    notes: Option<&'a str>,
}

/// Write every reading as a CSV record through the `csv` crate.
pub fn write_csv_dump<W: Write>(writer: W, readings: &[Reading]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    for r in readings {
        wtr.serialize(DumpRecord {
            id: r.id,
            user_id: r.user_id,
            reading_type: r.reading_type.as_str(),
            level: r.level,
            reading_date: format_date(r),
            reading_time: r.time.format("%H:%M:%S").to_string(),
            status: status_for(r.level, r.reading_type).as_str(),
            notes: r.notes.as_deref(),
        })
        .context("Failed to serialize reading")?;
    }

    wtr.flush().context("Failed to flush CSV writer")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::*;
    use crate::reading::ReadingType;

    fn reading(kind: ReadingType, level: i32, notes: Option<&str>) -> Reading {
        Reading {
            id: 1,
            user_id: 1,
            reading_type: kind,
            level,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            notes: notes.map(str::to_string),
        }
    }

    // ==================== CSV Tests ====================

    #[test]
    fn test_csv_single_reading() {
        let csv = to_csv(&[reading(ReadingType::Fasting, 95, None)]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "Date,Day,Time,Type,Level,Status,Notes");
        assert_eq!(lines[1], "2024-01-01,Monday,08:00,fasting,95,normal,\"\"");
    }

    #[test]
    fn test_csv_empty_is_header_only() {
        assert_eq!(to_csv(&[]), "Date,Day,Time,Type,Level,Status,Notes");
    }

    #[test]
    fn test_csv_quotes_notes() {
        let csv = to_csv(&[reading(
            ReadingType::AfterMeal,
            210,
            Some("rice, naan and \"sweet\" tea"),
        )]);
        let row = csv.lines().nth(1).unwrap();
        assert_eq!(
            row,
            "2024-01-01,Monday,08:00,after-meal,210,high,\"rice, naan and \"\"sweet\"\" tea\""
        );
    }

    #[test]
    fn test_csv_keeps_caller_order() {
        let csv = to_csv(&[
            reading(ReadingType::Random, 150, None),
            reading(ReadingType::Fasting, 60, None),
        ]);
        let statuses: Vec<&str> = csv
            .lines()
            .skip(1)
            .map(|l| l.split(',').nth(5).unwrap())
            .collect();
        assert_eq!(statuses, vec!["elevated", "low"]);
    }

    // ==================== Table Tests ====================

    #[test]
    fn test_table_rows() {
        let rows = to_table(&[reading(ReadingType::BeforeMeal, 130, None)]);
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].cells(),
            ["2024-01-01", "Monday", "08:00", "before-meal", "130", "normal", "No notes"]
        );
    }

    #[test]
    fn test_table_empty() {
        assert!(to_table(&[]).is_empty());
    }

    // ==================== Plain Text Tests ====================

    #[test]
    fn test_plain_text_widths_stable() {
        let block = to_plain_text_block(&[
            reading(ReadingType::Fasting, 95, None),
            reading(ReadingType::Random, 250, Some("pizza")),
        ]);
        let lines: Vec<&str> = block.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "Date       | Time    | Type      | Level | Status | Notes"
        );
        assert!(lines[1].chars().all(|c| c == '-'));
        assert_eq!(
            lines[2],
            "2024-01-01 | 08:00   | fasting   |    95 | normal | No notes"
        );
        assert_eq!(
            lines[3],
            "2024-01-01 | 08:00   | random    |   250 | high   | pizza"
        );
        // Level column ends at the same offset for 2 and 3 digit values.
        assert_eq!(lines[2].find(" | normal"), lines[3].find(" | high"));
    }

    #[test]
    fn test_plain_text_does_not_truncate() {
        let block = to_plain_text_block(&[reading(ReadingType::BeforeMeal, 150, None)]);
        let row = block.lines().nth(2).unwrap();
        assert!(row.contains("| before-meal |"));
        assert!(row.contains("| elevated |"));
    }

    // ==================== Share Tests ====================

    #[test]
    fn test_share_message_wraps_block() {
        let message = share_message(&[reading(ReadingType::Fasting, 95, None)]);
        assert!(message.starts_with("Blood Sugar Readings:\n```\nDate"));
        assert!(message.ends_with("No notes\n```"));
    }

    #[test]
    fn test_share_link_encodes_text() {
        let url = share_link("a b\nc").unwrap();
        assert_eq!(url.host_str(), Some("wa.me"));
        let (key, value) = url.query_pairs().next().unwrap();
        assert_eq!(key, "text");
        assert_eq!(value, "a b\nc");
        assert!(!url.as_str().contains('\n'));
    }

    #[test]
    fn test_share_link_uses_percent20_for_spaces() {
        let message = share_message(&[reading(ReadingType::Fasting, 95, Some("a+b & c=d"))]);
        let url = share_link(&message).unwrap();
        let query = url.query().unwrap();

        assert!(!query.contains('+'));
        assert!(!query.contains(' '));
        // "| 08:00   |" keeps its padding.
        assert!(query.contains("08%3A00%20%20%20%7C"));

        let pairs: Vec<_> = url.query_pairs().collect();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, "text");
        assert_eq!(pairs[0].1, message);
    }

    // ==================== Dump Tests ====================

    #[test]
    fn test_csv_dump() {
        let mut buf = Vec::new();
        write_csv_dump(
            &mut buf,
            &[reading(ReadingType::Fasting, 95, Some("ok, fine"))],
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "id,user_id,reading_type,level,reading_date,reading_time,status,notes"
        );
        assert_eq!(lines[1], "1,1,fasting,95,2024-01-01,08:00:00,normal,\"ok, fine\"");
    }
}
