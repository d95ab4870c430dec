//! Scan dates recorded in structural processing logs.
//!
//! The fourth line of `scripts/recon-all.log` holds the processing command,
//! `-i <input path> -...`; the acquisition date is the first eight-digit run
//! (`YYYYMMDD`) in the input path.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::debug;

const COMMAND_LINE_INDEX: usize = 3;

pub fn recon_log_path(session: &Path) -> PathBuf {
    session.join("scripts").join("recon-all.log")
}

/// Scan date of one session directory, `None` when the log is missing or
/// holds no usable date.
pub fn read_scan_date(session: &Path) -> Option<NaiveDate> {
    let path = recon_log_path(session);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(error) => {
            debug!(path = %path.display(), %error, "no processing log");
            return None;
        }
    };
    let date = scan_date_from_log(&text);
    if date.is_none() {
        debug!(path = %path.display(), "no scan date in processing log");
    }
    date
}

pub fn scan_date_from_log(text: &str) -> Option<NaiveDate> {
    let line = text.lines().nth(COMMAND_LINE_INDEX)?;
    let input = input_argument(line)?;
    let stamp = first_eight_digit_run(input)?;
    NaiveDate::parse_from_str(stamp, "%Y%m%d").ok()
}

/// Text between `-i <ws>` at the start of the line and the next `<ws>-`.
fn input_argument(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("-i")?;
    let separator = rest.chars().next().filter(|ch| ch.is_whitespace())?;
    let rest = &rest[separator.len_utf8()..];
    let mut chars = rest.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        if ch.is_whitespace() && chars.peek().is_some_and(|&(_, next)| next == '-') {
            return Some(&rest[..idx]);
        }
    }
    None
}

fn first_eight_digit_run(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    if bytes.len() < 8 {
        return None;
    }
    (0..=bytes.len() - 8)
        .find(|&start| bytes[start..start + 8].iter().all(u8::is_ascii_digit))
        .map(|start| &text[start..start + 8])
}
