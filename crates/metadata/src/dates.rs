use chrono::{NaiveDate, NaiveDateTime};

use crate::DateFields;

const SIDECAR_FORMAT: &str = "%d.%m.%Y, %H:%M:%S";
const EXIF_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

const FLEXIBLE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y:%m:%d %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
];

const FLEXIBLE_DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y:%m:%d", "%d.%m.%Y"];

/// Picks the capture time from the available sources, first parseable wins:
/// sidecar taken time, then DateTimeOriginal, CreateDate, FileModifyDate.
pub fn resolve_capture_time(
    sidecar_taken: Option<&str>,
    fields: &DateFields,
) -> Option<NaiveDateTime> {
    if let Some(value) = sidecar_taken {
        if let Some(parsed) = parse_sidecar_datetime(value) {
            return Some(parsed);
        }
    }
    let exif_sources = [
        fields.date_time_original.as_deref(),
        fields.create_date.as_deref(),
        fields.file_modify_date.as_deref(),
    ];
    for source in exif_sources.into_iter().flatten() {
        if let Some(parsed) = parse_exif_datetime(source) {
            return Some(parsed);
        }
    }
    None
}

/// Sidecar values look like `01.06.2022, 09:30:00 UTC`. The suffix is
/// stripped; the time stays naive, never converted.
pub fn parse_sidecar_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    let trimmed = trimmed.strip_suffix(" UTC").unwrap_or(trimmed).trim_end();
    NaiveDateTime::parse_from_str(trimmed, SIDECAR_FORMAT)
        .ok()
        .or_else(|| parse_flexible(trimmed))
}

/// EXIF values look like `2023:05:01 10:00:00`, optionally with fractional
/// seconds and/or a timezone offset appended.
pub fn parse_exif_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = strip_exif_suffixes(value.trim());
    NaiveDateTime::parse_from_str(trimmed, EXIF_FORMAT)
        .ok()
        .or_else(|| parse_flexible(trimmed))
}

fn strip_exif_suffixes(value: &str) -> &str {
    let mut out = value;
    if let Some(stripped) = out.strip_suffix('Z') {
        out = stripped;
    }
    // A timezone offset sits after the time part; '-' earlier in the string
    // would be a date separator, which the EXIF format does not use.
    if let Some(idx) = out.rfind(['+', '-']) {
        if idx > 10 {
            out = &out[..idx];
        }
    }
    if let Some(idx) = out.find('.') {
        out = &out[..idx];
    }
    out.trim_end()
}

pub fn parse_flexible(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    for format in FLEXIBLE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed);
        }
    }
    for format in FLEXIBLE_DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, format) {
            return parsed.and_hms_opt(0, 0, 0);
        }
    }
    None
}
