//! Output file naming
//!
//! A clip is stored under its sanitized label, falling back to
//! `movement_<timestamp>` for empty labels. If that name is taken the
//! timestamp is appended once. A second collision is an error, never an
//! overwrite.

use chrono::{DateTime, TimeZone};
use movedict_core::{Error, Result};

/// File extension of stored clips
pub const CLIP_EXTENSION: &str = "mp4";

/// Sortable, filesystem-safe capture time, e.g. `20240131_184502`
pub fn format_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Reduce a user label to `[A-Za-z0-9_-]`, joining words with underscores
///
/// Characters other than ASCII letters, digits, space, underscore and hyphen
/// are dropped, runs of spaces become one underscore, and leading or trailing
/// underscores are trimmed.
pub fn sanitize_label(label: &str) -> String {
    let kept: String = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();

    kept.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .trim_matches('_')
        .to_string()
}

/// A label plus the capture time it was submitted at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingRequest {
    pub label: String,
    pub timestamp: String,
}

impl NamingRequest {
    pub fn new<Tz: TimeZone>(label: impl Into<String>, at: &DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            label: label.into(),
            timestamp: format_timestamp(at),
        }
    }

    /// Pick the final file name given a directory-membership predicate
    pub fn resolve(&self, exists: impl Fn(&str) -> bool) -> Result<String> {
        resolve(&self.label, &self.timestamp, exists)
    }
}

/// Pick a collision-free file name for `label`
///
/// `exists` answers whether a candidate name is already taken.
pub fn resolve(label: &str, timestamp: &str, exists: impl Fn(&str) -> bool) -> Result<String> {
    let sanitized = sanitize_label(label);
    let base = if sanitized.is_empty() {
        format!("movement_{}", timestamp)
    } else {
        sanitized
    };

    let candidate = format!("{}.{}", base, CLIP_EXTENSION);
    if !exists(&candidate) {
        return Ok(candidate);
    }

    let fallback = format!("{}_{}.{}", base, timestamp, CLIP_EXTENSION);
    if !exists(&fallback) {
        return Ok(fallback);
    }

    Err(Error::NameCollision { name: fallback })
}
