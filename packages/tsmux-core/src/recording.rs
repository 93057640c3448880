//! Recording tee state and filename conventions (spec §4.4, §6).
//!
//! `LiveStream` owns a `RecordingState` guarded by its own status lock; this
//! module only holds the data and the pure helpers (filename building,
//! path-character sanitization). The start/stop orchestration against the
//! PSI archiver and the recorded-file registry lives in `live_stream.rs`,
//! since it needs to call back into those collaborators.

use std::path::PathBuf;

use chrono::{Local, TimeZone};
use tokio::fs::File;

/// Which bytes the tee writes to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingMode {
    /// The pre-encode TS chunk stream, also pushed to the PSI archiver.
    Raw,
    /// The post-encode chunk stream, i.e. the same bytes clients receive.
    Encoded,
}

/// Unsafe filename characters and their full-width Unicode substitutes
/// (spec §4.4 step 3, §6).
const UNSAFE_CHARS: [(char, char); 9] = [
    ('/', '／'),
    ('\\', '＼'),
    (':', '：'),
    ('*', '＊'),
    ('?', '？'),
    ('"', '”'),
    ('<', '＜'),
    ('>', '＞'),
    ('|', '｜'),
];

/// Substitutes path-unsafe characters with their full-width equivalents.
pub fn sanitize_path_component(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            UNSAFE_CHARS
                .iter()
                .find(|(unsafe_char, _)| *unsafe_char == c)
                .map(|(_, safe_char)| *safe_char)
                .unwrap_or(c)
        })
        .collect()
}

/// Builds the recording filename stem (without extension):
/// `{channel}_{title}_{YYYYMMDD_HHMMSS}`, with unsafe characters in
/// `channel` and `title` substituted (spec §4.4 step 3, §6).
///
/// Timestamps are formatted in the host's local timezone, matching the
/// original implementation's `datetime.now()`-based stem (naive local time,
/// not UTC).
pub fn build_recording_stem(channel_name: &str, title: &str, started_at_millis: i64) -> String {
    let timestamp = Local
        .timestamp_millis_opt(started_at_millis)
        .single()
        .unwrap_or_else(Local::now);
    format!(
        "{}_{}_{}",
        sanitize_path_component(channel_name),
        sanitize_path_component(title),
        timestamp.format("%Y%m%d_%H%M%S"),
    )
}

/// Recording-related fields carried on a `LiveStream` (spec §3).
///
/// Pre-start values: `is_recording = false`, `mode = Raw`, all paths
/// `None`, `start_time = 0`.
pub struct RecordingState {
    pub is_recording: bool,
    pub mode: RecordingMode,
    pub file_path: Option<PathBuf>,
    pub file: Option<File>,
    pub start_time: i64,
    pub psi_archive_path: Option<PathBuf>,
}

impl Default for RecordingState {
    fn default() -> Self {
        Self {
            is_recording: false,
            mode: RecordingMode::Raw,
            file_path: None,
            file: None,
            start_time: 0,
            psi_archive_path: None,
        }
    }
}

impl RecordingState {
    /// Resets every field to its pre-start value, regardless of how the
    /// session ended (spec §4.4 Stop step 3, "reset all recording fields
    /// to their pre-start values regardless of errors").
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_substitutes_every_unsafe_character() {
        let input = "A/B:C?D\"E<F>G|H\\I*J";
        let sanitized = sanitize_path_component(input);
        assert_eq!(sanitized, "A／B：C？D”E＜F＞G｜H＼I＊J");
    }

    #[test]
    fn sanitize_leaves_safe_characters_untouched() {
        assert_eq!(sanitize_path_component("Foo Bar 123"), "Foo Bar 123");
    }

    #[test]
    fn stem_matches_scenario_six() {
        // spec.md §8 scenario 6: title "A/B:C?D", channel "Foo|Bar" ⇒
        // filename starts with "Foo｜Bar_A／B：C？D_" followed by a
        // 15-character timestamp.
        let stem = build_recording_stem("Foo|Bar", "A/B:C?D", 1_700_000_000_000);
        let prefix = "Foo｜Bar_A／B：C？D_";
        assert!(stem.starts_with(prefix));
        let timestamp = &stem[prefix.len()..];
        assert_eq!(timestamp.len(), 15);
        assert!(timestamp.chars().all(|c| c.is_ascii_digit() || c == '_'));
    }

    #[test]
    fn reset_restores_defaults() {
        let mut state = RecordingState {
            is_recording: true,
            mode: RecordingMode::Encoded,
            file_path: Some(PathBuf::from("/tmp/x.ts")),
            file: None,
            start_time: 123,
            psi_archive_path: Some(PathBuf::from("/tmp/x.psc")),
        };
        state.reset();
        assert!(!state.is_recording);
        assert_eq!(state.start_time, 0);
        assert!(state.file_path.is_none());
    }
}
