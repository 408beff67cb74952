//! Parser for yt-dlp's console output.
//!
//! Each normalized line is run through a fixed, prioritized list of rules.
//! The first rule that matches produces the line's typed event; output-file
//! markers are collected separately and every line is echoed as raw output.

mod normalize;

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::domain::ProgressMode;

pub use normalize::LineNormalizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentProgress {
    pub current: u32,
    pub total: u32,
    pub speed: String,
    pub eta: String,
}

impl FragmentProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.current) * 100.0 / f64::from(self.total)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PercentProgress {
    /// Progress of the current part as printed.
    pub percent: f64,
    /// Progress across all parts, 0..=100.
    pub overall: f64,
    pub size: String,
    pub speed: String,
    pub eta: String,
    pub current_part: u32,
    pub total_parts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    PartsAnnounced { current: u32, total: u32 },
    FragmentProgress(FragmentProgress),
    PercentProgress(PercentProgress),
    FinalizingStarted,
    AuthRequired,
    OutputFile(PathBuf),
    RawOutput(String),
}

#[derive(Debug, Clone, Copy)]
struct PartState {
    total_parts: u32,
    current_part: u32,
    mode: ProgressMode,
}

impl Default for PartState {
    fn default() -> Self {
        Self {
            total_parts: 1,
            current_part: 1,
            mode: ProgressMode::Unknown,
        }
    }
}

type Extractor = fn(&Captures<'_>, &mut PartState) -> Option<OutputEvent>;

struct LineRule {
    name: &'static str,
    /// `None` applies to both streams.
    stream: Option<OutputStream>,
    pattern: Regex,
    extract: Extractor,
}

impl LineRule {
    fn new(
        name: &'static str,
        stream: Option<OutputStream>,
        pattern: &str,
        extract: Extractor,
    ) -> Self {
        Self {
            name,
            stream,
            pattern: Regex::new(pattern).expect("line rule pattern"),
            extract,
        }
    }

    fn applies_to(&self, stream: OutputStream) -> bool {
        self.stream.is_none_or(|only| only == stream)
    }
}

// Auth detection matches English text from yt-dlp and will miss localized
// or reworded messages.
static RULES: LazyLock<Vec<LineRule>> = LazyLock::new(|| {
    vec![
        LineRule::new(
            "auth-required",
            Some(OutputStream::Stderr),
            r"(?i)private video|login to view this video|sign in",
            |_, _| Some(OutputEvent::AuthRequired),
        ),
        LineRule::new(
            "fragment-progress",
            None,
            r"at\s+(.+?)\s+ETA\s+(.+?)\s+\(frag (\d+)/(\d+)\)",
            extract_fragment,
        ),
        LineRule::new(
            "percent-progress",
            None,
            r"\[download\]\s+([\d.]+)% of\s+~?\s*(.+?)\s+at\s+(.+?)\s+ETA\s+(.+)",
            extract_percent,
        ),
        LineRule::new(
            "parts-announced",
            None,
            r"(?i)downloading (?:item|video) (\d+) of (\d+)",
            extract_parts,
        ),
        LineRule::new(
            "finalizing",
            None,
            r"\[(?:Merger|ExtractAudio)\]",
            |_, _| Some(OutputEvent::FinalizingStarted),
        ),
    ]
});

static OUTPUT_FILE_MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^\[download\] Destination: (.+)$",
        r"^\[ExtractAudio\] Destination: (.+)$",
        r#"^\[Merger\] Merging formats into "(.+)"$"#,
        r"^\[info\] Writing video thumbnail.* to: (.+)$",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("output file marker pattern"))
    .collect()
});

fn extract_fragment(caps: &Captures<'_>, state: &mut PartState) -> Option<OutputEvent> {
    let progress = FragmentProgress {
        speed: caps[1].to_string(),
        eta: caps[2].to_string(),
        current: caps[3].parse().ok()?,
        total: caps[4].parse().ok()?,
    };
    state.mode = ProgressMode::Fragment;
    Some(OutputEvent::FragmentProgress(progress))
}

fn extract_percent(caps: &Captures<'_>, state: &mut PartState) -> Option<OutputEvent> {
    let percent: f64 = caps[1].parse().ok()?;
    let total_parts = state.total_parts.max(1);
    let current_part = state.current_part.clamp(1, total_parts);

    let completed = f64::from(current_part - 1) * 100.0 / f64::from(total_parts);
    let overall = (completed + percent / f64::from(total_parts)).min(100.0);

    state.mode = ProgressMode::Percent;
    Some(OutputEvent::PercentProgress(PercentProgress {
        percent,
        overall,
        size: caps[2].to_string(),
        speed: caps[3].to_string(),
        eta: caps[4].trim().to_string(),
        current_part,
        total_parts,
    }))
}

fn extract_parts(caps: &Captures<'_>, state: &mut PartState) -> Option<OutputEvent> {
    let current: u32 = caps[1].parse().ok()?;
    let total: u32 = caps[2].parse().ok()?;
    if total == 0 {
        return None;
    }
    state.current_part = current.clamp(1, total);
    state.total_parts = total;
    Some(OutputEvent::PartsAnnounced {
        current: state.current_part,
        total,
    })
}

/// Stateful parser for one download run.
#[derive(Debug, Default)]
pub struct OutputParser {
    state: PartState,
}

impl OutputParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parts(current_part: u32, total_parts: u32) -> Self {
        Self {
            state: PartState {
                total_parts,
                current_part,
                mode: ProgressMode::Unknown,
            },
        }
    }

    pub fn mode(&self) -> ProgressMode {
        self.state.mode
    }

    pub fn total_parts(&self) -> u32 {
        self.state.total_parts
    }

    pub fn current_part(&self) -> u32 {
        self.state.current_part
    }

    pub fn parse_line(&mut self, stream: OutputStream, line: &str) -> Vec<OutputEvent> {
        let line = line.trim();
        let mut events = Vec::with_capacity(3);
        if line.is_empty() {
            return events;
        }

        for rule in RULES.iter().filter(|rule| rule.applies_to(stream)) {
            let Some(caps) = rule.pattern.captures(line) else {
                continue;
            };
            if let Some(event) = (rule.extract)(&caps, &mut self.state) {
                tracing::trace!(rule = rule.name, "matched");
                events.push(event);
                break;
            }
        }

        if stream == OutputStream::Stdout {
            if let Some(path) = output_file(line) {
                events.push(OutputEvent::OutputFile(path));
            }
        }

        events.push(OutputEvent::RawOutput(match stream {
            OutputStream::Stdout => line.to_string(),
            OutputStream::Stderr => format!("[STDERR] {line}"),
        }));
        events
    }
}

fn output_file(line: &str) -> Option<PathBuf> {
    OUTPUT_FILE_MARKERS
        .iter()
        .find_map(|marker| marker.captures(line))
        .map(|caps| PathBuf::from(caps[1].trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(events: &[OutputEvent]) -> Vec<&OutputEvent> {
        events
            .iter()
            .filter(|e| !matches!(e, OutputEvent::RawOutput(_)))
            .collect()
    }

    #[test]
    fn fragment_progress_percent() {
        let mut parser = OutputParser::new();
        let events = parser.parse_line(
            OutputStream::Stdout,
            "[download]  29.8% of ~  12.00MiB at  1.20MiB/s ETA 00:07 (frag 3/10)",
        );
        let OutputEvent::FragmentProgress(progress) = &events[0] else {
            panic!("expected fragment progress, got {events:?}");
        };
        assert_eq!(progress.current, 3);
        assert_eq!(progress.total, 10);
        assert_eq!(progress.speed, "1.20MiB/s");
        assert_eq!(progress.eta, "00:07");
        assert_eq!(progress.percent(), 30.0);
        assert_eq!(parser.mode(), ProgressMode::Fragment);
    }

    #[test]
    fn fragment_with_zero_total_is_zero() {
        let progress = FragmentProgress {
            current: 0,
            total: 0,
            speed: String::new(),
            eta: String::new(),
        };
        assert_eq!(progress.percent(), 0.0);
    }

    #[test]
    fn percent_progress_across_parts() {
        let mut parser = OutputParser::with_parts(2, 2);
        let events = parser.parse_line(
            OutputStream::Stdout,
            "[download] 50.0% of ~100MiB at 1MiB/s ETA 00:50",
        );
        let OutputEvent::PercentProgress(progress) = &events[0] else {
            panic!("expected percent progress, got {events:?}");
        };
        assert_eq!(progress.percent, 50.0);
        assert_eq!(progress.overall, 75.0);
        assert_eq!(progress.size, "100MiB");
        assert_eq!(progress.speed, "1MiB/s");
        assert_eq!(progress.eta, "00:50");
        assert_eq!(parser.mode(), ProgressMode::Percent);
    }

    #[test]
    fn percent_progress_is_clamped() {
        let mut parser = OutputParser::with_parts(3, 2);
        let events = parser.parse_line(
            OutputStream::Stdout,
            "[download] 100.0% of 10.00MiB at 2.00MiB/s ETA 00:00",
        );
        let OutputEvent::PercentProgress(progress) = &events[0] else {
            panic!("expected percent progress");
        };
        assert_eq!(progress.overall, 100.0);
    }

    #[test]
    fn parts_announcement_updates_state() {
        let mut parser = OutputParser::new();
        let events = parser.parse_line(
            OutputStream::Stdout,
            "[download] Downloading item 2 of 4",
        );
        assert_eq!(
            events[0],
            OutputEvent::PartsAnnounced {
                current: 2,
                total: 4
            }
        );
        assert_eq!(parser.total_parts(), 4);

        let events = parser.parse_line(
            OutputStream::Stdout,
            "[download]  50.0% of 8.00MiB at 1.00MiB/s ETA 00:04",
        );
        let OutputEvent::PercentProgress(progress) = &events[0] else {
            panic!("expected percent progress");
        };
        assert_eq!(progress.overall, 37.5);
    }

    #[test]
    fn sign_in_on_stderr_requires_auth_once() {
        let mut parser = OutputParser::new();
        let events = parser.parse_line(
            OutputStream::Stderr,
            "ERROR: [youtube] abc: Sign in to confirm your age. This video may be inappropriate",
        );
        assert_eq!(typed(&events), vec![&OutputEvent::AuthRequired]);
        assert_eq!(
            events.last(),
            Some(&OutputEvent::RawOutput(
                "[STDERR] ERROR: [youtube] abc: Sign in to confirm your age. This video may be inappropriate"
                    .to_string()
            ))
        );
    }

    #[test]
    fn auth_text_on_stdout_is_ignored() {
        let mut parser = OutputParser::new();
        let events = parser.parse_line(OutputStream::Stdout, "[info] Private video list");
        assert!(typed(&events).is_empty());
    }

    #[test]
    fn merger_line_finalizes_and_tracks_file() {
        let mut parser = OutputParser::new();
        let events = parser.parse_line(
            OutputStream::Stdout,
            r#"[Merger] Merging formats into "/out/Clip [abc].mp4""#,
        );
        assert_eq!(
            typed(&events),
            vec![
                &OutputEvent::FinalizingStarted,
                &OutputEvent::OutputFile(PathBuf::from("/out/Clip [abc].mp4"))
            ]
        );
    }

    #[test]
    fn destination_and_thumbnail_markers() {
        let mut parser = OutputParser::new();
        let events = parser.parse_line(
            OutputStream::Stdout,
            "[download] Destination: /out/Clip [abc].f137.mp4",
        );
        assert_eq!(
            typed(&events),
            vec![&OutputEvent::OutputFile(PathBuf::from(
                "/out/Clip [abc].f137.mp4"
            ))]
        );

        let events = parser.parse_line(
            OutputStream::Stdout,
            "[info] Writing video thumbnail maxresdefault to: /out/Clip [abc].webp",
        );
        assert_eq!(
            typed(&events),
            vec![&OutputEvent::OutputFile(PathBuf::from("/out/Clip [abc].webp"))]
        );
    }

    #[test]
    fn unmatched_lines_are_echoed() {
        let mut parser = OutputParser::new();
        assert_eq!(
            parser.parse_line(OutputStream::Stdout, "[youtube] abc: Downloading webpage"),
            vec![OutputEvent::RawOutput(
                "[youtube] abc: Downloading webpage".to_string()
            )]
        );
        assert_eq!(
            parser.parse_line(OutputStream::Stderr, "WARNING: something odd"),
            vec![OutputEvent::RawOutput("[STDERR] WARNING: something odd".to_string())]
        );
        assert!(parser.parse_line(OutputStream::Stdout, "   ").is_empty());
    }
}
