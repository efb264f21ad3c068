//! Console-line classification patterns.
//!
//! A pattern set maps raw console lines to lifecycle categories. The
//! categories are evaluated independently, not as a priority chain: one
//! line may match any number of them.

use once_cell::sync::Lazy;
use regex::Regex;

/// A lifecycle category a console line can match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCategory {
    /// The server finished booting and accepts connections
    Start,
    /// The server began an orderly shutdown
    Stop,
    /// The server hit a fatal error
    Crash,
    /// The server refused to boot until the EULA is accepted
    Eula,
}

/// Compiled patterns for one server flavor
#[derive(Debug, Clone)]
pub struct EventPatternSet {
    pub start: Regex,
    pub stop: Regex,
    pub crash: Regex,
    pub eula: Option<Regex>,
}

impl EventPatternSet {
    /// Classify one console line.
    ///
    /// Every pattern is tried; the returned categories are in declaration
    /// order, never deduplicated or prioritized.
    pub fn classify(&self, line: &str) -> Vec<LineCategory> {
        let mut matched = Vec::new();
        if self.start.is_match(line) {
            matched.push(LineCategory::Start);
        }
        if self.stop.is_match(line) {
            matched.push(LineCategory::Stop);
        }
        if self.crash.is_match(line) {
            matched.push(LineCategory::Crash);
        }
        if let Some(eula) = &self.eula {
            if eula.is_match(line) {
                matched.push(LineCategory::Eula);
            }
        }
        matched
    }

    /// Built-in profile for a server flavor; unknown flavors fall back to
    /// the vanilla patterns.
    pub fn profile(flavor: &str) -> &'static EventPatternSet {
        match flavor {
            "paper" => &PAPER,
            _ => &VANILLA,
        }
    }
}

static VANILLA: Lazy<EventPatternSet> = Lazy::new(|| EventPatternSet {
    start: Regex::new(r"^\[.+?\]: Done").unwrap(),
    stop: Regex::new(r"^\[.+?\]: ThreadedAnvilChunkStorage: All dimensions are saved").unwrap(),
    crash: Regex::new(
        r"^\[.+? ERROR\]: (Exception stopping the server)|(Encountered an unexpected exception)",
    )
    .unwrap(),
    eula: Some(
        Regex::new(
            r"^\[.+?\]: You need to agree to the EULA in order to run the server. Go to eula.txt for more info.",
        )
        .unwrap(),
    ),
});

static PAPER: Lazy<EventPatternSet> = Lazy::new(|| EventPatternSet {
    start: Regex::new(r"^\[.+?\]: Done").unwrap(),
    stop: Regex::new(r"^\[.+?\]: ThreadedAnvilChunkStorage: All dimensions are saved").unwrap(),
    crash: Regex::new(
        r"^\[.+? ERROR\]: (Exception stopping the server)|(Encountered an unexpected exception)",
    )
    .unwrap(),
    eula: Some(
        Regex::new(
            r"^\[.+?\]: You need to agree to the EULA in order to run the server. Go to eula.txt for more info.",
        )
        .unwrap(),
    ),
});
