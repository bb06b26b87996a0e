//! Mapping of per-file progress reports onto submitted items
//!
//! The backend never echoes item ids back. It names each output file with the
//! item's 1-based position in the submitted selection (`"3 - Song.mp3"`) and,
//! in newer builds, also sends a 0-based `video_index`. Which of the two is
//! trusted is an [`ItemCorrelator`] choice, so callers never depend on the
//! filename convention directly.

use regex::Regex;
use std::sync::LazyLock;

use crate::config::Correlation;
use crate::types::ItemRef;

/// Leading ordinal: digits, optional whitespace, then a dash
#[allow(clippy::expect_used)]
static ORDINAL_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*-").expect("ordinal pattern is valid"));

/// What the backend told us about which file a report is for
#[derive(Clone, Copy, Debug)]
pub struct ReportRef<'a> {
    /// Reported output filename
    pub filename: &'a str,
    /// Reported 0-based selection index, if any
    pub video_index: Option<usize>,
}

/// Strategy resolving a report to a 1-based positional index
pub trait ItemCorrelator: Send + Sync {
    /// Positional index the report refers to, or None if it cannot be told
    fn ordinal(&self, report: ReportRef<'_>) -> Option<usize>;
}

/// Parses the leading `N -` prefix of the filename
#[derive(Clone, Copy, Debug, Default)]
pub struct FilenameOrdinal;

impl ItemCorrelator for FilenameOrdinal {
    fn ordinal(&self, report: ReportRef<'_>) -> Option<usize> {
        filename_ordinal(report.filename)
    }
}

/// Trusts `video_index` when sent, otherwise the filename prefix
#[derive(Clone, Copy, Debug, Default)]
pub struct VideoIndex;

impl ItemCorrelator for VideoIndex {
    fn ordinal(&self, report: ReportRef<'_>) -> Option<usize> {
        match report.video_index {
            Some(index) => index.checked_add(1),
            None => filename_ordinal(report.filename),
        }
    }
}

/// Extract the leading ordinal from a backend filename
///
/// ```
/// use playlist_dl::reconcile::filename_ordinal;
///
/// assert_eq!(filename_ordinal("3 - Song Title.mp3"), Some(3));
/// assert_eq!(filename_ordinal("12-Intro.mp4"), Some(12));
/// assert_eq!(filename_ordinal("Song Title.mp3"), None);
/// ```
pub fn filename_ordinal(filename: &str) -> Option<usize> {
    let caps = ORDINAL_PREFIX.captures(filename)?;
    caps.get(1)?.as_str().parse().ok()
}

/// Result of applying one report
#[derive(Clone, Debug, PartialEq)]
pub enum Reconciliation {
    /// The item at this position in the job's item list was updated
    Updated(usize),
    /// No ordinal could be read from the report
    NoOrdinal,
    /// An ordinal was read but no item has that positional index
    OutOfRange(usize),
}

/// Applies progress and completion reports to a job's items
///
/// Only `progress_percent` and `completed` are ever touched; the item list
/// itself is never resized.
pub struct Reconciler {
    correlator: Box<dyn ItemCorrelator>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(FilenameOrdinal)
    }
}

impl Reconciler {
    /// Create a reconciler using the given strategy
    pub fn new(correlator: impl ItemCorrelator + 'static) -> Self {
        Self {
            correlator: Box::new(correlator),
        }
    }

    /// Create a reconciler for a configured strategy
    pub fn for_strategy(strategy: Correlation) -> Self {
        match strategy {
            Correlation::FilenameOrdinal => Self::new(FilenameOrdinal),
            Correlation::VideoIndex => Self::new(VideoIndex),
        }
    }

    /// Record reported progress, overwriting any earlier value
    pub fn apply_progress(
        &self,
        items: &mut [ItemRef],
        report: ReportRef<'_>,
        percent: &str,
    ) -> Reconciliation {
        self.update(items, report, |item| {
            item.progress_percent = Some(percent.trim().to_string());
        })
    }

    /// Mark the item finished at 100% regardless of the last reported value
    pub fn apply_finished(&self, items: &mut [ItemRef], report: ReportRef<'_>) -> Reconciliation {
        self.update(items, report, |item| {
            item.completed = true;
            item.progress_percent = Some("100%".to_string());
        })
    }

    fn update(
        &self,
        items: &mut [ItemRef],
        report: ReportRef<'_>,
        apply: impl FnOnce(&mut ItemRef),
    ) -> Reconciliation {
        let Some(ordinal) = self.correlator.ordinal(report) else {
            return Reconciliation::NoOrdinal;
        };
        match items
            .iter()
            .position(|item| item.positional_index == ordinal)
        {
            Some(pos) => {
                apply(&mut items[pos]);
                Reconciliation::Updated(pos)
            }
            None => Reconciliation::OutOfRange(ordinal),
        }
    }
}
