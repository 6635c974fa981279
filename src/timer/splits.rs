use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::display::format_time;

/// One split as carried on the wire: a label and an optional target time.
///
/// An absent time means no target is set for that split; such entries are
/// display-only and never produce a diff.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitEntry {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
}

#[derive(Debug, Error)]
pub enum SplitsError {
    #[error("Run is already complete, no split left to advance")]
    RunComplete,
}

/// Signed difference between an elapsed time and a split target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitDiff {
    /// True when elapsed >= target (behind schedule, rendered "+").
    pub behind: bool,
    pub delta_ms: u64,
}

impl SplitDiff {
    /// Render in the overlay's diff format: sign, auto-hidden leading
    /// units, milliseconds only under one minute.
    pub fn to_text(&self) -> String {
        let sign = if self.behind { "+" } else { "-" };
        format!(
            "{sign}{}",
            format_time(self.delta_ms, self.delta_ms < 60_000, true)
        )
    }
}

/// How far ahead of target a split may be while still showing a diff.
/// Deficits beyond this read as "not yet meaningful" and are suppressed
/// unless forced.
const AHEAD_SUPPRESS_MS: u64 = 10_000;

/// Compare an elapsed time against an optional target.
///
/// `force` bypasses the ahead-of-schedule suppression; it is used when a
/// split is actually recorded rather than previewed.
pub fn diff_against(target_ms: Option<u64>, elapsed_ms: u64, force: bool) -> Option<SplitDiff> {
    let target = target_ms?;
    if elapsed_ms >= target {
        return Some(SplitDiff {
            behind: true,
            delta_ms: elapsed_ms - target,
        });
    }
    let deficit = target - elapsed_ms;
    if force || deficit < AHEAD_SUPPRESS_MS {
        Some(SplitDiff {
            behind: false,
            delta_ms: deficit,
        })
    } else {
        // Neither meaningfully good nor gone bad yet.
        None
    }
}

/// One split with its run-time progress.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitRecord {
    pub label: String,
    pub target_ms: Option<u64>,
    pub achieved_ms: Option<u64>,
    pub diff: Option<SplitDiff>,
}

impl SplitRecord {
    fn from_entry(entry: &SplitEntry) -> Self {
        Self {
            label: entry.label.clone(),
            target_ms: entry.time,
            achieved_ms: None,
            diff: None,
        }
    }

    /// The time this record would persist: the achieved time once the
    /// split was played, its original target otherwise.
    fn persisted_time(&self) -> Option<u64> {
        self.achieved_ms.or(self.target_ms)
    }
}

/// Tracks progress through an ordered list of target times.
///
/// The cursor walks `[0, len]`; `len` means the run is complete. Within
/// one run the cursor only moves forward. Resetting restores the pristine
/// target list, so an aborted attempt never leaks achieved times into the
/// next one.
#[derive(Clone, Debug, Default)]
pub struct SplitManager {
    // Pristine entries, restored on reset
    source: Vec<SplitEntry>,
    records: Vec<SplitRecord>,
    cursor: usize,
    // Whether this run's results were already handed out for persistence
    has_sent: bool,
}

impl SplitManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the split list, discarding any in-progress run.
    pub fn install(&mut self, entries: Vec<SplitEntry>) {
        info!("Installing split list with {} entries", entries.len());
        self.records = entries.iter().map(SplitRecord::from_entry).collect();
        self.source = entries;
        self.cursor = 0;
        self.has_sent = false;
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[SplitRecord] {
        &self.records
    }

    /// Index of the split currently being played.
    pub fn current_index(&self) -> Option<usize> {
        if self.has_more() {
            Some(self.cursor)
        } else {
            None
        }
    }

    /// True while the cursor is within bounds.
    pub fn has_more(&self) -> bool {
        self.cursor < self.records.len()
    }

    /// True once at least one split of this run was played.
    pub fn started(&self) -> bool {
        self.cursor > 0
    }

    /// Record `elapsed_ms` as the achieved time of the current split,
    /// store its diff against target, and move the cursor forward.
    pub fn advance(&mut self, elapsed_ms: u64) -> Result<&SplitRecord, SplitsError> {
        if !self.has_more() {
            return Err(SplitsError::RunComplete);
        }
        let record = &mut self.records[self.cursor];
        // Recorded splits always carry their sign, even far ahead.
        record.diff = diff_against(record.target_ms, elapsed_ms, true);
        record.achieved_ms = Some(elapsed_ms);
        debug!(
            "Split {} \"{}\" achieved at {}ms (diff {:?})",
            self.cursor, record.label, elapsed_ms, record.diff
        );
        self.cursor += 1;
        Ok(&self.records[self.cursor - 1])
    }

    /// Live diff of the current split, with the ahead-of-schedule
    /// suppression applied.
    pub fn current_diff(&self, elapsed_ms: u64) -> Option<SplitDiff> {
        let record = self.records.get(self.cursor)?;
        diff_against(record.target_ms, elapsed_ms, false)
    }

    /// Rewind to the first split and restore the pristine target list.
    pub fn reset(&mut self) {
        debug!("Resetting splits (cursor was {})", self.cursor);
        self.records = self.source.iter().map(SplitRecord::from_entry).collect();
        self.cursor = 0;
        self.has_sent = false;
    }

    /// Hand out this run's results for persistence, exactly once.
    ///
    /// Yields `Some` the first time it is called after the run completed;
    /// every later call is a no-op until a reset or a new install. Both
    /// the run-out-of-splits path and a later unload path may call this
    /// freely without causing a double store.
    pub fn take_pending_persist(&mut self) -> Option<Vec<SplitEntry>> {
        if self.has_sent || self.has_more() || !self.started() {
            return None;
        }
        self.has_sent = true;
        info!("Run complete, handing out {} splits for persistence", self.records.len());
        Some(
            self.records
                .iter()
                .map(|r| SplitEntry {
                    label: r.label.clone(),
                    time: r.persisted_time(),
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(label: &str, time: Option<u64>) -> SplitEntry {
        SplitEntry {
            label: label.to_string(),
            time,
        }
    }

    fn manager(targets: &[Option<u64>]) -> SplitManager {
        let mut m = SplitManager::new();
        m.install(
            targets
                .iter()
                .enumerate()
                .map(|(i, t)| entry(&format!("split {i}"), *t))
                .collect(),
        );
        m
    }

    #[test]
    fn diff_sign_rule() {
        let one_behind = diff_against(Some(10_000), 10_001, false).unwrap();
        assert!(one_behind.behind);
        assert_eq!(one_behind.delta_ms, 1);
        assert_eq!(one_behind.to_text(), "+00.001");

        let one_ahead = diff_against(Some(10_000), 9_999, false).unwrap();
        assert!(!one_ahead.behind);
        assert_eq!(one_ahead.delta_ms, 1);
        assert_eq!(one_ahead.to_text(), "-00.001");

        let far_behind = diff_against(Some(10_000), 19_999, false).unwrap();
        assert!(far_behind.behind);
        assert_eq!(far_behind.delta_ms, 9_999);
    }

    #[test]
    fn exact_target_counts_as_behind_zero() {
        let diff = diff_against(Some(10_000), 10_000, false).unwrap();
        assert!(diff.behind);
        assert_eq!(diff.delta_ms, 0);
    }

    #[test]
    fn far_ahead_is_suppressed_unless_forced() {
        assert_eq!(diff_against(Some(60_000), 50_000, false), None);
        let forced = diff_against(Some(60_000), 40_000, true).unwrap();
        assert!(!forced.behind);
        assert_eq!(forced.delta_ms, 20_000);
        // Just inside the window still shows.
        assert!(diff_against(Some(60_000), 50_001, false).is_some());
    }

    #[test]
    fn no_target_never_diffs() {
        assert_eq!(diff_against(None, 123, false), None);
        assert_eq!(diff_against(None, 123, true), None);
    }

    #[test]
    fn diff_text_drops_millis_at_a_minute() {
        let diff = diff_against(Some(0), 60_000, false).unwrap();
        assert_eq!(diff.to_text(), "+01:00");
        let diff = diff_against(Some(0), 59_999, false).unwrap();
        assert_eq!(diff.to_text(), "+59.999");
    }

    #[test]
    fn advance_walks_the_cursor_forward_only() {
        let mut m = manager(&[Some(1000), Some(2000), None]);
        assert_eq!(m.current_index(), Some(0));
        m.advance(900).unwrap();
        assert_eq!(m.current_index(), Some(1));
        m.advance(2100).unwrap();
        m.advance(3000).unwrap();
        assert_eq!(m.current_index(), None);
        assert!(!m.has_more());
        assert!(matches!(m.advance(4000), Err(SplitsError::RunComplete)));
    }

    #[test]
    fn advance_records_achieved_and_forced_diff() {
        let mut m = manager(&[Some(60_000)]);
        let record = m.advance(40_000).unwrap();
        assert_eq!(record.achieved_ms, Some(40_000));
        // Forced: shown even though more than 10s ahead.
        assert_eq!(
            record.diff,
            Some(SplitDiff {
                behind: false,
                delta_ms: 20_000
            })
        );
    }

    #[test]
    fn untargeted_split_records_time_but_no_diff() {
        let mut m = manager(&[None]);
        let record = m.advance(1234).unwrap();
        assert_eq!(record.achieved_ms, Some(1234));
        assert_eq!(record.diff, None);
    }

    #[test]
    fn persistence_fires_exactly_once_per_run() {
        let mut m = manager(&[Some(1000), Some(2000)]);
        assert_eq!(m.take_pending_persist(), None);
        m.advance(900).unwrap();
        assert_eq!(m.take_pending_persist(), None);
        m.advance(1900).unwrap();

        let sent = m.take_pending_persist().expect("first poll yields the run");
        assert_eq!(sent[0].time, Some(900));
        assert_eq!(sent[1].time, Some(1900));
        // Polled repeatedly afterwards: idempotent no-op.
        assert_eq!(m.take_pending_persist(), None);
        assert_eq!(m.take_pending_persist(), None);
    }

    #[test]
    fn unplayed_entries_persist_their_targets() {
        let mut m = manager(&[Some(1000)]);
        m.advance(800).unwrap();
        let sent = m.take_pending_persist().unwrap();
        assert_eq!(sent[0].time, Some(800));

        // A fresh install with nothing played hands out nothing.
        let mut m = manager(&[Some(1000)]);
        assert_eq!(m.take_pending_persist(), None);
    }

    #[test]
    fn reset_restores_pristine_targets_and_rearms_persistence() {
        let mut m = manager(&[Some(1000), Some(2000)]);
        m.advance(900).unwrap();
        m.advance(1900).unwrap();
        assert!(m.take_pending_persist().is_some());

        m.reset();
        assert_eq!(m.current_index(), Some(0));
        assert_eq!(m.records()[0].target_ms, Some(1000));
        assert_eq!(m.records()[0].achieved_ms, None);
        assert_eq!(m.records()[1].diff, None);

        m.advance(950).unwrap();
        m.advance(2100).unwrap();
        let sent = m.take_pending_persist().expect("rearmed after reset");
        assert_eq!(sent[0].time, Some(950));
    }

    #[test]
    fn current_diff_tracks_the_cursor() {
        let mut m = manager(&[Some(1000), None]);
        assert!(m.current_diff(500).is_some());
        m.advance(900).unwrap();
        // Second split has no target.
        assert_eq!(m.current_diff(1500), None);
    }

    #[test]
    fn wire_shape_omits_absent_times() {
        let json = serde_json::to_string(&entry("a", None)).unwrap();
        assert_eq!(json, r#"{"label":"a"}"#);
        let json = serde_json::to_string(&entry("b", Some(5))).unwrap();
        assert_eq!(json, r#"{"label":"b","time":5}"#);
        let parsed: SplitEntry = serde_json::from_str(r#"{"label":"c"}"#).unwrap();
        assert_eq!(parsed.time, None);
    }
}
