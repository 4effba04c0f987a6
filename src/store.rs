//! Ordered, editable collection of timed lyric lines.

use crate::error::{LyrvidError, LyrvidResult};
use crate::model::{
    DEFAULT_LINE_SECS, EffectKind, EntryKind, LineStyle, LyricEntry, Syllable, UNSET_TIME,
};

/// Which timing field an edit targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeField {
    Start,
    End,
}

/// Direction for [`LyricStore::move_entry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveDir {
    Up,
    Down,
}

/// The lyric line collection plus an edit lock held during sync sessions.
///
/// Structural edits while taps are being recorded would shift indices under
/// the sync cursor, so every mutator refuses to run while locked. Out-of-
/// bounds indices are silent no-ops.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct LyricStore {
    entries: Vec<LyricEntry>,
    #[serde(skip)]
    locked: bool,
}

impl LyricStore {
    pub fn new(entries: Vec<LyricEntry>) -> Self {
        Self {
            entries,
            locked: false,
        }
    }

    pub fn entries(&self) -> &[LyricEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&LyricEntry> {
        self.entries.get(index)
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub(crate) fn lock(&mut self) {
        self.locked = true;
    }

    pub(crate) fn unlock(&mut self) {
        self.locked = false;
    }

    fn ensure_unlocked(&self) -> LyrvidResult<()> {
        if self.locked {
            return Err(LyrvidError::validation(
                "lyrics are locked while a sync session is active",
            ));
        }
        Ok(())
    }

    pub fn set_text(&mut self, index: usize, text: impl Into<String>) -> LyrvidResult<()> {
        self.ensure_unlocked()?;
        if let Some(e) = self.entries.get_mut(index) {
            e.text = text.into();
        }
        Ok(())
    }

    pub fn set_translation(&mut self, index: usize, trans: impl Into<String>) -> LyrvidResult<()> {
        self.ensure_unlocked()?;
        if let Some(e) = self.entries.get_mut(index) {
            e.translation = trans.into();
        }
        Ok(())
    }

    pub fn set_line_style(&mut self, index: usize, style: LineStyle) -> LyrvidResult<()> {
        self.ensure_unlocked()?;
        if let Some(e) = self.entries.get_mut(index) {
            e.style = style;
        }
        Ok(())
    }

    pub fn set_effect(&mut self, index: usize, effect: EffectKind) -> LyrvidResult<()> {
        self.ensure_unlocked()?;
        if let Some(e) = self.entries.get_mut(index) {
            e.effect = effect;
        }
        Ok(())
    }

    pub fn set_time(&mut self, index: usize, field: TimeField, secs: f64) -> LyrvidResult<()> {
        self.ensure_unlocked()?;
        if let Some(e) = self.entries.get_mut(index) {
            match field {
                TimeField::Start => e.start_time = secs,
                TimeField::End => e.end_time = Some(secs),
            }
        }
        Ok(())
    }

    /// Stamp an entry's start with the current playback position.
    pub fn set_to_clock_time(&mut self, index: usize, secs: f64) -> LyrvidResult<()> {
        self.set_time(index, TimeField::Start, secs)
    }

    /// Tap write from the sync engine; allowed while locked.
    pub(crate) fn record_tap(&mut self, index: usize, secs: f64) {
        if let Some(e) = self.entries.get_mut(index) {
            e.start_time = secs;
        }
    }

    pub(crate) fn reset_all_start_times(&mut self) {
        for e in &mut self.entries {
            e.start_time = UNSET_TIME;
        }
    }

    /// Insert a copy right after `index`, shifted to start where the
    /// original ends.
    pub fn duplicate(&mut self, index: usize) -> LyrvidResult<()> {
        self.ensure_unlocked()?;
        let Some(orig) = self.entries.get(index) else {
            return Ok(());
        };
        let mut copy = orig.clone();
        copy.start_time = orig.end_or_default();
        copy.end_time = Some(copy.start_time + DEFAULT_LINE_SECS);
        self.entries.insert(index + 1, copy);
        Ok(())
    }

    /// Swap an entry with its neighbor; edge moves are no-ops.
    pub fn move_entry(&mut self, index: usize, dir: MoveDir) -> LyrvidResult<()> {
        self.ensure_unlocked()?;
        if index >= self.entries.len() {
            return Ok(());
        }
        match dir {
            MoveDir::Up => {
                if index > 0 {
                    self.entries.swap(index, index - 1);
                }
            }
            MoveDir::Down => {
                if index + 1 < self.entries.len() {
                    self.entries.swap(index, index + 1);
                }
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> LyrvidResult<()> {
        self.ensure_unlocked()?;
        if index < self.entries.len() {
            self.entries.remove(index);
        }
        Ok(())
    }

    /// Insert an instrumental break before `index`, spanning the gap from
    /// the previous line's end to this line's start.
    pub fn insert_instrumental(&mut self, index: usize) -> LyrvidResult<()> {
        self.ensure_unlocked()?;
        if index >= self.entries.len() {
            return Ok(());
        }

        let start = if index == 0 {
            0.0
        } else {
            let prev = &self.entries[index - 1];
            match prev.end_time {
                Some(end) if end != 0.0 => end,
                _ => prev.start_time,
            }
        };
        let end = self.entries[index].start_time;

        let entry = LyricEntry {
            text: "\u{1F3B5}".to_string(),
            translation: String::new(),
            start_time: start,
            end_time: Some(end),
            kind: EntryKind::Instrumental,
            syllables: vec![Syllable {
                text: "\u{1F3B5}".to_string(),
                begin: start,
                end,
            }],
            effect: EffectKind::None,
            style: LineStyle::default(),
        };
        self.entries.insert(index, entry);
        Ok(())
    }

    /// Last synced entry whose start is at or before `t`.
    ///
    /// The scan stops at the first entry starting after `t`, so a later
    /// synced line never shadows an earlier one across an unsynced gap.
    pub fn active_index(&self, t: f64) -> Option<usize> {
        let mut active = None;
        for (i, e) in self.entries.iter().enumerate() {
            if e.start_time > t {
                break;
            }
            if e.is_synced() {
                active = Some(i);
            }
        }
        active
    }

    /// Replace the line content with a fresh parse, keeping recorded times
    /// when the shapes line up.
    pub fn replace_preserving_times(&mut self, new_entries: Vec<LyricEntry>) -> LyrvidResult<()> {
        self.ensure_unlocked()?;
        let old = std::mem::replace(&mut self.entries, new_entries);
        merge_times_by_position(&old, &mut self.entries);
        Ok(())
    }
}

/// Positional time merge: entry `i` inherits entry `i`'s old timing, only
/// when both lists have the same length.
///
/// Deliberately its own function so a content-aware strategy can swap in
/// without touching callers.
fn merge_times_by_position(old: &[LyricEntry], new: &mut [LyricEntry]) {
    if old.len() != new.len() {
        return;
    }
    for (o, n) in old.iter().zip(new.iter_mut()) {
        n.start_time = o.start_time;
        n.end_time = o.end_time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synced(text: &str, start: f64) -> LyricEntry {
        let mut e = LyricEntry::plain(text);
        e.start_time = start;
        e
    }

    fn store3() -> LyricStore {
        LyricStore::new(vec![synced("a", 1.0), synced("b", 4.0), synced("c", 9.0)])
    }

    #[test]
    fn active_index_picks_last_started_line() {
        let s = store3();
        assert_eq!(s.active_index(0.0), None);
        assert_eq!(s.active_index(1.0), Some(0));
        assert_eq!(s.active_index(3.9), Some(0));
        assert_eq!(s.active_index(4.0), Some(1));
        assert_eq!(s.active_index(100.0), Some(2));
    }

    #[test]
    fn active_index_skips_unsynced_lines() {
        let mut entries = vec![synced("a", 1.0), LyricEntry::plain("b"), synced("c", 9.0)];
        entries[1].start_time = UNSET_TIME;
        let s = LyricStore::new(entries);
        // The unsynced line sorts before t but never becomes active; the
        // scan also must not stop on it.
        assert_eq!(s.active_index(2.0), Some(0));
        assert_eq!(s.active_index(10.0), Some(2));
    }

    #[test]
    fn out_of_bounds_edits_are_no_ops() {
        let mut s = store3();
        s.set_text(99, "x").unwrap();
        s.remove(99).unwrap();
        s.duplicate(99).unwrap();
        s.move_entry(99, MoveDir::Up).unwrap();
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn locked_store_rejects_edits_but_allows_taps() {
        let mut s = store3();
        s.lock();
        assert!(s.set_text(0, "x").is_err());
        assert!(s.remove(0).is_err());
        assert!(s.duplicate(0).is_err());
        s.record_tap(0, 42.0);
        assert_eq!(s.get(0).unwrap().start_time, 42.0);
        s.unlock();
        assert!(s.set_text(0, "x").is_ok());
    }

    #[test]
    fn duplicate_shifts_copy_after_original_end() {
        let mut s = store3();
        s.duplicate(0).unwrap();
        assert_eq!(s.len(), 4);
        let copy = s.get(1).unwrap();
        // Original had no explicit end: copy starts at start + 3.
        assert_eq!(copy.start_time, 4.0);
        assert_eq!(copy.end_time, Some(7.0));
        assert_eq!(copy.text, "a");
    }

    #[test]
    fn move_entry_swaps_and_clamps_at_edges() {
        let mut s = store3();
        s.move_entry(0, MoveDir::Up).unwrap();
        assert_eq!(s.get(0).unwrap().text, "a");
        s.move_entry(0, MoveDir::Down).unwrap();
        assert_eq!(s.get(0).unwrap().text, "b");
        assert_eq!(s.get(1).unwrap().text, "a");
        s.move_entry(2, MoveDir::Down).unwrap();
        assert_eq!(s.get(2).unwrap().text, "c");
    }

    #[test]
    fn instrumental_spans_gap_between_neighbors() {
        let mut s = store3();
        s.insert_instrumental(1).unwrap();
        let gap = s.get(1).unwrap();
        assert_eq!(gap.kind, EntryKind::Instrumental);
        // Previous line "a" has no explicit end, so the break starts at
        // its start time.
        assert_eq!(gap.start_time, 1.0);
        assert_eq!(gap.end_time, Some(4.0));
        assert_eq!(gap.syllables.len(), 1);
        assert_eq!(gap.syllables[0].begin, 1.0);
        assert_eq!(gap.syllables[0].end, 4.0);
    }

    #[test]
    fn instrumental_at_front_starts_at_zero() {
        let mut s = store3();
        s.insert_instrumental(0).unwrap();
        assert_eq!(s.get(0).unwrap().start_time, 0.0);
        assert_eq!(s.get(0).unwrap().end_time, Some(1.0));
    }

    #[test]
    fn replace_preserving_times_merges_equal_lengths() {
        let mut s = store3();
        let new = vec![
            LyricEntry::plain("x"),
            LyricEntry::plain("y"),
            LyricEntry::plain("z"),
        ];
        s.replace_preserving_times(new).unwrap();
        assert_eq!(s.get(0).unwrap().text, "x");
        assert_eq!(s.get(0).unwrap().start_time, 1.0);
        assert_eq!(s.get(2).unwrap().start_time, 9.0);
    }

    #[test]
    fn replace_preserving_times_keeps_new_times_on_length_mismatch() {
        let mut s = store3();
        let new = vec![LyricEntry::plain("x"), LyricEntry::plain("y")];
        s.replace_preserving_times(new).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.get(0).unwrap().start_time, UNSET_TIME);
    }
}
