//! ============================================================================
//! Retention Store - Append-only, size-bounded turn sequence
//! ============================================================================
//! The minimal memory backend: strict FIFO eviction once the retention bound
//! is exceeded, never a capacity error. Turn indices are monotonic and do
//! not reset when old turns are evicted.
//! ============================================================================

use std::collections::VecDeque;
use tracing::debug;

use super::types::TurnRecord;

/// Size-bounded store of completed turns, oldest-first
#[derive(Debug)]
pub struct RetentionStore {
    turns: VecDeque<TurnRecord>,
    max_history: usize,
    next_index: u64,
}

impl RetentionStore {
    /// Create a store that keeps at most `max_history` turns
    pub fn new(max_history: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(max_history.min(64)),
            max_history,
            next_index: 0,
        }
    }

    /// Index the next appended turn will receive
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Append a completed turn, evicting the oldest once the retention
    /// bound is exceeded. Returns the index assigned to the turn.
    ///
    /// Callers must not append the same logical turn twice; duplicates are
    /// not detected here.
    pub fn append(&mut self, mut turn: TurnRecord) -> u64 {
        turn.turn_index = self.next_index;
        let index = turn.turn_index;
        self.next_index += 1;

        self.turns.push_back(turn);

        while self.turns.len() > self.max_history {
            if let Some(evicted) = self.turns.pop_front() {
                debug!(
                    "Evicted turn #{}: {}...",
                    evicted.turn_index,
                    evicted.user_input.chars().take(50).collect::<String>()
                );
            }
        }

        index
    }

    /// All retained turns, oldest-first
    pub fn all(&self) -> impl Iterator<Item = &TurnRecord> {
        self.turns.iter()
    }

    /// The last `n` turns, oldest-first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &TurnRecord> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip)
    }

    /// Look up a retained turn by its index
    pub fn get(&self, turn_index: u64) -> Option<&TurnRecord> {
        self.turns.iter().find(|t| t.turn_index == turn_index)
    }

    /// Index of the oldest retained turn, if any
    pub fn oldest_index(&self) -> Option<u64> {
        self.turns.front().map(|t| t.turn_index)
    }

    /// Most recently appended turn
    pub fn latest(&self) -> Option<&TurnRecord> {
        self.turns.back()
    }

    /// Replace the most recent turn's digest (manual re-summarization)
    pub fn set_latest_summary(&mut self, summary: String) {
        if let Some(turn) = self.turns.back_mut() {
            turn.summary = summary;
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Remove all retained turns. The index counter keeps counting so
    /// indices stay strictly increasing for the session's lifetime.
    pub fn clear(&mut self) {
        let count = self.turns.len();
        self.turns.clear();
        debug!("Cleared retention store: removed {} turns", count);
    }

    /// Replace the store's contents from a snapshot, oldest-first. The
    /// index counter resumes above the highest restored index.
    pub fn restore(&mut self, turns: Vec<TurnRecord>) {
        self.turns = turns.into_iter().collect();
        while self.turns.len() > self.max_history {
            self.turns.pop_front();
        }
        self.next_index = self.turns.back().map(|t| t.turn_index + 1).unwrap_or(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(input: &str) -> TurnRecord {
        TurnRecord::new(0, input.into(), format!("re: {}", input), vec![])
    }

    #[test]
    fn test_append_assigns_increasing_indices() {
        let mut store = RetentionStore::new(10);
        assert_eq!(store.append(turn("a")), 0);
        assert_eq!(store.append(turn("b")), 1);
        assert_eq!(store.append(turn("c")), 2);

        let indices: Vec<u64> = store.all().map(|t| t.turn_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_fifo_eviction_at_bound() {
        let mut store = RetentionStore::new(3);
        for input in ["1", "2", "3", "4"] {
            store.append(turn(input));
        }

        // max_history=3, recorded 1,2,3,4 -> retains [2,3,4]
        assert_eq!(store.len(), 3);
        let inputs: Vec<&str> = store.all().map(|t| t.user_input.as_str()).collect();
        assert_eq!(inputs, vec!["2", "3", "4"]);

        // Indices keep increasing past the eviction
        let indices: Vec<u64> = store.all().map(|t| t.turn_index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(store.oldest_index(), Some(1));
    }

    #[test]
    fn test_recent_window() {
        let mut store = RetentionStore::new(10);
        for input in ["a", "b", "c", "d"] {
            store.append(turn(input));
        }

        let recent: Vec<&str> = store.recent(2).map(|t| t.user_input.as_str()).collect();
        assert_eq!(recent, vec!["c", "d"]);

        // Window larger than contents returns everything
        let recent: Vec<&str> = store.recent(99).map(|t| t.user_input.as_str()).collect();
        assert_eq!(recent, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_clear_keeps_index_monotonic() {
        let mut store = RetentionStore::new(10);
        store.append(turn("a"));
        store.append(turn("b"));
        store.clear();

        assert!(store.is_empty());
        assert_eq!(store.append(turn("c")), 2);
    }

    #[test]
    fn test_restore_resumes_indexing() {
        let mut store = RetentionStore::new(10);
        let mut snapshot = Vec::new();
        for (i, input) in ["a", "b"].iter().enumerate() {
            let mut t = turn(input);
            t.turn_index = i as u64 + 5;
            snapshot.push(t);
        }

        store.restore(snapshot);
        assert_eq!(store.len(), 2);
        assert_eq!(store.append(turn("c")), 7);
    }
}
