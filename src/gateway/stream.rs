//! Streaming emitter: turns cumulative-output snapshots into discrete
//! wire-level deltas.

/// Tracks how much of the cumulative output has already been emitted and
/// produces the newly generated suffix for each growing snapshot.
///
/// Snapshots grow append-only, so the emitted length always falls on a
/// character boundary of the next snapshot. Snapshots with no growth are
/// skipped; an empty delta is never produced.
#[derive(Debug, Default)]
pub struct DeltaTracker {
    emitted_len: usize,
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the suffix of `snapshot` beyond the last emitted snapshot,
    /// or `None` when the snapshot has not grown.
    pub fn advance(&mut self, snapshot: &str) -> Option<String> {
        if snapshot.len() <= self.emitted_len {
            return None;
        }
        // get() rather than indexing: a snapshot that rewrote its prefix
        // could land mid-character, and a skipped snapshot beats a panic.
        let delta = snapshot.get(self.emitted_len..)?.to_string();
        self.emitted_len = snapshot.len();
        Some(delta)
    }

    /// Total bytes emitted so far.
    pub fn emitted_len(&self) -> usize {
        self.emitted_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emits_growing_suffixes() {
        let mut tracker = DeltaTracker::new();
        assert_eq!(tracker.advance("Hel"), Some("Hel".to_string()));
        assert_eq!(tracker.advance("Hello"), Some("lo".to_string()));
        assert_eq!(tracker.advance("Hello, world"), Some(", world".to_string()));
    }

    #[test]
    fn test_skips_snapshots_without_growth() {
        let mut tracker = DeltaTracker::new();
        assert_eq!(tracker.advance(""), None);
        assert_eq!(tracker.advance("abc"), Some("abc".to_string()));
        assert_eq!(tracker.advance("abc"), None);
        assert_eq!(tracker.advance("ab"), None);
        // Growth resumes from the last emitted length.
        assert_eq!(tracker.advance("abcd"), Some("d".to_string()));
    }

    #[test]
    fn test_never_emits_empty_delta() {
        let mut tracker = DeltaTracker::new();
        for snapshot in ["", "", "a", "a", "ab"] {
            if let Some(delta) = tracker.advance(snapshot) {
                assert!(!delta.is_empty());
            }
        }
    }

    #[test]
    fn test_multibyte_output() {
        let mut tracker = DeltaTracker::new();
        assert_eq!(tracker.advance("héllo"), Some("héllo".to_string()));
        assert_eq!(tracker.advance("héllo wörld"), Some(" wörld".to_string()));
    }

    #[test]
    fn test_concatenated_deltas_reproduce_final_text() {
        let snapshots = ["T", "Th", "The", "The ", "The quick", "The quick", "The quick fox"];
        let mut tracker = DeltaTracker::new();
        let mut rebuilt = String::new();
        for snapshot in snapshots {
            if let Some(delta) = tracker.advance(snapshot) {
                rebuilt.push_str(&delta);
            }
        }
        assert_eq!(rebuilt, "The quick fox");
    }
}
