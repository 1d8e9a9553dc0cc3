//! In-memory play queue: ordered track list plus the playing cursor.
//!
//! Owned and mutated exclusively by the synchronizer loop.

use crate::protocol::TrackId;
use crate::report::QueueSnapshot;

/// Outcome of a cursor move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorMove {
    /// Cursor landed on a new current track.
    Moved(TrackId),
    /// The move ran off the end; queue cleared, cursor now empty.
    Exhausted,
    /// There was no current track to move from.
    Empty,
}

/// Ordered track list plus cursor. `cursor == None` means "no current track";
/// otherwise the cursor always indexes into `items`.
#[derive(Debug, Default)]
pub struct QueueState {
    items: Vec<TrackId>,
    cursor: Option<usize>,
}

impl QueueState {
    /// Replace the queue wholesale and place the cursor at `start_index`
    /// (clamped to the last item). Returns the new current track, or `None`
    /// when given an empty list (queue cleared).
    pub fn replace(&mut self, items: Vec<TrackId>, start_index: usize) -> Option<TrackId> {
        if items.is_empty() {
            self.clear();
            return None;
        }
        let cursor = start_index.min(items.len() - 1);
        self.items = items;
        self.cursor = Some(cursor);
        Some(self.items[cursor].clone())
    }

    /// Drop all tracks and the cursor.
    pub fn clear(&mut self) {
        self.items.clear();
        self.cursor = None;
    }

    pub fn current(&self) -> Option<&TrackId> {
        self.cursor.map(|i| &self.items[i])
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Move to the next track. Stops (and clears) when the cursor is already on
    /// the last item, so the cursor can never land out of range.
    pub fn advance(&mut self) -> CursorMove {
        match self.cursor {
            Some(i) if i + 1 < self.items.len() => {
                self.cursor = Some(i + 1);
                CursorMove::Moved(self.items[i + 1].clone())
            }
            Some(_) => {
                self.clear();
                CursorMove::Exhausted
            }
            None => CursorMove::Empty,
        }
    }

    /// Move to the previous track; exhausts at the front like [`advance`].
    ///
    /// [`advance`]: QueueState::advance
    pub fn retreat(&mut self) -> CursorMove {
        match self.cursor {
            Some(i) if i >= 1 => {
                self.cursor = Some(i - 1);
                CursorMove::Moved(self.items[i - 1].clone())
            }
            Some(_) => {
                self.clear();
                CursorMove::Exhausted
            }
            None => CursorMove::Empty,
        }
    }

    /// Queue view attached to playback reports.
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            items: self.items.clone(),
            playing_index: self.cursor,
        }
    }
}
