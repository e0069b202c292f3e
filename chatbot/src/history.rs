//! The ordered transcript owned by a single conversation.
use crate::message::{Role, Turn};

/// Append-only (apart from explicit eviction and reset) sequence of turns in chronological order.
///
/// With a retained-turn limit set, the oldest turns are evicted on [`History::push`]. Eviction
/// always removes whole exchanges, so the retained turns begin with a user turn.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct History {
    turns: Vec<Turn>,
    limit: Option<usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_limit(limit: Option<usize>) -> Self {
        Self {
            turns: vec![],
            limit,
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.evict();
    }

    pub fn extend(&mut self, turns: impl IntoIterator<Item = Turn>) {
        self.turns.extend(turns);
        self.evict();
    }

    fn evict(&mut self) {
        let Some(limit) = self.limit else {
            return;
        };
        if self.turns.len() <= limit {
            return;
        }
        let cut = self.turns.len() - limit;
        // Without a user turn past the cut, fall back to keeping the last `limit` turns
        let start = match exchange_start(&self.turns, cut) {
            start if start == self.turns.len() => cut,
            start => start,
        };
        log::debug!("Evicting {start} turns from history");
        self.turns.drain(..start);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// The most recent `max_turns` turns, moved forward so the window opens on a user turn.
    pub fn window(&self, max_turns: Option<usize>) -> &[Turn] {
        match max_turns {
            None => &self.turns,
            Some(n) => {
                let start = self.turns.len().saturating_sub(n);
                &self.turns[exchange_start(&self.turns, start)..]
            }
        }
    }
}

/// Drop the oldest exchange from a window of turns.
pub fn drop_oldest_exchange(turns: &[Turn]) -> &[Turn] {
    if turns.is_empty() {
        return turns;
    }
    &turns[exchange_start(turns, 1)..]
}

// First index at or after `from` holding a user turn (or the end of `turns`).
fn exchange_start(turns: &[Turn], from: usize) -> usize {
    turns[from.min(turns.len())..]
        .iter()
        .position(|t| t.role() == Role::User)
        .map_or(turns.len(), |i| from + i)
}
