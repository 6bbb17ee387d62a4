//! History records for history pseudo-states.
//!
//! When a region is exited, every history node directly inside it records
//! what was active: the direct children for shallow history, the leaf
//! states for deep history. Re-entering through the history node restores
//! that record instead of the region's default child.
//!
//! Records are immutable: [`HistoryRecords::record`] returns a new value
//! with the entry replaced, leaving the original untouched.

use super::state::StateId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The last recorded configuration of every history node that has one.
///
/// # Example
///
/// ```rust
/// use harel::builder::{MachineBuilder, StateBuilder};
/// use harel::core::{HistoryKind, HistoryRecords};
///
/// let machine = MachineBuilder::new("player")
///     .context(())
///     .initial("playing")
///     .state(
///         StateBuilder::new("playing")
///             .initial("track1")
///             .state(StateBuilder::new("track1"))
///             .state(StateBuilder::new("track2"))
///             .state(StateBuilder::history("resume", HistoryKind::Shallow)),
///     )
///     .build()
///     .unwrap();
///
/// let resume = machine.get("#player.playing.resume").unwrap();
/// let track2 = machine.get("#player.playing.track2").unwrap();
///
/// let empty = HistoryRecords::new();
/// let recorded = empty.record(resume, vec![track2]);
///
/// assert!(empty.get(resume).is_none());
/// assert_eq!(recorded.get(resume), Some(&[track2][..]));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<HistoryEntry>", from = "Vec<HistoryEntry>")]
pub struct HistoryRecords {
    records: BTreeMap<StateId, Vec<StateId>>,
}

/// Serialized form of one record; JSON object keys must be strings.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct HistoryEntry {
    history: StateId,
    states: Vec<StateId>,
}

impl From<HistoryRecords> for Vec<HistoryEntry> {
    fn from(records: HistoryRecords) -> Self {
        records
            .records
            .into_iter()
            .map(|(history, states)| HistoryEntry { history, states })
            .collect()
    }
}

impl From<Vec<HistoryEntry>> for HistoryRecords {
    fn from(entries: Vec<HistoryEntry>) -> Self {
        entries
            .into_iter()
            .map(|entry| (entry.history, entry.states))
            .collect()
    }
}

impl HistoryRecords {
    /// Create an empty set of records.
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
        }
    }

    /// Record the states remembered by `history`, returning new records.
    pub fn record(&self, history: StateId, states: Vec<StateId>) -> Self {
        let mut records = self.records.clone();
        records.insert(history, states);
        Self { records }
    }

    /// The recorded states of a history node, if it was ever recorded.
    pub fn get(&self, history: StateId) -> Option<&[StateId]> {
        self.records.get(&history).map(Vec::as_slice)
    }

    /// Iterate over `(history node, recorded states)` in document order.
    pub fn iter(&self) -> impl Iterator<Item = (StateId, &[StateId])> {
        self.records
            .iter()
            .map(|(history, states)| (*history, states.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<(StateId, Vec<StateId>)> for HistoryRecords {
    fn from_iter<T: IntoIterator<Item = (StateId, Vec<StateId>)>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
