//! Column groupings for width synchronization.
//!
//! The matrix records, per decorator track and per synchronized column,
//! which bars contribute a fragment. It only changes when the set of queued
//! bars changes. Every frame it hands out fresh rendezvous pairs: one side
//! to each contributing bar, the other side to a synchronizer task for the
//! column.

use std::collections::{BTreeMap, HashMap};

use barstack_decor::sync::{self, ColumnMember, WidthSync};

use crate::bar::BarId;

/// Per-frame sync slots for one bar, in column order.
#[derive(Debug, Default)]
pub struct RenderSync {
    pub prepend: Vec<WidthSync>,
    pub append: Vec<WidthSync>,
}

/// Synchronized column counts of one bar's two decorator tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncColumns {
    pub prepend: usize,
    pub append: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Track {
    Prepend,
    Append,
}

#[derive(Debug, Default)]
pub struct SyncMatrix {
    prepend: BTreeMap<usize, Vec<BarId>>,
    append: BTreeMap<usize, Vec<BarId>>,
}

impl SyncMatrix {
    /// Group bars by column, keeping the given bar order inside each column.
    pub fn build(bars: impl IntoIterator<Item = (BarId, SyncColumns)>) -> Self {
        let mut matrix = Self::default();
        for (id, columns) in bars {
            for column in 0..columns.prepend {
                matrix.prepend.entry(column).or_default().push(id);
            }
            for column in 0..columns.append {
                matrix.append.entry(column).or_default().push(id);
            }
        }
        matrix
    }

    /// Number of synchronized columns in each track.
    pub fn column_count(&self) -> (usize, usize) {
        (self.prepend.len(), self.append.len())
    }

    /// Contributors of one prepend column.
    pub fn prepend_column(&self, column: usize) -> Option<&[BarId]> {
        self.prepend.get(&column).map(Vec::as_slice)
    }

    /// Contributors of one append column.
    pub fn append_column(&self, column: usize) -> Option<&[BarId]> {
        self.append.get(&column).map(Vec::as_slice)
    }

    /// Create this frame's rendezvous pairs.
    ///
    /// Returns the decorator sides keyed by bar and the column sides, one
    /// group per column of either track.
    pub fn instantiate(&self) -> (HashMap<BarId, RenderSync>, Vec<Vec<ColumnMember>>) {
        let mut bars: HashMap<BarId, RenderSync> = HashMap::new();
        let mut columns = Vec::with_capacity(self.prepend.len() + self.append.len());
        for (track, table) in [(Track::Prepend, &self.prepend), (Track::Append, &self.append)] {
            for ids in table.values() {
                let mut members = Vec::with_capacity(ids.len());
                for id in ids {
                    let (slot, member) = sync::channel();
                    let entry = bars.entry(*id).or_default();
                    match track {
                        Track::Prepend => entry.prepend.push(slot),
                        Track::Append => entry.append.push(slot),
                    }
                    members.push(member);
                }
                columns.push(members);
            }
        }
        (bars, columns)
    }

    /// Create this frame's pairs and start one synchronizer per column.
    ///
    /// Must be called within a Tokio runtime.
    pub fn launch(&self) -> HashMap<BarId, RenderSync> {
        let (bars, columns) = self.instantiate();
        for column in columns {
            tokio::spawn(sync::synchronize(column));
        }
        bars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(prepend: usize, append: usize) -> SyncColumns {
        SyncColumns { prepend, append }
    }

    #[test]
    fn groups_bars_by_column_in_order() {
        let matrix = SyncMatrix::build([(3, cols(2, 1)), (1, cols(1, 0)), (2, cols(0, 2))]);
        assert_eq!(matrix.column_count(), (2, 2));
        assert_eq!(matrix.prepend_column(0), Some(&[3, 1][..]));
        assert_eq!(matrix.prepend_column(1), Some(&[3][..]));
        assert_eq!(matrix.append_column(0), Some(&[3, 2][..]));
        assert_eq!(matrix.append_column(1), Some(&[2][..]));
        assert_eq!(matrix.prepend_column(2), None);
    }

    #[test]
    fn bars_without_sync_get_no_slots() {
        let matrix = SyncMatrix::build([(0, cols(0, 0)), (1, cols(1, 0))]);
        let (bars, columns) = matrix.instantiate();
        assert!(!bars.contains_key(&0));
        assert_eq!(bars[&1].prepend.len(), 1);
        assert_eq!(columns.len(), 1);
    }

    #[test]
    fn every_slot_has_a_column_member() {
        let matrix = SyncMatrix::build([(0, cols(2, 1)), (1, cols(3, 0)), (2, cols(1, 1))]);
        let (bars, columns) = matrix.instantiate();
        let slots: usize = bars.values().map(|s| s.prepend.len() + s.append.len()).sum();
        let members: usize = columns.iter().map(Vec::len).sum();
        assert_eq!(slots, members);
        assert_eq!(bars[&1].prepend.len(), 3);
        assert_eq!(bars[&2].append.len(), 1);
    }

    #[tokio::test]
    async fn launched_columns_agree() {
        let matrix = SyncMatrix::build([(0, cols(1, 0)), (1, cols(1, 0))]);
        let mut bars = matrix.launch();
        let a = bars.remove(&0).unwrap().prepend.pop().unwrap();
        let b = bars.remove(&1).unwrap().prepend.pop().unwrap();
        let (wa, wb) = tokio::join!(a.sync(3), b.sync(8));
        assert_eq!((wa, wb), (8, 8));
    }
}
