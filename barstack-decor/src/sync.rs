//! Width rendezvous between decorators sharing a column.
//!
//! Every synchronized decorator gets one [`WidthSync`] per frame. It submits
//! the width of its own text and waits for the column's agreed width. The
//! other half of each pair, a [`ColumnMember`], goes to the column's
//! synchronizer, which collects all submissions and answers each of them with
//! the maximum.
//!
//! ```text
//!   bar 0 ── WidthSync ──submit(4)──▶ ┐
//!   bar 1 ── WidthSync ──submit(7)──▶ ├─ synchronize ─ max = 7
//!   bar 2 ── WidthSync ──submit(2)──▶ ┘       │
//!      ▲                                      │
//!      └─────────────── reply(7) ◀────────────┘
//! ```
//!
//! Pairs are single use: they are created for one frame and dropped with it.

use tokio::sync::oneshot;

/// Create a connected pair for one decorator slot in one frame.
pub fn channel() -> (WidthSync, ColumnMember) {
    let (report_tx, report_rx) = oneshot::channel();
    let (reply_tx, reply_rx) = oneshot::channel();
    (
        WidthSync {
            report: report_tx,
            reply: reply_rx,
        },
        ColumnMember {
            report: report_rx,
            reply: reply_tx,
        },
    )
}

/// Decorator side of a width rendezvous.
#[derive(Debug)]
pub struct WidthSync {
    report: oneshot::Sender<usize>,
    reply: oneshot::Receiver<usize>,
}

impl WidthSync {
    /// Report a measured width without waiting for the answer.
    ///
    /// Submitting never blocks, which lets a decorator that spans several
    /// columns report all of them before it waits on any.
    pub fn submit(self, width: usize) -> AgreedWidth {
        // A missing synchronizer is handled when waiting.
        let _ = self.report.send(width);
        AgreedWidth {
            reply: self.reply,
            fallback: width,
        }
    }

    /// Report a width and wait for the column's agreed width.
    pub async fn sync(self, width: usize) -> usize {
        self.submit(width).wait().await
    }
}

/// Pending answer for a submitted width.
#[derive(Debug)]
pub struct AgreedWidth {
    reply: oneshot::Receiver<usize>,
    fallback: usize,
}

impl AgreedWidth {
    /// Wait for the agreed width.
    ///
    /// Falls back to the submitted width if the synchronizer went away.
    pub async fn wait(self) -> usize {
        self.reply.await.unwrap_or(self.fallback)
    }
}

/// Column side of a width rendezvous.
#[derive(Debug)]
pub struct ColumnMember {
    report: oneshot::Receiver<usize>,
    reply: oneshot::Sender<usize>,
}

/// Agree on the width of one column.
///
/// Receives one width from every member, then replies to every member that
/// reported with the maximum. Members whose decorator side was dropped
/// without reporting are left out. Returns the agreed width.
pub async fn synchronize(column: Vec<ColumnMember>) -> usize {
    let mut max_width = 0;
    let mut replies = Vec::with_capacity(column.len());
    for member in column {
        if let Ok(width) = member.report.await {
            max_width = max_width.max(width);
            replies.push(member.reply);
        }
    }
    for reply in replies {
        let _ = reply.send(max_width);
    }
    max_width
}

/// The ordered slots handed to one bar's decorator track for one frame.
///
/// Decorators take slots front to back, one per synchronized column they
/// occupy.
#[derive(Debug, Default)]
pub struct SyncSlots {
    slots: std::vec::IntoIter<WidthSync>,
}

impl SyncSlots {
    pub fn new(slots: Vec<WidthSync>) -> Self {
        Self {
            slots: slots.into_iter(),
        }
    }

    /// Take the next slot, if the track has one left.
    pub fn next_slot(&mut self) -> Option<WidthSync> {
        self.slots.next()
    }

    /// Number of slots not yet taken.
    pub fn remaining(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn all_members_observe_the_maximum() {
        let (decor_sides, column): (Vec<_>, Vec<_>) = (0..3).map(|_| channel()).unzip();
        let sync = tokio::spawn(synchronize(column));

        let widths = [4usize, 7, 2];
        let mut waits = Vec::new();
        for (side, width) in decor_sides.into_iter().zip(widths) {
            waits.push(tokio::spawn(side.sync(width)));
        }

        for wait in waits {
            assert_eq!(wait.await.unwrap(), 7);
        }
        assert_eq!(sync.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn dropped_member_is_skipped() {
        let (a, col_a) = channel();
        let (b, col_b) = channel();
        let sync = tokio::spawn(synchronize(vec![col_a, col_b]));

        drop(b);
        assert_eq!(a.sync(5).await, 5);
        assert_eq!(sync.await.unwrap(), 5);
    }

    #[tokio::test]
    async fn missing_synchronizer_falls_back_to_own_width() {
        let (side, column) = channel();
        drop(column);
        assert_eq!(side.sync(9).await, 9);
    }

    #[test]
    fn slots_are_taken_in_order() {
        let (a, _ca) = channel();
        let (b, _cb) = channel();
        let mut slots = SyncSlots::new(vec![a, b]);
        assert_eq!(slots.remaining(), 2);
        assert!(slots.next_slot().is_some());
        assert!(slots.next_slot().is_some());
        assert!(slots.next_slot().is_none());
    }
}
