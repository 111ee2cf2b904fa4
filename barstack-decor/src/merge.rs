//! A decorator whose text spans several synchronized columns.
//!
//! ```text
//!   +--------+---------+
//!   |    MERGE(D)      |   bar 0: D plus one placeholder
//!   +--------+---------+
//!   |   D1   |   D2    |   bar 1: two synchronized decorators
//!   +--------+---------+
//! ```
//!
//! The merged decorator splits its text width over its own column and the
//! placeholder columns, lets every column agree on a width as usual, then
//! pads its full text to the sum of the agreed widths. The placeholders
//! themselves print nothing. A placeholder that is not synchronized takes no
//! column and only adds its static width.

use async_trait::async_trait;

use crate::decorator::Decorator;
use crate::stats::Statistics;
use crate::sync::SyncSlots;
use crate::width::{rune_len, WidthConfig};

/// Merge `inner` with `placeholders` columns following it.
///
/// Returns `inner` unchanged when it is not synchronized or there are no
/// placeholders, since there is nothing to span.
pub fn merge(inner: Box<dyn Decorator>, placeholders: Vec<WidthConfig>) -> Box<dyn Decorator> {
    if !inner.config().sync || placeholders.is_empty() {
        return inner;
    }
    Box::new(Merge {
        inner,
        placeholders,
    })
}

/// Split `len` into `parts` shares, the first absorbing the remainder.
pub fn split_width(len: usize, parts: usize) -> Vec<usize> {
    if parts == 0 {
        return Vec::new();
    }
    let share = len / parts;
    let mut shares = vec![share; parts];
    shares[0] += len % parts;
    shares
}

struct Merge {
    inner: Box<dyn Decorator>,
    placeholders: Vec<WidthConfig>,
}

impl Merge {
    /// Width a placeholder contributes for a given share.
    ///
    /// A blank of the share's width goes through the placeholder's own
    /// padding rules, so minimum widths and extra space count as well.
    fn placeholder_width(wc: &WidthConfig, share: usize) -> usize {
        let blank = " ".repeat(share);
        let formatted = if wc.sync {
            wc.format_agreed(&blank, share)
        } else {
            wc.format_static(&blank)
        };
        rune_len(&formatted)
    }
}

#[async_trait]
impl Decorator for Merge {
    fn decor(&self, stats: &Statistics) -> String {
        self.inner.decor(stats)
    }

    fn config(&self) -> WidthConfig {
        self.inner.config()
    }

    fn sync_columns(&self) -> usize {
        1 + self
            .placeholders
            .iter()
            .map(WidthConfig::sync_columns)
            .sum::<usize>()
    }

    async fn render(&self, stats: &Statistics, slots: &mut SyncSlots) -> String {
        let wc = self.inner.config();
        let msg = self.inner.decor(stats);
        let shares = split_width(rune_len(&msg), self.placeholders.len() + 1);

        let own = slots.next_slot().map(|slot| slot.submit(shares[0]));
        let mut local = 0;
        let mut pending = Vec::with_capacity(self.placeholders.len());
        for (ph, share) in self.placeholders.iter().zip(&shares[1..]) {
            let width = Self::placeholder_width(ph, *share);
            let slot = if ph.sync { slots.next_slot() } else { None };
            match slot {
                Some(slot) => pending.push(slot.submit(width)),
                None => local += width,
            }
        }

        let mut combined = local;
        combined += match own {
            Some(agreed) => agreed.wait().await,
            None => shares[0],
        };
        for agreed in pending {
            combined += agreed.wait().await;
        }
        wc.format_agreed(&msg, combined)
    }
}
