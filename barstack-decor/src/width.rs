//! Width configuration shared by all decorators.

use crate::sync::SyncSlots;

/// Which side of a padded fragment the text sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    /// Padding goes on the left.
    #[default]
    Right,
    /// Padding goes on the right.
    Left,
}

/// How a decorator's text is padded into its column.
///
/// `width` is a minimum. With `sync` set, the decorator joins its column's
/// width rendezvous and is padded to the widest fragment in that column
/// across all bars. `extra_space` widens the final fragment by one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WidthConfig {
    pub width: usize,
    pub align: Align,
    pub extra_space: bool,
    pub sync: bool,
}

impl WidthConfig {
    /// Fixed minimum width, right aligned, no synchronization.
    pub fn fixed(width: usize) -> Self {
        Self {
            width,
            ..Default::default()
        }
    }

    /// Synchronized width, right aligned.
    pub fn synced() -> Self {
        Self {
            sync: true,
            ..Default::default()
        }
    }

    /// Synchronized width, left aligned.
    pub fn synced_left() -> Self {
        Self {
            sync: true,
            align: Align::Left,
            ..Default::default()
        }
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn with_align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    pub fn with_extra_space(mut self) -> Self {
        self.extra_space = true;
        self
    }

    /// Number of synchronized columns a decorator with this config occupies.
    pub fn sync_columns(&self) -> usize {
        usize::from(self.sync)
    }

    /// Pad `msg` to the configured minimum width.
    pub fn format_static(&self, msg: &str) -> String {
        pad(msg, self.width, self.align)
    }

    /// Pad `msg` to an agreed column width.
    pub fn format_agreed(&self, msg: &str, agreed: usize) -> String {
        let target = agreed + usize::from(self.extra_space);
        pad(msg, target, self.align)
    }

    /// Format `msg`, joining the column rendezvous when synchronized.
    ///
    /// Takes one slot from `slots` when `sync` is set. Without a slot the
    /// static format applies.
    pub async fn format(&self, msg: String, slots: &mut SyncSlots) -> String {
        if !self.sync {
            return self.format_static(&msg);
        }
        match slots.next_slot() {
            Some(slot) => {
                let agreed = slot.sync(rune_len(&msg)).await;
                self.format_agreed(&msg, agreed)
            }
            None => self.format_static(&msg),
        }
    }
}

/// Length of `s` in characters.
pub fn rune_len(s: &str) -> usize {
    s.chars().count()
}

/// Pad `msg` with spaces up to `width` characters. Longer text is kept whole.
pub fn pad(msg: &str, width: usize, align: Align) -> String {
    let len = rune_len(msg);
    if len >= width {
        return msg.to_string();
    }
    let fill = " ".repeat(width - len);
    match align {
        Align::Right => format!("{fill}{msg}"),
        Align::Left => format!("{msg}{fill}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{channel, synchronize};

    #[test]
    fn pad_right_and_left() {
        assert_eq!(pad("ab", 4, Align::Right), "  ab");
        assert_eq!(pad("ab", 4, Align::Left), "ab  ");
        assert_eq!(pad("abcdef", 4, Align::Left), "abcdef");
    }

    #[test]
    fn pad_counts_characters_not_bytes() {
        assert_eq!(pad("µs", 3, Align::Right), " µs");
    }

    #[test]
    fn extra_space_widens_agreed_width() {
        let wc = WidthConfig::synced().with_extra_space();
        assert_eq!(wc.format_agreed("7/10", 7), "    7/10");
    }

    #[tokio::test]
    async fn unsynced_config_ignores_slots() {
        let (side, _column) = channel();
        let mut slots = SyncSlots::new(vec![side]);
        let out = WidthConfig::fixed(5).format("ab".into(), &mut slots).await;
        assert_eq!(out, "   ab");
        assert_eq!(slots.remaining(), 1);
    }

    #[tokio::test]
    async fn synced_fragments_share_a_width() {
        let (a, col_a) = channel();
        let (b, col_b) = channel();
        tokio::spawn(synchronize(vec![col_a, col_b]));

        let wc = WidthConfig::synced_left();
        let mut slots_a = SyncSlots::new(vec![a]);
        let mut slots_b = SyncSlots::new(vec![b]);
        let (out_a, out_b) = tokio::join!(
            wc.format("7/10".into(), &mut slots_a),
            wc.format("123/456".into(), &mut slots_b),
        );
        assert_eq!(out_a, "7/10   ");
        assert_eq!(out_b, "123/456");
    }
}
