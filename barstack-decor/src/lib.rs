//! # barstack-decor
//!
//! Decorators for barstack progress bars, and the width rendezvous that keeps
//! decorator columns aligned across bars.
//!
//! A decorator produces one fragment of a bar's line every frame. When its
//! [`WidthConfig`] is synchronized, the fragment is padded to the widest
//! fragment in the same column of every other bar, so stacked bars read like
//! a table even while their text changes length:
//!
//! ```text
//! download    7 / 10   [=====>----]
//! unpack    123 / 456  [=>--------]
//! ```
//!
//! ## Example
//!
//! ```rust
//! use barstack_decor::{decorator, merge, Decorator, WidthConfig};
//!
//! let label = decorator::name("download", WidthConfig::synced_left());
//! let counters = decorator::counters(WidthConfig::synced().with_extra_space());
//!
//! // A header spanning its own column and the next one.
//! let header = merge::merge(
//!     decorator::name("Totals", WidthConfig::synced()),
//!     vec![WidthConfig::synced()],
//! );
//! assert_eq!(header.sync_columns(), 2);
//! # let _ = (label, counters);
//! ```

pub mod decorator;
pub mod merge;
mod stats;
pub mod sync;
mod width;

pub use decorator::Decorator;
pub use stats::Statistics;
pub use sync::{SyncSlots, WidthSync};
pub use width::{pad, rune_len, Align, WidthConfig};
