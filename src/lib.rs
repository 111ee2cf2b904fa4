//! # barstack
//!
//! Stacked terminal progress bars, redrawn together as one frame.
//!
//! A [`Progress`] container owns any number of bars. Every refresh it renders
//! all of them concurrently, lines up their synchronized decorator columns,
//! and writes the result in priority order, overwriting the previous frame.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      owner task (progress)                   │
//! │                                                              │
//! │  mailbox ──▶ queue ──▶ render bars ──▶ flush ──▶ FrameWriter │
//! │  (ops)      (heap)     (concurrent)   (ordered)              │
//! │                 ▲           │                                │
//! │  refresh ───────┘     width sync per column                  │
//! │  (ticker | manual | force)                                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`progress`]**: the container and its owner loop
//! - **[`bar`]**: bar handles, options and lifecycle
//! - **[`queue`]**: index-tracking priority queue deciding display order
//! - **[`matrix`]**: per-column grouping of synchronized decorators
//! - **[`refresh`]**: refresh sources and their fan-in
//! - **[`filler`]**: bar and spinner fills
//! - **[`writer`]**: the terminal frame writer
//! - **[`settings`]**: file and environment defaults
//!
//! Decorators live in the [`barstack_decor`] crate, re-exported as [`decor`].
//!
//! ## Usage
//!
//! ```no_run
//! use barstack::decor::{decorator, WidthConfig};
//! use barstack::{BarOptions, Progress};
//!
//! # tokio_test::block_on(async {
//! let progress = Progress::new();
//! for name in ["alpha", "beta"] {
//!     let bar = progress
//!         .add_bar(
//!             50,
//!             BarOptions::new()
//!                 .prepend(decorator::name(name, WidthConfig::synced_left()))
//!                 .append(decorator::percentage(WidthConfig::synced())),
//!         )
//!         .await
//!         .unwrap();
//!     tokio::spawn(async move {
//!         for _ in 0..50 {
//!             bar.increment();
//!         }
//!     });
//! }
//! progress.wait().await;
//! # });
//! ```

pub mod bar;
pub mod duration;
pub mod error;
pub mod filler;
pub mod matrix;
pub mod progress;
pub mod queue;
pub mod refresh;
pub mod settings;
pub mod writer;

pub use barstack_decor as decor;

pub use bar::{Bar, BarId, BarOptions, Lifecycle};
pub use error::{Error, Result};
pub use filler::{BarFiller, BarStyle, Filler, SpinnerAlignment, SpinnerFiller};
pub use progress::{Progress, ProgressBuilder, DEFAULT_REFRESH_RATE, DEFAULT_WIDTH};
pub use settings::Settings;
pub use writer::{FrameWriter, TerminalWriter};
