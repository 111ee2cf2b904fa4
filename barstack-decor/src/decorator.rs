//! The decorator trait and the built-in decorators.

use std::time::Duration;

use async_trait::async_trait;

use crate::stats::Statistics;
use crate::sync::SyncSlots;
use crate::width::WidthConfig;

/// A text fragment of a bar's line, recomputed every frame.
///
/// Implementors only need [`decor`](Decorator::decor). Overriding
/// [`config`](Decorator::config) with a synchronized [`WidthConfig`] makes
/// the fragment line up with the same column of the other bars.
#[async_trait]
pub trait Decorator: Send + Sync {
    /// Raw text for the given statistics.
    fn decor(&self, stats: &Statistics) -> String;

    /// Padding rules for the text returned by [`decor`](Decorator::decor).
    fn config(&self) -> WidthConfig {
        WidthConfig::default()
    }

    /// Number of synchronized columns this decorator occupies in its track.
    fn sync_columns(&self) -> usize {
        self.config().sync_columns()
    }

    /// Produce the final, padded fragment.
    ///
    /// Takes exactly [`sync_columns`](Decorator::sync_columns) slots.
    async fn render(&self, stats: &Statistics, slots: &mut SyncSlots) -> String {
        let msg = self.decor(stats);
        self.config().format(msg, slots).await
    }
}

/// Static text, e.g. a bar label.
pub fn name(text: impl Into<String>, wc: WidthConfig) -> Box<dyn Decorator> {
    Box::new(Name {
        text: text.into(),
        wc,
    })
}

/// `current / total` counters.
pub fn counters(wc: WidthConfig) -> Box<dyn Decorator> {
    Box::new(Counters { wc })
}

/// Whole percentage, e.g. `42 %`.
pub fn percentage(wc: WidthConfig) -> Box<dyn Decorator> {
    Box::new(Percentage { wc })
}

/// Time since the bar was created, e.g. `1m05s`.
pub fn elapsed(wc: WidthConfig) -> Box<dyn Decorator> {
    Box::new(Elapsed { wc })
}

/// Text computed by a closure.
pub fn any<F>(f: F, wc: WidthConfig) -> Box<dyn Decorator>
where
    F: Fn(&Statistics) -> String + Send + Sync + 'static,
{
    Box::new(Any { f: Box::new(f), wc })
}

/// Show `message` instead of `inner`'s text once the bar completes.
pub fn on_complete(inner: Box<dyn Decorator>, message: impl Into<String>) -> Box<dyn Decorator> {
    Box::new(OnComplete {
        inner,
        message: message.into(),
    })
}

struct Name {
    text: String,
    wc: WidthConfig,
}

impl Decorator for Name {
    fn decor(&self, _stats: &Statistics) -> String {
        self.text.clone()
    }

    fn config(&self) -> WidthConfig {
        self.wc
    }
}

struct Counters {
    wc: WidthConfig,
}

impl Decorator for Counters {
    fn decor(&self, stats: &Statistics) -> String {
        if stats.is_indeterminate() {
            return format!("{} / ?", stats.current);
        }
        format!("{} / {}", stats.current, stats.total)
    }

    fn config(&self) -> WidthConfig {
        self.wc
    }
}

struct Percentage {
    wc: WidthConfig,
}

impl Decorator for Percentage {
    fn decor(&self, stats: &Statistics) -> String {
        format!("{} %", stats.percent())
    }

    fn config(&self) -> WidthConfig {
        self.wc
    }
}

struct Elapsed {
    wc: WidthConfig,
}

impl Decorator for Elapsed {
    fn decor(&self, stats: &Statistics) -> String {
        format_elapsed(stats.elapsed)
    }

    fn config(&self) -> WidthConfig {
        self.wc
    }
}

type DecorFn = Box<dyn Fn(&Statistics) -> String + Send + Sync>;

struct Any {
    f: DecorFn,
    wc: WidthConfig,
}

impl Decorator for Any {
    fn decor(&self, stats: &Statistics) -> String {
        (self.f)(stats)
    }

    fn config(&self) -> WidthConfig {
        self.wc
    }
}

struct OnComplete {
    inner: Box<dyn Decorator>,
    message: String,
}

#[async_trait]
impl Decorator for OnComplete {
    fn decor(&self, stats: &Statistics) -> String {
        if stats.completed {
            return self.message.clone();
        }
        self.inner.decor(stats)
    }

    fn config(&self) -> WidthConfig {
        self.inner.config()
    }

    fn sync_columns(&self) -> usize {
        self.inner.sync_columns()
    }

    async fn render(&self, stats: &Statistics, slots: &mut SyncSlots) -> String {
        if !stats.completed {
            return self.inner.render(stats, slots).await;
        }
        let out = self.config().format(self.message.clone(), slots).await;
        // Release any further columns the inner decorator spans.
        for _ in 1..self.sync_columns() {
            drop(slots.next_slot());
        }
        out
    }
}

/// Format an elapsed duration as `45s`, `3m07s` or `1h02m09s`.
pub fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h{:02}m{:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::width::Align;

    fn stats(current: u64, total: u64) -> Statistics {
        Statistics {
            current,
            total,
            completed: total > 0 && current >= total,
            ..Default::default()
        }
    }

    #[test]
    fn counters_text() {
        let d = counters(WidthConfig::default());
        assert_eq!(d.decor(&stats(7, 10)), "7 / 10");
        assert_eq!(d.decor(&stats(7, 0)), "7 / ?");
    }

    #[test]
    fn percentage_text() {
        let d = percentage(WidthConfig::default());
        assert_eq!(d.decor(&stats(42, 100)), "42 %");
    }

    #[test]
    fn elapsed_formats() {
        assert_eq!(format_elapsed(Duration::from_secs(45)), "45s");
        assert_eq!(format_elapsed(Duration::from_secs(187)), "3m07s");
        assert_eq!(format_elapsed(Duration::from_secs(3729)), "1h02m09s");
    }

    #[test]
    fn sync_columns_follow_config() {
        assert_eq!(name("a", WidthConfig::fixed(3)).sync_columns(), 0);
        assert_eq!(name("a", WidthConfig::synced()).sync_columns(), 1);
    }

    #[tokio::test]
    async fn unsynced_render_uses_minimum_width() {
        let d = name("job", WidthConfig::fixed(6).with_align(Align::Left));
        let mut slots = SyncSlots::default();
        assert_eq!(d.render(&stats(0, 1), &mut slots).await, "job   ");
    }

    #[tokio::test]
    async fn on_complete_swaps_message() {
        let d = on_complete(percentage(WidthConfig::fixed(5)), "done");
        let mut slots = SyncSlots::default();
        assert_eq!(d.render(&stats(5, 10), &mut slots).await, " 50 %");
        assert_eq!(d.render(&stats(10, 10), &mut slots).await, " done");
    }

    #[test]
    fn closure_decorator() {
        let d = any(|st| format!("#{}", st.id), WidthConfig::default());
        let st = Statistics {
            id: 3,
            ..Default::default()
        };
        assert_eq!(d.decor(&st), "#3");
    }
}
