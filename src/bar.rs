//! A single progress line.
//!
//! A bar lives in three pieces:
//!
//! - [`BarCore`]: progress state, filler and decorators, shared between the
//!   caller's [`Bar`] handles and the render task of each frame;
//! - [`BarEntry`]: the container's bookkeeping (priority, lifecycle, frame
//!   channel), only ever touched by the container's owner task;
//! - [`Bar`]: the cloneable handle callers use to report progress.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use barstack_decor::{rune_len, Decorator, Statistics, SyncSlots};
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

use crate::filler::Filler;
use crate::matrix::{RenderSync, SyncColumns};
use crate::progress::Mailbox;
use crate::queue::Prioritized;
use crate::refresh::signalled;

/// Creation id of a bar. Ids grow monotonically per container.
pub type BarId = u64;

/// Where a bar is in its life.
///
/// ```text
///  Parked ──Promote──▶ Queued ──Render──▶ Rendering ──Flushed──▶ Queued
///    │                   │                    │
///    │                   │                Completed
///    │                   │                    ▼
///    └──────Retire───────┴──▶ Retired ◀──Retire── PendingFinalFlush
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Waiting for a predecessor to retire; not rendered.
    Parked,
    /// In the queue, rendered every frame.
    Queued,
    /// Popped for the current frame.
    Rendering,
    /// Completed this frame; its final frame is being flushed.
    PendingFinalFlush,
    /// Out of the queue for good.
    Retired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Promote,
    Render,
    Flushed,
    Completed,
    Retire,
}

impl Lifecycle {
    /// The state reached by applying `transition`, if it is allowed.
    pub fn next(self, transition: Transition) -> Option<Lifecycle> {
        use Lifecycle::*;
        match (self, transition) {
            (Parked, Transition::Promote) => Some(Queued),
            (Queued, Transition::Render) => Some(Rendering),
            (Rendering, Transition::Flushed) => Some(Queued),
            (Rendering, Transition::Completed) => Some(PendingFinalFlush),
            (Parked | Queued | PendingFinalFlush, Transition::Retire) => Some(Retired),
            _ => None,
        }
    }
}

/// Configuration of a bar, applied when it is added to a container.
///
/// ```rust,no_run
/// use barstack::{BarOptions, Progress};
/// use barstack::decor::{decorator, WidthConfig};
///
/// # tokio_test::block_on(async {
/// let progress = Progress::new();
/// let download = progress
///     .add_bar(100, BarOptions::new()
///         .prepend(decorator::name("download", WidthConfig::synced_left()))
///         .append(decorator::percentage(WidthConfig::synced())))
///     .await
///     .unwrap();
///
/// // Shown once "download" retires, in its place.
/// let unpack = progress
///     .add_bar(100, BarOptions::new().park_behind(&download))
///     .await;
/// # });
/// ```
#[derive(Default)]
pub struct BarOptions {
    pub(crate) priority: Option<i32>,
    pub(crate) park_behind: Option<BarId>,
    pub(crate) remove_on_complete: bool,
    pub(crate) prepend: Vec<Box<dyn Decorator>>,
    pub(crate) append: Vec<Box<dyn Decorator>>,
    pub(crate) width: Option<usize>,
    pub(crate) trim_space: bool,
}

impl BarOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display priority. Lower values are drawn higher. Defaults to the
    /// bar's creation id.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Keep the bar hidden until `running` retires, then take its place.
    pub fn park_behind(mut self, running: &Bar) -> Self {
        self.park_behind = Some(running.id());
        self
    }

    /// Erase the bar's line after its final frame instead of keeping it.
    pub fn remove_on_complete(mut self) -> Self {
        self.remove_on_complete = true;
        self
    }

    /// Add a decorator left of the fill.
    pub fn prepend(mut self, decorator: Box<dyn Decorator>) -> Self {
        self.prepend.push(decorator);
        self
    }

    /// Add a decorator right of the fill.
    pub fn append(mut self, decorator: Box<dyn Decorator>) -> Self {
        self.append.push(decorator);
        self
    }

    /// Maximum width of the fill. Defaults to the container width.
    pub fn width(mut self, width: usize) -> Self {
        self.width = Some(width);
        self
    }

    /// Drop the single spaces around the fill.
    pub fn trim_space(mut self) -> Self {
        self.trim_space = true;
        self
    }
}

impl fmt::Debug for BarOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BarOptions")
            .field("priority", &self.priority)
            .field("park_behind", &self.park_behind)
            .field("remove_on_complete", &self.remove_on_complete)
            .field("prepend", &self.prepend.len())
            .field("append", &self.append.len())
            .field("width", &self.width)
            .field("trim_space", &self.trim_space)
            .finish()
    }
}

/// Container services a bar needs after creation.
#[derive(Clone)]
pub(crate) struct BarContext {
    pub mailbox: Arc<Mailbox>,
    pub force_refresh: mpsc::Sender<Instant>,
    pub default_width: usize,
}

/// One rendered frame of a bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Frame {
    pub text: String,
    /// Physical lines, including extended ones.
    pub lines: usize,
    /// The bar completed since its previous frame.
    pub to_shutdown: bool,
    /// Rendering panicked; the bar must go.
    pub panicked: bool,
}

impl Frame {
    fn blank() -> Self {
        Self {
            text: "\n".to_string(),
            lines: 1,
            to_shutdown: false,
            panicked: false,
        }
    }
}

#[derive(Debug)]
struct BarState {
    current: u64,
    total: u64,
    completed: bool,
    complete_flushed: bool,
    panic_msg: Option<String>,
    started: Instant,
    /// Run time, frozen at completion.
    took: Option<Duration>,
}

impl BarState {
    fn statistics(&self, id: BarId) -> Statistics {
        Statistics {
            id,
            current: self.current,
            total: self.total,
            completed: self.completed,
            elapsed: self.took.unwrap_or_else(|| self.started.elapsed()),
        }
    }

    /// Mark completion when the total is reached. Returns whether this call
    /// completed the bar.
    fn check_complete(&mut self) -> bool {
        if self.completed || self.total == 0 || self.current < self.total {
            return false;
        }
        self.current = self.total;
        self.completed = true;
        self.took = Some(self.started.elapsed());
        true
    }
}

pub(crate) struct BarCore {
    id: BarId,
    state: Mutex<BarState>,
    filler: Box<dyn Filler>,
    prepend: Vec<Box<dyn Decorator>>,
    append: Vec<Box<dyn Decorator>>,
    width: usize,
    trim_space: bool,
    retired: watch::Sender<bool>,
    force_refresh: mpsc::Sender<Instant>,
}

impl BarCore {
    pub(crate) fn new(
        id: BarId,
        total: u64,
        filler: Box<dyn Filler>,
        options: &mut BarOptions,
        ctx: &BarContext,
    ) -> Self {
        let (retired, _) = watch::channel(false);
        Self {
            id,
            state: Mutex::new(BarState {
                current: 0,
                total,
                completed: false,
                complete_flushed: false,
                panic_msg: None,
                started: Instant::now(),
                took: None,
            }),
            filler,
            prepend: std::mem::take(&mut options.prepend),
            append: std::mem::take(&mut options.append),
            width: options.width.unwrap_or(ctx.default_width),
            trim_space: options.trim_space,
            retired,
            force_refresh: ctx.force_refresh.clone(),
        }
    }

    pub(crate) fn id(&self) -> BarId {
        self.id
    }

    fn sync_columns(&self) -> SyncColumns {
        SyncColumns {
            prepend: self.prepend.iter().map(|d| d.sync_columns()).sum(),
            append: self.append.iter().map(|d| d.sync_columns()).sum(),
        }
    }

    fn update(&self, f: impl FnOnce(&mut BarState)) {
        let completed_now = {
            let mut state = self.state.lock();
            f(&mut state);
            state.check_complete()
        };
        if completed_now {
            debug!("bar {} completed", self.id);
        }
    }

    /// Ask for one more frame, drawn once this bar's final frame is out.
    fn request_refresh(&self) {
        match self.force_refresh.try_send(Instant::now()) {
            Ok(()) => trace!("bar {} requested a refresh", self.id),
            Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("bar {}: refresh stream closed", self.id)
            }
        }
    }

    /// Mark the bar retired. Returns `false` if it already was.
    pub(crate) fn retire(&self) -> bool {
        !self.retired.send_replace(true)
    }

    fn is_retired(&self) -> bool {
        *self.retired.borrow()
    }

    /// Render one frame.
    async fn draw(&self, term_width: usize, sync: RenderSync) -> Frame {
        let (stats, to_shutdown, panic_msg) = {
            let mut state = self.state.lock();
            let to_shutdown = state.completed && !state.complete_flushed;
            state.complete_flushed = state.completed;
            (state.statistics(self.id), to_shutdown, state.panic_msg.clone())
        };
        if to_shutdown {
            self.request_refresh();
        }
        if let Some(msg) = panic_msg {
            return Frame {
                text: format!("panic: {msg}\n"),
                lines: 1,
                to_shutdown: true,
                panicked: true,
            };
        }

        match AssertUnwindSafe(self.compose(term_width, &stats, sync))
            .catch_unwind()
            .await
        {
            Ok((text, extended)) => Frame {
                text,
                lines: extended + 1,
                to_shutdown,
                panicked: false,
            },
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                warn!("bar {} panicked while rendering: {}", self.id, msg);
                self.state.lock().panic_msg = Some(msg.clone());
                self.request_refresh();
                Frame {
                    text: format!("panic: {msg}\n"),
                    lines: 1,
                    to_shutdown: true,
                    panicked: true,
                }
            }
        }
    }

    async fn compose(
        &self,
        term_width: usize,
        stats: &Statistics,
        sync: RenderSync,
    ) -> (String, usize) {
        let mut prepend = String::new();
        let mut slots = SyncSlots::new(sync.prepend);
        for decorator in &self.prepend {
            prepend.push_str(&decorator.render(stats, &mut slots).await);
        }

        let mut append = String::new();
        let mut slots = SyncSlots::new(sync.append);
        for decorator in &self.append {
            append.push_str(&decorator.render(stats, &mut slots).await);
        }

        let edges = if self.trim_space { 0 } else { 2 };
        let room = term_width.saturating_sub(rune_len(&prepend) + rune_len(&append) + edges);
        let fill = self.filler.fill(self.width.min(room), stats);

        let mut line = String::with_capacity(prepend.len() + fill.len() + append.len() + 3);
        line.push_str(&prepend);
        if !self.trim_space {
            line.push(' ');
        }
        line.push_str(&fill);
        if !self.trim_space {
            line.push(' ');
        }
        line.push_str(&append);
        line.push('\n');
        (line, self.filler.extended_lines())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Priority of a bar created without one: its id, saturating at `i32::MAX`.
fn default_priority(id: BarId) -> i32 {
    i32::try_from(id).unwrap_or(i32::MAX)
}

/// The container's record of a bar.
pub(crate) struct BarEntry {
    core: Arc<BarCore>,
    priority: i32,
    explicit_priority: bool,
    to_drop: bool,
    lifecycle: Lifecycle,
    columns: SyncColumns,
    frame_tx: mpsc::Sender<Frame>,
    frame_rx: mpsc::Receiver<Frame>,
}

impl BarEntry {
    pub(crate) fn new(core: Arc<BarCore>, priority: Option<i32>, to_drop: bool) -> Self {
        let (frame_tx, frame_rx) = mpsc::channel(1);
        Self {
            priority: priority.unwrap_or_else(|| default_priority(core.id())),
            explicit_priority: priority.is_some(),
            columns: core.sync_columns(),
            core,
            to_drop,
            lifecycle: Lifecycle::Queued,
            frame_tx,
            frame_rx,
        }
    }

    pub(crate) fn core(&self) -> &Arc<BarCore> {
        &self.core
    }

    pub(crate) fn key(&self) -> (i32, BarId) {
        (self.priority, self.core.id())
    }

    pub(crate) fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub(crate) fn columns(&self) -> SyncColumns {
        self.columns
    }

    pub(crate) fn to_drop(&self) -> bool {
        self.to_drop
    }

    pub(crate) fn mark_drop(&mut self) {
        self.to_drop = true;
    }

    pub(crate) fn park(&mut self) {
        self.lifecycle = Lifecycle::Parked;
    }

    /// Apply a lifecycle transition, ignoring ones that are not allowed.
    pub(crate) fn advance(&mut self, transition: Transition) {
        match self.lifecycle.next(transition) {
            Some(next) => self.lifecycle = next,
            None => debug!(
                "bar {}: ignoring {:?} while {:?}",
                self.core.id(),
                transition,
                self.lifecycle
            ),
        }
    }

    /// Set the priority explicitly, as if given at creation.
    pub(crate) fn set_explicit_priority(&mut self, priority: i32) {
        self.priority = priority;
        self.explicit_priority = true;
    }

    /// Take over a retiring predecessor's priority unless one was given.
    pub(crate) fn inherit_priority(&mut self, priority: i32) {
        if !self.explicit_priority {
            self.priority = priority;
        }
    }

    /// Start rendering this frame in the background.
    pub(crate) fn render(&self, term_width: usize, sync: RenderSync) {
        let core = self.core.clone();
        let frame_tx = self.frame_tx.clone();
        tokio::spawn(async move {
            let frame = core.draw(term_width, sync).await;
            let _ = frame_tx.send(frame).await;
        });
    }

    /// Wait for the frame started by [`render`](Self::render).
    pub(crate) async fn next_frame(&mut self) -> Frame {
        self.frame_rx.recv().await.unwrap_or_else(Frame::blank)
    }
}

impl Prioritized for BarEntry {
    fn id(&self) -> u64 {
        self.core.id()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }
}

/// Handle to a bar in a container.
///
/// Cheap to clone and usable from any thread. Progress updates take effect
/// on the next frame.
#[derive(Clone)]
pub struct Bar {
    core: Arc<BarCore>,
    mailbox: Arc<Mailbox>,
}

impl Bar {
    pub(crate) fn new(core: Arc<BarCore>, mailbox: Arc<Mailbox>) -> Self {
        Self { core, mailbox }
    }

    pub fn id(&self) -> BarId {
        self.core.id
    }

    pub fn increment(&self) {
        self.incr_by(1);
    }

    pub fn incr_by(&self, n: u64) {
        self.core.update(|state| state.current = state.current.saturating_add(n));
    }

    pub fn set_current(&self, current: u64) {
        self.core.update(|state| state.current = current);
    }

    /// Change the total. With `complete`, the bar is completed at the new
    /// total; a zero total then means "whatever the current value is".
    pub fn set_total(&self, total: u64, complete: bool) {
        self.core.update(|state| {
            state.total = total;
            if complete {
                if state.total == 0 {
                    state.total = state.current.max(1);
                }
                state.current = state.total;
            }
        });
    }

    pub fn current(&self) -> u64 {
        self.core.state.lock().current
    }

    pub fn total(&self) -> u64 {
        self.core.state.lock().total
    }

    pub fn is_complete(&self) -> bool {
        self.core.state.lock().completed
    }

    /// Whether the bar has left the container.
    pub fn is_retired(&self) -> bool {
        self.core.is_retired()
    }

    /// Wait until the bar has left the container.
    pub async fn wait_retired(&self) {
        let mut retired = self.core.retired.subscribe();
        signalled(&mut retired).await;
    }

    /// Move the bar to a new display priority.
    pub async fn set_priority(&self, priority: i32) {
        let id = self.id();
        let _ = self
            .mailbox
            .query(move |state| state.set_priority(id, priority))
            .await;
    }

    /// Remove the bar from its container. A no-op once it has retired.
    pub async fn remove(&self) {
        let id = self.id();
        let _ = self
            .mailbox
            .query(move |state| state.remove_bar(id))
            .await;
    }

    /// Current slot in the container's queue, `None` when not queued.
    pub async fn position(&self) -> Option<usize> {
        let id = self.id();
        self.mailbox
            .query(move |state| state.position(id))
            .await
            .flatten()
    }
}

impl fmt::Debug for Bar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bar")
            .field("id", &self.core.id)
            .field("retired", &self.core.is_retired())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filler::BarFiller;
    use barstack_decor::sync::{channel, synchronize};
    use barstack_decor::{decorator, WidthConfig};

    fn core(options: &mut BarOptions, total: u64) -> BarCore {
        core_with_refresh(options, total).0
    }

    fn core_with_refresh(
        options: &mut BarOptions,
        total: u64,
    ) -> (BarCore, mpsc::Receiver<Instant>) {
        let (ops, _) = mpsc::channel(1);
        let (_done_tx, done) = watch::channel(false);
        let (force_refresh, refreshes) = mpsc::channel(1);
        let ctx = BarContext {
            mailbox: Arc::new(Mailbox::new(ops, done)),
            force_refresh,
            default_width: 12,
        };
        let core = BarCore::new(0, total, Box::new(BarFiller::default()), options, &ctx);
        (core, refreshes)
    }

    #[test]
    fn default_priority_saturates() {
        assert_eq!(default_priority(7), 7);
        assert_eq!(default_priority(i32::MAX as u64), i32::MAX);
        assert_eq!(default_priority(i32::MAX as u64 + 1), i32::MAX);
        assert_eq!(default_priority(u64::MAX), i32::MAX);
    }

    #[tokio::test]
    async fn completing_requests_a_refresh_only_from_the_final_frame() {
        let mut options = BarOptions::new();
        let (core, mut refreshes) = core_with_refresh(&mut options, 2);

        core.update(|state| state.current = 2);
        assert!(refreshes.try_recv().is_err());

        assert!(core.draw(20, RenderSync::default()).await.to_shutdown);
        assert!(refreshes.try_recv().is_ok());

        core.draw(20, RenderSync::default()).await;
        assert!(refreshes.try_recv().is_err());
    }

    #[test]
    fn lifecycle_transitions() {
        use Lifecycle::*;
        assert_eq!(Parked.next(Transition::Promote), Some(Queued));
        assert_eq!(Queued.next(Transition::Render), Some(Rendering));
        assert_eq!(Rendering.next(Transition::Flushed), Some(Queued));
        assert_eq!(Rendering.next(Transition::Completed), Some(PendingFinalFlush));
        assert_eq!(PendingFinalFlush.next(Transition::Retire), Some(Retired));
        assert_eq!(Queued.next(Transition::Retire), Some(Retired));
        assert_eq!(Parked.next(Transition::Retire), Some(Retired));
    }

    #[test]
    fn lifecycle_rejects_invalid_transitions() {
        use Lifecycle::*;
        assert_eq!(Parked.next(Transition::Render), None);
        assert_eq!(Retired.next(Transition::Promote), None);
        assert_eq!(Retired.next(Transition::Render), None);
        assert_eq!(PendingFinalFlush.next(Transition::Flushed), None);
        assert_eq!(Queued.next(Transition::Completed), None);
    }

    #[test]
    fn completion_clamps_to_total() {
        let mut state = BarState {
            current: 12,
            total: 10,
            completed: false,
            complete_flushed: false,
            panic_msg: None,
            started: Instant::now(),
            took: None,
        };
        assert!(state.check_complete());
        assert_eq!(state.current, 10);
        assert!(!state.check_complete());

        let took = state.statistics(0).elapsed;
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(state.statistics(0).elapsed, took);
    }

    #[test]
    fn indeterminate_never_completes_on_its_own() {
        let mut state = BarState {
            current: 100,
            total: 0,
            completed: false,
            complete_flushed: false,
            panic_msg: None,
            started: Instant::now(),
            took: None,
        };
        assert!(!state.check_complete());
    }

    #[tokio::test]
    async fn draw_lays_out_decorators_around_fill() {
        let mut options = BarOptions::new()
            .prepend(decorator::name("job", WidthConfig::default()))
            .append(decorator::percentage(WidthConfig::default()));
        let core = core(&mut options, 10);
        core.state.lock().current = 5;

        let frame = core.draw(80, RenderSync::default()).await;
        assert_eq!(frame.text, "job [====>-----] 50 %\n");
        assert_eq!(frame.lines, 1);
        assert!(!frame.to_shutdown);
    }

    #[tokio::test]
    async fn fill_shrinks_to_terminal_width() {
        let mut options = BarOptions::new()
            .trim_space()
            .prepend(decorator::name("ab", WidthConfig::default()));
        let core = core(&mut options, 10);

        let frame = core.draw(8, RenderSync::default()).await;
        assert_eq!(frame.text, "ab[----]\n");
    }

    #[tokio::test]
    async fn completion_is_reported_once() {
        let mut options = BarOptions::new();
        let core = core(&mut options, 4);
        core.state.lock().current = 4;
        core.state.lock().check_complete();

        assert!(core.draw(20, RenderSync::default()).await.to_shutdown);
        assert!(!core.draw(20, RenderSync::default()).await.to_shutdown);
    }

    #[tokio::test]
    async fn panicking_decorator_is_contained() {
        let mut options = BarOptions::new().append(decorator::any(
            |_| panic!("boom"),
            WidthConfig::default(),
        ));
        let core = core(&mut options, 4);

        let frame = core.draw(20, RenderSync::default()).await;
        assert_eq!(frame.text, "panic: boom\n");
        assert!(frame.panicked);
        assert!(frame.to_shutdown);
    }

    #[tokio::test]
    async fn draw_consumes_sync_slots_in_column_order() {
        let mut options = BarOptions::new()
            .prepend(decorator::name("a", WidthConfig::synced()))
            .prepend(decorator::name("bb", WidthConfig::synced()))
            .trim_space()
            .width(2);
        let core = core(&mut options, 1);
        assert_eq!(core.sync_columns(), SyncColumns { prepend: 2, append: 0 });

        let (s0, m0) = channel();
        let (s1, m1) = channel();
        let (other0, o0) = channel();
        let (other1, o1) = channel();
        tokio::spawn(synchronize(vec![m0, o0]));
        tokio::spawn(synchronize(vec![m1, o1]));

        let sync = RenderSync {
            prepend: vec![s0, s1],
            append: Vec::new(),
        };
        let (frame, _, _) = tokio::join!(
            core.draw(80, sync),
            other0.sync(4),
            other1.sync(1),
        );
        assert_eq!(frame.text, "   abb[]\n");
    }
}
