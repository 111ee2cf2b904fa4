//! The container: a stack of bars redrawn as one terminal frame.
//!
//! All container state lives in a single owner task. Callers talk to it
//! through a one-slot mailbox of operations; refresh events arrive from the
//! refresh fan-in. Each refresh runs one cycle:
//!
//! 1. rebuild the column sync matrix if the bar set changed;
//! 2. start one width synchronizer per column;
//! 3. render every queued and retained bar concurrently;
//! 4. pop bars in priority order, collecting their frames;
//! 5. flush the frame, re-queue the bars, retire completed ones.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace, warn};

use crate::bar::{Bar, BarContext, BarCore, BarEntry, BarId, BarOptions, Transition};
use crate::filler::{BarFiller, Filler, SpinnerAlignment, SpinnerFiller};
use crate::matrix::SyncMatrix;
use crate::queue::{Prioritized, PriorityQueue};
use crate::refresh::{fan_in, signalled, ticker};
use crate::writer::{FrameWriter, TerminalWriter};

/// Time between frames unless configured otherwise.
pub const DEFAULT_REFRESH_RATE: Duration = Duration::from_millis(120);

/// Line width used when the writer cannot report one.
pub const DEFAULT_WIDTH: usize = 80;

type Op = Box<dyn FnOnce(&mut State) + Send>;

/// Sending side of the owner's operation mailbox.
pub(crate) struct Mailbox {
    ops: mpsc::Sender<Op>,
    done: watch::Receiver<bool>,
}

impl Mailbox {
    pub(crate) fn new(ops: mpsc::Sender<Op>, done: watch::Receiver<bool>) -> Self {
        Self { ops, done }
    }

    /// Deliver `op` to the owner. Returns `false` once the container is
    /// shutting down or gone.
    pub(crate) async fn send<F>(&self, op: F) -> bool
    where
        F: FnOnce(&mut State) + Send + 'static,
    {
        let mut done = self.done.clone();
        tokio::select! {
            biased;
            _ = signalled(&mut done) => false,
            sent = self.ops.send(Box::new(op)) => sent.is_ok(),
        }
    }

    /// Run `f` on the owner and return its result.
    pub(crate) async fn query<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut State) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let delivered = self
            .send(move |state| {
                let _ = tx.send(f(state));
            })
            .await;
        if !delivered {
            return None;
        }
        rx.await.ok()
    }
}

/// Builder for [`Progress`].
pub struct ProgressBuilder {
    width: usize,
    refresh_rate: Duration,
    manual_refresh: Option<mpsc::Receiver<Instant>>,
    completion: Option<watch::Receiver<bool>>,
    notifier: Option<oneshot::Sender<()>>,
    writer: Option<Box<dyn FrameWriter>>,
}

impl Default for ProgressBuilder {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            refresh_rate: DEFAULT_REFRESH_RATE,
            manual_refresh: None,
            completion: None,
            notifier: None,
            writer: None,
        }
    }
}

impl ProgressBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Line width used when the writer cannot report one, and the default
    /// width of bar fills.
    pub fn width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    /// Time between frames.
    pub fn refresh_rate(mut self, rate: Duration) -> Self {
        self.refresh_rate = rate;
        self
    }

    /// Redraw on every value from `source` instead of on a timer.
    pub fn manual_refresh(mut self, source: mpsc::Receiver<Instant>) -> Self {
        self.manual_refresh = Some(source);
        self
    }

    /// Make [`Progress::wait`] also wait for `signal` to turn true.
    pub fn completion_signal(mut self, signal: watch::Receiver<bool>) -> Self {
        self.completion = Some(signal);
        self
    }

    /// Fire `notifier` once the render loop has exited.
    pub fn shutdown_notifier(mut self, notifier: oneshot::Sender<()>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Draw frames through `writer`. Defaults to a [`TerminalWriter`] on stdout.
    pub fn writer(mut self, writer: Box<dyn FrameWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Start the container.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn build(self) -> Progress {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (ops_tx, ops_rx) = mpsc::channel(1);
        let (force_tx, force_rx) = mpsc::channel(1);
        let (pending_tx, pending_rx) = watch::channel(0usize);
        let (exited_tx, exited_rx) = watch::channel(false);

        let source = match self.manual_refresh {
            Some(source) => source,
            None => ticker(self.refresh_rate),
        };
        let refresh = fan_in(shutdown_rx.clone(), vec![source, force_rx]);
        let writer = self
            .writer
            .unwrap_or_else(|| Box::new(TerminalWriter::stdout()));

        let state = State::new(self.width, writer, pending_tx);
        tokio::spawn(serve(state, ops_rx, refresh, self.notifier, exited_tx));
        debug!(
            "progress container started (width {}, refresh {:?})",
            self.width, self.refresh_rate
        );

        let mailbox = Arc::new(Mailbox::new(ops_tx, shutdown_rx));
        Progress {
            ctx: BarContext {
                mailbox: mailbox.clone(),
                force_refresh: force_tx,
                default_width: self.width,
            },
            mailbox,
            shutdown,
            completion: self.completion,
            pending: pending_rx,
            exited: exited_rx,
        }
    }
}

impl std::fmt::Debug for ProgressBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressBuilder")
            .field("width", &self.width)
            .field("refresh_rate", &self.refresh_rate)
            .field("manual_refresh", &self.manual_refresh.is_some())
            .field("completion", &self.completion.is_some())
            .field("notifier", &self.notifier.is_some())
            .field("writer", &self.writer.is_some())
            .finish()
    }
}

/// A container of progress bars.
///
/// ```rust,no_run
/// use barstack::{BarOptions, Progress};
///
/// # #[tokio::main]
/// # async fn main() {
/// let progress = Progress::new();
/// let bar = progress.add_bar(100, BarOptions::new()).await.unwrap();
///
/// for _ in 0..100 {
///     bar.increment();
/// }
/// progress.wait().await;
/// # }
/// ```
///
/// Dropping the container stops rendering without waiting for its bars.
pub struct Progress {
    mailbox: Arc<Mailbox>,
    ctx: BarContext,
    shutdown: watch::Sender<bool>,
    completion: Option<watch::Receiver<bool>>,
    pending: watch::Receiver<usize>,
    exited: watch::Receiver<bool>,
}

impl Progress {
    /// A container with default settings drawing to stdout.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new() -> Self {
        ProgressBuilder::default().build()
    }

    pub fn builder() -> ProgressBuilder {
        ProgressBuilder::new()
    }

    /// Add a bar drawn by `filler`. A `total` of zero makes it indeterminate.
    ///
    /// Returns `None` once the container is shutting down.
    pub async fn add(
        &self,
        total: u64,
        filler: Box<dyn Filler>,
        options: BarOptions,
    ) -> Option<Bar> {
        let ctx = self.ctx.clone();
        self.mailbox
            .query(move |state| state.add(total, filler, options, ctx))
            .await
    }

    /// Add a classic `[===>---]` bar.
    pub async fn add_bar(&self, total: u64, options: BarOptions) -> Option<Bar> {
        self.add(total, Box::new(BarFiller::default()), options).await
    }

    /// Add a spinner.
    pub async fn add_spinner(
        &self,
        total: u64,
        alignment: SpinnerAlignment,
        options: BarOptions,
    ) -> Option<Bar> {
        self.add(total, Box::new(SpinnerFiller::new(alignment)), options)
            .await
    }

    /// Take `bar` out of the container. Its line disappears with the next frame.
    pub async fn remove_bar(&self, bar: &Bar) {
        bar.remove().await;
    }

    pub async fn set_priority(&self, bar: &Bar, priority: i32) {
        bar.set_priority(priority).await;
    }

    /// Number of queued bars. Parked and retired bars are not counted.
    pub async fn bar_count(&self) -> usize {
        self.mailbox
            .query(|state| state.bars.len())
            .await
            .unwrap_or(0)
    }

    /// Wait for every bar to finish, then stop rendering.
    ///
    /// Waits for the completion signal first, if one was configured. Safe to
    /// call more than once.
    pub async fn wait(&self) {
        if let Some(mut signal) = self.completion.clone() {
            signalled(&mut signal).await;
        }
        let mut pending = self.pending.clone();
        let _ = pending.wait_for(|n| *n == 0).await;

        self.shutdown();
        let mut exited = self.exited.clone();
        signalled(&mut exited).await;
    }

    fn shutdown(&self) {
        let first = self
            .shutdown
            .send_if_modified(|stop| !std::mem::replace(stop, true));
        if first {
            debug!("progress container shutting down");
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("pending", &*self.pending.borrow())
            .field("shutdown", &*self.shutdown.borrow())
            .finish()
    }
}

/// Container state, owned by the `serve` task.
pub(crate) struct State {
    bars: PriorityQueue<BarEntry>,
    /// Blocking bar id to the bar waiting for its slot.
    parked: HashMap<BarId, BarEntry>,
    /// Retired bars still on screen. Redrawn and synced with the queue, but
    /// not part of it.
    retained: Vec<BarEntry>,
    shutdown_queue: Vec<BarEntry>,
    matrix: SyncMatrix,
    dirty: bool,
    next_id: BarId,
    width: usize,
    writer: Box<dyn FrameWriter>,
    pending: watch::Sender<usize>,
}

impl State {
    fn new(width: usize, writer: Box<dyn FrameWriter>, pending: watch::Sender<usize>) -> Self {
        Self {
            bars: PriorityQueue::new(),
            parked: HashMap::new(),
            retained: Vec::new(),
            shutdown_queue: Vec::new(),
            matrix: SyncMatrix::default(),
            dirty: false,
            next_id: 0,
            width,
            writer,
            pending,
        }
    }

    fn add(
        &mut self,
        total: u64,
        filler: Box<dyn Filler>,
        mut options: BarOptions,
        ctx: BarContext,
    ) -> Bar {
        let id = self.next_id;
        self.next_id += 1;

        let core = Arc::new(BarCore::new(id, total, filler, &mut options, &ctx));
        let mut entry = BarEntry::new(core.clone(), options.priority, options.remove_on_complete);
        self.pending.send_modify(|n| *n += 1);

        match options.park_behind.filter(|blocker| self.is_waiting(*blocker)) {
            Some(blocker) => {
                let tail = self.chain_tail(blocker);
                entry.park();
                debug!("bar {} parked behind bar {}", id, tail);
                self.parked.insert(tail, entry);
            }
            None => {
                trace!("bar {} queued with priority {}", id, entry.priority());
                self.bars.push(entry);
                self.dirty = true;
            }
        }
        Bar::new(core, ctx.mailbox)
    }

    /// Whether `id` is queued or parked, i.e. has not retired yet.
    fn is_waiting(&self, id: BarId) -> bool {
        self.bars.contains(id) || self.parked.values().any(|entry| entry.id() == id)
    }

    /// Last bar of the parking chain starting at `id`.
    fn chain_tail(&self, mut id: BarId) -> BarId {
        while let Some(next) = self.parked.get(&id) {
            id = next.id();
        }
        id
    }

    pub(crate) fn position(&self, id: BarId) -> Option<usize> {
        self.bars.position(id)
    }

    pub(crate) fn set_priority(&mut self, id: BarId, priority: i32) {
        if self.bars.update(id, priority) {
            return;
        }
        if let Some(entry) = self.parked.values_mut().find(|entry| entry.id() == id) {
            entry.set_explicit_priority(priority);
        }
    }

    pub(crate) fn remove_bar(&mut self, id: BarId) {
        if let Some(mut entry) = self.bars.remove(id) {
            debug!("bar {} removed while {:?}", id, entry.lifecycle());
            entry.advance(Transition::Retire);
            self.dirty = true;
            self.finish(&entry);
            return;
        }

        let blocker = self
            .parked
            .iter()
            .find(|(_, entry)| entry.id() == id)
            .map(|(blocker, _)| *blocker);
        if let Some(mut entry) = blocker.and_then(|blocker| self.parked.remove(&blocker)) {
            debug!("parked bar {} removed", id);
            if let (Some(blocker), Some(next)) = (blocker, self.parked.remove(&id)) {
                self.parked.insert(blocker, next);
            }
            entry.advance(Transition::Retire);
            self.release(&entry);
        }
    }

    /// Mark a bar gone and count it off.
    fn release(&mut self, entry: &BarEntry) {
        if entry.core().retire() {
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
        }
    }

    /// Release a bar that left the queue and promote its parked successor.
    fn finish(&mut self, entry: &BarEntry) {
        self.release(entry);
        let id = entry.id();
        if let Some(mut next) = self.parked.remove(&id) {
            next.inherit_priority(entry.priority());
            next.advance(Transition::Promote);
            debug!(
                "bar {} promoted into the slot of bar {} (priority {})",
                next.id(),
                id,
                next.priority()
            );
            self.bars.push(next);
            self.dirty = true;
        }
    }

    /// One render and flush cycle.
    async fn cycle(&mut self) {
        if self.dirty {
            let on_screen = self.bars.iter().chain(&self.retained);
            self.matrix = SyncMatrix::build(on_screen.map(|e| (e.id(), e.columns())));
            self.dirty = false;
            trace!("sync matrix rebuilt: {:?} columns", self.matrix.column_count());
        }

        let width = match self.writer.width() {
            Ok(width) if width > 0 => width,
            Ok(_) => self.width,
            Err(err) => {
                trace!("width query failed, using {}: {}", self.width, err);
                self.width
            }
        };

        let mut sync = self.matrix.launch();
        for entry in self.bars.iter_mut() {
            let slots = sync.remove(&entry.id()).unwrap_or_default();
            entry.advance(Transition::Render);
            entry.render(width, slots);
        }
        for entry in &self.retained {
            let slots = sync.remove(&entry.id()).unwrap_or_default();
            entry.render(width, slots);
        }

        let mut requeue = Vec::with_capacity(self.bars.len());
        let mut lines: Vec<((i32, BarId), String, usize)> =
            Vec::with_capacity(self.bars.len() + self.retained.len());
        while let Some(mut entry) = self.bars.pop() {
            let frame = entry.next_frame().await;
            lines.push((entry.key(), frame.text, frame.lines));
            if frame.panicked {
                entry.mark_drop();
            }
            if frame.to_shutdown {
                entry.advance(Transition::Completed);
                self.shutdown_queue.push(entry);
            } else {
                entry.advance(Transition::Flushed);
                requeue.push(entry);
            }
        }

        for entry in self.retained.iter_mut() {
            let frame = entry.next_frame().await;
            lines.push((entry.key(), frame.text, frame.lines));
            if frame.panicked {
                entry.mark_drop();
            }
        }
        lines.sort_by_key(|(key, _, _)| *key);

        let mut line_count = 0;
        for (_, text, count) in &lines {
            self.writer.write(text.as_bytes());
            line_count += count;
        }
        if let Err(err) = self.writer.flush(line_count) {
            warn!("failed to flush frame of {} lines: {}", line_count, err);
        }
        trace!("flushed {} bars in {} lines", lines.len(), line_count);

        for entry in requeue {
            self.bars.push(entry);
        }
        let before = self.retained.len();
        self.retained.retain(|entry| !entry.to_drop());
        if self.retained.len() != before {
            self.dirty = true;
        }
        self.run_shutdown_queue();
    }

    /// Retire the bars whose final frame was just flushed, last registered first.
    fn run_shutdown_queue(&mut self) {
        while let Some(mut entry) = self.shutdown_queue.pop() {
            entry.advance(Transition::Retire);
            self.dirty = true;
            self.finish(&entry);
            if entry.to_drop() {
                debug!("bar {} retired and dropped", entry.id());
            } else {
                debug!("bar {} retired, line kept", entry.id());
                self.retained.push(entry);
            }
        }
    }
}

/// The owner loop. Runs operations and cycles until the refresh stream closes.
async fn serve(
    mut state: State,
    mut ops: mpsc::Receiver<Op>,
    mut refresh: mpsc::Receiver<Instant>,
    notifier: Option<oneshot::Sender<()>>,
    exited: watch::Sender<bool>,
) {
    loop {
        tokio::select! {
            Some(op) = ops.recv() => op(&mut state),
            tick = refresh.recv() => match tick {
                Some(_) => state.cycle().await,
                None => break,
            },
        }
    }

    debug!(
        "render loop exited with {} bars queued, {} parked",
        state.bars.len(),
        state.parked.len()
    );
    if let Some(notifier) = notifier {
        let _ = notifier.send(());
    }
    exited.send_replace(true);
}
