//! Fillers draw the main visual of a bar: the fill or a spinner.

use std::sync::atomic::{AtomicUsize, Ordering};

use barstack_decor::{rune_len, Statistics};

/// Strategy producing a bar's core visual for a given width.
pub trait Filler: Send + Sync {
    /// Draw into exactly `width` columns where possible.
    fn fill(&self, width: usize, stats: &Statistics) -> String;

    /// Extra physical lines the fill occupies beyond the bar's own line.
    ///
    /// Taken as declared; the fill text is expected to contain the
    /// matching newlines.
    fn extended_lines(&self) -> usize {
        0
    }
}

/// Characters of a classic bar: `[===>----]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarStyle {
    pub left: char,
    pub fill: char,
    pub tip: char,
    pub empty: char,
    pub right: char,
}

impl Default for BarStyle {
    fn default() -> Self {
        Self {
            left: '[',
            fill: '=',
            tip: '>',
            empty: '-',
            right: ']',
        }
    }
}

impl BarStyle {
    /// Parse a five character style string such as `"[=>-]"`.
    pub fn parse(style: &str) -> Option<Self> {
        let chars: Vec<char> = style.chars().collect();
        match chars.as_slice() {
            [left, fill, tip, empty, right] => Some(Self {
                left: *left,
                fill: *fill,
                tip: *tip,
                empty: *empty,
                right: *right,
            }),
            _ => None,
        }
    }
}

/// The default filler: a bracketed bar proportional to `current / total`.
#[derive(Debug, Clone, Default)]
pub struct BarFiller {
    style: BarStyle,
}

impl BarFiller {
    pub fn new(style: BarStyle) -> Self {
        Self { style }
    }
}

impl Filler for BarFiller {
    fn fill(&self, width: usize, stats: &Statistics) -> String {
        // Too narrow for the brackets.
        if width < 2 {
            return String::new();
        }
        let inner = width - 2;
        let filled = match stats.ratio() {
            Some(ratio) => ((inner as f64) * ratio).round() as usize,
            None => 0,
        }
        .min(inner);

        let mut out = String::with_capacity(width);
        out.push(self.style.left);
        if filled > 0 {
            let body = if filled < inner { filled - 1 } else { filled };
            out.extend(std::iter::repeat(self.style.fill).take(body));
            if filled < inner {
                out.push(self.style.tip);
            }
        }
        out.extend(std::iter::repeat(self.style.empty).take(inner - filled));
        out.push(self.style.right);
        out
    }
}

/// Where a spinner frame sits inside its width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpinnerAlignment {
    #[default]
    Left,
    Middle,
    Right,
}

pub const DEFAULT_SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// A spinner advancing one frame per render.
#[derive(Debug)]
pub struct SpinnerFiller {
    frames: Vec<String>,
    alignment: SpinnerAlignment,
    count: AtomicUsize,
}

impl SpinnerFiller {
    pub fn new(alignment: SpinnerAlignment) -> Self {
        Self::with_frames(DEFAULT_SPINNER_FRAMES, alignment)
    }

    pub fn with_frames(frames: &[&str], alignment: SpinnerAlignment) -> Self {
        Self {
            frames: frames.iter().map(|f| f.to_string()).collect(),
            alignment,
            count: AtomicUsize::new(0),
        }
    }
}

impl Filler for SpinnerFiller {
    fn fill(&self, width: usize, _stats: &Statistics) -> String {
        if self.frames.is_empty() {
            return " ".repeat(width);
        }
        let n = self.count.fetch_add(1, Ordering::Relaxed);
        let frame = &self.frames[n % self.frames.len()];
        let len = rune_len(frame);
        if len >= width {
            return frame.clone();
        }
        let room = width - len;
        let (left, right) = match self.alignment {
            SpinnerAlignment::Left => (0, room),
            SpinnerAlignment::Middle => (room / 2, room - room / 2),
            SpinnerAlignment::Right => (room, 0),
        };
        format!("{}{}{}", " ".repeat(left), frame, " ".repeat(right))
    }
}
