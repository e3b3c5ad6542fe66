//! Line windows over a file.
//!
//! A [`Window`] is the half-open, 0-based range `[start, end)` of lines shown
//! to the backend in one chunk. Every move clamps `end` to the file length.
//! The window does not decide when scanning is finished; callers check
//! [`Window::reaches_end`].

/// Half-open line range `[start, end)` with `0 <= start <= end <= total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    start: usize,
    end: usize,
    total: usize,
}

impl Window {
    /// First window of a file: `[0, min(step, total))`.
    pub fn initial(total: usize, step: usize) -> Self {
        Self {
            start: 0,
            end: step.min(total),
            total,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn reaches_end(&self) -> bool {
        self.end == self.total
    }

    /// Advance both bounds by `step`.
    pub fn slide(&mut self, step: usize) {
        self.end = self.end.saturating_add(step).min(self.total);
        self.start = self.start.saturating_add(step).min(self.end);
    }

    /// Grow `end` by `step`, keeping `start`.
    pub fn enlarge(&mut self, step: usize) {
        self.end = self.end.saturating_add(step).min(self.total);
    }

    /// Copy of this window grown by `step`.
    pub fn enlarged(&self, step: usize) -> Self {
        let mut grown = *self;
        grown.enlarge(step);
        grown
    }

    /// The slice of `lines` this window covers.
    pub fn slice<'a>(&self, lines: &'a [String]) -> &'a [String] {
        let end = self.end.min(lines.len());
        let start = self.start.min(end);
        &lines[start..end]
    }
}
