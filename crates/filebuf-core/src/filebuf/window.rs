//! Input and output windows of the conversion engine.
//!
//! Windows hold stream units, never bytes. The output window only exists in
//! identity mode; the input window is empty unless a pushed-back unit is
//! being served from the putback cell.

use crate::unit::CharUnit;

/// Input window: `buf[next..limit]` is unread.
#[derive(Debug, Clone, Default)]
pub(crate) struct Window<C> {
    buf: Vec<C>,
    next: usize,
    limit: usize,
}

impl<C: CharUnit> Window<C> {
    pub(crate) fn empty() -> Self {
        Self {
            buf: Vec::new(),
            next: 0,
            limit: 0,
        }
    }

    pub(crate) fn available(&self) -> usize {
        self.limit - self.next
    }

    pub(crate) fn peek(&self) -> Option<C> {
        (self.next < self.limit).then(|| self.buf[self.next])
    }

    pub(crate) fn take(&mut self) -> Option<C> {
        let c = self.peek()?;
        self.next += 1;
        Some(c)
    }

    /// Step back over the last unit taken if it matches `expected`
    /// (any unit when `None`).
    pub(crate) fn back_up(&mut self, expected: Option<C>) -> bool {
        if self.next == 0 {
            return false;
        }
        let prev = self.buf[self.next - 1];
        if expected.is_some_and(|c| c != prev) {
            return false;
        }
        self.next -= 1;
        true
    }
}

/// Get side of the engine, with the single-unit putback cell made explicit.
#[derive(Debug, Clone)]
pub(crate) enum GetArea<C> {
    Normal(Window<C>),
    /// Serving a pushed-back unit; `saved` is restored afterwards.
    Putback {
        saved: Window<C>,
        cell: C,
        consumed: bool,
    },
}

impl<C: CharUnit> Default for GetArea<C> {
    fn default() -> Self {
        GetArea::Normal(Window::empty())
    }
}

impl<C: CharUnit> GetArea<C> {
    pub(crate) fn available(&self) -> usize {
        match self {
            GetArea::Normal(w) => w.available(),
            GetArea::Putback { consumed, .. } => usize::from(!*consumed),
        }
    }

    pub(crate) fn peek(&self) -> Option<C> {
        match self {
            GetArea::Normal(w) => w.peek(),
            GetArea::Putback {
                cell,
                consumed: false,
                ..
            } => Some(*cell),
            GetArea::Putback { .. } => None,
        }
    }

    pub(crate) fn take(&mut self) -> Option<C> {
        match self {
            GetArea::Normal(w) => w.take(),
            GetArea::Putback { cell, consumed, .. } => {
                if *consumed {
                    None
                } else {
                    *consumed = true;
                    Some(*cell)
                }
            }
        }
    }

    pub(crate) fn back_up(&mut self, expected: Option<C>) -> bool {
        match self {
            GetArea::Normal(w) => w.back_up(expected),
            GetArea::Putback { cell, consumed, .. } => {
                if !*consumed || expected.is_some_and(|c| c != *cell) {
                    return false;
                }
                *consumed = false;
                true
            }
        }
    }

    /// The cell holds a unit nobody has read yet.
    pub(crate) fn cell_unconsumed(&self) -> bool {
        matches!(self, GetArea::Putback { consumed: false, .. })
    }

    pub(crate) fn cell_active(&self) -> bool {
        matches!(self, GetArea::Putback { .. })
    }

    /// Switch to the putback cell holding `unit`.
    pub(crate) fn set_back(&mut self, unit: C) {
        let saved = match std::mem::take(self) {
            GetArea::Normal(w) => w,
            GetArea::Putback { saved, .. } => saved,
        };
        *self = GetArea::Putback {
            saved,
            cell: unit,
            consumed: false,
        };
    }

    /// Leave the putback cell, restoring the saved window.
    pub(crate) fn reset_back(&mut self) {
        if let GetArea::Putback { saved, .. } = self {
            let saved = std::mem::replace(saved, Window::empty());
            *self = GetArea::Normal(saved);
        }
    }
}

/// Output window: `buf[..next]` is pending, `buf.len()` is the capacity.
#[derive(Debug, Clone, Default)]
pub(crate) struct PutWindow<C> {
    buf: Vec<C>,
    next: usize,
}

impl<C: CharUnit> PutWindow<C> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![C::default(); capacity],
            next: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn room(&self) -> usize {
        self.buf.len() - self.next
    }

    pub(crate) fn push(&mut self, unit: C) -> bool {
        if self.next == self.buf.len() {
            return false;
        }
        self.buf[self.next] = unit;
        self.next += 1;
        true
    }

    /// Copy as many leading units of `units` as fit; returns how many.
    pub(crate) fn fill(&mut self, units: &[C]) -> usize {
        let n = units.len().min(self.room());
        self.buf[self.next..self.next + n].copy_from_slice(&units[..n]);
        self.next += n;
        n
    }

    pub(crate) fn pending(&self) -> &[C] {
        &self.buf[..self.next]
    }

    pub(crate) fn clear(&mut self) {
        self.next = 0;
    }
}
