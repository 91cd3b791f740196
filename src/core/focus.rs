/// Index to focus after a re-render: the remembered one if it still exists,
/// otherwise the first control. `None` when there is nothing to focus.
pub fn resolve_focus_target(len: usize, last: Option<usize>) -> Option<usize> {
    if len == 0 {
        return None;
    }
    match last {
        Some(i) if i < len => Some(i),
        _ => Some(0),
    }
}

pub fn next_index(current: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        (current + 1) % len
    }
}

pub fn prev_index(current: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        (current + len - 1) % len
    }
}

/// Menu settings that step through an ordered list and wrap to the start.
pub trait Cycle: Copy + PartialEq + 'static {
    const ALL: &'static [Self];

    fn next(self) -> Self {
        let i = Self::ALL.iter().position(|v| *v == self).unwrap_or(0);
        Self::ALL[next_index(i, Self::ALL.len())]
    }
}

/// Remembered control index for one screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StickyFocus {
    last: Option<usize>,
}

impl StickyFocus {
    pub fn remember(&mut self, index: usize) {
        self.last = Some(index);
    }

    pub fn forget(&mut self) {
        self.last = None;
    }

    pub fn resolve(&self, len: usize) -> Option<usize> {
        resolve_focus_target(len, self.last)
    }

    /// Move through `len` controls linearly, remembering the result.
    pub fn step(&mut self, len: usize, forward: bool) -> Option<usize> {
        let current = self.resolve(len)?;
        let next = if forward {
            next_index(current, len)
        } else {
            prev_index(current, len)
        };
        self.last = Some(next);
        Some(next)
    }
}
