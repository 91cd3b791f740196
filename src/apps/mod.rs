//! The built-in apps: one `SessionContent` per game or tool, each wrapping a
//! model from `core` and drawing it inside its window.

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::layout::Rect;

use crate::core::focus::StickyFocus;
use crate::core::wm::AppDescriptor;
use crate::storage::{Storage, StreakKeys};
#[cfg(test)]
use crate::storage::{KeyValueStore, MemoryStore};
use crate::ui::hit_index;

pub mod chat;
pub mod memory;
pub mod quiz;
pub mod word;

/// Registry order is launcher order.
pub fn builtin_apps() -> Vec<AppDescriptor> {
    vec![
        memory::descriptor(),
        word::descriptor(),
        quiz::descriptor(),
        chat::descriptor(),
    ]
}

/// Direction a key moves focus through a screen's controls, if any.
pub(crate) fn focus_step(key: &KeyEvent) -> Option<bool> {
    match key.code {
        KeyCode::Tab | KeyCode::Down | KeyCode::Right => Some(true),
        KeyCode::BackTab | KeyCode::Up | KeyCode::Left => Some(false),
        _ => None,
    }
}

pub(crate) fn is_activate(key: &KeyEvent) -> bool {
    matches!(key.code, KeyCode::Enter | KeyCode::Char(' '))
}

/// Streak counters as last read from storage. Screens draw these instead of
/// hitting the store every frame; apps reload them when the session changes
/// phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Standing {
    pub streak: u32,
    pub best: u32,
}

impl Standing {
    pub fn load(storage: &Storage, keys: StreakKeys) -> Self {
        Self {
            streak: storage.streak(keys),
            best: storage.best_streak(keys),
        }
    }
}

/// Controls drawn on the last frame plus the remembered focus for the
/// screen they belong to.
pub(crate) struct Controls<T> {
    pub hits: Vec<(Rect, T)>,
    pub focus: StickyFocus,
}

impl<T: Copy + PartialEq> Controls<T> {
    pub fn new() -> Self {
        Self {
            hits: Vec::new(),
            focus: StickyFocus::default(),
        }
    }

    pub fn clear(&mut self) {
        self.hits.clear();
    }

    pub fn push(&mut self, rect: Rect, control: T) {
        if rect.width > 0 {
            self.hits.push((rect, control));
        }
    }

    pub fn focused(&self) -> Option<T> {
        self.focus
            .resolve(self.hits.len())
            .and_then(|i| self.hits.get(i))
            .map(|(_, c)| *c)
    }

    /// While drawing: which of the next `count` controls holds focus.
    pub fn row_focus(&self, visible: bool, count: usize) -> Option<usize> {
        if !visible {
            return None;
        }
        let base = self.hits.len();
        let at = self.focus.resolve(usize::MAX)?;
        (at >= base && at < base + count).then(|| at - base)
    }

    /// After drawing: drop a remembered index the new frame no longer has.
    pub fn end_frame(&mut self) {
        if self.focus.resolve(usize::MAX) != self.focus.resolve(self.hits.len()) {
            self.focus.forget();
        }
    }

    pub fn step(&mut self, forward: bool) {
        self.focus.step(self.hits.len(), forward);
    }

    /// Control under the pointer; remembers it as focused.
    pub fn pick(&mut self, x: u16, y: u16) -> Option<T> {
        let i = hit_index(&self.hits, x, y)?;
        self.focus.remember(i);
        Some(self.hits[i].1)
    }

    pub fn contains(&self, x: u16, y: u16) -> bool {
        hit_index(&self.hits, x, y).is_some()
    }

    /// Screen changed: start from the first control next time.
    pub fn reset(&mut self) {
        self.hits.clear();
        self.focus.forget();
    }

    /// Remember `control` by its position in the current frame.
    pub fn remember(&mut self, control: T) {
        if let Some(i) = self.hits.iter().position(|(_, c)| *c == control) {
            self.focus.remember(i);
        }
    }
}

/// Store that counts reads, for checking that drawing stays off the disk.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct CountingStore {
    inner: MemoryStore,
    pub reads: std::cell::Cell<usize>,
}

#[cfg(test)]
impl KeyValueStore for CountingStore {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.reads.set(self.reads.get() + 1);
        KeyValueStore::get(&self.inner, key)
    }

    fn set(&self, key: &str, value: serde_json::Value) -> anyhow::Result<()> {
        KeyValueStore::set(&self.inner, key, value)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        KeyValueStore::remove(&self.inner, key)
    }
}
