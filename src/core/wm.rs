//! Window placement, stacking and focus arbitration.
//!
//! The window with the highest `z` is always the one marked active. Closing a
//! window reaches the manager through the window's owner hook (an mpsc send);
//! every public operation drains that channel before doing anything else.

use anyhow::{anyhow, Result};
use crossterm::event::KeyEvent;
use ratatui::{layout::Rect, Frame};
use std::rc::Rc;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::{Duration, Instant};

use crate::config::Settings;
use crate::core::window::{ChromeHit, ContentAction, SessionContent, WindowChrome, WindowId};
use crate::sound::AudioPort;
use crate::storage::Storage;

pub const FOCUS_SETTLE_DELAY: Duration = Duration::from_millis(50);

const SPAWN_ORIGIN: (i32, i32) = (2, 1);
const SPAWN_STEP: (i32, i32) = (4, 2);
const SPAWN_COLUMN_STEP: i32 = 12;

// ── App registry ──────────────────────────────────────────────────────────────

/// Collaborators handed to every app factory.
#[derive(Clone)]
pub struct AppServices {
    pub storage: Storage,
    pub audio: Rc<dyn AudioPort>,
    pub settings: Settings,
}

pub type AppFactory = Box<dyn Fn(&AppServices) -> Result<Box<dyn SessionContent>>>;

pub struct AppDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub factory: AppFactory,
}

// ── Manager ───────────────────────────────────────────────────────────────────

pub struct WindowManager {
    /// Open order; stacking lives in each window's `z`.
    windows: Vec<WindowChrome>,
    registry: Vec<AppDescriptor>,
    services: AppServices,
    desk: Rect,
    next_id: WindowId,
    z_counter: u64,
    spawn: (i32, i32),
    closed_tx: Sender<WindowId>,
    closed_rx: Receiver<WindowId>,
    pending_focus: Option<(WindowId, Instant)>,
    pointer_owner: Option<WindowId>,
}

impl WindowManager {
    pub fn new(desk: Rect, services: AppServices) -> Self {
        let (closed_tx, closed_rx) = channel();
        Self {
            windows: Vec::new(),
            registry: Vec::new(),
            services,
            desk,
            next_id: 1,
            z_counter: 0,
            spawn: SPAWN_ORIGIN,
            closed_tx,
            closed_rx,
            pending_focus: None,
            pointer_owner: None,
        }
    }

    pub fn register(&mut self, app: AppDescriptor) {
        self.registry.push(app);
    }

    pub fn apps(&self) -> &[AppDescriptor] {
        &self.registry
    }

    pub fn windows(&self) -> &[WindowChrome] {
        &self.windows
    }

    pub fn window(&self, id: WindowId) -> Option<&WindowChrome> {
        self.windows.iter().find(|w| w.id() == id)
    }

    fn window_mut(&mut self, id: WindowId) -> Option<&mut WindowChrome> {
        self.windows.iter_mut().find(|w| w.id() == id)
    }

    pub fn active_id(&self) -> Option<WindowId> {
        self.windows.iter().find(|w| w.active).map(|w| w.id())
    }

    pub fn desktop(&self) -> Rect {
        self.desk
    }

    pub fn set_desktop(&mut self, desk: Rect) {
        self.desk = desk;
        for win in &mut self.windows {
            win.clamp_to(desk);
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    pub fn launch_app(&mut self, app_id: &str, now: Instant) -> Option<WindowId> {
        let built = match self.registry.iter().find(|a| a.id == app_id) {
            Some(app) => (app.factory)(&self.services)
                .map(|content| (app.name, content))
                .map_err(|err| err.context(format!("launching {app_id}"))),
            None => Err(anyhow!("unknown app {app_id}")),
        };
        match built {
            Ok((name, content)) => Some(self.open_window(name, content, now)),
            Err(err) => {
                tracing::warn!(app = app_id, "app launch failed: {err:#}");
                None
            }
        }
    }

    pub fn open_window(
        &mut self,
        title: &str,
        content: Box<dyn SessionContent>,
        now: Instant,
    ) -> WindowId {
        self.drain_closed(now);
        let id = self.next_id;
        self.next_id += 1;

        let mut win = WindowChrome::new(id, title, content);
        let tx = self.closed_tx.clone();
        win.set_owner_hook(Box::new(move |id| {
            let _ = tx.send(id);
        }));
        let (x, y) = self.next_spawn(win.rect.w, win.rect.h);
        win.rect.x = x;
        win.rect.y = y;
        win.clamp_to(self.desk);
        self.windows.push(win);

        self.raise(id);
        if let Some(win) = self.window_mut(id) {
            win.focus();
        }
        tracing::info!(window = id, title, "window opened");
        id
    }

    fn next_spawn(&mut self, w: u16, h: u16) -> (i32, i32) {
        let (mut cx, mut cy) = self.spawn;
        if cy + i32::from(h) > i32::from(self.desk.height) {
            cy = SPAWN_ORIGIN.1;
            cx += SPAWN_COLUMN_STEP;
        }
        if cx + i32::from(w) > i32::from(self.desk.width) {
            cx = SPAWN_ORIGIN.0;
            cy = SPAWN_ORIGIN.1;
        }
        self.spawn = (cx + SPAWN_STEP.0, cy + SPAWN_STEP.1);
        (i32::from(self.desk.x) + cx, i32::from(self.desk.y) + cy)
    }

    pub fn close_window(&mut self, id: WindowId, now: Instant) {
        if let Some(win) = self.window_mut(id) {
            win.close();
        }
        self.drain_closed(now);
    }

    pub fn close_active(&mut self, now: Instant) {
        if let Some(id) = self.active_id() {
            self.close_window(id, now);
        }
    }

    /// Any close hands focus to the most recently opened survivor.
    fn drain_closed(&mut self, now: Instant) {
        let mut closed_any = false;
        while let Ok(id) = self.closed_rx.try_recv() {
            let Some(pos) = self.windows.iter().position(|w| w.id() == id) else {
                continue;
            };
            let win = self.windows.remove(pos);
            closed_any = true;
            if self.pointer_owner == Some(id) {
                self.pointer_owner = None;
            }
            if matches!(self.pending_focus, Some((pending, _)) if pending == id) {
                self.pending_focus = None;
            }
            tracing::info!(window = id, title = win.title(), "window closed");
        }
        if closed_any {
            if let Some(survivor) = self.windows.last().map(|w| w.id()) {
                self.raise(survivor);
                self.pending_focus = Some((survivor, now + FOCUS_SETTLE_DELAY));
            }
        }
    }

    // ── Stacking ──────────────────────────────────────────────────────────────

    fn raise(&mut self, id: WindowId) {
        if self.window(id).is_none() {
            return;
        }
        if self.active_id() == Some(id) {
            return;
        }
        self.z_counter += 1;
        let z = self.z_counter;
        for win in &mut self.windows {
            if win.id() == id {
                win.z = z;
                win.set_active(true);
            } else {
                win.set_active(false);
            }
        }
    }

    /// Raise and focus, as a taskbar click does.
    pub fn focus_window(&mut self, id: WindowId, now: Instant) {
        self.drain_closed(now);
        self.raise(id);
        if let Some(win) = self.window_mut(id) {
            win.focus();
        }
    }

    /// Bring the bottom-most window to the top.
    pub fn cycle_focus(&mut self, now: Instant) {
        self.drain_closed(now);
        if let Some(id) = self.windows.iter().min_by_key(|w| w.z).map(|w| w.id()) {
            self.focus_window(id, now);
        }
    }

    fn topmost_at(&self, x: u16, y: u16) -> Option<(WindowId, ChromeHit)> {
        self.windows
            .iter()
            .filter_map(|w| w.hit(x, y).map(|hit| (w.z, w.id(), hit)))
            .max_by_key(|(z, _, _)| *z)
            .map(|(_, id, hit)| (id, hit))
    }

    // ── Pointer and keyboard routing ──────────────────────────────────────────

    /// Returns false when no window is under the pointer.
    pub fn pointer_down(&mut self, x: u16, y: u16, now: Instant) -> bool {
        self.drain_closed(now);
        let Some((id, hit)) = self.topmost_at(x, y) else {
            return false;
        };
        match hit {
            ChromeHit::Close => self.close_window(id, now),
            ChromeHit::Header | ChromeHit::ResizeHandle => {
                self.focus_window(id, now);
                if let Some(win) = self.window_mut(id) {
                    if hit == ChromeHit::Header {
                        win.begin_drag(x, y);
                    } else {
                        win.begin_resize(x, y);
                    }
                    self.pointer_owner = Some(id);
                }
            }
            ChromeHit::Content => {
                self.raise(id);
                let action = match self.window_mut(id) {
                    Some(win) => {
                        if !win.content().is_interactive_at(x, y) {
                            win.focus();
                        }
                        win.content_mut().click(x, y, now)
                    }
                    None => ContentAction::None,
                };
                self.apply(id, action, now);
            }
        }
        true
    }

    pub fn pointer_move(&mut self, x: u16, y: u16) {
        let desk = self.desk;
        if let Some(id) = self.pointer_owner {
            if let Some(win) = self.window_mut(id) {
                if win.pointer_move(x, y, desk) {
                    return;
                }
            }
            self.pointer_owner = None;
        }
        if let Some((id, ChromeHit::Content)) = self.topmost_at(x, y) {
            if let Some(win) = self.window_mut(id) {
                win.content_mut().hover(x, y);
            }
        }
    }

    pub fn pointer_up(&mut self) {
        if let Some(id) = self.pointer_owner.take() {
            if let Some(win) = self.window_mut(id) {
                win.pointer_up();
            }
        }
    }

    /// Returns false when there is no active window to take the key.
    pub fn key(&mut self, key: KeyEvent, now: Instant) -> bool {
        self.drain_closed(now);
        let Some(id) = self.active_id() else {
            return false;
        };
        let action = match self.window_mut(id) {
            Some(win) => win.content_mut().key(key, now),
            None => ContentAction::None,
        };
        self.apply(id, action, now);
        true
    }

    pub fn tick(&mut self, now: Instant) {
        self.drain_closed(now);
        if let Some((id, due)) = self.pending_focus {
            if now >= due {
                self.pending_focus = None;
                if let Some(win) = self.window_mut(id) {
                    win.focus();
                }
            }
        }
        let actions: Vec<(WindowId, ContentAction)> = self
            .windows
            .iter_mut()
            .map(|w| (w.id(), w.content_mut().tick(now)))
            .collect();
        for (id, action) in actions {
            self.apply(id, action, now);
        }
    }

    fn apply(&mut self, id: WindowId, action: ContentAction, now: Instant) {
        match action {
            ContentAction::None => {}
            ContentAction::Close => self.close_window(id, now),
            ContentAction::Resize(spec) => {
                let desk = self.desk;
                if let Some(win) = self.window_mut(id) {
                    win.apply_spec(spec, desk);
                }
            }
        }
    }

    pub fn close_all(&mut self, now: Instant) {
        let ids: Vec<WindowId> = self.windows.iter().map(|w| w.id()).collect();
        for id in ids {
            self.close_window(id, now);
        }
    }

    pub fn render(&mut self, f: &mut Frame, now: Instant) {
        let mut order: Vec<usize> = (0..self.windows.len()).collect();
        order.sort_by_key(|&i| self.windows[i].z);
        for i in order {
            self.windows[i].render(f, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::window::tests::Probe;
    use crate::core::window::WindowSpec;
    use crate::sound::Silent;
    use std::cell::Cell;

    fn services() -> AppServices {
        AppServices {
            storage: Storage::in_memory(),
            audio: Rc::new(Silent),
            settings: Settings::default(),
        }
    }

    fn manager() -> WindowManager {
        WindowManager::new(Rect::new(0, 1, 100, 30), services())
    }

    fn assert_active_is_max_z(wm: &WindowManager) {
        let actives: Vec<_> = wm.windows().iter().filter(|w| w.active).collect();
        match wm.windows().iter().max_by_key(|w| w.z) {
            Some(top) => {
                assert_eq!(actives.len(), 1);
                assert_eq!(actives[0].id(), top.id());
            }
            None => assert!(actives.is_empty()),
        }
    }

    fn header_of(wm: &WindowManager, id: WindowId) -> (u16, u16) {
        let r = wm.window(id).unwrap().rect.to_rect();
        (r.x + 2, r.y)
    }

    fn content_of(wm: &WindowManager, id: WindowId) -> (u16, u16) {
        let r = wm.window(id).unwrap().rect.to_rect();
        (r.x + 2, r.y + 2)
    }

    #[test]
    fn open_click_close_scenario() {
        let now = Instant::now();
        let mut wm = manager();
        let a = wm.open_window("A", Box::new(Probe::default()), now);
        let b = wm.open_window("B", Box::new(Probe::default()), now);
        assert_eq!(wm.active_id(), Some(b));
        assert!(wm.window(b).unwrap().z > wm.window(a).unwrap().z);

        // A's content corner is not covered by B (B spawned 4 right, 2 down).
        let (x, y) = content_of(&wm, a);
        assert!(wm.pointer_down(x, y, now));
        assert_eq!(wm.active_id(), Some(a));
        assert!(wm.window(a).unwrap().z > wm.window(b).unwrap().z);
        assert_active_is_max_z(&wm);

        wm.close_window(a, now);
        assert!(wm.window(a).is_none());
        assert_eq!(wm.active_id(), Some(b));
        assert_active_is_max_z(&wm);
    }

    #[test]
    fn active_tracks_max_z_through_random_sequences() {
        let now = Instant::now();
        let mut wm = manager();
        let mut open = Vec::new();
        for step in 0..40u64 {
            if step % 3 == 2 && !open.is_empty() {
                let id = open.remove((step as usize * 7) % open.len());
                wm.close_window(id, now);
            } else if step % 5 == 4 && !open.is_empty() {
                wm.cycle_focus(now);
            } else {
                open.push(wm.open_window("w", Box::new(Probe::default()), now));
            }
            assert_active_is_max_z(&wm);
        }
    }

    #[test]
    fn focus_request_after_close_is_deferred() {
        let now = Instant::now();
        let mut wm = manager();
        let probe = Probe::default();
        let focus = probe.focus_requests.clone();
        let a = wm.open_window("A", Box::new(probe), now);
        let b = wm.open_window("B", Box::new(Probe::default()), now);
        assert_eq!(focus.get(), 1);

        wm.close_window(b, now);
        assert_eq!(wm.active_id(), Some(a));
        wm.tick(now + Duration::from_millis(10));
        assert_eq!(focus.get(), 1);
        wm.tick(now + FOCUS_SETTLE_DELAY);
        assert_eq!(focus.get(), 2);
        wm.tick(now + Duration::from_secs(1));
        assert_eq!(focus.get(), 2);
    }

    #[test]
    fn closing_a_background_window_promotes_the_latest_survivor() {
        let now = Instant::now();
        let mut wm = manager();
        let a = wm.open_window("A", Box::new(Probe::default()), now);
        let b = wm.open_window("B", Box::new(Probe::default()), now);
        let probe = Probe::default();
        let focus = probe.focus_requests.clone();
        let c = wm.open_window("C", Box::new(probe), now);
        wm.focus_window(a, now);
        assert_eq!(wm.active_id(), Some(a));
        let before = focus.get();

        wm.close_window(b, now);
        assert_eq!(wm.active_id(), Some(c));
        assert_active_is_max_z(&wm);
        wm.tick(now + FOCUS_SETTLE_DELAY);
        assert_eq!(focus.get(), before + 1);

        wm.close_window(c, now);
        assert_eq!(wm.active_id(), Some(a));
    }

    #[test]
    fn content_click_refocuses_unless_control_is_interactive() {
        let now = Instant::now();
        let mut wm = manager();
        let plain = Probe::default();
        let plain_focus = plain.focus_requests.clone();
        let plain_clicks = plain.clicks.clone();
        let p = wm.open_window("plain", Box::new(plain), now);

        let control = Probe {
            interactive: true,
            ..Probe::default()
        };
        let control_focus = control.focus_requests.clone();
        let c = wm.open_window("control", Box::new(control), now);
        wm.set_desktop(Rect::new(0, 1, 200, 60));

        let (x, y) = content_of(&wm, p);
        wm.pointer_down(x, y, now);
        assert_eq!(plain_focus.get(), 2);
        assert_eq!(plain_clicks.borrow().as_slice(), &[(x, y)]);

        // Bottom border of C, clear of P and of C's resize handle.
        let r = wm.window(c).unwrap().rect.to_rect();
        wm.pointer_down(r.x + r.width - 2, r.y + r.height - 1, now);
        assert_eq!(wm.active_id(), Some(c));
        assert_eq!(control_focus.get(), 1);
    }

    #[test]
    fn header_drag_moves_only_that_window() {
        let now = Instant::now();
        let mut wm = manager();
        let a = wm.open_window("A", Box::new(Probe::default()), now);
        let before = wm.window(a).unwrap().rect;
        let (x, y) = header_of(&wm, a);
        wm.pointer_down(x, y, now);
        assert!(wm.window(a).unwrap().is_dragging());
        wm.pointer_move(x + 10, y + 5);
        wm.pointer_up();
        let after = wm.window(a).unwrap().rect;
        assert_eq!((after.x, after.y), (before.x + 10, before.y + 5));
        assert!(wm.window(a).unwrap().interaction().is_none());
    }

    #[test]
    fn close_control_closes_without_raising() {
        let now = Instant::now();
        let mut wm = manager();
        let a = wm.open_window("A", Box::new(Probe::default()), now);
        let probe = Probe::default();
        let closed = probe.closed.clone();
        let b = wm.open_window("B", Box::new(probe), now);
        let r = wm.window(b).unwrap().rect.to_rect();
        wm.pointer_down(r.x + r.width - 3, r.y, now);
        assert!(closed.get());
        assert!(wm.window(b).is_none());
        assert_eq!(wm.active_id(), Some(a));
    }

    #[test]
    fn spawn_cursor_wraps_inside_desktop() {
        let now = Instant::now();
        let mut wm = WindowManager::new(Rect::new(0, 1, 60, 20), services());
        let mut seen = Vec::new();
        for _ in 0..12 {
            let id = wm.open_window("w", Box::new(Probe::default()), now);
            let r = wm.window(id).unwrap().rect;
            assert!(r.x >= 0 && r.x + i32::from(r.w) <= 60);
            assert!(r.y >= 1 && r.y + i32::from(r.h) <= 21);
            seen.push((r.x, r.y));
        }
        assert_eq!(seen[0], (2, 2));
        assert_eq!(seen[1], (6, 4));
        assert!(seen.iter().skip(1).any(|&(x, y)| (x, y) == (2, 2)));
    }

    #[test]
    fn launch_failure_leaves_manager_untouched() {
        let now = Instant::now();
        let mut wm = manager();
        wm.register(AppDescriptor {
            id: "broken",
            name: "Broken",
            icon: "!",
            factory: Box::new(|_: &AppServices| -> Result<Box<dyn SessionContent>> {
                Err(anyhow!("boom"))
            }),
        });
        let built = Rc::new(Cell::new(0));
        let counter = built.clone();
        wm.register(AppDescriptor {
            id: "probe",
            name: "Probe",
            icon: "?",
            factory: Box::new(move |_: &AppServices| -> Result<Box<dyn SessionContent>> {
                counter.set(counter.get() + 1);
                Ok(Box::new(Probe::default()))
            }),
        });

        assert_eq!(wm.launch_app("broken", now), None);
        assert_eq!(wm.launch_app("missing", now), None);
        assert!(wm.windows().is_empty());
        assert_eq!(wm.active_id(), None);

        let id = wm.launch_app("probe", now).unwrap();
        assert_eq!(built.get(), 1);
        assert_eq!(wm.window(id).unwrap().title(), "Probe");
    }

    #[test]
    fn resize_action_applies_new_spec() {
        let now = Instant::now();
        let mut wm = manager();
        let id = wm.open_window("A", Box::new(Probe::default()), now);
        wm.apply(
            id,
            ContentAction::Resize(WindowSpec {
                w: 40,
                h: 12,
                min_w: 30,
                min_h: 10,
            }),
            now,
        );
        let r = wm.window(id).unwrap().rect;
        assert_eq!((r.w, r.h), (40, 12));
    }
}
