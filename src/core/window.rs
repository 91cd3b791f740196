use crossterm::event::KeyEvent;
use ratatui::{
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};
use std::time::Instant;

use crate::ui::{dim_style, sel_style, title_style, write_text};

pub type WindowId = u64;

pub const TITLE_CLOSE_BUTTON: &str = "[x]";
const RESIZE_HANDLE: &str = "◢";

// ── Content capability ────────────────────────────────────────────────────────

/// Size a piece of content asks its window for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub w: u16,
    pub h: u16,
    pub min_w: u16,
    pub min_h: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentAction {
    None,
    Close,
    Resize(WindowSpec),
}

/// What an app mounts inside a window. Coordinates are absolute terminal cells;
/// content keeps the hit areas from its last render.
pub trait SessionContent {
    fn spec(&self) -> WindowSpec;

    fn render(&mut self, f: &mut Frame, area: Rect, active: bool, now: Instant);

    /// Extra marker shown after the title (unread messages and the like).
    fn badge(&self) -> Option<String> {
        None
    }

    /// Restore keyboard focus to the remembered control.
    fn on_focus_requested(&mut self) {}

    fn on_activation_changed(&mut self, _active: bool) {}

    fn click(&mut self, _x: u16, _y: u16, _now: Instant) -> ContentAction {
        ContentAction::None
    }

    fn hover(&mut self, _x: u16, _y: u16) {}

    fn key(&mut self, _key: KeyEvent, _now: Instant) -> ContentAction {
        ContentAction::None
    }

    fn tick(&mut self, _now: Instant) -> ContentAction {
        ContentAction::None
    }

    /// True when `(x, y)` sits on a control that takes focus by itself.
    fn is_interactive_at(&self, _x: u16, _y: u16) -> bool {
        false
    }

    /// Stop timers and drop pending replies.
    fn on_close(&mut self) {}
}

// ── Geometry ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WinRect {
    pub x: i32,
    pub y: i32,
    pub w: u16,
    pub h: u16,
}

impl WinRect {
    pub fn contains(self, x: u16, y: u16) -> bool {
        let x0 = self.x.max(0) as u16;
        let y0 = self.y.max(0) as u16;
        let x1 = x0.saturating_add(self.w);
        let y1 = y0.saturating_add(self.h);
        x >= x0 && x < x1 && y >= y0 && y < y1
    }

    pub fn to_rect(self) -> Rect {
        Rect {
            x: self.x.max(0) as u16,
            y: self.y.max(0) as u16,
            width: self.w,
            height: self.h,
        }
    }
}

pub fn clamp_window_with_min(rect: &mut WinRect, desk: Rect, min_w: u16, min_h: u16) {
    if desk.width < 8 || desk.height < 4 {
        return;
    }
    let max_w = desk.width.max(1);
    let max_h = desk.height.max(1);
    let min_w_eff = min_w.min(max_w).max(1);
    let min_h_eff = min_h.min(max_h).max(1);

    rect.w = rect.w.min(max_w).max(min_w_eff);
    rect.h = rect.h.min(max_h).max(min_h_eff);

    let min_x = desk.x as i32;
    let min_y = desk.y as i32;
    let max_x = desk.x.saturating_add(desk.width).saturating_sub(rect.w) as i32;
    let max_y = desk.y.saturating_add(desk.height).saturating_sub(rect.h) as i32;

    rect.x = rect.x.clamp(min_x, max_x.max(min_x));
    rect.y = rect.y.clamp(min_y, max_y.max(min_y));
}

pub fn title_close_button_rect(area: Rect) -> Rect {
    Rect {
        x: area.x
            + area
                .width
                .saturating_sub(TITLE_CLOSE_BUTTON.len() as u16 + 1),
        y: area.y,
        width: TITLE_CLOSE_BUTTON.len() as u16,
        height: 1,
    }
}

fn point_in_rect(x: u16, y: u16, r: Rect) -> bool {
    x >= r.x && x < r.x.saturating_add(r.width) && y >= r.y && y < r.y.saturating_add(r.height)
}

// ── Chrome ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    Move {
        dx: i32,
        dy: i32,
    },
    Resize {
        start_w: u16,
        start_h: u16,
        start_x: i32,
        start_y: i32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromeHit {
    Close,
    Header,
    ResizeHandle,
    Content,
}

pub type CloseHook = Box<dyn FnOnce(WindowId)>;

pub struct WindowChrome {
    id: WindowId,
    title: String,
    pub rect: WinRect,
    min_w: u16,
    min_h: u16,
    pub z: u64,
    pub active: bool,
    interaction: Option<Interaction>,
    closed: bool,
    owner_hook: Option<CloseHook>,
    content: Box<dyn SessionContent>,
}

impl WindowChrome {
    pub fn new(id: WindowId, title: impl Into<String>, content: Box<dyn SessionContent>) -> Self {
        let spec = content.spec();
        Self {
            id,
            title: title.into(),
            rect: WinRect {
                x: 0,
                y: 0,
                w: spec.w.max(spec.min_w),
                h: spec.h.max(spec.min_h),
            },
            min_w: spec.min_w,
            min_h: spec.min_h,
            z: 0,
            active: false,
            interaction: None,
            closed: false,
            owner_hook: None,
            content,
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn display_title(&self) -> String {
        match self.content.badge() {
            Some(badge) => format!("{} {badge}", self.title),
            None => self.title.clone(),
        }
    }

    pub fn interaction(&self) -> Option<Interaction> {
        self.interaction
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.interaction, Some(Interaction::Move { .. }))
    }

    pub fn is_resizing(&self) -> bool {
        matches!(self.interaction, Some(Interaction::Resize { .. }))
    }

    pub fn content(&self) -> &dyn SessionContent {
        self.content.as_ref()
    }

    pub fn content_mut(&mut self) -> &mut dyn SessionContent {
        self.content.as_mut()
    }

    pub fn set_owner_hook(&mut self, hook: CloseHook) {
        self.owner_hook = Some(hook);
    }

    pub fn set_active(&mut self, active: bool) {
        if self.active != active {
            self.active = active;
            self.content.on_activation_changed(active);
        }
    }

    pub fn focus(&mut self) {
        if !self.closed {
            self.content.on_focus_requested();
        }
    }

    pub fn hit(&self, x: u16, y: u16) -> Option<ChromeHit> {
        if self.closed || !self.rect.contains(x, y) {
            return None;
        }
        let area = self.rect.to_rect();
        if point_in_rect(x, y, title_close_button_rect(area)) {
            return Some(ChromeHit::Close);
        }
        if y == area.y {
            return Some(ChromeHit::Header);
        }
        let right = area.x.saturating_add(area.width).saturating_sub(1);
        let bottom = area.y.saturating_add(area.height).saturating_sub(1);
        if x == right && y == bottom {
            return Some(ChromeHit::ResizeHandle);
        }
        Some(ChromeHit::Content)
    }

    pub fn begin_drag(&mut self, px: u16, py: u16) {
        if self.closed {
            return;
        }
        self.interaction = Some(Interaction::Move {
            dx: i32::from(px) - self.rect.x,
            dy: i32::from(py) - self.rect.y,
        });
    }

    pub fn begin_resize(&mut self, px: u16, py: u16) {
        if self.closed {
            return;
        }
        self.interaction = Some(Interaction::Resize {
            start_w: self.rect.w,
            start_h: self.rect.h,
            start_x: i32::from(px),
            start_y: i32::from(py),
        });
    }

    /// Returns false when no interaction is in progress.
    pub fn pointer_move(&mut self, px: u16, py: u16, desk: Rect) -> bool {
        let (px, py) = (i32::from(px), i32::from(py));
        match self.interaction {
            Some(Interaction::Move { dx, dy }) => {
                self.rect.x = px - dx;
                self.rect.y = py - dy;
            }
            Some(Interaction::Resize {
                start_w,
                start_h,
                start_x,
                start_y,
            }) => {
                let w = i32::from(start_w) + (px - start_x);
                let h = i32::from(start_h) + (py - start_y);
                self.rect.w = w.clamp(i32::from(self.min_w.max(1)), i32::from(u16::MAX)) as u16;
                self.rect.h = h.clamp(i32::from(self.min_h.max(1)), i32::from(u16::MAX)) as u16;
            }
            None => return false,
        }
        self.clamp_to(desk);
        true
    }

    pub fn pointer_up(&mut self) {
        self.interaction = None;
    }

    pub fn apply_spec(&mut self, spec: WindowSpec, desk: Rect) {
        self.min_w = spec.min_w;
        self.min_h = spec.min_h;
        self.rect.w = spec.w.max(spec.min_w);
        self.rect.h = spec.h.max(spec.min_h);
        self.clamp_to(desk);
    }

    pub fn clamp_to(&mut self, desk: Rect) {
        clamp_window_with_min(&mut self.rect, desk, self.min_w, self.min_h);
    }

    /// Detach, then notify the owner. The hook runs at most once; returns
    /// whether this call did the detaching.
    pub fn close(&mut self) -> bool {
        let detached_now = !self.closed;
        if detached_now {
            self.closed = true;
            self.interaction = None;
            self.active = false;
            self.content.on_close();
        }
        if let Some(hook) = self.owner_hook.take() {
            hook(self.id);
        }
        detached_now
    }

    pub fn render(&mut self, f: &mut Frame, now: Instant) {
        if self.closed {
            return;
        }
        let area = self.rect.to_rect().intersection(f.area());
        if area.width < 8 || area.height < 4 {
            return;
        }
        f.render_widget(Clear, area);

        let border_style = if self.active { title_style() } else { dim_style() };
        f.render_widget(
            Block::default().borders(Borders::ALL).style(border_style),
            area,
        );

        let title_style = if self.active { sel_style() } else { dim_style() };
        let mut chars: Vec<char> = vec![' '; area.width.saturating_sub(2) as usize];
        write_text(&mut chars, 0, &format!(" {} ", self.display_title()));
        if chars.len() >= TITLE_CLOSE_BUTTON.len() {
            let button_x = chars.len() - TITLE_CLOSE_BUTTON.len();
            write_text(&mut chars, button_x, TITLE_CLOSE_BUTTON);
        }
        let title_line: String = chars.into_iter().collect();
        f.render_widget(
            Paragraph::new(Line::from(Span::styled(title_line, title_style))),
            Rect {
                x: area.x + 1,
                y: area.y,
                width: area.width - 2,
                height: 1,
            },
        );

        let inner = Block::default().borders(Borders::ALL).inner(area);
        let active = self.active;
        self.content.render(f, inner, active, now);

        f.render_widget(
            Paragraph::new(Span::styled(RESIZE_HANDLE, border_style)),
            Rect {
                x: area.x + area.width - 1,
                y: area.y + area.height - 1,
                width: 1,
                height: 1,
            },
        );
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Content that records what the chrome and manager do to it.
    #[derive(Default)]
    pub struct Probe {
        pub focus_requests: Rc<Cell<u32>>,
        pub clicks: Rc<RefCell<Vec<(u16, u16)>>>,
        pub closed: Rc<Cell<bool>>,
        pub interactive: bool,
        pub spec: Option<WindowSpec>,
    }

    impl SessionContent for Probe {
        fn spec(&self) -> WindowSpec {
            self.spec.unwrap_or(WindowSpec {
                w: 20,
                h: 8,
                min_w: 12,
                min_h: 5,
            })
        }

        fn render(&mut self, _f: &mut Frame, _area: Rect, _active: bool, _now: Instant) {}

        fn on_focus_requested(&mut self) {
            self.focus_requests.set(self.focus_requests.get() + 1);
        }

        fn click(&mut self, x: u16, y: u16, _now: Instant) -> ContentAction {
            self.clicks.borrow_mut().push((x, y));
            ContentAction::None
        }

        fn is_interactive_at(&self, _x: u16, _y: u16) -> bool {
            self.interactive
        }

        fn on_close(&mut self) {
            self.closed.set(true);
        }
    }

    fn desk() -> Rect {
        Rect::new(0, 1, 100, 40)
    }

    fn window() -> WindowChrome {
        let mut w = WindowChrome::new(1, "Probe", Box::new(Probe::default()));
        w.rect = WinRect {
            x: 10,
            y: 5,
            w: 20,
            h: 8,
        };
        w
    }

    #[test]
    fn hit_regions() {
        let w = window();
        assert_eq!(w.hit(12, 5), Some(ChromeHit::Header));
        assert_eq!(w.hit(26, 5), Some(ChromeHit::Close));
        assert_eq!(w.hit(29, 12), Some(ChromeHit::ResizeHandle));
        assert_eq!(w.hit(15, 8), Some(ChromeHit::Content));
        assert_eq!(w.hit(30, 8), None);
    }

    #[test]
    fn drag_follows_pointer_minus_offset() {
        let mut w = window();
        w.begin_drag(14, 5);
        assert!(w.is_dragging() && !w.is_resizing());
        assert!(w.pointer_move(20, 9, desk()));
        assert_eq!((w.rect.x, w.rect.y), (16, 9));
        w.pointer_up();
        assert!(!w.pointer_move(40, 20, desk()));
        assert_eq!((w.rect.x, w.rect.y), (16, 9));
    }

    #[test]
    fn resize_clamps_to_minimum() {
        let mut w = window();
        w.begin_resize(29, 12);
        assert!(w.is_resizing() && !w.is_dragging());
        w.pointer_move(33, 14, desk());
        assert_eq!((w.rect.w, w.rect.h), (24, 10));
        w.pointer_move(0, 2, desk());
        assert_eq!((w.rect.w, w.rect.h), (12, 5));
    }

    #[test]
    fn starting_a_resize_ends_the_drag() {
        let mut w = window();
        w.begin_drag(12, 5);
        w.begin_resize(29, 12);
        assert!(w.is_resizing());
        assert!(!w.is_dragging());
    }

    #[test]
    fn drag_stays_inside_desktop() {
        let mut w = window();
        w.begin_drag(12, 5);
        w.pointer_move(0, 0, desk());
        assert_eq!((w.rect.x, w.rect.y), (0, 1));
        w.pointer_move(500, 500, desk());
        assert_eq!((w.rect.x, w.rect.y), (80, 33));
    }

    #[test]
    fn close_detaches_then_calls_hook_once() {
        let probe = Probe::default();
        let content_closed = probe.closed.clone();
        let mut w = WindowChrome::new(7, "Probe", Box::new(probe));
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        w.set_owner_hook(Box::new(move |id| {
            assert_eq!(id, 7);
            seen.set(seen.get() + 1);
        }));
        w.begin_drag(1, 0);

        assert!(w.close());
        assert!(w.closed);
        assert!(w.interaction().is_none());
        assert!(content_closed.get());
        assert!(!w.close());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn hook_installed_after_close_still_fires_once() {
        let mut w = window();
        assert!(w.close());
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        w.set_owner_hook(Box::new(move |_| seen.set(seen.get() + 1)));
        assert!(!w.close());
        assert!(!w.close());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn closed_window_takes_no_interaction() {
        let mut w = window();
        w.close();
        w.begin_drag(12, 5);
        assert!(w.interaction().is_none());
        assert_eq!(w.hit(12, 5), None);
    }
}
