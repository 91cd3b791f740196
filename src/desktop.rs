use anyhow::Result;
use chrono::Local;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::execute;
use ratatui::{
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::apps::builtin_apps;
use crate::config::{get_settings, storage_file, APP_TITLE};
use crate::core::window::WindowId;
use crate::core::wm::{AppServices, WindowManager};
use crate::sound::SoundPlayer;
use crate::storage::{JsonFileStore, Storage};
use crate::ui::{
    contains, dim_style, format_menu_row, normal_style, sel_style, text_width, title_style,
    truncate, write_text, write_text_in_area, Term,
};

const FRAME_POLL: Duration = Duration::from_millis(16);
const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(450);
const TASK_START_BUTTON: &str = "[Start]";
const TASK_START_SEPARATOR: &str = " | ";
const TASK_LABEL_MAX: usize = 16;
const START_QUIT_LABEL: &str = "Quit";
const ICON_W: u16 = 20;
const ICON_H: u16 = 2;
const ICON_GAP: u16 = 1;

#[derive(Debug, Clone, Copy)]
struct LastClick {
    icon: usize,
    at: Instant,
}

#[derive(Debug, Default)]
struct StartMenu {
    open: bool,
    selected: usize,
}

/// The desktop surface around the window manager: status line, icons,
/// taskbar and start menu.
pub struct Desktop {
    wm: WindowManager,
    size: Rect,
    start: StartMenu,
    selected_icon: Option<usize>,
    last_click: Option<LastClick>,
    cursor: Option<(u16, u16)>,
    quit: bool,
}

pub fn desktop_mode(terminal: &mut Term) -> Result<()> {
    let _ = terminal.hide_cursor();
    execute!(terminal.backend_mut(), EnableMouseCapture)?;
    let result = run_desktop_loop(terminal);
    let _ = execute!(terminal.backend_mut(), DisableMouseCapture);
    let _ = terminal.show_cursor();
    result
}

fn run_desktop_loop(terminal: &mut Term) -> Result<()> {
    let services = AppServices {
        storage: Storage::new(Rc::new(JsonFileStore::new(storage_file()))),
        audio: Rc::new(SoundPlayer::new()),
        settings: get_settings(),
    };
    let ts = terminal.size()?;
    let mut desktop = Desktop::new(full_rect(ts.width, ts.height), services);

    loop {
        let now = Instant::now();
        terminal.draw(|f| desktop.draw(f, now))?;

        if event::poll(FRAME_POLL)? {
            let now = Instant::now();
            match event::read()? {
                Event::Key(key) => desktop.handle_key(key, now),
                Event::Mouse(mouse) => desktop.handle_mouse(mouse, now),
                Event::Resize(w, h) => desktop.resize(full_rect(w, h)),
                _ => {}
            }
        }

        let now = Instant::now();
        desktop.tick(now);
        if desktop.should_quit() {
            desktop.shutdown(now);
            tracing::info!("desktop closed");
            return Ok(());
        }
    }
}

impl Desktop {
    pub fn new(size: Rect, services: AppServices) -> Self {
        let mut wm = WindowManager::new(desktop_area(size), services);
        for app in builtin_apps() {
            wm.register(app);
        }
        Self {
            wm,
            size,
            start: StartMenu::default(),
            selected_icon: None,
            last_click: None,
            cursor: None,
            quit: false,
        }
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn resize(&mut self, size: Rect) {
        if size != self.size {
            self.size = size;
            self.wm.set_desktop(desktop_area(size));
        }
    }

    pub fn tick(&mut self, now: Instant) {
        self.wm.tick(now);
    }

    /// Close every window so running workers and sockets wind down.
    pub fn shutdown(&mut self, now: Instant) {
        self.wm.close_all(now);
    }

    fn launch(&mut self, index: usize, now: Instant) {
        let Some(id) = self.wm.apps().get(index).map(|a| a.id) else {
            return;
        };
        if let Some(window) = self.wm.launch_app(id, now) {
            tracing::info!(app = id, window, "app launched");
        }
    }

    // ── Keyboard ──────────────────────────────────────────────────────────────

    pub fn handle_key(&mut self, key: KeyEvent, now: Instant) {
        if key.kind == KeyEventKind::Release {
            return;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('q') if ctrl => self.quit = true,
            KeyCode::F(10) => self.toggle_start_menu(),
            _ if self.start.open => self.start_menu_key(key, now),
            KeyCode::F(6) => self.wm.cycle_focus(now),
            KeyCode::Char('w') if ctrl => self.wm.close_active(now),
            _ => {
                if !self.wm.key(key, now) {
                    self.icon_key(key, now);
                }
            }
        }
    }

    fn toggle_start_menu(&mut self) {
        self.start.open = !self.start.open;
        self.start.selected = 0;
    }

    fn start_menu_key(&mut self, key: KeyEvent, now: Instant) {
        let last = self.wm.apps().len();
        match key.code {
            KeyCode::Esc => self.start.open = false,
            KeyCode::Up => self.start.selected = self.start.selected.saturating_sub(1),
            KeyCode::Down => self.start.selected = (self.start.selected + 1).min(last),
            KeyCode::Enter => self.activate_start(self.start.selected, now),
            _ => {}
        }
    }

    fn activate_start(&mut self, item: usize, now: Instant) {
        self.start.open = false;
        if item < self.wm.apps().len() {
            self.launch(item, now);
        } else {
            self.quit = true;
        }
    }

    /// Arrow keys walk the icons while no window holds the keyboard.
    fn icon_key(&mut self, key: KeyEvent, now: Instant) {
        let count = self.wm.apps().len();
        if count == 0 {
            return;
        }
        match key.code {
            KeyCode::Down | KeyCode::Right | KeyCode::Tab => {
                self.selected_icon = Some(self.selected_icon.map_or(0, |i| (i + 1) % count));
            }
            KeyCode::Up | KeyCode::Left | KeyCode::BackTab => {
                self.selected_icon =
                    Some(self.selected_icon.map_or(count - 1, |i| (i + count - 1) % count));
            }
            KeyCode::Enter => {
                if let Some(i) = self.selected_icon {
                    self.launch(i, now);
                }
            }
            _ => {}
        }
    }

    // ── Mouse ─────────────────────────────────────────────────────────────────

    pub fn handle_mouse(&mut self, mouse: MouseEvent, now: Instant) {
        let (x, y) = (mouse.column, mouse.row);
        self.cursor = Some((x, y));
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => self.pointer_down(x, y, now),
            MouseEventKind::Drag(MouseButton::Left) => self.wm.pointer_move(x, y),
            MouseEventKind::Moved => {
                if self.start.open {
                    if let Some(item) = self.start_item_at(x, y) {
                        self.start.selected = item;
                    }
                } else {
                    self.wm.pointer_move(x, y);
                }
            }
            MouseEventKind::Up(MouseButton::Left) => self.wm.pointer_up(),
            _ => {}
        }
    }

    fn pointer_down(&mut self, x: u16, y: u16, now: Instant) {
        let task = taskbar_area(self.size);
        if contains(start_button_rect(task), x, y) {
            self.toggle_start_menu();
            return;
        }
        if self.start.open {
            match self.start_item_at(x, y) {
                Some(item) => self.activate_start(item, now),
                None => self.start.open = false,
            }
            return;
        }
        if contains(task, x, y) {
            let hit = taskbar_buttons(&self.wm, task)
                .into_iter()
                .find(|(r, _)| contains(*r, x, y));
            if let Some((_, id)) = hit {
                self.wm.focus_window(id, now);
            }
            return;
        }
        if self.wm.pointer_down(x, y, now) {
            self.last_click = None;
            return;
        }

        let desk = desktop_area(self.size);
        let icon = (0..self.wm.apps().len())
            .find(|&i| icon_rect(desk, i).is_some_and(|r| contains(r, x, y)));
        self.selected_icon = icon;
        if let Some(i) = icon {
            if self.is_double_click(i, now) {
                self.launch(i, now);
            }
        } else {
            self.last_click = None;
        }
    }

    fn is_double_click(&mut self, icon: usize, now: Instant) -> bool {
        if let Some(prev) = self.last_click {
            if prev.icon == icon && now.saturating_duration_since(prev.at) <= DOUBLE_CLICK_WINDOW {
                self.last_click = None;
                return true;
            }
        }
        self.last_click = Some(LastClick { icon, at: now });
        false
    }

    fn start_item_at(&self, x: u16, y: u16) -> Option<usize> {
        let menu = start_menu_rect(self.size, self.start_labels().as_slice());
        let inner = Block::default().borders(Borders::ALL).inner(menu);
        if !contains(inner, x, y) {
            return None;
        }
        start_rows(self.wm.apps().len())
            .get(usize::from(y - inner.y))
            .copied()
            .flatten()
    }

    fn start_labels(&self) -> Vec<String> {
        self.wm
            .apps()
            .iter()
            .map(|a| format!("{} {}", a.icon, a.name))
            .chain(std::iter::once(START_QUIT_LABEL.to_string()))
            .collect()
    }

    // ── Drawing ───────────────────────────────────────────────────────────────

    pub fn draw(&mut self, f: &mut Frame, now: Instant) {
        self.resize(f.area());
        let size = self.size;

        // Fully clear each frame so overlapped windows cannot leak old cells.
        f.render_widget(Clear, size);

        draw_top_status(f, top_status_area(size));
        self.draw_icons(f, desktop_area(size));
        self.wm.render(f, now);
        self.draw_taskbar(f, taskbar_area(size));
        if self.start.open {
            self.draw_start_menu(f);
        }
        if let Some((x, y)) = self.cursor {
            draw_cursor(f, x, y, size);
        }
    }

    fn draw_icons(&self, f: &mut Frame, desk: Rect) {
        for (i, app) in self.wm.apps().iter().enumerate() {
            let Some(r) = icon_rect(desk, i) else {
                break;
            };
            let icon_style = if self.selected_icon == Some(i) {
                sel_style()
            } else {
                title_style()
            };
            let lines = vec![
                Line::from(Span::styled(format!(" {} ", app.icon), icon_style)),
                Line::from(Span::styled(
                    truncate(app.name, usize::from(ICON_W)),
                    normal_style(),
                )),
            ];
            f.render_widget(Paragraph::new(lines), r);
        }
    }

    fn draw_taskbar(&self, f: &mut Frame, area: Rect) {
        if area.height == 0 || area.width == 0 {
            return;
        }
        let mut row = vec![' '; area.width as usize];
        write_text_in_area(&mut row, area, area.x, TASK_START_BUTTON);
        write_text_in_area(
            &mut row,
            area,
            area.x.saturating_add(start_button_rect(area).width),
            TASK_START_SEPARATOR,
        );
        let buttons = taskbar_buttons(&self.wm, area);
        for (rect, id) in &buttons {
            if let Some(win) = self.wm.window(*id) {
                write_text_in_area(&mut row, area, rect.x, &task_button_text(&win.display_title()));
            }
        }
        let line: String = row.into_iter().collect();
        f.render_widget(
            Paragraph::new(Line::from(Span::styled(line, sel_style()))),
            area,
        );

        let active = self.wm.active_id();
        if let Some((rect, id)) = buttons.iter().find(|(_, id)| Some(*id) == active) {
            if let Some(win) = self.wm.window(*id) {
                f.render_widget(
                    Paragraph::new(Span::styled(
                        task_button_text(&win.display_title()),
                        title_style(),
                    )),
                    *rect,
                );
            }
        }
    }

    fn draw_start_menu(&self, f: &mut Frame) {
        let labels = self.start_labels();
        let menu = start_menu_rect(self.size, &labels);
        if menu.width < 4 || menu.height < 3 {
            return;
        }
        f.render_widget(Clear, menu);
        f.render_widget(
            Block::default().borders(Borders::ALL).style(title_style()),
            menu,
        );
        let inner = Block::default().borders(Borders::ALL).inner(menu);
        let width = inner.width as usize;
        let lines: Vec<Line> = start_rows(self.wm.apps().len())
            .into_iter()
            .map(|row| match row {
                Some(i) => {
                    let style = if i == self.start.selected {
                        sel_style()
                    } else {
                        normal_style()
                    };
                    Line::from(Span::styled(format_menu_row(width, &labels[i], None), style))
                }
                None => Line::from(Span::styled("-".repeat(width), dim_style())),
            })
            .collect();
        f.render_widget(Paragraph::new(lines), inner);
    }
}

fn draw_top_status(f: &mut Frame, area: Rect) {
    if area.height == 0 {
        return;
    }
    let clock = Local::now().format("%a %Y-%m-%d %I:%M%p").to_string();
    let width = area.width as usize;
    let mut row = vec![' '; width];

    write_text(&mut row, 0, &format!(" {APP_TITLE} "));
    if width >= clock.len() + 2 {
        write_text(&mut row, width - clock.len() - 2, &format!(" {clock} "));
    }

    let line: String = row.into_iter().collect();
    f.render_widget(
        Paragraph::new(Line::from(Span::styled(line, sel_style()))),
        area,
    );
}

fn draw_cursor(f: &mut Frame, x: u16, y: u16, size: Rect) {
    if x >= size.width || y >= size.height {
        return;
    }
    f.render_widget(
        Paragraph::new(Line::from(Span::styled("+", sel_style()))),
        Rect {
            x,
            y,
            width: 1,
            height: 1,
        },
    );
}

// ── Layout ────────────────────────────────────────────────────────────────────

fn full_rect(width: u16, height: u16) -> Rect {
    Rect {
        x: 0,
        y: 0,
        width,
        height,
    }
}

fn top_status_area(size: Rect) -> Rect {
    Rect {
        height: size.height.min(1),
        ..size
    }
}

fn taskbar_area(size: Rect) -> Rect {
    Rect {
        x: size.x,
        y: size.y + size.height.saturating_sub(1),
        width: size.width,
        height: if size.height > 1 { 1 } else { 0 },
    }
}

fn desktop_area(size: Rect) -> Rect {
    let top = size.height.min(1);
    let bottom = if size.height > 1 { 1 } else { 0 };
    Rect {
        x: size.x,
        y: size.y + top,
        width: size.width,
        height: size.height.saturating_sub(top + bottom),
    }
}

fn start_button_rect(task: Rect) -> Rect {
    Rect {
        width: text_width(TASK_START_BUTTON).min(task.width),
        ..task
    }
}

/// Start menu rows: one per app, a separator, then Quit.
fn start_rows(app_count: usize) -> Vec<Option<usize>> {
    (0..app_count)
        .map(Some)
        .chain([None, Some(app_count)])
        .collect()
}

/// Sits on top of the taskbar, left-aligned with the start button.
fn start_menu_rect(size: Rect, labels: &[String]) -> Rect {
    let task = taskbar_area(size);
    let widest = labels.iter().map(|l| text_width(l)).max().unwrap_or(0);
    let width = (widest + 4).min(size.width);
    let height = (labels.len() as u16 + 3).min(task.y.saturating_sub(size.y));
    Rect {
        x: task.x,
        y: task.y.saturating_sub(height),
        width,
        height,
    }
}

/// Icons fill the desktop top to bottom, then wrap to the next column.
fn icon_rect(desk: Rect, index: usize) -> Option<Rect> {
    let pitch = ICON_H + ICON_GAP;
    let per_col = usize::from((desk.height.saturating_sub(1) / pitch).max(1));
    let col = u16::try_from(index / per_col).ok()?;
    let row = (index % per_col) as u16;
    let x = desk.x + 2 + col.checked_mul(ICON_W + 2)?;
    let y = desk.y + 1 + row * pitch;
    if x + ICON_W > desk.x + desk.width || y + ICON_H > desk.y + desk.height {
        return None;
    }
    Some(Rect {
        x,
        y,
        width: ICON_W,
        height: ICON_H,
    })
}

fn task_button_text(title: &str) -> String {
    format!("[{}]", truncate(title, TASK_LABEL_MAX))
}

/// One button per open window in open order; those that do not fit are left out.
fn taskbar_buttons(wm: &WindowManager, task: Rect) -> Vec<(Rect, WindowId)> {
    let end = task.x.saturating_add(task.width);
    let mut x = task
        .x
        .saturating_add(start_button_rect(task).width)
        .saturating_add(text_width(TASK_START_SEPARATOR));
    let mut buttons = Vec::new();
    for win in wm.windows() {
        let width = text_width(&task_button_text(&win.display_title()));
        if x.saturating_add(width) > end {
            break;
        }
        buttons.push((
            Rect {
                x,
                y: task.y,
                width,
                height: 1,
            },
            win.id(),
        ));
        x = x.saturating_add(width).saturating_add(1);
    }
    buttons
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::sound::Silent;
    use crossterm::event::KeyEventState;
    use ratatui::{backend::TestBackend, Terminal};

    fn size() -> Rect {
        full_rect(100, 30)
    }

    fn desktop() -> Desktop {
        Desktop::new(
            size(),
            AppServices {
                storage: Storage::in_memory(),
                audio: Rc::new(Silent),
                settings: Settings::default(),
            },
        )
    }

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn click(x: u16, y: u16) -> MouseEvent {
        MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: x,
            row: y,
            modifiers: KeyModifiers::NONE,
        }
    }

    #[test]
    fn areas_split_the_screen() {
        let s = size();
        assert_eq!(top_status_area(s), Rect::new(0, 0, 100, 1));
        assert_eq!(desktop_area(s), Rect::new(0, 1, 100, 28));
        assert_eq!(taskbar_area(s), Rect::new(0, 29, 100, 1));
        assert_eq!(start_button_rect(taskbar_area(s)).width, 7);
        assert_eq!(desktop_area(full_rect(10, 1)).height, 0);
    }

    #[test]
    fn icons_wrap_into_columns() {
        let desk = Rect::new(0, 1, 100, 10);
        assert_eq!(icon_rect(desk, 0), Some(Rect::new(2, 2, ICON_W, ICON_H)));
        assert_eq!(icon_rect(desk, 1), Some(Rect::new(2, 5, ICON_W, ICON_H)));
        assert_eq!(icon_rect(desk, 3), Some(Rect::new(24, 2, ICON_W, ICON_H)));
        assert_eq!(icon_rect(Rect::new(0, 1, 10, 10), 0), None);
    }

    #[test]
    fn double_click_on_icon_launches() {
        let now = Instant::now();
        let mut d = desktop();
        let r = icon_rect(desktop_area(size()), 0).unwrap();
        d.handle_mouse(click(r.x + 1, r.y), now);
        assert!(d.wm.windows().is_empty());
        assert_eq!(d.selected_icon, Some(0));

        d.handle_mouse(click(r.x + 1, r.y + 1), now + Duration::from_millis(200));
        assert_eq!(d.wm.windows().len(), 1);
        assert_eq!(d.wm.windows()[0].title(), "Memory Game");
    }

    #[test]
    fn slow_second_click_only_selects() {
        let now = Instant::now();
        let mut d = desktop();
        let r = icon_rect(desktop_area(size()), 1).unwrap();
        d.handle_mouse(click(r.x, r.y), now);
        d.handle_mouse(click(r.x, r.y), now + Duration::from_secs(1));
        assert!(d.wm.windows().is_empty());
        assert_eq!(d.selected_icon, Some(1));
    }

    #[test]
    fn start_menu_launches_and_quits() {
        let now = Instant::now();
        let mut d = desktop();
        d.handle_key(press(KeyCode::F(10), KeyModifiers::NONE), now);
        assert!(d.start.open);
        d.handle_key(press(KeyCode::Down, KeyModifiers::NONE), now);
        d.handle_key(press(KeyCode::Enter, KeyModifiers::NONE), now);
        assert!(!d.start.open);
        assert_eq!(d.wm.windows()[0].title(), "The Caliph's Scroll");

        d.handle_key(press(KeyCode::F(10), KeyModifiers::NONE), now);
        for _ in 0..10 {
            d.handle_key(press(KeyCode::Down, KeyModifiers::NONE), now);
        }
        assert_eq!(d.start.selected, d.wm.apps().len());
        d.handle_key(press(KeyCode::Enter, KeyModifiers::NONE), now);
        assert!(d.should_quit());
    }

    #[test]
    fn start_menu_click_picks_row() {
        let now = Instant::now();
        let mut d = desktop();
        let task = taskbar_area(size());
        d.handle_mouse(click(task.x + 1, task.y), now);
        assert!(d.start.open);

        let menu = start_menu_rect(size(), &d.start_labels());
        d.handle_mouse(click(menu.x + 2, menu.y + 1), now);
        assert_eq!(d.wm.windows().len(), 1);
        assert!(!d.start.open);

        d.handle_mouse(click(task.x + 1, task.y), now);
        d.handle_mouse(click(90, 5), now);
        assert!(!d.start.open);
        assert_eq!(d.wm.windows().len(), 1);
    }

    #[test]
    fn taskbar_click_raises_window() {
        let now = Instant::now();
        let mut d = desktop();
        let memory = d.wm.launch_app("memory", now).unwrap();
        let word = d.wm.launch_app("word", now).unwrap();
        assert_eq!(d.wm.active_id(), Some(word));

        let buttons = taskbar_buttons(&d.wm, taskbar_area(size()));
        assert_eq!(buttons.len(), 2);
        let (r, id) = buttons[0];
        assert_eq!(id, memory);
        d.handle_mouse(click(r.x, r.y), now);
        assert_eq!(d.wm.active_id(), Some(memory));
    }

    #[test]
    fn shortcuts_cycle_close_and_quit() {
        let now = Instant::now();
        let mut d = desktop();
        let memory = d.wm.launch_app("memory", now).unwrap();
        let word = d.wm.launch_app("word", now).unwrap();

        d.handle_key(press(KeyCode::F(6), KeyModifiers::NONE), now);
        assert_eq!(d.wm.active_id(), Some(memory));
        d.handle_key(press(KeyCode::Char('w'), KeyModifiers::CONTROL), now);
        assert!(d.wm.window(memory).is_none());
        assert_eq!(d.wm.active_id(), Some(word));

        d.handle_key(press(KeyCode::Char('q'), KeyModifiers::CONTROL), now);
        assert!(d.should_quit());
        d.shutdown(now);
        assert!(d.wm.windows().is_empty());
    }

    #[test]
    fn arrows_walk_icons_when_no_window_is_open() {
        let now = Instant::now();
        let mut d = desktop();
        d.handle_key(press(KeyCode::Up, KeyModifiers::NONE), now);
        assert_eq!(d.selected_icon, Some(d.wm.apps().len() - 1));
        d.handle_key(press(KeyCode::Down, KeyModifiers::NONE), now);
        assert_eq!(d.selected_icon, Some(0));
        d.handle_key(press(KeyCode::Enter, KeyModifiers::NONE), now);
        assert_eq!(d.wm.windows().len(), 1);
    }

    #[test]
    fn draw_shows_title_and_taskbar() {
        let now = Instant::now();
        let mut d = desktop();
        d.wm.launch_app("memory", now).unwrap();
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| d.draw(f, now)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        let row = |y: u16| -> String {
            (0..100).map(|x| buffer[(x, y)].symbol().to_string()).collect()
        };
        assert!(row(0).contains(APP_TITLE));
        assert!(row(29).starts_with("[Start] | [Memory Game]"));
    }
}
