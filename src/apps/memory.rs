use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    layout::{Alignment, Rect},
    text::Span,
    widgets::{Block, Borders, Paragraph},
    Frame,
};
use std::time::Instant;

use super::{focus_step, is_activate, Controls, Standing};
use crate::core::focus::Cycle;
use crate::core::memory::{CardState, MemoryInput, MemoryRound, MemorySettings, MemorySummary, Mode};
use crate::core::session::{Finished, Phase, Session, SessionEvent, Step};
use crate::core::window::{ContentAction, SessionContent, WindowSpec};
use crate::core::wm::{AppDescriptor, AppServices};
use crate::storage::{HighScore, MEMORY_STREAK};
use crate::timer::format_clock;
use crate::ui::{
    bad_style, button_row, centered_line, dim_style, good_style, normal_style, pad_horizontal,
    sel_style, text_line, title_style,
};

const CARD_W: u16 = 7;
const CARD_H: u16 = 3;
const DEFAULT_PLAYER: &str = "Player";

const MENU_SPEC: WindowSpec = WindowSpec {
    w: 40,
    h: 16,
    min_w: 34,
    min_h: 14,
};

const RESULT_SPEC: WindowSpec = WindowSpec {
    w: 40,
    h: 20,
    min_w: 34,
    min_h: 20,
};

pub fn descriptor() -> AppDescriptor {
    AppDescriptor {
        id: "memory",
        name: "Memory Game",
        icon: "[MG]",
        factory: Box::new(|services: &AppServices| -> Result<Box<dyn SessionContent>> {
            Ok(Box::new(MemoryApp::new(services)))
        }),
    }
}

fn grid_spec(rows: usize, cols: usize) -> WindowSpec {
    let gw = (cols as u16) * (CARD_W + 1) - 1;
    let gh = (rows as u16) * (CARD_H + 1) - 1;
    let w = gw.max(30) + 4;
    let h = gh + 7;
    WindowSpec {
        w,
        h,
        min_w: w,
        min_h: h,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Mode,
    Level,
    Start,
    Card(usize),
    Menu,
    PlayAgain,
}

pub struct MemoryApp {
    session: Session<MemoryRound>,
    settings: MemorySettings,
    cursor: usize,
    controls: Controls<Control>,
    focus_visible: bool,
    last_spec: WindowSpec,
    standing: Standing,
    best_times: Vec<HighScore>,
}

impl MemoryApp {
    pub fn new(services: &AppServices) -> Self {
        Self::with_session(Session::new(
            services.storage.clone(),
            services.audio.clone(),
            MEMORY_STREAK,
        ))
    }

    fn with_session(session: Session<MemoryRound>) -> Self {
        let standing = Standing::load(session.storage(), MEMORY_STREAK);
        Self {
            session,
            settings: MemorySettings::default(),
            cursor: 0,
            controls: Controls::new(),
            focus_visible: true,
            last_spec: MENU_SPEC,
            standing,
            best_times: Vec::new(),
        }
    }

    fn handle(&mut self, event: SessionEvent<MemoryRound>, now: Instant) -> ContentAction {
        let before = std::mem::discriminant(self.session.phase());
        let step = self.session.handle(event, now);
        if step == Step::Won {
            self.record_win();
        }
        if before != std::mem::discriminant(self.session.phase()) {
            self.cursor = 0;
            self.controls.reset();
            self.reload_standing();
        }
        self.resize_if_needed()
    }

    fn reload_standing(&mut self) {
        let storage = self.session.storage();
        self.standing = Standing::load(storage, MEMORY_STREAK);
        self.best_times = match self.session.phase() {
            Phase::Won(Finished {
                summary: MemorySummary::Solo { level, .. },
                ..
            })
            | Phase::Lost(Finished {
                summary: MemorySummary::Solo { level, .. },
                ..
            }) => storage.high_scores(level.score_list()),
            _ => Vec::new(),
        };
    }

    /// Single-player wins go on the level's high-score list.
    fn record_win(&self) {
        let Phase::Won(Finished {
            summary: MemorySummary::Solo { level, elapsed, .. },
            ..
        }) = self.session.phase()
        else {
            return;
        };
        let storage = self.session.storage();
        let name = storage.nickname().unwrap_or_else(|| DEFAULT_PLAYER.to_string());
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        storage.save_high_score(level.score_list(), &name, millis);
        tracing::info!(level = level.label(), millis, "memory high score recorded");
    }

    fn resize_if_needed(&mut self) -> ContentAction {
        let spec = self.spec();
        if spec == self.last_spec {
            return ContentAction::None;
        }
        self.last_spec = spec;
        ContentAction::Resize(spec)
    }

    fn activate(&mut self, control: Control, now: Instant) -> ContentAction {
        match control {
            Control::Mode => {
                self.settings.mode = self.settings.mode.next();
                ContentAction::None
            }
            Control::Level => {
                self.settings.level = self.settings.level.next();
                ContentAction::None
            }
            Control::Start => self.handle(SessionEvent::Start(self.settings), now),
            Control::Card(i) => {
                self.cursor = i;
                self.handle(SessionEvent::Input(MemoryInput::Flip(i)), now)
            }
            Control::Menu => self.handle(SessionEvent::BackToMenu, now),
            Control::PlayAgain => self.handle(SessionEvent::PlayAgain, now),
        }
    }

    fn move_cursor(&mut self, code: KeyCode) {
        let Some(round) = self.session.round() else {
            return;
        };
        let cols = round.cols();
        let len = round.cards().len();
        let (row, col) = (self.cursor / cols, self.cursor % cols);
        let rows = len / cols;
        self.cursor = match code {
            KeyCode::Left => row * cols + (col + cols - 1) % cols,
            KeyCode::Right => row * cols + (col + 1) % cols,
            KeyCode::Up => ((row + rows - 1) % rows) * cols + col,
            KeyCode::Down => ((row + 1) % rows) * cols + col,
            _ => self.cursor,
        };
    }

    // ── Rendering ─────────────────────────────────────────────────────────────

    fn render_menu(&mut self, f: &mut Frame, area: Rect, focus: bool) {
        centered_line(f, area, 1, "Memory Game", title_style());
        centered_line(f, area, 3, "Match every pair of Andalusi tiles.", dim_style());
        let rows = [
            (Control::Mode, format!("Mode: {}", self.settings.mode.label())),
            (Control::Level, format!("Level: {}", self.settings.level.label())),
            (Control::Start, "Start".to_string()),
        ];
        for (i, (control, label)) in rows.into_iter().enumerate() {
            let focused = self.controls.row_focus(focus, 1);
            let rect = button_row(f, area, 5 + 2 * i as u16, &[label], focused)[0];
            self.controls.push(rect, control);
        }
        let Standing { streak, best } = self.standing;
        centered_line(f, area, 12, &format!("Streak: {streak}   Best: {best}"), dim_style());
    }

    fn render_round(&mut self, f: &mut Frame, area: Rect, focus: bool, now: Instant) {
        let Some(round) = self.session.round() else {
            return;
        };
        let status = if round.settings().mode == Mode::TwoPlayers {
            let [a, b] = round.scores();
            format!("Player 1: {a}   Player 2: {b}")
        } else {
            format!(
                "Attempts: {}   Time: {}",
                round.attempts(),
                format_clock(round.elapsed(now))
            )
        };
        centered_line(f, area, 0, &status, normal_style());
        if round.settings().mode == Mode::TwoPlayers {
            centered_line(
                f,
                area,
                1,
                &format!("Turn: Player {}", round.current_player()),
                title_style(),
            );
        }

        let cols = round.cols() as u16;
        let rows = (round.cards().len() as u16).div_ceil(cols.max(1));
        let gw = cols * (CARD_W + 1) - 1;
        let gh = rows * (CARD_H + 1) - 1;
        let gx = area.x + area.width.saturating_sub(gw) / 2;
        let gy = area.y + 2;
        let mut cards = Vec::with_capacity(round.cards().len());
        for (i, card) in round.cards().iter().enumerate() {
            let (r, c) = (i as u16 / cols, i as u16 % cols);
            let rect = Rect {
                x: gx + c * (CARD_W + 1),
                y: gy + r * (CARD_H + 1),
                width: CARD_W,
                height: CARD_H,
            }
            .intersection(area);
            let (face, face_style, border) = match card.state {
                CardState::Hidden => ("?".to_string(), dim_style(), normal_style()),
                CardState::FaceUp => (card.symbol.glyph().to_string(), title_style(), title_style()),
                CardState::Matched => (card.symbol.glyph().to_string(), good_style(), dim_style()),
            };
            let border = if focus && self.cursor == i { sel_style() } else { border };
            let block = Block::default().borders(Borders::ALL).border_style(border);
            let inner = block.inner(rect);
            f.render_widget(block, rect);
            f.render_widget(
                Paragraph::new(Span::styled(face, face_style)).alignment(Alignment::Center),
                inner,
            );
            cards.push(rect);
        }
        for (i, rect) in cards.into_iter().enumerate() {
            self.controls.push(rect, Control::Card(i));
        }
        let rect = button_row(f, area, gh + 3, &["Menu".to_string()], None)[0];
        self.controls.push(rect, Control::Menu);
    }

    fn render_finished(&mut self, f: &mut Frame, area: Rect, focus: bool) {
        let (finished, won) = match self.session.phase() {
            Phase::Won(done) => (done.clone(), true),
            Phase::Lost(done) => (done.clone(), false),
            _ => return,
        };
        let headline_style = if won { good_style() } else { bad_style() };
        centered_line(f, area, 1, &finished.summary.headline(), headline_style);
        let mut y = 3;
        match &finished.summary {
            MemorySummary::Solo { attempts, elapsed, .. } => {
                centered_line(f, area, y, &format!("Attempts: {attempts}"), normal_style());
                centered_line(f, area, y + 1, &format!("Time: {}", format_clock(*elapsed)), normal_style());
                y += 3;
                centered_line(f, area, y, "Best Times", title_style());
                for (i, s) in self.best_times.iter().enumerate() {
                    let line = format!(
                        "{}. {} {}",
                        i + 1,
                        s.nickname,
                        format_clock(std::time::Duration::from_millis(s.time))
                    );
                    text_line(f, area, y + 1 + i as u16, &format!("  {line}"), dim_style());
                }
                y += 1 + self.best_times.len() as u16;
            }
            MemorySummary::Duel { scores: [a, b] } => {
                centered_line(f, area, y, &format!("Player 1: {a}   Player 2: {b}"), normal_style());
                y += 1;
            }
        }
        centered_line(
            f,
            area,
            y + 1,
            &format!("Streak: {}   Best: {}", finished.streak, finished.best_streak),
            dim_style(),
        );
        let focused = self.controls.row_focus(focus, 2);
        let rects = button_row(
            f,
            area,
            area.height.saturating_sub(1),
            &["Play Again".to_string(), "Menu".to_string()],
            focused,
        );
        self.controls.push(rects[0], Control::PlayAgain);
        self.controls.push(rects[1], Control::Menu);
    }
}

impl SessionContent for MemoryApp {
    fn spec(&self) -> WindowSpec {
        match self.session.phase() {
            Phase::Menu => MENU_SPEC,
            Phase::Playing(round) => {
                let level = round.settings().level;
                grid_spec(level.rows(), level.cols())
            }
            Phase::Won(_) | Phase::Lost(_) => RESULT_SPEC,
        }
    }

    fn render(&mut self, f: &mut Frame, area: Rect, active: bool, now: Instant) {
        let area = pad_horizontal(area);
        self.controls.clear();
        let focus = active && self.focus_visible;
        match self.session.phase() {
            Phase::Menu => self.render_menu(f, area, focus),
            Phase::Playing(_) => self.render_round(f, area, focus, now),
            Phase::Won(_) | Phase::Lost(_) => self.render_finished(f, area, focus),
        }
        self.controls.end_frame();
    }

    fn on_focus_requested(&mut self) {
        self.focus_visible = true;
    }

    fn on_activation_changed(&mut self, active: bool) {
        self.focus_visible = active;
    }

    fn click(&mut self, x: u16, y: u16, now: Instant) -> ContentAction {
        match self.controls.pick(x, y) {
            Some(control) => self.activate(control, now),
            None => ContentAction::None,
        }
    }

    fn hover(&mut self, x: u16, y: u16) {
        if let Some(Control::Card(i)) = self.controls.pick(x, y) {
            self.cursor = i;
        }
    }

    fn key(&mut self, key: KeyEvent, now: Instant) -> ContentAction {
        self.focus_visible = true;
        if self.session.is_playing() {
            return match key.code {
                KeyCode::Esc => self.handle(SessionEvent::BackToMenu, now),
                KeyCode::Left | KeyCode::Right | KeyCode::Up | KeyCode::Down => {
                    self.move_cursor(key.code);
                    ContentAction::None
                }
                _ if is_activate(&key) => {
                    let i = self.cursor;
                    self.activate(Control::Card(i), now)
                }
                _ => ContentAction::None,
            };
        }
        if key.code == KeyCode::Esc && self.session.is_finished() {
            return self.handle(SessionEvent::BackToMenu, now);
        }
        if let Some(forward) = focus_step(&key) {
            self.controls.step(forward);
            return ContentAction::None;
        }
        if is_activate(&key) {
            if let Some(control) = self.controls.focused() {
                return self.activate(control, now);
            }
        }
        ContentAction::None
    }

    fn tick(&mut self, now: Instant) -> ContentAction {
        if !self.session.is_playing() {
            return ContentAction::None;
        }
        self.handle(SessionEvent::Tick, now)
    }

    fn is_interactive_at(&self, x: u16, y: u16) -> bool {
        self.controls.contains(x, y)
    }

    fn on_close(&mut self) {
        self.session.shutdown(Instant::now());
    }
}
