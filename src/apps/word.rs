use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Alignment, Rect},
    text::{Line, Span},
    widgets::{Gauge, Paragraph, Wrap},
    Frame,
};
use std::time::Instant;

use super::{focus_step, is_activate, Controls, Standing};
use crate::core::focus::Cycle;
use crate::core::session::{Phase, Session, SessionEvent};
use crate::core::window::{ContentAction, SessionContent, WindowSpec};
use crate::core::word::{LetterState, WordInput, WordRound, WordSettings, KEYBOARD_ROWS};
use crate::core::wm::{AppDescriptor, AppServices};
use crate::storage::WORD_STREAK;
use crate::ui::{
    bad_style, button_row, centered_line, dim_style, good_style, normal_style, pad_horizontal,
    row, sel_style, title_style,
};

const SPEC: WindowSpec = WindowSpec {
    w: 46,
    h: 20,
    min_w: 42,
    min_h: 18,
};

pub fn descriptor() -> AppDescriptor {
    AppDescriptor {
        id: "word",
        name: "The Caliph's Scroll",
        icon: "[WG]",
        factory: Box::new(|services: &AppServices| -> Result<Box<dyn SessionContent>> {
            Ok(Box::new(WordApp::new(services)))
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Category,
    Level,
    Start,
    Key(char),
    Menu,
    PlayAgain,
}

/// Letter at a position on the on-screen keyboard.
fn key_at(row: usize, col: usize) -> Option<char> {
    KEYBOARD_ROWS.get(row)?.chars().nth(col)
}

fn key_position(letter: char) -> Option<(usize, usize)> {
    KEYBOARD_ROWS
        .iter()
        .enumerate()
        .find_map(|(r, keys)| keys.chars().position(|c| c == letter).map(|c| (r, c)))
}

pub struct WordApp {
    session: Session<WordRound>,
    settings: WordSettings,
    /// Sticky keyboard focus, remembered by letter.
    key_focus: char,
    controls: Controls<Control>,
    focus_visible: bool,
    standing: Standing,
}

impl WordApp {
    pub fn new(services: &AppServices) -> Self {
        Self::with_session(Session::new(
            services.storage.clone(),
            services.audio.clone(),
            WORD_STREAK,
        ))
    }

    fn with_session(session: Session<WordRound>) -> Self {
        let standing = Standing::load(session.storage(), WORD_STREAK);
        Self {
            session,
            settings: WordSettings::default(),
            key_focus: 'Q',
            controls: Controls::new(),
            focus_visible: true,
            standing,
        }
    }

    fn handle(&mut self, event: SessionEvent<WordRound>, now: Instant) {
        let before = std::mem::discriminant(self.session.phase());
        self.session.handle(event, now);
        if before != std::mem::discriminant(self.session.phase()) {
            self.controls.reset();
            self.standing = Standing::load(self.session.storage(), WORD_STREAK);
        }
    }

    fn guess(&mut self, letter: char, now: Instant) {
        self.handle(SessionEvent::Input(WordInput::Guess(letter)), now);
    }

    fn activate(&mut self, control: Control, now: Instant) {
        match control {
            Control::Category => self.settings.category = self.settings.category.next(),
            Control::Level => self.settings.level = self.settings.level.next(),
            Control::Start => self.handle(SessionEvent::Start(self.settings), now),
            Control::Key(letter) => {
                self.key_focus = letter;
                self.guess(letter, now);
            }
            Control::Menu => self.handle(SessionEvent::BackToMenu, now),
            Control::PlayAgain => self.handle(SessionEvent::PlayAgain, now),
        }
    }

    fn move_key_focus(&mut self, code: KeyCode) {
        let Some((r, c)) = key_position(self.key_focus) else {
            self.key_focus = 'Q';
            return;
        };
        let width = |r: usize| KEYBOARD_ROWS[r].len();
        let (r, c) = match code {
            KeyCode::Left => (r, (c + width(r) - 1) % width(r)),
            KeyCode::Right => (r, (c + 1) % width(r)),
            KeyCode::Up => {
                let r = (r + KEYBOARD_ROWS.len() - 1) % KEYBOARD_ROWS.len();
                (r, c.min(width(r) - 1))
            }
            KeyCode::Down => {
                let r = (r + 1) % KEYBOARD_ROWS.len();
                (r, c.min(width(r) - 1))
            }
            _ => (r, c),
        };
        if let Some(letter) = key_at(r, c) {
            self.key_focus = letter;
        }
    }

    // ── Rendering ─────────────────────────────────────────────────────────────

    fn render_menu(&mut self, f: &mut Frame, area: Rect, focus: bool) {
        centered_line(f, area, 1, "The Caliph's Scroll", title_style());
        centered_line(f, area, 2, "Guess the word before the scroll burns.", dim_style());
        let rows = [
            (Control::Category, format!("Category: {}", self.settings.category.label())),
            (Control::Level, format!("Level: {}", self.settings.level.label())),
            (Control::Start, "Unroll Scroll".to_string()),
        ];
        for (i, (control, label)) in rows.into_iter().enumerate() {
            let focused = self.controls.row_focus(focus, 1);
            let rect = button_row(f, area, 5 + 2 * i as u16, &[label], focused)[0];
            self.controls.push(rect, control);
        }
        let level = self.settings.level;
        let limit = match level.time_limit() {
            Some(d) => format!("{}s", d.as_secs()),
            None => "no time limit".to_string(),
        };
        centered_line(f, area, 11, &format!("{} lives, {limit}", level.lives()), dim_style());
        let Standing { streak, best } = self.standing;
        centered_line(f, area, 13, &format!("Streak: {streak}   Best: {best}"), dim_style());
    }

    fn render_round(&mut self, f: &mut Frame, area: Rect, focus: bool, now: Instant) {
        let Some(round) = self.session.round() else {
            return;
        };
        let hearts: String = (0..round.max_lives())
            .map(|i| if i < round.lives() { '♥' } else { '♡' })
            .collect();
        centered_line(
            f,
            area,
            0,
            &format!("{}   Lives: {hearts}", round.settings().category.label()),
            normal_style(),
        );
        if let (Some(countdown), Some(r)) = (self.session.countdown(), row(area, 1)) {
            let remaining = countdown.remaining(now);
            f.render_widget(
                Gauge::default()
                    .gauge_style(title_style())
                    .ratio(countdown.fraction_remaining(now).clamp(0.0, 1.0))
                    .label(format!("{}s", remaining.as_secs())),
                r,
            );
        }
        centered_line(f, area, 3, &round.masked(), title_style());

        let mut keys = Vec::new();
        for (r, letters) in KEYBOARD_ROWS.iter().enumerate() {
            let Some(line) = row(area, 5 + 2 * r as u16) else {
                break;
            };
            let width = letters.len() as u16 * 4;
            let mut x = line.x + line.width.saturating_sub(width) / 2 + r as u16;
            for letter in letters.chars() {
                let style = match round.letter_state(letter) {
                    _ if focus && letter == self.key_focus => sel_style(),
                    LetterState::Unused => normal_style(),
                    LetterState::Hit => good_style(),
                    LetterState::Miss => dim_style(),
                };
                let rect = Rect { x, y: line.y, width: 3, height: 1 }.intersection(line);
                f.render_widget(Paragraph::new(Span::styled(format!("[{letter}]"), style)), rect);
                keys.push((rect, letter));
                x += 4;
            }
        }
        for (rect, letter) in keys {
            self.controls.push(rect, Control::Key(letter));
        }
        let rect = button_row(f, area, 12, &["Menu".to_string()], None)[0];
        self.controls.push(rect, Control::Menu);
    }

    fn render_finished(&mut self, f: &mut Frame, area: Rect, focus: bool) {
        let (finished, won) = match self.session.phase() {
            Phase::Won(done) => (done.clone(), true),
            Phase::Lost(done) => (done.clone(), false),
            _ => return,
        };
        if won {
            centered_line(f, area, 1, "Victory! The Scroll is Safe.", good_style());
            centered_line(f, area, 3, finished.summary.word, title_style());
            if let Some(r) = row(area, 5) {
                let r = Rect { height: 3.min(area.height.saturating_sub(5)), ..r };
                f.render_widget(
                    Paragraph::new(Line::from(Span::styled(finished.summary.definition, normal_style())))
                        .alignment(Alignment::Center)
                        .wrap(Wrap { trim: true }),
                    r,
                );
            }
        } else {
            centered_line(f, area, 1, "Defeat", bad_style());
            centered_line(f, area, 2, "The Scroll is Lost.", bad_style());
            centered_line(
                f,
                area,
                4,
                &format!("The word was: {}", finished.summary.word),
                title_style(),
            );
        }
        centered_line(
            f,
            area,
            9,
            &format!("Streak: {}   Best: {}", finished.streak, finished.best_streak),
            dim_style(),
        );
        let focused = self.controls.row_focus(focus, 2);
        let rects = button_row(
            f,
            area,
            11,
            &["Play Again".to_string(), "Menu".to_string()],
            focused,
        );
        self.controls.push(rects[0], Control::PlayAgain);
        self.controls.push(rects[1], Control::Menu);
    }
}

impl SessionContent for WordApp {
    fn spec(&self) -> WindowSpec {
        SPEC
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
        if let Some(control) = self.controls.pick(x, y) {
            self.activate(control, now);
        }
        ContentAction::None
    }

    fn hover(&mut self, x: u16, y: u16) {
        if let Some(Control::Key(letter)) = self.controls.pick(x, y) {
            self.key_focus = letter;
        }
    }

    fn key(&mut self, key: KeyEvent, now: Instant) -> ContentAction {
        self.focus_visible = true;
        if self.session.is_playing() {
            match key.code {
                KeyCode::Esc => self.handle(SessionEvent::BackToMenu, now),
                KeyCode::Char(c)
                    if c.is_ascii_alphabetic() && !key.modifiers.contains(KeyModifiers::CONTROL) =>
                {
                    self.key_focus = c.to_ascii_uppercase();
                    self.guess(c, now);
                }
                KeyCode::Left | KeyCode::Right | KeyCode::Up | KeyCode::Down => {
                    self.move_key_focus(key.code)
                }
                _ if is_activate(&key) => {
                    let letter = self.key_focus;
                    self.guess(letter, now);
                }
                _ => {}
            }
            return ContentAction::None;
        }
        if key.code == KeyCode::Esc && self.session.is_finished() {
            self.handle(SessionEvent::BackToMenu, now);
        } else if let Some(forward) = focus_step(&key) {
            self.controls.step(forward);
        } else if is_activate(&key) {
            if let Some(control) = self.controls.focused() {
                self.activate(control, now);
            }
        }
        ContentAction::None
    }

    fn tick(&mut self, now: Instant) -> ContentAction {
        if self.session.is_playing() {
            self.handle(SessionEvent::Tick, now);
        }
        ContentAction::None
    }

    fn is_interactive_at(&self, x: u16, y: u16) -> bool {
        self.controls.contains(x, y)
    }

    fn on_close(&mut self) {
        self.session.shutdown(Instant::now());
    }
}
