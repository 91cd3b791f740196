use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::Rect,
    text::{Line, Span},
    widgets::{Gauge, Paragraph, Wrap},
    Frame,
};
use std::mem::{discriminant, Discriminant};
use std::time::Instant;

use super::{focus_step, is_activate, Controls};
use crate::config::Settings;
use crate::core::quiz::{Quiz, QuizCommand, QuizReply, QuizScreen, RequestId, Source};
use crate::core::window::{ContentAction, SessionContent, WindowSpec};
use crate::core::wm::{AppDescriptor, AppServices};
use crate::provider::{HttpProvider, LocalProvider, ProviderError, ProviderWorker, QuestionProvider};
use crate::storage::HighScore;
use crate::ui::{
    bad_style, button_row, centered_line, dim_style, good_style, input_box, normal_style,
    pad_horizontal, row, sel_style, text_line, text_width, title_style,
};

const SPEC: WindowSpec = WindowSpec {
    w: 52,
    h: 22,
    min_w: 44,
    min_h: 18,
};

pub type ProviderFactory = Box<dyn Fn(Source) -> Result<Box<dyn QuestionProvider>>>;

pub fn descriptor() -> AppDescriptor {
    AppDescriptor {
        id: "quiz",
        name: "Knowledge Challenge",
        icon: "[QZ]",
        factory: Box::new(|services: &AppServices| -> Result<Box<dyn SessionContent>> {
            Ok(Box::new(QuizApp::new(services)))
        }),
    }
}

/// Providers as configured: a questions file (or the bundled set) for local
/// play, the quiz server otherwise.
fn configured_providers(settings: &Settings) -> ProviderFactory {
    let questions_file = settings.questions_file.clone();
    let server_url = settings.quiz_server_url.clone();
    Box::new(move |source| -> Result<Box<dyn QuestionProvider>> {
        Ok(match source {
            Source::Local => match &questions_file {
                Some(path) => Box::new(LocalProvider::from_file(path)?),
                None => Box::new(LocalProvider::bundled()?),
            },
            Source::Server => Box::new(HttpProvider::new(server_url.clone())?),
        })
    })
}

/// "quiz-server-normal" → "SERVER / NORMAL".
fn list_title(list: &str) -> String {
    list.strip_prefix("quiz-")
        .unwrap_or(list)
        .split('-')
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join(" / ")
}

fn seconds(ms: u64) -> String {
    format!("{:.2}s", ms as f64 / 1000.0)
}

/// Reply standing in for a provider that could not be reached.
fn unavailable(cmd: &QuizCommand, why: String) -> (RequestId, QuizReply) {
    let err = ProviderError::Transport(why);
    match cmd {
        QuizCommand::Begin { req, .. } | QuizCommand::Fetch { req, .. } => {
            (*req, QuizReply::Question(Err(err)))
        }
        QuizCommand::Submit { req, .. } => (*req, QuizReply::Answer(Err(err))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Nickname,
    Source,
    Level,
    Start,
    HighScores,
    Answer,
    Alt(usize),
    Submit,
    TryAgain,
    PlayAgain,
    Back,
}

pub struct QuizApp {
    quiz: Quiz,
    providers: ProviderFactory,
    worker: Option<ProviderWorker>,
    controls: Controls<Control>,
    focus_visible: bool,
    shown: Discriminant<QuizScreen>,
}

impl QuizApp {
    pub fn new(services: &AppServices) -> Self {
        Self::with_providers(
            Quiz::new(services.storage.clone(), services.audio.clone()),
            configured_providers(&services.settings),
        )
    }

    fn with_providers(quiz: Quiz, providers: ProviderFactory) -> Self {
        let shown = discriminant(quiz.screen());
        Self {
            quiz,
            providers,
            worker: None,
            controls: Controls::new(),
            focus_visible: true,
            shown,
        }
    }

    /// Forward a command to the worker, answering it locally when no
    /// provider can take it.
    fn dispatch(&mut self, cmd: Option<QuizCommand>, now: Instant) {
        let Some(cmd) = cmd else {
            return;
        };
        if let QuizCommand::Begin { source, .. } = &cmd {
            self.worker = match (self.providers)(*source) {
                Ok(provider) => Some(ProviderWorker::spawn(provider)),
                Err(err) => {
                    tracing::warn!("question provider unavailable: {err:#}");
                    None
                }
            };
        }
        let sent = self.worker.as_ref().is_some_and(|w| w.send(cmd.clone()));
        if !sent {
            let (req, reply) = unavailable(&cmd, "no question provider".to_string());
            let next = self.quiz.on_reply(req, reply, now);
            self.dispatch(next, now);
        }
    }

    fn drain_replies(&mut self, now: Instant) {
        while let Some((req, reply)) = self.worker.as_ref().and_then(|w| w.try_recv()) {
            let next = self.quiz.on_reply(req, reply, now);
            self.dispatch(next, now);
        }
    }

    fn sync_screen(&mut self) {
        let shown = discriminant(self.quiz.screen());
        if shown != self.shown {
            self.shown = shown;
            self.controls.reset();
        }
    }

    fn submit(&mut self, now: Instant) {
        let cmd = self.quiz.submit(now);
        self.dispatch(cmd, now);
    }

    fn activate(&mut self, control: Control, now: Instant) {
        match control {
            Control::Nickname | Control::Start => {
                let cmd = self.quiz.start();
                self.dispatch(cmd, now);
            }
            Control::Source => self.quiz.toggle_source(),
            Control::Level => self.quiz.toggle_level(),
            Control::HighScores => self.quiz.show_high_scores(),
            Control::Answer | Control::Submit => self.submit(now),
            Control::Alt(i) => {
                let already = matches!(self.quiz.screen(), QuizScreen::Asking(a) if a.selected == Some(i));
                self.quiz.select_alternative(i);
                if already {
                    self.submit(now);
                }
            }
            Control::TryAgain | Control::PlayAgain | Control::Back => self.quiz.back_to_start(),
        }
        self.sync_screen();
    }

    // ── Rendering ─────────────────────────────────────────────────────────────

    fn render_start(&mut self, f: &mut Frame, area: Rect, focus: bool, message: Option<&str>) {
        centered_line(f, area, 0, "Knowledge Challenge", title_style());
        text_line(f, area, 2, "Nickname:", normal_style());
        let typing = self.controls.row_focus(focus, 1).is_some();
        let rect = input_box(f, area, 3, self.quiz.nickname(), "Max 15 characters", typing);
        self.controls.push(rect, Control::Nickname);

        let toggles = [
            (Control::Source, format!("Source: {}", self.quiz.source().label())),
            (
                Control::Level,
                format!(
                    "Level: {} ({}s)",
                    self.quiz.level().label(),
                    self.quiz.level().time_per_question().as_secs()
                ),
            ),
        ];
        for (i, (control, label)) in toggles.into_iter().enumerate() {
            let focused = self.controls.row_focus(focus, 1);
            let rect = button_row(f, area, 5 + 2 * i as u16, &[label], focused)[0];
            self.controls.push(rect, control);
        }
        let focused = self.controls.row_focus(focus, 2);
        let rects = button_row(
            f,
            area,
            10,
            &["Start Journey".to_string(), "High Scores".to_string()],
            focused,
        );
        self.controls.push(rects[0], Control::Start);
        self.controls.push(rects[1], Control::HighScores);
        if let Some(message) = message {
            centered_line(f, area, 12, message, bad_style());
        }
    }

    fn render_question(&mut self, f: &mut Frame, area: Rect, focus: bool, now: Instant) {
        let QuizScreen::Asking(asked) = self.quiz.screen() else {
            return;
        };
        let asked = asked.clone();
        if let Some(r) = row(area, 0) {
            let remaining = asked.countdown.remaining(now);
            f.render_widget(
                Gauge::default()
                    .gauge_style(title_style())
                    .ratio(asked.countdown.fraction_remaining(now).clamp(0.0, 1.0))
                    .label(format!("{:.1}s", remaining.as_secs_f64())),
                r,
            );
        }
        if let Some(r) = row(area, 2) {
            let r = Rect { height: 3.min(area.height.saturating_sub(2)), ..r };
            f.render_widget(
                Paragraph::new(Line::from(Span::styled(asked.question.text.as_str(), title_style())))
                    .wrap(Wrap { trim: true }),
                r,
            );
        }
        let mut y = 6;
        if asked.question.alternatives.is_empty() {
            let typing = self.controls.row_focus(focus, 1).is_some();
            let rect = input_box(f, area, y, &asked.answer, "Type your answer", typing);
            self.controls.push(rect, Control::Answer);
            y += 2;
        } else {
            for (i, (_, label)) in asked.question.alternatives.iter().enumerate() {
                let mark = if asked.selected == Some(i) { "(•)" } else { "( )" };
                let text = format!("{} {mark} {label}", i + 1);
                let style = if self.controls.row_focus(focus, 1).is_some() {
                    sel_style()
                } else {
                    normal_style()
                };
                if let Some(r) = row(area, y) {
                    let w = text_width(&text).min(r.width);
                    let rect = Rect { width: w, ..r };
                    text_line(f, rect, 0, &text, style);
                    self.controls.push(rect, Control::Alt(i));
                }
                y += 1;
            }
            y += 1;
        }
        let focused = self.controls.row_focus(focus, 1);
        let rect = button_row(f, area, y, &["Submit".to_string()], focused)[0];
        self.controls.push(rect, Control::Submit);
        text_line(
            f,
            area,
            area.height.saturating_sub(1),
            &format!("Total: {}", seconds(self.quiz.total().as_millis() as u64)),
            dim_style(),
        );
    }

    fn render_scores(&self, f: &mut Frame, area: Rect, top: u16, scores: &[HighScore]) -> u16 {
        if scores.is_empty() {
            centered_line(f, area, top, "No scores yet!", dim_style());
            return top + 1;
        }
        for (i, s) in scores.iter().enumerate() {
            centered_line(
                f,
                area,
                top + i as u16,
                &format!("{}. {:<15} {}", i + 1, s.nickname, seconds(s.time)),
                normal_style(),
            );
        }
        top + scores.len() as u16
    }

    fn render_screen(&mut self, f: &mut Frame, area: Rect, focus: bool, now: Instant) {
        let buttons: Vec<(Control, &str)> = match self.quiz.screen().clone() {
            QuizScreen::Start { message } => {
                self.render_start(f, area, focus, message.as_deref());
                return;
            }
            QuizScreen::Loading => {
                centered_line(f, area, area.height / 2, "Loading...", dim_style());
                return;
            }
            QuizScreen::Asking(_) => {
                self.render_question(f, area, focus, now);
                return;
            }
            QuizScreen::GameOver { message } => {
                centered_line(f, area, 1, "Game Over", bad_style());
                centered_line(f, area, 3, &message, normal_style());
                vec![(Control::TryAgain, "Try Again"), (Control::HighScores, "High Scores")]
            }
            QuizScreen::Victory { total, scores } => {
                centered_line(f, area, 0, "Victory!", good_style());
                centered_line(f, area, 1, &format!("Well done, {}!", self.quiz.nickname()), normal_style());
                centered_line(
                    f,
                    area,
                    2,
                    &format!("Total Time: {}", seconds(total.as_millis() as u64)),
                    normal_style(),
                );
                centered_line(f, area, 4, "Hall of Fame", title_style());
                self.render_scores(f, area, 5, &scores);
                vec![(Control::PlayAgain, "Play Again")]
            }
            QuizScreen::HighScores { list, scores } => {
                centered_line(f, area, 0, "High Scores", title_style());
                centered_line(f, area, 1, &list_title(&list), dim_style());
                self.render_scores(f, area, 3, &scores);
                vec![(Control::Back, "Back")]
            }
        };
        let labels: Vec<String> = buttons.iter().map(|(_, l)| l.to_string()).collect();
        let focused = self.controls.row_focus(focus, labels.len());
        let rects = button_row(f, area, area.height.saturating_sub(2), &labels, focused);
        for ((control, _), rect) in buttons.into_iter().zip(rects) {
            self.controls.push(rect, control);
        }
    }

    /// Typing into whichever text field the screen has. Returns whether the
    /// key was consumed.
    fn key_text(&mut self, key: &KeyEvent) -> bool {
        let KeyCode::Char(c) = key.code else {
            return match key.code {
                KeyCode::Backspace => {
                    match self.quiz.screen() {
                        QuizScreen::Start { .. } => self.quiz.backspace_nickname(),
                        _ => self.quiz.backspace_answer(),
                    }
                    true
                }
                _ => false,
            };
        };
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return false;
        }
        match self.quiz.screen() {
            QuizScreen::Start { .. } => self.quiz.type_nickname(c),
            QuizScreen::Asking(asked) if asked.question.alternatives.is_empty() => {
                self.quiz.type_answer(c)
            }
            QuizScreen::Asking(asked) => {
                let count = asked.question.alternatives.len();
                match c.to_digit(10).map(|d| d as usize) {
                    Some(d) if (1..=count).contains(&d) => self.quiz.select_alternative(d - 1),
                    _ if c == ' ' => return false,
                    _ => {}
                }
            }
            _ => return false,
        }
        true
    }
}

impl SessionContent for QuizApp {
    fn spec(&self) -> WindowSpec {
        SPEC
    }

    fn render(&mut self, f: &mut Frame, area: Rect, active: bool, now: Instant) {
        let area = pad_horizontal(area);
        self.sync_screen();
        self.controls.clear();
        let focus = active && self.focus_visible;
        self.render_screen(f, area, focus, now);
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
            // Clicking a text box only moves focus there.
            Some(Control::Nickname | Control::Answer) | None => {}
            Some(control) => self.activate(control, now),
        }
        ContentAction::None
    }

    fn hover(&mut self, x: u16, y: u16) {
        self.controls.pick(x, y);
    }

    fn key(&mut self, key: KeyEvent, now: Instant) -> ContentAction {
        self.focus_visible = true;
        if key.code == KeyCode::Enter {
            let text_answer = matches!(
                self.quiz.screen(),
                QuizScreen::Asking(asked) if asked.question.alternatives.is_empty()
            );
            let on_start = matches!(self.quiz.screen(), QuizScreen::Start { .. });
            match self.controls.focused() {
                _ if text_answer => self.activate(Control::Submit, now),
                Some(control) => self.activate(control, now),
                None if on_start => self.activate(Control::Start, now),
                None => {}
            }
            return ContentAction::None;
        }
        if self.key_text(&key) {
            return ContentAction::None;
        }
        if key.code == KeyCode::Esc {
            self.quiz.back_to_start();
            self.sync_screen();
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
        self.drain_replies(now);
        self.quiz.tick(now);
        ContentAction::None
    }

    fn is_interactive_at(&self, x: u16, y: u16) -> bool {
        self.controls.contains(x, y)
    }

    /// Pending replies die with the worker.
    fn on_close(&mut self) {
        self.quiz.shutdown(Instant::now());
        self.worker = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::Silent;
    use crate::storage::Storage;
    use anyhow::anyhow;
    use std::rc::Rc;
    use std::time::Duration;

    fn local_app() -> QuizApp {
        QuizApp::with_providers(
            Quiz::new(Storage::in_memory(), Rc::new(Silent)),
            Box::new(|_| -> Result<Box<dyn QuestionProvider>> {
                Ok(Box::new(LocalProvider::bundled()?.with_latency(Duration::ZERO)))
            }),
        )
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(app: &mut QuizApp, text: &str, now: Instant) {
        for c in text.chars() {
            app.key(press(KeyCode::Char(c)), now);
        }
    }

    fn wait_for_question(app: &mut QuizApp) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            app.tick(Instant::now());
            if matches!(app.quiz.screen(), QuizScreen::Asking(_)) {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("no question arrived: {:?}", app.quiz.screen());
    }

    #[test]
    fn list_titles_are_readable() {
        assert_eq!(list_title("quiz-server-normal"), "SERVER / NORMAL");
        assert_eq!(list_title("quiz-local-hard"), "LOCAL / HARD");
    }

    #[test]
    fn local_quiz_runs_through_worker() {
        let mut app = local_app();
        let now = Instant::now();
        app.quiz.toggle_source();
        type_text(&mut app, "Zaynab", now);
        app.key(press(KeyCode::Enter), now);
        assert!(matches!(app.quiz.screen(), QuizScreen::Loading));
        wait_for_question(&mut app);

        // Empty answers stay put.
        app.key(press(KeyCode::Enter), Instant::now());
        assert!(matches!(app.quiz.screen(), QuizScreen::Asking(_)));

        type_text(&mut app, "cordoba", Instant::now());
        app.key(press(KeyCode::Enter), Instant::now());
        wait_for_question(&mut app);
        match app.quiz.screen() {
            QuizScreen::Asking(asked) => assert!(!asked.question.alternatives.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn provider_failure_returns_to_start() {
        let mut app = QuizApp::with_providers(
            Quiz::new(Storage::in_memory(), Rc::new(Silent)),
            Box::new(|_| -> Result<Box<dyn QuestionProvider>> { Err(anyhow!("offline")) }),
        );
        let now = Instant::now();
        type_text(&mut app, "Ali", now);
        app.activate(Control::Start, now);
        assert!(
            matches!(app.quiz.screen(), QuizScreen::Start { message: Some(m) } if m == "Network Error")
        );
    }

    #[test]
    fn closing_drops_worker() {
        let mut app = local_app();
        let now = Instant::now();
        type_text(&mut app, "Ali", now);
        app.activate(Control::Start, now);
        assert!(app.worker.is_some());
        app.on_close();
        assert!(app.worker.is_none());
        app.tick(Instant::now());
        assert!(matches!(app.quiz.screen(), QuizScreen::Loading));
    }
}
