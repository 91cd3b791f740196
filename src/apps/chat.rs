use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Alignment, Rect},
    text::{Line as TextLine, Span},
    widgets::Paragraph,
    Frame,
};
use std::time::Instant;

use super::{focus_step, Controls};
use crate::chat_api::{ChatTransport, WebSocketChannel};
use crate::core::chat::{Chat, ChatScreen, Line, CHANNELS, MAX_CHANNEL};
use crate::core::window::{ContentAction, SessionContent, WindowSpec};
use crate::core::wm::{AppDescriptor, AppServices};
use crate::ui::{
    bad_style, button_row, centered_line, dim_style, good_style, input_box, normal_style,
    pad_horizontal, row, text_line, title_style, truncate,
};

const SPEC: WindowSpec = WindowSpec {
    w: 48,
    h: 24,
    min_w: 38,
    min_h: 16,
};

pub fn descriptor() -> AppDescriptor {
    AppDescriptor {
        id: "chat",
        name: "Chat Channel",
        icon: "[CH]",
        factory: Box::new(|services: &AppServices| -> Result<Box<dyn SessionContent>> {
            let transport = WebSocketChannel::new(
                services.settings.chat_server_url.clone(),
                services.settings.chat_api_key.clone(),
            );
            Ok(Box::new(ChatApp::new(services, Box::new(transport))))
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Username,
    EnterChat,
    Channels,
    Logout,
    Draft,
    Send,
    Channel(usize),
    Custom,
    Join,
    Cancel,
}

/// Short label for the built-in rooms ("PWD-Help" → "Help").
fn room_label(channel: &str) -> &str {
    channel.strip_prefix("PWD-").unwrap_or(channel)
}

pub struct ChatApp {
    chat: Chat,
    controls: Controls<Control>,
    focus_visible: bool,
    shown: ChatScreen,
}

impl ChatApp {
    pub fn new(services: &AppServices, transport: Box<dyn ChatTransport>) -> Self {
        let chat = Chat::new(services.storage.clone(), services.audio.clone(), transport);
        let shown = chat.screen();
        Self {
            chat,
            controls: Controls::new(),
            focus_visible: true,
            shown,
        }
    }

    fn sync_screen(&mut self) {
        if self.chat.screen() != self.shown {
            self.shown = self.chat.screen();
            self.controls.reset();
        }
    }

    fn activate(&mut self, control: Control) {
        match control {
            Control::Username | Control::EnterChat => self.chat.submit_login(),
            Control::Channels => self.chat.open_channel_picker(),
            Control::Logout => self.chat.logout(),
            Control::Draft | Control::Send => self.chat.send_draft(),
            Control::Channel(i) => {
                if let Some(name) = CHANNELS.get(i) {
                    self.chat.switch_channel(name);
                }
            }
            Control::Custom | Control::Join => self.chat.join_custom_channel(),
            Control::Cancel => self.chat.cancel_channel_picker(),
        }
        self.sync_screen();
    }

    // ── Rendering ─────────────────────────────────────────────────────────────

    fn render_login(&mut self, f: &mut Frame, area: Rect, focus: bool) {
        centered_line(f, area, 2, "Chat Channel", title_style());
        centered_line(f, area, 4, "Enter your Username", normal_style());
        let typing = self.controls.row_focus(focus, 1).is_some();
        let field = centered_row(area, 6, 24);
        let rect = input_box(f, field, 0, self.chat.login_input(), "e.g. Conqueror", typing);
        self.controls.push(rect, Control::Username);
        let focused = self.controls.row_focus(focus, 1);
        let rect = button_row(f, area, 8, &["Enter Chat".to_string()], focused)[0];
        self.controls.push(rect, Control::EnterChat);
    }

    fn render_header(&mut self, f: &mut Frame, area: Rect, focus: bool) {
        let user = self.chat.username().unwrap_or_default();
        text_line(f, area, 0, user, title_style());
        if let Some(r) = row(area, 1) {
            let (status, style) = if self.chat.is_online() {
                ("● Online", good_style())
            } else {
                ("● Offline", bad_style())
            };
            f.render_widget(
                Paragraph::new(TextLine::from(vec![
                    Span::styled(format!("{}  ", self.chat.channel()), normal_style()),
                    Span::styled(status, style),
                ])),
                r,
            );
        }
        let focused = self.controls.row_focus(focus, 2);
        let rects = button_row(
            f,
            Rect {
                x: area.x + area.width / 2,
                width: area.width - area.width / 2,
                ..area
            },
            0,
            &["Channels".to_string(), "Logout".to_string()],
            focused,
        );
        self.controls.push(rects[0], Control::Channels);
        self.controls.push(rects[1], Control::Logout);
    }

    fn render_messages(&self, f: &mut Frame, area: Rect) {
        let width = area.width as usize;
        let rendered: Vec<TextLine> = self
            .chat
            .lines()
            .iter()
            .map(|line| match line {
                Line::System(text) => TextLine::from(Span::styled(truncate(text, width), dim_style()))
                    .alignment(Alignment::Center),
                Line::Chat { sender, text, mine: true } => TextLine::from(Span::styled(
                    truncate(&format!("{text} :{sender}"), width),
                    title_style(),
                ))
                .alignment(Alignment::Right),
                Line::Chat { sender, text, .. } => TextLine::from(vec![
                    Span::styled(format!("{sender}: "), title_style()),
                    Span::styled(truncate(text, width.saturating_sub(sender.len() + 2)), normal_style()),
                ]),
            })
            .collect();
        let skip = rendered.len().saturating_sub(area.height as usize);
        f.render_widget(
            Paragraph::new(rendered.into_iter().skip(skip).collect::<Vec<_>>()),
            area,
        );
    }

    fn render_room(&mut self, f: &mut Frame, area: Rect, focus: bool) {
        self.render_header(f, area, focus);
        let log = Rect {
            y: area.y + 3,
            height: area.height.saturating_sub(5),
            ..area
        };
        self.render_messages(f, log);

        let bottom = area.height.saturating_sub(1);
        let typing = self.controls.row_focus(focus, 1).is_some();
        let field = Rect {
            width: area.width.saturating_sub(10),
            ..area
        };
        let rect = input_box(f, field, bottom, self.chat.draft(), "Type a message...", typing);
        self.controls.push(rect, Control::Draft);
        let focused = self.controls.row_focus(focus, 1);
        let send_area = Rect {
            x: area.x + field.width,
            width: area.width - field.width,
            ..area
        };
        let rect = button_row(f, send_area, bottom, &["Send".to_string()], focused)[0];
        self.controls.push(rect, Control::Send);
    }

    fn render_picker(&mut self, f: &mut Frame, area: Rect, focus: bool) {
        centered_line(f, area, 1, "Select Channel", title_style());
        centered_line(f, area, 2, &format!("Current: {}", self.chat.channel()), dim_style());
        let labels: Vec<String> = CHANNELS.iter().map(|c| room_label(c).to_string()).collect();
        for (pair, y) in [(0..2, 4), (2..4, 6)] {
            let focused = self.controls.row_focus(focus, 2);
            let rects = button_row(f, area, y, &labels[pair.clone()], focused);
            for (i, rect) in pair.zip(rects) {
                self.controls.push(rect, Control::Channel(i));
            }
        }
        let typing = self.controls.row_focus(focus, 1).is_some();
        let field = centered_row(area, 8, MAX_CHANNEL as u16 + 4);
        let rect = input_box(f, field, 0, self.chat.custom_channel(), "Custom channel", typing);
        self.controls.push(rect, Control::Custom);
        let focused = self.controls.row_focus(focus, 2);
        let rects = button_row(f, area, 10, &["Join".to_string(), "Cancel".to_string()], focused);
        self.controls.push(rects[0], Control::Join);
        self.controls.push(rects[1], Control::Cancel);
    }

    fn typing_target(&self) -> bool {
        match self.chat.screen() {
            ChatScreen::Login | ChatScreen::Room => true,
            ChatScreen::ChannelPicker => self.controls.focused() == Some(Control::Custom),
        }
    }
}

fn centered_row(area: Rect, offset: u16, width: u16) -> Rect {
    let w = width.min(area.width);
    Rect {
        x: area.x + (area.width - w) / 2,
        y: area.y + offset.min(area.height.saturating_sub(1)),
        width: w,
        height: 1,
    }
}

impl SessionContent for ChatApp {
    fn spec(&self) -> WindowSpec {
        SPEC
    }

    fn render(&mut self, f: &mut Frame, area: Rect, active: bool, _now: Instant) {
        let area = pad_horizontal(area);
        self.sync_screen();
        self.controls.clear();
        let focus = active && self.focus_visible;
        match self.chat.screen() {
            ChatScreen::Login => self.render_login(f, area, focus),
            ChatScreen::Room => self.render_room(f, area, focus),
            ChatScreen::ChannelPicker => self.render_picker(f, area, focus),
        }
        self.controls.end_frame();
    }

    fn badge(&self) -> Option<String> {
        self.chat.has_unread().then(|| "●".to_string())
    }

    fn on_focus_requested(&mut self) {
        self.focus_visible = true;
        self.chat.mark_read();
    }

    fn on_activation_changed(&mut self, active: bool) {
        self.focus_visible = active;
        self.chat.set_active(active);
    }

    fn click(&mut self, x: u16, y: u16, _now: Instant) -> ContentAction {
        match self.controls.pick(x, y) {
            Some(Control::Draft) => self.chat.mark_read(),
            Some(Control::Username | Control::Custom) | None => {}
            Some(control) => self.activate(control),
        }
        ContentAction::None
    }

    fn hover(&mut self, x: u16, y: u16) {
        self.controls.pick(x, y);
    }

    fn key(&mut self, key: KeyEvent, _now: Instant) -> ContentAction {
        self.focus_visible = true;
        match key.code {
            KeyCode::Enter => {
                let control = match (self.chat.screen(), self.controls.focused()) {
                    (ChatScreen::Login, _) => Control::EnterChat,
                    (ChatScreen::Room, Some(c @ (Control::Channels | Control::Logout))) => c,
                    (ChatScreen::Room, _) => Control::Send,
                    (ChatScreen::ChannelPicker, Some(control)) => control,
                    (ChatScreen::ChannelPicker, None) => Control::Join,
                };
                self.activate(control);
            }
            KeyCode::Esc if self.chat.screen() == ChatScreen::ChannelPicker => {
                self.activate(Control::Cancel)
            }
            KeyCode::Backspace if self.typing_target() => self.chat.backspace(),
            KeyCode::Char(c)
                if self.typing_target() && !key.modifiers.contains(KeyModifiers::CONTROL) =>
            {
                self.chat.type_char(c)
            }
            _ => {
                if let Some(forward) = focus_step(&key) {
                    self.controls.step(forward);
                }
            }
        }
        ContentAction::None
    }

    fn tick(&mut self, _now: Instant) -> ContentAction {
        self.chat.tick();
        self.sync_screen();
        ContentAction::None
    }

    fn is_interactive_at(&self, x: u16, y: u16) -> bool {
        self.controls.contains(x, y)
    }

    fn on_close(&mut self) {
        self.chat.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_api::ChannelEvent;
    use crate::config::Settings;
    use crate::core::chat::tests::Scripted;
    use crate::sound::RecordingAudio;
    use crate::storage::Storage;
    use ratatui::{backend::TestBackend, Terminal};
    use std::rc::Rc;

    fn services(storage: Storage) -> AppServices {
        AppServices {
            storage,
            audio: Rc::new(RecordingAudio::default()),
            settings: Settings::default(),
        }
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn draw(app: &mut ChatApp, active: bool) {
        let mut term = Terminal::new(TestBackend::new(50, 24)).unwrap();
        term.draw(|f| app.render(f, Rect::new(0, 0, 46, 22), active, Instant::now()))
            .unwrap();
    }

    #[test]
    fn login_by_keyboard() {
        let storage = Storage::in_memory();
        let wire = Scripted::default();
        let mut app = ChatApp::new(&services(storage.clone()), Box::new(wire.clone()));
        let now = Instant::now();
        for c in "Walladah".chars() {
            app.key(press(KeyCode::Char(c)), now);
        }
        app.key(press(KeyCode::Enter), now);
        assert_eq!(storage.nickname().as_deref(), Some("Walladah"));
        assert_eq!(app.chat.screen(), ChatScreen::Room);
        draw(&mut app, true);
        assert!(app.controls.hits.iter().any(|(_, c)| *c == Control::Logout));
    }

    #[test]
    fn unread_badge_until_focus_returns() {
        let storage = Storage::in_memory();
        storage.set_nickname("Walladah");
        let wire = Scripted::default();
        let mut app = ChatApp::new(&services(storage), Box::new(wire.clone()));
        app.on_activation_changed(false);
        wire.0.borrow_mut().inbox.push_back(ChannelEvent::Message {
            username: "Ibn Zaydun".into(),
            text: "a poem".into(),
        });
        app.tick(Instant::now());
        assert_eq!(app.badge().as_deref(), Some("●"));
        draw(&mut app, false);
        app.on_activation_changed(true);
        assert_eq!(app.badge(), None);
    }

    #[test]
    fn picker_buttons_switch_rooms() {
        let storage = Storage::in_memory();
        storage.set_nickname("Walladah");
        let wire = Scripted::default();
        let mut app = ChatApp::new(&services(storage), Box::new(wire.clone()));
        draw(&mut app, true);
        app.activate(Control::Channels);
        draw(&mut app, true);
        let (rect, _) = app
            .controls
            .hits
            .iter()
            .copied()
            .find(|(_, c)| *c == Control::Channel(3))
            .unwrap();
        app.click(rect.x, rect.y, Instant::now());
        assert_eq!(app.chat.channel(), "PWD-Random");
        assert_eq!(wire.0.borrow().connected.as_deref(), Some("PWD-Random"));
    }

    #[test]
    fn room_labels_drop_prefix() {
        assert_eq!(room_label("PWD-Social"), "Social");
        assert_eq!(room_label("Cordoba"), "Cordoba");
    }
}
