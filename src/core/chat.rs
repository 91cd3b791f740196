use std::rc::Rc;

use crate::chat_api::{ChannelEvent, ChatTransport};
use crate::sound::{AudioPort, Cue};
use crate::storage::{ChatMessage, Storage};

pub const MAX_USERNAME: usize = 12;
pub const MAX_CHANNEL: usize = 15;
pub const MAX_DRAFT: usize = 500;
const MAX_LINES: usize = 200;

pub const DEFAULT_CHANNEL: &str = "PWD-General";
pub const CHANNELS: [&str; 4] = ["PWD-General", "PWD-Social", "PWD-Help", "PWD-Random"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Chat {
        sender: String,
        text: String,
        mine: bool,
    },
    System(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatScreen {
    Login,
    Room,
    ChannelPicker,
}

pub struct Chat {
    screen: ChatScreen,
    username: Option<String>,
    channel: String,
    login_input: String,
    draft: String,
    custom_channel: String,
    lines: Vec<Line>,
    online: bool,
    unread: bool,
    active: bool,
    storage: Storage,
    audio: Rc<dyn AudioPort>,
    transport: Box<dyn ChatTransport>,
}

impl Chat {
    /// A stored username skips the login screen and connects right away.
    pub fn new(storage: Storage, audio: Rc<dyn AudioPort>, transport: Box<dyn ChatTransport>) -> Self {
        let username = storage.nickname();
        let mut chat = Self {
            screen: ChatScreen::Login,
            username,
            channel: DEFAULT_CHANNEL.to_string(),
            login_input: String::new(),
            draft: String::new(),
            custom_channel: String::new(),
            lines: Vec::new(),
            online: false,
            unread: false,
            active: true,
            storage,
            audio,
            transport,
        };
        if chat.username.is_some() {
            chat.connect();
        }
        chat
    }

    pub fn screen(&self) -> ChatScreen {
        self.screen
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn login_input(&self) -> &str {
        &self.login_input
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn custom_channel(&self) -> &str {
        &self.custom_channel
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn has_unread(&self) -> bool {
        self.unread
    }

    fn push_line(&mut self, line: Line) {
        self.lines.push(line);
        if self.lines.len() > MAX_LINES {
            let excess = self.lines.len() - MAX_LINES;
            self.lines.drain(..excess);
        }
    }

    fn system(&mut self, text: impl Into<String>) {
        self.push_line(Line::System(text.into()));
    }

    fn load_history(&mut self) {
        self.lines.clear();
        let me = self.username.clone();
        for msg in self.storage.chat_history(&self.channel) {
            let mine = me.as_deref() == Some(msg.sender.as_str());
            self.push_line(Line::Chat {
                sender: msg.sender,
                text: msg.text,
                mine,
            });
        }
    }

    fn connect(&mut self) {
        self.screen = ChatScreen::Room;
        self.load_history();
        self.system(format!("Connecting to {}...", self.channel));
        self.online = false;
        self.transport.connect(&self.channel);
    }

    // ── Typing ────────────────────────────────────────────────────────────────

    pub fn type_char(&mut self, c: char) {
        if c.is_control() {
            return;
        }
        let (buf, max) = match self.screen {
            ChatScreen::Login => (&mut self.login_input, MAX_USERNAME),
            ChatScreen::Room => (&mut self.draft, MAX_DRAFT),
            ChatScreen::ChannelPicker => (&mut self.custom_channel, MAX_CHANNEL),
        };
        if buf.chars().count() < max {
            buf.push(c);
        }
    }

    pub fn backspace(&mut self) {
        match self.screen {
            ChatScreen::Login => self.login_input.pop(),
            ChatScreen::Room => self.draft.pop(),
            ChatScreen::ChannelPicker => self.custom_channel.pop(),
        };
    }

    // ── Actions ───────────────────────────────────────────────────────────────

    pub fn submit_login(&mut self) {
        if self.screen != ChatScreen::Login {
            return;
        }
        let name = self.login_input.trim().to_string();
        if name.is_empty() {
            return;
        }
        self.storage.set_nickname(&name);
        tracing::info!(user = %name, "chat login");
        self.username = Some(name);
        self.login_input.clear();
        self.connect();
    }

    /// Blank drafts are ignored; the draft is cleared either way.
    pub fn send_draft(&mut self) {
        if self.screen != ChatScreen::Room {
            return;
        }
        let text = std::mem::take(&mut self.draft);
        self.unread = false;
        if text.trim().is_empty() {
            return;
        }
        let Some(user) = self.username.clone() else {
            return;
        };
        if let Err(err) = self.transport.send(&text, &user, &self.channel) {
            tracing::debug!(%err, "chat send rejected");
            self.system("Error: Not connected. Please wait...");
        }
    }

    pub fn open_channel_picker(&mut self) {
        if self.screen == ChatScreen::Room {
            self.custom_channel.clear();
            self.screen = ChatScreen::ChannelPicker;
        }
    }

    pub fn cancel_channel_picker(&mut self) {
        if self.screen == ChatScreen::ChannelPicker {
            self.screen = ChatScreen::Room;
        }
    }

    pub fn switch_channel(&mut self, name: &str) {
        if self.username.is_none() {
            return;
        }
        if name == self.channel {
            self.screen = ChatScreen::Room;
            return;
        }
        tracing::info!(from = %self.channel, to = %name, "switching chat channel");
        self.transport.disconnect();
        self.channel = name.to_string();
        self.connect();
    }

    pub fn join_custom_channel(&mut self) {
        let name = self.custom_channel.trim().to_string();
        if name.is_empty() || name.chars().count() > MAX_CHANNEL {
            return;
        }
        self.switch_channel(&name);
    }

    pub fn logout(&mut self) {
        self.transport.disconnect();
        self.storage.clear_nickname();
        self.username = None;
        self.online = false;
        self.unread = false;
        self.lines.clear();
        self.draft.clear();
        self.screen = ChatScreen::Login;
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        if active {
            self.mark_read();
        }
    }

    pub fn mark_read(&mut self) {
        self.unread = false;
    }

    /// Drain transport events. Returns whether anything changed.
    pub fn tick(&mut self) -> bool {
        let mut changed = false;
        while let Some(event) = self.transport.poll_event() {
            changed = true;
            self.on_event(event);
        }
        changed
    }

    fn on_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Opened => {
                self.online = true;
                self.system(format!("Connected to channel: {}", self.channel));
            }
            ChannelEvent::Message { username, text } => {
                let mine = self.username.as_deref() == Some(username.as_str());
                self.storage.push_chat_message(
                    &self.channel,
                    ChatMessage {
                        sender: username.clone(),
                        text: text.clone(),
                    },
                );
                self.push_line(Line::Chat {
                    sender: username,
                    text,
                    mine,
                });
                if !mine && !self.active {
                    self.unread = true;
                    self.audio.play(Cue::Notification);
                }
            }
            ChannelEvent::Closed => {
                self.online = false;
                self.system("Disconnected.");
            }
            ChannelEvent::Error(err) => {
                tracing::warn!(%err, channel = %self.channel, "chat connection error");
                self.online = false;
                self.system("Connection error.");
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.transport.disconnect();
    }
}
