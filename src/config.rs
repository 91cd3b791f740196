use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock};

// ── Paths ─────────────────────────────────────────────────────────────────────

static DATA_DIR_OVERRIDE: OnceLock<PathBuf> = OnceLock::new();

/// Directory next to the executable; last-resort home for data files.
pub fn base_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Pin the data directory (from `--data-dir`). Only the first call wins.
pub fn set_data_dir(path: PathBuf) {
    let _ = DATA_DIR_OVERRIDE.set(path);
}

pub fn data_dir() -> PathBuf {
    let d = DATA_DIR_OVERRIDE
        .get()
        .cloned()
        .or_else(|| dirs::data_dir().map(|d| d.join("andalus")))
        .unwrap_or_else(base_dir);
    let _ = std::fs::create_dir_all(&d);
    d
}

pub fn settings_file() -> PathBuf {
    data_dir().join("settings.json")
}

pub fn storage_file() -> PathBuf {
    data_dir().join("storage.json")
}

pub fn log_file() -> PathBuf {
    data_dir().join("andalus.log")
}

pub fn audio_dir() -> PathBuf {
    data_dir().join("audio")
}

// ── JSON helpers ──────────────────────────────────────────────────────────────

pub fn load_json<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> T {
    let Ok(text) = std::fs::read_to_string(path) else {
        return T::default();
    };
    match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "corrupt json, using defaults");
            T::default()
        }
    }
}

pub fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

// ── Settings ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub sound: bool,
    pub theme: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_chat_server_url")]
    pub chat_server_url: String,
    #[serde(default)]
    pub chat_api_key: String,
    #[serde(default = "default_quiz_server_url")]
    pub quiz_server_url: String,
    #[serde(default)]
    pub questions_file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_chat_server_url() -> String {
    "wss://courselab.lnu.se/message-app/socket".to_string()
}

fn default_quiz_server_url() -> String {
    "https://courselab.lnu.se/quiz/question/1".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sound: true,
            theme: "Emerald (Default)".into(),
            log_level: default_log_level(),
            chat_server_url: default_chat_server_url(),
            chat_api_key: String::new(),
            quiz_server_url: default_quiz_server_url(),
            questions_file: None,
        }
    }
}

pub fn load_settings() -> Settings {
    load_json(&settings_file())
}

pub fn save_settings(d: &Settings) {
    if let Err(err) = save_json(&settings_file(), d) {
        tracing::warn!(%err, "could not save settings");
    }
}

// ── Global mutable state ──────────────────────────────────────────────────────

static APP_SETTINGS: OnceLock<RwLock<Settings>> = OnceLock::new();

fn settings_lock() -> &'static RwLock<Settings> {
    APP_SETTINGS.get_or_init(|| RwLock::new(Settings::default()))
}

pub fn get_settings() -> Settings {
    settings_lock()
        .read()
        .map(|g| g.clone())
        .unwrap_or_default()
}

pub fn reload_settings() {
    let s = load_settings();
    if let Ok(mut guard) = settings_lock().write() {
        *guard = s;
    }
}

pub fn update_settings<F: FnOnce(&mut Settings)>(f: F) {
    if let Ok(mut guard) = settings_lock().write() {
        f(&mut guard);
    }
}

pub fn persist_settings() {
    let s = get_settings();
    save_settings(&s);
}

// ── Themes ────────────────────────────────────────────────────────────────────

use ratatui::style::Color;

pub const THEMES: &[(&str, Color)] = &[
    ("Emerald (Default)", Color::Green),
    ("Terracotta", Color::Red),
    ("Gold", Color::Yellow),
    ("Azure", Color::Blue),
    ("Ivory", Color::White),
];

pub fn theme_color(name: &str) -> Color {
    THEMES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, c)| *c)
        .unwrap_or(Color::Green)
}

pub fn current_theme_color() -> Color {
    theme_color(&get_settings().theme)
}

pub const APP_TITLE: &str = "AL-ANDALUS PERSONAL DESKTOP";
