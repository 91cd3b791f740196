//! Persistent key/value storage for nicknames, chat history, high scores and
//! streak counters.
//!
//! Every typed accessor reads its key, mutates, and writes the whole value back.
//! Two sessions touching the same key can therefore overwrite each other's
//! update; last writer wins.

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;

use crate::config::{load_json, save_json};

pub const MAX_CHAT_HISTORY: usize = 50;
pub const MAX_HIGH_SCORES: usize = 5;

const NICKNAME_KEY: &str = "pwd-chat-username";

// ── Port ──────────────────────────────────────────────────────────────────────

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// One JSON object on disk, re-read before every mutation.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_all(&self) -> Map<String, Value> {
        load_json(&self.path)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.read_all().remove(key)
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut all = self.read_all();
        all.insert(key.to_string(), value);
        save_json(&self.path, &all)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut all = self.read_all();
        if all.remove(key).is_some() {
            save_json(&self.path, &all)?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    map: RefCell<BTreeMap<String, Value>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.map.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.map.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.map.borrow_mut().remove(key);
        Ok(())
    }
}

// ── Records ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighScore {
    pub nickname: String,
    /// Milliseconds.
    pub time: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakKeys {
    pub current: &'static str,
    pub best: &'static str,
}

pub const WORD_STREAK: StreakKeys = StreakKeys {
    current: "pwd-word-streak",
    best: "word-best-streak",
};

pub const MEMORY_STREAK: StreakKeys = StreakKeys {
    current: "pwd-memory-streak",
    best: "memory-best-streak",
};

// ── Typed facade ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Storage {
    store: Rc<dyn KeyValueStore>,
}

impl Storage {
    pub fn new(store: Rc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Rc::new(MemoryStore::default()))
    }

    fn load<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let Some(raw) = self.store.get(key) else {
            return T::default();
        };
        match serde_json::from_value(raw) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(key, %err, "corrupt stored value, using default");
                T::default()
            }
        }
    }

    fn save<T: Serialize>(&self, key: &str, value: &T) {
        let result = serde_json::to_value(value)
            .map_err(anyhow::Error::from)
            .and_then(|v| self.store.set(key, v));
        if let Err(err) = result {
            tracing::warn!(key, %err, "could not persist value");
        }
    }

    pub fn nickname(&self) -> Option<String> {
        let name: Option<String> = self.load(NICKNAME_KEY);
        name.filter(|n| !n.trim().is_empty())
    }

    pub fn set_nickname(&self, name: &str) {
        self.save(NICKNAME_KEY, &name);
    }

    pub fn clear_nickname(&self) {
        if let Err(err) = self.store.remove(NICKNAME_KEY) {
            tracing::warn!(%err, "could not clear nickname");
        }
    }

    pub fn chat_history(&self, channel: &str) -> Vec<ChatMessage> {
        self.load(&chat_history_key(channel))
    }

    /// Append and return the trimmed history that was written.
    pub fn push_chat_message(&self, channel: &str, msg: ChatMessage) -> Vec<ChatMessage> {
        let key = chat_history_key(channel);
        let mut history: Vec<ChatMessage> = self.load(&key);
        history.push(msg);
        if history.len() > MAX_CHAT_HISTORY {
            let excess = history.len() - MAX_CHAT_HISTORY;
            history.drain(..excess);
        }
        self.save(&key, &history);
        history
    }

    pub fn high_scores(&self, list: &str) -> Vec<HighScore> {
        self.load(list)
    }

    pub fn save_high_score(&self, list: &str, nickname: &str, time: u64) -> Vec<HighScore> {
        let mut scores = self.high_scores(list);
        scores.push(HighScore {
            nickname: nickname.to_string(),
            time,
        });
        scores.sort_by_key(|s| s.time);
        scores.truncate(MAX_HIGH_SCORES);
        self.save(list, &scores);
        scores
    }

    pub fn streak(&self, keys: StreakKeys) -> u32 {
        self.load(keys.current)
    }

    pub fn set_streak(&self, keys: StreakKeys, streak: u32) {
        self.save(keys.current, &streak);
    }

    pub fn best_streak(&self, keys: StreakKeys) -> u32 {
        self.load(keys.best)
    }

    pub fn offer_best_streak(&self, keys: StreakKeys, streak: u32) -> u32 {
        let best = self.best_streak(keys);
        if streak > best {
            self.save(keys.best, &streak);
            streak
        } else {
            best
        }
    }
}

pub fn chat_history_key(channel: &str) -> String {
    format!("pwd-chat-history-{channel}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn high_scores_stay_sorted_and_capped() {
        let storage = Storage::in_memory();
        for (name, t) in [("a", 900), ("b", 300), ("c", 700), ("d", 100), ("e", 500), ("f", 200)] {
            storage.save_high_score("quiz-local-normal", name, t);
        }
        let scores = storage.high_scores("quiz-local-normal");
        assert_eq!(scores.len(), MAX_HIGH_SCORES);
        let times: Vec<u64> = scores.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![100, 200, 300, 500, 700]);
    }

    #[test]
    fn chat_history_evicts_oldest_first() {
        let storage = Storage::in_memory();
        for i in 0..(MAX_CHAT_HISTORY + 3) {
            storage.push_chat_message(
                "PWD-General",
                ChatMessage {
                    sender: "x".into(),
                    text: i.to_string(),
                },
            );
        }
        let history = storage.chat_history("PWD-General");
        assert_eq!(history.len(), MAX_CHAT_HISTORY);
        assert_eq!(history[0].text, "3");
        assert!(storage.chat_history("PWD-Social").is_empty());
    }

    #[test]
    fn corrupt_values_are_replaced_by_defaults() {
        let store = Rc::new(MemoryStore::default());
        store.set("pwd-word-streak", json!("many")).unwrap();
        store.set("quiz-server-hard", json!({"oops": true})).unwrap();
        let storage = Storage::new(store);
        assert_eq!(storage.streak(WORD_STREAK), 0);
        assert!(storage.high_scores("quiz-server-hard").is_empty());
    }

    #[test]
    fn best_streak_only_grows() {
        let storage = Storage::in_memory();
        assert_eq!(storage.offer_best_streak(WORD_STREAK, 3), 3);
        assert_eq!(storage.offer_best_streak(WORD_STREAK, 1), 3);
        assert_eq!(storage.best_streak(WORD_STREAK), 3);
    }

    #[test]
    fn blank_nickname_reads_as_none() {
        let storage = Storage::in_memory();
        assert_eq!(storage.nickname(), None);
        storage.set_nickname("  ");
        assert_eq!(storage.nickname(), None);
        storage.set_nickname("Tariq");
        assert_eq!(storage.nickname().as_deref(), Some("Tariq"));
        storage.clear_nickname();
        assert_eq!(storage.nickname(), None);
    }

    #[test]
    fn file_store_round_trips_and_survives_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let storage = Storage::new(Rc::new(JsonFileStore::new(path.clone())));
        storage.set_streak(MEMORY_STREAK, 4);
        storage.save_high_score("memory-easy", "Zaynab", 4200);

        let reopened = Storage::new(Rc::new(JsonFileStore::new(path.clone())));
        assert_eq!(reopened.streak(MEMORY_STREAK), 4);
        assert_eq!(reopened.high_scores("memory-easy")[0].nickname, "Zaynab");

        std::fs::write(&path, "][").unwrap();
        assert_eq!(reopened.streak(MEMORY_STREAK), 0);
        reopened.set_streak(MEMORY_STREAK, 1);
        assert_eq!(reopened.streak(MEMORY_STREAK), 1);
    }
}
