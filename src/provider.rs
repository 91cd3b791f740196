//! Question providers for the quiz: a bundled/local question file and the
//! remote quiz server. Calls block, so they run on a [`ProviderWorker`] thread.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::Duration;
use thiserror::Error;

use crate::core::quiz::{QuizCommand, QuizReply, RequestId};

const BUNDLED_QUESTIONS: &str = include_str!("../assets/questions.json");
const LOCAL_LATENCY: Duration = Duration::from_millis(200);
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: String,
    pub text: String,
    /// `(key, label)` pairs in key order; empty for free-text questions.
    pub alternatives: Vec<(String, String)>,
    /// Where the answer is sent.
    pub next: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerReply {
    pub next: Option<String>,
    pub message: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("wrong answer")]
    WrongAnswer,
    #[error("question {0} not found")]
    NotFound(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

pub trait QuestionProvider: Send {
    fn first_id(&self) -> String;
    fn get_question(&self, id: &str) -> Result<Question, ProviderError>;
    fn send_answer(&self, id: &str, answer: &str) -> Result<AnswerReply, ProviderError>;
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Local ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct LocalQuestion {
    id: u64,
    question: String,
    #[serde(default)]
    alternatives: Option<BTreeMap<String, String>>,
    #[serde(rename = "correctAnswer")]
    correct_answer: Value,
}

pub struct LocalProvider {
    questions: Vec<LocalQuestion>,
    latency: Duration,
}

impl LocalProvider {
    pub fn from_json(text: &str) -> Result<Self> {
        let questions: Vec<LocalQuestion> =
            serde_json::from_str(text).context("parsing question list")?;
        Ok(Self {
            questions,
            latency: LOCAL_LATENCY,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_json(&text)
    }

    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED_QUESTIONS)
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn find(&self, id: &str) -> Result<(usize, &LocalQuestion), ProviderError> {
        let wanted: u64 = id
            .trim()
            .parse()
            .map_err(|_| ProviderError::NotFound(id.to_string()))?;
        self.questions
            .iter()
            .enumerate()
            .find(|(_, q)| q.id == wanted)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }

    fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
    }
}

impl QuestionProvider for LocalProvider {
    fn first_id(&self) -> String {
        self.questions
            .first()
            .map(|q| q.id.to_string())
            .unwrap_or_else(|| "1".to_string())
    }

    fn get_question(&self, id: &str) -> Result<Question, ProviderError> {
        self.simulate_latency();
        let (_, q) = self.find(id)?;
        Ok(Question {
            id: q.id.to_string(),
            text: q.question.clone(),
            alternatives: q
                .alternatives
                .clone()
                .map(|alts| alts.into_iter().collect())
                .unwrap_or_default(),
            next: q.id.to_string(),
        })
    }

    fn send_answer(&self, id: &str, answer: &str) -> Result<AnswerReply, ProviderError> {
        self.simulate_latency();
        let (index, q) = self.find(id)?;
        let given = answer.trim().to_lowercase();
        let expected = value_to_string(&q.correct_answer).trim().to_lowercase();
        if given != expected {
            return Err(ProviderError::WrongAnswer);
        }
        Ok(match self.questions.get(index + 1) {
            Some(next) => AnswerReply {
                next: Some(next.id.to_string()),
                message: "Correct".to_string(),
            },
            None => AnswerReply {
                next: None,
                message: "Victory".to_string(),
            },
        })
    }
}

// ── HTTP ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ServerQuestion {
    id: Value,
    question: String,
    #[serde(default)]
    alternatives: Option<BTreeMap<String, String>>,
    #[serde(rename = "nextURL")]
    next_url: String,
}

#[derive(Debug, Deserialize)]
struct ServerAnswer {
    #[serde(rename = "nextURL", default)]
    next_url: Option<String>,
    #[serde(default)]
    message: String,
}

/// The course quiz server: ids are URLs, HTTP 400 means a wrong answer.
pub struct HttpProvider {
    client: reqwest::blocking::Client,
    start_url: String,
}

impl HttpProvider {
    pub fn new(start_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("building http client")?;
        Ok(Self {
            client,
            start_url: start_url.into(),
        })
    }
}

fn transport(err: reqwest::Error) -> ProviderError {
    ProviderError::Transport(err.to_string())
}

impl QuestionProvider for HttpProvider {
    fn first_id(&self) -> String {
        self.start_url.clone()
    }

    fn get_question(&self, id: &str) -> Result<Question, ProviderError> {
        let resp = self.client.get(id).send().map_err(transport)?;
        match resp.status() {
            reqwest::StatusCode::NOT_FOUND => return Err(ProviderError::NotFound(id.to_string())),
            s if !s.is_success() => return Err(ProviderError::Transport(format!("status {s}"))),
            _ => {}
        }
        let q: ServerQuestion = resp.json().map_err(transport)?;
        Ok(Question {
            id: value_to_string(&q.id),
            text: q.question,
            alternatives: q
                .alternatives
                .map(|alts| alts.into_iter().collect())
                .unwrap_or_default(),
            next: q.next_url,
        })
    }

    fn send_answer(&self, id: &str, answer: &str) -> Result<AnswerReply, ProviderError> {
        let resp = self
            .client
            .post(id)
            .json(&json!({ "answer": answer }))
            .send()
            .map_err(transport)?;
        match resp.status() {
            reqwest::StatusCode::BAD_REQUEST => return Err(ProviderError::WrongAnswer),
            reqwest::StatusCode::NOT_FOUND => return Err(ProviderError::NotFound(id.to_string())),
            s if !s.is_success() => return Err(ProviderError::Transport(format!("status {s}"))),
            _ => {}
        }
        let a: ServerAnswer = resp.json().map_err(transport)?;
        Ok(AnswerReply {
            next: a.next_url,
            message: a.message,
        })
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

/// Runs provider calls off the UI thread. Dropping the worker ends its thread
/// once the call in flight returns.
pub struct ProviderWorker {
    tx: Sender<QuizCommand>,
    rx: Receiver<(RequestId, QuizReply)>,
}

impl ProviderWorker {
    pub fn spawn(provider: Box<dyn QuestionProvider>) -> Self {
        let (tx, cmd_rx) = channel::<QuizCommand>();
        let (reply_tx, rx) = channel();
        std::thread::spawn(move || {
            for cmd in cmd_rx {
                let (req, reply) = match cmd {
                    QuizCommand::Begin { req, .. } => {
                        let id = provider.first_id();
                        (req, QuizReply::Question(provider.get_question(&id)))
                    }
                    QuizCommand::Fetch { req, id } => {
                        (req, QuizReply::Question(provider.get_question(&id)))
                    }
                    QuizCommand::Submit { req, id, answer } => {
                        (req, QuizReply::Answer(provider.send_answer(&id, &answer)))
                    }
                };
                if reply_tx.send((req, reply)).is_err() {
                    break;
                }
            }
            tracing::debug!("question worker stopped");
        });
        Self { tx, rx }
    }

    /// False when the worker thread has gone away.
    pub fn send(&self, cmd: QuizCommand) -> bool {
        if self.tx.send(cmd).is_err() {
            tracing::warn!("question worker is gone");
            return false;
        }
        true
    }

    pub fn try_recv(&self) -> Option<(RequestId, QuizReply)> {
        self.rx.try_recv().ok()
    }
}
