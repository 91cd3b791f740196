//! Quiz flow as a pure state machine.
//!
//! The quiz never calls a provider itself. It emits [`QuizCommand`]s tagged
//! with a request id and consumes [`QuizReply`]s carrying the same id; a
//! reply whose id is not the one awaited is dropped.

use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::core::focus::Cycle;
use crate::provider::{AnswerReply, ProviderError, Question};
use crate::sound::{AudioPort, Cue};
use crate::storage::{HighScore, Storage};
use crate::timer::{Countdown, TimerState};

pub const MAX_NICKNAME: usize = 15;
pub const MAX_ANSWER: usize = 64;

pub type RequestId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Server,
    Local,
}

impl Cycle for Source {
    const ALL: &'static [Self] = &[Source::Server, Source::Local];
}

impl Source {
    pub fn key(self) -> &'static str {
        match self {
            Source::Server => "server",
            Source::Local => "local",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Source::Server => "Server (LNU)",
            Source::Local => "Local (Custom)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizLevel {
    Normal,
    Hard,
}

impl Cycle for QuizLevel {
    const ALL: &'static [Self] = &[QuizLevel::Normal, QuizLevel::Hard];
}

impl QuizLevel {
    pub fn key(self) -> &'static str {
        match self {
            QuizLevel::Normal => "normal",
            QuizLevel::Hard => "hard",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            QuizLevel::Normal => "Normal",
            QuizLevel::Hard => "Hard",
        }
    }

    pub fn time_per_question(self) -> Duration {
        match self {
            QuizLevel::Normal => Duration::from_secs(10),
            QuizLevel::Hard => Duration::from_secs(5),
        }
    }
}

pub fn score_list(source: Source, level: QuizLevel) -> String {
    format!("quiz-{}-{}", source.key(), level.key())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizCommand {
    /// Fresh game: the worker picks the provider's first question.
    Begin { req: RequestId, source: Source },
    Fetch { req: RequestId, id: String },
    Submit {
        req: RequestId,
        id: String,
        answer: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizReply {
    Question(Result<Question, ProviderError>),
    Answer(Result<AnswerReply, ProviderError>),
}

#[derive(Debug, Clone)]
pub struct AskedQuestion {
    pub question: Question,
    pub countdown: Countdown,
    pub answer: String,
    pub selected: Option<usize>,
}

#[derive(Debug, Clone)]
pub enum QuizScreen {
    Start { message: Option<String> },
    Loading,
    Asking(AskedQuestion),
    GameOver { message: String },
    Victory { total: Duration, scores: Vec<HighScore> },
    HighScores { list: String, scores: Vec<HighScore> },
}

pub struct Quiz {
    nickname: String,
    source: Source,
    level: QuizLevel,
    screen: QuizScreen,
    total: Duration,
    awaiting: Option<RequestId>,
    next_req: RequestId,
    storage: Storage,
    audio: Rc<dyn AudioPort>,
}

impl Quiz {
    pub fn new(storage: Storage, audio: Rc<dyn AudioPort>) -> Self {
        Self {
            nickname: String::new(),
            source: Source::Server,
            level: QuizLevel::Normal,
            screen: QuizScreen::Start { message: None },
            total: Duration::ZERO,
            awaiting: None,
            next_req: 1,
            storage,
            audio,
        }
    }

    pub fn screen(&self) -> &QuizScreen {
        &self.screen
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn level(&self) -> QuizLevel {
        self.level
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    fn issue(&mut self) -> RequestId {
        let req = self.next_req;
        self.next_req += 1;
        self.awaiting = Some(req);
        req
    }

    // ── Start screen ──────────────────────────────────────────────────────────

    pub fn type_nickname(&mut self, c: char) {
        if matches!(self.screen, QuizScreen::Start { .. })
            && !c.is_control()
            && self.nickname.chars().count() < MAX_NICKNAME
        {
            self.nickname.push(c);
        }
    }

    pub fn backspace_nickname(&mut self) {
        if matches!(self.screen, QuizScreen::Start { .. }) {
            self.nickname.pop();
        }
    }

    pub fn toggle_source(&mut self) {
        if matches!(self.screen, QuizScreen::Start { .. }) {
            self.source = self.source.next();
        }
    }

    pub fn toggle_level(&mut self) {
        if matches!(self.screen, QuizScreen::Start { .. }) {
            self.level = self.level.next();
        }
    }

    pub fn start(&mut self) -> Option<QuizCommand> {
        if !matches!(self.screen, QuizScreen::Start { .. }) {
            return None;
        }
        let name = self.nickname.trim().to_string();
        if name.is_empty() {
            self.screen = QuizScreen::Start {
                message: Some("Please enter a nickname!".to_string()),
            };
            return None;
        }
        self.nickname = name;
        self.total = Duration::ZERO;
        self.screen = QuizScreen::Loading;
        let req = self.issue();
        tracing::debug!(source = self.source.key(), level = self.level.key(), "quiz started");
        Some(QuizCommand::Begin {
            req,
            source: self.source,
        })
    }

    pub fn show_high_scores(&mut self) {
        if matches!(self.screen, QuizScreen::Loading | QuizScreen::Asking(_)) {
            return;
        }
        let list = score_list(self.source, self.level);
        let scores = self.storage.high_scores(&list);
        self.screen = QuizScreen::HighScores { list, scores };
    }

    pub fn back_to_start(&mut self) {
        if matches!(self.screen, QuizScreen::Loading | QuizScreen::Asking(_)) {
            return;
        }
        self.screen = QuizScreen::Start { message: None };
    }

    // ── Question screen ───────────────────────────────────────────────────────

    pub fn type_answer(&mut self, c: char) {
        if let QuizScreen::Asking(asked) = &mut self.screen {
            if asked.question.alternatives.is_empty()
                && !c.is_control()
                && asked.answer.chars().count() < MAX_ANSWER
            {
                asked.answer.push(c);
            }
        }
    }

    pub fn backspace_answer(&mut self) {
        if let QuizScreen::Asking(asked) = &mut self.screen {
            asked.answer.pop();
        }
    }

    pub fn select_alternative(&mut self, index: usize) {
        if let QuizScreen::Asking(asked) = &mut self.screen {
            if index < asked.question.alternatives.len() {
                asked.selected = Some(index);
            }
        }
    }

    /// Empty input (or no alternative picked) is silently ignored.
    pub fn submit(&mut self, now: Instant) -> Option<QuizCommand> {
        let QuizScreen::Asking(asked) = &mut self.screen else {
            return None;
        };
        let answer = if asked.question.alternatives.is_empty() {
            if asked.answer.is_empty() {
                return None;
            }
            asked.answer.clone()
        } else {
            let index = asked.selected?;
            asked.question.alternatives.get(index)?.0.clone()
        };
        self.total += asked.countdown.stop(now);
        let id = asked.question.next.clone();
        self.screen = QuizScreen::Loading;
        let req = self.issue();
        Some(QuizCommand::Submit { req, id, answer })
    }

    pub fn tick(&mut self, now: Instant) {
        let QuizScreen::Asking(asked) = &mut self.screen else {
            return;
        };
        if asked.countdown.poll(now) == TimerState::Expired {
            self.game_over("Time is up!");
        }
    }

    // ── Replies ───────────────────────────────────────────────────────────────

    pub fn on_reply(&mut self, req: RequestId, reply: QuizReply, now: Instant) -> Option<QuizCommand> {
        if self.awaiting != Some(req) {
            tracing::debug!(req, "dropping stale quiz reply");
            return None;
        }
        self.awaiting = None;
        match reply {
            QuizReply::Question(Ok(question)) => {
                let mut countdown = Countdown::new(self.level.time_per_question());
                countdown.start(now);
                self.screen = QuizScreen::Asking(AskedQuestion {
                    question,
                    countdown,
                    answer: String::new(),
                    selected: None,
                });
                None
            }
            QuizReply::Answer(Ok(AnswerReply { next: Some(next), .. })) => {
                self.audio.play(Cue::Correct);
                self.screen = QuizScreen::Loading;
                let req = self.issue();
                Some(QuizCommand::Fetch { req, id: next })
            }
            QuizReply::Answer(Ok(AnswerReply { next: None, .. })) => {
                self.victory();
                None
            }
            QuizReply::Answer(Err(ProviderError::WrongAnswer)) => {
                self.game_over("Wrong Answer!");
                None
            }
            QuizReply::Question(Err(err)) | QuizReply::Answer(Err(err)) => {
                tracing::warn!(%err, "quiz provider failed");
                self.screen = QuizScreen::Start {
                    message: Some("Network Error".to_string()),
                };
                None
            }
        }
    }

    fn game_over(&mut self, message: &str) {
        self.audio.play(Cue::Lose);
        self.awaiting = None;
        self.screen = QuizScreen::GameOver {
            message: message.to_string(),
        };
    }

    fn victory(&mut self) {
        self.audio.play(Cue::Win);
        let list = score_list(self.source, self.level);
        let millis = u64::try_from(self.total.as_millis()).unwrap_or(u64::MAX);
        let scores = self.storage.save_high_score(&list, &self.nickname, millis);
        self.screen = QuizScreen::Victory {
            total: self.total,
            scores,
        };
    }

    /// Stop the clock and forget in-flight requests.
    pub fn shutdown(&mut self, now: Instant) {
        if let QuizScreen::Asking(asked) = &mut self.screen {
            asked.countdown.stop(now);
        }
        self.awaiting = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::RecordingAudio;

    fn text_question(id: &str, next: &str) -> Question {
        Question {
            id: id.into(),
            text: "?".into(),
            alternatives: Vec::new(),
            next: next.into(),
        }
    }

    fn quiz() -> (Quiz, Rc<RecordingAudio>) {
        let audio = Rc::new(RecordingAudio::default());
        (Quiz::new(Storage::in_memory(), audio.clone()), audio)
    }

    fn started(q: &mut Quiz, now: Instant) -> RequestId {
        for c in "Zaynab".chars() {
            q.type_nickname(c);
        }
        match q.start() {
            Some(QuizCommand::Begin { req, .. }) => {
                q.on_reply(req, QuizReply::Question(Ok(text_question("1", "a1"))), now);
                req
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_nickname_shows_message() {
        let (mut q, _) = quiz();
        q.type_nickname(' ');
        assert_eq!(q.start(), None);
        match q.screen() {
            QuizScreen::Start { message } => {
                assert_eq!(message.as_deref(), Some("Please enter a nickname!"))
            }
            _ => panic!("expected start screen"),
        }
    }

    #[test]
    fn nickname_is_capped() {
        let (mut q, _) = quiz();
        for _ in 0..20 {
            q.type_nickname('x');
        }
        assert_eq!(q.nickname().len(), MAX_NICKNAME);
    }

    #[test]
    fn empty_answer_makes_no_call_and_no_transition() {
        let now = Instant::now();
        let (mut q, _) = quiz();
        started(&mut q, now);
        assert_eq!(q.submit(now), None);
        assert!(matches!(q.screen(), QuizScreen::Asking(_)));
        assert!(q.awaiting.is_none());
    }

    #[test]
    fn full_run_records_high_score() {
        let now = Instant::now();
        let (mut q, audio) = quiz();
        started(&mut q, now);
        q.type_answer('x');
        let Some(QuizCommand::Submit { req, id, answer }) = q.submit(now + Duration::from_secs(2))
        else {
            panic!("expected submit");
        };
        assert_eq!((id.as_str(), answer.as_str()), ("a1", "x"));
        let next = q.on_reply(
            req,
            QuizReply::Answer(Ok(AnswerReply {
                next: Some("2".into()),
                message: String::new(),
            })),
            now,
        );
        let Some(QuizCommand::Fetch { req, id }) = next else {
            panic!("expected fetch");
        };
        assert_eq!(id, "2");

        let mut alt = text_question("2", "a2");
        alt.alternatives = vec![("alt1".into(), "One".into()), ("alt2".into(), "Two".into())];
        let t1 = now + Duration::from_secs(3);
        q.on_reply(req, QuizReply::Question(Ok(alt)), t1);
        assert_eq!(q.submit(t1), None);
        q.select_alternative(1);
        let Some(QuizCommand::Submit { req, answer, .. }) = q.submit(t1 + Duration::from_secs(1))
        else {
            panic!("expected submit");
        };
        assert_eq!(answer, "alt2");
        q.on_reply(
            req,
            QuizReply::Answer(Ok(AnswerReply {
                next: None,
                message: String::new(),
            })),
            t1,
        );
        match q.screen() {
            QuizScreen::Victory { total, scores } => {
                assert_eq!(*total, Duration::from_secs(3));
                assert_eq!(scores[0].nickname, "Zaynab");
                assert_eq!(scores[0].time, 3000);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(audio.cues(), vec![Cue::Correct, Cue::Win]);
    }

    #[test]
    fn wrong_answer_ends_the_game() {
        let now = Instant::now();
        let (mut q, audio) = quiz();
        started(&mut q, now);
        q.type_answer('n');
        let Some(QuizCommand::Submit { req, .. }) = q.submit(now) else {
            panic!("expected submit");
        };
        q.on_reply(req, QuizReply::Answer(Err(ProviderError::WrongAnswer)), now);
        assert!(
            matches!(q.screen(), QuizScreen::GameOver { message } if message == "Wrong Answer!")
        );
        assert_eq!(audio.cues(), vec![Cue::Lose]);
    }

    #[test]
    fn timeout_ends_the_game_and_late_reply_is_dropped() {
        let now = Instant::now();
        let (mut q, _) = quiz();
        let req = started(&mut q, now);
        q.tick(now + Duration::from_secs(9));
        assert!(matches!(q.screen(), QuizScreen::Asking(_)));
        q.tick(now + Duration::from_secs(10));
        assert!(matches!(q.screen(), QuizScreen::GameOver { message } if message == "Time is up!"));
        assert_eq!(
            q.on_reply(req, QuizReply::Question(Ok(text_question("9", "x"))), now),
            None
        );
        assert!(matches!(q.screen(), QuizScreen::GameOver { .. }));
    }

    #[test]
    fn transport_failure_returns_to_start_without_cue() {
        let now = Instant::now();
        let (mut q, audio) = quiz();
        for c in "Ali".chars() {
            q.type_nickname(c);
        }
        let Some(QuizCommand::Begin { req, .. }) = q.start() else {
            panic!("expected begin");
        };
        q.on_reply(req, QuizReply::Question(Err(ProviderError::Transport("down".into()))), now);
        assert!(
            matches!(q.screen(), QuizScreen::Start { message: Some(m) } if m == "Network Error")
        );
        assert!(audio.cues().is_empty());
        assert_eq!(q.nickname(), "Ali");
    }

    #[test]
    fn high_score_list_follows_toggles() {
        let (mut q, _) = quiz();
        q.toggle_source();
        q.toggle_level();
        q.show_high_scores();
        match q.screen() {
            QuizScreen::HighScores { list, scores } => {
                assert_eq!(list, "quiz-local-hard");
                assert!(scores.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
        q.back_to_start();
        assert!(matches!(q.screen(), QuizScreen::Start { .. }));
    }
}
