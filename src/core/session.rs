//! One play-through of a game, from menu to a win or loss.
//!
//! Every external event goes through [`Session::handle`], which checks the
//! current phase before touching the round. A round that has finished is
//! replaced by its summary, so late ticks and stray input have nothing left to
//! mutate.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::sound::{AudioPort, Cue};
use crate::storage::{Storage, StreakKeys};
use crate::timer::{Countdown, TimerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Ignored,
    Continue,
    Won,
    Lost,
}

/// Game-specific rules plugged into [`Session`].
pub trait Round: Sized {
    type Settings: Clone;
    type Input;
    type Summary;

    /// Draw a fresh secret configuration and reset every counter.
    fn deal(settings: &Self::Settings, rng: &mut StdRng) -> Self;

    fn time_limit(&self) -> Option<Duration> {
        None
    }

    fn apply(&mut self, input: Self::Input, now: Instant, audio: &dyn AudioPort) -> Step;

    /// Resolve anything scheduled for `now` (display delays and the like).
    fn advance(&mut self, _now: Instant, _audio: &dyn AudioPort) -> Step {
        Step::Continue
    }

    /// Called once, when the round ends. Losing rounds reveal their secret here.
    fn summarize(self, won: bool, now: Instant) -> Self::Summary;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished<S> {
    pub summary: S,
    pub streak: u32,
    pub best_streak: u32,
}

pub enum Phase<R: Round> {
    Menu,
    Playing(R),
    Won(Finished<R::Summary>),
    Lost(Finished<R::Summary>),
}

pub enum SessionEvent<R: Round> {
    Start(R::Settings),
    Input(R::Input),
    Tick,
    PlayAgain,
    BackToMenu,
}

pub struct Session<R: Round> {
    phase: Phase<R>,
    last_settings: Option<R::Settings>,
    countdown: Option<Countdown>,
    streak_keys: StreakKeys,
    storage: Storage,
    audio: Rc<dyn AudioPort>,
    rng: StdRng,
}

impl<R: Round> Session<R> {
    pub fn new(storage: Storage, audio: Rc<dyn AudioPort>, streak_keys: StreakKeys) -> Self {
        Self::with_rng(storage, audio, streak_keys, StdRng::from_entropy())
    }

    pub fn with_rng(
        storage: Storage,
        audio: Rc<dyn AudioPort>,
        streak_keys: StreakKeys,
        rng: StdRng,
    ) -> Self {
        Self {
            phase: Phase::Menu,
            last_settings: None,
            countdown: None,
            streak_keys,
            storage,
            audio,
            rng,
        }
    }

    pub fn phase(&self) -> &Phase<R> {
        &self.phase
    }

    pub fn round(&self) -> Option<&R> {
        match &self.phase {
            Phase::Playing(round) => Some(round),
            _ => None,
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.phase, Phase::Playing(_))
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Won(_) | Phase::Lost(_))
    }

    pub fn streak(&self) -> u32 {
        self.storage.streak(self.streak_keys)
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn countdown(&self) -> Option<&Countdown> {
        self.countdown.as_ref().filter(|c| c.is_running())
    }

    pub fn handle(&mut self, event: SessionEvent<R>, now: Instant) -> Step {
        match event {
            SessionEvent::Start(settings) => {
                if !matches!(self.phase, Phase::Menu) {
                    return Step::Ignored;
                }
                self.begin(settings, now);
                Step::Continue
            }
            SessionEvent::Input(input) => {
                let Phase::Playing(round) = &mut self.phase else {
                    return Step::Ignored;
                };
                let step = round.apply(input, now, self.audio.as_ref());
                self.settle(step, now)
            }
            SessionEvent::Tick => {
                if !self.is_playing() {
                    return Step::Ignored;
                }
                if let Some(countdown) = self.countdown.as_mut() {
                    if countdown.poll(now) == TimerState::Expired {
                        tracing::debug!("round timed out");
                        return self.finish(false, now);
                    }
                }
                let Phase::Playing(round) = &mut self.phase else {
                    return Step::Ignored;
                };
                let step = round.advance(now, self.audio.as_ref());
                self.settle(step, now)
            }
            SessionEvent::PlayAgain => {
                if !self.is_finished() {
                    return Step::Ignored;
                }
                match self.last_settings.clone() {
                    Some(settings) => {
                        self.begin(settings, now);
                        Step::Continue
                    }
                    None => Step::Ignored,
                }
            }
            SessionEvent::BackToMenu => {
                if matches!(self.phase, Phase::Menu) {
                    return Step::Ignored;
                }
                self.stop_countdown(now);
                self.phase = Phase::Menu;
                Step::Continue
            }
        }
    }

    /// Stop timers; used when the hosting window closes.
    pub fn shutdown(&mut self, now: Instant) {
        self.stop_countdown(now);
    }

    fn begin(&mut self, settings: R::Settings, now: Instant) {
        let round = R::deal(&settings, &mut self.rng);
        self.countdown = round.time_limit().map(|limit| {
            let mut countdown = Countdown::new(limit);
            countdown.start(now);
            countdown
        });
        self.last_settings = Some(settings);
        self.phase = Phase::Playing(round);
        tracing::debug!("round started");
    }

    fn settle(&mut self, step: Step, now: Instant) -> Step {
        match step {
            Step::Won => self.finish(true, now),
            Step::Lost => self.finish(false, now),
            other => other,
        }
    }

    fn stop_countdown(&mut self, now: Instant) {
        if let Some(mut countdown) = self.countdown.take() {
            countdown.stop(now);
        }
    }

    fn finish(&mut self, won: bool, now: Instant) -> Step {
        let Phase::Playing(round) = std::mem::replace(&mut self.phase, Phase::Menu) else {
            return Step::Ignored;
        };
        self.stop_countdown(now);

        let streak = if won { self.streak() + 1 } else { 0 };
        self.storage.set_streak(self.streak_keys, streak);
        let best_streak = self.storage.offer_best_streak(self.streak_keys, streak);
        self.audio.play(if won { Cue::Win } else { Cue::Lose });

        let finished = Finished {
            summary: round.summarize(won, now),
            streak,
            best_streak,
        };
        tracing::debug!(won, streak, "round finished");
        if won {
            self.phase = Phase::Won(finished);
            Step::Won
        } else {
            self.phase = Phase::Lost(finished);
            Step::Lost
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::RecordingAudio;
    use crate::storage::WORD_STREAK;
    use rand::Rng;

    /// Guess a number in 0..4 with a fixed number of tries.
    struct Guess {
        secret: u8,
        tries: u8,
        limit: Option<Duration>,
        pending_win_at: Option<Instant>,
    }

    #[derive(Clone)]
    struct GuessSettings {
        tries: u8,
        limit: Option<Duration>,
    }

    enum GuessInput {
        Number(u8),
        /// Correct, but only counts after a short delay.
        SlowCorrect,
    }

    impl Round for Guess {
        type Settings = GuessSettings;
        type Input = GuessInput;
        type Summary = u8;

        fn deal(settings: &GuessSettings, rng: &mut StdRng) -> Self {
            Self {
                secret: rng.gen_range(0..4),
                tries: settings.tries,
                limit: settings.limit,
                pending_win_at: None,
            }
        }

        fn time_limit(&self) -> Option<Duration> {
            self.limit
        }

        fn apply(&mut self, input: GuessInput, now: Instant, _audio: &dyn AudioPort) -> Step {
            match input {
                GuessInput::Number(n) if n == self.secret => Step::Won,
                GuessInput::Number(_) => {
                    self.tries = self.tries.saturating_sub(1);
                    if self.tries == 0 {
                        Step::Lost
                    } else {
                        Step::Continue
                    }
                }
                GuessInput::SlowCorrect => {
                    self.pending_win_at = Some(now + Duration::from_millis(500));
                    Step::Continue
                }
            }
        }

        fn advance(&mut self, now: Instant, _audio: &dyn AudioPort) -> Step {
            match self.pending_win_at {
                Some(at) if now >= at => Step::Won,
                _ => Step::Continue,
            }
        }

        fn summarize(self, _won: bool, _now: Instant) -> u8 {
            self.secret
        }
    }

    fn session(audio: Rc<RecordingAudio>) -> Session<Guess> {
        Session::with_rng(
            Storage::in_memory(),
            audio,
            WORD_STREAK,
            StdRng::seed_from_u64(7),
        )
    }

    fn start(s: &mut Session<Guess>, tries: u8, limit: Option<Duration>, now: Instant) -> u8 {
        s.handle(SessionEvent::Start(GuessSettings { tries, limit }), now);
        s.round().unwrap().secret
    }

    fn wrong(secret: u8) -> u8 {
        (secret + 1) % 4
    }

    #[test]
    fn win_increments_streak_by_one() {
        let now = Instant::now();
        let audio = Rc::new(RecordingAudio::default());
        let mut s = session(audio.clone());
        s.storage().set_streak(WORD_STREAK, 4);
        let secret = start(&mut s, 3, None, now);
        assert_eq!(s.handle(SessionEvent::Input(GuessInput::Number(secret)), now), Step::Won);
        assert_eq!(s.streak(), 5);
        match s.phase() {
            Phase::Won(f) => {
                assert_eq!(f.streak, 5);
                assert_eq!(f.best_streak, 5);
                assert_eq!(f.summary, secret);
            }
            _ => panic!("expected win"),
        }
        assert_eq!(audio.cues(), vec![Cue::Win]);
    }

    #[test]
    fn loss_resets_streak_regardless_of_prior_value() {
        let now = Instant::now();
        let audio = Rc::new(RecordingAudio::default());
        let mut s = session(audio.clone());
        s.storage().set_streak(WORD_STREAK, 9);
        let secret = start(&mut s, 1, None, now);
        assert_eq!(
            s.handle(SessionEvent::Input(GuessInput::Number(wrong(secret))), now),
            Step::Lost
        );
        assert_eq!(s.streak(), 0);
        assert_eq!(s.storage().best_streak(WORD_STREAK), 9);
        assert_eq!(audio.cues(), vec![Cue::Lose]);
    }

    #[test]
    fn finished_round_ignores_input_and_ticks() {
        let now = Instant::now();
        let audio = Rc::new(RecordingAudio::default());
        let mut s = session(audio.clone());
        let secret = start(&mut s, 1, Some(Duration::from_secs(1)), now);
        s.handle(SessionEvent::Input(GuessInput::Number(secret)), now);
        assert_eq!(
            s.handle(SessionEvent::Input(GuessInput::Number(secret)), now),
            Step::Ignored
        );
        assert_eq!(s.handle(SessionEvent::Tick, now + Duration::from_secs(5)), Step::Ignored);
        assert_eq!(s.streak(), 1);
        assert_eq!(audio.cues(), vec![Cue::Win]);
    }

    #[test]
    fn expiry_forces_a_single_loss() {
        let now = Instant::now();
        let audio = Rc::new(RecordingAudio::default());
        let mut s = session(audio.clone());
        s.storage().set_streak(WORD_STREAK, 2);
        start(&mut s, 5, Some(Duration::from_secs(2)), now);
        assert_eq!(s.handle(SessionEvent::Tick, now + Duration::from_secs(1)), Step::Continue);
        assert!(s.countdown().is_some());
        assert_eq!(s.handle(SessionEvent::Tick, now + Duration::from_secs(2)), Step::Lost);
        assert_eq!(s.handle(SessionEvent::Tick, now + Duration::from_secs(3)), Step::Ignored);
        assert_eq!(s.streak(), 0);
        assert_eq!(audio.cues(), vec![Cue::Lose]);
        assert!(s.countdown().is_none());
    }

    #[test]
    fn delayed_win_resolves_on_tick() {
        let now = Instant::now();
        let mut s = session(Rc::new(RecordingAudio::default()));
        start(&mut s, 3, None, now);
        assert_eq!(s.handle(SessionEvent::Input(GuessInput::SlowCorrect), now), Step::Continue);
        assert_eq!(s.handle(SessionEvent::Tick, now + Duration::from_millis(100)), Step::Continue);
        assert_eq!(s.handle(SessionEvent::Tick, now + Duration::from_millis(500)), Step::Won);
    }

    #[test]
    fn menu_transitions() {
        let now = Instant::now();
        let mut s = session(Rc::new(RecordingAudio::default()));
        assert_eq!(s.handle(SessionEvent::PlayAgain, now), Step::Ignored);
        assert_eq!(s.handle(SessionEvent::Tick, now), Step::Ignored);
        let secret = start(&mut s, 2, None, now);
        assert_eq!(
            s.handle(SessionEvent::Start(GuessSettings { tries: 2, limit: None }), now),
            Step::Ignored
        );
        s.handle(SessionEvent::Input(GuessInput::Number(secret)), now);
        assert_eq!(s.handle(SessionEvent::PlayAgain, now), Step::Continue);
        assert!(s.is_playing());
        assert_eq!(s.round().unwrap().tries, 2);
        assert_eq!(s.handle(SessionEvent::BackToMenu, now), Step::Continue);
        assert!(matches!(s.phase(), Phase::Menu));
        assert_eq!(s.streak(), 1);
    }
}
