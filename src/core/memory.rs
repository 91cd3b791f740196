use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::time::{Duration, Instant};

use crate::core::focus::Cycle;
use crate::core::session::{Round, Step};
use crate::sound::{AudioPort, Cue};
use crate::timer::Stopwatch;

/// How long a found pair stays face-up before it is marked matched.
pub const MATCH_DELAY: Duration = Duration::from_millis(500);
/// How long a wrong pair stays face-up before flipping back.
pub const MISMATCH_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Astronomy,
    Fountain,
    Garden,
    GrandMosque,
    Mosque,
    Person,
    Sword,
    Waterwheel,
}

impl Symbol {
    pub const ALL: [Symbol; 8] = [
        Symbol::Astronomy,
        Symbol::Fountain,
        Symbol::Garden,
        Symbol::GrandMosque,
        Symbol::Mosque,
        Symbol::Person,
        Symbol::Sword,
        Symbol::Waterwheel,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Symbol::Astronomy => "astronomy",
            Symbol::Fountain => "fountain",
            Symbol::Garden => "garden",
            Symbol::GrandMosque => "grand-mosque",
            Symbol::Mosque => "mosque",
            Symbol::Person => "person",
            Symbol::Sword => "sword",
            Symbol::Waterwheel => "waterwheel",
        }
    }

    /// Single-cell glyph for the card face.
    pub fn glyph(self) -> char {
        match self {
            Symbol::Astronomy => '✶',
            Symbol::Fountain => '♒',
            Symbol::Garden => '♣',
            Symbol::GrandMosque => '▲',
            Symbol::Mosque => '☾',
            Symbol::Person => '☺',
            Symbol::Sword => '†',
            Symbol::Waterwheel => '✣',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Easy,
    Medium,
    Hard,
}

impl Cycle for Level {
    const ALL: &'static [Self] = &[Level::Easy, Level::Medium, Level::Hard];
}

impl Level {
    pub fn rows(self) -> usize {
        match self {
            Level::Easy | Level::Medium => 2,
            Level::Hard => 4,
        }
    }

    pub fn cols(self) -> usize {
        match self {
            Level::Easy => 2,
            Level::Medium | Level::Hard => 4,
        }
    }

    pub fn pairs(self) -> usize {
        self.rows() * self.cols() / 2
    }

    pub fn label(self) -> &'static str {
        match self {
            Level::Easy => "Easy (2x2)",
            Level::Medium => "Medium (2x4)",
            Level::Hard => "Hard (4x4)",
        }
    }

    /// High-score list for single-player wins.
    pub fn score_list(self) -> &'static str {
        match self {
            Level::Easy => "memory-easy",
            Level::Medium => "memory-medium",
            Level::Hard => "memory-hard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    OnePlayer,
    TwoPlayers,
}

impl Cycle for Mode {
    const ALL: &'static [Self] = &[Mode::OnePlayer, Mode::TwoPlayers];
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::OnePlayer => "1 Player",
            Mode::TwoPlayers => "2 Players",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySettings {
    pub mode: Mode,
    pub level: Level,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            mode: Mode::OnePlayer,
            level: Level::Easy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    Hidden,
    FaceUp,
    Matched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Card {
    pub symbol: Symbol,
    pub state: CardState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Match { due: Instant },
    Mismatch { due: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryInput {
    Flip(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemorySummary {
    Solo {
        level: Level,
        attempts: u32,
        elapsed: Duration,
    },
    Duel {
        scores: [u32; 2],
    },
}

impl MemorySummary {
    pub fn headline(&self) -> String {
        match self {
            MemorySummary::Solo { .. } => "Victory!".to_string(),
            MemorySummary::Duel { scores: [a, b] } if a > b => "Player 1 Wins!".to_string(),
            MemorySummary::Duel { scores: [a, b] } if b > a => "Player 2 Wins!".to_string(),
            MemorySummary::Duel { .. } => "It's a Tie!".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryRound {
    settings: MemorySettings,
    cards: Vec<Card>,
    face_up: Vec<usize>,
    pending: Option<Pending>,
    matches: usize,
    attempts: u32,
    current_player: u8,
    scores: [u32; 2],
    stopwatch: Stopwatch,
}

impl MemoryRound {
    pub fn settings(&self) -> MemorySettings {
        self.settings
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn cols(&self) -> usize {
        self.settings.level.cols()
    }

    pub fn face_up_count(&self) -> usize {
        self.face_up.len()
    }

    pub fn matches(&self) -> usize {
        self.matches
    }

    pub fn total_pairs(&self) -> usize {
        self.cards.len() / 2
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn current_player(&self) -> u8 {
        self.current_player
    }

    pub fn scores(&self) -> [u32; 2] {
        self.scores
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.stopwatch.elapsed(now)
    }

    fn two_player(&self) -> bool {
        self.settings.mode == Mode::TwoPlayers
    }

    fn flip(&mut self, index: usize, now: Instant, audio: &dyn AudioPort) -> Step {
        if self.face_up.len() >= 2 {
            return Step::Ignored;
        }
        match self.cards.get(index) {
            Some(card) if card.state == CardState::Hidden => {}
            _ => return Step::Ignored,
        }
        if !self.two_player() {
            self.stopwatch.start(now);
        }
        audio.play(Cue::Flip);
        self.cards[index].state = CardState::FaceUp;
        self.face_up.push(index);

        if let &[a, b] = self.face_up.as_slice() {
            if self.cards[a].symbol == self.cards[b].symbol {
                self.pending = Some(Pending::Match {
                    due: now + MATCH_DELAY,
                });
            } else {
                if !self.two_player() {
                    self.attempts += 1;
                }
                self.pending = Some(Pending::Mismatch {
                    due: now + MISMATCH_DELAY,
                });
            }
        }
        Step::Continue
    }
}

impl Round for MemoryRound {
    type Settings = MemorySettings;
    type Input = MemoryInput;
    type Summary = MemorySummary;

    fn deal(settings: &MemorySettings, rng: &mut StdRng) -> Self {
        let symbols = &Symbol::ALL[..settings.level.pairs()];
        let mut cards: Vec<Card> = symbols
            .iter()
            .chain(symbols.iter())
            .map(|&symbol| Card {
                symbol,
                state: CardState::Hidden,
            })
            .collect();
        cards.shuffle(rng);
        Self {
            settings: *settings,
            cards,
            face_up: Vec::with_capacity(2),
            pending: None,
            matches: 0,
            attempts: 0,
            current_player: 1,
            scores: [0, 0],
            stopwatch: Stopwatch::default(),
        }
    }

    fn apply(&mut self, input: MemoryInput, now: Instant, audio: &dyn AudioPort) -> Step {
        match input {
            MemoryInput::Flip(index) => self.flip(index, now, audio),
        }
    }

    fn advance(&mut self, now: Instant, audio: &dyn AudioPort) -> Step {
        match self.pending {
            Some(Pending::Match { due }) if now >= due => {
                self.pending = None;
                audio.play(Cue::Correct);
                for i in self.face_up.drain(..) {
                    self.cards[i].state = CardState::Matched;
                }
                self.matches += 1;
                if self.settings.mode == Mode::TwoPlayers {
                    self.scores[usize::from(self.current_player - 1)] += 1;
                } else {
                    self.attempts += 1;
                }
                if self.matches == self.total_pairs() {
                    Step::Won
                } else {
                    Step::Continue
                }
            }
            Some(Pending::Mismatch { due }) if now >= due => {
                self.pending = None;
                for i in self.face_up.drain(..) {
                    self.cards[i].state = CardState::Hidden;
                }
                // Turns only change hands after a miss.
                if self.settings.mode == Mode::TwoPlayers {
                    self.current_player = if self.current_player == 1 { 2 } else { 1 };
                }
                Step::Continue
            }
            _ => Step::Continue,
        }
    }

    fn summarize(mut self, _won: bool, now: Instant) -> MemorySummary {
        match self.settings.mode {
            Mode::OnePlayer => MemorySummary::Solo {
                level: self.settings.level,
                attempts: self.attempts,
                elapsed: self.stopwatch.stop(now),
            },
            Mode::TwoPlayers => MemorySummary::Duel {
                scores: self.scores,
            },
        }
    }
}
