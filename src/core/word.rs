use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::core::focus::Cycle;
use crate::core::session::{Round, Step};
use crate::sound::{AudioPort, Cue};

pub const KEYBOARD_ROWS: [&str; 3] = ["QWERTYUIOP", "ASDFGHJKL", "ZXCVBNM"];

const AL_ANDALUS: &[(&str, &str)] = &[
    ("ALHAMBRA", "Palace and fortress complex overlooking Granada."),
    ("CORDOBA", "Capital of the Umayyad caliphate in the west."),
    ("GRANADA", "Last Nasrid kingdom on the Iberian peninsula."),
    ("MOSQUE", "House of prayer; Cordoba's is famed for its arches."),
    ("PALACE", "Royal residence such as Madinat al-Zahra."),
    ("CALIPHATE", "State ruled by a caliph, proclaimed in Cordoba in 929."),
    ("GARDENS", "Walled courtyards of water and shade, like the Generalife."),
    ("ARCH", "Curved span; the horseshoe form defines Andalusi building."),
];

const WEB: &[(&str, &str)] = &[
    ("JAVASCRIPT", "Scripting language that runs in every browser."),
    ("MODULE", "Self-contained unit of code with its own imports."),
    ("INTERFACE", "Boundary through which two components talk."),
    ("VARIABLE", "Named slot that holds a value."),
    ("BROWSER", "Program that fetches and renders web pages."),
    ("SOCKET", "Two-way connection endpoint for streaming messages."),
];

const SCHOLARSHIP: &[(&str, &str)] = &[
    ("GEOMETRY", "Study of shapes, the basis of tiled ornament."),
    ("SCHOLAR", "One devoted to learning, like Ibn Rushd."),
    ("ASTROLABE", "Instrument for reading the sky and telling time."),
    ("ALGEBRA", "Reckoning by restoration and balancing."),
    ("MEDICINE", "Al-Zahrawi wrote a thirty-volume treatise on it."),
    ("LIBRARY", "Al-Hakam II gathered hundreds of thousands of books in one."),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    AlAndalus,
    Web,
    Scholarship,
}

impl Cycle for Category {
    const ALL: &'static [Self] = &[Category::AlAndalus, Category::Web, Category::Scholarship];
}

impl Category {
    pub fn label(self) -> &'static str {
        match self {
            Category::AlAndalus => "Al-Andalus",
            Category::Web => "Web",
            Category::Scholarship => "Scholarship",
        }
    }

    pub fn words(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Category::AlAndalus => AL_ANDALUS,
            Category::Web => WEB,
            Category::Scholarship => SCHOLARSHIP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordLevel {
    Easy,
    Normal,
    Hard,
}

impl Cycle for WordLevel {
    const ALL: &'static [Self] = &[WordLevel::Easy, WordLevel::Normal, WordLevel::Hard];
}

impl WordLevel {
    pub fn lives(self) -> u8 {
        match self {
            WordLevel::Easy => 6,
            WordLevel::Normal => 4,
            WordLevel::Hard => 1,
        }
    }

    pub fn time_limit(self) -> Option<Duration> {
        match self {
            WordLevel::Easy => None,
            WordLevel::Normal => Some(Duration::from_secs(90)),
            WordLevel::Hard => Some(Duration::from_secs(45)),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WordLevel::Easy => "Easy",
            WordLevel::Normal => "Normal",
            WordLevel::Hard => "Hard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordSettings {
    pub category: Category,
    pub level: WordLevel,
}

impl Default for WordSettings {
    fn default() -> Self {
        Self {
            category: Category::AlAndalus,
            level: WordLevel::Easy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LetterState {
    Unused,
    Hit,
    Miss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordInput {
    Guess(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordSummary {
    pub word: &'static str,
    pub definition: &'static str,
    pub lives_left: u8,
}

#[derive(Debug, Clone)]
pub struct WordRound {
    settings: WordSettings,
    secret: &'static str,
    definition: &'static str,
    guessed: BTreeSet<char>,
    lives: u8,
}

impl WordRound {
    pub fn settings(&self) -> WordSettings {
        self.settings
    }

    pub fn lives(&self) -> u8 {
        self.lives
    }

    pub fn max_lives(&self) -> u8 {
        self.settings.level.lives()
    }

    pub fn letter_state(&self, letter: char) -> LetterState {
        if !self.guessed.contains(&letter) {
            LetterState::Unused
        } else if self.secret.contains(letter) {
            LetterState::Hit
        } else {
            LetterState::Miss
        }
    }

    /// Secret with unguessed letters blanked, spaced for display.
    pub fn masked(&self) -> String {
        self.secret
            .chars()
            .map(|c| if self.guessed.contains(&c) { c } else { '_' })
            .map(String::from)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn solved(&self) -> bool {
        self.secret.chars().all(|c| self.guessed.contains(&c))
    }
}

impl Round for WordRound {
    type Settings = WordSettings;
    type Input = WordInput;
    type Summary = WordSummary;

    fn deal(settings: &WordSettings, rng: &mut StdRng) -> Self {
        let (secret, definition) = settings
            .category
            .words()
            .choose(rng)
            .copied()
            .unwrap_or(("ARCH", ""));
        Self {
            settings: *settings,
            secret,
            definition,
            guessed: BTreeSet::new(),
            lives: settings.level.lives(),
        }
    }

    fn time_limit(&self) -> Option<Duration> {
        self.settings.level.time_limit()
    }

    fn apply(&mut self, input: WordInput, _now: Instant, audio: &dyn AudioPort) -> Step {
        let WordInput::Guess(letter) = input;
        let letter = letter.to_ascii_uppercase();
        if !letter.is_ascii_uppercase() || !self.guessed.insert(letter) {
            return Step::Ignored;
        }
        if self.secret.contains(letter) {
            audio.play(Cue::Correct);
            if self.solved() {
                return Step::Won;
            }
            return Step::Continue;
        }
        self.lives = self.lives.saturating_sub(1);
        if self.lives == 0 {
            Step::Lost
        } else {
            Step::Continue
        }
    }

    fn summarize(self, _won: bool, _now: Instant) -> WordSummary {
        WordSummary {
            word: self.secret,
            definition: self.definition,
            lives_left: self.lives,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::{Phase, Session, SessionEvent};
    use crate::sound::{RecordingAudio, Silent};
    use crate::storage::{Storage, WORD_STREAK};
    use rand::SeedableRng;
    use std::rc::Rc;

    fn round(level: WordLevel, secret: &'static str) -> WordRound {
        WordRound {
            settings: WordSettings {
                category: Category::AlAndalus,
                level,
            },
            secret,
            definition: "",
            guessed: BTreeSet::new(),
            lives: level.lives(),
        }
    }

    fn misses(secret: &str) -> impl Iterator<Item = char> + '_ {
        ('A'..='Z').filter(move |c| !secret.contains(*c))
    }

    #[test]
    fn hit_reveals_every_occurrence() {
        let mut r = round(WordLevel::Easy, "GRANADA");
        assert_eq!(r.apply(WordInput::Guess('a'), Instant::now(), &Silent), Step::Continue);
        assert_eq!(r.masked(), "_ _ A _ A _ A");
        assert_eq!(r.letter_state('A'), LetterState::Hit);
        assert_eq!(r.lives(), 6);
    }

    #[test]
    fn repeated_and_invalid_guesses_are_ignored() {
        let now = Instant::now();
        let mut r = round(WordLevel::Normal, "ARCH");
        assert_eq!(r.apply(WordInput::Guess('Z'), now, &Silent), Step::Continue);
        assert_eq!(r.apply(WordInput::Guess('z'), now, &Silent), Step::Ignored);
        assert_eq!(r.apply(WordInput::Guess('7'), now, &Silent), Step::Ignored);
        assert_eq!(r.lives(), 3);
        assert_eq!(r.letter_state('Z'), LetterState::Miss);
    }

    #[test]
    fn lives_fall_monotonically_and_loss_fires_once() {
        let now = Instant::now();
        let mut r = round(WordLevel::Normal, "CORDOBA");
        let mut lost = 0;
        let mut last = r.lives();
        for c in misses("CORDOBA") {
            let step = r.apply(WordInput::Guess(c), now, &Silent);
            assert!(r.lives() <= last);
            last = r.lives();
            if step == Step::Lost {
                lost += 1;
                break;
            }
        }
        assert_eq!(lost, 1);
        assert_eq!(r.lives(), 0);
    }

    #[test]
    fn solving_wins_with_definition() {
        let now = Instant::now();
        let mut r = round(WordLevel::Easy, "ARCH");
        for c in ['A', 'R', 'C'] {
            assert_eq!(r.apply(WordInput::Guess(c), now, &Silent), Step::Continue);
        }
        assert_eq!(r.apply(WordInput::Guess('H'), now, &Silent), Step::Won);
        assert_eq!(r.summarize(true, now).word, "ARCH");
    }

    #[test]
    fn hardest_level_loses_on_first_miss() {
        let now = Instant::now();
        let audio = Rc::new(RecordingAudio::default());
        let storage = Storage::in_memory();
        storage.set_streak(WORD_STREAK, 6);
        let mut session: Session<WordRound> =
            Session::with_rng(storage, audio.clone(), WORD_STREAK, StdRng::seed_from_u64(4));
        session.handle(
            SessionEvent::Start(WordSettings {
                category: Category::Web,
                level: WordLevel::Hard,
            }),
            now,
        );
        assert!(session.countdown().is_some());
        let secret = match session.phase() {
            Phase::Playing(r) => r.secret,
            _ => panic!("expected a round"),
        };
        let miss = misses(secret).next().unwrap();
        assert_eq!(session.handle(SessionEvent::Input(WordInput::Guess(miss)), now), Step::Lost);
        assert_eq!(session.streak(), 0);
        match session.phase() {
            Phase::Lost(f) => assert_eq!(f.summary.word, secret),
            _ => panic!("expected a loss"),
        }
        assert_eq!(audio.cues(), vec![Cue::Lose]);
    }

    #[test]
    fn normal_level_times_out_after_ninety_seconds() {
        let now = Instant::now();
        let mut session: Session<WordRound> = Session::with_rng(
            Storage::in_memory(),
            Rc::new(Silent),
            WORD_STREAK,
            StdRng::seed_from_u64(1),
        );
        session.handle(
            SessionEvent::Start(WordSettings {
                category: Category::Scholarship,
                level: WordLevel::Normal,
            }),
            now,
        );
        assert_eq!(session.handle(SessionEvent::Tick, now + Duration::from_secs(89)), Step::Continue);
        assert_eq!(session.handle(SessionEvent::Tick, now + Duration::from_secs(90)), Step::Lost);
    }

    #[test]
    fn every_word_is_uppercase_ascii() {
        for category in Category::ALL {
            for (word, definition) in category.words() {
                assert!(word.chars().all(|c| c.is_ascii_uppercase()), "{word}");
                assert!(!definition.is_empty());
            }
        }
    }
}
