//! Audio cues.
//!
//! Drop `flip.wav`, `correct.wav`, `win.wav`, `lose.wav` and
//! `notification.wav` (or `.mp3`) into `<data dir>/audio/`. Playback needs the
//! `sound` cargo feature; without it only the terminal bell is available.

use std::cell::RefCell;
use std::io::Write;
use std::path::PathBuf;

use crate::config::{audio_dir, get_settings};

// ── Cue catalogue ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    Flip,
    Correct,
    Win,
    Lose,
    Notification,
}

impl Cue {
    pub fn file_stem(self) -> &'static str {
        match self {
            Cue::Flip => "flip",
            Cue::Correct => "correct",
            Cue::Win => "win",
            Cue::Lose => "lose",
            Cue::Notification => "notification",
        }
    }
}

/// Fire-and-forget playback. Implementations swallow every failure.
pub trait AudioPort {
    fn play(&self, cue: Cue);
}

// ── Implementations ───────────────────────────────────────────────────────────

pub struct Silent;

impl AudioPort for Silent {
    fn play(&self, _cue: Cue) {}
}

pub struct SoundPlayer {
    dir: PathBuf,
}

impl SoundPlayer {
    pub fn new() -> Self {
        Self { dir: audio_dir() }
    }

    fn file_for(&self, cue: Cue) -> Option<PathBuf> {
        ["wav", "mp3"]
            .iter()
            .map(|ext| self.dir.join(format!("{}.{ext}", cue.file_stem())))
            .find(|p| p.is_file())
    }
}

impl Default for SoundPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioPort for SoundPlayer {
    fn play(&self, cue: Cue) {
        if !get_settings().sound {
            return;
        }
        match self.file_for(cue) {
            Some(path) => spawn_playback(cue, path),
            None => ring_bell(cue),
        }
    }
}

#[cfg(feature = "sound")]
fn spawn_playback(cue: Cue, path: PathBuf) {
    std::thread::spawn(move || {
        if let Err(err) = play_file(&path) {
            tracing::debug!(?cue, %err, "audio playback failed");
        }
    });
}

#[cfg(not(feature = "sound"))]
fn spawn_playback(cue: Cue, _path: PathBuf) {
    ring_bell(cue);
}

#[cfg(feature = "sound")]
fn play_file(path: &std::path::Path) -> anyhow::Result<()> {
    use rodio::{Decoder, OutputStream, Sink};

    // Dropping the stream stops audio, so it lives until the sink drains.
    let (_stream, handle) = OutputStream::try_default()?;
    let sink = Sink::try_new(&handle)?;
    let file = std::io::BufReader::new(std::fs::File::open(path)?);
    sink.append(Decoder::new(file)?);
    sink.sleep_until_end();
    Ok(())
}

/// Terminal bell for the cues that matter without audio files.
fn ring_bell(cue: Cue) {
    if matches!(cue, Cue::Win | Cue::Lose | Cue::Notification) {
        let mut out = std::io::stdout();
        let _ = out.write_all(b"\x07");
        let _ = out.flush();
    }
}

/// Test fake that remembers every cue.
#[derive(Default)]
pub struct RecordingAudio {
    played: RefCell<Vec<Cue>>,
}

impl RecordingAudio {
    pub fn cues(&self) -> Vec<Cue> {
        self.played.borrow().clone()
    }
}

impl AudioPort for RecordingAudio {
    fn play(&self, cue: Cue) {
        self.played.borrow_mut().push(cue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_audio_keeps_order() {
        let audio = RecordingAudio::default();
        audio.play(Cue::Flip);
        audio.play(Cue::Win);
        assert_eq!(audio.cues(), vec![Cue::Flip, Cue::Win]);
    }

    #[test]
    fn sound_player_prefers_wav_over_mp3() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("win.mp3"), b"x").unwrap();
        std::fs::write(dir.path().join("win.wav"), b"x").unwrap();
        std::fs::write(dir.path().join("lose.mp3"), b"x").unwrap();
        let player = SoundPlayer {
            dir: dir.path().to_path_buf(),
        };
        assert_eq!(player.file_for(Cue::Win), Some(dir.path().join("win.wav")));
        assert_eq!(player.file_for(Cue::Lose), Some(dir.path().join("lose.mp3")));
        assert_eq!(player.file_for(Cue::Flip), None);
    }
}
