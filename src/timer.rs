use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running { remaining: Duration },
    /// Reported by exactly one `poll` per started countdown.
    Expired,
}

/// A countdown driven by the caller's clock.
///
/// There is no background tick: the owner polls from its own tick and reacts
/// to `Expired`. `stop` is idempotent for accounting, so a second call (or a
/// call after expiry) yields `Duration::ZERO`.
#[derive(Debug, Clone)]
pub struct Countdown {
    duration: Duration,
    started: Option<Instant>,
}

impl Countdown {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    /// No-op while already running.
    pub fn start(&mut self, now: Instant) {
        if self.started.is_none() {
            self.started = Some(now);
        }
    }

    pub fn stop(&mut self, now: Instant) -> Duration {
        match self.started.take() {
            Some(start) => now.saturating_duration_since(start),
            None => Duration::ZERO,
        }
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        match self.started {
            Some(start) => self
                .duration
                .saturating_sub(now.saturating_duration_since(start)),
            None => self.duration,
        }
    }

    pub fn fraction_remaining(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 0.0;
        }
        (self.remaining(now).as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    pub fn poll(&mut self, now: Instant) -> TimerState {
        if self.started.is_none() {
            return TimerState::Idle;
        }
        let remaining = self.remaining(now);
        if remaining.is_zero() {
            self.stop(now);
            TimerState::Expired
        } else {
            TimerState::Running { remaining }
        }
    }
}

/// Count-up clock for untimed rounds.
#[derive(Debug, Clone, Default)]
pub struct Stopwatch {
    started: Option<Instant>,
    frozen: Option<Duration>,
}

impl Stopwatch {
    pub fn start(&mut self, now: Instant) {
        if self.started.is_none() {
            self.started = Some(now);
            self.frozen = None;
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        if let Some(frozen) = self.frozen {
            return frozen;
        }
        self.started
            .map(|s| now.saturating_duration_since(s))
            .unwrap_or_default()
    }

    pub fn stop(&mut self, now: Instant) -> Duration {
        let elapsed = self.elapsed(now);
        if self.started.is_some() && self.frozen.is_none() {
            self.frozen = Some(elapsed);
        }
        elapsed
    }
}

/// `MM:SS:CC` (minutes, seconds, centiseconds).
pub fn format_clock(d: Duration) -> String {
    let cs = d.as_millis() / 10;
    format!("{:02}:{:02}:{:02}", cs / 6000, (cs / 100) % 60, cs % 100)
}
