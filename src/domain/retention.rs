use crate::domain::message::{INITIAL_RATING, Message, Vote};
use time::{Duration, OffsetDateTime};

/// How many votes a message must keep earning to stay in the feed.
///
/// A message younger than `period` is exempt. From then on its quota is
/// `age / period * votes_per_period`, counted over a trailing window of at
/// most one `period`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetentionPolicy {
    pub period: Duration,
    pub votes_per_period: f64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { period: Duration::HOUR, votes_per_period: 5.0 }
    }
}

/// Outcome of judging one message at one instant.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    /// Too new to judge.
    Exempt,
    /// Fell short of its quota.
    Evict { within_window: usize, quota: f64 },
    /// Met its quota; `votes` holds only the votes inside the window.
    Retain { votes: Vec<Vote>, pruned: usize, rating: f64 },
}

impl RetentionPolicy {
    #[must_use]
    pub fn vote_quota(&self, age: Duration) -> f64 {
        if age < self.period {
            return 0.0;
        }
        age.as_seconds_f64() / self.period.as_seconds_f64() * self.votes_per_period
    }

    #[must_use]
    pub fn window(&self, age: Duration) -> Duration {
        age.min(self.period).max(Duration::ZERO)
    }

    /// Judges `message` as of `now`. `now` is taken once by the caller so the
    /// quota and the window agree.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn evaluate(&self, message: &Message, now: OffsetDateTime) -> Verdict {
        let age = message.age_at(now);
        let quota = self.vote_quota(age);
        if quota <= 0.0 {
            return Verdict::Exempt;
        }

        let window_start = now - self.window(age);
        let (votes, expired): (Vec<Vote>, Vec<Vote>) =
            message.votes.iter().cloned().partition(|v| v.cast_at >= window_start);

        let within_window = votes.len();
        if (within_window as f64) < quota {
            return Verdict::Evict { within_window, quota };
        }

        Verdict::Retain { rating: rating_for_surplus(within_window, quota), votes, pruned: expired.len() }
    }
}

/// Maps the votes a message holds over its quota onto the 1..=10 scale.
///
/// Bands are searched from k = 9 down to 1 and the first band cleared wins,
/// so anything more than a ninth over quota already rates 10.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rating_for_surplus(within_window: usize, quota: f64) -> f64 {
    let within = within_window as f64;
    (1..=9u8)
        .rev()
        .find(|&k| within > quota + quota / f64::from(k))
        .map_or(INITIAL_RATING, |k| f64::from(k) + 1.0)
}
