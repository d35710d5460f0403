//! Simulated game clock and the wall-clock source used for session triggers.

use chrono::{Datelike, Local, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{HOURS_PER_DAY, MINUTES_PER_HOUR, START_DAY, START_HOUR};

/// Simulated time of day. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GameClock {
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl GameClock {
    #[must_use]
    pub const fn new(day: u32, hour: u32, minute: u32) -> Self {
        Self { day, hour, minute }
    }

    /// Advance by `minutes`, rolling minutes into hours and hours into days.
    pub fn advance(&mut self, minutes: u32) {
        let total = self.minute.saturating_add(minutes);
        self.minute = total % MINUTES_PER_HOUR;
        let hours = self.hour.saturating_add(total / MINUTES_PER_HOUR);
        self.hour = hours % HOURS_PER_DAY;
        self.day = self.day.saturating_add(hours / HOURS_PER_DAY);
    }

    /// Days elapsed since day one.
    #[must_use]
    pub const fn days_passed(&self) -> u32 {
        self.day.saturating_sub(START_DAY)
    }

    #[must_use]
    pub const fn is_top_of_hour(&self) -> bool {
        self.minute == 0
    }
}

impl Default for GameClock {
    fn default() -> Self {
        Self::new(START_DAY, START_HOUR, 0)
    }
}

impl fmt::Display for GameClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Day {} {:02}:{:02}", self.day, self.hour, self.minute)
    }
}

/// Host wall-clock reading consumed by session triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallTime {
    pub hour: u32,
    pub weekend: bool,
}

/// Source of the real time-of-day that decides when a player session may start.
///
/// Sessions are keyed to the host's clock rather than the simulated one.
pub trait SessionClock: fmt::Debug {
    fn now(&self) -> WallTime;
}

/// Reads the local time of the machine running the simulation.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

impl SessionClock for WallClock {
    fn now(&self) -> WallTime {
        let now = Local::now();
        WallTime {
            hour: now.hour(),
            weekend: matches!(now.weekday(), Weekday::Sat | Weekday::Sun),
        }
    }
}

/// Pinned wall time for deterministic runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock {
    time: WallTime,
}

impl FixedClock {
    #[must_use]
    pub const fn new(hour: u32, weekend: bool) -> Self {
        Self {
            time: WallTime { hour, weekend },
        }
    }

    /// An hour that falls outside every default schedule window.
    #[must_use]
    pub const fn idle() -> Self {
        Self::new(3, false)
    }
}

impl SessionClock for FixedClock {
    fn now(&self) -> WallTime {
        self.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_on_day_one_at_eight() {
        let clock = GameClock::default();
        assert_eq!(clock, GameClock::new(1, 8, 0));
        assert_eq!(clock.days_passed(), 0);
        assert_eq!(clock.to_string(), "Day 1 08:00");
    }

    #[test]
    fn advance_rolls_over_hours_and_days() {
        let mut clock = GameClock::new(1, 23, 58);
        clock.advance(3);
        assert_eq!(clock, GameClock::new(2, 0, 1));
        clock.advance(24 * 60 * 2);
        assert_eq!(clock, GameClock::new(4, 0, 1));
        assert_eq!(clock.days_passed(), 3);
    }

    #[test]
    fn fixed_clock_reports_pinned_time() {
        let clock = FixedClock::new(18, true);
        assert_eq!(
            clock.now(),
            WallTime {
                hour: 18,
                weekend: true
            }
        );
    }

    #[test]
    fn wall_clock_hour_is_in_range() {
        assert!(WallClock.now().hour < 24);
    }
}
