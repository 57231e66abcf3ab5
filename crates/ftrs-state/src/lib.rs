//! The replicated application state: an integer sum with one operation.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// The text failed to parse as a [`State`].
#[derive(Debug, Error)]
#[error("invalid state text: {0:?}")]
pub struct ParseStateError(String);

/// An accumulating integer sum, replicated across the group.
///
/// `update` is the only mutator; every replica that applies the same
/// sequence of updates converges on the same value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct State {
    sum: i64,
}

impl State {
    /// A fresh state with `sum = 0`.
    pub fn new() -> Self {
        Self { sum: 0 }
    }

    /// The current sum.
    pub fn value(&self) -> i64 {
        self.sum
    }

    /// Applies `S := S + v` and returns the new sum.
    pub fn update(&mut self, v: i64) -> i64 {
        self.sum += v;
        self.sum
    }

    /// Replays a sequence of buffered requests in order.
    pub fn replay(&mut self, log: &[i64]) {
        for &v in log {
            self.update(v);
        }
    }

    /// Serialises the sum as decimal text.
    pub fn to_text(&self) -> String {
        self.sum.to_string()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sum)
    }
}

impl FromStr for State {
    type Err = ParseStateError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        text.trim()
            .parse::<i64>()
            .map(|sum| Self { sum })
            .map_err(|_| ParseStateError(text.to_string()))
    }
}

impl From<i64> for State {
    fn from(sum: i64) -> Self {
        Self { sum }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn fresh_state_is_zero() {
        assert_eq!(State::new().value(), 0);
    }

    #[test_case(&[3, 7, 2], 12; "three positive updates")]
    #[test_case(&[], 0; "no updates")]
    #[test_case(&[-5, 5], 0; "cancelling updates")]
    fn state_law(updates: &[i64], expected: i64) {
        let mut state = State::new();
        for &v in updates {
            state.update(v);
        }
        assert_eq!(state.value(), expected);
    }

    #[test]
    fn update_returns_running_sum() {
        let mut state = State::new();
        assert_eq!(state.update(3), 3);
        assert_eq!(state.update(7), 10);
        assert_eq!(state.update(2), 12);
    }

    #[test]
    fn text_round_trips() {
        let state: State = "42".parse().unwrap();
        assert_eq!(state.value(), 42);
        assert_eq!(state.to_text(), "42");
    }

    #[test]
    fn replay_applies_log_in_order() {
        let mut state: State = "10".parse().unwrap();
        state.replay(&[1, 2, 3]);
        assert_eq!(state.value(), 16);
    }

    #[test]
    fn garbage_text_is_rejected() {
        assert!("not-a-number".parse::<State>().is_err());
    }

    proptest::proptest! {
        #[test]
        fn state_law_matches_plain_sum(updates in proptest::collection::vec(-1000i64..1000, 0..50)) {
            let mut state = State::new();
            for &v in &updates {
                state.update(v);
            }
            let expected: i64 = updates.iter().sum();
            proptest::prop_assert_eq!(state.value(), expected);
        }
    }
}
