//! Search Filter Engine
//!
//! Stateless evaluation of search criteria against lobby metadata.
//! Criteria accumulate between searches and are snapshotted atomically
//! when a search begins (see `search`), so evaluation here only ever sees
//! an immutable list.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::lobby::state::Lobby;

/// Comparison operator attached to a criterion.
///
/// Only `Equal` affects the include/exclude outcome on this protocol
/// surface; the other operators are accepted and recorded but evaluate
/// as "no constraint".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    /// value ≤ test
    EqualToOrLessThan,
    /// value < test
    LessThan,
    /// value = test
    Equal,
    /// value > test
    GreaterThan,
    /// value ≥ test
    EqualToOrGreaterThan,
    /// value ≠ test
    NotEqual,
}

/// What a criterion tests the metadata value against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FilterTest {
    /// Exact string comparison.
    Text(String),
    /// Numeric comparison after parsing the metadata value.
    Number(i64),
}

/// One search criterion over lobby metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    /// Metadata key, looked up case-insensitively.
    pub key: String,
    /// Comparison operator.
    pub comparison: Comparison,
    /// Test value.
    pub test: FilterTest,
}

impl Criterion {
    /// String-equality criterion.
    pub fn text(key: &str, value: &str, comparison: Comparison) -> Self {
        Self {
            key: key.to_owned(),
            comparison,
            test: FilterTest::Text(value.to_owned()),
        }
    }

    /// Numeric criterion.
    pub fn number(key: &str, value: i64, comparison: Comparison) -> Self {
        Self {
            key: key.to_owned(),
            comparison,
            test: FilterTest::Number(value),
        }
    }

    /// Evaluate this criterion against one lobby's metadata.
    pub fn matches(&self, lobby: &Lobby) -> bool {
        let value = lobby.metadata.get(&self.key);

        if self.comparison != Comparison::Equal {
            debug!(key = %self.key, comparison = ?self.comparison, "unsupported comparator, not constraining");
            return true;
        }

        let Some(value) = value else {
            // Missing key fails an equality test.
            return false;
        };

        match &self.test {
            FilterTest::Text(test) => value == test,
            FilterTest::Number(test) => match parse_metadata_int(value) {
                Some(parsed) => parsed == *test,
                None => false,
            },
        }
    }
}

/// Parse a metadata value as an integer. Empty parses as 0; anything
/// non-numeric is a parse failure and the criterion excludes the lobby.
fn parse_metadata_int(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Some(0);
    }
    trimmed.parse::<i64>().ok()
}

/// Evaluate an entire criteria list. Empty list matches everything.
pub fn matches_all(lobby: &Lobby, criteria: &[Criterion]) -> bool {
    criteria.iter().all(|c| c.matches(lobby))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::id::{AppId, PeerId, RoomId};
    use crate::lobby::state::LobbyKind;
    use proptest::prelude::*;

    fn lobby_with(pairs: &[(&str, &str)]) -> Lobby {
        let mut lobby = Lobby::new(
            RoomId::new(1),
            PeerId::new(1),
            LobbyKind::Public,
            0,
            AppId::new(480),
        );
        lobby.add_member(PeerId::new(1));
        for (k, v) in pairs {
            lobby.metadata.set(k, v);
        }
        lobby
    }

    #[test]
    fn string_equal_is_case_insensitive_on_key_only() {
        let lobby = lobby_with(&[("Mode", "FFA")]);
        assert!(Criterion::text("mode", "FFA", Comparison::Equal).matches(&lobby));
        assert!(!Criterion::text("mode", "ffa", Comparison::Equal).matches(&lobby));
    }

    #[test]
    fn missing_key_fails_equality() {
        let lobby = lobby_with(&[]);
        assert!(!Criterion::text("mode", "FFA", Comparison::Equal).matches(&lobby));
        assert!(!Criterion::number("slots", 2, Comparison::Equal).matches(&lobby));
    }

    #[test]
    fn numeric_equal_parses_value() {
        let lobby = lobby_with(&[("slots", "2")]);
        assert!(Criterion::number("slots", 2, Comparison::Equal).matches(&lobby));
        assert!(!Criterion::number("slots", 3, Comparison::Equal).matches(&lobby));
    }

    #[test]
    fn empty_value_parses_as_zero() {
        let lobby = lobby_with(&[("slots", "")]);
        assert!(Criterion::number("slots", 0, Comparison::Equal).matches(&lobby));
    }

    #[test]
    fn unparsable_value_excludes() {
        let lobby = lobby_with(&[("slots", "two")]);
        assert!(!Criterion::number("slots", 2, Comparison::Equal).matches(&lobby));
        assert!(!Criterion::number("slots", 0, Comparison::Equal).matches(&lobby));
    }

    #[test]
    fn non_equal_comparators_do_not_constrain() {
        let lobby = lobby_with(&[("slots", "5")]);
        assert!(Criterion::number("slots", 2, Comparison::LessThan).matches(&lobby));
        assert!(Criterion::text("mode", "x", Comparison::NotEqual).matches(&lobby));
    }

    #[test]
    fn all_criteria_must_pass() {
        let lobby = lobby_with(&[("mode", "ffa"), ("slots", "2")]);
        let criteria = vec![
            Criterion::text("mode", "ffa", Comparison::Equal),
            Criterion::number("slots", 2, Comparison::Equal),
        ];
        assert!(matches_all(&lobby, &criteria));

        let criteria = vec![
            Criterion::text("mode", "ffa", Comparison::Equal),
            Criterion::number("slots", 3, Comparison::Equal),
        ];
        assert!(!matches_all(&lobby, &criteria));
    }

    proptest! {
        #[test]
        fn numeric_equal_agrees_with_parse(n in -1000i64..1000) {
            let lobby = lobby_with(&[("slots", &n.to_string())]);
            prop_assert!(Criterion::number("slots", n, Comparison::Equal).matches(&lobby));
            prop_assert!(!Criterion::number("slots", n + 1, Comparison::Equal).matches(&lobby));
        }

        #[test]
        fn empty_criteria_match_any_lobby(key in "[a-z]{1,6}", value in "[a-z0-9]{0,6}") {
            let lobby = lobby_with(&[(key.as_str(), value.as_str())]);
            prop_assert!(matches_all(&lobby, &[]));
        }
    }
}
