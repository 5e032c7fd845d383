//! Channel migration map
//!
//! Grammar: `entry (',' entry)*` with `entry := source ':' target`.
//! Tokens are trimmed and a single trailing comma is tolerated. Empty input
//! is a valid, empty map.

use crate::error::MappingError;
use std::collections::btree_map::{BTreeMap, Entry};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Parsed source channel to target channel mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMap {
    entries: BTreeMap<String, String>,
}

impl ChannelMap {
    /// Parse a `source:target,...` string
    ///
    /// # Errors
    /// One `MappingError` variant per rejected shape: missing separator,
    /// empty source, empty target, self mapping, duplicate source.
    pub fn parse(input: &str) -> Result<Self, MappingError> {
        let mut entries: BTreeMap<String, String> = BTreeMap::new();
        let raw: Vec<&str> = input.split(',').collect();
        let last = raw.len() - 1;

        for (idx, entry) in raw.into_iter().enumerate() {
            let entry = entry.trim();
            if entry.is_empty() {
                // Whole input blank, or trailing comma
                if idx == last {
                    continue;
                }
                return Err(MappingError::InvalidFormat {
                    entry: entry.to_string(),
                });
            }

            let (source, target) = split_entry(entry)?;

            if source == target {
                return Err(MappingError::SelfMapping {
                    channel: source.to_string(),
                });
            }

            match entries.entry(source.to_string()) {
                Entry::Occupied(existing) => {
                    return Err(MappingError::DuplicateSource {
                        channel: source.to_string(),
                        first: existing.get().clone(),
                        second: target.to_string(),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(target.to_string());
                }
            }
        }

        Ok(Self { entries })
    }

    /// Target channel for `source`
    #[inline]
    #[must_use]
    pub fn target_for(&self, source: &str) -> Option<&str> {
        self.entries.get(source).map(String::as_str)
    }

    /// Every channel named on either side, deduplicated and sorted
    #[must_use]
    pub fn channels(&self) -> BTreeSet<&str> {
        self.entries
            .iter()
            .flat_map(|(s, t)| [s.as_str(), t.as_str()])
            .collect()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(s, t)| (s.as_str(), t.as_str()))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn split_entry(entry: &str) -> Result<(&str, &str), MappingError> {
    let invalid = || MappingError::InvalidFormat {
        entry: entry.to_string(),
    };

    let (source, target) = entry.split_once(':').ok_or_else(invalid)?;
    if target.contains(':') {
        return Err(invalid());
    }

    let (source, target) = (source.trim(), target.trim());
    if source.is_empty() {
        return Err(MappingError::EmptySource {
            entry: entry.to_string(),
        });
    }
    if target.is_empty() {
        return Err(MappingError::EmptyTarget {
            entry: entry.to_string(),
        });
    }
    Ok((source, target))
}

impl FromStr for ChannelMap {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ChannelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (source, target) in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{source}:{target}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn pairs(map: &ChannelMap) -> Vec<(&str, &str)> {
        map.iter().collect()
    }

    #[test]
    fn parses_multiple_entries() {
        let map = ChannelMap::parse("stable-v5:stable-v6,rapid-v5:rapid-v6").unwrap();
        assert_eq!(
            pairs(&map),
            vec![("rapid-v5", "rapid-v6"), ("stable-v5", "stable-v6")]
        );
        assert_eq!(map.target_for("stable-v5"), Some("stable-v6"));
        assert_eq!(map.target_for("stable-v6"), None);
    }

    #[test]
    fn tolerates_whitespace_and_trailing_comma() {
        let map = ChannelMap::parse("  stable-v5 : stable-v6 , rapid-v5:rapid-v6 , ").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.target_for("stable-v5"), Some("stable-v6"));
    }

    #[test]
    fn empty_input_is_empty_map() {
        assert!(ChannelMap::parse("").unwrap().is_empty());
        assert!(ChannelMap::parse("   ").unwrap().is_empty());
    }

    #[test]
    fn rejects_each_invalid_shape_distinctly() {
        assert!(matches!(
            ChannelMap::parse("a:a"),
            Err(MappingError::SelfMapping { channel }) if channel == "a"
        ));
        assert!(matches!(ChannelMap::parse(":b"), Err(MappingError::EmptySource { .. })));
        assert!(matches!(ChannelMap::parse("a:"), Err(MappingError::EmptyTarget { .. })));
        assert!(matches!(
            ChannelMap::parse("a:b,a:c"),
            Err(MappingError::DuplicateSource { channel, first, second })
                if channel == "a" && first == "b" && second == "c"
        ));
        assert!(matches!(
            ChannelMap::parse("no-colon"),
            Err(MappingError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn rejects_extra_separators_and_inner_blanks() {
        assert!(matches!(
            ChannelMap::parse("a:b:c"),
            Err(MappingError::InvalidFormat { .. })
        ));
        assert!(matches!(
            ChannelMap::parse("a:b,,c:d"),
            Err(MappingError::InvalidFormat { .. })
        ));
        assert!(matches!(
            ChannelMap::parse("a:b,,"),
            Err(MappingError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn channels_lists_both_sides_once() {
        let map = ChannelMap::parse("a:b,c:b").unwrap();
        assert_eq!(map.channels().into_iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn display_is_canonical() {
        let map: ChannelMap = " b:c , a:d,".parse().unwrap();
        assert_eq!(map.to_string(), "a:d,b:c");
    }

    proptest! {
        #[test]
        fn prop_canonical_form_reparses(
            entries in prop::collection::btree_map("[a-z][a-z0-9-]{0,8}", "[A-Z][A-Z0-9]{0,8}", 0..6)
        ) {
            // Sources are lowercase, targets uppercase: never self-mapped
            let raw = entries
                .iter()
                .map(|(s, t)| format!(" {s} : {t} "))
                .collect::<Vec<_>>()
                .join(",");

            let map = ChannelMap::parse(&raw).unwrap();
            prop_assert_eq!(map.len(), entries.len());
            for (s, t) in &entries {
                prop_assert_eq!(map.target_for(s), Some(t.as_str()));
            }
            prop_assert_eq!(ChannelMap::parse(&map.to_string()).unwrap(), map);
        }

        #[test]
        fn prop_entries_without_separator_rejected(token in "[a-z0-9-]{1,12}") {
            prop_assert!(
                matches!(
                    ChannelMap::parse(&token),
                    Err(MappingError::InvalidFormat { .. })
                ),
                "expected InvalidFormat"
            );
        }
    }
}
