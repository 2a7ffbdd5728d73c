//! Comparison of a probe encoding against the known encodings.
//!
//! Two policies are available. [`FirstMatch`] reports the first known
//! encoding within the threshold, in cache order, which is how the tool has
//! always behaved. [`BestMatch`] reports the closest one.

use crate::types::Encoding;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result of matching a probe encoding against the known set.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Index of the chosen known encoding, if one is within the threshold.
    pub index: Option<usize>,
    /// Distance to the chosen encoding, or to the closest one when nothing
    /// matched. `f32::INFINITY` for an empty known set.
    pub distance: f32,
}

impl MatchResult {
    pub fn matched(&self) -> bool {
        self.index.is_some()
    }
}

/// Strategy for comparing a probe encoding against the known encodings.
pub trait Matcher {
    fn compare(&self, probe: &Encoding, known: &[Encoding], threshold: f32) -> MatchResult;
}

/// Per-entry match predicate: `true` where the distance is within `threshold`.
pub fn compare_faces(known: &[Encoding], probe: &Encoding, threshold: f32) -> Vec<bool> {
    known
        .iter()
        .map(|candidate| candidate.distance(probe) <= threshold)
        .collect()
}

fn closest(probe: &Encoding, known: &[Encoding]) -> Option<(usize, f32)> {
    known
        .iter()
        .enumerate()
        .map(|(i, candidate)| (i, candidate.distance(probe)))
        .fold(None, |best, (i, d)| match best {
            Some((_, best_d)) if best_d <= d => best,
            _ => Some((i, d)),
        })
}

/// First known encoding within the threshold wins.
pub struct FirstMatch;

impl Matcher for FirstMatch {
    fn compare(&self, probe: &Encoding, known: &[Encoding], threshold: f32) -> MatchResult {
        let matches = compare_faces(known, probe, threshold);
        match matches.iter().position(|&m| m) {
            Some(idx) => MatchResult {
                index: Some(idx),
                distance: known[idx].distance(probe),
            },
            None => MatchResult {
                index: None,
                distance: closest(probe, known).map_or(f32::INFINITY, |(_, d)| d),
            },
        }
    }
}

/// Closest known encoding wins, if it is within the threshold.
///
/// Ties keep the earliest entry.
pub struct BestMatch;

impl Matcher for BestMatch {
    fn compare(&self, probe: &Encoding, known: &[Encoding], threshold: f32) -> MatchResult {
        match closest(probe, known) {
            Some((idx, distance)) if distance <= threshold => MatchResult {
                index: Some(idx),
                distance,
            },
            Some((_, distance)) => MatchResult { index: None, distance },
            None => MatchResult {
                index: None,
                distance: f32::INFINITY,
            },
        }
    }
}

/// Configurable choice of [`Matcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    #[default]
    First,
    Best,
}

impl MatchPolicy {
    pub fn matcher(self) -> Box<dyn Matcher + Send> {
        match self {
            MatchPolicy::First => Box::new(FirstMatch),
            MatchPolicy::Best => Box::new(BestMatch),
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPolicy::First => f.write_str("first"),
            MatchPolicy::Best => f.write_str("best"),
        }
    }
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(MatchPolicy::First),
            "best" => Ok(MatchPolicy::Best),
            other => Err(format!("unknown match policy {other:?} (expected \"first\" or \"best\")")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(values: &[f32]) -> Encoding {
        Encoding::new(values.to_vec())
    }

    fn gallery() -> Vec<Encoding> {
        vec![
            enc(&[0.0, 1.0]), // far
            enc(&[0.9, 0.1]), // within threshold, not closest
            enc(&[1.0, 0.0]), // exact
        ]
    }

    #[test]
    fn test_compare_faces_predicates() {
        let probe = enc(&[1.0, 0.0]);
        assert_eq!(compare_faces(&gallery(), &probe, 0.5), vec![false, true, true]);
    }

    #[test]
    fn test_first_match_takes_earliest_hit() {
        let probe = enc(&[1.0, 0.0]);
        let result = FirstMatch.compare(&probe, &gallery(), 0.5);
        assert_eq!(result.index, Some(1));
        assert!(result.distance > 0.0);
    }

    #[test]
    fn test_best_match_takes_closest() {
        let probe = enc(&[1.0, 0.0]);
        let result = BestMatch.compare(&probe, &gallery(), 0.5);
        assert_eq!(result.index, Some(2));
        assert!(result.distance.abs() < 1e-6);
    }

    #[test]
    fn test_no_match_reports_closest_distance() {
        let probe = enc(&[-1.0, 0.0]);
        for matcher in [MatchPolicy::First.matcher(), MatchPolicy::Best.matcher()] {
            let result = matcher.compare(&probe, &gallery(), 0.5);
            assert!(!result.matched());
            assert!((result.distance - 2.0f32.sqrt()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_empty_known_set() {
        let probe = enc(&[1.0, 0.0]);
        let result = FirstMatch.compare(&probe, &[], 0.5);
        assert!(!result.matched());
        assert_eq!(result.distance, f32::INFINITY);
        assert_eq!(BestMatch.compare(&probe, &[], 0.5), result);
    }

    #[test]
    fn test_repeated_compare_is_deterministic() {
        let probe = enc(&[0.95, 0.05]);
        let first = FirstMatch.compare(&probe, &gallery(), 0.5);
        for _ in 0..10 {
            assert_eq!(FirstMatch.compare(&probe, &gallery(), 0.5), first);
        }
    }

    #[test]
    fn test_repeated_best_compare_is_deterministic() {
        // Two entries at exactly the same distance: the earlier one wins.
        let tied = vec![enc(&[0.0, 1.0]), enc(&[1.0, 0.0]), enc(&[1.0, 0.0])];
        let query = enc(&[0.9, 0.1]);
        let best = BestMatch.compare(&query, &tied, 0.5);
        assert_eq!(best.index, Some(1));
        for _ in 0..10 {
            assert_eq!(BestMatch.compare(&query, &tied, 0.5), best);
            assert_eq!(MatchPolicy::Best.matcher().compare(&query, &tied, 0.5), best);
        }
    }

    #[test]
    fn test_policy_parse_and_display() {
        assert_eq!("first".parse::<MatchPolicy>().unwrap(), MatchPolicy::First);
        assert_eq!(" BEST ".parse::<MatchPolicy>().unwrap(), MatchPolicy::Best);
        assert!("nearest".parse::<MatchPolicy>().is_err());
        assert_eq!(MatchPolicy::Best.to_string(), "best");
    }
}
