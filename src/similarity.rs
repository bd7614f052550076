//! Pairwise string similarity between name parts.
//!
//! Every scorer returns a value in `[0, 1]` where higher means more similar;
//! the blocking policies rely on that direction.

use serde::{Deserialize, Serialize};
use strsim::{
    jaro, jaro_winkler, normalized_damerau_levenshtein, normalized_levenshtein, sorensen_dice,
};

/// Scores how alike two name parts are.
pub trait SimilarityScorer: Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

impl<F> SimilarityScorer for F
where
    F: Fn(&str, &str) -> f64 + Sync,
{
    fn similarity(&self, a: &str, b: &str) -> f64 {
        self(a, b)
    }
}

/// Built-in metrics backed by `strsim`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Prefix-weighted Jaro; tolerant of transliteration noise like "Zygmund"/"Zigmund".
    #[default]
    JaroWinkler,
    Jaro,
    /// `1 - levenshtein / max_len`.
    Levenshtein,
    DamerauLevenshtein,
    /// Bigram overlap.
    SorensenDice,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JaroWinkler => "jaro_winkler",
            Self::Jaro => "jaro",
            Self::Levenshtein => "levenshtein",
            Self::DamerauLevenshtein => "damerau_levenshtein",
            Self::SorensenDice => "sorensen_dice",
        }
    }
}

impl SimilarityScorer for Metric {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        match self {
            Self::JaroWinkler => jaro_winkler(a, b),
            Self::Jaro => jaro(a, b),
            Self::Levenshtein => normalized_levenshtein(a, b),
            Self::DamerauLevenshtein => normalized_damerau_levenshtein(a, b),
            Self::SorensenDice => sorensen_dice(a, b),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jaro_winkler" => Ok(Self::JaroWinkler),
            "jaro" => Ok(Self::Jaro),
            "levenshtein" => Ok(Self::Levenshtein),
            "damerau_levenshtein" => Ok(Self::DamerauLevenshtein),
            "sorensen_dice" => Ok(Self::SorensenDice),
            other => Err(format!("unknown similarity metric '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Metric; 5] = [
        Metric::JaroWinkler,
        Metric::Jaro,
        Metric::Levenshtein,
        Metric::DamerauLevenshtein,
        Metric::SorensenDice,
    ];

    #[test]
    fn test_identity() {
        for metric in ALL {
            assert!((metric.similarity("Zygmund", "Zygmund") - 1.0).abs() < 1e-9, "{metric}");
        }
    }

    #[test]
    fn test_empty_strings_defined() {
        for metric in ALL {
            let score = metric.similarity("", "");
            assert!((0.0..=1.0).contains(&score), "{metric}");
        }
    }

    #[test]
    fn test_symmetric() {
        for metric in ALL {
            let ab = metric.similarity("Ehrlich", "Ehriykh");
            let ba = metric.similarity("Ehriykh", "Ehrlich");
            assert!((ab - ba).abs() < 1e-9, "{metric}");
        }
    }

    #[test]
    fn test_transliteration_noise() {
        let jw = Metric::JaroWinkler;
        assert!(jw.similarity("Zigmund", "Zygmund") > 0.7);
        assert!(jw.similarity("Ehrlich", "Ehriykh") > 0.7);
        assert!(jw.similarity("Zigmund", "Zygmund") > jw.similarity("Zigmund", "Levi"));
    }

    #[test]
    fn test_prefix_weighting() {
        // Same edit, earlier vs later in the string.
        let jw = Metric::JaroWinkler;
        let late = jw.similarity("Abramowicz", "Abramowitz");
        let early = jw.similarity("Abramowicz", "Ebramowicz");
        assert!(late > early);
    }

    #[test]
    fn test_closure_scorer() {
        let exact = |a: &str, b: &str| if a == b { 1.0 } else { 0.0 };
        assert_eq!(exact.similarity("Anna", "Anna"), 1.0);
        assert_eq!(exact.similarity("Anna", "Hanna"), 0.0);
    }

    #[test]
    fn test_metric_names_parse_back() {
        for metric in ALL {
            assert_eq!(metric.name().parse::<Metric>(), Ok(metric));
        }
        assert!("cosine".parse::<Metric>().is_err());
    }
}
