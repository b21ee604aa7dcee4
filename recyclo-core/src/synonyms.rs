//! Fallback matching policy: which accepted-items terms stand in for a label.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Default cap on fallback results for labels without their own limit.
pub const DEFAULT_FALLBACK_LIMIT: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Extra search terms and an optional result cap for one label.
pub struct SynonymRule {
    /// Terms searched alongside the label itself.
    #[serde(default)]
    pub terms: Vec<String>,
    /// Maximum number of fallback centers returned for the label.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SynonymRule {
    /// Build a rule from terms and an optional cap.
    #[must_use]
    pub fn new<I, S>(terms: I, limit: Option<usize>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            terms: terms.into_iter().map(Into::into).collect(),
            limit,
        }
    }
}

/// Registry of fallback rules keyed by classifier label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynonymMap {
    default_limit: usize,
    rules: HashMap<String, SynonymRule>,
}

impl SynonymMap {
    /// Build a map from `(label, rule)` pairs.
    #[must_use]
    pub fn new<I>(default_limit: usize, rules: I) -> Self
    where
        I: IntoIterator<Item = (String, SynonymRule)>,
    {
        Self {
            default_limit,
            rules: rules.into_iter().collect(),
        }
    }

    /// Policy shipped with the application.
    ///
    /// Pens get a wider cap because almost every generic drop-off point accepts them.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(
            DEFAULT_FALLBACK_LIMIT,
            [
                ("pen".to_owned(), SynonymRule::new(["writing implement"], Some(5))),
                (
                    "coffee cup".to_owned(),
                    SynonymRule::new(["paper cup", "disposable cup"], None),
                ),
                (
                    "paper cup".to_owned(),
                    SynonymRule::new(["disposable cup", "paper"], None),
                ),
            ],
        )
    }

    /// Same rules with a different cap for labels that have no limit of their own.
    #[must_use]
    pub fn with_default_limit(self, default_limit: usize) -> Self {
        Self {
            default_limit,
            ..self
        }
    }

    /// Search terms for a label: the label first, then its synonyms without repeats.
    ///
    /// Returns `None` when the label has no rule, in which case no fallback search runs.
    #[must_use]
    pub fn terms_for(&self, label: &str) -> Option<Vec<String>> {
        let rule = self.rules.get(label)?;
        let mut terms: Vec<String> = Vec::with_capacity(rule.terms.len() + 1);
        for term in std::iter::once(label).chain(rule.terms.iter().map(String::as_str)) {
            let trimmed = term.trim();
            if trimmed.is_empty() {
                continue;
            }
            let lowered = trimmed.to_lowercase();
            if terms.iter().any(|known| known.to_lowercase() == lowered) {
                continue;
            }
            terms.push(trimmed.to_owned());
        }
        Some(terms)
    }

    /// Fallback cap for a label.
    #[must_use]
    pub fn limit_for(&self, label: &str) -> usize {
        self.rules
            .get(label)
            .and_then(|rule| rule.limit)
            .unwrap_or(self.default_limit)
    }
}

impl Default for SynonymMap {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_terms_start_with_label() {
        let map = SynonymMap::builtin();
        assert_eq!(
            map.terms_for("coffee cup"),
            Some(vec![
                "coffee cup".to_owned(),
                "paper cup".to_owned(),
                "disposable cup".to_owned(),
            ])
        );
        assert_eq!(map.terms_for("unknown-object"), None);
    }

    #[test]
    fn pen_cap_differs_from_default() {
        let map = SynonymMap::builtin();
        assert_eq!(map.limit_for("pen"), 5);
        assert_eq!(map.limit_for("paper cup"), 3);
        assert_eq!(map.limit_for("unknown-object"), 3);
    }

    #[test]
    fn duplicate_and_blank_terms_are_dropped() {
        let map = SynonymMap::new(
            2,
            [(
                "Can".to_owned(),
                SynonymRule::new(["can", " ", "tin can"], None),
            )],
        );
        assert_eq!(
            map.terms_for("Can"),
            Some(vec!["Can".to_owned(), "tin can".to_owned()])
        );
        assert_eq!(map.limit_for("Can"), 2);
    }
}
