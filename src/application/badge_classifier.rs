//! Status → badge classification
//!
//! Substring rules over the lower-cased status, checked in order. The first
//! matching rule wins; nothing matching lands in `eccezioni`.

use crate::domain::{Badge, ProcessingResult};
use crate::infrastructure::site_profile::BadgeRule;

#[derive(Debug, Clone)]
pub struct BadgeClassifier {
    rules: Vec<BadgeRule>,
}

impl BadgeClassifier {
    pub fn new(rules: &[BadgeRule]) -> Self {
        // Pre-lowercase fragments so classification only lowercases the status
        let rules = rules
            .iter()
            .map(|rule| BadgeRule {
                badge: rule.badge,
                fragments: rule
                    .fragments
                    .iter()
                    .map(|f| f.to_lowercase())
                    .filter(|f| !f.is_empty())
                    .collect(),
            })
            .collect();
        Self { rules }
    }

    pub fn classify(&self, status: &str) -> Badge {
        let status = status.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.fragments.iter().any(|f| status.contains(f.as_str())))
            .map_or(Badge::Eccezioni, |rule| rule.badge)
    }

    pub fn classify_result(&self, result: &ProcessingResult) -> Badge {
        self.classify(result.status())
    }
}
