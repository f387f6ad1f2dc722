//! Status badges
//!
//! Six counters summarizing processed codes by status category. Exactly one
//! counter moves per processed code, so the total always equals the number of
//! codes seen since the last reset.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Badge {
    #[serde(rename = "annullate")]
    Annullate,
    #[serde(rename = "aperte")]
    Aperte,
    #[serde(rename = "chiuse")]
    Chiuse,
    #[serde(rename = "inLavorazione")]
    InLavorazione,
    #[serde(rename = "inviate")]
    Inviate,
    #[serde(rename = "eccezioni")]
    Eccezioni,
}

impl Badge {
    pub const ALL: [Self; 6] = [
        Self::Annullate,
        Self::Aperte,
        Self::Chiuse,
        Self::InLavorazione,
        Self::Inviate,
        Self::Eccezioni,
    ];

    /// Key used by the host shell
    pub const fn label(self) -> &'static str {
        match self {
            Self::Annullate => "annullate",
            Self::Aperte => "aperte",
            Self::Chiuse => "chiuse",
            Self::InLavorazione => "inLavorazione",
            Self::Inviate => "inviate",
            Self::Eccezioni => "eccezioni",
        }
    }
}

impl fmt::Display for Badge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeStats {
    #[serde(rename = "annullate")]
    pub cancelled: u32,
    #[serde(rename = "aperte")]
    pub open: u32,
    #[serde(rename = "chiuse")]
    pub closed: u32,
    #[serde(rename = "inLavorazione")]
    pub in_progress: u32,
    #[serde(rename = "inviate")]
    pub sent: u32,
    #[serde(rename = "eccezioni")]
    pub exceptions: u32,
}

impl BadgeStats {
    pub fn increment(&mut self, badge: Badge) {
        *self.slot_mut(badge) += 1;
    }

    pub const fn get(&self, badge: Badge) -> u32 {
        match badge {
            Badge::Annullate => self.cancelled,
            Badge::Aperte => self.open,
            Badge::Chiuse => self.closed,
            Badge::InLavorazione => self.in_progress,
            Badge::Inviate => self.sent,
            Badge::Eccezioni => self.exceptions,
        }
    }

    pub fn total(&self) -> u32 {
        Badge::ALL.iter().map(|b| self.get(*b)).sum()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn slot_mut(&mut self, badge: Badge) -> &mut u32 {
        match badge {
            Badge::Annullate => &mut self.cancelled,
            Badge::Aperte => &mut self.open,
            Badge::Chiuse => &mut self.closed,
            Badge::InLavorazione => &mut self.in_progress,
            Badge::Inviate => &mut self.sent,
            Badge::Eccezioni => &mut self.exceptions,
        }
    }
}

impl fmt::Display for BadgeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = Badge::ALL
            .iter()
            .map(|b| format!("{}={}", b.label(), self.get(*b)))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_moves_one_counter() {
        let mut stats = BadgeStats::default();
        stats.increment(Badge::Aperte);
        stats.increment(Badge::Aperte);
        stats.increment(Badge::Eccezioni);
        assert_eq!(stats.open, 2);
        assert_eq!(stats.exceptions, 1);
        assert_eq!(stats.total(), 3);

        stats.reset();
        assert_eq!(stats.total(), 0);
    }

    #[test]
    fn test_serializes_with_shell_keys() {
        let mut stats = BadgeStats::default();
        stats.increment(Badge::InLavorazione);
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["inLavorazione"], 1);
        assert_eq!(json["annullate"], 0);
        assert_eq!(json.as_object().unwrap().len(), 6);
    }

    #[test]
    fn test_badge_label_matches_serde_name() {
        for badge in Badge::ALL {
            let json = serde_json::to_value(badge).unwrap();
            assert_eq!(json, badge.label());
        }
    }
}
