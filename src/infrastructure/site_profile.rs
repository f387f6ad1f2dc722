//! NSIS portal profile
//!
//! One versionable table holding everything the automation needs to know
//! about the remote page: URL, selectors, submit keywords, positional field
//! layouts and badge rules. A layout change on the portal is a data update here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::{Badge, FieldKey, LayoutVersion};

/// Default NSIS entry page
pub const NSIS_URL: &str = "https://www.impresa.gov.it/intro/info/news.html";

/// Placeholder written into blank notes so untouched rows stand out
pub const NOTES_PLACEHOLDER: &str = "NOTA USMAF";

/// State reported when the status cell is missing or blank
pub const UNKNOWN_STATE: &str = "UNKNOWN";

/// Status written into synthesized error rows
pub const ERROR_STATE: &str = "ERRORE";

/// One positional cell → named field binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub field: FieldKey,
    pub index: usize,
}

impl FieldSpec {
    pub const fn new(field: FieldKey, index: usize) -> Self {
        Self { field, index }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLayout {
    pub version: LayoutVersion,
    pub fields: Vec<FieldSpec>,
}

impl FieldLayout {
    pub fn legacy7() -> Self {
        Self {
            version: LayoutVersion::Legacy7,
            fields: vec![
                FieldSpec::new(FieldKey::Stato, 2),
                FieldSpec::new(FieldKey::ProtocolloUscita, 3),
                FieldSpec::new(FieldKey::Provvedimento, 4),
                FieldSpec::new(FieldKey::DataProvvedimento, 5),
                FieldSpec::new(FieldKey::CodiceRichiesta, 6),
                FieldSpec::new(FieldKey::NoteUsmaf, 7),
            ],
        }
    }

    pub fn extended11() -> Self {
        Self {
            version: LayoutVersion::Extended11,
            fields: vec![
                FieldSpec::new(FieldKey::Taric, 0),
                FieldSpec::new(FieldKey::Stato, 2),
                FieldSpec::new(FieldKey::ProtocolloIngresso, 3),
                FieldSpec::new(FieldKey::InseritaIl, 4),
                FieldSpec::new(FieldKey::ProtocolloUscita, 5),
                FieldSpec::new(FieldKey::Provvedimento, 6),
                FieldSpec::new(FieldKey::DataProvvedimento, 7),
                FieldSpec::new(FieldKey::CodiceRichiesta, 8),
                FieldSpec::new(FieldKey::TipoPratica, 9),
                FieldSpec::new(FieldKey::NoteUsmaf, 10),
                FieldSpec::new(FieldKey::InvioSud, 11),
            ],
        }
    }

    /// Number of cells a row needs to fill every field
    pub fn width(&self) -> usize {
        self.fields.iter().map(|f| f.index + 1).max().unwrap_or(0)
    }
}

/// Which layout the mapper applies to a scraped row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LayoutSelection {
    /// Pick by cell count
    #[default]
    Auto,
    Fixed(LayoutVersion),
}

impl FromStr for LayoutSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "v7" | "legacy7" => Ok(Self::Fixed(LayoutVersion::Legacy7)),
            "v11" | "extended11" => Ok(Self::Fixed(LayoutVersion::Extended11)),
            other => Err(format!("unknown layout selection '{other}' (expected auto, v7 or v11)")),
        }
    }
}

impl TryFrom<String> for LayoutSelection {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LayoutSelection> for String {
    fn from(selection: LayoutSelection) -> Self {
        selection.to_string()
    }
}

impl fmt::Display for LayoutSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Fixed(version) => write!(f, "{version}"),
        }
    }
}

/// Ordered status rule: first rule with a matching fragment wins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeRule {
    pub badge: Badge,
    pub fragments: Vec<String>,
}

impl BadgeRule {
    fn new(badge: Badge, fragments: &[&str]) -> Self {
        Self {
            badge,
            fragments: fragments.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    pub target_url: String,
    /// Tried in order, first match receives the code
    pub input_selectors: Vec<String>,
    /// Form controls scanned before anchors
    pub control_selector: String,
    pub anchor_selector: String,
    /// Lower-case fragments matched against control text
    pub submit_keywords: Vec<String>,
    pub results_row_selector: String,
    /// Cell index projected into `FetchResult::state`
    pub state_index: usize,
    pub layout: LayoutSelection,
    /// Layout used for empty rows and synthesized error rows
    pub fallback_layout: LayoutVersion,
    pub layouts: Vec<FieldLayout>,
    pub badge_rules: Vec<BadgeRule>,
    pub notes_placeholder: String,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self::nsis()
    }
}

impl SiteProfile {
    pub fn nsis() -> Self {
        Self {
            target_url: NSIS_URL.to_string(),
            input_selectors: vec![
                r#"input[type="text"]"#.to_string(),
                r#"input[name*="codice"]"#.to_string(),
                r#"input[id*="codice"]"#.to_string(),
                r#"input[placeholder*="codice"]"#.to_string(),
            ],
            control_selector: r#"button, input[type="submit"], .btn"#.to_string(),
            anchor_selector: "a".to_string(),
            submit_keywords: vec![
                "cerca".to_string(),
                "search".to_string(),
                "invia".to_string(),
                "submit".to_string(),
            ],
            results_row_selector: "#risultatiConsultazionePratica tbody tr".to_string(),
            state_index: 2,
            layout: LayoutSelection::Auto,
            fallback_layout: LayoutVersion::Extended11,
            layouts: vec![FieldLayout::legacy7(), FieldLayout::extended11()],
            badge_rules: vec![
                BadgeRule::new(Badge::Annullate, &["annullat"]),
                BadgeRule::new(Badge::Aperte, &["apert"]),
                BadgeRule::new(Badge::Chiuse, &["chius"]),
                BadgeRule::new(Badge::InLavorazione, &["lavorazione", "istruttoria"]),
                BadgeRule::new(Badge::Inviate, &["inviat"]),
            ],
            notes_placeholder: NOTES_PLACEHOLDER.to_string(),
        }
    }

    pub fn layout_for_version(&self, version: LayoutVersion) -> Option<&FieldLayout> {
        self.layouts.iter().find(|l| l.version == version)
    }

    /// Resolves the layout for a row of `cell_count` cells.
    ///
    /// `Auto` picks the narrowest layout that covers the row, the widest one
    /// when none does, and the fallback layout for empty rows.
    pub fn layout_for(&self, cell_count: usize) -> Option<&FieldLayout> {
        match self.layout {
            LayoutSelection::Fixed(version) => self.layout_for_version(version),
            LayoutSelection::Auto if cell_count == 0 => self.layout_for_version(self.fallback_layout),
            LayoutSelection::Auto => {
                let mut by_width: Vec<&FieldLayout> = self.layouts.iter().collect();
                by_width.sort_by_key(|l| l.width());
                by_width
                    .iter()
                    .find(|l| l.width() >= cell_count)
                    .or_else(|| by_width.last())
                    .copied()
            }
        }
    }

    pub fn fallback(&self) -> Option<&FieldLayout> {
        self.layout_for_version(self.fallback_layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_layout_widths() {
        assert_eq!(FieldLayout::legacy7().width(), 8);
        assert_eq!(FieldLayout::extended11().width(), 12);
    }

    #[rstest]
    #[case(0, LayoutVersion::Extended11)]
    #[case(3, LayoutVersion::Legacy7)]
    #[case(8, LayoutVersion::Legacy7)]
    #[case(9, LayoutVersion::Extended11)]
    #[case(11, LayoutVersion::Extended11)]
    #[case(20, LayoutVersion::Extended11)]
    fn test_auto_layout_by_cell_count(#[case] cells: usize, #[case] expected: LayoutVersion) {
        let profile = SiteProfile::nsis();
        assert_eq!(profile.layout_for(cells).unwrap().version, expected);
    }

    #[test]
    fn test_fixed_layout_ignores_cell_count() {
        let profile = SiteProfile {
            layout: LayoutSelection::Fixed(LayoutVersion::Legacy7),
            ..SiteProfile::nsis()
        };
        assert_eq!(profile.layout_for(11).unwrap().version, LayoutVersion::Legacy7);
        assert_eq!(profile.layout_for(0).unwrap().version, LayoutVersion::Legacy7);
    }

    #[rstest]
    #[case("auto", LayoutSelection::Auto)]
    #[case("V7", LayoutSelection::Fixed(LayoutVersion::Legacy7))]
    #[case(" extended11 ", LayoutSelection::Fixed(LayoutVersion::Extended11))]
    fn test_layout_selection_parse(#[case] raw: &str, #[case] expected: LayoutSelection) {
        assert_eq!(raw.parse::<LayoutSelection>().unwrap(), expected);
    }

    #[test]
    fn test_layout_selection_rejects_unknown() {
        assert!("v9".parse::<LayoutSelection>().is_err());
    }

    #[test]
    fn test_profile_roundtrips_through_json() {
        let profile = SiteProfile::nsis();
        let json = serde_json::to_string(&profile).unwrap();
        let back: SiteProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn test_partial_profile_uses_defaults() {
        let profile: SiteProfile = serde_json::from_str(r#"{"layout": "v11"}"#).unwrap();
        assert_eq!(profile.layout, LayoutSelection::Fixed(LayoutVersion::Extended11));
        assert_eq!(profile.target_url, NSIS_URL);
        assert_eq!(profile.badge_rules.len(), 5);
    }
}
