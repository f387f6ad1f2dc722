//! Scraped cells → named record
//!
//! Pure positional mapping driven by a [`FieldLayout`] table. Two rules apply
//! on top of the table: the result-code field falls back to the input code and
//! a blank notes field gets the placeholder text.

use std::sync::Arc;

use crate::domain::{Code, FieldKey, LayoutVersion, ProcessingResult};
use crate::infrastructure::site_profile::{ERROR_STATE, FieldLayout, SiteProfile};

pub fn map_cells_to_result(layout: &FieldLayout, code: &Code, cells: &[String], notes_placeholder: &str) -> ProcessingResult {
    let fields = layout
        .fields
        .iter()
        .map(|spec| {
            let raw = cells.get(spec.index).map(|c| c.trim()).unwrap_or_default();
            let value = match spec.field {
                FieldKey::CodiceRichiesta if raw.is_empty() => code.as_str(),
                FieldKey::NoteUsmaf if raw.is_empty() => notes_placeholder,
                _ => raw,
            };
            (spec.field, value.to_string())
        })
        .collect();

    ProcessingResult::new(code.clone(), layout.version, fields)
}

/// Applies the profile's layout selection to scraped rows
#[derive(Debug, Clone)]
pub struct ResultMapper {
    profile: Arc<SiteProfile>,
}

impl ResultMapper {
    pub const fn new(profile: Arc<SiteProfile>) -> Self {
        Self { profile }
    }

    fn fallback_layout(&self) -> FieldLayout {
        self.profile
            .fallback()
            .cloned()
            .unwrap_or_else(|| match self.profile.fallback_layout {
                LayoutVersion::Legacy7 => FieldLayout::legacy7(),
                LayoutVersion::Extended11 => FieldLayout::extended11(),
            })
    }

    pub fn map(&self, code: &Code, cells: &[String]) -> ProcessingResult {
        let placeholder = &self.profile.notes_placeholder;
        match self.profile.layout_for(cells.len()) {
            Some(layout) => map_cells_to_result(layout, code, cells, placeholder),
            None => map_cells_to_result(&self.fallback_layout(), code, cells, placeholder),
        }
    }

    /// Record substituted for a code whose fetch failed
    pub fn error_result(&self, code: &Code, reason: &str) -> ProcessingResult {
        let mut record = map_cells_to_result(&self.fallback_layout(), code, &[], &self.profile.notes_placeholder);
        record.set(FieldKey::Stato, ERROR_STATE);
        record.set(FieldKey::NoteUsmaf, format!("{ERROR_STATE}: {reason}"));
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::site_profile::{LayoutSelection, NOTES_PLACEHOLDER};
    use proptest::prelude::*;

    fn code(s: &str) -> Code {
        Code::new(s).unwrap()
    }

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    fn mapper() -> ResultMapper {
        ResultMapper::new(Arc::new(SiteProfile::nsis()))
    }

    #[test]
    fn test_empty_cells_yield_sentinel_record() {
        let record = mapper().map(&code("Q-77"), &[]);
        assert_eq!(record.code.as_str(), "Q-77");
        assert_eq!(record.layout, LayoutVersion::Extended11);
        assert_eq!(record.get(FieldKey::CodiceRichiesta), Some("Q-77"));
        assert_eq!(record.notes(), NOTES_PLACEHOLDER);
        for (key, value) in record.fields() {
            if key != FieldKey::CodiceRichiesta && key != FieldKey::NoteUsmaf {
                assert_eq!(value, "", "{key} should be empty");
            }
        }
    }

    #[test]
    fn test_eleven_cell_row() {
        let row = cells(&["T1", "x", "APERTA", "P1", "20/01/2024", "PR1", "", "CR1", "TIPO1", "", "INV1"]);
        let record = mapper().map(&code("C1"), &row);

        assert_eq!(record.layout, LayoutVersion::Extended11);
        assert_eq!(record.status(), "APERTA");
        assert_eq!(record.get(FieldKey::Taric), Some("T1"));
        assert_eq!(record.get(FieldKey::ProtocolloIngresso), Some("P1"));
        assert_eq!(record.get(FieldKey::InseritaIl), Some("20/01/2024"));
        assert_eq!(record.get(FieldKey::ProtocolloUscita), Some("PR1"));
        assert_eq!(record.get(FieldKey::Provvedimento), Some(""));
        assert_eq!(record.get(FieldKey::DataProvvedimento), Some("CR1"));
        assert_eq!(record.get(FieldKey::CodiceRichiesta), Some("TIPO1"));
        assert_eq!(record.get(FieldKey::TipoPratica), Some(""));
        assert_eq!(record.notes(), "INV1");
        // index 11 absent
        assert_eq!(record.get(FieldKey::InvioSud), Some(""));
    }

    #[test]
    fn test_legacy_row() {
        let row = cells(&["C9", "", "CHIUSA", "U-1", "PROV", "01/02/2024", "", ""]);
        let record = mapper().map(&code("C9"), &row);

        assert_eq!(record.layout, LayoutVersion::Legacy7);
        assert_eq!(record.field_count(), 6);
        assert_eq!(record.status(), "CHIUSA");
        assert_eq!(record.get(FieldKey::ProtocolloUscita), Some("U-1"));
        assert_eq!(record.get(FieldKey::CodiceRichiesta), Some("C9"));
        assert_eq!(record.notes(), NOTES_PLACEHOLDER);
        assert_eq!(record.get(FieldKey::Taric), None);
    }

    #[test]
    fn test_fixed_layout_is_honoured() {
        let profile = SiteProfile {
            layout: LayoutSelection::Fixed(LayoutVersion::Legacy7),
            ..SiteProfile::nsis()
        };
        let mapper = ResultMapper::new(Arc::new(profile));
        let record = mapper.map(&code("C1"), &cells(&["a"; 12]));
        assert_eq!(record.layout, LayoutVersion::Legacy7);
    }

    #[test]
    fn test_error_result() {
        let record = mapper().error_result(&code("E1"), "Failed after 3 attempts: submit control not found");
        assert_eq!(record.status(), "ERRORE");
        assert_eq!(record.notes(), "ERRORE: Failed after 3 attempts: submit control not found");
        assert_eq!(record.get(FieldKey::CodiceRichiesta), Some("E1"));
    }

    proptest! {
        #[test]
        fn prop_shape_depends_only_on_layout(
            raw_code in "[A-Z0-9]{1,12}",
            row in proptest::collection::vec(".{0,8}", 0..16),
        ) {
            let code = Code::new(&raw_code).unwrap();
            let mapper = mapper();
            let record = mapper.map(&code, &row);
            let profile = SiteProfile::nsis();
            let layout = profile.layout_for(row.len()).unwrap();

            prop_assert_eq!(record.field_count(), layout.fields.len());
            prop_assert_eq!(record.code.as_str(), raw_code.as_str());
            prop_assert!(!record.notes().is_empty());
            prop_assert!(!record.get(FieldKey::CodiceRichiesta).unwrap_or_default().is_empty());
        }
    }
}
