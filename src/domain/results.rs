//! Fetch and processing result types
//!
//! `FetchResult` is what one lookup on the portal produced; `ProcessingResult`
//! is the named record written back to the spreadsheet.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::code::Code;

/// Outcome of `fetch_state_for_code` for a single code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    pub success: bool,
    pub code: Code,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cells: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Attempts actually made, 1..=max_retries+1
    pub attempts: u32,
}

impl FetchResult {
    pub fn succeeded(code: Code, state: String, cells: Vec<String>, attempts: u32) -> Self {
        Self {
            success: true,
            code,
            state: Some(state),
            cells: Some(cells),
            error: None,
            attempts,
        }
    }

    pub fn failed(code: Code, error: impl Into<String>, attempts: u32) -> Self {
        Self {
            success: false,
            code,
            state: None,
            cells: None,
            error: Some(error.into()),
            attempts,
        }
    }

    pub fn cells(&self) -> &[String] {
        self.cells.as_deref().unwrap_or_default()
    }
}

/// Named output columns the portal row can populate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    Taric,
    Stato,
    ProtocolloIngresso,
    InseritaIl,
    ProtocolloUscita,
    Provvedimento,
    DataProvvedimento,
    CodiceRichiesta,
    TipoPratica,
    NoteUsmaf,
    InvioSud,
}

impl FieldKey {
    /// Spreadsheet column header for this field
    pub const fn header(self) -> &'static str {
        match self {
            Self::Taric => "Taric",
            Self::Stato => "Stato",
            Self::ProtocolloIngresso => "Protocollo ingresso",
            Self::InseritaIl => "Inserita il",
            Self::ProtocolloUscita => "Protocollo uscita",
            Self::Provvedimento => "Provvedimento",
            Self::DataProvvedimento => "Data Provvedimento",
            Self::CodiceRichiesta => "Codice richiesta (risultato)",
            Self::TipoPratica => "Tipo pratica",
            Self::NoteUsmaf => "Note Usmaf",
            Self::InvioSud => "Invio SUD",
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// Known shapes of the results row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutVersion {
    /// Seven-field row of the older portal
    Legacy7,
    /// Eleven-field row with taric, intake protocol and SUD columns
    Extended11,
}

impl fmt::Display for LayoutVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy7 => write!(f, "v7"),
            Self::Extended11 => write!(f, "v11"),
        }
    }
}

/// Fixed-shape record derived from scraped cells
///
/// Field order follows the layout table that produced it, so every record
/// of the same layout carries the same keys whether or not the scrape succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub code: Code,
    pub layout: LayoutVersion,
    fields: Vec<(FieldKey, String)>,
}

impl ProcessingResult {
    pub fn new(code: Code, layout: LayoutVersion, fields: Vec<(FieldKey, String)>) -> Self {
        Self { code, layout, fields }
    }

    pub fn get(&self, key: FieldKey) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Status column, empty when the layout has none
    pub fn status(&self) -> &str {
        self.get(FieldKey::Stato).unwrap_or_default()
    }

    pub fn notes(&self) -> &str {
        self.get(FieldKey::NoteUsmaf).unwrap_or_default()
    }

    pub fn fields(&self) -> impl Iterator<Item = (FieldKey, &str)> {
        self.fields.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub(crate) fn set(&mut self, key: FieldKey, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }
}
