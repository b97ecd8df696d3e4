//! Recipe ingestion
//!
//! A recipe is a YAML document with one sheet per machine. Each row names a
//! source folder and unit, and carries up to `max_request_slots` request
//! slots. Cells are loosely typed on input (numbers and strings mix freely)
//! and decoded here into typed [`Request`]s.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use toymix_core::{MicIndex, Quantity, Request};

/// Sheet holding free-form notes rather than requests
const NOTES_SHEET: &str = "Settings & Notes";

/// Errors decoding a recipe cell
#[derive(Error, Debug)]
pub enum RecipeError {
    #[error("{at}: invalid microphone list '{value}' (expected e.g. [1,2,3])")]
    InvalidMicrophones { at: CellRef, value: String },

    #[error("{at}: invalid quantity '{value}' (expected N or RN)")]
    InvalidQuantity { at: CellRef, value: String },

    #[error("{at}: invalid noise class '{value}'")]
    InvalidNoise { at: CellRef, value: String },

    #[error("{at}: missing {field}")]
    MissingField { at: CellRef, field: &'static str },
}

/// Location of a request slot, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellRef {
    pub sheet: String,
    pub row: String,
    pub slot: usize,
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sheet '{}' row {} request {}", self.sheet, self.row, self.slot)
    }
}

/// Loosely typed scalar cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    /// Text form with integral floats printed without a fraction
    pub fn to_text(&self) -> String {
        match self {
            Cell::Int(n) => n.to_string(),
            Cell::Float(x) if x.fract() == 0.0 && x.is_finite() => format!("{}", *x as i64),
            Cell::Float(x) => x.to_string(),
            Cell::Text(s) => s.trim().to_string(),
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Float(x) => x.is_nan(),
            Cell::Int(_) => false,
        }
    }

    fn as_count(&self) -> Option<u64> {
        match self {
            Cell::Int(n) => u64::try_from(*n).ok(),
            Cell::Float(x) if *x >= 0.0 && x.fract() == 0.0 => Some(*x as u64),
            Cell::Float(_) => None,
            Cell::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Microphone list, either a YAML sequence or the spreadsheet-style text `"[1,2,3]"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MicField {
    List(Vec<MicIndex>),
    Single(MicIndex),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipeSettings {
    /// Shuffle the contents of "normal" outputs after mixing
    pub shuffle_normal: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestSlot {
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub mics: Option<MicField>,
    #[serde(default)]
    pub noise: Option<Cell>,
    #[serde(default)]
    pub qty: Option<Cell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeRow {
    /// Row number; rows without one are ignored
    #[serde(default)]
    pub no: Option<Cell>,
    /// Source folder relative to the source root, e.g. `ToyCar/car_A1`
    #[serde(default)]
    pub folder: Option<String>,
    /// Unit id, e.g. `CA1`
    #[serde(default)]
    pub file_id: Option<Cell>,
    #[serde(default)]
    pub requests: Vec<RequestSlot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    #[serde(default)]
    pub rows: Vec<RecipeRow>,
}

impl Sheet {
    /// Notes sheets and sheets starting with `_` carry no requests
    pub fn is_ignored(&self) -> bool {
        self.name == NOTES_SHEET || self.name.starts_with('_')
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipe {
    pub settings: RecipeSettings,
    pub sheets: Vec<Sheet>,
}

/// A decoded request with its recipe location
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRequest {
    pub at: CellRef,
    pub request: Request,
}

impl Recipe {
    pub fn load(path: &Path) -> Result<Self> {
        let recipe: Recipe = toymix_core::config::load_document(path)?;
        log::info!(
            "Recipe::load: {} sheets in {:?}",
            recipe.sheets.len(),
            path
        );
        Ok(recipe)
    }

    /// Whether "normal" outputs get shuffled; unset means no
    pub fn shuffle_normal(&self) -> bool {
        self.settings.shuffle_normal.unwrap_or_else(|| {
            log::warn!("WARNING: recipe has no settings.shuffle_normal, not shuffling");
            false
        })
    }

    /// Decode every request in processing order.
    ///
    /// Within a sheet, slots are taken slot-major: the first slot of every
    /// row, then the second slot of every row, and so on.
    pub fn plan(&self, max_slots: usize) -> Result<Vec<PlannedRequest>, RecipeError> {
        let mut planned = Vec::new();
        for sheet in &self.sheets {
            if sheet.is_ignored() {
                log::info!("Recipe::plan: skipping sheet '{}'", sheet.name);
                continue;
            }
            log::info!("Recipe::plan: reading sheet '{}'", sheet.name);

            let rows: Vec<(String, &RecipeRow)> = sheet
                .rows
                .iter()
                .filter_map(|row| match &row.no {
                    Some(no) if !no.is_blank() => Some((no.to_text(), row)),
                    _ => None,
                })
                .collect();

            for slot in 0..max_slots {
                for (no, row) in &rows {
                    let Some(cells) = row.requests.get(slot) else {
                        continue;
                    };
                    let at = CellRef {
                        sheet: sheet.name.clone(),
                        row: no.clone(),
                        slot,
                    };
                    if let Some(request) = decode_slot(row, cells, &at)? {
                        planned.push(PlannedRequest { at, request });
                    }
                }
            }
        }
        Ok(planned)
    }
}

/// Decode one slot; blank pattern or quantity means the slot is unused
fn decode_slot(row: &RecipeRow, cells: &RequestSlot, at: &CellRef) -> Result<Option<Request>, RecipeError> {
    let pattern = cells.pattern.as_deref().map(str::trim).unwrap_or("");
    let qty = cells.qty.as_ref().filter(|q| !q.is_blank());
    let (pattern, qty) = match (pattern, qty) {
        ("", _) | (_, None) => return Ok(None),
        (pattern, Some(qty)) => (pattern, qty),
    };

    let quantity = parse_quantity(qty).ok_or_else(|| RecipeError::InvalidQuantity {
        at: at.clone(),
        value: qty.to_text(),
    })?;
    if quantity.count() == 0 {
        log::debug!("{}: zero quantity, skipping", at);
        return Ok(None);
    }

    let source_folder = row
        .folder
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .ok_or_else(|| RecipeError::MissingField {
            at: at.clone(),
            field: "folder",
        })?;
    let source_id = row
        .file_id
        .as_ref()
        .filter(|id| !id.is_blank())
        .ok_or_else(|| RecipeError::MissingField {
            at: at.clone(),
            field: "file_id",
        })?
        .to_text();

    let microphones = match &cells.mics {
        None => {
            return Err(RecipeError::MissingField {
                at: at.clone(),
                field: "mics",
            })
        }
        Some(MicField::List(list)) if !list.is_empty() => list.clone(),
        Some(MicField::Single(mic)) => vec![*mic],
        Some(MicField::Text(text)) => parse_microphones(text).ok_or_else(|| RecipeError::InvalidMicrophones {
            at: at.clone(),
            value: text.clone(),
        })?,
        Some(MicField::List(_)) => {
            return Err(RecipeError::InvalidMicrophones {
                at: at.clone(),
                value: "[]".to_string(),
            })
        }
    };

    let noise = cells.noise.as_ref().ok_or_else(|| RecipeError::MissingField {
        at: at.clone(),
        field: "noise",
    })?;
    let noise_class = noise
        .as_count()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| RecipeError::InvalidNoise {
            at: at.clone(),
            value: noise.to_text(),
        })?;

    Ok(Some(Request {
        source_folder: source_folder.to_string(),
        source_id,
        microphones,
        noise_class,
        quantity,
        destination_pattern: pattern.to_string(),
    }))
}

/// Parse `"[1,2,3]"` (brackets optional) into microphone indices
pub fn parse_microphones(text: &str) -> Option<Vec<MicIndex>> {
    let inner = text.trim();
    let inner = inner
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(inner);
    let mics: Option<Vec<MicIndex>> = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect();
    mics.filter(|m| !m.is_empty())
}

/// Parse `N` (exclusive) or `RN` (replaceable)
pub fn parse_quantity(cell: &Cell) -> Option<Quantity> {
    if let Cell::Text(text) = cell {
        let text = text.trim();
        if let Some(count) = text.strip_prefix(&['R', 'r'][..]) {
            return count.trim().parse().ok().map(Quantity::Replaceable);
        }
    }
    cell.as_count()
        .and_then(|n| usize::try_from(n).ok())
        .map(Quantity::Exclusive)
}
