//! Catalog of source recordings
//!
//! The catalog is loaded once from the dataset's statistics table
//! (`stat.csv`) and keeps every recording in table order together with its
//! precomputed RMS level and a consumed flag. Entries live in an arena and
//! are addressed by [`EntryId`]; only the allocator flips consumed flags.

use crate::error::{MixError, MixResult};
use regex::Regex;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

/// Index of an entry in the catalog arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(usize);

/// One physical source recording
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    /// File-derived key, e.g. `CA1_mic1_spd_28V_0001.wav`
    pub id: String,
    /// Baseline class inferred from the id prefix (`C` in `CA1_...`)
    pub class: Option<char>,
    /// Precomputed root-mean-square level
    pub rms: f64,
    consumed: bool,
}

impl CatalogEntry {
    pub fn new(id: impl Into<String>, rms: f64) -> Self {
        let id = id.into();
        Self {
            class: class_of(&id),
            id,
            rms,
            consumed: false,
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }
}

/// Class letter of a recording id.
///
/// Machine recordings look like `<letter><any><digits>...` (`CA1_...`,
/// `TB12_...`); anything else (noise ids such as `ToyCar_N1_...`) has no class.
pub fn class_of(id: &str) -> Option<char> {
    static CLASS_RE: OnceLock<Regex> = OnceLock::new();
    let re = CLASS_RE.get_or_init(|| Regex::new(r"^(\w).\d+").expect("static regex"));
    re.captures(id)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().chars().next())
}

/// In-memory registry of known recordings
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    by_id: HashMap<String, EntryId>,
}

impl Catalog {
    /// Build a catalog from `(id, rms)` rows, keeping their order
    pub fn from_rows<I, S>(rows: I) -> MixResult<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut catalog = Catalog::default();
        for (id, rms) in rows {
            catalog.insert(CatalogEntry::new(id, rms))?;
        }
        Ok(catalog)
    }

    /// Load the statistics table from `stat.csv`
    pub fn load_stat_csv(path: &Path) -> MixResult<Self> {
        log::info!("Catalog: loading statistics from {:?}", path);
        let file = std::fs::File::open(path).map_err(|e| MixError::io(path, e))?;
        let catalog = Self::from_csv_reader(file)?;
        log::info!("Catalog: {} recordings loaded", catalog.len());
        Ok(catalog)
    }

    /// Parse a statistics table with a header row containing `filename` and
    /// `rms` columns. Other columns are ignored.
    pub fn from_csv_reader<R: Read>(mut reader: R) -> MixResult<Self> {
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|e| MixError::Catalog(format!("unreadable table: {}", e)))?;

        let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
        let (_, header) = lines
            .next()
            .ok_or_else(|| MixError::Catalog("empty table".to_string()))?;
        let columns: Vec<&str> = split_csv_line(header);
        let column = |name: &str| {
            columns
                .iter()
                .position(|c| c.eq_ignore_ascii_case(name))
                .ok_or_else(|| MixError::Catalog(format!("missing '{}' column", name)))
        };
        let id_col = column("filename")?;
        let rms_col = column("rms")?;

        let mut catalog = Catalog::default();
        for (line_no, line) in lines {
            let fields = split_csv_line(line);
            let id = fields.get(id_col).copied().unwrap_or("");
            if id.is_empty() {
                return Err(MixError::Catalog(format!("line {}: empty filename", line_no + 1)));
            }
            let rms = fields
                .get(rms_col)
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .ok_or_else(|| MixError::Catalog(format!("line {}: invalid rms for {}", line_no + 1, id)))?;
            catalog.insert(CatalogEntry::new(id, rms))?;
        }
        Ok(catalog)
    }

    fn insert(&mut self, entry: CatalogEntry) -> MixResult<EntryId> {
        if self.by_id.contains_key(&entry.id) {
            return Err(MixError::Catalog(format!("duplicate recording id {}", entry.id)));
        }
        let id = EntryId(self.entries.len());
        self.by_id.insert(entry.id.clone(), id);
        self.entries.push(entry);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: EntryId) -> &CatalogEntry {
        &self.entries[id.0]
    }

    /// Entries in table order
    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &CatalogEntry)> {
        self.entries.iter().enumerate().map(|(i, e)| (EntryId(i), e))
    }

    /// Ids whose key contains `needle`, in table order
    pub fn matching<'a>(&'a self, needle: &'a str) -> impl Iterator<Item = EntryId> + 'a {
        self.iter()
            .filter(move |(_, e)| e.id.contains(needle))
            .map(|(id, _)| id)
    }

    /// Mean RMS over every entry of a class
    pub fn class_baseline(&self, class: char) -> Option<f64> {
        let (sum, count) = self
            .entries
            .iter()
            .filter(|e| e.class == Some(class))
            .fold((0.0, 0usize), |(s, n), e| (s + e.rms, n + 1));
        (count > 0).then(|| sum / count as f64)
    }

    /// Flag an entry as used; flags are never reset during a run
    pub(crate) fn mark_consumed(&mut self, id: EntryId) {
        self.entries[id.0].consumed = true;
    }

    pub fn consumed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.consumed).count()
    }
}

/// Split one CSV line, trimming whitespace and surrounding quotes
fn split_csv_line(line: &str) -> Vec<&str> {
    line.split(',')
        .map(|f| f.trim().trim_matches('"').trim())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT_CSV: &str = "\
filename,rms,vol_adj
CA1_mic1_spd_01.wav,0.10,3.2
CA1_mic2_spd_01.wav,0.30,1.1
TB2_mic1_spd_01.wav,0.50,1.0
ToyCar_N1_mic1_00001.wav,0.05,9.0
";

    #[test]
    fn test_class_of() {
        assert_eq!(class_of("CA1_mic1_a.wav"), Some('C'));
        assert_eq!(class_of("TB12_mic3_b.wav"), Some('T'));
        assert_eq!(class_of("ToyCar_N1_mic1_00001.wav"), None);
        assert_eq!(class_of("N1_mic1.wav"), None);
    }

    #[test]
    fn test_load_csv_preserves_order() {
        let catalog = Catalog::from_csv_reader(STAT_CSV.as_bytes()).unwrap();
        assert_eq!(catalog.len(), 4);
        let ids: Vec<&str> = catalog.iter().map(|(_, e)| e.id.as_str()).collect();
        assert_eq!(ids[0], "CA1_mic1_spd_01.wav");
        assert_eq!(ids[3], "ToyCar_N1_mic1_00001.wav");
        assert!(catalog.iter().all(|(_, e)| !e.is_consumed()));
    }

    #[test]
    fn test_class_baseline_ignores_noise() {
        let catalog = Catalog::from_csv_reader(STAT_CSV.as_bytes()).unwrap();
        let car = catalog.class_baseline('C').unwrap();
        assert!((car - 0.2).abs() < 1e-12);
        assert_eq!(catalog.class_baseline('T'), Some(0.5));
        assert_eq!(catalog.class_baseline('X'), None);
    }

    #[test]
    fn test_missing_rms_column() {
        let err = Catalog::from_csv_reader("filename,peak\na.wav,1.0\n".as_bytes()).unwrap_err();
        assert!(matches!(err, MixError::Catalog(_)));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = Catalog::from_rows([("a", 1.0), ("a", 2.0)]).unwrap_err();
        assert!(matches!(err, MixError::Catalog(_)));
    }

    #[test]
    fn test_matching_in_table_order() {
        let catalog = Catalog::from_csv_reader(STAT_CSV.as_bytes()).unwrap();
        let mic1: Vec<EntryId> = catalog.matching("_mic1").collect();
        assert_eq!(mic1.len(), 3);
        assert!(mic1.windows(2).all(|w| w[0] < w[1]));
        let train: Vec<EntryId> = catalog.matching("TB2_mic1").collect();
        assert_eq!(train.len(), 1);
        assert_eq!(catalog.get(train[0]).rms, 0.5);
    }
}
