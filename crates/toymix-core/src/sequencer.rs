//! Sequential output file naming
//!
//! Destination file names carry a run of `?` that is replaced by a
//! zero-padded number. The next number is found by scanning the destination
//! directory, so a run resumes after files left by earlier runs.

use std::path::Path;

use regex::Regex;

use crate::error::{MixError, MixResult};

/// Character marking the digits of the sequence number
pub const PLACEHOLDER: char = '?';

/// Parsed destination file name, e.g. `section_00_source_0_normal_????.wav`
#[derive(Debug, Clone)]
pub struct FilePattern {
    source: String,
    prefix: String,
    width: usize,
    suffix: String,
    matcher: Regex,
}

impl FilePattern {
    /// Parse a file name. The longest run of `?` is the placeholder; on a tie
    /// the first run wins.
    pub fn parse(file_name: &str) -> MixResult<Self> {
        let mut best: Option<(usize, usize)> = None;
        let mut run_start: Option<usize> = None;
        let chars: Vec<(usize, char)> = file_name.char_indices().collect();

        for (pos, &(byte, c)) in chars.iter().enumerate() {
            if c == PLACEHOLDER && run_start.is_none() {
                run_start = Some(byte);
            }
            let run_ends = c != PLACEHOLDER || pos + 1 == chars.len();
            if let (true, Some(start)) = (run_ends, run_start) {
                let end = if c == PLACEHOLDER { byte + 1 } else { byte };
                if best.map_or(true, |(s, e)| end - start > e - s) {
                    best = Some((start, end));
                }
                run_start = None;
            }
        }

        let (start, end) = best.ok_or_else(|| MixError::NoPlaceholder {
            pattern: file_name.to_string(),
        })?;
        let prefix = file_name[..start].to_string();
        let suffix = file_name[end..].to_string();
        let width = end - start;

        let matcher = Regex::new(&format!(
            r"^{}(\d{{{}}}){}$",
            regex::escape(&prefix),
            width,
            regex::escape(&suffix)
        ))
        .map_err(|e| MixError::InvalidPattern {
            pattern: file_name.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: file_name.to_string(),
            prefix,
            width,
            suffix,
            matcher,
        })
    }

    /// Digits in the sequence number
    pub fn width(&self) -> usize {
        self.width
    }

    /// Largest number that fits the placeholder
    pub fn max_number(&self) -> u64 {
        u32::try_from(self.width)
            .ok()
            .and_then(|w| 10u64.checked_pow(w))
            .map_or(u64::MAX, |limit| limit - 1)
    }

    /// File name for sequence number `n`; fails once `n` outgrows the placeholder
    pub fn render(&self, n: u64) -> MixResult<String> {
        if n > self.max_number() {
            return Err(MixError::SequenceExhausted {
                pattern: self.source.clone(),
                width: self.width,
            });
        }
        Ok(format!("{}{:0width$}{}", self.prefix, n, self.suffix, width = self.width))
    }

    /// Sequence number of a name matching this pattern
    pub fn number_of(&self, name: &str) -> Option<u64> {
        self.matcher
            .captures(name)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Number carried by the lexicographically last matching file in `dir`
    pub fn highest_existing(&self, dir: &Path) -> MixResult<Option<u64>> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MixError::io(dir, e)),
        };

        let mut last: Option<String> = None;
        for entry in entries {
            let entry = entry.map_err(|e| MixError::io(dir, e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if self.matcher.is_match(&name) && last.as_ref().map_or(true, |l| name > *l) {
                last = Some(name);
            }
        }

        Ok(last.and_then(|name| self.number_of(&name)))
    }

    /// Next free number in `dir`
    pub fn next_number(&self, dir: &Path) -> MixResult<u64> {
        Ok(self.highest_existing(dir)?.map_or(1, |n| n + 1))
    }
}

/// Next file name in `dir` for a destination file name pattern
pub fn next_filename(dir: &Path, file_name: &str) -> MixResult<String> {
    let pattern = FilePattern::parse(file_name)?;
    pattern.render(pattern.next_number(dir)?)
}

/// In-memory counter seeded by a single directory scan.
///
/// Used when every file name of a request has to be known before rendering
/// starts; assumes nothing else writes into the directory meanwhile.
#[derive(Debug, Clone)]
pub struct SequenceCounter {
    pattern: FilePattern,
    next: u64,
}

impl SequenceCounter {
    pub fn seed(dir: &Path, pattern: FilePattern) -> MixResult<Self> {
        let next = pattern.next_number(dir)?;
        Ok(Self { pattern, next })
    }

    /// Hand out the next file name
    pub fn next_name(&mut self) -> MixResult<String> {
        let name = self.pattern.render(self.next)?;
        self.next += 1;
        Ok(name)
    }
}
