// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page-range parsing and normalisation.
//
// User input such as "1-3, 5,5" is resolved against a document's real page
// count into a `PageSet`, and only the canonical rendering of that set is
// ever handed to an external print command.

use std::collections::BTreeSet;

use crate::error::{LabprintError, Result};

/// Longest page-range string accepted (after whitespace removal).
pub const MAX_RANGE_LEN: usize = 200;

/// Sorted set of distinct 1-based page indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSet {
    pages: BTreeSet<u32>,
}

impl PageSet {
    /// Every page of a document with `total` pages.
    pub fn all(total: u32) -> Self {
        Self {
            pages: (1..=total).collect(),
        }
    }

    pub fn from_pages(pages: impl IntoIterator<Item = u32>) -> Self {
        Self {
            pages: pages.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn contains(&self, page: u32) -> bool {
        self.pages.contains(&page)
    }

    /// Pages in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.iter().copied()
    }

    /// Whether the set is exactly `1..=total`.
    pub fn covers_all(&self, total: u32) -> bool {
        self.pages.len() == total as usize
            && self.pages.first() == Some(&1)
            && self.pages.last() == Some(&total)
    }

    /// Minimal comma/dash rendering of contiguous runs, e.g. `"1-3,5"`.
    pub fn to_canonical_string(&self) -> String {
        let mut runs: Vec<(u32, u32)> = Vec::new();
        for page in self.iter() {
            match runs.last_mut() {
                Some((_, end)) if *end + 1 == page => *end = page,
                _ => runs.push((page, page)),
            }
        }
        runs.iter()
            .map(|&(start, end)| {
                if start == end {
                    start.to_string()
                } else {
                    format!("{start}-{end}")
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Parse `spec` against a document of `total_pages` pages.
///
/// Blank input selects every page. Whitespace is ignored; duplicates and
/// overlaps collapse.
pub fn parse(spec: &str, total_pages: u32) -> Result<PageSet> {
    let compact: String = spec.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Ok(PageSet::all(total_pages));
    }
    if compact.len() > MAX_RANGE_LEN {
        return Err(LabprintError::InvalidRange(format!(
            "range is longer than {MAX_RANGE_LEN} characters"
        )));
    }
    if let Some(bad) = compact
        .chars()
        .find(|c| !(c.is_ascii_digit() || *c == ',' || *c == '-'))
    {
        return Err(LabprintError::InvalidRange(format!(
            "unexpected character {bad:?} in {compact:?}"
        )));
    }

    let mut pages = BTreeSet::new();
    for token in compact.split(',') {
        let (start, end) = match token.split_once('-') {
            Some((a, b)) => (parse_page(a, token)?, parse_page(b, token)?),
            None => {
                let page = parse_page(token, token)?;
                (page, page)
            }
        };
        if start > end {
            return Err(LabprintError::InvalidRange(format!(
                "range {token:?} starts after it ends"
            )));
        }
        for page in [start, end] {
            if page < 1 || page > total_pages {
                return Err(LabprintError::InvalidRange(format!(
                    "page {page} out of range (1-{total_pages})"
                )));
            }
        }
        pages.extend(start..=end);
    }
    Ok(PageSet { pages })
}

fn parse_page(text: &str, token: &str) -> Result<u32> {
    if text.is_empty() {
        return Err(LabprintError::InvalidRange(format!(
            "incomplete entry {token:?}"
        )));
    }
    text.parse::<u32>().map_err(|e| {
        LabprintError::InvalidRange(format!("cannot read page number {text:?}: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(set: &PageSet) -> Vec<u32> {
        set.iter().collect()
    }

    #[test]
    fn blank_selects_everything() {
        let set = parse("", 10).expect("parse blank");
        assert_eq!(pages(&set), (1..=10).collect::<Vec<_>>());
        assert!(set.covers_all(10));
        assert_eq!(parse("   ", 3).expect("parse spaces"), PageSet::all(3));
    }

    #[test]
    fn mixed_singles_and_runs() {
        let set = parse("2-3,5", 10).expect("parse");
        assert_eq!(pages(&set), vec![2, 3, 5]);
        assert!(!set.covers_all(10));
    }

    #[test]
    fn whitespace_and_duplicates_collapse() {
        let set = parse(" 5, 1 - 3 ,2,3-4 ", 10).expect("parse");
        assert_eq!(pages(&set), vec![1, 2, 3, 4, 5]);
        assert_eq!(set.to_canonical_string(), "1-5");
    }

    #[test]
    fn rejects_out_of_bounds() {
        assert!(matches!(parse("11", 10), Err(LabprintError::InvalidRange(_))));
        assert!(matches!(parse("0", 10), Err(LabprintError::InvalidRange(_))));
        assert!(matches!(parse("9-12", 10), Err(LabprintError::InvalidRange(_))));
    }

    #[test]
    fn rejects_reversed_range() {
        assert!(matches!(parse("3-1", 10), Err(LabprintError::InvalidRange(_))));
    }

    #[test]
    fn rejects_malformed_input() {
        for spec in ["1;2", "a", "1-", "-2", "1,,2", "1-2-3", ",", "1;rm -rf /"] {
            assert!(
                matches!(parse(spec, 10), Err(LabprintError::InvalidRange(_))),
                "{spec:?} should be rejected"
            );
        }
        assert!(parse("99999999999", 10).is_err());
        assert!(parse(&"1,".repeat(150), 10).is_err());
    }

    #[test]
    fn canonical_form_reparses_to_same_set() {
        for (spec, total) in [("", 7), ("1,3,5-7,6", 9), ("4", 4), ("2-2,8,1-3", 8)] {
            let set = parse(spec, total).expect("parse original");
            let canonical = set.to_canonical_string();
            let again = parse(&canonical, total).expect("parse canonical");
            assert_eq!(again, set, "{spec:?} -> {canonical:?}");
        }
    }

    #[test]
    fn canonical_string_of_runs() {
        let set = PageSet::from_pages([1, 2, 3, 5, 7, 8]);
        assert_eq!(set.to_canonical_string(), "1-3,5,7-8");
        assert_eq!(PageSet::default().to_canonical_string(), "");
    }
}
