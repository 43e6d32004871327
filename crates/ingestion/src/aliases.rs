//! Source-column alias table for the snapshot schema variants.
//!
//! The upstream export has renamed and reshuffled its columns several
//! times. Each canonical column carries a prioritized list of source
//! header names; within one file, present aliases are coalesced
//! left-to-right and the first non-empty cell wins.

use csv::StringRecord;

/// Alias priority list for one canonical column.
#[derive(Debug, Clone, Copy)]
pub struct ColumnAliases {
    /// Canonical column name in the history table.
    pub target: &'static str,
    /// Acceptable source header names, highest priority first.
    pub sources: &'static [&'static str],
}

/// All known source headers per canonical column.
///
/// Covers every export epoch observed so far: the original capitalized
/// headers (`Code`, `Price (GBP)`, ...), the snake_case rework
/// (`price_incl_vat`, `group_name`, ...), and the pass-through names.
pub const TARGET_ALIASES: [ColumnAliases; 13] = [
    ColumnAliases { target: "code", sources: &["Code", "code"] },
    ColumnAliases { target: "title", sources: &["Title", "title"] },
    ColumnAliases { target: "abv", sources: &["abv", "ABV"] },
    ColumnAliases { target: "price_gbp", sources: &["Price (GBP)", "price_gbp"] },
    ColumnAliases { target: "price_ex_vat", sources: &["price_ex_vat"] },
    ColumnAliases { target: "price_incl_vat", sources: &["price_incl_vat"] },
    ColumnAliases {
        target: "availability",
        sources: &["Available", "available", "availability"],
    },
    ColumnAliases { target: "country", sources: &["Country", "country"] },
    ColumnAliases { target: "type", sources: &["Group", "group_name", "type"] },
    ColumnAliases { target: "size", sources: &["Size", "size"] },
    ColumnAliases { target: "style", sources: &["Style", "style"] },
    ColumnAliases { target: "vintage", sources: &["Vintage", "vintage"] },
    ColumnAliases { target: "url", sources: &["link", "url"] },
];

/// Resolved header layout of one snapshot file: for each canonical
/// column, the source field indices to coalesce, in priority order.
#[derive(Debug)]
pub struct HeaderMap {
    slots: Vec<(&'static str, Vec<usize>)>,
}

impl HeaderMap {
    /// Resolve a CSV header row against the alias table.
    ///
    /// Header matching trims whitespace; a canonical column with no
    /// matching alias gets an empty slot and normalizes to null.
    pub fn resolve(headers: &StringRecord) -> Self {
        let trimmed: Vec<&str> = headers.iter().map(str::trim).collect();
        let slots = TARGET_ALIASES
            .iter()
            .map(|aliases| {
                let indices = aliases
                    .sources
                    .iter()
                    .filter_map(|source| trimmed.iter().position(|h| h == source))
                    .collect();
                (aliases.target, indices)
            })
            .collect();
        Self { slots }
    }

    /// Coalesce one row: first non-empty cell among the column's alias
    /// slots, left-to-right. Returns None when every slot is absent or
    /// empty.
    pub fn coalesce<'r>(&self, target: &str, row: &'r StringRecord) -> Option<&'r str> {
        let (_, indices) = self.slots.iter().find(|(name, _)| *name == target)?;
        indices
            .iter()
            .filter_map(|&i| row.get(i))
            .map(str::trim)
            .find(|cell| !cell.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(cells: &[&str]) -> StringRecord {
        StringRecord::from(cells.to_vec())
    }

    #[test]
    fn test_legacy_and_current_headers_resolve_to_same_target() {
        let legacy = HeaderMap::resolve(&record(&["Code", "Title", "Group", "Available"]));
        let current = HeaderMap::resolve(&record(&["code", "title", "type", "availability"]));

        let row = record(&["HED1", "Dram", "Whisky", "4"]);
        assert_eq!(legacy.coalesce("type", &row), Some("Whisky"));
        assert_eq!(current.coalesce("type", &row), Some("Whisky"));
        assert_eq!(legacy.coalesce("availability", &row), Some("4"));
    }

    #[test]
    fn test_coalesce_prefers_higher_priority_alias() {
        // Both "Available" and "availability" present: first alias wins.
        let map = HeaderMap::resolve(&record(&["code", "Available", "availability"]));
        let row = record(&["HED1", "", "7"]);
        // Priority slot is empty, so the next non-empty cell is used.
        assert_eq!(map.coalesce("availability", &row), Some("7"));

        let row = record(&["HED1", "3", "7"]);
        assert_eq!(map.coalesce("availability", &row), Some("3"));
    }

    #[test]
    fn test_missing_alias_yields_none() {
        let map = HeaderMap::resolve(&record(&["code", "title"]));
        let row = record(&["HED1", "Dram"]);
        assert_eq!(map.coalesce("vintage", &row), None);
        assert_eq!(map.coalesce("price_gbp", &row), None);
    }

    #[test]
    fn test_headers_with_padding_whitespace() {
        let map = HeaderMap::resolve(&record(&[" Code ", " Price (GBP)"]));
        let row = record(&["HED1", " 99.50 "]);
        assert_eq!(map.coalesce("code", &row), Some("HED1"));
        assert_eq!(map.coalesce("price_gbp", &row), Some("99.50"));
    }
}
