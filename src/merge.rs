//! Outer joins producing the final table rows
//!
//! Extraction records are joined to repeat matches by composite id, then the
//! combined rows are joined to haplotags by read name. Nothing present on
//! either side of a join is dropped.

use crate::extract::ExtractionRecord;
use crate::haplotag::Haplotags;
use crate::trf::RepeatMatch;
use rustc_hash::{FxHashMap, FxHashSet};

/// One output row. Missing sides of the joins stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedRecord {
    pub sample_name: Option<String>,
    pub read_name: Option<String>,
    pub composite_id: Option<String>,
    pub extraction: Option<ExtractionRecord>,
    pub repeat: Option<RepeatMatch>,
    pub haplotag: Option<String>,
}

/// Outer-join one sample's extraction records with its repeat matches.
///
/// Rows follow extraction order, one per matching repeat (or a single row
/// without repeat data), followed by repeats whose id has no extraction record.
/// A sample with nothing on either side still yields one placeholder row.
pub fn merge_repeat_matches(
    sample: &str,
    records: Vec<ExtractionRecord>,
    matches: Vec<RepeatMatch>,
) -> Vec<MergedRecord> {
    let mut by_id: FxHashMap<String, Vec<RepeatMatch>> = FxHashMap::default();
    let mut match_order: Vec<String> = Vec::new();
    for m in matches {
        let id = m.composite_id();
        let entry = by_id.entry(id.clone()).or_default();
        if entry.is_empty() {
            match_order.push(id);
        }
        entry.push(m);
    }

    let mut rows = Vec::with_capacity(records.len());
    let mut joined: FxHashSet<String> = FxHashSet::default();

    for record in records {
        let id = record.composite_id();
        let base = MergedRecord {
            sample_name: Some(sample.to_string()),
            read_name: Some(record.read_name.clone()),
            composite_id: Some(id.clone()),
            extraction: Some(record),
            repeat: None,
            haplotag: None,
        };
        match by_id.get(&id) {
            Some(repeats) => {
                joined.insert(id);
                rows.extend(repeats.iter().map(|repeat| MergedRecord {
                    repeat: Some(repeat.clone()),
                    ..base.clone()
                }));
            }
            None => rows.push(base),
        }
    }

    for id in match_order {
        if joined.contains(&id) {
            continue;
        }
        if let Some(repeats) = by_id.remove(&id) {
            rows.extend(repeats.into_iter().map(|repeat| MergedRecord {
                sample_name: Some(sample.to_string()),
                read_name: Some(repeat.read_name.clone()),
                composite_id: Some(id.clone()),
                extraction: None,
                repeat: Some(repeat),
                haplotag: None,
            }));
        }
    }

    if rows.is_empty() {
        rows.push(MergedRecord {
            sample_name: Some(sample.to_string()),
            ..MergedRecord::default()
        });
    }
    rows
}

/// Attach haplotags by read name; haplotagged reads absent from `rows` are
/// appended as rows carrying only the read name and tag.
pub fn attach_haplotags(rows: &mut Vec<MergedRecord>, haplotags: &Haplotags) {
    for row in rows.iter_mut() {
        if let Some(name) = row.read_name.as_deref() {
            row.haplotag = haplotags.get(name).map(str::to_string);
        }
    }

    let seen: FxHashSet<&str> = rows.iter().filter_map(|r| r.read_name.as_deref()).collect();

    let missing: Vec<MergedRecord> = haplotags
        .iter()
        .filter(|(name, _)| !seen.contains(name))
        .map(|(name, tag)| MergedRecord {
            read_name: Some(name.to_string()),
            haplotag: Some(tag.to_string()),
            ..MergedRecord::default()
        })
        .collect();
    rows.extend(missing);
}
