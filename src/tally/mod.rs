use serde::Serialize;
use std::collections::HashMap;

use crate::db::Database;
use crate::error::Result;
use crate::models::PartyRoster;

/// Estimated vs. official totals for one LGA.
///
/// Each map is total over the tracked-party roster: every roster party is a
/// key, parties with no stored rows carry 0. `comparison` is the official
/// score minus the PU-level sum for parties with an official row, 0 for the
/// rest.
#[derive(Debug, Clone, Serialize)]
pub struct LgaComparison {
    pub estimated: HashMap<String, i64>,
    pub official: HashMap<String, i64>,
    pub comparison: HashMap<String, i64>,
}

impl LgaComparison {
    /// The unselected/initial state: three empty maps.
    pub fn empty() -> Self {
        Self {
            estimated: HashMap::new(),
            official: HashMap::new(),
            comparison: HashMap::new(),
        }
    }
}

/// Reconcile an LGA's aggregated PU sums against its official totals.
///
/// With no LGA selected this returns three empty maps without touching the
/// store. A failure in either read aborts the whole call; no partial maps
/// are handed back.
pub async fn reconcile(
    db: &Database,
    roster: &PartyRoster,
    lga_id: Option<i64>,
) -> Result<LgaComparison> {
    let lga_id = match lga_id {
        Some(id) => id,
        None => return Ok(LgaComparison::empty()),
    };

    let pu_sums = db.sum_pu_results_by_party(lga_id).await?;
    let official_rows = db.list_lga_results(lga_id).await?;

    Ok(compare(roster, &pu_sums, &official_rows))
}

/// Builds the three maps from raw grouped rows.
pub fn compare(
    roster: &PartyRoster,
    pu_sums: &[(String, i64)],
    official_rows: &[(String, i64)],
) -> LgaComparison {
    let mut estimated = HashMap::new();
    let mut official = HashMap::new();
    let mut comparison = HashMap::new();

    for (party, total) in pu_sums {
        if roster.contains(party) {
            estimated.insert(party.clone(), *total);
        }
    }

    for (party, score) in official_rows {
        if !roster.contains(party) {
            continue;
        }
        official.insert(party.clone(), *score);
        let est = estimated.get(party).copied().unwrap_or(0);
        comparison.insert(party.clone(), score - est);
    }

    // Every roster party ends up in every map
    for party in roster.iter() {
        estimated.entry(party.to_string()).or_insert(0);
        official.entry(party.to_string()).or_insert(0);
        comparison.entry(party.to_string()).or_insert(0);
    }

    LgaComparison {
        estimated,
        official,
        comparison,
    }
}

/// Per-party scores for one polling unit, normalized to the roster.
///
/// Parties with no stored row are reported as 0, never omitted; rows for
/// parties off the roster are dropped.
pub fn scores_by_party(roster: &PartyRoster, rows: &[(String, i64)]) -> HashMap<String, i64> {
    let mut scores: HashMap<String, i64> = rows
        .iter()
        .filter(|(party, _)| roster.contains(party))
        .map(|(party, score)| (party.clone(), *score))
        .collect();

    for party in roster.iter() {
        scores.entry(party.to_string()).or_insert(0);
    }

    scores
}
