use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

use crate::error::Error;

/// The one state this deployment serves.
pub const STATE_ID: i64 = 25;

const DEFAULT_PARTIES: [&str; 9] = [
    "PDP", "DPP", "ACN", "PPA", "CDC", "JP", "CPC", "ANPP", "ACCORD",
];

/// Ordered roster of party abbreviations reported at every polling unit.
///
/// Fixed at deploy time and injected into the reconciliation and ingestion
/// paths, so tests can run with a smaller roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyRoster(Vec<String>);

impl PartyRoster {
    pub fn new(parties: Vec<String>) -> Self {
        Self(parties)
    }

    /// Roster from the PARTIES env var (comma-separated), or the default.
    pub fn from_env() -> Self {
        match env::var("PARTIES") {
            Ok(raw) => Self(
                raw.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect(),
            ),
            Err(_) => Self::default(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn contains(&self, party: &str) -> bool {
        self.0.iter().any(|p| p == party)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Default for PartyRoster {
    fn default() -> Self {
        Self(DEFAULT_PARTIES.iter().map(|p| p.to_string()).collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingUnit {
    pub uniqueid: i64,
    pub name: String,
    pub ward_id: i64,
    pub lga_id: i64,
    pub state_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lga {
    pub lga_id: i64,
    pub lga_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ward {
    pub ward_id: i64,
    pub ward_name: String,
}

/// Submission for a new polling unit, before any storage access.
#[derive(Debug, Clone)]
pub struct NewPollingUnit {
    pub lga_id: Option<i64>,
    pub ward_id: Option<i64>,
    pub name: String,
    pub scores: HashMap<String, i64>,
}

impl NewPollingUnit {
    /// Checks that all required fields are present and non-empty.
    ///
    /// Returns `(lga_id, ward_id, name)` on success; no storage is touched
    /// before this passes.
    pub fn validate(&self) -> Result<(i64, i64, &str), Error> {
        let lga_id = self.lga_id.ok_or(Error::Validation("lga_id"))?;
        let ward_id = self.ward_id.ok_or(Error::Validation("ward_id"))?;
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("pu_name"));
        }
        Ok((lga_id, ward_id, name))
    }
}
