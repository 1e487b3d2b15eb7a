//! Cut catalog loading
//!
//! The catalog document is the JSON file written by the cut list generator:
//!
//! ```json
//! { "id": "cuts.json", "name": "94.12 The Stall", "created_at": "...",
//!   "cuts": { "100000": { "cut": 100000, ... } } }
//! ```
//!
//! Records that fail to parse or violate their timer invariants are rejected
//! with a warning; the rest of the catalog stays usable.

use crate::cut::Cut;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    cuts: BTreeMap<String, serde_json::Value>,
}

/// A record the catalog refused to load
#[derive(Debug, Clone)]
pub struct RejectedCut {
    pub key: String,
    pub reason: String,
}

/// Read-only set of cuts keyed by catalog id
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub id: Option<String>,
    pub name: Option<String>,
    pub created_at: Option<String>,
    cuts: BTreeMap<String, Arc<Cut>>,
    rejected: Vec<RejectedCut>,
}

impl Catalog {
    /// Load a catalog document from disk
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::NotFound(format!("catalog {}", path.display()))
            }
            _ => Error::Config(format!("Failed to read catalog {}: {}", path.display(), e)),
        })?;
        let catalog = Self::from_json_str(&text)?;
        info!(
            "Loaded catalog {} ({} cuts, {} rejected)",
            path.display(),
            catalog.len(),
            catalog.rejected.len()
        );
        Ok(catalog)
    }

    /// Parse a catalog document
    ///
    /// Only a malformed document is an error; individual bad records are
    /// skipped and reported through [`Catalog::rejected`].
    pub fn from_json_str(text: &str) -> Result<Self> {
        let doc: CatalogDocument = serde_json::from_str(text)?;

        let mut cuts = BTreeMap::new();
        let mut rejected = Vec::new();

        for (key, raw) in doc.cuts {
            let parsed = serde_json::from_value::<Cut>(raw)
                .map_err(Error::from)
                .and_then(|cut| cut.validate().map(|_| cut));

            match parsed {
                Ok(cut) => {
                    if cut.id != key {
                        warn!("Catalog key {} holds cut id {}; indexing by key", key, cut.id);
                    }
                    cuts.insert(key, Arc::new(cut));
                }
                Err(e) => {
                    warn!("Rejecting catalog record {}: {}", key, e);
                    rejected.push(RejectedCut {
                        key,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            id: doc.id,
            name: doc.name,
            created_at: doc.created_at,
            cuts,
            rejected,
        })
    }

    /// Look up a cut by catalog id
    pub fn get(&self, id: &str) -> Option<Arc<Cut>> {
        self.cuts.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }

    /// Records refused at load time
    pub fn rejected(&self) -> &[RejectedCut] {
        &self.rejected
    }

    /// Distinct categories present in the catalog, sorted
    pub fn categories(&self) -> Vec<String> {
        self.cuts
            .values()
            .map(|c| c.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
