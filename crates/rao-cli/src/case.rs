//! Case file: the network, its catalog and the oracle data in one JSON file.

use anyhow::{Context, Result};
use rao_algo::LinearFlowModel;
use rao_core::{Crac, Network};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub network: Network,
    pub crac: Crac,
    #[serde(default)]
    pub oracle: LinearFlowModel,
}

impl Case {
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading case file {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parsing case file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        self.crac
            .validate(&self.network)
            .with_context(|| format!("case '{}' is inconsistent", self.crac.id))
    }
}
