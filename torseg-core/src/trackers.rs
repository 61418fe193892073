use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

use crate::descriptor::Tiers;

pub const DEFAULT_PER_TIER: usize = 3;

/// Announce endpoints grouped by transport. Tier order is fixed: udp first,
/// then https, then (when enabled) websocket.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct TrackerConfig {
    pub udp: Vec<String>,
    pub https: Vec<String>,
    pub ws: Vec<String>,
    pub include_ws: bool,
    pub per_tier: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { udp: Vec::new(), https: Vec::new(), ws: Vec::new(), include_ws: false, per_tier: DEFAULT_PER_TIER }
    }
}

fn first(n: usize, urls: &[String]) -> Vec<String> {
    urls.iter().take(n).cloned().collect()
}

impl TrackerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let f = File::open(path).with_context(|| format!("open {:?}", path))?;
        serde_json::from_reader(f).with_context(|| format!("parse tracker config {:?}", path))
    }

    /// Announce tiers in priority order, each capped to `per_tier` entries.
    /// Transports with no endpoints produce no tier.
    pub fn tiers(&self) -> Tiers {
        let mut groups = vec![&self.udp, &self.https];
        if self.include_ws {
            groups.push(&self.ws);
        }
        groups
            .into_iter()
            .map(|g| first(self.per_tier, g))
            .filter(|t| !t.is_empty())
            .collect()
    }
}
