//! Self-contained export bundles.

use super::lines::{LineQuery, LineRow};
use crate::config::Profile;
use crate::model::{Isotopologue, Species, State};
use crate::resolve::ResolveOptions;
use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_EXPORT_LEVELS_LIMIT: u32 = 5000;
pub const DEFAULT_EXPORT_LINES_LIMIT: usize = 10_000;

/// Options for listing levels of one isotopologue.
#[derive(Debug, Clone, Default)]
pub struct LevelQuery {
    pub max_energy: Option<f64>,
    pub limit: Option<u32>,
}

/// What goes into an export bundle. A `None` block is left out.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub resolve: ResolveOptions,
    pub levels: Option<LevelQuery>,
    pub lines: Option<LineQuery>,
}

impl ExportOptions {
    pub fn for_profile(profile: Profile) -> Self {
        Self {
            resolve: ResolveOptions::for_profile(profile),
            levels: Some(LevelQuery {
                max_energy: None,
                limit: Some(DEFAULT_EXPORT_LEVELS_LIMIT),
            }),
            lines: Some(LineQuery {
                limit: Some(DEFAULT_EXPORT_LINES_LIMIT),
                ..LineQuery::default()
            }),
        }
    }
}

/// Species, isotopologues, levels and lines for one query, keyed by id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportBundle {
    pub query: String,
    pub profile: Profile,
    pub species_ids: Vec<String>,
    pub species: Vec<Species>,
    /// Species id -> isotopologues.
    pub isotopologues: BTreeMap<String, Vec<Isotopologue>>,
    /// Isotopologue id -> levels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<BTreeMap<String, Vec<State>>>,
    /// Isotopologue id -> lines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<BTreeMap<String, Vec<LineRow>>>,
}

impl ExportBundle {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
