//! Species resolution.
//!
//! # Responsibility
//! - Map free-text species queries to concrete species ids.
//!
//! # Invariants
//! - Exact steps run before fuzzy matching; the first exact step with a
//!   hit ends the chain.
//! - The reversed-formula step only runs when no species carries the
//!   query formula directly.
//! - Zero candidates is an empty result, never an error.

use crate::config::Profile;
use crate::model::Species;
use crate::normalize::spectrum::parse_spectrum_label;
use crate::repo::species_repo::{SpeciesField, SpeciesRepository};
use crate::repo::RepoError;
use log::debug;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod formula;
pub mod fuzzy;

pub use formula::reverse_formula_tokens;
pub use fuzzy::token_sort_ratio;

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 60.0;
pub const DEFAULT_FUZZY_LIMIT: usize = 50;

pub type ResolveResult<T> = Result<T, ResolveError>;

/// How a caller turns a candidate list into a single id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisambiguationPolicy {
    /// Take the top-ranked candidate.
    #[default]
    AcceptTop,
    /// Fail unless an exact step produced the match.
    RequireExact,
    /// Fail when more than one candidate remains.
    RequireUnique,
}

/// Options for one resolution call.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub exact_first: bool,
    pub fuzzy_fallback: bool,
    pub fuzzy_limit: usize,
    pub fuzzy_threshold: f64,
    pub include_formula_reversal: bool,
    pub spectrum_labels: bool,
    pub policy: DisambiguationPolicy,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            exact_first: true,
            fuzzy_fallback: true,
            fuzzy_limit: DEFAULT_FUZZY_LIMIT,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            include_formula_reversal: true,
            spectrum_labels: true,
            policy: DisambiguationPolicy::AcceptTop,
        }
    }
}

impl ResolveOptions {
    /// Defaults tuned to what a profile's data supports.
    pub fn for_profile(profile: Profile) -> Self {
        let capabilities = profile.capabilities();
        Self {
            include_formula_reversal: capabilities.formula_reversal,
            spectrum_labels: capabilities.spectrum_labels,
            ..Self::default()
        }
    }
}

/// Which step produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    SpeciesId,
    Formula,
    ReversedFormula,
    Name,
    SpectrumLabel,
    Fuzzy,
}

impl MatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SpeciesId => "species_id",
            Self::Formula => "formula",
            Self::ReversedFormula => "reversed_formula",
            Self::Name => "name",
            Self::SpectrumLabel => "spectrum_label",
            Self::Fuzzy => "fuzzy",
        }
    }

    pub fn is_exact(self) -> bool {
        !matches!(self, Self::Fuzzy)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesCandidate {
    pub species: Species,
    pub kind: MatchKind,
    /// 100 for exact steps, token-sort ratio for fuzzy ones.
    pub score: f64,
}

impl SpeciesCandidate {
    fn exact(species: Species, kind: MatchKind) -> Self {
        Self {
            species,
            kind,
            score: 100.0,
        }
    }

    pub fn species_id(&self) -> &str {
        &self.species.species_id
    }
}

/// Result of resolving one query.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// An exact step matched; the first entry is the best match.
    Exact(Vec<SpeciesCandidate>),
    /// Ranked candidates, best first. May be empty.
    Ranked(Vec<SpeciesCandidate>),
}

impl Resolution {
    pub fn best(&self) -> Option<&SpeciesCandidate> {
        self.candidates().first()
    }

    pub fn candidates(&self) -> &[SpeciesCandidate] {
        match self {
            Self::Exact(candidates) | Self::Ranked(candidates) => candidates,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }

    pub fn is_empty(&self) -> bool {
        self.candidates().is_empty()
    }
}

#[derive(Debug)]
pub enum ResolveError {
    Repo(RepoError),
    /// Several candidates remained under [`DisambiguationPolicy::RequireUnique`].
    Ambiguous { query: String, candidates: Vec<String> },
    /// Only fuzzy candidates exist under [`DisambiguationPolicy::RequireExact`].
    NotExact { query: String, candidates: Vec<String> },
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Ambiguous { query, candidates } => write!(
                f,
                "query `{query}` is ambiguous: {}",
                candidates.join(", ")
            ),
            Self::NotExact { query, candidates } => write!(
                f,
                "no exact match for `{query}`; closest: {}",
                candidates.join(", ")
            ),
        }
    }
}

impl Error for ResolveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Ambiguous { .. } | Self::NotExact { .. } => None,
        }
    }
}

impl From<RepoError> for ResolveError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Resolution engine over a species repository.
pub struct Resolver<R> {
    repo: R,
}

impl<R: SpeciesRepository> Resolver<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Runs the resolution chain for `query`.
    pub fn resolve(&self, query: &str, options: &ResolveOptions) -> ResolveResult<Resolution> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Resolution::Ranked(Vec::new()));
        }

        let exact = self.exact_matches(query, options)?;
        if options.exact_first && !exact.is_empty() {
            debug!(
                "event=resolve module=resolve outcome=exact kind={} candidates={}",
                exact[0].kind.as_str(),
                exact.len()
            );
            return Ok(Resolution::Exact(exact));
        }

        let mut ranked = exact;
        if options.fuzzy_fallback {
            let seen: HashSet<String> = ranked
                .iter()
                .map(|candidate| candidate.species.species_id.clone())
                .collect();
            ranked.extend(
                self.fuzzy_matches(query, options)?
                    .into_iter()
                    .filter(|candidate| !seen.contains(&candidate.species.species_id)),
            );
        }
        debug!(
            "event=resolve module=resolve outcome=ranked candidates={}",
            ranked.len()
        );
        Ok(Resolution::Ranked(ranked))
    }

    /// Resolves `query` to one species id under the options' policy.
    pub fn resolve_id(&self, query: &str, options: &ResolveOptions) -> ResolveResult<Option<String>> {
        let resolution = self.resolve(query, options)?;
        let ids = || {
            resolution
                .candidates()
                .iter()
                .map(|candidate| candidate.species.species_id.clone())
                .collect::<Vec<_>>()
        };
        match options.policy {
            DisambiguationPolicy::AcceptTop => {}
            DisambiguationPolicy::RequireExact => {
                if !resolution.is_empty() && !resolution.is_exact() {
                    return Err(ResolveError::NotExact {
                        query: query.trim().to_string(),
                        candidates: ids(),
                    });
                }
            }
            DisambiguationPolicy::RequireUnique => {
                if resolution.candidates().len() > 1 {
                    return Err(ResolveError::Ambiguous {
                        query: query.trim().to_string(),
                        candidates: ids(),
                    });
                }
            }
        }
        Ok(resolution
            .best()
            .map(|candidate| candidate.species.species_id.clone()))
    }

    /// Exact steps in precedence order; returns the first step's hits.
    pub fn exact_matches(&self, query: &str, options: &ResolveOptions) -> ResolveResult<Vec<SpeciesCandidate>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let by_id = self.repo.find_exact(SpeciesField::Id, query)?;
        if !by_id.is_empty() {
            return Ok(tag(by_id, MatchKind::SpeciesId));
        }

        let by_formula = self.repo.find_exact(SpeciesField::Formula, query)?;
        if !by_formula.is_empty() {
            return Ok(tag(by_formula, MatchKind::Formula));
        }

        if options.include_formula_reversal {
            if let Some(reversed) = reverse_formula_tokens(query) {
                let by_reversed = self.repo.find_exact(SpeciesField::Formula, &reversed)?;
                if !by_reversed.is_empty() {
                    return Ok(tag(by_reversed, MatchKind::ReversedFormula));
                }
            }
        }

        let by_name = self.repo.find_exact(SpeciesField::Name, query)?;
        if !by_name.is_empty() {
            return Ok(tag(by_name, MatchKind::Name));
        }

        if options.spectrum_labels {
            if let Some(label) = parse_spectrum_label(query) {
                let by_label = self
                    .repo
                    .find_by_formula_and_charge(&label.element, label.charge)?;
                if !by_label.is_empty() {
                    return Ok(tag(by_label, MatchKind::SpectrumLabel));
                }
            }
        }

        Ok(Vec::new())
    }

    /// Fuzzy candidates over formula and name, best score first.
    ///
    /// Substring hits are always kept; other species must reach the
    /// configured threshold.
    pub fn fuzzy_matches(&self, query: &str, options: &ResolveOptions) -> ResolveResult<Vec<SpeciesCandidate>> {
        let query = query.trim();
        if query.is_empty() || options.fuzzy_limit == 0 {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<SpeciesCandidate> = self
            .repo
            .list_species()?
            .into_iter()
            .filter_map(|species| {
                let score = fuzzy_score(query, &species);
                let substring = fuzzy::contains_ignore_case(&species.formula, query)
                    || species
                        .name
                        .as_deref()
                        .is_some_and(|name| fuzzy::contains_ignore_case(name, query));
                (substring || score >= options.fuzzy_threshold).then_some(SpeciesCandidate {
                    species,
                    kind: MatchKind::Fuzzy,
                    score,
                })
            })
            .collect();

        candidates.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| left.species.formula.len().cmp(&right.species.formula.len()))
                .then_with(|| left.species.species_id.cmp(&right.species.species_id))
        });
        candidates.truncate(options.fuzzy_limit);
        Ok(candidates)
    }
}

fn tag(species: Vec<Species>, kind: MatchKind) -> Vec<SpeciesCandidate> {
    species
        .into_iter()
        .map(|species| SpeciesCandidate::exact(species, kind))
        .collect()
}

fn fuzzy_score(query: &str, species: &Species) -> f64 {
    let formula_score = token_sort_ratio(query, &species.formula);
    let name_score = species
        .name
        .as_deref()
        .map_or(0.0, |name| token_sort_ratio(query, name));
    formula_score.max(name_score)
}
