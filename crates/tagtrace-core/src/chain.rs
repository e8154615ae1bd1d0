//! Chain analysis: matrix, missing links and coverage
//!
//! Links are grouped into chains by the trailing `DOMAIN-NNN` of their id, so
//! `@REQ:USER-PAY-001` and `@TASK:API-PAY-001` belong to the same chain.

use crate::spec_id::chain_key;
use crate::tag::{Category, SuperGroup, Tag};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// One `(category, id)` pair fed to the analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainLink {
    pub category: Category,
    pub id: String,
}

impl ChainLink {
    pub fn new(category: Category, id: impl Into<String>) -> Self {
        Self {
            category,
            id: id.into(),
        }
    }

    pub fn chain_key(&self) -> &str {
        chain_key(&self.id)
    }
}

impl From<&Tag> for ChainLink {
    fn from(tag: &Tag) -> Self {
        ChainLink::new(tag.category, tag.spec_id.as_str())
    }
}

/// Convert stored tags into analyzer input.
pub fn links_from_tags<'a>(tags: impl IntoIterator<Item = &'a Tag>) -> Vec<ChainLink> {
    tags.into_iter().map(ChainLink::from).collect()
}

/// Ids per stage of the primary chain (`PRIMARY -> REQ/DESIGN/TASK/TEST`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainMatrix {
    pub primary: BTreeMap<Category, Vec<String>>,
}

impl ChainMatrix {
    /// Ids recorded for one stage, deduplicated, in first-seen order.
    pub fn stage(&self, category: Category) -> &[String] {
        self.primary
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.values().all(Vec::is_empty)
    }
}

/// Build the primary chain matrix. Links outside REQ/DESIGN/TASK/TEST are
/// not part of the matrix.
pub fn generate_chain_matrix(links: &[ChainLink]) -> ChainMatrix {
    let mut primary: BTreeMap<Category, Vec<String>> = Category::PRIMARY_CHAIN
        .iter()
        .map(|category| (*category, Vec::new()))
        .collect();
    let mut seen: HashSet<(Category, &str)> = HashSet::new();

    for link in links {
        if link.category.group() != SuperGroup::Primary {
            continue;
        }
        if seen.insert((link.category, link.id.as_str())) {
            primary
                .entry(link.category)
                .or_default()
                .push(link.id.clone());
        }
    }

    ChainMatrix { primary }
}

/// An absent intermediate stage between two present ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingLink {
    /// The stage that is missing
    pub category: Category,
    pub chain_key: String,
    /// Ids of the nearest present stages before and after the gap
    pub expected_between: [String; 2],
}

/// Walk REQ -> DESIGN -> TASK -> TEST for every chain and report each gap
/// that has a present stage on both sides.
pub fn analyze_missing_connections(matrix: &ChainMatrix) -> Vec<MissingLink> {
    let mut chains: BTreeMap<&str, [Option<&str>; 4]> = BTreeMap::new();
    for (stage, category) in Category::PRIMARY_CHAIN.iter().enumerate() {
        for id in matrix.stage(*category) {
            let slots = chains.entry(chain_key(id)).or_default();
            if slots[stage].is_none() {
                slots[stage] = Some(id.as_str());
            }
        }
    }

    let mut missing = Vec::new();
    for (key, slots) in &chains {
        for stage in 1..slots.len() - 1 {
            if slots[stage].is_some() {
                continue;
            }
            let before = slots[..stage].iter().rev().flatten().next();
            let after = slots[stage + 1..].iter().flatten().next();
            if let (Some(before), Some(after)) = (before, after) {
                missing.push(MissingLink {
                    category: Category::PRIMARY_CHAIN[stage],
                    chain_key: key.to_string(),
                    expected_between: [before.to_string(), after.to_string()],
                });
            }
        }
    }
    missing
}

/// How many chains carry one stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryCoverage {
    pub present: usize,
    pub total: usize,
    pub percentage: f64,
}

/// Chain-level and per-category coverage.
///
/// `coverage_percentage` counts complete chains; `category_coverage` counts,
/// per stage, the chains that have that stage. They answer different
/// questions and are kept apart.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageStats {
    pub total_chains: usize,
    pub complete_chains: usize,
    pub coverage_percentage: f64,
    pub category_coverage: BTreeMap<Category, CategoryCoverage>,
    /// Chain keys missing at least one stage, sorted
    pub incomplete_chains: Vec<String>,
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Categories present per chain key.
fn categories_by_chain(links: &[ChainLink]) -> BTreeMap<&str, BTreeSet<Category>> {
    let mut chains: BTreeMap<&str, BTreeSet<Category>> = BTreeMap::new();
    for link in links {
        chains
            .entry(link.chain_key())
            .or_default()
            .insert(link.category);
    }
    chains
}

pub fn calculate_implementation_coverage(links: &[ChainLink]) -> CoverageStats {
    let chains = categories_by_chain(links);
    let total_chains = chains.len();

    let mut incomplete_chains = Vec::new();
    let mut complete_chains = 0;
    for (key, categories) in &chains {
        if Category::PRIMARY_CHAIN
            .iter()
            .all(|stage| categories.contains(stage))
        {
            complete_chains += 1;
        } else {
            incomplete_chains.push(key.to_string());
        }
    }

    let category_coverage = Category::PRIMARY_CHAIN
        .iter()
        .map(|stage| {
            let present = chains.values().filter(|c| c.contains(stage)).count();
            (
                *stage,
                CategoryCoverage {
                    present,
                    total: total_chains,
                    percentage: percentage(present, total_chains),
                },
            )
        })
        .collect();

    CoverageStats {
        total_chains,
        complete_chains,
        coverage_percentage: percentage(complete_chains, total_chains),
        category_coverage,
        incomplete_chains,
    }
}

/// Tag counts and fill rate for one super-group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStatistics {
    /// Number of links per category
    pub counts: BTreeMap<Category, usize>,
    pub total: usize,
    /// Mean over the group's categories of (chains carrying it / all chains),
    /// as a percentage
    pub completion_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryStatistics {
    pub total_tags: usize,
    pub total_chains: usize,
    pub groups: BTreeMap<SuperGroup, GroupStatistics>,
}

impl SummaryStatistics {
    pub fn completion_rates(&self) -> BTreeMap<SuperGroup, f64> {
        self.groups
            .iter()
            .map(|(group, stats)| (*group, stats.completion_rate))
            .collect()
    }
}

pub fn generate_summary_statistics(links: &[ChainLink]) -> SummaryStatistics {
    let chains = categories_by_chain(links);
    let total_chains = chains.len();

    let groups = SuperGroup::ALL
        .iter()
        .map(|group| {
            let categories = group.categories();
            let counts: BTreeMap<Category, usize> = categories
                .iter()
                .map(|category| {
                    let count = links.iter().filter(|l| l.category == *category).count();
                    (*category, count)
                })
                .collect();

            let fill_sum: f64 = categories
                .iter()
                .map(|category| {
                    let present = chains.values().filter(|c| c.contains(category)).count();
                    percentage(present, total_chains)
                })
                .sum();

            (
                *group,
                GroupStatistics {
                    total: counts.values().sum(),
                    counts,
                    completion_rate: fill_sum / categories.len() as f64,
                },
            )
        })
        .collect();

    SummaryStatistics {
        total_tags: links.len(),
        total_chains,
        groups,
    }
}
