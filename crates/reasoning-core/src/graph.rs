//! Evidence Dependency Graph
//!
//! Each evidence spec `Tool[input]` may mention earlier results as `#E<N>`
//! inside its input. Those mentions are the edges of a graph that must be a
//! DAG. Execution levels come from repeatedly taking the frontier of evidences
//! whose dependencies are all in earlier levels:
//!
//! ```text
//!   #E1: google[Cinnamon AI]          level 0: {#E1, #E2}
//!   #E2: wikipedia[Cinnamon]          level 1: {#E3}
//!   #E3: llm[compare #E1 and #E2]
//! ```
//!
//! A cycle fails the build. It is never broken heuristically.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::{AgentError, Result};
use crate::parser::{EVIDENCE_REF_RE, split_tool_call};

/// Dependency graph over evidence ids plus its execution levels
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    /// Evidence id -> ids it references
    edges: HashMap<String, BTreeSet<String>>,
    levels: Vec<Vec<String>>,
}

impl DependencyGraph {
    /// Build the graph from `(id, spec)` pairs in declaration order.
    ///
    /// Only references to ids present in `specs` count; the tool name is
    /// never scanned. Fails with [`AgentError::CircularDependency`] when a
    /// round of level computation makes no progress.
    pub fn build<'a>(specs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let specs: Vec<(&str, &str)> = specs.into_iter().collect();
        let known: HashSet<&str> = specs.iter().map(|(id, _)| *id).collect();

        let mut order: Vec<&str> = Vec::with_capacity(specs.len());
        let mut edges: HashMap<String, BTreeSet<String>> = HashMap::with_capacity(specs.len());
        for (id, spec) in &specs {
            let deps = references(spec)
                .filter(|r| known.contains(r))
                .map(str::to_string)
                .collect();
            if edges.insert((*id).to_string(), deps).is_none() {
                order.push(*id);
            }
        }

        let levels = compute_levels(&order, &edges)?;
        tracing::debug!(evidences = order.len(), levels = levels.len(), "Built evidence graph");

        Ok(Self { edges, levels })
    }

    /// Execution levels; every id appears in exactly one level
    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    /// Ids `id` references, empty for unknown ids
    pub fn dependencies(&self, id: &str) -> impl Iterator<Item = &str> {
        self.edges.get(id).into_iter().flatten().map(String::as_str)
    }

    /// Index of the level holding `id`
    pub fn level_of(&self, id: &str) -> Option<usize> {
        self.levels.iter().position(|level| level.iter().any(|e| e == id))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// `#E<N>` tokens inside the bracketed input of a spec
fn references(spec: &str) -> impl Iterator<Item = &str> {
    let input = split_tool_call(spec).map_or("", |(_, input)| input);
    EVIDENCE_REF_RE.find_iter(input).map(|m| m.as_str())
}

/// Frontier (Kahn) levelling.
///
/// An id joins a level only once every dependency sits in an earlier level, so
/// the ordering invariant is checked as levels are formed.
fn compute_levels(order: &[&str], edges: &HashMap<String, BTreeSet<String>>) -> Result<Vec<Vec<String>>> {
    let mut placed: HashSet<&str> = HashSet::with_capacity(order.len());
    let mut pending: Vec<&str> = order.to_vec();
    let mut levels = Vec::new();

    while !pending.is_empty() {
        let (ready, blocked): (Vec<&str>, Vec<&str>) = pending.into_iter().partition(|id| {
            edges
                .get(*id)
                .is_none_or(|deps| deps.iter().all(|d| placed.contains(d.as_str())))
        });

        if ready.is_empty() {
            return Err(AgentError::CircularDependency {
                remaining: blocked.into_iter().map(str::to_string).collect(),
            });
        }

        placed.extend(ready.iter().copied());
        levels.push(ready.into_iter().map(str::to_string).collect());
        pending = blocked;
    }

    Ok(levels)
}
