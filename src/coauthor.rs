//! Bounded co-authorship graph expansion.
//!
//! Starting from a seed author, walks the coauthor adjacency depth-first:
//!
//! - at depth 1 (the seed's direct coauthors) every neighbor is reported, but
//!   if there are more than `direct_fanout_cap` of them nothing below is
//!   expanded;
//! - deeper, a frame with more than `sample_size` neighbors looks at a
//!   uniform random sample of that size;
//! - nothing deeper than `max_depth` is visited, at most `max_vertices`
//!   vertices are ever reported, and at most `max_visits` adjacency lists are
//!   fetched. Already reported authors are revisited while depth allows, so
//!   the visit budget is what bounds a walk through a dense component.
//!
//! Vertices are labelled `"1"`, `"2"`, ... in first-visited order, the seed
//! being `"1"`. Edges are undirected; each pair is reported once.

use std::collections::{HashMap, HashSet};

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::key::ContentKey;
use crate::store::{BibStore, StoreResult};

/// Fan-out and size controls for one expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpansionLimits {
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Direct coauthor count above which the seed's neighbors are not expanded.
    #[serde(default = "default_direct_fanout_cap")]
    pub direct_fanout_cap: usize,
    /// Neighbors sampled per frame below depth 1.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    #[serde(default = "default_max_vertices")]
    pub max_vertices: usize,
    /// Adjacency fetches allowed per expansion.
    #[serde(default = "default_max_visits")]
    pub max_visits: usize,
}

fn default_max_depth() -> u32 {
    2
}

fn default_direct_fanout_cap() -> usize {
    20
}

fn default_sample_size() -> usize {
    5
}

fn default_max_vertices() -> usize {
    500
}

fn default_max_visits() -> usize {
    2_000
}

impl Default for ExpansionLimits {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            direct_fanout_cap: default_direct_fanout_cap(),
            sample_size: default_sample_size(),
            max_vertices: default_max_vertices(),
            max_visits: default_max_visits(),
        }
    }
}

/// One reported author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    pub label: String,
    pub name: String,
}

/// Result of one expansion. Built fresh per query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphExpansion {
    pub vertices: Vec<Vertex>,
    pub edges: Vec<(String, String)>,
    /// Set when `max_vertices` or `max_visits` cut the walk short.
    pub truncated: bool,
}

/// Coauthor graph expander over a store.
pub struct CoauthorExpander<'a, S: BibStore + ?Sized> {
    store: &'a S,
    limits: ExpansionLimits,
}

impl<'a, S: BibStore + ?Sized> CoauthorExpander<'a, S> {
    pub fn new(store: &'a S, limits: ExpansionLimits) -> Self {
        Self { store, limits }
    }

    pub fn limits(&self) -> &ExpansionLimits {
        &self.limits
    }

    /// Expand from `seed`, sampling with `rng`.
    pub fn expand<R: Rng + ?Sized>(
        &self,
        seed: ContentKey,
        rng: &mut R,
    ) -> StoreResult<GraphExpansion> {
        let mut walk = Walk::new(seed);
        walk.visit(self.store, &self.limits, rng, seed, 0, 1)?;

        let mut vertices = Vec::with_capacity(walk.order.len());
        for (i, author) in walk.order.iter().enumerate() {
            let name = self.store.display_name(*author)?.unwrap_or_default();
            vertices.push(Vertex {
                label: label(i),
                name,
            });
        }
        let edges = walk
            .edges
            .iter()
            .map(|&(a, b)| (label(a), label(b)))
            .collect();

        tracing::debug!(
            vertices = vertices.len(),
            truncated = walk.truncated,
            "coauthor graph expanded"
        );
        Ok(GraphExpansion {
            vertices,
            edges,
            truncated: walk.truncated,
        })
    }
}

fn label(index: usize) -> String {
    (index + 1).to_string()
}

/// Mutable state of one expansion.
struct Walk {
    order: Vec<ContentKey>,
    index: HashMap<ContentKey, usize>,
    edges: Vec<(usize, usize)>,
    seen_edges: HashSet<(usize, usize)>,
    visits: usize,
    truncated: bool,
}

impl Walk {
    fn new(seed: ContentKey) -> Self {
        Self {
            order: vec![seed],
            index: HashMap::from([(seed, 0)]),
            edges: Vec::new(),
            seen_edges: HashSet::new(),
            visits: 0,
            truncated: false,
        }
    }

    /// Index of `author`, registering it if the budget allows.
    fn vertex(&mut self, author: ContentKey, budget: usize) -> Option<usize> {
        if let Some(&i) = self.index.get(&author) {
            return Some(i);
        }
        if self.order.len() >= budget {
            self.truncated = true;
            return None;
        }
        let i = self.order.len();
        self.order.push(author);
        self.index.insert(author, i);
        Some(i)
    }

    fn edge(&mut self, a: usize, b: usize) {
        let key = if a <= b { (a, b) } else { (b, a) };
        if self.seen_edges.insert(key) {
            self.edges.push((a, b));
        }
    }

    fn visit<S, R>(
        &mut self,
        store: &S,
        limits: &ExpansionLimits,
        rng: &mut R,
        current: ContentKey,
        current_index: usize,
        depth: u32,
    ) -> StoreResult<()>
    where
        S: BibStore + ?Sized,
        R: Rng + ?Sized,
    {
        if depth > limits.max_depth {
            return Ok(());
        }
        if self.visits >= limits.max_visits {
            self.truncated = true;
            return Ok(());
        }
        self.visits += 1;

        let mut neighbors = store.adjacency(current)?;
        neighbors.retain(|n| *n != current);

        let mut stop_recurse = false;
        if depth == 1 {
            stop_recurse = neighbors.len() > limits.direct_fanout_cap;
        } else if neighbors.len() > limits.sample_size {
            neighbors = neighbors
                .choose_multiple(rng, limits.sample_size)
                .copied()
                .collect();
        }

        for neighbor in neighbors {
            if self.visits >= limits.max_visits && !stop_recurse && depth < limits.max_depth {
                // Out of budget: report what is left of this frame, no deeper.
                self.truncated = true;
                stop_recurse = true;
            }
            let Some(neighbor_index) = self.vertex(neighbor, limits.max_vertices) else {
                continue;
            };
            self.edge(current_index, neighbor_index);
            if !stop_recurse && depth < limits.max_depth {
                self.visit(store, limits, rng, neighbor, neighbor_index, depth + 1)?;
            }
        }
        Ok(())
    }
}
