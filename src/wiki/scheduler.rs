//! Dependency Scheduler
//!
//! Orders planned pages so that every page comes after the pages it depends
//! on. Two shapes are produced from the same graph:
//!
//! - **Sequential**: one page at a time, depth-first, dependencies first
//! - **Leveled**: readiness rounds; every page in level `k` only depends on
//!   pages in levels `< k`, so a whole level can be generated concurrently
//!
//! ## Cycles and dangling references
//!
//! A depth-first pass with an in-progress marker finds back edges. Each one
//! is dropped and reported as a [`BrokenEdge`]; scheduling carries on as if
//! that single dependency did not exist. Dependencies naming a slug absent
//! from the plan count as satisfied.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{PlannedPage, WikiError, WikiPlan};

/// Output shape requested by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    Sequential,
    #[default]
    Leveled,
}

impl fmt::Display for ScheduleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Leveled => write!(f, "leveled"),
        }
    }
}

impl FromStr for ScheduleMode {
    type Err = WikiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "leveled" | "levelled" => Ok(Self::Leveled),
            other => Err(WikiError::Config(format!(
                "Unknown schedule mode: {}. Expected sequential or leveled",
                other
            ))),
        }
    }
}

/// A dependency dropped to break a cycle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrokenEdge {
    /// The dependent page
    pub from: String,
    /// The dependency it no longer waits for
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOrder {
    Sequential(Vec<PlannedPage>),
    Leveled(Vec<Vec<PlannedPage>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub order: ExecutionOrder,
    pub broken_edges: Vec<BrokenEdge>,
}

impl ExecutionPlan {
    /// Groups to run one after another; pages inside a group are independent
    ///
    /// Sequential order yields one page per group.
    pub fn into_batches(self) -> Vec<Vec<PlannedPage>> {
        match self.order {
            ExecutionOrder::Sequential(pages) => pages.into_iter().map(|p| vec![p]).collect(),
            ExecutionOrder::Leveled(levels) => levels,
        }
    }

    pub fn page_count(&self) -> usize {
        match &self.order {
            ExecutionOrder::Sequential(pages) => pages.len(),
            ExecutionOrder::Leveled(levels) => levels.iter().map(Vec::len).sum(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Graph view over a plan, indices follow plan order
struct DependencyGraph<'a> {
    pages: &'a [PlannedPage],
    /// Resolved, deduplicated dependency indices per page (dangling removed)
    deps: Vec<Vec<usize>>,
}

impl<'a> DependencyGraph<'a> {
    fn new(plan: &'a WikiPlan) -> Self {
        let pages = plan.pages();
        let index: HashMap<&str, usize> = pages
            .iter()
            .enumerate()
            .map(|(i, p)| (p.slug.as_str(), i))
            .collect();

        let deps = pages
            .iter()
            .map(|page| {
                let mut seen = HashSet::new();
                page.depends_on
                    .iter()
                    .filter_map(|slug| match index.get(slug.as_str()) {
                        Some(&i) => Some(i),
                        None => {
                            debug!(page = %page.slug, dependency = %slug, "Dangling dependency treated as satisfied");
                            None
                        }
                    })
                    .filter(|i| seen.insert(*i))
                    .collect()
            })
            .collect();

        Self { pages, deps }
    }

    /// Descending priority, then plan order
    fn by_priority(&self, indices: &mut [usize]) {
        indices.sort_by_key(|&i| (std::cmp::Reverse(self.pages[i].priority), i));
    }

    /// Depth-first walk shared by both modes
    ///
    /// Returns the post-order (dependencies before dependents) and the edges
    /// closing a cycle. Roots and dependencies are visited by priority.
    fn break_cycles(&self) -> (Vec<usize>, HashSet<(usize, usize)>) {
        let n = self.pages.len();
        let mut marks = vec![Mark::Unvisited; n];
        let mut post_order = Vec::with_capacity(n);
        let mut broken = HashSet::new();

        let mut roots: Vec<usize> = (0..n).collect();
        self.by_priority(&mut roots);

        for root in roots {
            if marks[root] == Mark::Unvisited {
                self.visit(root, &mut marks, &mut post_order, &mut broken);
            }
        }

        (post_order, broken)
    }

    fn visit(
        &self,
        node: usize,
        marks: &mut [Mark],
        post_order: &mut Vec<usize>,
        broken: &mut HashSet<(usize, usize)>,
    ) {
        marks[node] = Mark::InProgress;

        let mut deps = self.deps[node].clone();
        self.by_priority(&mut deps);

        for dep in deps {
            match marks[dep] {
                Mark::Unvisited => self.visit(dep, marks, post_order, broken),
                Mark::InProgress => {
                    warn!(
                        from = %self.pages[node].slug,
                        to = %self.pages[dep].slug,
                        "Breaking dependency cycle"
                    );
                    broken.insert((node, dep));
                }
                Mark::Done => {}
            }
        }

        marks[node] = Mark::Done;
        post_order.push(node);
    }

    /// Readiness rounds over the dependencies that survived cycle breaking
    fn levels(&self, broken: &HashSet<(usize, usize)>) -> Vec<Vec<usize>> {
        let n = self.pages.len();
        let mut level_of: Vec<Option<usize>> = vec![None; n];
        let mut remaining: Vec<usize> = (0..n).collect();
        let mut levels = Vec::new();

        while !remaining.is_empty() {
            let current = levels.len();
            let (mut ready, blocked): (Vec<usize>, Vec<usize>) =
                remaining.iter().partition(|&&i| {
                    self.deps[i]
                        .iter()
                        .filter(|&&d| !broken.contains(&(i, d)))
                        .all(|&d| level_of[d].is_some_and(|l| l < current))
                });

            if ready.is_empty() {
                warn!(
                    remaining = blocked.len(),
                    "No page ready in level pass, forcing remaining pages"
                );
                ready = blocked;
                remaining = Vec::new();
            } else {
                remaining = blocked;
            }

            self.by_priority(&mut ready);
            for &i in &ready {
                level_of[i] = Some(current);
            }
            levels.push(ready);
        }

        levels
    }
}

/// Produces an [`ExecutionPlan`] from a [`WikiPlan`]
#[derive(Debug, Default, Clone, Copy)]
pub struct DependencyScheduler;

impl DependencyScheduler {
    pub fn schedule(plan: &WikiPlan, mode: ScheduleMode) -> ExecutionPlan {
        let graph = DependencyGraph::new(plan);
        let (post_order, broken) = graph.break_cycles();

        let mut broken_edges: Vec<BrokenEdge> = broken
            .iter()
            .map(|&(from, to)| BrokenEdge {
                from: graph.pages[from].slug.clone(),
                to: graph.pages[to].slug.clone(),
            })
            .collect();
        broken_edges.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));

        let page = |i: usize| graph.pages[i].clone();
        let order = match mode {
            ScheduleMode::Sequential => {
                ExecutionOrder::Sequential(post_order.into_iter().map(page).collect())
            }
            ScheduleMode::Leveled => ExecutionOrder::Leveled(
                graph
                    .levels(&broken)
                    .into_iter()
                    .map(|level| level.into_iter().map(page).collect())
                    .collect(),
            ),
        };

        ExecutionPlan {
            order,
            broken_edges,
        }
    }
}
