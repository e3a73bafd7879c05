use crate::models::ScoredCandidate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiversityConfig {
    /// Until this many distinct categories are admitted, repeats are free
    pub min_distinct_before_cap: usize,
    /// Longest run of one category before a different one is preferred
    pub max_consecutive_same: usize,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            min_distinct_before_cap: 3,
            max_consecutive_same: 3,
        }
    }
}

/// Diversity Layer - category-aware greedy reordering
///
/// Input must already be sorted by score (descending, id tie-break). For each
/// output slot the layer picks, in score order:
/// 1. the first candidate passing both the distinct-category rule and the run cap
/// 2. otherwise the first candidate passing the run cap
/// 3. otherwise the first remaining candidate
///
/// Skipped candidates are never discarded; they stay eligible for later slots.
///
/// Candidates are split into one queue per category. Only queue heads can be
/// picked, so each slot costs O(log C) for C categories.
pub struct DiversityLayer {
    config: DiversityConfig,
}

impl Default for DiversityLayer {
    fn default() -> Self {
        Self::new(DiversityConfig::default())
    }
}

impl DiversityLayer {
    pub fn new(config: DiversityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> DiversityConfig {
        self.config
    }

    pub fn rerank<'a>(
        &self,
        ranked: Vec<ScoredCandidate<'a>>,
        limit: usize,
    ) -> Vec<ScoredCandidate<'a>> {
        if ranked.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut selected: Vec<ScoredCandidate<'a>> = Vec::with_capacity(limit.min(ranked.len()));
        let mut queues = CategoryQueues::new(ranked);
        let mut run: Option<Run> = None;
        let mut distinct = 0usize;
        let mut relaxed_picks = 0usize;

        while selected.len() < limit {
            let capped = run
                .filter(|r| {
                    self.config.max_consecutive_same > 0
                        && r.len >= self.config.max_consecutive_same
                })
                .map(|r| r.category);

            // Below the distinct threshold every head passes the distinct rule;
            // above it only unseen categories do.
            let unseen_only = distinct >= self.config.min_distinct_before_cap;
            let diverse = queues.pop_best(capped, unseen_only);
            let picked = match diverse {
                Some(picked) => picked,
                None => match queues
                    .pop_best(capped, false)
                    .or_else(|| queues.pop_best(None, false))
                {
                    Some(picked) => {
                        relaxed_picks += 1;
                        picked
                    }
                    None => break,
                },
            };

            if picked.first_of_category {
                distinct += 1;
            }
            run = match run {
                Some(r) if r.category == picked.category => Some(Run {
                    category: r.category,
                    len: r.len + 1,
                }),
                _ => Some(Run {
                    category: picked.category,
                    len: 1,
                }),
            };
            selected.push(picked.candidate);
        }

        debug!(
            selected = selected.len(),
            distinct_categories = distinct,
            relaxed_picks = relaxed_picks,
            "Diversity rerank completed"
        );

        selected
    }
}

/// Category and length of the run at the tail of the selection
#[derive(Debug, Clone, Copy)]
struct Run {
    category: usize,
    len: usize,
}

/// Front of one category queue. Earlier input position ranks higher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Head {
    position: usize,
    category: usize,
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .position
            .cmp(&self.position)
            .then_with(|| other.category.cmp(&self.category))
    }
}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Picked<'a> {
    candidate: ScoredCandidate<'a>,
    category: usize,
    first_of_category: bool,
}

/// Per-category queues in input order. Each non-empty queue has its head in
/// exactly one heap: `unseen` until the category is first picked, `seen` after.
struct CategoryQueues<'a> {
    queues: Vec<VecDeque<(usize, ScoredCandidate<'a>)>>,
    unseen: BinaryHeap<Head>,
    seen: BinaryHeap<Head>,
}

impl<'a> CategoryQueues<'a> {
    fn new(ranked: Vec<ScoredCandidate<'a>>) -> Self {
        let mut index: HashMap<&'a str, usize> = HashMap::new();
        let mut queues: Vec<VecDeque<(usize, ScoredCandidate<'a>)>> = Vec::new();

        for (position, scored) in ranked.into_iter().enumerate() {
            let candidate = scored.candidate;
            let category = *index
                .entry(candidate.category.as_str())
                .or_insert_with(|| {
                    queues.push(VecDeque::new());
                    queues.len() - 1
                });
            queues[category].push_back((position, scored));
        }

        let unseen = queues
            .iter()
            .enumerate()
            .filter_map(|(category, queue)| {
                queue.front().map(|(position, _)| Head {
                    position: *position,
                    category,
                })
            })
            .collect();

        Self {
            queues,
            unseen,
            seen: BinaryHeap::new(),
        }
    }

    /// Removes the earliest head whose category is not `skip`, looking only at
    /// unseen categories when `unseen_only` is set.
    fn pop_best(&mut self, skip: Option<usize>, unseen_only: bool) -> Option<Picked<'a>> {
        let from_unseen = peek_excluding(&mut self.unseen, skip);
        let from_seen = if unseen_only {
            None
        } else {
            peek_excluding(&mut self.seen, skip)
        };

        let (head, first_of_category) = match (from_unseen, from_seen) {
            (Some(u), Some(s)) if s > u => (pop_excluding(&mut self.seen, skip)?, false),
            (Some(_), _) => (pop_excluding(&mut self.unseen, skip)?, true),
            (None, Some(_)) => (pop_excluding(&mut self.seen, skip)?, false),
            (None, None) => return None,
        };

        let queue = &mut self.queues[head.category];
        let (_, candidate) = queue.pop_front()?;
        if let Some((position, _)) = queue.front() {
            self.seen.push(Head {
                position: *position,
                category: head.category,
            });
        }

        Some(Picked {
            candidate,
            category: head.category,
            first_of_category,
        })
    }
}

/// Best head whose category is not `skip`. At most one head per category
/// exists, so at most one entry has to be stepped over.
fn peek_excluding(heap: &mut BinaryHeap<Head>, skip: Option<usize>) -> Option<Head> {
    match heap.peek().copied() {
        Some(top) if Some(top.category) == skip => {
            let held = heap.pop()?;
            let next = heap.peek().copied();
            heap.push(held);
            next
        }
        top => top,
    }
}

fn pop_excluding(heap: &mut BinaryHeap<Head>, skip: Option<usize>) -> Option<Head> {
    let top = heap.pop()?;
    if Some(top.category) != skip {
        return Some(top);
    }
    let next = heap.pop();
    heap.push(top);
    next
}
