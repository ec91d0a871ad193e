//! # Graph Traversal
//!
//! Bounded breadth-first reachability over an abstract successor
//! capability. Selection queries use it to walk a host's shading networks
//! without any host-specific recursion.

use crate::Host;
use crate::primitives::MAX_TRAVERSAL_DEPTH;
use std::collections::{BTreeSet, VecDeque};

// =============================================================================
// SUCCESSORS
// =============================================================================

/// Outgoing neighbours of a node.
pub trait Successors<N> {
    fn successors(&self, node: &N) -> Vec<N>;
}

impl<N, F> Successors<N> for F
where
    F: Fn(&N) -> Vec<N>,
{
    fn successors(&self, node: &N) -> Vec<N> {
        self(node)
    }
}

/// Host objects fed by a node.
pub struct Downstream<'a, H: ?Sized>(pub &'a H);

/// Host objects feeding a node.
pub struct Upstream<'a, H: ?Sized>(pub &'a H);

impl<H: Host + ?Sized> Successors<String> for Downstream<'_, H> {
    fn successors(&self, node: &String) -> Vec<String> {
        self.0.downstream(node)
    }
}

impl<H: Host + ?Sized> Successors<String> for Upstream<'_, H> {
    fn successors(&self, node: &String) -> Vec<String> {
        self.0.upstream(node)
    }
}

// =============================================================================
// REACHABILITY
// =============================================================================

/// Every node reachable from `starts` within `max_depth` hops, starts
/// included.
///
/// Depth is capped at `MAX_TRAVERSAL_DEPTH`; cycles are visited once.
pub fn reachable<N, S>(starts: impl IntoIterator<Item = N>, successors: &S, max_depth: usize) -> BTreeSet<N>
where
    N: Ord + Clone,
    S: Successors<N> + ?Sized,
{
    let max_depth = max_depth.min(MAX_TRAVERSAL_DEPTH);
    let mut visited = BTreeSet::new();
    let mut queue = VecDeque::new();

    for start in starts {
        if visited.insert(start.clone()) {
            queue.push_back((start, 0usize));
        }
    }

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        for next in successors.successors(&current) {
            if visited.insert(next.clone()) {
                queue.push_back((next, depth.saturating_add(1)));
            }
        }
    }

    visited
}

/// Tracked nodes sharing a shading group with the selection.
///
/// Walks forward from the selection to objects of `group_type`, then
/// backward from those groups to objects whose type is in `tracked_types`.
/// Returns `None` for an empty selection or when no group is reached.
pub fn related_tracked<H: Host + ?Sized>(
    host: &H,
    selection: &[String],
    group_type: &str,
    tracked_types: &BTreeSet<String>,
) -> Option<BTreeSet<String>> {
    if selection.is_empty() {
        return None;
    }

    let forward = reachable(selection.iter().cloned(), &Downstream(host), MAX_TRAVERSAL_DEPTH);
    let groups: Vec<String> = forward
        .into_iter()
        .filter(|name| host.object_type(name).as_deref() == Some(group_type))
        .collect();
    if groups.is_empty() {
        return None;
    }

    let history = reachable(groups, &Upstream(host), MAX_TRAVERSAL_DEPTH);
    Some(
        history
            .into_iter()
            .filter(|name| {
                host.object_type(name)
                    .is_some_and(|type_name| tracked_types.contains(&type_name))
            })
            .collect(),
    )
}

// =============================================================================
// TESTS
// =============================================================================
