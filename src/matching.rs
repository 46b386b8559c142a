//! Perfect matching by greedy seeding plus augmenting-path search.
//!
//! Works on the aromatic subgraphs produced by SMILES parsing, which are
//! bipartite in practice; odd cycles that would need blossom contraction are
//! reported as unmatchable instead, and kekulization fails for them.

use std::collections::VecDeque;

use petgraph::graph::{NodeIndex, UnGraph};

/// Returns a matching that saturates every vertex, as `mate[node] = partner`,
/// or `None` if no perfect matching exists. The empty graph matches trivially.
pub(crate) fn find_perfect_matching<N, E>(graph: &UnGraph<N, E>) -> Option<Vec<NodeIndex>> {
    let n = graph.node_count();
    // ascending neighbor order keeps the matching deterministic
    let adjacency: Vec<Vec<NodeIndex>> = graph
        .node_indices()
        .map(|v| {
            let mut neighbors: Vec<NodeIndex> = graph.neighbors(v).collect();
            neighbors.sort_unstable();
            neighbors
        })
        .collect();

    let mut matching: Vec<Option<NodeIndex>> = vec![None; n];
    greedy_matching(&adjacency, &mut matching);

    for v in graph.node_indices() {
        if matching[v.index()].is_some() {
            continue;
        }
        if !augment(&adjacency, &mut matching, v) {
            return None;
        }
    }

    matching.into_iter().collect()
}

/// Seeds the matching cheaply: visit vertices in ascending free-degree order
/// and pair each with its unmatched neighbor of smallest free degree.
fn greedy_matching(adjacency: &[Vec<NodeIndex>], matching: &mut [Option<NodeIndex>]) {
    let n = adjacency.len();
    let mut free_degree: Vec<usize> = adjacency.iter().map(Vec::len).collect();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&v| free_degree[v]);

    for v in order {
        if matching[v].is_some() {
            continue;
        }
        let mate = adjacency[v]
            .iter()
            .copied()
            .filter(|w| matching[w.index()].is_none())
            .min_by_key(|w| free_degree[w.index()]);
        let Some(mate) = mate else {
            continue;
        };
        matching[v] = Some(mate);
        matching[mate.index()] = Some(NodeIndex::new(v));
        for &u in adjacency[v].iter().chain(&adjacency[mate.index()]) {
            free_degree[u.index()] = free_degree[u.index()].saturating_sub(1);
        }
    }
}

/// BFS for an alternating path from `start` to another free vertex, flipping
/// edge membership along it on success.
fn augment(
    adjacency: &[Vec<NodeIndex>],
    matching: &mut [Option<NodeIndex>],
    start: NodeIndex,
) -> bool {
    let n = adjacency.len();
    let mut prev: Vec<Option<NodeIndex>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut queue = VecDeque::new();

    visited[start.index()] = true;
    queue.push_back(start);

    while let Some(u) = queue.pop_front() {
        for &v in &adjacency[u.index()] {
            if visited[v.index()] || matching[u.index()] == Some(v) {
                continue;
            }
            visited[v.index()] = true;
            prev[v.index()] = Some(u);

            match matching[v.index()] {
                None => {
                    flip_path(matching, &prev, start, v);
                    return true;
                }
                Some(w) => {
                    if !visited[w.index()] {
                        visited[w.index()] = true;
                        prev[w.index()] = Some(v);
                        queue.push_back(w);
                    }
                }
            }
        }
    }
    false
}

fn flip_path(
    matching: &mut [Option<NodeIndex>],
    prev: &[Option<NodeIndex>],
    start: NodeIndex,
    end: NodeIndex,
) {
    let mut v = end;
    while let Some(u) = prev[v.index()] {
        matching[v.index()] = Some(u);
        matching[u.index()] = Some(v);
        if u == start {
            break;
        }
        match prev[u.index()] {
            Some(p) => v = p,
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_from_edges(n: usize, edges: &[(usize, usize)]) -> UnGraph<(), ()> {
        let mut graph = UnGraph::new_undirected();
        let nodes: Vec<NodeIndex> = (0..n).map(|_| graph.add_node(())).collect();
        for &(a, b) in edges {
            graph.add_edge(nodes[a], nodes[b], ());
        }
        graph
    }

    fn check_perfect(matching: &[NodeIndex], edges: &[(usize, usize)]) {
        for (v, &mate) in matching.iter().enumerate() {
            assert_ne!(v, mate.index(), "self-matched vertex {v}");
            assert_eq!(matching[mate.index()].index(), v, "asymmetric matching");
            assert!(
                edges.contains(&(v, mate.index())) || edges.contains(&(mate.index(), v)),
                "matched pair ({v}, {}) is not an edge",
                mate.index()
            );
        }
    }

    #[test]
    fn empty_graph() {
        let graph = graph_from_edges(0, &[]);
        assert_eq!(find_perfect_matching(&graph), Some(vec![]));
    }

    #[test]
    fn single_edge() {
        let edges = [(0, 1)];
        let graph = graph_from_edges(2, &edges);
        let matching = find_perfect_matching(&graph).unwrap();
        check_perfect(&matching, &edges);
    }

    #[test]
    fn path_of_three_fails() {
        let graph = graph_from_edges(3, &[(0, 1), (1, 2)]);
        assert_eq!(find_perfect_matching(&graph), None);
    }

    #[test]
    fn even_cycle() {
        let edges = [(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 0)];
        let graph = graph_from_edges(6, &edges);
        let matching = find_perfect_matching(&graph).unwrap();
        check_perfect(&matching, &edges);
    }

    #[test]
    fn odd_cycle_fails() {
        let graph = graph_from_edges(5, &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 0)]);
        assert_eq!(find_perfect_matching(&graph), None);
    }

    #[test]
    fn isolated_vertex_fails() {
        let graph = graph_from_edges(3, &[(0, 1)]);
        assert_eq!(find_perfect_matching(&graph), None);
    }

    #[test]
    fn fused_rings() {
        // naphthalene skeleton
        let edges = [
            (0, 1), (1, 2), (2, 3), (3, 4), (4, 5),
            (5, 6), (6, 7), (7, 8), (8, 9), (9, 0),
            (4, 9),
        ];
        let graph = graph_from_edges(10, &edges);
        let matching = find_perfect_matching(&graph).unwrap();
        check_perfect(&matching, &edges);
    }

    #[test]
    fn path_of_four() {
        let edges = [(0, 1), (1, 2), (2, 3)];
        let graph = graph_from_edges(4, &edges);
        let matching = find_perfect_matching(&graph).unwrap();
        check_perfect(&matching, &edges);
    }

    #[test]
    fn long_even_cycle_with_chords() {
        let edges = [
            (0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 6), (6, 7), (7, 0),
            (1, 6), (2, 5),
        ];
        let graph = graph_from_edges(8, &edges);
        let matching = find_perfect_matching(&graph).unwrap();
        check_perfect(&matching, &edges);
    }
}
