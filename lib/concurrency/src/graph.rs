use common::TxnId;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Directed wait-for graph over transaction ids.
///
/// An edge u → v means u waits for v. Vertices are added at `begin` and removed
/// when the transaction ends or aborts; removing a vertex also removes it from
/// every other vertex's adjacency set, so stale edges cannot linger.
#[derive(Debug, Default)]
pub struct WaitForGraph {
    adjacency: BTreeMap<TxnId, BTreeSet<TxnId>>,
}

impl WaitForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_vertex(&mut self, txn: TxnId) {
        self.adjacency.entry(txn).or_default();
    }

    pub fn contains_vertex(&self, txn: TxnId) -> bool {
        self.adjacency.contains_key(&txn)
    }

    pub fn remove_vertex(&mut self, txn: TxnId) {
        self.adjacency.remove(&txn);
        for neighbors in self.adjacency.values_mut() {
            neighbors.remove(&txn);
        }
    }

    /// Add `from → to`. Both endpoints must be live vertices; self-edges are
    /// never recorded.
    pub fn add_edge(&mut self, from: TxnId, to: TxnId) {
        if from == to || !self.adjacency.contains_key(&to) {
            return;
        }
        if let Some(neighbors) = self.adjacency.get_mut(&from) {
            trace!(%from, %to, "wait-for edge");
            neighbors.insert(to);
        }
    }

    pub fn remove_edge(&mut self, from: TxnId, to: TxnId) {
        if let Some(neighbors) = self.adjacency.get_mut(&from) {
            neighbors.remove(&to);
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Every vertex that sits on some cycle, discovered in one DFS sweep.
    ///
    /// The search keeps an explicit recursion stack; hitting a vertex already
    /// on the stack marks everything from its stack position onward as cycle
    /// members. An empty result means the graph is acyclic.
    pub fn detect_cycle(&self) -> Vec<TxnId> {
        let mut cycle: Vec<TxnId> = Vec::new();
        let mut visited: BTreeSet<TxnId> = BTreeSet::new();

        for &root in self.adjacency.keys() {
            if visited.contains(&root) {
                continue;
            }
            visited.insert(root);

            let mut stack: Vec<TxnId> = vec![root];
            let mut frames: Vec<std::vec::IntoIter<TxnId>> = vec![self.neighbors_of(root)];

            while let Some(frame) = frames.last_mut() {
                match frame.next() {
                    Some(next) => {
                        if let Some(pos) = stack.iter().position(|&on_stack| on_stack == next) {
                            // everything from the re-entry point onward witnesses a cycle
                            for &member in &stack[pos..] {
                                if !cycle.contains(&member) {
                                    cycle.push(member);
                                }
                            }
                        } else if !visited.contains(&next) {
                            visited.insert(next);
                            stack.push(next);
                            frames.push(self.neighbors_of(next));
                        }
                    }
                    None => {
                        frames.pop();
                        stack.pop();
                    }
                }
            }
        }

        cycle
    }

    fn neighbors_of(&self, txn: TxnId) -> std::vec::IntoIter<TxnId> {
        self.adjacency
            .get(&txn)
            .map(|neighbors| neighbors.iter().copied().collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions_sorted::assert_eq;

    fn graph_with_vertices(n: u32) -> WaitForGraph {
        let mut graph = WaitForGraph::new();
        for id in 0..n {
            graph.insert_vertex(TxnId::new(id));
        }
        graph
    }

    fn sorted(mut txns: Vec<TxnId>) -> Vec<u32> {
        txns.sort();
        txns.into_iter().map(|t| t.as_u32()).collect()
    }

    #[test]
    fn empty_graph_has_no_cycle() {
        let graph = graph_with_vertices(3);
        assert_eq!(graph.detect_cycle(), vec![]);
    }

    #[test]
    fn chain_has_no_cycle() {
        let mut graph = graph_with_vertices(3);
        graph.add_edge(TxnId::new(0), TxnId::new(1));
        graph.add_edge(TxnId::new(1), TxnId::new(2));
        assert_eq!(graph.detect_cycle(), vec![]);
    }

    #[test]
    fn two_cycle_is_found() {
        let mut graph = graph_with_vertices(2);
        graph.add_edge(TxnId::new(0), TxnId::new(1));
        graph.add_edge(TxnId::new(1), TxnId::new(0));
        assert_eq!(sorted(graph.detect_cycle()), vec![0, 1]);
    }

    #[test]
    fn all_cycles_are_reported_in_one_sweep() {
        // 1 ⇄ 2, 2 → 3 → 4 → 1, and a disjoint 5 → 6 → 7 → 5 rotor, with 0
        // feeding in from outside any cycle.
        let mut graph = graph_with_vertices(8);
        graph.add_edge(TxnId::new(0), TxnId::new(1));
        graph.add_edge(TxnId::new(1), TxnId::new(2));
        graph.add_edge(TxnId::new(2), TxnId::new(1));
        graph.add_edge(TxnId::new(2), TxnId::new(3));
        graph.add_edge(TxnId::new(2), TxnId::new(5));
        graph.add_edge(TxnId::new(3), TxnId::new(4));
        graph.add_edge(TxnId::new(4), TxnId::new(1));
        graph.add_edge(TxnId::new(5), TxnId::new(6));
        graph.add_edge(TxnId::new(6), TxnId::new(7));
        graph.add_edge(TxnId::new(7), TxnId::new(5));

        assert_eq!(sorted(graph.detect_cycle()), vec![1, 2, 3, 4, 5, 6, 7]);

        graph.remove_vertex(TxnId::new(4));
        assert_eq!(sorted(graph.detect_cycle()), vec![1, 2, 5, 6, 7]);

        graph.remove_vertex(TxnId::new(5));
        assert_eq!(sorted(graph.detect_cycle()), vec![1, 2]);

        graph.remove_vertex(TxnId::new(1));
        assert_eq!(graph.detect_cycle(), vec![]);
    }

    #[test]
    fn removing_a_vertex_drops_incoming_edges() {
        let mut graph = graph_with_vertices(2);
        graph.add_edge(TxnId::new(0), TxnId::new(1));
        graph.remove_vertex(TxnId::new(1));

        // re-inserting the vertex must not resurrect the old edge
        graph.insert_vertex(TxnId::new(1));
        graph.add_edge(TxnId::new(1), TxnId::new(0));
        assert_eq!(graph.detect_cycle(), vec![]);
    }

    #[test]
    fn self_edges_are_ignored() {
        let mut graph = graph_with_vertices(1);
        graph.add_edge(TxnId::new(0), TxnId::new(0));
        assert_eq!(graph.detect_cycle(), vec![]);
    }

    #[test]
    fn edges_to_dead_vertices_are_ignored() {
        let mut graph = graph_with_vertices(2);
        graph.remove_vertex(TxnId::new(1));
        graph.add_edge(TxnId::new(0), TxnId::new(1));
        assert_eq!(graph.detect_cycle(), vec![]);
    }
}
