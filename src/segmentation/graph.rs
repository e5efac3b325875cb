//! s-t min-cut on a pixel graph (Boykov-Kolmogorov augmenting paths)
//!
//! Terminal capacities are folded into a signed per-vertex weight: positive
//! means residual capacity from the source, negative to the sink. Edges are
//! stored in pairs so that `e ^ 1` is always the reverse of `e`; indices 0
//! and 1 are reserved so that 0 can mean "no edge".

const TERMINAL: i32 = -1;
const ORPHAN: i32 = -2;

#[derive(Debug, Clone, Copy, Default)]
struct Vertex {
    /// Next vertex in the active queue; `None` when not queued
    next: Option<usize>,
    /// Edge to the parent in the search tree, `TERMINAL`, `ORPHAN` or 0 (free)
    parent: i32,
    /// Head of the adjacency list (0 = empty)
    first: i32,
    ts: i32,
    dist: i32,
    weight: f64,
    /// 0 = source tree, 1 = sink tree
    tree: u8,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    dst: u32,
    next: i32,
    weight: f64,
}

/// Capacitated graph with source and sink terminals
#[derive(Debug, Clone)]
pub struct FlowGraph {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    flow: f64,
}

impl FlowGraph {
    #[must_use]
    pub fn with_capacity(vertex_count: usize, edge_count: usize) -> Self {
        let mut edges = Vec::with_capacity(edge_count + 2);
        edges.resize(
            2,
            Edge {
                dst: 0,
                next: 0,
                weight: 0.0,
            },
        );
        Self {
            vertices: Vec::with_capacity(vertex_count),
            edges,
            flow: 0.0,
        }
    }

    pub fn add_vertex(&mut self) -> usize {
        self.vertices.push(Vertex::default());
        self.vertices.len() - 1
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Add the edge pair `i -> j` (capacity `weight`) and `j -> i` (`reverse_weight`)
    pub fn add_edges(&mut self, i: usize, j: usize, weight: f64, reverse_weight: f64) {
        debug_assert!(i != j);
        debug_assert!(weight >= 0.0 && reverse_weight >= 0.0);

        let forward = self.edges.len() as i32;
        self.edges.push(Edge {
            dst: j as u32,
            next: self.vertices[i].first,
            weight,
        });
        self.vertices[i].first = forward;

        let backward = self.edges.len() as i32;
        self.edges.push(Edge {
            dst: i as u32,
            next: self.vertices[j].first,
            weight: reverse_weight,
        });
        self.vertices[j].first = backward;
    }

    /// Add terminal capacities; only their difference matters for the cut
    pub fn add_term_weights(&mut self, i: usize, source_weight: f64, sink_weight: f64) {
        let mut source_weight = source_weight;
        let mut sink_weight = sink_weight;
        let existing = self.vertices[i].weight;
        if existing > 0.0 {
            source_weight += existing;
        } else {
            sink_weight -= existing;
        }
        self.flow += source_weight.min(sink_weight);
        self.vertices[i].weight = source_weight - sink_weight;
    }

    /// Whether vertex `i` ended on the source side of the minimum cut
    #[must_use]
    pub fn in_source_segment(&self, i: usize) -> bool {
        self.vertices[i].tree == 0
    }

    /// Compute the maximum flow, leaving the cut readable via [`Self::in_source_segment`]
    pub fn max_flow(&mut self) -> f64 {
        if self.vertices.is_empty() {
            return self.flow;
        }

        let nil = self.vertices.len();
        self.vertices.push(Vertex::default());
        let vtx = &mut self.vertices;
        let edges = &mut self.edges;

        let mut last = nil;
        vtx[nil].next = Some(nil);
        for i in 0..nil {
            vtx[i].ts = 0;
            if vtx[i].weight == 0.0 {
                vtx[i].parent = 0;
            } else {
                vtx[last].next = Some(i);
                last = i;
                vtx[i].dist = 1;
                vtx[i].parent = TERMINAL;
                vtx[i].tree = u8::from(vtx[i].weight < 0.0);
            }
        }
        let mut first = vtx[nil].next.unwrap_or(nil);
        vtx[last].next = Some(nil);
        vtx[nil].next = None;

        let mut curr_ts = 0;
        let mut orphans: Vec<usize> = Vec::new();

        loop {
            // Grow both search trees until they touch
            let mut e0: i32 = -1;
            while first != nil {
                let v = first;
                if vtx[v].parent != 0 {
                    let vt = i32::from(vtx[v].tree);
                    let mut ei = vtx[v].first;
                    while ei != 0 {
                        let next_ei = edges[ei as usize].next;
                        if edges[(ei ^ vt) as usize].weight == 0.0 {
                            ei = next_ei;
                            continue;
                        }
                        let u = edges[ei as usize].dst as usize;
                        if vtx[u].parent == 0 {
                            vtx[u].tree = vt as u8;
                            vtx[u].parent = ei ^ 1;
                            vtx[u].ts = vtx[v].ts;
                            vtx[u].dist = vtx[v].dist + 1;
                            if vtx[u].next.is_none() {
                                vtx[u].next = Some(nil);
                                vtx[last].next = Some(u);
                                last = u;
                            }
                            ei = next_ei;
                            continue;
                        }

                        if i32::from(vtx[u].tree) != vt {
                            e0 = ei ^ vt;
                            break;
                        }

                        if vtx[u].dist > vtx[v].dist + 1 && vtx[u].ts <= vtx[v].ts {
                            vtx[u].parent = ei ^ 1;
                            vtx[u].ts = vtx[v].ts;
                            vtx[u].dist = vtx[v].dist + 1;
                        }
                        ei = next_ei;
                    }
                    if e0 > 0 {
                        break;
                    }
                }
                first = vtx[v].next.unwrap_or(nil);
                vtx[v].next = None;
            }

            if e0 <= 0 {
                break;
            }

            // Bottleneck capacity along the source-sink path
            let mut min_weight = edges[e0 as usize].weight;
            for k in [1, 0] {
                let mut v = edges[(e0 ^ k) as usize].dst as usize;
                loop {
                    let ei = vtx[v].parent;
                    if ei < 0 {
                        break;
                    }
                    min_weight = min_weight.min(edges[(ei ^ k) as usize].weight);
                    v = edges[ei as usize].dst as usize;
                }
                min_weight = min_weight.min(vtx[v].weight.abs());
            }

            // Push the flow and collect vertices whose parent edge saturated
            edges[e0 as usize].weight -= min_weight;
            edges[(e0 ^ 1) as usize].weight += min_weight;
            self.flow += min_weight;

            for k in [1, 0] {
                let mut v = edges[(e0 ^ k) as usize].dst as usize;
                loop {
                    let ei = vtx[v].parent;
                    if ei < 0 {
                        break;
                    }
                    edges[(ei ^ (k ^ 1)) as usize].weight += min_weight;
                    edges[(ei ^ k) as usize].weight -= min_weight;
                    if edges[(ei ^ k) as usize].weight == 0.0 {
                        orphans.push(v);
                        vtx[v].parent = ORPHAN;
                    }
                    v = edges[ei as usize].dst as usize;
                }

                vtx[v].weight += min_weight * f64::from(1 - k * 2);
                if vtx[v].weight == 0.0 {
                    orphans.push(v);
                    vtx[v].parent = ORPHAN;
                }
            }

            // Re-attach orphans to their tree or release them
            curr_ts += 1;
            while let Some(v2) = orphans.pop() {
                let mut min_dist = i32::MAX;
                let mut best_edge = 0;
                let vt = i32::from(vtx[v2].tree);

                let mut ei = vtx[v2].first;
                while ei != 0 {
                    let next_ei = edges[ei as usize].next;
                    if edges[(ei ^ (vt ^ 1)) as usize].weight == 0.0 {
                        ei = next_ei;
                        continue;
                    }
                    let mut u = edges[ei as usize].dst as usize;
                    if i32::from(vtx[u].tree) != vt || vtx[u].parent == 0 {
                        ei = next_ei;
                        continue;
                    }

                    // Distance from u to its tree root
                    let mut d = 0i32;
                    loop {
                        if vtx[u].ts == curr_ts {
                            d += vtx[u].dist;
                            break;
                        }
                        let ej = vtx[u].parent;
                        d += 1;
                        if ej < 0 {
                            if ej == ORPHAN {
                                d = i32::MAX - 1;
                            } else {
                                vtx[u].ts = curr_ts;
                                vtx[u].dist = 1;
                            }
                            break;
                        }
                        u = edges[ej as usize].dst as usize;
                    }

                    d = d.saturating_add(1);
                    if d < i32::MAX {
                        if d < min_dist {
                            min_dist = d;
                            best_edge = ei;
                        }
                        let mut u = edges[ei as usize].dst as usize;
                        while vtx[u].ts != curr_ts {
                            vtx[u].ts = curr_ts;
                            d -= 1;
                            vtx[u].dist = d;
                            u = edges[vtx[u].parent as usize].dst as usize;
                        }
                    }
                    ei = next_ei;
                }

                vtx[v2].parent = best_edge;
                if best_edge > 0 {
                    vtx[v2].ts = curr_ts;
                    vtx[v2].dist = min_dist;
                    continue;
                }

                // No parent found: free the vertex and requeue its neighbours
                vtx[v2].ts = 0;
                let mut ei = vtx[v2].first;
                while ei != 0 {
                    let u = edges[ei as usize].dst as usize;
                    let ej = vtx[u].parent;
                    if i32::from(vtx[u].tree) == vt && ej != 0 {
                        if edges[(ei ^ (vt ^ 1)) as usize].weight != 0.0 && vtx[u].next.is_none() {
                            vtx[u].next = Some(nil);
                            vtx[last].next = Some(u);
                            last = u;
                        }
                        if ej > 0 && edges[ej as usize].dst as usize == v2 {
                            orphans.push(u);
                            vtx[u].parent = ORPHAN;
                        }
                    }
                    ei = edges[ei as usize].next;
                }
            }
        }

        self.vertices.pop();
        self.flow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_vertex_cut() {
        // source -3-> a -1-> b -3-> sink : the a-b edge is the bottleneck
        let mut graph = FlowGraph::with_capacity(2, 2);
        let a = graph.add_vertex();
        let b = graph.add_vertex();
        graph.add_term_weights(a, 3.0, 0.0);
        graph.add_term_weights(b, 0.0, 3.0);
        graph.add_edges(a, b, 1.0, 1.0);

        let flow = graph.max_flow();
        assert!((flow - 1.0).abs() < 1e-12);
        assert!(graph.in_source_segment(a));
        assert!(!graph.in_source_segment(b));
    }

    #[test]
    fn test_chain_follows_strong_links() {
        // A chain whose middle vertex has no terminal preference joins the
        // side it is bound to more strongly.
        let mut graph = FlowGraph::with_capacity(3, 4);
        let a = graph.add_vertex();
        let m = graph.add_vertex();
        let c = graph.add_vertex();
        graph.add_term_weights(a, 10.0, 0.0);
        graph.add_term_weights(c, 0.0, 10.0);
        graph.add_edges(a, m, 5.0, 5.0);
        graph.add_edges(m, c, 1.0, 1.0);

        let flow = graph.max_flow();
        assert!((flow - 1.0).abs() < 1e-12);
        assert!(graph.in_source_segment(a));
        assert!(graph.in_source_segment(m));
        assert!(!graph.in_source_segment(c));
    }

    #[test]
    fn test_grid_flow_equals_min_cut() {
        // 2x2 grid, left column tied to the source, right column to the sink
        let mut graph = FlowGraph::with_capacity(4, 8);
        let v: Vec<usize> = (0..4).map(|_| graph.add_vertex()).collect();
        graph.add_term_weights(v[0], 4.0, 0.0);
        graph.add_term_weights(v[2], 4.0, 0.0);
        graph.add_term_weights(v[1], 0.0, 4.0);
        graph.add_term_weights(v[3], 0.0, 4.0);
        graph.add_edges(v[0], v[1], 2.0, 2.0);
        graph.add_edges(v[2], v[3], 2.0, 2.0);
        graph.add_edges(v[0], v[2], 9.0, 9.0);
        graph.add_edges(v[1], v[3], 9.0, 9.0);

        let flow = graph.max_flow();
        assert!((flow - 4.0).abs() < 1e-12);
        assert!(graph.in_source_segment(v[0]) && graph.in_source_segment(v[2]));
        assert!(!graph.in_source_segment(v[1]) && !graph.in_source_segment(v[3]));
    }
}
