use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::compiler::error::CompileError;
use crate::dsl::{Graph, Node, ShaderStage};

/// Kahn's algorithm over the edges tagged with `stage`.
pub fn topo_sort(graph: &Graph, stage: ShaderStage) -> Result<Vec<String>, CompileError> {
    let mut indeg: HashMap<&str, usize> = graph
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), 0usize))
        .collect();

    let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
    for e in graph.edges.iter().filter(|e| e.stage == stage) {
        let Some(d) = indeg.get_mut(e.to.as_str()) else {
            return Err(CompileError::DanglingEdge {
                from: e.from.clone(),
                to: e.to.clone(),
            });
        };
        if !graph.nodes.iter().any(|n| n.id == e.from) {
            return Err(CompileError::DanglingEdge {
                from: e.from.clone(),
                to: e.to.clone(),
            });
        }
        *d += 1;
        outgoing.entry(e.from.as_str()).or_default().push(e.to.as_str());
    }

    // Seed in graph order so the result is deterministic.
    let mut q: VecDeque<&str> = graph
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| indeg.get(id) == Some(&0))
        .collect();
    let mut order: Vec<String> = Vec::with_capacity(graph.nodes.len());

    while let Some(n) = q.pop_front() {
        order.push(n.to_string());
        if let Some(nexts) = outgoing.get(n) {
            for m in nexts {
                if let Some(entry) = indeg.get_mut(m) {
                    *entry -= 1;
                    if *entry == 0 {
                        q.push_back(m);
                    }
                }
            }
        }
    }

    if order.len() != graph.nodes.len() {
        return Err(CompileError::CyclicGraph(stage));
    }
    Ok(order)
}

/// Rejects graphs that contain a cycle in either stage.
pub fn check_acyclic(graph: &Graph) -> Result<(), CompileError> {
    for stage in [ShaderStage::Fragment, ShaderStage::Vertex] {
        topo_sort(graph, stage)?;
    }
    Ok(())
}

/// Every node reachable backwards from `start` over incoming edges, `start` included.
pub fn collect_connected_nodes<'a>(graph: &'a Graph, start: &'a Node) -> BTreeMap<String, &'a Node> {
    let mut incoming: HashMap<&str, Vec<&str>> = HashMap::new();
    for e in &graph.edges {
        incoming.entry(e.to.as_str()).or_default().push(e.from.as_str());
    }

    let mut visited: BTreeMap<String, &Node> = BTreeMap::new();
    let mut stack: Vec<&Node> = vec![start];
    while let Some(node) = stack.pop() {
        if visited.contains_key(&node.id) {
            continue;
        }
        visited.insert(node.id.clone(), node);
        if let Some(prevs) = incoming.get(node.id.as_str()) {
            for p in prevs {
                if visited.contains_key(*p) {
                    continue;
                }
                if let Some(prev) = graph.nodes.iter().find(|n| n.id == *p) {
                    stack.push(prev);
                }
            }
        }
    }
    visited
}

/// Vertex nodes whose `nextStageNodeId` is part of the fragment program but which
/// the vertex output never reaches. Returned in graph order.
pub fn find_orphan_vertex_nodes<'a>(
    graph: &'a Graph,
    fragment_ids: &BTreeMap<String, &'a Node>,
    vertex_ids: &BTreeMap<String, &'a Node>,
) -> Vec<&'a Node> {
    graph
        .nodes
        .iter()
        .filter(|n| n.stage == ShaderStage::Vertex)
        .filter(|n| {
            n.next_stage_node_id
                .as_deref()
                .is_some_and(|next| fragment_ids.contains_key(next))
        })
        .filter(|n| !vertex_ids.contains_key(&n.id))
        .collect()
}

/// True when some node downstream of `node` is another shader node, meaning
/// this node's position output feeds further position transformation.
pub fn links_through_shader(graph: &Graph, node: &Node) -> bool {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = vec![node.id.as_str()];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        for e in graph.edges.iter().filter(|e| e.from == id) {
            let Some(next) = graph.nodes.iter().find(|n| n.id == e.to) else {
                continue;
            };
            if next.is_shader() && next.stage == node.stage {
                return true;
            }
            stack.push(next.id.as_str());
        }
    }
    false
}
