// Removal of small disconnected parts of the road network.
//
// Tiny islands (a parking lot mapped without its access road, a lone footway)
// would otherwise produce a flood of dead ends. They are reported in their own
// file instead and hidden from the analysis.

use crate::geojson_writer::{GeoJsonWriter, island_feature};
use crate::routing_common::road_network::{EdgeId, FetchMode, NodeId, RoadNetwork};
use crate::routing_common::street_graph::StreetGraph;
use crate::topology::error::SubnetworkError;
use crate::topology::osm_id_store::OsmIdStore;
use std::collections::VecDeque;
use tracing::info;

const UNASSIGNED: u32 = u32::MAX;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubnetworkPlan {
    pub subnetworks: usize,
    pub removed_subnetworks: usize,
    pub removed_nodes: Vec<NodeId>,
    pub removed_edges: Vec<EdgeId>,
}

/// Label every non-isolated node with its component; returns the labels and
/// the node count per component.
fn label_components(graph: &StreetGraph) -> (Vec<u32>, Vec<usize>) {
    let node_count = graph.node_count();
    let mut component = vec![UNASSIGNED; node_count as usize];
    let mut sizes: Vec<usize> = Vec::new();
    let mut queue: VecDeque<NodeId> = VecDeque::new();

    for start in 0..node_count {
        if component[start as usize] != UNASSIGNED
            || graph.is_node_removed(start)
            || graph.edges_of(start).is_empty()
        {
            continue;
        }
        let label = sizes.len() as u32;
        let mut size = 0;
        component[start as usize] = label;
        queue.push_back(start);
        while let Some(node) = queue.pop_front() {
            size += 1;
            for edge in graph.edges_of(node) {
                if component[edge.adj as usize] == UNASSIGNED {
                    component[edge.adj as usize] = label;
                    queue.push_back(edge.adj);
                }
            }
        }
        sizes.push(size);
    }
    (component, sizes)
}

/// Decide which nodes and edges go. The largest component always stays, as
/// does every component with at least `min_size` nodes.
pub fn plan_removal(graph: &StreetGraph, min_size: usize) -> Result<SubnetworkPlan, SubnetworkError> {
    let (component, sizes) = label_components(graph);
    let mut plan = SubnetworkPlan {
        subnetworks: sizes.len(),
        ..SubnetworkPlan::default()
    };
    if min_size == 0 || sizes.is_empty() {
        return Ok(plan);
    }

    let largest = sizes
        .iter()
        .enumerate()
        .max_by_key(|&(i, size)| (*size, std::cmp::Reverse(i)))
        .map(|(i, _)| i)
        .unwrap_or_default();
    let remove: Vec<bool> = sizes
        .iter()
        .enumerate()
        .map(|(i, &size)| i != largest && size < min_size)
        .collect();
    plan.removed_subnetworks = remove.iter().filter(|&&r| r).count();

    let is_removed = |node: NodeId| {
        let label = component[node as usize];
        label != UNASSIGNED && remove[label as usize]
    };
    plan.removed_nodes = (0..graph.node_count()).filter(|&n| is_removed(n)).collect();
    plan.removed_edges = (0..graph.edge_count())
        .filter(|&e| is_removed(graph.edge_nodes(e).0))
        .collect();

    let total = graph.edge_count() as usize;
    if plan.removed_edges.len() * 2 > total {
        return Err(SubnetworkError::TooManyRemoved {
            removed: plan.removed_edges.len(),
            total,
        });
    }
    Ok(plan)
}

/// Remove components smaller than `min_size` nodes from `graph` and write
/// each of their edges once to `islands`.
pub fn remove_small_subnetworks(
    graph: &mut StreetGraph,
    way_ids: &OsmIdStore,
    min_size: usize,
    islands: &mut GeoJsonWriter,
) -> Result<SubnetworkPlan, SubnetworkError> {
    let plan = plan_removal(graph, min_size)?;

    let mut way_ids = way_ids.accessor();
    for &edge in &plan.removed_edges {
        let (base, _) = graph.edge_nodes(edge);
        let edge_ref = graph
            .edges_of(base)
            .into_iter()
            .find(|e| e.edge == edge);
        let Some(edge_ref) = edge_ref else {
            continue;
        };
        let geometry = graph.fetch_geometry(&edge_ref, FetchMode::All);
        islands
            .write_feature(&island_feature(&geometry, way_ids.osm_id(edge)))
            .map_err(SubnetworkError::Sink)?;
    }
    for &node in &plan.removed_nodes {
        graph.mark_node_removed(node);
    }

    info!(
        "Found {} subnetworks, removed {} of them with {} nodes and {} edges",
        plan.subnetworks,
        plan.removed_subnetworks,
        plan.removed_nodes.len(),
        plan.removed_edges.len()
    );
    Ok(plan)
}
