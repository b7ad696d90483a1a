use crate::topology::priorities::PriorityTable;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuditConfig {
    /// Search radius around a dead end, in meters.
    pub radius: f64,
    /// Compare network and beeline distance for footways, paths and steps.
    pub do_routing: bool,
    pub worker_threads: usize,
    /// Nodes per job.
    pub batch_size: u32,
    /// Components with fewer nodes are removed before the analysis. 0 disables.
    pub min_network_size: usize,
    /// Node limit of the bounded path search.
    pub routing_max_nodes: usize,
    /// Distance limit of the bounded path search as a multiple of `radius`.
    pub routing_distance_factor: f64,
    pub priorities: PriorityTable,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            radius: 15.0,
            do_routing: false,
            worker_threads: 2,
            batch_size: 1000,
            min_network_size: 200,
            routing_max_nodes: 80,
            // a ratio of 6 or more leaves the priority untouched
            routing_distance_factor: 6.0,
            priorities: PriorityTable::default(),
        }
    }
}

impl AuditConfig {
    pub fn routing_max_distance(&self) -> f64 {
        self.radius * self.routing_distance_factor
    }
}
