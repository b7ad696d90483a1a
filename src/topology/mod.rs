pub mod barriers;
pub mod detector;
pub mod dijkstra_limits;
pub mod error;
pub mod findings;
pub mod osm_id_store;
pub mod pipeline;
pub mod priorities;
pub mod subnetworks;

#[cfg(test)]
mod test_detector;
#[cfg(test)]
mod test_pipeline;
