pub mod edge_encoder;
pub mod geometry_utils;
pub mod osm_graph;
pub mod road_network;
pub mod street_graph;
