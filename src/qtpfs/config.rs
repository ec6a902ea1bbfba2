//! Tunables of the pathfinding system, chosen once at startup
//!

use std::path::{Path, PathBuf};

use crate::prelude::*;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// How terrain changes reach the node layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect, Serialize, Deserialize)]
pub enum LayerUpdateMode {
	/// Every layer is re-tesselated as soon as a change is reported
	#[default]
	Immediate,
	/// Changes are queued per layer and drained a fraction at a time, a layer
	/// with pending searches is drained completely first
	Staggered,
}

/// Where the per-tick update work runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect, Serialize, Deserialize)]
pub enum ExecutionMode {
	/// Inside the caller's simulation step
	#[default]
	Synchronous,
	/// On a dedicated worker thread between `begin_update` and `finish_update`
	Background,
}

/// How work spanning every layer (initial tesselation, immediate terrain
/// changes) is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect, Serialize, Deserialize)]
pub enum LayerInitMode {
	/// Layers are processed in parallel on the compute task pool
	#[default]
	Pooled,
	/// Layers are processed one after another
	Sequential,
}

/// Combination of the scheduling choices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect, Serialize, Deserialize)]
pub struct UpdateStrategy {
	/// How terrain changes reach the layers
	pub layer_updates: LayerUpdateMode,
	/// Where updates run
	pub execution: ExecutionMode,
	/// How multi-layer work is spread
	pub layer_init: LayerInitMode,
}

/// Configuration of the pathfinding system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QtpfsConfig {
	/// Leaves narrower than this (in squares) along x are not split further
	pub min_leaf_size_x: u32,
	/// Leaves narrower than this (in squares) along z are not split further
	pub min_leaf_size_z: u32,
	/// Deepest level a tree may reach
	pub max_depth: u32,
	/// Largest difference in speed bins tolerated inside one leaf
	pub homogeneity_tolerance: u32,
	/// Number of bins speed mods are quantised into
	pub num_speed_mod_bins: u32,
	/// Number of updates it takes to visit every layer once
	pub max_update_delay: u32,
	/// Searches a single team may execute per update
	pub max_team_searches: u32,
	/// Searches executed per update across all layers and teams
	pub max_searches_per_update: u32,
	/// Number of teams, requests without an owner use an extra slot
	pub num_teams: usize,
	/// Fraction of a layer's queued terrain changes applied per update in staggered mode
	pub staggered_update_fraction: f32,
	/// Straighten paths by sliding waypoints along the edges they cross
	pub smooth_paths: bool,
	/// Upper bound on smoothing passes
	pub max_smoothing_iterations: u32,
	/// When the target cannot be reached produce a path to the closest reachable node
	pub allow_partial_searches: bool,
	/// Flavour of search run for every request
	pub search_type: SearchType,
	/// Let requests with the same endpoints in one update reuse a single search
	pub share_paths: bool,
	/// Allow leaves under blocking changes to split below the minimum leaf size
	pub force_tesselate_blocking: bool,
	/// Directory under which tree shapes are cached, `None` disables the cache
	pub cache_dir: Option<PathBuf>,
	/// Scheduling choices
	pub strategy: UpdateStrategy,
}

impl Default for QtpfsConfig {
	fn default() -> Self {
		QtpfsConfig {
			min_leaf_size_x: 2,
			min_leaf_size_z: 2,
			max_depth: 16,
			homogeneity_tolerance: 0,
			num_speed_mod_bins: 20,
			max_update_delay: 2,
			max_team_searches: 10,
			max_searches_per_update: 512,
			num_teams: 16,
			staggered_update_fraction: 0.25,
			smooth_paths: true,
			max_smoothing_iterations: 8,
			allow_partial_searches: false,
			search_type: SearchType::AStar,
			share_paths: true,
			force_tesselate_blocking: false,
			cache_dir: None,
			strategy: UpdateStrategy::default(),
		}
	}
}

impl QtpfsConfig {
	/// Read a configuration from a `.ron` file, fields that are left out take
	/// their default values
	pub fn from_ron<P: AsRef<Path>>(path: P) -> Result<Self, QtpfsError> {
		let file = std::fs::File::open(path)?;
		let config: QtpfsConfig = ron::de::from_reader(file)?;
		Ok(config)
	}
	/// Builder to set the scheduling strategy
	pub fn with_strategy(mut self, strategy: UpdateStrategy) -> Self {
		self.strategy = strategy;
		self
	}
	/// Builder to set the cache directory
	pub fn with_cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
		self.cache_dir = Some(dir.into());
		self
	}
	/// Number of layers updated per tick when there are `num_layers` layers
	pub fn get_layers_per_update(&self, num_layers: usize) -> usize {
		(num_layers / self.max_update_delay.max(1) as usize).max(1)
	}
	/// Parameters steering tesselation
	pub fn get_tesselation_params(&self) -> TesselationParams {
		TesselationParams {
			min_size_x: self.min_leaf_size_x.max(1),
			min_size_z: self.min_leaf_size_z.max(1),
			max_depth: self.max_depth,
			homogeneity_tolerance: self.homogeneity_tolerance as i32,
			num_speed_mod_bins: self.num_speed_mod_bins.max(1),
		}
	}
}
