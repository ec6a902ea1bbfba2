//! How terrain changes reach the node layers, and how work spanning every
//! layer is spread across threads
//!

use crate::prelude::*;
use bevy::tasks::{ComputeTaskPool, TaskPool};

/// Decides when a reported terrain change is applied to each layer
pub trait LayerUpdateStrategy: Send + Sync {
	/// A change was reported over `rect` (in squares, before footprint expansion)
	fn terrain_change(
		&self,
		shards: &mut [LayerShard],
		terrain: &dyn TerrainProvider,
		layer_init: LayerInitMode,
		rect: &PathRectangle,
	) -> Result<(), QtpfsError>;
	/// Called for every layer at the start of an update, before any search
	/// runs. `pending` is set for a layer whose searches run this update
	fn before_searches(
		&self,
		shard: &mut LayerShard,
		terrain: &dyn TerrainProvider,
		config: &QtpfsConfig,
		pending: bool,
	) -> Result<(), QtpfsError>;
	/// Name used in logs
	fn get_name(&self) -> &'static str;
}

/// Every layer is re-tesselated as soon as a change is reported
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateLayerUpdates;

impl LayerUpdateStrategy for ImmediateLayerUpdates {
	fn terrain_change(
		&self,
		shards: &mut [LayerShard],
		terrain: &dyn TerrainProvider,
		layer_init: LayerInitMode,
		rect: &PathRectangle,
	) -> Result<(), QtpfsError> {
		layer_init.for_each_shard(shards, |shard| {
			let affected = shard.get_affected_rect(rect);
			shard.apply_terrain_change(&affected, terrain)
		})?;
		Ok(())
	}
	fn before_searches(
		&self,
		_shard: &mut LayerShard,
		_terrain: &dyn TerrainProvider,
		_config: &QtpfsConfig,
		_pending: bool,
	) -> Result<(), QtpfsError> {
		Ok(())
	}
	fn get_name(&self) -> &'static str {
		"immediate"
	}
}

/// Changes are queued per layer and applied a fraction at a time. A layer
/// about to run searches has its queue drained first so searches never see a
/// stale tree
#[derive(Clone, Copy, Debug, Default)]
pub struct StaggeredLayerUpdates;

impl LayerUpdateStrategy for StaggeredLayerUpdates {
	fn terrain_change(
		&self,
		shards: &mut [LayerShard],
		_terrain: &dyn TerrainProvider,
		_layer_init: LayerInitMode,
		rect: &PathRectangle,
	) -> Result<(), QtpfsError> {
		for shard in shards.iter_mut() {
			let affected = shard.get_affected_rect(rect);
			shard.queue_terrain_change(affected);
		}
		Ok(())
	}
	fn before_searches(
		&self,
		shard: &mut LayerShard,
		terrain: &dyn TerrainProvider,
		config: &QtpfsConfig,
		pending: bool,
	) -> Result<(), QtpfsError> {
		shard.drain_terrain_changes(terrain, config.staggered_update_fraction, pending)
	}
	fn get_name(&self) -> &'static str {
		"staggered"
	}
}

/// Strategy for a configured mode
pub fn layer_update_strategy(mode: LayerUpdateMode) -> Box<dyn LayerUpdateStrategy> {
	match mode {
		LayerUpdateMode::Immediate => Box::new(ImmediateLayerUpdates),
		LayerUpdateMode::Staggered => Box::new(StaggeredLayerUpdates),
	}
}

impl LayerInitMode {
	/// Run `f` over every shard, returning the results in shard order or the
	/// first error
	pub fn for_each_shard<T, F>(&self, shards: &mut [LayerShard], f: F) -> Result<Vec<T>, QtpfsError>
	where
		T: Send + 'static,
		F: Fn(&mut LayerShard) -> Result<T, QtpfsError> + Sync,
	{
		match self {
			LayerInitMode::Sequential => shards.iter_mut().map(f).collect(),
			LayerInitMode::Pooled => {
				let f = &f;
				let mut results = ComputeTaskPool::get_or_init(TaskPool::default).scope(|scope| {
					for (i, shard) in shards.iter_mut().enumerate() {
						scope.spawn(async move { (i, f(shard)) });
					}
				});
				results.sort_by_key(|(i, _)| *i);
				results.into_iter().map(|(_, r)| r).collect()
			}
		}
	}
}

#[rustfmt::skip]
#[cfg(test)]
mod tests {
	use super::*;

	/// Shards for two classes over `map`, tesselated
	fn shards(map: &HeightMap) -> Vec<LayerShard> {
		let small = MoveDef::new("small", 0, MoveFamily::KBot);
		let large = MoveDef::new("large", 1, MoveFamily::Tank).with_footprint(4, 4);
		let mut shards: Vec<LayerShard> = [small, large].into_iter().enumerate().map(|(i, md)| {
			LayerShard::new(md, NodeLayer::new(i, map.get_map_size(), TesselationParams::default()))
		}).collect();
		for shard in shards.iter_mut() {
			shard.initialise(map, None).unwrap();
		}
		shards
	}

	#[test]
	fn affected_rect_grows_with_footprint() {
		let map = HeightMap::new(64, 64);
		let shards = shards(&map);
		let rect = PathRectangle::new(10, 10, 12, 12);
		assert_eq!(rect, shards[0].get_affected_rect(&rect));
		assert_eq!(PathRectangle::new(8, 8, 14, 14), shards[1].get_affected_rect(&rect));
		let corner = PathRectangle::new(0, 0, 1, 1);
		assert_eq!(PathRectangle::new(0, 0, 3, 3), shards[1].get_affected_rect(&corner));
	}
	#[test]
	fn immediate_changes_land_right_away() {
		let map = HeightMap::new(64, 64);
		let mut shards = shards(&map);
		let before = shards[0].get_layer().get_num_leaf_nodes();
		let rect = PathRectangle::new(20, 20, 24, 24);
		map.set_blocking(&rect, SquareBlocking::Structure);
		for mode in [LayerInitMode::Sequential, LayerInitMode::Pooled] {
			ImmediateLayerUpdates.terrain_change(&mut shards, &map, mode, &rect).unwrap();
		}
		assert!(shards[0].get_layer().get_num_leaf_nodes() > before);
		assert_eq!(0, shards[0].get_layer().get_num_queued_updates());
	}
	#[test]
	fn staggered_changes_wait_for_searches() {
		let map = HeightMap::new(64, 64);
		let mut shards = shards(&map);
		let before = shards[0].get_layer().get_num_leaf_nodes();
		let config = QtpfsConfig::default();
		let strategy = StaggeredLayerUpdates;
		for i in 0..8 {
			let rect = PathRectangle::new(i * 6, 20, i * 6 + 2, 22);
			map.set_blocking(&rect, SquareBlocking::Structure);
			strategy.terrain_change(&mut shards, &map, LayerInitMode::Sequential, &rect).unwrap();
		}
		assert_eq!(before, shards[0].get_layer().get_num_leaf_nodes());
		assert_eq!(8, shards[0].get_layer().get_num_queued_updates());
		// a quarter of the queue without pending searches
		strategy.before_searches(&mut shards[0], &map, &config, false).unwrap();
		assert_eq!(6, shards[0].get_layer().get_num_queued_updates());
		// everything once searches are pending
		strategy.before_searches(&mut shards[0], &map, &config, true).unwrap();
		assert_eq!(0, shards[0].get_layer().get_num_queued_updates());
		assert!(shards[0].get_layer().get_num_leaf_nodes() > before);
	}
	#[test]
	fn pooled_results_in_shard_order() {
		let map = HeightMap::new(32, 32);
		let mut shards = shards(&map);
		let numbers = LayerInitMode::Pooled.for_each_shard(&mut shards, |s| Ok(s.get_layer().get_layer_number())).unwrap();
		assert_eq!(vec![0, 1], numbers);
	}
}
