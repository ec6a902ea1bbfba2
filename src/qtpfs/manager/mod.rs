//! The [PathManager] is the single entry point of the pathfinder. It owns a
//! node layer per movement class along with the paths searched on it and
//! answers requests from the rest of the game:
//!
//! * [PathManager::request_path] queues a search and hands back a [PathId]
//! straight away, the caller follows a temporary heading until the search
//! has run
//! * [PathManager::update] runs the queued searches of a rotating window of
//! layers, within per-team and global budgets
//! * [PathManager::next_way_point] advances a caller along its path
//! * [PathManager::terrain_change] re-tesselates the layers and re-searches
//! any path crossing the changed area, the path keeps its ID
//!
//! With [ExecutionMode::Background] the update runs on a worker thread between
//! [PathManager::begin_update] and [PathManager::finish_update]. Any other call
//! made in between waits for the update to finish first
//!

pub mod persistence;
pub mod state;
pub mod strategy;
mod worker;

use std::sync::Arc;

use crate::prelude::*;
use bevy::prelude::*;
use state::SimState;
use worker::BackgroundWorker;

/// What kind of change happened to the terrain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub enum TerrainChangeKind {
	/// Heights or terrain types changed
	Height,
	/// A structure was placed or removed
	Blocking,
}

/// Pathfinding system resource
#[derive(Resource)]
pub struct PathManager {
	/// Configuration
	config: Arc<QtpfsConfig>,
	/// Simulation state, `None` while the worker holds it
	state: Option<Box<SimState>>,
	/// Update thread when running in [ExecutionMode::Background]
	worker: Option<BackgroundWorker>,
	/// Number of movement classes
	num_layers: usize,
	/// Layers have been tesselated
	finalized: bool,
	/// Checksum of the content and trees
	checksum: u64,
}

impl PathManager {
	/// Create a new instance of [PathManager]. Call [PathManager::load] before
	/// requesting paths
	///
	/// # Panics
	///
	/// The path types of `move_defs` must be `0..move_defs.len()`, each used once
	pub fn new(
		config: QtpfsConfig,
		mut move_defs: Vec<MoveDef>,
		terrain: Arc<dyn TerrainProvider>,
	) -> Result<Self, QtpfsError> {
		move_defs.sort_by_key(|md| md.get_path_type());
		for (i, md) in move_defs.iter().enumerate() {
			if md.get_path_type() != i {
				panic!(
					"MoveDef {} has path type {}, expected {}. Path types must be contiguous from 0",
					md.get_name(),
					md.get_path_type(),
					i
				);
			}
		}
		let num_layers = move_defs.len();
		let worker = match config.strategy.execution {
			ExecutionMode::Synchronous => None,
			ExecutionMode::Background => Some(BackgroundWorker::spawn()?),
		};
		let config = Arc::new(config);
		let state = SimState::new(config.clone(), move_defs, terrain);
		Ok(PathManager {
			config,
			state: Some(Box::new(state)),
			worker,
			num_layers,
			finalized: false,
			checksum: 0,
		})
	}
	/// Get the configuration
	pub fn get_config(&self) -> &QtpfsConfig {
		&self.config
	}
	/// Number of movement classes
	pub fn get_num_layers(&self) -> usize {
		self.num_layers
	}
	/// True once [PathManager::load] has run
	pub fn is_finalized(&self) -> bool {
		self.finalized
	}
	/// Checksum of the content the layers were built from folded with the
	/// shape of every tree, identical on every machine given the same input
	pub fn get_checksum(&self) -> u64 {
		self.checksum
	}
	/// True while a background update is running
	pub fn is_update_in_flight(&self) -> bool {
		self.worker.as_ref().is_some_and(|w| w.is_in_flight())
	}
	/// Tesselate every layer. With a cache directory configured and
	/// `checksums` given, trees are read from the cache when it holds them and
	/// written to it otherwise
	pub fn load(&mut self, checksums: Option<ContentChecksums>) -> Result<(), QtpfsError> {
		if self.finalized {
			warn!("PathManager is already loaded");
			return Ok(());
		}
		let cache = match (&self.config.cache_dir, checksums) {
			(Some(dir), Some(checksums)) => Some(TreeCache::new(dir, checksums)),
			(Some(_), None) => {
				warn!("No content checksums given, the tree cache is disabled");
				None
			}
			(None, _) => None,
		};
		let tree_checksum = self.sync()?.load(cache.as_ref())?;
		let content_checksum = checksums.map(|c| c.get_combined() as u64).unwrap_or(0);
		self.checksum = content_checksum ^ tree_checksum;
		self.finalized = true;
		info!(
			"Pathfinder loaded {} layers, checksum {:016x}",
			self.num_layers,
			self.checksum
		);
		Ok(())
	}
	/// Start an update. In synchronous mode the update runs to completion
	/// here, otherwise it runs on the worker until [PathManager::finish_update]
	pub fn begin_update(&mut self) -> Result<(), QtpfsError> {
		if !self.finalized {
			return Ok(());
		}
		self.finish_update()?;
		match self.worker.as_mut() {
			Some(worker) => {
				let state = self.state.take().ok_or(QtpfsError::WorkerDisconnected)?;
				worker.dispatch(state)
			}
			None => self.sync()?.run_update(),
		}
	}
	/// Wait for a background update to finish, a no-op if none is running
	pub fn finish_update(&mut self) -> Result<(), QtpfsError> {
		let Some(worker) = self.worker.as_mut() else {
			return Ok(());
		};
		if !worker.is_in_flight() {
			return Ok(());
		}
		let (state, result) = worker.collect()?;
		self.state = Some(state);
		result
	}
	/// Run a complete update
	pub fn update(&mut self) -> Result<(), QtpfsError> {
		self.begin_update()?;
		self.finish_update()
	}
	/// Queue a search from `source` to `target` for the movement class
	/// `move_def`. Returns [PathId::NONE] before [PathManager::load] or when
	/// `move_def` is not one of the classes the manager was built with
	pub fn request_path(
		&mut self,
		owner: Option<PathOwner>,
		move_def: &MoveDef,
		source: Vec3,
		target: Vec3,
		radius: f32,
		synced: bool,
	) -> PathId {
		if !self.finalized {
			warn!("Path requested before the pathfinder was loaded");
			return PathId::NONE;
		}
		let path_type = move_def.get_path_type();
		let Some(state) = self.live_state() else {
			return PathId::NONE;
		};
		match state.get_shard(path_type) {
			Some(shard) if shard.get_move_def().get_name() == move_def.get_name() => {}
			_ => {
				warn!("Path requested for unknown movement class {}", move_def.get_name());
				return PathId::NONE;
			}
		}
		state.request_path(owner, path_type, source, target, radius, synced)
	}
	/// The point the owner of path `id` at `position` should head for:
	///
	/// * an unknown or deleted path gives [NO_WAYPOINT]
	/// * a path whose search has not run gives a point one square from
	/// `position` towards the target with `y` set to `-1.0`
	/// * a path waiting to be searched again after a terrain change gives `position`
	/// * a searched path gives the next waypoint ahead of `position` at least
	/// `min_distance` away, the final waypoint is always given once reached
	///
	/// `owner`, `num_retries` and `synced` are accepted for parity with the
	/// other pathfinders of the game, quad-tree paths need none of them
	pub fn next_way_point(
		&mut self,
		_owner: Option<PathOwner>,
		id: PathId,
		_num_retries: u32,
		position: Vec3,
		min_distance: f32,
		_synced: bool,
	) -> Vec3 {
		match self.live_state() {
			Some(state) => state.next_way_point(id, position, min_distance),
			None => NO_WAYPOINT,
		}
	}
	/// Every waypoint of a searched path, empty for any other id
	pub fn get_path_way_points(&mut self, id: PathId) -> PathWayPoints {
		match self.live_state() {
			Some(state) => state.get_path_way_points(id),
			None => PathWayPoints::default(),
		}
	}
	/// True once after a path has been searched again following a terrain
	/// change, the owner should refresh any copy of its waypoints
	pub fn path_updated(&mut self, id: PathId) -> bool {
		match self.live_state() {
			Some(state) => state.path_updated(id),
			None => false,
		}
	}
	/// Forget a path. Returns false if `id` was not live
	pub fn delete_path(&mut self, id: PathId) -> bool {
		match self.live_state() {
			Some(state) => state.delete_path(id),
			None => false,
		}
	}
	/// The terrain over squares `x1..x2`, `z1..z2` (upper bounds exclusive)
	/// changed. Ignored before [PathManager::load]
	pub fn terrain_change(&mut self, x1: i32, z1: i32, x2: i32, z2: i32, kind: TerrainChangeKind) -> Result<(), QtpfsError> {
		if !self.finalized {
			return Ok(());
		}
		let force = kind == TerrainChangeKind::Blocking && self.config.force_tesselate_blocking;
		let rect = PathRectangle::new(x1, z1, x2, z2).with_force_tesselation(force);
		self.sync()?.terrain_change(rect)
	}
	/// The layer of a movement class
	pub fn get_node_layer(&mut self, path_type: usize) -> Option<&NodeLayer> {
		let state = self.live_state()?;
		state.get_shard(path_type).map(|s| s.get_layer())
	}
	/// The paths of a movement class
	pub fn get_path_cache(&mut self, path_type: usize) -> Option<&PathCache> {
		let state = self.live_state()?;
		state.get_shard(path_type).map(|s| s.get_cache())
	}
	/// Number of searches waiting across all layers
	pub fn get_num_queued_searches(&mut self) -> usize {
		match self.live_state() {
			Some(state) => state.get_shards().iter().map(|s| s.get_num_searches()).sum(),
			None => 0,
		}
	}
	/// Number of path ids in use
	pub fn get_num_paths(&mut self) -> usize {
		match self.live_state() {
			Some(state) => state.get_slots().get_num_live(),
			None => 0,
		}
	}
	/// Searches executed by the last update
	pub fn get_num_searches_last_update(&mut self) -> usize {
		match self.live_state() {
			Some(state) => state.get_num_searches_last_update(),
			None => 0,
		}
	}
	/// Terrain changes received since creation
	pub fn get_num_terrain_changes(&mut self) -> u64 {
		match self.live_state() {
			Some(state) => state.get_num_terrain_changes(),
			None => 0,
		}
	}
	/// Approximate heap usage of every layer and path in bytes
	pub fn get_memory_footprint(&mut self) -> usize {
		match self.live_state() {
			Some(state) => state
				.get_shards()
				.iter()
				.map(|s| s.get_layer().get_memory_footprint() + s.get_cache().get_memory_footprint())
				.sum(),
			None => 0,
		}
	}
	/// Take back the state from a running update
	fn sync(&mut self) -> Result<&mut SimState, QtpfsError> {
		self.finish_update()?;
		self.state.as_deref_mut().ok_or(QtpfsError::WorkerDisconnected)
	}
	/// [PathManager::sync] for calls that cannot report errors
	fn live_state(&mut self) -> Option<&mut SimState> {
		match self.sync() {
			Ok(state) => Some(state),
			Err(e) => {
				error!("Pathfinding state unavailable: {}", e);
				None
			}
		}
	}
}

#[rustfmt::skip]
#[cfg(test)]
mod tests {
	use super::*;

	/// Tank class on layer 0
	fn tank() -> MoveDef {
		MoveDef::new("tank", 0, MoveFamily::Tank)
	}
	/// Loaded manager over an open map
	fn manager(config: QtpfsConfig, map: Arc<HeightMap>) -> PathManager {
		let mut manager = PathManager::new(config, vec![tank()], map).unwrap();
		manager.load(None).unwrap();
		manager
	}
	/// Config that never spreads work over the task pool
	fn sequential() -> QtpfsConfig {
		QtpfsConfig::default().with_strategy(UpdateStrategy { layer_init: LayerInitMode::Sequential, ..Default::default() })
	}

	#[test]
	#[should_panic]
	fn gaps_in_path_types() {
		let _ = PathManager::new(QtpfsConfig::default(), vec![MoveDef::new("a", 1, MoveFamily::Tank)], Arc::new(HeightMap::new(8, 8)));
	}
	#[test]
	fn no_paths_before_load() {
		let mut manager = PathManager::new(sequential(), vec![tank()], Arc::new(HeightMap::new(32, 32))).unwrap();
		assert!(!manager.is_finalized());
		let id = manager.request_path(None, &tank(), Vec3::ZERO, Vec3::splat(100.0), 8.0, true);
		assert!(id.is_none());
	}
	#[test]
	fn unknown_move_def() {
		let mut manager = manager(sequential(), Arc::new(HeightMap::new(32, 32)));
		let hover = MoveDef::new("hover", 0, MoveFamily::Hover);
		assert!(manager.request_path(None, &hover, Vec3::ZERO, Vec3::splat(100.0), 8.0, true).is_none());
		let other = MoveDef::new("tank", 5, MoveFamily::Tank);
		assert!(manager.request_path(None, &other, Vec3::ZERO, Vec3::splat(100.0), 8.0, true).is_none());
	}
	#[test]
	fn path_lifecycle() {
		let mut manager = manager(sequential(), Arc::new(HeightMap::new(64, 64)));
		let id = manager.request_path(None, &tank(), Vec3::new(20.0, 0.0, 20.0), Vec3::new(400.0, 0.0, 400.0), 8.0, true);
		assert!(id.is_some());
		assert!(manager.get_path_way_points(id).points.is_empty());
		manager.update().unwrap();
		let points = manager.get_path_way_points(id).points;
		assert_eq!(Vec3::new(400.0, 0.0, 400.0), *points.last().unwrap());
		assert!(manager.delete_path(id));
		assert!(!manager.delete_path(id));
		assert_eq!(NO_WAYPOINT, manager.next_way_point(None, id, 0, Vec3::ZERO, 0.0, true));
		assert_eq!(0, manager.get_num_paths());
	}
	#[test]
	fn terrain_change_repaths_under_same_id() {
		let map = Arc::new(HeightMap::new(64, 64));
		let mut manager = manager(sequential(), map.clone());
		let id = manager.request_path(None, &tank(), Vec3::new(20.0, 0.0, 20.0), Vec3::new(400.0, 0.0, 20.0), 8.0, true);
		manager.update().unwrap();
		assert!(!manager.path_updated(id));

		let wall = PathRectangle::new(24, 0, 28, 8);
		map.set_blocking(&wall, SquareBlocking::Structure);
		manager.terrain_change(24, 0, 28, 8, TerrainChangeKind::Blocking).unwrap();
		assert_eq!(1, manager.get_num_terrain_changes());
		let here = Vec3::new(30.0, 0.0, 20.0);
		assert_eq!(here, manager.next_way_point(None, id, 0, here, 0.0, true));

		manager.update().unwrap();
		assert!(manager.path_updated(id));
		assert!(!manager.path_updated(id));
		let (x1, z1, x2, z2) = wall.get_world_bounds();
		for p in manager.get_path_way_points(id).points {
			assert!(!(p.x > x1 && p.x < x2 && p.z > z1 && p.z < z2), "{:?} inside the wall", p);
		}
	}
	#[test]
	fn background_updates() {
		let config = sequential().with_strategy(UpdateStrategy {
			execution: ExecutionMode::Background,
			layer_init: LayerInitMode::Sequential,
			..Default::default()
		});
		let mut manager = manager(config, Arc::new(HeightMap::new(64, 64)));
		let id = manager.request_path(None, &tank(), Vec3::new(20.0, 0.0, 20.0), Vec3::new(400.0, 0.0, 400.0), 8.0, true);
		manager.begin_update().unwrap();
		assert!(manager.is_update_in_flight());
		manager.finish_update().unwrap();
		assert!(!manager.is_update_in_flight());
		assert!(!manager.get_path_way_points(id).points.is_empty());
		// a call during an update waits for it
		manager.begin_update().unwrap();
		assert!(manager.get_path_cache(0).is_some());
		assert!(!manager.is_update_in_flight());
	}
	#[test]
	fn checksum_is_reproducible() {
		let build = || {
			let map = Arc::new(HeightMap::new(64, 64));
			map.set_blocking(&PathRectangle::new(10, 10, 20, 14), SquareBlocking::Structure);
			let mut manager = PathManager::new(sequential(), vec![tank()], map).unwrap();
			manager.load(Some(ContentChecksums::new(7, 9))).unwrap();
			manager.get_checksum()
		};
		assert_eq!(build(), build());
	}
	#[test]
	fn tree_cache_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let checksums = ContentChecksums::new(0xfeed, 0xbeef);
		let build = || {
			let map = Arc::new(HeightMap::new(64, 64));
			map.set_blocking(&PathRectangle::new(10, 10, 20, 14), SquareBlocking::Structure);
			let mut manager = PathManager::new(sequential().with_cache_dir(dir.path()), vec![tank()], map).unwrap();
			manager.load(Some(checksums)).unwrap();
			let leaves = manager.get_node_layer(0).unwrap().get_num_leaf_nodes();
			(manager.get_checksum(), leaves)
		};
		let first = build();
		assert!(TreeCache::new(dir.path(), checksums).is_ready());
		let second = build();
		assert_eq!(first, second);
	}
	#[test]
	fn corrupt_tree_cache_is_rebuilt() {
		let dir = tempfile::tempdir().unwrap();
		let checksums = ContentChecksums::new(0xfeed, 0xbeef);
		let build = || {
			let map = Arc::new(HeightMap::new(64, 64));
			map.set_blocking(&PathRectangle::new(10, 10, 20, 14), SquareBlocking::Structure);
			let mut manager = PathManager::new(sequential().with_cache_dir(dir.path()), vec![tank()], map).unwrap();
			manager.load(Some(checksums)).unwrap();
			manager.get_checksum()
		};
		let first = build();
		let cache = TreeCache::new(dir.path(), checksums);
		let file = cache.get_layer_file(0, &tank());
		std::fs::write(&file, "(garbage").unwrap();
		assert!(matches!(cache.read_layer(0, &tank(), (64, 64)), Err(CacheError::Decode(_))));

		assert_eq!(first, build());
		// the layer was written out again
		let snapshot = cache.read_layer(0, &tank(), (64, 64)).unwrap();
		assert_eq!(0, snapshot.layer_number);
		assert!(cache.is_ready());
	}
}
