//! Everything a tick of the pathfinder mutates. It is owned by the
//! [super::PathManager] between updates and handed to the worker thread
//! while a background update runs
//!

use std::collections::HashMap;
use std::sync::Arc;

use crate::prelude::*;
use bevy::prelude::*;

/// A node layer together with the paths and searches that use it
pub struct LayerShard {
	/// Movement class of the layer
	move_def: MoveDef,
	/// The quad-tree
	layer: NodeLayer,
	/// Paths searched on the layer
	cache: PathCache,
	/// Searches waiting to run, in request order
	searches: Vec<PathSearch>,
}

impl LayerShard {
	/// Create a new instance of [LayerShard] with an untesselated layer
	pub fn new(move_def: MoveDef, layer: NodeLayer) -> Self {
		LayerShard {
			move_def,
			layer,
			cache: PathCache::default(),
			searches: Vec::new(),
		}
	}
	/// Get the movement class
	pub fn get_move_def(&self) -> &MoveDef {
		&self.move_def
	}
	/// Get the node layer
	pub fn get_layer(&self) -> &NodeLayer {
		&self.layer
	}
	/// Get the path cache
	pub fn get_cache(&self) -> &PathCache {
		&self.cache
	}
	/// Number of queued searches
	pub fn get_num_searches(&self) -> usize {
		self.searches.len()
	}
	/// True if searches are waiting on this layer
	pub fn has_pending_searches(&self) -> bool {
		!self.searches.is_empty()
	}
	/// Sample and re-tesselate `rect` right away, killing the live paths
	/// crossing it if the tree changed
	pub fn apply_terrain_change(
		&mut self,
		rect: &PathRectangle,
		terrain: &dyn TerrainProvider,
	) -> Result<(), QtpfsError> {
		if let Some(changed) = self.layer.apply_update(rect, &self.move_def, terrain)? {
			let killed = self.cache.mark_dead_paths(&changed);
			if killed > 0 {
				debug!(
					"Terrain change killed {} paths on layer {}",
					killed,
					self.layer.get_layer_number()
				);
			}
		}
		Ok(())
	}
	/// Park a change until [LayerShard::drain_terrain_changes]
	pub fn queue_terrain_change(&mut self, rect: PathRectangle) {
		self.layer.queue_update(rect);
	}
	/// Apply a fraction of the parked changes, all of them if `flush`
	pub fn drain_terrain_changes(
		&mut self,
		terrain: &dyn TerrainProvider,
		fraction: f32,
		flush: bool,
	) -> Result<(), QtpfsError> {
		if self.layer.get_num_queued_updates() == 0 {
			return Ok(());
		}
		let changed = self
			.layer
			.exec_queued_updates(&self.move_def, terrain, fraction, flush)?;
		for rect in changed.iter() {
			self.cache.mark_dead_paths(rect);
		}
		Ok(())
	}
	/// The area a change reported over `rect` affects for this movement
	/// class, the change is felt by anything whose footprint overlaps it
	pub fn get_affected_rect(&self, rect: &PathRectangle) -> PathRectangle {
		let (hx, hz) = self.move_def.get_footprint_half();
		rect.expanded(hx as i32, hz as i32)
			.clipped(&self.layer.get_map_rect())
			.with_force_tesselation(rect.is_force_tesselation())
	}
	/// Build the tree, from the cache when it holds a matching copy.
	/// Returns true if the cache was used
	pub fn initialise(&mut self, terrain: &dyn TerrainProvider, cache: Option<&TreeCache>) -> Result<bool, QtpfsError> {
		let layer_number = self.layer.get_layer_number();
		let map_rect = self.layer.get_map_rect();
		self.layer.update(&map_rect, &self.move_def, terrain);
		if let Some(cache) = cache {
			match self.restore_from(cache) {
				Ok(()) => return Ok(true),
				Err(e) => {
					warn!("Tree cache for layer {} unusable, tesselating: {}", layer_number, e);
					self.layer.init(layer_number);
				}
			}
		}
		self.layer.tesselate_rect(&map_rect)?;
		Ok(false)
	}
	/// Replace the tree with the cached one and check it hashes the same
	fn restore_from(&mut self, cache: &TreeCache) -> Result<(), CacheError> {
		let snapshot = cache.read_layer(
			self.layer.get_layer_number(),
			&self.move_def,
			self.layer.get_map_size(),
		)?;
		self.layer.restore_snapshot(&snapshot.nodes)?;
		let checksum = self.layer.get_tree().get_checksum();
		if checksum != snapshot.checksum {
			return Err(CacheError::Mismatch(format!(
				"tree checksum {:016x} instead of {:016x}",
				checksum, snapshot.checksum
			)));
		}
		Ok(())
	}
}

/// One entry of the path table
#[derive(Clone, Copy, Debug, Default)]
struct PathSlot {
	/// Bumped whenever the slot is released
	generation: u32,
	/// Layer of the path occupying the slot
	path_type: Option<usize>,
}

/// Hands out [PathId]s and remembers the layer of each live id
#[derive(Clone, Debug, Default)]
pub(crate) struct PathSlots {
	/// Every slot ever handed out
	slots: Vec<PathSlot>,
	/// Released slots, reused most recent first
	free: Vec<u32>,
}

impl PathSlots {
	/// Claim an id for a path on `path_type`
	pub(crate) fn allocate(&mut self, path_type: usize) -> PathId {
		match self.free.pop() {
			Some(index) => {
				let slot = &mut self.slots[index as usize];
				slot.path_type = Some(path_type);
				PathId::new(index, slot.generation)
			}
			None => {
				let index = self.slots.len() as u32;
				self.slots.push(PathSlot {
					generation: 1,
					path_type: Some(path_type),
				});
				PathId::new(index, 1)
			}
		}
	}
	/// Layer of a live id
	pub(crate) fn lookup(&self, id: PathId) -> Option<usize> {
		if id.is_none() {
			return None;
		}
		let slot = self.slots.get(id.get_index() as usize)?;
		if slot.generation != id.get_generation() {
			return None;
		}
		slot.path_type
	}
	/// Give an id back, returns false if it was not live
	pub(crate) fn release(&mut self, id: PathId) -> bool {
		if self.lookup(id).is_none() {
			return false;
		}
		let slot = &mut self.slots[id.get_index() as usize];
		slot.path_type = None;
		slot.generation = match slot.generation.wrapping_add(1) {
			0 => 1,
			g => g,
		};
		self.free.push(id.get_index());
		true
	}
	/// Number of live ids
	pub(crate) fn get_num_live(&self) -> usize {
		self.slots.len() - self.free.len()
	}
}

/// Mutable state of the pathfinder
pub(crate) struct SimState {
	/// Configuration
	config: Arc<QtpfsConfig>,
	/// Terrain the layers sample
	terrain: Arc<dyn TerrainProvider>,
	/// How terrain changes reach the layers
	strategy: Box<dyn LayerUpdateStrategy>,
	/// One shard per movement class, indexed by path type
	shards: Vec<LayerShard>,
	/// Path handles
	slots: PathSlots,
	/// Base search state value of the next search, never below
	/// [NODE_STATE_OFFSET] so it cannot match a cleared state
	search_generation: u32,
	/// Terrain changes received so far
	num_terrain_changes: u64,
	/// First layer of the next update window
	window_start: usize,
	/// Searches executed per team in the current update
	team_searches: Vec<u32>,
	/// Searches completed this update, keyed by what makes them identical
	shared_paths: HashMap<SharedPathKey, PathId>,
	/// Searches executed by the last update
	num_searches_last_update: usize,
}

impl SimState {
	/// Create the state with untesselated layers
	pub(crate) fn new(
		config: Arc<QtpfsConfig>,
		move_defs: Vec<MoveDef>,
		terrain: Arc<dyn TerrainProvider>,
	) -> Self {
		let map_size = terrain.get_map_size();
		let params = config.get_tesselation_params();
		let shards = move_defs
			.into_iter()
			.enumerate()
			.map(|(i, md)| LayerShard::new(md, NodeLayer::new(i, map_size, params)))
			.collect();
		let strategy = layer_update_strategy(config.strategy.layer_updates);
		debug!("Terrain changes are applied with the {} strategy", strategy.get_name());
		let team_searches = vec![0; config.num_teams + 1];
		SimState {
			config,
			terrain,
			strategy,
			shards,
			slots: PathSlots::default(),
			search_generation: NODE_STATE_OFFSET,
			num_terrain_changes: 0,
			window_start: 0,
			team_searches,
			shared_paths: HashMap::new(),
			num_searches_last_update: 0,
		}
	}
	/// Get the shards
	pub(crate) fn get_shards(&self) -> &[LayerShard] {
		&self.shards
	}
	/// Get a shard
	pub(crate) fn get_shard(&self, path_type: usize) -> Option<&LayerShard> {
		self.shards.get(path_type)
	}
	/// Get the path handles
	pub(crate) fn get_slots(&self) -> &PathSlots {
		&self.slots
	}
	/// Number of terrain changes received
	pub(crate) fn get_num_terrain_changes(&self) -> u64 {
		self.num_terrain_changes
	}
	/// Searches executed by the last update
	pub(crate) fn get_num_searches_last_update(&self) -> usize {
		self.num_searches_last_update
	}
	/// Tesselate every layer, using `cache` where possible and filling it
	/// otherwise. Returns the combined checksum of the trees
	pub(crate) fn load(&mut self, cache: Option<&TreeCache>) -> Result<u64, QtpfsError> {
		let readable = cache.filter(|c| c.is_ready());
		let terrain = self.terrain.as_ref();
		let restored = self.config.strategy.layer_init.for_each_shard(&mut self.shards, |shard| {
			shard.initialise(terrain, readable)
		})?;
		let num_restored = restored.iter().filter(|r| **r).count();
		info!("Initialised {} node layers, {} from the tree cache", self.shards.len(), num_restored);
		if let Some(cache) = cache {
			if num_restored < self.shards.len() {
				self.write_cache(cache);
			}
		}
		let mut checksum = 0u64;
		for (i, shard) in self.shards.iter().enumerate() {
			checksum ^= shard.layer.get_tree().get_checksum().rotate_left(i as u32);
		}
		Ok(checksum)
	}
	/// Write every tree to `cache`, failures only cost the next load time
	fn write_cache(&self, cache: &TreeCache) {
		for shard in self.shards.iter() {
			let snapshot = TreeSnapshot::from_layer(&shard.layer, &shard.move_def);
			if let Err(e) = cache.write_layer(&snapshot, &shard.move_def) {
				warn!("Failed to cache tree of layer {}: {}", shard.layer.get_layer_number(), e);
				return;
			}
		}
		match cache.mark_ready() {
			Ok(()) => info!("Cached trees in {:?}", cache.get_dir()),
			Err(e) => warn!("Failed to finish tree cache: {}", e),
		}
	}
	/// Queue a search for a new path and return its id
	pub(crate) fn request_path(
		&mut self,
		owner: Option<PathOwner>,
		path_type: usize,
		source: Vec3,
		target: Vec3,
		radius: f32,
		synced: bool,
	) -> PathId {
		let id = self.slots.allocate(path_type);
		let path = QtpfsPath::new(id, path_type, source, target, radius, synced, owner);
		let team = path.get_team(self.config.num_teams);
		let shard = &mut self.shards[path_type];
		shard.searches.push(PathSearch::new(
			id,
			team,
			self.config.search_type,
			self.config.allow_partial_searches,
		));
		shard.cache.add_temp_path(path);
		id
	}
	/// Forget a path, a queued search for it is dropped when reached
	pub(crate) fn delete_path(&mut self, id: PathId) -> bool {
		let Some(path_type) = self.slots.lookup(id) else {
			return false;
		};
		self.shards[path_type].cache.del_path(id);
		self.slots.release(id)
	}
	/// Advance the owner of a path along it, see
	/// [super::PathManager::next_way_point]
	pub(crate) fn next_way_point(&mut self, id: PathId, position: Vec3, min_distance: f32) -> Vec3 {
		let Some(path_type) = self.slots.lookup(id) else {
			return NO_WAYPOINT;
		};
		let cache = &mut self.shards[path_type].cache;
		if let Some(path) = cache.get_live_path_mut(id) {
			path.set_last_position(position);
			return advance_along(path, position, min_distance);
		}
		if let Some(path) = cache.get_temp_path_mut(id) {
			path.set_last_position(position);
			if path.is_repath() {
				return position;
			}
			let mut dir = path.get_target() - position;
			dir.y = 0.0;
			let mut point = position + dir.normalize_or_zero() * TEMP_POINT_DISTANCE;
			point.y = -1.0;
			return point;
		}
		if let Some(path) = cache.get_dead_path_mut(id) {
			path.set_last_position(position);
			return position;
		}
		NO_WAYPOINT
	}
	/// Waypoints of a live path
	pub(crate) fn get_path_way_points(&self, id: PathId) -> PathWayPoints {
		let Some(path_type) = self.slots.lookup(id) else {
			return PathWayPoints::default();
		};
		let path = self.shards[path_type].cache.get_live_path(id);
		PathWayPoints {
			points: path.get_points().to_vec(),
			starts: [0; 3],
		}
	}
	/// Read and clear whether a path was re-searched since last asked
	pub(crate) fn path_updated(&mut self, id: PathId) -> bool {
		let Some(path_type) = self.slots.lookup(id) else {
			return false;
		};
		match self.shards[path_type].cache.get_live_path_mut(id) {
			Some(path) => path.take_updated(),
			None => false,
		}
	}
	/// Hand a terrain change to the layers
	pub(crate) fn terrain_change(&mut self, rect: PathRectangle) -> Result<(), QtpfsError> {
		self.num_terrain_changes += 1;
		self.strategy.terrain_change(
			&mut self.shards,
			self.terrain.as_ref(),
			self.config.strategy.layer_init,
			&rect,
		)
	}
	/// One tick: let pending terrain changes land, then re-queue dead paths
	/// and run the queued searches of the layers in this tick's window
	pub(crate) fn run_update(&mut self) -> Result<(), QtpfsError> {
		self.shared_paths.clear();
		self.team_searches.iter_mut().for_each(|t| *t = 0);
		self.num_searches_last_update = 0;
		let num_layers = self.shards.len();
		if num_layers == 0 {
			return Ok(());
		}
		let window_len = self.config.get_layers_per_update(num_layers);
		let window_end = (self.window_start + window_len).min(num_layers);
		let window = self.window_start..window_end;

		for (i, shard) in self.shards.iter_mut().enumerate() {
			let pending = window.contains(&i) && shard.has_pending_searches();
			self.strategy
				.before_searches(shard, self.terrain.as_ref(), &self.config, pending)?;
		}
		self.reserve_search_generations();
		let mut budget = self.config.max_searches_per_update;
		for i in window.clone() {
			self.requeue_dead_paths(i);
			self.execute_queued_searches(i, &mut budget);
		}
		self.window_start = if window_end >= num_layers { 0 } else { window_end };
		trace!(
			"Update over layers {:?} ran {} searches",
			window,
			self.num_searches_last_update
		);
		Ok(())
	}
	/// Make sure this update's searches cannot overflow the generation counter,
	/// wiping every layer's search state when they could
	fn reserve_search_generations(&mut self) {
		let needed = (self.config.max_searches_per_update as u64 + 1) * NODE_STATE_OFFSET as u64;
		if (u32::MAX - self.search_generation) as u64 > needed {
			return;
		}
		debug!("Search generations exhausted, resetting search state");
		for shard in self.shards.iter_mut() {
			shard.layer.reset_search_states();
		}
		self.search_generation = NODE_STATE_OFFSET;
	}
	/// Turn the dead paths of a layer back into temp paths with a queued
	/// search each
	fn requeue_dead_paths(&mut self, path_type: usize) {
		let num_teams = self.config.num_teams;
		let allow_partial = self.config.allow_partial_searches;
		let search_type = self.config.search_type;
		let shard = &mut self.shards[path_type];
		for dead in shard.cache.kill_dead_paths() {
			let repath = dead.to_repath();
			let team = repath.get_team(num_teams);
			shard
				.searches
				.push(PathSearch::new(repath.get_id(), team, search_type, allow_partial));
			shard.cache.add_temp_path(repath);
		}
	}
	/// Run the queued searches of a layer in request order within the team
	/// and update budgets, searches over budget wait for the next visit
	fn execute_queued_searches(&mut self, path_type: usize, budget: &mut u32) {
		let SimState {
			config,
			shards,
			slots,
			search_generation,
			team_searches,
			shared_paths,
			num_searches_last_update,
			..
		} = self;
		let smoothing = if config.smooth_paths {
			config.max_smoothing_iterations
		} else {
			0
		};
		let shard = &mut shards[path_type];
		let queued = std::mem::take(&mut shard.searches);
		let mut waiting = Vec::new();
		for mut search in queued {
			let id = search.get_path_id();
			let temp = shard.cache.get_temp_path(id);
			if temp.get_id().is_none() {
				// deleted while queued
				continue;
			}
			let (source, target) = (temp.get_source(), temp.get_target());
			search.initialize(&shard.layer, source, target, shard.layer.get_map_rect());
			let key = search.get_shared_key(path_type);

			// sharing costs no search so it is not held back by the budgets
			if config.share_paths {
				if let Some(&shared_id) = shared_paths.get(&key) {
					if let Some(mut path) = shard.cache.take_temp_path(id) {
						if search.shared_finalize(shard.cache.get_live_path(shared_id), &mut path) {
							if path.is_repath() {
								path.set_updated(true);
							}
							shard.cache.add_live_path(path);
							continue;
						}
						shard.cache.add_temp_path(path);
					}
				}
			}

			let team = search.get_team().min(config.num_teams);
			if *budget == 0 || team_searches[team] >= config.max_team_searches {
				waiting.push(search);
				continue;
			}
			team_searches[team] += 1;
			*budget -= 1;
			*num_searches_last_update += 1;
			let generation = *search_generation;
			*search_generation += NODE_STATE_OFFSET;
			if search.execute(&mut shard.layer, generation) {
				if let Some(mut path) = shard.cache.take_temp_path(id) {
					search.finalize(&shard.layer, &mut path, smoothing);
					if path.is_repath() {
						path.set_updated(true);
					}
					shard.cache.add_live_path(path);
					if config.share_paths {
						shared_paths.insert(key, id);
					}
				}
			} else {
				debug!("No path found for {:?} on layer {}", id, path_type);
				shard.cache.del_path(id);
				slots.release(id);
			}
		}
		shard.searches = waiting;
	}
}

/// Pick the waypoint the owner of `path` at `position` should head for,
/// remembering progress so later calls never go backwards
fn advance_along(path: &mut QtpfsPath, position: Vec3, min_distance: f32) -> Vec3 {
	let num_points = path.get_num_points();
	if num_points == 0 {
		return position;
	}
	let last = num_points - 1;
	let flat = |p: Vec3| Vec3::new(p.x - position.x, 0.0, p.z - position.z);
	let min_index = path.get_point_index().min(last);
	let mut next = last;
	let mut found = false;
	for i in min_index..last {
		let v0 = flat(path.get_point(i));
		let v1 = flat(path.get_point(i + 1));
		if v0.length_squared() < WAYPOINT_EPSILON_SQ {
			next = i + 1;
			found = true;
			break;
		}
		if v1.length_squared() < WAYPOINT_EPSILON_SQ {
			next = (i + 2).min(last);
			found = true;
			break;
		}
		// between the two points
		if v0.dot(v1) <= -0.01 {
			next = i + 1;
			found = true;
			break;
		}
	}
	if !found {
		// not yet past the current waypoint
		next = min_index.max(1).min(last);
	}
	let min_distance_sq = min_distance * min_distance;
	while next < last && flat(path.get_point(next)).length_squared() < min_distance_sq {
		next += 1;
	}
	if next > path.get_point_index() {
		path.set_point_index(next);
	}
	path.get_point(next)
}

#[rustfmt::skip]
#[cfg(test)]
mod tests {
	use super::*;

	/// State over an open map with `n` tank layers
	fn state(n: usize, size: u32, config: QtpfsConfig) -> SimState {
		let mds = (0..n).map(|i| MoveDef::new(&format!("tank{}", i), i, MoveFamily::Tank)).collect();
		let mut state = SimState::new(Arc::new(config), mds, Arc::new(HeightMap::new(size, size)));
		state.load(None).unwrap();
		state
	}
	/// Config that never spreads work over the task pool
	fn sequential() -> QtpfsConfig {
		QtpfsConfig::default().with_strategy(UpdateStrategy { layer_init: LayerInitMode::Sequential, ..Default::default() })
	}

	#[test]
	fn slots_reuse_with_new_generation() {
		let mut slots = PathSlots::default();
		let a = slots.allocate(0);
		assert_eq!(Some(0), slots.lookup(a));
		assert!(slots.release(a));
		assert!(!slots.release(a));
		let b = slots.allocate(2);
		assert_eq!(a.get_index(), b.get_index());
		assert_ne!(a, b);
		assert_eq!(None, slots.lookup(a));
		assert_eq!(Some(2), slots.lookup(b));
		assert_eq!(1, slots.get_num_live());
	}
	#[test]
	fn none_is_never_live() {
		let mut slots = PathSlots::default();
		slots.allocate(0);
		assert_eq!(None, slots.lookup(PathId::NONE));
	}
	#[test]
	fn temp_path_points_towards_target() {
		let mut state = state(1, 64, sequential());
		let id = state.request_path(None, 0, Vec3::new(100.0, 0.0, 100.0), Vec3::new(300.0, 0.0, 100.0), 8.0, true);
		let p = state.next_way_point(id, Vec3::new(100.0, 0.0, 100.0), 0.0);
		assert_eq!(Vec3::new(100.0 + TEMP_POINT_DISTANCE, -1.0, 100.0), p);
	}
	#[test]
	fn search_makes_path_live() {
		let mut state = state(1, 64, sequential());
		let id = state.request_path(None, 0, Vec3::new(100.0, 0.0, 100.0), Vec3::new(300.0, 0.0, 300.0), 8.0, true);
		state.run_update().unwrap();
		assert_eq!(1, state.get_num_searches_last_update());
		let points = state.get_path_way_points(id).points;
		assert!(points.len() >= 2);
		assert_eq!(Vec3::new(300.0, 0.0, 300.0), *points.last().unwrap());
	}
	#[test]
	fn team_budget_defers_searches() {
		let mut config = sequential();
		config.max_team_searches = 2;
		config.share_paths = false;
		let mut state = state(1, 64, config);
		let owner = PathOwner::new(Entity::from_raw(1), 0);
		let ids: Vec<PathId> = (0..5).map(|i| {
			state.request_path(Some(owner), 0, Vec3::new(10.0 + i as f32, 0.0, 10.0), Vec3::new(400.0, 0.0, 400.0), 8.0, true)
		}).collect();
		state.run_update().unwrap();
		assert_eq!(2, state.get_num_searches_last_update());
		assert_eq!(3, state.get_shard(0).unwrap().get_num_searches());
		state.run_update().unwrap();
		state.run_update().unwrap();
		assert_eq!(0, state.get_shard(0).unwrap().get_num_searches());
		for id in ids {
			assert!(!state.get_path_way_points(id).points.is_empty());
		}
	}
	#[test]
	fn identical_requests_share_a_search() {
		let mut state = state(1, 64, sequential());
		let a = state.request_path(None, 0, Vec3::new(20.0, 0.0, 20.0), Vec3::new(450.0, 0.0, 300.0), 8.0, true);
		let b = state.request_path(None, 0, Vec3::new(20.0, 0.0, 20.0), Vec3::new(450.0, 0.0, 300.0), 8.0, true);
		state.run_update().unwrap();
		assert_eq!(1, state.get_num_searches_last_update());
		assert_eq!(state.get_path_way_points(a), state.get_path_way_points(b));
	}
	#[test]
	fn sharing_ignores_exhausted_budgets() {
		let mut config = sequential();
		config.max_searches_per_update = 1;
		let mut state = state(1, 64, config);
		let ids: Vec<PathId> = (0..4).map(|_| {
			state.request_path(None, 0, Vec3::new(20.0, 0.0, 20.0), Vec3::new(450.0, 0.0, 300.0), 8.0, true)
		}).collect();
		state.run_update().unwrap();
		assert_eq!(1, state.get_num_searches_last_update());
		assert_eq!(0, state.get_shard(0).unwrap().get_num_searches());
		for id in ids {
			assert!(!state.get_path_way_points(id).points.is_empty());
		}
	}
	#[test]
	fn search_generations_restart_when_exhausted() {
		let mut config = sequential();
		config.max_searches_per_update = 2;
		config.share_paths = false;
		let map = HeightMap::new(64, 64);
		map.set_blocking(&PathRectangle::new(30, 0, 34, 56), SquareBlocking::Structure);
		let mds = vec![MoveDef::new("tank0", 0, MoveFamily::Tank)];
		let mut state = SimState::new(Arc::new(config), mds, Arc::new(map));
		state.load(None).unwrap();
		// room for two more updates of two searches each
		state.search_generation = u32::MAX - 12;
		let ids: Vec<PathId> = (0..6).map(|i| {
			state.request_path(None, 0, Vec3::new(20.0 + i as f32 * 8.0, 0.0, 20.0), Vec3::new(450.0, 0.0, 300.0), 8.0, true)
		}).collect();
		state.run_update().unwrap();
		assert_eq!(u32::MAX - 8, state.search_generation);
		state.run_update().unwrap();
		assert_eq!(u32::MAX - 4, state.search_generation);
		state.run_update().unwrap();
		assert_eq!(NODE_STATE_OFFSET + 2 * NODE_STATE_OFFSET, state.search_generation);
		assert_eq!(0, state.get_shard(0).unwrap().get_num_searches());
		for id in ids {
			let points = state.get_path_way_points(id).points;
			assert_eq!(Vec3::new(450.0, 0.0, 300.0), *points.last().unwrap());
		}
	}
	#[test]
	fn dijkstra_requests_resolve() {
		let mut config = sequential();
		config.search_type = SearchType::Dijkstra;
		let mut state = state(1, 64, config);
		let id = state.request_path(None, 0, Vec3::new(100.0, 0.0, 100.0), Vec3::new(300.0, 0.0, 300.0), 8.0, true);
		state.run_update().unwrap();
		assert_eq!(Vec3::new(300.0, 0.0, 300.0), *state.get_path_way_points(id).points.last().unwrap());
	}
	#[test]
	fn windows_rotate_over_layers() {
		let mut config = sequential();
		config.max_update_delay = 2;
		let mut state = state(4, 32, config);
		let a = state.request_path(None, 0, Vec3::new(20.0, 0.0, 20.0), Vec3::new(200.0, 0.0, 200.0), 8.0, true);
		let b = state.request_path(None, 3, Vec3::new(20.0, 0.0, 20.0), Vec3::new(200.0, 0.0, 200.0), 8.0, true);
		state.run_update().unwrap();
		assert!(!state.get_path_way_points(a).points.is_empty());
		assert!(state.get_path_way_points(b).points.is_empty());
		state.run_update().unwrap();
		assert!(!state.get_path_way_points(b).points.is_empty());
	}
	#[test]
	fn deleted_request_is_dropped() {
		let mut state = state(1, 64, sequential());
		let id = state.request_path(None, 0, Vec3::new(20.0, 0.0, 20.0), Vec3::new(450.0, 0.0, 300.0), 8.0, true);
		assert!(state.delete_path(id));
		state.run_update().unwrap();
		assert_eq!(0, state.get_num_searches_last_update());
		assert_eq!(NO_WAYPOINT, state.next_way_point(id, Vec3::ZERO, 0.0));
	}
	#[test]
	fn advance_never_goes_back() {
		let mut path = QtpfsPath::default();
		path.set_points(vec![
			Vec3::new(0.0, 0.0, 0.0),
			Vec3::new(100.0, 0.0, 0.0),
			Vec3::new(200.0, 0.0, 0.0),
			Vec3::new(300.0, 0.0, 0.0),
		]);
		assert_eq!(Vec3::new(100.0, 0.0, 0.0), advance_along(&mut path, Vec3::ZERO, 0.0));
		assert_eq!(Vec3::new(200.0, 0.0, 0.0), advance_along(&mut path, Vec3::new(150.0, 0.0, 0.0), 0.0));
		// owner wandered back, it still heads on
		assert_eq!(Vec3::new(200.0, 0.0, 0.0), advance_along(&mut path, Vec3::new(20.0, 0.0, 0.0), 0.0));
		assert_eq!(Vec3::new(300.0, 0.0, 0.0), advance_along(&mut path, Vec3::new(200.0, 0.0, 0.0), 0.0));
	}
	#[test]
	fn advance_skips_close_points() {
		let mut path = QtpfsPath::default();
		path.set_points(vec![
			Vec3::new(0.0, 0.0, 0.0),
			Vec3::new(10.0, 0.0, 0.0),
			Vec3::new(20.0, 0.0, 0.0),
			Vec3::new(300.0, 0.0, 0.0),
		]);
		assert_eq!(Vec3::new(300.0, 0.0, 0.0), advance_along(&mut path, Vec3::ZERO, 50.0));
	}
}
