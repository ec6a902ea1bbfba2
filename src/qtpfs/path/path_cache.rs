//! Owns every path of one layer through its lifecycle:
//!
//! ```text
//! temp --search succeeds--> live --terrain change--> dead --re-queued--> temp
//! ```
//!

use std::collections::HashMap;

use crate::prelude::*;

/// Paths of one layer split by lifecycle state
#[derive(Clone, Debug, Default)]
pub struct PathCache {
	/// Paths waiting on a search
	temp_paths: HashMap<PathId, QtpfsPath>,
	/// Searched paths being followed
	live_paths: HashMap<PathId, QtpfsPath>,
	/// Live paths invalidated by a terrain change
	dead_paths: HashMap<PathId, QtpfsPath>,
	/// Returned by lookups that miss
	sentinel: QtpfsPath,
}

impl PathCache {
	/// Insert a path waiting on a search
	pub fn add_temp_path(&mut self, path: QtpfsPath) {
		let id = path.get_id();
		self.live_paths.remove(&id);
		self.dead_paths.remove(&id);
		self.temp_paths.insert(id, path);
	}
	/// Insert a searched path, replacing its temp placeholder
	pub fn add_live_path(&mut self, path: QtpfsPath) {
		let id = path.get_id();
		self.temp_paths.remove(&id);
		self.dead_paths.remove(&id);
		self.live_paths.insert(id, path);
	}
	/// Temp path with `id`, or a sentinel whose id is [PathId::NONE]
	pub fn get_temp_path(&self, id: PathId) -> &QtpfsPath {
		self.temp_paths.get(&id).unwrap_or(&self.sentinel)
	}
	/// Live path with `id`, or a sentinel whose id is [PathId::NONE]
	pub fn get_live_path(&self, id: PathId) -> &QtpfsPath {
		self.live_paths.get(&id).unwrap_or(&self.sentinel)
	}
	/// Dead path with `id`, or a sentinel whose id is [PathId::NONE]
	pub fn get_dead_path(&self, id: PathId) -> &QtpfsPath {
		self.dead_paths.get(&id).unwrap_or(&self.sentinel)
	}
	/// Mutable access to a temp path
	pub fn get_temp_path_mut(&mut self, id: PathId) -> Option<&mut QtpfsPath> {
		self.temp_paths.get_mut(&id)
	}
	/// Mutable access to a live path
	pub fn get_live_path_mut(&mut self, id: PathId) -> Option<&mut QtpfsPath> {
		self.live_paths.get_mut(&id)
	}
	/// Mutable access to a dead path
	pub fn get_dead_path_mut(&mut self, id: PathId) -> Option<&mut QtpfsPath> {
		self.dead_paths.get_mut(&id)
	}
	/// Remove a temp path so its search can finalise it
	pub fn take_temp_path(&mut self, id: PathId) -> Option<QtpfsPath> {
		self.temp_paths.remove(&id)
	}
	/// Number of temp paths
	pub fn get_num_temp_paths(&self) -> usize {
		self.temp_paths.len()
	}
	/// Number of live paths
	pub fn get_num_live_paths(&self) -> usize {
		self.live_paths.len()
	}
	/// Number of dead paths
	pub fn get_num_dead_paths(&self) -> usize {
		self.dead_paths.len()
	}
	/// Move every live path crossing `rect` to the dead set, returns how many died
	pub fn mark_dead_paths(&mut self, rect: &PathRectangle) -> usize {
		let dying: Vec<PathId> = self
			.live_paths
			.iter()
			.filter(|(_, path)| path.crosses_rect(rect))
			.map(|(id, _)| *id)
			.collect();
		for id in dying.iter() {
			if let Some(path) = self.live_paths.remove(id) {
				self.dead_paths.insert(*id, path);
			}
		}
		dying.len()
	}
	/// Remove every dead path, ordered by id so re-queueing is deterministic
	pub fn kill_dead_paths(&mut self) -> Vec<QtpfsPath> {
		let mut dead: Vec<QtpfsPath> = self.dead_paths.drain().map(|(_, path)| path).collect();
		dead.sort_by_key(|path| path.get_id());
		dead
	}
	/// Forget a path in whichever state it is, returns true if it existed
	pub fn del_path(&mut self, id: PathId) -> bool {
		let temp = self.temp_paths.remove(&id).is_some();
		let live = self.live_paths.remove(&id).is_some();
		let dead = self.dead_paths.remove(&id).is_some();
		temp || live || dead
	}
	/// Approximate heap usage in bytes
	pub fn get_memory_footprint(&self) -> usize {
		let paths = self
			.temp_paths
			.values()
			.chain(self.live_paths.values())
			.chain(self.dead_paths.values());
		paths
			.map(|p| std::mem::size_of::<QtpfsPath>() + p.get_num_points() * std::mem::size_of::<bevy::prelude::Vec3>())
			.sum()
	}
}

#[rustfmt::skip]
#[cfg(test)]
mod tests {
	use super::*;
	use bevy::prelude::*;

	/// Straight path along x at row `z`
	fn straight(id: PathId, z: f32) -> QtpfsPath {
		let mut path = QtpfsPath::new(id, 0, Vec3::new(0.0, 0.0, z), Vec3::new(500.0, 0.0, z), 8.0, true, None);
		path.set_points(vec![path.get_source(), path.get_target()]);
		path
	}

	#[test]
	fn sentinel_on_miss() {
		let cache = PathCache::default();
		assert!(cache.get_temp_path(PathId::new(1, 1)).get_id().is_none());
		assert!(cache.get_live_path(PathId::new(1, 1)).get_id().is_none());
	}
	#[test]
	fn temp_to_live() {
		let mut cache = PathCache::default();
		let id = PathId::new(1, 1);
		cache.add_temp_path(QtpfsPath::new(id, 0, Vec3::ZERO, Vec3::ONE, 8.0, true, None));
		assert_eq!(id, cache.get_temp_path(id).get_id());
		let path = cache.take_temp_path(id).unwrap();
		cache.add_live_path(path);
		assert!(cache.get_temp_path(id).get_id().is_none());
		assert_eq!(id, cache.get_live_path(id).get_id());
		assert_eq!(0, cache.get_num_temp_paths());
	}
	#[test]
	fn terrain_change_kills_crossing_paths() {
		let mut cache = PathCache::default();
		let a = PathId::new(1, 1);
		let b = PathId::new(2, 1);
		cache.add_live_path(straight(a, 20.0));
		cache.add_live_path(straight(b, 300.0));
		// squares 10..12 span world 80..96 in both axes
		let died = cache.mark_dead_paths(&PathRectangle::new(10, 0, 12, 4));
		assert_eq!(1, died);
		assert!(cache.get_live_path(a).get_id().is_none());
		assert_eq!(a, cache.get_dead_path(a).get_id());
		assert_eq!(b, cache.get_live_path(b).get_id());
		let dead = cache.kill_dead_paths();
		assert_eq!(1, dead.len());
		assert_eq!(0, cache.get_num_dead_paths());
	}
	#[test]
	fn killed_paths_in_id_order() {
		let mut cache = PathCache::default();
		for i in (1..20).rev() {
			cache.add_live_path(straight(PathId::new(i, 1), 20.0));
		}
		cache.mark_dead_paths(&PathRectangle::new(0, 0, 64, 64));
		let ids: Vec<u32> = cache.kill_dead_paths().iter().map(|p| p.get_id().get_index()).collect();
		assert_eq!((1..20).collect::<Vec<u32>>(), ids);
	}
	#[test]
	fn delete_from_any_state() {
		let mut cache = PathCache::default();
		let id = PathId::new(4, 2);
		cache.add_live_path(straight(id, 20.0));
		assert!(cache.del_path(id));
		assert!(!cache.del_path(id));
		assert_eq!(0, cache.get_num_live_paths());
	}
}
