//! Paths handed out to the rest of the game. Callers only ever hold a
//! [PathId], the path itself is owned by the [path_cache::PathCache] of the
//! layer it was searched on
//!

pub mod path_cache;

use crate::prelude::*;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Handle of a path. The slot `index` is recycled once a path is deleted and
/// the `generation` is bumped on every reuse so an old handle never refers to
/// a newer path. The default value, [PathId::NONE], means "no path"
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Reflect, Serialize, Deserialize)]
pub struct PathId {
	/// Generation of the slot, `0` only for [PathId::NONE]
	generation: u32,
	/// Slot in the table of paths
	index: u32,
}

impl PathId {
	/// The "no path" handle
	pub const NONE: PathId = PathId {
		generation: 0,
		index: 0,
	};
	/// Create a new instance of [PathId]
	pub fn new(index: u32, generation: u32) -> Self {
		PathId { generation, index }
	}
	/// Get the slot
	pub fn get_index(&self) -> u32 {
		self.index
	}
	/// Get the generation
	pub fn get_generation(&self) -> u32 {
		self.generation
	}
	/// True for [PathId::NONE]
	pub fn is_none(&self) -> bool {
		self.generation == 0
	}
	/// True for any handle other than [PathId::NONE]
	pub fn is_some(&self) -> bool {
		!self.is_none()
	}
	/// Pack into an opaque integer, non-zero for every valid handle
	pub fn to_bits(&self) -> u64 {
		((self.generation as u64) << 32) | self.index as u64
	}
	/// Unpack an integer made by [PathId::to_bits]
	pub fn from_bits(bits: u64) -> Self {
		PathId {
			generation: (bits >> 32) as u32,
			index: bits as u32,
		}
	}
}

/// The unit that asked for a path
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Reflect)]
pub struct PathOwner {
	/// Entity of the unit
	entity: Entity,
	/// Team of the unit, used to share out searches fairly
	team: usize,
}

impl PathOwner {
	/// Create a new instance of [PathOwner]
	pub fn new(entity: Entity, team: usize) -> Self {
		PathOwner { entity, team }
	}
	/// Get the entity
	pub fn get_entity(&self) -> Entity {
		self.entity
	}
	/// Get the team
	pub fn get_team(&self) -> usize {
		self.team
	}
}

/// Waypoints of a path for callers which follow the whole list themselves
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathWayPoints {
	/// Points from source to target
	pub points: Vec<Vec3>,
	/// Index of the first point of each of the three resolution segments
	/// legacy path followers expect. Quad-tree paths have a single resolution
	/// so all three begin at `0`
	pub starts: [usize; 3],
}

/// A path on one layer
#[derive(Clone, Debug, PartialEq)]
pub struct QtpfsPath {
	/// Handle of the path
	id: PathId,
	/// Hash of the search that produced the path
	hash: u64,
	/// Layer the path was searched on
	path_type: usize,
	/// Radius of the unit following the path
	radius: f32,
	/// Whether the path feeds the synchronised simulation
	synced: bool,
	/// Unit the path belongs to
	owner: Option<PathOwner>,
	/// Requested start
	source: Vec3,
	/// Requested end
	target: Vec3,
	/// Waypoints from source to target, empty until searched
	points: Vec<Vec3>,
	/// Index of the waypoint the owner is heading for
	point_index: usize,
	/// Lower `(x, z)` corner of the box around the points
	bounds_min: Vec2,
	/// Upper `(x, z)` corner of the box around the points
	bounds_max: Vec2,
	/// Position reported by the owner when it last asked for a waypoint
	last_position: Option<Vec3>,
	/// The path was re-searched after dying and the owner has not been told
	updated: bool,
	/// The path is a re-search of a dead path
	repath: bool,
}

impl Default for QtpfsPath {
	fn default() -> Self {
		QtpfsPath {
			id: PathId::NONE,
			hash: 0,
			path_type: 0,
			radius: 0.0,
			synced: true,
			owner: None,
			source: Vec3::ZERO,
			target: Vec3::ZERO,
			points: Vec::new(),
			point_index: 0,
			bounds_min: Vec2::ZERO,
			bounds_max: Vec2::ZERO,
			last_position: None,
			updated: false,
			repath: false,
		}
	}
}

impl QtpfsPath {
	/// Create a new instance of [QtpfsPath] waiting to be searched
	pub fn new(
		id: PathId,
		path_type: usize,
		source: Vec3,
		target: Vec3,
		radius: f32,
		synced: bool,
		owner: Option<PathOwner>,
	) -> Self {
		QtpfsPath {
			id,
			path_type,
			radius,
			synced,
			owner,
			source,
			target,
			..Default::default()
		}
	}
	/// A temp path re-searching this (dead) path from where its owner was last seen
	pub fn to_repath(&self) -> Self {
		let source = self.last_position.unwrap_or(self.source);
		let mut path = QtpfsPath::new(
			self.id,
			self.path_type,
			source,
			self.target,
			self.radius,
			self.synced,
			self.owner,
		);
		path.last_position = self.last_position;
		path.repath = true;
		path
	}
	/// Get the handle
	pub fn get_id(&self) -> PathId {
		self.id
	}
	/// Get the search hash
	pub fn get_hash(&self) -> u64 {
		self.hash
	}
	/// Set the search hash
	pub fn set_hash(&mut self, hash: u64) {
		self.hash = hash;
	}
	/// Get the layer
	pub fn get_path_type(&self) -> usize {
		self.path_type
	}
	/// Get the radius
	pub fn get_radius(&self) -> f32 {
		self.radius
	}
	/// Whether the path feeds the synchronised simulation
	pub fn is_synced(&self) -> bool {
		self.synced
	}
	/// Get the owner
	pub fn get_owner(&self) -> Option<PathOwner> {
		self.owner
	}
	/// Team used for search scheduling, paths without an owner use `num_teams`
	pub fn get_team(&self, num_teams: usize) -> usize {
		match self.owner {
			Some(owner) if !self.repath => owner.get_team().min(num_teams),
			_ => num_teams,
		}
	}
	/// Get the requested start
	pub fn get_source(&self) -> Vec3 {
		self.source
	}
	/// Get the requested end
	pub fn get_target(&self) -> Vec3 {
		self.target
	}
	/// Get the waypoints
	pub fn get_points(&self) -> &[Vec3] {
		&self.points
	}
	/// Number of waypoints
	pub fn get_num_points(&self) -> usize {
		self.points.len()
	}
	/// Waypoint `i`, the last one if `i` is past the end
	pub fn get_point(&self, i: usize) -> Vec3 {
		match self.points.get(i) {
			Some(p) => *p,
			None => self.points.last().copied().unwrap_or(self.target),
		}
	}
	/// Replace the waypoints and recompute the bounding box
	pub fn set_points(&mut self, points: Vec<Vec3>) {
		let mut min = Vec2::splat(f32::MAX);
		let mut max = Vec2::splat(f32::MIN);
		for p in points.iter() {
			min = min.min(Vec2::new(p.x, p.z));
			max = max.max(Vec2::new(p.x, p.z));
		}
		if points.is_empty() {
			min = Vec2::ZERO;
			max = Vec2::ZERO;
		}
		self.bounds_min = min;
		self.bounds_max = max;
		self.points = points;
		self.point_index = 0;
	}
	/// Get the waypoint the owner is heading for
	pub fn get_point_index(&self) -> usize {
		self.point_index
	}
	/// Set the waypoint the owner is heading for
	pub fn set_point_index(&mut self, index: usize) {
		self.point_index = index;
	}
	/// Get the box around the points as `(min, max)` in `(x, z)`
	pub fn get_bounds(&self) -> (Vec2, Vec2) {
		(self.bounds_min, self.bounds_max)
	}
	/// Last position of the owner
	pub fn get_last_position(&self) -> Option<Vec3> {
		self.last_position
	}
	/// Remember where the owner is
	pub fn set_last_position(&mut self, position: Vec3) {
		self.last_position = Some(position);
	}
	/// True if the path is a re-search of a dead path
	pub fn is_repath(&self) -> bool {
		self.repath
	}
	/// Flag that the owner should be told about a new point list
	pub fn set_updated(&mut self, updated: bool) {
		self.updated = updated;
	}
	/// Read and clear the updated flag
	pub fn take_updated(&mut self) -> bool {
		std::mem::take(&mut self.updated)
	}
	/// True if any segment of the path passes through `rect`
	pub fn crosses_rect(&self, rect: &PathRectangle) -> bool {
		if self.points.is_empty() {
			return false;
		}
		let (x1, z1, x2, z2) = rect.get_world_bounds();
		let (rect_min, rect_max) = (Vec2::new(x1, z1), Vec2::new(x2, z2));
		if self.bounds_max.x < rect_min.x
			|| self.bounds_min.x > rect_max.x
			|| self.bounds_max.y < rect_min.y
			|| self.bounds_min.y > rect_max.y
		{
			return false;
		}
		if self.points.len() == 1 {
			let p = Vec2::new(self.points[0].x, self.points[0].z);
			return p.cmpge(rect_min).all() && p.cmple(rect_max).all();
		}
		self.points.windows(2).any(|w| {
			segment_intersects_box(
				Vec2::new(w[0].x, w[0].z),
				Vec2::new(w[1].x, w[1].z),
				rect_min,
				rect_max,
			)
		})
	}
}

/// Clip the segment `a -> b` against the box `[min, max]`
pub fn segment_intersects_box(a: Vec2, b: Vec2, min: Vec2, max: Vec2) -> bool {
	let d = b - a;
	let mut t0: f32 = 0.0;
	let mut t1: f32 = 1.0;
	for (p, q) in [
		(-d.x, a.x - min.x),
		(d.x, max.x - a.x),
		(-d.y, a.y - min.y),
		(d.y, max.y - a.y),
	] {
		if p == 0.0 {
			if q < 0.0 {
				return false;
			}
			continue;
		}
		let r = q / p;
		if p < 0.0 {
			t0 = t0.max(r);
		} else {
			t1 = t1.min(r);
		}
		if t0 > t1 {
			return false;
		}
	}
	true
}

#[rustfmt::skip]
#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn id_bits() {
		let id = PathId::new(7, 3);
		assert_eq!((3 << 32) | 7, id.to_bits());
		assert_eq!(id, PathId::from_bits(id.to_bits()));
		assert_eq!(0, PathId::NONE.to_bits());
		assert!(PathId::NONE.is_none());
		assert!(PathId::new(0, 1).is_some());
	}
	#[test]
	fn bounds_follow_points() {
		let mut path = QtpfsPath::default();
		path.set_points(vec![Vec3::new(10.0, 0.0, 50.0), Vec3::new(-4.0, 0.0, 70.0), Vec3::new(3.0, 0.0, 60.0)]);
		assert_eq!((Vec2::new(-4.0, 50.0), Vec2::new(10.0, 70.0)), path.get_bounds());
	}
	#[test]
	fn segment_through_box() {
		let hit = segment_intersects_box(Vec2::new(0.0, 0.0), Vec2::new(100.0, 100.0), Vec2::new(40.0, 40.0), Vec2::new(60.0, 60.0));
		assert!(hit);
		let miss = segment_intersects_box(Vec2::new(0.0, 100.0), Vec2::new(30.0, 60.0), Vec2::new(40.0, 40.0), Vec2::new(60.0, 60.0));
		assert!(!miss);
	}
	#[test]
	fn crossing_requires_segment_overlap() {
		let mut path = QtpfsPath::default();
		// an L shaped path whose box covers the rectangle but whose segments do not
		path.set_points(vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(200.0, 0.0, 0.0), Vec3::new(200.0, 0.0, 200.0)]);
		let inside = PathRectangle::new(5, 5, 10, 10);
		assert!(!path.crosses_rect(&inside));
		let on_route = PathRectangle::new(20, 5, 30, 10);
		assert!(path.crosses_rect(&on_route));
	}
	#[test]
	fn repath_keeps_id() {
		let owner = PathOwner::new(Entity::from_raw(3), 1);
		let mut path = QtpfsPath::new(PathId::new(2, 1), 0, Vec3::ZERO, Vec3::splat(100.0), 8.0, true, Some(owner));
		path.set_last_position(Vec3::new(40.0, 0.0, 40.0));
		let repath = path.to_repath();
		assert_eq!(path.get_id(), repath.get_id());
		assert_eq!(Vec3::new(40.0, 0.0, 40.0), repath.get_source());
		assert!(repath.is_repath());
		assert_eq!(4, repath.get_team(4));
		assert_eq!(1, path.get_team(4));
	}
}
