//! Useful constants and conversions shared by the trees, searches and paths
//!

use bevy::prelude::*;

/// World units spanned by one terrain square along each axis
pub const SQUARE_SIZE: f32 = 8.0;
/// Upper limit of a square's speed mod
pub const MAX_SPEEDMOD_VALUE: f32 = 2.0;
/// Lower limit of a square's speed mod, a square at this value is impassable
pub const MIN_SPEEDMOD_VALUE: f32 = 0.0;
/// Speed bin assigned to squares which cannot be crossed
pub const CLOSED_SPEED_BIN: i32 = -1;
/// Speed bin used for squares which have never been sampled so that the
/// first sampling of a layer always counts as a change
pub const UNSAMPLED_SPEED_BIN: i32 = -2;
/// Cost applied to leaves that contain some (but not only) impassable squares,
/// scaled by the fraction of squares that are impassable
pub const CLOSED_NODE_COST: f32 = 1_000_000.0;
/// Average speed mod below which a node is treated as impassable
pub const MIN_AVG_SPEED_MOD: f32 = 0.001;
/// Step between consecutive search generations. Each generation owns two
/// values, one marking a node as open and one marking it as closed
pub const NODE_STATE_OFFSET: u32 = 2;
/// Distance moved by the point handed out for a path that has not been
/// searched yet
pub const TEMP_POINT_DISTANCE: f32 = SQUARE_SIZE;
/// Squared distance under which two waypoints are considered the same point
pub const WAYPOINT_EPSILON_SQ: f32 = 0.1;
/// Value returned in place of a waypoint when the path does not exist
pub const NO_WAYPOINT: Vec3 = Vec3::new(-1.0, -1.0, -1.0);

/// Convert a world position into the `(x, z)` square containing it, clamped to the map
pub fn world_to_square(position: Vec3, map_size: (u32, u32)) -> (u32, u32) {
	let x = (position.x / SQUARE_SIZE).floor().max(0.0) as u32;
	let z = (position.z / SQUARE_SIZE).floor().max(0.0) as u32;
	(
		x.min(map_size.0.saturating_sub(1)),
		z.min(map_size.1.saturating_sub(1)),
	)
}

/// Clamp a world position so it lies within the playable area of the map
pub fn clamp_in_bounds(position: Vec3, map_size: (u32, u32)) -> Vec3 {
	let max_x = (map_size.0 as f32 * SQUARE_SIZE - 1.0).max(0.0);
	let max_z = (map_size.1 as f32 * SQUARE_SIZE - 1.0).max(0.0);
	Vec3::new(
		position.x.clamp(0.0, max_x),
		position.y,
		position.z.clamp(0.0, max_z),
	)
}

/// Number of squares on a map, computed in `usize` so large maps cannot overflow
pub fn get_num_squares(map_size: (u32, u32)) -> usize {
	map_size.0 as usize * map_size.1 as usize
}

/// Row-major position of square `(x, z)` in a flat per-square array
pub fn get_square_index(x: u32, z: u32, map_size: (u32, u32)) -> usize {
	z as usize * map_size.0 as usize + x as usize
}

/// Quantise a speed mod into one of `num_bins` bins
pub fn speed_mod_to_bin(speed_mod: f32, num_bins: u32) -> i32 {
	if speed_mod <= MIN_SPEEDMOD_VALUE {
		return CLOSED_SPEED_BIN;
	}
	let bins = num_bins.max(1) as i32;
	let bin = (speed_mod / MAX_SPEEDMOD_VALUE * bins as f32) as i32;
	bin.clamp(0, bins - 1)
}

#[rustfmt::skip]
#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn square_of_position() {
		let pos = Vec3::new(17.0, 0.0, 7.9);
		let result = world_to_square(pos, (64, 64));
		assert_eq!((2, 0), result);
	}
	#[test]
	fn square_of_position_outside_map() {
		let pos = Vec3::new(-30.0, 0.0, 9000.0);
		let result = world_to_square(pos, (64, 64));
		assert_eq!((0, 63), result);
	}
	#[test]
	fn clamp_position() {
		let pos = Vec3::new(-1.0, 3.0, 600.0);
		let result = clamp_in_bounds(pos, (64, 64));
		assert_eq!(Vec3::new(0.0, 3.0, 511.0), result);
	}
	#[test]
	fn square_count_does_not_overflow() {
		let size = (65_536, 65_536);
		assert_eq!(1usize << 32, get_num_squares(size));
		assert_eq!((1usize << 32) - 1, get_square_index(65_535, 65_535, size));
	}
	#[test]
	fn square_index_is_row_major() {
		assert_eq!(3 * 64 + 5, get_square_index(5, 3, (64, 32)));
	}
	#[test]
	fn closed_bin() {
		assert_eq!(CLOSED_SPEED_BIN, speed_mod_to_bin(0.0, 20));
	}
	#[test]
	fn bins_are_clamped() {
		assert_eq!(0, speed_mod_to_bin(0.01, 20));
		assert_eq!(10, speed_mod_to_bin(1.0, 20));
		assert_eq!(19, speed_mod_to_bin(MAX_SPEEDMOD_VALUE, 20));
	}
}
