//! Rectangles of terrain squares used to describe dirty areas, search bounds
//! and node extents
//!

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// A rectangle of terrain squares spanning `[x1, x2) × [z1, z2)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Reflect, Serialize, Deserialize)]
pub struct PathRectangle {
	/// Inclusive minimum column
	x1: i32,
	/// Inclusive minimum row
	z1: i32,
	/// Exclusive maximum column
	x2: i32,
	/// Exclusive maximum row
	z2: i32,
	/// When true nodes overlapping the rectangle may split below the
	/// configured minimum leaf size
	force_tesselation: bool,
}

impl PathRectangle {
	/// Create a new instance of [PathRectangle]
	pub fn new(x1: i32, z1: i32, x2: i32, z2: i32) -> Self {
		PathRectangle {
			x1,
			z1,
			x2,
			z2,
			force_tesselation: false,
		}
	}
	/// Rectangle covering a whole map of `(x, z)` squares
	pub fn from_map_size(map_size: (u32, u32)) -> Self {
		PathRectangle::new(0, 0, map_size.0 as i32, map_size.1 as i32)
	}
	/// Builder to flag the rectangle as forcing tesselation
	pub fn with_force_tesselation(mut self, force: bool) -> Self {
		self.force_tesselation = force;
		self
	}
	/// Get the inclusive minimum column
	pub fn get_x1(&self) -> i32 {
		self.x1
	}
	/// Get the inclusive minimum row
	pub fn get_z1(&self) -> i32 {
		self.z1
	}
	/// Get the exclusive maximum column
	pub fn get_x2(&self) -> i32 {
		self.x2
	}
	/// Get the exclusive maximum row
	pub fn get_z2(&self) -> i32 {
		self.z2
	}
	/// Whether nodes touched by this rectangle may ignore the minimum leaf size
	pub fn is_force_tesselation(&self) -> bool {
		self.force_tesselation
	}
	/// Number of columns covered
	pub fn get_width(&self) -> i32 {
		self.x2 - self.x1
	}
	/// Number of rows covered
	pub fn get_height(&self) -> i32 {
		self.z2 - self.z1
	}
	/// Number of squares covered, `0` for degenerate rectangles
	pub fn get_area(&self) -> i64 {
		if self.is_empty() {
			0
		} else {
			self.get_width() as i64 * self.get_height() as i64
		}
	}
	/// True if the rectangle covers no squares
	pub fn is_empty(&self) -> bool {
		self.get_width() <= 0 || self.get_height() <= 0
	}
	/// Grow the rectangle by `margin` squares on each side
	pub fn expanded(&self, margin_x: i32, margin_z: i32) -> Self {
		PathRectangle {
			x1: self.x1 - margin_x,
			z1: self.z1 - margin_z,
			x2: self.x2 + margin_x,
			z2: self.z2 + margin_z,
			force_tesselation: self.force_tesselation,
		}
	}
	/// Restrict the rectangle to the squares of `other`
	pub fn clipped(&self, other: &PathRectangle) -> Self {
		PathRectangle {
			x1: self.x1.max(other.x1),
			z1: self.z1.max(other.z1),
			x2: self.x2.min(other.x2),
			z2: self.z2.min(other.z2),
			force_tesselation: self.force_tesselation,
		}
	}
	/// Smallest rectangle covering both `self` and `other`, empty inputs are ignored
	pub fn union(&self, other: &PathRectangle) -> Self {
		if self.is_empty() {
			return *other;
		}
		if other.is_empty() {
			return *self;
		}
		PathRectangle {
			x1: self.x1.min(other.x1),
			z1: self.z1.min(other.z1),
			x2: self.x2.max(other.x2),
			z2: self.z2.max(other.z2),
			force_tesselation: self.force_tesselation || other.force_tesselation,
		}
	}
	/// True when the two rectangles share at least one square
	pub fn intersects(&self, other: &PathRectangle) -> bool {
		self.x1 < other.x2 && other.x1 < self.x2 && self.z1 < other.z2 && other.z1 < self.z2
	}
	/// True if the square `(x, z)` lies inside the rectangle
	pub fn contains_square(&self, x: i32, z: i32) -> bool {
		x >= self.x1 && x < self.x2 && z >= self.z1 && z < self.z2
	}
	/// Lower and upper world space corners `(min_x, min_z, max_x, max_z)`
	pub fn get_world_bounds(&self) -> (f32, f32, f32, f32) {
		use crate::prelude::SQUARE_SIZE;
		(
			self.x1 as f32 * SQUARE_SIZE,
			self.z1 as f32 * SQUARE_SIZE,
			self.x2 as f32 * SQUARE_SIZE,
			self.z2 as f32 * SQUARE_SIZE,
		)
	}
	/// Iterate over every `(x, z)` square of the rectangle, row by row
	pub fn iter_squares(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
		(self.z1..self.z2).flat_map(move |z| (self.x1..self.x2).map(move |x| (x, z)))
	}
}

#[rustfmt::skip]
#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn area() {
		let r = PathRectangle::new(2, 3, 6, 5);
		assert_eq!(8, r.get_area());
	}
	#[test]
	fn degenerate_area() {
		let r = PathRectangle::new(6, 3, 2, 5);
		assert_eq!(0, r.get_area());
	}
	#[test]
	fn clip() {
		let r = PathRectangle::new(-4, -4, 10, 10);
		let map = PathRectangle::from_map_size((8, 8));
		assert_eq!(PathRectangle::new(0, 0, 8, 8), r.clipped(&map));
	}
	#[test]
	fn union_ignores_empty() {
		let a = PathRectangle::new(0, 0, 0, 0);
		let b = PathRectangle::new(1, 1, 3, 3);
		assert_eq!(b, a.union(&b));
		let c = PathRectangle::new(4, 0, 5, 2);
		assert_eq!(PathRectangle::new(1, 0, 5, 3), b.union(&c));
	}
	#[test]
	fn touching_edges_do_not_intersect() {
		let a = PathRectangle::new(0, 0, 4, 4);
		let b = PathRectangle::new(4, 0, 8, 4);
		assert!(!a.intersects(&b));
		let c = PathRectangle::new(3, 3, 8, 4);
		assert!(a.intersects(&c));
	}
	#[test]
	fn squares_row_major() {
		let r = PathRectangle::new(0, 0, 2, 2);
		let squares: Vec<(i32, i32)> = r.iter_squares().collect();
		assert_eq!(vec![(0, 0), (1, 0), (0, 1), (1, 1)], squares);
	}
}
