//! Interfaces to the world outside of pathfinding: the movement classes of
//! units and the terrain they move across
//!

use crate::prelude::*;
use bevy::prelude::*;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// How a movement class gets around, decides which squares it can enter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect, Serialize, Deserialize)]
pub enum MoveFamily {
	/// Wheeled or tracked ground units
	Tank,
	/// Legged ground units
	KBot,
	/// Crosses land and water surfaces alike
	Hover,
	/// Needs water deeper than its depth
	Ship,
}

/// Speed multipliers applied to squares occupied by mobile obstacles
#[derive(Debug, Clone, Copy, PartialEq, Reflect, Serialize, Deserialize)]
pub struct ObstacleSpeedMods {
	/// Square holds a unit that is moving
	moving: f32,
	/// Square holds a unit that is busy (e.g building)
	busy: f32,
	/// Square holds a unit standing still
	idle: f32,
}

impl Default for ObstacleSpeedMods {
	fn default() -> Self {
		ObstacleSpeedMods {
			moving: 0.65,
			busy: 0.10,
			idle: 0.35,
		}
	}
}

impl ObstacleSpeedMods {
	/// Create a new instance of [ObstacleSpeedMods]
	pub fn new(moving: f32, busy: f32, idle: f32) -> Self {
		ObstacleSpeedMods { moving, busy, idle }
	}
	/// Multiplier for a square in the given blocking state
	pub fn get_multiplier(&self, blocking: SquareBlocking) -> f32 {
		match blocking {
			SquareBlocking::Open => 1.0,
			SquareBlocking::MobileMoving => self.moving,
			SquareBlocking::MobileBusy => self.busy,
			SquareBlocking::MobileIdle => self.idle,
			SquareBlocking::Structure => 0.0,
		}
	}
}

/// A movement class. Each one owns a dedicated node layer whose index is the
/// `path_type` of the class
#[derive(Debug, Clone, PartialEq, Reflect, Serialize, Deserialize)]
pub struct MoveDef {
	/// Unique name, used to name cache files
	name: String,
	/// Index of the node layer serving this class
	path_type: usize,
	/// Footprint of units of this class in squares `(x, z)`
	footprint: (u32, u32),
	/// Locomotion of the class
	family: MoveFamily,
	/// Steepest slope the class can climb, `0.0..=1.0`
	max_slope: f32,
	/// For ground units the deepest water they can wade through, for ships
	/// the minimum depth they need
	depth: f32,
	/// How strongly slopes slow the class down
	slope_mod: f32,
	/// Multipliers for squares holding mobile obstacles
	obstacle_mods: ObstacleSpeedMods,
}

impl MoveDef {
	/// Create a new instance of [MoveDef] with a `1x1` footprint and common
	/// defaults for the family
	pub fn new(name: &str, path_type: usize, family: MoveFamily) -> Self {
		let (max_slope, depth) = match family {
			MoveFamily::Tank => (0.5, 20.0),
			MoveFamily::KBot => (0.8, 20.0),
			MoveFamily::Hover => (0.5, 0.0),
			MoveFamily::Ship => (1.0, 10.0),
		};
		MoveDef {
			name: name.to_string(),
			path_type,
			footprint: (1, 1),
			family,
			max_slope,
			depth,
			slope_mod: 4.0,
			obstacle_mods: ObstacleSpeedMods::default(),
		}
	}
	/// Builder to set the footprint in squares
	///
	/// # Panics
	///
	/// A footprint must be at least one square in each direction
	pub fn with_footprint(mut self, x: u32, z: u32) -> Self {
		if x == 0 || z == 0 {
			panic!("MoveDef {} footprint must be non-zero, got ({}, {})", self.name, x, z);
		}
		self.footprint = (x, z);
		self
	}
	/// Builder to set the steepest climbable slope
	pub fn with_max_slope(mut self, max_slope: f32) -> Self {
		self.max_slope = max_slope;
		self
	}
	/// Builder to set the depth tolerance
	pub fn with_depth(mut self, depth: f32) -> Self {
		self.depth = depth;
		self
	}
	/// Builder to set the slope speed modifier
	pub fn with_slope_mod(mut self, slope_mod: f32) -> Self {
		self.slope_mod = slope_mod;
		self
	}
	/// Builder to set the mobile obstacle multipliers
	pub fn with_obstacle_mods(mut self, obstacle_mods: ObstacleSpeedMods) -> Self {
		self.obstacle_mods = obstacle_mods;
		self
	}
	/// Get the name
	pub fn get_name(&self) -> &str {
		&self.name
	}
	/// Get the layer index of the class
	pub fn get_path_type(&self) -> usize {
		self.path_type
	}
	/// Get the footprint in squares
	pub fn get_footprint(&self) -> (u32, u32) {
		self.footprint
	}
	/// Half of the footprint, the margin around a square checked for structures
	pub fn get_footprint_half(&self) -> (u32, u32) {
		(self.footprint.0 >> 1, self.footprint.1 >> 1)
	}
	/// Get the family
	pub fn get_family(&self) -> MoveFamily {
		self.family
	}
	/// Speed mod of a single square for this class ignoring its surroundings
	pub fn get_speed_mod(&self, square: &TerrainSquare) -> f32 {
		let under_water = square.height < 0.0;
		let (depth_ok, slope) = match self.family {
			MoveFamily::Tank | MoveFamily::KBot => (square.height > -self.depth, square.slope),
			MoveFamily::Hover => (true, if under_water { 0.0 } else { square.slope }),
			MoveFamily::Ship => (square.height < -self.depth, 0.0),
		};
		if !depth_ok || slope > self.max_slope {
			return MIN_SPEEDMOD_VALUE;
		}
		let slope_factor = 1.0 / (1.0 + slope * self.slope_mod);
		let obstacle_factor = self.obstacle_mods.get_multiplier(square.blocking);
		(square.speed_factor * slope_factor * obstacle_factor)
			.clamp(MIN_SPEEDMOD_VALUE, MAX_SPEEDMOD_VALUE)
	}
}

/// What, if anything, occupies a square
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Reflect, Serialize, Deserialize)]
pub enum SquareBlocking {
	/// Nothing in the way
	#[default]
	Open,
	/// A unit passing through
	MobileMoving,
	/// A unit occupied with a task
	MobileBusy,
	/// A unit standing still
	MobileIdle,
	/// A building or feature, impassable for every class
	Structure,
}

/// Sample of a single terrain square
#[derive(Debug, Clone, Copy, PartialEq, Reflect, Serialize, Deserialize)]
pub struct TerrainSquare {
	/// Height of the square, negative values are under water
	pub height: f32,
	/// Steepness `0.0..=1.0`
	pub slope: f32,
	/// Speed multiplier of the terrain type
	pub speed_factor: f32,
	/// Occupation of the square
	pub blocking: SquareBlocking,
}

impl Default for TerrainSquare {
	fn default() -> Self {
		TerrainSquare {
			height: 0.0,
			slope: 0.0,
			speed_factor: 1.0,
			blocking: SquareBlocking::Open,
		}
	}
}

/// Source of terrain data. The pathfinder only reads from it, changes are
/// announced through [crate::prelude::PathManager::terrain_change]
pub trait TerrainProvider: Send + Sync {
	/// Size of the map in squares `(x, z)`
	fn get_map_size(&self) -> (u32, u32);
	/// Sample a square, coordinates are within the map
	fn get_square(&self, x: u32, z: u32) -> TerrainSquare;
	/// Visit every square of `rect` (already clipped to the map) row by row
	fn sample_rect(&self, rect: &PathRectangle, visit: &mut dyn FnMut(u32, u32, &TerrainSquare)) {
		for (x, z) in rect.iter_squares() {
			let square = self.get_square(x as u32, z as u32);
			visit(x as u32, z as u32, &square);
		}
	}
}

/// A simple grid of terrain squares that can be edited while it is shared
/// with the pathfinder
pub struct HeightMap {
	/// Size of the map in squares `(x, z)`
	size: (u32, u32),
	/// Row-major squares
	squares: RwLock<Vec<TerrainSquare>>,
}

impl HeightMap {
	/// Create a flat, open map of `(x, z)` squares
	///
	/// # Panics
	///
	/// The map must contain at least one square
	pub fn new(size_x: u32, size_z: u32) -> Self {
		if size_x == 0 || size_z == 0 {
			panic!("HeightMap must have a non-zero size, got ({}, {})", size_x, size_z);
		}
		HeightMap {
			size: (size_x, size_z),
			squares: RwLock::new(vec![TerrainSquare::default(); get_num_squares((size_x, size_z))]),
		}
	}
	/// Rectangle of the whole map
	fn get_map_rect(&self) -> PathRectangle {
		PathRectangle::from_map_size(self.size)
	}
	/// Set the blocking state of every square under `rect`
	pub fn set_blocking(&self, rect: &PathRectangle, blocking: SquareBlocking) {
		let rect = rect.clipped(&self.get_map_rect());
		let mut squares = self.squares.write();
		for (x, z) in rect.iter_squares() {
			squares[get_square_index(x as u32, z as u32, self.size)].blocking = blocking;
		}
	}
	/// Set the terrain type speed factor of every square under `rect`
	pub fn set_speed_factor(&self, rect: &PathRectangle, speed_factor: f32) {
		let rect = rect.clipped(&self.get_map_rect());
		let mut squares = self.squares.write();
		for (x, z) in rect.iter_squares() {
			squares[get_square_index(x as u32, z as u32, self.size)].speed_factor = speed_factor;
		}
	}
	/// Set the height of every square under `rect` and recompute the slopes
	/// around it
	pub fn set_height(&self, rect: &PathRectangle, height: f32) {
		let rect = rect.clipped(&self.get_map_rect());
		let mut squares = self.squares.write();
		for (x, z) in rect.iter_squares() {
			squares[get_square_index(x as u32, z as u32, self.size)].height = height;
		}
		let dirty = rect.expanded(1, 1).clipped(&self.get_map_rect());
		for (x, z) in dirty.iter_squares() {
			let slope = self.calc_slope(&squares, x as u32, z as u32);
			squares[get_square_index(x as u32, z as u32, self.size)].slope = slope;
		}
	}
	/// Steepest height difference to the right and lower neighbours scaled into `0.0..=1.0`
	fn calc_slope(&self, squares: &[TerrainSquare], x: u32, z: u32) -> f32 {
		let h = squares[get_square_index(x, z, self.size)].height;
		let mut diff: f32 = 0.0;
		if x + 1 < self.size.0 {
			diff = diff.max((squares[get_square_index(x + 1, z, self.size)].height - h).abs());
		}
		if z + 1 < self.size.1 {
			diff = diff.max((squares[get_square_index(x, z + 1, self.size)].height - h).abs());
		}
		(diff / SQUARE_SIZE).clamp(0.0, 1.0)
	}
}

impl TerrainProvider for HeightMap {
	fn get_map_size(&self) -> (u32, u32) {
		self.size
	}
	fn get_square(&self, x: u32, z: u32) -> TerrainSquare {
		self.squares.read()[get_square_index(x, z, self.size)]
	}
	fn sample_rect(&self, rect: &PathRectangle, visit: &mut dyn FnMut(u32, u32, &TerrainSquare)) {
		let squares = self.squares.read();
		for (x, z) in rect.iter_squares() {
			let (x, z) = (x as u32, z as u32);
			visit(x, z, &squares[get_square_index(x, z, self.size)]);
		}
	}
}
