//! Nodes of the quad-trees. A node covers a rectangle of terrain squares and
//! is either a leaf or the parent of exactly four children:
//!
//! ```text
//!  _______________
//! |       |       |
//! |   0   |   1   |
//! |_______|_______|
//! |       |       |
//! |   3   |   2   |
//! |_______|_______|
//! ```
//!
//! Nodes live in an arena owned by their [node_tree::NodeTree] and refer to
//! one another through [NodeIndex]
//!

pub mod node_layer;
pub mod node_tree;

use crate::prelude::*;
use bevy::prelude::*;

/// Position of a node within the arena of its tree
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct NodeIndex(u32);

impl NodeIndex {
	/// Create a new instance of [NodeIndex]
	pub fn new(index: usize) -> Self {
		NodeIndex(index as u32)
	}
	/// Get the arena slot
	pub fn get(&self) -> usize {
		self.0 as usize
	}
}

/// How a rectangle sits relative to a node
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RectangleRelation {
	/// The rectangle lies strictly inside the node
	RectInteriorNode,
	/// The node lies inside the rectangle
	NodeInteriorRect,
	/// The two do not share any square
	RectExteriorNode,
	/// The two partially overlap
	Overlaps,
}

/// Side of a node on which a neighbour sits
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NeighborSide {
	/// Neighbour lies towards `-x`
	Left,
	/// Neighbour lies towards `+x`
	Right,
	/// Neighbour lies towards `-z`
	Top,
	/// Neighbour lies towards `+z`
	Bottom,
}

/// Parameters steering how far a tree may be subdivided
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TesselationParams {
	/// Minimum leaf width in squares
	pub min_size_x: u32,
	/// Minimum leaf height in squares
	pub min_size_z: u32,
	/// Deepest level of the tree
	pub max_depth: u32,
	/// Largest speed bin difference tolerated inside a leaf
	pub homogeneity_tolerance: i32,
	/// Number of speed bins
	pub num_speed_mod_bins: u32,
}

impl Default for TesselationParams {
	fn default() -> Self {
		QtpfsConfig::default().get_tesselation_params()
	}
}

/// A rectangle of terrain squares `[xmin, xmax) × [zmin, zmax)` and the
/// aggregate cost of crossing it
#[derive(Clone, Debug, PartialEq)]
pub struct SpatialNode {
	/// Position of the node in the tree, the root is `0` and the children of
	/// `n` are `4n + 1 ..= 4n + 4`
	number: u64,
	/// Inclusive minimum column
	xmin: u32,
	/// Inclusive minimum row
	zmin: u32,
	/// Exclusive maximum column
	xmax: u32,
	/// Exclusive maximum row
	zmax: u32,
	/// Distance from the root
	depth: u32,
	/// Parent node, `None` for the root
	parent: Option<NodeIndex>,
	/// The four children of a split node
	children: Option<[NodeIndex; 4]>,
	/// Sum of the speed mods of all squares
	speed_mod_sum: f32,
	/// Average speed mod of all squares
	speed_mod_avg: f32,
	/// Cost of moving one world unit through the node
	move_cost_avg: f32,
	/// Lowest speed mod of any square
	min_speed_mod: f32,
	/// Highest speed mod of any square
	max_speed_mod: f32,
	/// Number of squares that are impassable
	num_closed_squares: u32,
	/// Adjacent leaves, only maintained for leaves
	neighbors: Vec<NodeIndex>,
	/// Generation at which `neighbors` was last rebuilt
	neighbor_generation: Option<u32>,
}

impl SpatialNode {
	/// Create a new instance of [SpatialNode] without any cost data
	pub fn new(number: u64, xmin: u32, zmin: u32, xmax: u32, zmax: u32, depth: u32, parent: Option<NodeIndex>) -> Self {
		SpatialNode {
			number,
			xmin,
			zmin,
			xmax,
			zmax,
			depth,
			parent,
			children: None,
			speed_mod_sum: 0.0,
			speed_mod_avg: 0.0,
			move_cost_avg: f32::INFINITY,
			min_speed_mod: 0.0,
			max_speed_mod: 0.0,
			num_closed_squares: 0,
			neighbors: Vec::new(),
			neighbor_generation: None,
		}
	}
	/// Get the node number
	pub fn get_number(&self) -> u64 {
		self.number
	}
	/// Number of the `i`th child this node would have
	pub fn get_child_number(&self, i: usize) -> u64 {
		(self.number << 2).wrapping_add(i as u64 + 1)
	}
	/// Get the inclusive minimum column
	pub fn get_xmin(&self) -> u32 {
		self.xmin
	}
	/// Get the inclusive minimum row
	pub fn get_zmin(&self) -> u32 {
		self.zmin
	}
	/// Get the exclusive maximum column
	pub fn get_xmax(&self) -> u32 {
		self.xmax
	}
	/// Get the exclusive maximum row
	pub fn get_zmax(&self) -> u32 {
		self.zmax
	}
	/// Middle column used when splitting
	pub fn get_xmid(&self) -> u32 {
		(self.xmin + self.xmax) >> 1
	}
	/// Middle row used when splitting
	pub fn get_zmid(&self) -> u32 {
		(self.zmin + self.zmax) >> 1
	}
	/// Width in squares
	pub fn get_xsize(&self) -> u32 {
		self.xmax - self.xmin
	}
	/// Height in squares
	pub fn get_zsize(&self) -> u32 {
		self.zmax - self.zmin
	}
	/// Number of squares covered
	pub fn get_area(&self) -> u32 {
		self.get_xsize() * self.get_zsize()
	}
	/// Get the depth
	pub fn get_depth(&self) -> u32 {
		self.depth
	}
	/// Get the parent
	pub fn get_parent(&self) -> Option<NodeIndex> {
		self.parent
	}
	/// Get the children, `None` for a leaf
	pub fn get_children(&self) -> Option<[NodeIndex; 4]> {
		self.children
	}
	/// Set the children
	pub(crate) fn set_children(&mut self, children: Option<[NodeIndex; 4]>) {
		self.children = children;
	}
	/// True if the node has no children
	pub fn is_leaf(&self) -> bool {
		self.children.is_none()
	}
	/// Get the sum of speed mods
	pub fn get_speed_mod_sum(&self) -> f32 {
		self.speed_mod_sum
	}
	/// Get the average speed mod
	pub fn get_speed_mod_avg(&self) -> f32 {
		self.speed_mod_avg
	}
	/// Get the cost of moving one world unit through the node
	pub fn get_move_cost(&self) -> f32 {
		self.move_cost_avg
	}
	/// Get the lowest square speed mod
	pub fn get_min_speed_mod(&self) -> f32 {
		self.min_speed_mod
	}
	/// Get the highest square speed mod
	pub fn get_max_speed_mod(&self) -> f32 {
		self.max_speed_mod
	}
	/// Get the number of impassable squares
	pub fn get_num_closed_squares(&self) -> u32 {
		self.num_closed_squares
	}
	/// Store freshly computed aggregates
	pub(crate) fn set_costs(&mut self, costs: NodeCosts) {
		self.speed_mod_sum = costs.speed_mod_sum;
		self.speed_mod_avg = costs.speed_mod_avg;
		self.move_cost_avg = costs.move_cost_avg;
		self.min_speed_mod = costs.min_speed_mod;
		self.max_speed_mod = costs.max_speed_mod;
		self.num_closed_squares = costs.num_closed_squares;
	}
	/// Read back the aggregates
	pub fn get_costs(&self) -> NodeCosts {
		NodeCosts {
			speed_mod_sum: self.speed_mod_sum,
			speed_mod_avg: self.speed_mod_avg,
			move_cost_avg: self.move_cost_avg,
			min_speed_mod: self.min_speed_mod,
			max_speed_mod: self.max_speed_mod,
			num_closed_squares: self.num_closed_squares,
		}
	}
	/// Override the move cost
	pub(crate) fn set_move_cost(&mut self, cost: f32) {
		self.move_cost_avg = cost;
	}
	/// True if no square of the node can be crossed
	pub fn all_squares_impassable(&self) -> bool {
		self.move_cost_avg == f32::INFINITY
	}
	/// Get the adjacent leaves
	pub fn get_neighbors(&self) -> &[NodeIndex] {
		&self.neighbors
	}
	/// Replace the adjacent leaves and stamp them with `generation`
	pub(crate) fn set_neighbors(&mut self, neighbors: Vec<NodeIndex>, generation: u32) {
		self.neighbors = neighbors;
		self.neighbor_generation = Some(generation);
	}
	/// Generation of the neighbour list
	pub fn get_neighbor_generation(&self) -> Option<u32> {
		self.neighbor_generation
	}
	/// The node extent as a rectangle
	pub fn get_rect(&self) -> PathRectangle {
		PathRectangle::new(self.xmin as i32, self.zmin as i32, self.xmax as i32, self.zmax as i32)
	}
	/// True if square `(x, z)` is within the node
	pub fn contains_square(&self, x: u32, z: u32) -> bool {
		x >= self.xmin && x < self.xmax && z >= self.zmin && z < self.zmax
	}
	/// Centre of the node in world space
	pub fn get_world_midpoint(&self) -> Vec2 {
		Vec2::new(
			(self.xmin + self.xmax) as f32 * 0.5 * SQUARE_SIZE,
			(self.zmin + self.zmax) as f32 * 0.5 * SQUARE_SIZE,
		)
	}
	/// Classify `rect` against the node
	pub fn get_rectangle_relation(&self, rect: &PathRectangle) -> RectangleRelation {
		let (xmin, zmin, xmax, zmax) = (self.xmin as i32, self.zmin as i32, self.xmax as i32, self.zmax as i32);
		if rect.get_x1() >= xmax || rect.get_x2() <= xmin || rect.get_z1() >= zmax || rect.get_z2() <= zmin {
			return RectangleRelation::RectExteriorNode;
		}
		if rect.get_x1() >= xmin && rect.get_x2() < xmax && rect.get_z1() >= zmin && rect.get_z2() < zmax {
			return RectangleRelation::RectInteriorNode;
		}
		if rect.get_x1() <= xmin && rect.get_x2() >= xmax && rect.get_z1() <= zmin && rect.get_z2() >= zmax {
			return RectangleRelation::NodeInteriorRect;
		}
		RectangleRelation::Overlaps
	}
	/// Restrict `rect` to the squares of the node
	pub fn clip_rectangle(&self, rect: &PathRectangle) -> PathRectangle {
		rect.clipped(&self.get_rect())
	}
	/// Side of `self` on which the adjacent node `other` lies, `None` if they
	/// do not share an edge
	pub fn get_neighbor_side(&self, other: &SpatialNode) -> Option<NeighborSide> {
		let overlap_x = self.xmin < other.xmax && other.xmin < self.xmax;
		let overlap_z = self.zmin < other.zmax && other.zmin < self.zmax;
		if overlap_z && other.xmax == self.xmin {
			Some(NeighborSide::Left)
		} else if overlap_z && other.xmin == self.xmax {
			Some(NeighborSide::Right)
		} else if overlap_x && other.zmax == self.zmin {
			Some(NeighborSide::Top)
		} else if overlap_x && other.zmin == self.zmax {
			Some(NeighborSide::Bottom)
		} else {
			None
		}
	}
	/// World space end points `(start, end)` of the edge shared with `other`
	pub fn get_shared_edge(&self, other: &SpatialNode) -> Option<(Vec2, Vec2)> {
		let side = self.get_neighbor_side(other)?;
		let min_x = self.xmin.max(other.xmin) as f32 * SQUARE_SIZE;
		let max_x = self.xmax.min(other.xmax) as f32 * SQUARE_SIZE;
		let min_z = self.zmin.max(other.zmin) as f32 * SQUARE_SIZE;
		let max_z = self.zmax.min(other.zmax) as f32 * SQUARE_SIZE;
		let edge = match side {
			NeighborSide::Left => {
				let x = self.xmin as f32 * SQUARE_SIZE;
				(Vec2::new(x, min_z), Vec2::new(x, max_z))
			}
			NeighborSide::Right => {
				let x = self.xmax as f32 * SQUARE_SIZE;
				(Vec2::new(x, min_z), Vec2::new(x, max_z))
			}
			NeighborSide::Top => {
				let z = self.zmin as f32 * SQUARE_SIZE;
				(Vec2::new(min_x, z), Vec2::new(max_x, z))
			}
			NeighborSide::Bottom => {
				let z = self.zmax as f32 * SQUARE_SIZE;
				(Vec2::new(min_x, z), Vec2::new(max_x, z))
			}
		};
		Some(edge)
	}
	/// The point at which a path crosses from `self` into the adjacent `other`,
	/// the midpoint of their shared edge
	pub fn get_edge_transition_point(&self, other: &SpatialNode) -> Option<Vec2> {
		let (a, b) = self.get_shared_edge(other)?;
		Some((a + b) * 0.5)
	}
}

/// Aggregated speed data of a node
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeCosts {
	/// Sum of the speed mods of all squares
	pub speed_mod_sum: f32,
	/// Average speed mod
	pub speed_mod_avg: f32,
	/// Cost of moving one world unit through the node
	pub move_cost_avg: f32,
	/// Lowest square speed mod
	pub min_speed_mod: f32,
	/// Highest square speed mod
	pub max_speed_mod: f32,
	/// Impassable squares
	pub num_closed_squares: u32,
}
