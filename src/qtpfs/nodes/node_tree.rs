//! The quad-tree of one movement class. Nodes are stored in an arena and
//! recycled through a free list as areas of the map are merged and
//! re-tesselated
//!

use crate::prelude::*;
use serde::{Deserialize, Serialize};

/// Multiplier folding node words into a checksum
const CHECKSUM_PRIME: u64 = 0x0100_0000_01b3;

/// Tree node as written to the tree cache, stored in pre-order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
	/// Node number, used to validate the shape while reading
	pub number: u64,
	/// `0` for a leaf or `4`
	pub num_children: u8,
	/// Bit pattern of the speed mod sum
	pub speed_mod_sum: u32,
	/// Bit pattern of the average speed mod
	pub speed_mod_avg: u32,
	/// Bit pattern of the move cost
	pub move_cost_avg: u32,
	/// Bit pattern of the lowest speed mod
	pub min_speed_mod: u32,
	/// Bit pattern of the highest speed mod
	pub max_speed_mod: u32,
	/// Impassable squares
	pub num_closed_squares: u32,
}

/// Quad-tree covering the whole map for one movement class
#[derive(Clone, Debug)]
pub struct NodeTree {
	/// Layer the tree belongs to
	layer_number: usize,
	/// Arena of nodes, slots listed in `free_list` are unused
	nodes: Vec<SpatialNode>,
	/// Recycled arena slots
	free_list: Vec<NodeIndex>,
	/// Root node covering the map
	root: NodeIndex,
	/// Number of leaves reachable from the root
	num_leaves: usize,
	/// Subdivision limits
	params: TesselationParams,
}

impl NodeTree {
	/// Create a new instance of [NodeTree] made of a single leaf covering the map
	pub fn new(layer_number: usize, map_size: (u32, u32), params: TesselationParams) -> Self {
		let root = SpatialNode::new(0, 0, 0, map_size.0, map_size.1, 0, None);
		NodeTree {
			layer_number,
			nodes: vec![root],
			free_list: Vec::new(),
			root: NodeIndex::new(0),
			num_leaves: 1,
			params,
		}
	}
	/// Get the root
	pub fn get_root(&self) -> NodeIndex {
		self.root
	}
	/// Get a node of the arena
	pub fn get_node(&self, index: NodeIndex) -> &SpatialNode {
		&self.nodes[index.get()]
	}
	/// Get a node of the arena mutably
	pub(crate) fn get_node_mut(&mut self, index: NodeIndex) -> &mut SpatialNode {
		&mut self.nodes[index.get()]
	}
	/// Number of slots in the arena, used and free
	pub fn get_arena_len(&self) -> usize {
		self.nodes.len()
	}
	/// Number of recycled slots
	pub fn get_num_free(&self) -> usize {
		self.free_list.len()
	}
	/// Number of leaves
	pub fn get_num_leaves(&self) -> usize {
		self.num_leaves
	}
	/// Get the subdivision limits
	pub fn get_params(&self) -> TesselationParams {
		self.params
	}
	/// Approximate heap usage in bytes
	pub fn get_memory_footprint(&self) -> usize {
		let neighbours: usize = self.nodes.iter().map(|n| n.get_neighbors().len()).sum();
		self.nodes.capacity() * std::mem::size_of::<SpatialNode>()
			+ self.free_list.capacity() * std::mem::size_of::<NodeIndex>()
			+ neighbours * std::mem::size_of::<NodeIndex>()
	}
	/// Collect every leaf in depth-first order
	pub fn get_leaves(&self) -> Vec<NodeIndex> {
		let mut leaves = Vec::with_capacity(self.num_leaves);
		let mut stack = vec![self.root];
		while let Some(index) = stack.pop() {
			match self.get_node(index).get_children() {
				Some(children) => stack.extend(children.iter().rev()),
				None => leaves.push(index),
			}
		}
		leaves
	}
	/// Whether a node may be divided into four children. Forced splits only
	/// need both halves to be non-empty
	pub fn can_split(&self, index: NodeIndex, force: bool) -> bool {
		let node = self.get_node(index);
		if (node.get_xsize() >> 1) == 0 || (node.get_zsize() >> 1) == 0 {
			return false;
		}
		if force {
			return true;
		}
		if node.get_depth() >= self.params.max_depth {
			return false;
		}
		!(node.get_xsize() <= self.params.min_size_x && node.get_zsize() <= self.params.min_size_z)
	}
	/// Divide a leaf into four children, returns false if it may not be split
	pub fn split(&mut self, index: NodeIndex, force: bool) -> Result<bool, QtpfsError> {
		if !self.get_node(index).is_leaf() || !self.can_split(index, force) {
			return Ok(false);
		}
		let needed = 4usize.saturating_sub(self.free_list.len());
		let node_number = self.get_node(index).get_number();
		self.nodes
			.try_reserve(needed)
			.map_err(|_| QtpfsError::NodeAllocation {
				layer: self.layer_number,
				node_number,
			})?;
		let node = self.get_node(index);
		let (xmin, zmin, xmax, zmax) = (node.get_xmin(), node.get_zmin(), node.get_xmax(), node.get_zmax());
		let (xmid, zmid) = (node.get_xmid(), node.get_zmid());
		let depth = node.get_depth() + 1;
		let quadrants = [
			(xmin, zmin, xmid, zmid),
			(xmid, zmin, xmax, zmid),
			(xmid, zmid, xmax, zmax),
			(xmin, zmid, xmid, zmax),
		];
		let numbers = [0, 1, 2, 3].map(|i| node.get_child_number(i));
		let mut children = [NodeIndex::default(); 4];
		for (i, (x1, z1, x2, z2)) in quadrants.into_iter().enumerate() {
			let child = SpatialNode::new(numbers[i], x1, z1, x2, z2, depth, Some(index));
			children[i] = self.alloc_node(child);
		}
		self.get_node_mut(index).set_children(Some(children));
		self.num_leaves += 3;
		Ok(true)
	}
	/// Place a node in a recycled slot or at the end of the arena
	fn alloc_node(&mut self, node: SpatialNode) -> NodeIndex {
		match self.free_list.pop() {
			Some(index) => {
				self.nodes[index.get()] = node;
				index
			}
			None => {
				self.nodes.push(node);
				NodeIndex::new(self.nodes.len() - 1)
			}
		}
	}
	/// Collapse the subtree under `index` back into a single leaf
	pub fn merge(&mut self, index: NodeIndex) {
		let Some(children) = self.get_node(index).get_children() else {
			return;
		};
		for child in children {
			self.merge(child);
			let node = self.get_node_mut(child);
			*node = SpatialNode::new(0, 0, 0, 0, 0, 0, None);
			self.free_list.push(child);
		}
		self.get_node_mut(index).set_children(None);
		self.num_leaves -= 3;
	}
	/// Find the nodes affected by a change under `rect` and re-tesselate them.
	/// Descends while the rectangle is small relative to the children, the
	/// area of every node rebuilt is added to `dirty`
	pub fn pre_tesselate(
		&mut self,
		index: NodeIndex,
		rect: &PathRectangle,
		squares: &SpeedModGrid,
		grid: &mut NodeGrid,
		dirty: &mut PathRectangle,
	) -> Result<(), QtpfsError> {
		let node = self.get_node(index);
		let relation = node.get_rectangle_relation(rect);
		let clipped = if relation != RectangleRelation::RectInteriorNode {
			node.clip_rectangle(rect)
		} else {
			*rect
		};
		if clipped.is_empty() {
			return Ok(());
		}
		let descend = relation == RectangleRelation::RectInteriorNode
			|| ((node.get_xsize() >> 1) as i32 > clipped.get_width()
				&& (node.get_zsize() >> 1) as i32 > clipped.get_height());
		match node.get_children() {
			Some(children) if descend => {
				for child in children {
					self.pre_tesselate(child, &clipped, squares, grid, dirty)?;
				}
			}
			_ => {
				*dirty = dirty.union(&node.get_rect());
				self.merge(index);
				self.tesselate(index, &clipped, squares, grid)?;
			}
		}
		Ok(())
	}
	/// Recompute the costs of a leaf and keep splitting it until every leaf
	/// below it is homogeneous or too small to split
	pub fn tesselate(
		&mut self,
		index: NodeIndex,
		rect: &PathRectangle,
		squares: &SpeedModGrid,
		grid: &mut NodeGrid,
	) -> Result<(), QtpfsError> {
		let wants_split = self.update_move_cost(index, squares);
		let force = rect.is_force_tesselation() && !rect.is_empty();
		if wants_split && self.split(index, force)? {
			if let Some(children) = self.get_node(index).get_children() {
				for child in children {
					let child_rect = self.get_node(child).clip_rectangle(rect);
					self.tesselate(child, &child_rect, squares, grid)?;
				}
			}
			return Ok(());
		}
		let node = self.get_node_mut(index);
		let closed = node.get_num_closed_squares();
		let area = node.get_area();
		if closed > 0 {
			if closed < area {
				node.set_move_cost(CLOSED_NODE_COST * (closed as f32 / area as f32));
			} else {
				node.set_move_cost(f32::INFINITY);
			}
		}
		grid.register(self.get_node(index), index);
		Ok(())
	}
	/// Aggregate the speed mods of every square of a node, returns true when
	/// the squares do not all fall within the tolerated bin range
	pub fn update_move_cost(&mut self, index: NodeIndex, squares: &SpeedModGrid) -> bool {
		let tolerance = self.params.homogeneity_tolerance;
		let node = self.get_node(index);
		let reference_bin = squares.get_speed_bin(node.get_xmin(), node.get_zmin());
		let mut speed_mod_sum = 0.0;
		let mut min_speed_mod = f32::MAX;
		let mut max_speed_mod: f32 = 0.0;
		let mut num_closed_squares = 0;
		let mut num_differing = 0;
		for z in node.get_zmin()..node.get_zmax() {
			for x in node.get_xmin()..node.get_xmax() {
				let speed_mod = squares.get_speed_mod(x, z);
				let bin = squares.get_speed_bin(x, z);
				speed_mod_sum += speed_mod;
				min_speed_mod = min_speed_mod.min(speed_mod);
				max_speed_mod = max_speed_mod.max(speed_mod);
				if speed_mod <= MIN_SPEEDMOD_VALUE {
					num_closed_squares += 1;
				}
				if bins_differ(bin, reference_bin, tolerance) {
					num_differing += 1;
				}
			}
		}
		let speed_mod_avg = speed_mod_sum / node.get_area() as f32;
		let move_cost_avg = if speed_mod_avg <= MIN_AVG_SPEED_MOD {
			f32::INFINITY
		} else {
			1.0 / speed_mod_avg
		};
		self.get_node_mut(index).set_costs(NodeCosts {
			speed_mod_sum,
			speed_mod_avg,
			move_cost_avg,
			min_speed_mod,
			max_speed_mod,
			num_closed_squares,
		});
		num_differing > 0
	}
	/// Deterministic fold over the shape and costs of the whole tree
	pub fn get_checksum(&self) -> u64 {
		self.get_node_checksum(self.root)
	}
	/// Checksum of a node and everything below it
	fn get_node_checksum(&self, index: NodeIndex) -> u64 {
		let node = self.get_node(index);
		let costs = node.get_costs();
		let words = [
			node.get_number(),
			node.get_xmin() as u64,
			node.get_zmin() as u64,
			node.get_xmax() as u64,
			node.get_zmax() as u64,
			node.get_depth() as u64,
			costs.speed_mod_sum.to_bits() as u64,
			costs.speed_mod_avg.to_bits() as u64,
			costs.move_cost_avg.to_bits() as u64,
			costs.num_closed_squares as u64,
		];
		let mut sum = 0u64;
		for word in words {
			sum = (sum.rotate_left(5) ^ word).wrapping_mul(CHECKSUM_PRIME);
		}
		if let Some(children) = node.get_children() {
			let weight = (node.get_number() << 8).wrapping_add(1);
			for child in children {
				sum ^= self.get_node_checksum(child).wrapping_mul(weight);
				sum = sum.rotate_left(13);
			}
		}
		sum
	}
	/// Pre-order list of every node's shape and costs
	pub fn to_snapshot(&self) -> Vec<NodeSnapshot> {
		let mut snapshot = Vec::with_capacity(self.num_leaves * 4 / 3 + 1);
		let mut stack = vec![self.root];
		while let Some(index) = stack.pop() {
			let node = self.get_node(index);
			let costs = node.get_costs();
			snapshot.push(NodeSnapshot {
				number: node.get_number(),
				num_children: if node.is_leaf() { 0 } else { 4 },
				speed_mod_sum: costs.speed_mod_sum.to_bits(),
				speed_mod_avg: costs.speed_mod_avg.to_bits(),
				move_cost_avg: costs.move_cost_avg.to_bits(),
				min_speed_mod: costs.min_speed_mod.to_bits(),
				max_speed_mod: costs.max_speed_mod.to_bits(),
				num_closed_squares: costs.num_closed_squares,
			});
			if let Some(children) = node.get_children() {
				stack.extend(children.iter().rev());
			}
		}
		snapshot
	}
	/// Rebuild the tree from a pre-order snapshot, registering every leaf
	pub fn restore_snapshot(&mut self, snapshot: &[NodeSnapshot], grid: &mut NodeGrid) -> Result<(), CacheError> {
		let root = self.root;
		self.merge(root);
		let mut cursor = 0;
		self.restore_node(root, snapshot, &mut cursor, grid)?;
		if cursor != snapshot.len() {
			return Err(CacheError::Mismatch(format!(
				"{} trailing nodes in snapshot",
				snapshot.len() - cursor
			)));
		}
		Ok(())
	}
	/// Apply the snapshot entry at `cursor` to `index` and recurse into its children
	fn restore_node(
		&mut self,
		index: NodeIndex,
		snapshot: &[NodeSnapshot],
		cursor: &mut usize,
		grid: &mut NodeGrid,
	) -> Result<(), CacheError> {
		let entry = snapshot
			.get(*cursor)
			.ok_or_else(|| CacheError::Mismatch("snapshot ended early".to_string()))?;
		*cursor += 1;
		let number = self.get_node(index).get_number();
		if entry.number != number {
			return Err(CacheError::Mismatch(format!(
				"expected node {} but found {}",
				number, entry.number
			)));
		}
		self.get_node_mut(index).set_costs(NodeCosts {
			speed_mod_sum: f32::from_bits(entry.speed_mod_sum),
			speed_mod_avg: f32::from_bits(entry.speed_mod_avg),
			move_cost_avg: f32::from_bits(entry.move_cost_avg),
			min_speed_mod: f32::from_bits(entry.min_speed_mod),
			max_speed_mod: f32::from_bits(entry.max_speed_mod),
			num_closed_squares: entry.num_closed_squares,
		});
		match entry.num_children {
			0 => {
				grid.register(self.get_node(index), index);
				Ok(())
			}
			4 => {
				let split = self
					.split(index, true)
					.map_err(|e| CacheError::Mismatch(e.to_string()))?;
				let Some(children) = self.get_node(index).get_children().filter(|_| split) else {
					return Err(CacheError::Mismatch(format!("node {} cannot be split", number)));
				};
				for child in children {
					self.restore_node(child, snapshot, cursor, grid)?;
				}
				Ok(())
			}
			n => Err(CacheError::Mismatch(format!("node {} has {} children", number, n))),
		}
	}
}

/// True when two speed bins may not share a leaf
fn bins_differ(a: i32, b: i32, tolerance: i32) -> bool {
	if (a == CLOSED_SPEED_BIN) != (b == CLOSED_SPEED_BIN) {
		return true;
	}
	(a - b).abs() > tolerance
}
