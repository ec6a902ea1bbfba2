//! A node layer binds one quad-tree to one movement class. It owns the
//! per-square speed data the tree is built from, a lookup from squares to the
//! leaf covering them and the per-node scratch space used by searches
//!

use std::collections::VecDeque;

use crate::prelude::*;
use bevy::prelude::*;

/// Current and previous speed mods and bins of every square
#[derive(Clone, Debug)]
pub struct SpeedModGrid {
	/// Size of the map in squares
	size: (u32, u32),
	/// Speed mods as last sampled
	cur_speed_mods: Vec<f32>,
	/// Speed mods before the last sampling
	old_speed_mods: Vec<f32>,
	/// Speed bins as last sampled
	cur_speed_bins: Vec<i32>,
	/// Speed bins before the last sampling
	old_speed_bins: Vec<i32>,
}

impl SpeedModGrid {
	/// Create a new instance of [SpeedModGrid] where no square has been sampled
	pub fn new(size: (u32, u32)) -> Self {
		let len = get_num_squares(size);
		SpeedModGrid {
			size,
			cur_speed_mods: vec![0.0; len],
			old_speed_mods: vec![0.0; len],
			cur_speed_bins: vec![UNSAMPLED_SPEED_BIN; len],
			old_speed_bins: vec![UNSAMPLED_SPEED_BIN; len],
		}
	}
	/// Position of a square in the flat arrays
	fn get_index(&self, x: u32, z: u32) -> usize {
		get_square_index(x, z, self.size)
	}
	/// Current speed mod of a square
	pub fn get_speed_mod(&self, x: u32, z: u32) -> f32 {
		self.cur_speed_mods[self.get_index(x, z)]
	}
	/// Previous speed mod of a square
	pub fn get_old_speed_mod(&self, x: u32, z: u32) -> f32 {
		self.old_speed_mods[self.get_index(x, z)]
	}
	/// Current speed bin of a square
	pub fn get_speed_bin(&self, x: u32, z: u32) -> i32 {
		self.cur_speed_bins[self.get_index(x, z)]
	}
	/// Previous speed bin of a square
	pub fn get_old_speed_bin(&self, x: u32, z: u32) -> i32 {
		self.old_speed_bins[self.get_index(x, z)]
	}
	/// Record a new sample, returns true if the square changed bin
	pub fn set_square(&mut self, x: u32, z: u32, speed_mod: f32, num_bins: u32) -> bool {
		let i = self.get_index(x, z);
		let bin = speed_mod_to_bin(speed_mod, num_bins);
		self.old_speed_mods[i] = self.cur_speed_mods[i];
		self.old_speed_bins[i] = self.cur_speed_bins[i];
		self.cur_speed_mods[i] = speed_mod;
		self.cur_speed_bins[i] = bin;
		self.old_speed_bins[i] != bin
	}
}

/// Lookup from every square to the leaf that covers it
#[derive(Clone, Debug)]
pub struct NodeGrid {
	/// Size of the map in squares
	size: (u32, u32),
	/// Row-major leaf of each square
	cells: Vec<NodeIndex>,
}

impl NodeGrid {
	/// Create a new instance of [NodeGrid] pointing every square at the root
	pub fn new(size: (u32, u32)) -> Self {
		NodeGrid {
			size,
			cells: vec![NodeIndex::default(); get_num_squares(size)],
		}
	}
	/// Point every square of a leaf at it
	pub fn register(&mut self, node: &SpatialNode, index: NodeIndex) {
		for z in node.get_zmin()..node.get_zmax() {
			let start = get_square_index(node.get_xmin(), z, self.size);
			let end = start + (node.get_xmax() - node.get_xmin()) as usize;
			self.cells[start..end].fill(index);
		}
	}
	/// Leaf covering square `(x, z)`
	pub fn get(&self, x: u32, z: u32) -> NodeIndex {
		self.cells[get_square_index(x, z, self.size)]
	}
}

/// Scratch data a search keeps for a node. The `state` is compared against
/// the generation of the running search so the buffer never needs clearing
#[derive(Clone, Copy, Debug, Default)]
pub struct NodeSearchState {
	/// Generation the node was last touched in, plus `1` once closed
	pub state: u32,
	/// Node the search arrived from
	pub prev: Option<NodeIndex>,
	/// Cost from the source
	pub g_cost: f32,
	/// Estimated cost to the target
	pub h_cost: f32,
	/// `g_cost + h_cost`
	pub f_cost: f32,
	/// World `(x, z)` point at which the search entered the node
	pub point: Vec2,
}

/// Quad-tree, speed data and search scratch space of one movement class
#[derive(Clone, Debug)]
pub struct NodeLayer {
	/// Index of the layer, equal to the `path_type` of its movement class
	layer_number: usize,
	/// Size of the map in squares
	map_size: (u32, u32),
	/// Speed data the tree is derived from
	squares: SpeedModGrid,
	/// The tree
	tree: NodeTree,
	/// Square to leaf lookup
	grid: NodeGrid,
	/// Per arena slot search data
	search_states: Vec<NodeSearchState>,
	/// Changed areas waiting to be applied in staggered mode
	update_queue: VecDeque<PathRectangle>,
	/// Highest speed mod of any square ever sampled, bounds the heuristic
	max_speed_mod: f32,
	/// Generation stamped on neighbour lists by the last rebuild
	neighbor_generation: u32,
}

impl NodeLayer {
	/// Create a new instance of [NodeLayer] with a single leaf covering the map
	pub fn new(layer_number: usize, map_size: (u32, u32), params: TesselationParams) -> Self {
		let mut layer = NodeLayer {
			layer_number,
			map_size,
			squares: SpeedModGrid::new(map_size),
			tree: NodeTree::new(layer_number, map_size, params),
			grid: NodeGrid::new(map_size),
			search_states: Vec::new(),
			update_queue: VecDeque::new(),
			max_speed_mod: 0.0,
			neighbor_generation: 0,
		};
		layer.init(layer_number);
		layer
	}
	/// Reset the layer to a single root leaf covering the map
	pub fn init(&mut self, layer_number: usize) {
		self.layer_number = layer_number;
		let params = self.tree.get_params();
		self.tree = NodeTree::new(layer_number, self.map_size, params);
		let root = self.tree.get_root();
		self.grid.register(self.tree.get_node(root), root);
		self.search_states = vec![NodeSearchState::default(); self.tree.get_arena_len()];
		self.update_queue.clear();
	}
	/// Get the layer number
	pub fn get_layer_number(&self) -> usize {
		self.layer_number
	}
	/// Get the map size in squares
	pub fn get_map_size(&self) -> (u32, u32) {
		self.map_size
	}
	/// Rectangle of the whole map
	pub fn get_map_rect(&self) -> PathRectangle {
		PathRectangle::from_map_size(self.map_size)
	}
	/// Get the tree
	pub fn get_tree(&self) -> &NodeTree {
		&self.tree
	}
	/// Get the speed data
	pub fn get_squares(&self) -> &SpeedModGrid {
		&self.squares
	}
	/// Leaf covering square `(x, z)`
	pub fn get_node_index(&self, x: u32, z: u32) -> NodeIndex {
		self.grid.get(x, z)
	}
	/// Leaf covering square `(x, z)`
	pub fn get_node(&self, x: u32, z: u32) -> &SpatialNode {
		self.tree.get_node(self.grid.get(x, z))
	}
	/// Number of leaves
	pub fn get_num_leaf_nodes(&self) -> usize {
		self.tree.get_num_leaves()
	}
	/// Leaves per square, how much tesselation collapsed the map
	pub fn get_node_ratio(&self) -> f32 {
		self.tree.get_num_leaves() as f32 / get_num_squares(self.map_size) as f32
	}
	/// Highest speed mod seen on the layer
	pub fn get_max_speed_mod(&self) -> f32 {
		self.max_speed_mod
	}
	/// Approximate heap usage in bytes
	pub fn get_memory_footprint(&self) -> usize {
		let squares = get_num_squares(self.map_size);
		self.tree.get_memory_footprint()
			+ squares * (2 * std::mem::size_of::<f32>() + 2 * std::mem::size_of::<i32>())
			+ squares * std::mem::size_of::<NodeIndex>()
			+ self.search_states.capacity() * std::mem::size_of::<NodeSearchState>()
	}
	/// Tree and search scratch space, borrowed together by a running search
	pub fn get_search_parts_mut(&mut self) -> (&NodeTree, &mut [NodeSearchState]) {
		(&self.tree, &mut self.search_states)
	}
	/// Search scratch space as left by the last search
	pub fn get_search_states(&self) -> &[NodeSearchState] {
		&self.search_states
	}
	/// Forget every search state, used when the generation counter wraps
	pub fn reset_search_states(&mut self) {
		self.search_states.fill(NodeSearchState::default());
	}
	/// Re-sample the speed of every square under `rect` for `move_def`.
	/// Squares within half a footprint of a structure are closed. Returns
	/// true if any square changed speed bin and the tree needs tesselating
	pub fn update(&mut self, rect: &PathRectangle, move_def: &MoveDef, terrain: &dyn TerrainProvider) -> bool {
		let map_rect = self.get_map_rect();
		let rect = rect.clipped(&map_rect);
		if rect.is_empty() {
			return false;
		}
		let (hx, hz) = move_def.get_footprint_half();
		let sample_rect = rect.expanded(hx as i32, hz as i32).clipped(&map_rect);
		let width = sample_rect.get_width() as usize;
		let height = sample_rect.get_height() as usize;
		// summed-area table of structures so each footprint check is constant time
		let mut structures = vec![0u32; (width + 1) * (height + 1)];
		let mut base_mods = vec![0.0f32; width * height];
		terrain.sample_rect(&sample_rect, &mut |x, z, square| {
			let lx = (x as i32 - sample_rect.get_x1()) as usize;
			let lz = (z as i32 - sample_rect.get_z1()) as usize;
			if square.blocking == SquareBlocking::Structure {
				structures[(lz + 1) * (width + 1) + lx + 1] = 1;
			}
			base_mods[lz * width + lx] = move_def.get_speed_mod(square);
		});
		for lz in 1..=height {
			for lx in 1..=width {
				let i = lz * (width + 1) + lx;
				structures[i] += structures[i - 1] + structures[i - width - 1] - structures[i - width - 2];
			}
		}
		let num_bins = self.tree.get_params().num_speed_mod_bins;
		let mut num_changed = 0;
		for (x, z) in rect.iter_squares() {
			let lx = (x - sample_rect.get_x1()) as usize;
			let lz = (z - sample_rect.get_z1()) as usize;
			let x1 = lx.saturating_sub(hx as usize);
			let z1 = lz.saturating_sub(hz as usize);
			let x2 = (lx + hx as usize + 1).min(width);
			let z2 = (lz + hz as usize + 1).min(height);
			let blocked = structures[z2 * (width + 1) + x2] + structures[z1 * (width + 1) + x1]
				- structures[z1 * (width + 1) + x2]
				- structures[z2 * (width + 1) + x1];
			let speed_mod = if blocked > 0 {
				MIN_SPEEDMOD_VALUE
			} else {
				base_mods[lz * width + lx]
			};
			self.max_speed_mod = self.max_speed_mod.max(speed_mod);
			if self.squares.set_square(x as u32, z as u32, speed_mod, num_bins) {
				num_changed += 1;
			}
		}
		num_changed > 0
	}
	/// Re-tesselate the nodes affected by `rect` and refresh the neighbour
	/// lists around them. Returns the area that was rebuilt
	pub fn tesselate_rect(&mut self, rect: &PathRectangle) -> Result<PathRectangle, QtpfsError> {
		let mut dirty = PathRectangle::default();
		let root = self.tree.get_root();
		self.tree
			.pre_tesselate(root, rect, &self.squares, &mut self.grid, &mut dirty)?;
		if self.search_states.len() < self.tree.get_arena_len() {
			self.search_states
				.resize(self.tree.get_arena_len(), NodeSearchState::default());
		}
		if !dirty.is_empty() {
			self.neighbor_generation = self.neighbor_generation.wrapping_add(1);
			let generation = self.neighbor_generation;
			self.exec_node_neighbor_cache_updates(&dirty.expanded(1, 1), generation);
		}
		Ok(dirty)
	}
	/// Sample and, if anything changed, re-tesselate `rect`. Returns the
	/// rectangle if the tree changed
	pub fn apply_update(
		&mut self,
		rect: &PathRectangle,
		move_def: &MoveDef,
		terrain: &dyn TerrainProvider,
	) -> Result<Option<PathRectangle>, QtpfsError> {
		if !self.update(rect, move_def, terrain) {
			return Ok(None);
		}
		self.tesselate_rect(rect)?;
		Ok(Some(*rect))
	}
	/// Rebuild the neighbour lists of every leaf touching `rect` that has not
	/// already been rebuilt for `generation`
	pub fn exec_node_neighbor_cache_updates(&mut self, rect: &PathRectangle, generation: u32) {
		let rect = rect.clipped(&self.get_map_rect());
		for z in rect.get_z1()..rect.get_z2() {
			let mut x = rect.get_x1();
			while x < rect.get_x2() {
				let index = self.grid.get(x as u32, z as u32);
				let node = self.tree.get_node(index);
				let next_x = node.get_xmax() as i32;
				if node.get_neighbor_generation() != Some(generation) {
					let neighbors = self.find_neighbors(index);
					self.tree.get_node_mut(index).set_neighbors(neighbors, generation);
				}
				x = next_x;
			}
		}
	}
	/// Walk the four edges of a leaf collecting the leaves on the other side
	fn find_neighbors(&self, index: NodeIndex) -> Vec<NodeIndex> {
		let node = self.tree.get_node(index);
		let mut neighbors = Vec::new();
		let mut walk_column = |x: u32| {
			let mut z = node.get_zmin();
			while z < node.get_zmax() {
				let n = self.grid.get(x, z);
				neighbors.push(n);
				z = self.tree.get_node(n).get_zmax();
			}
		};
		if node.get_xmin() > 0 {
			walk_column(node.get_xmin() - 1);
		}
		if node.get_xmax() < self.map_size.0 {
			walk_column(node.get_xmax());
		}
		let mut walk_row = |z: u32| {
			let mut x = node.get_xmin();
			while x < node.get_xmax() {
				let n = self.grid.get(x, z);
				neighbors.push(n);
				x = self.tree.get_node(n).get_xmax();
			}
		};
		if node.get_zmin() > 0 {
			walk_row(node.get_zmin() - 1);
		}
		if node.get_zmax() < self.map_size.1 {
			walk_row(node.get_zmax());
		}
		neighbors
	}
	/// Queue a changed area to be applied later
	pub fn queue_update(&mut self, rect: PathRectangle) {
		if !self.update_queue.contains(&rect) {
			self.update_queue.push_back(rect);
		}
	}
	/// Number of queued areas
	pub fn get_num_queued_updates(&self) -> usize {
		self.update_queue.len()
	}
	/// Apply a share of the queued areas, or all of them when `flush` is set.
	/// Returns every rectangle whose application changed the tree
	pub fn exec_queued_updates(
		&mut self,
		move_def: &MoveDef,
		terrain: &dyn TerrainProvider,
		fraction: f32,
		flush: bool,
	) -> Result<Vec<PathRectangle>, QtpfsError> {
		let count = if flush {
			self.update_queue.len()
		} else {
			((self.update_queue.len() as f32 * fraction).ceil() as usize).max(1)
		};
		let mut changed = Vec::new();
		for _ in 0..count {
			let Some(rect) = self.update_queue.pop_front() else {
				break;
			};
			if let Some(rect) = self.apply_update(&rect, move_def, terrain)? {
				changed.push(rect);
			}
		}
		Ok(changed)
	}
	/// Pre-order snapshot of the tree for the cache
	pub fn to_snapshot(&self) -> Vec<NodeSnapshot> {
		self.tree.to_snapshot()
	}
	/// Replace the tree with a cached one and rebuild every neighbour list
	pub fn restore_snapshot(&mut self, snapshot: &[NodeSnapshot]) -> Result<(), CacheError> {
		let result = self.tree.restore_snapshot(snapshot, &mut self.grid);
		self.search_states = vec![NodeSearchState::default(); self.tree.get_arena_len()];
		result?;
		self.neighbor_generation = self.neighbor_generation.wrapping_add(1);
		let generation = self.neighbor_generation;
		self.exec_node_neighbor_cache_updates(&self.get_map_rect(), generation);
		Ok(())
	}
	/// Build the tree of the whole map from scratch
	pub fn tesselate_map(&mut self, move_def: &MoveDef, terrain: &dyn TerrainProvider) -> Result<(), QtpfsError> {
		let map_rect = self.get_map_rect();
		self.update(&map_rect, move_def, terrain);
		self.tesselate_rect(&map_rect)?;
		Ok(())
	}
}

#[rustfmt::skip]
#[cfg(test)]
mod tests {
	use super::*;

	/// Layer over an open `size` map with the given structures
	fn layer_with(size: (u32, u32), structures: &[PathRectangle], move_def: &MoveDef) -> (NodeLayer, HeightMap) {
		let map = HeightMap::new(size.0, size.1);
		for s in structures {
			map.set_blocking(s, SquareBlocking::Structure);
		}
		let mut layer = NodeLayer::new(0, size, TesselationParams::default());
		layer.tesselate_map(move_def, &map).unwrap();
		(layer, map)
	}

	#[test]
	fn first_update_always_changes() {
		let md = MoveDef::new("tank", 0, MoveFamily::Tank);
		let map = HeightMap::new(16, 16);
		let mut layer = NodeLayer::new(0, (16, 16), TesselationParams::default());
		assert!(layer.update(&layer.get_map_rect(), &md, &map));
		assert!(!layer.update(&layer.get_map_rect(), &md, &map));
		assert_eq!(1.0, layer.get_max_speed_mod());
	}
	#[test]
	fn footprint_closes_surroundings() {
		let md = MoveDef::new("tank", 0, MoveFamily::Tank).with_footprint(4, 4);
		let (layer, _) = layer_with((32, 32), &[PathRectangle::new(10, 10, 11, 11)], &md);
		assert_eq!(0.0, layer.get_squares().get_speed_mod(8, 8));
		assert_eq!(0.0, layer.get_squares().get_speed_mod(12, 12));
		assert_eq!(1.0, layer.get_squares().get_speed_mod(13, 10));
		assert_eq!(1.0, layer.get_squares().get_speed_mod(7, 7));
	}
	#[test]
	fn neighbours_are_symmetric() {
		let md = MoveDef::new("tank", 0, MoveFamily::Tank);
		let (layer, _) = layer_with((64, 64), &[PathRectangle::new(20, 20, 24, 40)], &md);
		let tree = layer.get_tree();
		for leaf in tree.get_leaves() {
			let node = tree.get_node(leaf);
			assert!(!node.get_neighbors().is_empty());
			for n in node.get_neighbors() {
				assert!(tree.get_node(*n).get_neighbors().contains(&leaf));
				assert!(node.get_neighbor_side(tree.get_node(*n)).is_some());
			}
		}
	}
	#[test]
	fn neighbours_refreshed_after_change() {
		let md = MoveDef::new("tank", 0, MoveFamily::Tank);
		let (mut layer, map) = layer_with((64, 64), &[], &md);
		assert_eq!(1, layer.get_num_leaf_nodes());
		let block = PathRectangle::new(30, 30, 34, 34);
		map.set_blocking(&block, SquareBlocking::Structure);
		let changed = layer.apply_update(&block, &md, &map).unwrap();
		assert_eq!(Some(block), changed);
		assert!(layer.get_num_leaf_nodes() > 1);
		let tree = layer.get_tree();
		for leaf in tree.get_leaves() {
			for n in tree.get_node(leaf).get_neighbors() {
				assert!(tree.get_leaves().contains(n));
				assert!(tree.get_node(*n).get_neighbors().contains(&leaf));
			}
		}
	}
	#[test]
	fn unchanged_terrain_is_ignored() {
		let md = MoveDef::new("tank", 0, MoveFamily::Tank);
		let (mut layer, map) = layer_with((32, 32), &[], &md);
		let changed = layer.apply_update(&PathRectangle::new(0, 0, 8, 8), &md, &map).unwrap();
		assert_eq!(None, changed);
	}
	#[test]
	fn queued_updates_drain_in_fractions() {
		let md = MoveDef::new("tank", 0, MoveFamily::Tank);
		let (mut layer, map) = layer_with((64, 64), &[], &md);
		for i in 0..8 {
			let r = PathRectangle::new(i * 8, 0, i * 8 + 2, 2);
			map.set_blocking(&r, SquareBlocking::Structure);
			layer.queue_update(r);
		}
		// duplicates are coalesced
		layer.queue_update(PathRectangle::new(0, 0, 2, 2));
		assert_eq!(8, layer.get_num_queued_updates());
		let changed = layer.exec_queued_updates(&md, &map, 0.25, false).unwrap();
		assert_eq!(2, changed.len());
		assert_eq!(6, layer.get_num_queued_updates());
		let changed = layer.exec_queued_updates(&md, &map, 0.25, true).unwrap();
		assert_eq!(6, changed.len());
		assert_eq!(0, layer.get_num_queued_updates());
	}
	#[test]
	fn snapshot_round_trip_keeps_neighbours() {
		let md = MoveDef::new("tank", 0, MoveFamily::Tank);
		let (layer, map) = layer_with((64, 64), &[PathRectangle::new(3, 3, 9, 40)], &md);
		let mut restored = NodeLayer::new(0, (64, 64), TesselationParams::default());
		restored.update(&restored.get_map_rect(), &md, &map);
		restored.restore_snapshot(&layer.to_snapshot()).unwrap();
		assert_eq!(layer.get_tree().get_checksum(), restored.get_tree().get_checksum());
		let index = restored.get_node_index(50, 50);
		assert!(!restored.get_tree().get_node(index).get_neighbors().is_empty());
	}
}
