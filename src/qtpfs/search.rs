//! Best-first search over the leaves of a [NodeLayer].
//!
//! A search moves from leaf to leaf through the midpoints of their shared
//! edges. The cost of a step is the distance travelled inside a leaf
//! multiplied by the leaf's move cost, the heuristic is the straight line
//! distance to the target scaled by the cheapest possible move cost so it
//! never overestimates.
//!

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::prelude::*;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Flavour of search
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Reflect, Serialize, Deserialize)]
pub enum SearchType {
	/// Heuristic guided
	#[default]
	AStar,
	/// Uniform cost, explores evenly in every direction
	Dijkstra,
}

/// Entry of the open set, ordered so the heap pops the lowest `f_cost` first
#[derive(Clone, Copy, Debug, PartialEq)]
struct OpenNode {
	/// Estimated total cost through the node when it was pushed
	f_cost: f32,
	/// The node
	node: NodeIndex,
}

impl Eq for OpenNode {}

impl Ord for OpenNode {
	fn cmp(&self, other: &Self) -> Ordering {
		other
			.f_cost
			.total_cmp(&self.f_cost)
			.then_with(|| other.node.cmp(&self.node))
	}
}

impl PartialOrd for OpenNode {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

/// Identifies searches whose results may be shared within one update
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SharedPathKey {
	/// Layer searched
	pub layer: usize,
	/// Leaf holding the source
	pub src_node: NodeIndex,
	/// Leaf holding the target
	pub tgt_node: NodeIndex,
	/// Area the search may expand into
	pub bounds: PathRectangle,
}

/// One queued or running search for a path
#[derive(Clone, Debug)]
pub struct PathSearch {
	/// Path the search resolves
	path_id: PathId,
	/// Team used for scheduling
	team: usize,
	/// Flavour of search
	search_type: SearchType,
	/// Produce a path to the closest reachable node when the target cannot be reached
	allow_partial: bool,
	/// Start, clamped to the map
	src_point: Vec3,
	/// End, clamped to the map
	tgt_point: Vec3,
	/// Area the search may expand into
	bounds: PathRectangle,
	/// Leaf holding the source
	src_node: NodeIndex,
	/// Leaf holding the target
	tgt_node: NodeIndex,
	/// Expanded node closest to the target
	min_node: NodeIndex,
	/// Scales distances into a lower bound of cost
	h_cost_mult: f32,
	/// The target was reached
	have_full_path: bool,
	/// The target was not reached but a partial path exists
	have_part_path: bool,
}

impl PathSearch {
	/// Create a new instance of [PathSearch]
	pub fn new(path_id: PathId, team: usize, search_type: SearchType, allow_partial: bool) -> Self {
		PathSearch {
			path_id,
			team,
			search_type,
			allow_partial,
			src_point: Vec3::ZERO,
			tgt_point: Vec3::ZERO,
			bounds: PathRectangle::default(),
			src_node: NodeIndex::default(),
			tgt_node: NodeIndex::default(),
			min_node: NodeIndex::default(),
			h_cost_mult: 1.0,
			have_full_path: false,
			have_part_path: false,
		}
	}
	/// Get the path being searched for
	pub fn get_path_id(&self) -> PathId {
		self.path_id
	}
	/// Get the team
	pub fn get_team(&self) -> usize {
		self.team
	}
	/// Leaf holding the source
	pub fn get_src_node(&self) -> NodeIndex {
		self.src_node
	}
	/// Leaf holding the target
	pub fn get_tgt_node(&self) -> NodeIndex {
		self.tgt_node
	}
	/// True if the last execution reached the target
	pub fn have_full_path(&self) -> bool {
		self.have_full_path
	}
	/// True if the last execution settled for the closest reachable node
	pub fn have_part_path(&self) -> bool {
		self.have_part_path
	}
	/// Clamp the endpoints into the map and find the leaves holding them
	pub fn initialize(&mut self, layer: &NodeLayer, source: Vec3, target: Vec3, bounds: PathRectangle) {
		let map_size = layer.get_map_size();
		self.src_point = clamp_in_bounds(source, map_size);
		self.tgt_point = clamp_in_bounds(target, map_size);
		self.bounds = bounds;
		let (sx, sz) = world_to_square(self.src_point, map_size);
		let (tx, tz) = world_to_square(self.tgt_point, map_size);
		self.src_node = layer.get_node_index(sx, sz);
		self.tgt_node = layer.get_node_index(tx, tz);
		self.min_node = self.src_node;
		let max_speed_mod = layer.get_max_speed_mod();
		self.h_cost_mult = match self.search_type {
			SearchType::AStar if max_speed_mod > 0.0 => 1.0 / max_speed_mod,
			SearchType::AStar => 1.0,
			SearchType::Dijkstra => 0.0,
		};
		self.have_full_path = false;
		self.have_part_path = false;
	}
	/// Key under which the result may be shared with identical requests
	pub fn get_shared_key(&self, layer: usize) -> SharedPathKey {
		SharedPathKey {
			layer,
			src_node: self.src_node,
			tgt_node: self.tgt_node,
			bounds: self.bounds,
		}
	}
	/// Hash of the endpoints `src + tgt * N + layer * N²` where `N` is the
	/// number of squares on the map
	pub fn get_hash(&self, layer: &NodeLayer) -> u64 {
		let (x, z) = layer.get_map_size();
		let n = x as u64 * z as u64;
		let tree = layer.get_tree();
		let src = tree.get_node(self.src_node).get_number();
		let tgt = tree.get_node(self.tgt_node).get_number();
		src.wrapping_add(tgt.wrapping_mul(n))
			.wrapping_add((layer.get_layer_number() as u64).wrapping_mul(n.wrapping_mul(n)))
	}
	/// Run the search. `generation` must exceed that of every earlier search
	/// on the layer by at least [NODE_STATE_OFFSET]. Returns false if the
	/// target cannot be reached (and no partial path is allowed)
	pub fn execute(&mut self, layer: &mut NodeLayer, generation: u32) -> bool {
		let open_state = generation;
		let closed_state = generation + 1;
		let tgt_point = Vec2::new(self.tgt_point.x, self.tgt_point.z);
		let src_point = Vec2::new(self.src_point.x, self.src_point.z);
		let (tree, states) = layer.get_search_parts_mut();

		let src_h = src_point.distance(tgt_point) * self.h_cost_mult;
		states[self.src_node.get()] = NodeSearchState {
			state: open_state,
			prev: None,
			g_cost: 0.0,
			h_cost: src_h,
			f_cost: src_h,
			point: src_point,
		};
		self.min_node = self.src_node;
		if self.src_node == self.tgt_node {
			self.have_full_path = true;
			return true;
		}
		let mut min_distance = src_point.distance(tgt_point);
		let mut open = BinaryHeap::new();
		open.push(OpenNode {
			f_cost: src_h,
			node: self.src_node,
		});

		while let Some(entry) = open.pop() {
			let current = entry.node;
			let state = states[current.get()];
			if state.state != open_state || state.f_cost.to_bits() != entry.f_cost.to_bits() {
				continue;
			}
			states[current.get()].state = closed_state;
			if current == self.tgt_node {
				self.have_full_path = true;
				break;
			}
			let distance = state.point.distance(tgt_point);
			if distance < min_distance {
				min_distance = distance;
				self.min_node = current;
			}
			let node = tree.get_node(current);
			// units standing in an impassable leaf must be able to leave it
			let move_cost = if current == self.src_node && node.all_squares_impassable() {
				0.0
			} else {
				node.get_move_cost()
			};
			for next in node.get_neighbors().iter().copied() {
				let next_node = tree.get_node(next);
				if next_node.all_squares_impassable() {
					continue;
				}
				let mid = next_node.get_world_midpoint();
				if !self
					.bounds
					.contains_square((mid.x / SQUARE_SIZE) as i32, (mid.y / SQUARE_SIZE) as i32)
				{
					continue;
				}
				let Some(transition) = node.get_edge_transition_point(next_node) else {
					continue;
				};
				let is_target = next == self.tgt_node;
				let h_distance = transition.distance(tgt_point);
				let mut g_cost = state.g_cost + move_cost * state.point.distance(transition);
				let h_cost = if is_target {
					g_cost += next_node.get_move_cost() * h_distance;
					0.0
				} else {
					h_distance * self.h_cost_mult
				};
				let next_state = &mut states[next.get()];
				if next_state.state >= open_state && g_cost >= next_state.g_cost {
					continue;
				}
				*next_state = NodeSearchState {
					state: open_state,
					prev: Some(current),
					g_cost,
					h_cost,
					f_cost: g_cost + h_cost,
					point: transition,
				};
				open.push(OpenNode {
					f_cost: g_cost + h_cost,
					node: next,
				});
			}
		}
		if !self.have_full_path && self.allow_partial && self.min_node != self.src_node {
			self.have_part_path = true;
		}
		trace!(
			"Search for path {:?} on layer {}: full {}, partial {}",
			self.path_id.to_bits(),
			layer.get_layer_number(),
			self.have_full_path,
			self.have_part_path
		);
		self.have_full_path || self.have_part_path
	}
	/// Trace the node chain found by [PathSearch::execute] into waypoints on
	/// `path`, smoothing them for up to `smoothing_iterations` passes
	pub fn finalize(&self, layer: &NodeLayer, path: &mut QtpfsPath, smoothing_iterations: u32) {
		let tree = layer.get_tree();
		let states = layer.get_search_states();
		let end_node = if self.have_full_path {
			self.tgt_node
		} else {
			self.min_node
		};
		let mut nodes = Vec::new();
		let mut current = Some(end_node);
		while let Some(index) = current {
			nodes.push(index);
			if index == self.src_node || nodes.len() > tree.get_arena_len() {
				break;
			}
			current = states[index.get()].prev;
		}
		nodes.reverse();

		let end_point = if self.have_full_path {
			self.tgt_point
		} else {
			let mid = tree.get_node(end_node).get_world_midpoint();
			Vec3::new(mid.x, 0.0, mid.y)
		};
		let mut points = Vec::with_capacity(nodes.len() + 1);
		points.push(self.src_point);
		for index in nodes.iter().skip(1) {
			let p = states[index.get()].point;
			points.push(Vec3::new(p.x, 0.0, p.y));
		}
		points.push(end_point);
		if smoothing_iterations > 0 {
			smooth_points(tree, &nodes, &mut points, smoothing_iterations);
		}
		let last = points.len() - 1;
		let mut deduped: Vec<Vec3> = Vec::with_capacity(points.len());
		for (i, p) in points.into_iter().enumerate() {
			match deduped.last() {
				Some(prev) if i != last && prev.distance_squared(p) < WAYPOINT_EPSILON_SQ => {}
				_ => deduped.push(p),
			}
		}
		path.set_points(deduped);
		path.set_hash(self.get_hash(layer));
	}
	/// Reuse the points of `source` (found by an identical search earlier in
	/// the update) for `path`. Returns false if the targets are too far apart
	/// for the points to fit
	pub fn shared_finalize(&self, source: &QtpfsPath, path: &mut QtpfsPath) -> bool {
		if source.get_num_points() < 2 {
			return false;
		}
		let source_target = source.get_point(source.get_num_points() - 1);
		if source_target.distance(self.tgt_point) > SQUARE_SIZE {
			return false;
		}
		let mut points = source.get_points().to_vec();
		let last = points.len() - 1;
		points[0] = self.src_point;
		points[last] = self.tgt_point;
		path.set_points(points);
		path.set_hash(source.get_hash());
		true
	}
}

/// Slide every intermediate waypoint along the edge it crosses towards the
/// straight line joining its neighbours. `points[i]` lies on the edge between
/// `nodes[i - 1]` and `nodes[i]`
fn smooth_points(tree: &NodeTree, nodes: &[NodeIndex], points: &mut [Vec3], iterations: u32) {
	for _ in 0..iterations {
		let mut moved = 0.0;
		for i in 1..nodes.len() {
			let Some((a, b)) = tree
				.get_node(nodes[i - 1])
				.get_shared_edge(tree.get_node(nodes[i]))
			else {
				continue;
			};
			let p0 = Vec2::new(points[i - 1].x, points[i - 1].z);
			let p2 = Vec2::new(points[i + 1].x, points[i + 1].z);
			let smoothed = if a.x == b.x {
				let z = if (p2.x - p0.x).abs() > f32::EPSILON {
					p0.y + (a.x - p0.x) / (p2.x - p0.x) * (p2.y - p0.y)
				} else {
					(p0.y + p2.y) * 0.5
				};
				Vec2::new(a.x, z.clamp(a.y.min(b.y), a.y.max(b.y)))
			} else {
				let x = if (p2.y - p0.y).abs() > f32::EPSILON {
					p0.x + (a.y - p0.y) / (p2.y - p0.y) * (p2.x - p0.x)
				} else {
					(p0.x + p2.x) * 0.5
				};
				Vec2::new(x.clamp(a.x.min(b.x), a.x.max(b.x)), a.y)
			};
			let current = Vec2::new(points[i].x, points[i].z);
			moved += current.distance(smoothed);
			points[i] = Vec3::new(smoothed.x, points[i].y, smoothed.y);
		}
		if moved < 0.05 {
			break;
		}
	}
}
