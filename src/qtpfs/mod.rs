//! Quad-tree pathfinding is a means of handling pathfinding for a large number
//! of actors across a terrain that changes during play.
//!
//! For every movement class (a [crate::prelude::MoveDef]) the map is covered
//! by a quad-tree whose leaves are rectangles of terrain squares that are
//! roughly homogeneous in how fast that class can cross them. Large open
//! areas collapse into a handful of big leaves while cluttered areas are
//! subdivided down to a configured minimum size. Searches run over the leaves
//! rather than over individual squares.
//!
//! ```text
//!  _______________________________
//! |               |       |_|_|___|
//! |               |       |_|_|___|
//! |               |_______|___|___|
//! |               |       |   |   |
//! |_______________|_______|___|___|
//! |               |               |
//! |               |               |
//! |               |               |
//! |               |               |
//! |_______________|_______________|
//! ```
//!
//! Definitions:
//!
//! * Square - the smallest unit of terrain, `SQUARE_SIZE` world units wide
//! * Speed mod - how fast a movement class crosses a square, `0.0` is impassable
//! * Speed bin - a quantised speed mod, squares in one leaf share a bin
//! * Node layer - the quad-tree and per-square data for one movement class
//! * Tesselation - (re)building the leaves of a tree so each is homogeneous
//! * Edge transition point - the midpoint of the edge shared by two adjacent leaves,
//! paths are formed from a chain of these
//! * Temp path - a placeholder handed out while a search is queued
//! * Live path - the result of a successful search
//! * Dead path - a live path invalidated by a terrain change, it is searched
//! again under the same ID
//!

pub mod config;
pub mod manager;
pub mod nodes;
pub mod path;
pub mod rectangle;
pub mod search;
pub mod terrain;
pub mod utilities;

/// Unrecoverable failures of the pathfinding system
#[derive(Debug, thiserror::Error)]
pub enum QtpfsError {
	/// The node arena of a layer could not grow while splitting a node
	#[error("failed to allocate children for node {node_number} of layer {layer}")]
	NodeAllocation {
		/// Layer (movement class) being tesselated
		layer: usize,
		/// Number of the node that was being split
		node_number: u64,
	},
	/// The background update thread could not be started
	#[error("failed to spawn the background update worker")]
	WorkerSpawn(#[source] std::io::Error),
	/// The background update thread went away while it held the simulation state
	#[error("the background update worker stopped unexpectedly")]
	WorkerDisconnected,
	/// A configuration file could not be read
	#[error("failed to read configuration file")]
	ConfigIo(#[from] std::io::Error),
	/// A configuration file could not be parsed
	#[error("failed to parse configuration file")]
	ConfigParse(#[from] ron::error::SpannedError),
}
