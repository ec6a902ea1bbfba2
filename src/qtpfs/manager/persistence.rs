//! On-disk cache of tesselated trees. Tesselating a large map for many
//! movement classes is slow, so the shape of every tree is written out once
//! and read back on later runs with the same map and game content.
//!
//! Layout:
//!
//! ```text
//! <cache_dir>/qtpfs/<version>/<map checksum>-<game checksum>/
//!     tree00-<movedef name>.ron
//!     tree01-<movedef name>.ron
//!     ...
//!     ready
//! ```
//!
//! The `ready` marker is only written once every layer is on disk so a
//! directory being filled by another instance is never read half-written
//!

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

/// Version of the cache format, part of the directory name
pub const QTPFS_CACHE_VERSION: u32 = 0x0001;
/// Directory created under the configured cache directory
pub const QTPFS_CACHE_DIR_NAME: &str = "qtpfs";
/// Marker file written once every layer has been cached
pub const QTPFS_READY_MARKER: &str = "ready";

/// Problems reading or writing the tree cache. None of these are fatal, the
/// trees are tesselated from scratch instead
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
	/// Filesystem failure
	#[error("tree cache io error")]
	Io(#[from] std::io::Error),
	/// A cache file could not be parsed
	#[error("tree cache file is malformed")]
	Decode(#[from] ron::error::SpannedError),
	/// A tree could not be encoded
	#[error("failed to encode tree")]
	Encode(#[from] ron::Error),
	/// A cache file does not describe the current map or tree
	#[error("tree cache does not match: {0}")]
	Mismatch(String),
}

/// Truncated checksums of the map and game content a cache was built from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContentChecksums {
	/// Checksum of the map
	map: u32,
	/// Checksum of the game data
	game: u32,
}

impl ContentChecksums {
	/// Create a new instance of [ContentChecksums] from known checksums
	pub fn new(map: u32, game: u32) -> Self {
		ContentChecksums { map, game }
	}
	/// Derive checksums by hashing the raw map and game content
	pub fn from_content(map_data: &[u8], game_data: &[u8]) -> Self {
		ContentChecksums {
			map: truncated_sha256(map_data),
			game: truncated_sha256(game_data),
		}
	}
	/// Get the map checksum
	pub fn get_map(&self) -> u32 {
		self.map
	}
	/// Get the game checksum
	pub fn get_game(&self) -> u32 {
		self.game
	}
	/// Both checksums folded together
	pub fn get_combined(&self) -> u32 {
		self.map ^ self.game
	}
}

/// First four bytes of the SHA-256 digest of `data`
fn truncated_sha256(data: &[u8]) -> u32 {
	let digest = Sha256::digest(data);
	u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Contents of one cache file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
	/// Format version
	pub version: u32,
	/// Layer the tree belongs to
	pub layer_number: usize,
	/// Movement class of the layer
	pub move_def_name: String,
	/// Size of the map in squares
	pub map_size: (u32, u32),
	/// Checksum of the tree when it was written
	pub checksum: u64,
	/// Pre-order nodes
	pub nodes: Vec<NodeSnapshot>,
}

impl TreeSnapshot {
	/// Capture the tree of a layer
	pub fn from_layer(layer: &NodeLayer, move_def: &MoveDef) -> Self {
		TreeSnapshot {
			version: QTPFS_CACHE_VERSION,
			layer_number: layer.get_layer_number(),
			move_def_name: move_def.get_name().to_string(),
			map_size: layer.get_map_size(),
			checksum: layer.get_tree().get_checksum(),
			nodes: layer.to_snapshot(),
		}
	}
}

/// Directory of cached trees for one map and game
#[derive(Clone, Debug)]
pub struct TreeCache {
	/// Directory holding the layer files
	dir: PathBuf,
}

impl TreeCache {
	/// Create a new instance of [TreeCache] under `base_dir`
	pub fn new(base_dir: &Path, checksums: ContentChecksums) -> Self {
		let dir = base_dir
			.join(QTPFS_CACHE_DIR_NAME)
			.join(format!("{:04x}", QTPFS_CACHE_VERSION))
			.join(format!("{:08x}-{:08x}", checksums.get_map(), checksums.get_game()));
		TreeCache { dir }
	}
	/// Get the directory
	pub fn get_dir(&self) -> &Path {
		&self.dir
	}
	/// True once every layer has been written
	pub fn is_ready(&self) -> bool {
		self.dir.join(QTPFS_READY_MARKER).is_file()
	}
	/// File caching the tree of a layer
	pub fn get_layer_file(&self, layer_number: usize, move_def: &MoveDef) -> PathBuf {
		let name: String = move_def
			.get_name()
			.chars()
			.map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
			.collect();
		self.dir.join(format!("tree{:02x}-{}.ron", layer_number, name))
	}
	/// Read the tree of a layer, checking it was made for this layer and map
	pub fn read_layer(
		&self,
		layer_number: usize,
		move_def: &MoveDef,
		map_size: (u32, u32),
	) -> Result<TreeSnapshot, CacheError> {
		let file = File::open(self.get_layer_file(layer_number, move_def))?;
		let snapshot: TreeSnapshot = ron::de::from_reader(file)?;
		if snapshot.version != QTPFS_CACHE_VERSION {
			return Err(CacheError::Mismatch(format!("version {}", snapshot.version)));
		}
		if snapshot.layer_number != layer_number || snapshot.move_def_name != move_def.get_name() {
			return Err(CacheError::Mismatch(format!(
				"layer {} ({}) found in file of layer {}",
				snapshot.layer_number, snapshot.move_def_name, layer_number
			)));
		}
		if snapshot.map_size != map_size {
			return Err(CacheError::Mismatch(format!(
				"map size {:?} instead of {:?}",
				snapshot.map_size, map_size
			)));
		}
		Ok(snapshot)
	}
	/// Write the tree of a layer. The file is written under a unique
	/// temporary name in the cache directory and moved into place
	pub fn write_layer(&self, snapshot: &TreeSnapshot, move_def: &MoveDef) -> Result<(), CacheError> {
		std::fs::create_dir_all(&self.dir)?;
		let path = self.get_layer_file(snapshot.layer_number, move_def);
		let encoded = ron::ser::to_string(snapshot)?;
		let mut temp = NamedTempFile::new_in(&self.dir)?;
		temp.write_all(encoded.as_bytes())?;
		temp.as_file().sync_all()?;
		temp.persist(&path).map_err(|e| e.error)?;
		Ok(())
	}
	/// Flag the directory as complete
	pub fn mark_ready(&self) -> Result<(), CacheError> {
		std::fs::create_dir_all(&self.dir)?;
		File::create(self.dir.join(QTPFS_READY_MARKER))?;
		Ok(())
	}
}
