//! Logic for announcing changes to the terrain, which re-tesselates the
//! affected area of every node layer and re-searches the paths crossing it
//!

use crate::prelude::*;
use bevy::prelude::*;

/// Squares `x1..x2`, `z1..z2` of the terrain changed
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventTerrainChange {
	/// Changed area in squares
	rect: PathRectangle,
	/// What changed
	kind: TerrainChangeKind,
}

impl EventTerrainChange {
	/// Create a new instance of [EventTerrainChange]
	pub fn new(x1: i32, z1: i32, x2: i32, z2: i32, kind: TerrainChangeKind) -> Self {
		EventTerrainChange {
			rect: PathRectangle::new(x1, z1, x2, z2),
			kind,
		}
	}
	/// Get the changed area
	pub fn get_rect(&self) -> PathRectangle {
		self.rect
	}
	/// Get the kind of change
	pub fn get_kind(&self) -> TerrainChangeKind {
		self.kind
	}
}

/// Read [EventTerrainChange] and hand each distinct change to the [PathManager]
#[cfg(not(tarpaulin_include))]
pub fn process_terrain_changes(mut events: EventReader<EventTerrainChange>, mut manager: ResMut<PathManager>) {
	// several structures may report the same footprint in one tick
	let mut coalesced: Vec<EventTerrainChange> = Vec::new();
	for event in events.read() {
		if !coalesced.contains(event) {
			coalesced.push(*event);
		}
	}
	for change in coalesced {
		let r = change.get_rect();
		if let Err(e) = manager.terrain_change(r.get_x1(), r.get_z1(), r.get_x2(), r.get_z2(), change.get_kind()) {
			panic!("Pathfinder failed to apply a terrain change: {}", e);
		}
	}
}
