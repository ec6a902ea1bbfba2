//! Logic driving the [PathManager] once per frame. The update is started in
//! [Update] and collected in [Last] so with a background worker the searches
//! run alongside the rest of the frame
//!

use crate::prelude::*;
use bevy::prelude::*;

/// The path `id` is no longer needed
#[derive(Event, Debug, Clone, Copy)]
pub struct EventDeletePath(pub PathId);

/// Read [EventDeletePath] and release the paths
#[cfg(not(tarpaulin_include))]
pub fn process_path_deletions(mut events: EventReader<EventDeletePath>, mut manager: ResMut<PathManager>) {
	for EventDeletePath(id) in events.read() {
		if !manager.delete_path(*id) {
			debug!("Deleting unknown path {:?}", id);
		}
	}
}

/// Start the update of the frame
#[cfg(not(tarpaulin_include))]
pub fn dispatch_path_updates(mut manager: ResMut<PathManager>) {
	if let Err(e) = manager.begin_update() {
		panic!("Pathfinder update failed to start: {}", e);
	}
}

/// Wait for the update of the frame
#[cfg(not(tarpaulin_include))]
pub fn collect_path_updates(mut manager: ResMut<PathManager>) {
	if let Err(e) = manager.finish_update() {
		panic!("Pathfinder update failed: {}", e);
	}
}
