//! Defines the Bevy [Plugin] for quad-tree pathfinding. The [PathManager]
//! resource is built by the app (it needs the movement classes and the
//! terrain) and inserted once [PathManager::load] has run, the systems here
//! idle until it exists
//!

use crate::prelude::*;
use bevy::prelude::*;

pub mod path_layer;
pub mod terrain_layer;

/// Ordering of the pathfinding systems within [Update]
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum OrderingSet {
	/// Terrain changes and deletions land on the layers
	Terrain,
	/// The update is started, it is collected in [Last]
	Dispatch,
}

/// Adds the pathfinding systems and events
pub struct QtpfsPlugin;

impl Plugin for QtpfsPlugin {
	#[cfg(not(tarpaulin_include))]
	fn build(&self, app: &mut App) {
		app.register_type::<PathId>()
			.register_type::<PathOwner>()
			.register_type::<PathRectangle>()
			.register_type::<TerrainChangeKind>()
			.register_type::<UpdateStrategy>()
			.add_event::<terrain_layer::EventTerrainChange>()
			.add_event::<path_layer::EventDeletePath>()
			.configure_sets(Update, (OrderingSet::Terrain, OrderingSet::Dispatch).chain())
			.add_systems(
				Update,
				(
					(
						terrain_layer::process_terrain_changes,
						path_layer::process_path_deletions,
					)
						.chain()
						.in_set(OrderingSet::Terrain),
					path_layer::dispatch_path_updates.in_set(OrderingSet::Dispatch),
				)
					.run_if(resource_exists::<PathManager>),
			)
			.add_systems(
				Last,
				path_layer::collect_path_updates.run_if(resource_exists::<PathManager>),
			);
	}
}
