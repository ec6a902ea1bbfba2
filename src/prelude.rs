//! `use bevy_qtpfs_plugin::prelude::*;` to import common structures and methods
//!

#[doc(hidden)]
pub use crate::qtpfs::{
	config::*,
	manager::{persistence::*, state::*, strategy::*, *},
	nodes::{node_layer::*, node_tree::*, *},
	path::{path_cache::*, *},
	rectangle::*,
	search::*,
	terrain::*,
	utilities::*,
	*,
};

#[doc(hidden)]
pub use crate::plugin::{path_layer::*, terrain_layer::*, *};
