//! This is a plugin for Bevy game engine to build per movement class quad-trees
//! over the terrain and to find and maintain paths through them for large
//! numbers of agents
//!

pub mod plugin;
pub mod qtpfs;

pub mod prelude;
