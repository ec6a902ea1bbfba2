//! Request paths across a map with scattered structures and follow them
//!

use std::sync::Arc;

use bevy::prelude::*;
use bevy_qtpfs_plugin::prelude::*;

/// A 256x256 map with a few structures to route around
fn scattered_map() -> Arc<HeightMap> {
	let map = Arc::new(HeightMap::new(256, 256));
	for rect in [
		PathRectangle::new(40, 40, 60, 120),
		PathRectangle::new(100, 0, 108, 200),
		PathRectangle::new(150, 60, 230, 68),
		PathRectangle::new(180, 150, 190, 256),
	] {
		map.set_blocking(&rect, SquareBlocking::Structure);
	}
	map
}

/// Loaded manager with a single tank class
fn manager(map: Arc<HeightMap>) -> (PathManager, MoveDef) {
	let tank = MoveDef::new("tank", 0, MoveFamily::Tank);
	let mut manager = PathManager::new(QtpfsConfig::default(), vec![tank.clone()], map).unwrap();
	manager.load(None).unwrap();
	(manager, tank)
}

#[test]
fn path_reaches_target() {
	let (mut manager, tank) = manager(scattered_map());
	let source = Vec3::new(0.0, 0.0, 0.0);
	let target = Vec3::new(2000.0, 0.0, 2000.0);
	let id = manager.request_path(None, &tank, source, target, 8.0, true);
	assert!(id.is_some());
	manager.update().unwrap();
	let points = manager.get_path_way_points(id).points;
	assert!(points.len() > 2);
	assert!(points.last().unwrap().distance(target) <= SQUARE_SIZE);
	assert!(points.first().unwrap().distance(source) <= SQUARE_SIZE);
}

#[test]
fn following_the_path_visits_every_point() {
	let (mut manager, tank) = manager(scattered_map());
	let source = Vec3::new(16.0, 0.0, 1800.0);
	let target = Vec3::new(1900.0, 0.0, 100.0);
	let id = manager.request_path(None, &tank, source, target, 8.0, true);
	manager.update().unwrap();
	let points = manager.get_path_way_points(id).points;
	let mut position = points[0];
	for expected in points.iter().skip(1) {
		let next = manager.next_way_point(None, id, 0, position, 0.0, true);
		assert_eq!(*expected, next);
		position = next;
	}
	// the end stays the end
	let last = *points.last().unwrap();
	assert_eq!(last, manager.next_way_point(None, id, 0, last, 0.0, true));
}

#[test]
fn points_avoid_structures() {
	let map = scattered_map();
	let (mut manager, tank) = manager(map.clone());
	let id = manager.request_path(None, &tank, Vec3::new(8.0, 0.0, 8.0), Vec3::new(2000.0, 0.0, 1000.0), 8.0, true);
	manager.update().unwrap();
	let points = manager.get_path_way_points(id).points;
	for p in points.iter() {
		// every waypoint lies in or on the edge of an open leaf
		let touches_open = [(-1.0, -1.0), (-1.0, 1.0), (1.0, -1.0), (1.0, 1.0)].iter().any(|(dx, dz)| {
			let (x, z) = world_to_square(*p + Vec3::new(*dx, 0.0, *dz), (256, 256));
			map.get_square(x, z).blocking == SquareBlocking::Open
		});
		assert!(touches_open, "{:?} is inside a structure", p);
	}
}

#[test]
fn identical_managers_find_identical_paths() {
	let run = || {
		let (mut manager, tank) = manager(scattered_map());
		let ids: Vec<PathId> = (0..10)
			.map(|i| {
				let source = Vec3::new(20.0 + 150.0 * i as f32, 0.0, 30.0);
				let target = Vec3::new(1990.0 - 100.0 * i as f32, 0.0, 1000.0);
				manager.request_path(None, &tank, source, target, 8.0, true)
			})
			.collect();
		manager.update().unwrap();
		let paths: Vec<Vec<Vec3>> = ids.iter().map(|id| manager.get_path_way_points(*id).points).collect();
		(manager.get_checksum(), ids, paths)
	};
	assert_eq!(run(), run());
}

#[test]
fn unreachable_target_is_deleted() {
	let map = Arc::new(HeightMap::new(128, 128));
	// a closed ring around squares 50..70
	for rect in [
		PathRectangle::new(48, 48, 72, 50),
		PathRectangle::new(48, 70, 72, 72),
		PathRectangle::new(48, 48, 50, 72),
		PathRectangle::new(70, 48, 72, 72),
	] {
		map.set_blocking(&rect, SquareBlocking::Structure);
	}
	let (mut manager, tank) = manager(map);
	let id = manager.request_path(None, &tank, Vec3::new(40.0, 0.0, 40.0), Vec3::new(480.0, 0.0, 480.0), 8.0, true);
	manager.update().unwrap();
	assert_eq!(NO_WAYPOINT, manager.next_way_point(None, id, 0, Vec3::new(40.0, 0.0, 40.0), 0.0, true));
	assert_eq!(0, manager.get_num_paths());
}

#[test]
fn partial_search_gets_close() {
	let map = Arc::new(HeightMap::new(128, 128));
	for rect in [
		PathRectangle::new(48, 48, 72, 50),
		PathRectangle::new(48, 70, 72, 72),
		PathRectangle::new(48, 48, 50, 72),
		PathRectangle::new(70, 48, 72, 72),
	] {
		map.set_blocking(&rect, SquareBlocking::Structure);
	}
	let tank = MoveDef::new("tank", 0, MoveFamily::Tank);
	let config = QtpfsConfig {
		allow_partial_searches: true,
		..Default::default()
	};
	let mut manager = PathManager::new(config, vec![tank.clone()], map).unwrap();
	manager.load(None).unwrap();
	let source = Vec3::new(40.0, 0.0, 40.0);
	let target = Vec3::new(480.0, 0.0, 480.0);
	let id = manager.request_path(None, &tank, source, target, 8.0, true);
	manager.update().unwrap();
	let points = manager.get_path_way_points(id).points;
	let end = *points.last().unwrap();
	assert!(end.distance(target) < source.distance(target));
}

#[test]
fn flat_map_path_closes_on_target() {
	let (mut manager, tank) = manager(Arc::new(HeightMap::new(256, 256)));
	let target = Vec3::new(2000.0, 0.0, 2000.0);
	let radius = 8.0;
	let id = manager.request_path(None, &tank, Vec3::ZERO, target, radius, true);
	assert!(id.is_some());
	manager.update().unwrap();
	let points = manager.get_path_way_points(id).points;
	assert!(!points.is_empty());
	assert!(points.last().unwrap().distance(target) <= radius);

	let mut position = Vec3::ZERO;
	let mut remaining = position.distance(target);
	for _ in 0..points.len() {
		if remaining <= radius {
			break;
		}
		let next = manager.next_way_point(None, id, 0, position, radius, true);
		let next_remaining = next.distance(target);
		assert!(next_remaining < remaining, "{:?} is no closer than {:?}", next, position);
		position = next;
		remaining = next_remaining;
	}
	assert!(remaining <= radius);
}
