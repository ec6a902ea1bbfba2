//! Measure searching a path from one corner of a 512x512 map to the other
//!

use std::sync::Arc;

use bevy::prelude::*;
use bevy_qtpfs_plugin::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// A loaded manager over a map of staggered walls
fn prepare_manager() -> (PathManager, MoveDef) {
	let size = 512;
	let map = Arc::new(HeightMap::new(size, size));
	for (n, x) in (32..size as i32).step_by(64).enumerate() {
		// alternate the gap between top and bottom
		let (z1, z2) = if n % 2 == 0 { (0, 448) } else { (64, 512) };
		map.set_blocking(&PathRectangle::new(x, z1, x + 8, z2), SquareBlocking::Structure);
	}
	let tank = MoveDef::new("tank", 0, MoveFamily::Tank);
	let config = QtpfsConfig {
		share_paths: false,
		..Default::default()
	};
	let mut manager = PathManager::new(config, vec![tank.clone()], map).unwrap();
	manager.load(None).unwrap();
	(manager, tank)
}

/// Request, search and release a path
fn calc(manager: &mut PathManager, tank: &MoveDef) {
	let id = manager.request_path(None, tank, Vec3::new(8.0, 0.0, 8.0), Vec3::new(4000.0, 0.0, 4000.0), 8.0, true);
	manager.update().unwrap();
	manager.delete_path(id);
}

pub fn criterion_benchmark(c: &mut Criterion) {
	let mut group = c.benchmark_group("algorithm_use");
	group.significance_level(0.05).sample_size(100);
	let (mut manager, tank) = prepare_manager();
	group.bench_function("calc_path", |b| b.iter(|| calc(black_box(&mut manager), black_box(&tank))));
	group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
