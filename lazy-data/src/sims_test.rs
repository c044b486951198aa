use std::{thread, time::Duration};

use tempfile::TempDir;

use super::*;
use crate::{
    container::LoadError,
    test_backend::{break_step, template, write_steps, DummyBackend},
};

fn dummy_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_steps(dir.path(), 0..10);
    dir
}

fn registry(backend: DummyBackend) -> (TempDir, Simulations<DummyBackend>, SimulationIdx) {
    let dir = dummy_dir();
    let sims = Simulations::new(backend);
    let idx = sims
        .add(SimulationConfig::new(dir.path()).with_fields(template()))
        .unwrap();
    (dir, sims, idx)
}

#[test]
fn load_aggregate_unload() {
    let (_dir, sims, idx) = registry(DummyBackend::default());
    let sim = sims.get(idx).unwrap();
    assert_eq!(sim.tsteps(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);

    sims.load(idx, 5).unwrap();
    let set = sim.aggregate(5, 32, 32).unwrap();
    assert_eq!(set.keys().collect::<Vec<_>>(), vec!["arr1", "arr2"]);
    for key in ["arr1", "arr2"] {
        assert_eq!(set.raster(key).unwrap().values.dim(), (32, 32));
    }
    assert!(sim.is_loaded(5).unwrap());
    assert!(sim.is_aggregated(5).unwrap());

    sims.unload(idx, 5).unwrap();
    assert!(!sim.is_loaded(5).unwrap());
    assert!(!sim.is_aggregated(5).unwrap());
}

#[test]
fn missing_templates_are_not_registered() {
    let sims = Simulations::new(DummyBackend::default());
    let err = sims.add(SimulationConfig::new("")).unwrap_err();
    assert!(matches!(
        err,
        SimulationError::Configuration(ConfigurationError::NoTemplates(_))
    ));
    assert!(sims.is_empty());
    assert!(sims.by_name("SIM_0").is_none());

    let err = sims
        .add(SimulationConfig::new("").with_fields(template()))
        .unwrap_err();
    assert!(matches!(
        err,
        SimulationError::Configuration(ConfigurationError::EmptyPath(_))
    ));
    assert!(sims.is_empty());
}

#[test]
fn discovery_failure_is_not_registered() {
    let dir = tempfile::tempdir().unwrap();
    let sims = Simulations::new(DummyBackend::default());
    let err = sims
        .add(SimulationConfig::new(dir.path().join("nope")).with_fields(template()))
        .unwrap_err();
    assert!(matches!(err, SimulationError::Discovery(_)));
    assert!(sims.is_empty());
}

#[test]
fn names_are_generated_and_unique() {
    let dir = dummy_dir();
    let sims = Simulations::new(DummyBackend::default());
    let config = || SimulationConfig::new(dir.path()).with_fields(template());

    let a = sims.add(config()).unwrap();
    let b = sims.add(config().with_name("  ")).unwrap();
    assert_eq!(sims.get(a).unwrap().name(), "SIM_0");
    assert_eq!(sims.get(b).unwrap().name(), "SIM_1");

    sims.remove(a).unwrap();
    let c = sims.add(config()).unwrap();
    // SIM_1 is still taken
    assert_eq!(sims.get(c).unwrap().name(), "SIM_2");
    assert_eq!(sims.by_name("SIM_2"), Some(c));

    let err = sims.add(config().with_name("SIM_1")).unwrap_err();
    assert!(matches!(
        err,
        SimulationError::Configuration(ConfigurationError::DuplicateName(ref n)) if n == "SIM_1"
    ));
    assert_eq!(sims.len(), 2);

    let order: Vec<_> = sims.enumerate().into_iter().map(|s| s.0).collect();
    assert_eq!(order, vec![b, c]);
}

#[test]
fn explicit_tsteps_skip_discovery() {
    let dir = tempfile::tempdir().unwrap();
    let sims = Simulations::new(DummyBackend::default());
    let idx = sims
        .add(
            SimulationConfig::new(dir.path())
                .with_fields("flds.tot".parse().unwrap())
                .with_tsteps([3, 1, 3]),
        )
        .unwrap();
    let sim = sims.get(idx).unwrap();
    assert_eq!(sim.tsteps(), &[1, 3]);
    assert!(matches!(
        sim.load(2),
        Err(SimulationError::UnknownTimestep { tstep: 2, .. })
    ));
}

#[test]
fn remove_unloads_everything() {
    let (_dir, sims, idx) = registry(DummyBackend::default());
    sims.load(idx, 0).unwrap();
    sims.raster(idx, 1, "arr2", 8, 8).unwrap();

    let sim = sims.remove(idx).unwrap();
    assert!(sim.snapshots().all(|s| !s.is_loaded() && !s.is_aggregated()));
    assert!(matches!(
        sims.get(idx),
        Err(SimulationError::UnknownSimulation(_))
    ));
    assert!(sims.remove(idx).is_err());
}

#[test]
fn field_keys_are_read_once() {
    let (dir, sims, idx) = registry(DummyBackend::default());
    assert_eq!(sims.field_keys(idx).unwrap(), vec!["arr1", "arr2"]);
    // Cached, the first file is no longer needed
    std::fs::remove_file(dir.path().join("dummy00.hdf5")).unwrap();
    assert_eq!(sims.field_keys(idx).unwrap(), vec!["arr1", "arr2"]);
}

#[test]
fn field_keys_without_timesteps() {
    let dir = tempfile::tempdir().unwrap();
    let sims = Simulations::new(DummyBackend::default());
    let idx = sims
        .add(
            SimulationConfig::new(dir.path())
                .with_fields(template())
                .with_tsteps(Vec::<u32>::new()),
        )
        .unwrap();
    assert!(sims.field_keys(idx).unwrap().is_empty());
}

#[test]
fn raster_follows_target_size() {
    let backend = DummyBackend::default();
    let (_dir, sims, idx) = registry(backend.clone());
    let r = sims.raster(idx, 2, "arr1", 32, 32).unwrap();
    assert_eq!(r.values.dim(), (32, 32));
    let r = sims.raster(idx, 2, "arr1", 16, 8).unwrap();
    assert_eq!((r.width(), r.height()), (16, 8));
    assert_eq!(backend.reads(), 1);

    assert!(matches!(
        sims.raster(idx, 2, "arr3", 16, 8),
        Err(SimulationError::UnknownField { .. })
    ));
}

#[test]
fn memory_usage_grows_with_loads() {
    let (_dir, sims, idx) = registry(DummyBackend::default());
    let mut last = sims.memory_usage(idx).unwrap();
    for t in [0, 4, 4, 9] {
        sims.load(idx, t).unwrap();
        let now = sims.memory_usage(idx).unwrap();
        assert!(now >= last);
        last = now;
    }
    sims.unload_all(idx).unwrap();
    assert!(sims.memory_usage(idx).unwrap() < last);
    assert!(sims.memory_usage(idx).unwrap().to_string().ends_with("B"));
}

#[test]
fn load_all_stops_at_first_failure() {
    let dir = dummy_dir();
    break_step(dir.path(), 3, "garbage");
    break_step(dir.path(), 6, "missing");
    let sims = Simulations::new(DummyBackend::default());
    let idx = sims
        .add(SimulationConfig::new(dir.path()).with_fields(template()))
        .unwrap();

    let err = sims.load_all(idx).unwrap_err();
    assert!(matches!(
        err,
        SimulationError::Load(LoadError::Other { tstep: 3, .. })
    ));
    let sim = sims.get(idx).unwrap();
    for t in 0..3 {
        assert!(sim.is_loaded(t).unwrap());
    }
    for t in 3..10 {
        assert!(!sim.is_loaded(t).unwrap());
    }
}

#[test]
fn particles_only_simulation() {
    let dir = dummy_dir();
    let sims = Simulations::new(DummyBackend::default());
    let idx = sims
        .add(SimulationConfig::new(dir.path()).with_particles(template()))
        .unwrap();
    let sim = sims.get(idx).unwrap();

    sim.load(1).unwrap();
    assert!(sim.is_loaded(1).unwrap());
    let particles = sim.snapshot(1).unwrap().particles().unwrap().raw().unwrap();
    assert_eq!(particles.get("x_1").unwrap().len(), 20);
    assert_eq!(sim.particle_keys(1).unwrap(), vec!["u_1", "x_1"]);

    assert!(matches!(sims.field_keys(idx), Err(SimulationError::NoFields(_))));
    assert!(matches!(
        sims.raster(idx, 1, "arr1", 4, 4),
        Err(SimulationError::NoFields(_))
    ));
}

#[test]
fn concurrent_loads_read_once() {
    let backend = DummyBackend::with_delay(Duration::from_millis(50));
    let (_dir, sims, idx) = registry(backend.clone());
    thread::scope(|s| {
        let a = s.spawn(|| sims.load(idx, 5));
        let b = s.spawn(|| sims.load(idx, 5));
        a.join().unwrap().unwrap();
        b.join().unwrap().unwrap();
    });
    assert_eq!(backend.reads(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn background_loads_share_a_read() {
    let backend = DummyBackend::with_delay(Duration::from_millis(50));
    let (_dir, sims, idx) = registry(backend.clone());
    let (a, b) = tokio::join!(
        sims.load_in_background(idx, 5),
        sims.load_in_background(idx, 5)
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(backend.reads(), 1);
    assert!(sims.get(idx).unwrap().is_loaded(5).unwrap());
}

#[tokio::test]
async fn background_load_all() {
    let backend = DummyBackend::default();
    let (_dir, sims, idx) = registry(backend.clone());
    sims.load_all_in_background(idx).await.unwrap();
    let sim = sims.get(idx).unwrap();
    assert!(sim.snapshots().all(|s| s.is_loaded()));
    assert_eq!(backend.reads(), 10);

    assert!(matches!(
        sims.load_in_background(idx, 42).await,
        Err(SimulationError::UnknownTimestep { tstep: 42, .. })
    ));
}

#[tokio::test]
async fn background_load_all_stops_at_first_failure() {
    let backend = DummyBackend::with_delay(Duration::from_millis(10));
    let dir = dummy_dir();
    break_step(dir.path(), 2, "garbage");
    let sims = Simulations::new(backend.clone());
    let idx = sims
        .add(SimulationConfig::new(dir.path()).with_fields(template()))
        .unwrap();

    let err = sims.load_all_in_background(idx).await.unwrap_err();
    assert!(matches!(
        err,
        SimulationError::Load(LoadError::Other { tstep: 2, .. })
    ));
    // Nothing keeps loading after the error was returned
    tokio::time::sleep(Duration::from_millis(50)).await;
    let sim = sims.get(idx).unwrap();
    let loaded: Vec<u32> = sim.snapshots().filter(|s| s.is_loaded()).map(|s| s.tstep()).collect();
    assert_eq!(loaded, vec![0, 1]);
    assert_eq!(backend.reads(), 3);
}

#[test]
fn display_shows_state_strip() {
    let (_dir, sims, idx) = registry(DummyBackend::default());
    sims.load(idx, 0).unwrap();
    sims.raster(idx, 2, "arr1", 4, 4).unwrap();
    sims.field_keys(idx).unwrap();

    let text = sims.get(idx).unwrap().to_string();
    assert!(text.starts_with("Simulation SIM_0\n"));
    assert!(text.contains("  fields: dummy%02d.hdf5\n"));
    assert!(text.contains("  particles: -\n"));
    assert!(text.contains("  timesteps: 10 (0...9)\n"));
    assert!(text.contains("  field keys: [\"arr1\", \"arr2\"]\n"));
    assert!(text.contains("  loaded:     *_*_______\n"));
    assert!(text.contains("  aggregated: __*_______\n"));
}
