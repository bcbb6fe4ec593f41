// magtrack_core/tests/tracking.rs

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use approx::assert_abs_diff_eq;
use magtrack_core::prelude::*;

const TOOL_LENGTH: f64 = 318.0;

fn ring_map() -> BTreeMap<usize, Position> {
    BTreeMap::from([
        (0, Position::new(0.0, -40.0, 0.0)),
        (1, Position::new(40.0, 0.0, 0.0)),
        (2, Position::new(0.0, 40.0, 0.0)),
        (3, Position::new(-40.0, 0.0, 0.0)),
    ])
}

fn ring() -> SensorGeometry {
    SensorGeometry::from_map(&ring_map()).unwrap()
}

/// Engine configured to look for the magnet above the ring plane.
fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.tool.length = TOOL_LENGTH;
    config.seed.axial_offset = 10.0;
    config
}

/// Noise-free calibrated readings for a magnet at `magnet`, keyed by sensor.
fn readings_for(magnet: &Position, config: &EngineConfig) -> SensorReadings {
    let model = DipoleFieldModel::new(&config.dipole);
    let map: BTreeMap<usize, nalgebra::Vector3<f64>> = ring_map()
        .into_iter()
        .map(|(i, p)| {
            let norm = model.squared_magnitude(magnet, &p).sqrt();
            // Spread the norm over two axes; only the magnitude matters.
            (i, nalgebra::Vector3::new(norm * 0.6, 0.0, norm * 0.8))
        })
        .collect();
    SensorReadings::from_map(&map).unwrap()
}

#[test]
fn magnet_above_ring_is_recovered_end_to_end() {
    let magnet = Position::new(5.0, 5.0, 50.0);
    let mut engine = PositionEngine::new(ring(), config()).unwrap();

    let out = engine.process(&readings_for(&magnet, engine.config())).unwrap();

    assert_eq!(out.status, CycleStatus::Converged);
    assert_eq!(out.ranked.as_slice(), &[0, 1, 2]);
    assert_abs_diff_eq!(out.magnet_position, magnet, epsilon = 1e-6);

    let effector = out.effector.expect("converged fix is projected");
    let expected_tip = -magnet.normalize() * (TOOL_LENGTH - magnet.norm());
    assert_abs_diff_eq!(effector.position, expected_tip, epsilon = 1e-4);
    assert!(effector.tool_length_error.abs() <= engine.config().tool.length_tolerance);
    assert!(out.is_trusted());
}

#[test]
fn seed_offset_sign_selects_the_hemisphere() {
    let magnet = Position::new(5.0, 5.0, 50.0);
    let mut below = config();
    below.seed.axial_offset = -10.0;
    let mut engine = PositionEngine::new(ring(), below).unwrap();

    let out = engine.process(&readings_for(&magnet, engine.config())).unwrap();

    // The model cannot tell the two mirror images apart.
    assert_eq!(out.status, CycleStatus::Converged);
    assert_abs_diff_eq!(out.magnet_position, Position::new(5.0, 5.0, -50.0), epsilon = 1e-6);
}

#[test]
fn positions_across_the_working_volume_are_recovered() {
    let targets = [
        Position::new(0.0, 0.0, 30.0),
        Position::new(-20.0, 10.0, 40.0),
        Position::new(15.0, -25.0, 80.0),
        Position::new(0.0, 0.0, 120.0),
    ];

    for magnet in targets {
        let mut engine = PositionEngine::new(ring(), config()).unwrap();
        let out = engine.process(&readings_for(&magnet, engine.config())).unwrap();
        assert_eq!(out.status, CycleStatus::Converged, "target {magnet:?}");
        assert_abs_diff_eq!(out.magnet_position, magnet, epsilon = 1e-5);
    }
}

#[test]
fn helical_motion_is_tracked_with_a_single_seed() {
    let mut engine = PositionEngine::new(ring(), config()).unwrap();
    let steps = 60;
    let mut reseeds = 0;

    for step in 0..steps {
        let t = step as f64 / (steps - 1) as f64;
        let magnet = Position::new(
            12.0 * (TAU * t).cos(),
            12.0 * (TAU * t).sin(),
            40.0 + 20.0 * t,
        );

        let out = engine.process(&readings_for(&magnet, engine.config())).unwrap();
        if out.reseeded {
            reseeds += 1;
        }
        assert_eq!(out.status, CycleStatus::Converged, "step {step}");
        assert_abs_diff_eq!(out.magnet_position, magnet, epsilon = 1e-5);
    }

    assert_eq!(reseeds, 1);
}

#[test]
fn engine_recovers_after_the_fix_leaves_the_volume() {
    let mut cfg = config();
    cfg.bounds.half_extents = [500.0, 500.0, 100.0];
    let mut engine = PositionEngine::new(ring(), cfg).unwrap();

    let inside = Position::new(5.0, 5.0, 50.0);
    let outside = Position::new(0.0, 0.0, 120.0);

    let first = engine.process(&readings_for(&inside, engine.config())).unwrap();
    assert_eq!(first.status, CycleStatus::Converged);

    let lost = engine.process(&readings_for(&outside, engine.config())).unwrap();
    assert_eq!(lost.status, CycleStatus::OutOfBounds);
    assert!(lost.effector.is_none());
    assert!(engine.solver_state().is_none());

    let back = engine.process(&readings_for(&inside, engine.config())).unwrap();
    assert!(back.reseeded);
    assert_eq!(back.status, CycleStatus::Converged);
    assert_abs_diff_eq!(back.magnet_position, inside, epsilon = 1e-6);
}

#[test]
fn batches_that_do_not_fit_the_ring_are_errors() {
    let mut engine = PositionEngine::new(ring(), config()).unwrap();

    let short = SensorReadings::new(vec![SensorReading::new(1.0, 1.0, 1.0); 2]);
    assert_eq!(
        engine.process(&short),
        Err(EngineError::SensorCountMismatch {
            expected: 4,
            actual: 2
        })
    );

    let mut gappy = BTreeMap::new();
    gappy.insert(0, nalgebra::Vector3::new(1.0, 0.0, 0.0));
    gappy.insert(2, nalgebra::Vector3::new(1.0, 0.0, 0.0));
    assert!(matches!(
        SensorReadings::from_map(&gappy),
        Err(EngineError::InvalidSensorMap(_))
    ));

    // A rejected batch leaves no trace on the warm state.
    assert!(engine.solver_state().is_none());
}

#[test]
fn two_sensor_ring_cannot_be_built() {
    let map = BTreeMap::from([
        (0, Position::new(0.0, -40.0, 0.0)),
        (1, Position::new(40.0, 0.0, 0.0)),
    ]);
    assert_eq!(
        SensorGeometry::from_map(&map),
        Err(EngineError::InsufficientSensors {
            available: 2,
            required: 3
        })
    );
}

#[test]
fn magnet_at_the_ring_origin_withholds_the_projection() {
    let projector = EndEffectorProjector::new(TOOL_LENGTH);
    assert_eq!(
        projector.project(&Position::zeros()),
        Err(EngineError::DegenerateGeometry)
    );
}
