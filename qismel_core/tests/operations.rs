use std::path::PathBuf;

use qismel_core::logging::timestamp_now;
use qismel_core::{CoreError, DataType, OperationLog, StateTensor, SymbolicFeature, TensorBuffer};

fn buffer(shape: &[usize], data: &[f64]) -> TensorBuffer {
    TensorBuffer::from_vec(shape, data.to_vec()).expect("shape matches")
}

fn scratch_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "qismel_ops_{}_{}_{}",
        name,
        std::process::id(),
        timestamp_now()
    ))
}

fn journal_lines(log: &OperationLog) -> Vec<serde_json::Value> {
    std::fs::read_to_string(log.journal_path())
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn add_is_elementwise() {
    let a = buffer(&[2, 2], &[1.0, 2.0, 3.0, 4.0]);
    let b = buffer(&[2, 2], &[0.5, 0.5, -1.0, 10.0]);
    let sum = a.add(&b).unwrap();
    assert_eq!(sum.data(), &[1.5, 2.5, 2.0, 14.0]);
    assert_eq!(sum.shape(), &[2, 2]);
}

#[test]
fn multiply_is_hadamard() {
    let a = buffer(&[3], &[1.0, -2.0, 3.0]);
    let b = buffer(&[3], &[2.0, 2.0, 0.0]);
    assert_eq!(a.multiply(&b).unwrap().data(), &[2.0, -4.0, 0.0]);
}

#[test]
fn binary_ops_reject_mismatched_shapes() {
    let a = TensorBuffer::zeros(&[2, 3]).unwrap();
    let b = TensorBuffer::zeros(&[3, 2]).unwrap();
    assert!(matches!(a.add(&b), Err(CoreError::ShapeMismatch { .. })));
    assert!(matches!(a.subtract(&b), Err(CoreError::ShapeMismatch { .. })));
    assert!(matches!(a.multiply(&b), Err(CoreError::ShapeMismatch { .. })));
}

#[test]
fn concatenate_sums_the_joined_axis() {
    let a = buffer(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let b = buffer(&[1, 3], &[7.0, 8.0, 9.0]);
    let rows = a.concatenate(&b, 0).unwrap();
    assert_eq!(rows.shape(), &[3, 3]);
    assert_eq!(rows.get(&[2, 1]).unwrap(), 8.0);

    let c = buffer(&[2, 1], &[10.0, 20.0]);
    let cols = a.concatenate(&c, 1).unwrap();
    assert_eq!(cols.shape(), &[2, 4]);
    assert_eq!(cols.data(), &[1.0, 2.0, 3.0, 10.0, 4.0, 5.0, 6.0, 20.0]);
}

#[test]
fn concatenate_mismatch_leaves_inputs_untouched() {
    let log = OperationLog::new(scratch_dir("mismatch"));
    let a = buffer(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let b = buffer(&[2, 2], &[7.0, 8.0, 9.0, 10.0]);
    let before_a = a.clone();
    let before_b = b.clone();
    assert!(matches!(
        log.concatenate(&a, &b, 0),
        Err(CoreError::ShapeMismatch { .. })
    ));
    assert!(matches!(log.concatenate(&a, &b, 2), Err(CoreError::Config { .. })));
    assert_eq!(a, before_a);
    assert_eq!(b, before_b);
    assert!(journal_lines(&log).is_empty());
}

#[test]
fn logged_operations_journal_into_their_directory() {
    let log = OperationLog::new(scratch_dir("journal"));
    let a = buffer(&[2], &[1.0, 3.0]);
    let b = buffer(&[2], &[2.0, -1.0]);

    assert_eq!(log.add(&a, &b).unwrap().data(), &[3.0, 2.0]);
    assert_eq!(log.multiply(&a, &b).unwrap().data(), &[2.0, -3.0]);
    assert_eq!(log.concatenate(&a, &b, 0).unwrap().shape(), &[4]);
    assert!(log.add(&a, &buffer(&[1], &[0.0])).is_err());

    let lines = journal_lines(&log);
    let names: Vec<&str> = lines
        .iter()
        .map(|line| line["operation"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["add", "multiply", "concatenate"]);
    assert_eq!(lines[0]["min"], 2.0);
    assert_eq!(lines[0]["max"], 3.0);
    let _ = std::fs::remove_dir_all(log.dir());
}

#[test]
fn transpose_reverses_axes() {
    let a = buffer(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let t = a.transpose();
    assert_eq!(t.shape(), &[3, 2]);
    assert_eq!(t.data(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    assert_eq!(t.transpose(), a);
}

#[test]
fn normalize_maps_into_unit_interval() {
    let a = buffer(&[4], &[2.0, 4.0, 6.0, 10.0]);
    let normalized = a.normalize().unwrap();
    assert_eq!(normalized.data(), &[0.0, 0.25, 0.5, 1.0]);

    let constant = buffer(&[3], &[5.0, 5.0, 5.0]);
    assert!(matches!(
        constant.normalize(),
        Err(CoreError::DegenerateRange { .. })
    ));
}

#[test]
fn index_round_trips_through_flat_position() {
    let tensor = TensorBuffer::from_seed(7, &[3, 4, 5]).unwrap();
    for flat in [0, 1, 19, 37, 59] {
        let coords = tensor.coords_of(flat).unwrap();
        assert_eq!(tensor.flat_index(&coords).unwrap(), flat);
    }
    assert!(matches!(
        tensor.get(&[3, 0, 0]),
        Err(CoreError::Index { .. })
    ));
    assert!(matches!(tensor.get(&[0, 0]), Err(CoreError::Index { .. })));
}

#[test]
fn seeded_buffers_are_reproducible() {
    let a = TensorBuffer::from_seed(42, &[8, 8]).unwrap();
    let b = TensorBuffer::from_seed(42, &[8, 8]).unwrap();
    let c = TensorBuffer::from_seed(43, &[8, 8]).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
    let stats = a.statistics();
    assert!(stats.min >= 0.0 && stats.max <= 1.0);
}

#[test]
fn state_transforms_return_new_snapshots() {
    let state = StateTensor::builder(buffer(&[2, 2], &[1.0, 3.0, 5.0, 7.0]))
        .datatype(DataType::Float32)
        .feature("door", vec![0, 1], "object")
        .source("camera")
        .sensor("temperature", 21.5)
        .build()
        .unwrap();

    let normalized = state.derive("normalize", |b| b.normalize()).unwrap();
    assert_eq!(state.data(), &[1.0, 3.0, 5.0, 7.0]);
    assert_eq!(normalized.data()[3], 1.0);
    assert_eq!(normalized.datatype(), DataType::Float32);
    assert_eq!(normalized.features(), state.features());
    assert_eq!(normalized.sensor("temperature"), Some(21.5));
    assert_eq!(
        normalized.metadata().processing_steps.last().map(String::as_str),
        Some("normalize")
    );
    assert!(state.metadata().processing_steps.is_empty());
}

#[test]
fn features_must_address_existing_cells() {
    let result = StateTensor::builder(TensorBuffer::zeros(&[2, 2]).unwrap())
        .feature("ghost", vec![2, 0], "object")
        .build();
    assert!(matches!(result, Err(CoreError::Index { .. })));

    let feature = SymbolicFeature::new("door", vec![1, 1], "object");
    assert_eq!(feature.coords, vec![1, 1]);
}
