use voxfdm::filter::{filter_density, DensityFilter, IdentityFilter};
use voxfdm::{FdmError, VoxelField};

#[test]
fn identity_filter_returns_input() {
    let density = VoxelField::from_fn(1, [3, 2, 2], |_, [i, j, k]| 0.1 * (i + j + k) as f64);
    assert_eq!(IdentityFilter.filter(&density), density);
    assert_eq!(filter_density(&IdentityFilter, &density).unwrap(), density);
}

#[test]
fn closures_are_filters() {
    let density = VoxelField::from_fn(1, [2, 2, 2], |_, [i, _, _]| i as f64);
    let smoothed = filter_density(&|d: &VoxelField<f64>| d.map(|theta| 0.25 + 0.5 * theta), &density).unwrap();
    assert_eq!(smoothed[(0, 0, 1, 1)], 0.25);
    assert_eq!(smoothed[(0, 1, 1, 1)], 0.75);
}

#[test]
fn filtered_density_must_stay_in_unit_interval() {
    let density = VoxelField::from_element(1, [2, 2, 2], 0.5);
    let overshoot = |d: &VoxelField<f64>| d.map(|theta| 3.0 * theta);
    assert!(matches!(
        filter_density(&overshoot, &density),
        Err(FdmError::DensityOutOfRange { min, max }) if min == 1.5 && max == 1.5
    ));
}

#[test]
fn filter_must_preserve_layout() {
    let density = VoxelField::from_element(1, [2, 2, 2], 0.5);
    let growing = |d: &VoxelField<f64>| d.padded(1, 0.5);
    assert!(matches!(
        filter_density(&growing, &density),
        Err(FdmError::ShapeMismatch { .. })
    ));
}
