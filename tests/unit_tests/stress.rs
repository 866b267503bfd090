use matrixcompare::assert_scalar_eq;
use proptest::prelude::*;
use voxfdm::proptest::voxel_field;
use voxfdm::stress::{von_mises_stress, von_mises_stress_batch, VON_MISES_EPSILON};
use voxfdm::{FdmError, VoxelField};

#[test]
fn uniaxial_and_shear_stress() {
    let shape = [1, 1, 2];
    let sigma = VoxelField::from_fn(9, shape, |c, [_, _, k]| match (c, k) {
        // Uniaxial stress in the first voxel
        (0, 0) => -4.0,
        // Pure shear in the second voxel
        (1, 1) | (3, 1) => 2.0,
        _ => 0.0,
    });
    let vm = von_mises_stress(&sigma).unwrap();
    assert_scalar_eq!(vm[(0, 0, 0, 0)], 4.0, comp = abs, tol = 1e-9);
    assert_scalar_eq!(vm[(0, 0, 0, 1)], 2.0 * 3.0f64.sqrt(), comp = abs, tol = 1e-9);
}

#[test]
fn hydrostatic_stress_only_leaves_the_floor() {
    let sigma = VoxelField::from_fn(9, [2, 1, 1], |c, _| if c % 4 == 0 { 7.0 } else { 0.0 });
    let vm = von_mises_stress(&sigma).unwrap();
    for &s in vm.as_slice() {
        assert_scalar_eq!(s, VON_MISES_EPSILON.sqrt(), comp = abs, tol = 1e-15);
    }
}

#[test]
fn requires_nine_channels() {
    let sigma = VoxelField::from_element(6, [1, 1, 1], 1.0);
    assert!(matches!(
        von_mises_stress(&sigma),
        Err(FdmError::ShapeMismatch { .. })
    ));
}

#[test]
fn batch_matches_individual_fields() {
    let first = VoxelField::from_fn(9, [2, 1, 2], |c, [i, _, k]| (c as f64 - 4.0) * (1.0 + (i + k) as f64));
    let second = VoxelField::from_fn(9, [3, 2, 1], |c, [i, j, _]| if c == 4 { (i + j) as f64 } else { 0.5 });
    let batch = von_mises_stress_batch(&[first.clone(), second.clone()]).unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0], von_mises_stress(&first).unwrap());
    assert_eq!(batch[1], von_mises_stress(&second).unwrap());
    assert!(von_mises_stress_batch::<f64>(&[]).unwrap().is_empty());

    let invalid = VoxelField::from_element(3, [1, 1, 1], 1.0);
    assert!(matches!(
        von_mises_stress_batch(&[first, invalid]),
        Err(FdmError::ShapeMismatch { .. })
    ));
}

proptest! {
    #[test]
    fn von_mises_stress_is_positive(
        sigma in voxfdm::proptest::grid_shape(1..4).prop_flat_map(|shape| voxel_field(9, shape, -1e3..1e3))
    ) {
        let vm = von_mises_stress(&sigma).unwrap();
        prop_assert_eq!(vm.shape(), sigma.shape());
        prop_assert!(vm.as_slice().iter().all(|&s| s > 0.0 && s.is_finite()));
    }
}
