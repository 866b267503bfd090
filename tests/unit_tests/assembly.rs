use itertools::iproduct;
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector};
use proptest::collection::vec;
use proptest::prelude::*;
use voxfdm::assembly::OperatorAssembler;
use voxfdm::dirichlet::fixed_slice_mask;
use voxfdm::elasticity::{ConstitutiveOperator, StrainOperator};
use voxfdm::operator::{FieldOperator, FnOperator};
use voxfdm::proptest::{dirichlet_mask, voxel_field};
use voxfdm::stencil::{Axis, DifferenceScheme};
use voxfdm::{FdmError, VoxelField};

const FACE_OFFSETS: [[isize; 3]; 7] = [
    [0, 0, 0],
    [-1, 0, 0],
    [1, 0, 0],
    [0, -1, 0],
    [0, 1, 0],
    [0, 0, -1],
    [0, 0, 1],
];

/// A 2 -> 2 channel operator with constant coefficients on the 7-point stencil, truncated at the
/// grid boundary.
fn seven_point_operator(
    weights: Vec<f64>,
) -> FnOperator<impl Fn(&VoxelField<f64>) -> Result<VoxelField<f64>, FdmError>> {
    assert_eq!(weights.len(), 2 * 2 * 7);
    FnOperator::new(2, 2, move |x: &VoxelField<f64>| -> Result<_, FdmError> {
        let shape = x.shape();
        Ok(VoxelField::from_fn(2, shape, |c_out, [i, j, k]| {
            let mut value = 0.0;
            for (c_in, (o, offset)) in iproduct!(0..2, FACE_OFFSETS.iter().enumerate()) {
                let q = [i as isize + offset[0], j as isize + offset[1], k as isize + offset[2]];
                if (0..3).all(|d| q[d] >= 0 && (q[d] as usize) < shape[d]) {
                    let w = weights[(2 * c_out + c_in) * 7 + o];
                    value += w * x[(c_in, q[0] as usize, q[1] as usize, q[2] as usize)];
                }
            }
            value
        }))
    })
}

/// The dense matrix of an operator, obtained by applying it to every unit vector.
fn dense_operator_matrix(operator: &impl FieldOperator<f64>, shape: [usize; 3]) -> DMatrix<f64> {
    let n: usize = shape.iter().product();
    let ncols = operator.input_channels() * n;
    let mut matrix = DMatrix::zeros(operator.output_channels() * n, ncols);
    for j in 0..ncols {
        let mut e = VoxelField::zeros(operator.input_channels(), shape);
        e.as_mut_slice()[j] = 1.0;
        let column = operator.apply(&e).unwrap();
        matrix.column_mut(j).copy_from(column.as_vector());
    }
    matrix
}

fn assert_assembled_matches_operator(operator: &impl FieldOperator<f64>, x: &VoxelField<f64>) {
    let matrix = OperatorAssembler::new(x.shape()).assemble(operator).unwrap();
    let expected = operator.apply(x).unwrap().into_vector();
    let product: DVector<f64> = &matrix * x.as_vector();
    assert_matrix_eq!(product, expected, comp = abs, tol = 1e-10);
}

#[test]
fn assembled_strain_matrix_equals_dense_operator_matrix() {
    let shape = [4, 2, 3];
    for scheme in [DifferenceScheme::Forward, DifferenceScheme::Central] {
        // Central differences need three voxels along every axis
        let shape = if scheme == DifferenceScheme::Central { [4, 3, 3] } else { shape };
        let strain = StrainOperator::new([0.5, 1.0, 2.0], scheme);
        let assembled = OperatorAssembler::new(shape).assemble(&strain).unwrap();
        assert_eq!(assembled.nrows(), 9 * shape.iter().product::<usize>());
        assert_eq!(assembled.ncols(), 3 * shape.iter().product::<usize>());
        let dense = dense_operator_matrix(&strain, shape);
        assert_matrix_eq!(DMatrix::from(&assembled), dense, comp = abs, tol = 1e-12);
    }
}

#[test]
fn assembled_matrix_does_not_store_zeros() {
    let shape = [3, 3, 3];
    let strain = StrainOperator::new([1.0; 3], DifferenceScheme::Forward);
    let matrix = OperatorAssembler::new(shape).assemble(&strain).unwrap();
    assert!(matrix.values().iter().all(|&v| v != 0.0));
}

#[test]
fn assembled_matrix_with_dirichlet_columns_has_empty_columns() {
    let shape = [3, 2, 2];
    let mask = fixed_slice_mask(shape, Axis::X, 0);
    let strain = StrainOperator::new([1.0; 3], DifferenceScheme::Forward);
    let matrix = OperatorAssembler::new(shape)
        .assemble(&strain.with_dirichlet_columns(&mask))
        .unwrap();
    let dense = DMatrix::from(&matrix);
    for (col, &fixed) in mask.as_slice().iter().enumerate() {
        if fixed {
            assert!(dense.column(col).iter().all(|&v| v == 0.0));
        }
    }
}

#[test]
fn larger_footprint_gives_same_matrix() {
    let shape = [5, 4, 3];
    let strain = StrainOperator::new([1.0, 0.5, 0.25], DifferenceScheme::Central);
    let a = OperatorAssembler::new(shape).assemble(&strain).unwrap();
    let b = OperatorAssembler::new(shape)
        .with_footprint(4)
        .unwrap()
        .assemble(&strain)
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn footprint_must_separate_probes() {
    assert!(matches!(
        OperatorAssembler::new([3, 3, 3]).with_footprint(2),
        Err(FdmError::InvalidFootprint(2))
    ));
    assert_eq!(OperatorAssembler::new([3, 3, 3]).footprint(), 3);
}

#[test]
fn assembler_rejects_responses_of_wrong_shape() {
    let operator = FnOperator::new(1, 1, |x: &VoxelField<f64>| -> Result<_, FdmError> {
        Ok(x.padded(1, 0.0))
    });
    assert!(matches!(
        OperatorAssembler::new([2, 2, 2]).assemble(&operator),
        Err(FdmError::ShapeMismatch { .. })
    ));
}

#[test]
fn diagonal_couplings_are_not_captured() {
    // Couples each voxel to its (+1, +1, 0) neighbour, which lies outside the face neighbourhood
    let operator = FnOperator::new(1, 1, |x: &VoxelField<f64>| -> Result<_, FdmError> {
        let [nx, ny, _] = x.shape();
        Ok(VoxelField::from_fn(1, x.shape(), |_, [i, j, k]| {
            if i + 1 < nx && j + 1 < ny {
                x[(0, i + 1, j + 1, k)]
            } else {
                0.0
            }
        }))
    });
    let matrix = OperatorAssembler::new([3, 3, 1]).assemble(&operator).unwrap();
    assert_eq!(matrix.nnz(), 0);
}

fn shape_strategy(min_extent: usize) -> impl Strategy<Value = [usize; 3]> {
    voxfdm::proptest::grid_shape(min_extent..6)
}

proptest! {
    #[test]
    fn assembled_seven_point_operator_reproduces_action(
        (shape, x) in shape_strategy(1).prop_flat_map(|shape| (Just(shape), voxel_field(2, shape, -1.0..1.0))),
        weights in vec(-2.0..2.0f64, 28)
    ) {
        assert_assembled_matches_operator(&seven_point_operator(weights), &x);
    }

    #[test]
    fn assembled_masked_strain_reproduces_action(
        (x, mask) in shape_strategy(3).prop_flat_map(|shape| (voxel_field(3, shape, -1.0..1.0), dirichlet_mask(shape))),
        central in proptest::bool::ANY
    ) {
        let scheme = if central { DifferenceScheme::Central } else { DifferenceScheme::Forward };
        let strain = StrainOperator::new([0.5, 1.5, 1.0], scheme);
        assert_assembled_matches_operator(&strain.with_dirichlet_columns(&mask), &x);

        let sigma = strain.apply(&x).unwrap();
        assert_assembled_matches_operator(&strain.adjoint().with_dirichlet_rows(&mask), &sigma);
    }

    #[test]
    fn assembled_constitutive_strain_reproduces_action(
        x in shape_strategy(2).prop_flat_map(|shape| voxel_field(3, shape, -1.0..1.0)),
        nu in -0.9..0.45f64
    ) {
        let operator = StrainOperator::new([1.0, 1.0, 1.0], DifferenceScheme::Forward)
            .then(ConstitutiveOperator::new(nu));
        assert_assembled_matches_operator(&operator, &x);
    }
}
