//! Solves a small cantilever and takes a few projected gradient steps on its compliance.
use voxfdm::elasticity::YoungPoisson;
use voxfdm::procedural::clamped_block_problem;
use voxfdm::stencil::Axis;
use voxfdm::{FdmSettings, FdmSolver, Solution, VoxelField, VoxelGrid};

fn main() -> eyre::Result<()> {
    let grid = VoxelGrid::new([12, 4, 4], [0.5, 0.5, 0.5])?;
    let material = YoungPoisson {
        young: 10.0,
        poisson: 0.3,
    };
    let problem = clamped_block_problem(grid, material, Axis::X, [0.0, 0.0, -0.1])?;
    let mut solver = FdmSolver::new(FdmSettings::default())?;
    solver.attach(&problem)?;

    let exponent = 3.0_f64;
    let step = 0.05;
    let mut density = VoxelField::from_element(1, problem.shape(), 0.5_f64);
    for iteration in 0..5 {
        let (output, tape) = solver.solve_with_gradient(&problem, &density, exponent)?;
        // The gradient of the compliance F^T u with respect to u is the load itself
        let compliance = problem.load().dot(&output.displacement)?;
        let gradient = solver.density_gradient(tape, problem.load())?;
        let max_von_mises = output.von_mises.max_value().unwrap_or(0.0);
        println!(
            "iteration {iteration}: compliance {compliance:.6e}, max von Mises {max_von_mises:.4}, |grad| {:.4e}",
            gradient.as_vector().norm()
        );

        // Steepest descent, projected back onto [0, 1]
        for (theta, g) in density.as_mut_slice().iter_mut().zip(gradient.as_slice()) {
            *theta = (*theta - step * g / gradient.as_vector().amax().max(1e-12)).clamp(0.0, 1.0);
        }
    }

    let mut solution = Solution::new(problem, density)?;
    let continuous = solver.solve(&mut solution, exponent, false)?;
    let binary = solver.solve(&mut solution, exponent, true)?;
    let tip = |output: &voxfdm::SolverOutput<f64>| output.displacement[(2, 11, 2, 2)];
    println!("tip deflection: continuous {:.6e}, binarized {:.6e}", tip(&continuous), tip(&binary));
    Ok(())
}
