/// Numerical differentiation by finite differences
pub mod calculus;
