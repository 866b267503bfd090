mod assembly;
mod filter;
mod stencil;
mod stress;
