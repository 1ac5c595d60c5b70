//! Optimization passes over the IR.

pub mod access_chain;
pub mod dce;
pub mod licm;

pub use access_chain::LocalAccessChainConvert;
pub use dce::DeadCodeEliminator;
pub use licm::LoopInvariantCodeMotion;
