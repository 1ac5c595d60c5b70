#![doc = include_str!("../README.md")]

pub mod analysis;
pub use analysis::{
    Loop, LoopAnalyzer, LoopInfo, ScalarEvolution, SeExpr, SeKind, SeNodeId,
};

pub mod transform;
pub use transform::{DeadCodeEliminator, LocalAccessChainConvert, LoopInvariantCodeMotion};
