//! Analyses over the IR.
//!
//! - Natural loop detection (headers, preheaders, latches, nesting)
//! - Scalar evolution of integer values across loop iterations

mod loop_analysis;
pub use loop_analysis::{Loop, LoopAnalyzer, LoopInfo};

mod scalar_evolution;
pub use scalar_evolution::{ScalarEvolution, SeExpr, SeKind, SeNodeId};
