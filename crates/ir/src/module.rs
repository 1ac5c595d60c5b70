//! IR modules.

use super::{Function, FunctionId};
use index_vec::IndexVec;

/// A shader module: a collection of functions.
#[derive(Clone, Debug, Default)]
pub struct Module {
    /// Module name.
    pub name: String,
    /// All functions in this module.
    pub functions: IndexVec<FunctionId, Function>,
}

impl Module {
    /// Creates a new empty module.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), functions: IndexVec::new() }
    }

    /// Adds a function to the module.
    pub fn add_function(&mut self, func: Function) -> FunctionId {
        self.functions.push(func)
    }

    /// Returns an iterator over the functions in the module.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }
}
