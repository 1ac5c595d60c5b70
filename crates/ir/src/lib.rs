#![doc = include_str!("../README.md")]

mod types;
pub use types::{StorageClass, Type};

mod value;
pub use value::{Constant, Value};

mod inst;
pub use inst::{Instruction, Op};

mod block;
pub use block::{BasicBlock, Terminator};

mod function;
pub use function::Function;

mod module;
pub use module::Module;

mod builder;
pub use builder::FunctionBuilder;

mod def_use;
pub use def_use::DefUse;

mod display;

index_vec::define_index_type! {
    /// A unique identifier for a value in a function.
    pub struct ValueId = u32;
    DEBUG_FORMAT = "v{}";
}

index_vec::define_index_type! {
    /// A unique identifier for an instruction in a function.
    pub struct InstId = u32;
    DEBUG_FORMAT = "inst{}";
}

index_vec::define_index_type! {
    /// A unique identifier for a basic block in a function.
    pub struct BlockId = u32;
    DEBUG_FORMAT = "bb{}";
}

index_vec::define_index_type! {
    /// A unique identifier for a function in a module.
    pub struct FunctionId = u32;
    DEBUG_FORMAT = "fn{}";
}
