//! Compute resources: functions and lambdas

pub mod artifact;
pub mod assembler;
pub mod function;

pub use assembler::LambdaSpec;
pub use function::{FunctionReconciler, FunctionSpec};
