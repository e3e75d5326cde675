pub mod callable;
pub mod callgraph;
pub mod error;
pub mod identity;
pub mod resolver;
pub mod session;
