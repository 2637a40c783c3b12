pub mod compiler;
pub mod dsl;
pub mod graph;
