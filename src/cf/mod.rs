//! Control-flow abstractions and analyses.

// NOTE(eddyb) all the modules are declared here, but they're documented "inside"
// (i.e. using inner doc comments).
pub mod dom;
pub mod loops;
pub mod unstructured;
pub mod verify;
