//! Memory operations.
//
// FIXME(eddyb) implement more ops (e.g. copies, atomics), and gather/scatter
// once there is a vectorized lowering to feed them into.

/// Memory-specific operations ([`InstKind::Mem`](crate::InstKind::Mem)).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum MemOp {
    /// Read a single value from a pointer (`inputs[0]`).
    Load,

    /// Write a single value (`inputs[1]`) to a pointer (`inputs[0]`).
    Store,
}

impl MemOp {
    /// Index (in the instruction's `inputs`) of the pointer being accessed.
    pub const PTR_INPUT_IDX: usize = 0;
}
