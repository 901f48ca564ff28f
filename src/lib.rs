//! **BOSCC** ("branch on superword condition codes") speculation, for
//! whole-function SIMD vectorizers.
//!
//! After a function has been analyzed for vectorization (every value having a
//! [`VectorShape`](vec_info::VectorShape): uniform, strided or varying), every
//! divergent conditional branch will end up *linearized*, i.e. both of its
//! sides executed under a mask. When one side leads into an expensive region
//! that the branch dominates, that work is wasted whenever no SIMD lane
//! actually needs it, and BOSCC inserts a *guard* block which tests (with a
//! single scalar "any lane active" reduction) whether the region can be
//! skipped entirely, at runtime.
//!
//! #### Notable types/modules
//!
//! ##### IR data types
//! * [`FuncDefBody`]: owns [`Block`]s and [`Inst`]s, and the [`ControlFlowGraph`]
//!   connecting the blocks (see [`cf::unstructured`])
//! * [`Value`]: SSA values, i.e. constants, parameters and instruction outputs
//!
//! ##### Analyses
//! * [`cf::dom`]: dominator and post-dominator trees (incrementally patchable)
//! * [`cf::loops`]: loop structure (membership, headers, latches)
//! * [`vec_info`]: per-value shapes, block predicates, and the region being vectorized
//!
//! ##### Passes
//! * [`passes::boscc`]: the BOSCC transform itself
//!
//! [`ControlFlowGraph`]: cf::unstructured::ControlFlowGraph

// BEGIN - Embark standard lints v6 for Rust 1.55+
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::char_lit_as_u8,
    clippy::checked_conversions,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_deref_methods,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::flat_map_option,
    clippy::float_cmp_const,
    clippy::fn_params_excessive_bools,
    clippy::from_iter_instead_of_collect,
    clippy::if_let_mutex,
    clippy::implicit_clone,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::invalid_upcast_comparisons,
    clippy::large_digit_groups,
    clippy::large_stack_arrays,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::manual_ok_or,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_same_arms,
    clippy::match_wild_err_arm,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::missing_enforced_import_renames,
    clippy::mut_mut,
    clippy::mutex_integer,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::needless_for_each,
    clippy::option_option,
    clippy::path_buf_push_overwrite,
    clippy::ptr_as_ptr,
    clippy::rc_mutex,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_functions_in_if_condition,
    clippy::semicolon_if_nothing_returned,
    clippy::single_match_else,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_lit_as_bytes,
    clippy::string_to_string,
    clippy::todo,
    clippy::trait_duplication_in_bounds,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::useless_transmute,
    clippy::verbose_file_reads,
    clippy::zero_sized_map_values,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v6 for Rust 1.55+
// crate-specific exceptions:
#![allow(
    // NOTE(eddyb) ignored for readability (`match` used when `if let` is too long).
    clippy::single_match_else,

    // NOTE(eddyb) ignored because it's misguided to suggest `let mut s = ...;`
    // and `s.push_str(...);` when `+` is equivalent and does not require `let`.
    clippy::string_add,
)]
#![forbid(unsafe_code)]

// NOTE(eddyb) all the modules are declared here, but they're documented "inside"
// (i.e. using inner doc comments).
pub mod builder;
pub mod cf;
mod entity;
pub mod func_at;
pub mod mem;
pub mod platform;
pub mod print;
pub mod vec_info;
pub mod passes {
    //! IR transformations (whole-[`FuncDefBody`](crate::FuncDefBody)).
    //
    // NOTE(eddyb) inline `mod` to avoid adding APIs here, it's just namespacing.

    pub mod boscc;
}

use smallvec::SmallVec;
use std::rc::Rc;

// HACK(eddyb) work around the lack of `FxIndex{Map,Set}` type aliases elsewhere.
#[doc(hidden)]
type FxIndexMap<K, V> =
    indexmap::IndexMap<K, V, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;
#[doc(hidden)]
type FxIndexSet<V> = indexmap::IndexSet<V, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;

pub use entity::{Entity, EntityDefs, EntityOrientedDenseMap};

entity::entities! {
    /// Entity handle for a [`BlockDef`] (a basic block).
    Block => BlockDef,

    /// Entity handle for an [`InstDef`] (a non-terminator instruction).
    Inst => InstDef,
}

/// The body of a function definition.
#[derive(Clone)]
pub struct FuncDefBody {
    pub blocks: EntityDefs<Block>,
    pub insts: EntityDefs<Inst>,

    /// The first [`Block`] executed when the function is called.
    pub entry: Block,

    /// The terminators of all the [`Block`]s (i.e. the edges between them).
    pub cfg: cf::unstructured::ControlFlowGraph,
}

/// Definition for a [`Block`]: a linear chain of [`Inst`]s, which must start
/// with all of the block's phis (see [`InstKind::Phi`]).
///
/// The terminator isn't part of the [`BlockDef`], but rather of the function's
/// [`ControlFlowGraph`](cf::unstructured::ControlFlowGraph).
#[derive(Clone)]
pub struct BlockDef {
    pub name: Rc<str>,

    pub insts: Vec<Inst>,
}

/// Definition for an [`Inst`]: a leaf (non-control-flow) instruction.
#[derive(Clone)]
pub struct InstDef {
    /// Optional name, only used for printing.
    pub name: Option<Rc<str>>,

    pub kind: InstKind,

    // FIXME(eddyb) change the inline size of this to fit most instructions.
    pub inputs: SmallVec<[Value; 2]>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum InstKind {
    /// Merge of values coming from the predecessors of the parent block, with
    /// one `(predecessor, value)` pair ("incoming record") per incoming edge.
    ///
    /// The predecessors recorded in `incoming` must at all times match up
    /// with the actual incoming edges in the CFG (see [`cf::verify`]).
    Phi { incoming: SmallVec<[(Block, Value); 2]> },

    /// Memory-specific operations (see [`mem::MemOp`]).
    Mem(mem::MemOp),

    /// Function call, with `inputs` as the call arguments (except for
    /// [`Callee::Indirect`], where `inputs[0]` is the function pointer).
    Call(Callee),

    /// Boolean (or, for varying values, per-lane mask) negation of `inputs[0]`.
    Not,

    /// Any other operation, opaque to every analysis and transformation here.
    Op(Rc<str>),
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Callee {
    /// Direct call to a function known by its (link) name.
    Named(Rc<str>),

    /// Call through a function pointer (`inputs[0]` of the call).
    Indirect,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Value {
    Const(i64),
    Bool(bool),

    /// Placeholder for a value that is never observed, e.g. the incoming value
    /// of a phi, along an edge that's only taken when no lane needs the phi.
    Undef,

    /// The `idx`th parameter of the function.
    FuncParam(u32),

    /// The output value of an [`Inst`].
    InstOutput(Inst),
}

impl Value {
    pub fn is_constant(self) -> bool {
        matches!(self, Value::Const(_) | Value::Bool(_) | Value::Undef)
    }
}

impl FuncDefBody {
    /// Allocate a new, empty [`Block`], which must have its terminator
    /// attached (via `cfg`) before the function is considered well-formed.
    pub fn new_block(&mut self, name: impl Into<Rc<str>>) -> Block {
        self.blocks.define(BlockDef { name: name.into(), insts: vec![] })
    }

    /// Append a new [`Inst`] to the end of `block`.
    pub fn append_inst(&mut self, block: Block, inst_def: InstDef) -> Inst {
        let inst = self.insts.define(inst_def);
        self.blocks[block].insts.push(inst);
        inst
    }

    /// Iterate over the phis at the start of `block`.
    pub fn phis(&self, block: Block) -> impl Iterator<Item = Inst> + '_ {
        self.at(block).at_phis().map(|phi| phi.position)
    }
}
