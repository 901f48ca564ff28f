//! Traversal helpers for intra-function entities.
//!
//! [`FuncAt<P>`]/[`FuncAtMut<P>`] are like `(&FuncDefBody, P)`/`(&mut FuncDefBody, P`)
//! (where `P` is some type describing a "position" in the function), except:
//! * they only borrow the [`EntityDefs`] fields of [`FuncDefBody`]
//!   * this can prevent borrow conflicts, especially when mutating other fields
//!     (e.g. the `cfg`, while rewriting the phis of some block)
//!   * it also avoids accidentally accessing parts of the function definition
//!     without going through `P` (as [`EntityDefs`] requires keys for any access)
//! * they're dedicated types with inherent methods and trait `impl`s

// NOTE(eddyb) wrong wrt lifetimes (https://github.com/rust-lang/rust-clippy/issues/5004).
#![allow(clippy::should_implement_trait)]

use crate::{Block, BlockDef, EntityDefs, FuncDefBody, Inst, InstDef, InstKind, Value};
use smallvec::SmallVec;

/// Immutable traversal (i.e. visiting) helper for intra-function entities.
///
/// The point/position type `P` should be an entity or a shallow entity wrapper
/// (e.g. `&[Inst]`, for the instructions of a [`Block`]).
#[derive(Copy, Clone)]
pub struct FuncAt<'a, P: Copy> {
    pub blocks: &'a EntityDefs<Block>,
    pub insts: &'a EntityDefs<Inst>,

    pub position: P,
}

impl<'a, P: Copy> FuncAt<'a, P> {
    /// Reposition to `new_position`.
    pub fn at<P2: Copy>(self, new_position: P2) -> FuncAt<'a, P2> {
        FuncAt { blocks: self.blocks, insts: self.insts, position: new_position }
    }
}

impl<'a> FuncAt<'a, Block> {
    pub fn def(self) -> &'a BlockDef {
        &self.blocks[self.position]
    }

    pub fn at_insts(self) -> FuncAt<'a, &'a [Inst]> {
        self.at(&self.def().insts[..])
    }

    /// The phis at the start of this block (see [`InstKind::Phi`]).
    pub fn at_phis(self) -> FuncAt<'a, &'a [Inst]> {
        let insts = &self.def().insts[..];
        let phi_count = insts
            .iter()
            .take_while(|&&inst| matches!(self.insts[inst].kind, InstKind::Phi { .. }))
            .count();
        self.at(&insts[..phi_count])
    }
}

impl<'a> Iterator for FuncAt<'a, &'a [Inst]> {
    type Item = FuncAt<'a, Inst>;
    fn next(&mut self) -> Option<Self::Item> {
        let (&next, rest) = self.position.split_first()?;
        self.position = rest;
        Some(self.at(next))
    }
}

impl<'a> DoubleEndedIterator for FuncAt<'a, &'a [Inst]> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let (&prev, rest) = self.position.split_last()?;
        self.position = rest;
        Some(self.at(prev))
    }
}

impl<'a> FuncAt<'a, Inst> {
    pub fn def(self) -> &'a InstDef {
        &self.insts[self.position]
    }

    /// The `(predecessor, value)` records of this instruction, if it's a phi.
    pub fn phi_incoming(self) -> Option<&'a [(Block, Value)]> {
        match &self.def().kind {
            InstKind::Phi { incoming } => Some(incoming),
            InstKind::Mem(_) | InstKind::Call(_) | InstKind::Not | InstKind::Op(_) => None,
        }
    }
}

/// Mutable traversal (i.e. transforming) helper for intra-function entities.
///
/// The point/position type `P` should be an entity or a shallow entity wrapper.
pub struct FuncAtMut<'a, P: Copy> {
    pub blocks: &'a mut EntityDefs<Block>,
    pub insts: &'a mut EntityDefs<Inst>,

    pub position: P,
}

impl FuncAtMut<'_, Block> {
    /// Apply `f` to the `incoming` records of every phi at the start of this block.
    pub fn for_each_phi_incoming(self, mut f: impl FnMut(&mut SmallVec<[(Block, Value); 2]>)) {
        let FuncAtMut { blocks, insts, position: block } = self;
        for &inst in &blocks[block].insts {
            match &mut insts[inst].kind {
                InstKind::Phi { incoming } => f(incoming),
                InstKind::Mem(_) | InstKind::Call(_) | InstKind::Not | InstKind::Op(_) => break,
            }
        }
    }
}

impl FuncDefBody {
    /// Start immutably traversing the function at `position`.
    pub fn at<P: Copy>(&self, position: P) -> FuncAt<'_, P> {
        FuncAt { blocks: &self.blocks, insts: &self.insts, position }
    }

    /// Start mutably traversing the function at `position`.
    pub fn at_mut<P: Copy>(&mut self, position: P) -> FuncAtMut<'_, P> {
        FuncAtMut { blocks: &mut self.blocks, insts: &mut self.insts, position }
    }
}
