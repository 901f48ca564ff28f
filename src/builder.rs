//! Incremental construction of [`FuncDefBody`]s.
//!
//! Mostly meant for tests and small hand-written inputs, the builder allocates
//! blocks and instructions in definition order, and leaves it to the user to
//! attach a terminator to every block before calling [`FuncBuilder::finish`].

use crate::cf::unstructured::{ControlFlowGraph, ControlInst};
use crate::mem::MemOp;
use crate::{Block, BlockDef, Callee, EntityDefs, FuncDefBody, InstDef, InstKind, Value, cf};
use smallvec::SmallVec;
use std::rc::Rc;

pub struct FuncBuilder {
    func: FuncDefBody,
}

impl FuncBuilder {
    pub fn new(entry_name: &str) -> Self {
        let mut blocks = EntityDefs::new();
        let entry = blocks.define(BlockDef { name: entry_name.into(), insts: vec![] });
        Self {
            func: FuncDefBody {
                blocks,
                insts: EntityDefs::new(),
                entry,
                cfg: ControlFlowGraph::default(),
            },
        }
    }

    pub fn entry(&self) -> Block {
        self.func.entry
    }

    pub fn block(&mut self, name: &str) -> Block {
        self.func.new_block(name)
    }

    fn inst(
        &mut self,
        block: Block,
        name: Option<&str>,
        kind: InstKind,
        inputs: impl IntoIterator<Item = Value>,
    ) -> Value {
        let inst = self.func.append_inst(
            block,
            InstDef { name: name.map(Rc::from), kind, inputs: inputs.into_iter().collect() },
        );
        Value::InstOutput(inst)
    }

    /// Append a phi to `block`, which must not contain any non-phi instructions yet.
    #[track_caller]
    pub fn phi(
        &mut self,
        block: Block,
        name: &str,
        incoming: impl IntoIterator<Item = (Block, Value)>,
    ) -> Value {
        assert!(
            self.func.phis(block).count() == self.func.blocks[block].insts.len(),
            "FuncBuilder::phi: phis must precede all other instructions"
        );
        let incoming: SmallVec<_> = incoming.into_iter().collect();
        self.inst(block, Some(name), InstKind::Phi { incoming }, [])
    }

    pub fn load(&mut self, block: Block, name: &str, ptr: Value) -> Value {
        self.inst(block, Some(name), InstKind::Mem(MemOp::Load), [ptr])
    }

    pub fn store(&mut self, block: Block, ptr: Value, value: Value) {
        self.inst(block, None, InstKind::Mem(MemOp::Store), [ptr, value]);
    }

    pub fn call(
        &mut self,
        block: Block,
        name: &str,
        callee: &str,
        args: impl IntoIterator<Item = Value>,
    ) -> Value {
        self.inst(block, Some(name), InstKind::Call(Callee::Named(callee.into())), args)
    }

    pub fn call_indirect(
        &mut self,
        block: Block,
        name: &str,
        fn_ptr: Value,
        args: impl IntoIterator<Item = Value>,
    ) -> Value {
        let inputs = std::iter::once(fn_ptr).chain(args);
        self.inst(block, Some(name), InstKind::Call(Callee::Indirect), inputs)
    }

    pub fn not(&mut self, block: Block, name: &str, input: Value) -> Value {
        self.inst(block, Some(name), InstKind::Not, [input])
    }

    pub fn op(
        &mut self,
        block: Block,
        name: &str,
        op: &str,
        inputs: impl IntoIterator<Item = Value>,
    ) -> Value {
        self.inst(block, Some(name), InstKind::Op(op.into()), inputs)
    }

    /// Append `count` opaque (and otherwise unused) instructions to `block`.
    pub fn filler(&mut self, block: Block, count: usize) {
        for _ in 0..count {
            self.inst(block, None, InstKind::Op("nop".into()), []);
        }
    }

    #[track_caller]
    fn terminate(&mut self, block: Block, control_inst: ControlInst) {
        let previous = self.func.cfg.control_inst_on_exit_from.insert(block, control_inst);
        assert!(previous.is_none(), "FuncBuilder: {block:?} already has a terminator");
    }

    #[track_caller]
    pub fn branch(&mut self, block: Block, target: Block) {
        self.terminate(block, ControlInst::branch(target));
    }

    #[track_caller]
    pub fn cond_branch(&mut self, block: Block, cond: Value, on_true: Block, on_false: Block) {
        self.terminate(block, ControlInst::cond_branch(cond, on_true, on_false));
    }

    #[track_caller]
    pub fn ret(&mut self, block: Block, value: Option<Value>) {
        self.terminate(block, ControlInst::ret(value));
    }

    /// Complete the function, panicking if it's not well-formed
    /// (see [`cf::verify::verify_func`]).
    #[track_caller]
    pub fn finish(self) -> FuncDefBody {
        if let Err(e) = cf::verify::verify_func(&self.func) {
            panic!("FuncBuilder::finish: {e}");
        }
        self.func
    }
}
