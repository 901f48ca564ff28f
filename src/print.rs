//! Plain-text printing of [`FuncDefBody`]s (mostly for debugging and tests).
//!
//! The output lists blocks in definition order (i.e. blocks added by some
//! transform come last), and looks like this:
//!
//! ```text
//! entry:
//!   %x = load %param0
//!   br %c, a_boscc, merge
//! a_boscc:  // predicate: %p
//!   %boscc_test = call rv_any(%c)  // uni
//!   br %boscc_test, a, merge  // uni
//! ```
//!
//! Shapes (and predicates) are only included when printing with a
//! [`VectorizationInfo`] (see [`FuncPrinter::with_vec_info`]).

// FIXME(eddyb) stop using `itertools` for methods like `intersperse` when they
// get stabilized on `Iterator` instead.
#![allow(unstable_name_collisions)]
use itertools::Itertools as _;

use crate::cf::unstructured::ControlInstKind;
use crate::mem::MemOp;
use crate::vec_info::VectorizationInfo;
use crate::{Callee, EntityOrientedDenseMap, FuncDefBody, Inst, InstKind, Value};
use rustc_hash::FxHashSet;
use std::fmt::{self, Write as _};
use std::rc::Rc;

pub struct FuncPrinter<'a> {
    func: &'a FuncDefBody,
    vec_info: Option<&'a VectorizationInfo>,

    /// Unique (per-function) names for every instruction output, derived from
    /// the instruction's own name (if any), or its position otherwise.
    inst_names: EntityOrientedDenseMap<Inst, String>,
}

impl<'a> FuncPrinter<'a> {
    pub fn new(func: &'a FuncDefBody) -> Self {
        let all_insts = || func.blocks.iter().flat_map(|(_, block_def)| &block_def.insts).copied();

        // Generated names (`.N` suffixes, and `vN` for unnamed instructions)
        // must not collide with any name that is explicitly used.
        let explicit_names: FxHashSet<Rc<str>> =
            all_insts().filter_map(|inst| func.at(inst).def().name.clone()).collect();
        let mut used_names = FxHashSet::default();
        let mut anon_names = (0..).map(|i| format!("v{i}"));

        let mut inst_names = EntityOrientedDenseMap::new();
        for inst in all_insts() {
            let name = match &func.at(inst).def().name {
                Some(name) if used_names.insert(name.to_string()) => name.to_string(),
                Some(name) => fresh_name(
                    &explicit_names,
                    &mut used_names,
                    (1..).map(|i| format!("{name}.{i}")),
                ),
                None => fresh_name(&explicit_names, &mut used_names, &mut anon_names),
            };
            inst_names.insert(inst, name);
        }
        Self { func, vec_info: None, inst_names }
    }

    pub fn with_vec_info(self, vec_info: &'a VectorizationInfo) -> Self {
        Self { vec_info: Some(vec_info), ..self }
    }

    fn value(&self, value: Value) -> String {
        match value {
            Value::Const(c) => c.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Undef => "undef".into(),
            Value::FuncParam(idx) => format!("%param{idx}"),
            Value::InstOutput(inst) => format!("%{}", self.inst_names[inst]),
        }
    }

    fn values(&self, values: &[Value]) -> String {
        values.iter().map(|&v| self.value(v)).intersperse(", ".into()).collect()
    }

    fn inst(&self, inst: Inst) -> String {
        let func = self.func;
        let inst_def = func.at(inst).def();
        let inputs = &inst_def.inputs[..];
        let (has_output, body) = match &inst_def.kind {
            InstKind::Phi { incoming } => (
                true,
                "phi ".to_string()
                    + &incoming
                        .iter()
                        .map(|&(pred, v)| {
                            format!("[{}: {}]", func.blocks[pred].name, self.value(v))
                        })
                        .join(", "),
            ),
            InstKind::Mem(MemOp::Load) => (true, format!("load {}", self.values(inputs))),
            InstKind::Mem(MemOp::Store) => (false, format!("store {}", self.values(inputs))),
            InstKind::Call(Callee::Named(callee)) => {
                (true, format!("call {callee}({})", self.values(inputs)))
            }
            InstKind::Call(Callee::Indirect) => (
                true,
                format!("call_indirect {}({})", self.value(inputs[0]), self.values(&inputs[1..])),
            ),
            InstKind::Not => (true, format!("not {}", self.values(inputs))),
            InstKind::Op(op) => (true, format!("{op}({})", self.values(inputs))),
        };

        let mut line = if has_output {
            format!("{} = {body}", self.value(Value::InstOutput(inst)))
        } else {
            body
        };
        if let (true, Some(vec_info)) = (has_output, self.vec_info) {
            let _ = write!(line, "  // {}", vec_info.shape(Value::InstOutput(inst)));
        }
        line
    }
}

/// Pick the first of `candidates` that's neither explicitly used, nor used already.
fn fresh_name(
    explicit_names: &FxHashSet<Rc<str>>,
    used_names: &mut FxHashSet<String>,
    mut candidates: impl Iterator<Item = String>,
) -> String {
    candidates
        .find(|candidate| {
            !explicit_names.contains(&**candidate) && used_names.insert(candidate.clone())
        })
        .expect("print: ran out of candidate names")
}

impl fmt::Display for FuncPrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let func = self.func;
        for (block, block_def) in func.blocks.iter() {
            write!(f, "{}:", block_def.name)?;
            if let Some(predicate) = self.vec_info.and_then(|vec_info| vec_info.predicate(block)) {
                write!(f, "  // predicate: {}", self.value(predicate))?;
            }
            writeln!(f)?;

            for &inst in &block_def.insts {
                writeln!(f, "  {}", self.inst(inst))?;
            }

            let Some(control_inst) = func.cfg.control_inst_on_exit_from.get(block) else {
                writeln!(f, "  <missing terminator>")?;
                continue;
            };
            let targets = control_inst.targets.iter().map(|&t| &*func.blocks[t].name).join(", ");
            match control_inst.kind {
                ControlInstKind::Unreachable => write!(f, "  unreachable")?,
                ControlInstKind::Return => match control_inst.inputs.first() {
                    Some(&v) => write!(f, "  ret {}", self.value(v))?,
                    None => write!(f, "  ret")?,
                },
                ControlInstKind::Branch => write!(f, "  br {targets}")?,
                ControlInstKind::CondBranch => {
                    write!(f, "  br {}, {targets}", self.value(control_inst.inputs[0]))?;
                    if let Some(vec_info) = self.vec_info {
                        write!(f, "  // {}", vec_info.branch_shape(block, &func.cfg))?;
                    }
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
