use boscc::builder::FuncBuilder;
use boscc::cf::dom::{DominatorTree, PostDominatorTree};
use boscc::cf::loops::LoopInfo;
use boscc::cf::verify::verify_func;
use boscc::passes::boscc::{BosccConfig, BosccDecision, BosccTransform, SpeculatedBranch};
use boscc::platform::PlatformInfo;
use boscc::print::FuncPrinter;
use boscc::vec_info::{VectorRegion, VectorShape, VectorizationInfo};
use boscc::{Block, FuncDefBody, InstKind, Value};
use pretty_assertions::assert_eq;

/// A function, alongside all the analyses [`BosccTransform`] needs.
struct Setup {
    func: FuncDefBody,
    vec_info: VectorizationInfo,
    plat_info: PlatformInfo,
    dom_tree: DominatorTree,
    post_dom_tree: PostDominatorTree,
    loop_info: LoopInfo,
}

impl Setup {
    /// Whole-function vectorization, with `FuncParam(0)` varying, and every
    /// other function parameter uniform.
    fn new(func: FuncDefBody) -> Self {
        Self::with_region(func, |_| VectorRegion::WholeFunction)
    }

    fn with_region(func: FuncDefBody, region: impl FnOnce(&LoopInfo) -> VectorRegion) -> Self {
        let loop_info = LoopInfo::with_func(&func);
        let mut vec_info = VectorizationInfo::new(region(&loop_info), 8);
        vec_info.set_shape(Value::FuncParam(0), VectorShape::Varying);
        for idx in 1..4 {
            vec_info.set_shape(Value::FuncParam(idx), VectorShape::Uniform);
        }
        Self {
            dom_tree: DominatorTree::with_func(&func),
            post_dom_tree: PostDominatorTree::with_func(&func),
            loop_info,
            vec_info,
            plat_info: PlatformInfo::new(),
            func,
        }
    }

    fn transform(&mut self, config: BosccConfig) -> BosccTransform<'_> {
        BosccTransform::new(
            &mut self.func,
            &mut self.vec_info,
            &mut self.plat_info,
            &mut self.dom_tree,
            &mut self.post_dom_tree,
            &mut self.loop_info,
        )
        .with_config(config)
    }

    fn run(&mut self, config: BosccConfig) -> Vec<SpeculatedBranch> {
        let mut transform = self.transform(config);
        assert!(!transform.run());
        transform.report().to_vec()
    }

    fn targets(&self, block: Block) -> Vec<Block> {
        self.func.cfg.control_inst_on_exit_from[block].targets.to_vec()
    }

    fn phi_incoming(&self, phi: Value) -> Vec<(Block, Value)> {
        let Value::InstOutput(phi) = phi else { panic!("{phi:?} is not a phi") };
        self.func.at(phi).phi_incoming().unwrap().to_vec()
    }
}

struct Scenario {
    func: FuncDefBody,
    entry: Block,
    a: Block,
    c: Block,
    merge: Block,
    v1: Value,
    phi: Value,
}

/// `entry -> {a, merge}`, `a -> c -> merge`, with `a` and `c` both heavy
/// (`a`'s dominated region scoring `2 * 41`), and a phi in `merge`.
///
/// With `flip` set, `a` is the false side of the branch in `entry`.
fn scenario(flip: bool) -> Scenario {
    let mut b = FuncBuilder::new("entry");
    let entry = b.entry();
    let a = b.block("a");
    let c = b.block("c");
    let merge = b.block("merge");

    let cond = Value::FuncParam(0);
    if flip {
        b.cond_branch(entry, cond, merge, a);
    } else {
        b.cond_branch(entry, cond, a, merge);
    }
    b.filler(a, 40);
    b.branch(a, c);
    let v1 = b.op(c, "v1", "add", [Value::FuncParam(1), Value::Const(1)]);
    b.filler(c, 39);
    b.branch(c, merge);
    let phi = b.phi(merge, "x", [(c, v1), (entry, Value::Const(2))]);
    b.ret(merge, Some(phi));

    Scenario { func: b.finish(), entry, a, c, merge, v1, phi }
}

#[test]
fn guard_inserted_over_heavy_side() {
    let Scenario { func, entry, a, c, merge, v1, phi } = scenario(false);
    let mut setup = Setup::new(func);

    assert_eq!(
        setup.transform(BosccConfig::default()).decide(entry),
        BosccDecision::SpeculateTrueSide { score: 82 }
    );

    let report = setup.run(BosccConfig::default());
    assert_eq!(report.len(), 1);
    let guard = report[0].guard;
    assert_eq!((report[0].block, report[0].target, report[0].score), (entry, a, 82));
    assert_eq!(report[0].to_string(), "boscc: skip succ a of block entry  score: 82");

    assert_eq!(&*setup.func.blocks[guard].name, "a_boscc");
    assert_eq!(setup.targets(entry), [guard, merge]);
    assert_eq!(setup.targets(guard), [a, merge]);
    assert_eq!(setup.targets(c), [merge]);
    assert_eq!(
        setup.phi_incoming(phi),
        [(c, v1), (entry, Value::Const(2)), (guard, Value::Undef)]
    );

    assert!(setup.vec_info.is_boscc_guard(guard));
    assert!(setup.vec_info.branch_shape(guard, &setup.func.cfg).is_uniform());
    assert!(setup.dom_tree.dominates(guard, a));
    assert!(setup.dom_tree.dominates(guard, c));
    assert!(!setup.dom_tree.dominates(guard, merge));
    assert_eq!(setup.dom_tree.verify(&setup.func), Ok(()));
    assert_eq!(verify_func(&setup.func), Ok(()));

    // The post-dominator tree is recomputed, and so includes the guard.
    assert!(setup.post_dom_tree.contains(guard));
    assert!(setup.post_dom_tree.post_dominates(merge, guard));
    assert_eq!(setup.post_dom_tree.ipdom(guard), Some(merge));

    let decls: Vec<_> = setup.plat_info.mask_reductions().map(|d| &*d.name).collect();
    assert_eq!(decls, ["rv_any"]);
}

#[test]
fn false_side_guard_uses_negated_mask() {
    let Scenario { func, entry, a, merge, phi, .. } = scenario(true);
    let mut setup = Setup::new(func);

    let report = setup.run(BosccConfig::default());
    assert_eq!(report.len(), 1);
    let guard = report[0].guard;
    assert_eq!(setup.targets(entry), [merge, guard]);
    assert_eq!(setup.targets(guard), [a, merge]);

    let insts: Vec<_> = setup.func.at(guard).at_insts().map(|inst| inst.position).collect();
    let [neg, boscc_test] = insts[..] else { panic!("expected `neg` and `boscc_test`") };
    assert_eq!(setup.func.at(neg).def().kind, InstKind::Not);
    assert_eq!(setup.func.at(neg).def().inputs.as_slice(), [Value::FuncParam(0)]);
    assert_eq!(setup.func.at(boscc_test).def().inputs.as_slice(), [Value::InstOutput(neg)]);
    assert_eq!(setup.vec_info.shape(Value::InstOutput(neg)), VectorShape::Varying);

    assert_eq!(setup.phi_incoming(phi).last(), Some(&(guard, Value::Undef)));
    assert_eq!(setup.dom_tree.verify(&setup.func), Ok(()));
    assert_eq!(verify_func(&setup.func), Ok(()));
}

#[test]
fn second_run_inserts_nothing() {
    let Scenario { func, .. } = scenario(false);
    let mut setup = Setup::new(func);

    assert_eq!(setup.run(BosccConfig::default()).len(), 1);
    let block_count = setup.func.blocks.len();
    let printed = FuncPrinter::new(&setup.func).to_string();

    assert!(setup.run(BosccConfig::default()).is_empty());
    assert_eq!(setup.func.blocks.len(), block_count);
    assert_eq!(FuncPrinter::new(&setup.func).to_string(), printed);
    assert_eq!(setup.vec_info.boscc_guards().len(), 1);
}

#[test]
fn score_window() {
    let Scenario { func, .. } = scenario(false);

    let mut setup = Setup::new(func.clone());
    let config = BosccConfig { min_score: 83, ..BosccConfig::default() };
    assert!(setup.run(config).is_empty());

    let mut setup = Setup::new(func.clone());
    let config = BosccConfig { min_score: 0, max_score: 81 };
    assert!(setup.run(config).is_empty());

    let mut setup = Setup::new(func);
    let config = BosccConfig { min_score: 82, max_score: 82 };
    assert_eq!(setup.run(config).len(), 1);
}

#[test]
fn uniform_branches_are_left_alone() {
    let Scenario { func, entry, .. } = scenario(false);
    let mut setup = Setup::new(func);
    setup.vec_info.set_shape(Value::FuncParam(0), VectorShape::Uniform);
    assert!(setup.run(BosccConfig::default()).is_empty());

    // An explicit terminator shape overrides that of the condition.
    setup.vec_info.set_terminator_shape(entry, VectorShape::Varying);
    assert_eq!(setup.run(BosccConfig::default()).len(), 1);
}

#[test]
fn tied_sides_are_left_alone() {
    let mut b = FuncBuilder::new("entry");
    let entry = b.entry();
    let left = b.block("left");
    let right = b.block("right");
    let merge = b.block("merge");
    b.filler(left, 99);
    b.filler(right, 99);
    b.cond_branch(entry, Value::FuncParam(0), left, right);
    b.branch(left, merge);
    b.branch(right, merge);
    b.ret(merge, None);
    let mut setup = Setup::new(b.finish());

    assert_eq!(setup.transform(BosccConfig::default()).decide(entry), BosccDecision::DontSpeculate);
    assert!(setup.run(BosccConfig::default()).is_empty());
}

/// `entry -> {pre, header}`, `pre -> header`, with the loop being
/// `header -> body -> {heavy, latch}`, `heavy -> latch -> header`,
/// and `header -> exit` leaving the loop.
struct LoopScenario {
    func: FuncDefBody,
    entry: Block,
    header: Block,
    body: Block,
    heavy: Block,
    latch: Block,
}

fn loop_scenario() -> LoopScenario {
    let mut b = FuncBuilder::new("entry");
    let entry = b.entry();
    let pre = b.block("pre");
    let header = b.block("header");
    let body = b.block("body");
    let heavy = b.block("heavy");
    let latch = b.block("latch");
    let exit = b.block("exit");

    b.cond_branch(entry, Value::FuncParam(0), pre, header);
    b.filler(pre, 100);
    b.branch(pre, header);
    b.cond_branch(header, Value::FuncParam(1), body, exit);
    b.cond_branch(body, Value::FuncParam(0), heavy, latch);
    b.filler(heavy, 70);
    b.store(heavy, Value::FuncParam(2), Value::Const(0));
    b.branch(heavy, latch);
    b.branch(latch, header);
    b.ret(exit, None);

    LoopScenario { func: b.finish(), entry, header, body, heavy, latch }
}

#[test]
fn loop_region() {
    let LoopScenario { func, header, body, heavy, latch, .. } = loop_scenario();
    let mut setup = Setup::with_region(func, |loop_info| {
        VectorRegion::Loop(loop_info.loop_for(header).unwrap())
    });
    let lp = setup.loop_info.loop_for(header).unwrap();

    // Only `body` is both in the region, and ends in a divergent branch.
    let report = setup.run(BosccConfig::default());
    assert_eq!(report.len(), 1);
    let guard = report[0].guard;
    assert_eq!((report[0].block, report[0].target, report[0].score), (body, heavy, 72));

    assert_eq!(setup.loop_info.loop_for(guard), Some(lp));
    assert!(setup.vec_info.in_region(guard, &setup.loop_info));
    assert_eq!(setup.loop_info.latch(lp, &setup.func.cfg), Some(latch));
    assert_eq!(setup.targets(guard), [heavy, latch]);
    assert_eq!(setup.dom_tree.verify(&setup.func), Ok(()));
}

#[test]
fn whole_function_region_with_loop() {
    let LoopScenario { func, entry, body, .. } = loop_scenario();
    let mut setup = Setup::new(func);

    // `entry` branches into the loop (through `header`), so not even `pre`
    // (which is heavy enough) is speculated over, only `heavy` is.
    assert_eq!(
        setup.transform(BosccConfig::default()).decide(entry),
        BosccDecision::DontSpeculate
    );
    let report = setup.run(BosccConfig::default());
    let speculated: Vec<_> = report.iter().map(|r| (r.block, &*r.target_name, r.score)).collect();
    assert_eq!(speculated, [(body, "heavy", 72)]);
    assert_eq!(setup.dom_tree.verify(&setup.func), Ok(()));
    assert_eq!(verify_func(&setup.func), Ok(()));
}

#[test]
fn loop_exiting_branches_are_left_alone() {
    // entry -> header -> body -> {heavy, exit}, heavy -> latch -> header
    let mut b = FuncBuilder::new("entry");
    let entry = b.entry();
    let header = b.block("header");
    let body = b.block("body");
    let heavy = b.block("heavy");
    let latch = b.block("latch");
    let exit = b.block("exit");
    b.branch(entry, header);
    b.branch(header, body);
    b.cond_branch(body, Value::FuncParam(0), heavy, exit);
    b.filler(heavy, 100);
    b.branch(heavy, latch);
    b.branch(latch, header);
    b.ret(exit, None);
    let mut setup = Setup::new(b.finish());
    let block_count = setup.func.blocks.len();

    assert_eq!(setup.transform(BosccConfig::default()).decide(body), BosccDecision::DontSpeculate);
    assert!(setup.run(BosccConfig::default()).is_empty());
    assert_eq!(setup.func.blocks.len(), block_count);
    assert_eq!(setup.targets(body), [heavy, exit]);
}

#[test]
fn printed_after_transform() {
    let mut b = FuncBuilder::new("entry");
    let entry = b.entry();
    let a = b.block("a");
    let merge = b.block("merge");
    b.cond_branch(entry, Value::FuncParam(0), a, merge);
    b.filler(a, 3);
    b.branch(a, merge);
    let x = b.phi(merge, "x", [(a, Value::Const(1)), (entry, Value::Const(2))]);
    b.ret(merge, Some(x));
    let mut setup = Setup::new(b.finish());
    setup.vec_info.set_predicate(a, Value::FuncParam(0));

    let report = setup.run(BosccConfig { min_score: 2, ..BosccConfig::default() });
    assert_eq!(report.len(), 1);

    let expected = "\
entry:
  br %param0, a_boscc, merge  // varying
a:  // predicate: %param0
  %v0 = nop()  // varying
  %v1 = nop()  // varying
  %v2 = nop()  // varying
  br merge
merge:
  %x = phi [a: 1], [entry: 2], [a_boscc: undef]  // varying
  ret %x
a_boscc:  // predicate: %param0
  %boscc_test = call rv_any(%param0)  // uni
  br %boscc_test, a, merge  // uni
";
    assert_eq!(FuncPrinter::new(&setup.func).with_vec_info(&setup.vec_info).to_string(), expected);
}
