//! Function assignment scenarios on the module flavor

mod common;

use common::{callee_name, call, cold, inlined_alloc, not_cold};
use memprof_ccg::{
    AllocationType, CallRef, CallsiteContextGraph, DisambiguationConfig, Module,
};

#[test]
fn test_two_allocations_share_two_function_clones() {
    // Both allocations in foo split cold/not-cold along the same two
    // callers; one extra function clone suffices, with clone 0 carrying
    // the not-cold arm of each allocation and clone 1 the cold arm.
    let mut module = Module::new();
    let foo = module.add_function("foo");
    let main = module.add_function("main");
    let alloc_a = module.add_call(foo, inlined_alloc(&[1], vec![cold(&[1, 10]), not_cold(&[1, 11])]));
    let alloc_b = module.add_call(foo, inlined_alloc(&[2], vec![cold(&[2, 10]), not_cold(&[2, 11])]));
    let cold_caller = module.add_call(main, call(foo, &[10]));
    let warm_caller = module.add_call(main, call(foo, &[11]));

    let config = DisambiguationConfig::new().with_verify_graph(true).with_verify_nodes(true);
    let mut graph = CallsiteContextGraph::from_module(module, &config).expect("build succeeds");
    let outcome = graph.process(&config).expect("process succeeds");

    assert!(outcome.changed);
    assert_eq!(outcome.stats.function_clones, 1);
    assert_eq!(outcome.stats.node_clones, 2);

    let module = graph.into_source().into_module();
    assert_eq!(module.functions.len(), 3);
    let clone = module
        .function_by_name("foo.memprof.1")
        .expect("one clone of foo");

    assert_eq!(
        module.call(alloc_a).memprof_attribute,
        Some(AllocationType::NotCold)
    );
    assert_eq!(
        module.call(alloc_b).memprof_attribute,
        Some(AllocationType::NotCold)
    );
    assert_eq!(
        module.call(CallRef::new(clone, alloc_a.index)).memprof_attribute,
        Some(AllocationType::Cold)
    );
    assert_eq!(
        module.call(CallRef::new(clone, alloc_b.index)).memprof_attribute,
        Some(AllocationType::Cold)
    );

    assert_eq!(callee_name(&module, cold_caller), "foo.memprof.1");
    assert_eq!(callee_name(&module, warm_caller), "foo");
}

#[test]
fn test_redirect_creates_consistent_clone_mix() {
    // Three callers of E demand three different cold/not-cold
    // combinations across E's two allocations. Placing the third
    // combination forces a second function clone and redirects the
    // caller that was provisionally bound to the first clone, dragging
    // its other callsite along.
    let mut module = Module::new();
    let e = module.add_function("E");
    let b = module.add_function("B");
    let c = module.add_function("C");
    let d = module.add_function("D");
    let alloc1 = module.add_call(
        e,
        inlined_alloc(&[1], vec![cold(&[1, 10]), not_cold(&[1, 11]), cold(&[1, 12])]),
    );
    let alloc2 = module.add_call(
        e,
        inlined_alloc(&[2], vec![not_cold(&[2, 10]), cold(&[2, 11]), cold(&[2, 12])]),
    );
    let call_b = module.add_call(b, call(e, &[10]));
    let call_c = module.add_call(c, call(e, &[11]));
    let call_d = module.add_call(d, call(e, &[12]));

    let config = DisambiguationConfig::new().with_verify_graph(true).with_verify_nodes(true);
    let mut graph = CallsiteContextGraph::from_module(module, &config).expect("build succeeds");
    let outcome = graph.process(&config).expect("process succeeds");

    assert!(outcome.changed);
    assert_eq!(outcome.stats.function_clones, 2);

    let module = graph.into_source().into_module();
    assert_eq!(module.functions.len(), 6);
    let e1 = module.function_by_name("E.memprof.1").expect("first clone");
    let e2 = module.function_by_name("E.memprof.2").expect("second clone");

    // Each caller resolves to the version carrying its combination.
    assert_eq!(callee_name(&module, call_b), "E.memprof.1");
    assert_eq!(callee_name(&module, call_c), "E");
    assert_eq!(callee_name(&module, call_d), "E.memprof.2");

    // Original: (not-cold, cold); clone 1: (cold, not-cold);
    // clone 2: (cold, cold).
    let attr = |func, index: CallRef| module.call(CallRef::new(func, index.index)).memprof_attribute;
    assert_eq!(attr(e, alloc1), Some(AllocationType::NotCold));
    assert_eq!(attr(e, alloc2), Some(AllocationType::Cold));
    assert_eq!(attr(e1, alloc1), Some(AllocationType::Cold));
    assert_eq!(attr(e1, alloc2), Some(AllocationType::NotCold));
    assert_eq!(attr(e2, alloc1), Some(AllocationType::Cold));
    assert_eq!(attr(e2, alloc2), Some(AllocationType::Cold));
}
