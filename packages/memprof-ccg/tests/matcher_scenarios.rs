//! Callsite matching scenarios on the module flavor

mod common;

use common::{call, callee_name, cold, inlined_alloc};
use memprof_ccg::{CallInfo, CallsiteContextGraph, DisambiguationConfig, Module};

#[test]
fn test_duplicate_chains_get_disjoint_ids() {
    // Two distinct calls in main share the exact same inlined chain
    // [2, 1]. Each must land on its own synthesized node, with disjoint
    // context ids whose union covers the chain's original ids.
    let mut module = Module::new();
    let foo = module.add_function("foo");
    let main = module.add_function("main");
    let alloc_call = module.add_call(foo, inlined_alloc(&[9], vec![cold(&[9, 2, 1])]));
    let first = module.add_call(main, call(foo, &[2, 1]));
    let second = module.add_call(main, call(foo, &[2, 1]));

    let config = DisambiguationConfig::new().with_verify_graph(true);
    let mut graph = CallsiteContextGraph::from_module(module, &config).expect("build succeeds");

    let first_node = graph
        .get_node_for_inst(&CallInfo::new(first))
        .expect("first call matched");
    let second_node = graph
        .get_node_for_inst(&CallInfo::new(second))
        .expect("second call matched");
    assert_ne!(first_node, second_node);

    let first_ids = &graph.node(first_node).context_ids;
    let second_ids = &graph.node(second_node).context_ids;
    assert!(first_ids.is_disjoint(second_ids));

    let alloc_node = graph
        .get_node_for_inst(&CallInfo::new(alloc_call))
        .expect("alloc node");
    let union: std::collections::BTreeSet<u32> =
        first_ids.iter().chain(second_ids.iter()).copied().collect();
    let alloc_ids: std::collections::BTreeSet<u32> =
        graph.node(alloc_node).context_ids.iter().copied().collect();
    assert_eq!(union, alloc_ids);

    // The original interior chain nodes were drained into the
    // synthesized ones.
    let s1 = graph.get_node_for_stack_id(1).expect("node for frame 1");
    let s2 = graph.get_node_for_stack_id(2).expect("node for frame 2");
    assert!(graph.node(s1).is_removed());
    assert!(graph.node(s2).is_removed());

    graph.verify();
    graph.process(&config).expect("process succeeds");
}

#[test]
fn test_multi_target_callsite_neutralized() {
    // The call's actual callee (baz) disagrees with the function
    // enclosing the node's profiled callee (foo): the binding is
    // dropped and the call is never rewritten.
    let mut module = Module::new();
    let foo = module.add_function("foo");
    let main = module.add_function("main");
    let baz = module.add_function("baz");
    module.add_call(foo, inlined_alloc(&[9], vec![cold(&[9, 2])]));
    let indirect = module.add_call(main, call(baz, &[2]));

    let config = DisambiguationConfig::new().with_verify_graph(true);
    let mut graph = CallsiteContextGraph::from_module(module, &config).expect("build succeeds");

    assert!(graph.get_node_for_inst(&CallInfo::new(indirect)).is_none());
    let s2 = graph.get_node_for_stack_id(2).expect("node for frame 2");
    assert!(!graph.node(s2).has_call());

    let outcome = graph.process(&config).expect("process succeeds");
    assert_eq!(outcome.stats.node_clones, 0);
    let module = graph.into_source().into_module();
    assert_eq!(callee_name(&module, indirect), "baz");
}

#[test]
fn test_unmatched_outermost_frame_ignored() {
    // Frame 77 never appears in any MIB, so the call has no node to
    // match and is left alone.
    let mut module = Module::new();
    let foo = module.add_function("foo");
    let main = module.add_function("main");
    module.add_call(foo, inlined_alloc(&[9], vec![cold(&[9, 2])]));
    let unmatched = module.add_call(main, call(foo, &[77]));

    let config = DisambiguationConfig::new().with_verify_graph(true);
    let mut graph = CallsiteContextGraph::from_module(module, &config).expect("build succeeds");

    assert!(graph.get_node_for_inst(&CallInfo::new(unmatched)).is_none());
    graph.process(&config).expect("process succeeds");
    let module = graph.into_source().into_module();
    assert_eq!(callee_name(&module, unmatched), "foo");
}

#[test]
fn test_partial_chain_keeps_only_terminating_contexts() {
    // The call's outermost frame (5) has no node, and every context
    // reaching the matched chain [3, 2] continues outward past it;
    // matching the partial chain would catch unrelated longer
    // contexts, so the call stays unmatched.
    let mut module = Module::new();
    let foo = module.add_function("foo");
    let main = module.add_function("main");
    module.add_call(foo, inlined_alloc(&[9], vec![cold(&[9, 3, 2, 1])]));
    let partial = module.add_call(main, call(foo, &[3, 2, 5]));

    let config = DisambiguationConfig::new().with_verify_graph(true);
    let mut graph = CallsiteContextGraph::from_module(module, &config).expect("build succeeds");

    assert!(graph.get_node_for_inst(&CallInfo::new(partial)).is_none());
    graph.verify();
}
