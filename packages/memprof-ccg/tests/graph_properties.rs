//! Property-based invariant tests
//!
//! Random small profiles must leave the graph consistent after the
//! full pipeline: node/edge id-set invariants hold, and every matched
//! callsite resolves to a single effective label.

use memprof_ccg::{
    AllocationType, CallsiteContextGraph, DisambiguationConfig, MibRecord, Module, ModuleCall,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn arb_chain() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(1u64..6, 1..4)
}

fn arb_mibs() -> impl Strategy<Value = Vec<(Vec<u64>, bool)>> {
    prop::collection::vec((arb_chain(), any::<bool>()), 1..5)
}

fn build_module(mibs: &[(Vec<u64>, bool)]) -> Module {
    let mut module = Module::new();
    let foo = module.add_function("foo");
    let main = module.add_function("main");

    let records: Vec<MibRecord> = mibs
        .iter()
        .map(|(chain, is_cold)| {
            let label = if *is_cold {
                AllocationType::Cold
            } else {
                AllocationType::NotCold
            };
            MibRecord::new(chain.clone(), label)
        })
        .collect();
    module.add_call(foo, ModuleCall::allocation(Vec::new(), records));

    // One call per distinct frame, plus one per full chain so the
    // inlined-sequence path (and chain duplication) gets exercised.
    let frames: BTreeSet<u64> = mibs.iter().flat_map(|(chain, _)| chain.iter().copied()).collect();
    for frame in frames {
        module.add_call(main, ModuleCall::callsite(foo, vec![frame]));
    }
    for (chain, _) in mibs {
        if chain.len() > 1 {
            module.add_call(main, ModuleCall::callsite(foo, chain.clone()));
        }
    }
    module
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_pipeline_preserves_invariants(mibs in arb_mibs()) {
        // verify_nodes checks the per-node id-set invariants at every
        // step of the cloning engine, verify_graph between stages; a
        // violation panics the test.
        let config = DisambiguationConfig::new()
            .with_verify_graph(true)
            .with_verify_nodes(true);
        let mut graph =
            CallsiteContextGraph::from_module(build_module(&mibs), &config).expect("build");
        graph.process(&config).expect("process");
        graph.verify();

        // Removal is all-or-nothing: an emptied node holds no edges.
        for id in 0..graph.node_count() {
            let node = graph.node(id);
            if node.is_removed() {
                prop_assert!(node.callee_edges.is_empty());
                prop_assert!(node.caller_edges.is_empty());
            } else {
                prop_assert!(!node.alloc_types.is_none());
            }
        }
    }

    #[test]
    fn prop_runs_are_deterministic(mibs in arb_mibs()) {
        let config = DisambiguationConfig::new();
        let run = |module: Module| {
            let mut graph = CallsiteContextGraph::from_module(module, &config).expect("build");
            graph.process(&config).expect("process");
            (format!("{graph}"), graph.into_source().into_module())
        };
        let (dump_a, module_a) = run(build_module(&mibs));
        let (dump_b, module_b) = run(build_module(&mibs));
        prop_assert_eq!(dump_a, dump_b);
        prop_assert_eq!(module_a, module_b);
    }
}
