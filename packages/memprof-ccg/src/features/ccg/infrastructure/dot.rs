//! Dot export
//!
//! One file per stage, `{prefix}ccg.{stage}.dot`. Nodes are colored by
//! allocation type and clones drawn dashed; removed nodes are hidden.

use crate::errors::Result;
use crate::features::ccg::domain::graph::CallsiteContextGraph;
use crate::features::ccg::ports::CallsiteSource;
use crate::shared::models::{AllocTypes, ContextId};
use std::fmt::Write as _;
use std::path::Path;

fn color(alloc_types: AllocTypes) -> &'static str {
    match alloc_types {
        AllocTypes::NOT_COLD => "brown1",
        AllocTypes::COLD => "cyan",
        AllocTypes::BOTH => "mediumorchid1",
        _ => "gray",
    }
}

fn context_ids_label(ids: &rustc_hash::FxHashSet<ContextId>) -> String {
    if ids.len() >= 100 {
        return format!("({} ids)", ids.len());
    }
    let mut sorted: Vec<ContextId> = ids.iter().copied().collect();
    sorted.sort_unstable();
    sorted
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

impl<S: CallsiteSource> CallsiteContextGraph<S> {
    /// Write the graph to `{prefix}ccg.{stage}.dot`
    pub fn export_to_dot(&self, stage: &str, path_prefix: &Path) -> Result<()> {
        let mut out = String::new();
        writeln!(&mut out, "digraph CallsiteContextGraph {{").expect("string write");
        writeln!(&mut out, "\tlabel=\"{stage}\";").expect("string write");
        for id in 0..self.node_count() {
            let node = self.node(id);
            if node.is_removed() {
                continue;
            }
            let mut label = format!(
                "OrigId: {}{}\\n",
                if node.is_allocation { "Alloc" } else { "" },
                node.orig_stack_or_alloc_id
            );
            if let (Some(call), Some(&func)) =
                (node.call.call(), self.node_to_calling_func.get(&id))
            {
                label.push_str(&self.source.label(func, call, node.call.clone_no()));
            } else {
                label.push_str("null call");
                if node.recursive {
                    label.push_str(" (recursive)");
                } else {
                    label.push_str(" (external)");
                }
            }
            let style = if node.clone_of.is_some() {
                "filled,bold,dashed"
            } else {
                "filled"
            };
            writeln!(
                &mut out,
                "\tN{id} [shape=record,label=\"{label}\",tooltip=\"ContextIds: {}\",\
                 fillcolor=\"{}\",style=\"{style}\"];",
                context_ids_label(&node.context_ids),
                color(node.alloc_types)
            )
            .expect("string write");
        }
        for id in 0..self.node_count() {
            let node = self.node(id);
            if node.is_removed() {
                continue;
            }
            for &edge_id in &node.callee_edges {
                let edge = self.edge(edge_id);
                writeln!(
                    &mut out,
                    "\tN{} -> N{} [tooltip=\"ContextIds: {}\",fillcolor=\"{}\"];",
                    edge.caller,
                    edge.callee,
                    context_ids_label(&edge.context_ids),
                    color(edge.alloc_types)
                )
                .expect("string write");
            }
        }
        writeln!(&mut out, "}}").expect("string write");

        let mut file_name = path_prefix.as_os_str().to_os_string();
        file_name.push(format!("ccg.{stage}.dot"));
        std::fs::write(&file_name, out)?;
        Ok(())
    }
}
