//! Implementation for generating a graphviz file for the control-flow graph.

use super::*;

// characters with a meaning inside graphviz record labels.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '{' | '}' | '|' | '<' | '>' | '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn dump_cfg(f: &Function, graph_type_and_name: &str) -> String {
    let mut edge_str = String::new();
    let mut node_str = String::new();
    let mut edge_style = "color=black";

    let mut worklist = vec![f.entry()];
    let mut visited = Set::<BlockId>::new();

    let f_id = &f.name;

    let mut gen_node = |bb: BlockId| {
        let block = &f[bb];
        let mut label = format!("{}:\\l", escape(block.label().name()));
        for inst in block.insts() {
            if !inst.is_label() {
                label.push_str(&format!("  {}\\l", escape(&inst.to_string())));
            }
        }
        if block.is_condition() {
            label = format!("{{{label}|{{<t>T|<f>F}}}}");
        }
        node_str.push_str(&format!(
            r#"
{f_id}__{bb} [label = "{label}"];
"#
        ));
    };

    let mut gen_edge = |from: String, to: BlockId| {
        edge_str.push_str(&format!(
            r#"
{f_id}__{from} -> {f_id}__{to} [{edge_style}];
"#
        ));
    };

    while let Some(bb) = worklist.pop() {
        if !visited.insert(bb) {
            continue;
        }
        gen_node(bb);

        match &f[bb] {
            Block::Sequential { next_block, .. } => {
                if let Some(next) = next_block {
                    gen_edge(bb.to_string(), *next);
                    worklist.push(*next);
                }
            }
            Block::Condition {
                taken,
                fall_through,
                ..
            } => {
                gen_edge(format!("{bb}:t"), *taken);
                gen_edge(format!("{bb}:f"), *fall_through);
                worklist.push(*fall_through);
                worklist.push(*taken);
            }
        }
    }

    edge_style = "color=gray style=dashed";

    let mut gen_edge = |from: BlockId, to: BlockId| {
        edge_str.push_str(&format!(
            r#"
{f_id}__{from} -> {f_id}__{to} [{edge_style}];
"#
        ));
    };

    for bb in visited {
        for &pred in f[bb].preds() {
            gen_edge(bb, pred);
        }
    }

    format!(
        r#"{graph_type_and_name} {{
label = "{f_id}";
node [shape=record nojustify=true];
{node_str}
{edge_str}
}}
"#
    )
}

pub fn dump_cfg_of_whole_program(cfg: &Cfg) -> String {
    let mut g = "digraph G {\n".to_string();

    for f in &cfg.functions {
        g.push_str(&dump_cfg(f, &format!("subgraph cluster_{}", f.name)));
    }

    g.push_str("\n}");

    g
}
