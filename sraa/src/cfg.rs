use std::fmt::Write;

pub trait CfgBlock {
    type Operation;

    fn operations(&self) -> &[Self::Operation];
    fn successors(&self) -> &[usize];
    fn predecessors(&self) -> &[usize];
}

/// Block 0 is the entry.
pub trait ControlFlowGraph {
    type Block: CfgBlock;

    fn blocks(&self) -> &[Self::Block];
}

/// Blocks reachable from the entry, in reverse post-order.
pub fn reverse_post_order<Cfg: ControlFlowGraph>(cfg: &Cfg) -> Vec<usize> {
    let blocks = cfg.blocks();
    if blocks.is_empty() {
        return Vec::new();
    }
    let mut visited = vec![false; blocks.len()];
    let mut post_order = Vec::with_capacity(blocks.len());
    // Each entry is a block and the position of the next successor to try.
    let mut stack = vec![(0usize, 0usize)];
    visited[0] = true;
    while let Some((block, next)) = stack.pop() {
        let succs = blocks[block].successors();
        if next < succs.len() {
            stack.push((block, next + 1));
            let succ = succs[next];
            if !visited[succ] {
                visited[succ] = true;
                stack.push((succ, 0));
            }
        } else {
            post_order.push(block);
        }
    }
    post_order.reverse();
    post_order
}

/// Graphviz rendering of a CFG, `printer` renders the operations.
pub fn print<Cfg, OpPrinter>(name: &str, cfg: &Cfg, printer: OpPrinter) -> String
where
    Cfg: ControlFlowGraph,
    OpPrinter: Fn(&<<Cfg as ControlFlowGraph>::Block as CfgBlock>::Operation) -> String,
{
    let mut output = format!("digraph \"{name}\" {{\n");
    for (counter, block) in cfg.blocks().iter().enumerate() {
        write!(output, "  Node_{counter}[label=\"").expect("writing to a string");
        let text: Vec<_> = block.operations().iter().map(&printer).collect();
        output.push_str(&text.join("\\n"));
        output.push_str("\"]\n");
    }
    output.push('\n');
    for (counter, block) in cfg.blocks().iter().enumerate() {
        for next in block.successors() {
            writeln!(output, "  Node_{counter} -> Node_{next}").expect("writing to a string");
        }
    }
    output.push_str("}\n");
    output
}
