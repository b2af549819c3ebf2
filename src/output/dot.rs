use petgraph::visit::EdgeRef;
use std::{
    io,
    io::Write as _, // to get write_fmt, granting writeln!
};

use crate as c;
use crate::analysis::Analysis;
use crate::graph::CallGraph;
use crate::output::escape;



///
/// Graphviz rendering of the whole graph: one box per function with
/// its peak and local usage, dashed boxes for synthetic nodes, dashed
/// clusters around every cycle.
///
pub fn output_dot(
    graph: &CallGraph,
    an: &Analysis,
    mut writer: impl io::Write,
    dc: DotConf,
) -> io::Result<()>
{
    let g = graph.graph();

    writeln!(writer, "digraph {{")?;
    writeln!(writer, "    node [fontname={} shape=box]", &dc.font)?;

    for (i, node) in g.raw_nodes().iter().enumerate() {
        let node = &node.weight;

        write!(
            writer,
            "    {} [label=\"{}",
            i,
            escape(&rustc_demangle::demangle(&node.display).to_string()),
        )?;

        if let Some(result) = an.get(&node.id) {
            write!(writer, "\\nmax {}", result.max)?;
        }

        write!(writer, "\\nlocal = {}\"", node.local,)?;

        if node.dashed {
            write!(writer, " style=dashed")?;
        }

        writeln!(writer, "]")?;
    }

    for edge in g.edge_references() {
        write!(
            writer,
            "    {} -> {}",
            edge.source().index(),
            edge.target().index()
        )?;

        match edge.weight() {
            c::CallKind::Direct   => writeln!(writer)?,
            c::CallKind::Indirect => writeln!(writer, " [style=dotted]")?,
            c::CallKind::External => writeln!(writer, " [style=dashed]")?,
        }
    }

    for (i, cycle) in an.cycles.iter().enumerate() {
        writeln!(writer, "\n    subgraph cluster_{} {{", i)?;
        writeln!(writer, "        style=dashed")?;
        writeln!(writer, "        fontname={}", &dc.font)?;
        writeln!(writer, "        label=\"SCC{}\"", i)?;

        for id in cycle {
            if let Some(ix) = graph.index_of(id) {
                writeln!(writer, "        {}", ix.index())?;
            }
        }

        writeln!(writer, "    }}")?;
    }

    writeln!(writer, "}}")?;

    Ok(())
}



pub struct DotConf
{
    pub font: String,
}

impl Default for DotConf
{
    fn default() -> Self
    {
        DotConf
        {
            font: "monospace".to_string(),
        }
    }
}
