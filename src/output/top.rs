use std::{
    io,
    io::Write as _, // to get write_fmt, granting writeln!
};

use crate::analysis::Analysis;
use crate::graph::CallGraph;


///
/// Plain-text report, worst offender first:
///
/// ```text
/// >= 392 MAX
/// Peak   Local  Function
/// = 392  32     main
/// ...
/// ```
///
pub fn output_top(
    graph: &CallGraph,
    an: &Analysis,
    mut writer: impl io::Write,
) -> io::Result<()>
{
    if let Some(max) = an.max_of_all()
    {
        writeln!(writer, "{} MAX", max)?;
    }

    writeln!(writer, "Peak   Local  Function")?;

    let mut rows: Vec<_> = graph
        .nodes()
        .filter(|n| !n.dashed)
        .filter_map(|n| an.get(&n.id).map(|r| (r, n)))
        .collect();
    rows.sort_by(|a, b| b.0.bytes().cmp(&a.0.bytes()).then(a.1.id.cmp(&b.1.id)));

    for (result, node) in rows
    {
        writeln!(
            writer,
            "{:<6} {:<6} {}",
            result.max.to_string(),
            node.local.to_string(),
            rustc_demangle::demangle(&node.display),
        )?;
    }
    Ok(())
}


#[cfg(test)]
mod tests
{
    use super::*;
    use crate::graph::build;
    use crate::obj::{Definition, Extraction, RawCall, RawTarget};
    use crate::{FuncId, FuncStackInfo, Local};

    #[test]
    fn worst_first_and_max_line()
    {
        let infos = vec![
            FuncStackInfo
            {
                id:      FuncId::new("fw", "main"),
                display: "main".to_string(),
                local:   Local::Exact(32),
            },
            FuncStackInfo
            {
                id:      FuncId::new("fw", "leaf"),
                display: "leaf".to_string(),
                local:   Local::Exact(8),
            },
        ];
        let ex = Extraction
        {
            unit:    "fw".to_string(),
            defined: vec![
                Definition { name: "main".into(), key_name: "main".into() },
                Definition { name: "leaf".into(), key_name: "leaf".into() },
            ],
            calls: vec![RawCall
            {
                caller: "main".into(),
                target: RawTarget::Symbol("leaf".into()),
            }],
            diags: vec![],
        };
        let g = build(infos, vec![ex]);

        let mut buf = Vec::new();
        output_top(&g, g.analysis(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "= 40 MAX");
        assert!(lines[2].contains("main"));
        assert!(lines[3].contains("leaf"));
    }
}
