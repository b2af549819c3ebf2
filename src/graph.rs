use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;

use log::warn;
use petgraph::graph::{DiGraph, NodeIndex};

use crate as c;
use crate::analysis::{self, Analysis};
use crate::obj::{self, Extraction, RawTarget};
use crate::Diag;

/// Display name of the synthetic node every indirect call points at.
pub const INDIRECT_SENTINEL: &str = "?";




/*       ██████╗ ██████╗  █████╗ ██████╗ ██╗  ██╗      */
/*      ██╔════╝ ██╔══██╗██╔══██╗██╔══██╗██║  ██║      */
/*      ██║  ███╗██████╔╝███████║██████╔╝███████║      */
/*      ██║   ██║██╔══██╗██╔══██║██╔═══╝ ██╔══██║      */
/*      ╚██████╔╝██║  ██║██║  ██║██║     ██║  ██║      */
/*       ╚═════╝ ╚═╝  ╚═╝╚═╝  ╚═╝╚═╝     ╚═╝  ╚═╝      */
/*     █████████████████████████████████████████╗      */
/*     ╚════════════════════════════════════════╝      */

///
/// The merged call graph of one analysis run. Immutable once built;
/// the peak-stack analysis is memoized per instance.
///
#[derive(Debug)]
pub struct CallGraph
{
    g:          DiGraph<c::Node, c::CallKind>,
    indices:    BTreeMap<c::FuncId, NodeIndex>,
    unresolved: BTreeSet<String>,
    diags:      Vec<Diag>,

    analysis:   OnceLock<Analysis>,
}

///
/// Merge stack-usage records and extracted call sites into one graph.
///
/// Merge rules:
/// - duplicate record for one id: the later record wins, diagnosed;
/// - a defined function without a record gets `Local::Unknown`;
/// - a record without a matching dump still gets a node;
/// - a callee matched nowhere becomes an external node and lands in
///   `unresolved`;
/// - every indirect call site gets an edge to one synthetic sentinel.
///
/// No call site is dropped: every parsed site is an edge in the result.
///
pub fn build(stack_infos: Vec<c::FuncStackInfo>, extractions: Vec<Extraction>) -> CallGraph
{
    let mut gb = CallGraph
    {
        g:          DiGraph::new(),
        indices:    BTreeMap::new(),
        unresolved: BTreeSet::new(),
        diags:      Vec::new(),
        analysis:   OnceLock::new(),
    };

    let mut records: BTreeMap<c::FuncId, c::FuncStackInfo> = BTreeMap::new();
    for info in stack_infos
    {
        if let Some(earlier) = records.insert(info.id.clone(), info)
        {
            warn!("duplicate stack-usage record for `{}`", earlier.id);
            gb.diags.push(Diag::DuplicateRecord(earlier.id));
        }
    }

    // key name -> every unit that defines it, for callee resolution
    let mut defined_in: BTreeMap<String, BTreeSet<c::FuncId>> = BTreeMap::new();

    for ex in &extractions
    {
        for def in &ex.defined
        {
            let id = c::FuncId::new(&ex.unit, &def.key_name);

            let local = match records.get(&id)
            {
                Some(rec) => rec.local,
                None      =>
                {
                    warn!("no stack usage information for `{}`", id);
                    c::Local::Unknown
                }
            };

            gb.add_node(c::Node(id.clone(), def.name.clone(), local, false));
            defined_in.entry(def.key_name.clone()).or_default().insert(id);
        }
    }

    // records whose unit never produced a dump still count
    for (id, rec) in &records
    {
        if !gb.indices.contains_key(id)
        {
            gb.add_node(c::Node(id.clone(), rec.display.clone(), rec.local, false));
            defined_in.entry(id.name.clone()).or_default().insert(id.clone());
        }
    }

    let mut sentinel: Option<NodeIndex> = None;
    // (caller, callee) -> edge, for dedup
    let mut seen: HashMap<(NodeIndex, NodeIndex), petgraph::graph::EdgeIndex> = HashMap::new();

    for ex in extractions
    {
        gb.diags.extend(ex.diags);

        for call in ex.calls
        {
            let caller_id = c::FuncId::new(&ex.unit, &call.caller);
            let caller = match gb.indices.get(&caller_id)
            {
                Some(ix) => *ix,
                None     => continue, // caller was filtered out of `defined`
            };

            let (callee, kind) = match &call.target
            {
                RawTarget::Indirect =>
                {
                    let ix = *sentinel.get_or_insert_with(||
                    {
                        gb.g.add_node(c::Node(
                            c::FuncId::external(INDIRECT_SENTINEL),
                            INDIRECT_SENTINEL.to_string(),
                            c::Local::Unknown,
                            true,
                        ))
                    });
                    (ix, c::CallKind::Indirect)
                }

                RawTarget::Symbol(name) => gb.resolve(name, &ex.unit, &defined_in),
            };

            if let Some(&eix) = seen.get(&(caller, callee))
            {
                // keep the most specific kind for a repeated pair
                if kind.specificity() > gb.g[eix].specificity()
                {
                    gb.g[eix] = kind;
                }
            }
            else
            {
                let eix = gb.g.add_edge(caller, callee, kind);
                seen.insert((caller, callee), eix);
            }
        }
    }

    gb
}

impl CallGraph
{
    fn add_node(&mut self, node: c::Node) -> NodeIndex
    {
        match self.indices.get(&node.id)
        {
            Some(ix) => *ix,
            None     =>
            {
                let id = node.id.clone();
                let ix = self.g.add_node(node);
                self.indices.insert(id, ix);
                ix
            }
        }
    }

    ///
    /// Match a callee name against the defined set: the caller's own
    /// unit first, then a unique definition anywhere, then the same
    /// again with clone decorations stripped. A name defined in several
    /// other units resolves to the first id in key order, diagnosed.
    /// A name defined nowhere becomes an external node.
    ///
    fn resolve(
        &mut self,
        name: &str,
        unit: &str,
        defined_in: &BTreeMap<String, BTreeSet<c::FuncId>>,
    ) -> (NodeIndex, c::CallKind)
    {
        for key in [name, obj::strip_decorations(name)]
        {
            let same_unit = c::FuncId::new(unit, key);
            if let Some(ix) = self.indices.get(&same_unit)
            {
                return (*ix, c::CallKind::Direct);
            }

            if let Some(units) = defined_in.get(key)
            {
                let chosen = units.iter().next().cloned();
                if let Some(chosen) = chosen
                {
                    if units.len() > 1
                    {
                        warn!("`{}` is defined in {} units", key, units.len());
                        self.diags.push(Diag::AmbiguousSymbol
                        {
                            name:   key.to_string(),
                            chosen: chosen.clone(),
                        });
                    }
                    return (self.indices[&chosen], c::CallKind::Direct);
                }
            }
        }

        // outside the analyzed set: keep the edge, flag the name
        if self.unresolved.insert(name.to_string())
        {
            self.diags.push(Diag::UnresolvedSymbol(name.to_string()));
        }
        let ix = self.add_node(c::Node(
            c::FuncId::external(name),
            name.to_string(),
            c::Local::Unknown,
            true,
        ));
        (ix, c::CallKind::External)
    }

    pub fn graph(&self) -> &DiGraph<c::Node, c::CallKind>
    {
        &self.g
    }

    pub fn node(&self, id: &c::FuncId) -> Option<&c::Node>
    {
        self.indices.get(id).map(|ix| &self.g[*ix])
    }

    pub fn index_of(&self, id: &c::FuncId) -> Option<NodeIndex>
    {
        self.indices.get(id).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &c::Node>
    {
        self.g.node_weights()
    }

    /// All node ids in key order.
    pub fn ids(&self) -> impl Iterator<Item = &c::FuncId>
    {
        self.indices.keys()
    }

    pub fn len(&self) -> usize
    {
        self.g.node_count()
    }

    pub fn is_empty(&self) -> bool
    {
        self.g.node_count() == 0
    }

    /// Re-derive the stack-usage records this graph was built from
    /// (synthetic and record-less nodes excluded).
    pub fn stack_infos(&self) -> Vec<c::FuncStackInfo>
    {
        self.g
            .node_weights()
            .filter(|n| !n.dashed && n.local != c::Local::Unknown)
            .map(|n| c::FuncStackInfo
            {
                id:      n.id.clone(),
                display: n.display.clone(),
                local:   n.local,
            })
            .collect()
    }

    /// Every edge as (caller, callee, kind), in insertion order.
    pub fn call_edges(&self) -> Vec<(c::FuncId, c::FuncId, c::CallKind)>
    {
        self.g
            .edge_indices()
            .map(|eix|
            {
                let (s, t) = self.g.edge_endpoints(eix).expect("edge without endpoints");
                (self.g[s].id.clone(), self.g[t].id.clone(), self.g[eix])
            })
            .collect()
    }

    pub fn unresolved(&self) -> &BTreeSet<String>
    {
        &self.unresolved
    }

    pub fn diags(&self) -> &[Diag]
    {
        &self.diags
    }

    /// Peak-stack results, computed on first use and cached for the
    /// lifetime of the graph.
    pub fn analysis(&self) -> &Analysis
    {
        self.analysis.get_or_init(|| analysis::analyze(self))
    }
}


#[cfg(test)]
mod tests
{
    use super::*;
    use crate::obj::{Definition, RawCall};
    use crate::{CallKind, FuncId, FuncStackInfo, Local};
    use pretty_assertions::assert_eq;

    fn info(unit: &str, name: &str, local: Local) -> FuncStackInfo
    {
        FuncStackInfo
        {
            id:      FuncId::new(unit, name),
            display: name.to_string(),
            local:   local,
        }
    }

    fn def(name: &str) -> Definition
    {
        Definition { name: name.to_string(), key_name: name.to_string() }
    }

    fn call(caller: &str, callee: &str) -> RawCall
    {
        RawCall
        {
            caller: caller.to_string(),
            target: RawTarget::Symbol(callee.to_string()),
        }
    }

    #[test]
    fn merge_and_roundtrip()
    {
        let infos = vec![
            info("main.o", "main", Local::Exact(32)),
            info("main.o", "helper", Local::Exact(8)),
            info("lonely.o", "isr", Local::Exact(16)),
        ];
        let ex = Extraction
        {
            unit:    "main.o".to_string(),
            defined: vec![def("main"), def("helper")],
            calls:   vec![call("main", "helper")],
            diags:   vec![],
        };

        let g = build(infos.clone(), vec![ex]);

        assert_eq!(g.len(), 3);
        assert!(g.diags().is_empty());

        let mut got = g.stack_infos();
        got.sort_by(|a, b| a.id.cmp(&b.id));
        let mut want = infos;
        want.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(got, want);

        assert_eq!(
            g.call_edges(),
            vec![(
                FuncId::new("main.o", "main"),
                FuncId::new("main.o", "helper"),
                CallKind::Direct,
            )]
        );
    }

    #[test]
    fn later_duplicate_record_wins()
    {
        let infos = vec![
            info("a.o", "f", Local::Exact(8)),
            info("a.o", "f", Local::Exact(24)),
        ];
        let g = build(infos, vec![]);

        assert_eq!(g.node(&FuncId::new("a.o", "f")).unwrap().local, Local::Exact(24));
        assert_eq!(g.diags(), &[Diag::DuplicateRecord(FuncId::new("a.o", "f"))]);
    }

    #[test]
    fn unmatched_callee_is_external_not_dropped()
    {
        let ex = Extraction
        {
            unit:    "a.o".to_string(),
            defined: vec![def("f")],
            calls:   vec![call("f", "memcpy")],
            diags:   vec![],
        };
        let g = build(vec![info("a.o", "f", Local::Exact(8))], vec![ex]);

        assert!(g.unresolved().contains("memcpy"));
        let edges = g.call_edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].1, FuncId::external("memcpy"));
        assert_eq!(edges[0].2, CallKind::External);
        assert!(g.node(&FuncId::external("memcpy")).unwrap().dashed);
    }

    #[test]
    fn indirect_calls_share_one_sentinel()
    {
        let ex = Extraction
        {
            unit:    "a.o".to_string(),
            defined: vec![def("f"), def("g")],
            calls:   vec![
                RawCall { caller: "f".into(), target: RawTarget::Indirect },
                RawCall { caller: "g".into(), target: RawTarget::Indirect },
                RawCall { caller: "f".into(), target: RawTarget::Indirect },
            ],
            diags:   vec![],
        };
        let g = build(vec![], vec![ex]);

        let edges = g.call_edges();
        assert_eq!(edges.len(), 2); // f and g, deduplicated
        assert!(edges.iter().all(|(_, t, k)| {
            *t == FuncId::external(INDIRECT_SENTINEL) && *k == CallKind::Indirect
        }));
    }

    #[test]
    fn same_unit_beats_other_units()
    {
        let a = Extraction
        {
            unit:    "a.o".to_string(),
            defined: vec![def("init"), def("run")],
            calls:   vec![call("run", "init")],
            diags:   vec![],
        };
        let b = Extraction
        {
            unit:    "b.o".to_string(),
            defined: vec![def("init")],
            calls:   vec![],
            diags:   vec![],
        };
        let g = build(vec![], vec![a, b]);

        let edges = g.call_edges();
        assert_eq!(edges[0].1, FuncId::new("a.o", "init"));
        // no ambiguity diag: the caller's own unit settles it
        assert!(g.diags().is_empty());
    }

    #[test]
    fn cross_unit_ambiguity_is_diagnosed()
    {
        let a = Extraction
        {
            unit:    "a.o".to_string(),
            defined: vec![def("handler")],
            calls:   vec![],
            diags:   vec![],
        };
        let b = Extraction
        {
            unit:    "b.o".to_string(),
            defined: vec![def("handler")],
            calls:   vec![],
            diags:   vec![],
        };
        let main = Extraction
        {
            unit:    "main.o".to_string(),
            defined: vec![def("main")],
            calls:   vec![call("main", "handler")],
            diags:   vec![],
        };
        let g = build(vec![], vec![a, b, main]);

        // first unit in key order
        assert_eq!(g.call_edges()[0].1, FuncId::new("a.o", "handler"));
        assert_eq!(
            g.diags(),
            &[Diag::AmbiguousSymbol
            {
                name:   "handler".to_string(),
                chosen: FuncId::new("a.o", "handler"),
            }]
        );
    }

    #[test]
    fn decorated_callee_resolves_to_stripped_definition()
    {
        let ex = Extraction
        {
            unit:    "uart.c.obj".to_string(),
            defined: vec![
                Definition { name: "put.constprop.0".into(), key_name: "put".into() },
                def("send"),
            ],
            calls:   vec![call("send", "put.constprop.0")],
            diags:   vec![],
        };
        let g = build(vec![], vec![ex]);

        assert_eq!(g.call_edges()[0].1, FuncId::new("uart.c.obj", "put"));
        assert!(g.unresolved().is_empty());
    }
}
