use std::collections::{HashMap, HashSet};

use log::info;
use petgraph::{algo, graph::NodeIndex, Direction};
use serde::{Deserialize, Serialize};

use crate as c;
use crate::graph::CallGraph;
use crate::Max;




/*      ██████╗ ███████╗ █████╗ ██╗  ██╗      */
/*      ██╔══██╗██╔════╝██╔══██╗██║ ██╔╝      */
/*      ██████╔╝█████╗  ███████║█████╔╝       */
/*      ██╔═══╝ ██╔══╝  ██╔══██║██╔═██╗       */
/*      ██║     ███████╗██║  ██║██║  ██╗      */
/*      ╚═╝     ╚══════╝╚═╝  ╚═╝╚═╝  ╚═╝      */
/*     ██████████████████████████████████╗    */
/*     ╚═══════════════════════════════════╝   */

/// Worst-case stack depth of one function, with one concrete call
/// chain that reaches it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakResult
{
    pub id:   c::FuncId,
    pub max:  Max,
    /// One maximizing chain, starting at `id`. Ties go to the first
    /// callee encountered during edge iteration.
    pub path: Vec<c::FuncId>,
}

impl PeakResult
{
    pub fn bytes(&self) -> u64
    {
        self.max.bytes()
    }

    /// True when the chain touches a dynamic frame, a cycle, an
    /// indirect call or an external symbol; `bytes()` is then a lower
    /// bound, not an exact worst case.
    pub fn has_unknown(&self) -> bool
    {
        self.max.is_lower_bound()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis
{
    /// One result per node, sorted by id.
    pub results: Vec<PeakResult>,
    /// Every SCC with a cycle in it (self-loop or larger), as found.
    pub cycles:  Vec<Vec<c::FuncId>>,
}

impl Analysis
{
    pub fn get(&self, id: &c::FuncId) -> Option<&PeakResult>
    {
        self.results
            .binary_search_by(|r| r.id.cmp(id))
            .ok()
            .map(|i| &self.results[i])
    }

    /// The program-wide worst case, if the graph had any node at all.
    pub fn max_of_all(&self) -> Option<Max>
    {
        c::max_of(self.results.iter().map(|r| r.max))
    }
}

///
/// Compute the worst-case stack depth of every function:
///
/// ```text
/// peak(f) = local(f) + max(0, max over callees g of peak(g))
/// ```
///
/// The graph may contain cycles, so the naive recursion is replaced by
/// Kosaraju SCCs processed callees-first. A cyclic SCC is unbounded in
/// principle; every member gets the saturating bound instead: the sum
/// of all member locals (one full traversal of the cycle) plus the
/// best peak reachable outside the SCC, always a `LowerBound`.
///
/// Indirect and external callees carry `Local::Unknown` and contribute
/// `LowerBound(0)`: no bytes, but they taint every path through them.
///
/// Prefer `CallGraph::analysis()`, which caches the result per graph.
///
pub fn analyze(cg: &CallGraph) -> Analysis
{
    let g = cg.graph();

    let mut interim: HashMap<NodeIndex, (Max, Vec<NodeIndex>)> = HashMap::new();
    let mut cycles: Vec<Vec<NodeIndex>> = Vec::new();

    // SCCs come out in reverse topological order, so every callee of an
    // SCC is resolved before the SCC itself
    for scc in algo::kosaraju_scc(g)
    {
        let first = scc[0];

        let is_a_cycle = scc.len() > 1
            || g.neighbors_directed(first, Direction::Outgoing)
                .any(|n| n == first);

        if is_a_cycle
        {
            info!(
                "cycle through {}",
                scc.iter()
                    .map(|ix| g[*ix].id.to_string())
                    .collect::<Vec<_>>()
                    .join(" -> ")
            );

            resolve_cycle(cg, &scc, &mut interim);
            cycles.push(scc);
        }
        else
        {
            resolve_node(cg, first, &mut interim);
        }
    }

    let mut results = interim
        .into_iter()
        .map(|(ix, (max, path))| PeakResult
        {
            id:   g[ix].id.clone(),
            max:  max,
            path: path.into_iter().map(|p| g[p].id.clone()).collect(),
        })
        .collect::<Vec<_>>();
    results.sort_by(|a, b| a.id.cmp(&b.id));

    Analysis
    {
        results: results,
        cycles:  cycles
            .into_iter()
            .map(|scc| scc.into_iter().map(|ix| g[ix].id.clone()).collect())
            .collect(),
    }
}

/// Acyclic case: all callees are already resolved.
fn resolve_node(
    cg: &CallGraph,
    node: NodeIndex,
    interim: &mut HashMap<NodeIndex, (Max, Vec<NodeIndex>)>,
)
{
    let g = cg.graph();

    let callees_max = c::max_of(
        g.neighbors_directed(node, Direction::Outgoing)
            .map(|nb| interim[&nb].0),
    );

    let entry = match callees_max
    {
        Some(max) =>
        {
            let chosen = g
                .neighbors_directed(node, Direction::Outgoing)
                .find(|nb| interim[nb].0.bytes() == max.bytes())
                .expect("UNREACHABLE");

            let mut path = vec![node];
            path.extend(interim[&chosen].1.iter().copied());
            (max + g[node].local, path)
        }
        None => (g[node].local.into(), vec![node]),
    };

    interim.insert(node, entry);
}

/// Cyclic case: the whole SCC gets one saturating bound.
fn resolve_cycle(
    cg: &CallGraph,
    scc: &[NodeIndex],
    interim: &mut HashMap<NodeIndex, (Max, Vec<NodeIndex>)>,
)
{
    let g = cg.graph();
    let members: HashSet<NodeIndex> = scc.iter().copied().collect();

    // one full traversal of the cycle; never exact
    let mut scc_local = Max::Exact(0);
    for &m in scc
    {
        scc_local = scc_local + g[m].local;
    }
    let scc_local = scc_local.saturate();

    // deepest continuation outside the SCC, reachable from any member
    let mut outside: Option<(Max, NodeIndex)> = None;
    for &m in scc
    {
        for nb in g.neighbors_directed(m, Direction::Outgoing)
        {
            if members.contains(&nb)
            {
                continue;
            }

            let cand = interim[&nb].0;
            outside = Some(match outside
            {
                Some((cur, _)) if cand.bytes() > cur.bytes() => (c::max(cur, cand), nb),
                Some((cur, ix))                              => (c::max(cur, cand), ix),
                None                                         => (cand, nb),
            });
        }
    }

    let total = match outside
    {
        Some((max, _)) => max + scc_local,
        None           => scc_local,
    };

    for &member in scc
    {
        let mut path = vec![member];
        path.extend(scc.iter().copied().filter(|&x| x != member));
        if let Some((_, nb)) = outside
        {
            path.extend(interim[&nb].1.iter().copied());
        }

        interim.insert(member, (total, path));
    }
}
