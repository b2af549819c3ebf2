use serde::{Deserialize, Serialize};

use crate as c;
use crate::analysis::Analysis;
use crate::graph::CallGraph;
use crate::{Local, Max};




/*      ██████╗ ██╗███████╗███████╗      */
/*      ██╔══██╗██║██╔════╝██╔════╝      */
/*      ██║  ██║██║█████╗  █████╗        */
/*      ██║  ██║██║██╔══╝  ██╔══╝        */
/*      ██████╔╝██║██║     ██║           */
/*      ╚═════╝ ╚═╝╚═╝     ╚═╝           */
/*     ███████████████████████████╗      */
/*     ╚══════════════════════════╝      */

/// One function whose numbers moved between two builds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncDelta
{
    pub id:           c::FuncId,
    pub local_before: Local,
    pub local_after:  Local,
    pub peak_before:  Max,
    pub peak_after:   Max,
}

impl FuncDelta
{
    /// Peak growth in bytes; negative when the candidate got better.
    pub fn peak_delta(&self) -> i64
    {
        self.peak_after.bytes() as i64 - self.peak_before.bytes() as i64
    }

    pub fn local_delta(&self) -> i64
    {
        self.local_after.bound() as i64 - self.local_before.bound() as i64
    }
}

///
/// Differences between a baseline build and a candidate build.
/// Functions with identical local and peak numbers are omitted, so a
/// clean rebuild compares as empty.
///
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison
{
    pub changed: Vec<FuncDelta>,
    pub added:   Vec<c::FuncId>,
    pub removed: Vec<c::FuncId>,
}

impl Comparison
{
    pub fn is_empty(&self) -> bool
    {
        self.changed.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }
}

///
/// Line up two analyzed builds by function id.
///
/// Matching is exact `FuncId` equality: a function that moved to
/// another compilation unit shows up as removed plus added, not as
/// changed. Synthetic nodes (the indirect sentinel, external symbols)
/// are not build artifacts and are left out.
///
/// The analyses are taken as given, never recomputed here; results
/// deserialized from an earlier run work the same as fresh ones.
///
pub fn compare(
    base: &CallGraph,
    base_an: &Analysis,
    cand: &CallGraph,
    cand_an: &Analysis,
) -> Comparison
{
    let mut out = Comparison::default();

    for id in base.ids()
    {
        let b = match base.node(id)
        {
            Some(n) if !n.dashed => n,
            _                    => continue,
        };

        let c_node = match cand.node(id)
        {
            Some(n) if !n.dashed => n,
            _                    =>
            {
                out.removed.push(id.clone());
                continue;
            }
        };

        let (peak_b, peak_c) = match (base_an.get(id), cand_an.get(id))
        {
            (Some(rb), Some(rc)) => (rb.max, rc.max),
            // results that don't cover the graph they came with
            _                    => continue,
        };

        if b.local != c_node.local || peak_b != peak_c
        {
            out.changed.push(FuncDelta
            {
                id:           id.clone(),
                local_before: b.local,
                local_after:  c_node.local,
                peak_before:  peak_b,
                peak_after:   peak_c,
            });
        }
    }

    for id in cand.ids()
    {
        match cand.node(id)
        {
            Some(n) if !n.dashed => {}
            _                    => continue,
        }

        if base.node(id).map_or(true, |n| n.dashed)
        {
            out.added.push(id.clone());
        }
    }

    out
}
