
#![allow(clippy::redundant_field_names)]

pub mod su;
pub mod obj;
pub mod graph;
pub mod analysis;
pub mod compare;
pub mod inp;
pub mod output;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use core::fmt;
use core::{ops, cmp};




/*      ██╗██████╗       */
/*      ██║██╔══██╗      */
/*      ██║██║  ██║      */
/*      ██║██║  ██║      */
/*      ██║██████╔╝      */
/*      ╚═╝╚═════╝       */
/*     ████████████╗     */
/*     ╚═══════════╝     */

///
/// Canonical identity of a function: symbol name plus the compilation
/// unit it came from. Two static functions with the same name in two
/// different objects get two distinct ids.
///
/// External symbols (referenced but never defined in the analyzed set)
/// carry an empty `unit`.
///
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FuncId
{
    pub unit: String,
    pub name: String,
}

impl FuncId
{
    pub fn new(unit: impl Into<String>, name: impl Into<String>) -> Self
    {
        FuncId { unit: unit.into(), name: name.into() }
    }

    pub fn external(name: impl Into<String>) -> Self
    {
        FuncId { unit: String::new(), name: name.into() }
    }

    pub fn is_external(&self) -> bool
    {
        self.unit.is_empty()
    }
}

impl fmt::Display for FuncId
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        if self.unit.is_empty()
        {
            f.write_str(&self.name)
        }
        else
        {
            write!(f, "{}:{}", self.unit, self.name)
        }
    }
}




/*      ██╗      ██████╗  ██████╗ █████╗ ██╗           */
/*      ██║     ██╔═══██╗██╔════╝██╔══██╗██║           */
/*      ██║     ██║   ██║██║     ███████║██║           */
/*      ██║     ██║   ██║██║     ██╔══██║██║           */
/*      ███████╗╚██████╔╝╚██████╗██║  ██║███████╗      */
/*      ╚══════╝ ╚═════╝  ╚═════╝╚═╝  ╚═╝╚══════╝      */
/*     ██████████████████████████████████████████╗     */
/*     ╚═════════════════════════════════════════╝     */

/// Local stack usage of one function, as the compiler reported it.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Local
{
    /// Frame size is static and exact.
    Exact(u64),
    /// Frame uses `alloca`/VLAs; the value is the static part only
    /// (0 when the compiler gave none), a lower bound.
    Dynamic(u64),
    /// No stack-usage record at all (assembly, binary blob, external).
    Unknown,
}

impl Local
{
    /// The best known static lower bound, in bytes.
    pub fn bound(&self) -> u64
    {
        match *self
        {
            Local::Exact(n)   => n,
            Local::Dynamic(n) => n,
            Local::Unknown    => 0,
        }
    }

    pub fn is_static(&self) -> bool
    {
        matches!(*self, Local::Exact(_))
    }
}

impl fmt::Display for Local
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match *self
        {
            Local::Exact(n)   => write!(f, "{}", n),
            Local::Dynamic(n) => write!(f, ">= {}", n),
            Local::Unknown    => f.write_str("?"),
        }
    }
}

#[allow(clippy::from_over_into)]
impl Into<Max> for Local
{
    fn into(self) -> Max
    {
        match self
        {
            Local::Exact(n)   => Max::Exact(n),
            Local::Dynamic(n) => Max::LowerBound(n),
            Local::Unknown    => Max::LowerBound(0),
        }
    }
}




/*      ███╗   ███╗ █████╗ ██╗  ██╗      */
/*      ████╗ ████║██╔══██╗╚██╗██╔╝      */
/*      ██╔████╔██║███████║ ╚███╔╝       */
/*      ██║╚██╔╝██║██╔══██║ ██╔██╗       */
/*      ██║ ╚═╝ ██║██║  ██║██╔╝ ██╗      */
/*      ╚═╝     ╚═╝╚═╝  ╚═╝╚═╝  ╚═╝      */
/*     ████████████████████████████╗     */
/*     ╚═══════════════════════════╝     */

///
/// Worst-case cumulative stack usage. `LowerBound` means something on
/// the maximizing path was not exactly known: a dynamic frame, a cycle,
/// an indirect call or an external symbol.
///
#[derive(Clone, Copy, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum Max
{
    Exact(u64),
    LowerBound(u64),
}

impl Max
{
    pub fn bytes(&self) -> u64
    {
        match *self
        {
            Max::Exact(n)      => n,
            Max::LowerBound(n) => n,
        }
    }

    pub fn is_lower_bound(&self) -> bool
    {
        matches!(*self, Max::LowerBound(_))
    }

    /// Degrade to a lower bound, keeping the byte count.
    pub fn saturate(self) -> Max
    {
        Max::LowerBound(self.bytes())
    }
}

impl ops::Add<Local> for Max {
    type Output = Max;

    fn add(self, rhs: Local) -> Max
    {
        match (self, rhs) {
            (Max::Exact(lhs),      Local::Exact(rhs))   => Max::Exact(lhs + rhs),
            (Max::Exact(lhs),      Local::Dynamic(rhs)) => Max::LowerBound(lhs + rhs),
            (Max::Exact(lhs),      Local::Unknown)      => Max::LowerBound(lhs),
            (Max::LowerBound(lhs), Local::Exact(rhs))   => Max::LowerBound(lhs + rhs),
            (Max::LowerBound(lhs), Local::Dynamic(rhs)) => Max::LowerBound(lhs + rhs),
            (Max::LowerBound(lhs), Local::Unknown)      => Max::LowerBound(lhs),
        }
    }
}

impl ops::Add<Max> for Max {
    type Output = Max;

    fn add(self, rhs: Max) -> Max {
        match (self, rhs) {
            (Max::Exact(lhs),      Max::Exact(rhs))      => Max::Exact(lhs + rhs),
            (Max::Exact(lhs),      Max::LowerBound(rhs)) => Max::LowerBound(lhs + rhs),
            (Max::LowerBound(lhs), Max::Exact(rhs))      => Max::LowerBound(lhs + rhs),
            (Max::LowerBound(lhs), Max::LowerBound(rhs)) => Max::LowerBound(lhs + rhs),
        }
    }
}

pub fn max_of(mut iter: impl Iterator<Item = Max>) -> Option<Max>
{
    iter.next().map(|first| iter.fold(first, max))
}

pub fn max(lhs: Max, rhs: Max) -> Max
{
    match (lhs, rhs)
    {
        (Max::Exact(lhs),      Max::Exact(rhs))      => Max::Exact(cmp::max(lhs, rhs)),
        (Max::Exact(lhs),      Max::LowerBound(rhs)) => Max::LowerBound(cmp::max(lhs, rhs)),
        (Max::LowerBound(lhs), Max::Exact(rhs))      => Max::LowerBound(cmp::max(lhs, rhs)),
        (Max::LowerBound(lhs), Max::LowerBound(rhs)) => Max::LowerBound(cmp::max(lhs, rhs)),
    }
}

impl fmt::Display for Max
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match *self
        {
            Max::Exact(n)      => write!(f, "= {}", n),
            Max::LowerBound(n) => write!(f, ">= {}", n),
        }
    }
}




/*      ███╗   ██╗ ██████╗ ██████╗ ███████╗      */
/*      ████╗  ██║██╔═══██╗██╔══██╗██╔════╝      */
/*      ██╔██╗ ██║██║   ██║██║  ██║█████╗        */
/*      ██║╚██╗██║██║   ██║██║  ██║██╔══╝        */
/*      ██║ ╚████║╚██████╔╝██████╔╝███████╗      */
/*      ╚═╝  ╚═══╝ ╚═════╝ ╚═════╝ ╚══════╝      */
/*     ████████████████████████████████████╗     */
/*     ╚═══════════════════════════════════╝     */

/// One parsed stack-usage record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncStackInfo
{
    pub id: FuncId,
    /// Human-readable symbol name, decorations and all (`foo.constprop.0`).
    pub display: String,
    pub local: Local,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node
{
    pub id: FuncId,
    pub display: String,
    pub local: Local,
    pub dashed: bool,
}

#[allow(non_snake_case)]
pub fn Node(id: FuncId, display: String, local: Local, dashed: bool) -> Node
{
    Node
    {
        id,
        display,
        local: local,
        dashed,
    }
}

/// How a call site reaches its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CallKind
{
    /// Target is a symbol defined in the analyzed set.
    Direct,
    /// Through a register; target unknown.
    Indirect,
    /// Target symbol was never defined in the analyzed set.
    External,
}

impl CallKind
{
    /// Dedup priority: when the same caller/callee pair shows up twice,
    /// the most specific kind is kept.
    pub fn specificity(&self) -> u8
    {
        match *self
        {
            CallKind::Direct   => 2,
            CallKind::Indirect => 1,
            CallKind::External => 0,
        }
    }
}

impl fmt::Display for CallKind
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match *self
        {
            CallKind::Direct   => f.write_str("direct"),
            CallKind::Indirect => f.write_str("indirect"),
            CallKind::External => f.write_str("external"),
        }
    }
}




/*      ██████╗ ██╗ █████╗  ██████╗       */
/*      ██╔══██╗██║██╔══██╗██╔════╝       */
/*      ██║  ██║██║███████║██║  ███╗      */
/*      ██║  ██║██║██╔══██║██║   ██║      */
/*      ██████╔╝██║██║  ██║╚██████╔╝      */
/*      ╚═════╝ ╚═╝╚═╝  ╚═╝ ╚═════╝       */
/*     ██████████████████████████████╗    */
/*     ╚═════════════════════════════╝    */

///
/// Non-fatal findings, accumulated next to partial results. None of
/// these abort an analysis run; a partial report is still actionable.
///
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum Diag
{
        #[error("stack-usage record at {unit}:{line} is malformed; skipped")]
        MalformedRecord { unit: String, line: usize },

        #[error("duplicate stack-usage record for `{0}`; keeping the later one")]
        DuplicateRecord(FuncId),

        #[error("`{name}` is defined in more than one unit; resolving to `{chosen}`")]
        AmbiguousSymbol { name: String, chosen: FuncId },

        #[error("callee `{0}` is not defined anywhere in the input set")]
        UnresolvedSymbol(String),

        #[error("skipped `{unit}`: {reason}")]
        SkippedFile { unit: String, reason: String },
}


#[cfg(test)]
mod tests
{
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn max_arithmetic_saturates()
    {
        assert_eq!(Max::Exact(8) + Local::Exact(4), Max::Exact(12));
        assert_eq!(Max::Exact(8) + Local::Dynamic(4), Max::LowerBound(12));
        assert_eq!(Max::Exact(8) + Local::Unknown, Max::LowerBound(8));
        assert_eq!(Max::LowerBound(8) + Local::Exact(4), Max::LowerBound(12));
        assert_eq!(Max::Exact(8) + Max::LowerBound(4), Max::LowerBound(12));
    }

    #[test]
    fn max_of_prefers_bytes_keeps_bound()
    {
        let m = max_of([Max::Exact(16), Max::LowerBound(8)].into_iter());
        assert_eq!(m, Some(Max::LowerBound(16)));
        assert_eq!(max_of(std::iter::empty::<Max>()), None);
    }

    #[test]
    fn external_id_has_no_unit()
    {
        let id = FuncId::external("memcpy");
        assert!(id.is_external());
        assert_eq!(id.to_string(), "memcpy");
        assert_eq!(FuncId::new("main.o", "main").to_string(), "main.o:main");
    }

    #[test]
    fn kind_specificity_order()
    {
        assert!(CallKind::Direct.specificity() > CallKind::Indirect.specificity());
        assert!(CallKind::Indirect.specificity() > CallKind::External.specificity());
    }
}
