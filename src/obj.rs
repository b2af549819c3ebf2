use log::{warn, trace};
use thiserror::Error;

use crate::Diag;




/*      ███████╗██╗  ██╗████████╗██████╗  █████╗  ██████╗████████╗     */
/*      ██╔════╝╚██╗██╔╝╚══██╔══╝██╔══██╗██╔══██╗██╔════╝╚══██╔══╝     */
/*      █████╗   ╚███╔╝    ██║   ██████╔╝███████║██║        ██║        */
/*      ██╔══╝   ██╔██╗    ██║   ██╔══██╗██╔══██║██║        ██║        */
/*      ███████╗██╔╝ ██╗   ██║   ██║  ██║██║  ██║╚██████╗   ██║        */
/*      ╚══════╝╚═╝  ╚═╝   ╚═╝   ╚═╝  ╚═╝╚═╝  ╚═╝ ╚═════╝   ╚═╝        */

#[derive(Error, Debug)]
pub enum ObjError
{
        #[error("`{0}` does not look like an objdump disassembly")]
        NotObjdump(String),
}

///
/// Which flavour of object file the dump came from. Both produce the
/// same node/edge types; the dialect only changes how symbol names are
/// normalized into stable keys.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect
{
    /// Conventional `.o` output.
    Standard,
    /// Zephyr/CMake `.c.obj` output; symbols carry GCC clone
    /// decorations that must not leak into the key.
    Zephyr,
}

/// A function defined by the dump: decorated name plus the stable key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Definition
{
    pub name:     String,
    pub key_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawTarget
{
    /// Named symbol; resolved (or not) by the graph builder.
    Symbol(String),
    /// Through a register; target unknowable from the dump.
    Indirect,
}

/// One call site, by key names. Resolution happens in the builder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawCall
{
    pub caller: String,
    pub target: RawTarget,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Extraction
{
    pub unit:    String,
    pub defined: Vec<Definition>,
    pub calls:   Vec<RawCall>,
    pub diags:   Vec<Diag>,
}

// branch-and-link style instructions; plain `b` covers tail calls
const CALL_MNEMONICS: &[&str] = &["bl", "bl.w", "blx", "blx.w"];
const TAIL_MNEMONICS: &[&str] = &["b", "b.n", "b.w", "bx"];

// relocation types that stand for a call/tail call whose real target
// the unlinked branch does not encode
const CALL_RELOCS: &[&str] = &[
    "R_ARM_CALL",
    "R_ARM_THM_CALL",
    "R_ARM_PC24",
    "R_ARM_THM_PC22",
    "R_ARM_JUMP24",
    "R_ARM_THM_JUMP24",
];

///
/// Walk one `objdump -dr` style dump and pull out every defined
/// function and every call site it contains.
///
/// ```text
/// 00000000 <uart_send>:
///    0:	b580      	push	{r7, lr}
///    8:	f7ff fffe 	bl	0 <uart_send>
/// 			8: R_ARM_THM_CALL	uart_put
///    c:	4798      	blx	r3
/// ```
///
/// In unlinked objects the `bl` operand is a placeholder; the
/// relocation on the next line names the real callee and overrides it.
///
pub fn extract(dialect: Dialect, unit: &str, text: &str) -> Result<Extraction, ObjError>
{
    let mut out = Extraction
    {
        unit: unit.to_string(),
        ..Extraction::default()
    };

    // key name of the function being disassembled
    let mut current: Option<String> = None;
    // index into `out.calls` of the branch a relocation may fix up;
    // `None` after an intra-function branch, where a relocation still
    // means a tail call and gets a fresh entry
    let mut pending: Option<usize> = None;

    for line in text.lines()
    {
        if let Some(name) = symbol_header(line)
        {
            pending = None;

            if is_mapping_symbol(name)
            {
                current = None;
                continue;
            }

            let key_name = match dialect
            {
                Dialect::Standard => name.to_string(),
                Dialect::Zephyr   => strip_decorations(name).to_string(),
            };

            out.defined.push(Definition
            {
                name:     name.to_string(),
                key_name: key_name.clone(),
            });
            current = Some(key_name);
            continue;
        }

        let caller = match &current
        {
            Some(caller) => caller.clone(),
            None         => continue,
        };

        if let Some(sym) = call_reloc_target(line)
        {
            if sym.starts_with('.')
            {
                // section-relative target, nothing to name
                trace!("{}: ignoring reloc against `{}`", unit, sym);
                pending = None;
                continue;
            }

            match pending.take()
            {
                Some(i) => out.calls[i].target = RawTarget::Symbol(sym.to_string()),
                None    => out.calls.push(RawCall
                {
                    caller: caller,
                    target: RawTarget::Symbol(sym.to_string()),
                }),
            }
            continue;
        }

        if let Some((mnemonic, operand)) = instruction(line)
        {
            pending = None;

            let is_call = CALL_MNEMONICS.contains(&mnemonic);
            let is_tail = TAIL_MNEMONICS.contains(&mnemonic);

            if !is_call && !is_tail
            {
                continue;
            }

            if let Some(reg) = register_operand(operand)
            {
                // `bx lr` is a plain return, not a call
                if reg != "lr"
                {
                    out.calls.push(RawCall
                    {
                        caller: caller,
                        target: RawTarget::Indirect,
                    });
                }
                continue;
            }

            if let Some((sym, addend)) = angle_target(operand)
            {
                if is_mapping_symbol(sym)
                {
                    continue;
                }

                // a plain `b` into the middle of a symbol, or back into
                // the current one, is an intra-function branch, not a
                // call; a relocation on the next line may still turn
                // the site into a tail call
                if !is_call && (addend || sym == caller)
                {
                    continue;
                }

                out.calls.push(RawCall
                {
                    caller: caller,
                    target: RawTarget::Symbol(sym.to_string()),
                });
                pending = Some(out.calls.len() - 1);
            }
        }
    }

    if out.defined.is_empty()
    {
        warn!("`{}`: no symbol table entries found", unit);
        return Err(ObjError::NotObjdump(unit.to_string()));
    }

    Ok(out)
}

/// `00000000 <main>:` opens the disassembly of one symbol.
fn symbol_header(line: &str) -> Option<&str>
{
    let (addr, rest) = line.split_once(" <")?;

    if addr.is_empty() || !addr.bytes().all(|b| b.is_ascii_hexdigit())
    {
        return None;
    }

    rest.strip_suffix(">:")
}

/// ARM ELF mapping symbols (`$t`, `$a`, `$d`, `$x`) mark instruction
/// set and literal pool regions, they are not functions.
fn is_mapping_symbol(name: &str) -> bool
{
    matches!(name, "$t" | "$a" | "$d" | "$x")
        || ["$t.", "$a.", "$d.", "$x."].iter().any(|p| name.starts_with(p))
}

///
/// GCC appends clone decorations when it specializes a function; the
/// stack-usage record keeps the source-level name, so the decoration
/// must go for the two inputs to meet on one key.
///
/// `uart_put.constprop.0.isra.2` -> `uart_put`
///
pub fn strip_decorations(name: &str) -> &str
{
    const CLONES: &[&str] = &[".constprop.", ".isra.", ".part."];

    let mut out = name;
    loop
    {
        let mut stripped = false;
        for clone in CLONES
        {
            if let Some(at) = out.rfind(clone)
            {
                if out[at + clone.len()..].bytes().all(|b| b.is_ascii_digit())
                    && at + clone.len() < out.len()
                {
                    out = &out[..at];
                    stripped = true;
                }
            }
        }
        if !stripped
        {
            return out;
        }
    }
}

/// `			8: R_ARM_THM_CALL	uart_put` — relocation line for a call site.
fn call_reloc_target(line: &str) -> Option<&str>
{
    let mut fields = line.split_whitespace();

    let offset = fields.next()?;
    let offset = offset.strip_suffix(':')?;
    if !offset.bytes().all(|b| b.is_ascii_hexdigit())
    {
        return None;
    }

    let rtype = fields.next()?;
    if !CALL_RELOCS.contains(&rtype)
    {
        return None;
    }

    let sym = fields.next()?;
    // strip a possible addend: `uart_put+0x4`
    Some(sym.split('+').next().unwrap_or(sym))
}

/// `   8:	f7ff fffe 	bl	0 <helper>` -> ("bl", "0 <helper>")
fn instruction(line: &str) -> Option<(&str, &str)>
{
    let mut fields = line.split('\t').map(str::trim);

    let offset = fields.next()?.strip_suffix(':')?;
    if offset.is_empty() || !offset.bytes().all(|b| b.is_ascii_hexdigit())
    {
        return None;
    }

    let _encoding = fields.next()?;
    let mnemonic = fields.next()?;
    let operand = fields.next().unwrap_or("");
    Some((mnemonic, operand))
}

fn register_operand(operand: &str) -> Option<&str>
{
    let reg = operand.split(',').next()?.trim();

    let numbered = reg.len() >= 2
        && reg.starts_with('r')
        && reg[1..].bytes().all(|b| b.is_ascii_digit());

    if numbered || matches!(reg, "ip" | "lr" | "sl" | "fp")
    {
        Some(reg)
    }
    else
    {
        None
    }
}

/// `0 <helper>` -> ("helper", false); `4 <main+0x10>` -> ("main", true)
fn angle_target(operand: &str) -> Option<(&str, bool)>
{
    let (_, rest) = operand.split_once('<')?;
    let inside = rest.strip_suffix('>')?;

    match inside.split_once('+')
    {
        Some((sym, _)) => Some((sym, true)),
        None           => Some((inside, false)),
    }
}
