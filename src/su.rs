use log::warn;
use thiserror::Error;

use crate as c;
use crate::Diag;




/*      ██████╗  █████╗ ██████╗ ███████╗███████╗     */
/*      ██╔══██╗██╔══██╗██╔══██╗██╔════╝██╔════╝     */
/*      ██████╔╝███████║██████╔╝███████╗█████╗       */
/*      ██╔═══╝ ██╔══██║██╔══██╗╚════██║██╔══╝       */
/*      ██║     ██║  ██║██║  ██║███████║███████╗     */
/*      ╚═╝     ╚═╝  ╚═╝╚═╝  ╚═╝╚══════╝╚══════╝     */

#[derive(Error, Debug)]
pub enum SuError
{
        #[error("`{0}` does not look like stack-usage data")]
        NotStackUsage(String),
}

/// Output of one `.su` file: records plus per-line findings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SuParse
{
    pub records: Vec<c::FuncStackInfo>,
    pub diags:   Vec<Diag>,
}

///
/// Parse the stack-usage records GCC emits with `-fstack-usage`, one
/// function per line:
///
/// ```text
/// main.c:32:5:main	24	static
/// log.c:80:1:log_fmt	136	dynamic,bounded
/// ```
///
/// `unit` is the compilation unit the file belongs to and becomes part
/// of every record's id. Blank lines are skipped; malformed lines are
/// skipped and counted, never fatal. Only input with content but not a
/// single parseable record is rejected outright.
///
pub fn parse_stack_usage(unit: &str, text: &str) -> Result<SuParse, SuError>
{
    if text.contains('\0')
    {
        return Err(SuError::NotStackUsage(unit.to_string()));
    }

    let mut out = SuParse::default();
    let mut saw_content = false;

    for (lineno, line) in text.lines().enumerate()
    {
        let line = line.trim();
        if line.is_empty()
        {
            continue;
        }
        saw_content = true;

        match parse_record(unit, line)
        {
            Some(info) => out.records.push(info),
            None       =>
            {
                warn!("{}:{}: unparseable stack-usage record", unit, lineno + 1);
                out.diags.push(Diag::MalformedRecord
                {
                    unit: unit.to_string(),
                    line: lineno + 1,
                });
            }
        }
    }

    if saw_content && out.records.is_empty()
    {
        return Err(SuError::NotStackUsage(unit.to_string()));
    }

    Ok(out)
}

fn parse_record(unit: &str, line: &str) -> Option<c::FuncStackInfo>
{
    // `location<TAB>bytes<TAB>qualifiers`; fall back to whitespace for
    // toolchains that do not emit tabs.
    let (location, bytes, quals) = split_fields(line)?;

    // location = `file:line:col:function`; the function part may itself
    // contain `:` (C++ `Foo::bar(int)`), so split from the left and
    // keep the remainder intact.
    let name = match location.splitn(4, ':').collect::<Vec<_>>()[..]
    {
        [_file, row, col, func] =>
        {
            if row.parse::<u64>().is_err() || col.parse::<u64>().is_err()
            {
                return None;
            }
            func
        }
        // some assemblers emit bare `function` with no location
        [func] => func,
        _      => return None,
    };

    if name.is_empty()
    {
        return None;
    }

    let is_dynamic = quals.contains("dynamic") || quals.contains("bounded");

    let local = match bytes.parse::<u64>()
    {
        Ok(n) if is_dynamic => c::Local::Dynamic(n),
        Ok(n)               => c::Local::Exact(n),
        // the dynamic marker variant: no usable number at all, the
        // static lower bound defaults to 0
        Err(_) if is_dynamic => c::Local::Dynamic(0),
        Err(_)               => return None,
    };

    Some(c::FuncStackInfo
    {
        id:      c::FuncId::new(unit, name),
        display: name.to_string(),
        local:   local,
    })
}

fn split_fields(line: &str) -> Option<(&str, &str, &str)>
{
    let mut it = line.split('\t').filter(|f| !f.is_empty());
    if let (Some(a), Some(b), Some(q)) = (it.next(), it.next(), it.next())
    {
        return Some((a, b.trim(), q.trim()));
    }

    // whitespace fallback: qualifiers last, bytes second to last
    let mut it = line.rsplitn(3, char::is_whitespace);
    let q = it.next()?;
    let b = it.next()?;
    let a = it.next()?;
    Some((a.trim(), b.trim(), q.trim()))
}


#[cfg(test)]
mod tests
{
    use super::*;
    use crate::{FuncId, Local};
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_static_records()
    {
        let text = "main.c:10:5:main\t32\tstatic\nmain.c:40:1:helper\t8\tstatic\n";
        let p = parse_stack_usage("main.o", text).unwrap();

        assert!(p.diags.is_empty());
        assert_eq!(p.records.len(), 2);
        assert_eq!(p.records[0].id, FuncId::new("main.o", "main"));
        assert_eq!(p.records[0].local, Local::Exact(32));
        assert_eq!(p.records[1].display, "helper");
    }

    #[test]
    fn dynamic_and_bounded_records()
    {
        let text = "a.c:1:1:vla_user\t16\tdynamic,bounded\na.c:9:1:alloca_user\t?\tdynamic\n";
        let p = parse_stack_usage("a.o", text).unwrap();

        assert_eq!(p.records[0].local, Local::Dynamic(16));
        assert_eq!(p.records[1].local, Local::Dynamic(0));
        assert!(!p.records[0].local.is_static());
    }

    #[test]
    fn one_garbled_line_among_ten()
    {
        let mut text = String::new();
        for i in 0..5
        {
            text.push_str(&format!("f.c:{}:1:f{}\t{}\tstatic\n", i + 1, i, 8 * i));
        }
        text.push_str("this line is garbage\n");
        for i in 5..10
        {
            text.push_str(&format!("f.c:{}:1:f{}\t{}\tstatic\n", i + 1, i, 8 * i));
        }

        let p = parse_stack_usage("f.o", &text).unwrap();
        assert_eq!(p.records.len(), 10);
        assert_eq!(
            p.diags,
            vec![Diag::MalformedRecord { unit: "f.o".to_string(), line: 6 }]
        );
    }

    #[test]
    fn cpp_method_names_keep_their_colons()
    {
        let text = "dev.cpp:12:1:Uart::write(char const*, unsigned int)\t48\tstatic\n";
        let p = parse_stack_usage("dev.obj", text).unwrap();
        assert_eq!(p.records[0].id.name, "Uart::write(char const*, unsigned int)");
    }

    #[test]
    fn blank_lines_are_fine_garbage_only_is_not()
    {
        assert!(parse_stack_usage("x.o", "\n\n\n").unwrap().records.is_empty());
        assert!(parse_stack_usage("x.o", "not\nthe format\n").is_err());
        assert!(parse_stack_usage("x.o", "ab\0cd").is_err());
    }

    #[test]
    fn whitespace_separated_fallback()
    {
        let text = "isr.c:3:1:systick_handler 16 static\n";
        let p = parse_stack_usage("isr.o", text).unwrap();
        assert_eq!(p.records[0].local, Local::Exact(16));
        assert_eq!(p.records[0].id.name, "systick_handler");
    }
}
