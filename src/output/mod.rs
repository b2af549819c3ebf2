
// re-exporting functions
mod top;     pub use top::output_top;
mod dot;     pub use dot::{output_dot, DotConf};

#[derive( PartialEq, Debug, Clone, Copy)]
pub enum OutputFormat {
    Dot,
    Top,
}

/// Dot label/quoting escape; symbol names may carry `"` or `\` once
/// C++ and Rust mangling get involved.
fn escape(s: &str) -> String
{
    let mut out = String::with_capacity(s.len());
    for ch in s.chars()
    {
        match ch
        {
            '"'  => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _    => out.push(ch),
        }
    }
    out
}
