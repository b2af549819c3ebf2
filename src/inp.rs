use std::{ io, fs, path::{Path, PathBuf}, };
use log::{ info, warn };

use thiserror::Error;

use crate::graph::{self, CallGraph};
use crate::obj::{self, Dialect, Extraction, ObjError};
use crate::su::{self, SuError, SuParse};
use crate::Diag;



///
/// Errors which may occur when loading input files. Per-file format
/// problems degrade to diagnostics in `load_and_build`; only a run
/// that produced nothing at all is fatal.
///
#[derive(Error, Debug)]
pub enum InputError
{
        #[error("std::fs::read() raised this error: {0:?}")]
        IoErr(#[from] io::Error),

        #[error("cannot tell the object-file dialect of `{0}`")]
        UnknownKind(PathBuf),

        #[error(transparent)]
        BadSu(#[from] SuError),

        #[error(transparent)]
        BadDump(#[from] ObjError),

        #[error("none of the provided files contained parseable input")]
        NothingParsed,
}



///
/// Guess the dialect from the file name: Zephyr/CMake object files
/// keep the source extension (`uart.c.obj`), conventional ones do not
/// (`uart.o`). Discovery of the files themselves is the caller's job.
///
pub fn detect_dialect(path: &Path) -> Option<Dialect>
{
    let name = path.file_name()?.to_str()?;

    if name.ends_with(".obj")
    {
        let stem = &name[..name.len() - 4];
        if Path::new(stem).extension().is_some()
        {
            return Some(Dialect::Zephyr);
        }
        return Some(Dialect::Standard);
    }

    if name.ends_with(".o")
    {
        return Some(Dialect::Standard);
    }

    None
}

///
/// The compilation-unit key a file contributes to: the file name with
/// its final extension dropped. `main.o` and `main.su` meet on
/// `main`; Zephyr's `uart.c.obj` and `uart.c.su` meet on `uart.c`.
///
pub fn unit_from_path(path: &Path) -> String
{
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    match name.rsplit_once('.')
    {
        Some((stem, _ext)) if !stem.is_empty() => stem.to_string(),
        _                                      => name.to_string(),
    }
}

/// Read and parse one `.su` file.
pub fn load_su(path: &Path) -> Result<SuParse, InputError>
{
    let text = fs::read_to_string(path)?;
    let parse = su::parse_stack_usage(&unit_from_path(path), &text)?;
    info!("{}: {} stack-usage records", path.display(), parse.records.len());
    Ok(parse)
}

/// Read and extract one object-file dump.
pub fn load_dump(path: &Path) -> Result<Extraction, InputError>
{
    let dialect = detect_dialect(path)
        .ok_or_else(|| InputError::UnknownKind(path.to_path_buf()))?;

    let text = fs::read_to_string(path)?;
    let ex = obj::extract(dialect, &unit_from_path(path), &text)?;
    info!(
        "{}: {} functions, {} call sites ({:?})",
        path.display(),
        ex.defined.len(),
        ex.calls.len(),
        dialect
    );
    Ok(ex)
}

///
/// Load a whole input set and build the merged graph. Files that fail
/// to parse are skipped with a `Diag::SkippedFile` each; the run only
/// fails when nothing was parseable anywhere.
///
pub fn load_and_build(su_files: &[PathBuf], dumps: &[PathBuf]) -> Result<CallGraph, InputError>
{
    let mut infos = Vec::new();
    let mut extractions = Vec::new();
    let mut skipped = Vec::new();

    for path in su_files
    {
        match load_su(path)
        {
            Ok(mut parse) =>
            {
                infos.append(&mut parse.records);
                skipped.append(&mut parse.diags);
            }
            Err(e) =>
            {
                warn!("skipping `{}`: {}", path.display(), e);
                skipped.push(Diag::SkippedFile
                {
                    unit:   path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    for path in dumps
    {
        match load_dump(path)
        {
            Ok(ex) => extractions.push(ex),
            Err(e) =>
            {
                warn!("skipping `{}`: {}", path.display(), e);
                skipped.push(Diag::SkippedFile
                {
                    unit:   path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if !skipped.is_empty()
    {
        extractions.push(Extraction
        {
            diags: skipped,
            ..Extraction::default()
        });
    }

    let graph = graph::build(infos, extractions);
    if graph.is_empty()
    {
        return Err(InputError::NothingParsed);
    }
    Ok(graph)
}


#[cfg(test)]
mod tests
{
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn dialect_detection()
    {
        assert_eq!(detect_dialect(Path::new("build/main.o")), Some(Dialect::Standard));
        assert_eq!(detect_dialect(Path::new("main.obj")), Some(Dialect::Standard));
        assert_eq!(detect_dialect(Path::new("zephyr/uart.c.obj")), Some(Dialect::Zephyr));
        assert_eq!(detect_dialect(Path::new("app.cpp.obj")), Some(Dialect::Zephyr));
        assert_eq!(detect_dialect(Path::new("notes.txt")), None);
    }

    #[test]
    fn unit_keys_line_up_across_dialects()
    {
        assert_eq!(unit_from_path(Path::new("build/main.o")), "main");
        assert_eq!(unit_from_path(Path::new("build/main.su")), "main");
        assert_eq!(unit_from_path(Path::new("uart.c.obj")), "uart.c");
        assert_eq!(unit_from_path(Path::new("uart.c.su")), "uart.c");
    }

    #[test]
    fn bad_files_are_skipped_not_fatal()
    {
        let dir = tempfile::tempdir().unwrap();

        let su = dir.path().join("main.su");
        fs::write(&su, "main.c:1:1:main\t32\tstatic\n").unwrap();

        let bad = dir.path().join("broken.su");
        fs::write(&bad, "complete nonsense\n").unwrap();

        let dump = dir.path().join("main.o");
        fs::write(&dump, "00000000 <main>:\n   0:\t4770      \tbx\tlr\n").unwrap();

        let g = load_and_build(&[su, bad.clone()], &[dump]).unwrap();

        assert_eq!(g.len(), 1);
        assert!(g
            .diags()
            .iter()
            .any(|d| matches!(d, Diag::SkippedFile { unit, .. } if unit.ends_with("broken.su"))));
    }

    #[test]
    fn an_empty_run_is_fatal()
    {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("broken.su");
        fs::write(&bad, "complete nonsense\n").unwrap();

        assert!(matches!(
            load_and_build(&[bad], &[]),
            Err(InputError::NothingParsed)
        ));
    }
}
