/*! External-function pointer effect tables.
 *
 * A whole-program pointer analysis must know what every library call does to the points-to
 * relation. That knowledge lives in a small line-oriented text format; this crate parses it into
 * the decoded effect types the analysis consumes. Functions with no entry are a configuration
 * error on the analysis side, so the format has an explicit `IGNORE` form for calls with no
 * pointer effect.
 *
 * ```text
 * # one record per line
 * IGNORE printf
 * malloc ALLOC Arg0
 * memcpy Arg0 COPY Arg1 R
 * strchr Ret COPY Arg0 V
 * exit EXIT
 * ```
 */

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use std::path::Path;
use thiserror::Error;

pub mod effects;

pub use effects::{AccessMode, DestSpec, Effect, EffectSummary, EffectTable, SourceSpec};

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct TableParser;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("malformed effect table at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("failed to read effect table {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

/// The built-in summaries for common allocation, copy, and exit routines.
const DEFAULT_TABLE: &str = include_str!("defaults.conf");

impl EffectTable {
    pub fn parse(input: &str) -> Result<Self, TableError> {
        let mut pairs = TableParser::parse(Rule::table, input).map_err(pest_error)?;
        let table_pair = pairs.next().expect("table rule always matches once");

        let mut table = EffectTable::new();
        for pair in table_pair.into_inner() {
            match pair.as_rule() {
                Rule::entry => {
                    let inner = pair.into_inner().next().expect("entry has one form");
                    decode_entry(inner, &mut table)?;
                }
                Rule::EOI => {}
                rule => unreachable!("unexpected rule in table: {:?}", rule),
            }
        }
        Ok(table)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// The embedded default table. Useful as a base to `extend` with
    /// project-specific annotations.
    pub fn with_defaults() -> Self {
        Self::parse(DEFAULT_TABLE).expect("embedded default table parses")
    }
}

fn pest_error(err: pest::error::Error<Rule>) -> TableError {
    let (line, column) = match err.line_col {
        pest::error::LineColLocation::Pos((l, c)) => (l, c),
        pest::error::LineColLocation::Span((l, c), _) => (l, c),
    };
    TableError::Parse {
        line,
        column,
        message: err.variant.message().into_owned(),
    }
}

fn decode_entry(pair: Pair<'_, Rule>, table: &mut EffectTable) -> Result<(), TableError> {
    match pair.as_rule() {
        Rule::ignore_entry => {
            let name = pair.into_inner().next().expect("IGNORE carries a name");
            table.insert_ignored(name.as_str());
        }
        Rule::alloc_entry => {
            let mut inner = pair.into_inner();
            let name = inner.next().expect("ALLOC carries a name");
            let size_arg = inner.next().map(arg_index).transpose()?;
            table.insert_effect(name.as_str(), Effect::Alloc { size_arg });
        }
        Rule::copy_entry => {
            let mut inner = pair.into_inner();
            let name = inner.next().expect("COPY carries a name");
            let dest_pair = inner.next().expect("COPY carries a destination");
            let dest = match dest_pair.as_rule() {
                Rule::ret_pos => DestSpec::Return,
                Rule::arg_pos => DestSpec::Arg(arg_index(dest_pair)?),
                rule => unreachable!("unexpected copy destination: {:?}", rule),
            };
            let source = decode_source(inner.next().expect("COPY carries a source"))?;
            table.insert_effect(name.as_str(), Effect::Copy { dest, source });
        }
        Rule::exit_entry => {
            let name = pair.into_inner().next().expect("EXIT carries a name");
            table.insert_effect(name.as_str(), Effect::Exit);
        }
        rule => unreachable!("unexpected entry form: {:?}", rule),
    }
    Ok(())
}

fn decode_source(pair: Pair<'_, Rule>) -> Result<SourceSpec, TableError> {
    let inner = pair.into_inner().next().expect("source has one form");
    Ok(match inner.as_rule() {
        Rule::null_source => SourceSpec::Null,
        Rule::unknown_source => SourceSpec::Universal,
        Rule::static_source => SourceSpec::Static,
        Rule::arg_source => {
            let mut parts = inner.into_inner();
            let index = arg_index(parts.next().expect("argument position"))?;
            let mode = match parts.next().expect("access mode").as_str() {
                "V" => AccessMode::Value,
                "D" => AccessMode::Deref,
                "R" => AccessMode::Reachable,
                mode => unreachable!("unexpected access mode: {}", mode),
            };
            SourceSpec::Arg(index, mode)
        }
        rule => unreachable!("unexpected source form: {:?}", rule),
    })
}

fn arg_index(pair: Pair<'_, Rule>) -> Result<u8, TableError> {
    debug_assert_eq!(pair.as_rule(), Rule::arg_pos);
    let digits = pair
        .clone()
        .into_inner()
        .next()
        .expect("Arg carries an index");
    digits.as_str().parse::<u8>().map_err(|_| {
        let (line, column) = pair.as_span().start_pos().line_col();
        TableError::Parse {
            line,
            column,
            message: format!("argument index out of range: {}", digits.as_str()),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_all_record_forms() {
        let table = EffectTable::parse(
            "# header comment\n\
             IGNORE printf\n\
             malloc ALLOC Arg0\n\
             calloc ALLOC\n\
             memcpy Arg0 COPY Arg1 R\n\
             strchr Ret COPY Arg0 V\n\
             scanf_ptr Arg1 COPY UNKNOWN\n\
             getenv Ret COPY STATIC\n\
             exit EXIT\n",
        )
        .unwrap();

        assert_eq!(table.len(), 8);
        assert!(table.lookup("printf").unwrap().is_empty());
        assert_eq!(
            table.lookup("malloc").unwrap().iter().next(),
            Some(&Effect::Alloc { size_arg: Some(0) })
        );
        assert_eq!(
            table.lookup("calloc").unwrap().iter().next(),
            Some(&Effect::Alloc { size_arg: None })
        );
        assert_eq!(
            table.lookup("memcpy").unwrap().iter().next(),
            Some(&Effect::Copy {
                dest: DestSpec::Arg(0),
                source: SourceSpec::Arg(1, AccessMode::Reachable)
            })
        );
        assert_eq!(
            table.lookup("strchr").unwrap().iter().next(),
            Some(&Effect::Copy {
                dest: DestSpec::Return,
                source: SourceSpec::Arg(0, AccessMode::Value)
            })
        );
        assert_eq!(
            table.lookup("exit").unwrap().iter().next(),
            Some(&Effect::Exit)
        );
        assert!(table.lookup("unheard_of").is_none());
    }

    #[test]
    fn source_mode_may_be_attached() {
        let table = EffectTable::parse("strcat Ret COPY Arg0V\n").unwrap();
        assert_eq!(
            table.lookup("strcat").unwrap().iter().next(),
            Some(&Effect::Copy {
                dest: DestSpec::Return,
                source: SourceSpec::Arg(0, AccessMode::Value)
            })
        );
    }

    #[test]
    fn multiple_effects_accumulate() {
        let table = EffectTable::parse("realloc ALLOC Arg1\nrealloc Ret COPY Arg0 V\n").unwrap();
        assert_eq!(table.lookup("realloc").unwrap().len(), 2);
    }

    #[test]
    fn malformed_record_reports_position() {
        let err = EffectTable::parse("IGNORE printf\nmalloc FROB Arg0\n").unwrap_err();
        match err {
            TableError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn index_out_of_range_is_rejected() {
        let err = EffectTable::parse("malloc ALLOC Arg300\n").unwrap_err();
        assert!(matches!(err, TableError::Parse { .. }));
    }

    #[test]
    fn defaults_cover_allocators() {
        let table = EffectTable::with_defaults();
        assert!(table.lookup("malloc").is_some());
        assert!(table.lookup("memcpy").is_some());
        assert!(table.lookup("free").is_some());
        assert!(table.lookup("exit").is_some());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("effects.conf");
        std::fs::write(&path, "IGNORE close\n").unwrap();
        let table = EffectTable::load(&path).unwrap();
        assert!(table.lookup("close").unwrap().is_empty());
    }
}
