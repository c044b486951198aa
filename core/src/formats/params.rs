use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    path::{Path, PathBuf},
};

use miette::{Diagnostic, SourceSpan};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

/// Simulation parameters keyed by `"block:key"`.
pub type Params = BTreeMap<String, ParamValue>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
}

impl ParamValue {
    pub fn as_f64(self) -> f64 {
        match self {
            ParamValue::Int(i) => i as f64,
            ParamValue::Float(f) => f,
        }
    }

    pub fn as_i64(self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(i),
            ParamValue::Float(_) => None,
        }
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(v) => write!(f, "{v:?}"),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ParamsError {
    #[error("Unable to read parameter file {path:?}: {source}")]
    #[diagnostic(code(graphet::params::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unterminated block header")]
    #[diagnostic(
        code(graphet::params::header),
        help("Block headers look like `<blockname>`")
    )]
    MalformedHeader {
        #[label("Missing closing `>`")]
        span: SourceSpan,
    },
    #[error("Assignment without a key")]
    #[diagnostic(code(graphet::params::empty_key))]
    EmptyKey {
        #[label("Expected `key = value`")]
        span: SourceSpan,
    },
    #[error("Invalid value {value:?} for {key:?}")]
    #[diagnostic(
        code(graphet::params::value),
        help("Values containing `.` or `e` are floats, everything else must be an integer")
    )]
    InvalidValue {
        key: String,
        value: String,
        #[label("Not a number")]
        span: SourceSpan,
    },
}

/// Parses the line-based parameter format:
///
/// ```text
/// <blockA>
/// # comment
///   paramA1 = 1.23   # trailing comment
///   paramA2 = 2
/// ```
///
/// Assignments before the first header keep their bare key.
pub fn parse_params(input: &str) -> Result<Params, ParamsError> {
    let mut params = Params::new();
    let mut block: Option<&str> = None;
    let mut offset = 0;

    for raw_line in input.split_inclusive('\n') {
        let line_start = offset;
        offset += raw_line.len();

        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        // Position of `line` within the full input
        let start = line_start + (raw_line.len() - raw_line.trim_start().len());

        if let Some(header) = line.strip_prefix('<') {
            let Some(name) = header.strip_suffix('>') else {
                return Err(ParamsError::MalformedHeader {
                    span: (start, line.len()).into(),
                });
            };
            block = Some(name.trim());
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ParamsError::EmptyKey {
                span: (start, line.len()).into(),
            });
        }

        let value_with_comment = match value.find('#') {
            Some(end) => &value[..end],
            None => value,
        };
        let value_str = value_with_comment.trim();
        let value_start = start + (line.len() - value.len())
            + (value_with_comment.len() - value_with_comment.trim_start().len());

        let invalid = || ParamsError::InvalidValue {
            key: key.to_string(),
            value: value_str.to_string(),
            span: (value_start, value_str.len().max(1)).into(),
        };
        let value = if value_str.contains('.') || value_str.contains('e') {
            ParamValue::Float(value_str.parse().map_err(|_| invalid())?)
        } else {
            ParamValue::Int(value_str.parse().map_err(|_| invalid())?)
        };

        let full_key = match block {
            Some(block) => format!("{block}:{key}"),
            None => key.to_string(),
        };
        params.insert(full_key, value);
    }

    Ok(params)
}

#[instrument]
pub fn read_params(path: &Path) -> Result<Params, ParamsError> {
    let input = std::fs::read_to_string(path).map_err(|source| ParamsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let params = parse_params(&input)?;
    debug!(count = params.len(), "read parameters");
    Ok(params)
}

/// Like [`read_params`], but with the file attached for a pretty-printed report.
pub fn read_params_report(path: &Path) -> Result<Params, miette::Report> {
    let input = std::fs::read_to_string(path).map_err(|source| ParamsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_params(&input).map_err(|err| {
        miette::Report::new(err).with_source_code(miette::NamedSource::new(
            path.display().to_string(),
            input,
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CFG: &str = "\
# generated input
<blockA>
  paramA1 = 1.23   # a float
  paramA2 = 2
<blockB>

  paramB1 = 345
  paramB2 = 4.56
  # paramB3 = 7
";

    #[test]
    fn parses_blocks_and_types() {
        let params = parse_params(CFG).unwrap();
        assert_eq!(params.len(), 4);
        assert_eq!(params["blockA:paramA1"], ParamValue::Float(1.23));
        assert_eq!(params["blockA:paramA2"], ParamValue::Int(2));
        assert_eq!(params["blockB:paramB1"], ParamValue::Int(345));
        assert_eq!(params["blockB:paramB2"], ParamValue::Float(4.56));
        assert!(!params.contains_key("blockB:paramB3"));
    }

    #[test]
    fn exponent_is_float() {
        let params = parse_params("<n>\nc = 1e3\nd = -4\n").unwrap();
        assert_eq!(params["n:c"], ParamValue::Float(1000.0));
        assert_eq!(params["n:d"], ParamValue::Int(-4));
    }

    #[test]
    fn keys_before_first_block() {
        let params = parse_params("dt = 0.5\n<b>\nx = 1").unwrap();
        assert_eq!(params["dt"], ParamValue::Float(0.5));
        assert_eq!(params["b:x"], ParamValue::Int(1));
    }

    #[test]
    fn invalid_value_points_at_value() {
        let input = "<grid>\n  mx0 = abc\n";
        let err = parse_params(input).unwrap_err();
        match err {
            ParamsError::InvalidValue { key, value, span } => {
                assert_eq!(key, "mx0");
                assert_eq!(value, "abc");
                assert_eq!(&input[span.offset()..span.offset() + span.len()], "abc");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unterminated_header() {
        assert!(matches!(
            parse_params("<grid\nmx0 = 1"),
            Err(ParamsError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.cfg");
        std::fs::write(&path, CFG).unwrap();
        assert_eq!(read_params(&path).unwrap().len(), 4);
        assert!(matches!(
            read_params(&dir.path().join("missing.cfg")),
            Err(ParamsError::Io { .. })
        ));
    }
}
