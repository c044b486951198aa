use std::{
    collections::BTreeSet,
    fmt::{self, Display},
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

/// A snapshot file name with at most one printf-style integer conversion,
/// e.g. `flds.tot.%05d` or `dummy%02d.hdf5`.
///
/// A template without a conversion names a single "evolving" file that holds
/// every step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FnameTemplate {
    raw: String,
    placeholder: Option<Placeholder>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Placeholder {
    prefix: String,
    suffix: String,
    width: usize,
    zero_pad: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Template {0:?} has more than one '%' placeholder")]
    MultiplePlaceholders(String),
    #[error("Template {template:?} uses unsupported conversion {conversion:?}, expected an integer (`%d`, `%05d`)")]
    UnsupportedConversion {
        template: String,
        conversion: String,
    },
}

impl FnameTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self, TemplateError> {
        let raw = template.into();
        let placeholder = match raw.find('%') {
            None => None,
            Some(start) => {
                if raw[start + 1..].contains('%') {
                    return Err(TemplateError::MultiplePlaceholders(raw));
                }
                Some(Placeholder::parse(&raw, start)?)
            }
        };
        Ok(Self { raw, placeholder })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this template names one file per step.
    pub fn is_per_step(&self) -> bool {
        self.placeholder.is_some()
    }

    /// Text before the placeholder (the whole template for an evolving file).
    pub fn prefix(&self) -> &str {
        match &self.placeholder {
            Some(p) => &p.prefix,
            None => &self.raw,
        }
    }

    /// Text after the placeholder.
    pub fn suffix(&self) -> &str {
        match &self.placeholder {
            Some(p) => &p.suffix,
            None => "",
        }
    }

    pub fn render(&self, tstep: u32) -> String {
        match &self.placeholder {
            Some(p) if p.zero_pad => format!("{}{:0w$}{}", p.prefix, tstep, p.suffix, w = p.width),
            Some(p) => format!("{}{:w$}{}", p.prefix, tstep, p.suffix, w = p.width),
            None => self.raw.clone(),
        }
    }

    /// Full path of the file holding `tstep` inside `directory`.
    pub fn path_in(&self, directory: &Path, tstep: u32) -> PathBuf {
        directory.join(self.render(tstep))
    }

    /// Inverse of [`FnameTemplate::render`] for names that start with the prefix.
    ///
    /// Returns `None` when the name is not a candidate at all, and
    /// `Some(Err(..))` when it is a candidate whose step cannot be parsed.
    fn step_of(&self, file_name: &str) -> Option<Result<u32, ()>> {
        let p = self.placeholder.as_ref()?;
        let rest = file_name.strip_prefix(p.prefix.as_str())?;
        let digits = rest.strip_suffix(p.suffix.as_str()).unwrap_or(rest);
        Some(digits.trim_start().parse::<u32>().map_err(|_| ()))
    }
}

impl Placeholder {
    fn parse(raw: &str, start: usize) -> Result<Self, TemplateError> {
        let spec = &raw[start + 1..];
        let flags_len = spec.bytes().take_while(|b| b.is_ascii_digit()).count();
        let (flags, conversion) = spec.split_at(flags_len);

        let unsupported = || TemplateError::UnsupportedConversion {
            template: raw.to_string(),
            conversion: format!("%{flags}{}", conversion.chars().next().map_or(String::new(), String::from)),
        };

        let Some(rest) = conversion.strip_prefix(&['d', 'i'][..]) else {
            return Err(unsupported());
        };
        let zero_pad = flags.starts_with('0');
        let width = if flags.is_empty() {
            0
        } else {
            flags.parse().map_err(|_| unsupported())?
        };

        Ok(Self {
            prefix: raw[..start].to_string(),
            suffix: rest.to_string(),
            width,
            zero_pad,
        })
    }
}

impl FromStr for FnameTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for FnameTemplate {
    type Error = TemplateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FnameTemplate> for String {
    fn from(template: FnameTemplate) -> Self {
        template.raw
    }
}

impl Display for FnameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Template {0} has no step placeholder, pass the timesteps explicitly")]
    NoPlaceholder(FnameTemplate),
    #[error("Unable to list {path:?} (prefix {prefix:?}, suffix {suffix:?}): {source}")]
    ReadDir {
        path: PathBuf,
        prefix: String,
        suffix: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to find a timestep in {name:?} in {path:?} (prefix {prefix:?}, suffix {suffix:?})")]
    UnparsableName {
        path: PathBuf,
        prefix: String,
        suffix: String,
        name: String,
    },
}

/// Scans `directory` for files matching `template` and returns their steps,
/// strictly ascending.
///
/// Either every candidate parses or the whole scan fails.
#[instrument(skip(template), fields(template = %template))]
pub fn discover_timesteps(
    directory: &Path,
    template: &FnameTemplate,
) -> Result<Vec<u32>, DiscoveryError> {
    if !template.is_per_step() {
        return Err(DiscoveryError::NoPlaceholder(template.clone()));
    }

    let read_dir_err = |source| DiscoveryError::ReadDir {
        path: directory.to_path_buf(),
        prefix: template.prefix().to_string(),
        suffix: template.suffix().to_string(),
        source,
    };

    let mut steps = BTreeSet::new();
    for entry in std::fs::read_dir(directory).map_err(read_dir_err)? {
        let entry = entry.map_err(read_dir_err)?;
        let name = entry.file_name();
        // Non-UTF8 names can't match a UTF8 prefix anyway
        let Some(name) = name.to_str() else {
            continue;
        };
        match template.step_of(name) {
            None => continue,
            Some(Ok(step)) => {
                steps.insert(step);
            }
            Some(Err(())) => {
                return Err(DiscoveryError::UnparsableName {
                    path: directory.to_path_buf(),
                    prefix: template.prefix().to_string(),
                    suffix: template.suffix().to_string(),
                    name: name.to_string(),
                })
            }
        }
    }

    debug!(count = steps.len(), "discovered timesteps");
    Ok(steps.into_iter().collect())
}
