//! Per-asset substitution tokens.
//!
//! Parameter literals that exactly equal a token (for example `"$REPORT_PATH"`) are
//! replaced with a concrete path derived from the asset being processed. Tokens carry
//! the reserved `$` sigil, and matching is exact string equality on the whole literal.

use qagraph_types::{BuildError, ParamValue};

pub const ASSET_INPUT_PATH: &str = "$ASSET_INPUT_PATH";
pub const REPORT_PATH: &str = "$REPORT_PATH";
pub const ASSET_OUTPUT_PATH: &str = "$ASSET_OUTPUT_PATH";

pub const TOKEN_SIGIL: char = '$';

const REPORTS_DIR: &str = "reports";
const OUTPUTS_DIR: &str = "outputs";

/// Token to value mapping. Tokens and values are both unique.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubstitutionMap {
    entries: Vec<(String, String)>,
}

impl SubstitutionMap {
    /// Build a map, rejecting duplicated tokens or values so a literal can never
    /// match ambiguously.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = Self::default();
        for (token, value) in pairs {
            let (token, value) = (token.into(), value.into());
            if map.get(&token).is_some() {
                return Err(BuildError::DuplicateSubstitution { value: token });
            }
            if map.entries.iter().any(|(_, v)| *v == value) {
                return Err(BuildError::DuplicateSubstitution { value });
            }
            map.entries.push((token, value));
        }
        Ok(map)
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == token)
            .map(|(_, v)| v.as_str())
    }

    /// If `literal` is a string that exactly equals a token, return the token and
    /// its substituted value.
    pub fn lookup<'a>(&'a self, literal: &ParamValue) -> Option<(&'a str, &'a str)> {
        let text = literal.as_str()?;
        if !text.starts_with(TOKEN_SIGIL) {
            return None;
        }
        self.entries
            .iter()
            .find(|(t, _)| t == text)
            .map(|(t, v)| (t.as_str(), v.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(t, v)| (t.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Replace every backslash with a forward slash, the separator the host expects on
/// every platform.
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Derive the substitutions for one asset. Pure and deterministic.
///
/// - input: the asset path itself
/// - report: `dirname(asset)/reports/<basename(asset)>.json`
/// - output: `dirname(asset)/outputs/<basename(asset)>`
pub fn resolve(asset_path: &str) -> Result<SubstitutionMap, BuildError> {
    let input = normalize_separators(asset_path);
    let (dir, name) = split_path(&input);

    let report = join(dir, &format!("{REPORTS_DIR}/{name}.json"));
    let output = join(dir, &format!("{OUTPUTS_DIR}/{name}"));

    SubstitutionMap::from_pairs([
        (ASSET_INPUT_PATH, input),
        (REPORT_PATH, report),
        (ASSET_OUTPUT_PATH, output),
    ])
}

/// Split a normalized path into `(dirname, basename)`.
fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

fn join(dir: &str, rest: &str) -> String {
    if dir.is_empty() {
        rest.to_string()
    } else if dir.ends_with('/') {
        format!("{dir}{rest}")
    } else {
        format!("{dir}/{rest}")
    }
}
