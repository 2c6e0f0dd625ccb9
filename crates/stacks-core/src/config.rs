//! `stacks.yml` discovery and decoding.
//!
//! ```yaml
//! command: docker compose
//! stacks:
//!   networks: {}
//!   web:
//!     directory: services/web
//!     file: [compose.yml, compose.prod.yml]
//!     environment: { TAG: latest }
//!     depends_on: [networks]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{StackError, StackResult};
use crate::graph::{Stack, StackGraph};
use crate::invocation::ComposeTool;

/// File name searched for during discovery.
pub const STACKS_FILE_NAME: &str = "stacks.yml";

/// Either a single string or a list of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(list) => list,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct StackEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    directory: Option<PathBuf>,
    #[serde(default)]
    file: Option<OneOrMany>,
    #[serde(default)]
    environment: BTreeMap<String, String>,
    #[serde(default)]
    depends_on: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawStacksFile {
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    stacks: BTreeMap<String, Option<StackEntry>>,
}

/// A decoded and validated stacks file.
#[derive(Debug, Clone)]
pub struct StacksFile {
    /// Where the file was read from.
    pub path: PathBuf,
    /// Directory stack directories are resolved against.
    pub base_dir: PathBuf,
    pub tool: ComposeTool,
    pub graph: StackGraph,
}

impl StacksFile {
    /// Decode YAML `contents`. `path` is used for the base directory and
    /// error messages only.
    ///
    /// The whole graph is validated here, so unknown references and cycles
    /// are reported even for stacks a command would not touch.
    pub fn parse(path: &Path, contents: &str) -> StackResult<Self> {
        let config_err = |reason: String| StackError::Config {
            path: path.to_path_buf(),
            reason,
        };

        let raw: RawStacksFile =
            serde_yaml::from_str(contents).map_err(|e| config_err(e.to_string()))?;

        let tool = match raw.command.as_deref() {
            Some(command) => ComposeTool::parse(command).map_err(|e| config_err(e.to_string()))?,
            None => ComposeTool::default(),
        };

        let graph: StackGraph = raw
            .stacks
            .into_iter()
            .map(|(key, entry)| {
                let entry = entry.unwrap_or_default();
                let mut stack = Stack::new(key);
                if let Some(name) = entry.name.filter(|n| !n.is_empty()) {
                    stack.name = name;
                }
                stack.directory = entry.directory;
                stack.files = entry.file.map(Vec::from).unwrap_or_default();
                stack.environment = entry.environment;
                stack.depends_on = entry.depends_on;
                stack
            })
            .collect();

        graph.validate()?;

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            path: path.to_path_buf(),
            base_dir,
            tool,
            graph,
        })
    }

    /// Read and decode the file at `path`.
    pub fn load(path: &Path) -> StackResult<Self> {
        debug!(path = %path.display(), "loading stacks file");
        let contents = std::fs::read_to_string(path).map_err(|e| StackError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(path, &contents)
    }

    /// Locate the stacks file and load it. See [`find_stacks_file`].
    pub fn discover(cwd: &Path, explicit: Option<&Path>) -> StackResult<Self> {
        let path = find_stacks_file(cwd, explicit)?;
        Self::load(&path)
    }
}

/// Locate the stacks file.
///
/// An explicit path is resolved against `cwd` and must name an existing
/// file. Otherwise `stacks.yml` is searched for in `cwd` and then each of
/// its parents.
pub fn find_stacks_file(cwd: &Path, explicit: Option<&Path>) -> StackResult<PathBuf> {
    if let Some(path) = explicit {
        let target = cwd.join(path);
        if !target.is_file() {
            return Err(StackError::Config {
                path: target,
                reason: "the file does not exist or is not a file".to_string(),
            });
        }
        return Ok(target.canonicalize()?);
    }

    for dir in cwd.ancestors() {
        let candidate = dir.join(STACKS_FILE_NAME);
        if candidate.is_file() {
            return Ok(candidate.canonicalize()?);
        }
    }

    Err(StackError::ConfigNotFound {
        searched: cwd.to_path_buf(),
    })
}
