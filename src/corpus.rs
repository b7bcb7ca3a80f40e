/*!
Named benchmark sets: a path template, the indices to substitute into it,
and the verdict every resolved file is expected to have.
*/

use std::{fmt::Display, path::PathBuf};

use crate::prelude::*;

/// The substitution point of a path template.
pub const PLACEHOLDER: &str = "{}";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "Path template '{}' of benchmark '{}' must contain exactly one '{}' placeholder (found {})",
        template,
        name,
        PLACEHOLDER,
        found
    ))]
    MalformedTemplate {
        name: String,
        template: String,
        found: usize,
    },
    #[snafu(display("Benchmark '{}' has an empty index range", name))]
    EmptyRange { name: String },
}

/// Indices of a benchmark set, always iterated in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexRange {
    /// Inclusive bounds.
    Bounds { start: u64, end: u64 },
    /// Sorted, deduplicated list.
    List(Vec<u64>),
}

impl IndexRange {
    pub fn inclusive(start: u64, end: u64) -> Self {
        IndexRange::Bounds { start, end }
    }

    pub fn list(mut indices: Vec<u64>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        IndexRange::List(indices)
    }

    pub fn len(&self) -> usize {
        match self {
            IndexRange::Bounds { start, end } if start <= end => (end - start + 1) as usize,
            IndexRange::Bounds { .. } => 0,
            IndexRange::List(indices) => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        match self {
            IndexRange::Bounds { start, end } => Box::new(*start..=*end),
            IndexRange::List(indices) => Box::new(indices.iter().copied()),
        }
    }

    /// Returns the `n`-th index in ascending order.
    pub fn nth(&self, n: usize) -> Option<u64> {
        match self {
            IndexRange::Bounds { start, .. } if n < self.len() => Some(start + n as u64),
            IndexRange::Bounds { .. } => None,
            IndexRange::List(indices) => indices.get(n).copied(),
        }
    }
}

/// Identifies one instance of a benchmark set in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceLabel {
    pub name: String,
    pub index: u64,
}

impl InstanceLabel {
    pub fn new(name: impl Into<String>, index: u64) -> Self {
        InstanceLabel {
            name: name.into(),
            index,
        }
    }
}

impl Display for InstanceLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} #{}", self.name, self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusDescriptor {
    name: String,
    path_template: String,
    indices: IndexRange,
    expected: bool,
}

impl CorpusDescriptor {
    /// Creates a descriptor. Nothing is checked here; see [`CorpusDescriptor::validate`].
    pub fn new(
        name: impl Into<String>,
        path_template: impl Into<String>,
        indices: IndexRange,
        expected: bool,
    ) -> Self {
        CorpusDescriptor {
            name: name.into(),
            path_template: path_template.into(),
            indices,
            expected,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path_template(&self) -> &str {
        &self.path_template
    }

    pub fn indices(&self) -> &IndexRange {
        &self.indices
    }

    /// `true` if every instance is expected to be satisfiable.
    pub fn expected(&self) -> bool {
        self.expected
    }

    pub fn validate(&self) -> Result<(), Error> {
        let found = self.path_template.matches(PLACEHOLDER).count();
        ensure!(
            found == 1,
            MalformedTemplate {
                name: &self.name,
                template: &self.path_template,
                found,
            }
        );
        ensure!(!self.indices.is_empty(), EmptyRange { name: &self.name });

        Ok(())
    }

    /// Substitutes the decimal `index` into the template.
    /// There is no padding: any zeros in the result come from the template itself.
    pub fn resolve(&self, index: u64) -> PathBuf {
        PathBuf::from(
            self.path_template
                .replacen(PLACEHOLDER, &index.to_string(), 1),
        )
    }

    pub fn label(&self, index: u64) -> InstanceLabel {
        InstanceLabel::new(self.name.as_str(), index)
    }

    /// All `(index, path)` pairs in ascending index order.
    pub fn instances(&self) -> impl Iterator<Item = (u64, PathBuf)> + '_ {
        self.indices.iter().map(move |index| (index, self.resolve(index)))
    }

    pub fn missing_files(&self) -> Vec<PathBuf> {
        self.instances()
            .map(|(_, path)| path)
            .filter(|path| !path.is_file())
            .collect()
    }
}
