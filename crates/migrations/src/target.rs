//! Target Resolver
//!
//! Maps a user-supplied target token to a cut point in the migration order:
//! every migration before the index ends up applied, every one at or after
//! it ends up unapplied.

use std::fmt;
use std::str::FromStr;

use crate::error::{MigrationError, MigrationResult};
use crate::graph::MigrationGraph;

/// Desired end state of a migrate run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Target {
    /// Everything applied
    #[default]
    Latest,
    /// Everything reverted
    Zero,
    /// Up to and including the single migration whose name starts with the prefix
    Prefix(String),
}

impl Target {
    /// Interpret an optional CLI token; `None` means latest
    pub fn parse(token: Option<&str>) -> Self {
        match token {
            None => Target::Latest,
            Some(token) if token.eq_ignore_ascii_case("zero") => Target::Zero,
            Some(token) if token.eq_ignore_ascii_case("latest") => Target::Latest,
            Some(token) => Target::Prefix(token.to_string()),
        }
    }

    /// Resolve against a graph, returning an index in `0..=graph.len()`
    pub fn resolve(&self, graph: &MigrationGraph) -> MigrationResult<usize> {
        match self {
            Target::Latest => Ok(graph.len()),
            Target::Zero => Ok(0),
            Target::Prefix(prefix) => {
                let matches: Vec<(usize, &str)> = graph
                    .iter()
                    .enumerate()
                    .filter(|(_, record)| record.name().starts_with(prefix.as_str()))
                    .map(|(index, record)| (index, record.name()))
                    .collect();

                match matches.as_slice() {
                    [] => Err(MigrationError::NoMatchingTarget(prefix.clone())),
                    [(index, _)] => Ok(index + 1),
                    _ => Err(MigrationError::AmbiguousTarget {
                        target: prefix.clone(),
                        matches: matches.iter().map(|(_, name)| name.to_string()).collect(),
                    }),
                }
            }
        }
    }
}

impl FromStr for Target {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Target::parse(Some(s)))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Latest => write!(f, "latest"),
            Target::Zero => write!(f, "zero"),
            Target::Prefix(prefix) => write!(f, "{}", prefix),
        }
    }
}

/// Resolve an optional target token against a graph
pub fn resolve(graph: &MigrationGraph, token: Option<&str>) -> MigrationResult<usize> {
    Target::parse(token).resolve(graph)
}
