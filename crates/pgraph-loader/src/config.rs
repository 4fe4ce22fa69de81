//! Loader configuration
//!
//! A `LoaderConfig` is read from JSON (every field has a default) and
//! validated once against the worker count before any collective starts.
//!
//! ```json
//! {
//!   "vertex_label_num": 1,
//!   "edge_label_num": 1,
//!   "vertex_files": "data/person",
//!   "edge_files": "data/knows",
//!   "relations": [[["person", "person"]]],
//!   "partitioner": "segmented",
//!   "directed": true
//! }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use pgraph_comm::{CommSpec, Fid};
use serde::{Deserialize, Serialize};

use crate::error::{LoadError, Result};
use crate::LabelId;

/// Which vertex partitioner a load uses. Fixed for the whole load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    #[default]
    Hash,
    Segmented,
}

impl FromStr for PartitionStrategy {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "segmented" | "segment" | "range" => Ok(Self::Segmented),
            other => Err(LoadError::Invalid(format!("unknown partitioner '{other}'"))),
        }
    }
}

impl fmt::Display for PartitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash => write!(f, "hash"),
            Self::Segmented => write!(f, "segmented"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub vertex_label_num: usize,
    pub edge_label_num: usize,
    /// Semicolon-separated path prefixes; label `L` reads `<prefix>_<L>`.
    pub vertex_files: String,
    pub edge_files: String,
    /// Optional label names, in label order.
    pub vertex_labels: Vec<String>,
    pub edge_labels: Vec<String>,
    /// Per edge label: `(source label, destination label)` pairs by name.
    /// Missing or empty entries mean "any vertex label".
    pub relations: Vec<Vec<(String, String)>>,
    pub partitioner: PartitionStrategy,
    pub directed: bool,
    pub id_column: usize,
    pub src_column: usize,
    pub dst_column: usize,
    /// `assignment[w]` is the partition owned by worker `w`.
    pub assignment: Option<Vec<Fid>>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            vertex_label_num: 0,
            edge_label_num: 0,
            vertex_files: String::new(),
            edge_files: String::new(),
            vertex_labels: Vec::new(),
            edge_labels: Vec::new(),
            relations: Vec::new(),
            partitioner: PartitionStrategy::Hash,
            directed: true,
            id_column: 0,
            src_column: 0,
            dst_column: 1,
            assignment: None,
        }
    }
}

impl LoaderConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| LoadError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn vertex_prefixes(&self) -> Vec<&str> {
        split_prefixes(&self.vertex_files)
    }

    pub fn edge_prefixes(&self) -> Vec<&str> {
        split_prefixes(&self.edge_files)
    }

    pub fn vertex_label_name(&self, label: LabelId) -> String {
        self.vertex_labels
            .get(label)
            .cloned()
            .unwrap_or_else(|| format!("vertex_{label}"))
    }

    pub fn edge_label_name(&self, label: LabelId) -> String {
        self.edge_labels
            .get(label)
            .cloned()
            .unwrap_or_else(|| format!("edge_{label}"))
    }

    /// Index of the vertex label called `name`.
    pub fn vertex_label_index(&self, name: &str) -> Option<LabelId> {
        (0..self.vertex_label_num).find(|&l| self.vertex_label_name(l) == name)
    }

    /// Configured relations of `edge_label` as vertex label indices.
    pub fn edge_relations(&self, edge_label: LabelId) -> Result<Vec<(LabelId, LabelId)>> {
        let Some(pairs) = self.relations.get(edge_label) else {
            return Ok(Vec::new());
        };
        pairs
            .iter()
            .map(|(src, dst)| {
                let lookup = |name: &str| {
                    self.vertex_label_index(name).ok_or_else(|| {
                        LoadError::Invalid(format!(
                            "edge label '{}' refers to unknown vertex label '{name}'",
                            self.edge_label_name(edge_label)
                        ))
                    })
                };
                Ok((lookup(src)?, lookup(dst)?))
            })
            .collect()
    }

    /// Worker layout for `worker_id` out of `worker_num`.
    pub fn comm_spec(&self, worker_id: usize, worker_num: usize) -> Result<CommSpec> {
        let spec = match &self.assignment {
            Some(assignment) => {
                if assignment.len() != worker_num {
                    return Err(LoadError::Invalid(format!(
                        "assignment lists {} partitions for {worker_num} workers",
                        assignment.len()
                    )));
                }
                CommSpec::with_assignment(worker_id, assignment.clone())?
            }
            None => CommSpec::new(worker_id, worker_num)?,
        };
        Ok(spec)
    }

    pub fn validate(&self, worker_num: usize) -> Result<()> {
        if self.vertex_label_num == 0 {
            return Err(LoadError::Invalid("at least one vertex label is required".to_string()));
        }
        if self.vertex_labels.len() > self.vertex_label_num {
            return Err(LoadError::Invalid(format!(
                "{} vertex label names for {} vertex labels",
                self.vertex_labels.len(),
                self.vertex_label_num
            )));
        }
        if self.edge_labels.len() > self.edge_label_num {
            return Err(LoadError::Invalid(format!(
                "{} edge label names for {} edge labels",
                self.edge_labels.len(),
                self.edge_label_num
            )));
        }
        if self.relations.len() > self.edge_label_num {
            return Err(LoadError::Invalid(format!(
                "relations given for {} edge labels, only {} exist",
                self.relations.len(),
                self.edge_label_num
            )));
        }
        check_unique((0..self.vertex_label_num).map(|l| self.vertex_label_name(l)), "vertex")?;
        check_unique((0..self.edge_label_num).map(|l| self.edge_label_name(l)), "edge")?;
        for label in 0..self.edge_label_num {
            self.edge_relations(label)?;
        }
        if self.src_column == self.dst_column {
            return Err(LoadError::Invalid(format!(
                "source and destination share column {}",
                self.src_column
            )));
        }
        // Permutation check lives in CommSpec.
        self.comm_spec(0, worker_num)?;
        Ok(())
    }
}

fn split_prefixes(files: &str) -> Vec<&str> {
    files
        .split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

fn check_unique(names: impl Iterator<Item = String>, kind: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.clone()) {
            return Err(LoadError::Invalid(format!("duplicate {kind} label name '{name}'")));
        }
    }
    Ok(())
}
