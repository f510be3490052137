//! Instrumentation front-end contract.
//!
//! The core never parses or rewrites source: an external
//! front-end — language-specific, living outside this crate — hands over
//! a flat list of [`Checkpoint`] records (`{id, type, name, line,
//! column, context}`, mirroring `codegreen`'s `CodeCheckpoint` struct)
//! and, at runtime, drives [`crate::meter::EnergyMeter::mark_checkpoint`]
//! in execution order. This module defines that narrow contract plus the
//! JSON wire record the front-end emits it in, and a `NullFrontEnd` that
//! implements it as "no checkpoints" for hosts with no wired-in front end.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::correlator::{Checkpoint, CheckpointType};
use crate::error::{NembError, Result};

/// The `{id, type, name, line, column}` record the front-end emits,
/// serialized exactly as the external contract names the fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub checkpoint_type: String,
    pub name: String,
    pub line: usize,
    pub column: usize,
    #[serde(default)]
    pub context: String,
}

impl CheckpointRecord {
    pub fn into_checkpoint(self) -> Result<Checkpoint> {
        let checkpoint_type = CheckpointType::from_key(&self.checkpoint_type).ok_or_else(|| {
            NembError::InvalidArgument(format!("unknown checkpoint type: {}", self.checkpoint_type))
        })?;
        Ok(Checkpoint {
            id: self.id,
            checkpoint_type,
            name: self.name,
            line: self.line,
            column: self.column,
            context: self.context,
        })
    }
}

/// Contract an external instrumentation front-end satisfies: given a
/// source file, return the checkpoints it would instrument. Compiling,
/// executing, and rewriting source are the front-end's job, not this
/// crate's job.
pub trait InstrumentationFrontEnd {
    fn checkpoints_for(&self, source_path: &Path) -> Result<Vec<Checkpoint>>;

    /// Front-end-reported language tag for the file, e.g. `"python"`.
    fn language_for(&self, source_path: &Path) -> String {
        source_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| match ext {
                "py" => "python",
                "rs" => "rust",
                "java" => "java",
                "js" | "mjs" => "javascript",
                "c" => "c",
                "cc" | "cpp" | "cxx" => "cpp",
                other => other,
            })
            .unwrap_or("unknown")
            .to_string()
    }
}

/// Placeholder front-end returning no checkpoints. Used where no
/// language-specific instrumentation front-end is wired in; callers still
/// get a well-formed (empty) session rather than an error.
#[derive(Debug, Default)]
pub struct NullFrontEnd;

impl InstrumentationFrontEnd for NullFrontEnd {
    fn checkpoints_for(&self, _source_path: &Path) -> Result<Vec<Checkpoint>> {
        Ok(Vec::new())
    }
}

/// Parses a front-end's JSON checkpoint-list payload (an array of
/// [`CheckpointRecord`]) into correlator checkpoints.
pub fn parse_checkpoint_list(json: &str) -> Result<Vec<Checkpoint>> {
    let records: Vec<CheckpointRecord> = serde_json::from_str(json)?;
    records.into_iter().map(CheckpointRecord::into_checkpoint).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_front_end_returns_no_checkpoints() {
        let front_end = NullFrontEnd;
        let checkpoints = front_end.checkpoints_for(Path::new("anything.py")).unwrap();
        assert!(checkpoints.is_empty());
    }

    #[test]
    fn language_for_maps_known_extensions() {
        let front_end = NullFrontEnd;
        assert_eq!(front_end.language_for(Path::new("a.py")), "python");
        assert_eq!(front_end.language_for(Path::new("a.rs")), "rust");
        assert_eq!(front_end.language_for(Path::new("a.unknown")), "unknown");
    }

    #[test]
    fn parses_checkpoint_list_json() {
        let json = r#"[
            {"id": "c1", "type": "function_enter", "name": "main", "line": 10, "column": 0, "context": ""},
            {"id": "c2", "type": "loop_start", "name": "main", "line": 12, "column": 4, "context": "for loop"}
        ]"#;
        let checkpoints = parse_checkpoint_list(json).unwrap();
        assert_eq!(checkpoints.len(), 2);
        assert_eq!(checkpoints[0].checkpoint_type, CheckpointType::FunctionEnter);
        assert_eq!(checkpoints[1].line, 12);
    }

    #[test]
    fn rejects_unknown_checkpoint_type() {
        let json = r#"[{"id": "c1", "type": "bogus", "name": "x", "line": 1, "column": 0}]"#;
        assert!(parse_checkpoint_list(json).is_err());
    }
}
