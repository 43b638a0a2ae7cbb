//! Input files accepted by the CLI
//!
//! - Move logs: a JSON array of dialogue moves, or `{ "moves": [...] }`
//! - Commitment files: `{ "dialogueId": "...", "owners": { "<owner>": <update> } }`

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ludics_engine::{CsUpdate, DialogueMove};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum MoveFile {
    Bare(Vec<DialogueMove>),
    Wrapped { moves: Vec<DialogueMove> },
}

/// Parse a move log from JSON text.
pub fn parse_moves(content: &str) -> Result<Vec<DialogueMove>> {
    let file: MoveFile = serde_json::from_str(content).context("Invalid move log JSON")?;
    Ok(match file {
        MoveFile::Bare(moves) | MoveFile::Wrapped { moves } => moves,
    })
}

pub fn load_moves(path: &Path) -> Result<Vec<DialogueMove>> {
    let content =
        std::fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
    parse_moves(&content).context(format!("Failed to load moves from {}", path.display()))
}

/// Dialogue to operate on: the explicit id, or the only one in the log.
pub fn dialogue_id(explicit: Option<&str>, moves: &[DialogueMove]) -> Result<String> {
    if let Some(id) = explicit {
        return Ok(id.to_string());
    }
    let mut ids: Vec<&str> = moves.iter().map(|m| m.deliberation_id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    match ids.as_slice() {
        [one] => Ok(one.to_string()),
        [] => bail!("Move log is empty; pass --dialogue"),
        many => bail!("Move log spans {} dialogues; pass --dialogue", many.len()),
    }
}

/// Commitment stores to load before running inference.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentFile {
    #[serde(default)]
    pub dialogue_id: Option<String>,
    /// Owner id to the update applied to that owner's store
    pub owners: BTreeMap<String, CsUpdate>,
}

impl CommitmentFile {
    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Invalid commitment file JSON")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
        Self::parse(&content).context(format!("Failed to load commitments from {}", path.display()))
    }
}
