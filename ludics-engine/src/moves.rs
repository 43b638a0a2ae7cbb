//! Dialogue move log collaborator
//!
//! The engine never stores raw moves. It reads them, ordered by creation
//! time, from a [`MoveLog`] and resolves target identities through a
//! [`TargetResolver`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::LudicsResult;

/// Recognised move kinds; anything else is carried as `Other`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MoveKind {
    Assert,
    Why,
    Grounds,
    Retract,
    Concede,
    Close,
    Therefore,
    Suppose,
    Discharge,
    Other(String),
}

impl MoveKind {
    /// Case-insensitive parse of a move kind string
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "ASSERT" => MoveKind::Assert,
            "WHY" => MoveKind::Why,
            "GROUNDS" => MoveKind::Grounds,
            "RETRACT" => MoveKind::Retract,
            "CONCEDE" => MoveKind::Concede,
            "CLOSE" => MoveKind::Close,
            "THEREFORE" => MoveKind::Therefore,
            "SUPPOSE" => MoveKind::Suppose,
            "DISCHARGE" => MoveKind::Discharge,
            other => MoveKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MoveKind::Assert => "ASSERT",
            MoveKind::Why => "WHY",
            MoveKind::Grounds => "GROUNDS",
            MoveKind::Retract => "RETRACT",
            MoveKind::Concede => "CONCEDE",
            MoveKind::Close => "CLOSE",
            MoveKind::Therefore => "THEREFORE",
            MoveKind::Suppose => "SUPPOSE",
            MoveKind::Discharge => "DISCHARGE",
            MoveKind::Other(s) => s,
        }
    }
}

impl std::fmt::Display for MoveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Polarity tag of an explicit payload act
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadPolarity {
    Pos,
    Neg,
    Daimon,
}

/// An act spelled out verbatim in a move payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PayloadAct {
    pub polarity: Option<PayloadPolarity>,
    pub locus_path: Option<String>,
    pub openings: Vec<String>,
    pub additive: bool,
    pub expression: Option<String>,
}

/// Free-form move payload fields the compiler understands
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MovePayload {
    pub locus_path: Option<String>,
    pub child_suffix: Option<String>,
    pub text: Option<String>,
    pub note: Option<String>,
    pub brief: Option<String>,
    pub expression: Option<String>,
    pub ramification: Option<Vec<String>>,
    pub additive: bool,
    pub acts: Option<Vec<PayloadAct>>,
    /// Target keys of other scopes this move cites
    pub references: Vec<String>,
    pub scheme_key: Option<String>,
    pub cq_id: Option<String>,
    pub evidence_design_id: Option<String>,
    /// Marks a challenge-side move as an acknowledgment
    pub ack: bool,
}

/// One row of a deliberation's move log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueMove {
    pub id: String,
    pub deliberation_id: String,
    pub kind: String,
    #[serde(default)]
    pub target_type: Option<String>,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub actor_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub payload: MovePayload,
    /// Declared side, `P` or `O`
    #[serde(default)]
    pub polarity: Option<String>,
    /// Id of a persisted locus this move is anchored at
    #[serde(default)]
    pub locus_id: Option<String>,
    #[serde(default)]
    pub ends_with_daimon: bool,
}

impl DialogueMove {
    /// Minimal move, mostly for tests and fixtures
    pub fn new(deliberation_id: &str, kind: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            deliberation_id: deliberation_id.to_string(),
            kind: kind.to_string(),
            target_type: None,
            target_id: None,
            actor_id: None,
            created_at: Utc::now(),
            payload: MovePayload::default(),
            polarity: None,
            locus_id: None,
            ends_with_daimon: false,
        }
    }

    pub fn with_target(mut self, target_type: &str, target_id: &str) -> Self {
        self.target_type = Some(target_type.to_string());
        self.target_id = Some(target_id.to_string());
        self
    }

    pub fn with_actor(mut self, actor_id: &str) -> Self {
        self.actor_id = Some(actor_id.to_string());
        self
    }

    pub fn with_payload(mut self, payload: MovePayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.payload.text = Some(text.to_string());
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn terminal(mut self) -> Self {
        self.ends_with_daimon = true;
        self
    }

    pub fn move_kind(&self) -> MoveKind {
        MoveKind::parse(&self.kind)
    }

    /// `{targetType}:{targetId}` when both are present
    pub fn target_key(&self) -> Option<String> {
        match (&self.target_type, &self.target_id) {
            (Some(tt), Some(id)) if !tt.is_empty() && !id.is_empty() => {
                Some(format!("{tt}:{id}"))
            }
            _ => None,
        }
    }

    /// Display text: text, note, brief, expression, then the kind itself
    pub fn expression(&self) -> String {
        let p = &self.payload;
        p.text
            .as_ref()
            .or(p.note.as_ref())
            .or(p.brief.as_ref())
            .or(p.expression.as_ref())
            .cloned()
            .unwrap_or_else(|| self.move_kind().to_string())
    }
}

/// Ordered, queryable source of dialogue moves
#[async_trait]
pub trait MoveLog: Send + Sync {
    /// Moves of a deliberation ordered by `created_at`
    async fn moves(&self, deliberation_id: &str) -> LudicsResult<Vec<DialogueMove>>;
}

/// Move log held in memory
#[derive(Debug, Default)]
pub struct InMemoryMoveLog {
    moves: RwLock<HashMap<String, Vec<DialogueMove>>>,
}

impl InMemoryMoveLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from an unordered list of moves
    pub fn from_moves(moves: impl IntoIterator<Item = DialogueMove>) -> Self {
        let mut by_dialogue: HashMap<String, Vec<DialogueMove>> = HashMap::new();
        for m in moves {
            by_dialogue
                .entry(m.deliberation_id.clone())
                .or_default()
                .push(m);
        }
        Self {
            moves: RwLock::new(by_dialogue),
        }
    }

    pub async fn push(&self, m: DialogueMove) {
        self.moves
            .write()
            .await
            .entry(m.deliberation_id.clone())
            .or_default()
            .push(m);
    }

    pub async fn extend(&self, moves: impl IntoIterator<Item = DialogueMove>) {
        let mut guard = self.moves.write().await;
        for m in moves {
            guard.entry(m.deliberation_id.clone()).or_default().push(m);
        }
    }

    pub async fn clear(&self, deliberation_id: &str) {
        self.moves.write().await.remove(deliberation_id);
    }
}

#[async_trait]
impl MoveLog for InMemoryMoveLog {
    async fn moves(&self, deliberation_id: &str) -> LudicsResult<Vec<DialogueMove>> {
        let mut moves = self
            .moves
            .read()
            .await
            .get(deliberation_id)
            .cloned()
            .unwrap_or_default();
        // Stable: equal timestamps keep insertion order
        moves.sort_by_key(|m| m.created_at);
        Ok(moves)
    }
}

/// Maps a move target to the root topic it belongs to
#[async_trait]
pub trait TargetResolver: Send + Sync {
    async fn root_topic(&self, target_type: &str, target_id: &str) -> Option<String>;
}

/// Every target is its own topic
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityResolver;

#[async_trait]
impl TargetResolver for IdentityResolver {
    async fn root_topic(&self, _target_type: &str, target_id: &str) -> Option<String> {
        Some(target_id.to_string())
    }
}

/// Fixed target-id to topic table, falling back to identity
#[derive(Debug, Default, Clone)]
pub struct MapResolver {
    topics: HashMap<String, String>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, target_id: &str, topic: &str) -> Self {
        self.topics.insert(target_id.to_string(), topic.to_string());
        self
    }
}

#[async_trait]
impl TargetResolver for MapResolver {
    async fn root_topic(&self, _target_type: &str, target_id: &str) -> Option<String> {
        Some(
            self.topics
                .get(target_id)
                .cloned()
                .unwrap_or_else(|| target_id.to_string()),
        )
    }
}
