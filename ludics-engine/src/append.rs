//! Act appender: the single write path onto a design's chronicle
//!
//! A batch is validated against the store plus the batch's own pending loci
//! before anything is written, so a rejected act leaves the whole batch
//! unapplied.

use std::collections::BTreeSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LudicsError, LudicsResult};
use crate::events::{EventBus, LudicsEvent};
use crate::locus::LocusPath;
use crate::state::{Act, ActBody, ActDraft, ActId, Polarity, StateStore, Tables};

/// Invariants checked per append call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppendOptions {
    /// Reject an act whose polarity matches the preceding act's
    pub enforce_alternation: bool,
    /// Reject a second distinct child under an additive locus
    pub enforce_additive_once: bool,
}

impl Default for AppendOptions {
    fn default() -> Self {
        Self {
            enforce_alternation: false,
            enforce_additive_once: true,
        }
    }
}

impl AppendOptions {
    pub fn alternating(mut self, on: bool) -> Self {
        self.enforce_alternation = on;
        self
    }

    pub fn additive_once(mut self, on: bool) -> Self {
        self.enforce_additive_once = on;
        self
    }
}

/// Result of a successful append
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendOutcome {
    /// Ids of the appended acts, in order
    pub appended: Vec<ActId>,
    /// Design version after this batch
    pub design_version: u64,
    /// Loci that did not exist before this batch
    pub created_loci: Vec<LocusPath>,
}

/// Loci as they will be once the pending part of the batch is applied
struct BatchView<'a> {
    tables: &'a Tables,
    dialogue_id: &'a str,
    created: BTreeSet<LocusPath>,
    additive: BTreeSet<LocusPath>,
}

impl<'a> BatchView<'a> {
    fn new(tables: &'a Tables, dialogue_id: &'a str) -> Self {
        Self {
            tables,
            dialogue_id,
            created: BTreeSet::new(),
            additive: BTreeSet::new(),
        }
    }

    fn exists(&self, path: &LocusPath) -> bool {
        self.created.contains(path) || self.tables.locus(self.dialogue_id, path).is_some()
    }

    fn is_additive(&self, path: &LocusPath) -> bool {
        self.additive.contains(path)
            || self
                .tables
                .locus(self.dialogue_id, path)
                .is_some_and(|l| l.is_additive)
    }

    fn children(&self, parent: &LocusPath) -> BTreeSet<LocusPath> {
        let mut out: BTreeSet<LocusPath> = self
            .tables
            .children(self.dialogue_id, parent)
            .into_iter()
            .collect();
        out.extend(
            self.created
                .iter()
                .filter(|p| p.parent().as_ref() == Some(parent))
                .cloned(),
        );
        out
    }

    fn ensure(&mut self, path: &LocusPath) {
        for p in path.ancestors().into_iter().chain(std::iter::once(path.clone())) {
            if !self.exists(&p) {
                self.created.insert(p);
            }
        }
    }
}

/// Check every draft of a batch without writing anything
fn validate_batch(
    tables: &Tables,
    dialogue_id: &str,
    design_id: &str,
    drafts: &[ActDraft],
    options: &AppendOptions,
) -> LudicsResult<()> {
    let mut view = BatchView::new(tables, dialogue_id);
    let mut previous: Option<(Option<Polarity>, String)> = tables
        .last_act(design_id)
        .map(|a| (a.polarity(), a.id.clone()));

    for (index, draft) in drafts.iter().enumerate() {
        let pending_id = format!("pending#{index}");
        let ActBody::Proper(proper) = &draft.body else {
            previous = Some((None, pending_id));
            continue;
        };

        if options.enforce_additive_once {
            if let Some(parent) = proper.locus.parent() {
                if view.is_additive(&parent) {
                    let existing = view
                        .children(&parent)
                        .into_iter()
                        .find(|c| c != &proper.locus);
                    if let Some(existing) = existing {
                        return Err(LudicsError::AdditiveReuse {
                            dialogue_id: dialogue_id.to_string(),
                            parent: parent.to_string(),
                            existing: existing.to_string(),
                            attempted: proper.locus.to_string(),
                        });
                    }
                }
            }
        }

        if options.enforce_alternation {
            if let Some((Some(prev_polarity), prev_id)) = &previous {
                if *prev_polarity == proper.polarity {
                    return Err(LudicsError::Alternation {
                        design_id: design_id.to_string(),
                        polarity: proper.polarity,
                        previous_act_id: prev_id.clone(),
                    });
                }
            }
        }

        view.ensure(&proper.locus);
        if proper.is_additive {
            view.additive.insert(proper.locus.clone());
        }
        previous = Some((Some(proper.polarity), pending_id));
    }
    Ok(())
}

/// Append a batch of acts to a design
///
/// Either every act is written (one version bump, one `ActAppended` event
/// per act) or none is.
pub async fn append_acts(
    store: &StateStore,
    bus: &EventBus,
    design_id: &str,
    drafts: Vec<ActDraft>,
    options: &AppendOptions,
) -> LudicsResult<AppendOutcome> {
    let mut events = Vec::with_capacity(drafts.len());
    let outcome = {
        let mut tables = store.write().await;
        let design = tables
            .design(design_id)
            .cloned()
            .ok_or_else(|| LudicsError::no_such_design(design_id))?;
        let dialogue_id = design.dialogue_id.clone();

        if drafts.is_empty() {
            return Ok(AppendOutcome {
                appended: Vec::new(),
                design_version: design.version,
                created_loci: Vec::new(),
            });
        }

        if let Err(err) = validate_batch(&tables, &dialogue_id, design_id, &drafts, options) {
            warn!(design_id, code = err.code(), "Append batch rejected: {}", err);
            return Err(err);
        }

        let mut next_order = tables
            .last_act(design_id)
            .map(|a| a.order_in_design + 1)
            .unwrap_or(0);
        let mut appended = Vec::with_capacity(drafts.len());
        let mut created_loci = Vec::new();
        let mut saw_daimon = false;

        for draft in drafts {
            if let ActBody::Proper(proper) = &draft.body {
                created_loci.extend(tables.ensure_locus(&dialogue_id, &proper.locus));
                if proper.is_additive {
                    tables.mark_additive(&dialogue_id, &proper.locus);
                }
            } else {
                saw_daimon = true;
            }

            let act = Act {
                id: uuid::Uuid::new_v4().to_string(),
                design_id: design_id.to_string(),
                order_in_design: next_order,
                body: draft.body,
                expression: draft.expression,
                meta: draft.meta,
                created_at: Utc::now(),
            };
            next_order += 1;

            debug!(
                design_id,
                act_id = %act.id,
                order = act.order_in_design,
                locus = act.locus().map(|l| l.as_str()).unwrap_or("-"),
                "Act appended"
            );
            events.push(LudicsEvent::ActAppended {
                dialogue_id: dialogue_id.clone(),
                design_id: design_id.to_string(),
                act_id: act.id.clone(),
                order_in_design: act.order_in_design,
                polarity: act.polarity(),
                locus: act.locus().cloned(),
                timestamp: act.created_at,
            });
            appended.push(act.id.clone());
            tables.insert_act(act);
        }

        let design_version = match tables.design_mut(design_id) {
            Some(d) => {
                d.version += 1;
                d.has_daimon |= saw_daimon;
                d.version
            }
            None => design.version + 1,
        };

        AppendOutcome {
            appended,
            design_version,
            created_loci,
        }
    };

    for event in events {
        bus.publish(event)?;
    }
    Ok(outcome)
}
