//! Post-traversal analysis: daimon hints, decisive slice, endorsement

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::locus::LocusPath;
use crate::state::{Act, Participant, TracePair};

/// Expressions that mark a negative act as an acknowledgment
const ACK_WORDS: &[&str] = &["ack", "acknowledge", "concede", "accept", "agreed"];

/// A closed branch where a daimon would be legal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaimonHint {
    pub locus_path: LocusPath,
    pub reason: String,
}

/// What the endorsement was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndorsementBasis {
    /// The final negative act acknowledged the claim
    Acknowledgment,
    /// A side closed its chronicle with a daimon
    Daimon,
}

/// Who endorsed a convergent interaction, and where
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endorsement {
    pub participant: Participant,
    pub locus_path: LocusPath,
    pub basis: EndorsementBasis,
}

/// Every locus opened by a positive act with no ramification, first-seen order
pub fn daimon_hints<'a>(acts: impl IntoIterator<Item = &'a Act>) -> Vec<DaimonHint> {
    let mut seen = HashSet::new();
    acts.into_iter()
        .filter(|a| a.is_positive())
        .filter_map(Act::proper)
        .filter(|p| p.ramification.is_empty())
        .filter(|p| seen.insert(p.locus.clone()))
        .map(|p| DaimonHint {
            locus_path: p.locus.clone(),
            reason: "no-openings".to_string(),
        })
        .collect()
}

/// Minimal explain-why slice of a pair sequence, ascending
///
/// Walks back from the last pair following positive justifications, keeping
/// pairs nested under the tracked locus. Falls back to the last three pairs
/// when fewer than two are kept.
pub fn decisive_indices(
    pairs: &[TracePair],
    justification: &HashMap<String, LocusPath>,
) -> Vec<usize> {
    let Some(last) = pairs.len().checked_sub(1) else {
        return Vec::new();
    };

    let tracked_for = |i: usize| -> LocusPath {
        justification
            .get(&pairs[i].pos_act_id)
            .cloned()
            .unwrap_or_else(|| pairs[i].locus_path.clone())
    };

    let mut kept = vec![last];
    let mut tracked = tracked_for(last);
    for i in (0..last).rev() {
        if pairs[i].locus_path.is_under(&tracked) {
            kept.push(i);
            tracked = tracked_for(i);
        }
    }

    if kept.len() < 2 {
        return (pairs.len().saturating_sub(3)..pairs.len()).collect();
    }
    kept.reverse();
    kept
}

/// Whether a negative act reads as an acknowledgment
pub fn is_acknowledgment(act: &Act) -> bool {
    if act.meta.ack {
        return true;
    }
    let expr = act.expression.trim().to_lowercase();
    ACK_WORDS.contains(&expr.as_str())
}

/// Endorsement of a convergent run
///
/// `final_negative` is the last pair's negative act (absent when synthetic);
/// `daimon_by` is the participant whose daimon ended the run.
pub fn endorsement(
    last_pair: Option<&TracePair>,
    final_negative: Option<(&Act, Participant)>,
    daimon_by: Option<Participant>,
) -> Option<Endorsement> {
    let locus_path = last_pair
        .map(|p| p.locus_path.clone())
        .unwrap_or_else(LocusPath::root);

    if let Some((act, participant)) = final_negative {
        if is_acknowledgment(act) {
            return Some(Endorsement {
                participant,
                locus_path,
                basis: EndorsementBasis::Acknowledgment,
            });
        }
    }
    daimon_by.map(|participant| Endorsement {
        participant,
        locus_path,
        basis: EndorsementBasis::Daimon,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ActBody, ActMeta, Polarity, ProperAct};
    use chrono::Utc;

    fn p(s: &str) -> LocusPath {
        LocusPath::parse(s).unwrap()
    }

    fn pair(id: &str, locus: &str) -> TracePair {
        TracePair {
            pos_act_id: id.to_string(),
            neg_act_id: format!("n-{id}"),
            locus_path: p(locus),
            synthetic: false,
        }
    }

    fn proper(polarity: Polarity, locus: &str, ram: &[&str], expr: &str) -> Act {
        Act {
            id: uuid::Uuid::new_v4().to_string(),
            design_id: "d".to_string(),
            order_in_design: 0,
            body: ActBody::Proper(ProperAct {
                polarity,
                locus: p(locus),
                ramification: ram.iter().map(|s| s.to_string()).collect(),
                is_additive: false,
                justified_by: None,
            }),
            expression: expr.to_string(),
            meta: ActMeta::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_decisive_follows_justification_chain() {
        let pairs = vec![
            pair("a", "0.1"),
            pair("b", "0.2"),
            pair("c", "0.1.1"),
            pair("d", "0.1.1.1"),
        ];
        let just: HashMap<String, LocusPath> = [
            ("c".to_string(), p("0.1")),
            ("d".to_string(), p("0.1.1")),
        ]
        .into_iter()
        .collect();
        assert_eq!(decisive_indices(&pairs, &just), vec![0, 2, 3]);
    }

    #[test]
    fn test_decisive_falls_back_to_last_three() {
        let pairs = vec![
            pair("a", "0.1"),
            pair("b", "0.2"),
            pair("c", "0.3"),
            pair("d", "0.4"),
        ];
        assert_eq!(decisive_indices(&pairs, &HashMap::new()), vec![1, 2, 3]);
        assert_eq!(decisive_indices(&pairs[..1], &HashMap::new()), vec![0]);
        assert!(decisive_indices(&[], &HashMap::new()).is_empty());
    }

    #[test]
    fn test_daimon_hints_dedup_and_skip_negatives() {
        let acts = vec![
            proper(Polarity::Positive, "0.1", &["1"], "open"),
            proper(Polarity::Positive, "0.2", &[], "closed"),
            proper(Polarity::Positive, "0.2", &[], "closed again"),
            proper(Polarity::Negative, "0.3", &[], "why"),
        ];
        let hints = daimon_hints(&acts);
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].locus_path, p("0.2"));
        assert_eq!(hints[0].reason, "no-openings");
    }

    #[test]
    fn test_ack_endorsement_wins_over_daimon() {
        let ack = proper(Polarity::Negative, "0", &[], "Ack");
        let last = pair("a", "0");
        let e = endorsement(
            Some(&last),
            Some((&ack, Participant::Opponent)),
            Some(Participant::Proponent),
        )
        .unwrap();
        assert_eq!(e.participant, Participant::Opponent);
        assert_eq!(e.basis, EndorsementBasis::Acknowledgment);
        assert_eq!(e.locus_path, p("0"));
    }

    #[test]
    fn test_daimon_endorsement() {
        let why = proper(Polarity::Negative, "0", &[], "why?");
        let last = pair("a", "0");
        let e = endorsement(
            Some(&last),
            Some((&why, Participant::Opponent)),
            Some(Participant::Proponent),
        )
        .unwrap();
        assert_eq!(e.participant, Participant::Proponent);
        assert_eq!(e.basis, EndorsementBasis::Daimon);
        assert!(endorsement(None, None, None).is_none());
    }
}
