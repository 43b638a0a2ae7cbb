//! Forward-chaining over a commitment store

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::rules::{parse_literal, parse_rule, Literal, Rule};
use crate::state::CommitmentElement;

/// A fact produced by firing a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedFact {
    /// Rendered literal, `not X` for a negated atom
    pub label: String,
    pub literal: Literal,
    /// Rule that first produced it
    pub rule: String,
}

/// An atom held both positively and negatively
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Contradiction {
    pub a: String,
    pub b: String,
}

/// Rule string that failed to parse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedRule {
    pub label: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub derived_facts: Vec<DerivedFact>,
    pub contradictions: Vec<Contradiction>,
    pub malformed_rules: Vec<MalformedRule>,
}

/// Fact literal of an element; unparseable labels are taken as a bare atom
pub fn fact_literal(label: &str) -> Literal {
    parse_literal(label)
        .unwrap_or_else(|_| Literal::positive(label.split_whitespace().collect::<Vec<_>>().join(" ")))
}

/// Derive every consequence of the entitled facts and rules, to fixpoint
pub fn infer<'a>(elements: impl IntoIterator<Item = &'a CommitmentElement>) -> InferenceResult {
    let mut result = InferenceResult::default();
    let mut facts: BTreeSet<Literal> = BTreeSet::new();
    let mut rules: Vec<(Rule, &str)> = Vec::new();

    for element in elements.into_iter().filter(|e| e.entitled) {
        if element.is_fact() {
            facts.insert(fact_literal(&element.label));
            continue;
        }
        match parse_rule(&element.label) {
            Ok(rule) => rules.push((rule, element.label.as_str())),
            Err(e) => {
                warn!(owner_id = %element.owner_id, rule = %element.label, "Skipping malformed rule: {}", e);
                result.malformed_rules.push(MalformedRule {
                    label: element.label.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    loop {
        let mut fired = false;
        for (rule, label) in &rules {
            if facts.contains(&rule.consequent) {
                continue;
            }
            if rule.antecedent.iter().all(|l| facts.contains(l)) {
                facts.insert(rule.consequent.clone());
                result.derived_facts.push(DerivedFact {
                    label: rule.consequent.to_string(),
                    literal: rule.consequent.clone(),
                    rule: label.trim().to_string(),
                });
                fired = true;
            }
        }
        if !fired {
            break;
        }
    }

    result.contradictions = facts
        .iter()
        .filter(|l| !l.negated && facts.contains(&l.complement()))
        .map(|l| Contradiction {
            a: l.atom.clone(),
            b: l.complement().to_string(),
        })
        .collect();

    result
}
