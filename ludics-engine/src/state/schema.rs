//! Table definitions for the ludics state store
//!
//! Each table is an ordered map keyed by the compound keys below, so prefix
//! scans return chronicles and traces in insertion order.

/// Table of loci
pub const T_LOCI: &str = "loci";

/// Table of designs
pub const T_DESIGNS: &str = "designs";

/// Table of acts
pub const T_ACTS: &str = "acts";

/// Table of chronicle entries
pub const T_CHRONICLES: &str = "chronicles";

/// Table of traversal traces
pub const T_TRACES: &str = "traces";

/// Table of commitment elements
pub const T_COMMITMENTS: &str = "commitments";

/// All table names
pub const ALL_TABLES: &[&str] = &[
    T_LOCI,
    T_DESIGNS,
    T_ACTS,
    T_CHRONICLES,
    T_TRACES,
    T_COMMITMENTS,
];

/// Key prefixes for compound keys
pub mod keys {
    /// Locus key (dialogue + path)
    pub fn locus(dialogue_id: &str, path: &str) -> String {
        format!("locus:{}:{}", dialogue_id, path)
    }

    /// Prefix of every locus of a dialogue
    pub fn locus_prefix(dialogue_id: &str) -> String {
        format!("locus:{}:", dialogue_id)
    }

    /// Design key
    pub fn design(design_id: &str) -> String {
        format!("design:{}", design_id)
    }

    /// Act key, zero-padded so lexical order equals chronicle order
    pub fn act(design_id: &str, order: u32) -> String {
        format!("act:{}:{:010}", design_id, order)
    }

    pub fn act_prefix(design_id: &str) -> String {
        format!("act:{}:", design_id)
    }

    /// Chronicle entry key
    pub fn chronicle(design_id: &str, order: u32) -> String {
        format!("chron:{}:{:010}", design_id, order)
    }

    pub fn chronicle_prefix(design_id: &str) -> String {
        format!("chron:{}:", design_id)
    }

    /// Trace key, ordered by the store's write sequence
    pub fn trace(dialogue_id: &str, seq: u64, trace_id: &str) -> String {
        format!("trace:{}:{:020}:{}", dialogue_id, seq, trace_id)
    }

    /// Sequence number of a trace key
    pub fn trace_seq(key: &str) -> Option<u64> {
        let mut parts = key.rsplitn(3, ':');
        parts.next()?;
        parts.next()?.parse().ok()
    }

    pub fn trace_prefix(dialogue_id: &str) -> String {
        format!("trace:{}:", dialogue_id)
    }

    /// Commitment key, owner first so entitlement flips can scan by owner
    pub fn commitment(owner_id: &str, dialogue_id: &str, element_id: &str) -> String {
        format!("cs:{}:{}:{}", owner_id, dialogue_id, element_id)
    }

    pub fn commitment_owner_prefix(owner_id: &str) -> String {
        format!("cs:{}:", owner_id)
    }

    pub fn commitment_prefix(owner_id: &str, dialogue_id: &str) -> String {
        format!("cs:{}:{}:", owner_id, dialogue_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        assert_eq!(keys::locus("d1", "0.1"), "locus:d1:0.1");
        assert_eq!(keys::design("abc"), "design:abc");
        assert_eq!(keys::act("abc", 7), "act:abc:0000000007");
        assert_eq!(keys::chronicle("abc", 7), "chron:abc:0000000007");
        assert_eq!(keys::commitment("P", "d1", "e1"), "cs:P:d1:e1");
    }

    #[test]
    fn test_act_key_ordering() {
        assert!(keys::act("d", 9) < keys::act("d", 10));
        assert!(keys::act("d", 10).starts_with(&keys::act_prefix("d")));
    }

    #[test]
    fn test_trace_key_ordering() {
        let k1 = keys::trace("d1", 9, "t-b");
        let k2 = keys::trace("d1", 10, "t-a");
        assert!(k1 < k2);
        assert_eq!(keys::trace_seq(&k2), Some(10));
        assert_eq!(keys::trace_seq("trace:d1"), None);
    }
}
