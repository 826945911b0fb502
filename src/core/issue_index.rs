//! Multi-index issue store.
//!
//! Keeps a primary id map plus status/severity/category set indexes and
//! count vectors in lock-step, with a sliding window over recent transition
//! rounds for O(1) stability checks.

use std::collections::{HashMap, HashSet};

use crate::core::issues::{Issue, IssueCategory, IssueStatus, Severity};

/// Sliding window (in rounds) over which transitions count as recent.
pub const TRANSITION_WINDOW: u32 = 2;

/// Issue store with per-dimension secondary indexes.
#[derive(Debug, Default)]
pub struct IssueIndex {
    /// Primary mapping from canonical id to issue.
    issues: HashMap<String, Issue>,
    /// Ids grouped by status.
    by_status: HashMap<IssueStatus, HashSet<String>>,
    /// Ids grouped by severity.
    by_severity: HashMap<Severity, HashSet<String>>,
    /// Ids grouped by category.
    by_category: HashMap<IssueCategory, HashSet<String>>,
    /// Dense status counts, kept equal to the index cardinalities.
    status_counts: [usize; 7],
    /// Dense severity counts.
    severity_counts: [usize; 4],
    /// Dense category counts.
    category_counts: [usize; 5],
    /// Transition rounds seen, for the recency window.
    transition_rounds: Vec<u32>,
}

impl IssueIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index from a session's issue list.
    pub fn rebuild(issues: &[Issue]) -> Self {
        let mut index = Self::new();
        for issue in issues {
            index.insert(issue.clone());
        }
        index
    }

    /// Insert or replace an issue, keeping all secondary indexes coherent.
    pub fn insert(&mut self, issue: Issue) {
        let id = issue.id.to_uppercase();
        if let Some(previous) = self.issues.remove(&id) {
            self.unindex(&previous);
        }
        self.index_dimensions(&id, &issue);
        for transition in &issue.transitions {
            self.transition_rounds.push(transition.round);
        }
        self.issues.insert(id, issue);
    }

    /// Record a transition round without reinserting the issue.
    pub fn record_transition_round(&mut self, round: u32) {
        self.transition_rounds.push(round);
    }

    /// Update an issue in place through a closure; indexes are refreshed
    /// after the mutation. Returns false when the id is unknown.
    pub fn update<F>(&mut self, id: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut Issue),
    {
        let canonical = id.to_uppercase();
        let Some(mut issue) = self.issues.remove(&canonical) else {
            return false;
        };
        self.unindex(&issue);
        let before_transitions = issue.transitions.len();
        mutate(&mut issue);
        for transition in &issue.transitions[before_transitions..] {
            self.transition_rounds.push(transition.round);
        }
        self.index_dimensions(&canonical, &issue);
        self.issues.insert(canonical, issue);
        true
    }

    /// Remove an issue by id.
    pub fn remove(&mut self, id: &str) -> Option<Issue> {
        let canonical = id.to_uppercase();
        let issue = self.issues.remove(&canonical)?;
        self.unindex(&issue);
        Some(issue)
    }

    /// Look up an issue by id.
    pub fn get(&self, id: &str) -> Option<&Issue> {
        self.issues.get(&id.to_uppercase())
    }

    /// True when the id is present.
    pub fn contains(&self, id: &str) -> bool {
        self.issues.contains_key(&id.to_uppercase())
    }

    /// Total issue count.
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// True when the index holds no issues.
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Iterate over all issues.
    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.values()
    }

    /// Issues currently holding `status`.
    pub fn by_status(&self, status: IssueStatus) -> Vec<&Issue> {
        self.collect_ids(self.by_status.get(&status))
    }

    /// Issues currently holding `severity`.
    pub fn by_severity(&self, severity: Severity) -> Vec<&Issue> {
        self.collect_ids(self.by_severity.get(&severity))
    }

    /// Issues in `category`.
    pub fn by_category(&self, category: IssueCategory) -> Vec<&Issue> {
        self.collect_ids(self.by_category.get(&category))
    }

    /// Count of issues holding `status`.
    pub fn status_count(&self, status: IssueStatus) -> usize {
        self.status_counts[status.index()]
    }

    /// Count of issues holding `severity`.
    pub fn severity_count(&self, severity: Severity) -> usize {
        self.severity_counts[severity.index()]
    }

    /// Count of issues in `category`.
    pub fn category_count(&self, category: IssueCategory) -> usize {
        self.category_counts[category.index()]
    }

    /// Active issues (not resolved/dismissed/merged).
    pub fn active(&self) -> Vec<&Issue> {
        self.issues.values().filter(|i| i.is_active()).collect()
    }

    /// Count of active issues at `severity`.
    pub fn active_count_at(&self, severity: Severity) -> usize {
        self.issues
            .values()
            .filter(|i| i.is_active() && i.severity == severity)
            .count()
    }

    /// Transitions recorded in rounds at or after `current_round - 1`.
    pub fn recent_transition_count(&self, current_round: u32) -> usize {
        let floor = current_round.saturating_sub(TRANSITION_WINDOW - 1);
        self.transition_rounds
            .iter()
            .filter(|&&round| round >= floor)
            .count()
    }

    fn collect_ids(&self, ids: Option<&HashSet<String>>) -> Vec<&Issue> {
        ids.map(|set| set.iter().filter_map(|id| self.issues.get(id)).collect())
            .unwrap_or_default()
    }

    fn index_dimensions(&mut self, id: &str, issue: &Issue) {
        self.by_status
            .entry(issue.status)
            .or_default()
            .insert(id.to_string());
        self.by_severity
            .entry(issue.severity)
            .or_default()
            .insert(id.to_string());
        self.by_category
            .entry(issue.category)
            .or_default()
            .insert(id.to_string());
        self.status_counts[issue.status.index()] += 1;
        self.severity_counts[issue.severity.index()] += 1;
        self.category_counts[issue.category.index()] += 1;
    }

    fn unindex(&mut self, issue: &Issue) {
        if let Some(set) = self.by_status.get_mut(&issue.status) {
            set.remove(&issue.id);
        }
        if let Some(set) = self.by_severity.get_mut(&issue.severity) {
            set.remove(&issue.id);
        }
        if let Some(set) = self.by_category.get_mut(&issue.category) {
            set.remove(&issue.id);
        }
        self.status_counts[issue.status.index()] -= 1;
        self.severity_counts[issue.severity.index()] -= 1;
        self.category_counts[issue.category.index()] -= 1;
    }

    /// Verify the coherence invariant: every issue appears in each of its
    /// dimension indexes and the counters match index cardinalities.
    #[cfg(test)]
    fn check_coherence(&self) -> bool {
        for issue in self.issues.values() {
            let in_status = self
                .by_status
                .get(&issue.status)
                .is_some_and(|s| s.contains(&issue.id));
            let in_severity = self
                .by_severity
                .get(&issue.severity)
                .is_some_and(|s| s.contains(&issue.id));
            let in_category = self
                .by_category
                .get(&issue.category)
                .is_some_and(|s| s.contains(&issue.id));
            if !(in_status && in_severity && in_category) {
                return false;
            }
        }
        for status in IssueStatus::ALL {
            let cardinality = self.by_status.get(&status).map_or(0, HashSet::len);
            if self.status_counts[status.index()] != cardinality {
                return false;
            }
        }
        for severity in Severity::ALL {
            let cardinality = self.by_severity.get(&severity).map_or(0, HashSet::len);
            if self.severity_counts[severity.index()] != cardinality {
                return false;
            }
        }
        for category in IssueCategory::ALL {
            let cardinality = self.by_category.get(&category).map_or(0, HashSet::len);
            if self.category_counts[category.index()] != cardinality {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::issues::{IssueTransition, TransitionKind};
    use crate::core::session::Role;
    use chrono::Utc;

    fn issue(id: &str, category: IssueCategory, severity: Severity) -> Issue {
        Issue::raised(id, category, severity, "test issue", Role::Verifier, 1)
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut index = IssueIndex::new();
        index.insert(issue("sec-01", IssueCategory::Security, Severity::High));

        assert!(index.contains("SEC-01"));
        assert!(index.contains("sec-01"));
        assert_eq!(index.len(), 1);
        assert_eq!(index.status_count(IssueStatus::Raised), 1);
        assert_eq!(index.severity_count(Severity::High), 1);
        assert_eq!(index.category_count(IssueCategory::Security), 1);
        assert!(index.check_coherence());
    }

    #[test]
    fn test_update_moves_between_indexes() {
        let mut index = IssueIndex::new();
        index.insert(issue("SEC-01", IssueCategory::Security, Severity::High));

        let updated = index.update("SEC-01", |i| {
            i.status = IssueStatus::Resolved;
            i.severity = Severity::Low;
        });
        assert!(updated);
        assert_eq!(index.status_count(IssueStatus::Raised), 0);
        assert_eq!(index.status_count(IssueStatus::Resolved), 1);
        assert_eq!(index.severity_count(Severity::High), 0);
        assert_eq!(index.severity_count(Severity::Low), 1);
        assert!(index.check_coherence());
    }

    #[test]
    fn test_update_unknown_id() {
        let mut index = IssueIndex::new();
        assert!(!index.update("NOPE-99", |_| {}));
    }

    #[test]
    fn test_remove_keeps_counts_coherent() {
        let mut index = IssueIndex::new();
        index.insert(issue("SEC-01", IssueCategory::Security, Severity::High));
        index.insert(issue("COR-01", IssueCategory::Correctness, Severity::Low));

        let removed = index.remove("SEC-01");
        assert!(removed.is_some());
        assert_eq!(index.len(), 1);
        assert_eq!(index.category_count(IssueCategory::Security), 0);
        assert!(index.check_coherence());
    }

    #[test]
    fn test_active_counts() {
        let mut index = IssueIndex::new();
        index.insert(issue("SEC-01", IssueCategory::Security, Severity::Critical));
        index.insert(issue("SEC-02", IssueCategory::Security, Severity::Critical));
        index.update("SEC-02", |i| i.status = IssueStatus::Resolved);

        assert_eq!(index.active_count_at(Severity::Critical), 1);
        assert_eq!(index.active().len(), 1);
    }

    #[test]
    fn test_recent_transition_window() {
        let mut index = IssueIndex::new();
        let mut first = issue("SEC-01", IssueCategory::Security, Severity::High);
        // Raised in round 1; the Discovered transition carries round 1.
        first.transitions.push(IssueTransition {
            kind: TransitionKind::Validated,
            from_status: IssueStatus::Raised,
            to_status: IssueStatus::Raised,
            from_severity: None,
            to_severity: None,
            round: 3,
            reason: "validated".to_string(),
            triggered_by: Role::Critic,
            timestamp: Utc::now(),
        });
        index.insert(first);

        // At round 4 the window covers rounds 3..=4: only the validation.
        assert_eq!(index.recent_transition_count(4), 1);
        // At round 2 the window covers rounds 1..=2 plus the round-3 record.
        assert_eq!(index.recent_transition_count(2), 2);
        // At round 6 nothing is recent.
        assert_eq!(index.recent_transition_count(6), 0);
    }

    #[test]
    fn test_rebuild_from_list() {
        let issues = vec![
            issue("SEC-01", IssueCategory::Security, Severity::High),
            issue("PRF-01", IssueCategory::Performance, Severity::Medium),
        ];
        let index = IssueIndex::rebuild(&issues);
        assert_eq!(index.len(), 2);
        assert_eq!(index.by_category(IssueCategory::Performance).len(), 1);
        assert!(index.check_coherence());
    }
}
