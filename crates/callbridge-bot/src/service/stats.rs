use std::collections::HashMap;

use callbridge_core::types::{CallRecord, CallStatus};

/// Outcome counts for a set of calls. The counts always add up to `total`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusCounts {
    pub by_status: HashMap<CallStatus, usize>,
    pub total: usize,
    pub talktime_sec: u64,
}

impl StatusCounts {
    pub fn get(&self, status: &CallStatus) -> usize {
        self.by_status.get(status).copied().unwrap_or(0)
    }

    pub fn answered(&self) -> usize {
        self.get(&CallStatus::Answer)
    }

    pub fn cancelled(&self) -> usize {
        self.get(&CallStatus::Cancel)
    }

    pub fn busy(&self) -> usize {
        self.get(&CallStatus::Busy)
    }

    /// Statuses outside answer/cancel/busy, sorted by name.
    pub fn others(&self) -> Vec<(&str, usize)> {
        let mut others: Vec<(&str, usize)> = self
            .by_status
            .iter()
            .filter(|(status, _)| matches!(status, CallStatus::Other(_)))
            .map(|(status, count)| (status.as_str(), *count))
            .collect();
        others.sort();
        others
    }
}

pub fn count_by_status<'a>(records: impl IntoIterator<Item = &'a CallRecord>) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for record in records {
        *counts.by_status.entry(record.status.clone()).or_insert(0) += 1;
        counts.total += 1;
        counts.talktime_sec += record.talktime_sec;
    }
    counts
}

/// Resolve free text to one of `agents`.
///
/// A substring hit wins unless the closest edit-distance candidate is within
/// two edits. With no substring hit the closest candidate is returned.
pub fn best_agent_match(agents: &[String], query: &str) -> Option<String> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return None;
    }

    let mut closest: Option<(usize, &String)> = None;
    let mut substring: Option<&String> = None;

    for agent in agents {
        let candidate = agent.to_lowercase();
        let distance = strsim::levenshtein(&query, &candidate);
        if closest.map_or(true, |(best, _)| distance < best) {
            closest = Some((distance, agent));
        }
        if substring.is_none() && candidate.contains(&query) {
            substring = Some(agent);
        }
    }

    match (closest, substring) {
        (Some((distance, agent)), _) if distance <= 2 => Some(agent.clone()),
        (_, Some(agent)) => Some(agent.clone()),
        (Some((_, agent)), None) => Some(agent.clone()),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: &str) -> CallRecord {
        CallRecord {
            caller: String::new(),
            agent: "A".into(),
            team: "T".into(),
            callee: String::new(),
            status: CallStatus::from(status),
            duration_sec: 0,
            talktime_sec: 5,
            hangup_by: String::new(),
            call_date: String::new(),
            call_time: String::new(),
            end_time: String::new(),
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_counts_partition_total() {
        let statuses = [
            vec![],
            vec!["ANSWER"],
            vec!["ANSWER", "CANCEL", "BUSY", "NO ANSWER", "ANSWER", "FAILED", "BUSY"],
            vec!["X"; 17],
        ];
        for case in statuses {
            let records: Vec<CallRecord> = case.iter().map(|s| record(s)).collect();
            let counts = count_by_status(&records);
            assert_eq!(counts.total, records.len());
            assert_eq!(counts.by_status.values().sum::<usize>(), counts.total);
        }
    }

    #[test]
    fn test_named_accessors() {
        let records: Vec<CallRecord> = ["ANSWER", "ANSWER", "CANCEL", "BUSY", "FAILED"]
            .iter()
            .map(|s| record(s))
            .collect();
        let counts = count_by_status(&records);
        assert_eq!(counts.answered(), 2);
        assert_eq!(counts.cancelled(), 1);
        assert_eq!(counts.busy(), 1);
        assert_eq!(counts.others(), vec![("FAILED", 1)]);
        assert_eq!(counts.talktime_sec, 25);
    }

    #[test]
    fn test_substring_beats_distant_edit_match() {
        assert_eq!(
            best_agent_match(&names(&["Jane Doe", "Jan Lee"]), "jane").as_deref(),
            Some("Jane Doe")
        );
    }

    #[test]
    fn test_exact_edit_match() {
        assert_eq!(
            best_agent_match(&names(&["Jane Doe"]), "jane doe").as_deref(),
            Some("Jane Doe")
        );
    }

    #[test]
    fn test_no_candidates() {
        assert_eq!(best_agent_match(&[], "x"), None);
    }

    #[test]
    fn test_close_edit_match_overrides_substring() {
        // "bob" is inside "Bobby Tables" but one edit from "Rob"
        assert_eq!(
            best_agent_match(&names(&["Bobby Tables", "Rob"]), "bob").as_deref(),
            Some("Rob")
        );
    }
}
