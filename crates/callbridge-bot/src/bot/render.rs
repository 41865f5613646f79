use callbridge_core::types::CallRecord;
use chrono::NaiveDate;

use crate::service::report::same_name;
use crate::service::stats::{count_by_status, StatusCounts};

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn talktime(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else {
        format!("{m}m {s:02}s")
    }
}

fn counts_block(counts: &StatusCounts) -> String {
    let mut out = format!(
        "Calls: {}\nAnswered: {}\nCancelled: {}\nBusy: {}",
        counts.total,
        counts.answered(),
        counts.cancelled(),
        counts.busy()
    );
    for (status, n) in counts.others() {
        let label = if status.is_empty() { "(no status)" } else { status };
        out.push_str(&format!("\n{}: {n}", escape_markdown(label)));
    }
    out.push_str(&format!("\nTalk time: {}", talktime(counts.talktime_sec)));
    out
}

/// Backslash-escape inline Markdown so portal names render literally.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '*' | '_' | '`' | '[' | ']' | '~') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn team_label(team: &str) -> &str {
    if team.is_empty() {
        "(no team)"
    } else {
        team
    }
}

pub fn no_calls_for_team(team: &str, date: NaiveDate) -> String {
    format!("No calls found for team \"{team}\" on {}.", iso(date))
}

/// Team totals plus one line per agent.
pub fn team_summary(team: &str, date: NaiveDate, records: &[&CallRecord]) -> String {
    let counts = count_by_status(records.iter().copied());
    let mut out = format!(
        "**{}** ({})\n{}",
        escape_markdown(team_label(team)),
        iso(date),
        counts_block(&counts)
    );

    let mut agents: Vec<&str> = Vec::new();
    for r in records {
        if !r.agent.is_empty() && !agents.iter().any(|a| same_name(a, &r.agent)) {
            agents.push(&r.agent);
        }
    }
    if !agents.is_empty() {
        out.push_str("\n\n**Agents**");
        for agent in agents {
            let per_agent =
                count_by_status(records.iter().copied().filter(|r| same_name(&r.agent, agent)));
            out.push_str(&format!(
                "\n- {}: {} calls, {} answered",
                escape_markdown(agent),
                per_agent.total,
                per_agent.answered()
            ));
        }
    }
    out
}

pub fn agent_stats(agent: &str, team: Option<&str>, date: NaiveDate, records: &[&CallRecord]) -> String {
    let counts = count_by_status(records.iter().copied());
    let scope = match team {
        Some(team) => format!("{}, {}", escape_markdown(team_label(team)), iso(date)),
        None => iso(date),
    };
    format!("**{}** ({scope})\n{}", escape_markdown(agent), counts_block(&counts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use callbridge_core::types::CallStatus;

    fn record(agent: &str, status: &str, talk: u64) -> CallRecord {
        CallRecord {
            caller: String::new(),
            agent: agent.into(),
            team: "Sales".into(),
            callee: String::new(),
            status: CallStatus::from(status),
            duration_sec: talk,
            talktime_sec: talk,
            hangup_by: String::new(),
            call_date: "2025-07-01".into(),
            call_time: String::new(),
            end_time: String::new(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
    }

    #[test]
    fn test_agent_stats_has_calls_line() {
        let records = [record("Jane", "ANSWER", 60), record("Jane", "NO ANSWER", 0)];
        let refs: Vec<&CallRecord> = records.iter().collect();
        let text = agent_stats("Jane", Some("Sales"), date(), &refs);
        assert!(text.lines().any(|l| l == "Calls: 2"), "{text}");
        assert!(text.contains("Answered: 1"));
        assert!(text.contains("NO ANSWER: 1"));
        assert!(text.contains("Talk time: 1m 00s"));
    }

    #[test]
    fn test_team_summary_lists_agents() {
        let records = [
            record("Jane", "ANSWER", 5),
            record("Bob", "BUSY", 0),
            record("Jane", "CANCEL", 0),
        ];
        let refs: Vec<&CallRecord> = records.iter().collect();
        let text = team_summary("Sales", date(), &refs);
        assert!(text.starts_with("**Sales** (2025-07-01)"));
        assert!(text.contains("- Jane: 2 calls, 1 answered"));
        assert!(text.contains("- Bob: 1 calls, 0 answered"));
    }

    #[test]
    fn test_names_are_escaped() {
        let records = [record("j_doe*", "ANSWER", 5)];
        let refs: Vec<&CallRecord> = records.iter().collect();
        let text = agent_stats("j_doe*", Some("`ops`"), date(), &refs);
        assert!(text.starts_with(r"**j\_doe\*** (\`ops\`, 2025-07-01)"), "{text}");

        let text = team_summary("[Sales]", date(), &refs);
        assert!(text.starts_with(r"**\[Sales\]** (2025-07-01)"), "{text}");
        assert!(text.contains(r"- j\_doe\*: 1 calls"));
    }

    #[test]
    fn test_not_found_text() {
        assert_eq!(
            no_calls_for_team("NonexistentTeam", date()),
            "No calls found for team \"NonexistentTeam\" on 2025-07-01."
        );
    }

    #[test]
    fn test_talktime_format() {
        assert_eq!(talktime(3723), "1h 02m 03s");
        assert_eq!(talktime(59), "0m 59s");
    }
}
