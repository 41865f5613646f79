//! Raw export rows to typed call records.
//!
//! Column positions are fixed by the portal's voice export:
//!
//! | col | field        |
//! |-----|--------------|
//! | 0   | caller       |
//! | 1   | call_date    |
//! | 2   | call_time    |
//! | 3   | end_time     |
//! | 5   | agent        |
//! | 6   | team         |
//! | 7   | callee       |
//! | 8   | status       |
//! | 9   | duration_sec |
//! | 10  | talktime_sec |
//! | 11  | hangup_by    |

use callbridge_core::types::{CallRecord, CallStatus, RawRows};

const COL_CALLER: usize = 0;
const COL_CALL_DATE: usize = 1;
const COL_CALL_TIME: usize = 2;
const COL_END_TIME: usize = 3;
const COL_AGENT: usize = 5;
const COL_TEAM: usize = 6;
const COL_CALLEE: usize = 7;
const COL_STATUS: usize = 8;
const COL_DURATION: usize = 9;
const COL_TALKTIME: usize = 10;
const COL_HANGUP_BY: usize = 11;

fn cell(row: &[String], col: usize) -> String {
    row.get(col).map(|c| c.trim().to_string()).unwrap_or_default()
}

/// Seconds from `"65"`, `"65.0"` or `"00:01:05"`. Anything else is zero.
fn seconds(raw: &str) -> u64 {
    let raw = raw.trim();
    if raw.contains(':') {
        return raw
            .split(':')
            .try_fold(0u64, |acc, part| part.trim().parse::<u64>().ok().map(|n| acc * 60 + n))
            .unwrap_or(0);
    }
    raw.parse::<u64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64))
        .unwrap_or(0)
}

/// Drop the header row and map the rest. Blank rows are skipped; a missing
/// team stays as `""`.
pub fn to_call_records(rows: &RawRows) -> Vec<CallRecord> {
    rows.iter()
        .skip(1)
        .filter(|row| row.iter().any(|c| !c.trim().is_empty()))
        .map(|row| CallRecord {
            caller: cell(row, COL_CALLER),
            agent: cell(row, COL_AGENT),
            team: cell(row, COL_TEAM),
            callee: cell(row, COL_CALLEE),
            status: CallStatus::from(cell(row, COL_STATUS)),
            duration_sec: seconds(&cell(row, COL_DURATION)),
            talktime_sec: seconds(&cell(row, COL_TALKTIME)),
            hangup_by: cell(row, COL_HANGUP_BY),
            call_date: cell(row, COL_CALL_DATE),
            call_time: cell(row, COL_CALL_TIME),
            end_time: cell(row, COL_END_TIME),
        })
        .collect()
}

/// Team and agent names compare case-insensitively everywhere.
pub fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

fn push_distinct(seen: &mut Vec<String>, name: &str) {
    if !seen.iter().any(|s| same_name(s, name)) {
        seen.push(name.to_string());
    }
}

/// Teams in first-seen order, keeping the first casing seen.
pub fn distinct_teams(records: &[CallRecord]) -> Vec<String> {
    let mut teams = Vec::new();
    for r in records {
        push_distinct(&mut teams, &r.team);
    }
    teams
}

/// Agents in first-seen order, optionally restricted to one team.
/// Rows without an agent name are left out.
pub fn distinct_agents(records: &[CallRecord], team: Option<&str>) -> Vec<String> {
    let mut agents = Vec::new();
    for r in records_for_team(records, team) {
        if !r.agent.is_empty() {
            push_distinct(&mut agents, &r.agent);
        }
    }
    agents
}

pub fn records_for_team<'a>(
    records: &'a [CallRecord],
    team: Option<&'a str>,
) -> impl Iterator<Item = &'a CallRecord> + 'a {
    records
        .iter()
        .filter(move |r| team.map_or(true, |t| same_name(&r.team, t)))
}

pub fn records_for_agent<'a>(
    records: &'a [CallRecord],
    team: Option<&'a str>,
    agent: &'a str,
) -> Vec<&'a CallRecord> {
    records_for_team(records, team)
        .filter(|r| same_name(&r.agent, agent))
        .collect()
}
