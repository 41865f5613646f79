use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use callbridge_core::error::{BridgeError, Result};
use callbridge_core::types::{CallRecord, ChatId};
use callbridge_integrations::google::sheets::SheetsApi;

/// Target range on the destination template.
pub const SHEET_RANGE: &str = "Sheet1!A:J";
const SHEET_ORIGIN: &str = "Sheet1!A1";

/// Column order of the destination template. Do not reorder.
pub const HEADER: [&str; 10] = [
    "Caller",
    "Team",
    "Callee",
    "Status",
    "Duration (s)",
    "Talktime (s)",
    "Hangup By",
    "Call Date",
    "Call Time",
    "End Time",
];

fn to_row(r: &CallRecord) -> Vec<String> {
    vec![
        r.caller.clone(),
        r.team.clone(),
        r.callee.clone(),
        r.status.to_string(),
        r.duration_sec.to_string(),
        r.talktime_sec.to_string(),
        r.hangup_by.clone(),
        r.call_date.clone(),
        r.call_time.clone(),
        r.end_time.clone(),
    ]
}

/// Header followed by one row per record.
pub fn to_sheet_rows(records: &[CallRecord]) -> Vec<Vec<String>> {
    std::iter::once(HEADER.iter().map(|h| h.to_string()).collect())
        .chain(records.iter().map(to_row))
        .collect()
}

/// Writes call records into a chat's linked spreadsheet.
#[derive(Clone)]
pub struct SheetSync {
    api: Arc<dyn SheetsApi>,
}

impl SheetSync {
    pub fn new(api: Arc<dyn SheetsApi>) -> Self {
        Self { api }
    }

    /// Overwrite clears the range and writes from A1; otherwise rows are
    /// appended. Returns the number of data rows written.
    pub async fn write(
        &self,
        chat_id: ChatId,
        sheet_id: &str,
        records: &[CallRecord],
        overwrite: bool,
    ) -> Result<usize> {
        let values = to_sheet_rows(records);

        if overwrite {
            self.api.clear(chat_id, sheet_id, SHEET_RANGE).await?;
            self.api.update(chat_id, sheet_id, SHEET_ORIGIN, values).await?;
        } else {
            self.api.append(chat_id, sheet_id, SHEET_RANGE, values).await?;
        }

        tracing::info!(chat_id, rows = records.len(), overwrite, "[sheets] rows written");
        Ok(records.len())
    }

    pub async fn read(&self, chat_id: ChatId, sheet_id: &str) -> Result<Vec<Vec<String>>> {
        self.api.get(chat_id, sheet_id, SHEET_RANGE).await
    }
}

/// In-process spreadsheet holding one grid per spreadsheet id.
#[derive(Default)]
pub struct MemorySheets {
    sheets: Mutex<HashMap<String, Vec<Vec<String>>>>,
    revoked: bool,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails as if the chat's Google grant had been revoked.
    pub fn revoked() -> Self {
        Self {
            revoked: true,
            ..Self::default()
        }
    }

    fn grid<T>(&self, sheet_id: &str, f: impl FnOnce(&mut Vec<Vec<String>>) -> T) -> Result<T> {
        if self.revoked {
            return Err(BridgeError::SheetAuth("Google authorization revoked".to_string()));
        }
        let mut sheets = self.sheets.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(f(sheets.entry(sheet_id.to_string()).or_default()))
    }
}

#[async_trait]
impl SheetsApi for MemorySheets {
    async fn clear(&self, _chat_id: ChatId, spreadsheet_id: &str, _range: &str) -> Result<()> {
        self.grid(spreadsheet_id, |grid| grid.clear())
    }

    async fn update(
        &self,
        _chat_id: ChatId,
        spreadsheet_id: &str,
        _range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<()> {
        self.grid(spreadsheet_id, |grid| {
            for (i, row) in values.into_iter().enumerate() {
                match grid.get_mut(i) {
                    Some(existing) => *existing = row,
                    None => grid.push(row),
                }
            }
        })
    }

    async fn append(
        &self,
        _chat_id: ChatId,
        spreadsheet_id: &str,
        _range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<()> {
        self.grid(spreadsheet_id, |grid| grid.extend(values))
    }

    async fn get(&self, _chat_id: ChatId, spreadsheet_id: &str, _range: &str) -> Result<Vec<Vec<String>>> {
        self.grid(spreadsheet_id, |grid| grid.clone())
    }
}
