use std::sync::Arc;

use async_trait::async_trait;
use callbridge_core::error::{BridgeError, Result};
use callbridge_core::types::ChatId;

use super::GoogleAuth;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Value-range operations the sync adapter needs, scoped to one chat's
/// Google credential.
#[async_trait]
pub trait SheetsApi: Send + Sync {
    async fn clear(&self, chat_id: ChatId, spreadsheet_id: &str, range: &str) -> Result<()>;
    async fn update(
        &self,
        chat_id: ChatId,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<()>;
    async fn append(
        &self,
        chat_id: ChatId,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<()>;
    async fn get(&self, chat_id: ChatId, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>>;
}

/// Google Sheets v4 values API.
pub struct SheetsClient {
    auth: Arc<GoogleAuth>,
    http: reqwest::Client,
    api_base: String,
}

impl SheetsClient {
    pub fn new(auth: Arc<GoogleAuth>) -> Self {
        Self {
            auth,
            http: reqwest::Client::new(),
            api_base: SHEETS_API.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str, suffix: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.api_base)
            .map_err(|e| BridgeError::Integration(format!("bad sheets api base: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| BridgeError::Integration("sheets api base cannot be a base".to_string()))?
            .push(spreadsheet_id)
            .push("values")
            .push(&format!("{range}{suffix}"));
        Ok(url)
    }

    async fn send(&self, chat_id: ChatId, req: reqwest::RequestBuilder) -> Result<serde_json::Value> {
        let token = self.auth.access_token(chat_id).await?;
        let resp = req
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| BridgeError::Integration(format!("sheets request failed: {e}")))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| BridgeError::Integration(format!("sheets response read failed: {e}")))?;

        match status {
            200 => {}
            401 | 403 => {
                return Err(BridgeError::SheetAuth(format!(
                    "Google rejected the sheet request ({status})"
                )))
            }
            _ => return Err(BridgeError::Http { status, body: text }),
        }

        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| BridgeError::Integration(format!("sheets json parse failed: {e}")))
    }
}

#[async_trait]
impl SheetsApi for SheetsClient {
    async fn clear(&self, chat_id: ChatId, spreadsheet_id: &str, range: &str) -> Result<()> {
        let url = self.values_url(spreadsheet_id, range, ":clear")?;
        self.send(chat_id, self.http.post(url).json(&serde_json::json!({})))
            .await?;
        Ok(())
    }

    async fn update(
        &self,
        chat_id: ChatId,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<()> {
        let url = self.values_url(spreadsheet_id, range, "")?;
        let body = serde_json::json!({ "range": range, "majorDimension": "ROWS", "values": values });
        let req = self
            .http
            .put(url)
            .query(&[("valueInputOption", "RAW")])
            .json(&body);
        self.send(chat_id, req).await?;
        Ok(())
    }

    async fn append(
        &self,
        chat_id: ChatId,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<()> {
        let url = self.values_url(spreadsheet_id, range, ":append")?;
        let body = serde_json::json!({ "majorDimension": "ROWS", "values": values });
        let req = self
            .http
            .post(url)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&body);
        self.send(chat_id, req).await?;
        Ok(())
    }

    async fn get(&self, chat_id: ChatId, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>> {
        let url = self.values_url(spreadsheet_id, range, "")?;
        let json = self.send(chat_id, self.http.get(url)).await?;

        let rows = json["values"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.as_array()
                            .map(|cells| {
                                cells
                                    .iter()
                                    .map(|c| match c {
                                        serde_json::Value::String(s) => s.clone(),
                                        other => other.to_string(),
                                    })
                                    .collect()
                            })
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }
}

/// Pull a spreadsheet id out of a pasted URL, or accept a bare id.
pub fn parse_spreadsheet_id(input: &str) -> Option<String> {
    let input = input.trim();
    let candidate = match input.find("/spreadsheets/d/") {
        Some(pos) => input[pos + "/spreadsheets/d/".len()..]
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default(),
        None if !input.contains('/') => input,
        None => return None,
    };

    let valid = candidate.len() >= 20
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::oauth::GoogleToken;
    use crate::store::{kinds, save, MemoryStore};
    use httpmock::Method::{GET, POST, PUT};
    use httpmock::MockServer;

    const SHEET: &str = "1AbCdEfGhIjKlMnOpQrStUvWxYz0123456789";

    #[test]
    fn test_parse_spreadsheet_id_from_url() {
        let url = format!("https://docs.google.com/spreadsheets/d/{SHEET}/edit#gid=0");
        assert_eq!(parse_spreadsheet_id(&url).as_deref(), Some(SHEET));
    }

    #[test]
    fn test_parse_spreadsheet_id_bare_and_invalid() {
        assert_eq!(parse_spreadsheet_id(SHEET).as_deref(), Some(SHEET));
        assert!(parse_spreadsheet_id("hello").is_none());
        assert!(parse_spreadsheet_id("https://example.com/some/page").is_none());
    }

    async fn client(server: &MockServer) -> SheetsClient {
        let store = Arc::new(MemoryStore::new());
        let token = GoogleToken {
            refresh_token: "r".into(),
            access_token: Some("live".into()),
            expires_at: Some(callbridge_core::types::now_unix() + 3600),
        };
        save(store.as_ref(), kinds::GOOGLE_TOKEN, 1, &token).await.unwrap();
        let auth = Arc::new(GoogleAuth::new("c".into(), "s".into(), "cb".into(), store));
        SheetsClient::new(auth).with_api_base(&server.base_url())
    }

    #[tokio::test]
    async fn test_update_sends_bearer_and_raw_values() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path(format!("/{SHEET}/values/Sheet1!A1"))
                    .query_param("valueInputOption", "RAW")
                    .header("authorization", "Bearer live")
                    .body_contains("\"values\":[[\"Caller\"]]");
                then.status(200).json_body(serde_json::json!({}));
            })
            .await;

        let client = client(&server).await;
        client
            .update(1, SHEET, "Sheet1!A1", vec![vec!["Caller".into()]])
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_reads_values() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("/{SHEET}/values/Sheet1!A:J"));
                then.status(200).json_body(serde_json::json!({
                    "range": "Sheet1!A1:J2",
                    "values": [["Caller", "Team"], ["0811", "Sales"]]
                }));
            })
            .await;

        let rows = client(&server).await.get(1, SHEET, "Sheet1!A:J").await.unwrap();
        assert_eq!(rows, vec![vec!["Caller", "Team"], vec!["0811", "Sales"]]);
    }

    #[tokio::test]
    async fn test_forbidden_is_sheet_auth() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(format!("/{SHEET}/values/Sheet1!A:J:clear"));
                then.status(403).body("{}");
            })
            .await;

        let err = client(&server).await.clear(1, SHEET, "Sheet1!A:J").await.unwrap_err();
        assert!(matches!(err, BridgeError::SheetAuth(_)));
    }
}
