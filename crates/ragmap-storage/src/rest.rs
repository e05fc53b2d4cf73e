//! PostgREST-backed store (hosted Postgres behind `/rest/v1`).
//!
//! Column names are a fixed external contract and are used verbatim,
//! spaces included. No client-side timeout is configured: a hanging store
//! hangs the interaction that triggered it.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Method;
use serde_json::{json, Map, Value};
use url::Url;

use crate::{
    KnowledgeBaseSource, MappingStore, SourceCode, StoreError, TenantId, TenantMapping,
    SOURCE_CODE_COLUMN, SOURCE_NAME_COLUMN, SOURCE_TABLE, TENANT_CONTACT_COLUMN,
    TENANT_ID_COLUMN, TENANT_TABLE,
};

type Row = Map<String, Value>;

pub struct PostgrestStore {
    client: Client,
    base: Url,
    key: String,
}

impl PostgrestStore {
    /// `url` is the project URL (e.g. `https://<ref>.supabase.co`), `key` the
    /// service or anon key sent as both `apikey` and bearer token.
    pub fn new(url: &str, key: &str) -> Result<Self, StoreError> {
        let base = Url::parse(url.trim()).map_err(|e| StoreError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl {
                url: url.to_string(),
                message: "not a base url".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base,
            key: key.trim().to_string(),
        })
    }

    /// `{base}/rest/v1/{table}` with the table name percent-encoded.
    pub fn table_url(&self, table: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["rest", "v1", table]);
        }
        url
    }

    fn row_url(&self, table: &str, id: &TenantId) -> Url {
        let mut url = self.table_url(table);
        url.query_pairs_mut()
            .append_pair(TENANT_ID_COLUMN, &format!("eq.{id}"));
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    fn send(&self, table: &str, req: RequestBuilder) -> Result<Response, StoreError> {
        let resp = req.send().map_err(|source| StoreError::Transport {
            table: table.to_string(),
            source,
        })?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().unwrap_or_default();
            return Err(StoreError::Status {
                table: table.to_string(),
                status,
                body,
            });
        }
        Ok(resp)
    }

    fn send_rows(&self, table: &str, req: RequestBuilder) -> Result<Vec<Row>, StoreError> {
        let resp = self.send(table, req)?;
        let body = resp.text().map_err(|source| StoreError::Transport {
            table: table.to_string(),
            source,
        })?;
        parse_rows(table, &body)
    }

    fn select_all(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let mut url = self.table_url(table);
        url.query_pairs_mut().append_pair("select", "*");
        self.send_rows(table, self.request(Method::GET, url))
    }

    /// PATCH/DELETE one row by id, asking for the touched rows back so a
    /// vanished row is reported instead of silently ignored.
    fn mutate_row(
        &self,
        method: Method,
        id: &TenantId,
        body: Option<Value>,
    ) -> Result<(), StoreError> {
        let mut req = self
            .request(method, self.row_url(TENANT_TABLE, id))
            .header("Prefer", "return=representation");
        if let Some(body) = body {
            req = req.json(&body);
        }
        let rows = self.send_rows(TENANT_TABLE, req)?;
        if rows.is_empty() {
            return Err(StoreError::RowNotFound {
                table: TENANT_TABLE.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

impl MappingStore for PostgrestStore {
    fn select_sources(&self) -> Result<Vec<KnowledgeBaseSource>, StoreError> {
        self.select_all(SOURCE_TABLE)?
            .iter()
            .map(source_from_row)
            .collect()
    }

    fn select_tenants(&self) -> Result<Vec<TenantMapping>, StoreError> {
        self.select_all(TENANT_TABLE)?
            .iter()
            .map(tenant_from_row)
            .collect()
    }

    fn insert_tenant(&self, contact: &str, source: &SourceCode) -> Result<TenantId, StoreError> {
        let body = json!({
            TENANT_CONTACT_COLUMN: contact,
            SOURCE_CODE_COLUMN: source.as_str(),
        });
        let req = self
            .request(Method::POST, self.table_url(TENANT_TABLE))
            .header("Prefer", "return=representation")
            .json(&body);
        let rows = self.send_rows(TENANT_TABLE, req)?;
        let row = rows.first().ok_or_else(|| decode_error(TENANT_TABLE, "insert returned no row"))?;
        Ok(tenant_from_row(row)?.id)
    }

    fn update_tenant_source(&self, id: &TenantId, source: &SourceCode) -> Result<(), StoreError> {
        let body = json!({ SOURCE_CODE_COLUMN: source.as_str() });
        self.mutate_row(Method::PATCH, id, Some(body))
    }

    fn delete_tenant(&self, id: &TenantId) -> Result<(), StoreError> {
        self.mutate_row(Method::DELETE, id, None)
    }
}

// ============================================================================
// Row decoding
// ============================================================================

fn decode_error(table: &str, message: impl Into<String>) -> StoreError {
    StoreError::Decode {
        table: table.to_string(),
        message: message.into(),
    }
}

pub(crate) fn parse_rows(table: &str, body: &str) -> Result<Vec<Row>, StoreError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| decode_error(table, format!("invalid JSON: {e}")))?;
    let Value::Array(items) = value else {
        return Err(decode_error(table, "expected a JSON array of rows"));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(row) => Ok(row),
            other => Err(decode_error(table, format!("expected an object row, got `{other}`"))),
        })
        .collect()
}

/// Text form of a scalar cell. Strings and numbers are both accepted since
/// ids and codes may be typed either way; `null` reads as absent.
fn cell_text(row: &Row, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn required_cell(table: &str, row: &Row, column: &str) -> Result<String, StoreError> {
    cell_text(row, column).ok_or_else(|| decode_error(table, format!("row is missing `{column}`")))
}

pub(crate) fn tenant_from_row(row: &Row) -> Result<TenantMapping, StoreError> {
    Ok(TenantMapping {
        id: TenantId::new(required_cell(TENANT_TABLE, row, TENANT_ID_COLUMN)?),
        contact: cell_text(row, TENANT_CONTACT_COLUMN).unwrap_or_default(),
        source_code: cell_text(row, SOURCE_CODE_COLUMN)
            .map(SourceCode::new)
            .unwrap_or_else(SourceCode::default_sentinel),
    })
}

pub(crate) fn source_from_row(row: &Row) -> Result<KnowledgeBaseSource, StoreError> {
    Ok(KnowledgeBaseSource::new(
        required_cell(SOURCE_TABLE, row, SOURCE_CODE_COLUMN)?,
        required_cell(SOURCE_TABLE, row, SOURCE_NAME_COLUMN)?,
    ))
}
