use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::{PortalMetadata, SiteConfig};
use crate::error::{Error, Result};

/// Records per `datastore_upsert` call.
pub const CHUNK_SIZE: usize = 500;

/// Attempts per chunk before the upload is abandoned.
const MAX_ATTEMPTS: u32 = 5;

/// Cooldown after a connection failure.
const CONNECT_COOLDOWN: Duration = Duration::from_secs(60);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(100);

/// Client for the open-data portal's CKAN action API.
///
/// Handles dataset/resource management and the chunked record upload. It
/// only ever reads from the local store's snapshots; local state is never
/// mutated from here.
pub struct CkanClient {
    http: HttpClient,
    api_url: String,
    metadata: PortalMetadata,
}

impl CkanClient {
    pub fn new(site: &SiteConfig, metadata: PortalMetadata) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let token = HeaderValue::from_str(&site.token)
            .map_err(|_| Error::Upload("api token is not a valid header value".into()))?;
        headers.insert("X-CKAN-API-Key", token);

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            api_url: format!("{}/api/3/action", site.address.trim_end_matches('/')),
            metadata,
        })
    }

    /// POST one action endpoint and decode the JSON response.
    fn action(&self, endpoint: &str, payload: &Value) -> Result<Value> {
        let url = format!("{}/{endpoint}", self.api_url);
        debug!(endpoint, "ckan action");
        let response = self.http.post(&url).json(payload).send()?;
        Ok(response.json()?)
    }

    pub fn create_dataset(&self) -> Result<Value> {
        self.action("package_create", &self.metadata.dataset_metadata)
    }

    pub fn update_dataset(&self) -> Result<Value> {
        self.action("package_update", &self.metadata.dataset_metadata)
    }

    /// Create the datastore resource configured for one table.
    pub fn create_resource(&self, table: &str) -> Result<Value> {
        let resource = self.resource_metadata(table)?;
        let mut payload = Value::Object(resource.extra.clone());
        payload["aliases"] = json!(resource.aliases);
        self.action("datastore_create", &payload)
    }

    /// Create every configured resource.
    pub fn create_resources(&self) -> Result<()> {
        for table in self.metadata.resources.keys() {
            self.create_resource(table)?;
        }
        Ok(())
    }

    pub fn delete_resource(&self, resource_id: &str) -> Result<Value> {
        self.action("resource_delete", &json!({ "id": resource_id }))
    }

    pub fn list_datastore_resources(&self) -> Result<Value> {
        self.action("datastore_search", &json!({ "id": "_table_metadata" }))
    }

    /// Resolve the remote resource id behind a table's configured alias.
    ///
    /// Callers must not upload without a handle; an unresolved alias is
    /// fatal for the sync attempt.
    pub fn resolve_resource(&self, table: &str) -> Result<String> {
        let alias = self
            .resource_metadata(table)?
            .aliases
            .first()
            .cloned()
            .ok_or_else(|| Error::ResourceNotFound(table.to_string()))?;

        let response = self.action("datastore_info", &json!({ "id": alias }))?;
        response
            .pointer("/result/meta/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(Error::ResourceNotFound(alias))
    }

    /// Upload rows to a table's datastore resource in bounded chunks.
    ///
    /// All fields are already text (the remote API requires string-typed
    /// fields). The resource handle is resolved fresh per chunk, and only
    /// the final chunk asks the remote side to recompute record counts.
    /// Decode and connection failures retry the same chunk up to a fixed
    /// attempt budget, with a cooldown after connection failures; an
    /// unsuccessful but parseable response fails the sync immediately.
    pub fn push_records(&self, table: &str, rows: &[BTreeMap<String, String>]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let bar = ProgressBar::new(rows.len() as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{msg} [{bar:40}] {human_pos}/{human_len} records ({eta})",
            )
            .expect("valid template")
            .progress_chars("=> "),
        );
        bar.set_message("uploading");

        for (start, end, is_last) in chunk_plan(rows.len(), CHUNK_SIZE) {
            self.push_chunk(table, &rows[start..end], is_last)?;
            bar.inc((end - start) as u64);
        }

        bar.finish_with_message("uploaded");
        Ok(())
    }

    fn push_chunk(
        &self,
        table: &str,
        chunk: &[BTreeMap<String, String>],
        calculate_record_count: bool,
    ) -> Result<()> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.upload_once(table, chunk, calculate_record_count) {
                Ok(()) => return Ok(()),
                Err(Error::Http(e)) if e.is_connect() || e.is_timeout() => {
                    warn!(attempts, error = %e, "connection failure, cooling down");
                    if attempts >= MAX_ATTEMPTS {
                        return Err(Error::Upload(format!(
                            "chunk upload failed after {attempts} attempts: {e}"
                        )));
                    }
                    thread::sleep(CONNECT_COOLDOWN);
                }
                Err(Error::Http(e)) if e.is_decode() => {
                    warn!(attempts, error = %e, "undecodable response, retrying chunk");
                    if attempts >= MAX_ATTEMPTS {
                        return Err(Error::Upload(format!(
                            "chunk upload failed after {attempts} attempts: {e}"
                        )));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn upload_once(
        &self,
        table: &str,
        chunk: &[BTreeMap<String, String>],
        calculate_record_count: bool,
    ) -> Result<()> {
        let resource_id = self.resolve_resource(table)?;
        let response = self.action(
            "datastore_upsert",
            &json!({
                "resource_id": resource_id,
                "records": chunk,
                "calculate_record_count": calculate_record_count,
            }),
        )?;

        if response["success"] == json!(true) {
            Ok(())
        } else {
            Err(Error::Upload(format!(
                "datastore_upsert rejected: {}",
                response["error"]
            )))
        }
    }

    fn resource_metadata(&self, table: &str) -> Result<&crate::config::ResourceMetadata> {
        self.metadata
            .resources
            .get(table)
            .ok_or_else(|| Error::ResourceNotFound(table.to_string()))
    }
}

/// Split `total` records into `(start, end, is_last)` chunk bounds.
pub fn chunk_plan(total: usize, chunk_size: usize) -> Vec<(usize, usize, bool)> {
    let mut plan = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + chunk_size).min(total);
        plan.push((start, end, end == total));
        start = end;
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_produces_ceil_n_over_c_calls() {
        assert_eq!(chunk_plan(1200, 500).len(), 3);
        assert_eq!(chunk_plan(1000, 500).len(), 2);
        assert_eq!(chunk_plan(499, 500).len(), 1);
        assert_eq!(chunk_plan(0, 500).len(), 0);
    }

    #[test]
    fn only_the_final_chunk_recounts() {
        let plan = chunk_plan(1200, 500);
        assert_eq!(
            plan,
            vec![(0, 500, false), (500, 1000, false), (1000, 1200, true)]
        );
        let last_flags: Vec<bool> = plan.iter().map(|&(_, _, last)| last).collect();
        assert_eq!(last_flags, vec![false, false, true]);
    }

    #[test]
    fn single_chunk_is_also_the_last() {
        assert_eq!(chunk_plan(10, 500), vec![(0, 10, true)]);
    }
}
