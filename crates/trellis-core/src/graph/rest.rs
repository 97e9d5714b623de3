//! REST graph store client
//!
//! Talks to a graph server exposing a script-execution extension and the
//! legacy index API:
//!
//! - POST `{endpoint}ext/GremlinPlugin/graphdb/execute_script`
//!   with `{"script": "...", "params": {...}}`
//! - POST `{endpoint}index/{node|relationship}` with `{"name": "...", "config": {...}}`
//! - GET  `{endpoint}index/{node|relationship}/{name}/{key}/{value}`
//!
//! A 400 reply carries a JSON body whose `message` describes the script
//! failure; it is classified with [`GraphStoreError::from_script_failure`].

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use super::{GraphStore, GraphStoreError, IndexConfig, IndexHandle, IndexKind, PropertyMap};

/// Script extension path, relative to the endpoint
const SCRIPT_PATH: &str = "ext/GremlinPlugin/graphdb/execute_script";

#[derive(Debug, Serialize)]
struct ScriptRequest<'a> {
    script: &'a str,
    params: &'a PropertyMap,
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<&'a IndexConfig>,
}

/// Graph store reached over HTTP.
#[derive(Debug, Clone)]
pub struct RestGraphStore {
    client: Client,
    endpoint: Url,
}

impl RestGraphStore {
    /// Create a client for `endpoint` (normalised to end with `/`).
    pub fn new(endpoint: &str, timeout_secs: u64) -> Result<Self, GraphStoreError> {
        let endpoint = parse_endpoint(endpoint)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        debug!("Graph store endpoint: {}", endpoint);
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url(&self, path: &str) -> Result<Url, GraphStoreError> {
        self.endpoint
            .join(path)
            .map_err(|e| GraphStoreError::InvalidEndpoint(format!("{}: {}", path, e)))
    }

    fn read(&self, response: Response) -> Result<Value, GraphStoreError> {
        let status = response.status();
        let body = response.text()?;
        interpret_response(status, &body)
    }
}

impl GraphStore for RestGraphStore {
    fn submit_script(&self, script: &str, params: &PropertyMap) -> Result<Value, GraphStoreError> {
        trace!("Submitting script ({} bytes, {} params)", script.len(), params.len());
        let response = self
            .client
            .post(self.url(SCRIPT_PATH)?)
            .json(&ScriptRequest { script, params })
            .send()?;
        self.read(response)
    }

    fn get_or_create_index(
        &self,
        kind: IndexKind,
        name: &str,
        config: Option<&IndexConfig>,
    ) -> Result<IndexHandle, GraphStoreError> {
        let response = self
            .client
            .post(self.url(&format!("index/{}", kind.as_str()))?)
            .json(&CreateIndexRequest { name, config })
            .send()?;
        self.read(response)?;
        debug!("Index {} ({}) ready", name, kind.as_str());
        Ok(IndexHandle {
            kind,
            name: name.to_string(),
            config: config.cloned(),
        })
    }

    fn index_get(
        &self,
        index: &IndexHandle,
        field: &str,
        value: &Value,
    ) -> Result<Vec<PropertyMap>, GraphStoreError> {
        let url = index_get_url(&self.endpoint, index, field, value)?;
        let response = self.client.get(url).send()?;
        let body = self.read(response)?;
        extract_element_data(body)
    }
}

/// Parse an endpoint URL, making sure relative joins land beneath it.
fn parse_endpoint(endpoint: &str) -> Result<Url, GraphStoreError> {
    let normalized = if endpoint.ends_with('/') {
        endpoint.to_string()
    } else {
        format!("{}/", endpoint)
    };
    Url::parse(&normalized).map_err(|e| GraphStoreError::InvalidEndpoint(format!("{}: {}", endpoint, e)))
}

fn index_get_url(
    endpoint: &Url,
    index: &IndexHandle,
    field: &str,
    value: &Value,
) -> Result<Url, GraphStoreError> {
    let mut url = endpoint.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| GraphStoreError::InvalidEndpoint(endpoint.to_string()))?;
        segments.pop_if_empty().extend([
            "index",
            index.kind.as_str(),
            index.name.as_str(),
            field,
            super::index_key(value).as_str(),
        ]);
    }
    Ok(url)
}

fn interpret_response(status: StatusCode, body: &str) -> Result<Value, GraphStoreError> {
    match status {
        s if s.is_success() => {
            if body.trim().is_empty() {
                Ok(Value::Null)
            } else {
                Ok(serde_json::from_str(body)?)
            }
        }
        StatusCode::BAD_REQUEST => {
            let message = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| body.to_string());
            Err(GraphStoreError::from_script_failure(message))
        }
        _ => Err(GraphStoreError::Status {
            status: status.as_u16(),
            body: body.to_string(),
        }),
    }
}

/// Pull the property bags out of an index lookup reply (`[{"data": {...}}, ...]`).
fn extract_element_data(body: Value) -> Result<Vec<PropertyMap>, GraphStoreError> {
    match body {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item.get("data") {
                Some(Value::Object(data)) => Ok(data.clone()),
                _ => Err(GraphStoreError::UnexpectedResponse(item.to_string())),
            })
            .collect(),
        other => Err(GraphStoreError::UnexpectedResponse(other.to_string())),
    }
}
