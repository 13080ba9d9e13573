/**
 * PostgREST HTTP Remote
 *
 * Talks to the hosted backend's REST interface:
 *
 * - create: `POST /rest/v1/{table}` with `Prefer: return=representation`
 * - update: `PATCH /rest/v1/{table}?{field}=eq.{value}`
 * - delete: `DELETE /rest/v1/{table}?{field}=eq.{value}`
 * - fetch:  `GET /rest/v1/{table}?select=*&order={field}.{asc|desc}`
 *
 * Requests carry the project key in `apikey` and the session's access token
 * (or the project key when signed out) as a bearer token.
 */

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};

use super::{RemoteError, RemoteService};
use crate::client::config::Config;
use crate::client::session::SessionState;
use crate::shared::config::ConfigError;
use crate::shared::record::{Record, RecordId, Table};

/// reqwest-backed remote
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    session: SessionState,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, session: SessionState) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            session,
        }
    }

    /// Build from client configuration; a server URL is required
    pub fn from_config(config: &Config, session: SessionState) -> Result<Self, ConfigError> {
        let base_url = config.server_url().ok_or(ConfigError::MissingValue("server_url"))?;
        Ok(Self::new(base_url, config.api_key().map(str::to_string), session))
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.as_str())
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let mut request = request;
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }
        let token = self
            .session
            .current()
            .and_then(|session| session.access_token)
            .or_else(|| self.api_key.clone());
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = self.authorize(request).send().await.map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_else(|_| status.to_string());
        Err(RemoteError::from_status(status.as_u16(), body))
    }
}

fn eq_filter(match_field: &str, match_value: &RecordId) -> [(String, String); 1] {
    [(match_field.to_string(), format!("eq.{}", match_value))]
}

fn transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_decode() {
        RemoteError::Malformed(error.to_string())
    } else {
        RemoteError::Network(error.to_string())
    }
}

#[async_trait]
impl RemoteService for HttpRemote {
    async fn create(&self, table: Table, record: &Record) -> Result<Record, RemoteError> {
        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&[record]);

        let rows: Vec<Record> = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Malformed(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| RemoteError::Malformed(format!("insert into {} returned no rows", table)))
    }

    async fn update(
        &self,
        table: Table,
        match_field: &str,
        match_value: &RecordId,
        patch: &Record,
    ) -> Result<(), RemoteError> {
        let request = self
            .client
            .patch(self.table_url(table))
            .query(&eq_filter(match_field, match_value))
            .json(patch);
        self.send(request).await?;
        Ok(())
    }

    async fn delete(&self, table: Table, match_field: &str, match_value: &RecordId) -> Result<(), RemoteError> {
        let request = self
            .client
            .delete(self.table_url(table))
            .query(&eq_filter(match_field, match_value));
        self.send(request).await?;
        Ok(())
    }

    async fn fetch_all(&self, table: Table) -> Result<Vec<Record>, RemoteError> {
        let mut request = self.client.get(self.table_url(table)).query(&[("select", "*")]);
        if let Some(order) = table.default_order() {
            let direction = if order.ascending { "asc" } else { "desc" };
            request = request.query(&[("order", format!("{}.{}", order.field, direction))]);
        }

        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Malformed(e.to_string()))
    }
}
