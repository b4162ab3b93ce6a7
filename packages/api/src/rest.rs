//! Table API under `/rest/v1/<table>`.
//!
//! Equality filters become `column=eq.value` query pairs. Single-row reads and
//! writes ask for an object body (`application/vnd.pgrst.object+json`); a read
//! that matches no row comes back as `PGRST116` with "0 rows" in its details and
//! is reported as `Ok(None)`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use store::{BackendError, Filter, Order, RecordStore};
use tracing::debug;

use crate::client::{is_success, HttpBackend};

const OBJECT_MEDIA_TYPE: &str = "application/vnd.pgrst.object+json";

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RestErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

impl RestErrorBody {
    pub(crate) fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    /// Single-object request that matched nothing (as opposed to several rows).
    pub(crate) fn is_zero_rows(&self) -> bool {
        self.code.as_deref() == Some(store::error::NO_ROWS_CODE)
            && self
                .details
                .as_deref()
                .is_some_and(|details| details.contains("0 rows"))
    }

    pub(crate) fn into_error(self, status: u16) -> BackendError {
        let message = self
            .message
            .unwrap_or_else(|| format!("table request failed with status {status}"));
        BackendError::Api {
            status,
            code: self.code,
            message,
        }
    }
}

/// Query pairs for a filtered read.
pub(crate) fn query_pairs(
    filter: &Filter,
    order: Option<&Order>,
    limit: Option<usize>,
) -> Vec<(String, String)> {
    let mut pairs = vec![("select".to_string(), "*".to_string())];
    for (column, value) in filter.predicates() {
        pairs.push((column.clone(), format!("eq.{value}")));
    }
    if let Some(order) = order {
        let direction = if order.ascending { "asc" } else { "desc" };
        pairs.push(("order".to_string(), format!("{}.{}", order.column, direction)));
    }
    if let Some(limit) = limit {
        pairs.push(("limit".to_string(), limit.to_string()));
    }
    pairs
}

impl HttpBackend {
    fn table_url(&self, table: &str) -> String {
        self.config.endpoint(&format!("rest/v1/{table}"))
    }

    async fn write_object<R: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        prefer: &str,
    ) -> Result<R, BackendError> {
        let request = request
            .header("Prefer", prefer)
            .header("Accept", OBJECT_MEDIA_TYPE);
        let (status, text) = self.execute(self.authorize(request)).await?;
        if !is_success(status) {
            return Err(RestErrorBody::parse(&text).into_error(status));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

impl RecordStore for HttpBackend {
    async fn select_one<T: DeserializeOwned + Send>(
        &self,
        table: &str,
        filter: &Filter,
    ) -> Result<Option<T>, BackendError> {
        let request = self
            .http
            .get(self.table_url(table))
            .query(&query_pairs(filter, None, None))
            .header("Accept", OBJECT_MEDIA_TYPE);
        let (status, text) = self.execute(self.authorize(request)).await?;
        if is_success(status) {
            return Ok(Some(serde_json::from_str(&text)?));
        }

        let error = RestErrorBody::parse(&text);
        if error.is_zero_rows() {
            debug!(table, "no row matched");
            return Ok(None);
        }
        Err(error.into_error(status))
    }

    async fn select_list<T: DeserializeOwned + Send>(
        &self,
        table: &str,
        filter: &Filter,
        order: &Order,
        limit: Option<usize>,
    ) -> Result<Vec<T>, BackendError> {
        let request = self
            .http
            .get(self.table_url(table))
            .query(&query_pairs(filter, Some(order), limit));
        let (status, text) = self.execute(self.authorize(request)).await?;
        if !is_success(status) {
            return Err(RestErrorBody::parse(&text).into_error(status));
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn insert<T: Serialize + Sync, R: DeserializeOwned + Send>(
        &self,
        table: &str,
        row: &T,
    ) -> Result<R, BackendError> {
        let request = self.http.post(self.table_url(table)).json(row);
        self.write_object(request, "return=representation").await
    }

    async fn update_by_id<T: Serialize + Sync, R: DeserializeOwned + Send>(
        &self,
        table: &str,
        id: &str,
        patch: &T,
    ) -> Result<R, BackendError> {
        let request = self
            .http
            .patch(self.table_url(table))
            .query(&[("id", format!("eq.{id}"))])
            .json(patch);
        self.write_object(request, "return=representation").await
    }

    async fn upsert<T: Serialize + Sync, R: DeserializeOwned + Send>(
        &self,
        table: &str,
        row: &T,
        on_conflict: &str,
    ) -> Result<R, BackendError> {
        let request = self
            .http
            .post(self.table_url(table))
            .query(&[("on_conflict", on_conflict)])
            .json(row);
        self.write_object(request, "resolution=merge-duplicates,return=representation")
            .await
    }
}
