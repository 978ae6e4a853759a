//! Minimal BigQuery REST client.
//!
//! Covers the three API calls the tools need: creating a table,
//! streaming rows with `tabledata.insertAll`, and running a query.
//! The base URL is overridable so tests can point the client at a
//! local API stub.

pub mod auth;
pub use auth::TokenProvider;

use anyhow::{anyhow, bail, Context};
use rasterbq::record::PixelType;
use rasterbq::Result;
use serde_derive::{Deserialize, Serialize};
use serde_json::json;

pub const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Fully qualified reference to a BigQuery table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    /// Parse a `project.dataset.table` reference.
    pub fn parse(s: &str) -> Result<Self> {
        match s.split('.').collect::<Vec<_>>()[..] {
            [project, dataset, table]
                if !project.is_empty() && !dataset.is_empty() && !table.is_empty() =>
            {
                Ok(TableRef {
                    project: project.into(),
                    dataset: dataset.into(),
                    table: table.into(),
                })
            }
            _ => bail!("invalid table reference {:?} (expected project.dataset.table)", s),
        }
    }
}

impl std::str::FromStr for TableRef {
    type Err = rasterbq::Error;
    fn from_str(s: &str) -> Result<Self> {
        TableRef::parse(s)
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub mode: String,
}

impl TableField {
    fn nullable(name: &str, field_type: &str) -> Self {
        TableField {
            name: name.into(),
            field_type: field_type.into(),
            mode: "NULLABLE".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub fields: Vec<TableField>,
}

/// The table schema for records of one band, matching the row shape
/// of [`BandRecord::to_row`](rasterbq::record::BandRecord::to_row).
pub fn record_schema(band: isize, ty: PixelType, quadbin: bool) -> TableSchema {
    let mut fields = Vec::new();
    for corner in &["NW", "NE", "SE", "SW"] {
        fields.push(TableField::nullable(&format!("lat_{}", corner), "FLOAT"));
        fields.push(TableField::nullable(&format!("lon_{}", corner), "FLOAT"));
    }
    fields.push(TableField::nullable("block_height", "INTEGER"));
    fields.push(TableField::nullable("block_width", "INTEGER"));
    fields.push(TableField::nullable("attrs", "STRING"));
    if quadbin {
        fields.push(TableField::nullable("quadbin", "INTEGER"));
    }
    fields.push(TableField::nullable(
        &rasterbq::record::value_field(band, ty),
        "BYTES",
    ));
    TableSchema { fields }
}

#[derive(Deserialize)]
struct InsertAllResponse {
    #[serde(rename = "insertErrors", default)]
    insert_errors: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct QueryResponse {
    // absent when the job does not complete within the API timeout
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<QueryRow>,
    #[serde(rename = "jobComplete", default)]
    job_complete: Option<bool>,
}

#[derive(Deserialize)]
struct QueryRow {
    f: Vec<QueryCell>,
}

#[derive(Deserialize)]
struct QueryCell {
    v: serde_json::Value,
}

/// Client for the BigQuery v2 REST API.
pub struct BigQueryClient {
    http: reqwest::Client,
    base_url: String,
    token: TokenProvider,
}

impl BigQueryClient {
    pub fn new(token: TokenProvider) -> Self {
        BigQueryClient::with_base_url(token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(token: TokenProvider, base_url: &str) -> Self {
        BigQueryClient {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').into(),
            token,
        }
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<reqwest::Response> {
        let token = self.token.token(&self.http).await?;
        Ok(self
            .http
            .post(&format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {}", path))?)
    }

    /// Create the table if it does not already exist.
    pub async fn ensure_table(&self, table: &TableRef, schema: &TableSchema) -> Result<()> {
        let path = format!(
            "/projects/{}/datasets/{}/tables",
            table.project, table.dataset
        );
        let body = json!({
            "tableReference": {
                "projectId": table.project,
                "datasetId": table.dataset,
                "tableId": table.table,
            },
            "schema": schema,
        });
        let resp = self.post(&path, &body).await?;
        let status = resp.status();
        // 409 means the table already exists
        if status.is_success() || status == reqwest::StatusCode::CONFLICT {
            return Ok(());
        }
        bail!(
            "creating table {} failed with {}: {}",
            table,
            status,
            resp.text().await.unwrap_or_default()
        )
    }

    /// Stream a batch of rows into the table.
    pub async fn insert_all(&self, table: &TableRef, rows: &[serde_json::Value]) -> Result<()> {
        let path = format!(
            "/projects/{}/datasets/{}/tables/{}/insertAll",
            table.project, table.dataset, table.table
        );
        let body = json!({
            "rows": rows.iter().map(|row| json!({ "json": row })).collect::<Vec<_>>(),
        });
        let resp = self.post(&path, &body).await?;
        let status = resp.status();
        if !status.is_success() {
            bail!(
                "inserting into {} failed with {}: {}",
                table,
                status,
                resp.text().await.unwrap_or_default()
            );
        }
        let resp: InsertAllResponse = resp.json().await?;
        if !resp.insert_errors.is_empty() {
            bail!(
                "inserting into {}: {} rows rejected: {}",
                table,
                resp.insert_errors.len(),
                serde_json::to_string(&resp.insert_errors)?
            );
        }
        Ok(())
    }

    /// Run a query and return its rows as JSON objects keyed by the
    /// result schema's field names. Cell values keep the string form
    /// the API returns them in.
    pub async fn query(&self, project: &str, sql: &str) -> Result<Vec<serde_json::Value>> {
        let path = format!("/projects/{}/queries", project);
        let body = json!({ "query": sql, "useLegacySql": false });
        let resp = self.post(&path, &body).await?;
        let status = resp.status();
        if !status.is_success() {
            bail!(
                "query failed with {}: {}",
                status,
                resp.text().await.unwrap_or_default()
            );
        }
        let resp: QueryResponse = resp.json().await?;
        if resp.job_complete == Some(false) {
            bail!("query did not complete within the API timeout");
        }
        let schema = resp
            .schema
            .ok_or_else(|| anyhow!("query response carries no schema"))?;
        resp.rows
            .into_iter()
            .map(|row| {
                if row.f.len() != schema.fields.len() {
                    return Err(anyhow!("query row arity does not match schema"));
                }
                Ok(serde_json::Value::Object(
                    schema
                        .fields
                        .iter()
                        .map(|field| field.name.clone())
                        .zip(row.f.into_iter().map(|cell| cell.v))
                        .collect(),
                ))
            })
            .collect()
    }

    /// The first `limit` rows of a table.
    pub async fn peek_rows(&self, table: &TableRef, limit: usize) -> Result<Vec<serde_json::Value>> {
        let sql = format!("SELECT * FROM `{}` LIMIT {}", table, limit);
        self.query(&table.project, &sql).await
    }
}

/// Destination for batches of record rows.
#[async_trait::async_trait]
pub trait RecordSink {
    async fn write_batch(&mut self, rows: &[serde_json::Value]) -> Result<()>;
}

/// Sink streaming rows into a BigQuery table.
pub struct BigQuerySink<'a> {
    pub client: &'a BigQueryClient,
    pub table: TableRef,
}

#[async_trait::async_trait]
impl<'a> RecordSink for BigQuerySink<'a> {
    async fn write_batch(&mut self, rows: &[serde_json::Value]) -> Result<()> {
        self.client.insert_all(&self.table, rows).await
    }
}

/// Sink writing rows as newline-delimited JSON, for dry runs and
/// offline loads with `bq load`.
pub struct NdjsonSink<W: std::io::Write + Send> {
    pub writer: W,
}

#[async_trait::async_trait]
impl<W: std::io::Write + Send> RecordSink for NdjsonSink<W> {
    async fn write_batch(&mut self, rows: &[serde_json::Value]) -> Result<()> {
        for row in rows {
            serde_json::to_writer(&mut self.writer, row)?;
            self.writer.write_all(b"\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_table() -> TableRef {
        TableRef::parse("proj.data.raster").unwrap()
    }

    fn test_client(server: &MockServer) -> BigQueryClient {
        BigQueryClient::with_base_url(TokenProvider::fixed("test-token"), &server.uri())
    }

    #[test]
    fn table_ref_parsing() {
        let t = test_table();
        assert_eq!(t.project, "proj");
        assert_eq!(t.dataset, "data");
        assert_eq!(t.table, "raster");
        assert_eq!(t.to_string(), "proj.data.raster");
        assert!(TableRef::parse("only.two").is_err());
        assert!(TableRef::parse("a.b.c.d").is_err());
        assert!(TableRef::parse("a..c").is_err());
    }

    #[test]
    fn schema_shape() {
        let schema = record_schema(2, PixelType::Float32, true);
        let names: Vec<_> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "lat_NW",
                "lon_NW",
                "lat_NE",
                "lon_NE",
                "lat_SE",
                "lon_SE",
                "lat_SW",
                "lon_SW",
                "block_height",
                "block_width",
                "attrs",
                "quadbin",
                "band_2_float32",
            ]
        );
        assert_eq!(schema.fields.last().unwrap().field_type, "BYTES");

        let schema = record_schema(1, PixelType::UInt8, false);
        assert!(schema.fields.iter().all(|f| f.name != "quadbin"));
    }

    #[tokio::test]
    async fn ensure_table_creates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/proj/datasets/data/tables"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(serde_json::json!({
                "tableReference": { "tableId": "raster" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let schema = record_schema(1, PixelType::UInt8, false);
        client.ensure_table(&test_table(), &schema).await.unwrap();
    }

    #[tokio::test]
    async fn ensure_table_tolerates_existing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/proj/datasets/data/tables"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "error": { "message": "Already Exists" }
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let schema = record_schema(1, PixelType::UInt8, false);
        client.ensure_table(&test_table(), &schema).await.unwrap();
    }

    #[tokio::test]
    async fn ensure_table_propagates_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let schema = record_schema(1, PixelType::UInt8, false);
        let err = client
            .ensure_table(&test_table(), &schema)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn insert_all_wraps_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/proj/datasets/data/tables/raster/insertAll"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(serde_json::json!({
                "rows": [{ "json": { "block_width": 4 } }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "kind": "bigquery#tableDataInsertAllResponse"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let rows = vec![serde_json::json!({ "block_width": 4 })];
        client.insert_all(&test_table(), &rows).await.unwrap();
    }

    #[tokio::test]
    async fn insert_all_rejects_row_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "insertErrors": [
                    { "index": 0, "errors": [{ "reason": "invalid" }] }
                ]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let rows = vec![serde_json::json!({ "block_width": 4 })];
        let err = client.insert_all(&test_table(), &rows).await.unwrap_err();
        assert!(err.to_string().contains("1 rows rejected"));
    }

    #[tokio::test]
    async fn query_maps_rows_to_objects() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/proj/queries"))
            .and(body_partial_json(serde_json::json!({
                "useLegacySql": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jobComplete": true,
                "schema": { "fields": [
                    { "name": "block_width", "type": "INTEGER", "mode": "NULLABLE" },
                    { "name": "attrs", "type": "STRING", "mode": "NULLABLE" }
                ]},
                "rows": [
                    { "f": [{ "v": "4" }, { "v": "{}" }] },
                    { "f": [{ "v": "8" }, { "v": null }] }
                ]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let rows = client
            .peek_rows(&test_table(), 2)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["block_width"], serde_json::json!("4"));
        assert_eq!(rows[1]["attrs"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn ndjson_sink_writes_lines() {
        let mut buf = Vec::new();
        {
            let mut sink = NdjsonSink { writer: &mut buf };
            sink.write_batch(&[
                serde_json::json!({ "a": 1 }),
                serde_json::json!({ "b": 2 }),
            ])
            .await
            .unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "{\"a\":1}\n{\"b\":2}\n");
    }
}
