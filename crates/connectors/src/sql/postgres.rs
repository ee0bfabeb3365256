use crate::{
    adapter::{apply_schema_drift_check, row_watermark, FetchResult, SourceAdapter},
    error::ConnectorError,
    row::DbRow,
    sql::query::{build_query, delete_in_clause},
};
use async_trait::async_trait;
use model::{
    batch::Batch,
    mapping::{Extraction, IncrementalMode, TransferParams},
    watermark::Watermark,
};
use native_tls::TlsConnector;
use serde_json::Value;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::{config::SslMode, Client, Config, NoTls};

/// Postgres source adapter. Holds a single `tokio_postgres::Client`; the
/// connection task is spawned alongside it and dropped with the adapter.
pub struct PostgresSource {
    client: Client,
    extraction: Extraction,
    transfer: TransferParams,
    offset: u64,
    /// Field set established by this run's first non-empty batch; seeds
    /// null-injection and schema drift detection for every batch after.
    field_order: Option<Vec<String>>,
}

impl PostgresSource {
    pub async fn connect(
        url: &str,
        extraction: Extraction,
        transfer: TransferParams,
    ) -> Result<Self, ConnectorError> {
        let client = connect_client(url).await?;
        Ok(Self {
            client,
            extraction,
            transfer,
            offset: 0,
            field_order: None,
        })
    }
}

/// Honors the connection string's `sslmode`, falling back from TLS to a
/// plaintext connection only when the mode is `prefer` (mirrors libpq's own
/// negotiation, and the teacher's `sql::postgres::utils::connect_client`).
async fn connect_client(url: &str) -> Result<Client, ConnectorError> {
    let config = url
        .parse::<Config>()
        .map_err(|e| ConnectorError::Connect(e.to_string()))?;

    match config.get_ssl_mode() {
        SslMode::Disable => connect_without_tls(config).await,
        SslMode::Require => connect_with_tls(config).await,
        SslMode::Prefer => match connect_with_tls(config.clone()).await {
            Ok(client) => Ok(client),
            Err(err) => {
                tracing::warn!(%err, "postgres TLS handshake failed, retrying without TLS");
                connect_without_tls(config).await
            }
        },
        _ => connect_with_tls(config).await,
    }
}

async fn connect_with_tls(config: Config) -> Result<Client, ConnectorError> {
    let connector = TlsConnector::builder()
        .build()
        .map_err(|e| ConnectorError::Connect(e.to_string()))?;
    let tls = MakeTlsConnector::new(connector);
    let (client, connection) = config
        .connect(tls)
        .await
        .map_err(|e| ConnectorError::Connect(e.to_string()))?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            tracing::error!(%err, "postgres connection error");
        }
    });
    Ok(client)
}

async fn connect_without_tls(config: Config) -> Result<Client, ConnectorError> {
    let (client, connection) = config
        .connect(NoTls)
        .await
        .map_err(|e| ConnectorError::Connect(e.to_string()))?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            tracing::error!(%err, "postgres connection error");
        }
    });
    Ok(client)
}

#[async_trait]
impl SourceAdapter for PostgresSource {
    async fn fetch_batch(
        &mut self,
        watermark: &Watermark,
        is_initial: bool,
        batch_size: usize,
    ) -> Result<FetchResult, ConnectorError> {
        let offset = matches!(self.transfer.incremental_mode, IncrementalMode::Full)
            .then_some(self.offset);
        let sql = build_query(&self.extraction, &self.transfer, watermark, is_initial, offset);

        let rows = self.client.query(&sql, &[]).await?;
        let reached_end = rows.len() < batch_size;

        let mut batch = Batch::new();
        let mut tentative: Option<Watermark> = None;
        for row in &rows {
            let record = DbRow::Postgres(row).to_record();
            if let Some(wm) = row_watermark(&self.extraction, self.transfer.incremental_mode, &record) {
                tentative = Some(match tentative {
                    Some(existing) => existing.max(wm),
                    None => wm,
                });
            }
            batch.records.push(record);
        }
        batch.tentative_watermark = tentative;
        apply_schema_drift_check(&mut batch, &mut self.field_order)?;

        if matches!(self.transfer.incremental_mode, IncrementalMode::Full) {
            self.offset += rows.len() as u64;
        }

        Ok(FetchResult { batch, reached_end })
    }

    async fn delete_by_pk(
        &mut self,
        table: &str,
        where_column: &str,
        values: &[Value],
    ) -> Result<u64, ConnectorError> {
        if values.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM {table} WHERE {where_column} IN ({})",
            delete_in_clause(values)
        );
        let affected = self.client.execute(&sql, &[]).await?;
        Ok(affected)
    }
}
