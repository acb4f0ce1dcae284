//! Traced database connection.
//!
//! Every statement the engine sends goes through [`Connection`], which logs
//! it in a `db.execute` span.

use std::future::Future;
use std::pin::Pin;

use tracing::Instrument;

use crate::Error;

/// Executes DDL statements, one at a time.
pub trait Connection: Send + Sync {
    /// Execute a statement, returning the number of rows affected.
    fn execute<'a>(
        &'a self,
        sql: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<u64, Error>> + Send + 'a>>;
}

impl Connection for tokio_postgres::Client {
    fn execute<'a>(
        &'a self,
        sql: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<u64, Error>> + Send + 'a>> {
        Box::pin(async move {
            let span = tracing::debug_span!(
                "db.execute",
                sql = %sql,
                affected = tracing::field::Empty,
            );
            // Simple-query protocol: DDL takes no parameters and routine
            // bodies may contain several statements.
            let messages = self
                .simple_query(sql)
                .instrument(span.clone())
                .await?;
            let affected = messages
                .iter()
                .map(|m| match m {
                    tokio_postgres::SimpleQueryMessage::CommandComplete(n) => *n,
                    _ => 0,
                })
                .sum();
            span.record("affected", affected);
            Ok(affected)
        })
    }
}

/// Connect to Postgres, driving the connection on a background task.
pub async fn connect_postgres(url: &str) -> Result<tokio_postgres::Client, Error> {
    let (client, connection) = tokio_postgres::connect(url, tokio_postgres::NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("postgres connection error: {e}");
        }
    });
    Ok(client)
}
