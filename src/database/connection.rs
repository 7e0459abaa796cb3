use log::{error, warn};
use openssl::ssl::{SslConnector, SslMethod};
use postgres_openssl::MakeTlsConnector;
use tokio::time::Duration;
use tokio_postgres::{Client, NoTls};
use url::Url;

use crate::error::StoreError;

const MAX_RETRIES: usize = 3;
const WAIT_BETWEEN_RETRIES: u64 = 2;

/// TLS connector that trusts only the given root certificate
pub fn create_ssl_connector(sslrootcert_path: &str) -> Result<MakeTlsConnector, String> {
    let mut builder =
        SslConnector::builder(SslMethod::tls()).map_err(|e| format!("SSL builder error: {}", e))?;

    builder
        .set_ca_file(sslrootcert_path)
        .map_err(|e| format!("Error loading CA cert: {}", e))?;

    Ok(MakeTlsConnector::new(builder.build()))
}

/// Split `sslrootcert` out of the query string, which libpq accepts but
/// tokio-postgres does not.
pub fn split_sslrootcert(database_url: &str) -> Result<(String, Option<String>), String> {
    let url = Url::parse(database_url).map_err(|e| format!("URL parse error: {}", e))?;

    let mut sslrootcert_path = None;
    let mut clean_params = Vec::new();
    for (key, value) in url.query_pairs() {
        if key == "sslrootcert" {
            sslrootcert_path = Some(value.to_string());
        } else {
            clean_params.push((key.into_owned(), value.into_owned()));
        }
    }

    let mut clean_url = url.clone();
    clean_url.set_query(None);
    if !clean_params.is_empty() {
        let query = clean_params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        clean_url.set_query(Some(&query));
    }

    Ok((clean_url.to_string(), sslrootcert_path))
}

/// Open a connection, over TLS when the URL names a root certificate
async fn connect(database_url: &str) -> Result<Client, String> {
    let (clean_database_url, sslrootcert_path) = split_sslrootcert(database_url)?;

    match sslrootcert_path {
        Some(path) => {
            let connector = create_ssl_connector(&path)?;
            let (client, connection) = tokio_postgres::connect(&clean_database_url, connector)
                .await
                .map_err(|e| e.to_string())?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("Connection error: {}", e);
                }
            });
            Ok(client)
        }
        None => {
            let (client, connection) = tokio_postgres::connect(&clean_database_url, NoTls)
                .await
                .map_err(|e| e.to_string())?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("Connection error: {}", e);
                }
            });
            Ok(client)
        }
    }
}

pub async fn execute_with_retry<F, Fut, T>(
    database_url: &str,
    operation: F,
) -> Result<T, StoreError>
where
    F: Fn(Client) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<T, tokio_postgres::Error>> + Send,
{
    let mut last_error = StoreError::Connection("no attempt made".into());

    for attempt in 0..MAX_RETRIES {
        match connect(database_url).await {
            Ok(client) => match operation(client).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!("Attempt {}: query error: {}", attempt + 1, e);
                    last_error = StoreError::Query(e.to_string());
                }
            },
            Err(e) => {
                warn!("Attempt {}: connection error: {}", attempt + 1, e);
                last_error = StoreError::Connection(e);
            }
        }

        if attempt < MAX_RETRIES - 1 {
            tokio::time::sleep(Duration::from_secs(WAIT_BETWEEN_RETRIES)).await;
        }
    }

    error!("State store unreachable after {} attempts", MAX_RETRIES);
    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sslrootcert() {
        let (url, cert) = split_sslrootcert(
            "postgres://user:pw@db.example.com:5432/air?sslmode=require&sslrootcert=/etc/ca.pem",
        )
        .unwrap();
        assert_eq!(url, "postgres://user:pw@db.example.com:5432/air?sslmode=require");
        assert_eq!(cert.as_deref(), Some("/etc/ca.pem"));
    }

    #[test]
    fn test_plain_url_is_unchanged() {
        let (url, cert) = split_sslrootcert("postgres://localhost/air").unwrap();
        assert_eq!(url, "postgres://localhost/air");
        assert_eq!(cert, None);
    }

    #[test]
    fn test_invalid_url() {
        assert!(split_sslrootcert("not a url").is_err());
    }

    #[test]
    fn test_missing_root_certificate_is_rejected() {
        let err = create_ssl_connector("/nonexistent/air-alert/ca.pem")
            .err()
            .unwrap();
        assert!(err.starts_with("Error loading CA cert"), "{}", err);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_with_last_error() {
        let result = execute_with_retry("not a url", |_client| async {
            Ok::<_, tokio_postgres::Error>(())
        })
        .await;
        match result {
            Err(StoreError::Connection(message)) => assert!(message.contains("URL parse error")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
