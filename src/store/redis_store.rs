use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{CounterStore, StoreError, WindowCount};

/// INCR and first-hit EXPIRE run server-side as one script, so concurrent
/// callers never observe a counter without an expiry.
const INCREMENT_WITH_EXPIRY: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('TTL', KEYS[1])
if ttl < 0 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#;

pub struct RedisStore {
    client: Client,
    connection: Mutex<Option<ConnectionManager>>,
    script: Script,
    op_timeout: Duration,
}

impl RedisStore {
    /// Builds the client without connecting; the first operation connects.
    pub fn new(redis_url: &str, op_timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::open(redis_url).map_err(|e| {
            StoreError::Unavailable(format!("Failed to create Redis client: {}", e))
        })?;

        Ok(Self {
            client,
            connection: Mutex::new(None),
            script: Script::new(INCREMENT_WITH_EXPIRY),
            op_timeout,
        })
    }

    /// Returns a handle to the shared connection, establishing it if needed.
    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        // The connection driver can panic when the peer closes the socket
        // mid-handshake; a spawned task turns that into a join error.
        let client = self.client.clone();
        let op_timeout = self.op_timeout;
        let setup = tokio::spawn(async move {
            tokio::time::timeout(op_timeout, client.get_connection_manager()).await
        });
        let conn = match setup.await {
            Ok(Ok(Ok(conn))) => conn,
            Ok(Ok(Err(e))) => {
                return Err(StoreError::Unavailable(format!(
                    "Failed to connect to Redis: {}",
                    e
                )))
            }
            Ok(Err(_)) => return Err(StoreError::Timeout(op_timeout.as_millis() as u64)),
            Err(e) => {
                tracing::error!(error = %e, "Redis connection setup aborted");
                return Err(StoreError::Unavailable(format!(
                    "Redis connection setup aborted: {}",
                    e
                )));
            }
        };
        *guard = Some(conn.clone());
        tracing::info!("Connected to Redis");
        Ok(conn)
    }

    /// Drops the cached connection so the next call reconnects.
    async fn reset_on_unavailable<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if matches!(result, Err(StoreError::Unavailable(_)) | Err(StoreError::Timeout(_))) {
            self.connection.lock().await.take();
        }
        result
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.op_timeout.as_millis() as u64)),
        }
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn increment_with_expiry(
        &self,
        key: &str,
        window_secs: u64,
    ) -> Result<WindowCount, StoreError> {
        let result = async {
            let mut conn = self.connection().await?;
            let (count, ttl): (i64, i64) = self
                .with_timeout(async {
                    self.script
                        .key(key)
                        .arg(window_secs)
                        .invoke_async(&mut conn)
                        .await
                        .map_err(StoreError::from)
                })
                .await?;
            Ok(WindowCount {
                count: count.max(0) as u64,
                ttl_secs: ttl.max(0) as u64,
            })
        }
        .await;
        self.reset_on_unavailable(result).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let result = async {
            let mut conn = self.connection().await?;
            self.with_timeout(async {
                redis::cmd("GET")
                    .arg(key)
                    .query_async::<_, Option<String>>(&mut conn)
                    .await
                    .map_err(StoreError::from)
            })
            .await
        }
        .await;
        self.reset_on_unavailable(result).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let result = async {
            let mut conn = self.connection().await?;
            self.with_timeout(async {
                redis::cmd("SETEX")
                    .arg(key)
                    .arg(ttl_secs)
                    .arg(value)
                    .query_async::<_, ()>(&mut conn)
                    .await
                    .map_err(StoreError::from)
            })
            .await
        }
        .await;
        self.reset_on_unavailable(result).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let result = async {
            let mut conn = self.connection().await?;
            self.with_timeout(async {
                redis::cmd("PING")
                    .query_async::<_, String>(&mut conn)
                    .await
                    .map(|_| ())
                    .map_err(StoreError::from)
            })
            .await
        }
        .await;
        self.reset_on_unavailable(result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_url() {
        assert!(RedisStore::new("not a url", Duration::from_millis(50)).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_unavailable() {
        // Port 1 is never a Redis server; the connect fails or times out.
        let store = RedisStore::new("redis://127.0.0.1:1", Duration::from_millis(200)).unwrap();
        let err = store.ping().await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Unavailable(_) | StoreError::Timeout(_)
        ));
        assert!(store.get("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_peer_that_drops_connections_reports_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let acceptor = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, _)) => drop(socket),
                    Err(_) => break,
                }
            }
        });

        let store =
            RedisStore::new(&format!("redis://{}", addr), Duration::from_millis(500)).unwrap();
        let err = store.increment_with_expiry("k", 60).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Unavailable(_) | StoreError::Timeout(_)
        ));
        assert!(store.get("k").await.is_err());

        acceptor.abort();
    }
}
