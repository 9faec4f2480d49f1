use redis::RedisResult;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter. Returns false once `limit` hits are exceeded in the window.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

pub fn rate_limit_key(client: &str, window_start: i64) -> String {
    format!("ratelimit:{}:{}", client, window_start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_key_scopes_client_and_window() {
        assert_eq!(rate_limit_key("10.0.0.7", 29_000_000), "ratelimit:10.0.0.7:29000000");
        assert_ne!(rate_limit_key("10.0.0.7", 1), rate_limit_key("10.0.0.7", 2));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        assert!(RedisClient::new("not a url").await.is_err());
    }
}
