use crate::enrich::EnrichedPost;
use crate::models::FeedResponse;
use redis::{Client, Commands, Connection, RedisResult};

const RECOMMEND_KEY: &str = "posts:recommend";

pub struct CacheService {
    client: Client,
    feed_ttl_secs: u64,
}

impl CacheService {
    pub fn new(redis_url: &str, feed_ttl_secs: u64) -> Result<Self, redis::RedisError> {
        let client = Client::open(redis_url)?;
        Ok(Self {
            client,
            feed_ttl_secs,
        })
    }

    pub fn get_connection(&self) -> RedisResult<Connection> {
        self.client.get_connection()
    }

    pub fn ping(&self) -> RedisResult<()> {
        let mut conn = self.get_connection()?;
        redis::cmd("PING").query::<String>(&mut conn)?;
        Ok(())
    }

    // Cache the recommend feed
    pub fn cache_feed(&self, feed: &FeedResponse<EnrichedPost>) -> RedisResult<()> {
        let mut conn = self.get_connection()?;
        let value = serde_json::to_string(feed).map_err(|e| {
            redis::RedisError::from((
                redis::ErrorKind::TypeError,
                "Serialization failed",
                e.to_string(),
            ))
        })?;

        conn.set_ex::<_, _, ()>(RECOMMEND_KEY, value, self.feed_ttl_secs as usize)?;
        Ok(())
    }

    pub fn get_cached_feed(&self) -> RedisResult<Option<FeedResponse<EnrichedPost>>> {
        let mut conn = self.get_connection()?;

        let cached: Option<String> = conn.get(RECOMMEND_KEY)?;
        match cached {
            Some(data) => {
                let feed = serde_json::from_str(&data).map_err(|e| {
                    redis::RedisError::from((
                        redis::ErrorKind::TypeError,
                        "Deserialization failed",
                        e.to_string(),
                    ))
                })?;
                Ok(Some(feed))
            }
            None => Ok(None),
        }
    }

    pub fn invalidate_feed(&self) -> RedisResult<()> {
        let mut conn = self.get_connection()?;
        let _: () = conn.del(RECOMMEND_KEY)?;
        Ok(())
    }
}
