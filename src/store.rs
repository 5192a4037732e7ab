use crate::error::Result;
use crate::filter::RecordFilter;
use crate::models::*;
use async_trait::async_trait;

/// Filterable post fields, by wire name.
pub const POST_FIELDS: &[&str] = &[
    "id",
    "title",
    "content",
    "like",
    "watch",
    "city",
    "cityName",
    "account",
    "created_at",
    "updated_at",
];

pub const COMMENT_FIELDS: &[&str] = &[
    "id",
    "content",
    "type",
    "level",
    "follow",
    "post",
    "hotel",
    "account",
    "created_at",
];

pub const CITY_FIELDS: &[&str] = &["id", "name"];

/// Persistence and query capability behind the post handlers.
///
/// Lookups by id fail with `AppError::NotFound` when the record is absent.
/// `like_post`, `increment_post_watch` and `star_post` are single atomic
/// operations so concurrent requests cannot lose updates.
#[async_trait]
pub trait RecordAccessor: Send + Sync {
    /// Short backend name for health output.
    fn kind(&self) -> &'static str;

    /// Backend statistics reported by the health endpoint.
    fn stats(&self) -> Option<serde_json::Value> {
        None
    }

    async fn fetch_post(&self, id: i64) -> Result<Post>;
    async fn fetch_posts(&self, filter: &RecordFilter) -> Result<Vec<Post>>;
    async fn count_posts(&self, filter: &RecordFilter) -> Result<u64>;
    async fn create_post(&self, post: NewPost) -> Result<Post>;
    async fn update_post(&self, id: i64, patch: PostPatch) -> Result<Post>;
    async fn delete_post(&self, id: i64) -> Result<Post>;

    /// Appends `user` to the post's like set and bumps `like`, unless present.
    async fn like_post(&self, id: i64, user: i64) -> Result<LikeOutcome>;
    async fn increment_post_watch(&self, id: i64) -> Result<Post>;

    async fn fetch_comment(&self, id: i64) -> Result<Comment>;
    async fn fetch_comments(&self, filter: &RecordFilter) -> Result<Vec<Comment>>;
    async fn count_comments(&self, filter: &RecordFilter) -> Result<u64>;
    async fn create_comment(&self, comment: NewComment) -> Result<Comment>;

    async fn fetch_account(&self, id: i64) -> Result<Account>;
    /// Appends `post` to the account's favorites, unless present.
    async fn star_post(&self, account: i64, post: i64) -> Result<StarOutcome>;

    async fn fetch_city(&self, id: i64) -> Result<City>;
    async fn fetch_cities(&self, filter: &RecordFilter) -> Result<Vec<City>>;
}
