use crate::cache::CacheService;
use crate::enrich::EnrichedPost;
use crate::error::{AppError, Result};
use crate::filter::{RecordFilter, SortDirection};
use crate::models::*;
use crate::store::RecordAccessor;
use crate::thread::{resolve_ancestors, ResolvedComment};
use crate::utils::{contains_cjk, truncate_text};
use log::{debug, info, warn};
use metrics::increment_counter;
use std::collections::HashMap;
use std::sync::Arc;

const RECOMMEND_LIMIT: u64 = 5;
const INVALID_CITY: &str = "please choose a valid city name";

/// Post handler logic on top of a [`RecordAccessor`].
pub struct PostService {
    store: Arc<dyn RecordAccessor>,
    cache: Option<Arc<CacheService>>,
}

impl PostService {
    pub fn new(store: Arc<dyn RecordAccessor>, cache: Option<Arc<CacheService>>) -> Self {
        info!(
            "✅ Post service ready - store: {}, feed cache: {}",
            store.kind(),
            if cache.is_some() { "redis" } else { "disabled" }
        );
        Self { store, cache }
    }

    pub fn store_kind(&self) -> &'static str {
        self.store.kind()
    }

    pub fn store_stats(&self) -> Option<serde_json::Value> {
        self.store.stats()
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Adds `post_id` to the account's favorites.
    pub async fn star(&self, account_id: i64, post_id: Option<i64>) -> Result<()> {
        increment_counter!("post_service_operations_total", "op" => "star");
        let post_id = post_id.ok_or_else(|| AppError::validation("post id is required"))?;
        self.store.fetch_post(post_id).await?;

        match self.store.star_post(account_id, post_id).await? {
            StarOutcome::Starred(account) => {
                info!(
                    "⭐ Account {} favorited post {} ({} favorites)",
                    account.id,
                    post_id,
                    account.star_posts.len()
                );
                Ok(())
            }
            StarOutcome::AlreadyStarred => Err(AppError::conflict("post already favorited")),
        }
    }

    pub async fn like(&self, account_id: i64, post_id: Option<i64>) -> Result<()> {
        increment_counter!("post_service_operations_total", "op" => "like");
        let post_id = post_id.ok_or_else(|| AppError::validation("post id is required"))?;

        match self.store.like_post(post_id, account_id).await? {
            LikeOutcome::Liked(post) => {
                info!("👍 Account {} liked post {} (like: {})", account_id, post.id, post.like);
                self.invalidate_feed();
                Ok(())
            }
            LikeOutcome::AlreadyLiked => Err(AppError::conflict("user already liked this post")),
        }
    }

    /// Post comments, newest first unless the query sorts, each with its
    /// reply chain resolved.
    pub async fn comments(
        &self,
        query: &HashMap<String, String>,
    ) -> Result<ListResponse<ResolvedComment>> {
        increment_counter!("post_service_operations_total", "op" => "comments");
        let filter = RecordFilter::from_query(query)?
            .equals("type", POST_COMMENT_TYPE)
            .sort_by_default("created_at", SortDirection::Desc);

        let comments = self.store.fetch_comments(&filter).await?;
        let total = self
            .store
            .count_comments(&filter.without_pagination())
            .await?;

        let mut data = Vec::with_capacity(comments.len());
        for comment in comments {
            data.push(resolve_ancestors(self.store.as_ref(), comment).await?);
        }

        debug!("Resolved {} comments for {}", data.len(), filter);
        Ok(ListResponse { data, total })
    }

    pub async fn find(&self, query: &HashMap<String, String>) -> Result<ListResponse<EnrichedPost>> {
        increment_counter!("post_service_operations_total", "op" => "find");
        let mut filter = RecordFilter::from_query(query)?;

        let city_name = filter
            .equality("city")
            .filter(|city| contains_cjk(city))
            .map(str::to_string);
        if let Some(name) = city_name {
            match self.find_city_by_name(&name).await? {
                Some(city) => filter.set_equals("city", city.id),
                None => debug!("No city matches {:?}, leaving filter as is", name),
            }
        }

        let posts = self.store.fetch_posts(&filter).await?;
        let total = self.store.count_posts(&filter.without_pagination()).await?;

        Ok(ListResponse {
            data: posts.into_iter().map(EnrichedPost::from).collect(),
            total,
        })
    }

    /// The most recent posts, newest first.
    pub async fn recommend(&self) -> Result<FeedResponse<EnrichedPost>> {
        increment_counter!("post_service_operations_total", "op" => "recommend");

        if let Some(cache) = &self.cache {
            match cache.get_cached_feed() {
                Ok(Some(feed)) => {
                    debug!("⚡ Recommend feed served from Redis ({} posts)", feed.data.len());
                    return Ok(feed);
                }
                Ok(None) => debug!("📭 Recommend feed cache miss"),
                Err(e) => warn!("⚠️ Redis feed lookup failed: {}", e),
            }
        }

        let filter = RecordFilter::new()
            .sort_by("created_at", SortDirection::Desc)
            .limit(RECOMMEND_LIMIT);
        let posts = self.store.fetch_posts(&filter).await?;
        let feed = FeedResponse {
            data: posts.into_iter().map(EnrichedPost::from).collect(),
        };

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.cache_feed(&feed) {
                warn!("⚠️ Failed to cache recommend feed: {}", e);
            }
        }

        Ok(feed)
    }

    /// Returns the post with its view counter already incremented.
    pub async fn find_one(&self, id: i64) -> Result<Post> {
        increment_counter!("post_service_operations_total", "op" => "find_one");
        self.store.increment_post_watch(id).await
    }

    pub async fn count(&self, query: &HashMap<String, String>) -> Result<u64> {
        increment_counter!("post_service_operations_total", "op" => "count");
        let filter = RecordFilter::from_query(query)?;
        self.store.count_posts(&filter).await
    }

    pub async fn create(&self, account_id: i64, request: CreatePostRequest) -> Result<Post> {
        increment_counter!("post_service_operations_total", "op" => "create");
        let city = match request.city {
            Some(city) => self.resolve_city(city).await?,
            None => None,
        }
        .ok_or_else(|| AppError::validation(INVALID_CITY))?;

        let post = self
            .store
            .create_post(NewPost {
                title: request.title,
                content: request.content,
                account: account_id,
                city: city.id,
                city_name: city.name,
            })
            .await?;

        info!(
            "📝 Account {} created post {} \"{}\" in city {:?}",
            account_id,
            post.id,
            truncate_text(&post.title, 30),
            post.city_name
        );
        self.invalidate_feed();
        Ok(post)
    }

    pub async fn update(&self, id: i64, request: UpdatePostRequest) -> Result<Post> {
        increment_counter!("post_service_operations_total", "op" => "update");
        let city = match request.city {
            Some(city) => Some(
                self.resolve_city(city)
                    .await?
                    .ok_or_else(|| AppError::validation(INVALID_CITY))?,
            ),
            None => None,
        };

        let patch = PostPatch {
            title: request.title,
            content: request.content,
            city,
        };
        if patch.is_empty() {
            return self.store.fetch_post(id).await;
        }

        let post = self.store.update_post(id, patch).await?;
        info!("✏️ Post {} updated", post.id);
        self.invalidate_feed();
        Ok(post)
    }

    pub async fn destroy(&self, id: i64) -> Result<Post> {
        increment_counter!("post_service_operations_total", "op" => "destroy");
        let post = self.store.delete_post(id).await?;
        info!("🗑️ Post {} deleted", post.id);
        self.invalidate_feed();
        Ok(post)
    }

    /// Numeric values (or numeric strings) are ids; anything else is matched
    /// as a name substring.
    async fn resolve_city(&self, city: CityRef) -> Result<Option<City>> {
        match city {
            CityRef::Id(id) => self.find_city_by_id(id).await,
            CityRef::Name(name) => match name.trim().parse::<i64>() {
                Ok(id) => self.find_city_by_id(id).await,
                Err(_) => self.find_city_by_name(name.trim()).await,
            },
        }
    }

    async fn find_city_by_id(&self, id: i64) -> Result<Option<City>> {
        match self.store.fetch_city(id).await {
            Ok(city) => Ok(Some(city)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn find_city_by_name(&self, name: &str) -> Result<Option<City>> {
        if name.is_empty() {
            return Ok(None);
        }
        let filter = RecordFilter::new()
            .contains("name", name)
            .sort_by("id", SortDirection::Asc)
            .limit(1);
        Ok(self.store.fetch_cities(&filter).await?.into_iter().next())
    }

    fn invalidate_feed(&self) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.invalidate_feed() {
                warn!("⚠️ Clearing recommend feed cache failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use chrono::{Duration, Utc};

    struct Fixture {
        store: Arc<MemoryStore>,
        service: PostService,
        account: i64,
        city: City,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let account = store.insert_account("alice").id;
        let city = store.insert_city("广州市");
        store.insert_city("北京市");
        let service = PostService::new(store.clone(), None);
        Fixture {
            store,
            service,
            account,
            city,
        }
    }

    fn post(id: i64, city: &City, minutes_ago: i64, content: &str) -> Post {
        let at = Utc::now() - Duration::minutes(minutes_ago);
        Post {
            id,
            title: format!("post {}", id),
            content: content.to_string(),
            like: 0,
            like_ids: Vec::new(),
            watch: 0,
            city: Some(city.id),
            city_name: Some(city.name.clone()),
            account: Some(1),
            created_at: at,
            updated_at: at,
        }
    }

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn star_twice_conflicts_and_keeps_favorites() {
        let f = fixture();
        f.store.insert_post(post(1, &f.city, 0, "x"));

        f.service.star(f.account, Some(1)).await.unwrap();
        let err = f.service.star(f.account, Some(1)).await.unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        let account = f.store.fetch_account(f.account).await.unwrap();
        assert_eq!(account.star_posts, vec![1]);
    }

    #[tokio::test]
    async fn star_requires_post_id() {
        let f = fixture();
        assert!(matches!(
            f.service.star(f.account, None).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn like_then_like_again() {
        let f = fixture();
        f.store.insert_post(post(1, &f.city, 0, "x"));

        f.service.like(7, Some(1)).await.unwrap();
        let err = f.service.like(7, Some(1)).await.unwrap_err();

        assert_eq!(err.to_string(), "user already liked this post");
        let stored = f.store.fetch_post(1).await.unwrap();
        assert_eq!(stored.like_ids, vec![7]);
        assert_eq!(stored.like, 1);
    }

    #[tokio::test]
    async fn create_with_unknown_city_creates_nothing() {
        let f = fixture();
        let request = CreatePostRequest {
            title: "t".into(),
            content: "c".into(),
            city: Some(CityRef::Name("上海".into())),
        };

        let err = f.service.create(f.account, request).await.unwrap_err();
        assert_eq!(err.to_string(), INVALID_CITY);
        assert_eq!(f.store.post_count(), 0);
    }

    #[tokio::test]
    async fn create_without_city_is_rejected() {
        let f = fixture();
        let request = CreatePostRequest {
            title: "t".into(),
            content: "c".into(),
            city: None,
        };
        assert!(matches!(
            f.service.create(f.account, request).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn create_resolves_city_by_name_or_id() {
        let f = fixture();

        let by_name = f
            .service
            .create(
                f.account,
                CreatePostRequest {
                    title: "a".into(),
                    content: "c".into(),
                    city: Some(CityRef::Name("广州".into())),
                },
            )
            .await
            .unwrap();
        assert_eq!(by_name.city, Some(f.city.id));
        assert_eq!(by_name.city_name.as_deref(), Some("广州市"));
        assert_eq!(by_name.account, Some(f.account));

        let by_id = f
            .service
            .create(
                f.account,
                CreatePostRequest {
                    title: "b".into(),
                    content: "c".into(),
                    city: Some(CityRef::Name(f.city.id.to_string())),
                },
            )
            .await
            .unwrap();
        assert_eq!(by_id.city, Some(f.city.id));
    }

    #[tokio::test]
    async fn recommend_returns_newest_first_enriched() {
        let f = fixture();
        f.store.insert_post(post(1, &f.city, 30, "<p>old</p>"));
        f.store
            .insert_post(post(2, &f.city, 10, r#"<p>new</p><img src="a.png">"#));
        f.store.insert_post(post(3, &f.city, 20, "<b>mid</b>"));

        let feed = f.service.recommend().await.unwrap();
        let ids: Vec<i64> = feed.data.iter().map(|p| p.post.id).collect();

        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(feed.data[0].summary, "new");
        assert_eq!(feed.data[0].images, vec!["a.png".to_string()]);
        assert!(feed.data[2].images.is_empty());
    }

    #[tokio::test]
    async fn recommend_caps_feed_size() {
        let f = fixture();
        for id in 1..=8 {
            f.store.insert_post(post(id, &f.city, 100 - id, "x"));
        }
        let feed = f.service.recommend().await.unwrap();
        assert_eq!(feed.data.len(), RECOMMEND_LIMIT as usize);
        assert_eq!(feed.data[0].post.id, 8);
    }

    #[tokio::test]
    async fn find_translates_cjk_city_names() {
        let f = fixture();
        let beijing = f.store.fetch_city(2).await.unwrap();
        f.store.insert_post(post(1, &f.city, 0, "a"));
        f.store.insert_post(post(2, &beijing, 0, "b"));
        f.store.insert_post(post(3, &f.city, 0, "c"));

        let found = f
            .service
            .find(&query(&[("city", "广州"), ("_limit", "1")]))
            .await
            .unwrap();

        assert_eq!(found.total, 2);
        assert_eq!(found.data.len(), 1);
        assert_eq!(found.data[0].post.city, Some(f.city.id));
    }

    #[tokio::test]
    async fn find_with_unmatched_city_name_finds_nothing() {
        let f = fixture();
        f.store.insert_post(post(1, &f.city, 0, "a"));

        let found = f.service.find(&query(&[("city", "深圳")])).await.unwrap();
        assert_eq!(found.total, 0);
        assert!(found.data.is_empty());
    }

    #[tokio::test]
    async fn comments_resolve_chains_with_unpaginated_total() {
        let f = fixture();
        let now = Utc::now();
        for (id, follow, comment_type) in [(1, None, 2), (2, Some(1), 2), (3, Some(2), 2), (4, None, 1)] {
            f.store.insert_comment(Comment {
                id,
                content: format!("c{}", id),
                comment_type,
                level: 1,
                follow,
                post: Some(1),
                hotel: None,
                account: Some(1),
                created_at: now + Duration::seconds(id),
            });
        }

        let page = f
            .service
            .comments(&query(&[("_limit", "1")]))
            .await
            .unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].id, 3);
        assert_eq!(page.data[0].depth(), 2);
    }

    #[tokio::test]
    async fn find_one_increments_watch() {
        let f = fixture();
        f.store.insert_post(post(1, &f.city, 0, "x"));

        assert_eq!(f.service.find_one(1).await.unwrap().watch, 1);
        assert_eq!(f.service.find_one(1).await.unwrap().watch, 2);
        assert!(f.service.find_one(99).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn update_refreshes_city_name() {
        let f = fixture();
        f.store.insert_post(post(1, &f.city, 0, "x"));

        let updated = f
            .service
            .update(
                1,
                UpdatePostRequest {
                    title: Some("renamed".into()),
                    city: Some(CityRef::Name("北京".into())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "renamed");
        assert_eq!(updated.city, Some(2));
        assert_eq!(updated.city_name.as_deref(), Some("北京市"));
        assert_eq!(updated.content, "x");
    }

    #[tokio::test]
    async fn update_rejects_unknown_city() {
        let f = fixture();
        f.store.insert_post(post(1, &f.city, 0, "x"));

        let request = UpdatePostRequest {
            city: Some(CityRef::Id(404)),
            ..Default::default()
        };
        assert!(matches!(
            f.service.update(1, request).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn destroy_returns_deleted_post() {
        let f = fixture();
        f.store.insert_post(post(1, &f.city, 0, "x"));

        assert_eq!(f.service.destroy(1).await.unwrap().id, 1);
        assert_eq!(f.store.post_count(), 0);
        assert!(f.service.destroy(1).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn count_honors_filters() {
        let f = fixture();
        f.store.insert_post(post(1, &f.city, 0, "x"));
        f.store.insert_post(post(2, &f.city, 0, "y"));

        assert_eq!(f.service.count(&query(&[])).await.unwrap(), 2);
        assert_eq!(f.service.count(&query(&[("id", "2")])).await.unwrap(), 1);
        assert!(f.service.count(&query(&[("bogus", "1")])).await.is_err());
    }
}
