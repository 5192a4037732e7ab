use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::filter::RecordFilter;
use crate::models::*;
use crate::store::{RecordAccessor, CITY_FIELDS, COMMENT_FIELDS, POST_FIELDS};
use async_trait::async_trait;
use log::{info, warn};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS cities (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id BIGSERIAL PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        star_posts BIGINT[] NOT NULL DEFAULT '{}'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id BIGSERIAL PRIMARY KEY,
        title TEXT NOT NULL DEFAULT '',
        content TEXT NOT NULL DEFAULT '',
        like_count BIGINT NOT NULL DEFAULT 0,
        like_ids BIGINT[] NOT NULL DEFAULT '{}',
        watch BIGINT NOT NULL DEFAULT 0,
        city_id BIGINT REFERENCES cities(id),
        city_name TEXT,
        account_id BIGINT REFERENCES accounts(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS comments (
        id BIGSERIAL PRIMARY KEY,
        content TEXT NOT NULL DEFAULT '',
        comment_type INTEGER NOT NULL DEFAULT 2,
        level INTEGER NOT NULL DEFAULT 1,
        follow_id BIGINT,
        post_id BIGINT,
        hotel_id BIGINT,
        account_id BIGINT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts (created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_posts_city ON posts (city_id)",
    "CREATE INDEX IF NOT EXISTS idx_comments_post ON comments (post_id, comment_type)",
];

const POST_COLUMNS: &str = "id, title, content, like_count, like_ids, watch, city_id, city_name, account_id, created_at, updated_at";
const COMMENT_COLUMNS: &str =
    "id, content, comment_type, level, follow_id, post_id, hotel_id, account_id, created_at";
const ACCOUNT_COLUMNS: &str = "id, username, star_posts";
const CITY_COLUMNS: &str = "id, name";

fn post_column(field: &str) -> Option<&'static str> {
    Some(match field {
        "id" => "id",
        "title" => "title",
        "content" => "content",
        "like" => "like_count",
        "watch" => "watch",
        "city" => "city_id",
        "cityName" => "city_name",
        "account" => "account_id",
        "created_at" => "created_at",
        "updated_at" => "updated_at",
        _ => return None,
    })
}

fn comment_column(field: &str) -> Option<&'static str> {
    Some(match field {
        "id" => "id",
        "content" => "content",
        "type" => "comment_type",
        "level" => "level",
        "follow" => "follow_id",
        "post" => "post_id",
        "hotel" => "hotel_id",
        "account" => "account_id",
        "created_at" => "created_at",
        _ => return None,
    })
}

fn city_column(field: &str) -> Option<&'static str> {
    Some(match field {
        "id" => "id",
        "name" => "name",
        _ => return None,
    })
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Appends WHERE, ORDER BY and (optionally) LIMIT/OFFSET for `filter`.
///
/// Field names must already be validated against the entity's field list.
fn push_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    filter: &RecordFilter,
    column: fn(&str) -> Option<&'static str>,
    with_order: bool,
) {
    qb.push(" WHERE TRUE");
    for (field, value) in &filter.equals {
        if let Some(col) = column(field) {
            qb.push(" AND ")
                .push(col)
                .push("::text = ")
                .push_bind(value.clone());
        }
    }
    for (field, value) in &filter.contains {
        if let Some(col) = column(field) {
            qb.push(" AND ")
                .push(col)
                .push("::text ILIKE ")
                .push_bind(format!("%{}%", escape_like(value)));
        }
    }

    if !with_order {
        return;
    }

    match filter.sort.as_ref().and_then(|s| column(&s.field).map(|c| (c, s.direction))) {
        Some((col, direction)) => {
            qb.push(" ORDER BY ")
                .push(col)
                .push(" ")
                .push(direction.as_sql())
                .push(", id ASC");
        }
        None => {
            qb.push(" ORDER BY id ASC");
        }
    }
    if let Some(limit) = filter.limit {
        qb.push(" LIMIT ").push_bind(limit as i64);
    }
    if let Some(start) = filter.start {
        qb.push(" OFFSET ").push_bind(start as i64);
    }
}

fn post_from_row(row: &PgRow) -> std::result::Result<Post, sqlx::Error> {
    Ok(Post {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        like: row.try_get("like_count")?,
        like_ids: row.try_get("like_ids")?,
        watch: row.try_get("watch")?,
        city: row.try_get("city_id")?,
        city_name: row.try_get("city_name")?,
        account: row.try_get("account_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn comment_from_row(row: &PgRow) -> std::result::Result<Comment, sqlx::Error> {
    Ok(Comment {
        id: row.try_get("id")?,
        content: row.try_get("content")?,
        comment_type: row.try_get("comment_type")?,
        level: row.try_get("level")?,
        follow: row.try_get("follow_id")?,
        post: row.try_get("post_id")?,
        hotel: row.try_get("hotel_id")?,
        account: row.try_get("account_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn account_from_row(row: &PgRow) -> std::result::Result<Account, sqlx::Error> {
    Ok(Account {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        star_posts: row.try_get("star_posts")?,
    })
}

fn city_from_row(row: &PgRow) -> std::result::Result<City, sqlx::Error> {
    Ok(City {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
    })
}

/// Database performance stats
#[derive(Debug, Default)]
pub struct DatabaseStats {
    pub total_queries: AtomicU64,
    pub total_query_time: AtomicU64,
    pub failed_queries: AtomicU64,
    pub slow_queries: AtomicU64,
}

impl DatabaseStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_query(&self, duration: Duration, success: bool) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        self.total_query_time
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);

        if !success {
            self.failed_queries.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get_avg_query_time(&self) -> f64 {
        let total_queries = self.total_queries.load(Ordering::Relaxed);
        if total_queries == 0 {
            return 0.0;
        }
        let total_time = self.total_query_time.load(Ordering::Relaxed);
        total_time as f64 / total_queries as f64
    }
}

#[derive(Clone)]
pub struct DatabaseService {
    pool: PgPool,
    stats: Arc<DatabaseStats>,
}

impl DatabaseService {
    pub async fn new(config: &AppConfig, database_url: &str) -> std::result::Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .max_lifetime(Duration::from_secs(60 * 60))
            .idle_timeout(Duration::from_secs(15 * 60))
            .acquire_timeout(Duration::from_secs(10))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        info!(
            "Database pool initialized - max connections: {}, min connections: {}",
            config.database_max_connections, config.database_min_connections
        );

        Self::health_check(&pool).await?;

        let service = Self {
            pool,
            stats: Arc::new(DatabaseStats::new()),
        };
        service.ensure_schema().await?;
        Ok(service)
    }

    /// Connection pool health check
    async fn health_check(pool: &PgPool) -> std::result::Result<(), sqlx::Error> {
        let start = Instant::now();
        sqlx::query("SELECT 1").fetch_one(pool).await?;
        info!("Database health check complete - response time: {:?}", start.elapsed());
        Ok(())
    }

    async fn ensure_schema(&self) -> std::result::Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema ready");
        Ok(())
    }

    pub fn get_pool_status(&self) -> String {
        format!(
            "Pool status - total: {}, idle: {}, max: {}",
            self.pool.size(),
            self.pool.num_idle(),
            self.pool.options().get_max_connections()
        )
    }

    pub fn get_database_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "total_queries": self.stats.total_queries.load(Ordering::Relaxed),
            "total_query_time_ms": self.stats.total_query_time.load(Ordering::Relaxed),
            "failed_queries": self.stats.failed_queries.load(Ordering::Relaxed),
            "slow_queries": self.stats.slow_queries.load(Ordering::Relaxed),
            "avg_query_time_ms": self.stats.get_avg_query_time(),
            "pool_status": self.get_pool_status()
        })
    }

    /// Runs `operation`, recording its timing and outcome.
    async fn execute_with_stats<F, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        let start = Instant::now();
        let result = operation.await;
        let duration = start.elapsed();

        self.stats.record_query(duration, result.is_ok());

        if duration.as_millis() > 100 {
            self.stats.slow_queries.fetch_add(1, Ordering::Relaxed);
            warn!("Slow query detected - {}: {:?}", operation_name, duration);
        }

        Ok(result?)
    }

    async fn post_exists(&self, id: i64) -> Result<bool> {
        self.execute_with_stats(
            "post_exists",
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn account_exists(&self, id: i64) -> Result<bool> {
        self.execute_with_stats(
            "account_exists",
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM accounts WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool),
        )
        .await
    }
}

#[async_trait]
impl RecordAccessor for DatabaseService {
    fn kind(&self) -> &'static str {
        "postgres"
    }

    fn stats(&self) -> Option<serde_json::Value> {
        Some(self.get_database_stats())
    }

    async fn fetch_post(&self, id: i64) -> Result<Post> {
        let sql = format!("SELECT {} FROM posts WHERE id = $1", POST_COLUMNS);
        let row = self
            .execute_with_stats(
                "fetch_post",
                sqlx::query(&sql).bind(id).fetch_optional(&self.pool),
            )
            .await?;

        match row {
            Some(row) => Ok(post_from_row(&row)?),
            None => Err(AppError::NotFound { entity: "post", id }),
        }
    }

    async fn fetch_posts(&self, filter: &RecordFilter) -> Result<Vec<Post>> {
        filter.validate_fields("post", POST_FIELDS)?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM posts", POST_COLUMNS));
        push_filter(&mut qb, filter, post_column, true);

        let rows = self
            .execute_with_stats("fetch_posts", qb.build().fetch_all(&self.pool))
            .await?;
        rows.iter()
            .map(|row| post_from_row(row).map_err(AppError::from))
            .collect()
    }

    async fn count_posts(&self, filter: &RecordFilter) -> Result<u64> {
        filter.validate_fields("post", POST_FIELDS)?;

        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts");
        push_filter(&mut qb, filter, post_column, false);

        let count = self
            .execute_with_stats(
                "count_posts",
                qb.build_query_scalar::<i64>().fetch_one(&self.pool),
            )
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn create_post(&self, post: NewPost) -> Result<Post> {
        let sql = format!(
            "INSERT INTO posts (title, content, account_id, city_id, city_name) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            POST_COLUMNS
        );
        let row = self
            .execute_with_stats(
                "create_post",
                sqlx::query(&sql)
                    .bind(&post.title)
                    .bind(&post.content)
                    .bind(post.account)
                    .bind(post.city)
                    .bind(&post.city_name)
                    .fetch_one(&self.pool),
            )
            .await?;
        Ok(post_from_row(&row)?)
    }

    async fn update_post(&self, id: i64, patch: PostPatch) -> Result<Post> {
        let sql = format!(
            "UPDATE posts SET \
                title = COALESCE($2, title), \
                content = COALESCE($3, content), \
                city_id = COALESCE($4, city_id), \
                city_name = COALESCE($5, city_name), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            POST_COLUMNS
        );
        let (city_id, city_name) = match patch.city {
            Some(city) => (Some(city.id), Some(city.name)),
            None => (None, None),
        };
        let row = self
            .execute_with_stats(
                "update_post",
                sqlx::query(&sql)
                    .bind(id)
                    .bind(patch.title)
                    .bind(patch.content)
                    .bind(city_id)
                    .bind(city_name)
                    .fetch_optional(&self.pool),
            )
            .await?;

        match row {
            Some(row) => Ok(post_from_row(&row)?),
            None => Err(AppError::NotFound { entity: "post", id }),
        }
    }

    async fn delete_post(&self, id: i64) -> Result<Post> {
        let sql = format!("DELETE FROM posts WHERE id = $1 RETURNING {}", POST_COLUMNS);
        let row = self
            .execute_with_stats(
                "delete_post",
                sqlx::query(&sql).bind(id).fetch_optional(&self.pool),
            )
            .await?;

        match row {
            Some(row) => Ok(post_from_row(&row)?),
            None => Err(AppError::NotFound { entity: "post", id }),
        }
    }

    async fn like_post(&self, id: i64, user: i64) -> Result<LikeOutcome> {
        // counter is derived from the id set in the same statement
        let sql = format!(
            "UPDATE posts SET \
                like_ids = array_append(like_ids, $2), \
                like_count = cardinality(like_ids) + 1, \
                updated_at = NOW() \
             WHERE id = $1 AND NOT ($2 = ANY(like_ids)) RETURNING {}",
            POST_COLUMNS
        );
        let row = self
            .execute_with_stats(
                "like_post",
                sqlx::query(&sql)
                    .bind(id)
                    .bind(user)
                    .fetch_optional(&self.pool),
            )
            .await?;

        match row {
            Some(row) => Ok(LikeOutcome::Liked(post_from_row(&row)?)),
            None if self.post_exists(id).await? => Ok(LikeOutcome::AlreadyLiked),
            None => Err(AppError::NotFound { entity: "post", id }),
        }
    }

    async fn increment_post_watch(&self, id: i64) -> Result<Post> {
        let sql = format!(
            "UPDATE posts SET watch = watch + 1 WHERE id = $1 RETURNING {}",
            POST_COLUMNS
        );
        let row = self
            .execute_with_stats(
                "increment_post_watch",
                sqlx::query(&sql).bind(id).fetch_optional(&self.pool),
            )
            .await?;

        match row {
            Some(row) => Ok(post_from_row(&row)?),
            None => Err(AppError::NotFound { entity: "post", id }),
        }
    }

    async fn fetch_comment(&self, id: i64) -> Result<Comment> {
        let sql = format!("SELECT {} FROM comments WHERE id = $1", COMMENT_COLUMNS);
        let row = self
            .execute_with_stats(
                "fetch_comment",
                sqlx::query(&sql).bind(id).fetch_optional(&self.pool),
            )
            .await?;

        match row {
            Some(row) => Ok(comment_from_row(&row)?),
            None => Err(AppError::NotFound {
                entity: "comment",
                id,
            }),
        }
    }

    async fn fetch_comments(&self, filter: &RecordFilter) -> Result<Vec<Comment>> {
        filter.validate_fields("comment", COMMENT_FIELDS)?;

        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM comments", COMMENT_COLUMNS));
        push_filter(&mut qb, filter, comment_column, true);

        let rows = self
            .execute_with_stats("fetch_comments", qb.build().fetch_all(&self.pool))
            .await?;
        rows.iter()
            .map(|row| comment_from_row(row).map_err(AppError::from))
            .collect()
    }

    async fn count_comments(&self, filter: &RecordFilter) -> Result<u64> {
        filter.validate_fields("comment", COMMENT_FIELDS)?;

        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM comments");
        push_filter(&mut qb, filter, comment_column, false);

        let count = self
            .execute_with_stats(
                "count_comments",
                qb.build_query_scalar::<i64>().fetch_one(&self.pool),
            )
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn create_comment(&self, comment: NewComment) -> Result<Comment> {
        let sql = format!(
            "INSERT INTO comments (content, comment_type, level, follow_id, post_id, hotel_id, account_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            COMMENT_COLUMNS
        );
        let row = self
            .execute_with_stats(
                "create_comment",
                sqlx::query(&sql)
                    .bind(&comment.content)
                    .bind(comment.comment_type)
                    .bind(comment.level)
                    .bind(comment.follow)
                    .bind(comment.post)
                    .bind(comment.hotel)
                    .bind(comment.account)
                    .fetch_one(&self.pool),
            )
            .await?;
        Ok(comment_from_row(&row)?)
    }

    async fn fetch_account(&self, id: i64) -> Result<Account> {
        let sql = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);
        let row = self
            .execute_with_stats(
                "fetch_account",
                sqlx::query(&sql).bind(id).fetch_optional(&self.pool),
            )
            .await?;

        match row {
            Some(row) => Ok(account_from_row(&row)?),
            None => Err(AppError::NotFound {
                entity: "account",
                id,
            }),
        }
    }

    async fn star_post(&self, account: i64, post: i64) -> Result<StarOutcome> {
        let sql = format!(
            "UPDATE accounts SET star_posts = array_append(star_posts, $2) \
             WHERE id = $1 AND NOT ($2 = ANY(star_posts)) RETURNING {}",
            ACCOUNT_COLUMNS
        );
        let row = self
            .execute_with_stats(
                "star_post",
                sqlx::query(&sql)
                    .bind(account)
                    .bind(post)
                    .fetch_optional(&self.pool),
            )
            .await?;

        match row {
            Some(row) => Ok(StarOutcome::Starred(account_from_row(&row)?)),
            None if self.account_exists(account).await? => Ok(StarOutcome::AlreadyStarred),
            None => Err(AppError::NotFound {
                entity: "account",
                id: account,
            }),
        }
    }

    async fn fetch_city(&self, id: i64) -> Result<City> {
        let sql = format!("SELECT {} FROM cities WHERE id = $1", CITY_COLUMNS);
        let row = self
            .execute_with_stats(
                "fetch_city",
                sqlx::query(&sql).bind(id).fetch_optional(&self.pool),
            )
            .await?;

        match row {
            Some(row) => Ok(city_from_row(&row)?),
            None => Err(AppError::NotFound { entity: "city", id }),
        }
    }

    async fn fetch_cities(&self, filter: &RecordFilter) -> Result<Vec<City>> {
        filter.validate_fields("city", CITY_FIELDS)?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM cities", CITY_COLUMNS));
        push_filter(&mut qb, filter, city_column, true);

        let rows = self
            .execute_with_stats("fetch_cities", qb.build().fetch_all(&self.pool))
            .await?;
        rows.iter()
            .map(|row| city_from_row(row).map_err(AppError::from))
            .collect()
    }
}
