//! In-process record store used when no database is configured, and by tests.

use crate::error::{AppError, Result};
use crate::filter::{RecordFilter, SortDirection};
use crate::models::*;
use crate::store::{RecordAccessor, CITY_FIELDS, COMMENT_FIELDS, POST_FIELDS};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};

#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Null,
    Int(i64),
    Text(String),
    Time(DateTime<Utc>),
}

impl FieldValue {
    fn as_text(&self) -> String {
        match self {
            FieldValue::Null => "null".to_string(),
            FieldValue::Int(v) => v.to_string(),
            FieldValue::Text(v) => v.clone(),
            FieldValue::Time(v) => v.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Int(b)) => a.cmp(b),
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            (FieldValue::Time(a), FieldValue::Time(b)) => a.cmp(b),
            (FieldValue::Null, FieldValue::Null) => Ordering::Equal,
            (FieldValue::Null, _) => Ordering::Less,
            (_, FieldValue::Null) => Ordering::Greater,
            (a, b) => a.as_text().cmp(&b.as_text()),
        }
    }
}

impl From<Option<i64>> for FieldValue {
    fn from(value: Option<i64>) -> Self {
        value.map_or(FieldValue::Null, FieldValue::Int)
    }
}

/// Field lookup by wire name, for filtering and sorting.
trait Fields {
    fn id(&self) -> i64;
    fn field(&self, name: &str) -> FieldValue;
}

impl Fields for Post {
    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "id" => FieldValue::Int(self.id),
            "title" => FieldValue::Text(self.title.clone()),
            "content" => FieldValue::Text(self.content.clone()),
            "like" => FieldValue::Int(self.like),
            "watch" => FieldValue::Int(self.watch),
            "city" => self.city.into(),
            "cityName" => self
                .city_name
                .clone()
                .map_or(FieldValue::Null, FieldValue::Text),
            "account" => self.account.into(),
            "created_at" => FieldValue::Time(self.created_at),
            "updated_at" => FieldValue::Time(self.updated_at),
            _ => FieldValue::Null,
        }
    }
}

impl Fields for Comment {
    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "id" => FieldValue::Int(self.id),
            "content" => FieldValue::Text(self.content.clone()),
            "type" => FieldValue::Int(self.comment_type.into()),
            "level" => FieldValue::Int(self.level.into()),
            "follow" => self.follow.into(),
            "post" => self.post.into(),
            "hotel" => self.hotel.into(),
            "account" => self.account.into(),
            "created_at" => FieldValue::Time(self.created_at),
            _ => FieldValue::Null,
        }
    }
}

impl Fields for City {
    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "id" => FieldValue::Int(self.id),
            "name" => FieldValue::Text(self.name.clone()),
            _ => FieldValue::Null,
        }
    }
}

fn matches<T: Fields>(record: &T, filter: &RecordFilter) -> bool {
    let equals_ok = filter
        .equals
        .iter()
        .all(|(field, value)| record.field(field).as_text() == *value);
    let contains_ok = filter.contains.iter().all(|(field, needle)| {
        record
            .field(field)
            .as_text()
            .to_lowercase()
            .contains(&needle.to_lowercase())
    });
    equals_ok && contains_ok
}

fn apply_filter<T: Fields>(mut records: Vec<T>, filter: &RecordFilter) -> Vec<T> {
    records.retain(|r| matches(r, filter));

    match &filter.sort {
        Some(sort) => records.sort_by(|a, b| {
            let ord = a
                .field(&sort.field)
                .compare(&b.field(&sort.field))
                .then_with(|| a.id().cmp(&b.id()));
            match sort.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        }),
        None => records.sort_by_key(|r| r.id()),
    }

    let start = filter.start.unwrap_or(0) as usize;
    let limit = filter.limit.map_or(usize::MAX, |l| l as usize);
    records.into_iter().skip(start).take(limit).collect()
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    posts: DashMap<i64, Post>,
    comments: DashMap<i64, Comment>,
    accounts: DashMap<i64, Account>,
    cities: DashMap<i64, City>,
    post_seq: AtomicI64,
    comment_seq: AtomicI64,
    account_seq: AtomicI64,
    city_seq: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(seq: &AtomicI64) -> i64 {
        seq.fetch_add(1, AtomicOrdering::SeqCst) + 1
    }

    fn bump_seq(seq: &AtomicI64, id: i64) {
        seq.fetch_max(id, AtomicOrdering::SeqCst);
    }

    pub fn insert_account(&self, username: &str) -> Account {
        let account = Account {
            id: Self::next_id(&self.account_seq),
            username: username.to_string(),
            star_posts: Vec::new(),
        };
        self.accounts.insert(account.id, account.clone());
        account
    }

    pub fn insert_city(&self, name: &str) -> City {
        let city = City {
            id: Self::next_id(&self.city_seq),
            name: name.to_string(),
        };
        self.cities.insert(city.id, city.clone());
        city
    }

    /// Stores a fully-formed post as is, keeping its id and timestamps.
    pub fn insert_post(&self, post: Post) -> Post {
        Self::bump_seq(&self.post_seq, post.id);
        self.posts.insert(post.id, post.clone());
        post
    }

    /// Stores a fully-formed comment as is, keeping its id and links.
    pub fn insert_comment(&self, comment: Comment) -> Comment {
        Self::bump_seq(&self.comment_seq, comment.id);
        self.comments.insert(comment.id, comment.clone());
        comment
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }
}

#[async_trait]
impl RecordAccessor for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn fetch_post(&self, id: i64) -> Result<Post> {
        self.posts
            .get(&id)
            .map(|p| p.value().clone())
            .ok_or(AppError::NotFound { entity: "post", id })
    }

    async fn fetch_posts(&self, filter: &RecordFilter) -> Result<Vec<Post>> {
        filter.validate_fields("post", POST_FIELDS)?;
        let posts = self.posts.iter().map(|p| p.value().clone()).collect();
        Ok(apply_filter(posts, filter))
    }

    async fn count_posts(&self, filter: &RecordFilter) -> Result<u64> {
        Ok(self.fetch_posts(&filter.without_pagination()).await?.len() as u64)
    }

    async fn create_post(&self, post: NewPost) -> Result<Post> {
        let now = Utc::now();
        let post = Post {
            id: Self::next_id(&self.post_seq),
            title: post.title,
            content: post.content,
            like: 0,
            like_ids: Vec::new(),
            watch: 0,
            city: Some(post.city),
            city_name: Some(post.city_name),
            account: Some(post.account),
            created_at: now,
            updated_at: now,
        };
        self.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn update_post(&self, id: i64, patch: PostPatch) -> Result<Post> {
        let mut post = self
            .posts
            .get_mut(&id)
            .ok_or(AppError::NotFound { entity: "post", id })?;

        if let Some(title) = patch.title {
            post.title = title;
        }
        if let Some(content) = patch.content {
            post.content = content;
        }
        if let Some(city) = patch.city {
            post.city = Some(city.id);
            post.city_name = Some(city.name);
        }
        post.updated_at = Utc::now();
        Ok(post.clone())
    }

    async fn delete_post(&self, id: i64) -> Result<Post> {
        self.posts
            .remove(&id)
            .map(|(_, post)| post)
            .ok_or(AppError::NotFound { entity: "post", id })
    }

    async fn like_post(&self, id: i64, user: i64) -> Result<LikeOutcome> {
        let mut post = self
            .posts
            .get_mut(&id)
            .ok_or(AppError::NotFound { entity: "post", id })?;

        if post.like_ids.contains(&user) {
            return Ok(LikeOutcome::AlreadyLiked);
        }
        post.like_ids.push(user);
        post.like = post.like_ids.len() as i64;
        Ok(LikeOutcome::Liked(post.clone()))
    }

    async fn increment_post_watch(&self, id: i64) -> Result<Post> {
        let mut post = self
            .posts
            .get_mut(&id)
            .ok_or(AppError::NotFound { entity: "post", id })?;
        post.watch += 1;
        Ok(post.clone())
    }

    async fn fetch_comment(&self, id: i64) -> Result<Comment> {
        self.comments
            .get(&id)
            .map(|c| c.value().clone())
            .ok_or(AppError::NotFound {
                entity: "comment",
                id,
            })
    }

    async fn fetch_comments(&self, filter: &RecordFilter) -> Result<Vec<Comment>> {
        filter.validate_fields("comment", COMMENT_FIELDS)?;
        let comments = self.comments.iter().map(|c| c.value().clone()).collect();
        Ok(apply_filter(comments, filter))
    }

    async fn count_comments(&self, filter: &RecordFilter) -> Result<u64> {
        Ok(self.fetch_comments(&filter.without_pagination()).await?.len() as u64)
    }

    async fn create_comment(&self, comment: NewComment) -> Result<Comment> {
        let comment = Comment {
            id: Self::next_id(&self.comment_seq),
            content: comment.content,
            comment_type: comment.comment_type,
            level: comment.level,
            follow: comment.follow,
            post: comment.post,
            hotel: comment.hotel,
            account: comment.account,
            created_at: Utc::now(),
        };
        self.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn fetch_account(&self, id: i64) -> Result<Account> {
        self.accounts
            .get(&id)
            .map(|a| a.value().clone())
            .ok_or(AppError::NotFound {
                entity: "account",
                id,
            })
    }

    async fn star_post(&self, account: i64, post: i64) -> Result<StarOutcome> {
        let mut record = self.accounts.get_mut(&account).ok_or(AppError::NotFound {
            entity: "account",
            id: account,
        })?;

        if record.star_posts.contains(&post) {
            return Ok(StarOutcome::AlreadyStarred);
        }
        record.star_posts.push(post);
        Ok(StarOutcome::Starred(record.clone()))
    }

    async fn fetch_city(&self, id: i64) -> Result<City> {
        self.cities
            .get(&id)
            .map(|c| c.value().clone())
            .ok_or(AppError::NotFound { entity: "city", id })
    }

    async fn fetch_cities(&self, filter: &RecordFilter) -> Result<Vec<City>> {
        filter.validate_fields("city", CITY_FIELDS)?;
        let cities = self.cities.iter().map(|c| c.value().clone()).collect();
        Ok(apply_filter(cities, filter))
    }
}
