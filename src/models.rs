use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Comment `type` value marking a comment on a post.
pub const POST_COMMENT_TYPE: i32 = 2;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub like: i64,
    #[serde(rename = "likeIds", default)]
    pub like_ids: Vec<i64>,
    #[serde(default)]
    pub watch: i64,
    pub city: Option<i64>,
    #[serde(rename = "cityName")]
    pub city_name: Option<String>,
    pub account: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    #[serde(rename = "type")]
    pub comment_type: i32,
    pub level: i32,
    pub follow: Option<i64>,
    pub post: Option<i64>,
    pub hotel: Option<i64>,
    pub account: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Account {
    pub id: i64,
    pub username: String,
    #[serde(rename = "starPosts", default)]
    pub star_posts: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct City {
    pub id: i64,
    pub name: String,
}

/// Fields for a post about to be inserted.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub account: i64,
    pub city: i64,
    pub city_name: String,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub content: String,
    pub comment_type: i32,
    pub level: i32,
    pub follow: Option<i64>,
    pub post: Option<i64>,
    pub hotel: Option<i64>,
    pub account: Option<i64>,
}

/// Partial post update. `None` leaves the stored value untouched.
///
/// Counters (`like`, `likeIds`, `watch`) are not patchable; they only move
/// through the accessor's atomic operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub city: Option<City>,
}

impl PostPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.city.is_none()
    }
}

/// Result of an atomic like attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum LikeOutcome {
    Liked(Post),
    AlreadyLiked,
}

/// Result of an atomic favorite attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum StarOutcome {
    Starred(Account),
    AlreadyStarred,
}

/// A city given either by id or by (part of) its name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CityRef {
    Id(i64),
    Name(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub city: Option<CityRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub city: Option<CityRef>,
}

/// Query string carrying the target post id for star and like.
#[derive(Debug, Deserialize)]
pub struct PostIdQuery {
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(message),
        }
    }
}

/// `{status, message, data?}` acknowledgement used by star, like and create.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse<T> {
    pub status: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl StatusResponse<()> {
    pub fn ok(message: &str) -> Self {
        Self {
            status: 0,
            message: message.to_string(),
            data: None,
        }
    }
}

impl<T> StatusResponse<T> {
    pub fn with_data(message: &str, data: T) -> Self {
        Self {
            status: 0,
            message: message.to_string(),
            data: Some(data),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub total: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FeedResponse<T> {
    pub data: Vec<T>,
}

// Accept number or numeric string (or null/empty) for Option<i64>
fn de_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    let opt = Option::<serde_json::Value>::deserialize(deserializer)?;
    match opt {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("invalid id number")),
        Some(serde_json::Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse::<i64>()
                    .map(Some)
                    .map_err(|_| serde::de::Error::custom("invalid id string"))
            }
        }
        Some(_) => Err(serde::de::Error::custom("expected number or string or null")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn city_ref_distinguishes_ids_from_names() {
        let by_id: CreatePostRequest =
            serde_json::from_value(json!({"title": "t", "content": "c", "city": 3})).unwrap();
        assert_eq!(by_id.city, Some(CityRef::Id(3)));

        let by_name: CreatePostRequest =
            serde_json::from_value(json!({"content": "c", "city": "广州"})).unwrap();
        assert_eq!(by_name.city, Some(CityRef::Name("广州".into())));
        assert!(by_name.title.is_empty());
    }

    #[test]
    fn post_uses_wire_field_names() {
        let post = Post {
            id: 1,
            title: "t".into(),
            content: "c".into(),
            like: 1,
            like_ids: vec![9],
            watch: 0,
            city: Some(2),
            city_name: Some("广州市".into()),
            account: Some(9),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let value = serde_json::to_value(&post).unwrap();
        assert_eq!(value["likeIds"], json!([9]));
        assert_eq!(value["cityName"], json!("广州市"));
        assert!(value.get("like_ids").is_none());
    }

    #[test]
    fn post_id_query_accepts_strings_and_blanks() {
        let q: PostIdQuery = serde_json::from_value(json!({"id": "42"})).unwrap();
        assert_eq!(q.id, Some(42));
        let q: PostIdQuery = serde_json::from_value(json!({"id": ""})).unwrap();
        assert_eq!(q.id, None);
        let q: PostIdQuery = serde_json::from_value(json!({})).unwrap();
        assert_eq!(q.id, None);
        assert!(serde_json::from_value::<PostIdQuery>(json!({"id": "abc"})).is_err());
    }

    #[test]
    fn status_response_omits_missing_data() {
        let value = serde_json::to_value(StatusResponse::ok("done")).unwrap();
        assert_eq!(value, json!({"status": 0, "message": "done"}));
    }
}
