//! Typed record filters.
//!
//! Query strings use the `_sort=field:dir`, `_start`, `_limit` and
//! `field_contains` conventions; [`RecordFilter::from_query`] turns them into an
//! explicit structure that the storage backends interpret.

use crate::error::{AppError, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

const CONTAINS_SUFFIX: &str = "_contains";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub equals: Vec<(String, String)>,
    pub contains: Vec<(String, String)>,
    pub sort: Option<Sort>,
    pub start: Option<u64>,
    pub limit: Option<u64>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_query(query: &HashMap<String, String>) -> Result<Self> {
        let mut filter = Self::new();
        // sorted so the generated SQL is stable for a given query
        let ordered: BTreeMap<&String, &String> = query.iter().collect();

        for (key, value) in ordered {
            match key.as_str() {
                "_sort" => filter.sort = Some(parse_sort(value)?),
                "_start" => filter.start = Some(parse_count("_start", value)?),
                "_limit" => {
                    filter.limit = if value.trim() == "-1" {
                        None
                    } else {
                        Some(parse_count("_limit", value)?)
                    }
                }
                k if k.starts_with('_') => {
                    return Err(AppError::validation(format!(
                        "unsupported query operator `{}`",
                        k
                    )))
                }
                k => match k.strip_suffix(CONTAINS_SUFFIX) {
                    Some(field) if !field.is_empty() => {
                        filter.contains.push((field.to_string(), value.clone()))
                    }
                    _ => filter.equals.push((k.to_string(), value.clone())),
                },
            }
        }

        Ok(filter)
    }

    /// Sets an equality constraint, replacing any existing one on `field`.
    pub fn equals(mut self, field: &str, value: impl ToString) -> Self {
        self.set_equals(field, value);
        self
    }

    pub fn set_equals(&mut self, field: &str, value: impl ToString) {
        self.equals.retain(|(f, _)| f != field);
        self.equals.push((field.to_string(), value.to_string()));
    }

    pub fn contains(mut self, field: &str, value: impl ToString) -> Self {
        self.contains.push((field.to_string(), value.to_string()));
        self
    }

    pub fn sort_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.sort = Some(Sort {
            field: field.to_string(),
            direction,
        });
        self
    }

    /// Applies `field:direction` only when the caller did not pick a sort.
    pub fn sort_by_default(self, field: &str, direction: SortDirection) -> Self {
        if self.sort.is_some() {
            self
        } else {
            self.sort_by(field, direction)
        }
    }

    pub fn start(mut self, start: u64) -> Self {
        self.start = Some(start);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The same filter with `_start`/`_limit` removed, for totals.
    pub fn without_pagination(&self) -> Self {
        Self {
            start: None,
            limit: None,
            ..self.clone()
        }
    }

    pub fn equality(&self, field: &str) -> Option<&str> {
        self.equals
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    /// Rejects filters naming fields outside `allowed`.
    pub fn validate_fields(&self, entity: &str, allowed: &[&str]) -> Result<()> {
        let referenced = self
            .equals
            .iter()
            .chain(self.contains.iter())
            .map(|(f, _)| f.as_str())
            .chain(self.sort.iter().map(|s| s.field.as_str()));

        for field in referenced {
            if !allowed.contains(&field) {
                return Err(AppError::validation(format!(
                    "unknown {} field `{}`",
                    entity, field
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for RecordFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        for (field, value) in &self.equals {
            parts.push(format!("{}={}", field, value));
        }
        for (field, value) in &self.contains {
            parts.push(format!("{}~{}", field, value));
        }
        if let Some(sort) = &self.sort {
            parts.push(format!("sort={}:{}", sort.field, sort.direction.as_sql()));
        }
        if let Some(start) = self.start {
            parts.push(format!("start={}", start));
        }
        if let Some(limit) = self.limit {
            parts.push(format!("limit={}", limit));
        }
        write!(f, "[{}]", parts.join(", "))
    }
}

fn parse_sort(raw: &str) -> Result<Sort> {
    let (field, direction) = match raw.split_once(':') {
        Some((field, dir)) => {
            let direction = match dir.trim().to_ascii_lowercase().as_str() {
                "asc" => SortDirection::Asc,
                "desc" => SortDirection::Desc,
                other => {
                    return Err(AppError::validation(format!(
                        "invalid sort direction `{}`",
                        other
                    )))
                }
            };
            (field.trim(), direction)
        }
        None => (raw.trim(), SortDirection::Asc),
    };

    if field.is_empty() {
        return Err(AppError::validation("sort field is empty"));
    }

    Ok(Sort {
        field: field.to_string(),
        direction,
    })
}

fn parse_count(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| AppError::validation(format!("`{}` must be a non-negative integer", name)))
}
