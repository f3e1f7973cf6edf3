use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Field name to value mapping used for posted data, validated data and
/// stored rows alike.
pub type FieldMap = BTreeMap<String, serde_json::Value>;

const KEY_SEPARATOR: char = ',';

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(pub String);

impl RecordKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Builds a key from a route parameter. Blank input means "no key".
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            None
        } else {
            Some(Self(raw.to_string()))
        }
    }

    /// Joins the values of a composite key in key-field order.
    pub fn composite<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = parts
            .into_iter()
            .map(|part| part.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(&KEY_SEPARATOR.to_string());
        Self(joined)
    }

    /// Reads the key out of a field map. Returns `None` when any key field is
    /// missing, null or blank.
    pub fn from_fields(key_fields: &[&str], fields: &FieldMap) -> Option<Self> {
        let mut parts = Vec::with_capacity(key_fields.len());
        for name in key_fields {
            let part = match fields.get(*name)? {
                serde_json::Value::Null => return None,
                serde_json::Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            };
            if part.is_empty() {
                return None;
            }
            parts.push(part);
        }
        if parts.is_empty() {
            return None;
        }
        Some(Self::composite(parts))
    }

    pub fn parts(&self) -> Vec<&str> {
        self.0.split(KEY_SEPARATOR).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PageRequestError {
    #[error("page number must be at least 1")]
    PageOutOfRange,
    #[error("page size must be greater than zero")]
    EmptyPageSize,
}

/// Current page number plus page size. Both are validated on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    page: u32,
    size: u32,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Result<Self, PageRequestError> {
        if page < 1 {
            return Err(PageRequestError::PageOutOfRange);
        }
        if size == 0 {
            return Err(PageRequestError::EmptyPageSize);
        }
        Ok(Self { page, size })
    }

    pub fn first(size: u32) -> Result<Self, PageRequestError> {
        Self::new(1, size)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.size)
    }

    /// Clamps the page number into `1..=page_count` for a result set of
    /// `total_items` rows.
    pub fn normalized(self, total_items: u64) -> Self {
        let last = page_count(total_items, self.size).max(1);
        Self {
            page: self.page.min(last),
            size: self.size,
        }
    }
}

fn page_count(total_items: u64, size: u32) -> u32 {
    let size = u64::from(size.max(1));
    let pages = total_items.div_ceil(size);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// One page of a paginated result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_items: u64,
    pub current_page: u32,
    pub items_per_page: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_items: u64, request: PageRequest) -> Self {
        Self {
            items,
            total_items,
            current_page: request.page(),
            items_per_page: request.size(),
        }
    }

    /// Slices an already materialised result set.
    pub fn from_all(all: Vec<T>, request: PageRequest) -> Self {
        let total_items = all.len() as u64;
        let request = request.normalized(total_items);
        let start = usize::try_from(request.offset()).unwrap_or(usize::MAX);
        let items = all
            .into_iter()
            .skip(start)
            .take(request.size() as usize)
            .collect();
        Self::new(items, total_items, request)
    }

    pub fn page_count(&self) -> u32 {
        page_count(self.total_items, self.items_per_page)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Index,
    Edit,
    Save,
    Delete,
    Page,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Index => "index",
            Action::Edit => "edit",
            Action::Save => "save",
            Action::Delete => "delete",
            Action::Page => "page",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown action '{0}'")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "index" => Ok(Action::Index),
            "edit" => Ok(Action::Edit),
            "save" => Ok(Action::Save),
            "delete" => Ok(Action::Delete),
            "page" => Ok(Action::Page),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}
