//! GraphQL request shapes

use serde::Serialize;
use std::fmt;

/// Identifies one page of the media listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    number: u32,
    page_size: u32,
}

impl PageCursor {
    /// Creates a cursor, returning `None` unless `number >= 1` and `page_size > 0`
    pub fn new(number: u32, page_size: u32) -> Option<Self> {
        if number >= 1 && page_size > 0 {
            Some(Self { number, page_size })
        } else {
            None
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// The cursor for the following page, same size
    pub fn next(&self) -> Option<Self> {
        self.number.checked_add(1).map(|number| Self {
            number,
            page_size: self.page_size,
        })
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {} (per page {})", self.number, self.page_size)
    }
}

/// Query variables: either a single item by id or one page of the listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variables {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
}

impl Variables {
    pub fn item(id: i64) -> Self {
        Self {
            id: Some(id),
            page: None,
            per_page: None,
        }
    }

    pub fn page(cursor: PageCursor) -> Self {
        Self {
            id: None,
            page: Some(cursor.number()),
            per_page: Some(cursor.page_size()),
        }
    }
}

impl fmt::Display for Variables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.id, self.page) {
            (Some(id), _) => write!(f, "anime {}", id),
            (None, Some(page)) => write!(f, "page {}", page),
            (None, None) => write!(f, "default page"),
        }
    }
}

/// Body POSTed to the GraphQL endpoint
#[derive(Debug, Serialize)]
pub struct GraphQlRequest<'a> {
    pub query: &'a str,
    pub variables: &'a Variables,
}
