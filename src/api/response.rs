//! Response payload handling
//!
//! Media records are kept as opaque JSON. The only field the crawler relies on
//! is the integer `id`, which routes the record to its sinks.

use crate::CrawlError;
use serde::Deserialize;
use serde_json::Value;

/// One media record as returned by the API
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    id: i64,
    payload: Value,
}

impl Item {
    /// Validates that `payload` is an object with an integer `id`
    pub fn from_value(payload: Value) -> Result<Self, CrawlError> {
        let id = payload
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                CrawlError::MalformedResponse("media record without an integer id".to_string())
            })?;
        Ok(Self { id, payload })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Display title for progress logs: native, then romaji
    pub fn title(&self) -> Option<&str> {
        let title = self.payload.get("title")?;
        title
            .get("native")
            .and_then(Value::as_str)
            .or_else(|| title.get("romaji").and_then(Value::as_str))
    }
}

/// Pagination metadata of one page
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub last_page: Option<u32>,
    #[serde(default)]
    pub current_page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
    #[serde(default)]
    pub total: Option<u64>,
}

/// One page of media records
#[derive(Debug, Clone)]
pub struct MediaPage {
    pub page_info: Option<PageInfo>,
    pub items: Vec<Item>,
}

/// Extracts `Page.pageInfo` and `Page.media` from a `data` payload
pub fn parse_media_page(data: Value) -> Result<MediaPage, CrawlError> {
    let mut page = match data {
        Value::Object(mut map) => map.remove("Page").ok_or_else(|| {
            CrawlError::MalformedResponse("response data has no Page field".to_string())
        })?,
        _ => {
            return Err(CrawlError::MalformedResponse(
                "response data is not an object".to_string(),
            ))
        }
    };

    let page_info = match page.get_mut("pageInfo").map(Value::take) {
        Some(Value::Null) | None => None,
        Some(info) => Some(serde_json::from_value::<PageInfo>(info)?),
    };

    let items = match page.get_mut("media").map(Value::take) {
        Some(Value::Array(media)) => media
            .into_iter()
            .map(Item::from_value)
            .collect::<Result<Vec<_>, _>>()?,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return Err(CrawlError::MalformedResponse(
                "Page.media is not an array".to_string(),
            ))
        }
    };

    Ok(MediaPage { page_info, items })
}
