//! Frontier traversal
//!
//! The frontier is pulled, never pushed: a page is fetched only when every item
//! of the previous page has been handed out. Pages are visited in increasing
//! order and the walk stops at the first page where either the explicit end
//! bound is reached or the API reports `hasNextPage: false`.
//!
//! A `lastPage` count seen on the first page is kept as a hint only. When it
//! disagrees with the per-page flag the flag wins, since it reflects live state.

use crate::api::{parse_media_page, Fetcher, Item, PageCursor, Variables};
use crate::CrawlError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;

/// A lazy, possibly unbounded sequence of items
#[async_trait]
pub trait ItemSource: Send {
    /// Returns the next item, `Ok(None)` once exhausted
    ///
    /// After an error the source is finished and keeps returning `Ok(None)`.
    async fn next_item(&mut self) -> Result<Option<Item>, CrawlError>;
}

/// Walks the paginated media listing
pub struct FrontierWalker {
    fetcher: Arc<Fetcher>,
    next: Option<PageCursor>,
    end: Option<u32>,
    buffer: VecDeque<Item>,
    last_page_hint: Option<u32>,
    pages_visited: Vec<u32>,
}

impl FrontierWalker {
    /// Creates a walker over pages `start..=end`, or from `start` to the last page
    pub fn new(fetcher: Arc<Fetcher>, start: PageCursor, end: Option<u32>) -> Self {
        Self {
            fetcher,
            next: Some(start),
            end,
            buffer: VecDeque::new(),
            last_page_hint: None,
            pages_visited: Vec::new(),
        }
    }

    /// Page numbers fetched so far, in fetch order
    pub fn pages_visited(&self) -> &[u32] {
        &self.pages_visited
    }

    pub fn last_page_hint(&self) -> Option<u32> {
        self.last_page_hint
    }

    /// Returns true once no further page will be requested
    pub fn is_finished(&self) -> bool {
        self.next.is_none() && self.buffer.is_empty()
    }

    async fn fetch_page(&mut self, cursor: PageCursor) -> Result<(), CrawlError> {
        tracing::info!("Crawling page {}", cursor.number());

        let data = self.fetcher.fetch_data(&Variables::page(cursor)).await?;
        let page = parse_media_page(data)?;
        let info = page.page_info.ok_or_else(|| {
            CrawlError::MalformedResponse(format!("page {} has no pageInfo", cursor.number()))
        })?;

        self.pages_visited.push(cursor.number());

        if self.pages_visited.len() == 1 && self.end.is_none() {
            if let Some(last) = info.last_page {
                tracing::info!("The API reports {} pages", last);
                self.last_page_hint = Some(last);
            }
        }

        tracing::info!(
            "Page {} returned {} items (has next page: {})",
            cursor.number(),
            page.items.len(),
            info.has_next_page
        );

        self.next = self.advance(cursor, info.has_next_page);
        self.buffer.extend(page.items);
        Ok(())
    }

    /// Picks the page after `cursor`, or `None` when the walk is over
    fn advance(&self, cursor: PageCursor, has_next_page: bool) -> Option<PageCursor> {
        let page = cursor.number();

        if !has_next_page {
            if let Some(hint) = self.last_page_hint {
                if page < hint {
                    tracing::warn!(
                        "Page {} reports no next page although {} pages were announced; stopping",
                        page,
                        hint
                    );
                }
            }
            tracing::info!("No pages after page {}", page);
            return None;
        }

        if self.end == Some(page) {
            tracing::info!("Reached end of requested range at page {}", page);
            return None;
        }

        if let Some(hint) = self.last_page_hint {
            if page >= hint {
                tracing::warn!(
                    "Page {} still reports a next page beyond the announced {}; continuing",
                    page,
                    hint
                );
            }
        }

        cursor.next()
    }
}

#[async_trait]
impl ItemSource for FrontierWalker {
    async fn next_item(&mut self) -> Result<Option<Item>, CrawlError> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }

            let cursor = match self.next.take() {
                Some(cursor) => cursor,
                None => return Ok(None),
            };

            // `next` stays empty on failure, so an aborted walk never resumes
            self.fetch_page(cursor).await?;
        }
    }
}

/// Source yielding exactly one item looked up by id
pub struct SingleItemSource {
    fetcher: Arc<Fetcher>,
    id: i64,
    done: bool,
}

impl SingleItemSource {
    pub fn new(fetcher: Arc<Fetcher>, id: i64) -> Self {
        Self {
            fetcher,
            id,
            done: false,
        }
    }
}

#[async_trait]
impl ItemSource for SingleItemSource {
    async fn next_item(&mut self) -> Result<Option<Item>, CrawlError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        tracing::info!("Crawling anime {}", self.id);
        let data = self.fetcher.fetch_data(&Variables::item(self.id)).await?;
        let page = parse_media_page(data)?;

        let item = page
            .items
            .into_iter()
            .next()
            .ok_or(CrawlError::ItemNotFound(self.id))?;

        if item.id() != self.id {
            return Err(CrawlError::MalformedResponse(format!(
                "asked for anime {} but received {}",
                self.id,
                item.id()
            )));
        }

        Ok(Some(item))
    }
}
