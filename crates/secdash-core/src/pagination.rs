use async_trait::async_trait;
use tracing::debug;

use crate::error::FetchError;

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: Option<u64>,
}

#[async_trait]
pub trait PageSource: Send {
    type Item: Send;

    async fn fetch_page(&mut self, offset: u64, limit: u64) -> Result<Page<Self::Item>, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPolicy {
    /// A page with fewer than `page_size` items is the last one.
    ShortPage,
    /// Stop once `offset` reaches the server-reported `total`.
    ReachedTotal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    /// `total` from the last page that reported one.
    pub reported_total: Option<u64>,
    pub pages: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    page_size: u64,
    stop: StopPolicy,
}

impl Paginator {
    pub fn new(page_size: u64, stop: StopPolicy) -> Self {
        Self {
            page_size: page_size.max(1),
            stop,
        }
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub async fn collect<S: PageSource>(&self, source: &mut S) -> Result<Paginated<S::Item>, FetchError> {
        let mut items = Vec::new();
        let mut reported_total = None;
        let mut pages = 0_usize;
        let mut offset = 0_u64;

        loop {
            let page = source.fetch_page(offset, self.page_size).await?;
            pages += 1;
            if page.total.is_some() {
                reported_total = page.total;
            }

            let received = page.items.len() as u64;
            if received == 0 {
                break;
            }
            items.extend(page.items);
            offset += self.page_size;

            let done = match (self.stop, page.total) {
                (StopPolicy::ReachedTotal, Some(total)) => offset >= total,
                // no total on the wire: the short page is the only signal left
                (StopPolicy::ReachedTotal, None) | (StopPolicy::ShortPage, _) => received < self.page_size,
            };
            if done {
                break;
            }
        }

        debug!(pages, items = items.len(), ?reported_total, "pagination finished");
        Ok(Paginated {
            items,
            reported_total,
            pages,
        })
    }
}
