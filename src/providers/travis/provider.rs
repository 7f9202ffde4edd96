use std::collections::VecDeque;

use futures::stream::{self, Stream};
use log::{debug, info};

use super::client::TravisClient;
use crate::error::Result;
use crate::models::BuildRecord;

/// Number of builds the API returns per page.
///
/// The endpoint has no page size parameter; the stream treats any page
/// shorter than this as the last one. If the API ever serves smaller pages
/// the stream would stop early, so this must track the server's page size.
pub const PAGE_SIZE: usize = 25;

pub struct TravisProvider {
    client: TravisClient,
    repo: String,
}

struct PageCursor {
    before: Option<u64>,
    pages_left: usize,
    pages_fetched: usize,
    buffered: VecDeque<BuildRecord>,
    last_page: bool,
}

impl TravisProvider {
    pub fn new(base_url: &str, repo: String) -> Result<Self> {
        let client = TravisClient::new(base_url)?;

        Ok(Self { client, repo })
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Lazily stream builds, newest first, starting below `before`.
    ///
    /// Pages are requested one at a time as the consumer drains the previous
    /// one. Each request uses the number of the last yielded build as its
    /// cursor. At most `page_limit` requests are made. An empty or short page
    /// ends the stream, and a failed request ends it with the error.
    pub fn builds(
        &self,
        before: Option<u64>,
        page_limit: usize,
    ) -> impl Stream<Item = Result<BuildRecord>> + '_ {
        info!(
            "Fetching up to {page_limit} pages of builds for {}...",
            self.repo
        );

        let cursor = PageCursor {
            before,
            pages_left: page_limit,
            pages_fetched: 0,
            buffered: VecDeque::with_capacity(PAGE_SIZE),
            last_page: false,
        };

        stream::try_unfold(cursor, move |cursor| self.next_build(cursor))
    }

    async fn next_build(
        &self,
        mut cursor: PageCursor,
    ) -> Result<Option<(BuildRecord, PageCursor)>> {
        loop {
            if let Some(build) = cursor.buffered.pop_front() {
                cursor.before = Some(build.number);
                return Ok(Some((build, cursor)));
            }

            if cursor.last_page || cursor.pages_left == 0 {
                info!("Fetched {} pages, stopping", cursor.pages_fetched);
                return Ok(None);
            }

            let page = self
                .client
                .fetch_builds_page(&self.repo, cursor.before)
                .await?;
            cursor.pages_left -= 1;
            cursor.pages_fetched += 1;

            debug!(
                "Page {} (before {:?}): {} builds",
                cursor.pages_fetched,
                cursor.before,
                page.len()
            );

            // relies on the fixed server page size, see PAGE_SIZE
            if page.len() < PAGE_SIZE {
                cursor.last_page = true;
            }
            cursor.buffered.extend(page);
        }
    }
}
