//! Backward pagination over the capped statement endpoint.

use crate::models::{Credential, Transaction};
use crate::services::provider::{BankProvider, ProviderError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Most items the provider returns for one statement call.
pub const PAGE_SIZE: usize = 500;

/// Assembles a complete statement for one account over an arbitrary window.
#[derive(Clone)]
pub struct StatementFetcher {
    provider: Arc<dyn BankProvider>,
    page_pause: Duration,
}

impl StatementFetcher {
    pub fn new(provider: Arc<dyn BankProvider>, page_pause: Duration) -> Self {
        Self {
            provider,
            page_pause,
        }
    }

    /// Fetches `[from, to]` page by page, walking the window end backwards.
    ///
    /// A full page means older items may remain. The next window ends at the
    /// oldest time seen, inclusive, so items sharing that second with the
    /// page cut are not lost; the overlap is removed by de-duplication. When
    /// a full page is made of a single second the window steps one second
    /// back, so `window_end` strictly decreases and the loop terminates.
    ///
    /// Provider errors are returned unchanged and never retried here.
    #[instrument(skip(self, credential), fields(credential = %credential.short_id()))]
    pub async fn fetch(
        &self,
        credential: &Credential,
        account_ref: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<Transaction>, ProviderError> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut window_end = to;
        let mut pages = 0usize;

        loop {
            if pages > 0 && !self.page_pause.is_zero() {
                tokio::time::sleep(self.page_pause).await;
            }

            let batch = self
                .provider
                .statement(credential, account_ref, from, window_end)
                .await?;
            pages += 1;

            let batch_len = batch.len();
            let min_time = batch.iter().map(|tx| tx.time).min();

            for tx in batch {
                if seen.insert(tx.dedup_key()) {
                    out.push(tx);
                }
            }

            debug!(page = pages, batch_len, window_end, total = out.len(), "Statement page fetched");

            if batch_len < PAGE_SIZE {
                break;
            }
            let Some(min_time) = min_time else { break };

            let next_end = if min_time < window_end {
                min_time
            } else {
                window_end - 1
            };
            if next_end < from {
                break;
            }
            window_end = next_end;
        }

        Ok(out)
    }
}
