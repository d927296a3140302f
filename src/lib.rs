//!
//! Asynchronous Valve master server querying.
//!
//! The `rgs_master` crate retrieves the complete list of game servers matching a set of
//! filters from a Valve master server, hiding the batching of filters and the pagination
//! of results behind a single call.

pub mod dns;
pub mod driver;
pub mod errors;
pub mod models;
pub use models::*;
pub mod protocols;
pub mod transport;
pub mod util;

use {
    crate::{
        driver::{immediate, PaginationDriver},
        errors::{Error, Result},
        protocols::a2m::compute_next_batch,
        transport::{Connector, UdpConnector},
    },
    anyhow::anyhow,
    futures::Future,
    std::sync::Arc,
    tokio::sync::mpsc,
    tokio_stream::wrappers::ReceiverStream,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info},
};

/// How many unread pages a stream from [`MasterServerQuerier::into_stream`] holds before the query waits.
pub const STREAM_BUFFER: usize = 4;

/// Totals of a finished query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QuerySummary {
    pub batches: usize,
    pub pages: usize,
    pub servers: usize,
}

/// Queries one master server for every server matching the accumulated filters.
///
/// Filters are OR'd together. They are split into batches that fit a single
/// request, and every batch is paginated to its end before the next one starts.
#[derive(Clone, Debug)]
pub struct MasterServerQuerier {
    host: Host,
    filters: Vec<FilterToken>,
    config: MasterQueryConfig,
    cancel: CancellationToken,
}

impl MasterServerQuerier {
    pub fn new(host: impl Into<Host>) -> Self {
        Self {
            host: host.into(),
            filters: Vec::new(),
            config: MasterQueryConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: MasterQueryConfig) -> Self {
        self.config = config;
        self
    }

    /// Cancelling `token` interrupts the query at its next wait.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn config(&self) -> &MasterQueryConfig {
        &self.config
    }

    pub fn filters(&self) -> &[FilterToken] {
        &self.filters
    }

    /// Adds one `\appid\<id>` filter per id.
    pub fn filter_app_ids(&mut self, app_ids: impl IntoIterator<Item = u32>) -> &mut Self {
        self.filters
            .extend(app_ids.into_iter().map(FilterToken::app_id));
        self
    }

    pub fn add_filter(&mut self, filter: FilterToken) -> &mut Self {
        self.filters.push(filter);
        self
    }

    pub fn add_filters(&mut self, filters: impl IntoIterator<Item = FilterToken>) -> &mut Self {
        self.filters.extend(filters);
        self
    }

    /// Runs the query, handing every received page to `callback`.
    ///
    /// The first error aborts the whole query. Pages delivered before it stay delivered.
    pub async fn query<C, F>(&self, connector: &C, callback: F) -> Result<QuerySummary>
    where
        C: Connector + ?Sized,
        F: FnMut(ServerPage) -> anyhow::Result<()>,
    {
        self.query_async(connector, immediate(callback)).await
    }

    /// Same as [`query`](Self::query), but the callback may wait before accepting the next page.
    pub async fn query_async<C, F, Fut>(
        &self,
        connector: &C,
        mut callback: F,
    ) -> Result<QuerySummary>
    where
        C: Connector + ?Sized,
        F: FnMut(ServerPage) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let addr = dns::resolve_host(&self.host).await?;
        info!(
            "Querying master {} ({}) with {} filters",
            self.host,
            addr,
            self.filters.len()
        );

        let mut summary = QuerySummary::default();
        let mut remaining = &self.filters[..];
        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let (batch, rest) = compute_next_batch(remaining, self.config.max_filter_length);
            remaining = rest;

            debug!(
                "Starting batch {} with {} filters, {} left",
                summary.batches + 1,
                batch.len(),
                remaining.len()
            );
            let transport = connector.connect(addr).await?;
            let (pages, servers) =
                PaginationDriver::new(transport, batch, &self.config, self.cancel.clone())
                    .run(&mut callback)
                    .await?;

            summary.batches += 1;
            summary.pages += pages;
            summary.servers += servers;

            if remaining.is_empty() {
                break;
            }
        }

        info!(
            "Master query finished: {} servers in {} pages over {} batches",
            summary.servers, summary.pages, summary.batches
        );
        Ok(summary)
    }

    /// Runs the query over UDP.
    pub async fn query_udp<F>(&self, callback: F) -> Result<QuerySummary>
    where
        F: FnMut(ServerPage) -> anyhow::Result<()>,
    {
        self.query(&UdpConnector, callback).await
    }

    /// Spawns the query and yields its pages as a stream, ending with the error if there is one.
    ///
    /// At most [`STREAM_BUFFER`] pages wait unread; past that the query holds
    /// off on its next request. Dropping the stream aborts the query at its next page.
    pub fn into_stream(self, connector: Arc<dyn Connector>) -> ReceiverStream<Result<ServerPage>> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            let res = self
                .query_async(&*connector, |page| {
                    let tx = tx.clone();
                    async move {
                        tx.send(Ok(page))
                            .await
                            .map_err(|_| anyhow!("page stream receiver dropped"))
                    }
                })
                .await;

            match res {
                Ok(summary) => debug!("Streamed query finished: {:?}", summary),
                Err(Error::Callback(e)) => debug!("Streamed query stopped: {}", e),
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        ReceiverStream::new(rx)
    }
}
