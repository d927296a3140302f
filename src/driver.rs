//! Pagination of a single filter batch.

use crate::{
    errors::{Error, Result},
    models::{Cursor, FilterToken, MasterQueryConfig, ServerPage},
    protocols::a2m::ProtocolImpl,
    transport::Transport,
    util::hex_str,
};
use futures::future::{self, Future};
use std::io;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Continuation bookkeeping carried between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryState {
    pub cursor: Cursor,
    pub retries_left: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum State {
    Start,
    AwaitingResponse { cursor: Cursor },
    DeliverPage { cursor: Cursor, page: ServerPage },
    Continuing(QueryState),
    Done,
}

/// Adapts a plain callback to the awaitable form the driver expects.
pub fn immediate<F>(
    mut callback: F,
) -> impl FnMut(ServerPage) -> future::Ready<anyhow::Result<()>>
where
    F: FnMut(ServerPage) -> anyhow::Result<()>,
{
    move |page| future::ready(callback(page))
}

/// Owns the transport for the lifetime of one batch.
pub struct PaginationDriver<'a> {
    transport: Box<dyn Transport>,
    protocol: ProtocolImpl,
    filters: &'a [FilterToken],
    config: &'a MasterQueryConfig,
    cancel: CancellationToken,
    pages: usize,
    servers: usize,
}

impl<'a> PaginationDriver<'a> {
    pub fn new(
        transport: Box<dyn Transport>,
        filters: &'a [FilterToken],
        config: &'a MasterQueryConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            protocol: ProtocolImpl::new(config.region),
            filters,
            config,
            cancel,
            pages: 0,
            servers: 0,
        }
    }

    /// Pages delivered so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Servers delivered so far.
    pub fn servers(&self) -> usize {
        self.servers
    }

    /// Runs the batch to completion and closes the transport whatever the outcome.
    pub async fn run<F, Fut>(mut self, callback: &mut F) -> Result<(usize, usize)>
    where
        F: FnMut(ServerPage) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let mut state = State::Start;
        let res = loop {
            state = match self.step(state, callback).await {
                Ok(State::Done) => break Ok((self.pages, self.servers)),
                Ok(next) => next,
                Err(e) => break Err(e),
            };
        };
        self.transport.close();
        res
    }

    /// Advances the state machine by one transition.
    pub async fn step<F, Fut>(&mut self, state: State, callback: &mut F) -> Result<State>
    where
        F: FnMut(ServerPage) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        Ok(match state {
            State::Start => {
                let cursor = Cursor::NULL;
                self.send(cursor).await?;
                State::AwaitingResponse { cursor }
            }
            // No retries on the first exchange: a master that does not answer it is most likely unreachable.
            State::AwaitingResponse { cursor } => State::DeliverPage {
                cursor,
                page: self.receive().await?,
            },
            State::DeliverPage { cursor, page } => {
                let next = page.servers.last().copied().map(Cursor::from).unwrap_or(cursor);
                let last = page.is_last();

                debug!(
                    "Received page of {} servers after {} (last: {})",
                    page.len(),
                    cursor,
                    last
                );
                let len = page.len();
                callback(page).await.map_err(Error::Callback)?;
                self.pages += 1;
                self.servers += len;

                if last {
                    State::Done
                } else {
                    State::Continuing(QueryState {
                        cursor: next,
                        retries_left: self.config.max_retries,
                    })
                }
            }
            State::Continuing(QueryState {
                cursor,
                retries_left,
            }) => {
                self.pause().await?;
                match self.exchange(cursor).await {
                    Ok(page) => State::DeliverPage { cursor, page },
                    Err(e) if e.is_retriable() && retries_left > 0 => {
                        warn!(
                            "Continuation after {} failed, {} retries left: {}",
                            cursor, retries_left, e
                        );
                        State::Continuing(QueryState {
                            cursor,
                            retries_left: retries_left - 1,
                        })
                    }
                    Err(e) => return Err(e),
                }
            }
            State::Done => State::Done,
        })
    }

    async fn exchange(&mut self, cursor: Cursor) -> Result<ServerPage> {
        self.send(cursor).await?;
        self.receive().await
    }

    async fn send(&mut self, cursor: Cursor) -> Result<()> {
        let data = self.protocol.make_request(&cursor, self.filters);
        trace!("Requesting servers after {}: {}", cursor, hex_str(&data));
        self.transport.send(data).await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<ServerPage> {
        let timeout = self.config.timeout;
        let data = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            res = tokio::time::timeout(timeout, self.transport.recv()) => match res {
                Ok(data) => data?,
                Err(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no response from master within {:?}", timeout),
                    )
                    .into())
                }
            },
        };
        trace!("Received response: {}", hex_str(&data));

        self.protocol.parse_response(&data)
    }

    async fn pause(&mut self) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(self.config.retry_delay) => Ok(()),
        }
    }
}
