//! Valve master server query protocol.
//!
//! Source: https://developer.valvesoftware.com/wiki/Master_Server_Query_Protocol

use crate::{
    errors::{Error, Result},
    models::{Cursor, FilterToken, Region, ServerPage},
    util::PacketWriter,
};
use bytes::Bytes;
use nom::{
    bytes::complete::tag,
    combinator::map,
    number::complete::{be_u16, be_u32},
    sequence::tuple,
    IResult,
};
use num_traits::ToPrimitive;
use std::net::{Ipv4Addr, SocketAddrV4};

pub const REQUEST_MAGIC: u8 = 0x31;
pub const RESPONSE_HEADER: [u8; 6] = [0xFF, 0xFF, 0xFF, 0xFF, 0x66, 0x0A];
pub const RECORD_LEN: usize = 6;

/// Record terminating the whole listing, not just the packet it arrives in.
pub const SENTINEL: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);

/// Splits off the longest prefix of `filters` whose combined length stays below `max_len`.
///
/// A filter that alone reaches the budget is sent in a batch of its own, so
/// every call on a non-empty slice consumes at least one filter.
pub fn compute_next_batch(
    filters: &[FilterToken],
    max_len: usize,
) -> (&[FilterToken], &[FilterToken]) {
    let mut length = 0;
    let mut count = 0;
    for filter in filters {
        if length + filter.len() >= max_len {
            break;
        }
        length += filter.len();
        count += 1;
    }

    if count == 0 && !filters.is_empty() {
        count = 1;
    }

    filters.split_at(count)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ProtocolImpl {
    pub region: Region,
}

impl ProtocolImpl {
    pub fn new(region: Region) -> Self {
        Self { region }
    }

    /// Builds a listing request that resumes after `cursor`.
    pub fn make_request(&self, cursor: &Cursor, filters: &[FilterToken]) -> Bytes {
        let filters_len: usize = filters.iter().map(FilterToken::len).sum();
        let mut out = PacketWriter::with_capacity(32 + filters_len);

        out.put_u8(REQUEST_MAGIC);
        out.put_u8(self.region.to_u8().unwrap_or(0xFF));
        out.put_cstring(&cursor.to_string());

        if filters.is_empty() {
            out.put_u8(0).put_u8(0);
        } else {
            out.put_slice(format!("\\or\\{}", filters.len()).as_bytes());
            for filter in filters {
                out.put_slice(filter.as_bytes());
            }
            out.put_u8(0);
        }

        out.finish()
    }

    pub fn parse_response(&self, data: &[u8]) -> Result<ServerPage> {
        parse_response(data)
    }
}

fn header(input: &[u8]) -> IResult<&[u8], &[u8]> {
    tag(&RESPONSE_HEADER[..])(input)
}

fn record(input: &[u8]) -> IResult<&[u8], SocketAddrV4> {
    map(tuple((be_u32, be_u16)), |(ip, port)| {
        SocketAddrV4::new(Ipv4Addr::from(ip), port)
    })(input)
}

/// Decodes one response packet.
///
/// Decoding stops at the sentinel, which is reported through
/// [`ServerPage::last`] and left out of the page. Anything after it is ignored.
pub fn parse_response(data: &[u8]) -> Result<ServerPage> {
    let (mut input, _) = header(data).map_err(|_| Error::BadHeader)?;

    if input.len() < RECORD_LEN {
        return Err(Error::EmptyPage);
    }

    let mut page = ServerPage::default();
    while !input.is_empty() {
        let (rest, addr) = record(input).map_err(|_| Error::Truncated)?;
        input = rest;

        if addr == SENTINEL {
            page.last = true;
            break;
        }
        page.servers.push(addr);
    }

    Ok(page)
}

#[cfg(test)]
pub(crate) fn response_fixture(servers: &[SocketAddrV4], last: bool) -> Vec<u8> {
    let mut out = RESPONSE_HEADER.to_vec();
    for addr in servers.iter().chain(if last { Some(&SENTINEL) } else { None }) {
        out.extend_from_slice(&addr.ip().octets());
        out.extend_from_slice(&addr.port().to_be_bytes());
    }
    out
}
