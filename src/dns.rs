use crate::{
    errors::{Error, Result},
    models::{Host, StringAddr},
};
use std::net::{IpAddr, SocketAddr};
use tracing::debug;
use trust_dns_resolver::{
    config::{ResolverConfig, ResolverOpts},
    TokioAsyncResolver,
};

fn make_resolver() -> Result<TokioAsyncResolver> {
    let map_err = |e: trust_dns_resolver::error::ResolveError| Error::Dns {
        host: "<resolver>".into(),
        reason: e.to_string(),
    };

    TokioAsyncResolver::tokio_from_system_conf().or_else(|e| {
        debug!("Falling back to default resolver config: {}", e);
        TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
            .map_err(map_err)
    })
}

/// Picks the address to talk to. Master records are IPv4 only, so IPv4 wins.
fn pick(addrs: impl IntoIterator<Item = IpAddr>) -> Option<IpAddr> {
    let mut fallback = None;
    for addr in addrs {
        if addr.is_ipv4() {
            return Some(addr);
        }
        fallback.get_or_insert(addr);
    }
    fallback
}

pub async fn resolve_host(host: &Host) -> Result<SocketAddr> {
    match host {
        Host::A(addr) => Ok(*addr),
        Host::S(StringAddr { host, port }) => {
            let lookup = make_resolver()?
                .lookup_ip(host.as_str())
                .await
                .map_err(|e| Error::Dns {
                    host: host.clone(),
                    reason: e.to_string(),
                })?;

            let addr = pick(lookup.iter())
                .map(|ip| SocketAddr::new(ip, *port))
                .ok_or_else(|| Error::Dns {
                    host: host.clone(),
                    reason: "no addresses found".into(),
                })?;
            debug!("Resolved {} to {}", host, addr);

            Ok(addr)
        }
    }
}
