use {
    crate::util::hex_str,
    bytes::Bytes,
    futures::{future::BoxFuture, prelude::*},
    std::{io, net::SocketAddr},
    tokio::net::UdpSocket,
    tokio_util::{codec::BytesCodec, udp::UdpFramed},
    tracing::trace,
};

/// Datagram channel to a single master server.
pub trait Transport: Send {
    fn send(&mut self, data: Bytes) -> BoxFuture<'_, io::Result<()>>;
    /// Waits for the next datagram from the peer.
    fn recv(&mut self) -> BoxFuture<'_, io::Result<Bytes>>;
    /// Releases the underlying socket. Calling it again is a no-op.
    fn close(&mut self);
}

/// Opens one transport per filter batch.
pub trait Connector: Send + Sync {
    fn connect(&self, addr: SocketAddr) -> BoxFuture<'_, io::Result<Box<dyn Transport>>>;
}

fn to_v4(addr: SocketAddr) -> SocketAddr {
    use SocketAddr::*;

    if let V6(v) = addr {
        if let Some(v4_addr) = v.ip().to_ipv4() {
            return SocketAddr::from((v4_addr, v.port()));
        }
    }

    addr
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "transport is closed")
}

pub struct UdpTransport {
    framed: Option<UdpFramed<BytesCodec>>,
    peer: SocketAddr,
}

impl UdpTransport {
    pub async fn connect(peer: SocketAddr) -> io::Result<Self> {
        let bind_addr: SocketAddr = if peer.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;

        Ok(Self {
            framed: Some(UdpFramed::new(socket, BytesCodec::new())),
            peer: to_v4(peer),
        })
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, data: Bytes) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            let peer = self.peer;
            let framed = self.framed.as_mut().ok_or_else(not_connected)?;
            trace!("Sending data to {}: {}", peer, hex_str(&data));
            framed.send((data, peer)).await
        })
    }

    fn recv(&mut self) -> BoxFuture<'_, io::Result<Bytes>> {
        Box::pin(async move {
            let peer = self.peer;
            let framed = self.framed.as_mut().ok_or_else(not_connected)?;
            loop {
                let (buf, addr) = framed.next().await.ok_or_else(|| {
                    io::Error::new(io::ErrorKind::UnexpectedEof, "socket stream ended")
                })??;
                let addr = to_v4(addr);
                if addr != peer {
                    trace!("Ignoring {} bytes from unexpected peer {}", buf.len(), addr);
                    continue;
                }
                trace!("Received data from {}: {}", addr, hex_str(&buf));
                return Ok::<_, io::Error>(buf.freeze());
            }
        })
    }

    fn close(&mut self) {
        if self.framed.take().is_some() {
            trace!("Closed socket to {}", self.peer);
        }
    }
}

/// Connects over plain UDP.
#[derive(Clone, Copy, Debug, Default)]
pub struct UdpConnector;

impl Connector for UdpConnector {
    fn connect(&self, addr: SocketAddr) -> BoxFuture<'_, io::Result<Box<dyn Transport>>> {
        Box::pin(async move {
            UdpTransport::connect(addr)
                .await
                .map(|transport| Box::new(transport) as Box<dyn Transport>)
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn maps_v4_in_v6() {
        let addr: SocketAddr = "[::ffff:10.0.0.1]:27011".parse().unwrap();
        assert_eq!(to_v4(addr), "10.0.0.1:27011".parse::<SocketAddr>().unwrap());

        let addr: SocketAddr = "[2001:db8::1]:27011".parse().unwrap();
        assert_eq!(to_v4(addr), addr);
    }

    #[tokio::test]
    async fn udp_roundtrip() {
        let master = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let master_addr = master.local_addr().unwrap();

        let mut transport = UdpConnector.connect(master_addr).await.unwrap();
        transport.send(Bytes::from_static(b"\x31\xff")).await.unwrap();

        let mut buf = [0u8; 64];
        let (len, client) = master.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"\x31\xff");

        master.send_to(b"reply", client).await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(5), transport.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&reply[..], b"reply");

        transport.close();
        transport.close();
        let err = transport.recv().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
