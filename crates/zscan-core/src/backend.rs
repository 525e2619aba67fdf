//! Linux raw-socket send backend. One portable backend stands in for the
//! build-time choice between several OS-specific raw packet APIs — only the
//! Linux `IP_HDRINCL` path is implemented here.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{Error, Result};
use crate::send::PacketSink;

pub struct RawIpSocket {
    socket: Socket,
}

impl RawIpSocket {
    pub fn new() -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::from(libc::IPPROTO_RAW)))
            .map_err(Error::SocketInit)?;
        #[allow(deprecated)]
        socket.set_header_included(true).map_err(Error::SocketInit)?;
        Ok(Self { socket })
    }
}

impl PacketSink for RawIpSocket {
    fn send_to(&self, dst: Ipv4Addr, packet: &[u8]) -> std::io::Result<()> {
        let addr: SocketAddr = SocketAddrV4::new(dst, 0).into();
        self.socket.send_to(packet, &addr.into())?;
        Ok(())
    }
}

/// A sink that drops every packet, used for `--dryrun`.
pub struct NullSink;

impl PacketSink for NullSink {
    fn send_to(&self, _dst: Ipv4Addr, _packet: &[u8]) -> std::io::Result<()> {
        Ok(())
    }
}
