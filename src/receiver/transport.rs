//! transport.rs
//! Opens the byte stream to the producer.
//! - `Connector` is the seam between the retry loop and the socket, so tests can script streams
//! - `TcpConnector` builds the socket via socket2: nodelay, keepalive, bounded connect,
//!   read deadline so blocked reads wake up to observe shutdown

use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::debug;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::config::ReceiverConfig;

pub trait Connector: Send + 'static {
    type Stream: Read + Write + Send + 'static;

    fn connect(&mut self) -> io::Result<Self::Stream>;

    /// Human-readable target for log lines.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
    read_poll: Duration,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration, read_poll: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
            read_poll,
        }
    }

    pub fn from_config(config: &ReceiverConfig) -> Self {
        Self::new(
            config.host.clone(),
            config.port,
            config.connect_timeout(),
            config.read_poll(),
        )
    }

    fn connect_addr(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nodelay(true)?;
        socket.set_keepalive(true)?;
        socket.connect_timeout(&SockAddr::from(addr), self.connect_timeout)?;
        socket.set_read_timeout(Some(self.read_poll))?;
        socket.set_write_timeout(Some(self.connect_timeout))?;
        Ok(socket.into())
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&mut self) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in (self.host.as_str(), self.port).to_socket_addrs()? {
            match self.connect_addr(addr) {
                Ok(stream) => {
                    debug!("[Transport] connected to {}", addr);
                    return Ok(stream);
                }
                Err(e) => {
                    debug!("[Transport] {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{} resolved to no addresses", self.describe()),
            )
        }))
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
