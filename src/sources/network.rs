use std::io::{ErrorKind, Read};
use std::net::{TcpStream, UdpSocket};
use std::thread;

use crate::error::ProducerError;
use crate::sources::RETRY_DELAY;
use crate::Pipeline::{RunContext, Source};

#[derive(Clone, Debug)]
pub struct NetworkSettings {
    /// Peer to connect to (TCP) or local address to bind (UDP). Empty means `0.0.0.0`.
    pub host: String,
    pub port: u16,
    pub udp: bool,
    pub read_chunk_size: usize,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            udp: false,
            read_chunk_size: 512,
        }
    }
}

enum Socket {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

/// TCP client or UDP listener feeding received bytes into the buffer.
pub struct NetworkSource {
    settings: NetworkSettings,
    label: String,
    socket: Option<Socket>,
}

impl NetworkSource {
    pub fn new(settings: NetworkSettings) -> Self {
        let label = format!("{}:{}", settings.host, settings.port);
        Self {
            settings,
            label,
            socket: None,
        }
    }

    fn open(&self) -> std::io::Result<Socket> {
        let host = if self.settings.host.is_empty() {
            "0.0.0.0"
        } else {
            self.settings.host.as_str()
        };
        let addr = (host, self.settings.port);

        if self.settings.udp {
            let socket = UdpSocket::bind(addr)?;
            socket.set_nonblocking(true)?;
            Ok(Socket::Udp(socket))
        } else {
            let stream = TcpStream::connect(addr)?;
            stream.set_nonblocking(true)?;
            Ok(Socket::Tcp(stream))
        }
    }
}

impl Source for NetworkSource {
    fn run(&mut self, ctx: &RunContext<'_>) -> Result<(), ProducerError> {
        let socket = self.open().map_err(|e| ProducerError::io(&self.label, e))?;
        let socket = self.socket.insert(socket);
        let mut chunk = vec![0u8; self.settings.read_chunk_size.max(1)];

        while ctx.is_running() {
            let received = match socket {
                Socket::Tcp(stream) => stream.read(&mut chunk),
                Socket::Udp(socket) => socket.recv(&mut chunk),
            };

            match received {
                // TCP peer closed the connection.
                Ok(0) if matches!(socket, Socket::Tcp(_)) => break,
                Ok(count) => {
                    if !ctx.push(&self.label, chunk[..count].to_vec())? {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(RETRY_DELAY),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(ProducerError::io(&self.label, e)),
            }
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        self.socket.take();
    }
}
