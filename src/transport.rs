//! Byte transports: serial port, TCP/UDP socket and replay file.
use std::{
    collections::HashMap,
    fs::File,
    io::{self, ErrorKind, Read, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket},
    path::PathBuf,
    str::FromStr,
    thread,
    time::Duration,
};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serialport::SerialPort;

use crate::{ConnectionError, TransportError};

/// Pause between file reads
pub const DEFAULT_FILE_DELAY: Duration = Duration::from_millis(20);
/// Read timeout for serial ports and sockets
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// A connected byte stream owned by the read loop.
pub trait Transport: Send {
    /// Read up to `max` bytes. Returns an empty buffer if nothing arrived
    /// within the transport's timeout.
    fn read(&mut self, max: usize) -> Result<Vec<u8>, TransportError>;
    /// Write a complete command.
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;
    /// Release the underlying resource. Safe to call more than once.
    fn close(&mut self);
    /// Human readable endpoint
    fn describe(&self) -> String;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
/// Serial parity
pub enum Parity {
    #[default]
    /// No parity bit
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
/// Serial flow control
pub enum FlowControl {
    #[default]
    /// No flow control
    None,
    /// XON/XOFF
    Software,
    /// RTS/CTS
    Hardware,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Serial port settings
pub struct SerialConfig {
    /// Device path or name
    pub port: String,
    /// Baud rate
    pub baud: u32,
    /// 5 - 8
    pub data_bits: u8,
    /// 1 or 2
    pub stop_bits: u8,
    /// Parity
    pub parity: Parity,
    /// Flow control
    pub flow_control: FlowControl,
    /// Read timeout
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            flow_control: FlowControl::None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
/// Socket transport protocol
pub enum SocketProtocol {
    #[default]
    /// Stream connection to a server
    Tcp,
    /// Datagrams received on a bound port
    Udp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Socket settings
pub struct SocketConfig {
    /// Host name or address. For UDP this is the local bind address.
    pub host: String,
    /// Port
    pub port: u16,
    /// TCP or UDP
    pub protocol: SocketProtocol,
    /// Resolve to IPv6 instead of IPv4
    pub ipv6: bool,
    /// Wrap the connection in TLS
    pub tls: bool,
    /// Connect and read timeout
    pub timeout: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 50010,
            protocol: SocketProtocol::Tcp,
            ipv6: false,
            tls: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Replay file settings
pub struct FileConfig {
    /// File to replay
    pub path: PathBuf,
    /// Pause before each read
    pub delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Where to read the stream from
pub enum TransportConfig {
    /// Serial port
    Serial(SerialConfig),
    /// TCP or UDP socket
    Socket(SocketConfig),
    /// Recorded stream
    File(FileConfig),
}

fn setting<T: FromStr>(
    settings: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConnectionError> {
    match settings.get(key).map(|s| s.trim()) {
        None | Some("") => Ok(default),
        Some(val) => val
            .parse()
            .map_err(|_| ConnectionError::InvalidConfig(format!("{key}={val}"))),
    }
}

fn seconds(
    settings: &HashMap<String, String>,
    key: &str,
    default: Duration,
) -> Result<Duration, ConnectionError> {
    let secs: f64 = setting(settings, key, default.as_secs_f64())?;
    Duration::try_from_secs_f64(secs)
        .map_err(|_| ConnectionError::InvalidConfig(format!("{key}={secs}")))
}

fn flag(settings: &HashMap<String, String>, key: &str) -> Result<bool, ConnectionError> {
    match settings.get(key).map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(val) => Err(ConnectionError::InvalidConfig(format!("{key}={val}"))),
    }
}

impl TransportConfig {
    /// Build a configuration from the flat key/value settings kept by the
    /// configuration layer. Missing keys take their defaults; `kind`
    /// selects `serial`, `socket` or `file`.
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self, ConnectionError> {
        let kind = settings
            .get("kind")
            .map(|s| s.trim().to_ascii_lowercase())
            .unwrap_or_else(|| "serial".into());
        match kind.as_str() {
            "serial" => {
                let defaults = SerialConfig::default();
                let port = settings
                    .get("port")
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| ConnectionError::InvalidConfig("port missing".into()))?;
                let data_bits = setting(settings, "bytesize", defaults.data_bits)?;
                if !(5..=8).contains(&data_bits) {
                    return Err(ConnectionError::InvalidConfig(format!("bytesize={data_bits}")));
                }
                let stop_bits = setting(settings, "stopbits", defaults.stop_bits)?;
                if !(1..=2).contains(&stop_bits) {
                    return Err(ConnectionError::InvalidConfig(format!("stopbits={stop_bits}")));
                }
                let parity = match settings.get("parity").map(|s| s.trim().to_ascii_uppercase()) {
                    None => Parity::None,
                    Some(p) => match p.as_str() {
                        "" | "N" | "NONE" => Parity::None,
                        "O" | "ODD" => Parity::Odd,
                        "E" | "EVEN" => Parity::Even,
                        _ => return Err(ConnectionError::InvalidConfig(format!("parity={p}"))),
                    },
                };
                let flow_control =
                    match settings.get("flowcontrol").map(|s| s.trim().to_ascii_lowercase()) {
                        None => FlowControl::None,
                        Some(f) => match f.as_str() {
                            "" | "none" | "0" => FlowControl::None,
                            "software" | "xonxoff" => FlowControl::Software,
                            "hardware" | "rtscts" => FlowControl::Hardware,
                            _ => {
                                return Err(ConnectionError::InvalidConfig(format!(
                                    "flowcontrol={f}"
                                )))
                            }
                        },
                    };
                Ok(TransportConfig::Serial(SerialConfig {
                    port,
                    baud: setting(settings, "baud", defaults.baud)?,
                    data_bits,
                    stop_bits,
                    parity,
                    flow_control,
                    timeout: seconds(settings, "timeout", defaults.timeout)?,
                }))
            }
            "socket" => {
                let defaults = SocketConfig::default();
                let protocol = match settings
                    .get("protocol")
                    .map(|s| s.trim().to_ascii_uppercase())
                    .as_deref()
                {
                    None | Some("") | Some("TCP") => SocketProtocol::Tcp,
                    Some("UDP") => SocketProtocol::Udp,
                    Some(p) => {
                        return Err(ConnectionError::InvalidConfig(format!("protocol={p}")))
                    }
                };
                Ok(TransportConfig::Socket(SocketConfig {
                    host: setting(settings, "host", defaults.host)?,
                    port: setting(settings, "socket_port", defaults.port)?,
                    protocol,
                    ipv6: flag(settings, "ipv6")?,
                    tls: flag(settings, "tls")?,
                    timeout: seconds(settings, "timeout", defaults.timeout)?,
                }))
            }
            "file" => {
                let path = settings
                    .get("path")
                    .filter(|s| !s.trim().is_empty())
                    .map(PathBuf::from)
                    .ok_or_else(|| ConnectionError::InvalidConfig("path missing".into()))?;
                Ok(TransportConfig::File(FileConfig {
                    path,
                    delay: seconds(settings, "delay", DEFAULT_FILE_DELAY)?,
                }))
            }
            other => Err(ConnectionError::InvalidConfig(format!("kind={other}"))),
        }
    }

    /// True for replay files, which end instead of dropping out.
    pub fn is_file(&self) -> bool {
        matches!(self, TransportConfig::File(_))
    }

    /// Open the transport described by this configuration.
    pub fn connect(&self) -> Result<Box<dyn Transport>, ConnectionError> {
        Ok(match self {
            TransportConfig::Serial(cfg) => Box::new(SerialTransport::open(cfg)?),
            TransportConfig::Socket(cfg) => match cfg.protocol {
                SocketProtocol::Tcp => Box::new(TcpTransport::connect(cfg)?),
                SocketProtocol::Udp => Box::new(UdpTransport::bind(cfg)?),
            },
            TransportConfig::File(cfg) => Box::new(FileTransport::open(cfg)?),
        })
    }
}

/// Open the transport described by `config`.
pub fn connect(config: &TransportConfig) -> Result<Box<dyn Transport>, ConnectionError> {
    config.connect()
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock)
}

/// Serial port transport
pub struct SerialTransport {
    name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Open and configure the port.
    pub fn open(cfg: &SerialConfig) -> Result<Self, ConnectionError> {
        let port = serialport::new(&cfg.port, cfg.baud)
            .data_bits(match cfg.data_bits {
                5 => serialport::DataBits::Five,
                6 => serialport::DataBits::Six,
                7 => serialport::DataBits::Seven,
                8 => serialport::DataBits::Eight,
                n => return Err(ConnectionError::InvalidConfig(format!("data bits {n}"))),
            })
            .stop_bits(match cfg.stop_bits {
                1 => serialport::StopBits::One,
                2 => serialport::StopBits::Two,
                n => return Err(ConnectionError::InvalidConfig(format!("stop bits {n}"))),
            })
            .parity(match cfg.parity {
                Parity::None => serialport::Parity::None,
                Parity::Odd => serialport::Parity::Odd,
                Parity::Even => serialport::Parity::Even,
            })
            .flow_control(match cfg.flow_control {
                FlowControl::None => serialport::FlowControl::None,
                FlowControl::Software => serialport::FlowControl::Software,
                FlowControl::Hardware => serialport::FlowControl::Hardware,
            })
            .timeout(cfg.timeout)
            .open()?;
        info!("Opened {} at {} baud", cfg.port, cfg.baud);
        Ok(Self {
            name: cfg.port.clone(),
            port: Some(port),
        })
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, max: usize) -> Result<Vec<u8>, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;
        let mut buf = vec![0u8; max];
        match port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if is_timeout(&e) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;
        port.write_all(data)?;
        port.flush()?;
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Closed {}", self.name);
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

fn resolve(cfg: &SocketConfig) -> Result<SocketAddr, ConnectionError> {
    (cfg.host.as_str(), cfg.port)
        .to_socket_addrs()?
        .find(|addr| addr.is_ipv6() == cfg.ipv6)
        .ok_or_else(|| {
            ConnectionError::InvalidConfig(format!(
                "{}:{} has no {} address",
                cfg.host,
                cfg.port,
                if cfg.ipv6 { "IPv6" } else { "IPv4" }
            ))
        })
}

/// TCP client transport
pub struct TcpTransport {
    peer: SocketAddr,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Connect to the configured server.
    pub fn connect(cfg: &SocketConfig) -> Result<Self, ConnectionError> {
        if cfg.tls {
            return Err(ConnectionError::Unsupported("TLS"));
        }
        let peer = resolve(cfg)?;
        let stream = TcpStream::connect_timeout(&peer, cfg.timeout.max(DEFAULT_TIMEOUT))?;
        stream.set_read_timeout(Some(cfg.timeout.max(Duration::from_millis(1))))?;
        stream.set_nodelay(true)?;
        info!("Connected to {peer}");
        Ok(Self {
            peer,
            stream: Some(stream),
        })
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, max: usize) -> Result<Vec<u8>, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        let mut buf = vec![0u8; max];
        match stream.read(&mut buf) {
            Ok(0) => Err(io::Error::new(
                ErrorKind::ConnectionAborted,
                format!("{} closed the connection", self.peer),
            )
            .into()),
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if is_timeout(&e) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        stream.write_all(data)?;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            debug!("Closed connection to {}", self.peer);
        }
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.peer)
    }
}

/// UDP transport: receives datagrams on a bound port and answers the
/// last sender.
pub struct UdpTransport {
    local: SocketAddr,
    socket: Option<UdpSocket>,
    peer: Option<SocketAddr>,
}

impl UdpTransport {
    /// Bind to the configured address.
    pub fn bind(cfg: &SocketConfig) -> Result<Self, ConnectionError> {
        if cfg.tls {
            return Err(ConnectionError::Unsupported("TLS"));
        }
        let socket = UdpSocket::bind(resolve(cfg)?)?;
        socket.set_read_timeout(Some(cfg.timeout.max(Duration::from_millis(1))))?;
        let local = socket.local_addr()?;
        info!("Listening for datagrams on {local}");
        Ok(Self {
            local,
            socket: Some(socket),
            peer: None,
        })
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

impl Transport for UdpTransport {
    fn read(&mut self, max: usize) -> Result<Vec<u8>, TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::Closed)?;
        let mut buf = vec![0u8; max.max(1)];
        match socket.recv_from(&mut buf) {
            Ok((n, peer)) => {
                self.peer = Some(peer);
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if is_timeout(&e) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::Closed)?;
        let peer = self.peer.ok_or(TransportError::NoPeer)?;
        socket.send_to(data, peer)?;
        Ok(())
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("Closed datagram socket {}", self.local);
        }
    }

    fn describe(&self) -> String {
        format!("udp://{}", self.local)
    }
}

/// Replays a recorded stream
pub struct FileTransport {
    path: PathBuf,
    file: Option<File>,
    delay: Duration,
}

impl FileTransport {
    /// Open the file for replay.
    pub fn open(cfg: &FileConfig) -> Result<Self, ConnectionError> {
        let file = File::open(&cfg.path)?;
        info!("Replaying {}", cfg.path.display());
        Ok(Self {
            path: cfg.path.clone(),
            file: Some(file),
            delay: cfg.delay,
        })
    }
}

impl Transport for FileTransport {
    fn read(&mut self, max: usize) -> Result<Vec<u8>, TransportError> {
        let file = self.file.as_mut().ok_or(TransportError::Closed)?;
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let mut buf = vec![0u8; max];
        match file.read(&mut buf)? {
            0 if max > 0 => Err(TransportError::EndOfStream),
            n => {
                buf.truncate(n);
                Ok(buf)
            }
        }
    }

    /// Commands have nowhere to go during replay and are discarded.
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.file.is_none() {
            return Err(TransportError::Closed);
        }
        debug!("Replay ignores {} byte command", data.len());
        Ok(())
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            debug!("Closed {}", self.path.display());
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::TcpListener;

    fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn serial_settings() {
        let cfg = TransportConfig::from_settings(&settings(&[
            ("kind", "serial"),
            ("port", "/dev/ttyACM0"),
            ("baud", "38400"),
            ("parity", "E"),
            ("stopbits", "2"),
            ("flowcontrol", "rtscts"),
            ("timeout", "0.5"),
        ]))
        .unwrap();
        assert_eq!(
            cfg,
            TransportConfig::Serial(SerialConfig {
                port: "/dev/ttyACM0".into(),
                baud: 38400,
                data_bits: 8,
                stop_bits: 2,
                parity: Parity::Even,
                flow_control: FlowControl::Hardware,
                timeout: Duration::from_millis(500),
            })
        );
    }

    #[test]
    fn invalid_settings() {
        for pairs in [
            &[("kind", "serial"), ("port", "COM3"), ("baud", "fast")][..],
            &[("kind", "serial"), ("port", "COM3"), ("bytesize", "9")][..],
            &[("kind", "serial"), ("port", "COM3"), ("timeout", "-1")][..],
            &[("kind", "serial")][..],
            &[("kind", "socket"), ("protocol", "SCTP")][..],
            &[("kind", "socket"), ("ipv6", "maybe")][..],
            &[("kind", "file")][..],
            &[("kind", "carrier pigeon")][..],
        ] {
            assert!(
                matches!(
                    TransportConfig::from_settings(&settings(pairs)),
                    Err(ConnectionError::InvalidConfig(_))
                ),
                "{pairs:?}"
            );
        }
    }

    #[test]
    fn socket_settings() {
        let cfg = TransportConfig::from_settings(&settings(&[
            ("kind", "socket"),
            ("host", "::1"),
            ("socket_port", "2101"),
            ("protocol", "udp"),
            ("ipv6", "1"),
        ]))
        .unwrap();
        let TransportConfig::Socket(cfg) = cfg else {
            panic!("expected socket config");
        };
        assert_eq!(cfg.port, 2101);
        assert_eq!(cfg.protocol, SocketProtocol::Udp);
        assert!(cfg.ipv6);
        assert!(!cfg.tls);
    }

    #[test]
    fn tls_unsupported() {
        let cfg = TransportConfig::Socket(SocketConfig {
            host: "127.0.0.1".into(),
            tls: true,
            ..Default::default()
        });
        assert!(matches!(
            cfg.connect(),
            Err(ConnectionError::Unsupported("TLS"))
        ));
    }

    #[test]
    fn missing_device() {
        let cfg = TransportConfig::Serial(SerialConfig {
            port: "/dev/gnss-stream-test-missing".into(),
            ..Default::default()
        });
        assert!(cfg.connect().is_err());
    }

    #[test]
    fn file_replay() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        let cfg = TransportConfig::File(FileConfig {
            path: tmp.path().to_path_buf(),
            delay: Duration::ZERO,
        });
        let mut transport = cfg.connect().unwrap();
        assert_eq!(transport.read(6).unwrap(), b"012345");
        assert_eq!(transport.read(6).unwrap(), b"6789");
        assert!(matches!(transport.read(6), Err(TransportError::EndOfStream)));
        transport.close();
        transport.close();
        assert!(matches!(transport.read(6), Err(TransportError::Closed)));
    }

    #[test]
    fn tcp_read_and_peer_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let cfg = SocketConfig {
            host: "127.0.0.1".into(),
            port: listener.local_addr().unwrap().port(),
            timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let mut transport = TcpTransport::connect(&cfg).unwrap();
        let (mut server, _) = listener.accept().unwrap();
        assert_eq!(transport.read(16).unwrap(), b"");
        server.write_all(b"$GP").unwrap();
        let mut got = Vec::new();
        while got.len() < 3 {
            got.extend(transport.read(16).unwrap());
        }
        assert_eq!(got, b"$GP");
        transport.write(b"hello").unwrap();
        let mut echo = [0u8; 5];
        server.read_exact(&mut echo).unwrap();
        assert_eq!(&echo, b"hello");
        drop(server);
        let err = loop {
            match transport.read(16) {
                Ok(_) => continue,
                Err(e) => break e,
            }
        };
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[test]
    fn udp_answers_last_peer() {
        let cfg = SocketConfig {
            host: "127.0.0.1".into(),
            port: 0,
            protocol: SocketProtocol::Udp,
            timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let mut transport = UdpTransport::bind(&cfg).unwrap();
        assert!(matches!(transport.write(b"x"), Err(TransportError::NoPeer)));
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        client.send_to(b"\xD3\x00\x00", transport.local_addr()).unwrap();
        let mut got = Vec::new();
        for _ in 0..40 {
            got = transport.read(64).unwrap();
            if !got.is_empty() {
                break;
            }
        }
        assert_eq!(got, b"\xD3\x00\x00");
        transport.write(b"ack").unwrap();
        let mut buf = [0u8; 8];
        let (n, _) = client.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ack");
    }
}
