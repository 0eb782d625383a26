//! Bench power supply seam and a Rigol DP8xx driver.
//!
//! The DP832 accepts SCPI on a raw TCP socket (LAN port 5555). VISA names
//! that transport `TCPIP0::<host>::<port>::SOCKET`; only that resource kind
//! is supported, so no VISA runtime is needed.

use super::InstrumentError;
use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Default socket timeout for SCPI traffic.
pub const DEFAULT_SCPI_TIMEOUT: Duration = Duration::from_secs(2);

/// Output stage of a programmable supply.
pub trait PowerSupply: Send + fmt::Debug {
    /// Open the connection and return the identification string.
    fn connect(&mut self) -> Result<String, InstrumentError>;

    /// Close the connection. Idempotent, never fails.
    fn close(&mut self);

    /// Program voltage and current limit on a supply channel.
    fn apply(&mut self, channel: u8, volts: f64, current_limit: f64) -> Result<(), InstrumentError>;

    /// Switch a supply channel's output relay.
    fn set_output(&mut self, channel: u8, enabled: bool) -> Result<(), InstrumentError>;
}

/// A `TCPIP[n]::<host>::<port>::SOCKET` resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisaResource {
    pub host: String,
    pub port: u16,
}

impl FromStr for VisaResource {
    type Err = InstrumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InstrumentError::InvalidResource(s.to_string());
        let parts: Vec<&str> = s.trim().split("::").collect();

        let [interface, host, port, kind] = parts.as_slice() else {
            return Err(invalid());
        };
        let board = interface
            .get(..5)
            .filter(|prefix| prefix.eq_ignore_ascii_case("TCPIP"))
            .map(|_| &interface[5..])
            .ok_or_else(invalid)?;
        if !board.chars().all(|c| c.is_ascii_digit())
            || host.is_empty()
            || !kind.eq_ignore_ascii_case("SOCKET")
        {
            return Err(invalid());
        }
        let port = port.parse().map_err(|_| invalid())?;

        Ok(Self {
            host: (*host).to_string(),
            port,
        })
    }
}

impl fmt::Display for VisaResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TCPIP0::{}::{}::SOCKET", self.host, self.port)
    }
}

/// Rigol DP832 triple-output supply over SCPI.
#[derive(Debug)]
pub struct Dp832 {
    resource: VisaResource,
    timeout: Duration,
    stream: Option<BufReader<TcpStream>>,
}

impl Dp832 {
    pub fn new(resource: VisaResource) -> Self {
        Self {
            resource,
            timeout: DEFAULT_SCPI_TIMEOUT,
            stream: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn resource(&self) -> &VisaResource {
        &self.resource
    }

    fn open(&self) -> Result<TcpStream, InstrumentError> {
        let target = format!("{}:{}", self.resource.host, self.resource.port);
        let connect_err = |source| InstrumentError::Connect {
            target: target.clone(),
            source,
        };

        let mut last_err = None;
        for addr in target.to_socket_addrs().map_err(connect_err)? {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.timeout)).map_err(connect_err)?;
                    stream.set_write_timeout(Some(self.timeout)).map_err(connect_err)?;
                    stream.set_nodelay(true).map_err(connect_err)?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(connect_err(last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "host resolved to no addresses")
        })))
    }

    fn write(&mut self, command: &str) -> Result<(), InstrumentError> {
        let stream = self.stream.as_mut().ok_or(InstrumentError::NotConnected)?;
        debug!(command, "SCPI write");
        let socket = stream.get_mut();
        socket
            .write_all(format!("{command}\n").as_bytes())
            .and_then(|()| socket.flush())
            .map_err(|e| InstrumentError::supply(command, e))
    }

    fn query(&mut self, query: &str) -> Result<String, InstrumentError> {
        self.write(query)?;
        let stream = self.stream.as_mut().ok_or(InstrumentError::NotConnected)?;

        let mut line = String::new();
        let n = stream
            .read_line(&mut line)
            .map_err(|e| InstrumentError::supply(query, e))?;
        if n == 0 {
            return Err(InstrumentError::supply(
                query,
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed by supply"),
            ));
        }
        let reply = line.trim().to_string();
        debug!(query, reply = %reply, "SCPI reply");
        Ok(reply)
    }
}

impl PowerSupply for Dp832 {
    fn connect(&mut self) -> Result<String, InstrumentError> {
        if self.stream.is_none() {
            self.stream = Some(BufReader::new(self.open()?));
        }
        // A socket that never identified may still deliver a late reply.
        let idn = match self.query("*IDN?") {
            Ok(idn) => idn,
            Err(e) => {
                self.close();
                return Err(e);
            }
        };
        info!(resource = %self.resource, idn = %idn, "power supply connected");
        Ok(idn)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.get_ref().shutdown(std::net::Shutdown::Both) {
                debug!(resource = %self.resource, error = %e, "supply socket shutdown failed");
            }
        }
    }

    fn apply(&mut self, channel: u8, volts: f64, current_limit: f64) -> Result<(), InstrumentError> {
        self.write(&format!(":APPL CH{channel},{volts:.3},{current_limit:.3}"))
    }

    fn set_output(&mut self, channel: u8, enabled: bool) -> Result<(), InstrumentError> {
        let state = if enabled { "ON" } else { "OFF" };
        self.write(&format!(":OUTP:STAT CH{channel},{state}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_parse_socket_resource() {
        let r: VisaResource = "TCPIP0::192.168.1.100::5555::SOCKET".parse().unwrap();
        assert_eq!(r.host, "192.168.1.100");
        assert_eq!(r.port, 5555);

        let r: VisaResource = "tcpip::dp832.lab::5555::socket".parse().unwrap();
        assert_eq!(r.host, "dp832.lab");
    }

    #[test]
    fn test_reject_other_resource_kinds() {
        for bad in [
            "TCPIP0::192.168.1.100::INSTR",
            "USB0::0x1AB1::0x0E11::DP8C000001::INSTR",
            "TCPIP0::host::notaport::SOCKET",
            "TCPIPX::host::5555::SOCKET",
            "",
        ] {
            assert!(
                matches!(bad.parse::<VisaResource>(), Err(InstrumentError::InvalidResource(_))),
                "{bad} should be rejected"
            );
        }
    }

    /// Accept one connection, answer `*IDN?`, and return everything written.
    fn fake_supply() -> (VisaResource, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 256];
            loop {
                let n = socket.read(&mut buf).unwrap_or(0);
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
                if received.ends_with(b"*IDN?\n") {
                    socket.write_all(b"RIGOL TECHNOLOGIES,DP832,DP8C0000001,00.01.16\n").unwrap();
                }
            }
            String::from_utf8(received).unwrap()
        });
        (
            VisaResource {
                host: "127.0.0.1".into(),
                port,
            },
            handle,
        )
    }

    #[test]
    fn test_scpi_command_sequence() {
        let (resource, server) = fake_supply();
        let mut supply = Dp832::new(resource);

        let idn = supply.connect().unwrap();
        assert!(idn.starts_with("RIGOL TECHNOLOGIES,DP832"));
        supply.apply(1, 2.5, 0.1).unwrap();
        supply.set_output(1, true).unwrap();
        supply.set_output(1, false).unwrap();
        supply.close();
        supply.close();

        let received = server.join().unwrap();
        assert_eq!(
            received,
            "*IDN?\n:APPL CH1,2.500,0.100\n:OUTP:STAT CH1,ON\n:OUTP:STAT CH1,OFF\n"
        );
    }

    #[test]
    fn test_commands_require_connection() {
        let mut supply = Dp832::new("TCPIP0::127.0.0.1::5555::SOCKET".parse().unwrap());
        assert!(matches!(
            supply.apply(1, 1.0, 0.1),
            Err(InstrumentError::NotConnected)
        ));
    }

    #[test]
    fn test_unanswered_identification_closes_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut query = [0u8; 6];
            socket.read_exact(&mut query).unwrap();
            assert_eq!(&query, b"*IDN?\n");
            // Never answer; the client must hang up after its timeout.
            let mut rest = Vec::new();
            socket.read_to_end(&mut rest).unwrap();
            rest
        });

        let mut supply = Dp832::new(VisaResource {
            host: "127.0.0.1".into(),
            port,
        })
        .with_timeout(Duration::from_millis(200));

        assert!(matches!(
            supply.connect(),
            Err(InstrumentError::Supply { .. })
        ));
        assert!(server.join().unwrap().is_empty());
        assert!(matches!(
            supply.set_output(1, false),
            Err(InstrumentError::NotConnected)
        ));
    }

    #[test]
    fn test_connect_refused_names_target() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut supply = Dp832::new(VisaResource {
            host: "127.0.0.1".into(),
            port,
        })
        .with_timeout(Duration::from_millis(500));
        let err = supply.connect().unwrap_err();
        assert!(err.to_string().contains(&format!("127.0.0.1:{port}")));
    }
}
