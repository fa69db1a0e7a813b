//! Minimal client for the NUT (Network UPS Tools) line protocol.

use super::{UpsConnector, UpsSession};
use crate::error::{CoreError, Result};
use std::{
    io::{BufRead, BufReader, Write},
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

pub const DEFAULT_PORT: u16 = 3493;

/// Connects to `upsd` over TCP
#[derive(Debug, Clone)]
pub struct NutConnector {
    address: String,
    timeout: Duration,
}

impl NutConnector {
    pub fn new<S: Into<String>>(address: S, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }
}

impl UpsConnector for NutConnector {
    fn connect(&self) -> Result<Box<dyn UpsSession>> {
        let addr = self
            .address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| CoreError::ups(format!("cannot resolve {}", self.address)))?;
        let stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        let mut client = NutClient::new(stream)?;
        client.negotiate()?;
        Ok(Box::new(client))
    }
}

/// A NUT session over a TCP stream
pub struct NutClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    version: String,
}

impl NutClient {
    pub fn new(stream: TcpStream) -> Result<Self> {
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            version: String::new(),
        })
    }

    /// Ask the daemon for its protocol version.
    pub fn negotiate(&mut self) -> Result<()> {
        self.send("NETVER")?;
        self.version = self.read_line()?;
        Ok(())
    }

    fn send(&mut self, command: &str) -> Result<()> {
        self.writer.write_all(command.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(CoreError::ups("connection closed by daemon"));
        }
        let line = line.trim_end().to_string();
        if let Some(code) = line.strip_prefix("ERR ") {
            return Err(CoreError::ups(code.to_string()));
        }
        Ok(line)
    }

    /// Send `LIST <query>` and collect the body lines up to `END LIST <query>`.
    fn list(&mut self, query: &str) -> Result<Vec<String>> {
        self.send(&format!("LIST {}", query))?;

        let begin = self.read_line()?;
        if begin != format!("BEGIN LIST {}", query) {
            return Err(CoreError::ups(format!("unexpected reply {:?}", begin)));
        }

        let end = format!("END LIST {}", query);
        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            if line == end {
                return Ok(lines);
            }
            lines.push(line);
        }
    }
}

impl UpsSession for NutClient {
    fn protocol_version(&self) -> &str {
        &self.version
    }

    fn list_units(&mut self) -> Result<Vec<String>> {
        self.list("UPS")?
            .iter()
            .map(|line| {
                parse_ups_line(line).ok_or_else(|| CoreError::ups(format!("malformed UPS line {:?}", line)))
            })
            .collect()
    }

    fn list_vars(&mut self, unit: &str) -> Result<Vec<(String, String)>> {
        self.list(&format!("VAR {}", unit))?
            .iter()
            .map(|line| {
                parse_var_line(line).ok_or_else(|| CoreError::ups(format!("malformed VAR line {:?}", line)))
            })
            .collect()
    }

    fn disconnect(&mut self) -> Result<()> {
        self.send("LOGOUT")?;
        self.read_line()?;
        Ok(())
    }
}

/// `UPS <name> "<description>"` -> name
pub fn parse_ups_line(line: &str) -> Option<String> {
    let rest = line.strip_prefix("UPS ")?;
    let name = rest.split_whitespace().next()?;
    Some(name.to_string())
}

/// `VAR <ups> <var> "<value>"` -> (var, value)
pub fn parse_var_line(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("VAR ")?;
    let (_unit, rest) = rest.split_once(' ')?;
    let (name, quoted) = rest.split_once(' ')?;
    Some((name.to_string(), unquote(quoted)?))
}

fn unquote(quoted: &str) -> Option<String> {
    let inner = quoted.strip_prefix('"')?.strip_suffix('"')?;
    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            value.push(chars.next()?);
        } else {
            value.push(c);
        }
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_parse_lines() {
        assert_eq!(parse_ups_line(r#"UPS qnapups "APC Back-UPS""#), Some("qnapups".to_string()));
        assert_eq!(
            parse_var_line(r#"VAR qnapups battery.charge "100""#),
            Some(("battery.charge".to_string(), "100".to_string()))
        );
        assert_eq!(
            parse_var_line(r#"VAR qnapups ups.model "Back-UPS \"ES\"""#),
            Some(("ups.model".to_string(), r#"Back-UPS "ES""#.to_string()))
        );
        assert_eq!(parse_var_line("VAR qnapups battery.charge 100"), None);
        assert_eq!(parse_ups_line("BEGIN LIST UPS"), None);
    }

    #[test]
    fn test_session_against_loopback_daemon() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let daemon = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).unwrap() == 0 {
                    break;
                }
                let reply = match line.trim_end() {
                    "NETVER" => "1.3\n",
                    "LIST UPS" => "BEGIN LIST UPS\nUPS qnapups \"UPS\"\nEND LIST UPS\n",
                    "LIST VAR qnapups" => {
                        "BEGIN LIST VAR qnapups\nVAR qnapups battery.charge \"97\"\nEND LIST VAR qnapups\n"
                    }
                    "LIST VAR missing" => "ERR UNKNOWN-UPS\n",
                    "LOGOUT" => "OK Goodbye\n",
                    _ => "ERR UNKNOWN-COMMAND\n",
                };
                writer.write_all(reply.as_bytes()).unwrap();
                if reply.starts_with("OK Goodbye") {
                    break;
                }
            }
        });

        let connector = NutConnector::new(address, Duration::from_secs(2));
        let mut session = connector.connect().unwrap();
        assert_eq!(session.protocol_version(), "1.3");
        assert_eq!(session.list_units().unwrap(), vec!["qnapups"]);
        assert_eq!(
            session.list_vars("qnapups").unwrap(),
            vec![("battery.charge".to_string(), "97".to_string())]
        );
        let err = session.list_vars("missing").unwrap_err();
        assert!(err.to_string().contains("UNKNOWN-UPS"));
        session.disconnect().unwrap();

        daemon.join().unwrap();
    }
}
