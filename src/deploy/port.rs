use crate::{Error, Result};

const DEFAULT_PROTOCOL: &str = "tcp";

/// A port and protocol, written as `<port>/<protocol>` on the wire
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortBinding {
    pub port: u16,
    pub protocol: String,
}

impl std::str::FromStr for PortBinding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (port, protocol) = s.split_once('/').unwrap_or((s, DEFAULT_PROTOCOL));

        if protocol.is_empty() || protocol.contains('/') {
            return Err(Error::InvalidPortSpec(s.to_string()));
        }
        let port = match port.parse::<u16>() {
            Ok(port) if port != 0 => port,
            _ => return Err(Error::InvalidPortSpec(s.to_string())),
        };

        Ok(Self {
            port,
            protocol: protocol.to_string(),
        })
    }
}

impl std::fmt::Display for PortBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

impl serde::ser::Serialize for PortBinding {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Decode a list of ports, any bad entry fails the whole list
pub fn decode_ports<S: AsRef<str>>(ports: &[S]) -> Result<Vec<PortBinding>> {
    ports.iter().map(|p| p.as_ref().parse()).collect()
}

#[cfg(test)]
mod test {
    use super::{decode_ports, PortBinding};
    use crate::Error;

    #[test]
    fn default_protocol() {
        let port: PortBinding = "80".parse().unwrap();
        assert_eq!(port.port, 80);
        assert_eq!(port.protocol, "tcp");
        assert_eq!(port.to_string(), "80/tcp");
    }

    #[test]
    fn explicit_protocol() {
        let port: PortBinding = "53/udp".parse().unwrap();
        assert_eq!(port.port, 53);
        assert_eq!(port.protocol, "udp");
        assert_eq!(port.to_string().parse::<PortBinding>().unwrap(), port);
    }

    #[test]
    fn invalid() {
        for spec in ["", "/tcp", "80/", "http", "0", "65536", "-1/tcp", "80/tcp/x", " 80"] {
            let err = spec.parse::<PortBinding>().unwrap_err();
            assert!(matches!(err, Error::InvalidPortSpec(ref s) if s == spec), "{spec}");
        }
    }

    #[test]
    fn list_fails_as_a_whole() {
        let ports = decode_ports(&["80", "443/tcp"]).unwrap();
        assert_eq!(ports.len(), 2);

        let err = decode_ports(&["80", "nope", "443"]).unwrap_err();
        assert!(matches!(err, Error::InvalidPortSpec(ref s) if s == "nope"));
    }

    #[test]
    fn serialized_as_string() {
        let port: PortBinding = "8080".parse().unwrap();
        assert_eq!(serde_json::to_string(&port).unwrap(), r#""8080/tcp""#);
    }
}
