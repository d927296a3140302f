use {
    core::{fmt, time::Duration},
    derive_more::{Display, From},
    enum_primitive_derive::Primitive,
    serde::{Deserialize, Serialize},
    std::{
        net::{Ipv4Addr, SocketAddr, SocketAddrV4},
        string::ToString,
    },
};

/// A single filter predicate in Valve's backslash grammar, e.g. `\appid\440`.
#[derive(Clone, Debug, Display, PartialEq, Eq, Hash)]
pub struct FilterToken(String);

impl FilterToken {
    pub fn new(key: impl fmt::Display, value: impl fmt::Display) -> Self {
        Self(format!("\\{}\\{}", key, value))
    }

    /// Accepts an already formatted token as is.
    pub fn raw(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn app_id(id: u32) -> Self {
        Self::new("appid", id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Length of the token once written to the wire.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// "Resume listing after this server". The null cursor starts from the beginning.
#[derive(Clone, Copy, Debug, Display, From, PartialEq, Eq, Hash)]
#[display(fmt = "{}", _0)]
pub struct Cursor(pub SocketAddrV4);

impl Cursor {
    pub const NULL: Cursor = Cursor(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::NULL
    }
}

/// Servers decoded from one master response packet.
///
/// The end-of-list sentinel is never part of `servers`; `last` is set instead.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPage {
    pub servers: Vec<SocketAddrV4>,
    pub last: bool,
}

impl ServerPage {
    pub fn is_last(&self) -> bool {
        self.last
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

impl IntoIterator for ServerPage {
    type Item = SocketAddrV4;
    type IntoIter = std::vec::IntoIter<SocketAddrV4>;

    fn into_iter(self) -> Self::IntoIter {
        self.servers.into_iter()
    }
}

/// Source: https://developer.valvesoftware.com/wiki/Master_Server_Query_Protocol#Region_codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Primitive, Serialize, Deserialize)]
pub enum Region {
    UsEast = 0x00,
    UsWest = 0x01,
    SouthAmerica = 0x02,
    Europe = 0x03,
    Asia = 0x04,
    Australia = 0x05,
    MiddleEast = 0x06,
    Africa = 0x07,
    All = 0xFF,
}

impl Default for Region {
    fn default() -> Self {
        Region::All
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringAddr {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Host {
    A(SocketAddr),
    S(StringAddr),
}

impl From<SocketAddr> for Host {
    fn from(addr: SocketAddr) -> Self {
        Host::A(addr)
    }
}

impl<S> From<(S, u16)> for Host
where
    S: ToString,
{
    fn from((host, port): (S, u16)) -> Self {
        Host::S(StringAddr {
            host: host.to_string(),
            port,
        })
    }
}

impl std::str::FromStr for Host {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Host::A(addr));
        }

        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("missing port in {:?}", s))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("invalid port in {:?}: {}", s, e))?;
        if host.is_empty() {
            return Err(format!("missing host in {:?}", s));
        }

        Ok((host, port).into())
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Host::A(addr) => write!(f, "{}", addr),
            Host::S(StringAddr { host, port }) => write!(f, "{}:{}", host, port),
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(v: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(v.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Tunables of a master query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterQueryConfig {
    /// Byte budget for the filters of a single request
    pub max_filter_length: usize,
    /// How long to wait for each response
    #[serde(with = "secs")]
    pub timeout: Duration,
    /// The master mishandles rapid successive requests, so every continuation waits this long
    #[serde(with = "secs")]
    pub retry_delay: Duration,
    /// Continuation attempts after the first one
    pub max_retries: u32,
    pub region: Region,
}

impl Default for MasterQueryConfig {
    fn default() -> Self {
        Self {
            max_filter_length: 190,
            timeout: Duration::from_secs(5 * 60),
            retry_delay: Duration::from_secs(2),
            max_retries: 4,
            region: Region::All,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::{FromPrimitive, ToPrimitive};
    use serde_json::json;

    #[test]
    fn filter_token_format() {
        assert_eq!(FilterToken::app_id(440).as_str(), "\\appid\\440");
        assert_eq!(FilterToken::new("gamedir", "tf").as_str(), "\\gamedir\\tf");
        assert_eq!(FilterToken::raw("\\dedicated\\1").len(), 12);
    }

    #[test]
    fn cursor_display() {
        assert_eq!(Cursor::NULL.to_string(), "0.0.0.0:0");
        assert!(Cursor::default().is_null());

        let c = Cursor::from("1.2.3.4:27015".parse::<SocketAddrV4>().unwrap());
        assert_eq!(c.to_string(), "1.2.3.4:27015");
        assert!(!c.is_null());
    }

    #[test]
    fn region_codes() {
        assert_eq!(Region::default().to_u8(), Some(0xFF));
        assert_eq!(Region::from_u8(3), Some(Region::Europe));
        assert_eq!(Region::from_u8(8), None);
    }

    #[test]
    fn host_parsing() {
        assert_eq!(
            "127.0.0.1:27011".parse::<Host>().unwrap(),
            Host::A("127.0.0.1:27011".parse().unwrap())
        );
        assert_eq!(
            "hl2master.steampowered.com:27011".parse::<Host>().unwrap(),
            Host::from(("hl2master.steampowered.com", 27011))
        );
        assert!("hl2master.steampowered.com".parse::<Host>().is_err());
        assert!(":27011".parse::<Host>().is_err());
    }

    #[test]
    fn config_deserialization() {
        let fixture = json!({
            "max_filter_length": 32,
            "retry_delay": 0,
            "region": "Europe",
        });

        let expectation = MasterQueryConfig {
            max_filter_length: 32,
            retry_delay: Duration::from_secs(0),
            region: Region::Europe,
            ..Default::default()
        };

        let result: MasterQueryConfig = serde_json::from_value(fixture).unwrap();

        assert_eq!(expectation, result);
    }

    #[test]
    fn config_serialization() {
        let expectation = json!({
            "max_filter_length": 190,
            "timeout": 300,
            "retry_delay": 2,
            "max_retries": 4,
            "region": "All",
        });

        let result = serde_json::to_value(&MasterQueryConfig::default()).unwrap();

        assert_eq!(expectation, result);
    }

    #[test]
    fn page_serialization() {
        let page = ServerPage {
            servers: vec!["10.0.0.1:27015".parse().unwrap()],
            last: true,
        };

        assert_eq!(
            serde_json::to_value(&page).unwrap(),
            json!({ "servers": ["10.0.0.1:27015"], "last": true })
        );
    }
}
