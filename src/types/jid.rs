use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";
pub const GROUP_SERVER: &str = "g.us";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JidError {
    #[error("Invalid JID format: {0}")]
    InvalidFormat(String),
    #[error("Failed to parse component: {0}")]
    Parse(#[from] std::num::ParseIntError),
}

/// Network address of an account or a chat peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Jid {
    pub user: String,
    pub server: String,
    pub agent: u8,
    pub device: u16,
}

impl Jid {
    pub fn new(user: &str, server: &str) -> Self {
        Self {
            user: user.to_string(),
            server: server.to_string(),
            ..Default::default()
        }
    }

    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }

    pub fn is_empty(&self) -> bool {
        self.server.is_empty()
    }
}

impl FromStr for Jid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user_part, server) = match s.split_once('@') {
            Some((u, s)) => (u, s.to_string()),
            None => ("", s.to_string()),
        };

        if user_part.is_empty() {
            return Ok(Jid::new("", &server));
        }

        let (user_base, device_str) = match user_part.rsplit_once(':') {
            Some((u, d)) => (u, Some(d)),
            None => (user_part, None),
        };

        let (user, agent_str) = match user_base.rsplit_once('.') {
            Some((u, a)) => (u, Some(a)),
            None => (user_base, None),
        };

        let agent = match agent_str {
            Some(a) => a.parse()?,
            None => 0,
        };
        let device = match device_str {
            Some(d) => d.parse()?,
            None => 0,
        };

        Ok(Jid {
            user: user.to_string(),
            server,
            agent,
            device,
        })
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.user.is_empty() {
            return write!(f, "{}", self.server);
        }
        write!(f, "{}", self.user)?;
        if self.agent > 0 {
            write!(f, ".{}", self.agent)?;
        }
        if self.device > 0 {
            write!(f, ":{}", self.device)?;
        }
        write!(f, "@{}", self.server)
    }
}

impl From<Jid> for String {
    fn from(jid: Jid) -> Self {
        jid.to_string()
    }
}

impl TryFrom<String> for Jid {
    type Error = JidError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Jid::from_str(&value)
    }
}

/// Parses a recipient or account address as typed by an API caller.
///
/// Accepts a bare phone number (optionally prefixed with `+`), which is placed
/// on the default user server, or a full JID. The user part must be digits.
pub fn parse_address(raw: &str) -> Result<Jid, JidError> {
    let arg = raw.strip_prefix('+').unwrap_or(raw);
    if arg.is_empty() {
        return Err(JidError::InvalidFormat("empty address".to_string()));
    }

    let phone = arg
        .split('@')
        .next()
        .and_then(|p| p.split('.').next())
        .and_then(|p| p.split(':').next())
        .unwrap_or_default();
    if !phone.chars().all(|c| c.is_ascii_digit()) {
        return Err(JidError::InvalidFormat(format!("bad user part in {raw}")));
    }

    if !arg.contains('@') {
        return Ok(Jid::new(arg, DEFAULT_USER_SERVER));
    }

    let jid: Jid = arg.parse()?;
    if jid.user.is_empty() {
        return Err(JidError::InvalidFormat(format!("no user in {raw}")));
    }
    Ok(jid)
}
