use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Webhook event types an account can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Message,
    ReadReceipt,
    Presence,
    HistorySync,
    ChatPresence,
    /// Sentinel matching every other kind.
    All,
}

impl EventKind {
    pub const ALL_KINDS: [EventKind; 6] = [
        EventKind::Message,
        EventKind::ReadReceipt,
        EventKind::Presence,
        EventKind::HistorySync,
        EventKind::ChatPresence,
        EventKind::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Message => "Message",
            EventKind::ReadReceipt => "ReadReceipt",
            EventKind::Presence => "Presence",
            EventKind::HistorySync => "HistorySync",
            EventKind::ChatPresence => "ChatPresence",
            EventKind::All => "All",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL_KINDS
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Ordered, duplicate-free set of subscribed kinds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Subscriptions(Vec<EventKind>);

impl Subscriptions {
    pub fn all() -> Self {
        Self(vec![EventKind::All])
    }

    /// Keeps known kinds in first-seen order. Unknown names are discarded
    /// with a warning. Only a request naming nothing subscribes to
    /// everything; one naming only unknown kinds forwards nothing.
    pub fn normalize<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut requested = false;
        let mut kinds = Vec::new();
        for name in names {
            requested = true;
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            match name.parse::<EventKind>() {
                Ok(kind) if !kinds.contains(&kind) => kinds.push(kind),
                Ok(_) => {}
                Err(unknown) => warn!("Message type discarded: {unknown}"),
            }
        }
        if !requested {
            return Self::all();
        }
        Self(kinds)
    }

    /// Parses a persisted list. The empty string is the cleared list.
    pub fn from_csv(csv: &str) -> Self {
        if csv.trim().is_empty() {
            return Self::default();
        }
        Self::normalize(csv.split(','))
    }

    pub fn to_csv(&self) -> String {
        self.0
            .iter()
            .map(EventKind::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn accepts(&self, kind: EventKind) -> bool {
        self.0.contains(&EventKind::All) || self.0.contains(&kind)
    }

    pub fn kinds(&self) -> &[EventKind] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
