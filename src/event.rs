use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// One application-defined fact, e.g. `{"player":"A","points":10}`.
///
/// Events are JSON objects and are opaque to the store: identity is the position in the
/// committed event log, not anything inside the payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(Map<String, Value>);

impl Event {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

impl TryFrom<Value> for Event {
    type Error = serde_json::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        serde_json::from_value(value)
    }
}

/// The application data of a raft log entry: the serialized bytes of an [`Event`].
///
/// Entries are decoded only when applied, so a committed entry whose bytes are not a valid event
/// is possible and is handled by the state machine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EventEntry(pub Vec<u8>);

impl EventEntry {
    pub fn encode(event: &Event) -> Result<Self, serde_json::Error> {
        Ok(Self(serde_json::to_vec(event)?))
    }

    pub fn decode(&self) -> Result<Event, serde_json::Error> {
        serde_json::from_slice(&self.0)
    }
}

/// The result of applying one log entry.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct EventResponse {
    /// Position of the appended event in the event log.
    ///
    /// `None` for blank and membership entries, and for entries that could not be decoded.
    pub position: Option<u64>,
}

impl EventResponse {
    pub fn appended(position: u64) -> Self {
        Self {
            position: Some(position),
        }
    }

    pub fn skipped() -> Self {
        Self { position: None }
    }
}
