use std::fmt;

/// A value published to, or received from, a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicValue {
    Text(String),
    Binary(Vec<u8>),
}

impl TopicValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TopicValue::Text(text) => Some(text),
            TopicValue::Binary(_) => None,
        }
    }

    /// Raw bytes of the value; text is returned as UTF-8
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            TopicValue::Text(text) => text.as_bytes(),
            TopicValue::Binary(bytes) => bytes,
        }
    }
}

impl fmt::Display for TopicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicValue::Text(text) => f.write_str(text),
            TopicValue::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<String> for TopicValue {
    fn from(text: String) -> Self {
        TopicValue::Text(text)
    }
}

impl From<&str> for TopicValue {
    fn from(text: &str) -> Self {
        TopicValue::Text(text.to_string())
    }
}

impl From<Vec<u8>> for TopicValue {
    fn from(bytes: Vec<u8>) -> Self {
        TopicValue::Binary(bytes)
    }
}

impl From<&[u8]> for TopicValue {
    fn from(bytes: &[u8]) -> Self {
        TopicValue::Binary(bytes.to_vec())
    }
}

/// A published value as delivered to a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicItem {
    pub value: TopicValue,
    pub sequence_number: u64,
    pub sequence_page: u64,
    /// Identity of the publisher, when the service reports one
    pub publisher_id: Option<String>,
}

/// Gap in the topic sequence; items between the two numbers were missed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicDiscontinuity {
    pub last_sequence_number: u64,
    pub new_sequence_number: u64,
    pub new_sequence_page: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicEvent {
    Item(TopicItem),
    Discontinuity(TopicDiscontinuity),
    Heartbeat,
}

/// Parameters for opening a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub cache_name: String,
    pub topic: String,
    /// 0 starts at the live tail
    pub resume_at_sequence_number: u64,
    pub sequence_page: u64,
}

impl SubscribeRequest {
    pub fn new(cache_name: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            topic: topic.into(),
            resume_at_sequence_number: 0,
            sequence_page: 0,
        }
    }

    pub fn with_resume_at(mut self, sequence_number: u64, sequence_page: u64) -> Self {
        self.resume_at_sequence_number = sequence_number;
        self.sequence_page = sequence_page;
        self
    }

    pub fn is_resume(&self) -> bool {
        self.resume_at_sequence_number != 0 || self.sequence_page != 0
    }
}
