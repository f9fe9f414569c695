use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Classified ad as delivered by the upstream source. Every field is optional:
/// a missing field simply produces no line in the rendered message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ad {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub price_detailed: Option<Price>,
    #[serde(default)]
    pub is_promotion: bool,
    #[serde(default)]
    pub address_detailed: Option<AddressDetailed>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Seconds or milliseconds since epoch, kept as text so unparseable values can still be shown
    #[serde(default, deserialize_with = "string_or_number")]
    pub sort_time_stamp: Option<String>,
    #[serde(default)]
    pub images: Vec<Image>,
}

/// Price is either a bare amount/text or a detailed object carrying a `value`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Price {
    Amount(f64),
    Text(String),
    Detailed { value: Box<Price> },
}

impl Price {
    /// Text form of the price, unwrapping detailed prices down to their value
    pub fn as_text(&self) -> String {
        match self {
            Price::Amount(amount) => amount.to_string(),
            Price::Text(text) => text.clone(),
            Price::Detailed { value } => value.as_text(),
        }
    }

    /// Empty text or a zero amount; such a primary price defers to the detailed one
    pub fn is_blank(&self) -> bool {
        match self {
            Price::Amount(amount) => *amount == 0.0,
            Price::Text(text) => text.is_empty(),
            Price::Detailed { .. } => false,
        }
    }
}

/// Detailed address: either already structured, or a serialized blob that embeds
/// `locationName='...'` somewhere in its text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AddressDetailed {
    Structured {
        #[serde(rename = "locationName")]
        location_name: Option<String>,
    },
    Raw(String),
}

/// One photo of the ad, keyed by resolution string ("640x480") to URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Image {
    pub root: BTreeMap<String, String>,
}

#[cfg(test)]
impl Image {
    pub fn new<K: Into<String>, V: Into<String>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            root: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Destination chat on a messaging platform: a numeric id or a channel handle like `@ads`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ChatId {
    Numeric(i64),
    Handle(String),
}

impl ChatId {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(id) => ChatId::Numeric(id),
            Err(_) => ChatId::Handle(raw.to_string()),
        }
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatId::Numeric(id) => write!(f, "{}", id),
            ChatId::Handle(handle) => write!(f, "{}", handle),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Int(n)) => Some(n.to_string()),
        Some(Raw::Float(f)) => Some(f.to_string()),
        Some(Raw::Text(s)) => Some(s),
        None => None,
    })
}
