use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::Result;
use crate::price_infra::alerts::PriceAlert;
use crate::types::price::PricePoint;

/// Events pushed to every live subscriber.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    PriceUpdate(PricePoint),
    Alert(PriceAlert),
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::PriceUpdate(_) => "price_update",
            StreamEvent::Alert(_) => "price_alert",
        }
    }

    pub fn to_message(&self) -> Result<StreamMessage> {
        let data = match self {
            StreamEvent::PriceUpdate(point) => serde_json::to_value(point)?,
            StreamEvent::Alert(alert) => serde_json::to_value(alert)?,
        };
        Ok(StreamMessage::new(self.kind(), data))
    }
}

/// Wire envelope shared by pushed events and request/response messages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl StreamMessage {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        StreamMessage {
            kind: kind.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
