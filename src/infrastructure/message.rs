// Event-channel envelope and test_data payload decoding
use crate::domain::error::TransportError;
use crate::domain::matrix::MatrixCell;
use crate::domain::measurement::RawTestDataset;
use crate::domain::statistics::StatisticsPatch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    HardwareStatus,
    HardwareUpdate,
    DigitalIoUpdate,
    TestStatus,
    TestProgress,
    TestData,
    TestLog,
    SystemStatus,
    Error,
    Heartbeat,
    EmergencyStop,
    Subscribe,
    Unsubscribe,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn decode(frame: &str) -> Result<Self, TransportError> {
        serde_json::from_str(frame).map_err(|e| TransportError::ParseError(e.to_string()))
    }
}

/// One cell replacement pushed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellUpdate {
    pub temperature: f64,
    pub stroke_position: f64,
    pub cell: MatrixCell,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncrementalUpdate {
    pub cell_updates: Vec<CellUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics_patch: Option<StatisticsPatch>,
}

#[derive(Debug, Clone)]
pub enum TestDataPayload {
    Incremental(IncrementalUpdate),
    Dataset(RawTestDataset),
}

impl TestDataPayload {
    /// A payload carrying `cellUpdates` is incremental; anything else is a
    /// full dataset.
    pub fn decode(payload: &Value) -> Result<Self, TransportError> {
        let parse_error = |e: serde_json::Error| TransportError::ParseError(e.to_string());
        if payload.get("cellUpdates").is_some() {
            IncrementalUpdate::deserialize(payload)
                .map(Self::Incremental)
                .map_err(parse_error)
        } else {
            RawTestDataset::deserialize(payload)
                .map(Self::Dataset)
                .map_err(parse_error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_envelope() {
        let envelope = Envelope::decode(
            r#"{"type": "digital_io_update", "payload": {"pin": 3}, "messageId": "m-1", "timestamp": "2024-03-01T08:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(envelope.message_type, MessageType::DigitalIoUpdate);
        assert_eq!(envelope.message_id.as_deref(), Some("m-1"));
        assert_eq!(envelope.payload["pin"], 3);
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let err = Envelope::decode(r#"{"type": "bogus", "timestamp": "2024-03-01T08:00:00Z"}"#).unwrap_err();
        assert!(matches!(err, TransportError::ParseError(_)));
    }

    #[test]
    fn test_payload_kinds() {
        let incremental: Value = serde_json::json!({
            "cellUpdates": [{
                "temperature": 20.0,
                "strokePosition": 10.0,
                "cell": {"force": 5.0, "timestamp": "2024-03-01T08:00:00Z", "status": "ok", "pass": true}
            }, {
                "temperature": 25.0,
                "strokePosition": 10.0,
                "cell": null
            }]
        });
        match TestDataPayload::decode(&incremental).unwrap() {
            TestDataPayload::Incremental(update) => {
                assert_eq!(update.cell_updates.len(), 2);
                assert_eq!(update.cell_updates[0].cell.force(), Some(5.0));
                assert_eq!(update.cell_updates[1].cell, MatrixCell::Empty);
            }
            other => panic!("unexpected payload: {:?}", other),
        }

        let dataset: Value = serde_json::json!({
            "testId": "T-9",
            "temperatureList": [20.0],
            "strokePositions": [10.0],
            "measurements": []
        });
        match TestDataPayload::decode(&dataset).unwrap() {
            TestDataPayload::Dataset(raw) => assert_eq!(raw.test_id.as_deref(), Some("T-9")),
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}
