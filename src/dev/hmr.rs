//! The HMR wire protocol (spec §4.E "HMR protocol"): JSON frames
//! `{data: {event, path}}` pushed to every connected WebSocket peer.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HmrEvent {
    Change,
    Update,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct HmrData {
    event: HmrEvent,
    path: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmrFrame {
    data: HmrData,
}

impl HmrFrame {
    pub fn new(event: HmrEvent, path: impl Into<String>) -> Self {
        Self {
            data: HmrData {
                event,
                path: path.into(),
            },
        }
    }

    /// The router-level broadcast sent when `src/pages/**` gains or loses
    /// a file: the client re-fetches `/peaque.js`.
    pub fn router_changed() -> Self {
        Self::new(HmrEvent::Change, "/peaque.js")
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("HmrFrame always serializes")
    }

    pub fn path(&self) -> &str {
        &self.data.path
    }
}
