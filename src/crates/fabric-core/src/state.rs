//! The node lifecycle state machine.

use serde::{Deserialize, Serialize};

/// A node's lifecycle state.
///
/// Legal transitions (anything else is a fatal programming error):
///
/// ```text
/// Ready      -- connect()            --> Connected
/// Connected  -- mgmt:initialize      --> Init
/// Init       -- start()              --> Started
/// Init       -- mgmt:rebuild         --> Rebuilding -- (hook) --> Init
/// Init       -- mgmt:reset          --> Reset      -- (hook) --> Init
/// Started    -- checkpoint partial   --> Checkpoint
/// Started    -- checkpoint complete  --> Idle
/// Checkpoint -- checkpoint complete  --> Idle
/// Idle       -- stop()               --> Stopped
/// Started    -- stop()               --> Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Ready,
    Connected,
    Init,
    Rebuilding,
    Reset,
    Started,
    Checkpoint,
    Idle,
    Stopped,
}

impl NodeState {
    /// Is the data path (`update`/`withdraw`/`checkpoint`) legal right now?
    pub fn accepts_data_path(self) -> bool {
        matches!(self, NodeState::Started | NodeState::Checkpoint)
    }
}
