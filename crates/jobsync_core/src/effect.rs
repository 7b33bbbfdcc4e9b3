use std::time::Duration;

use crate::OutboundFrame;

/// IO the host must perform on behalf of the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Tear down any current transport and open a new one tagged `generation`.
    OpenTransport { generation: u64 },
    CloseTransport,
    Send(OutboundFrame),
    /// Deliver `Msg::ReconnectTimerFired { token }` after `delay`.
    ScheduleReconnect { token: u64, delay: Duration },
    CancelReconnect,
}
