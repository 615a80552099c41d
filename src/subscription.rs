use crate::error::{AmpError, Result};
use crate::types::{ControlId, State};
use tokio::sync::broadcast;

/// Cached state of a zone changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneUpdate {
    pub zone: ControlId,
    pub state: State,
}

/// Receiver for zone updates
pub struct UpdateReceiver {
    rx: broadcast::Receiver<ZoneUpdate>,
}

impl UpdateReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<ZoneUpdate>) -> Self {
        Self { rx }
    }

    /// Receive the next zone update
    ///
    /// Fails with [`AmpError::UpdatesClosed`] once the amplifier and every
    /// zone handle have been dropped.
    pub async fn recv(&mut self) -> Result<ZoneUpdate> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => AmpError::UpdatesClosed,
            broadcast::error::RecvError::Lagged(n) => AmpError::UpdatesLagged(n),
        })
    }

    /// Try to receive a zone update without waiting
    ///
    /// Returns `None` if no update is available.
    pub fn try_recv(&mut self) -> Result<Option<ZoneUpdate>> {
        match self.rx.try_recv() {
            Ok(update) => Ok(Some(update)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(AmpError::UpdatesClosed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Err(AmpError::UpdatesLagged(n)),
        }
    }
}
