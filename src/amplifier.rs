use crate::config::AmpConfig;
use crate::connection::{Channel, Exchange, Link, LineChannel};
use crate::error::Result;
use crate::protocol::{self, Command};
use crate::subscription::{UpdateReceiver, ZoneUpdate};
use crate::types::{ControlId, State, UnitId, ZoneId, ZONES_PER_UNIT};
use crate::zone::Zone;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;

/// Driver for one amplifier unit
///
/// The `Amplifier` owns the channel to the unit and the zones found on it.
/// Every exchange with the device, whether made here or through a [`Zone`],
/// holds the channel exclusively, so handles can be used from several tasks
/// at once.
pub struct Amplifier {
    link: Arc<Link>,
    zones: BTreeMap<ZoneId, Zone>,
    updates: broadcast::Sender<ZoneUpdate>,
}

impl Amplifier {
    /// Set up unit 1 over an already open channel
    ///
    /// Queries every zone of the unit. Failing to send that query is fatal;
    /// a zone whose status line cannot be read or decoded is left out.
    ///
    /// # Example
    ///
    /// ```
    /// use monoprice_amp::{mock::MockChannel, Amplifier, State};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let amp = Amplifier::new(MockChannel::simulated(1, State::default())).await?;
    ///     for zone in amp.zones() {
    ///         println!("zone {}: {:?}", zone.id(), zone.state());
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(channel: impl Channel + 'static) -> Result<Self> {
        Self::with_config(channel, AmpConfig::default()).await
    }

    /// Set up the unit named in `config` over an already open channel
    pub async fn with_config(channel: impl Channel + 'static, config: AmpConfig) -> Result<Self> {
        config.validate()?;

        let link = Arc::new(Link::new(config.unit_id, Box::new(channel)));
        let (updates, _) = broadcast::channel(config.update_capacity);

        let mut exchange = link.lock().await;
        let zones = read_zones(&link, &mut exchange, &updates).await?;
        drop(exchange);
        tracing::info!("Amplifier {} ready with {} zones", config.unit_id, zones.len());

        Ok(Self {
            link,
            zones,
            updates,
        })
    }

    /// Set up unit 1 over any tokio byte stream, such as an opened serial port
    ///
    /// # Example
    ///
    /// ```no_run
    /// use monoprice_amp::Amplifier;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     // Any AsyncRead + AsyncWrite stream works; the application opens it.
    ///     let (stream, _device) = tokio::io::duplex(1024);
    ///     let amp = Amplifier::from_stream(stream).await?;
    ///     if let Some(zone) = amp.zone(1) {
    ///         zone.set_volume(15).await?;
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub async fn from_stream<T>(stream: T) -> Result<Self>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::new(LineChannel::new(stream)).await
    }

    /// Unit id (1-3) of this amplifier
    pub fn id(&self) -> UnitId {
        self.link.unit()
    }

    /// Handle to a zone, if it answered during setup
    ///
    /// The returned state is cached; if the zone may have changed (from a
    /// wall keypad, for example) call [`Zone::refresh`] before relying on it.
    pub fn zone(&self, id: ZoneId) -> Option<Zone> {
        self.zones.get(&id).cloned()
    }

    /// Handles to every zone that answered during setup, in zone order
    pub fn zones(&self) -> Vec<Zone> {
        self.zones.values().cloned().collect()
    }

    /// Subscribe to changes of any zone's cached state
    pub fn subscribe(&self) -> UpdateReceiver {
        UpdateReceiver::new(self.updates.subscribe())
    }

    /// Resynchronize with the device
    ///
    /// Discards unread input, drops every zone and queries the unit again.
    /// Zone handles obtained before the reset become stale: they keep their
    /// last cached state but refuse to talk to the device. Fetch new handles
    /// with [`Amplifier::zone`].
    pub async fn reset(&mut self) -> Result<()> {
        let mut exchange = self.link.lock().await;
        let generation = self.link.invalidate();
        tracing::info!("Resetting amplifier {} (generation {})", self.link.unit(), generation);

        self.zones.clear();
        exchange.discard_input().await?;
        self.zones = read_zones(&self.link, &mut exchange, &self.updates).await?;
        tracing::info!("Amplifier {} ready with {} zones", self.link.unit(), self.zones.len());
        Ok(())
    }
}

impl std::fmt::Debug for Amplifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Amplifier")
            .field("id", &self.id())
            .field("zones", &self.zones.values().collect::<Vec<_>>())
            .finish()
    }
}

/// Query every zone of the unit and build a handle for each one that answers
async fn read_zones(
    link: &Arc<Link>,
    exchange: &mut Exchange<'_>,
    updates: &broadcast::Sender<ZoneUpdate>,
) -> Result<BTreeMap<ZoneId, Zone>> {
    exchange.execute(&Command::query_unit(link.unit())).await?;

    let generation = link.generation();
    let mut zones = BTreeMap::new();
    for zone_id in 1..=ZONES_PER_UNIT {
        let id = ControlId::new(link.unit(), zone_id);

        let line = match exchange.read_line().await {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Error reading status of zone {}: {}", id, e);
                continue;
            }
        };

        let mut state = State::default();
        if let Err(e) = protocol::decode(&line, &mut state) {
            tracing::warn!("Error creating zone {}: {}", id, e);
            continue;
        }

        let _ = updates.send(ZoneUpdate { zone: id, state });
        zones.insert(
            zone_id,
            Zone::new(link.clone(), generation, id, state, updates.clone()),
        );
    }

    Ok(zones)
}
