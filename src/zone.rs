use crate::connection::{Exchange, Link};
use crate::error::{AmpError, Result};
use crate::protocol::{self, Command};
use crate::subscription::ZoneUpdate;
use crate::types::{ActionCode, ControlId, State};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// One output of an amplifier
///
/// A `Zone` is a cheap handle: clones share the same cached [`State`]. The
/// cache follows every change made through this handle, but not changes made
/// from a wall keypad; call [`Zone::refresh`] to pick those up.
///
/// Handles are tied to the amplifier setup they came from. After
/// [`Amplifier::reset`](crate::Amplifier::reset) an older handle still
/// returns its last cached state, but every operation that would talk to the
/// device fails with [`AmpError::StaleZone`].
#[derive(Clone)]
pub struct Zone {
    link: Arc<Link>,
    id: ControlId,
    generation: u64,
    state: Arc<Mutex<State>>,
    updates: broadcast::Sender<ZoneUpdate>,
}

impl Zone {
    pub(crate) fn new(
        link: Arc<Link>,
        generation: u64,
        id: ControlId,
        state: State,
        updates: broadcast::Sender<ZoneUpdate>,
    ) -> Self {
        Self {
            link,
            id,
            generation,
            state: Arc::new(Mutex::new(state)),
            updates,
        }
    }

    /// Control id of this zone (unit id followed by zone id)
    pub fn id(&self) -> ControlId {
        self.id
    }

    /// Snapshot of the cached state
    pub fn state(&self) -> State {
        *self.cached()
    }

    /// Whether the amplifier has been reset since this handle was created
    pub fn is_stale(&self) -> bool {
        self.link.generation() != self.generation
    }

    /// Query the amplifier and replace the cached state with its answer
    ///
    /// The cache is left untouched if the exchange or the decode fails.
    pub async fn refresh(&self) -> Result<()> {
        let command = Command::query_zone(self.id);
        let mut exchange = self.exchange().await?;
        exchange.execute(&command).await?;
        let line = exchange.read_line().await?;

        let mut state = State::default();
        protocol::decode(&line, &mut state)?;

        // Still holding the channel, so no later exchange can land first.
        *self.cached() = state;
        self.publish(state);
        drop(exchange);
        Ok(())
    }

    // ========== Power and Mute ==========

    /// Turn the zone on or off
    ///
    /// # Example
    ///
    /// ```
    /// # use monoprice_amp::{mock::MockChannel, Amplifier, State};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let amp = Amplifier::new(MockChannel::simulated(1, State::default())).await?;
    /// let zone = amp.zone(1).ok_or("no zone 1")?;
    /// zone.set_power(true).await?;
    /// assert!(zone.state().is_on);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn set_power(&self, on: bool) -> Result<()> {
        self.set(ActionCode::Power, u8::from(on)).await
    }

    pub async fn set_mute(&self, on: bool) -> Result<()> {
        self.set(ActionCode::Mute, u8::from(on)).await
    }

    // ========== Levels ==========

    /// Set the volume, 0 to 38
    ///
    /// # Example
    ///
    /// ```
    /// # use monoprice_amp::{mock::MockChannel, Amplifier, State};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let amp = Amplifier::new(MockChannel::simulated(1, State::default())).await?;
    /// let zone = amp.zone(1).ok_or("no zone 1")?;
    /// zone.set_volume(20).await?;
    /// assert!(zone.set_volume(39).await.is_err());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn set_volume(&self, level: u8) -> Result<()> {
        check_range("volume", level, 0, 38)?;
        self.set(ActionCode::Volume, level).await
    }

    /// Set the treble, 0 to 14 with 7 as flat
    pub async fn set_treble(&self, level: u8) -> Result<()> {
        check_range("treble", level, 0, 14)?;
        self.set(ActionCode::Treble, level).await
    }

    /// Set the bass, 0 to 14 with 7 as flat
    pub async fn set_bass(&self, level: u8) -> Result<()> {
        check_range("bass", level, 0, 14)?;
        self.set(ActionCode::Bass, level).await
    }

    /// Set the left/right balance, 0 to 38
    pub async fn set_balance(&self, level: u8) -> Result<()> {
        check_range("balance", level, 0, 38)?;
        self.set(ActionCode::Balance, level).await
    }

    // ========== Input Selection ==========

    /// Select the source input, 1 to 6
    pub async fn set_source_channel(&self, channel: u8) -> Result<()> {
        check_range("source channel", channel, 1, 6)?;
        self.set(ActionCode::SourceChannel, channel).await
    }

    /// Send a control command and mirror the value into the cache.
    ///
    /// The cache holds what was commanded; the device is not read back.
    async fn set(&self, action: ActionCode, value: u8) -> Result<()> {
        let command = Command::control(self.id, action, value);
        let mut exchange = self.exchange().await?;
        exchange.execute(&command).await?;

        let state = {
            let mut state = self.cached();
            protocol::apply(&mut state, action, i32::from(value));
            *state
        };
        self.publish(state);
        drop(exchange);
        Ok(())
    }

    /// Lock the channel, refusing if the handle predates a reset
    async fn exchange(&self) -> Result<Exchange<'_>> {
        let exchange = self.link.lock().await;
        if self.is_stale() {
            return Err(AmpError::StaleZone(self.id));
        }
        Ok(exchange)
    }

    fn cached(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: State) {
        // No subscribers is fine
        let _ = self.updates.send(ZoneUpdate {
            zone: self.id,
            state,
        });
    }
}

impl std::fmt::Debug for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Zone")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("state", &self.state())
            .finish()
    }
}

fn check_range(field: &'static str, value: u8, min: u8, max: u8) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(AmpError::UnsupportedRange {
            field,
            value,
            min,
            max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ParseError, TransportError};
    use crate::mock::MockChannel;

    const FULL: &str = "#>1100010000120707070101\r\r\n";

    fn zone(mock: &MockChannel, state: State) -> Zone {
        let link = Arc::new(Link::new(1, Box::new(mock.clone())));
        let (updates, _) = broadcast::channel(16);
        Zone::new(link, 0, ControlId::new(1, 1), state, updates)
    }

    fn sample() -> State {
        State {
            is_on: true,
            volume: 12,
            treble: 7,
            bass: 7,
            balance: 7,
            source_channel: 1,
            is_keypad_connected: true,
            ..State::default()
        }
    }

    #[tokio::test]
    async fn refresh_full_status() {
        let mock = MockChannel::new();
        mock.expect("?11\r", &[FULL]);
        let zone = zone(&mock, State::default());

        zone.refresh().await.unwrap();
        assert_eq!(zone.state(), sample());
        assert_eq!(mock.pending_lines(), 0);
    }

    #[tokio::test]
    async fn refresh_single_field_starts_from_defaults() {
        let mock = MockChannel::new();
        mock.expect("?11\r", &["#>11VO14\r\r\n"]);
        let zone = zone(&mock, State::default());

        zone.refresh().await.unwrap();
        assert_eq!(
            zone.state(),
            State {
                volume: 14,
                ..State::default()
            }
        );
    }

    #[tokio::test]
    async fn refresh_bad_code_keeps_cache() {
        let mock = MockChannel::new();
        mock.expect("?11\r", &["#>11HI14\r\r\n"]);
        let zone = zone(&mock, sample());

        let err = zone.refresh().await.unwrap_err();
        assert!(matches!(err, AmpError::Parse(ParseError::InvalidCommandCode(_))));
        assert_eq!(zone.state(), sample());
    }

    #[tokio::test]
    async fn refresh_garbage_is_invalid_input() {
        let mock = MockChannel::new();
        mock.expect("?11\r", &["invalid data"]);
        let zone = zone(&mock, sample());

        let err = zone.refresh().await.unwrap_err();
        assert!(matches!(err, AmpError::Parse(ParseError::InvalidInput(_))));
        assert_eq!(zone.state(), sample());
    }

    #[tokio::test]
    async fn refresh_echo_failure_keeps_cache() {
        let mock = MockChannel::new();
        mock.expect_echo("?11\r", "#?12\r\n", &[FULL]);
        let zone = zone(&mock, State::default());

        let err = zone.refresh().await.unwrap_err();
        assert!(matches!(
            err,
            AmpError::Transport(TransportError::EchoMismatch { .. })
        ));
        assert_eq!(zone.state(), State::default());
    }

    #[tokio::test]
    async fn refresh_read_failure_keeps_cache() {
        let mock = MockChannel::new();
        mock.expect("?11\r", &[]);
        let zone = zone(&mock, sample());

        assert!(matches!(
            zone.refresh().await,
            Err(AmpError::Transport(TransportError::Io(_)))
        ));
        assert_eq!(zone.state(), sample());
    }

    #[tokio::test]
    async fn set_commands_and_cache() {
        let mock = MockChannel::new();
        for command in [
            "<11PR01\r",
            "<11MU01\r",
            "<11VO20\r",
            "<11TR03\r",
            "<11BS11\r",
            "<11BL25\r",
            "<11CH04\r",
        ] {
            mock.expect(command, &[]);
        }
        let zone = zone(&mock, State::default());

        zone.set_power(true).await.unwrap();
        zone.set_mute(true).await.unwrap();
        zone.set_volume(20).await.unwrap();
        zone.set_treble(3).await.unwrap();
        zone.set_bass(11).await.unwrap();
        zone.set_balance(25).await.unwrap();
        zone.set_source_channel(4).await.unwrap();

        assert_eq!(
            zone.state(),
            State {
                is_on: true,
                is_mute_on: true,
                volume: 20,
                treble: 3,
                bass: 11,
                balance: 25,
                source_channel: 4,
                ..State::default()
            }
        );
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn power_off_clears_flag() {
        let mock = MockChannel::new();
        mock.expect("<11PR00\r", &[]);
        let zone = zone(&mock, sample());

        zone.set_power(false).await.unwrap();
        assert!(!zone.state().is_on);
    }

    #[tokio::test]
    async fn out_of_range_sends_nothing() {
        let mock = MockChannel::new();
        let zone = zone(&mock, sample());

        assert!(matches!(
            zone.set_volume(39).await,
            Err(AmpError::UnsupportedRange { field: "volume", value: 39, .. })
        ));
        assert!(zone.set_treble(15).await.is_err());
        assert!(zone.set_bass(15).await.is_err());
        assert!(zone.set_balance(39).await.is_err());
        assert!(zone.set_source_channel(0).await.is_err());
        assert!(zone.set_source_channel(7).await.is_err());

        assert!(mock.sent().is_empty());
        assert_eq!(zone.state(), sample());
    }

    #[tokio::test]
    async fn range_edges_are_accepted() {
        let mock = MockChannel::simulated(1, State::default());
        let zone = zone(&mock, State::default());

        zone.set_volume(0).await.unwrap();
        zone.set_volume(38).await.unwrap();
        zone.set_treble(14).await.unwrap();
        zone.set_bass(0).await.unwrap();
        zone.set_balance(38).await.unwrap();
        zone.set_source_channel(1).await.unwrap();
        zone.set_source_channel(6).await.unwrap();

        assert_eq!(mock.zone_state(1).unwrap(), zone.state());
    }

    #[tokio::test]
    async fn failed_set_keeps_cache() {
        let mock = MockChannel::new();
        mock.expect_echo("<11VO20\r", "#<11VO2\r\n", &[]);
        let zone = zone(&mock, sample());

        assert!(matches!(
            zone.set_volume(20).await,
            Err(AmpError::Transport(TransportError::EchoLength { .. }))
        ));
        assert_eq!(zone.state().volume, 12);
    }

    #[tokio::test]
    async fn changes_are_published() {
        let mock = MockChannel::simulated(1, sample());
        let zone = zone(&mock, sample());
        let mut rx = zone.updates.subscribe();

        zone.set_bass(9).await.unwrap();
        let update = rx.recv().await.unwrap();
        assert_eq!(update.zone, ControlId::new(1, 1));
        assert_eq!(update.state.bass, 9);

        zone.refresh().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().state, mock.zone_state(1).unwrap());
    }

    #[tokio::test]
    async fn stale_handle_refuses_io() {
        let mock = MockChannel::simulated(1, sample());
        let zone = zone(&mock, sample());
        zone.link.invalidate();

        assert!(zone.is_stale());
        assert!(matches!(zone.refresh().await, Err(AmpError::StaleZone(_))));
        assert!(matches!(zone.set_volume(3).await, Err(AmpError::StaleZone(_))));
        assert!(mock.sent().is_empty());
        assert_eq!(zone.state(), sample());
    }

    #[tokio::test]
    async fn clones_share_cache() {
        let mock = MockChannel::simulated(1, sample());
        let zone = zone(&mock, sample());
        let other = zone.clone();

        zone.set_source_channel(5).await.unwrap();
        assert_eq!(other.state().source_channel, 5);
    }
}
