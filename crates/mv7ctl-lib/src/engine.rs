//! Device engine: owns the transport and the state cache, runs the startup
//! handshake and the background listener, and exposes typed getters and
//! setters with clamping and wire encoding.
//!
//! Concurrency model: one listener thread per engine does all the reading;
//! callers write through the setters, which serialize on the state lock and
//! the transport's write lock. The cache is the only structure touched by
//! both sides and every mutation happens under one mutex, so a reader never
//! observes a half-updated combined field.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, mpsc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::device::{DeviceError, Result};
use crate::modeswitch::ModeSwitch;
use crate::properties::{
    CompressorState, DistanceState, Mode, PROPERTIES, PropertyDescriptor, PropertyId,
    PropertyValue, ToneState, combine_auto_level,
};
use crate::protocol::{self, ParsedMessage};
use crate::state::MicState;
use crate::transport::Transport;

// ── Events ──

/// Engine notifications, delivered through [`Microphone::subscribe`] channels.
/// Consumers drain their receiver on their own schedule; nothing is invoked
/// on the listener thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MicEvent {
    /// Every property has a cached value. Fires exactly once per engine.
    Initialized,
    /// A cached property changed, from the wire or from a local write.
    PropertyChanged(PropertyId),
    /// The startup handshake did not complete within the configured bound.
    Unresponsive,
    /// The transport failed fatally and the listener has exited.
    ConnectionLost(String),
}

// ── Options ──

/// Tunable engine timings.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Listener poll interval; also bounds how fast stop requests are seen.
    pub read_timeout: Duration,
    /// Wait after a batch of fetch requests before draining replies.
    pub settle_delay: Duration,
    /// Bound on the startup handshake. `None` waits for the device forever,
    /// matching the device's hang-until-present semantics.
    pub handshake_timeout: Option<Duration>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            read_timeout: Duration::from_millis(200),
            settle_delay: Duration::from_millis(500),
            handshake_timeout: None,
        }
    }
}

// ── Engine ──

struct EngineState {
    cache: MicState,
    mode_switch: ModeSwitch,
    initialized: bool,
    subscribers: Vec<mpsc::Sender<MicEvent>>,
}

struct Shared {
    transport: Arc<dyn Transport>,
    state: Mutex<EngineState>,
    stop: AtomicBool,
    options: EngineOptions,
}

/// A connected MV7 microphone.
///
/// Construct with an open transport, call [`initialize`](Self::initialize)
/// to start the listener, then use the getters and setters. [`close`]
/// (Self::close) (or drop) stops the listener and releases the device.
pub struct Microphone {
    shared: Arc<Shared>,
    listener: Option<JoinHandle<()>>,
}

impl Microphone {
    pub fn new(transport: impl Transport + 'static, options: EngineOptions) -> Self {
        Microphone {
            shared: Arc::new(Shared {
                transport: Arc::new(transport),
                state: Mutex::new(EngineState {
                    cache: MicState::default(),
                    mode_switch: ModeSwitch::default(),
                    initialized: false,
                    subscribers: Vec::new(),
                }),
                stop: AtomicBool::new(false),
                options,
            }),
            listener: None,
        }
    }

    /// Register an event receiver. Subscribe before [`initialize`]
    /// (Self::initialize) to observe the `Initialized` event.
    pub fn subscribe(&self) -> mpsc::Receiver<MicEvent> {
        let (tx, rx) = mpsc::channel();
        self.state().subscribers.push(tx);
        rx
    }

    /// Start the background listener: handshake, initial fetch, steady
    /// state. Safe to call once; later calls are no-ops.
    pub fn initialize(&mut self) -> Result<()> {
        if self.listener.is_some() {
            return Ok(());
        }
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("mv7-listener".into())
            .spawn(move || listener_run(&shared))
            .map_err(|e| DeviceError::OpenFailed(format!("listener thread: {e}")))?;
        self.listener = Some(handle);
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether the initial fetch has completed.
    pub fn is_initialized(&self) -> bool {
        self.state().initialized
    }

    /// Snapshot of the full cache. The `mode` field carries the public view,
    /// i.e. `Loading` while a switch or re-fetch is in flight.
    pub fn snapshot(&self) -> MicState {
        let st = self.state();
        let mut cache = st.cache.clone();
        if st.mode_switch.is_loading() {
            cache.mode = Some(Mode::Loading);
        }
        cache
    }

    /// Public mode view: `Loading` while a switch or re-fetch is in flight,
    /// otherwise the cached value.
    pub fn mode(&self) -> Option<Mode> {
        let st = self.state();
        if st.mode_switch.is_loading() {
            Some(Mode::Loading)
        } else {
            st.cache.mode
        }
    }

    /// Ask the device to flash its LEDs.
    pub fn identify(&self) -> Result<()> {
        self.shared.transport.send(protocol::CMD_IDENTIFY)
    }

    // ── Setters ──
    //
    // Every setter clamps, no-ops when the cache already matches, applies
    // the optimistic local update and builds the command under the state
    // lock, then sends after unlocking. Acknowledgement, if any, arrives
    // asynchronously through the listener like any other update.

    pub fn set_lock(&self, value: bool) -> Result<()> {
        self.set_switch(PropertyId::Lock, "lock", value)
    }

    pub fn set_monitor_mute(&self, value: bool) -> Result<()> {
        self.set_switch(PropertyId::MonitorMute, "audioMute", value)
    }

    pub fn set_input_mute(&self, value: bool) -> Result<()> {
        self.set_switch(PropertyId::InputMute, "micMute", value)
    }

    fn set_switch(&self, id: PropertyId, name: &str, value: bool) -> Result<()> {
        let command = {
            let mut st = self.state();
            if !st.cache.apply(id, PropertyValue::Switch(value)) {
                return Ok(());
            }
            emit(&mut st, MicEvent::PropertyChanged(id));
            protocol::toggle_command(name, value)
        };
        self.shared.transport.send(&command)
    }

    /// Headphone volume in centi-dB, clamped to -2400..=0.
    pub fn set_monitor_volume(&self, centi_db: i32) -> Result<()> {
        self.set_volume(
            PropertyId::MonitorVolume,
            "volume",
            centi_db.clamp(protocol::MONITOR_VOLUME_MIN, protocol::MONITOR_VOLUME_MAX),
        )
    }

    /// Microphone gain in centi-dB, clamped to 0..=3600.
    pub fn set_input_volume(&self, centi_db: i32) -> Result<()> {
        self.set_volume(
            PropertyId::InputVolume,
            "inputGain",
            centi_db.clamp(protocol::INPUT_VOLUME_MIN, protocol::INPUT_VOLUME_MAX),
        )
    }

    fn set_volume(&self, id: PropertyId, name: &str, value: i32) -> Result<()> {
        let command = {
            let mut st = self.state();
            if !st.cache.apply(id, PropertyValue::Volume(value)) {
                return Ok(());
            }
            emit(&mut st, MicEvent::PropertyChanged(id));
            format!("{name} {}", protocol::encode_centi_db(value))
        };
        self.shared.transport.send(&command)
    }

    /// Mic contribution of the monitor mix. The whole combined block is
    /// re-sent from both cached halves.
    pub fn set_monitor_mix_mic(&self, raw: u32) -> Result<()> {
        let value = raw.clamp(protocol::MONITOR_MIX_MIC_MIN, protocol::MONITOR_MIX_MIC_MAX);
        let command = {
            let mut st = self.state();
            if !st.cache.apply(PropertyId::MonitorMixMic, PropertyValue::Level(value)) {
                return Ok(());
            }
            emit(&mut st, MicEvent::PropertyChanged(PropertyId::MonitorMixMic));
            let pc = st.cache.monitor_mix_pc.unwrap_or(protocol::MONITOR_MIX_PC_MIN);
            protocol::set_block_mix(pc, value)
        };
        self.shared.transport.send(&command)
    }

    /// Pc contribution of the monitor mix (high word of the combined block).
    pub fn set_monitor_mix_pc(&self, raw: u32) -> Result<()> {
        let value = raw.clamp(protocol::MONITOR_MIX_PC_MIN, protocol::MONITOR_MIX_PC_MAX);
        let command = {
            let mut st = self.state();
            if !st.cache.apply(PropertyId::MonitorMixPc, PropertyValue::Level(value)) {
                return Ok(());
            }
            emit(&mut st, MicEvent::PropertyChanged(PropertyId::MonitorMixPc));
            let mic = st.cache.monitor_mix_mic.unwrap_or(protocol::MONITOR_MIX_MIC_MIN);
            protocol::set_block_mix(value, mic)
        };
        self.shared.transport.send(&command)
    }

    pub fn set_compressor(&self, value: CompressorState) -> Result<()> {
        let command = {
            let mut st = self.state();
            if !st.cache.apply(PropertyId::Compressor, PropertyValue::Compressor(value)) {
                return Ok(());
            }
            emit(&mut st, MicEvent::PropertyChanged(PropertyId::Compressor));
            protocol::set_block_decimal(protocol::BLOCK_COMPRESSOR, value.code())
        };
        self.shared.transport.send(&command)
    }

    pub fn set_limiter(&self, value: bool) -> Result<()> {
        let command = {
            let mut st = self.state();
            if !st.cache.apply(PropertyId::Limiter, PropertyValue::Switch(value)) {
                return Ok(());
            }
            emit(&mut st, MicEvent::PropertyChanged(PropertyId::Limiter));
            protocol::set_block_decimal(protocol::BLOCK_LIMITER, u32::from(value))
        };
        self.shared.transport.send(&command)
    }

    pub fn set_high_pass_filter(&self, value: bool) -> Result<()> {
        self.set_equalizer_flag(PropertyId::HighPassFilter, value)
    }

    pub fn set_presence_filter(&self, value: bool) -> Result<()> {
        self.set_equalizer_flag(PropertyId::PresenceFilter, value)
    }

    /// The equalizer block packs both flags into one byte; a change to
    /// either recomputes the whole byte from the cached pair.
    fn set_equalizer_flag(&self, id: PropertyId, value: bool) -> Result<()> {
        let command = {
            let mut st = self.state();
            if !st.cache.apply(id, PropertyValue::Switch(value)) {
                return Ok(());
            }
            emit(&mut st, MicEvent::PropertyChanged(id));
            let high_pass = st.cache.high_pass_filter.unwrap_or(false);
            let presence = st.cache.presence_filter.unwrap_or(false);
            protocol::set_block_decimal(
                protocol::BLOCK_EQUALIZER,
                protocol::encode_equalizer(high_pass, presence),
            )
        };
        self.shared.transport.send(&command)
    }

    pub fn set_auto_distance(&self, value: DistanceState) -> Result<()> {
        let command = {
            let mut st = self.state();
            if !st.cache.apply(PropertyId::AutoDistance, PropertyValue::Distance(value)) {
                return Ok(());
            }
            emit(&mut st, MicEvent::PropertyChanged(PropertyId::AutoDistance));
            Self::auto_level_command(&st.cache)
        };
        self.shared.transport.send(&command)
    }

    pub fn set_auto_tone(&self, value: ToneState) -> Result<()> {
        let command = {
            let mut st = self.state();
            if !st.cache.apply(PropertyId::AutoTone, PropertyValue::Tone(value)) {
                return Ok(());
            }
            emit(&mut st, MicEvent::PropertyChanged(PropertyId::AutoTone));
            Self::auto_level_command(&st.cache)
        };
        self.shared.transport.send(&command)
    }

    fn auto_level_command(cache: &MicState) -> String {
        let distance = cache.auto_distance.unwrap_or(DistanceState::Off);
        let tone = cache.auto_tone.unwrap_or(ToneState::Off);
        protocol::set_block_decimal(
            protocol::BLOCK_AUTO_LEVEL,
            combine_auto_level(distance, tone),
        )
    }

    /// Request a DSP mode switch. The public mode view reports `Loading`
    /// until the device confirms the switch and the mode-dependent
    /// properties have been re-fetched; a single mode-changed notification
    /// fires at that point.
    pub fn set_mode(&self, target: Mode) -> Result<()> {
        let Some(code) = target.code() else {
            log::debug!("ignoring request to set the synthetic loading mode");
            return Ok(());
        };
        let command = {
            let mut st = self.state();
            if st.cache.mode == Some(target) {
                return Ok(());
            }
            st.mode_switch.request();
            st.cache.mode = Some(target);
            format!("dspMode {code}")
        };
        self.shared.transport.send(&command)
    }

    /// Stop the listener and release the device.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.listener.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Listener ──

fn emit(st: &mut EngineState, event: MicEvent) {
    st.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
}

fn lock(shared: &Shared) -> MutexGuard<'_, EngineState> {
    shared.state.lock().unwrap_or_else(|e| e.into_inner())
}

fn stopped(shared: &Shared) -> bool {
    shared.stop.load(Ordering::SeqCst)
}

fn fail_connection(shared: &Shared, err: DeviceError) {
    log::error!("transport failure: {err}");
    let mut st = lock(shared);
    emit(&mut st, MicEvent::ConnectionLost(err.to_string()));
}

fn listener_run(shared: &Shared) {
    if !handshake(shared) {
        return;
    }
    if !initial_fetch(shared) {
        return;
    }
    {
        let mut st = lock(shared);
        st.initialized = true;
        emit(&mut st, MicEvent::Initialized);
    }
    steady_loop(shared);
}

/// Run the privilege-elevation and DSP-boot exchanges.
/// Returns false when the listener must exit (stop, timeout, transport failure).
fn handshake(shared: &Shared) -> bool {
    let deadline = shared
        .options
        .handshake_timeout
        .map(|bound| Instant::now() + bound);
    await_ack(shared, protocol::CMD_ELEVATE, protocol::ACK_ELEVATE, deadline)
        && await_ack(shared, protocol::CMD_BOOT_DSP, protocol::ACK_BOOT_DSP, deadline)
}

fn await_ack(shared: &Shared, command: &str, ack: &str, deadline: Option<Instant>) -> bool {
    if let Err(e) = shared.transport.send(command) {
        fail_connection(shared, e);
        return false;
    }
    loop {
        if stopped(shared) {
            return false;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::warn!("device did not acknowledge `{command}` in time");
            let mut st = lock(shared);
            emit(&mut st, MicEvent::Unresponsive);
            return false;
        }
        match shared.transport.receive(Some(shared.options.read_timeout)) {
            // Anything else on the wire before the ack is expected chatter.
            Ok(Some(message)) if message.trim_end() == ack => return true,
            Ok(_) => {}
            Err(e) => {
                fail_connection(shared, e);
                return false;
            }
        }
    }
}

/// Deduplicated fetch commands for cache-missing descriptors passing `filter`,
/// in table order.
fn pending_fetches(cache: &MicState, filter: impl Fn(&PropertyDescriptor) -> bool) -> Vec<&'static str> {
    let mut commands: Vec<&'static str> = Vec::new();
    for descriptor in &PROPERTIES {
        if cache.get(descriptor.id).is_none()
            && filter(descriptor)
            && !commands.contains(&descriptor.fetch_command)
        {
            commands.push(descriptor.fetch_command);
        }
    }
    commands
}

/// Fetch every property the cache is missing. Mode-dependent descriptors
/// are held back until the mode itself is known, so the fetch proceeds in
/// two waves.
fn initial_fetch(shared: &Shared) -> bool {
    loop {
        if stopped(shared) {
            return false;
        }
        let commands = {
            let st = lock(shared);
            let mode_known = st.cache.mode.is_some();
            pending_fetches(&st.cache, |d| mode_known || !d.id.is_mode_dependent())
        };
        if commands.is_empty() {
            return true;
        }
        if !request_and_drain(shared, &commands) {
            return false;
        }
    }
}

/// Send a batch of fetch commands, give the device time to answer, then
/// drain and dispatch every reply already waiting.
fn request_and_drain(shared: &Shared, commands: &[&str]) -> bool {
    for command in commands {
        if let Err(e) = shared.transport.send(command) {
            fail_connection(shared, e);
            return false;
        }
    }
    if !settle(shared) {
        return false;
    }
    loop {
        if stopped(shared) {
            return false;
        }
        match shared.transport.receive(Some(shared.options.read_timeout)) {
            Ok(Some(message)) => dispatch(shared, &message),
            Ok(None) => return true,
            Err(e) => {
                fail_connection(shared, e);
                return false;
            }
        }
    }
}

/// Sleep for the settle delay in stop-aware slices.
fn settle(shared: &Shared) -> bool {
    let deadline = Instant::now() + shared.options.settle_delay;
    loop {
        if stopped(shared) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(shared.options.read_timeout));
    }
}

fn steady_loop(shared: &Shared) {
    while !stopped(shared) {
        match shared.transport.receive(Some(shared.options.read_timeout)) {
            Ok(Some(message)) => dispatch(shared, &message),
            Ok(None) => {}
            Err(e) => {
                fail_connection(shared, e);
                return;
            }
        }
        let refetching = lock(shared).mode_switch.is_refetching();
        if refetching && !refetch_mode_dependent(shared) {
            return;
        }
    }
}

/// Re-fetch the properties evicted by a mode switch, then report the mode
/// as settled.
fn refetch_mode_dependent(shared: &Shared) -> bool {
    loop {
        if stopped(shared) {
            return false;
        }
        let commands = {
            let st = lock(shared);
            pending_fetches(&st.cache, |d| d.id.is_mode_dependent())
        };
        if commands.is_empty() {
            break;
        }
        if !request_and_drain(shared, &commands) {
            return false;
        }
    }
    let mut st = lock(shared);
    st.mode_switch.on_refetch_complete();
    // The mode's availability changed even when its value did not.
    emit(&mut st, MicEvent::PropertyChanged(PropertyId::Mode));
    true
}

/// Apply one inbound message to the cache.
fn dispatch(shared: &Shared, message: &str) {
    let Some(ParsedMessage { key, value }) = protocol::parse_message(message) else {
        log::debug!("ignoring message {message:?}");
        return;
    };
    let mut st = lock(shared);
    let mut events = Vec::new();
    for descriptor in PROPERTIES.iter().filter(|d| d.reply_key == key) {
        let parsed = match (descriptor.parse)(value) {
            Ok(parsed) => parsed,
            Err(reason) => {
                log::warn!("dropping `{key}` reply: {reason}");
                continue;
            }
        };
        if descriptor.id == PropertyId::Mode {
            handle_mode_reply(&mut st, &parsed, &mut events);
        } else if st.cache.apply(descriptor.id, parsed) {
            events.push(MicEvent::PropertyChanged(descriptor.id));
        }
    }
    for event in events {
        emit(&mut st, event);
    }
}

/// A mode value arrived from the device. Confirming a pending switch, or a
/// device-initiated change of a known mode, evicts the mode-dependent cache
/// entries; the listener then re-fetches them before the mode settles.
fn handle_mode_reply(st: &mut EngineState, parsed: &PropertyValue, events: &mut Vec<MicEvent>) {
    let PropertyValue::Mode(mode) = parsed else {
        return;
    };
    let previous = st.cache.mode;
    let confirmed_switch = st.mode_switch.on_mode_reply();
    let device_initiated =
        !confirmed_switch && previous.is_some() && previous != Some(*mode);
    st.cache.mode = Some(*mode);
    if confirmed_switch || device_initiated {
        if device_initiated {
            st.mode_switch.begin_refetch();
        }
        for id in PropertyId::ALL {
            if id.is_mode_dependent() {
                st.cache.clear(id);
            }
        }
    } else if previous.is_none() {
        // First fetch: a plain cache fill, no eviction.
        events.push(MicEvent::PropertyChanged(PropertyId::Mode));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{self, MockHandle};

    fn test_options() -> EngineOptions {
        EngineOptions {
            read_timeout: Duration::from_millis(10),
            settle_delay: Duration::from_millis(5),
            handshake_timeout: Some(Duration::from_secs(2)),
        }
    }

    /// Responder simulating a healthy device with fixed initial state.
    fn device_responder(command: &str) -> Vec<String> {
        let reply = match command {
            "su adm" => "su=adm\n",
            "bootDSP C" => "dspBooted\n",
            "dspMode" => "dspMode=0\n",
            "pkgVersion" => "pkgVersion=1.2.3\n",
            "fwVersion" => "fwVersion=1.1.88\n",
            "dspVersion" => "dspVersion=2.0\n",
            "serialNum" => "serialNum=MV7-00031337\n",
            "lock" => "lock=off\n",
            "audioMute" => "audioMute=off\n",
            "volume" => "volume=-12.00dB\n",
            "micMute" => "micMute=off\n",
            "inputGain" => "inputGain=18.00dB\n",
            "getBlock 22" => "block 22 002026F3000020C5\n",
            "getBlock 19" => "block 19 00000002\n",
            "getBlock 1F" => "block 1F 00000001\n",
            "getBlock 31" => "block 31 00000003\n",
            "getBlock 34" => "block 34 00000005\n",
            _ => {
                // Mode switches are echoed; block writes are acked through
                // the same block key, like the real device.
                if let Some(code) = command.strip_prefix("dspMode ") {
                    return vec![format!("dspMode={code}\n")];
                }
                if let Some(rest) = command.strip_prefix("setBlock ") {
                    return vec![format!("block {rest}\n")];
                }
                return Vec::new();
            }
        };
        vec![reply.to_string()]
    }

    fn wait_until(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        predicate()
    }

    /// Engine wired to the standard responder, fully initialized.
    fn initialized_engine() -> (Microphone, MockHandle, mpsc::Receiver<MicEvent>) {
        let (transport, handle) = mock::pair();
        handle.set_responder(device_responder);
        let mut mic = Microphone::new(transport, test_options());
        let events = mic.subscribe();
        mic.initialize().unwrap();
        assert!(
            wait_until(Duration::from_secs(5), || mic.is_initialized()),
            "engine should initialize against the mock device"
        );
        (mic, handle, events)
    }

    fn drain(events: &mpsc::Receiver<MicEvent>) -> Vec<MicEvent> {
        events.try_iter().collect()
    }

    // ── initialization ──

    #[test]
    fn initialization_populates_cache_and_fires_once() {
        let (mic, handle, events) = initialized_engine();
        let snapshot = mic.snapshot();
        assert!(snapshot.is_complete());
        assert_eq!(snapshot.mode, Some(Mode::Manual));
        assert_eq!(snapshot.monitor_volume, Some(-1200));
        assert_eq!(snapshot.monitor_mix_pc, Some(0x0020_26F3));
        assert_eq!(snapshot.monitor_mix_mic, Some(0x20C5));
        assert_eq!(snapshot.compressor, Some(CompressorState::Medium));
        assert_eq!(snapshot.limiter, Some(true));
        assert_eq!(snapshot.high_pass_filter, Some(true));
        assert_eq!(snapshot.presence_filter, Some(true));
        assert_eq!(snapshot.auto_distance, Some(DistanceState::Far));
        assert_eq!(snapshot.auto_tone, Some(ToneState::Dark));

        let received = drain(&events);
        assert_eq!(
            received
                .iter()
                .filter(|e| **e == MicEvent::Initialized)
                .count(),
            1
        );

        // Handshake ordering: elevate, then boot, then fetches.
        let sent = handle.sent();
        assert_eq!(sent[0], "su adm");
        assert_eq!(sent[1], "bootDSP C");

        // No property was requested twice, and shared fetch commands were
        // deduplicated within each wave.
        for command in ["dspMode", "pkgVersion", "getBlock 22", "getBlock 31", "getBlock 34"] {
            assert_eq!(handle.sent_count(command), 1, "{command} requested once");
        }
    }

    #[test]
    fn mode_dependent_fetches_wait_for_mode() {
        let (transport, handle) = mock::pair();
        // Answer everything except the mode query.
        handle.set_responder(|command| {
            if command == "dspMode" {
                Vec::new()
            } else {
                device_responder(command)
            }
        });
        let mut mic = Microphone::new(transport, test_options());
        mic.initialize().unwrap();

        assert!(wait_until(Duration::from_secs(2), || {
            handle.sent_count("dspMode") >= 1
        }));
        thread::sleep(Duration::from_millis(100));
        assert_eq!(
            handle.sent_count("getBlock 19"),
            0,
            "mode-dependent fetch must wait for the mode"
        );
        assert!(!mic.is_initialized());

        handle.push_message("dspMode=1\n");
        assert!(wait_until(Duration::from_secs(5), || mic.is_initialized()));
        assert_eq!(mic.mode(), Some(Mode::Auto));
        assert!(handle.sent_count("getBlock 19") >= 1);
        mic.close();
    }

    #[test]
    fn handshake_timeout_reports_unresponsive() {
        let (transport, _handle) = mock::pair();
        let mut mic = Microphone::new(
            transport,
            EngineOptions {
                handshake_timeout: Some(Duration::from_millis(50)),
                ..test_options()
            },
        );
        let events = mic.subscribe();
        mic.initialize().unwrap();
        let got = events.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got, MicEvent::Unresponsive);
        assert!(!mic.is_initialized());
    }

    // ── setters ──

    #[test]
    fn setters_are_idempotent_against_fetched_values() {
        let (mic, handle, _events) = initialized_engine();
        handle.clear_sent();

        // Every value below matches what the responder reported at startup.
        mic.set_lock(false).unwrap();
        mic.set_monitor_mute(false).unwrap();
        mic.set_monitor_volume(-1200).unwrap();
        mic.set_input_mute(false).unwrap();
        mic.set_input_volume(1800).unwrap();
        mic.set_monitor_mix_pc(0x0020_26F3).unwrap();
        mic.set_monitor_mix_mic(0x20C5).unwrap();
        mic.set_compressor(CompressorState::Medium).unwrap();
        mic.set_limiter(true).unwrap();
        mic.set_high_pass_filter(true).unwrap();
        mic.set_presence_filter(true).unwrap();
        mic.set_auto_distance(DistanceState::Far).unwrap();
        mic.set_auto_tone(ToneState::Dark).unwrap();
        mic.set_mode(Mode::Manual).unwrap();

        assert!(
            handle.sent().is_empty(),
            "unchanged values must not be re-sent, got {:?}",
            handle.sent()
        );
    }

    #[test]
    fn volume_setter_clamps_and_encodes() {
        let (mic, handle, _events) = initialized_engine();
        handle.clear_sent();

        mic.set_monitor_volume(500).unwrap();
        assert_eq!(handle.sent(), vec!["volume 0.00"]);
        assert_eq!(mic.snapshot().monitor_volume, Some(0));

        handle.clear_sent();
        mic.set_input_volume(99_999).unwrap();
        assert_eq!(handle.sent(), vec!["inputGain 36.00"]);
        assert_eq!(mic.snapshot().input_volume, Some(3600));
    }

    #[test]
    fn toggle_setter_sends_on_off() {
        let (mic, handle, _events) = initialized_engine();
        handle.clear_sent();
        mic.set_input_mute(true).unwrap();
        assert_eq!(handle.sent(), vec!["micMute on"]);
    }

    #[test]
    fn monitor_mix_round_trip_is_order_independent() {
        let (mic, handle, _events) = initialized_engine();
        handle.clear_sent();

        mic.set_monitor_mix_mic(0x3000).unwrap();
        assert_eq!(handle.sent(), vec!["setBlock 22 002026F300003000"]);
        assert_eq!(mic.snapshot().monitor_mix_mic, Some(0x3000));

        handle.clear_sent();
        mic.set_monitor_mix_pc(0x21AA).unwrap();
        // Low 8 hex digits still carry the mic value set above.
        assert_eq!(handle.sent(), vec!["setBlock 22 000021AA00003000"]);
        assert_eq!(mic.snapshot().monitor_mix_pc, Some(0x21AA));
        assert_eq!(mic.snapshot().monitor_mix_mic, Some(0x3000));
    }

    #[test]
    fn monitor_mix_clamps_each_half() {
        let (mic, handle, _events) = initialized_engine();
        handle.clear_sent();
        mic.set_monitor_mix_mic(0xFFFF_FFFF).unwrap();
        assert_eq!(mic.snapshot().monitor_mix_mic, Some(protocol::MONITOR_MIX_MIC_MAX));
        mic.set_monitor_mix_pc(0).unwrap();
        assert_eq!(mic.snapshot().monitor_mix_pc, Some(protocol::MONITOR_MIX_PC_MIN));
    }

    #[test]
    fn equalizer_write_recomputes_whole_byte() {
        let (mic, handle, _events) = initialized_engine();
        handle.clear_sent();
        // Both flags start on (block 31 = 3); dropping high-pass leaves
        // only the presence bit.
        mic.set_high_pass_filter(false).unwrap();
        assert_eq!(handle.sent(), vec!["setBlock 31 00000002"]);
    }

    #[test]
    fn auto_level_write_combines_and_collapses() {
        let (mic, handle, _events) = initialized_engine();
        handle.clear_sent();

        // Startup state is (Far, Dark) = 5; switching distance to Close
        // re-encodes with the cached tone.
        mic.set_auto_distance(DistanceState::Close).unwrap();
        assert_eq!(handle.sent(), vec!["setBlock 34 00000002"]);

        handle.clear_sent();
        mic.set_auto_tone(ToneState::Off).unwrap();
        assert_eq!(handle.sent(), vec!["setBlock 34 00000000"]);
    }

    #[test]
    fn setter_send_failure_surfaces_to_caller() {
        let (mic, handle, _events) = initialized_engine();
        handle.fail_next_send("unplugged");
        let err = mic.set_lock(true).unwrap_err();
        assert!(matches!(err, DeviceError::WriteFailed(_)));
    }

    // ── mode switch ──

    #[test]
    fn mode_switch_reports_loading_then_settles_with_one_event() {
        let (transport, handle) = mock::pair();
        // Like the standard device, but the mode-switch echo is withheld so
        // the test controls when the switch is confirmed.
        handle.set_responder(|command| {
            if command.starts_with("dspMode ") {
                Vec::new()
            } else {
                device_responder(command)
            }
        });
        let mut mic = Microphone::new(transport, test_options());
        let events = mic.subscribe();
        mic.initialize().unwrap();
        assert!(wait_until(Duration::from_secs(5), || mic.is_initialized()));
        drain(&events);
        handle.clear_sent();

        mic.set_mode(Mode::Auto).unwrap();
        assert_eq!(handle.sent(), vec!["dspMode 1"]);
        assert_eq!(mic.mode(), Some(Mode::Loading));
        assert_eq!(mic.snapshot().mode, Some(Mode::Loading));

        // Still loading until the device confirms: no echo, no eviction.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(mic.mode(), Some(Mode::Loading));
        assert_eq!(handle.sent_count("getBlock 19"), 0);

        handle.push_message("dspMode=1\n");
        assert!(wait_until(Duration::from_secs(5), || {
            mic.mode() == Some(Mode::Auto)
        }));
        assert!(
            handle.sent_count("getBlock 19") >= 1,
            "mode-dependent properties must be re-fetched"
        );

        let mode_changes = drain(&events)
            .into_iter()
            .filter(|e| *e == MicEvent::PropertyChanged(PropertyId::Mode))
            .count();
        assert_eq!(mode_changes, 1, "exactly one mode notification at settle");
    }

    #[test]
    fn set_mode_loading_is_ignored() {
        let (mic, handle, _events) = initialized_engine();
        handle.clear_sent();
        mic.set_mode(Mode::Loading).unwrap();
        assert!(handle.sent().is_empty());
        assert_eq!(mic.mode(), Some(Mode::Manual));
    }

    #[test]
    fn device_initiated_mode_switch_evicts_and_refetches() {
        let (mic, handle, events) = initialized_engine();
        drain(&events);
        handle.clear_sent();

        // The device flips itself to auto with no local write pending.
        handle.push_message("dspMode=1\n");
        assert!(wait_until(Duration::from_secs(5), || {
            mic.mode() == Some(Mode::Auto)
        }));
        assert!(handle.sent_count("getBlock 19") >= 1, "should re-fetch");
        let mode_changes = drain(&events)
            .into_iter()
            .filter(|e| *e == MicEvent::PropertyChanged(PropertyId::Mode))
            .count();
        assert_eq!(mode_changes, 1);
    }

    // ── dispatch robustness ──

    #[test]
    fn not_valid_block_reply_is_dropped() {
        let (mic, handle, _events) = initialized_engine();
        handle.push_message("block 19 Not valid\n");
        thread::sleep(Duration::from_millis(50));
        assert_eq!(mic.snapshot().compressor, Some(CompressorState::Medium));

        // Listener is still alive and dispatching.
        handle.push_message("block 19 00000003\n");
        assert!(wait_until(Duration::from_secs(2), || {
            mic.snapshot().compressor == Some(CompressorState::Heavy)
        }));
    }

    #[test]
    fn unparseable_reply_is_dropped_without_crashing() {
        let (mic, handle, _events) = initialized_engine();
        handle.push_message("block 19 GARBAGE\n");
        handle.push_message("volume=not-a-number\n");
        thread::sleep(Duration::from_millis(50));
        assert_eq!(mic.snapshot().compressor, Some(CompressorState::Medium));
        assert_eq!(mic.snapshot().monitor_volume, Some(-1200));

        handle.push_message("volume=-6.00dB\n");
        assert!(wait_until(Duration::from_secs(2), || {
            mic.snapshot().monitor_volume == Some(-600)
        }));
    }

    #[test]
    fn unsolicited_update_notifies_subscribers() {
        let (mic, handle, events) = initialized_engine();
        drain(&events);
        handle.push_message("audioMute=on\n");
        assert!(wait_until(Duration::from_secs(2), || {
            mic.snapshot().monitor_mute == Some(true)
        }));
        assert!(
            drain(&events).contains(&MicEvent::PropertyChanged(PropertyId::MonitorMute))
        );
    }

    // ── shutdown ──

    #[test]
    fn close_mid_fetch_stops_listener_and_drops_transport() {
        let (transport, handle) = mock::pair();
        // Handshake succeeds but no fetch is ever answered, so the listener
        // sits in the fetch loop forever.
        handle.set_responder(|command| match command {
            "su adm" => vec!["su=adm\n".to_string()],
            "bootDSP C" => vec!["dspBooted\n".to_string()],
            _ => Vec::new(),
        });
        let mut mic = Microphone::new(transport, test_options());
        mic.initialize().unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            handle.sent_count("pkgVersion") >= 1
        }));

        mic.close();
        assert!(
            !handle.transport_alive(),
            "closing the engine must release the transport"
        );
    }

    #[test]
    fn initialize_twice_is_a_no_op() {
        let (mic, handle, _events) = initialized_engine();
        let mut mic = mic;
        let before = handle.sent_count("su adm");
        mic.initialize().unwrap();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(handle.sent_count("su adm"), before);
    }
}
