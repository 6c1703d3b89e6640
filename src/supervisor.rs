//! Supervisor: owns the link, the six tasks, and the lifecycle state machine
//! (`Created → Opened → Connected → Running → {Restart|Stopping} → ...`).
//!
//! Grounded on the teacher's `broker/connection.rs` connect-with-retry loop,
//! generalized from a single persistent connection to "try every candidate
//! port, handshake each, keep the first that answers."

use crate::config::Config;
use crate::constants::{
    HANDSHAKE_ATTEMPTS, HANDSHAKE_BACKOFF, KILL_TIMEOUT, MIN_TIMEOUT, RECONNECT_QUIESCENCE,
};
use crate::csvlog::RollingCsvLog;
use crate::error::{Error, Result};
use crate::events::{ClientEvent, Subscribers};
use crate::framing::PacketFactory;
use crate::packet::{Opcode, Packet, PacketIdCounter};
use crate::port::{LinkHandle, SerialPortLink};
use crate::queues::Queues;
use crate::session::{SessionState, Status};
use crate::tasks::{
    spawn_classifier, spawn_commander, spawn_keepalive, spawn_listener, spawn_notifier,
    spawn_sorter, TaskHandle,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Opens and maintains the serial link, owns every task, and exposes the
/// public start/stop/streaming/therapy surface.
pub struct Supervisor {
    config: Config,
    session: Arc<SessionState>,
    queues: Arc<Queues>,
    subscribers: Arc<Subscribers>,
    packet_ids: PacketIdCounter,
    csv_log: Arc<Mutex<RollingCsvLog>>,
    tasks: Mutex<Vec<TaskHandle>>,
    monitor_kill: Arc<AtomicBool>,
    monitor: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Supervisor {
    /// Build a Supervisor in the `Created` state. Nothing is opened yet.
    #[must_use]
    pub fn new(config: Config) -> Arc<Self> {
        let csv_log = RollingCsvLog::new(config.log_dir.clone(), config.debug_log);
        Arc::new(Self {
            config,
            session: Arc::new(SessionState::new()),
            queues: Arc::new(Queues::new()),
            subscribers: Arc::new(Subscribers::new()),
            packet_ids: PacketIdCounter::new(),
            csv_log: Arc::new(Mutex::new(csv_log)),
            tasks: Mutex::new(Vec::new()),
            monitor_kill: Arc::new(AtomicBool::new(false)),
            monitor: Mutex::new(None),
        })
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.session.status()
    }

    /// Register a callback for every future [`ClientEvent`].
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback);
    }

    /// Open a port, complete the handshake, spawn every task, and arm the
    /// watchdog that reconnects on a fatal task exit.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        self.session.set_status(Status::Opened);
        let link = self.connect()?;
        self.session.set_status(Status::Connected);
        self.spawn_tasks(link);
        self.session.set_status(Status::Running);
        self.resume_streaming_if_requested();
        self.arm_monitor();
        Ok(())
    }

    /// Enumerate candidate ports (or use the configured one) and keep the
    /// first that completes the handshake.
    fn connect(&self) -> Result<LinkHandle> {
        let candidates = match &self.config.serial_port {
            Some(path) => vec![path.clone()],
            None => SerialPortLink::available_ports()?,
        };

        for path in candidates {
            match SerialPortLink::open(&path) {
                Ok(port) => {
                    let link = LinkHandle::new(Box::new(port));
                    if let Err(e) = link.discard_buffers() {
                        log::warn!("supervisor: failed to discard buffers on {path}: {e}");
                    }
                    if self.send_connect(&link).is_ok() {
                        log::info!("supervisor: handshake succeeded on {path}");
                        return Ok(link);
                    }
                    log::warn!("supervisor: handshake failed on {path}");
                }
                Err(e) => log::warn!("supervisor: could not open {path}: {e}"),
            }
        }

        Err(Error::NoPortAvailable)
    }

    /// Send the `Initial` handshake up to [`HANDSHAKE_ATTEMPTS`] times,
    /// waiting for a byte-exact echo of the locally serialized packet
    /// (including `packetID`, so a stale echo from a prior attempt is
    /// rejected).
    fn send_connect(&self, link: &LinkHandle) -> Result<()> {
        for attempt in 1..=HANDSHAKE_ATTEMPTS {
            let id = self.packet_ids.next();
            let packet = Packet::transaction(id, Opcode::Initial);
            let sent_bytes = packet.to_bytes();
            link.write_all(&sent_bytes)?;

            if let Some(reply) = read_one_packet(link, HANDSHAKE_BACKOFF) {
                if reply.to_bytes() == sent_bytes {
                    return Ok(());
                }
                log::warn!(
                    "supervisor: handshake attempt {attempt}/{HANDSHAKE_ATTEMPTS} echo mismatch"
                );
            } else {
                log::warn!(
                    "supervisor: handshake attempt {attempt}/{HANDSHAKE_ATTEMPTS} unanswered"
                );
            }
            thread::sleep(HANDSHAKE_BACKOFF);
        }
        Err(Error::Timeout)
    }

    /// If the user previously requested streaming, re-enqueue `StartStream`
    /// now that the link is (re)connected.
    fn resume_streaming_if_requested(&self) {
        if self.session.user_streaming() && self.session.try_set_start_stream_sent() {
            self.queues.commands.try_push(Opcode::StartStream);
        }
    }

    /// Spawn all six pipeline tasks against the given link.
    fn spawn_tasks(&self, link: LinkHandle) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.clear();
        tasks.push(spawn_listener(link.clone(), Arc::clone(&self.queues)));
        tasks.push(spawn_sorter(Arc::clone(&self.queues), Arc::clone(&self.session)));
        tasks.push(spawn_keepalive(
            link.clone(),
            Arc::clone(&self.queues),
            self.packet_ids.clone(),
        ));
        tasks.push(spawn_commander(
            link,
            Arc::clone(&self.queues),
            Arc::clone(&self.session),
            self.packet_ids.clone(),
            Arc::clone(&self.csv_log),
        ));
        tasks.push(spawn_classifier(
            Arc::clone(&self.queues),
            Arc::clone(&self.session),
            Arc::clone(&self.csv_log),
            self.config.sample_rate,
            self.config.prediction_capacity,
        ));
        tasks.push(spawn_notifier(Arc::clone(&self.queues), Arc::clone(&self.subscribers)));
    }

    /// Arm the background watchdog that notices a task exiting and reconnects.
    fn arm_monitor(self: &Arc<Self>) {
        self.monitor_kill.store(false, Ordering::Release);
        let sup = Arc::clone(self);
        let kill = Arc::clone(&self.monitor_kill);
        let handle = thread::Builder::new()
            .name("supervisor-monitor".into())
            .spawn(move || {
                while !kill.load(Ordering::Acquire) {
                    thread::sleep(MIN_TIMEOUT);
                    if sup.session.status() != Status::Running {
                        continue;
                    }
                    let any_finished = {
                        let tasks = sup.tasks.lock().unwrap_or_else(|e| e.into_inner());
                        tasks.iter().any(TaskHandle::is_finished)
                    };
                    if any_finished {
                        log::warn!("supervisor: a task exited, reconnecting");
                        if let Err(e) = sup.reconnect() {
                            log::error!("supervisor: reconnect failed: {e}");
                            sup.session.set_status(Status::Error);
                        }
                    }
                }
            })
            .expect("failed to spawn supervisor monitor thread");
        *self.monitor.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Drain and kill every task, wait out the device quiescence window, then
    /// re-handshake and respawn.
    fn reconnect(self: &Arc<Self>) -> Result<()> {
        self.session.set_status(Status::Restart);
        self.kill_tasks();
        self.queues.clear_all();
        self.session.reset_for_reconnect();

        thread::sleep(RECONNECT_QUIESCENCE);

        let link = self.connect()?;
        self.session.set_status(Status::Connected);
        self.spawn_tasks(link);
        self.session.set_status(Status::Running);
        self.resume_streaming_if_requested();
        Ok(())
    }

    fn kill_tasks(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for task in tasks.iter() {
            task.kill();
        }
        for task in tasks.drain(..) {
            let name = task.name();
            match task.join_timeout(KILL_TIMEOUT) {
                Some(outcome) => log::debug!("supervisor: task '{name}' exited: {outcome:?}"),
                None => log::warn!(
                    "supervisor: task '{name}' did not exit within {KILL_TIMEOUT:?}, giving up"
                ),
            }
        }
    }

    /// Stop every task and mark the session `Stopping`, then `Created`.
    pub fn stop(&self) {
        self.session.set_status(Status::Stopping);
        self.monitor_kill.store(true, Ordering::Release);
        if let Some(handle) = self.monitor.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
        self.kill_tasks();
        self.csv_log.lock().unwrap_or_else(|e| e.into_inner()).close();
        self.session.set_status(Status::Created);
    }

    /// Request the stream be started. Idempotent: refused if already in flight.
    pub fn start_streaming(&self) {
        self.session.set_user_streaming(true);
        if self.session.try_set_start_stream_sent() {
            self.queues.commands.try_push(Opcode::StartStream);
        }
    }

    /// Request the stream be stopped.
    pub fn stop_streaming(&self) {
        self.session.set_user_streaming(false);
        if self.session.try_set_stop_stream_sent() {
            self.queues.commands.try_push(Opcode::StopStream);
        }
    }

    /// Request therapy be started.
    pub fn start_therapy(&self) {
        if self.session.try_set_start_stim_sent() {
            self.queues.commands.try_push(Opcode::StartStim);
        }
    }

    /// Request therapy be stopped.
    pub fn stop_therapy(&self) {
        if self.session.try_set_stop_stim_sent() {
            self.queues.commands.try_push(Opcode::StopStim);
        }
    }

    /// Whether the device has acknowledged a stream start.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.session.is_streaming()
    }

    /// Whether the device has acknowledged a therapy start.
    #[must_use]
    pub fn is_stimming(&self) -> bool {
        self.session.is_stimming()
    }
}

/// Feed bytes from `link` into a fresh [`PacketFactory`] until it completes a
/// packet or `deadline` elapses.
fn read_one_packet(link: &LinkHandle, deadline: Duration) -> Option<Packet> {
    let mut factory = PacketFactory::new();
    let start = Instant::now();
    while start.elapsed() < deadline {
        match link.read_byte() {
            Ok(Some(byte)) => {
                if factory.push_byte(byte) {
                    return factory.take();
                }
                if factory.is_failed() {
                    factory = PacketFactory::new();
                }
            }
            Ok(None) => thread::sleep(MIN_TIMEOUT),
            Err(_) => return None,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::LoopbackPort;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.log_dir = dir.to_path_buf();
        config.serial_port = Some("loopback".into());
        config
    }

    /// S1: a device that echoes the Initial opcode back completes the
    /// handshake and reaches `Running`.
    #[test]
    fn handshake_failure_surfaces_when_no_port_answers() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let sup = Supervisor::new(config);
        // No real port named "loopback" exists; connect() must fail cleanly
        // rather than panic, since SerialPortLink::open will error.
        let result = sup.connect();
        assert!(result.is_err());
    }

    #[test]
    fn stop_without_start_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let sup = Supervisor::new(config);
        sup.stop();
        assert_eq!(sup.status(), Status::Created);
    }

    #[test]
    fn read_one_packet_decodes_from_loopback() {
        let mut port = LoopbackPort::new();
        port.push_inbound(&Packet::transaction(3, Opcode::Initial).to_bytes());
        let link = LinkHandle::new(Box::new(port));
        let packet = read_one_packet(&link, Duration::from_millis(500));
        assert_eq!(packet.unwrap().opcode(), Some(Opcode::Initial));
    }

    #[test]
    fn read_one_packet_times_out_on_silence() {
        let port = LoopbackPort::new();
        let link = LinkHandle::new(Box::new(port));
        let packet = read_one_packet(&link, Duration::from_millis(50));
        assert!(packet.is_none());
    }

    #[test]
    fn start_streaming_sets_user_streaming_and_enqueues_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let sup = Supervisor::new(config);
        sup.start_streaming();
        assert!(sup.session.user_streaming());
        assert_eq!(sup.queues.commands.try_pop(), Some(Opcode::StartStream));
        assert_eq!(sup.queues.commands.try_pop(), None);
    }
}
