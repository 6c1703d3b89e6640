//! Listener: byte-by-byte read, feed the [`PacketFactory`], enqueue to `qAll`.
//!
//! Grounded on sds011's `read_thread` blocking-read loop
//! (`other_examples/407d1af9_timothyb89-sds011__src-lib.rs.rs`).

use super::task::{KillSwitch, TaskHandle, TaskOutcome};
use crate::constants::{MIN_TIMEOUT, TIMEOUT_TIMEOUT};
use crate::framing::PacketFactory;
use crate::port::LinkHandle;
use crate::queues::Queues;
use std::sync::Arc;
use std::thread;

/// Spawn the Listener task.
pub fn spawn_listener(link: LinkHandle, queues: Arc<Queues>) -> TaskHandle {
    let kill_switch = KillSwitch::new();
    let kill_for_thread = kill_switch.clone();

    let join = thread::Builder::new()
        .name("listener".into())
        .spawn(move || run(link, queues, kill_for_thread))
        .expect("failed to spawn listener thread");

    TaskHandle::new("listener", kill_switch, join)
}

fn run(link: LinkHandle, queues: Arc<Queues>, kill_switch: KillSwitch) -> TaskOutcome {
    let mut factory = PacketFactory::new();
    let mut consecutive_timeouts: u32 = 0;

    loop {
        if kill_switch.is_killed() {
            return TaskOutcome::Killed;
        }

        match link.read_byte() {
            Ok(Some(byte)) => {
                if factory.push_byte(byte) {
                    if let Some(packet) = std::mem::replace(&mut factory, PacketFactory::new()).take() {
                        if !queues.all.try_push(packet) {
                            log::warn!("listener: qAll full, dropping packet");
                        }
                        consecutive_timeouts = 0;
                    }
                } else if factory.is_failed() {
                    consecutive_timeouts += 1;
                    log::warn!(
                        "listener: framing timeout ({}/{})",
                        consecutive_timeouts,
                        TIMEOUT_TIMEOUT
                    );
                    factory = PacketFactory::new();
                    if consecutive_timeouts >= TIMEOUT_TIMEOUT {
                        return TaskOutcome::Timeout;
                    }
                }
            }
            Ok(None) => {
                thread::sleep(MIN_TIMEOUT);
            }
            Err(e) => {
                log::error!("listener: read error: {e}");
                return TaskOutcome::Error;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Opcode, Packet};
    use crate::port::LoopbackPort;
    use std::time::Duration;

    #[test]
    fn decodes_and_enqueues_a_clean_packet_then_exits_on_kill() {
        let mut port = LoopbackPort::new();
        port.push_inbound(&Packet::transaction(0, Opcode::Initial).to_bytes());
        let link = LinkHandle::new(Box::new(port));
        let queues = Arc::new(Queues::new());

        let handle = spawn_listener(link, Arc::clone(&queues));

        // Give the listener a moment to drain the loopback buffer.
        thread::sleep(Duration::from_millis(50));
        handle.kill();
        let outcome = handle.join_timeout(Duration::from_secs(2));
        assert_eq!(outcome, Some(TaskOutcome::Killed));

        let packet = queues.all.try_pop().expect("packet should have been enqueued");
        assert_eq!(packet.opcode(), Some(Opcode::Initial));
    }

    #[test]
    fn resyncs_past_garbage_bytes() {
        let mut port = LoopbackPort::new();
        port.push_inbound(&[0xFF, 0xFF]);
        port.push_inbound(&Packet::new(crate::packet::PacketType::Stream, 1, vec![0; 6]).to_bytes());
        let link = LinkHandle::new(Box::new(port));
        let queues = Arc::new(Queues::new());

        let handle = spawn_listener(link, Arc::clone(&queues));
        thread::sleep(Duration::from_millis(50));
        handle.kill();
        handle.join_timeout(Duration::from_secs(2));

        let packet = queues.all.try_pop().expect("packet should survive resync");
        assert_eq!(packet.packet_type, crate::packet::PacketType::Stream);
    }
}
