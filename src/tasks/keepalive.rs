//! Keepalive: periodically emit a watchdog packet, correlate the echo.

use super::task::{KillSwitch, TaskHandle, TaskOutcome};
use crate::constants::MAX_TIMEOUT;
use crate::packet::{Opcode, Packet, PacketIdCounter};
use crate::port::LinkHandle;
use crate::queues::Queues;
use std::sync::Arc;
use std::thread;

/// Spawn the Keepalive task.
pub fn spawn_keepalive(link: LinkHandle, queues: Arc<Queues>, packet_ids: PacketIdCounter) -> TaskHandle {
    let kill_switch = KillSwitch::new();
    let kill_for_thread = kill_switch.clone();

    let join = thread::Builder::new()
        .name("keepalive".into())
        .spawn(move || run(link, queues, packet_ids, kill_for_thread))
        .expect("failed to spawn keepalive thread");

    TaskHandle::new("keepalive", kill_switch, join)
}

fn run(link: LinkHandle, queues: Arc<Queues>, packet_ids: PacketIdCounter, kill_switch: KillSwitch) -> TaskOutcome {
    let mut outstanding_id: Option<u8> = None;

    loop {
        if let Some(expected) = outstanding_id {
            if let Some(response) = queues.keepalive.try_pop() {
                if response.packet_id != expected {
                    log::warn!(
                        "keepalive: id mismatch, expected {expected} got {}",
                        response.packet_id
                    );
                }
                outstanding_id = None;
            } else {
                log::warn!("keepalive: missed response for id {expected}, retrying");
            }
        }

        if kill_switch.is_killed() {
            return TaskOutcome::Killed;
        }

        let id = packet_ids.next();
        let packet = Packet::transaction(id, Opcode::Keepalive);
        if let Err(e) = link.write_all(&packet.to_bytes()) {
            log::error!("keepalive: write failed: {e}");
            return TaskOutcome::Error;
        }
        outstanding_id = Some(id);

        thread::sleep(MAX_TIMEOUT);
    }
}
