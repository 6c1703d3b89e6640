//! Sorter: drain `qAll`, classify by packet type, route to sub-queues.
//!
//! Grounded on the teacher's `hub/workers.rs` poll-and-route worker shape,
//! generalized from polling one queue to classifying and fanning out across
//! six.

use super::task::{KillSwitch, TaskHandle, TaskOutcome};
use crate::constants::{MIN_TIMEOUT, RECONNECT_TIMEOUT};
use crate::packet::{Opcode, Packet, PacketType, StreamSample};
use crate::queues::Queues;
use crate::session::SessionState;
use std::sync::Arc;
use std::thread;

/// Spawn the Sorter task. `finish_work_on_kill`: on kill, the Sorter drains
/// whatever remains in `qAll` before exiting.
pub fn spawn_sorter(queues: Arc<Queues>, session: Arc<SessionState>) -> TaskHandle {
    let kill_switch = KillSwitch::new();
    let kill_for_thread = kill_switch.clone();

    let join = thread::Builder::new()
        .name("sorter".into())
        .spawn(move || run(queues, session, kill_for_thread))
        .expect("failed to spawn sorter thread");

    TaskHandle::new("sorter", kill_switch, join)
}

fn run(queues: Arc<Queues>, session: Arc<SessionState>, kill_switch: KillSwitch) -> TaskOutcome {
    let mut reconnect_attempts: u32 = 0;

    loop {
        match queues.all.try_pop() {
            Some(packet) => {
                if let Some(outcome) = route(&packet, &queues, &session, &mut reconnect_attempts) {
                    return outcome;
                }
            }
            None => {
                if kill_switch.is_killed() {
                    // Finish-work-on-kill: drain what's left, then exit.
                    while let Some(packet) = queues.all.try_pop() {
                        route(&packet, &queues, &session, &mut reconnect_attempts);
                    }
                    return TaskOutcome::Killed;
                }
                thread::sleep(MIN_TIMEOUT);
            }
        }
    }
}

fn route(
    packet: &Packet,
    queues: &Queues,
    session: &SessionState,
    reconnect_attempts: &mut u32,
) -> Option<TaskOutcome> {
    match packet.packet_type {
        PacketType::Failure => {
            let Some(kind) = packet.error_kind() else {
                log::warn!("sorter: unrecognized failure payload");
                return None;
            };
            if kind.is_fatal() {
                log::error!("sorter: fatal device error {kind:?}");
                return Some(TaskOutcome::Error);
            }
            if kind == crate::packet::ErrorKind::NotConnected {
                queues.commands.try_push(Opcode::Initial);
                *reconnect_attempts += 1;
                if *reconnect_attempts >= RECONNECT_TIMEOUT {
                    log::error!("sorter: {RECONNECT_TIMEOUT} consecutive NotConnected responses");
                    return Some(TaskOutcome::Error);
                }
                return None;
            }
            if kind.is_advisory() {
                session.reset_sent_flags();
                return None;
            }
            log::info!("sorter: non-fatal device error {kind:?}");
            None
        }
        PacketType::Transaction => {
            if let Some(opcode) = packet.opcode() {
                if opcode == Opcode::Keepalive {
                    queues.keepalive.try_push(packet.clone());
                } else {
                    queues.cmd_resp.try_push(packet.clone());
                    queues.client_events.try_push(packet.clone());
                }
            }
            None
        }
        PacketType::Stream => {
            match StreamSample::decode(&packet.payload) {
                Some(sample) => {
                    queues.stream.try_push(sample);
                }
                None => log::warn!("sorter: malformed stream payload, dropping"),
            }
            queues.client_events.try_push(packet.clone());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::ErrorKind;
    use std::time::Duration;

    fn push_and_wait(queues: &Queues, packet: Packet) {
        queues.all.try_push(packet);
        thread::sleep(Duration::from_millis(30));
    }

    #[test]
    fn keepalive_routes_to_keepalive_queue() {
        let queues = Arc::new(Queues::new());
        let session = Arc::new(SessionState::new());
        let handle = spawn_sorter(Arc::clone(&queues), session);

        push_and_wait(&queues, Packet::transaction(5, Opcode::Keepalive));
        handle.kill();
        handle.join_timeout(Duration::from_secs(2));

        assert!(queues.keepalive.try_pop().is_some());
        assert!(queues.cmd_resp.try_pop().is_none());
    }

    #[test]
    fn start_stream_ack_routes_to_cmd_resp_and_client_events() {
        let queues = Arc::new(Queues::new());
        let session = Arc::new(SessionState::new());
        let handle = spawn_sorter(Arc::clone(&queues), session);

        push_and_wait(&queues, Packet::transaction(1, Opcode::StartStream));
        handle.kill();
        handle.join_timeout(Duration::from_secs(2));

        assert!(queues.cmd_resp.try_pop().is_some());
        assert!(queues.client_events.try_pop().is_some());
    }

    #[test]
    fn stream_packet_decodes_and_routes_to_stream_queue() {
        let queues = Arc::new(Queues::new());
        let session = Arc::new(SessionState::new());
        let handle = spawn_sorter(Arc::clone(&queues), session);

        let packet = Packet::new(PacketType::Stream, 9, vec![0, 0, 0, 0, 0, 0]);
        push_and_wait(&queues, packet);
        handle.kill();
        handle.join_timeout(Duration::from_secs(2));

        let sample = queues.stream.try_pop().expect("sample should decode");
        assert_eq!(sample.timestamp, 0);
    }

    #[test]
    fn advisory_error_resets_sent_flags_without_escalating() {
        let queues = Arc::new(Queues::new());
        let session = Arc::new(SessionState::new());
        session.try_set_start_stream_sent();
        let handle = spawn_sorter(Arc::clone(&queues), Arc::clone(&session));

        push_and_wait(
            &queues,
            Packet::new(PacketType::Failure, 0, vec![ErrorKind::AlreadyStreaming as u8]),
        );
        handle.kill();
        let outcome = handle.join_timeout(Duration::from_secs(2));

        assert_eq!(outcome, Some(TaskOutcome::Killed));
        assert!(session.try_set_start_stream_sent(), "flag should have been reset");
    }

    #[test]
    fn fatal_error_escalates_to_error_outcome() {
        let queues = Arc::new(Queues::new());
        let session = Arc::new(SessionState::new());
        let handle = spawn_sorter(Arc::clone(&queues), session);

        push_and_wait(
            &queues,
            Packet::new(PacketType::Failure, 0, vec![ErrorKind::BadChecksum as u8]),
        );
        let outcome = handle.join_timeout(Duration::from_secs(2));
        assert_eq!(outcome, Some(TaskOutcome::Error));
    }

    #[test]
    fn not_connected_escalates_after_reconnect_timeout() {
        let queues = Arc::new(Queues::new());
        let session = Arc::new(SessionState::new());
        let handle = spawn_sorter(Arc::clone(&queues), session);

        for _ in 0..RECONNECT_TIMEOUT {
            queues.all.try_push(Packet::new(
                PacketType::Failure,
                0,
                vec![ErrorKind::NotConnected as u8],
            ));
        }
        let outcome = handle.join_timeout(Duration::from_secs(2));
        assert_eq!(outcome, Some(TaskOutcome::Error));
    }
}
