//! Commander: drain the user/classifier command queue, send one command at a
//! time, correlate the response, apply session-state side effects.

use super::task::{KillSwitch, TaskHandle, TaskOutcome};
use crate::constants::MIN_TIMEOUT;
use crate::csvlog::RollingCsvLog;
use crate::packet::{Opcode, Packet, PacketIdCounter};
use crate::port::LinkHandle;
use crate::queues::Queues;
use crate::session::SessionState;
use std::sync::{Arc, Mutex};
use std::thread;

/// Spawn the Commander task. At most one command is in flight globally.
pub fn spawn_commander(
    link: LinkHandle,
    queues: Arc<Queues>,
    session: Arc<SessionState>,
    packet_ids: PacketIdCounter,
    csv_log: Arc<Mutex<RollingCsvLog>>,
) -> TaskHandle {
    let kill_switch = KillSwitch::new();
    let kill_for_thread = kill_switch.clone();

    let join = thread::Builder::new()
        .name("commander".into())
        .spawn(move || run(link, queues, session, packet_ids, csv_log, kill_for_thread))
        .expect("failed to spawn commander thread");

    TaskHandle::new("commander", kill_switch, join)
}

struct Tracking {
    id: u8,
    op: Opcode,
}

fn run(
    link: LinkHandle,
    queues: Arc<Queues>,
    session: Arc<SessionState>,
    packet_ids: PacketIdCounter,
    csv_log: Arc<Mutex<RollingCsvLog>>,
    kill_switch: KillSwitch,
) -> TaskOutcome {
    let mut tracking: Option<Tracking> = None;
    let mut last_returned = true;

    loop {
        if kill_switch.is_killed() {
            return TaskOutcome::Killed;
        }

        if let Some(op) = queues.commands.try_pop() {
            let is_duplicate = tracking
                .as_ref()
                .is_some_and(|t| op != Opcode::Initial && t.op == op);
            if is_duplicate {
                log::info!("commander: duplicate {op:?} suppressed");
                tracking = None;
            } else if !last_returned {
                log::warn!("commander: command in flight, please wait");
                // Put it back for the next cycle rather than dropping it.
                queues.commands.try_push(op);
            } else {
                let id = packet_ids.next();
                let packet = Packet::transaction(id, op);
                if let Err(e) = link.write_all(&packet.to_bytes()) {
                    log::error!("commander: write failed: {e}");
                    return TaskOutcome::Error;
                }
                tracking = Some(Tracking { id, op });
                last_returned = false;
            }
        }

        thread::sleep(MIN_TIMEOUT);

        if let Some(response) = queues.cmd_resp.try_pop() {
            if let Some(t) = tracking.as_ref() {
                if response.packet_id != t.id {
                    log::warn!(
                        "commander: response id mismatch, expected {} got {}",
                        t.id,
                        response.packet_id
                    );
                }
            }
            last_returned = true;
            if let Some(op) = response.opcode() {
                apply_ack(op, &session, &csv_log, &queues);
            }
            tracking = None;
        }
    }
}

fn apply_ack(op: Opcode, session: &SessionState, csv_log: &Mutex<RollingCsvLog>, queues: &Queues) {
    match op {
        Opcode::StartStream => {
            session.ack_start_stream();
            if let Err(e) = csv_log.lock().unwrap_or_else(|e| e.into_inner()).open() {
                log::error!("commander: failed to open csv log: {e}");
            }
        }
        Opcode::StopStream => {
            session.ack_stop_stream();
            csv_log.lock().unwrap_or_else(|e| e.into_inner()).close();
        }
        Opcode::StartStim => session.ack_start_stim(),
        Opcode::StopStim => session.ack_stop_stim(),
        Opcode::Initial => {
            if session.user_streaming() {
                queues.commands.try_push(Opcode::StartStream);
            }
        }
        Opcode::Keepalive => {}
    }
}
