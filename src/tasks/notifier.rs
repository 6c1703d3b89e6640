//! Notifier: drain `qClientEvents`, decode packets into [`ClientEvent`]s,
//! fan them out to registered subscribers.

use super::task::{KillSwitch, TaskHandle, TaskOutcome};
use crate::constants::MIN_TIMEOUT;
use crate::events::{ClientEvent, Subscribers};
use crate::packet::{ErrorKind, Opcode, Packet, PacketType, StreamSample};
use crate::queues::Queues;
use std::sync::Arc;
use std::thread;

/// Spawn the Notifier task. `finish_work_on_kill`: drains `qClientEvents`
/// before exiting so subscribers see every event up to the shutdown point.
pub fn spawn_notifier(queues: Arc<Queues>, subscribers: Arc<Subscribers>) -> TaskHandle {
    let kill_switch = KillSwitch::new();
    let kill_for_thread = kill_switch.clone();

    let join = thread::Builder::new()
        .name("notifier".into())
        .spawn(move || run(queues, subscribers, kill_for_thread))
        .expect("failed to spawn notifier thread");

    TaskHandle::new("notifier", kill_switch, join)
}

fn run(queues: Arc<Queues>, subscribers: Arc<Subscribers>, kill_switch: KillSwitch) -> TaskOutcome {
    loop {
        match queues.client_events.try_pop() {
            Some(packet) => dispatch(&packet, &subscribers),
            None => {
                if kill_switch.is_killed() {
                    while let Some(packet) = queues.client_events.try_pop() {
                        dispatch(&packet, &subscribers);
                    }
                    return TaskOutcome::Killed;
                }
                thread::sleep(MIN_TIMEOUT);
            }
        }
    }
}

fn dispatch(packet: &Packet, subscribers: &Subscribers) {
    match packet.packet_type {
        PacketType::Stream => {
            if let Some(sample) = StreamSample::decode(&packet.payload) {
                subscribers.notify(&ClientEvent::StreamData(sample));
            }
        }
        PacketType::Transaction => {
            let event = match packet.opcode() {
                Some(Opcode::StartStream) => Some(ClientEvent::StreamStarted),
                Some(Opcode::StopStream) => Some(ClientEvent::StreamStopped),
                Some(Opcode::StartStim) => Some(ClientEvent::TherapyStarted),
                Some(Opcode::StopStim) => Some(ClientEvent::TherapyStopped),
                _ => None,
            };
            if let Some(event) = event {
                subscribers.notify(&event);
            }
        }
        PacketType::Failure => {
            if packet.error_kind() == Some(ErrorKind::AlreadyConnected) {
                // Advisory only; Sorter already reset the sent flags.
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn stream_packet_notifies_stream_data() {
        let queues = Arc::new(Queues::new());
        let subscribers = Arc::new(Subscribers::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        subscribers.subscribe(move |event| {
            if event.is_stream_data() {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        let handle = spawn_notifier(Arc::clone(&queues), Arc::clone(&subscribers));
        queues
            .client_events
            .try_push(Packet::new(PacketType::Stream, 0, vec![0, 0, 0, 0, 0, 0]));
        thread::sleep(Duration::from_millis(60));
        handle.kill();
        handle.join_timeout(Duration::from_secs(2));

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn start_stream_ack_notifies_stream_started() {
        let queues = Arc::new(Queues::new());
        let subscribers = Arc::new(Subscribers::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        subscribers.subscribe(move |event| {
            if event.is_stream_lifecycle() {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        let handle = spawn_notifier(Arc::clone(&queues), Arc::clone(&subscribers));
        queues
            .client_events
            .try_push(Packet::transaction(1, Opcode::StartStream));
        thread::sleep(Duration::from_millis(60));
        handle.kill();
        handle.join_timeout(Duration::from_secs(2));

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drains_remaining_events_on_kill() {
        let queues = Arc::new(Queues::new());
        let subscribers = Arc::new(Subscribers::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        subscribers.subscribe(move |_event| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        for i in 0..5u8 {
            queues
                .client_events
                .try_push(Packet::transaction(i, Opcode::StartStim));
        }
        let handle = spawn_notifier(Arc::clone(&queues), subscribers);
        handle.kill();
        handle.join_timeout(Duration::from_secs(2));

        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }
}
