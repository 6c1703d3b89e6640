//! Classifier task: drain `qStream`, run the sliding-window FFT classifier,
//! apply the closed-loop therapy policy, and emit a CSV record per sample.

use super::task::{KillSwitch, TaskHandle, TaskOutcome};
use crate::classifier::Classifier;
use crate::constants::MIN_TIMEOUT;
use crate::csvlog::{RollingCsvLog, SampleRecord};
use crate::packet::Opcode;
use crate::queues::Queues;
use crate::session::SessionState;
use crate::window::SignalWindow;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

/// Spawn the Classifier task. `finish_work_on_kill`: drains `qStream` before
/// exiting.
pub fn spawn_classifier(
    queues: Arc<Queues>,
    session: Arc<SessionState>,
    csv_log: Arc<Mutex<RollingCsvLog>>,
    sample_rate: u32,
    prediction_capacity: usize,
) -> TaskHandle {
    let kill_switch = KillSwitch::new();
    let kill_for_thread = kill_switch.clone();

    let join = thread::Builder::new()
        .name("classifier".into())
        .spawn(move || run(queues, session, csv_log, sample_rate, prediction_capacity, kill_for_thread))
        .expect("failed to spawn classifier thread");

    TaskHandle::new("classifier", kill_switch, join)
}

fn run(
    queues: Arc<Queues>,
    session: Arc<SessionState>,
    csv_log: Arc<Mutex<RollingCsvLog>>,
    sample_rate: u32,
    prediction_capacity: usize,
    kill_switch: KillSwitch,
) -> TaskOutcome {
    let mut window = SignalWindow::new(sample_rate, prediction_capacity);
    let mut classifier = Classifier::new();

    loop {
        match queues.stream.try_pop() {
            Some(sample) => {
                process_sample(&mut window, &mut classifier, &sample, &session, &queues, &csv_log);
            }
            None => {
                if kill_switch.is_killed() {
                    while let Some(sample) = queues.stream.try_pop() {
                        process_sample(&mut window, &mut classifier, &sample, &session, &queues, &csv_log);
                    }
                    return TaskOutcome::Killed;
                }
                thread::sleep(MIN_TIMEOUT);
            }
        }
    }
}

fn process_sample(
    window: &mut SignalWindow,
    classifier: &mut Classifier,
    sample: &crate::packet::StreamSample,
    session: &SessionState,
    queues: &Queues,
    csv_log: &Mutex<RollingCsvLog>,
) {
    window.add(sample.microvolts);

    let mut seizure_detected = false;
    if window.predict_ready() {
        if let Some((_, positive)) = classifier.predict(window) {
            seizure_detected = positive;
            window.push_prediction(if positive { 1 } else { -1 });
        }
    }

    let confidence = window.confidence();
    let is_stimming = session.is_stimming();

    if seizure_detected && confidence > 0.0 && !is_stimming {
        start_therapy(session, queues);
    } else if !seizure_detected && confidence < 0.0 && is_stimming {
        stop_therapy(session, queues);
    }

    let host_timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let record = SampleRecord {
        host_timestamp_ms,
        device_timestamp: sample.timestamp,
        microvolts: sample.microvolts,
        seizure_detected,
        therapy_on: session.is_stimming(),
    };
    if let Err(e) = csv_log.lock().unwrap_or_else(|e| e.into_inner()).append(record) {
        log::warn!("classifier: failed to append csv record: {e}");
    }
}

fn start_therapy(session: &SessionState, queues: &Queues) {
    if session.try_set_start_stim_sent() {
        queues.commands.try_push(Opcode::StartStim);
    }
}

fn stop_therapy(session: &SessionState, queues: &Queues) {
    if session.try_set_stop_stim_sent() {
        queues.commands.try_push(Opcode::StopStim);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::test_signal;
    use crate::constants::{DEFAULT_PREDICTION_CAPACITY, DEFAULT_SAMPLE_RATE};
    use crate::packet::StreamSample;
    use std::time::Duration;

    fn setup() -> (Arc<Queues>, Arc<SessionState>, Arc<Mutex<RollingCsvLog>>) {
        let queues = Arc::new(Queues::new());
        let session = Arc::new(SessionState::new());
        let csv = Arc::new(Mutex::new(RollingCsvLog::new(
            std::env::temp_dir().join("neurolink-classifier-test"),
            false,
        )));
        (queues, session, csv)
    }

    #[test]
    fn s4_closed_loop_positive_classification_enqueues_start_stim() {
        let (queues, session, csv) = setup();
        let handle = spawn_classifier(
            Arc::clone(&queues),
            Arc::clone(&session),
            csv,
            DEFAULT_SAMPLE_RATE,
            DEFAULT_PREDICTION_CAPACITY,
        );

        for (i, v) in test_signal().into_iter().enumerate() {
            queues.stream.try_push(StreamSample {
                timestamp: i as u32,
                raw: 0,
                microvolts: v,
            });
        }
        thread::sleep(Duration::from_millis(300));

        handle.kill();
        handle.join_timeout(Duration::from_secs(2));

        let mut saw_start_stim = false;
        while let Some(op) = queues.commands.try_pop() {
            if op == Opcode::StartStim {
                saw_start_stim = true;
            }
        }
        assert!(saw_start_stim, "positive classification should enqueue StartStim");
    }

    #[test]
    fn window_size_invariant_holds_under_sustained_feed() {
        let (queues, session, csv) = setup();
        let handle = spawn_classifier(
            Arc::clone(&queues),
            session,
            csv,
            DEFAULT_SAMPLE_RATE,
            DEFAULT_PREDICTION_CAPACITY,
        );

        for i in 0..500u32 {
            queues.stream.try_push(StreamSample {
                timestamp: i,
                raw: 0,
                microvolts: 0.0,
            });
        }
        thread::sleep(Duration::from_millis(400));
        handle.kill();
        handle.join_timeout(Duration::from_secs(2));
    }
}
