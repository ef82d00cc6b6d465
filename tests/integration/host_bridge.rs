//! The JSON line bridge driven over in-memory pipes.

use crate::helpers::{date, utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tickler::TaskTracker;
use tickler::clock::ManualClock;
use tickler::host::contract::{EVENT_PERMISSION_REQUESTED, EVENT_REMINDER_FIRED, EVENT_TASK_CHANGED};
use tickler::host::{
    EventEnvelope, HostNotificationSink, ResponseEnvelope, TrackerCommandHandler, run_bridge,
};
use tickler::notify::SilentCue;
use tickler::scheduler::{ReminderScheduler, SchedulerSettings};
use tickler::tasks::{MemoryTaskStore, Task};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

struct Bridge {
    input: DuplexStream,
    output: Lines<BufReader<DuplexStream>>,
    tracker: tickler::SharedTracker,
    stop: CancellationToken,
    handle: tokio::task::JoinHandle<tickler::Result<()>>,
}

fn start(tasks: Vec<Task>, clock: Arc<ManualClock>) -> Bridge {
    let (event_tx, _) = broadcast::channel::<EventEnvelope>(64);
    let sink = Arc::new(HostNotificationSink::new(event_tx.clone()));
    let scheduler =
        ReminderScheduler::new(SchedulerSettings::default(), sink.clone(), Arc::new(SilentCue));
    let store = MemoryTaskStore::new().with_tasks("host", tasks);
    let tracker = TaskTracker::open("host", Box::new(store), scheduler, clock).unwrap();
    let tracker = Arc::new(Mutex::new(tracker));

    let stop = CancellationToken::new();
    let handler = TrackerCommandHandler::new(Arc::clone(&tracker), sink, stop.clone());

    let (input, bridge_in) = tokio::io::duplex(64 * 1024);
    let (bridge_out, output) = tokio::io::duplex(64 * 1024);
    let handle = tokio::spawn(run_bridge(
        handler,
        event_tx,
        BufReader::new(bridge_in),
        bridge_out,
    ));

    Bridge {
        input,
        output: BufReader::new(output).lines(),
        tracker,
        stop,
        handle,
    }
}

impl Bridge {
    async fn send(&mut self, line: &str) {
        self.input.write_all(line.as_bytes()).await.unwrap();
        self.input.write_all(b"\n").await.unwrap();
    }

    /// Read lines until the response to `request_id`, returning it and any
    /// events seen on the way.
    async fn response(&mut self, request_id: &str) -> (ResponseEnvelope, Vec<EventEnvelope>) {
        let mut events = Vec::new();
        loop {
            let line = tokio::time::timeout(READ_TIMEOUT, self.output.next_line())
                .await
                .expect("bridge output timed out")
                .unwrap()
                .expect("bridge output closed");
            let value: serde_json::Value = serde_json::from_str(&line).unwrap();
            if value.get("event_id").is_some() {
                events.push(serde_json::from_value(value).unwrap());
                continue;
            }
            let response: ResponseEnvelope = serde_json::from_value(value).unwrap();
            if response.request_id == request_id {
                return (response, events);
            }
        }
    }

    async fn command(
        &mut self,
        request_id: &str,
        command: &str,
        payload: serde_json::Value,
    ) -> (ResponseEnvelope, Vec<EventEnvelope>) {
        let line = serde_json::json!({
            "v": 1,
            "request_id": request_id,
            "command": command,
            "payload": payload,
        });
        self.send(&line.to_string()).await;
        self.response(request_id).await
    }

    /// Ping until every named event has been seen. Events are forwarded
    /// concurrently with responses, so they may trail the command that
    /// caused them.
    async fn events_until(
        &mut self,
        mut seen: Vec<EventEnvelope>,
        names: &[&str],
    ) -> Vec<EventEnvelope> {
        for attempt in 0..50 {
            if names.iter().all(|n| seen.iter().any(|e| e.event == *n)) {
                return seen;
            }
            let request_id = format!("ping-{attempt}");
            let (_, events) = self.command(&request_id, "host.ping", serde_json::Value::Null).await;
            seen.extend(events);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("events {names:?} never arrived");
    }
}

#[tokio::test]
async fn commands_round_trip_and_stop_ends_the_bridge() {
    let clock = Arc::new(ManualClock::new(utc(2024, 6, 1, 9, 0)));
    let mut bridge = start(Vec::new(), clock);

    let (pong, _) = bridge.command("r1", "host.ping", serde_json::Value::Null).await;
    assert!(pong.ok);
    assert_eq!(pong.payload["pong"], true);

    let offsite = serde_json::json!({
        "title": "Plan offsite",
        "category": "Work",
        "dueDate": "2024-06-20",
    });
    let (created, mut events) = bridge.command("r2", "task.create", offsite).await;
    assert!(created.ok, "{:?}", created.error);
    let id = created.payload["task"]["id"].as_str().unwrap().to_owned();

    let (listed, more) = bridge
        .command("r3", "task.list", serde_json::json!({"status": "active"}))
        .await;
    assert_eq!(listed.payload["tasks"][0]["id"], id.as_str());
    events.extend(more);
    let events = bridge.events_until(events, &[EVENT_TASK_CHANGED]).await;
    assert_eq!(events[0].payload["command"], "task.create");

    let (csv, _) = bridge.command("r4", "export.csv", serde_json::Value::Null).await;
    assert!(csv.payload["csv"].as_str().unwrap().contains("\"Plan offsite\""));

    let (stopped, _) = bridge.command("r5", "runtime.stop", serde_json::Value::Null).await;
    assert!(stopped.ok);
    assert!(bridge.stop.is_cancelled());
    bridge.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn malformed_lines_get_error_responses() {
    let clock = Arc::new(ManualClock::new(utc(2024, 6, 1, 9, 0)));
    let mut bridge = start(Vec::new(), clock);

    bridge.send("{this is not json").await;
    let (parse_error, _) = bridge.response("parse-error").await;
    assert!(!parse_error.ok);

    bridge
        .send(r#"{"v": 7, "request_id": "old", "command": "host.ping", "payload": {}}"#)
        .await;
    let (version_error, _) = bridge.response("old").await;
    assert!(!version_error.ok);
    assert!(version_error.error.unwrap().contains("unsupported contract version"));

    let (missing, _) = bridge.command("r1", "task.toggle", serde_json::json!({})).await;
    assert!(!missing.ok);

    drop(bridge.input);
    bridge.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn reminders_wait_for_the_host_permission() {
    let clock = Arc::new(ManualClock::new(utc(2024, 6, 9, 23, 0)));
    let mut task = Task::new("Call the bank", utc(2024, 6, 1, 9, 0));
    task.due_date = Some(date(2024, 6, 10));
    let id = task.id.clone();
    let mut bridge = start(vec![task], clock);
    // Once a command is answered the event forwarder is subscribed.
    bridge.command("r0", "host.ping", serde_json::Value::Null).await;

    // The 1h reminder is due; the host has not answered the prompt yet.
    let delivered = bridge.tracker.lock().unwrap().reconcile().unwrap();
    assert!(delivered.is_empty());

    let (granted, events) = bridge
        .command(
            "r1",
            "notification.permission",
            serde_json::json!({"permission": "granted"}),
        )
        .await;
    assert!(granted.ok);
    assert_eq!(granted.payload["delivered"], 1);

    let events = bridge
        .events_until(events, &[EVENT_PERMISSION_REQUESTED, EVENT_REMINDER_FIRED])
        .await;
    let fired = events.iter().find(|e| e.event == EVENT_REMINDER_FIRED).unwrap();
    assert!(fired.payload["body"].as_str().unwrap().contains("Call the bank"));

    let tracker = bridge.tracker.lock().unwrap();
    assert!(tracker.task(&id).unwrap().notifications_sent.one_hour);
}
