//! A stand-in for a real profiled target: a handful of tasks with
//! deliberately varied idle patterns, plus the two HTTP endpoints
//! idlescope's reader and fetcher glue pull from, so the rest of the
//! repository can be exercised end to end without a real target process.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use idlescope_common::{EventKind, RawEvent, RawStack, StackFrame, TaskId, TaskState, TraceTime};
use idlescope_core::heap::pprof::{Profile, Sample, ValueType};
use log::info;
use prost::Message;
use rand::Rng;
use tokio::sync::Mutex;

#[derive(Parser)]
#[command(name = "idlescope-external-test-app", about = "Exposes trace/heap endpoints backed by a handful of deliberately idle tasks")]
struct Args {
    /// Address to expose the trace and heap endpoints on.
    #[arg(short, long, default_value = "127.0.0.1:11000")]
    addr: SocketAddr,

    /// Number of background tasks to simulate.
    #[arg(long, default_value_t = 6)]
    tasks: u64,
}

struct AppState {
    trace_log: Mutex<Vec<String>>,
    live_allocations: AtomicU64,
    clock: AtomicU64,
}

impl AppState {
    fn tick(&self) -> TraceTime {
        TraceTime(self.clock.fetch_add(1, Ordering::Relaxed))
    }

    async fn record(&self, event: &RawEvent) {
        let line = serde_json::to_string(event).expect("RawEvent always serializes");
        self.trace_log.lock().await.push(line);
    }
}

fn stack_for(task: TaskId) -> RawStack {
    RawStack(vec![StackFrame {
        function: format!("demo.task{}", task.0),
        pc: 0x1000 + task.0,
        file: Some("demo_task.rs".to_string()),
        line: Some(1),
    }])
}

async fn run_task(id: u64, state: Arc<AppState>) {
    let task = TaskId(id);

    let created = RawEvent {
        time: state.tick(),
        originating_task: task,
        kind: EventKind::StateTransition {
            resource_task: task,
            from: TaskState::NotExist,
            to: TaskState::Waiting,
            resource_stack: stack_for(task),
            originating_stack: RawStack::default(),
        },
    };
    state.record(&created).await;

    loop {
        let to_running = RawEvent {
            time: state.tick(),
            originating_task: task,
            kind: EventKind::StateTransition {
                resource_task: task,
                from: TaskState::Waiting,
                to: TaskState::Running,
                resource_stack: stack_for(task),
                originating_stack: RawStack::default(),
            },
        };
        state.record(&to_running).await;

        // Each task does a little work, allocates, and sleeps for a
        // deliberately different amount of wall time so the trace
        // processor's Top-Idle index has something interesting to rank.
        let run_millis = 5 + (id * 7) % 40;
        tokio::time::sleep(Duration::from_millis(run_millis)).await;
        state.live_allocations.fetch_add(1 + id % 5, Ordering::Relaxed);

        let to_waiting = RawEvent {
            time: state.tick(),
            originating_task: task,
            kind: EventKind::StateTransition {
                resource_task: task,
                from: TaskState::Running,
                to: TaskState::Waiting,
                resource_stack: stack_for(task),
                originating_stack: RawStack::default(),
            },
        };
        state.record(&to_waiting).await;

        let idle_millis = 20 + (id * 131) % 2_000;
        tokio::time::sleep(Duration::from_millis(idle_millis)).await;
    }
}

async fn debug_trace(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let log = state.trace_log.lock().await;
    log.join("\n")
}

async fn debug_heap(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let inuse_objects = i64::try_from(state.live_allocations.load(Ordering::Relaxed)).unwrap_or(i64::MAX);
    let mut rng = rand::thread_rng();
    let inuse_space = inuse_objects * rng.gen_range(32..256);

    let profile = Profile {
        string_table: vec![
            String::new(),
            "inuse_space".to_string(),
            "inuse_objects".to_string(),
            "alloc_space".to_string(),
            "alloc_objects".to_string(),
        ],
        sample_type: vec![
            ValueType { r#type: 1, unit: 0 },
            ValueType { r#type: 2, unit: 0 },
            ValueType { r#type: 3, unit: 0 },
            ValueType { r#type: 4, unit: 0 },
        ],
        sample: vec![Sample {
            location_id: vec![],
            value: vec![inuse_space, inuse_objects, inuse_space * 3, inuse_objects * 3],
            label: vec![],
        }],
        time_nanos: i64::try_from(state.clock.load(Ordering::Relaxed)).unwrap_or(0),
        ..Default::default()
    };

    let encoded = profile.encode_to_vec();

    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&encoded).expect("writing to an in-memory buffer cannot fail");
    encoder.finish().expect("finishing an in-memory gzip stream cannot fail")
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let state = Arc::new(AppState {
        trace_log: Mutex::new(Vec::new()),
        live_allocations: AtomicU64::new(0),
        clock: AtomicU64::new(1),
    });

    for id in 0..args.tasks {
        tokio::spawn(run_task(id, Arc::clone(&state)));
    }

    let app = Router::new()
        .route("/debug/trace", get(debug_trace))
        .route("/debug/heap", get(debug_heap))
        .with_state(state);

    info!("external test app listening on {}", args.addr);
    let listener = tokio::net::TcpListener::bind(args.addr).await.expect("failed to bind");
    axum::serve(listener, app).await.expect("server exited");
}
