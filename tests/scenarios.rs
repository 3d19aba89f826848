//! End-to-end admission scenarios exercising the full runtime.

use rungate::{
    CapacityLimits, ManualClock, PermitRequest, Priority, RawError, Runtime, RuntimeConfig,
    ScoreWeights, TaskDescriptor,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

fn small_limits(requests: u32, llm: u32) -> CapacityLimits {
    CapacityLimits::builder()
        .max_total_active_requests(requests)
        .max_total_active_llm(llm)
        .build()
        .unwrap()
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if cond() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn basic_admission_queues_third_task() {
    let runtime = Runtime::new(
        RuntimeConfig::builder()
            .limits(small_limits(2, 4))
            .build()
            .unwrap(),
    );

    let t1 = runtime
        .acquire_permit(PermitRequest::new(
            TaskDescriptor::builder("t1", "subagent").build(),
        ))
        .await;
    let t2 = runtime
        .acquire_permit(PermitRequest::new(
            TaskDescriptor::builder("t2", "subagent").build(),
        ))
        .await;
    assert!(t1.is_allowed());
    assert!(t2.is_allowed());

    let rt = runtime.clone();
    let t3_handle = tokio::spawn(async move {
        rt.acquire_permit(PermitRequest::new(
            TaskDescriptor::builder("t3", "subagent").build(),
        ))
        .await
    });

    wait_until(|| runtime.snapshot().queue.pending == 1).await;
    let snapshot = runtime.snapshot();
    assert_eq!(snapshot.ledger.total_active_requests, 2);
    assert_eq!(snapshot.queue.priority_stats.normal, 1);

    // freeing one slot admits the queued task
    t1.into_lease().unwrap().release();
    let t3 = t3_handle.await.unwrap();
    assert!(t3.is_allowed());

    let snapshot = runtime.snapshot();
    assert_eq!(snapshot.ledger.total_active_requests, 2);
    assert_eq!(snapshot.queue.pending, 0);

    t2.into_lease().unwrap().release();
    t3.into_lease().unwrap().release();
    assert_eq!(runtime.snapshot().ledger.total_active_requests, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn critical_work_preempts_running_low_task() {
    let runtime = Runtime::new(
        RuntimeConfig::builder()
            .limits(small_limits(1, 1))
            .build()
            .unwrap(),
    );

    let low_token = CancellationToken::new();
    let low_lease = runtime
        .acquire_permit(PermitRequest::new(
            TaskDescriptor::builder("t-low", "subagent")
                .priority(Priority::Low)
                .abort(low_token.clone())
                .build(),
        ))
        .await
        .into_lease()
        .expect("low task admitted");

    let rt = runtime.clone();
    let crit_handle = tokio::spawn(async move {
        rt.acquire_permit(
            PermitRequest::new(
                TaskDescriptor::builder("t-crit", "subagent")
                    .priority(Priority::Critical)
                    .build(),
            )
            .max_wait_ms(5_000),
        )
        .await
    });
    wait_until(|| runtime.snapshot().queue.pending == 1).await;

    assert!(runtime.should_preempt(Priority::Low, Priority::Critical));
    let victim = runtime.find_preemptable(Priority::Critical).expect("victim");
    assert_eq!(victim.task_id, "t-low");

    let checkpoint_id = runtime
        .preempt_task("t-low", "critical work arrived", json!({"step": 2}), None)
        .await
        .expect("checkpoint saved");
    assert!(low_token.is_cancelled());

    // the preempted task shuts down cooperatively and frees its slot
    low_lease.release();

    let crit = crit_handle.await.unwrap();
    assert!(crit.is_allowed());
    assert_eq!(runtime.snapshot().ledger.total_active_requests, 1);

    let resumed = runtime
        .resume_from_checkpoint(&checkpoint_id, |record| async move {
            assert_eq!(record.progress, 0.5);
            assert_eq!(
                record.metadata.get("preempt_reason").map(String::as_str),
                Some("critical work arrived")
            );
            Ok(json!({"resumed": true}))
        })
        .await;
    assert!(resumed.success);
    assert_eq!(resumed.task_id, "t-low");

    crit.into_lease().unwrap().release();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn starved_tenant_dispatches_after_three_consecutive() {
    let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let order_clone = Arc::clone(&order);

    // fair-share bonus zeroed so the test isolates the threshold mechanism
    let runtime = Runtime::builder(
        RuntimeConfig::builder()
            .limits(small_limits(1, 1))
            .weights(ScoreWeights {
                fair_share: 0.0,
                ..ScoreWeights::default()
            })
            .anti_starvation_threshold(3)
            .build()
            .unwrap(),
    )
    .on_dispatched(move |task_id, _| order_clone.lock().unwrap().push(task_id.to_string()))
    .build();

    let gate = runtime
        .acquire_permit(PermitRequest::new(
            TaskDescriptor::builder("gate", "tool").tenant_key("gate").build(),
        ))
        .await
        .into_lease()
        .unwrap();

    let mut handles = Vec::new();
    let waiters = [
        ("a0", "tenant-a"),
        ("a1", "tenant-a"),
        ("a2", "tenant-a"),
        ("a3", "tenant-a"),
        ("a4", "tenant-a"),
        ("a5", "tenant-a"),
        ("b0", "tenant-b"),
    ];
    for (i, (id, tenant)) in waiters.iter().enumerate() {
        let rt = runtime.clone();
        let task = TaskDescriptor::builder(*id, "tool").tenant_key(*tenant).build();
        handles.push(tokio::spawn(async move {
            let result = rt.acquire_permit(PermitRequest::new(task)).await;
            assert!(result.is_allowed());
            result.into_lease().unwrap().release();
        }));
        wait_until(|| runtime.snapshot().queue.pending == i + 1).await;
    }

    gate.release();
    for joined in futures::future::join_all(handles).await {
        joined.unwrap();
    }

    let order = order.lock().unwrap();
    assert_eq!(order[0], "gate");
    assert_eq!(
        &order[1..5],
        ["a0", "a1", "a2", "b0"],
        "tenant-b should break in after three consecutive tenant-a dispatches"
    );
}

#[tokio::test]
async fn enhanced_penalty_raises_and_decays() {
    let clock = ManualClock::shared(0);
    let runtime = Runtime::builder(
        RuntimeConfig::builder()
            .stable_profile(false)
            .max_penalty(5.0)
            .penalty_decay_ms(1_000)
            .build()
            .unwrap(),
    )
    .clock(clock.clone())
    .build();

    let provider = Some("acme");
    let model = Some("m-1");
    let rate_limited = RawError::with_status(429, "slow down");
    runtime.report_failure(provider, model, &rate_limited);
    runtime.report_failure(provider, model, &rate_limited);

    assert_eq!(runtime.penalty_snapshot(provider, model).penalty, 4.0);
    assert_eq!(runtime.effective_parallelism(provider, model, 10), 2);

    clock.advance(5_000);
    // 4.0 * 0.5^5 = 0.125
    let penalty = runtime.penalty_snapshot(provider, model).penalty;
    assert!((penalty - 0.125).abs() < 1e-9, "penalty = {penalty}");
    assert_eq!(runtime.effective_parallelism(provider, model, 10), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn near_deadline_task_dispatches_before_far_deadline() {
    let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let order_clone = Arc::clone(&order);

    let runtime = Runtime::builder(
        RuntimeConfig::builder()
            .limits(small_limits(1, 1))
            .build()
            .unwrap(),
    )
    .on_dispatched(move |task_id, _| order_clone.lock().unwrap().push(task_id.to_string()))
    .build();

    let gate = runtime
        .acquire_permit(PermitRequest::new(
            TaskDescriptor::builder("gate", "tool").build(),
        ))
        .await
        .into_lease()
        .unwrap();

    let now = runtime.now_ms();
    let mut handles = Vec::new();
    for (i, (id, deadline, duration)) in [
        ("t-far", 60_000u64, 30_000u64),
        ("t-near", 2_000, 1_000),
    ]
    .iter()
    .enumerate()
    {
        let rt = runtime.clone();
        let task = TaskDescriptor::builder(*id, "tool")
            .deadline_ms(now + deadline)
            .estimated_duration_ms(*duration)
            .build();
        handles.push(tokio::spawn(async move {
            let result = rt.acquire_permit(PermitRequest::new(task)).await;
            assert!(result.is_allowed());
            result.into_lease().unwrap().release();
        }));
        wait_until(|| runtime.snapshot().queue.pending == i + 1).await;
    }

    gate.release();
    for joined in futures::future::join_all(handles).await {
        joined.unwrap();
    }

    let order = order.lock().unwrap();
    assert_eq!(&order[1..], ["t-near", "t-far"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_while_waiting_restores_queue() {
    let runtime = Runtime::new(
        RuntimeConfig::builder()
            .limits(small_limits(1, 1))
            .build()
            .unwrap(),
    );

    let gate = runtime
        .acquire_permit(PermitRequest::new(
            TaskDescriptor::builder("gate", "tool").build(),
        ))
        .await
        .into_lease()
        .unwrap();

    let token = CancellationToken::new();
    let rt = runtime.clone();
    let task = TaskDescriptor::builder("t-waiting", "tool")
        .abort(token.clone())
        .build();
    let handle = tokio::spawn(async move {
        rt.acquire_permit(PermitRequest::new(task).max_wait_ms(10_000))
            .await
    });
    wait_until(|| runtime.snapshot().queue.pending == 1).await;

    let before = runtime.snapshot();
    sleep(Duration::from_millis(500)).await;
    token.cancel();

    let result = handle.await.unwrap();
    assert!(result.aborted);
    assert!(!result.allowed);
    assert!(
        result.waited_ms >= 400 && result.waited_ms < 5_000,
        "waited {} ms",
        result.waited_ms
    );

    let after = runtime.snapshot();
    assert_eq!(after.queue.pending, 0);
    assert_eq!(
        after.ledger.total_active_requests,
        before.ledger.total_active_requests
    );

    gate.release();
    assert_eq!(runtime.snapshot().ledger.total_active_requests, 0);
}
