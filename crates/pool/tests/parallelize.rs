use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use weft_pool::{
    parallelize_index, parallelize_range, parallelize_replicate, JobContext, JobError, Parallel,
    Pool, PoolConfig, PoolError,
};

fn counters(len: usize) -> Arc<Vec<AtomicUsize>> {
    Arc::new((0..len).map(|_| AtomicUsize::new(0)).collect())
}

fn assert_each_once(hits: &[AtomicUsize]) {
    for (i, hit) in hits.iter().enumerate() {
        assert_eq!(hit.load(Ordering::SeqCst), 1, "index {i}");
    }
}

#[test]
fn index_form_visits_every_index_once() {
    let pool = Pool::construct(PoolConfig::fixed(4)).unwrap();
    for len in [0, 1, 2, 7, 100, 1000] {
        for threads in [0, 1, 2, 3, 8] {
            let hits = counters(len);
            let state = Arc::clone(&hits);
            parallelize_index(
                Some(&*pool),
                move |i| {
                    state[i].fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(())
                },
                len,
                threads,
            )
            .unwrap();
            assert_each_once(&hits);
        }
    }
}

#[test]
fn range_form_visits_every_item_once() {
    let pool = Pool::construct(PoolConfig::fixed(3)).unwrap();
    for len in [0, 1, 2, 7, 100, 1000] {
        for threads in [0, 1, 2, 3, 8] {
            let hits = counters(len);
            let items: Vec<usize> = (0..len).collect();
            let seen = Arc::clone(&hits);
            parallelize_range(
                Some(&*pool),
                items,
                move |&item: &usize| {
                    seen[item].fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(())
                },
                threads,
            )
            .unwrap();
            assert_each_once(&hits);
        }
    }
}

#[test]
fn without_a_pool_work_runs_on_the_caller() {
    let caller = thread::current().id();
    let hits = counters(50);
    let state = Arc::clone(&hits);
    parallelize_index(
        None,
        move |i| {
            assert_eq!(thread::current().id(), caller);
            state[i].fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(())
        },
        50,
        8,
    )
    .unwrap();
    assert_each_once(&hits);
}

#[test]
fn serial_path_stops_at_the_first_error() {
    let visited = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&visited);
    let err = parallelize_index(
        None,
        move |i| {
            log.lock().unwrap().push(i);
            if i == 3 {
                anyhow::bail!("index {i} is corrupt");
            }
            Ok(())
        },
        10,
        0,
    )
    .unwrap_err();
    assert!(err.to_string().contains("index 3 is corrupt"));
    assert_eq!(*visited.lock().unwrap(), vec![0, 1, 2, 3]);
}

#[test]
fn parallel_error_is_reported_after_all_replicas_finish() {
    let pool = Pool::construct(PoolConfig::fixed(4)).unwrap();
    let hits = counters(200);
    let state = Arc::clone(&hits);
    let err = parallelize_index(
        Some(&*pool),
        move |i| {
            state[i].fetch_add(1, Ordering::SeqCst);
            if i == 17 {
                anyhow::bail!("bad frame {i}");
            }
            Ok(())
        },
        200,
        4,
    )
    .unwrap_err();
    assert!(err.to_string().contains("bad frame 17"));
    // Only the failing replica stopped; no index ran twice.
    assert!(hits.iter().all(|h| h.load(Ordering::SeqCst) <= 1));
    assert!(pool.stats().pending == 0);
}

#[test]
fn panics_in_parallel_work_are_captured() {
    let pool = Pool::construct(PoolConfig::fixed(2)).unwrap();
    let err = parallelize_index(
        Some(&*pool),
        |i| -> anyhow::Result<()> {
            if i == 5 {
                panic!("kernel fault");
            }
            Ok(())
        },
        10,
        2,
    )
    .unwrap_err();
    match err {
        PoolError::Job(JobError::Panicked(msg)) => assert!(msg.contains("kernel fault")),
        other => panic!("unexpected error: {other:?}"),
    }

    let err = parallelize_index(
        None,
        |_| -> anyhow::Result<()> { panic!("inline fault") },
        1,
        0,
    )
    .unwrap_err();
    assert!(matches!(err, PoolError::Job(ref job) if job.is_panic()));
}

#[test]
fn replicate_runs_threads_plus_one_times() {
    let pool = Pool::construct(PoolConfig::fixed(3)).unwrap();
    for threads in [0, 1, 3, 6] {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        parallelize_replicate(
            Some(&*pool),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(())
            },
            threads,
        )
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), threads + 1);
    }
}

#[test]
fn replicate_reports_job_errors_before_the_callers() {
    let pool = Pool::construct(PoolConfig::fixed(2)).unwrap();
    let caller = thread::current().id();
    let err = parallelize_replicate(
        Some(&*pool),
        move || {
            if thread::current().id() == caller {
                anyhow::bail!("caller failed");
            }
            anyhow::bail!("worker failed")
        },
        2,
    )
    .unwrap_err();
    assert!(err.to_string().contains("worker failed"));
}

#[test]
fn replicate_surfaces_the_callers_error() {
    let pool = Pool::construct(PoolConfig::fixed(2)).unwrap();
    let caller = thread::current().id();
    let err = parallelize_replicate(
        Some(&*pool),
        move || {
            if thread::current().id() == caller {
                anyhow::bail!("caller failed");
            }
            Ok(())
        },
        2,
    )
    .unwrap_err();
    assert!(err.to_string().contains("caller failed"));
}

#[test]
fn max_concurrent_caps_replicas() {
    let pool = Pool::construct(PoolConfig::fixed(6)).unwrap();
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (cur, pk) = (Arc::clone(&current), Arc::clone(&peak));
    Parallel::new(Some(&*pool))
        .max_concurrent(2)
        .index(
            move |_| {
                let now = cur.fetch_add(1, Ordering::SeqCst) + 1;
                pk.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(1));
                cur.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(())
            },
            40,
        )
        .unwrap();
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[test]
fn replicas_carry_the_requested_order() {
    let pool = Pool::construct(PoolConfig::fixed(2)).unwrap();
    let orders = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&orders);
    Parallel::new(Some(&*pool))
        .order(42)
        .index(
            move |_| {
                let order = JobContext::current().map(|ctx| ctx.order());
                log.lock().unwrap().push(order);
                Ok::<_, anyhow::Error>(())
            },
            20,
        )
        .unwrap();
    assert!(orders.lock().unwrap().iter().all(|o| *o == Some(42)));
}

#[test]
fn parallel_work_can_nest_inside_a_job() {
    let pool = Pool::construct(PoolConfig::fixed(1)).unwrap();
    let inner = Arc::clone(&pool);
    let total = pool
        .run(move || {
            let sum = Arc::new(AtomicUsize::new(0));
            let acc = Arc::clone(&sum);
            parallelize_range(
                Some(&*inner),
                vec![1usize, 2, 3, 4],
                move |v: &usize| {
                    acc.fetch_add(*v, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(())
                },
                1,
            )?;
            Ok::<_, anyhow::Error>(sum.load(Ordering::SeqCst))
        })
        .unwrap();
    assert_eq!(total, 10);
}

#[test]
fn earliest_replica_error_wins() {
    // One worker runs the replicas in submission order, so tickets follow job order.
    let pool = Pool::construct(PoolConfig::fixed(1)).unwrap();
    let caller = thread::current().id();
    let tickets = Arc::new(AtomicUsize::new(0));
    let err = parallelize_replicate(
        Some(&*pool),
        move || {
            if thread::current().id() == caller {
                return Ok(());
            }
            match tickets.fetch_add(1, Ordering::SeqCst) {
                0 => anyhow::bail!("replica 0 rejected"),
                2 => anyhow::bail!("replica 2 rejected"),
                _ => Ok(()),
            }
        },
        3,
    )
    .unwrap_err();
    assert!(err.to_string().contains("replica 0 rejected"));
}

#[test]
fn capped_replicas_can_nest_parallel_calls() {
    let pool = Pool::construct(PoolConfig::fixed(2)).unwrap();
    let inner = Arc::clone(&pool);
    let hits = counters(8 * 4);
    let state = Arc::clone(&hits);
    Parallel::new(Some(&*pool))
        .max_concurrent(1)
        .index(
            move |outer| {
                let state = Arc::clone(&state);
                parallelize_index(
                    Some(&*inner),
                    move |i| {
                        state[outer * 4 + i].fetch_add(1, Ordering::SeqCst);
                        Ok::<_, anyhow::Error>(())
                    },
                    4,
                    1,
                )
            },
            8,
        )
        .unwrap();
    assert_each_once(&hits);
}
