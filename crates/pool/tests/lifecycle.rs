use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use weft_core::ConfigError;
use weft_pool::{Job, Pool, PoolConfig, PoolError, Scope};

#[test]
fn fixed_pool_starts_max_threads_workers() {
    let pool = Pool::construct(PoolConfig::fixed(3)).unwrap();
    assert_eq!(pool.num_threads(), 3);
    assert_eq!(pool.config().max_threads, 3);
}

#[test]
fn adaptive_pool_stays_within_bounds() {
    let pool = Pool::construct(PoolConfig::bounded(1, 3)).unwrap();
    assert!((1..=3).contains(&pool.num_threads()));
}

#[test]
fn invalid_configs_are_rejected() {
    let err = Pool::construct(PoolConfig::bounded(4, 2)).unwrap_err();
    assert!(matches!(
        err,
        PoolError::Config(ConfigError::ThreadBounds { min: 4, max: 2 })
    ));

    let err = Pool::construct(PoolConfig::fixed(0)).unwrap_err();
    assert!(matches!(err, PoolError::Config(ConfigError::NoWorkers)));
}

#[test]
fn config_is_published_in_the_instance_tier() {
    let config = PoolConfig::fixed(2).with_simd(true);
    let pool = Pool::construct(config.clone()).unwrap();
    let published = pool
        .scopes()
        .instance()
        .try_get::<PoolConfig>()
        .expect("config published");
    assert_eq!(*published, config);
    assert!(Arc::ptr_eq(
        &published,
        &pool.scopes().get::<PoolConfig>(Scope::Instance)
    ));
}

#[test]
fn pools_have_distinct_ids_and_instance_tiers() {
    let a = Pool::construct(PoolConfig::fixed(1)).unwrap();
    let b = Pool::construct(PoolConfig::fixed(1)).unwrap();
    assert_ne!(a.id(), b.id());
    assert!(!Arc::ptr_eq(
        &a.scopes().store(Scope::Instance),
        &b.scopes().store(Scope::Instance)
    ));
}

#[test]
fn drop_drains_pending_work() {
    let done = Arc::new(AtomicUsize::new(0));
    let pool = Pool::construct(PoolConfig::fixed(2)).unwrap();
    let jobs: Vec<Job<()>> = (0..64)
        .map(|_| {
            let done = Arc::clone(&done);
            Job::new(move || {
                thread::sleep(Duration::from_micros(200));
                done.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(())
            })
        })
        .collect();
    for job in &jobs {
        pool.submit(job).unwrap();
    }
    drop(pool);

    assert_eq!(done.load(Ordering::SeqCst), 64);
    assert!(jobs.iter().all(Job::is_done));
}

#[test]
fn worker_survives_a_panicking_job() {
    let pool = Pool::construct(PoolConfig::fixed(1)).unwrap();
    let err = pool
        .run(|| -> anyhow::Result<()> { panic!("decoder exploded") })
        .unwrap_err();
    assert!(err.to_string().contains("decoder exploded"));
    assert_eq!(pool.run(|| Ok::<_, anyhow::Error>("still alive")).unwrap(), "still alive");
}

#[test]
fn dropping_the_last_handle_on_a_worker_detaches_it() {
    let pool = Pool::construct(PoolConfig::fixed(2)).unwrap();
    let (tx, rx) = mpsc::channel();
    let handle = Arc::clone(&pool);
    let job = Job::new(move || {
        // Wait until the test has let go so this drop is the last one.
        let _ = rx.recv();
        drop(handle);
        Ok::<_, anyhow::Error>(())
    });
    pool.submit(&job).unwrap();
    drop(pool);
    tx.send(()).unwrap();

    assert!(job.wait().is_ok());
}

#[test]
fn failed_construction_is_retried_per_caller() {
    #[derive(Debug)]
    struct Calibration(u32);

    let pool = Pool::construct(PoolConfig::fixed(1)).unwrap();
    let store = pool.scopes().store(Scope::Instance);
    let first: Result<Arc<Calibration>, &str> = store.get_or_try_init(|| Err("sensor offline"));
    assert_eq!(first.unwrap_err(), "sensor offline");
    assert!(!store.contains::<Calibration>());

    let second = store.get_or_try_init(|| Ok::<_, &str>(Calibration(7))).unwrap();
    assert_eq!(second.0, 7);
}
