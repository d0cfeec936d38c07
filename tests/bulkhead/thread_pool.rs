use fortify::{ErrorKind, ThreadPoolBulkhead, ThreadPoolBulkheadConfig};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn pool(core: usize, max: usize, queue: usize) -> ThreadPoolBulkhead {
    ThreadPoolBulkhead::new(
        "reports",
        ThreadPoolBulkheadConfig::builder()
            .core_thread_pool_size(core)
            .max_thread_pool_size(max)
            .queue_capacity(queue)
            .keep_alive_duration(Duration::from_millis(20))
            .build(),
    )
}

#[test]
fn rejects_once_workers_and_queue_are_full() {
    let pool = pool(1, 1, 1);
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel();
    let release_rx = Arc::new(Mutex::new(release_rx));

    let rx = Arc::clone(&release_rx);
    let running = pool
        .submit(move || {
            started_tx.send(()).unwrap();
            rx.lock().unwrap().recv().ok();
        })
        .unwrap();
    started_rx.recv().unwrap();

    let queued = pool.submit(|| 2).unwrap();
    let err = pool.submit(|| 3).err().unwrap();
    assert_eq!(err.max_concurrent_calls, 1);
    assert_eq!(pool.metrics().queue_depth, 1);

    release_tx.send(()).unwrap();
    running.wait().unwrap();
    assert_eq!(queued.wait().unwrap(), 2);
}

#[test]
fn call_sync_maps_rejection_to_bulkhead_full() {
    let pool = pool(1, 1, 0);
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel();
    let busy = pool
        .submit(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().ok();
        })
        .unwrap();
    started_rx.recv().unwrap();

    let err = pool
        .execute_sync(|| Ok::<_, std::io::Error>(()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BulkheadFull);

    release_tx.send(()).unwrap();
    busy.wait().unwrap();
}

#[test]
fn application_errors_pass_through_the_pool() {
    let pool = pool(1, 2, 4);
    let err = pool
        .execute_sync(|| Err::<(), _>(std::io::Error::other("report failed")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Application);
    assert_eq!(err.to_string(), "report failed");
}

#[test]
fn shutdown_keeps_queued_work() {
    let pool = pool(1, 1, 4);
    let slow = pool
        .submit(|| std::thread::sleep(Duration::from_millis(20)))
        .unwrap();
    let queued = pool.submit(|| "done").unwrap();

    pool.shutdown();
    assert!(pool.submit(|| ()).is_err());
    slow.wait().unwrap();
    assert_eq!(queued.wait().unwrap(), "done");
}

#[tokio::test]
async fn execute_resolves_without_blocking_the_runtime() {
    let pool = Arc::new(pool(2, 2, 8));
    let a = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            pool.execute(|| {
                std::thread::sleep(Duration::from_millis(20));
                Ok::<_, std::io::Error>(1)
            })
            .await
        })
    };
    let b = pool
        .execute(|| Ok::<_, std::io::Error>(2))
        .await
        .unwrap();

    assert_eq!(b, 2);
    assert_eq!(a.await.unwrap().unwrap(), 1);
}
