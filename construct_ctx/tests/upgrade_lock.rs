mod utils;

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use construct_ctx::{sleep, yield_now, Scheduler, SharedMutex, UpgradeLock};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exclusive_phase_is_never_shared() {
    utils::init_tracing();
    let sched = Scheduler::current();
    let mutex = Arc::new(SharedMutex::new());
    let inside = Arc::new(AtomicUsize::new(0));
    let entries = Arc::new(AtomicUsize::new(0));
    let overlapped = Arc::new(AtomicBool::new(false));

    for i in 0..2 {
        let mutex = mutex.clone();
        let inside = inside.clone();
        let entries = entries.clone();
        let overlapped = overlapped.clone();
        sched.spawn(format!("upgrader {}", i), async move {
            for _ in 0..20 {
                let mut lock = UpgradeLock::new(&mutex).await?;
                yield_now().await?;
                lock.lock_exclusive().await?;

                if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                    overlapped.store(true, Ordering::SeqCst);
                }
                entries.fetch_add(1, Ordering::SeqCst);
                yield_now().await?;
                inside.fetch_sub(1, Ordering::SeqCst);

                lock.unlock_exclusive();
                lock.unlock();
            }
            Ok(())
        });
    }

    sched.join_all().await.unwrap();
    assert!(!overlapped.load(Ordering::SeqCst));
    assert_eq!(entries.load(Ordering::SeqCst), 40);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_upgrade_waits_for_first() {
    let sched = Scheduler::current();
    let mutex = Arc::new(SharedMutex::new());
    let second_acquired = Arc::new(AtomicBool::new(false));

    let mut first = UpgradeLock::deferred(&mutex);
    assert!(first.try_lock());

    let ctx = {
        let mutex = mutex.clone();
        let second_acquired = second_acquired.clone();
        sched.spawn("second", async move {
            let _lock = UpgradeLock::new(&mutex).await?;
            second_acquired.store(true, Ordering::SeqCst);
            Ok(())
        })
    };

    sleep(Duration::from_millis(20)).await.unwrap();
    assert!(!second_acquired.load(Ordering::SeqCst));

    first.unlock();
    ctx.join().await.unwrap();
    assert!(second_acquired.load(Ordering::SeqCst));
}

#[tokio::test]
async fn readers_continue_during_upgrade_but_not_exclusive() {
    let mutex = SharedMutex::new();
    let mut lock = UpgradeLock::new(&mutex).await.unwrap();

    let reader = mutex.try_read();
    assert!(reader.is_some());
    assert!(!lock.try_lock_exclusive());
    assert!(!lock
        .try_lock_exclusive_for(Duration::from_millis(5))
        .await
        .unwrap());

    drop(reader);
    assert!(lock.try_lock_exclusive());
    assert!(mutex.try_read().is_none());

    lock.unlock_exclusive();
    assert!(lock.owns_lock());
    assert!(mutex.try_read().is_some());

    drop(lock);
    assert!(!mutex.is_upgraded());
}
