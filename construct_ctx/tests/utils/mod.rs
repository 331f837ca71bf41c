use construct_ctx::{Pool, PoolOpts, Scheduler};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn pool_of(scheduler: &Scheduler, name: &str, size: usize) -> Pool {
    Pool::new(
        scheduler,
        PoolOpts {
            name: name.to_string(),
            size,
            ..Default::default()
        },
    )
}
