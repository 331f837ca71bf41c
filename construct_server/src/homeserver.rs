use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::Context;
use construct_ctx::{Concurrent, Pool, PoolOpts, Scheduler};
use construct_db::Database;
use construct_matrix::{Dbs, Error as DbsError, Event, Room, RoomId};
use serde::Serialize;

use crate::config::ServerConfig;

/// Outcome of an injection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InjectStats {
    pub committed: usize,
    /// Already known, so skipped
    pub existing: usize,
    /// Not dispatched, or rejected while indexing
    pub rejected: usize,
}

#[derive(Default)]
struct Counters {
    committed: AtomicUsize,
    existing: AtomicUsize,
    rejected: AtomicUsize,
}

/// The process: one scheduler, the event graph over its store, and the
/// pool which writes to it.
///
/// Construction order is store, graph, scheduler, pool; [`shutdown`] tears
/// down in reverse.
///
/// [`shutdown`]: Homeserver::shutdown
pub struct Homeserver {
    config: ServerConfig,
    scheduler: Scheduler,
    dbs: Arc<Dbs>,
    pool: Pool,
}

impl Homeserver {
    /// Open the store and start the writer pool. Must be called from within
    /// a tokio runtime.
    pub async fn open(config: ServerConfig) -> anyhow::Result<Self> {
        let db = match &config.db.path {
            Some(path) => Database::load(path, config.db.opts.clone(), Dbs::descriptors())
                .with_context(|| format!("Couldn't load database from {}", path.display()))?,
            None => Database::open(config.db.opts.clone(), Dbs::descriptors()),
        };

        let dbs = Arc::new(Dbs::open(db, config.dbs.clone()).context("Couldn't open event graph")?);

        let scheduler = Scheduler::current();
        let pool = Pool::new(
            &scheduler,
            PoolOpts {
                name: config.ctx.pool_name.clone(),
                size: config.ctx.pool_size,
                stack_size: config.ctx.stack_size,
                queue_max: config.ctx.queue_max,
            },
        );

        tracing::info!(
            "Homeserver {} up; {} writers, last event index {}",
            config.server_name,
            pool.size(),
            dbs.last_idx()
        );

        Ok(Self {
            config,
            scheduler,
            dbs,
            pool,
        })
    }

    pub fn server_name(&self) -> &str {
        &self.config.server_name
    }

    pub fn dbs(&self) -> &Arc<Dbs> {
        &self.dbs
    }

    pub fn room<'a>(&'a self, room_id: &'a RoomId) -> Room<'a> {
        Room::new(&self.dbs, room_id)
    }

    /// Commit each event with a full index, fanned out over the writer
    /// pool. Writers to one room are serialised by its room lock.
    #[tracing::instrument(skip_all)]
    pub async fn inject(&self, events: impl IntoIterator<Item = Event>) -> anyhow::Result<InjectStats> {
        let counters = Arc::new(Counters::default());

        let dbs = Arc::clone(&self.dbs);
        let closure_counters = Arc::clone(&counters);
        let mut fanout = Concurrent::new(&self.pool, self.config.ctx.concurrent.max(1), move |event: Event| {
            let dbs = Arc::clone(&dbs);
            let counters = Arc::clone(&closure_counters);
            async move {
                match dbs.commit_event(&event, dbs.write_opts()).await {
                    Ok(_) => {
                        counters.committed.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    }
                    Err(DbsError::Exists(event_id)) => {
                        tracing::debug!("Skipping known event {}", event_id);
                        counters.existing.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    }
                    Err(e) => {
                        // counted here so one bad event can't hold back the rest
                        tracing::warn!("Rejected {}: {}", event.event_id, e);
                        counters.rejected.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    }
                }
            }
        });

        for event in events {
            let event_id = event.event_id.clone();
            if let Err(e) = fanout.call(event).await {
                tracing::warn!("Couldn't dispatch {}: {:#}", event_id, e);
                counters.rejected.fetch_add(1, Ordering::Relaxed);
                if e.is_interrupted() {
                    fanout.join().await;
                    return Err(e.into());
                }
            }
        }

        if let Err(e) = fanout.wait().await {
            tracing::warn!("Injection error: {:#}", e);
        }

        let stats = InjectStats {
            committed: counters.committed.load(Ordering::Relaxed),
            existing: counters.existing.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
        };
        tracing::info!("Injected {:?}", stats);
        Ok(stats)
    }

    /// Inject the events of a file holding one JSON event per line.
    pub async fn import(&self, path: impl AsRef<Path>) -> anyhow::Result<InjectStats> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Couldn't open {}", path.display()))?;

        let mut events = Vec::new();
        let mut malformed = 0;
        for (num, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            match Event::from_json(&line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!("{}:{}: {}", path.display(), num + 1, e);
                    malformed += 1;
                }
            }
        }

        tracing::info!("Importing {} events from {}", events.len(), path.display());
        let mut stats = self.inject(events).await?;
        stats.rejected += malformed;
        Ok(stats)
    }

    /// Drain the writer pool, stop every context and save the store.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        tracing::info!("Shutting down {}", self.config.server_name);

        self.pool.join().await?;
        self.scheduler.interrupt_all();
        self.scheduler.join_all().await?;

        if let Some(path) = &self.config.db.path {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            self.dbs.database().save(path)?;
        }

        Ok(())
    }
}
