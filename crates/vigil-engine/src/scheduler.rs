// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The cooperative scheduler.
//!
//! A single background loop that sleeps one second at a time and fires due
//! tasks in order. Hosts the periodic buffer flush, the T2 poll, T3 events
//! and the stats publisher; stops when the shared token cancels.

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

type Job = Box<dyn FnMut() -> BoxFuture<'static, ()> + Send>;

struct ScheduledTask {
    name: String,
    interval: Duration,
    last_fired: Option<Instant>,
    job: Job,
}

/// Periodic task host.
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
    cancel: CancellationToken,
    tick: Duration,
}

impl Scheduler {
    /// A scheduler observing the given stop token.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            tasks: Vec::new(),
            cancel,
            tick: Duration::from_secs(1),
        }
    }

    /// Override the tick length (tests).
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Register a periodic task; it first fires one interval after start.
    pub fn add_periodic<F>(&mut self, name: &str, interval: Duration, job: F)
    where
        F: FnMut() -> BoxFuture<'static, ()> + Send + 'static,
    {
        self.tasks.push(ScheduledTask {
            name: name.to_string(),
            interval,
            last_fired: None,
            job: Box::new(job),
        });
    }

    /// Run until cancelled. Tasks execute on this loop, one at a time;
    /// anything long-running should hand off internally.
    pub async fn run(mut self) {
        info!(tasks = self.tasks.len(), "Scheduler started");
        for task in &mut self.tasks {
            task.last_fired = Some(Instant::now());
        }
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    info!("Scheduler shutting down");
                    break;
                }

                _ = tokio::time::sleep(self.tick) => {
                    let now = Instant::now();
                    for task in &mut self.tasks {
                        let due = task
                            .last_fired
                            .is_none_or(|t| now.duration_since(t) >= task.interval);
                        if due {
                            debug!(task = %task.name, "Firing scheduled task");
                            task.last_fired = Some(now);
                            (task.job)().await;
                        }
                        if self.cancel.is_cancelled() {
                            break;
                        }
                    }
                }
            }
        }
        info!("Scheduler stopped");
    }
}
