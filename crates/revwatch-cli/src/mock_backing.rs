//! A synthetic Backing that churns through a handful of machines so the
//! demo has something to watch without a real database behind it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use revwatch_core::Store;
use revwatch_coordinator::Backing;

use crate::machine::Machine;

#[derive(Debug, Clone)]
pub enum Change {
    Update(Machine),
    Remove(revwatch_core::EntityId),
}

#[derive(Debug, Error)]
#[error("mock backing churn task ended unexpectedly")]
pub struct MockBackingError;

/// Deterministic churn: boots `machine_count` machines as "pending", then
/// cycles each through "running" and "stopped" (the latter a removal) on a
/// fixed interval, looping forever.
pub struct MockBacking {
    machine_count: usize,
    tick: Duration,
    watching: AtomicBool,
    sink: Mutex<Option<mpsc::Sender<Change>>>,
}

impl MockBacking {
    pub fn new(machine_count: usize, tick: Duration) -> Self {
        Self {
            machine_count,
            tick,
            watching: AtomicBool::new(false),
            sink: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Backing<Machine> for MockBacking {
    type Change = Change;
    type Error = MockBackingError;

    async fn get_all(&self, store: &mut Store<Machine>) -> Result<(), Self::Error> {
        for i in 0..self.machine_count {
            store.update(Machine::new(i.to_string(), "pending"));
        }
        Ok(())
    }

    async fn changed(&self, store: &mut Store<Machine>, change: Self::Change) -> Result<(), Self::Error> {
        match change {
            Change::Update(m) => store.update(m),
            Change::Remove(id) => store.remove(&id),
        }
        Ok(())
    }

    async fn watch(&self, sink: mpsc::Sender<Self::Change>) {
        if self.watching.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.sink.lock().unwrap() = Some(sink.clone());

        let machine_count = self.machine_count;
        let tick = self.tick;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                for i in 0..machine_count {
                    let id = i.to_string();
                    if sink
                        .send(Change::Update(Machine::new(id.clone(), "running")))
                        .await
                        .is_err()
                    {
                        debug!("demo churn task exiting, sink closed");
                        return;
                    }
                    interval.tick().await;
                    if sink
                        .send(Change::Remove(revwatch_core::EntityId::new("machine", id)))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
        });
    }

    async fn unwatch(&self, _sink: &mpsc::Sender<Self::Change>) {
        *self.sink.lock().unwrap() = None;
    }
}
