//! Message passing between the workers of one run.
//!
//! Workers share no mutable state. Rank 0 is the root: it validates the run,
//! publishes broadcast values and receives every follower's contribution.
//! Broadcasts travel over zero-capacity channels, so each one is a
//! rendezvous: the root cannot start the next round until every follower has
//! taken the current value.
//!
//! A worker that fails simply returns, dropping its endpoints. Peers blocked
//! on a collective see the disconnect and return [`SieveError::Aborted`], so
//! the cohort always winds down together.

use std::sync::{Arc, Barrier};
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::debug;

use crate::error::{Result, SieveError};
use crate::grid::OddStore;
use crate::stats::WorkerReport;

pub const ROOT: usize = 0;

/// Messages published by the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Proceed,
    Abort,
    Value(u64),
}

/// What a worker hands to the root at the end of a run.
#[derive(Debug)]
pub struct Contribution {
    pub report: WorkerReport,
    /// Present only when the merge needs the whole grid.
    pub grid: Option<OddStore>,
}

enum Role {
    Root {
        followers: Vec<Sender<Signal>>,
        inbox: Receiver<Contribution>,
    },
    Follower {
        signals: Receiver<Signal>,
        outbox: Sender<Contribution>,
    },
}

pub struct Communicator {
    barrier: Arc<Barrier>,
    role: Role,
}

impl Communicator {
    /// Wires up one communicator per rank for a cohort of `size` workers.
    fn cohort(size: usize) -> Vec<Communicator> {
        let barrier = Arc::new(Barrier::new(size));
        let (outbox, inbox) = bounded(size);

        let mut followers = Vec::with_capacity(size.saturating_sub(1));
        let mut communicators = Vec::with_capacity(size);
        for _ in 1..size {
            let (tx, rx) = bounded(0);
            followers.push(tx);
            communicators.push(Communicator {
                barrier: Arc::clone(&barrier),
                role: Role::Follower {
                    signals: rx,
                    outbox: outbox.clone(),
                },
            });
        }
        // The root never sends to itself; dropping this sender lets the root
        // notice when every follower is gone.
        drop(outbox);

        communicators.insert(
            ROOT,
            Communicator {
                barrier,
                role: Role::Root { followers, inbox },
            },
        );
        communicators
    }

    pub fn barrier(&self) {
        self.barrier.wait();
    }

    /// Root evaluates `verdict` and tells every follower whether to proceed.
    /// Followers block until the root has decided. On failure the root gets
    /// the real error back and followers get [`SieveError::Aborted`].
    pub fn start(&self, verdict: impl FnOnce() -> Result<()>) -> Result<()> {
        match &self.role {
            Role::Root { followers, .. } => match verdict() {
                Ok(()) => {
                    for follower in followers {
                        follower.send(Signal::Proceed).map_err(|_| SieveError::Aborted)?;
                    }
                    Ok(())
                }
                Err(err) => {
                    for follower in followers {
                        // A follower that is already gone needs no notice.
                        let _ = follower.send(Signal::Abort);
                    }
                    Err(err)
                }
            },
            Role::Follower { signals, .. } => match signals.recv() {
                Ok(Signal::Proceed) => Ok(()),
                _ => Err(SieveError::Aborted),
            },
        }
    }

    /// Delivers the root's `value` to every worker and returns it. The value
    /// passed by followers is ignored.
    pub fn broadcast(&self, value: u64) -> Result<u64> {
        match &self.role {
            Role::Root { followers, .. } => {
                for follower in followers {
                    follower
                        .send(Signal::Value(value))
                        .map_err(|_| SieveError::Aborted)?;
                }
                Ok(value)
            }
            Role::Follower { signals, .. } => match signals.recv() {
                Ok(Signal::Value(value)) => Ok(value),
                _ => Err(SieveError::Aborted),
            },
        }
    }

    /// Collects every worker's contribution on the root, ordered by rank.
    /// Followers get `None` back once their contribution is handed off.
    /// `on_receive` runs on the root for each follower's contribution.
    pub fn gather(
        &self,
        own: Contribution,
        mut on_receive: impl FnMut(&Contribution),
    ) -> Result<Option<Vec<Contribution>>> {
        match &self.role {
            Role::Root { followers, inbox } => {
                let mut all = Vec::with_capacity(followers.len() + 1);
                all.push(own);
                for _ in 0..followers.len() {
                    let contribution = inbox.recv().map_err(|_| SieveError::Aborted)?;
                    debug!(from = contribution.report.rank, "contribution received");
                    on_receive(&contribution);
                    all.push(contribution);
                }
                all.sort_by_key(|c| c.report.rank);
                Ok(Some(all))
            }
            Role::Follower { outbox, .. } => {
                outbox.send(own).map_err(|_| SieveError::Aborted)?;
                Ok(None)
            }
        }
    }
}

/// Everything a worker knows about the run it belongs to.
pub struct WorkerContext {
    pub rank: usize,
    pub size: usize,
    pub comm: Communicator,
}

impl WorkerContext {
    pub fn is_root(&self) -> bool {
        self.rank == ROOT
    }
}

/// Runs `body` once on each of `size` worker threads and returns their
/// results indexed by rank. Fails without running `body` anywhere if a worker
/// thread cannot be started.
pub fn run_cohort<T, F>(size: usize, body: F) -> Result<Vec<Result<T>>>
where
    T: Send,
    F: Fn(WorkerContext) -> Result<T> + Sync,
{
    launch(size, worker_thread, body)
}

fn worker_thread(rank: usize) -> thread::Builder {
    thread::Builder::new().name(format!("worker-{rank}"))
}

fn launch<T, F, B>(size: usize, builder: B, body: F) -> Result<Vec<Result<T>>>
where
    T: Send,
    F: Fn(WorkerContext) -> Result<T> + Sync,
    B: Fn(usize) -> thread::Builder,
{
    let communicators = Communicator::cohort(size);
    let body = &body;
    // Holds every worker until the whole cohort exists. Dropping the sender
    // without a token releases them into an abort instead.
    let (gate, released) = bounded::<()>(size);

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(size);
        for (rank, comm) in communicators.into_iter().enumerate() {
            let released = released.clone();
            let spawned = builder(rank).spawn_scoped(scope, move || -> Result<T> {
                released.recv().map_err(|_| SieveError::Aborted)?;
                body(WorkerContext { rank, size, comm })
            });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    drop(gate);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(SieveError::Spawn { rank, source });
                }
            }
        }
        debug!(size, "cohort started");

        for _ in 0..size {
            gate.send(()).map_err(|_| SieveError::Aborted)?;
        }

        Ok(handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect())
    })
}
