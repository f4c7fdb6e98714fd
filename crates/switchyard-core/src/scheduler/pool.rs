//! WorkerPool - 上限付きスレッドプール
//!
//! # 実装詳細
//! - `Mutex<PoolState>` で待ち行列とワーカー数を排他制御
//! - `Condvar` で submit 時に待機中のワーカーへ通知
//! - core 数を超えたワーカーは keep_alive の間アイドルなら退役する
//!
//! # 受付順序
//! 1. 稼働ワーカーが core 未満 → 新しいワーカーを起動して直接渡す
//! 2. 待ち行列に空きがある → 待ち行列へ
//! 3. ワーカーが max 未満 → 新しいワーカーを起動して直接渡す
//! 4. それ以外 → Saturated で拒否
//!
//! core 0 のときは、待ち行列に入れた時点でワーカーが 1 本もなければ起動する。

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;

use tracing::{debug, warn};

use super::config::PoolConfig;
use super::submission::{Submission, panic_message};
use crate::domain::SwitchyardError;
use crate::observability::PoolStats;
use crate::sync::{lock, wait, wait_timeout};

/// Submission refused at admission, handed back with the reason.
#[derive(Debug)]
pub struct Rejection {
    pub submission: Submission,
    pub error: SwitchyardError,
}

struct PoolState {
    queue: VecDeque<Submission>,
    workers: usize,
    idle: usize,
    shutdown: bool,
    completed: u64,
    rejected: u64,
}

struct Shared {
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
    next_worker: AtomicUsize,
}

/// Bounded pool of OS worker threads.
///
/// Dropping the pool shuts it down; queued submissions are cancelled.
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    workers: 0,
                    idle: 0,
                    shutdown: false,
                    completed: 0,
                    rejected: 0,
                }),
                available: Condvar::new(),
                next_worker: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Admit one submission. Never blocks on running work.
    pub fn submit(&self, submission: Submission) -> Result<(), Rejection> {
        let config = &self.shared.config;
        let mut state = lock(&self.shared.state);

        if state.shutdown {
            state.rejected += 1;
            return Err(Rejection {
                submission,
                error: SwitchyardError::ShuttingDown,
            });
        }

        if state.workers < config.core_workers {
            return self.spawn_worker(state, submission);
        }

        if state.queue.len() < config.queue_capacity {
            state.queue.push_back(submission);
            if state.workers == 0 {
                // core 0 の場合: 待ち行列を拾うワーカーがいないので 1 本起こす
                if let Some(first) = state.queue.pop_front() {
                    return self.spawn_worker(state, first);
                }
            }
            self.shared.available.notify_one();
            return Ok(());
        }

        if state.workers < config.max_workers {
            return self.spawn_worker(state, submission);
        }

        state.rejected += 1;
        let error = SwitchyardError::Saturated {
            workers: state.workers,
            queued: state.queue.len(),
        };
        warn!(
            task = submission.task_name(),
            workers = state.workers,
            queued = state.queue.len(),
            "worker pool saturated, rejecting submission"
        );
        Err(Rejection { submission, error })
    }

    /// Stop accepting work, wake every worker and hand back what never started.
    ///
    /// Running submissions are not interrupted; their workers exit once they
    /// finish.
    pub fn shutdown_now(&self) -> Vec<Submission> {
        let mut state = lock(&self.shared.state);
        state.shutdown = true;
        let drained: Vec<Submission> = state.queue.drain(..).collect();
        self.shared.available.notify_all();
        if !drained.is_empty() {
            debug!(pending = drained.len(), "worker pool shut down with pending submissions");
        }
        drained
    }

    pub fn is_shutdown(&self) -> bool {
        lock(&self.shared.state).shutdown
    }

    pub fn stats(&self) -> PoolStats {
        let state = lock(&self.shared.state);
        PoolStats {
            workers: state.workers,
            idle: state.idle,
            queued: state.queue.len(),
            completed: state.completed,
            rejected: state.rejected,
        }
    }

    fn spawn_worker(
        &self,
        mut state: MutexGuard<'_, PoolState>,
        first: Submission,
    ) -> Result<(), Rejection> {
        state.workers += 1;
        drop(state);

        let n = self.shared.next_worker.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{n}", self.shared.config.thread_name);

        // spawn 失敗時に submission を取り戻せるよう、受け渡し用のスロットを挟む
        let handoff = Arc::new(Mutex::new(Some(first)));
        let worker_handoff = Arc::clone(&handoff);
        let shared = Arc::clone(&self.shared);

        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            let first = lock(&worker_handoff).take();
            worker_loop(shared, first);
        });

        match spawned {
            Ok(_) => {
                debug!(worker = %name, "worker spawned");
                Ok(())
            }
            Err(e) => {
                let mut state = lock(&self.shared.state);
                state.workers -= 1;
                state.rejected += 1;
                drop(state);
                warn!(worker = %name, error = %e, "failed to spawn worker thread");
                match lock(&handoff).take() {
                    Some(submission) => Err(Rejection {
                        submission,
                        error: SwitchyardError::WorkerSpawn(e),
                    }),
                    // ここには来ない: spawn に失敗したクロージャは実行されていない
                    None => Ok(()),
                }
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // 返ってきた submission はここで drop され、Cancelled が通知される
        self.shutdown_now();
    }
}

fn worker_loop(shared: Arc<Shared>, mut next: Option<Submission>) {
    while let Some(submission) = next.take() {
        let task = submission.task_name();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| submission.run())) {
            // UseCase の panic は Submission 内で Panicked に変換済み。ここに来るのは
            // その failure 通知中にコールバックが panic した場合だけ。
            warn!(task, message = %panic_message(payload.as_ref()), "callback panicked on worker");
        }
        lock(&shared.state).completed += 1;
        next = next_submission(&shared);
    }
}

/// Block until there is work, or return `None` when this worker should exit.
/// Exiting workers are already subtracted from the live count.
fn next_submission(shared: &Shared) -> Option<Submission> {
    let config = &shared.config;
    let mut state = lock(&shared.state);
    loop {
        if state.shutdown {
            state.workers -= 1;
            return None;
        }
        if let Some(submission) = state.queue.pop_front() {
            return Some(submission);
        }

        state.idle += 1;
        if state.workers > config.core_workers {
            let (guard, result) = wait_timeout(&shared.available, state, config.keep_alive());
            state = guard;
            state.idle -= 1;
            if result.timed_out()
                && state.queue.is_empty()
                && !state.shutdown
                && state.workers > config.core_workers
            {
                state.workers -= 1;
                debug!(workers = state.workers, "retiring idle worker");
                return None;
            }
        } else {
            state = wait(&shared.available, state);
            state.idle -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UseCaseError;
    use crate::usecase::{Completion, callback, from_fn};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    /// Submission that blocks its worker until `gate` is dropped or sent to.
    fn gated(
        gate: &Arc<Mutex<mpsc::Receiver<()>>>,
        done: &mpsc::Sender<u32>,
        tag: u32,
    ) -> Submission {
        let gate = Arc::clone(gate);
        let task = Arc::new(from_fn("gated", move |tag: u32, c: Completion<u32>| {
            let _ = gate.lock().unwrap().recv();
            c.pass(tag)
        }));
        let done = done.clone();
        Submission::bind(
            task,
            tag,
            callback(
                move |tag: u32| done.send(tag).unwrap(),
                |_e: UseCaseError| {},
            ),
        )
    }

    fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        check()
    }

    #[test]
    fn runs_submissions_on_worker_threads() {
        let pool = WorkerPool::new(PoolConfig::default());
        let (tx, rx) = mpsc::channel();
        for n in 0..3u32 {
            let tx = tx.clone();
            let task = Arc::new(from_fn("name", |n: u32, c: Completion<(u32, String)>| {
                let name = thread::current().name().unwrap_or_default().to_string();
                c.pass((n, name))
            }));
            pool.submit(Submission::bind(
                task,
                n,
                callback(
                    move |v: (u32, String)| tx.send(v).unwrap(),
                    |_e: UseCaseError| {},
                ),
            ))
            .unwrap();
        }
        let mut seen: Vec<(u32, String)> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort();
        assert_eq!(seen.iter().map(|(n, _)| *n).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(seen.iter().all(|(_, name)| name.starts_with("switchyard-worker-")));
        assert!(pool.stats().workers <= 2);
    }

    #[test]
    fn saturates_at_max_workers_plus_queue() {
        let pool = WorkerPool::new(PoolConfig::default());
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let gate = Arc::new(Mutex::new(gate_rx));
        let (done_tx, done_rx) = mpsc::channel();

        // 2 core + 4 queued + 2 extra workers = 8 admitted
        for tag in 0..8 {
            pool.submit(gated(&gate, &done_tx, tag)).unwrap();
        }
        let stats = pool.stats();
        assert_eq!(stats.workers, 4);
        assert_eq!(stats.queued, 4);

        let rejected = pool.submit(gated(&gate, &done_tx, 99)).unwrap_err();
        assert!(matches!(
            rejected.error,
            SwitchyardError::Saturated { workers: 4, queued: 4 }
        ));
        assert_eq!(rejected.submission.task_name(), "gated");
        rejected.submission.discard();
        assert_eq!(pool.stats().rejected, 1);

        drop(gate_tx);
        let mut done: Vec<u32> = (0..8)
            .map(|_| done_rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        done.sort();
        assert_eq!(done, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn shutdown_returns_queued_submissions() {
        let pool = WorkerPool::new(PoolConfig::default().with_workers(1, 1));
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let gate = Arc::new(Mutex::new(gate_rx));
        let (done_tx, done_rx) = mpsc::channel();

        pool.submit(gated(&gate, &done_tx, 0)).unwrap();
        pool.submit(gated(&gate, &done_tx, 1)).unwrap();
        pool.submit(gated(&gate, &done_tx, 2)).unwrap();

        let pending = pool.shutdown_now();
        assert_eq!(pending.len(), 2);
        pending.into_iter().for_each(Submission::discard);
        assert!(pool.is_shutdown());

        let late = pool.submit(gated(&gate, &done_tx, 3)).unwrap_err();
        assert!(matches!(late.error, SwitchyardError::ShuttingDown));
        late.submission.discard();

        // 実行中の 1 件は最後まで走る
        drop(gate_tx);
        assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 0);
        assert!(wait_until(Duration::from_secs(5), || pool.stats().workers == 0));
    }

    #[test]
    fn idle_workers_above_core_retire() {
        let config = PoolConfig::default()
            .with_workers(1, 3)
            .with_queue_capacity(0)
            .with_keep_alive(Duration::from_millis(50));
        let pool = WorkerPool::new(config);
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let gate = Arc::new(Mutex::new(gate_rx));
        let (done_tx, done_rx) = mpsc::channel();

        for tag in 0..3 {
            pool.submit(gated(&gate, &done_tx, tag)).unwrap();
        }
        assert_eq!(pool.stats().workers, 3);

        drop(gate_tx);
        for _ in 0..3 {
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert!(wait_until(Duration::from_secs(5), || pool.stats().workers == 1));
        assert!(wait_until(Duration::from_secs(5), || pool.stats().completed == 3));
    }

    #[test]
    fn zero_core_pool_still_runs_queued_work() {
        let config = PoolConfig::default()
            .with_workers(0, 4)
            .with_keep_alive(Duration::from_millis(50));
        assert!(config.validate().is_ok());
        let pool = WorkerPool::new(config);

        let (tx, rx) = mpsc::channel();
        let task = Arc::new(from_fn("double", |n: u32, c: Completion<u32>| c.pass(n * 2)));
        for n in [1u32, 2] {
            let tx = tx.clone();
            pool.submit(Submission::bind(
                Arc::clone(&task),
                n,
                callback(
                    move |v: u32| {
                        let _ = tx.send(v);
                    },
                    |_e: UseCaseError| {},
                ),
            ))
            .unwrap();
        }

        let mut got: Vec<u32> = (0..2)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        got.sort();
        assert_eq!(got, vec![2, 4]);
        // core 0 なので全員 keep_alive 後に退役する
        assert!(wait_until(Duration::from_secs(5), || pool.stats().workers == 0));
    }

    #[test]
    fn panicking_callback_does_not_kill_the_pool() {
        let pool = WorkerPool::new(PoolConfig::default().with_workers(1, 1));
        let task = Arc::new(from_fn("ok", |n: u32, c: Completion<u32>| c.pass(n)));
        pool.submit(Submission::bind(
            Arc::clone(&task),
            1,
            callback(|_n: u32| panic!("view went away"), |_e: UseCaseError| {}),
        ))
        .unwrap();

        let (tx, rx) = mpsc::channel();
        pool.submit(Submission::bind(
            task,
            2,
            callback(move |n: u32| tx.send(n).unwrap(), |_e: UseCaseError| {}),
        ))
        .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 2);
        assert_eq!(pool.stats().workers, 1);
    }
}
