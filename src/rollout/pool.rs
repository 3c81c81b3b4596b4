//! Rollout worker pool
//!
//! One worker per environment spec. Commands go out over per-worker bounded
//! queues and results come back over one shared bounded queue. The pool only
//! ever waits for requests it has in flight, each with its own deadline.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::worker::{self, Command, Episode, Outcome, WorkerHandle};
use crate::{
    Error, Result,
    config::EnvRuntime,
    env::EnvFactory,
    ports::Policy,
    trajectory::EpisodeStats,
};

struct Slot {
    factory: EnvFactory,
    worker: Option<WorkerHandle>,
    generation: u64,
}

struct InFlight {
    request: u64,
    generation: u64,
    episodes: usize,
    deadline: Instant,
    attempts: usize,
}

/// Fault counters since the pool was spawned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultCounts {
    /// Errors reported by an environment
    pub faults: u64,
    /// Requests that missed their deadline
    pub timeouts: u64,
    /// Requests abandoned after exhausting retries
    pub skipped: u64,
}

/// Pool of live environments, one worker thread each.
pub struct RolloutPool {
    slots: Vec<Slot>,
    results_tx: Sender<Outcome>,
    results_rx: Receiver<Outcome>,
    runtime: EnvRuntime,
    rng: StdRng,
    next_request: u64,
    cursor: usize,
    counts: FaultCounts,
    stopped: bool,
}

impl RolloutPool {
    /// Build every environment and start its worker.
    ///
    /// Environments are constructed on the calling thread so construction
    /// errors surface here.
    pub fn spawn(factories: Vec<EnvFactory>, runtime: EnvRuntime, seed: u64) -> Result<Self> {
        if factories.is_empty() {
            return Err(Error::config("rollout pool needs at least one environment"));
        }
        let (results_tx, results_rx) = crossbeam_channel::bounded(factories.len() * 2);
        let mut pool = Self {
            slots: factories
                .into_iter()
                .map(|factory| Slot {
                    factory,
                    worker: None,
                    generation: 0,
                })
                .collect(),
            results_tx,
            results_rx,
            runtime,
            rng: StdRng::seed_from_u64(seed),
            next_request: 0,
            cursor: 0,
            counts: FaultCounts::default(),
            stopped: false,
        };
        for slot in 0..pool.slots.len() {
            let env = pool.slots[slot].factory.build(pool.rng.random())?;
            pool.install(slot, env)?;
        }
        tracing::info!(workers = pool.slots.len(), "rollout pool started");
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.factory.label()).collect()
    }

    /// Policy identities of the environments, in slot order
    pub fn policy_ids(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.factory.policy_id()).collect()
    }

    pub fn fault_counts(&self) -> FaultCounts {
        self.counts
    }

    fn install(&mut self, slot: usize, env: Box<dyn crate::ports::Environment>) -> Result<()> {
        let entry = &mut self.slots[slot];
        entry.generation += 1;
        let handle = worker::spawn(slot, entry.generation, env, self.results_tx.clone())?;
        entry.worker = Some(handle);
        Ok(())
    }

    /// Detach the worker in `slot`.
    ///
    /// The thread is told to stop but never joined; it may be stuck.
    fn retire(&mut self, slot: usize) {
        if let Some(old) = self.slots[slot].worker.take() {
            let _ = old.commands.try_send(Command::Stop);
            tracing::debug!(slot, generation = old.generation, "worker retired");
        }
    }

    /// Replace the worker in `slot` with a freshly built environment.
    fn rebuild(&mut self, slot: usize) -> Result<()> {
        self.retire(slot);
        let env = self.slots[slot].factory.build(self.rng.random())?;
        self.install(slot, env)
    }

    fn dispatch(&mut self, slot: usize, policy: &Arc<dyn Policy>, episodes: usize) -> Result<u64> {
        let request = self.next_request;
        self.next_request += 1;
        let seed = self.rng.random();
        let label = self.slots[slot].factory.label().to_string();
        let worker = self.slots[slot]
            .worker
            .as_ref()
            .ok_or_else(|| Error::EnvironmentFault {
                spec: label.clone(),
                message: "no live worker".to_string(),
            })?;
        worker
            .commands
            .send(Command::Rollout {
                request,
                policy: Arc::clone(policy),
                episodes,
                seed,
            })
            .map_err(|_| Error::EnvironmentFault {
                spec: label,
                message: "worker exited".to_string(),
            })?;
        Ok(request)
    }

    /// Rebuild and redispatch after a retryable failure.
    ///
    /// Returns the new in-flight entry, or `None` once retries are spent.
    fn retry(
        &mut self,
        slot: usize,
        mut flight: InFlight,
        policy: &Arc<dyn Policy>,
        error: &Error,
    ) -> Result<Option<InFlight>> {
        loop {
            flight.attempts += 1;
            let label = self.slots[slot].factory.label().to_string();
            if flight.attempts > self.runtime.max_retries {
                self.counts.skipped += 1;
                // A hung worker must not be handed the next request
                self.retire(slot);
                tracing::warn!(
                    spec = %label,
                    error = %error,
                    "environment keeps failing, skipping request"
                );
                return Ok(None);
            }
            tracing::warn!(
                spec = %label,
                attempt = flight.attempts,
                error = %error,
                "environment fault, rebuilding"
            );

            let redispatched = self
                .rebuild(slot)
                .and_then(|()| self.dispatch(slot, policy, flight.episodes));
            match redispatched {
                Ok(request) => {
                    return Ok(Some(InFlight {
                        request,
                        generation: self.slots[slot].generation,
                        deadline: Instant::now() + self.deadline_for(flight.episodes),
                        ..flight
                    }));
                }
                Err(e) if e.is_retryable() => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn deadline_for(&self, episodes: usize) -> Duration {
        let episodes = u32::try_from(episodes.max(1)).unwrap_or(u32::MAX);
        self.runtime.timeout().saturating_mul(episodes)
    }

    /// Run `assignments` (slot, episodes) and gather the finished episodes.
    fn run(
        &mut self,
        policy: &Arc<dyn Policy>,
        assignments: Vec<(usize, usize)>,
    ) -> Result<Vec<Episode>> {
        if self.stopped {
            return Err(Error::config("rollout pool has been shut down"));
        }
        // Drop anything left over from retired workers
        while self.results_rx.try_recv().is_ok() {}

        let mut in_flight: HashMap<usize, InFlight> = HashMap::new();
        for (slot, episodes) in assignments {
            let flight = InFlight {
                request: 0,
                generation: self.slots[slot].generation,
                episodes,
                deadline: Instant::now() + self.deadline_for(episodes),
                attempts: 0,
            };
            let dispatched = if self.slots[slot].worker.is_some() {
                self.dispatch(slot, policy, episodes)
            } else {
                self.rebuild(slot)
                    .and_then(|()| self.dispatch(slot, policy, episodes))
            };
            match dispatched {
                Ok(request) => {
                    let generation = self.slots[slot].generation;
                    in_flight.insert(
                        slot,
                        InFlight {
                            request,
                            generation,
                            ..flight
                        },
                    );
                }
                Err(e) if e.is_retryable() => {
                    self.counts.faults += 1;
                    if let Some(next) = self.retry(slot, flight, policy, &e)? {
                        in_flight.insert(slot, next);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        let mut episodes = Vec::new();
        while !in_flight.is_empty() {
            let nearest = in_flight
                .values()
                .map(|flight| flight.deadline)
                .min()
                .unwrap_or_else(Instant::now);
            let wait = nearest.saturating_duration_since(Instant::now());

            match self.results_rx.recv_timeout(wait) {
                Ok(outcome) => {
                    let current = in_flight.get(&outcome.slot).is_some_and(|flight| {
                        flight.request == outcome.request && flight.generation == outcome.generation
                    });
                    if !current {
                        continue;
                    }
                    let Some(flight) = in_flight.remove(&outcome.slot) else {
                        continue;
                    };
                    match outcome.result {
                        Ok(done) => episodes.extend(done),
                        Err(e) if e.is_retryable() => {
                            self.counts.faults += 1;
                            if let Some(next) = self.retry(outcome.slot, flight, policy, &e)? {
                                in_flight.insert(outcome.slot, next);
                            }
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    let expired: Vec<usize> = in_flight
                        .iter()
                        .filter(|(_, flight)| flight.deadline <= now)
                        .map(|(slot, _)| *slot)
                        .collect();
                    for slot in expired {
                        let Some(flight) = in_flight.remove(&slot) else {
                            continue;
                        };
                        self.counts.timeouts += 1;
                        let error = Error::EnvironmentTimeout {
                            spec: self.slots[slot].factory.label().to_string(),
                            waited: self.deadline_for(flight.episodes),
                        };
                        if let Some(next) = self.retry(slot, flight, policy, &error)? {
                            in_flight.insert(slot, next);
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::config("rollout result channel closed"));
                }
            }
        }
        Ok(episodes)
    }

    /// Collect `count` episodes, spread round-robin across environments.
    pub fn collect(&mut self, policy: Arc<dyn Policy>, count: usize) -> Result<Vec<Episode>> {
        let n = self.slots.len();
        let mut per_slot = vec![0usize; n];
        for i in 0..count {
            per_slot[(self.cursor + i) % n] += 1;
        }
        self.cursor = (self.cursor + count) % n;
        let assignments = per_slot
            .into_iter()
            .enumerate()
            .filter(|(_, episodes)| *episodes > 0)
            .collect();
        self.run(&policy, assignments)
    }

    /// Play `episodes_per_env` episodes in every environment.
    pub fn evaluate(
        &mut self,
        policy: Arc<dyn Policy>,
        episodes_per_env: usize,
    ) -> Result<Vec<EpisodeStats>> {
        if episodes_per_env == 0 {
            return Ok(Vec::new());
        }
        let assignments = (0..self.slots.len())
            .map(|slot| (slot, episodes_per_env))
            .collect();
        Ok(self
            .run(&policy, assignments)?
            .into_iter()
            .map(|episode| episode.stats)
            .collect())
    }

    /// Signal every worker to stop and join the ones that are responsive.
    ///
    /// Workers get one environment timeout in total to exit; the rest are
    /// detached.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let handles: Vec<(usize, WorkerHandle)> = self
            .slots
            .iter_mut()
            .enumerate()
            .filter_map(|(slot, entry)| entry.worker.take().map(|handle| (slot, handle)))
            .collect();
        for (_, handle) in &handles {
            let _ = handle.commands.try_send(Command::Stop);
        }
        // Unblock workers waiting to report a result
        while self.results_rx.try_recv().is_ok() {}

        let deadline = Instant::now() + self.runtime.timeout();
        let (mut joined, mut detached) = (0usize, 0usize);
        for (slot, handle) in handles {
            let WorkerHandle {
                commands,
                thread,
                exited,
                generation,
            } = handle;
            drop(commands);
            let wait = deadline.saturating_duration_since(Instant::now());
            match exited.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {
                    detached += 1;
                    tracing::warn!(slot, generation, "worker did not stop in time, detaching");
                }
                _ => {
                    if thread.join().is_ok() {
                        joined += 1;
                    }
                }
            }
        }
        tracing::info!(joined, detached, "rollout pool stopped");
    }
}

impl Drop for RolloutPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        interface::{Observation, ObservationPolicy},
        ports::{Environment, StepResult},
    };

    struct FirstAction;

    impl Policy for FirstAction {
        fn act(&self, _observation: &Observation, _rng: &mut StdRng) -> usize {
            0
        }
    }

    /// Ends every episode after `length` steps; optionally fails once.
    struct CountingEnv {
        label: String,
        length: usize,
        t: usize,
        fail_first_step: bool,
    }

    impl Environment for CountingEnv {
        fn label(&self) -> String {
            self.label.clone()
        }

        fn reset(&mut self) -> Result<Observation> {
            self.t = 0;
            Ok(Observation {
                numbers: vec![0.0],
                tokens: Vec::new(),
            })
        }

        fn step(&mut self, _action: usize) -> Result<StepResult> {
            if self.fail_first_step {
                return Err(Error::EnvironmentFault {
                    spec: self.label.clone(),
                    message: "simulated crash".to_string(),
                });
            }
            self.t += 1;
            Ok(StepResult {
                observation: Observation {
                    numbers: vec![self.t as f32],
                    tokens: Vec::new(),
                },
                reward: 1.0,
                terminated: self.t >= self.length,
                truncated: false,
                result: None,
            })
        }
    }

    /// Hangs on every step of its first `hanging_builds` instances.
    struct StallingEnv {
        inner: CountingEnv,
        hang: bool,
    }

    impl Environment for StallingEnv {
        fn label(&self) -> String {
            self.inner.label()
        }

        fn reset(&mut self) -> Result<Observation> {
            self.inner.reset()
        }

        fn step(&mut self, action: usize) -> Result<StepResult> {
            if self.hang {
                loop {
                    std::thread::sleep(Duration::from_millis(50));
                }
            }
            self.inner.step(action)
        }
    }

    fn stalling_factory(name: &str, hanging_builds: usize) -> EnvFactory {
        let builds = Arc::new(AtomicUsize::new(0));
        let label = name.to_string();
        EnvFactory::from_fn(name, ObservationPolicy::default().id(), move |_seed| {
            let n = builds.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StallingEnv {
                inner: CountingEnv {
                    label: label.clone(),
                    length: 3,
                    t: 0,
                    fail_first_step: false,
                },
                hang: n < hanging_builds,
            }) as Box<dyn Environment>)
        })
    }

    fn impatient(max_retries: usize) -> EnvRuntime {
        EnvRuntime {
            timeout_secs: 1,
            max_retries,
        }
    }

    fn runtime() -> EnvRuntime {
        EnvRuntime {
            timeout_secs: 5,
            max_retries: 2,
        }
    }

    fn factory(name: &str, failing_builds: usize) -> EnvFactory {
        let builds = Arc::new(AtomicUsize::new(0));
        let label = name.to_string();
        EnvFactory::from_fn(name, ObservationPolicy::default().id(), move |_seed| {
            let n = builds.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingEnv {
                label: label.clone(),
                length: 3,
                t: 0,
                fail_first_step: n < failing_builds,
            }) as Box<dyn Environment>)
        })
    }

    #[test]
    fn test_collect_is_round_robin() {
        let factories = vec![factory("a", 0), factory("b", 0), factory("c", 0)];
        let mut pool = RolloutPool::spawn(factories, runtime(), 0).unwrap();
        let policy: Arc<dyn Policy> = Arc::new(FirstAction);

        let first = pool.collect(Arc::clone(&policy), 2).unwrap();
        let second = pool.collect(policy, 4).unwrap();
        let mut specs: Vec<String> = first
            .iter()
            .chain(&second)
            .map(|episode| episode.stats.spec.clone())
            .collect();
        specs.sort();
        assert_eq!(specs, vec!["a", "a", "b", "b", "c", "c"]);
        pool.shutdown();
    }

    #[test]
    fn test_faulty_environment_is_rebuilt_and_retried() {
        let factories = vec![factory("healthy", 0), factory("flaky", 1)];
        let mut pool = RolloutPool::spawn(factories, runtime(), 0).unwrap();
        let stats = pool.evaluate(Arc::new(FirstAction), 2).unwrap();

        assert_eq!(stats.len(), 4);
        assert!(stats.iter().all(|s| s.length == 3));
        assert_eq!(pool.fault_counts().faults, 1);
        assert_eq!(pool.fault_counts().skipped, 0);
    }

    #[test]
    fn test_persistent_fault_is_skipped() {
        let factories = vec![factory("healthy", 0), factory("broken", usize::MAX)];
        let mut pool = RolloutPool::spawn(factories, runtime(), 0).unwrap();
        let stats = pool.evaluate(Arc::new(FirstAction), 1).unwrap();

        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].spec, "healthy");
        assert_eq!(pool.fault_counts().skipped, 1);
    }

    #[test]
    fn test_construction_failure_is_fatal() {
        let failing = EnvFactory::from_fn("bad", "x", |_seed| {
            Err(Error::config("team built for the wrong generation"))
        });
        assert!(RolloutPool::spawn(vec![failing], runtime(), 0).is_err());
    }

    #[test]
    fn test_stalled_environment_times_out_and_is_rebuilt() {
        let factories = vec![factory("healthy", 0), stalling_factory("stalled", 1)];
        let mut pool = RolloutPool::spawn(factories, impatient(1), 0).unwrap();
        let stats = pool.evaluate(Arc::new(FirstAction), 1).unwrap();

        let mut specs: Vec<&str> = stats.iter().map(|s| s.spec.as_str()).collect();
        specs.sort();
        assert_eq!(specs, vec!["healthy", "stalled"]);
        assert_eq!(pool.fault_counts().timeouts, 1);
        assert_eq!(pool.fault_counts().skipped, 0);

        let started = Instant::now();
        pool.shutdown();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_shutdown_returns_after_a_hung_request_is_skipped() {
        let factories = vec![stalling_factory("stalled", usize::MAX)];
        let mut pool = RolloutPool::spawn(factories, impatient(1), 0).unwrap();
        let stats = pool.evaluate(Arc::new(FirstAction), 1).unwrap();

        assert!(stats.is_empty());
        assert_eq!(pool.fault_counts().timeouts, 2);
        assert_eq!(pool.fault_counts().skipped, 1);

        let started = Instant::now();
        pool.shutdown();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_shutdown_detaches_a_busy_worker() {
        let factories = vec![stalling_factory("stalled", usize::MAX)];
        let mut pool = RolloutPool::spawn(factories, impatient(0), 0).unwrap();
        let policy: Arc<dyn Policy> = Arc::new(FirstAction);
        pool.dispatch(0, &policy, 1).unwrap();

        let started = Instant::now();
        pool.shutdown();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(pool.collect(policy, 1).is_err());
    }
}
