//! Single-flight cache for the shared highlighting engine.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use super::{HighlighterHandle, SyntectEngine};
use crate::error::EngineInitError;

/// Builds a new engine. Called at most once per construction attempt.
pub type EngineFactory =
    Box<dyn Fn() -> Result<HighlighterHandle, EngineInitError> + Send + Sync>;

/// Where the cache is in its lifecycle.
///
/// There is no resting `Failed` state: a failed attempt hands its error to
/// the callers attached to it and the cache goes back to `Uninitialized`.
enum InitializationState {
    Uninitialized,
    Initializing(Arc<Attempt>),
    Ready(HighlighterHandle),
}

/// One construction attempt and the callers waiting on it.
struct Attempt {
    id: usize,
    waiters: AtomicUsize,
    outcome: Mutex<Option<Result<HighlighterHandle, EngineInitError>>>,
    done: Condvar,
}

impl Attempt {
    fn new(id: usize) -> Self {
        Self {
            id,
            waiters: AtomicUsize::new(0),
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn wait(&self) -> Result<HighlighterHandle, EngineInitError> {
        self.waiters.fetch_add(1, Ordering::SeqCst);
        let mut outcome = lock(&self.outcome);
        let result = loop {
            if let Some(result) = outcome.as_ref() {
                break result.clone();
            }
            outcome = self
                .done
                .wait(outcome)
                .unwrap_or_else(PoisonError::into_inner);
        };
        drop(outcome);
        self.waiters.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn resolve(&self, result: Result<HighlighterHandle, EngineInitError>) {
        *lock(&self.outcome) = Some(result);
        self.done.notify_all();
    }
}

/// Lazily constructs one engine and shares it with every caller.
///
/// Concurrent first callers trigger exactly one construction; all of them
/// receive that construction's outcome. A failure is not cached, so the next
/// call tries again.
pub struct HighlighterCache {
    factory: EngineFactory,
    state: Mutex<InitializationState>,
    constructions: AtomicUsize,
}

impl HighlighterCache {
    pub fn new(factory: EngineFactory) -> Self {
        Self {
            factory,
            state: Mutex::new(InitializationState::Uninitialized),
            constructions: AtomicUsize::new(0),
        }
    }

    /// Cache backed by [`SyntectEngine`], optionally with extra syntaxes.
    pub fn syntect(extra_syntax_dir: Option<PathBuf>) -> Self {
        Self::new(Box::new(move || {
            SyntectEngine::load(extra_syntax_dir.as_deref()).map(HighlighterHandle::new)
        }))
    }

    /// Return the shared engine, constructing it if nobody has yet.
    ///
    /// Blocks the calling thread while a construction started by another
    /// caller is still running, then returns that construction's outcome.
    ///
    /// # Errors
    ///
    /// Returns the [`EngineInitError`] of the attempt this call ran or
    /// attached to.
    pub fn acquire(&self) -> Result<HighlighterHandle, EngineInitError> {
        let mut state = lock(&self.state);
        let in_flight = match &*state {
            InitializationState::Ready(handle) => return Ok(handle.clone()),
            InitializationState::Initializing(attempt) => Some(Arc::clone(attempt)),
            InitializationState::Uninitialized => None,
        };
        if let Some(attempt) = in_flight {
            drop(state);
            tracing::debug!(attempt = attempt.id, "joining in-flight highlighter construction");
            return attempt.wait();
        }

        let id = self.constructions.fetch_add(1, Ordering::SeqCst) + 1;
        let attempt = Arc::new(Attempt::new(id));
        *state = InitializationState::Initializing(Arc::clone(&attempt));
        drop(state);

        tracing::debug!(attempt = id, "constructing highlighter");
        let mut construction = Construction {
            cache: self,
            attempt: &attempt,
            finished: false,
        };
        let result = (self.factory)();
        construction.finish(result.clone());
        result
    }

    /// Whether an engine has been constructed successfully.
    pub fn is_ready(&self) -> bool {
        matches!(*lock(&self.state), InitializationState::Ready(_))
    }

    /// Whether a construction is currently running.
    pub fn is_initializing(&self) -> bool {
        matches!(*lock(&self.state), InitializationState::Initializing(_))
    }

    /// Callers currently attached to the in-flight construction, not
    /// counting the one running it.
    pub fn waiting_callers(&self) -> usize {
        match &*lock(&self.state) {
            InitializationState::Initializing(attempt) => attempt.waiters.load(Ordering::SeqCst),
            _ => 0,
        }
    }

    /// Number of construction attempts started so far.
    pub fn construction_count(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }
}

/// Resolves an attempt exactly once, even if the factory unwinds.
struct Construction<'a> {
    cache: &'a HighlighterCache,
    attempt: &'a Arc<Attempt>,
    finished: bool,
}

impl Construction<'_> {
    fn finish(&mut self, result: Result<HighlighterHandle, EngineInitError>) {
        self.finished = true;
        let mut state = lock(&self.cache.state);
        match &result {
            Ok(handle) => {
                tracing::debug!(attempt = self.attempt.id, "highlighter ready");
                *state = InitializationState::Ready(handle.clone());
            }
            Err(err) => {
                tracing::warn!(attempt = self.attempt.id, %err, "highlighter construction failed");
                *state = InitializationState::Uninitialized;
            }
        }
        let ok = result.is_ok();
        self.attempt.resolve(result);
        drop(state);
        crate::perf::record(&crate::perf::Event::EngineResolved {
            attempt: self.attempt.id,
            ok,
        });
    }
}

impl Drop for Construction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(Err(EngineInitError::Aborted));
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::error::RenderError;
    use crate::highlight::{HighlightEngine, LanguageTag, ThemeId};

    struct Plain;

    impl HighlightEngine for Plain {
        fn render(&self, code: &str, _: &LanguageTag, _: &ThemeId) -> Result<String, RenderError> {
            Ok(code.to_string())
        }
    }

    /// A factory that blocks until released, then yields `outcomes` in order.
    fn gated_factory(
        calls: Arc<AtomicUsize>,
        release: mpsc::Receiver<()>,
        outcomes: Vec<Result<(), EngineInitError>>,
    ) -> EngineFactory {
        let release = Mutex::new(release);
        let outcomes = Mutex::new(outcomes.into_iter());
        Box::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let _ = release.lock().unwrap().recv();
            match outcomes.lock().unwrap().next() {
                Some(Ok(())) | None => Ok(HighlighterHandle::new(Plain)),
                Some(Err(err)) => Err(err),
            }
        })
    }

    fn wait_for_waiters(cache: &HighlighterCache, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while cache.waiting_callers() < count {
            assert!(Instant::now() < deadline, "callers never attached");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn spawn_callers(
        cache: &Arc<HighlighterCache>,
        n: usize,
    ) -> Vec<thread::JoinHandle<Result<HighlighterHandle, EngineInitError>>> {
        let barrier = Arc::new(Barrier::new(n));
        (0..n)
            .map(|_| {
                let cache = Arc::clone(cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.acquire()
                })
            })
            .collect()
    }

    #[test]
    fn test_concurrent_first_callers_share_one_construction() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = mpsc::channel();
        let cache = Arc::new(HighlighterCache::new(gated_factory(
            Arc::clone(&calls),
            release_rx,
            vec![Ok(())],
        )));

        let n = 8;
        let callers = spawn_callers(&cache, n);
        wait_for_waiters(&cache, n - 1);
        release_tx.send(()).unwrap();

        let handles: Vec<_> = callers
            .into_iter()
            .map(|c| c.join().unwrap().unwrap())
            .collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.construction_count(), 1);
        assert!(handles.iter().all(|h| h.same_engine(&handles[0])));
        assert!(cache.is_ready());
    }

    #[test]
    fn test_concurrent_callers_receive_the_same_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = mpsc::channel();
        let failure = EngineInitError::Unavailable("grammar bundle missing".to_string());
        let cache = Arc::new(HighlighterCache::new(gated_factory(
            Arc::clone(&calls),
            release_rx,
            vec![Err(failure.clone())],
        )));

        let n = 5;
        let callers = spawn_callers(&cache, n);
        wait_for_waiters(&cache, n - 1);
        release_tx.send(()).unwrap();

        for caller in callers {
            assert_eq!(caller.join().unwrap().unwrap_err(), failure);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!cache.is_ready());
        assert!(!cache.is_initializing());
    }

    #[test]
    fn test_failed_construction_is_retried_by_next_caller() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = mpsc::channel();
        let cache = HighlighterCache::new(gated_factory(
            Arc::clone(&calls),
            release_rx,
            vec![Err(EngineInitError::Unavailable("busy".to_string())), Ok(())],
        ));
        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();

        assert!(cache.acquire().is_err());
        let first = cache.acquire().unwrap();
        let second = cache.acquire().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.construction_count(), 2);
        assert!(first.same_engine(&second));
    }

    #[test]
    fn test_ready_cache_does_not_construct_again() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = HighlighterCache::new(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(HighlighterHandle::new(Plain))
        }));

        for _ in 0..10 {
            cache.acquire().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_construction_releases_waiters_and_allows_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let cache = Arc::new(HighlighterCache::new(Box::new(move || {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                let _ = release_rx.lock().unwrap().recv();
                panic!("engine exploded");
            }
            Ok(HighlighterHandle::new(Plain))
        })));

        let leader = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.acquire())
        };
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cache.is_initializing() {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(1));
        }
        let follower = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.acquire())
        };
        wait_for_waiters(&cache, 1);
        release_tx.send(()).unwrap();

        assert!(leader.join().is_err());
        assert_eq!(follower.join().unwrap().unwrap_err(), EngineInitError::Aborted);
        assert!(!cache.is_initializing());

        assert!(cache.acquire().is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
