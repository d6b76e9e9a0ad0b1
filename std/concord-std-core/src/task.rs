//!
//! Tasks and Thread Factories
//!
//! A `Task` is a zero-argument unit of work. Executors move tasks through a
//! channel to worker threads; the timer daemon keeps them in its heap.
//!
//! Thread creation policy (names, stack size) lives in a `ThreadFactory`,
//! which hands out unstarted `std::thread::Builder`s. Any
//! `Fn() -> thread::Builder` closure is a factory.
//!

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use crate::cancel::CancelToken;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Box a closure into a `Task`.
pub fn task<F>(f: F) -> Task
where
    F: FnOnce() + Send + 'static,
{
    Box::new(f)
}

pub trait ThreadFactory: Send + Sync {
    /// A configured, not yet started thread.
    fn builder(&self) -> thread::Builder;
}

impl<F> ThreadFactory for F
where
    F: Fn() -> thread::Builder + Send + Sync,
{
    fn builder(&self) -> thread::Builder {
        self()
    }
}

/// Names threads `<prefix>-<n>` with `n` counting from 1.
#[derive(Debug)]
pub struct NamedThreadFactory {
    prefix: String,
    stack_size: Option<usize>,
    next: AtomicUsize,
}

impl NamedThreadFactory {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            stack_size: None,
            next: AtomicUsize::new(1),
        }
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

impl ThreadFactory for NamedThreadFactory {
    fn builder(&self) -> thread::Builder {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let builder = thread::Builder::new().name(format!("{}-{}", self.prefix, n));
        match self.stack_size {
            Some(bytes) => builder.stack_size(bytes),
            None => builder,
        }
    }
}

/// Start `body` on a thread from `factory` with `token` installed as the
/// thread's cancellation token.
pub fn spawn_with_token<F>(
    factory: &dyn ThreadFactory,
    token: CancelToken,
    body: F,
) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    factory.builder().spawn(move || {
        CancelToken::install(token);
        body();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_named_factory_numbers_threads() {
        let factory = NamedThreadFactory::new("pool");
        let names: Vec<String> = (0..3)
            .map(|_| {
                factory
                    .builder()
                    .spawn(|| thread::current().name().map(str::to_owned))
                    .unwrap()
                    .join()
                    .unwrap()
                    .unwrap()
            })
            .collect();
        assert_eq!(names, vec!["pool-1", "pool-2", "pool-3"]);
    }

    #[test]
    fn test_closure_is_a_factory() {
        let factory = || thread::Builder::new().name("custom".to_string());
        let name = spawn_named(&factory);
        assert_eq!(name.as_deref(), Some("custom"));
    }

    fn spawn_named(factory: &dyn ThreadFactory) -> Option<String> {
        factory
            .builder()
            .spawn(|| thread::current().name().map(str::to_owned))
            .unwrap()
            .join()
            .unwrap()
    }

    #[test]
    fn test_spawn_with_token_installs_token() {
        let factory = NamedThreadFactory::new("tok");
        let token = CancelToken::new();
        let seen = Arc::new(std::sync::Mutex::new(None));
        let handle = {
            let seen = seen.clone();
            spawn_with_token(&factory, token.clone(), move || {
                *seen.lock().unwrap() = Some(CancelToken::current());
            })
            .unwrap()
        };
        handle.join().unwrap();
        let installed = seen.lock().unwrap().take().unwrap();
        assert!(installed.same_as(&token));
    }
}
