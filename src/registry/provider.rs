//! Choosing which registrar a component talks to.
//!
//! A [`RegistrarProvider`] is an ordinary value passed to whatever needs a
//! registrar. In production it wraps one shared [`Registrar`]; in tests a
//! thread-local provider gives every test thread a private tree, so parallel
//! tests never see each other's state.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::config::RegistrarConfig;
use crate::registry::Registrar;

/// Global counter distinguishing thread-local providers.
static NEXT_PROVIDER_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// Registrars of thread-local providers, keyed by provider id.
    static THREAD_REGISTRARS: RefCell<HashMap<u64, Registrar>> = RefCell::new(HashMap::new());
}

/// Identity of a thread-local provider, shared by all of its clones.
///
/// Dropping the last clone removes the dropping thread's registrar. Entries
/// of other threads stay until they call `reset_thread` or exit.
#[derive(Debug)]
struct ProviderId(u64);

impl Drop for ProviderId {
    fn drop(&mut self) {
        let released = THREAD_REGISTRARS
            .try_with(|registrars| {
                registrars
                    .try_borrow_mut()
                    .ok()
                    .and_then(|mut registrars| registrars.remove(&self.0))
            })
            .ok()
            .flatten();
        if released.is_some() {
            debug!(provider = self.0, "released thread-local registrar");
        }
    }
}

#[derive(Debug, Clone)]
enum Kind {
    Shared(Registrar),
    ThreadLocal {
        id: Arc<ProviderId>,
        config: RegistrarConfig,
    },
}

/// Hands out the registrar a component should use.
///
/// # Examples
///
/// ```rust
/// use accumulatori::config::RegistrarConfig;
/// use accumulatori::registry::{Registrar, RegistrarProvider};
/// use std::thread;
///
/// // One tree for the whole process.
/// let shared = RegistrarProvider::shared(Registrar::new());
/// shared.registrar().set_on("http", true);
/// assert!(shared.registrar().node("http").is_on());
///
/// // One tree per thread.
/// let per_thread = RegistrarProvider::thread_local(RegistrarConfig::default());
/// per_thread.registrar().set_on("http", true);
///
/// let other = per_thread.clone();
/// let seen = thread::spawn(move || other.registrar().node("http").is_on())
///     .join()
///     .unwrap();
/// assert!(!seen);
/// assert!(per_thread.registrar().node("http").is_on());
/// ```
#[derive(Debug, Clone)]
pub struct RegistrarProvider {
    kind: Kind,
}

impl RegistrarProvider {
    /// Every call to [`registrar`](Self::registrar) returns `registrar`.
    pub fn shared(registrar: Registrar) -> Self {
        RegistrarProvider {
            kind: Kind::Shared(registrar),
        }
    }

    /// Each thread lazily gets its own registrar built from `config`.
    ///
    /// Clones of the provider share the per-thread registrars; distinct
    /// providers never do.
    ///
    /// A thread keeps its registrar until it calls
    /// [`reset_thread`](Self::reset_thread), exits, or drops the provider's
    /// last clone. A long-lived worker that outlives the provider and never
    /// resets keeps its registrar alive.
    pub fn thread_local(config: RegistrarConfig) -> Self {
        RegistrarProvider {
            kind: Kind::ThreadLocal {
                id: Arc::new(ProviderId(NEXT_PROVIDER_ID.fetch_add(1, Ordering::Relaxed))),
                config,
            },
        }
    }

    /// `true` for a thread-local provider.
    pub fn is_thread_local(&self) -> bool {
        matches!(self.kind, Kind::ThreadLocal { .. })
    }

    /// The registrar for the calling thread.
    pub fn registrar(&self) -> Registrar {
        match &self.kind {
            Kind::Shared(registrar) => registrar.clone(),
            Kind::ThreadLocal { id, config } => THREAD_REGISTRARS.with(|registrars| {
                registrars
                    .borrow_mut()
                    .entry(id.0)
                    .or_insert_with(|| {
                        debug!(provider = id.0, "creating thread-local registrar");
                        Registrar::with_config(config.clone())
                    })
                    .clone()
            }),
        }
    }

    /// Drops the calling thread's registrar; the next call starts fresh.
    ///
    /// Has no effect on a shared provider.
    pub fn reset_thread(&self) {
        if let Kind::ThreadLocal { id, .. } = &self.kind {
            THREAD_REGISTRARS.with(|registrars| {
                registrars.borrow_mut().remove(&id.0);
            });
        }
    }
}

impl Default for RegistrarProvider {
    fn default() -> Self {
        Self::shared(Registrar::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_shared_provider_returns_same_tree() {
        let provider = RegistrarProvider::shared(Registrar::new());
        assert!(!provider.is_thread_local());

        provider.registrar().node("a.b");
        let other = provider.clone();
        let count = thread::spawn(move || other.registrar().node_count())
            .join()
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_thread_local_is_stable_per_thread() {
        let provider = RegistrarProvider::thread_local(RegistrarConfig::default());
        assert!(provider.is_thread_local());
        let node = provider.registrar().node("x");
        assert_eq!(provider.registrar().node("x"), node);
    }

    #[test]
    fn test_thread_local_isolation() {
        let provider = RegistrarProvider::thread_local(RegistrarConfig::default());
        provider.registrar().node("mine.only");

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let provider = provider.clone();
                thread::spawn(move || provider.registrar().node_count())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 1);
        }
        assert_eq!(provider.registrar().node_count(), 3);
    }

    #[test]
    fn test_distinct_providers_do_not_share() {
        let a = RegistrarProvider::thread_local(RegistrarConfig::default());
        let b = RegistrarProvider::thread_local(RegistrarConfig::default());
        a.registrar().node("x");
        assert_eq!(b.registrar().node_count(), 1);
    }

    #[test]
    fn test_thread_local_uses_config() {
        let provider =
            RegistrarProvider::thread_local(RegistrarConfig::default().with_root_state(true));
        assert!(provider.registrar().node("any").is_on());
    }

    fn thread_entries() -> usize {
        THREAD_REGISTRARS.with(|registrars| registrars.borrow().len())
    }

    #[test]
    fn test_dropping_last_clone_releases_thread_entry() {
        let provider = RegistrarProvider::thread_local(RegistrarConfig::default());
        let registrar = provider.registrar();
        let before = thread_entries();

        let clone = provider.clone();
        drop(provider);
        assert_eq!(thread_entries(), before);
        assert_eq!(clone.registrar().root_node(), registrar.root_node());

        drop(clone);
        assert_eq!(thread_entries(), before - 1);
        // handles already given out keep working
        assert_eq!(registrar.node("x").full_name(), "x");
    }

    #[test]
    fn test_reset_thread() {
        let provider = RegistrarProvider::thread_local(RegistrarConfig::default());
        provider.registrar().node("x");
        provider.reset_thread();
        assert_eq!(provider.registrar().node_count(), 1);
    }
}
