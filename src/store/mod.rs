//! A small reactive store.
//!
//! The [`Store`] owns one state value, a reducer, action-keyed listeners,
//! `select` subscriptions and the cleanup callbacks of its effects.
//! `dispatch` is reentrancy-safe: actions dispatched while another dispatch
//! is running (from a listener, a subscription or another thread) are
//! queued and drained in FIFO order by whichever call started the drain.

mod entity;
mod reducer;
mod selector;

pub use entity::{Entity, EntityState, EntityUpdate};
pub use reducer::{Action, On, Reducer, create_reducer, on};
pub use selector::{Memo, Selector, create_selector};

use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{error, trace};

/// Cleanup returned by an effect, run once on [`Store::teardown`].
pub type Cleanup = Box<dyn FnOnce() + Send>;

type ReduceFn<S, A> = Box<dyn Fn(&S, &A) -> S + Send + Sync>;
type EffectFn<S, A> = Box<dyn FnOnce(&Store<S, A>) -> Cleanup + Send>;
type Listener<A> = Arc<dyn Fn(&A) + Send + Sync>;
type Subscriber<S> = Arc<dyn Fn(&S) + Send + Sync>;

/// Receives every dispatched action with the state it produced.
pub trait DebugSink<S, A>: Send + Sync {
    fn record(&self, action: &A, state: &S);
}

/// [`DebugSink`] that logs each action through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl<S, A: Action + fmt::Debug> DebugSink<S, A> for TracingSink {
    fn record(&self, action: &A, _state: &S) {
        tracing::debug!(target: "chat_engine::store", kind = ?action.kind(), ?action, "dispatched");
    }
}

struct Scheduler<A> {
    queue: VecDeque<A>,
    draining: bool,
}

struct Inner<S, A: Action> {
    state: RwLock<S>,
    reducer: ReduceFn<S, A>,
    scheduler: Mutex<Scheduler<A>>,
    listeners: Mutex<HashMap<A::Kind, Vec<(u64, Listener<A>)>>>,
    subscribers: Mutex<Vec<(u64, Subscriber<S>)>>,
    cleanups: Mutex<Vec<Cleanup>>,
    sink: Option<Arc<dyn DebugSink<S, A>>>,
    next_id: AtomicU64,
    torn_down: AtomicBool,
}

/// Handle to a store. Cloning is cheap and every clone drives the same store.
pub struct Store<S, A: Action> {
    inner: Arc<Inner<S, A>>,
}

impl<S, A: Action> Clone for Store<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S, A: Action> fmt::Debug for Store<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("torn_down", &self.inner.torn_down.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

/// Configures a store before its effects start.
pub struct StoreBuilder<S, A: Action> {
    state: S,
    reducer: ReduceFn<S, A>,
    effects: Vec<EffectFn<S, A>>,
    sink: Option<Arc<dyn DebugSink<S, A>>>,
}

impl<S, A> StoreBuilder<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Action,
{
    /// Register an effect. Effects run once, in registration order, when the
    /// store is built.
    pub fn effect<F>(mut self, effect: F) -> Self
    where
        F: FnOnce(&Store<S, A>) -> Cleanup + Send + 'static,
    {
        self.effects.push(Box::new(effect));
        self
    }

    pub fn debug_sink(mut self, sink: Arc<dyn DebugSink<S, A>>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Store<S, A> {
        let store = Store {
            inner: Arc::new(Inner {
                state: RwLock::new(self.state),
                reducer: self.reducer,
                scheduler: Mutex::new(Scheduler {
                    queue: VecDeque::new(),
                    draining: false,
                }),
                listeners: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(Vec::new()),
                cleanups: Mutex::new(Vec::new()),
                sink: self.sink,
                next_id: AtomicU64::new(0),
                torn_down: AtomicBool::new(false),
            }),
        };

        for effect in self.effects {
            let cleanup = effect(&store);
            store.inner.cleanups.lock().push(cleanup);
        }

        store
    }
}

impl<S, A> Store<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Action,
{
    pub fn builder<R>(initial: S, reducer: R) -> StoreBuilder<S, A>
    where
        R: Fn(&S, &A) -> S + Send + Sync + 'static,
    {
        StoreBuilder {
            state: initial,
            reducer: Box::new(reducer),
            effects: Vec::new(),
            sink: None,
        }
    }

    /// Reduce `action`, then notify listeners, subscriptions and the sink.
    ///
    /// A dispatch issued while another one is draining is queued behind it
    /// and returns immediately. A panic inside reducer or listener code does
    /// not stop the queue; it is logged and re-raised on a spawned task.
    pub fn dispatch(&self, action: A) {
        if self.is_torn_down() {
            trace!(kind = ?action.kind(), "dispatch after teardown ignored");
            return;
        }

        {
            let mut scheduler = self.inner.scheduler.lock();
            scheduler.queue.push_back(action);
            if scheduler.draining {
                return;
            }
            scheduler.draining = true;
        }

        loop {
            let next = {
                let mut scheduler = self.inner.scheduler.lock();
                match scheduler.queue.pop_front() {
                    Some(action) => action,
                    None => {
                        scheduler.draining = false;
                        return;
                    }
                }
            };

            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.process(&next))) {
                surface_panic(payload);
            }
        }
    }

    fn process(&self, action: &A) {
        let state = {
            let mut state = self.inner.state.write();
            let next = (self.inner.reducer)(&state, action);
            *state = next.clone();
            next
        };

        let listeners: Vec<Listener<A>> = self
            .inner
            .listeners
            .lock()
            .get(&action.kind())
            .map(|registered| registered.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();
        for listener in listeners {
            listener(action);
        }

        let subscribers: Vec<Subscriber<S>> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|(_, s)| s.clone())
            .collect();
        for subscriber in subscribers {
            subscriber(&state);
        }

        if let Some(sink) = &self.inner.sink {
            sink.record(action, &state);
        }
    }

    /// Project the current state.
    pub fn read<R>(&self, selector: impl FnOnce(&S) -> R) -> R {
        selector(&self.inner.state.read())
    }

    /// Snapshot of the whole state.
    pub fn state(&self) -> S {
        self.inner.state.read().clone()
    }

    /// Call `callback` for every dispatched action whose kind is listed.
    pub fn when<F>(&self, kinds: &[A::Kind], callback: F) -> Subscription
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        if self.is_torn_down() {
            return Subscription::new(|| {});
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let listener: Listener<A> = Arc::new(callback);
        {
            let mut listeners = self.inner.listeners.lock();
            for kind in kinds {
                listeners.entry(*kind).or_default().push((id, listener.clone()));
            }
        }

        let weak: Weak<Inner<S, A>> = Arc::downgrade(&self.inner);
        let kinds = kinds.to_vec();
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut listeners = inner.listeners.lock();
                for kind in &kinds {
                    if let Some(registered) = listeners.get_mut(kind) {
                        registered.retain(|(existing, _)| *existing != id);
                    }
                }
            }
        })
    }

    /// Like [`Store::when`], but the callback runs at most once.
    pub fn when_once<F>(&self, kinds: &[A::Kind], callback: F) -> Subscription
    where
        F: FnOnce(&A) + Send + 'static,
    {
        let callback = Mutex::new(Some(callback));
        let fired = Arc::new(AtomicBool::new(false));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::default();

        let listener_fired = fired.clone();
        let listener_slot = slot.clone();
        let subscription = self.when(kinds, move |action| {
            let Some(callback) = callback.lock().take() else {
                return;
            };
            listener_fired.store(true, Ordering::Release);
            if let Some(subscription) = listener_slot.lock().take() {
                subscription.unsubscribe();
            }
            callback(action);
        });

        *slot.lock() = Some(subscription.clone());
        if fired.load(Ordering::Acquire) {
            subscription.unsubscribe();
        }
        subscription
    }

    /// Call `on_change` with the current projection, then again whenever a
    /// dispatch changes it.
    pub fn select<R, F, C>(&self, selector: F, on_change: C) -> Subscription
    where
        R: Memo + Clone + Send + 'static,
        F: Fn(&S) -> R + Send + Sync + 'static,
        C: Fn(&R) + Send + Sync + 'static,
    {
        let current = self.read(|state| selector(state));
        on_change(&current);

        let last = Mutex::new(current);
        let subscriber: Subscriber<S> = Arc::new(move |state| {
            let next = selector(state);
            {
                let mut last = last.lock();
                if last.same(&next) {
                    return;
                }
                *last = next.clone();
            }
            on_change(&next);
        });

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().push((id, subscriber));

        let weak: Weak<Inner<S, A>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.subscribers.lock().retain(|(existing, _)| *existing != id);
            }
        })
    }

    /// Run every effect cleanup exactly once and drop all listeners.
    ///
    /// Later calls, and any dispatch after this one, are no-ops.
    pub fn teardown(&self) {
        if self.inner.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let cleanups = std::mem::take(&mut *self.inner.cleanups.lock());
        for cleanup in cleanups {
            cleanup();
        }

        self.inner.listeners.lock().clear();
        self.inner.subscribers.lock().clear();
        self.inner.scheduler.lock().queue.clear();
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.load(Ordering::Acquire)
    }
}

/// Removes a listener or subscription when [`Subscription::unsubscribe`] is
/// called. Dropping the handle keeps the registration alive.
#[derive(Clone)]
pub struct Subscription {
    remove: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
}

impl Subscription {
    fn new(remove: impl FnOnce() + Send + 'static) -> Self {
        Self {
            remove: Arc::new(Mutex::new(Some(Box::new(remove)))),
        }
    }

    pub fn unsubscribe(&self) {
        let remove = self.remove.lock().take();
        if let Some(remove) = remove {
            remove();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.lock().is_some())
            .finish()
    }
}

fn surface_panic(payload: Box<dyn Any + Send>) {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    error!(panic = %message, "scheduled dispatch task panicked");

    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move { panic::resume_unwind(payload) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, PartialEq)]
    enum Ev {
        Inc,
        Label(String),
        Boom,
        Chain,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum EvKind {
        Inc,
        Label,
        Boom,
        Chain,
    }

    impl Action for Ev {
        type Kind = EvKind;

        fn kind(&self) -> EvKind {
            match self {
                Ev::Inc => EvKind::Inc,
                Ev::Label(_) => EvKind::Label,
                Ev::Boom => EvKind::Boom,
                Ev::Chain => EvKind::Chain,
            }
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Counter {
        count: Arc<u32>,
        label: Arc<String>,
    }

    fn reduce(state: &Counter, action: &Ev) -> Counter {
        match action {
            Ev::Inc | Ev::Chain => Counter {
                count: Arc::new(*state.count + 1),
                ..state.clone()
            },
            Ev::Label(label) => Counter {
                label: Arc::new(label.clone()),
                ..state.clone()
            },
            Ev::Boom => panic!("reducer exploded"),
        }
    }

    fn store() -> Store<Counter, Ev> {
        Store::builder(Counter::default(), reduce).build()
    }

    #[test]
    fn test_dispatch_reduces_state() {
        let store = store();
        store.dispatch(Ev::Inc);
        store.dispatch(Ev::Inc);
        assert_eq!(store.read(|s| *s.count), 2);
    }

    #[test]
    fn test_when_filters_by_kind_in_registration_order() {
        let store = store();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = log.clone();
        store.when(&[EvKind::Inc], move |_| first.lock().push("first"));
        let second = log.clone();
        store.when(&[EvKind::Inc, EvKind::Label], move |_| second.lock().push("second"));

        store.dispatch(Ev::Inc);
        store.dispatch(Ev::Label("x".into()));

        assert_eq!(*log.lock(), vec!["first", "second", "second"]);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_callback() {
        let store = store();
        let hits = Arc::new(AtomicUsize::new(0));

        let a = hits.clone();
        let sub = store.when(&[EvKind::Inc], move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });
        let b = hits.clone();
        store.when(&[EvKind::Inc], move |_| {
            b.fetch_add(10, Ordering::SeqCst);
        });

        store.dispatch(Ev::Inc);
        sub.unsubscribe();
        store.dispatch(Ev::Inc);

        assert_eq!(hits.load(Ordering::SeqCst), 21);
    }

    #[test]
    fn test_when_once_fires_exactly_once() {
        let store = store();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        store.when_once(&[EvKind::Inc], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..5 {
            store.dispatch(Ev::Inc);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_nested_dispatch_runs_after_current_one() {
        let store = store();
        let log = Arc::new(Mutex::new(Vec::new()));

        let chained = store.clone();
        let chain_log = log.clone();
        store.when(&[EvKind::Chain], move |_| {
            chain_log.lock().push("chain:start".to_string());
            chained.dispatch(Ev::Label("nested".into()));
            chain_log.lock().push("chain:end".to_string());
        });
        let label_log = log.clone();
        store.when(&[EvKind::Label], move |action| {
            if let Ev::Label(label) = action {
                label_log.lock().push(format!("label:{label}"));
            }
        });

        store.dispatch(Ev::Chain);

        assert_eq!(
            *log.lock(),
            vec!["chain:start", "chain:end", "label:nested"]
        );
        assert_eq!(store.read(|s| s.label.to_string()), "nested");
    }

    #[test]
    fn test_select_fires_on_subscribe_and_on_change_only() {
        let store = store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.select(|s: &Counter| s.count.clone(), move |count| sink.lock().push(**count));

        store.dispatch(Ev::Label("unrelated".into()));
        store.dispatch(Ev::Inc);
        store.dispatch(Ev::Label("again".into()));

        assert_eq!(*seen.lock(), vec![0, 1]);
    }

    #[test]
    fn test_select_by_value() {
        let store = store();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        store.select(
            |s: &Counter| *s.count > 1,
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        store.dispatch(Ev::Inc); // 1: still false
        store.dispatch(Ev::Inc); // 2: true
        store.dispatch(Ev::Inc); // 3: still true

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panic_does_not_block_queue() {
        let store = store();
        let chained = store.clone();
        store.when(&[EvKind::Label], move |_| {
            chained.dispatch(Ev::Boom);
            chained.dispatch(Ev::Inc);
        });

        store.dispatch(Ev::Label("go".into()));

        assert_eq!(store.read(|s| *s.count), 1);
        // the store keeps working
        store.dispatch(Ev::Inc);
        assert_eq!(store.read(|s| *s.count), 2);
    }

    #[test]
    fn test_effects_run_in_order_and_cleanup_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = log.clone();
        let second = log.clone();

        let store = Store::builder(Counter::default(), reduce)
            .effect(move |_store: &Store<Counter, Ev>| {
                first.lock().push("start:a");
                let cleanup_log = first.clone();
                Box::new(move || cleanup_log.lock().push("stop:a")) as Cleanup
            })
            .effect(move |_store: &Store<Counter, Ev>| {
                second.lock().push("start:b");
                let cleanup_log = second.clone();
                Box::new(move || cleanup_log.lock().push("stop:b")) as Cleanup
            })
            .build();

        store.teardown();
        store.teardown();

        assert_eq!(*log.lock(), vec!["start:a", "start:b", "stop:a", "stop:b"]);
    }

    #[test]
    fn test_dispatch_after_teardown_is_ignored() {
        let store = store();
        store.teardown();
        store.dispatch(Ev::Inc);
        assert_eq!(store.read(|s| *s.count), 0);
        assert!(store.is_torn_down());
    }

    #[test]
    fn test_debug_sink_sees_every_action() {
        struct Recorder(Mutex<Vec<(Ev, u32)>>);
        impl DebugSink<Counter, Ev> for Recorder {
            fn record(&self, action: &Ev, state: &Counter) {
                self.0.lock().push((action.clone(), *state.count));
            }
        }

        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let store = Store::builder(Counter::default(), reduce)
            .debug_sink(recorder.clone())
            .build();
        store.dispatch(Ev::Inc);
        store.dispatch(Ev::Label("a".into()));

        assert_eq!(
            *recorder.0.lock(),
            vec![(Ev::Inc, 1), (Ev::Label("a".into()), 1)]
        );
    }
}
