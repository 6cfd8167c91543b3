//! Memoized selectors.
//!
//! Slice state lives behind `Arc`, so "did the input change" is answered by
//! pointer identity for shared values and by equality for small copies.

use parking_lot::Mutex;
use std::sync::Arc;

/// Cheap change detection used by selectors and `select` subscriptions.
pub trait Memo {
    fn same(&self, other: &Self) -> bool;
}

impl<T: ?Sized> Memo for Arc<T> {
    fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: Memo> Memo for Option<T> {
    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same(b),
            (None, None) => true,
            _ => false,
        }
    }
}

macro_rules! memo_by_value {
    ($($ty:ty),*) => {
        $(impl Memo for $ty {
            fn same(&self, other: &Self) -> bool {
                self == other
            }
        })*
    };
}

memo_by_value!(bool, u32, u64, usize, i64, String, &'static str);

macro_rules! memo_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Memo),+> Memo for ($($name,)+) {
            fn same(&self, other: &Self) -> bool {
                $(self.$idx.same(&other.$idx))&&+
            }
        }
    };
}

memo_tuple!(A: 0, B: 1);
memo_tuple!(A: 0, B: 1, C: 2);
memo_tuple!(A: 0, B: 1, C: 2, D: 3);
memo_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4);

/// A projection that recomputes only when its inputs change.
pub struct Selector<S, R> {
    compute: Box<dyn Fn(&S) -> R + Send + Sync>,
}

impl<S, R> Selector<S, R> {
    pub fn select(&self, state: &S) -> R {
        (self.compute)(state)
    }
}

/// Combine an input projection with a memoized `project` step.
///
/// `project` runs again only when the value returned by `input` is not
/// [`Memo::same`] as the previous one; otherwise the cached result is cloned.
pub fn create_selector<S, I, R, FI, FP>(input: FI, project: FP) -> Selector<S, R>
where
    S: 'static,
    I: Memo + Send + 'static,
    R: Clone + Send + 'static,
    FI: Fn(&S) -> I + Send + Sync + 'static,
    FP: Fn(&I) -> R + Send + Sync + 'static,
{
    let cache: Mutex<Option<(I, R)>> = Mutex::new(None);
    Selector {
        compute: Box::new(move |state| {
            let next = input(state);
            let mut cache = cache.lock();
            if let Some((last, value)) = cache.as_ref() {
                if last.same(&next) {
                    return value.clone();
                }
            }
            let value = project(&next);
            *cache = Some((next, value.clone()));
            value
        }),
    }
}
