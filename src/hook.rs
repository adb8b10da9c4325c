//! Generic event-hook dispatch engine.
//!
//! Every dispatching object embeds a [`HookList`]: an ordered registry
//! of callbacks, each bound with an [`EventMask`] selecting the events
//! it receives. Dispatch is reentrancy-safe under mutation: a callback
//! may bind or unbind hooks on the very list being iterated.
//!
//! # Ordering guarantees
//!
//! - Dispatch runs hooks in list order; [`BindFlags::FIRST`] prepends,
//!   plain binds append.
//! - Ids increase monotonically and are never reused, so unbind-by-id
//!   stays unambiguous across concurrent binds and removals.
//! - Destroy delivery runs in **reverse** bind order, giving teardown
//!   hooks inner-to-outer unwind semantics.
//!
//! # Reentrancy
//!
//! Dispatch snapshots the live record list on entry, so binds made by a
//! callback are visible only to subsequent dispatches. Unbinds during
//! dispatch mark the record dead; dead records are skipped and swept
//! once the outermost dispatch finishes, so iteration never touches a
//! freed record.

use crate::event::{Event, EventMask};
use bitflags::bitflags;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

bitflags! {
    /// Options for [`HookList::bind`].
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct BindFlags: u32 {
        /// Insert at the head of the list instead of appending.
        const FIRST = 1 << 0;
    }
}

/// Identifier of one bound hook, unique within its list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HookId(u64);

type Callback<O, E> = Box<dyn FnMut(&O, &E) -> bool>;

struct HookRecord<O, E> {
    id: u64,
    mask: EventMask,
    dead: Cell<bool>,
    /// Unbind/destroy notification that arrived while this record's own
    /// callback was executing; delivered once the callback returns.
    pending: RefCell<Option<E>>,
    callback: RefCell<Callback<O, E>>,
}

/// An ordered, maskable callback registry for one owner object.
pub struct HookList<O, E> {
    records: RefCell<Vec<Rc<HookRecord<O, E>>>>,
    next_id: Cell<u64>,
    iterating: Cell<u32>,
    needs_sweep: Cell<bool>,
}

impl<O, E: Event> Default for HookList<O, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O, E: Event> HookList<O, E> {
    /// Create an empty hook list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
            iterating: Cell::new(0),
            needs_sweep: Cell::new(false),
        }
    }

    /// Bind a callback for the events selected by `mask`.
    ///
    /// The callback's return value is ignored by [`HookList::dispatch`]
    /// and short-circuits [`HookList::dispatch_until_true`].
    pub fn bind<F>(&self, mask: EventMask, flags: BindFlags, callback: F) -> HookId
    where
        F: FnMut(&O, &E) -> bool + 'static,
    {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let record = Rc::new(HookRecord {
            id,
            mask,
            dead: Cell::new(false),
            pending: RefCell::new(None),
            callback: RefCell::new(Box::new(callback)),
        });

        let mut records = self.records.borrow_mut();
        if flags.contains(BindFlags::FIRST) {
            records.insert(0, record);
        } else {
            records.push(record);
        }
        HookId(id)
    }

    /// Number of live bound hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.borrow().iter().filter(|r| !r.dead.get()).count()
    }

    /// Check whether no live hooks are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Rc<HookRecord<O, E>>> {
        self.records.borrow().clone()
    }

    fn sweep(&self) {
        if self.iterating.get() == 0 && self.needs_sweep.get() {
            self.records.borrow_mut().retain(|r| !r.dead.get());
            self.needs_sweep.set(false);
        }
    }

    /// Deliver a notification stashed while `record`'s own callback was
    /// running. Must be called with the callback borrow released.
    fn deliver_pending(record: &Rc<HookRecord<O, E>>, owner: &O) {
        let pending = record.pending.borrow_mut().take();
        if let Some(event) = pending {
            (record.callback.borrow_mut())(owner, &event);
        }
    }

    fn run<F>(&self, owner: &O, event: &E, mut until: F) -> bool
    where
        F: FnMut(bool) -> bool,
    {
        let snapshot = self.snapshot();
        self.iterating.set(self.iterating.get() + 1);

        let mut hit = false;
        for record in &snapshot {
            if record.dead.get() || !record.mask.contains(event.mask()) {
                continue;
            }
            let result = (record.callback.borrow_mut())(owner, event);
            Self::deliver_pending(record, owner);
            if until(result) {
                hit = true;
                break;
            }
        }

        self.iterating.set(self.iterating.get() - 1);
        self.sweep();
        hit
    }

    /// Invoke every matching hook in list order, ignoring results.
    pub fn dispatch(&self, owner: &O, event: &E) {
        self.run(owner, event, |_| false);
    }

    /// Invoke matching hooks in list order until one returns `true`.
    ///
    /// Returns whether any hook did. Used for interceptable events such
    /// as input.
    pub fn dispatch_until_true(&self, owner: &O, event: &E) -> bool {
        self.run(owner, event, |r| r)
    }

    /// Unbind one hook by id.
    ///
    /// The record receives `unbind_event` if its mask includes
    /// [`EventMask::UNBIND`], then is removed — deferred until dispatch
    /// completes if one is in progress. A hook unbinding **itself**
    /// from inside its own callback is legal; its notification is
    /// delivered once that callback returns.
    pub fn unbind(&self, owner: &O, id: HookId, unbind_event: &E)
    where
        E: Clone,
    {
        debug_assert!(unbind_event.mask() == EventMask::UNBIND);
        let record = self
            .records
            .borrow()
            .iter()
            .find(|r| r.id == id.0 && !r.dead.get())
            .cloned();
        let Some(record) = record else { return };

        record.dead.set(true);
        self.needs_sweep.set(true);

        if record.mask.contains(EventMask::UNBIND) {
            match record.callback.try_borrow_mut() {
                Ok(mut callback) => {
                    callback(owner, unbind_event);
                }
                // The callback is the caller; stash the notification
                // for delivery when it returns.
                Err(_) => *record.pending.borrow_mut() = Some(unbind_event.clone()),
            }
        }
        self.sweep();
    }

    /// Deliver `destroy_event` to matching hooks in reverse bind order,
    /// then drop every record regardless of mask.
    ///
    /// Safe to call from inside a dispatch on this same list (an object
    /// destroying itself from one of its own hooks): the currently
    /// executing hook gets its destroy notification once it returns.
    pub fn unbind_and_destroy(&self, owner: &O, destroy_event: &E)
    where
        E: Clone,
    {
        debug_assert!(destroy_event.mask() == EventMask::DESTROY);
        let snapshot = self.snapshot();
        self.iterating.set(self.iterating.get() + 1);

        for record in snapshot.iter().rev() {
            if record.dead.get() || !record.mask.contains(EventMask::DESTROY) {
                continue;
            }
            match record.callback.try_borrow_mut() {
                Ok(mut callback) => {
                    callback(owner, destroy_event);
                    drop(callback);
                    Self::deliver_pending(record, owner);
                }
                Err(_) => *record.pending.borrow_mut() = Some(destroy_event.clone()),
            }
        }

        for record in &snapshot {
            record.dead.set(true);
        }
        self.needs_sweep.set(true);

        self.iterating.set(self.iterating.get() - 1);
        self.sweep();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PenEvent;
    use std::rc::Rc;

    type TestList = HookList<(), PenEvent>;

    #[test]
    fn test_dispatch_in_bind_order() {
        let list = TestList::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for tag in [1, 2, 3] {
            let seen = Rc::clone(&seen);
            list.bind(EventMask::CHANGE, BindFlags::empty(), move |(), _| {
                seen.borrow_mut().push(tag);
                false
            });
        }

        list.dispatch(&(), &PenEvent::Change);
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn test_bind_first_prepends() {
        let list = TestList::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = Rc::clone(&seen);
        list.bind(EventMask::CHANGE, BindFlags::empty(), move |(), _| {
            s.borrow_mut().push("second");
            false
        });
        let s = Rc::clone(&seen);
        list.bind(EventMask::CHANGE, BindFlags::FIRST, move |(), _| {
            s.borrow_mut().push("first");
            false
        });

        list.dispatch(&(), &PenEvent::Change);
        assert_eq!(*seen.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_mask_filters_delivery() {
        let list = TestList::new();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        list.bind(EventMask::DESTROY, BindFlags::empty(), move |(), _| {
            c.set(c.get() + 1);
            false
        });

        list.dispatch(&(), &PenEvent::Change);
        assert_eq!(count.get(), 0);
        list.dispatch(&(), &PenEvent::Destroy);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_dispatch_until_true_short_circuits() {
        let list = TestList::new();
        let later_ran = Rc::new(Cell::new(false));

        list.bind(EventMask::CHANGE, BindFlags::empty(), |(), _| false);
        list.bind(EventMask::CHANGE, BindFlags::empty(), |(), _| true);
        let l = Rc::clone(&later_ran);
        list.bind(EventMask::CHANGE, BindFlags::empty(), move |(), _| {
            l.set(true);
            true
        });

        assert!(list.dispatch_until_true(&(), &PenEvent::Change));
        assert!(!later_ran.get());
    }

    #[test]
    fn test_dispatch_until_true_false_when_unhandled() {
        let list = TestList::new();
        list.bind(EventMask::CHANGE, BindFlags::empty(), |(), _| false);
        assert!(!list.dispatch_until_true(&(), &PenEvent::Change));
    }

    #[test]
    fn test_ids_monotonic_and_unbind_unambiguous() {
        let list = TestList::new();
        let a = list.bind(EventMask::CHANGE, BindFlags::empty(), |(), _| false);
        let b = list.bind(EventMask::CHANGE, BindFlags::empty(), |(), _| false);
        assert_ne!(a, b);

        list.unbind(&(), a, &PenEvent::Unbind);
        assert_eq!(list.len(), 1);
        let c = list.bind(EventMask::CHANGE, BindFlags::empty(), |(), _| false);
        assert_ne!(c, a);
        assert_ne!(c, b);
    }

    #[test]
    fn test_unbind_notification() {
        let list = TestList::new();
        let notified = Rc::new(Cell::new(false));
        let n = Rc::clone(&notified);
        let id = list.bind(
            EventMask::CHANGE | EventMask::UNBIND,
            BindFlags::empty(),
            move |(), ev| {
                if matches!(ev, PenEvent::Unbind) {
                    n.set(true);
                }
                false
            },
        );

        list.unbind(&(), id, &PenEvent::Unbind);
        assert!(notified.get());
        assert!(list.is_empty());
    }

    #[test]
    fn test_unbind_without_unbind_mask_is_silent() {
        let list = TestList::new();
        let ran = Rc::new(Cell::new(false));
        let r = Rc::clone(&ran);
        let id = list.bind(EventMask::CHANGE, BindFlags::empty(), move |(), _| {
            r.set(true);
            false
        });
        list.unbind(&(), id, &PenEvent::Unbind);
        assert!(!ran.get());
        assert!(list.is_empty());
    }

    #[test]
    fn test_destroy_runs_in_reverse_bind_order() {
        let list = TestList::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = Rc::clone(&seen);
            list.bind(EventMask::DESTROY, BindFlags::empty(), move |(), _| {
                seen.borrow_mut().push(tag);
                false
            });
        }

        list.unbind_and_destroy(&(), &PenEvent::Destroy);
        assert_eq!(*seen.borrow(), vec!["c", "b", "a"]);
        assert!(list.is_empty());
    }

    #[test]
    fn test_destroy_drops_unmatched_records_too() {
        let list = TestList::new();
        list.bind(EventMask::CHANGE, BindFlags::empty(), |(), _| false);
        list.unbind_and_destroy(&(), &PenEvent::Destroy);
        assert!(list.is_empty());
    }

    #[test]
    fn test_bind_during_dispatch_deferred_to_next_pass() {
        let list = Rc::new(TestList::new());
        let inner_ran = Rc::new(Cell::new(0));

        let l = Rc::clone(&list);
        let inner = Rc::clone(&inner_ran);
        list.bind(EventMask::CHANGE, BindFlags::empty(), move |(), _| {
            let inner = Rc::clone(&inner);
            l.bind(EventMask::CHANGE, BindFlags::empty(), move |(), _| {
                inner.set(inner.get() + 1);
                false
            });
            false
        });

        list.dispatch(&(), &PenEvent::Change);
        // New hook not run in the pass that bound it
        assert_eq!(inner_ran.get(), 0);

        list.dispatch(&(), &PenEvent::Change);
        assert_eq!(inner_ran.get(), 1);
    }

    #[test]
    fn test_unbind_during_dispatch_deferred() {
        let list = Rc::new(TestList::new());
        let second_ran = Rc::new(Cell::new(false));

        let second_id = Rc::new(Cell::new(None));

        let l = Rc::clone(&list);
        let sid = Rc::clone(&second_id);
        list.bind(EventMask::CHANGE, BindFlags::empty(), move |(), _| {
            if let Some(id) = sid.get() {
                l.unbind(&(), id, &PenEvent::Unbind);
            }
            false
        });

        let s = Rc::clone(&second_ran);
        let id = list.bind(EventMask::CHANGE, BindFlags::empty(), move |(), _| {
            s.set(true);
            false
        });
        second_id.set(Some(id));

        // First hook unbinds the second mid-dispatch; the snapshot was
        // taken before, but the dead flag must suppress delivery.
        list.dispatch(&(), &PenEvent::Change);
        assert!(!second_ran.get());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_hook_may_unbind_itself_from_its_own_callback() {
        let list = Rc::new(TestList::new());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let own_id = Rc::new(Cell::new(None));
        let l = Rc::clone(&list);
        let oid = Rc::clone(&own_id);
        let s = Rc::clone(&seen);
        let id = list.bind(
            EventMask::CHANGE | EventMask::UNBIND,
            BindFlags::empty(),
            move |(), ev| {
                match ev {
                    PenEvent::Change => {
                        s.borrow_mut().push("change");
                        l.unbind(&(), oid.get().unwrap(), &PenEvent::Unbind);
                    }
                    PenEvent::Unbind => s.borrow_mut().push("unbind"),
                    PenEvent::Destroy => {}
                }
                false
            },
        );
        own_id.set(Some(id));

        // The one-shot pattern: the hook removes itself while running.
        // The unbind notification arrives after the callback returns.
        list.dispatch(&(), &PenEvent::Change);
        assert_eq!(*seen.borrow(), vec!["change", "unbind"]);
        assert!(list.is_empty());

        list.dispatch(&(), &PenEvent::Change);
        assert_eq!(seen.borrow().len(), 2, "one-shot hook must not rerun");
    }

    #[test]
    fn test_destroy_from_inside_own_hook() {
        let list = Rc::new(TestList::new());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let l = Rc::clone(&list);
        let s = Rc::clone(&seen);
        list.bind(
            EventMask::CHANGE | EventMask::DESTROY,
            BindFlags::empty(),
            move |(), ev| {
                match ev {
                    PenEvent::Change => {
                        s.borrow_mut().push("change");
                        l.unbind_and_destroy(&(), &PenEvent::Destroy);
                    }
                    PenEvent::Destroy => s.borrow_mut().push("destroy"),
                    PenEvent::Unbind => {}
                }
                false
            },
        );
        let s = Rc::clone(&seen);
        list.bind(EventMask::DESTROY, BindFlags::empty(), move |(), _| {
            s.borrow_mut().push("other destroy");
            false
        });

        list.dispatch(&(), &PenEvent::Change);
        // The running hook's own destroy is deferred until it returns;
        // the other record is notified immediately, in reverse order.
        assert_eq!(*seen.borrow(), vec!["change", "other destroy", "destroy"]);
        assert!(list.is_empty());
    }
}
