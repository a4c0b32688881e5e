use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::job::Job;

/// Optional per-job adornment (progress dialogs, error prompts, ...).
///
/// A delegate belongs to at most one job over its whole lifetime: the first
/// successful [`Job::set_ui_delegate`] binds it, later attempts on any job
/// are refused, and the owning job drops it when it is itself destroyed.
#[derive(Clone, Default)]
pub struct UiDelegate {
    inner: Rc<DelegateInner>,
}

#[derive(Default)]
struct DelegateInner {
    bound: Cell<bool>,
    connected: RefCell<Option<Box<dyn FnMut(&Job)>>>,
}

impl UiDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    /// A delegate whose hook runs once it is associated with its job.
    pub fn with_connected(hook: impl FnMut(&Job) + 'static) -> Self {
        let delegate = Self::new();
        *delegate.inner.connected.borrow_mut() = Some(Box::new(hook));
        delegate
    }

    pub fn is_bound(&self) -> bool {
        self.inner.bound.get()
    }

    pub fn downgrade(&self) -> WeakUiDelegate {
        WeakUiDelegate {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub(crate) fn bind(&self) -> bool {
        if self.inner.bound.get() {
            return false;
        }
        self.inner.bound.set(true);
        true
    }

    pub(crate) fn connected(&self, job: &Job) {
        if let Some(hook) = self.inner.connected.borrow_mut().as_mut() {
            hook(job);
        }
    }
}

/// Non-owning delegate handle, used to observe the delegate's destruction
/// alongside its owning job.
#[derive(Clone)]
pub struct WeakUiDelegate {
    inner: Weak<DelegateInner>,
}

impl WeakUiDelegate {
    pub fn upgrade(&self) -> Option<UiDelegate> {
        self.inner.upgrade().map(|inner| UiDelegate { inner })
    }
}
