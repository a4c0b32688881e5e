use std::cell::RefCell;
use std::rc::Rc;

/// A typed observer list. Delivery clones the slot list first, so observers
/// may register further slots or re-enter the job during fan-out.
pub(crate) struct Signal<A> {
    slots: RefCell<Vec<Rc<dyn Fn(&A)>>>,
}

impl<A> Default for Signal<A> {
    fn default() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
        }
    }
}

impl<A> Signal<A> {
    pub(crate) fn connect(&self, slot: impl Fn(&A) + 'static) {
        self.slots.borrow_mut().push(Rc::new(slot));
    }

    pub(crate) fn emit(&self, arg: &A) {
        let slots: Vec<_> = self.slots.borrow().clone();
        for slot in slots {
            slot(arg);
        }
    }
}
