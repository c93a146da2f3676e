use crate::sim::Sim;
use crate::tb_obj::TbObj;

/// Implemented by everything the kernel latches on a clock edge.
pub(crate) trait Commit: Send {
    fn commit(&self);
}

struct SignalState<T> {
    name: String,
    value: T,
    next: T,
}

impl<T: Clone + Send> Commit for TbObj<SignalState<T>> {
    fn commit(&self) {
        self.with_mut(|s| s.value = s.next.clone());
    }
}

/// A registered wire. `get()` returns the value that was stable at the last
/// rising edge, `set()` drives the value that becomes visible at the next one.
/// Both sides of a handshake therefore sample the same pre-edge values no
/// matter in which order their tasks run.
pub struct Signal<T>(TbObj<SignalState<T>>);

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Signal(self.0.clone())
    }
}

impl<T: Clone + Send + 'static> Signal<T> {
    pub fn new(sim: &Sim, name: &str, init: T) -> Self {
        let signal = Signal(TbObj::new(SignalState {
            name: name.to_string(),
            value: init.clone(),
            next: init,
        }));
        sim.register_signal(Box::new(signal.0.clone()));
        signal
    }

    pub fn name(&self) -> String {
        self.0.get().name.clone()
    }

    pub fn get(&self) -> T {
        self.0.get().value.clone()
    }

    pub fn set(&self, value: T) {
        self.0.with_mut(|s| s.next = value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_changes_only_on_edge() {
        let sim = Sim::new(10);
        let sig = Signal::new(&sim, "sig", 0u32);
        sig.set(5);
        assert_eq!(sig.get(), 0);
        sim.advance();
        assert_eq!(sig.get(), 5);
        // held until driven again
        sim.advance();
        assert_eq!(sig.get(), 5);
        assert_eq!(sig.name(), "sig");
    }
}
