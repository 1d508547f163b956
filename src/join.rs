// Load bookkeeping: which upload is current, and when both assets are ready.
// Signature placement waits on a two-way join (background AND signature)
// and fires exactly once per round. Every load carries a generation; a
// completion whose generation is no longer current is stale and dropped.

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetSlot {
    Background,
    Signature,
}

impl AssetSlot {
    fn index(self) -> usize {
        match self {
            AssetSlot::Background => 0,
            AssetSlot::Signature => 1,
        }
    }
}

/// Handed out when a load starts; must be presented when it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    pub slot: AssetSlot,
    pub generation: u64,
}

/// Counts down from 2; opens once both slots have arrived.
#[derive(Debug, Clone, Default)]
pub struct ReadyBarrier {
    arrived: [bool; 2],
    fired: bool,
}

impl ReadyBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remaining(&self) -> usize {
        self.arrived.iter().filter(|a| !**a).count()
    }

    /// Record an arrival. True exactly once: on the arrival that opens it.
    pub fn arrive(&mut self, slot: AssetSlot) -> bool {
        self.arrived[slot.index()] = true;
        if self.remaining() == 0 && !self.fired {
            self.fired = true;
            return true;
        }
        false
    }

    /// The slot is being replaced: it must arrive again and the barrier re-arms.
    pub fn withdraw(&mut self, slot: AssetSlot) {
        self.arrived[slot.index()] = false;
        self.fired = false;
    }

    pub fn is_open(&self) -> bool {
        self.fired
    }
}

/// Outcome of presenting a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// A newer load for this slot exists; ignore the result.
    Stale,
    /// Accepted. `ready` is true when this arrival completed the join.
    Accepted { ready: bool },
}

#[derive(Debug, Default)]
pub struct LoadTracker {
    next_generation: u64,
    current: [Option<u64>; 2],
    barrier: ReadyBarrier,
}

impl LoadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a load, superseding any in-flight one for the same slot.
    pub fn begin(&mut self, slot: AssetSlot) -> LoadTicket {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.current[slot.index()] = Some(generation);
        self.barrier.withdraw(slot);
        debug!(?slot, generation, "load started");
        LoadTicket { slot, generation }
    }

    pub fn is_current(&self, ticket: LoadTicket) -> bool {
        self.current[ticket.slot.index()] == Some(ticket.generation)
    }

    /// Successful completion of `ticket`.
    pub fn arrive(&mut self, ticket: LoadTicket) -> Arrival {
        if !self.is_current(ticket) {
            debug!(?ticket, "stale load result dropped");
            return Arrival::Stale;
        }
        Arrival::Accepted { ready: self.barrier.arrive(ticket.slot) }
    }

    /// Failed completion: the slot stays empty. False when the ticket was stale.
    pub fn fail(&mut self, ticket: LoadTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.barrier.withdraw(ticket.slot);
        true
    }

    pub fn ready(&self) -> bool {
        self.barrier.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barrier_opens_once_after_both() {
        let mut b = ReadyBarrier::new();
        assert_eq!(b.remaining(), 2);
        assert!(!b.arrive(AssetSlot::Signature));
        assert!(!b.arrive(AssetSlot::Signature));
        assert_eq!(b.remaining(), 1);
        assert!(b.arrive(AssetSlot::Background));
        assert!(!b.arrive(AssetSlot::Background));
        assert!(b.is_open());
    }

    #[test]
    fn order_of_arrival_does_not_matter() {
        for first in [AssetSlot::Background, AssetSlot::Signature] {
            let second = if first == AssetSlot::Background { AssetSlot::Signature } else { AssetSlot::Background };
            let mut t = LoadTracker::new();
            let a = t.begin(first);
            let b = t.begin(second);
            assert_eq!(t.arrive(a), Arrival::Accepted { ready: false });
            assert_eq!(t.arrive(b), Arrival::Accepted { ready: true });
        }
    }

    #[test]
    fn stale_generation_is_ignored() {
        let mut t = LoadTracker::new();
        let bg = t.begin(AssetSlot::Background);
        let old_sig = t.begin(AssetSlot::Signature);
        let new_sig = t.begin(AssetSlot::Signature);
        assert_eq!(t.arrive(bg), Arrival::Accepted { ready: false });
        // The first upload's decode finishes after the second was issued.
        assert_eq!(t.arrive(old_sig), Arrival::Stale);
        assert!(!t.ready());
        assert_eq!(t.arrive(new_sig), Arrival::Accepted { ready: true });
        assert!(!t.fail(old_sig));
    }

    #[test]
    fn reupload_rearms_the_join() {
        let mut t = LoadTracker::new();
        let bg = t.begin(AssetSlot::Background);
        let sig = t.begin(AssetSlot::Signature);
        t.arrive(bg);
        assert_eq!(t.arrive(sig), Arrival::Accepted { ready: true });

        let sig2 = t.begin(AssetSlot::Signature);
        assert!(!t.ready());
        assert_eq!(t.arrive(sig2), Arrival::Accepted { ready: true });
    }

    #[test]
    fn failed_load_keeps_join_closed() {
        let mut t = LoadTracker::new();
        let bg = t.begin(AssetSlot::Background);
        let sig = t.begin(AssetSlot::Signature);
        t.arrive(bg);
        assert!(t.fail(sig));
        assert!(!t.ready());
    }
}
