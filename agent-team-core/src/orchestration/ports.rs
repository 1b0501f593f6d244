//! Port allocation for service instances

use std::collections::BTreeSet;

/// Bounded pool of ports handed out by linear scan
///
/// A port is held by at most one instance at a time and becomes eligible for
/// reuse as soon as it is released.
#[derive(Debug, Clone)]
pub struct PortPool {
    start: u16,
    end: u16,
    held: BTreeSet<u16>,
}

impl PortPool {
    /// Pool over the inclusive range `start..=end`
    pub fn new(start: u16, end: u16) -> Self {
        Self {
            start,
            end,
            held: BTreeSet::new(),
        }
    }

    /// Take the lowest free port in the range
    pub fn allocate(&mut self) -> Option<u16> {
        let port = (self.start..=self.end).find(|port| !self.held.contains(port))?;
        self.held.insert(port);
        Some(port)
    }

    /// Take a specific port; returns false when it is already held
    ///
    /// Explicit ports outside the range are tracked as well so that two
    /// instances can never be started on the same one.
    pub fn reserve(&mut self, port: u16) -> bool {
        self.held.insert(port)
    }

    pub fn release(&mut self, port: u16) -> bool {
        self.held.remove(&port)
    }

    pub fn is_held(&self, port: u16) -> bool {
        self.held.contains(&port)
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    pub fn range(&self) -> (u16, u16) {
        (self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lowest_free_port_first() {
        let mut pool = PortPool::new(3001, 3003);
        assert_eq!(pool.allocate(), Some(3001));
        assert_eq!(pool.allocate(), Some(3002));

        pool.release(3001);
        assert_eq!(pool.allocate(), Some(3001));
        assert_eq!(pool.allocate(), Some(3003));
        assert_eq!(pool.allocate(), None);
    }

    #[test]
    fn test_reserve_conflicts() {
        let mut pool = PortPool::new(3001, 3010);
        assert!(pool.reserve(3005));
        assert!(!pool.reserve(3005));
        assert!(pool.reserve(8080));
        assert!(pool.is_held(8080));

        pool.release(3005);
        assert!(!pool.is_held(3005));
        assert_eq!(pool.held_count(), 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Allocate,
        Release(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![Just(Op::Allocate), (0usize..16).prop_map(Op::Release)]
    }

    proptest! {
        #[test]
        fn prop_ports_are_never_double_held(ops in prop::collection::vec(op(), 0..200)) {
            let mut pool = PortPool::new(4000, 4007);
            let mut holders: Vec<u16> = Vec::new();

            for op in ops {
                match op {
                    Op::Allocate => {
                        let expected = (4000..=4007).find(|p| !holders.contains(p));
                        let got = pool.allocate();
                        prop_assert_eq!(got, expected);
                        if let Some(port) = got {
                            prop_assert!(!holders.contains(&port));
                            holders.push(port);
                        }
                    }
                    Op::Release(index) => {
                        if !holders.is_empty() {
                            let port = holders.remove(index % holders.len());
                            prop_assert!(pool.release(port));
                        }
                    }
                }
                prop_assert_eq!(pool.held_count(), holders.len());
            }
        }
    }
}
