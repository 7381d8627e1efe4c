//! Per-run alert budget.

/// Caps how many escalations one evaluator run may enqueue.
///
/// Owned by a single batch run, so it needs no synchronisation. A fresh
/// budget is created for every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertBudget {
    cap: usize,
    used: usize,
}

impl AlertBudget {
    pub fn new(cap: usize) -> Self {
        Self { cap, used: 0 }
    }

    /// Take one slot if any remain. Check and increment are one step.
    pub fn try_consume(&mut self) -> bool {
        if self.used < self.cap {
            self.used += 1;
            true
        } else {
            false
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.cap
    }

    pub fn remaining(&self) -> usize {
        self.cap - self.used
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumes_up_to_cap() {
        let mut budget = AlertBudget::new(2);
        assert!(budget.try_consume());
        assert!(budget.try_consume());
        assert!(!budget.try_consume());
        assert!(budget.is_exhausted());
        assert_eq!(budget.used(), 2);
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn zero_cap_is_exhausted_from_start() {
        let mut budget = AlertBudget::new(0);
        assert!(budget.is_exhausted());
        assert!(!budget.try_consume());
    }
}
