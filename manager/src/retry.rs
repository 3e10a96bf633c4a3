/// Bounded attempt counter: `{attempts, max}` with pre-increment claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    attempts: u8,
    max: u8,
}

impl RetryBudget {
    pub const fn new(max: u8) -> Self {
        Self { attempts: 0, max }
    }

    pub const fn attempts(&self) -> u8 {
        self.attempts
    }

    pub const fn max(&self) -> u8 {
        self.max
    }

    pub const fn is_exhausted(&self) -> bool {
        self.attempts >= self.max
    }

    /// Claims the next attempt and returns its 1-indexed number, or `None` when spent.
    pub fn begin(&mut self) -> Option<u8> {
        if self.is_exhausted() {
            return None;
        }
        self.attempts += 1;
        Some(self.attempts)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
