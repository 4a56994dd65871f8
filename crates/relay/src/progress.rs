use std::fmt;

/// Bytes transferred so far against the declared total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    pub transferred: u64,
    pub total: u64,
}

impl ProgressSample {
    pub fn new(transferred: u64, total: u64) -> Self {
        Self { transferred, total }
    }

    /// Percentage complete, rounded to two decimal places.
    ///
    /// An empty asset (`total == 0`) is reported as fully transferred.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        let raw = self.transferred as f64 / self.total as f64 * 100.0;
        (raw * 100.0).round() / 100.0
    }

    pub fn is_complete(&self) -> bool {
        self.transferred >= self.total
    }
}

impl fmt::Display for ProgressSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.percentage())
    }
}

/// Receives one [`ProgressSample`] per chunk accepted by the sink.
///
/// Called synchronously from the copy loop: an observer that blocks stalls
/// the relay.
pub trait ProgressObserver: Send {
    fn on_progress(&mut self, sample: ProgressSample);
}

impl<F> ProgressObserver for F
where
    F: FnMut(ProgressSample) + Send,
{
    fn on_progress(&mut self, sample: ProgressSample) {
        self(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_quarters() {
        assert_eq!(ProgressSample::new(250_000, 1_000_000).percentage(), 25.0);
        assert_eq!(ProgressSample::new(1_000_000, 1_000_000).percentage(), 100.0);
    }

    #[test]
    fn percentage_rounds_to_two_decimals() {
        assert_eq!(ProgressSample::new(1, 3).percentage(), 33.33);
        assert_eq!(ProgressSample::new(2, 3).percentage(), 66.67);
    }

    #[test]
    fn empty_total_is_complete() {
        let sample = ProgressSample::new(0, 0);
        assert_eq!(sample.percentage(), 100.0);
        assert!(!sample.percentage().is_nan());
        assert!(sample.is_complete());
    }

    #[test]
    fn display_has_two_decimals() {
        assert_eq!(ProgressSample::new(1, 4).to_string(), "25.00");
        assert_eq!(ProgressSample::new(0, 0).to_string(), "100.00");
    }

    #[test]
    fn closure_observer() {
        let mut seen = Vec::new();
        {
            let mut observer = |s: ProgressSample| seen.push(s.percentage());
            observer.on_progress(ProgressSample::new(1, 2));
        }
        assert_eq!(seen, vec![50.0]);
    }
}
