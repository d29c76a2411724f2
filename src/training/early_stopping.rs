/// Patience-based early stopping on validation loss
///
/// Stops training once validation loss fails to improve for `patience`
/// consecutive epochs.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best_loss: f64,
    epochs_without_improvement: usize,
}

/// Outcome of observing one epoch's validation loss
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// Strictly below the best loss so far
    Improved,
    /// Not an improvement; carries the consecutive count
    NoImprovement(usize),
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best_loss: f64::INFINITY,
            epochs_without_improvement: 0,
        }
    }

    /// Record a validation loss
    pub fn observe(&mut self, loss: f64) -> Observation {
        if loss < self.best_loss {
            self.best_loss = loss;
            self.epochs_without_improvement = 0;
            Observation::Improved
        } else {
            self.epochs_without_improvement += 1;
            Observation::NoImprovement(self.epochs_without_improvement)
        }
    }

    /// True once the no-improvement count reaches patience
    pub fn should_stop(&self) -> bool {
        self.epochs_without_improvement >= self.patience
    }

    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    pub fn epochs_without_improvement(&self) -> usize {
        self.epochs_without_improvement
    }
}
