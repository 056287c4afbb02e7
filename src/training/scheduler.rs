//! Learning Rate Scheduler Module
//!
//! Reduce-on-plateau scheduling driven by the validation loss.

use serde::{Deserialize, Serialize};

/// Settings for [`ReduceLrOnPlateau`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlateauConfig {
    /// Multiplicative reduction applied to the learning rate
    pub factor: f64,
    /// Non-improving epochs tolerated before reducing
    pub patience: usize,
    /// Relative improvement required to reset the patience counter
    pub threshold: f64,
    /// Lower bound on the learning rate
    pub min_lr: f64,
    /// Reductions smaller than this are ignored
    pub eps: f64,
}

impl Default for PlateauConfig {
    fn default() -> Self {
        Self {
            factor: 0.5,
            patience: 2,
            threshold: 1e-4,
            min_lr: 0.0,
            eps: 1e-8,
        }
    }
}

/// Reduces the learning rate when a minimised metric stops improving
///
/// A metric counts as an improvement when it is below `best * (1 - threshold)`.
/// Once more than `patience` consecutive epochs fail to improve, the rate is
/// multiplied by `factor` and the counter restarts.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    config: PlateauConfig,
    current_lr: f64,
    best_metric: Option<f64>,
    bad_epochs: usize,
    num_reductions: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(initial_lr: f64, config: PlateauConfig) -> Self {
        Self {
            config,
            current_lr: initial_lr,
            best_metric: None,
            bad_epochs: 0,
            num_reductions: 0,
        }
    }

    /// Get the current learning rate
    pub fn lr(&self) -> f64 {
        self.current_lr
    }

    pub fn best_metric(&self) -> Option<f64> {
        self.best_metric
    }

    pub fn num_reductions(&self) -> usize {
        self.num_reductions
    }

    fn is_improvement(&self, metric: f64) -> bool {
        match self.best_metric {
            Some(best) => metric < best * (1.0 - self.config.threshold),
            None => true,
        }
    }

    /// Record an epoch's metric and return the learning rate to use next
    pub fn step(&mut self, metric: f64) -> f64 {
        if self.is_improvement(metric) {
            self.best_metric = Some(metric);
            self.bad_epochs = 0;
        } else {
            self.bad_epochs += 1;
        }

        if self.bad_epochs > self.config.patience {
            let new_lr = (self.current_lr * self.config.factor).max(self.config.min_lr);
            if self.current_lr - new_lr > self.config.eps {
                self.current_lr = new_lr;
                self.num_reductions += 1;
            }
            self.bad_epochs = 0;
        }

        self.current_lr
    }
}
