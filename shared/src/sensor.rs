//! Sensor Signal Models
//!
//! Each configured sensor owns a bounded value and a cumulative energy
//! counter. Both advance once per tick using one of the evolution
//! strategies below.

use crate::{timing, ConfigError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Smallest smoothing factor accepted for the smoothed strategy
pub const ALPHA_MIN: f64 = 0.05;

/// Largest smoothing factor accepted for the smoothed strategy
pub const ALPHA_MAX: f64 = 0.1;

/// Static description of one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSpec {
    pub name: String,
    pub unit: String,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub threshold: Option<f64>,
}

impl SensorSpec {
    /// Create a sensor without an alert threshold
    pub fn new(name: impl Into<String>, unit: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            min,
            max,
            threshold: None,
        }
    }

    /// Attach an alert threshold
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Check the range invariant `min < max`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptySensorName);
        }
        if !self.min.is_finite() || !self.max.is_finite() || self.min >= self.max {
            return Err(ConfigError::InvalidRange {
                name: self.name.clone(),
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// How a sensor's value evolves from one tick to the next
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EvolutionStrategy {
    /// Add `uniform(-step, step)` and clamp to the sensor range
    RandomWalk { step: f64 },
    /// Exponentially smooth a fresh uniform draw, optionally followed by a
    /// recency-weighted moving average over `window` samples
    Smoothed { alpha: f64, window: Option<usize> },
    /// Independent uniform draw every tick
    Uniform,
}

impl Default for EvolutionStrategy {
    fn default() -> Self {
        Self::RandomWalk {
            step: timing::WALK_STEP,
        }
    }
}

impl EvolutionStrategy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Self::RandomWalk { step } if !(step.is_finite() && step > 0.0) => {
                Err(ConfigError::InvalidSetting {
                    name: "step",
                    reason: format!("random walk step must be positive, got {}", step),
                })
            }
            Self::Smoothed { alpha, .. } if !(ALPHA_MIN..=ALPHA_MAX).contains(&alpha) => {
                Err(ConfigError::InvalidSetting {
                    name: "alpha",
                    reason: format!(
                        "smoothing factor must be within [{}, {}], got {}",
                        ALPHA_MIN, ALPHA_MAX, alpha
                    ),
                })
            }
            Self::Smoothed {
                window: Some(0), ..
            } => Err(ConfigError::InvalidSetting {
                name: "window",
                reason: "smoothing window must hold at least one sample".into(),
            }),
            _ => Ok(()),
        }
    }
}

/// Recency-weighted moving average over a bounded window
///
/// Weights rise linearly from 0.5 (oldest) to 1.0 (newest) and are
/// normalized to sum to one.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSmoother {
    window: usize,
    history: VecDeque<f64>,
}

impl SignalSmoother {
    /// Create a smoother retaining at most `window` samples
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            history: VecDeque::with_capacity(window),
        }
    }

    /// Record a sample and return the weighted average of the window
    pub fn smooth(&mut self, value: f64) -> f64 {
        self.history.push_back(value);
        while self.history.len() > self.window {
            self.history.pop_front();
        }
        weighted_average(&self.history)
    }

    /// Retained samples, oldest first
    pub fn history(&self) -> &VecDeque<f64> {
        &self.history
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

fn weighted_average(samples: &VecDeque<f64>) -> f64 {
    let n = samples.len();
    if n == 1 {
        return samples[0];
    }

    let last = (n - 1) as f64;
    let (sum, weights) = samples
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sum, weights), (i, value)| {
            let weight = 0.5 + 0.5 * i as f64 / last;
            (sum + weight * value, weights + weight)
        });
    sum / weights
}

/// Mutable per-sensor state
#[derive(Debug, Clone, PartialEq)]
pub struct SensorState {
    /// Current value, always within the sensor range
    pub current_value: f64,
    /// Cumulative energy, never decreases
    pub cumulative_energy: f64,
    /// Moving-average window, present only for the windowed smoothed strategy
    pub smoother: Option<SignalSmoother>,
}

/// Values produced by one tick of a sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Emitted value after scaling (not clamped)
    pub value: f64,
    /// Cumulative energy after this tick
    pub energy: f64,
}

/// One simulated sensor
#[derive(Debug, Clone)]
pub struct SensorModel {
    spec: SensorSpec,
    strategy: EvolutionStrategy,
    state: SensorState,
}

impl SensorModel {
    /// Create a sensor with a uniformly random initial value in range
    pub fn new<R: Rng + ?Sized>(spec: SensorSpec, strategy: EvolutionStrategy, rng: &mut R) -> Self {
        let initial = rng.gen_range(spec.min..=spec.max);
        Self::with_initial_value(spec, strategy, initial)
    }

    /// Create a sensor starting at a known value (clamped into range)
    pub fn with_initial_value(spec: SensorSpec, strategy: EvolutionStrategy, value: f64) -> Self {
        let smoother = match strategy {
            EvolutionStrategy::Smoothed {
                window: Some(window),
                ..
            } => Some(SignalSmoother::new(window)),
            _ => None,
        };

        let state = SensorState {
            current_value: value.clamp(spec.min, spec.max),
            cumulative_energy: 0.0,
            smoother,
        };

        Self {
            spec,
            strategy,
            state,
        }
    }

    pub fn spec(&self) -> &SensorSpec {
        &self.spec
    }

    pub fn state(&self) -> &SensorState {
        &self.state
    }

    pub fn strategy(&self) -> EvolutionStrategy {
        self.strategy
    }

    /// Advance the sensor by one tick
    ///
    /// The emitted value is the evolved value multiplied by `scale`; energy
    /// grows by `uniform(0.1, 1.0) * scale`.
    pub fn advance<R: Rng + ?Sized>(&mut self, rng: &mut R, scale: f64) -> Sample {
        let base = self.evolve(rng);

        let step = rng.gen_range(timing::ENERGY_STEP_MIN..=timing::ENERGY_STEP_MAX);
        // energy never decreases, whatever the scale
        self.state.cumulative_energy += step * scale.max(0.0);

        Sample {
            value: base * scale,
            energy: self.state.cumulative_energy,
        }
    }

    fn evolve<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f64 {
        let (min, max) = (self.spec.min, self.spec.max);

        match self.strategy {
            EvolutionStrategy::RandomWalk { step } => {
                let delta = rng.gen_range(-step..=step);
                self.state.current_value = (self.state.current_value + delta).clamp(min, max);
                self.state.current_value
            }
            EvolutionStrategy::Smoothed { alpha, .. } => {
                let draw = rng.gen_range(min..=max);
                self.state.current_value = alpha * draw + (1.0 - alpha) * self.state.current_value;
                match self.state.smoother.as_mut() {
                    Some(smoother) => smoother.smooth(self.state.current_value),
                    None => self.state.current_value,
                }
            }
            EvolutionStrategy::Uniform => {
                self.state.current_value = rng.gen_range(min..=max);
                self.state.current_value
            }
        }
    }
}
