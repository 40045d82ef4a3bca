//! The stochastic weather process driving energy output.
//!
//! Weather moves between a fixed set of states via a Markov transition
//! matrix, so conditions are temporally correlated (a storm rarely follows
//! clear skies directly). The process is host-polled: the embedding
//! application calls [`WeatherProcess::poll`] from its event loop and the
//! process fires at most one atomic transition per call.
use anyhow::Result;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of past states retained in the transition history.
const HISTORY_LEN: usize = 50;

/// Number of entries in the rolling forecast.
pub const FORECAST_LEN: usize = 5;

/// Lower bound on the delay between scheduled transitions.
const MIN_DELAY_SECS: f64 = 5.0;

/// Maximum proportional jitter applied to a state's mean duration.
const MAX_JITTER: f64 = 0.3;

/// A discrete weather state
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Debug,
    SerializeLabeledStringEnum,
    DeserializeLabeledStringEnum,
)]
pub enum WeatherKind {
    /// Clear skies: peak solar output
    #[string = "sunny"]
    Sunny,
    /// Overcast: reduced solar output
    #[string = "cloudy"]
    Cloudy,
    /// Strong winds: peak wind output
    #[string = "windy"]
    Windy,
    /// Steady rain: strong hydro output
    #[string = "rainy"]
    Rainy,
    /// Severe storm: most renewables curtailed, hydro surges
    #[string = "stormy"]
    Stormy,
}

/// All weather states, in transition-matrix row/column order.
pub const ALL_WEATHER: [WeatherKind; 5] = [
    WeatherKind::Sunny,
    WeatherKind::Cloudy,
    WeatherKind::Windy,
    WeatherKind::Rainy,
    WeatherKind::Stormy,
];

/// Markov transition matrix. Row = current state, column = next state.
///
/// Invariant: every row sums to 1.0.
const TRANSITIONS: [[f64; 5]; 5] = [
    [0.50, 0.25, 0.10, 0.10, 0.05], // from sunny
    [0.30, 0.30, 0.15, 0.20, 0.05], // from cloudy
    [0.25, 0.25, 0.30, 0.10, 0.10], // from windy
    [0.15, 0.30, 0.10, 0.30, 0.15], // from rainy
    [0.10, 0.30, 0.15, 0.25, 0.20], // from stormy
];

impl WeatherKind {
    /// Position of this state in [`ALL_WEATHER`] and the transition matrix.
    fn index(self) -> usize {
        match self {
            WeatherKind::Sunny => 0,
            WeatherKind::Cloudy => 1,
            WeatherKind::Windy => 2,
            WeatherKind::Rainy => 3,
            WeatherKind::Stormy => 4,
        }
    }

    /// Static occurrence probability, used only for initial state selection.
    pub fn occurrence(self) -> f64 {
        match self {
            WeatherKind::Sunny => 0.35,
            WeatherKind::Cloudy => 0.25,
            WeatherKind::Windy => 0.15,
            WeatherKind::Rainy => 0.15,
            WeatherKind::Stormy => 0.10,
        }
    }

    /// Mean duration of the state before the next transition.
    pub fn mean_duration(self) -> Duration {
        let secs = match self {
            WeatherKind::Sunny => 45.0,
            WeatherKind::Cloudy => 30.0,
            WeatherKind::Windy => 25.0,
            WeatherKind::Rainy => 35.0,
            WeatherKind::Stormy => 15.0,
        };
        Duration::from_secs_f64(secs)
    }

    /// Short display description.
    pub fn description(self) -> &'static str {
        match self {
            WeatherKind::Sunny => "Clear skies",
            WeatherKind::Cloudy => "Overcast",
            WeatherKind::Windy => "Strong winds",
            WeatherKind::Rainy => "Steady rain",
            WeatherKind::Stormy => "Severe storm",
        }
    }
}

/// Pick the next state from the transition matrix row for `current`.
///
/// `draw` must be in `[0, 1)`; any such value maps to a valid state via
/// cumulative-distribution sampling.
pub fn select_from_transitions(current: WeatherKind, draw: f64) -> WeatherKind {
    let row = &TRANSITIONS[current.index()];

    let mut cumulative = 0.0;
    for (kind, &probability) in ALL_WEATHER.iter().zip(row) {
        cumulative += probability;
        if draw < cumulative {
            return *kind;
        }
    }

    // Floating-point shortfall in the row sum lands on the last state
    *ALL_WEATHER.last().unwrap()
}

/// Pick an initial state from the static occurrence probabilities.
pub fn select_initial(draw: f64) -> WeatherKind {
    let mut cumulative = 0.0;
    for kind in ALL_WEATHER {
        cumulative += kind.occurrence();
        if draw < cumulative {
            return kind;
        }
    }

    *ALL_WEATHER.last().unwrap()
}

/// Notification payload delivered to weather observers
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeatherChange {
    /// The state before the transition
    pub previous: WeatherKind,
    /// The state after the transition
    pub current: WeatherKind,
}

/// One entry of the rolling forecast
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ForecastEntry {
    /// Predicted state
    pub kind: WeatherKind,
    /// Prediction confidence, decaying with forecast distance
    pub confidence: f64,
}

/// Forecast confidence for the entry `day` steps ahead (1-based).
fn forecast_confidence(day: usize) -> f64 {
    (1.0 - 0.15 * (day as f64 - 1.0)).max(0.5)
}

/// Observer callback invoked synchronously on every transition.
///
/// Errors are logged at the notification site and never interrupt delivery
/// to the remaining observers.
pub type WeatherListener = Box<dyn FnMut(&WeatherChange) -> Result<()>>;

/// The Markov-chain weather process.
pub struct WeatherProcess {
    current: WeatherKind,
    history: VecDeque<WeatherKind>,
    forecast: Vec<ForecastEntry>,
    listeners: Vec<WeatherListener>,
    rng: SmallRng,
    /// Multiplier applied to mean state durations (scenario pacing).
    time_scale: f64,
    /// Deadline of the pending transition. `None` while the timer is stopped.
    next_due: Option<Instant>,
}

impl WeatherProcess {
    /// Create a process with a weighted-random initial state.
    pub fn new(seed: u64, time_scale: f64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let current = select_initial(rng.random());

        let mut process = Self {
            current,
            history: VecDeque::with_capacity(HISTORY_LEN),
            forecast: Vec::with_capacity(FORECAST_LEN),
            listeners: Vec::new(),
            rng,
            time_scale,
            next_due: None,
        };
        process.rebuild_forecast();
        process
    }

    /// Create a process in a known state (tests and save restoration).
    pub fn with_state(current: WeatherKind, seed: u64, time_scale: f64) -> Self {
        let mut process = Self::new(seed, time_scale);
        process.current = current;
        process.rebuild_forecast();
        process
    }

    /// The current weather state.
    pub fn current(&self) -> WeatherKind {
        self.current
    }

    /// Recent transition history, oldest first.
    pub fn history(&self) -> impl Iterator<Item = WeatherKind> + '_ {
        self.history.iter().copied()
    }

    /// The rolling forecast, nearest entry first.
    pub fn forecast(&self) -> &[ForecastEntry] {
        &self.forecast
    }

    /// Register an observer. Observers are notified in registration order.
    pub fn subscribe(&mut self, listener: WeatherListener) {
        self.listeners.push(listener);
    }

    /// Start the transition timer. A no-op if already running.
    pub fn start(&mut self) {
        if self.next_due.is_none() {
            self.schedule_next();
        }
    }

    /// Stop the transition timer, cancelling the pending transition.
    ///
    /// A no-op if already stopped.
    pub fn stop(&mut self) {
        self.next_due = None;
    }

    /// Whether the transition timer is running.
    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    /// Fire the pending transition if its deadline has passed.
    ///
    /// At most one transition fires per call; each firing is atomic (sample,
    /// mutate, notify) and reschedules the timer.
    pub fn poll(&mut self) -> Option<WeatherChange> {
        let due = self.next_due?;
        if Instant::now() < due {
            return None;
        }

        let change = self.advance();
        self.schedule_next();
        Some(change)
    }

    /// Perform one transition immediately, as if the timer had fired.
    pub fn advance(&mut self) -> WeatherChange {
        let draw = self.rng.random();
        let next = select_from_transitions(self.current, draw);
        self.transition_to(next)
    }

    /// Force a transition to a specific state (teaching/testing override).
    pub fn force_change(&mut self, kind: WeatherKind) -> WeatherChange {
        let change = self.transition_to(kind);
        if self.is_running() {
            self.schedule_next();
        }
        change
    }

    /// Overwrite current state and history from a save envelope.
    pub fn restore_state(&mut self, current: WeatherKind, history: &[WeatherKind]) {
        self.current = current;
        self.history = history
            .iter()
            .copied()
            .skip(history.len().saturating_sub(HISTORY_LEN))
            .collect();
        self.rebuild_forecast();
    }

    /// Apply one atomic transition: history, state, forecast, notifications.
    fn transition_to(&mut self, next: WeatherKind) -> WeatherChange {
        let change = WeatherChange {
            previous: self.current,
            current: next,
        };

        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(next);
        self.current = next;
        self.shift_forecast();

        log::debug!(
            "Weather changed: {} -> {}",
            change.previous.description(),
            change.current.description()
        );
        self.notify(&change);
        change
    }

    fn notify(&mut self, change: &WeatherChange) {
        for listener in &mut self.listeners {
            if let Err(err) = listener(change) {
                log::error!("Weather observer failed: {err:#}");
            }
        }
    }

    /// Rebuild the whole forecast by chaining the transition matrix forward.
    fn rebuild_forecast(&mut self) {
        self.forecast.clear();
        let mut last = self.current;
        for day in 1..=FORECAST_LEN {
            last = select_from_transitions(last, self.rng.random());
            self.forecast.push(ForecastEntry {
                kind: last,
                confidence: forecast_confidence(day),
            });
        }
    }

    /// Shift the forecast one step and append a new tail entry.
    fn shift_forecast(&mut self) {
        if !self.forecast.is_empty() {
            self.forecast.remove(0);
        }

        let last = self.forecast.last().map_or(self.current, |entry| entry.kind);
        let next = select_from_transitions(last, self.rng.random());
        self.forecast.push(ForecastEntry {
            kind: next,
            confidence: 0.0,
        });

        for (day, entry) in self.forecast.iter_mut().enumerate() {
            entry.confidence = forecast_confidence(day + 1);
        }
    }

    /// Sample the delay until the next transition: mean duration ±30% jitter,
    /// floored at the minimum delay.
    fn sample_delay(&mut self) -> Duration {
        let mean = self.current.mean_duration().as_secs_f64() * self.time_scale;
        let jitter: f64 = self.rng.random_range(-MAX_JITTER..=MAX_JITTER);
        Duration::from_secs_f64((mean * (1.0 + jitter)).max(MIN_DELAY_SECS))
    }

    fn schedule_next(&mut self) {
        let delay = self.sample_delay();
        self.next_due = Some(Instant::now() + delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[test]
    fn test_transition_rows_sum_to_one() {
        for (kind, row) in ALL_WEATHER.iter().zip(&TRANSITIONS) {
            let sum: f64 = row.iter().sum();
            assert_approx_eq!(f64, sum, 1.0, epsilon = 1e-9);
            assert_eq!(row.len(), ALL_WEATHER.len(), "row for {kind:?}");
        }
    }

    #[test]
    fn test_select_from_transitions_any_draw() {
        // Any draw in [0, 1) must map to a valid state for every current state
        for current in ALL_WEATHER {
            for step in 0..1000 {
                let draw = f64::from(step) / 1000.0;
                let next = select_from_transitions(current, draw);
                assert!(ALL_WEATHER.contains(&next));
            }
        }
    }

    #[rstest]
    #[case(0.0, WeatherKind::Sunny)]
    #[case(0.34, WeatherKind::Sunny)]
    #[case(0.35, WeatherKind::Cloudy)]
    #[case(0.59, WeatherKind::Cloudy)]
    #[case(0.999, WeatherKind::Stormy)]
    fn test_select_initial(#[case] draw: f64, #[case] expected: WeatherKind) {
        assert_eq!(select_initial(draw), expected);
    }

    #[test]
    fn test_forecast_confidence_decay() {
        let process = WeatherProcess::new(1, 1.0);
        let forecast = process.forecast();
        assert_eq!(forecast.len(), FORECAST_LEN);

        assert_approx_eq!(f64, forecast[0].confidence, 1.0);
        assert_approx_eq!(f64, forecast[1].confidence, 0.85);
        assert_approx_eq!(f64, forecast[4].confidence, 0.5); // floored
    }

    #[test]
    fn test_forecast_shifts_on_transition() {
        let mut process = WeatherProcess::new(7, 1.0);
        let upcoming = process.forecast()[1].kind;

        process.advance();
        assert_eq!(process.forecast().len(), FORECAST_LEN);
        assert_eq!(process.forecast()[0].kind, upcoming);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut process = WeatherProcess::new(3, 1.0);
        for _ in 0..(HISTORY_LEN + 20) {
            process.advance();
        }
        assert_eq!(process.history().count(), HISTORY_LEN);
    }

    #[test]
    fn test_timer_start_stop_idempotent() {
        let mut process = WeatherProcess::new(5, 1.0);
        assert!(!process.is_running());

        process.start();
        let due = process.next_due;
        process.start(); // second start must not reschedule
        assert_eq!(process.next_due, due);

        process.stop();
        process.stop();
        assert!(!process.is_running());
        assert!(process.poll().is_none()); // cancelled: nothing pending
    }

    #[test]
    fn test_sample_delay_bounds() {
        let mut process = WeatherProcess::with_state(WeatherKind::Sunny, 11, 1.0);
        let mean = WeatherKind::Sunny.mean_duration().as_secs_f64();

        for _ in 0..500 {
            let delay = process.sample_delay().as_secs_f64();
            assert!(delay >= MIN_DELAY_SECS);
            assert!(delay <= mean * (1.0 + MAX_JITTER) + 1e-9);
            assert!(delay >= mean * (1.0 - MAX_JITTER) - 1e-9);
        }
    }

    #[test]
    fn test_observers_notified_in_order_despite_errors() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut process = WeatherProcess::new(9, 1.0);

        let first = Rc::clone(&seen);
        process.subscribe(Box::new(move |_| {
            first.borrow_mut().push("first");
            anyhow::bail!("listener exploded")
        }));
        let second = Rc::clone(&seen);
        process.subscribe(Box::new(move |_| {
            second.borrow_mut().push("second");
            Ok(())
        }));

        process.advance();
        assert_eq!(*seen.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_force_change() {
        let mut process = WeatherProcess::with_state(WeatherKind::Sunny, 13, 1.0);
        let change = process.force_change(WeatherKind::Stormy);
        assert_eq!(change.previous, WeatherKind::Sunny);
        assert_eq!(process.current(), WeatherKind::Stormy);
    }
}
