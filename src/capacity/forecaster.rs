//! Demand forecaster: seasonality-aware moving-average / exponential
//! smoothing with linearly-widening confidence bands. See spec §4.14.

use super::config::ResourceType;
use super::monitor::ResourceMonitor;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;

const SEASONALITY_THRESHOLD: f64 = 0.3;
const SMOOTHING_ALPHA: f64 = 0.3;
const DEFAULT_VALUE: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub predicted_value: f64,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
}

#[derive(Debug, Clone)]
pub struct DemandForecast {
    pub points: Vec<ForecastPoint>,
    pub model_used: String,
    pub horizon_hours: u32,
}

fn mean(series: &[f64]) -> f64 {
    series.iter().sum::<f64>() / series.len() as f64
}

fn std_dev(series: &[f64]) -> f64 {
    if series.len() < 2 {
        return 0.0;
    }
    let m = mean(series);
    let variance = series.iter().map(|v| (v - m).powi(2)).sum::<f64>() / series.len() as f64;
    variance.sqrt()
}

/// Normalized lag-`lag` autocorrelation of `series`.
fn autocorrelation(series: &[f64], lag: usize) -> f64 {
    let n = series.len();
    if lag == 0 || lag >= n {
        return 0.0;
    }
    let m = mean(series);
    let denom: f64 = series.iter().map(|v| (v - m).powi(2)).sum();
    if denom == 0.0 {
        return 0.0;
    }
    let numer: f64 = (0..n - lag).map(|t| (series[t] - m) * (series[t + lag] - m)).sum();
    numer / denom
}

struct SeasonalityDetection {
    is_seasonal: bool,
    period: usize,
}

fn detect_seasonality(series: &[f64]) -> SeasonalityDetection {
    let max_lag = (series.len() / 2).min(48);
    let mut best_lag = 0;
    let mut best_score = f64::NEG_INFINITY;
    for lag in 2..=max_lag.max(2) {
        if lag >= series.len() {
            break;
        }
        let score = autocorrelation(series, lag);
        if score > best_score {
            best_score = score;
            best_lag = lag;
        }
    }
    SeasonalityDetection {
        is_seasonal: best_score > SEASONALITY_THRESHOLD,
        period: best_lag,
    }
}

fn seasonal_moving_average_forecast(series: &[f64], period: usize, steps: usize) -> Vec<f64> {
    let mut phase_sums = vec![0.0; period];
    let mut phase_counts = vec![0usize; period];
    for (i, value) in series.iter().enumerate() {
        let phase = i % period;
        phase_sums[phase] += value;
        phase_counts[phase] += 1;
    }
    let phase_avg: Vec<f64> = phase_sums
        .iter()
        .zip(&phase_counts)
        .map(|(sum, count)| if *count > 0 { sum / *count as f64 } else { mean(series) })
        .collect();

    (0..steps)
        .map(|i| {
            let phase = (series.len() + i) % period;
            phase_avg[phase]
        })
        .collect()
}

fn exponential_smoothing_forecast(series: &[f64], steps: usize) -> Vec<f64> {
    let mut level = series[0];
    for value in &series[1..] {
        level = SMOOTHING_ALPHA * value + (1.0 - SMOOTHING_ALPHA) * level;
    }
    vec![level; steps]
}

pub struct Forecaster {
    accuracy_log: Mutex<Vec<(f64, f64)>>,
}

impl Forecaster {
    pub fn new() -> Self {
        Self {
            accuracy_log: Mutex::new(Vec::new()),
        }
    }

    pub fn forecast(
        &self,
        monitor: &ResourceMonitor,
        resource_type: ResourceType,
        service: &str,
        horizon_hours: u32,
    ) -> DemandForecast {
        let history = monitor.history(resource_type, service, (horizon_hours as usize) * 2);
        let series: Vec<f64> = history.iter().map(|m| m.utilization_pct).collect();
        let now = Utc::now();

        if series.len() < 3 {
            let flat = series.last().copied().unwrap_or(DEFAULT_VALUE);
            let points = (1..=horizon_hours)
                .map(|h| ForecastPoint {
                    timestamp: now + ChronoDuration::hours(h as i64),
                    predicted_value: flat,
                    confidence_lower: flat,
                    confidence_upper: flat,
                })
                .collect();
            return DemandForecast {
                points,
                model_used: "flat".to_string(),
                horizon_hours,
            };
        }

        let detection = detect_seasonality(&series);
        let (predictions, model_used) = if detection.is_seasonal {
            (
                seasonal_moving_average_forecast(&series, detection.period.max(1), horizon_hours as usize),
                "seasonal_moving_average".to_string(),
            )
        } else {
            (
                exponential_smoothing_forecast(&series, horizon_hours as usize),
                "exponential_smoothing".to_string(),
            )
        };

        let base_width = std_dev(&series).max(0.5);
        let points = predictions
            .into_iter()
            .enumerate()
            .map(|(i, predicted_value)| {
                let width = base_width * (1.0 + (i + 1) as f64 / horizon_hours as f64);
                ForecastPoint {
                    timestamp: now + ChronoDuration::hours((i + 1) as i64),
                    predicted_value,
                    confidence_lower: predicted_value - width,
                    confidence_upper: predicted_value + width,
                }
            })
            .collect();

        DemandForecast {
            points,
            model_used,
            horizon_hours,
        }
    }

    /// Records a (predicted, actual) pair for later MAPE-based accuracy.
    pub fn record_actual(&self, predicted: f64, actual: f64) {
        self.accuracy_log.lock().push((predicted, actual));
    }

    /// MAPE-based accuracy on a 0-100 scale (100 = perfect).
    pub fn accuracy(&self) -> f64 {
        let log = self.accuracy_log.lock();
        if log.is_empty() {
            return 0.0;
        }
        let mape = log
            .iter()
            .filter(|(_, actual)| *actual != 0.0)
            .map(|(predicted, actual)| ((actual - predicted) / actual).abs())
            .sum::<f64>()
            / log.len() as f64;
        (100.0 * (1.0 - mape)).clamp(0.0, 100.0)
    }
}

impl Default for Forecaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::monitor::ResourceMetric;
    use crate::capacity::config::CapacityConfig;

    #[test]
    fn fewer_than_three_samples_yields_flat_forecast() {
        let monitor = ResourceMonitor::new(CapacityConfig::default());
        monitor.record(ResourceMetric::new(ResourceType::Cpu, 60.0, 100.0, "api"));
        let forecaster = Forecaster::new();
        let forecast = forecaster.forecast(&monitor, ResourceType::Cpu, "api", 6);
        assert_eq!(forecast.model_used, "flat");
        assert!(forecast.points.iter().all(|p| (p.predicted_value - 60.0).abs() < 1e-9));
    }

    #[test]
    fn periodic_series_is_detected_as_seasonal() {
        let period = 4;
        let series: Vec<f64> = (0..32).map(|i| [20.0, 80.0, 40.0, 60.0][i % period]).collect();
        let detection = detect_seasonality(&series);
        assert!(detection.is_seasonal);
        assert_eq!(detection.period, period);
    }

    #[test]
    fn non_seasonal_series_uses_exponential_smoothing() {
        let monitor = ResourceMonitor::new(CapacityConfig::default());
        for v in [10.0, 11.0, 9.0, 10.5, 10.2, 9.8] {
            monitor.record(ResourceMetric::new(ResourceType::Cpu, v, 100.0, "api"));
        }
        let forecaster = Forecaster::new();
        let forecast = forecaster.forecast(&monitor, ResourceType::Cpu, "api", 4);
        assert_eq!(forecast.model_used, "exponential_smoothing");
    }

    #[test]
    fn confidence_band_widens_with_horizon() {
        let monitor = ResourceMonitor::new(CapacityConfig::default());
        for v in [10.0, 40.0, 15.0, 45.0, 12.0, 42.0] {
            monitor.record(ResourceMetric::new(ResourceType::Cpu, v, 100.0, "api"));
        }
        let forecaster = Forecaster::new();
        let forecast = forecaster.forecast(&monitor, ResourceType::Cpu, "api", 6);
        let first_width = forecast.points[0].confidence_upper - forecast.points[0].confidence_lower;
        let last_width = forecast.points.last().unwrap().confidence_upper - forecast.points.last().unwrap().confidence_lower;
        assert!(last_width >= first_width);
    }
}
