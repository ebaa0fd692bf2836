// Rolling window store - Bounded per-farm reading history
use crate::domain::reading::{Metric, SensorReading, TimeSeriesPoint};
use crate::domain::snapshot::MetricSummary;
use crate::error::ValidationError;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

pub const DEFAULT_WINDOW_CAPACITY: usize = 24;

type Window = Arc<Mutex<VecDeque<SensorReading>>>;

/// Keeps the last `capacity` readings of every farm.
///
/// The farm map is only write-locked when a farm is seen for the first time;
/// afterwards each farm has its own lock, so appends to different farms never
/// contend. Insert and evict happen under the same per-farm lock, and readers
/// copy the window out instead of holding the lock.
#[derive(Debug)]
pub struct RollingWindowStore {
    capacity: usize,
    farms: RwLock<HashMap<String, Window>>,
}

impl RollingWindowStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            farms: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a reading, returning the evicted one when the window was full.
    pub fn append(
        &self,
        farm_id: &str,
        reading: SensorReading,
    ) -> Result<Option<SensorReading>, ValidationError> {
        let window = self.window_or_insert(farm_id);
        let mut readings = lock(&window);

        if let Some(last) = readings.back() {
            if reading.timestamp < last.timestamp {
                return Err(ValidationError::OutOfOrder {
                    timestamp: reading.timestamp,
                    last: last.timestamp,
                });
            }
        }

        let evicted = if readings.len() >= self.capacity {
            readings.pop_front()
        } else {
            None
        };
        readings.push_back(reading);

        Ok(evicted)
    }

    /// Copy of the farm's window, oldest first. Empty for unknown farms.
    pub fn snapshot(&self, farm_id: &str) -> Vec<SensorReading> {
        match self.window(farm_id) {
            Some(window) => lock(&window).iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn latest(&self, farm_id: &str) -> Option<SensorReading> {
        let window = self.window(farm_id)?;
        let readings = lock(&window);
        readings.back().cloned()
    }

    pub fn len(&self, farm_id: &str) -> usize {
        self.window(farm_id).map(|w| lock(&w).len()).unwrap_or(0)
    }

    pub fn is_empty(&self, farm_id: &str) -> bool {
        self.len(farm_id) == 0
    }

    pub fn farms(&self) -> Vec<String> {
        let farms = self.farms.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = farms.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Chart-ready series for one metric, bucket-averaged down to `max_points`.
    pub fn series(&self, farm_id: &str, metric: Metric, max_points: usize) -> Vec<TimeSeriesPoint> {
        let points = self
            .snapshot(farm_id)
            .iter()
            .map(|r| TimeSeriesPoint::new(r.timestamp.timestamp_millis(), r.value(metric)))
            .collect();
        downsample_points(points, max_points)
    }

    /// Min/mean/max of every metric over the current window.
    pub fn summary(&self, farm_id: &str) -> Vec<MetricSummary> {
        summarize(&self.snapshot(farm_id))
    }

    fn window(&self, farm_id: &str) -> Option<Window> {
        let farms = self.farms.read().unwrap_or_else(|e| e.into_inner());
        farms.get(farm_id).cloned()
    }

    fn window_or_insert(&self, farm_id: &str) -> Window {
        if let Some(window) = self.window(farm_id) {
            return window;
        }

        let mut farms = self.farms.write().unwrap_or_else(|e| e.into_inner());
        farms
            .entry(farm_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::with_capacity(self.capacity))))
            .clone()
    }
}

impl Default for RollingWindowStore {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

fn lock(window: &Window) -> MutexGuard<'_, VecDeque<SensorReading>> {
    window.lock().unwrap_or_else(|e| e.into_inner())
}

pub fn summarize(readings: &[SensorReading]) -> Vec<MetricSummary> {
    if readings.is_empty() {
        return Vec::new();
    }

    Metric::ALL
        .iter()
        .map(|&metric| {
            let values = readings.iter().map(|r| r.value(metric));
            let min = values.clone().fold(f64::INFINITY, f64::min);
            let max = values.clone().fold(f64::NEG_INFINITY, f64::max);
            let mean = values.sum::<f64>() / readings.len() as f64;
            MetricSummary {
                metric,
                min,
                mean,
                max,
            }
        })
        .collect()
}

/// Downsample time series points using bucket averaging
fn downsample_points(points: Vec<TimeSeriesPoint>, max_points: usize) -> Vec<TimeSeriesPoint> {
    if max_points == 0 || points.len() <= max_points {
        return points;
    }

    let bucket_size = (points.len() as f64 / max_points as f64).ceil() as usize;
    let mut downsampled = Vec::with_capacity(max_points);

    for chunk in points.chunks(bucket_size) {
        // Middle point's timestamp, average value
        let mid_idx = chunk.len() / 2;
        let avg_value = chunk.iter().map(|p| p.value).sum::<f64>() / chunk.len() as f64;
        downsampled.push(TimeSeriesPoint::new(chunk[mid_idx].time_ms, avg_value));
    }

    downsampled
}
