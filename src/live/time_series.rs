use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::MetricSnapshot;

/// Points kept per chart when nothing else is configured.
pub const DEFAULT_WINDOW_CAPACITY: usize = 60;

/// A window shared between the feed task that writes it and the panel that reads it.
pub type SharedWindow = Arc<Mutex<TimeSeriesWindow>>;

/// Locks a shared window. A panic while holding the lock cannot leave the
/// window half-written (every mutation finishes before returning), so a
/// poisoned lock is still safe to use.
pub fn lock_window(window: &SharedWindow) -> MutexGuard<'_, TimeSeriesWindow> {
    window.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSnapshot {
    pub name: String,
    pub values: Vec<f64>,
}

/// Owned copy of a window's contents. Later appends to the window never show
/// up here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowSnapshot {
    pub labels: Vec<String>,
    pub series: Vec<SeriesSnapshot>,
}

impl WindowSnapshot {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn series(&self, name: &str) -> Option<&[f64]> {
        self.series
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.values.as_slice())
    }
}

/// Fixed-capacity FIFO of labelled points, one column per tracked series.
///
/// Every append adds exactly one point to every series, so labels and series
/// always have the same length.
#[derive(Debug, Clone)]
pub struct TimeSeriesWindow {
    capacity: usize,
    labels: VecDeque<String>,
    series: Vec<(String, VecDeque<f64>)>,
}

impl TimeSeriesWindow {
    pub fn new<I, S>(capacity: usize, series_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let capacity = capacity.max(1);
        let series = series_names
            .into_iter()
            .map(|name| (name.into(), VecDeque::with_capacity(capacity)))
            .collect();
        Self {
            capacity,
            labels: VecDeque::with_capacity(capacity),
            series,
        }
    }

    pub fn shared(self) -> SharedWindow {
        Arc::new(Mutex::new(self))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn series_names(&self) -> impl Iterator<Item = &str> {
        self.series.iter().map(|(name, _)| name.as_str())
    }

    /// Appends one point per tracked series. Series missing from `values`
    /// record 0; values for untracked series are ignored.
    pub fn append(&mut self, label: impl Into<String>, values: &BTreeMap<String, f64>) {
        self.labels.push_back(label.into());
        for (name, points) in &mut self.series {
            points.push_back(values.get(name).copied().unwrap_or(0.0));
        }
        while self.labels.len() > self.capacity {
            self.labels.pop_front();
            for (_, points) in &mut self.series {
                points.pop_front();
            }
        }
    }

    pub fn append_snapshot(&mut self, label: impl Into<String>, snapshot: &MetricSnapshot) {
        self.append(label, &snapshot.values);
    }

    /// Most recent label with the value of every series at that point.
    pub fn latest(&self) -> Option<(&str, Vec<(&str, f64)>)> {
        let label = self.labels.back()?;
        let values = self
            .series
            .iter()
            .filter_map(|(name, points)| points.back().map(|v| (name.as_str(), *v)))
            .collect();
        Some((label.as_str(), values))
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            labels: self.labels.iter().cloned().collect(),
            series: self
                .series
                .iter()
                .map(|(name, points)| SeriesSnapshot {
                    name: name.clone(),
                    values: points.iter().copied().collect(),
                })
                .collect(),
        }
    }

    pub fn clear(&mut self) {
        self.labels.clear();
        for (_, points) in &mut self.series {
            points.clear();
        }
    }
}
