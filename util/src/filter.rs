//! Moving average filtering for 6-vector signal streams

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Windowed mean filter over a stream of 6-vectors.
///
/// The window is a fixed-capacity ring stored alongside a running sum, so
/// each [`MovingAverage6::filter`] call is O(1) in the window size. Until
/// the window has filled, the mean is taken over the samples inserted so
/// far. A window size of 1 is a passthrough.
#[derive(Debug, Clone)]
pub struct MovingAverage6 {
    window: Vec<Vector6<f64>>,
    index: usize,
    count: usize,
    sum: Vector6<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MovingAverage6 {
    /// Create a new filter with the given window size.
    ///
    /// # Panics
    /// - If `window_size` is zero.
    pub fn new(window_size: usize) -> Self {
        assert!(window_size > 0, "filter window size must be at least 1");

        Self {
            window: vec![Vector6::zeros(); window_size],
            index: 0,
            count: 0,
            sum: Vector6::zeros(),
        }
    }

    /// Clear all accumulated samples.
    pub fn reset(&mut self) {
        self.index = 0;
        self.count = 0;
        self.sum = Vector6::zeros();
        for sample in self.window.iter_mut() {
            *sample = Vector6::zeros();
        }
    }

    /// Change the window size, reallocating and resetting the filter.
    ///
    /// # Panics
    /// - If `window_size` is zero.
    pub fn set_window_size(&mut self, window_size: usize) {
        assert!(window_size > 0, "filter window size must be at least 1");

        self.window = vec![Vector6::zeros(); window_size];
        self.reset();
    }

    /// Insert a new sample and return the mean of the window.
    pub fn filter(&mut self, new_data: Vector6<f64>) -> Vector6<f64> {
        self.sum -= self.window[self.index];
        self.sum += new_data;
        self.window[self.index] = new_data;
        self.index = (self.index + 1) % self.window.len();

        if self.count < self.window.len() {
            self.count += 1;
        }

        self.sum / self.count as f64
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
