use std::collections::HashMap;

/// Per-device send/suppress decision. A sample is transmitted when the
/// intensity moved more than the threshold since the last transmitted
/// value, or when it is a near-zero stop (below half the threshold) —
/// stops must always reach the device so an actuator never sticks at a
/// nonzero intensity.
///
/// Owned exclusively by the router task; the last-sent table is only
/// written after a successful transmit.
pub(crate) struct RateLimiter {
    threshold: f32,
    last_sent: HashMap<String, f32>,
}

impl RateLimiter {
    pub(crate) fn new(threshold: f32) -> Self {
        Self {
            threshold,
            last_sent: HashMap::new(),
        }
    }

    pub(crate) fn should_send(&self, device: &str, value: f32) -> bool {
        let last = self.last_sent.get(device).copied().unwrap_or(0.0);
        (value - last).abs() > self.threshold || value < self.threshold / 2.0
    }

    /// Records a successful transmit.
    pub(crate) fn commit(&mut self, device: &str, value: f32) {
        self.last_sent.insert(device.to_string(), value);
    }

    #[cfg(test)]
    pub(crate) fn last_sent(&self, device: &str) -> f32 {
        self.last_sent.get(device).copied().unwrap_or(0.0)
    }
}
