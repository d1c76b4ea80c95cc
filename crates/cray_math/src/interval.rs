/// A range of ray parameters between `min` and `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f32,
    pub max: f32,
}

impl Interval {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Returns true if x is strictly within `(min, max)`.
    pub fn surrounds(&self, x: f32) -> bool {
        self.min < x && x < self.max
    }
}
