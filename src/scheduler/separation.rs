/// Points already claimed in normalized coordinates, for minimum-separation
/// checks.
pub(crate) struct SeparationIndex {
    points: Vec<Vec<f64>>,
    min_sq: f64,
}

impl SeparationIndex {
    pub(crate) fn new(min_separation: f64) -> Self {
        Self {
            points: Vec::new(),
            min_sq: min_separation * min_separation,
        }
    }

    /// `true` if `x` keeps the minimum separation from every claimed point.
    pub(crate) fn is_clear(&self, x: &[f64]) -> bool {
        self.points.iter().all(|p| {
            let d_sq: f64 = p.iter().zip(x).map(|(a, b)| (a - b).powi(2)).sum();
            d_sq >= self.min_sq
        })
    }

    pub(crate) fn claim(&mut self, x: Vec<f64>) {
        self.points.push(x);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.points.len()
    }
}
