//! Gaussian filter kernels.

/// A symmetric convolution kernel with `2 * radius + 1` taps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterKernel {
    /// Taps on each side of the center.
    pub radius: usize,
    /// Coefficients, leftmost tap first.
    pub coeffs: &'static [f32],
}

impl FilterKernel {
    /// Coefficient for offset `k` in `-radius..=radius`.
    #[inline(always)]
    pub fn tap(&self, k: isize) -> f32 {
        self.coeffs[(k + self.radius as isize) as usize]
    }
}

/// Gaussian with sigma 2.2, separating detail from the local mean.
pub const INITIAL_LPF: FilterKernel = FilterKernel {
    radius: 7,
    coeffs: &[
        1.14907966e-03,
        4.40146100e-03,
        1.37123950e-02,
        3.47455753e-02,
        7.16069925e-02,
        1.20027593e-01,
        1.63635110e-01,
        1.81443588e-01,
        1.63635110e-01,
        1.20027593e-01,
        7.16069925e-02,
        3.47455753e-02,
        1.37123950e-02,
        4.40146100e-03,
        1.14907966e-03,
    ],
};

/// Gaussian with sigma 1.25, spreading detail energy to its neighborhood.
pub const SPREAD: FilterKernel = FilterKernel {
    radius: 4,
    coeffs: &[
        1.90769133e-03,
        1.79195767e-02,
        8.87562444e-02,
        2.31804370e-01,
        3.19224234e-01,
        2.31804370e-01,
        8.87562444e-02,
        1.79195767e-02,
        1.90769133e-03,
    ],
};
