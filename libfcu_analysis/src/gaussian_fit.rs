use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use super::error::FitError;
use super::spectrum::Spectrum;

const DEFAULT_MAX_ITERATIONS: usize = 200;
const DEFAULT_TOLERANCE: f64 = 1.0e-10;
const INITIAL_DAMPING: f64 = 1.0e-3;
const MAX_DAMPING: f64 = 1.0e16;
const N_PARAMETERS: usize = 3;

/// Starting values of a gaussian fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitialGuess {
    pub amplitude: f64,
    pub mean: f64,
    pub sigma: f64,
}

/// Result of fitting A * exp(-0.5 * ((x - mean) / sigma)^2) to a spectrum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianFit {
    pub amplitude: f64,
    pub mean: f64,
    pub sigma: f64,
    pub amplitude_error: f64,
    pub mean_error: f64,
    pub sigma_error: f64,
    /// Entries of the whole spectrum, not only of the fit window
    pub entries: u64,
    /// Residual sum of squares in the fit window
    pub residual: f64,
    pub iterations: usize,
}

/// Anything able to fit a gaussian to a window of a spectrum.
pub trait GaussianFitter: Sync {
    fn fit(
        &self,
        spectrum: &Spectrum,
        window: (f64, f64),
        guess: Option<InitialGuess>,
    ) -> Result<GaussianFit, FitError>;
}

pub fn gaussian(x: f64, amplitude: f64, mean: f64, sigma: f64) -> f64 {
    let z = (x - mean) / sigma;
    amplitude * (-0.5 * z * z).exp()
}

/// Unweighted least-squares gaussian fit using the Levenberg-Marquardt algorithm.
///
/// Bin centers are the abscissa and bin contents the ordinate. Parameter errors come
/// from the covariance s^2 (J^T J)^-1, with s^2 the residual variance.
#[derive(Debug, Clone, Copy)]
pub struct LevenbergMarquardt {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// The bin centers and contents inside the window
fn window_points(spectrum: &Spectrum, window: (f64, f64)) -> (Vec<f64>, Vec<f64>) {
    let binning = spectrum.binning();
    let (lo, hi) = window;
    spectrum
        .counts()
        .iter()
        .enumerate()
        .map(|(idx, count)| (binning.bin_center(idx), *count))
        .filter(|(x, _)| *x >= lo && *x <= hi)
        .unzip()
}

/// Guess from the moments of the data in the window
fn moment_guess(x: &[f64], y: &[f64], min_sigma: f64) -> InitialGuess {
    let total: f64 = y.iter().sum();
    let amplitude = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = x.iter().zip(y).map(|(xi, yi)| xi * yi).sum::<f64>() / total;
    let variance = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| yi * (xi - mean).powi(2))
        .sum::<f64>()
        / total;
    InitialGuess {
        amplitude,
        mean,
        sigma: variance.sqrt().max(min_sigma),
    }
}

fn residual_sum(x: &[f64], y: &[f64], p: &Vector3<f64>) -> f64 {
    x.iter()
        .zip(y)
        .map(|(xi, yi)| (yi - gaussian(*xi, p[0], p[1], p[2])).powi(2))
        .sum()
}

fn jacobian(x: &[f64], p: &Vector3<f64>) -> DMatrix<f64> {
    let (amplitude, mean, sigma) = (p[0], p[1], p[2]);
    let mut jac = DMatrix::zeros(x.len(), N_PARAMETERS);
    for (row, xi) in x.iter().enumerate() {
        let dx = xi - mean;
        let e = gaussian(*xi, 1.0, mean, sigma);
        jac[(row, 0)] = e;
        jac[(row, 1)] = amplitude * e * dx / (sigma * sigma);
        jac[(row, 2)] = amplitude * e * dx * dx / (sigma * sigma * sigma);
    }
    jac
}

/// A fitted peak must be positive, centered in the window and no wider than it
fn check_in_window(params: &Vector3<f64>, window: (f64, f64)) -> Result<(), FitError> {
    let (lo, hi) = window;
    let (amplitude, mean, sigma) = (params[0], params[1], params[2].abs());
    if amplitude > 0.0 && mean >= lo && mean <= hi && sigma <= hi - lo {
        Ok(())
    } else {
        Err(FitError::Diverged {
            amplitude,
            mean,
            sigma,
        })
    }
}

fn normal_matrix(jac: &DMatrix<f64>) -> Matrix3<f64> {
    let jtj = jac.transpose() * jac;
    Matrix3::from_fn(|r, c| jtj[(r, c)])
}

impl GaussianFitter for LevenbergMarquardt {
    fn fit(
        &self,
        spectrum: &Spectrum,
        window: (f64, f64),
        guess: Option<InitialGuess>,
    ) -> Result<GaussianFit, FitError> {
        let (x, y) = window_points(spectrum, window);
        let nonzero_bins = y.iter().filter(|c| **c != 0.0).count();
        if nonzero_bins < N_PARAMETERS {
            return Err(FitError::Underdetermined { nonzero_bins });
        }

        let min_sigma = 0.5 * spectrum.binning().bin_width();
        let guess = guess.unwrap_or_else(|| moment_guess(&x, &y, min_sigma));
        let mut params = Vector3::new(guess.amplitude, guess.mean, guess.sigma);
        let y_vec = DVector::from_column_slice(&y);
        let mut rss = residual_sum(&x, &y, &params);
        let mut damping = INITIAL_DAMPING;
        let mut converged = false;
        let mut iterations = 0;

        while iterations < self.max_iterations {
            iterations += 1;
            let jac = jacobian(&x, &params);
            let model = DVector::from_iterator(
                x.len(),
                x.iter()
                    .map(|xi| gaussian(*xi, params[0], params[1], params[2])),
            );
            let jtr_full = jac.transpose() * (&y_vec - model);
            let jtr = Vector3::new(jtr_full[0], jtr_full[1], jtr_full[2]);
            let jtj = normal_matrix(&jac);

            let mut damped = jtj;
            for i in 0..N_PARAMETERS {
                damped[(i, i)] += damping * jtj[(i, i)].max(f64::MIN_POSITIVE);
            }
            let step = match damped.cholesky() {
                Some(chol) => chol.solve(&jtr),
                None => {
                    damping *= 10.0;
                    if damping > MAX_DAMPING {
                        break;
                    }
                    continue;
                }
            };

            let trial = params + step;
            let trial_rss = residual_sum(&x, &y, &trial);
            if trial_rss.is_finite() && trial_rss <= rss {
                let small_step = step
                    .iter()
                    .zip(params.iter())
                    .all(|(s, p)| s.abs() <= self.tolerance * (p.abs() + self.tolerance));
                let small_gain = rss - trial_rss <= self.tolerance * rss;
                params = trial;
                rss = trial_rss;
                damping = (damping / 10.0).max(f64::MIN_POSITIVE);
                if small_step || small_gain {
                    converged = true;
                    break;
                }
            } else {
                damping *= 10.0;
                if damping > MAX_DAMPING {
                    // No downhill step left: we are sitting in the minimum
                    converged = true;
                    break;
                }
            }
        }

        if !converged || !params.iter().all(|p| p.is_finite()) || params[2] == 0.0 {
            return Err(FitError::NoConvergence { iterations });
        }
        check_in_window(&params, window)?;

        let dof = x.len().saturating_sub(N_PARAMETERS).max(1);
        let variance = rss / dof as f64;
        let covariance = normal_matrix(&jacobian(&x, &params))
            .try_inverse()
            .ok_or(FitError::SingularCovariance)?
            * variance;

        Ok(GaussianFit {
            amplitude: params[0],
            mean: params[1],
            // the model is even in sigma
            sigma: params[2].abs(),
            amplitude_error: covariance[(0, 0)].abs().sqrt(),
            mean_error: covariance[(1, 1)].abs().sqrt(),
            sigma_error: covariance[(2, 2)].abs().sqrt(),
            entries: spectrum.entries(),
            residual: rss,
            iterations,
        })
    }
}
