//! Dense Levenberg-Marquardt least-squares fitting.
//!
//! A small trust-region solver for the six-parameter IDT fit: residual
//! vectors a few hundred entries long, single-digit parameter counts. The
//! Jacobian comes from forward finite differences; the damped linear
//! subproblem is solved with Householder QR on the augmented system
//! `[J; sqrt(lambda) I] dx = [-r; 0]`.
//!
//! Deterministic: fixed iteration order, no randomness, no time dependence.

/// Convergence controls for [`solve`].
#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    /// Relative step-size tolerance on the parameter vector.
    pub parameter_tolerance: f64,
    /// Relative tolerance on the cost decrease.
    pub function_tolerance: f64,
    /// Iteration cap.
    pub max_iterations: usize,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            parameter_tolerance: 1e-17,
            function_tolerance: 1e-17,
            max_iterations: 300,
        }
    }
}

/// Result of an [`solve`] run.
#[derive(Debug, Clone)]
pub struct LmOutcome {
    /// Final parameter vector.
    pub params: Vec<f64>,
    /// Number of accepted (cost-decreasing) steps.
    pub successful_steps: usize,
    /// Number of iterations performed.
    pub iterations: usize,
    /// Final cost, `0.5 * ||r||^2`.
    pub cost: f64,
}

/// Minimizes `0.5 * ||r(x)||^2` starting from `initial`.
///
/// `residual_fn` fills `out` (of length `residual_count`) with the residual
/// vector for the given parameters.
pub fn solve<F>(
    residual_fn: F,
    residual_count: usize,
    initial: &[f64],
    options: &LmOptions,
) -> LmOutcome
where
    F: Fn(&[f64], &mut [f64]),
{
    let n = initial.len();
    let mut params = initial.to_vec();

    let mut residuals = vec![0.0; residual_count];
    residual_fn(&params, &mut residuals);
    let mut cost = 0.5 * norm_squared(&residuals);

    let mut lambda: f64 = 1e-3;
    let mut successful_steps = 0;
    let mut iterations = 0;

    let mut jacobian = vec![vec![0.0; n]; residual_count];
    let mut perturbed = vec![0.0; residual_count];

    for _ in 0..options.max_iterations {
        iterations += 1;

        // Forward-difference Jacobian.
        for j in 0..n {
            let h = 1e-8 * params[j].abs().max(1.0);
            let mut probe = params.clone();
            probe[j] += h;
            residual_fn(&probe, &mut perturbed);
            for i in 0..residual_count {
                jacobian[i][j] = (perturbed[i] - residuals[i]) / h;
            }
        }

        // Augmented system [J; sqrt(lambda) I] dx = [-r; 0].
        let rows = residual_count + n;
        let mut a = vec![vec![0.0; n]; rows];
        let mut b = vec![0.0; rows];
        for i in 0..residual_count {
            a[i].copy_from_slice(&jacobian[i]);
            b[i] = -residuals[i];
        }
        let damping = lambda.sqrt();
        for j in 0..n {
            a[residual_count + j][j] = damping;
        }

        let Some(step) = qr_least_squares(&mut a, &mut b, n) else {
            lambda *= 10.0;
            if lambda > 1e16 {
                break;
            }
            continue;
        };

        let candidate: Vec<f64> =
            params.iter().zip(step.iter()).map(|(p, s)| p + s).collect();
        residual_fn(&candidate, &mut perturbed);
        let candidate_cost = 0.5 * norm_squared(&perturbed);

        if candidate_cost <= cost {
            let cost_drop = cost - candidate_cost;
            let step_norm = norm_squared(&step).sqrt();
            let param_norm = norm_squared(&params).sqrt();

            params = candidate;
            residuals.copy_from_slice(&perturbed);
            successful_steps += 1;
            lambda = (lambda * 0.1).max(1e-14);

            let converged = cost_drop
                <= options.function_tolerance * cost.max(f64::MIN_POSITIVE)
                || step_norm
                    <= options.parameter_tolerance
                        * (param_norm + options.parameter_tolerance);
            cost = candidate_cost;
            if converged {
                break;
            }
        } else {
            lambda *= 10.0;
            if lambda > 1e16 {
                break;
            }
        }
    }

    LmOutcome { params, successful_steps, iterations, cost }
}

#[inline]
fn norm_squared(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}

/// Solves the dense least-squares problem `A x = b` (rows >= cols) by
/// Householder QR with back substitution. Returns `None` when A is
/// rank-deficient.
fn qr_least_squares(
    a: &mut [Vec<f64>],
    b: &mut [f64],
    cols: usize,
) -> Option<Vec<f64>> {
    let rows = a.len();

    for k in 0..cols {
        // Householder reflector for column k.
        let mut norm = 0.0;
        for row in a.iter().take(rows).skip(k) {
            norm += row[k] * row[k];
        }
        let norm = norm.sqrt();
        if norm < 1e-300 {
            return None;
        }

        let alpha = if a[k][k] > 0.0 { -norm } else { norm };
        let mut v = vec![0.0; rows - k];
        v[0] = a[k][k] - alpha;
        for i in k + 1..rows {
            v[i - k] = a[i][k];
        }
        let v_norm_sq = norm_squared(&v);
        if v_norm_sq < 1e-300 {
            // Column already triangular.
            continue;
        }

        // Apply the reflector to the remaining columns and to b.
        for j in k..cols {
            let mut dot = 0.0;
            for i in k..rows {
                dot += v[i - k] * a[i][j];
            }
            let scale = 2.0 * dot / v_norm_sq;
            for i in k..rows {
                a[i][j] -= scale * v[i - k];
            }
        }
        let mut dot = 0.0;
        for i in k..rows {
            dot += v[i - k] * b[i];
        }
        let scale = 2.0 * dot / v_norm_sq;
        for i in k..rows {
            b[i] -= scale * v[i - k];
        }
    }

    // Back substitution on the triangular factor.
    let mut x = vec![0.0; cols];
    for k in (0..cols).rev() {
        let mut sum = b[k];
        for j in k + 1..cols {
            sum -= a[k][j] * x[j];
        }
        if a[k][k].abs() < 1e-300 {
            return None;
        }
        x[k] = sum / a[k][k];
    }
    Some(x)
}
