//! Shared utilities for SLRA integration tests
//!
//! Deterministic data generators for low-rank structured problems and a
//! small dense Levenberg-Marquardt driver standing in for the external
//! optimizer.

#![allow(dead_code)]

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slra::{Layer, LayerKind, LeastSquaresObjective, StructureModel};

/// Seeded generator so every run sees the same data
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Standard normal sample via the Box-Muller transform
pub fn normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Add i.i.d. Gaussian noise with standard deviation `sigma`
pub fn add_noise(p: &[f64], sigma: f64, rng: &mut StdRng) -> Vec<f64> {
    p.iter().map(|v| v + sigma * normal(rng)).collect()
}

/// `p_t = 0.9^t + cos(0.5 t)`: a Hankel matrix of this sequence has rank 3
pub fn rank_three_sequence(len: usize) -> Vec<f64> {
    (0..len)
        .map(|t| 0.9f64.powi(t as i32) + (0.5 * t as f64).cos())
        .collect()
}

/// Mosaic Hankel data of a single-input, two-output first-order system
///
/// Every replica runs `w_i(t+1) = a_i w_i(t) + b_i u(t)` for `i = 1, 2` with
/// its own input and initial states. The layers are `[Hankel(2) of u,
/// block Hankel(4, nb = 2) of (w_1, w_2)]`, giving the columns
/// `u(t), u(t+1), w_1(t), w_2(t), w_1(t+1), w_2(t+1)`. The two relations
/// involve different outputs, so `S(p)` has rank 4 and Gamma stays
/// positive definite at the exact `X`.
pub struct TwoOutputMosaic {
    pub structure: StructureModel,
    pub parameters: Vec<f64>,
    /// Exact `X` (4 x 2, row-major)
    pub x: Vec<f64>,
}

pub fn two_output_mosaic(replicas: usize, rows_per_replica: usize, seed: u64) -> TwoOutputMosaic {
    let (a1, b1) = (0.7, 0.5);
    let (a2, b2) = (-0.4, 0.9);
    let structure = StructureModel::new(
        vec![Layer::hankel(2), Layer::new(LayerKind::Hankel, 4, 2)],
        replicas,
        rows_per_replica,
    )
    .expect("valid mosaic structure");
    let steps = rows_per_replica + 1;
    let mut rng = seeded_rng(seed);

    let mut u = vec![vec![0.0; steps]; replicas];
    let mut w1 = vec![vec![0.0; steps]; replicas];
    let mut w2 = vec![vec![0.0; steps]; replicas];
    for r in 0..replicas {
        w1[r][0] = normal(&mut rng);
        w2[r][0] = normal(&mut rng);
        for t in 0..steps {
            u[r][t] = normal(&mut rng);
        }
        for t in 0..steps - 1 {
            w1[r][t + 1] = a1 * w1[r][t] + b1 * u[r][t];
            w2[r][t + 1] = a2 * w2[r][t] + b2 * u[r][t];
        }
    }

    // layer parameters are stored time-major, then replica, then block entry
    let offset = steps * replicas;
    let mut parameters = vec![0.0; 3 * offset];
    for t in 0..steps {
        for r in 0..replicas {
            let slot = t * replicas + r;
            parameters[slot] = u[r][t];
            parameters[offset + 2 * slot] = w1[r][t];
            parameters[offset + 2 * slot + 1] = w2[r][t];
        }
    }
    assert_eq!(parameters.len(), structure.parameter_count());

    // rows of X: u(t), u(t+1), w_1(t), w_2(t)
    let x = vec![b1, b2, 0.0, 0.0, a1, 0.0, 0.0, a2];

    TwoOutputMosaic {
        structure,
        parameters,
        x,
    }
}

/// Central finite-difference gradient of the cost
pub fn numeric_gradient<O: LeastSquaresObjective>(objective: &mut O, x: &[f64], h: f64) -> Vec<f64> {
    (0..x.len())
        .map(|k| {
            let mut xp = x.to_vec();
            let mut xm = x.to_vec();
            xp[k] += h;
            xm[k] -= h;
            let cp = objective.cost(&xp).expect("cost at x + h");
            let cm = objective.cost(&xm).expect("cost at x - h");
            (cp - cm) / (2.0 * h)
        })
        .collect()
}

/// Outcome of [`levenberg_marquardt`]
#[derive(Debug, Clone)]
pub struct LmReport {
    pub x: Vec<f64>,
    pub cost: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Dense Levenberg-Marquardt on `(JᵀJ + λ diag(JᵀJ)) δ = -Jᵀf`
///
/// A recoverable evaluation error (Gamma not positive definite) at a trial
/// point counts as a rejected step.
pub fn levenberg_marquardt<O: LeastSquaresObjective>(
    objective: &mut O,
    x0: &[f64],
    max_iterations: usize,
) -> LmReport {
    let (rows, cols) = (objective.residual_count(), objective.parameter_count());
    let mut x = x0.to_vec();
    let mut f = vec![0.0; rows];
    let mut jac = DMatrix::zeros(rows, cols);
    objective
        .residual_and_jacobian(&x, &mut f, &mut jac)
        .expect("evaluation at the starting point");
    let mut cost: f64 = f.iter().map(|v| v * v).sum();
    let mut lambda = 1e-3;
    let mut converged = false;
    let mut iterations = 0;

    while iterations < max_iterations {
        iterations += 1;
        if cost < 1e-28 {
            converged = true;
            break;
        }
        let fv = DVector::from_column_slice(&f);
        let gradient = jac.tr_mul(&fv);
        if gradient.amax() < 1e-15 * (1.0 + cost) {
            converged = true;
            break;
        }
        let jtj = jac.tr_mul(&jac);

        let mut accepted = false;
        while lambda < 1e16 {
            let mut system = jtj.clone();
            for i in 0..cols {
                system[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
            }
            let Some(chol) = system.cholesky() else {
                lambda *= 10.0;
                continue;
            };
            let step = -chol.solve(&gradient);
            let trial: Vec<f64> = x.iter().zip(step.iter()).map(|(a, b)| a + b).collect();

            match objective.cost(&trial) {
                Ok(trial_cost) if trial_cost < cost => {
                    let decrease = cost - trial_cost;
                    let step_norm = step.norm();
                    let x_norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
                    x = trial;
                    cost = trial_cost;
                    lambda = (lambda / 10.0).max(1e-12);
                    objective
                        .residual_and_jacobian(&x, &mut f, &mut jac)
                        .expect("evaluation at an accepted point");
                    accepted = true;
                    if decrease <= 1e-15 * cost || step_norm <= 1e-12 * (1.0 + x_norm) {
                        converged = true;
                    }
                    break;
                }
                Ok(_) => lambda *= 10.0,
                Err(err) if err.is_recoverable() => lambda *= 10.0,
                Err(err) => panic!("unexpected evaluation error: {err}"),
            }
        }
        if converged {
            break;
        }
        if !accepted {
            // no descent possible at any damping: stationary to working precision
            converged = true;
            break;
        }
    }

    LmReport {
        x,
        cost,
        iterations,
        converged,
    }
}
