//! Structure, layout and configuration properties checked through the public API.

mod common;

use nalgebra::DMatrix;
use slra::{
    Layer, LayerKind, LeastSquaresObjective, ReshapedLayout, SlraConfig, SlraError,
    SlraEvaluator, SlraProblem, StructureModel, extended_basis,
};

fn mixed_structure(replicas: usize, rows: usize) -> StructureModel {
    StructureModel::new(
        vec![
            Layer::new(LayerKind::Toeplitz, 6, 2),
            Layer::new(LayerKind::Hankel, 3, 1).with_inv_weight(0.5),
            Layer::exact_zero(1),
            Layer::unstructured(2),
        ],
        replicas,
        rows,
    )
    .unwrap()
}

#[test]
fn test_fill_then_gather_is_identity() {
    let mut rng = common::seeded_rng(7);
    for replicas in [1, 2, 5] {
        let structure = mixed_structure(replicas, 6);
        let p: Vec<f64> = (0..structure.parameter_count())
            .map(|_| common::normal(&mut rng))
            .collect();
        let s = structure.fill_matrix(&p).unwrap();
        assert_eq!(s.shape(), (replicas * 6, 12));
        assert_eq!(structure.parameters_from_matrix(&s).unwrap(), p);
    }
}

#[test]
fn test_every_parameter_appears_in_matrix() {
    let structure = mixed_structure(2, 4);
    for i in 0..structure.parameter_count() {
        let mut p = vec![0.0; structure.parameter_count()];
        p[i] = 1.0;
        let s = structure.fill_matrix(&p).unwrap();
        assert!(s.iter().any(|v| *v == 1.0), "parameter {i} never placed");
    }
}

#[test]
fn test_exact_zero_block_stays_zero() {
    let structure = mixed_structure(3, 5);
    let p = vec![1.0; structure.parameter_count()];
    let s = structure.fill_matrix(&p).unwrap();
    // exact-zero layer is column 9
    assert!(s.column(9).iter().all(|v| *v == 0.0));
    assert!(s.column(8).iter().all(|v| *v == 1.0));
}

#[test]
fn test_zero_residual_gives_zero_correction() {
    let structure = mixed_structure(2, 5);
    let p: Vec<f64> = (0..structure.parameter_count())
        .map(|i| (i as f64).sqrt())
        .collect();
    let d = 3;
    let x = DMatrix::from_fn(12 - d, d, |i, j| 0.1 * (i + j) as f64);
    let y = DMatrix::zeros(structure.rows(), d);
    assert_eq!(structure.corrected_parameters(&p, &y, &x).unwrap(), p);
}

#[test]
fn test_correction_skips_exact_layers() {
    let structure = StructureModel::new(
        vec![Layer::hankel(2), Layer::unstructured(1).with_inv_weight(0.0)],
        1,
        4,
    )
    .unwrap();
    let x = DMatrix::from_row_slice(2, 1, &[0.3, -0.7]);
    let y = DMatrix::from_element(4, 1, 1.0);
    let dp = structure.correction_from_residual(&y, &x).unwrap();
    // Hankel parameters come first (5 of them), the exact column last
    assert!(dp[..5].iter().any(|v| *v != 0.0));
    assert!(dp[5..].iter().all(|v| *v == 0.0));
}

#[test]
fn test_weighted_correction_is_exact_and_minimal() {
    let structure = StructureModel::new(
        vec![
            Layer::new(LayerKind::Toeplitz, 6, 2).with_inv_weight(2.0),
            Layer::hankel(3).with_inv_weight(0.5),
            Layer::exact_zero(1),
            Layer::unstructured(2).with_inv_weight(3.0),
        ],
        3,
        5,
    )
    .unwrap()
    .with_replica_weights(vec![1.0, 2.0, 0.5])
    .unwrap();
    let mut rng = common::seeded_rng(31);
    let p: Vec<f64> = (0..structure.parameter_count())
        .map(|_| common::normal(&mut rng))
        .collect();
    let (n, d) = (9, 3);
    let x: Vec<f64> = (0..n * d).map(|_| 0.3 * common::normal(&mut rng)).collect();

    let mut eval: SlraEvaluator =
        SlraEvaluator::new(structure.clone(), &p, &SlraConfig::new(n)).unwrap();
    assert!(!eval.gamma().is_shared());
    let cost = eval.cost(&x).unwrap();
    let p_hat = eval.corrected_parameters(&x).unwrap();

    // the corrected mosaic is annihilated by the extended basis
    let xext = extended_basis(&DMatrix::from_row_slice(n, d, &x));
    let misfit = structure.fill_matrix(&p_hat).unwrap() * &xext;
    assert!(misfit.norm() < 1e-10, "residual {:.3e}", misfit.norm());

    // exact parameters stay put, the weighted correction norm is the cost
    let weights = structure.parameter_inv_weights();
    let mut dist = 0.0;
    for ((a, b), w) in p.iter().zip(&p_hat).zip(&weights) {
        if *w == 0.0 {
            assert_eq!(a, b);
        } else {
            dist += (a - b) * (a - b) / w;
        }
    }
    assert!((dist - cost).abs() < 1e-9 * cost, "distance {dist:.6e}, cost {cost:.6e}");
}

#[test]
fn test_reshape_round_trip() {
    for replicas in [1, 2, 5] {
        let layout = ReshapedLayout::new(replicas, 7);
        for width in [1, 3] {
            let data: Vec<f64> = (0..layout.rows() * width).map(|i| i as f64).collect();
            let forward = layout.reshape(&data, width, true).unwrap();
            assert_eq!(layout.reshape(&forward, width, false).unwrap(), data);
            if replicas == 1 {
                assert_eq!(forward, data);
            }
        }
    }
}

#[test]
fn test_reshape_groups_rows_by_replica() {
    let structure = StructureModel::new(vec![Layer::hankel(2)], 3, 4).unwrap();
    let layout = ReshapedLayout::new(3, 4);
    let p: Vec<f64> = (0..structure.parameter_count()).map(|i| i as f64).collect();
    let reshaped = layout
        .reshape_matrix(&structure.fill_matrix(&p).unwrap(), true)
        .unwrap();
    // rows of replica r use parameters congruent to r mod 3
    for r in 0..3 {
        for t in 0..4 {
            let v = reshaped[(r * 4 + t, 0)] as usize;
            assert_eq!(v % 3, r);
            assert_eq!(v / 3, t);
        }
    }
}

#[test]
fn test_degenerate_rank_is_rejected() {
    let structure = StructureModel::new(vec![Layer::hankel(4)], 1, 10).unwrap();
    let p = common::rank_three_sequence(13);
    let err = SlraProblem::new(structure, p, SlraConfig::new(4)).unwrap_err();
    assert!(matches!(err, SlraError::Configuration(_)));
    assert!(!err.is_recoverable());
}

#[test]
fn test_indivisible_layer_is_rejected() {
    let err = StructureModel::new(vec![Layer::new(LayerKind::Toeplitz, 5, 2)], 1, 4).unwrap_err();
    assert!(matches!(err, SlraError::Configuration(_)));
}
