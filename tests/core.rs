use approx::assert_relative_eq;
use minicnn::backend::WorkerPool;
use minicnn::error::Error;
use minicnn::loss::{CrossEntropy, LossFunction, Mse, accuracy, moving_average};
use minicnn::ops::dispatch::{dispatch, partitions};
use minicnn::optim::{Optimizer, Sgd, SgdMomentum};
use minicnn::tensor;
use minicnn::tensors::{Tensor, TensorArena};
use std::sync::Mutex;

const EPS: f32 = 1e-3;

fn finite_difference(loss: &dyn LossFunction, label: &Tensor, output: &Tensor, i: usize) -> f32 {
    let mut plus = output.clone();
    plus.data_mut()[i] += EPS;
    let mut minus = output.clone();
    minus.data_mut()[i] -= EPS;
    (loss.loss(label, &plus) - loss.loss(label, &minus)) / (2.0 * EPS)
}

fn check_gradient(loss: &dyn LossFunction, label: &Tensor, output: &Tensor) {
    let mut grad = Tensor::new(label.shape());
    loss.gradient(label, output, &mut grad);
    for i in 0..output.data().len() {
        let numeric = finite_difference(loss, label, output, i);
        assert_relative_eq!(grad.data()[i], numeric, epsilon = 1e-2, max_relative = 1e-2);
    }
}

#[test]
fn test_cross_entropy_gradient_matches_finite_difference() {
    let label = tensor!([[0.0, 1.0, 0.0]]);
    let output = tensor!([[0.2, 0.5, 0.3]]);
    check_gradient(&CrossEntropy, &label, &output);
}

#[test]
fn test_mse_gradient_matches_finite_difference() {
    let label = tensor!([[0.0, 1.0, 0.5, -0.25]]);
    let output = tensor!([[0.3, 0.6, 0.5, 0.1]]);
    check_gradient(&Mse, &label, &output);
}

#[test]
fn test_loss_scales_with_sample_size() {
    // two identical rows: average over 4 elements, scaled by 2 per-sample
    let label = tensor!([[1.0, 0.0], [1.0, 0.0]]);
    let output = tensor!([[0.5, 0.5], [0.5, 0.5]]);
    assert_relative_eq!(CrossEntropy.loss(&label, &output), 2f32.ln(), epsilon = 1e-6);
    assert_relative_eq!(Mse.loss(&label, &output), 0.5, epsilon = 1e-6);
}

#[test]
fn test_moving_average_order_of_operations() {
    // avg - avg/n + v/n, with n starting at 1
    let avg = moving_average(0.0, 1, 3.0);
    assert_eq!(avg, 3.0);
    let avg = moving_average(avg, 2, 5.0);
    assert_eq!(avg, 3.0 - 3.0 / 2.0 + 5.0 / 2.0);
}

#[test]
fn test_accuracy() {
    let prediction = tensor!([[0.1, 0.7, 0.2], [0.6, 0.3, 0.1]]);
    let label = tensor!([[0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
    assert_relative_eq!(accuracy(&prediction, &label), 0.5);
}

fn one_param(value: Tensor, grad: Tensor) -> (TensorArena, [minicnn::tensors::TensorId; 2]) {
    let mut arena = TensorArena::new();
    let p = arena.alloc(value);
    let g = arena.alloc(grad);
    (arena, [p, g])
}

#[test]
fn test_sgd_zero_learning_rate_is_identity() {
    let (mut arena, [p, g]) = one_param(tensor!([[0.3, -1.2, 4.0]]), tensor!([[5.0, 5.0, -5.0]]));
    let before = arena.get(p).clone();

    let mut sgd = Sgd::new(0.0);
    sgd.update(&mut arena, &[p], &[g]);
    assert_eq!(arena.get(p), &before);

    let mut momentum = SgdMomentum::new(0.0, 0.9);
    momentum.update(&mut arena, &[p], &[g]);
    assert_eq!(arena.get(p), &before);
}

#[test]
fn test_zero_momentum_reduces_to_sgd() {
    let (mut a, [pa, ga]) = one_param(tensor!([[1.0, 2.0]]), tensor!([[0.5, -0.5]]));
    let (mut b, [pb, gb]) = one_param(tensor!([[1.0, 2.0]]), tensor!([[0.5, -0.5]]));

    let mut sgd = Sgd::new(0.2);
    let mut momentum = SgdMomentum::new(0.2, 0.0);
    for _ in 0..3 {
        sgd.update(&mut a, &[pa], &[ga]);
        momentum.update(&mut b, &[pb], &[gb]);
    }
    for (x, y) in a.get(pa).data().iter().zip(b.get(pb).data()) {
        assert_relative_eq!(x, y, epsilon = 1e-6);
    }
}

#[test]
fn test_learning_rate_is_adjustable() {
    let mut opt = SgdMomentum::new(0.1, 0.5);
    assert_relative_eq!(opt.learning_rate(), 0.1);
    opt.set_learning_rate(0.05);
    assert_relative_eq!(opt.learning_rate(), 0.05);
}

#[test]
fn test_dispatch_partitions_match_pool_size() {
    for workers in [2, 3, 5] {
        let pool = WorkerPool::new(workers).unwrap();
        let seen = Mutex::new(Vec::new());
        dispatch(&pool, 17, |s, e| seen.lock().unwrap().push(s..e)).unwrap();

        let mut seen = seen.into_inner().unwrap();
        seen.sort_by_key(|r| r.start);
        assert_eq!(seen, partitions(17, workers));
    }
}

#[test]
fn test_pool_resize_and_shutdown() {
    let pool = WorkerPool::new(2).unwrap();
    assert_eq!(pool.size(), 2);
    assert_eq!(pool.resize(4).unwrap(), 4);

    let seen = Mutex::new(0);
    dispatch(&pool, 8, |_, _| *seen.lock().unwrap() += 1).unwrap();
    assert_eq!(seen.into_inner().unwrap(), 4);

    pool.shutdown();
    assert!(pool.is_stopped());
    assert!(matches!(dispatch(&pool, 8, |_, _| {}), Err(Error::PoolStopped)));

    // a stopped pool can be restarted
    assert_eq!(pool.resize(1).unwrap(), 1);
    assert!(dispatch(&pool, 8, |_, _| {}).is_ok());
}
