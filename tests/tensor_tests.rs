use minicnn::tensor;
use minicnn::tensors::{Shape, Tensor, TensorArena};

#[test]
fn test_tensor_creation() {
    let t = Tensor::new(Shape::new(2, 3, 2, 2));
    assert_eq!(t.shape().total_size(), 24);
    assert_eq!(t.data().len(), 24);
    assert!(t.data().iter().all(|&v| v == 0.0));
}

#[test]
fn test_tensor_macro() {
    let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
    assert_eq!(t.shape(), Shape::new(2, 2, 1, 1));
    assert_eq!(t.data(), &[1.0, 2.0, 3.0, 4.0]);
    assert_eq!(t.row(1), &[3.0, 4.0]);
}

#[test]
fn test_tensor_shape_mismatch_panics() {
    let result = std::panic::catch_unwind(|| {
        Tensor::from_data(Shape::new(2, 2, 1, 1), vec![1.0, 2.0, 3.0]);
    });
    assert!(result.is_err());
}

#[test]
fn test_shape_sizes() {
    for (b, c, w, h) in [(1, 1, 1, 1), (3, 2, 4, 5), (7, 10, 1, 1), (0, 3, 3, 3)] {
        let s = Shape::new(b, c, w, h);
        assert_eq!(s.total_size(), b * c * w * h);
        assert_eq!(s.one_batch_size(), c * w * h);
        assert_eq!(s.one_channel_size(), w * h);
    }
}

#[test]
fn test_shape_index_is_channel_major() {
    let s = Shape::new(2, 3, 4, 5);
    let mut seen = vec![false; s.total_size()];
    for b in 0..2 {
        for c in 0..3 {
            for r in 0..5 {
                for col in 0..4 {
                    let idx = s.index(b, c, r, col);
                    assert_eq!(idx, b * 60 + c * 20 + r * 4 + col);
                    assert_eq!(idx - b * 60, s.index_in_batch(c, r, col));
                    seen[idx] = true;
                }
            }
        }
    }
    assert!(seen.into_iter().all(|v| v));
}

#[test]
fn test_copy_to_matches_source() {
    let src = tensor!([[1.0, -2.0, 3.5]]);
    let mut dst = Tensor::new(Shape::new(3, 1, 1, 1));
    dst.fill(9.0);

    src.copy_to(&mut dst);
    assert_eq!(dst.shape(), src.shape());
    assert_eq!(dst.data(), src.data());
}

#[test]
fn test_copy_to_undersized_target_panics() {
    let src = tensor!([[1.0, 2.0, 3.0]]);
    let result = std::panic::catch_unwind(move || {
        let mut dst = Tensor::new(Shape::new(1, 2, 1, 1));
        src.copy_to(&mut dst);
    });
    assert!(result.is_err());
}

#[test]
fn test_fill() {
    let mut t = Tensor::new(Shape::new(2, 2, 2, 1));
    t.fill(0.25);
    assert!(t.data().iter().all(|&v| v == 0.25));
}

#[test]
fn test_arena_handles_survive_replace() {
    let mut arena = TensorArena::new();
    let a = arena.alloc(tensor!([[1.0]]));
    let b = arena.alloc(tensor!([[2.0, 3.0]]));

    arena.replace(a, Tensor::new(Shape::new(4, 1, 1, 1)));
    assert_eq!(arena.get(a).shape().batch, 4);
    assert_eq!(arena.get(b).data(), &[2.0, 3.0]);
    assert_eq!(arena.len(), 2);
}

#[test]
fn test_arena_with_taken_reads_neighbours() {
    let mut arena = TensorArena::new();
    let src = arena.alloc(tensor!([[1.0, 2.0]]));
    let dst = arena.alloc(Tensor::new(Shape::new(1, 2, 1, 1)));

    arena.with_taken(dst, |arena, dst| {
        for (d, s) in dst.data_mut().iter_mut().zip(arena.get(src).data()) {
            *d = s * 10.0;
        }
    });
    assert_eq!(arena.get(dst).data(), &[10.0, 20.0]);
}
