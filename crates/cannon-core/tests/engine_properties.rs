//! Property tests: both engine schedules agree with the textbook product,
//! and rotation is a bijection on line positions.

use std::sync::Arc;

use cannon_compute::CpuBackend;
use cannon_core::{rotate, rotate_back, CannonEngine, Matrix, RollDirection, Schedule};
use proptest::prelude::*;

fn textbook_product(a: &Matrix, b: &Matrix) -> Matrix {
    Matrix::from_array(a.as_array().dot(b.as_array())).unwrap()
}

fn square_pair() -> impl Strategy<Value = (Matrix, Matrix)> {
    (1usize..=8).prop_flat_map(|n| {
        (
            prop::collection::vec(0i64..100, n * n),
            prop::collection::vec(0i64..100, n * n),
        )
            .prop_map(move |(a, b)| {
                (
                    Matrix::from_flat(&a, n).unwrap(),
                    Matrix::from_flat(&b, n).unwrap(),
                )
            })
    })
}

fn square_with_line() -> impl Strategy<Value = (Matrix, usize, usize)> {
    (1usize..=7).prop_flat_map(|n| {
        (
            prop::collection::vec(-50i64..50, n * n),
            0..n,
            0usize..30,
        )
            .prop_map(move |(values, line, amount)| {
                (Matrix::from_flat(&values, n).unwrap(), line, amount)
            })
    })
}

proptest! {
    #[test]
    fn cannon_schedule_matches_textbook_product((a, b) in square_pair()) {
        let engine = CannonEngine::new(Arc::new(CpuBackend::new()), Schedule::Cannon);
        prop_assert_eq!(engine.multiply(&a, &b).unwrap(), textbook_product(&a, &b));
    }

    #[test]
    fn literal_schedule_matches_textbook_product((a, b) in square_pair()) {
        let engine = CannonEngine::new(Arc::new(CpuBackend::new()), Schedule::Literal);
        prop_assert_eq!(engine.multiply(&a, &b).unwrap(), textbook_product(&a, &b));
    }

    #[test]
    fn rotate_then_rotate_back_restores((m, line, amount) in square_with_line()) {
        for direction in [RollDirection::RowLeft, RollDirection::ColumnUp] {
            let mut rotated = m.clone();
            rotate(&mut rotated, direction, line, amount).unwrap();
            rotate_back(&mut rotated, direction, line, amount).unwrap();
            prop_assert_eq!(&rotated, &m);
        }
    }

    #[test]
    fn rotate_by_complement_restores((m, line, amount) in square_with_line()) {
        let n = m.size();
        let mut rotated = m.clone();
        rotate(&mut rotated, RollDirection::RowLeft, line, amount).unwrap();
        rotate(&mut rotated, RollDirection::RowLeft, line, n - amount % n).unwrap();
        prop_assert_eq!(rotated, m);
    }

    #[test]
    fn full_cycle_is_identity((m, line, _amount) in square_with_line()) {
        let n = m.size();
        for direction in [RollDirection::RowLeft, RollDirection::ColumnUp] {
            let mut rotated = m.clone();
            rotate(&mut rotated, direction, line, n).unwrap();
            prop_assert_eq!(&rotated, &m);
        }
    }

    #[test]
    fn rotation_only_touches_its_line((m, line, amount) in square_with_line()) {
        let n = m.size();
        let mut rotated = m.clone();
        rotate(&mut rotated, RollDirection::RowLeft, line, amount).unwrap();
        for i in (0..n).filter(|&i| i != line) {
            for j in 0..n {
                prop_assert_eq!(rotated[(i, j)], m[(i, j)]);
            }
        }
    }
}

#[test]
fn default_size_random_run_agrees_between_schedules() {
    let values: Vec<i64> = (0..36).map(|v| (v * 37 + 11) % 100).collect();
    let a = Matrix::from_flat(&values, 6).unwrap();
    let b = Matrix::from_flat(&values.iter().rev().copied().collect::<Vec<_>>(), 6).unwrap();

    let parallel = CannonEngine::new(Arc::new(CpuBackend::with_threads(6).unwrap()), Schedule::Cannon);
    let serial = CannonEngine::new(Arc::new(CpuBackend::new()), Schedule::Literal);
    assert_eq!(
        parallel.multiply(&a, &b).unwrap(),
        serial.multiply(&a, &b).unwrap()
    );
}
