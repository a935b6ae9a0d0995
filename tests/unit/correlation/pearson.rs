//! Unit tests for Pearson correlation and date alignment

use alphagate::correlation::pearson::{align, pearson, round4};
use alphagate::models::ReturnPoint;

use crate::support::{date, wave};

#[test]
fn identical_samples_correlate_perfectly() {
    let xs = wave(50, 0.0);
    let r = pearson(&xs, &xs).expect("defined");
    assert!((r - 1.0).abs() < 1e-12, "got {}", r);
}

#[test]
fn negated_sample_correlates_at_minus_one() {
    let xs = wave(50, 0.3);
    let ys: Vec<f64> = xs.iter().map(|x| -2.0 * x).collect();
    let r = pearson(&xs, &ys).expect("defined");
    assert!((r + 1.0).abs() < 1e-12, "got {}", r);
}

#[test]
fn known_value() {
    let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
    let ys = [2.0, 4.0, 5.0, 4.0, 5.0];
    let r = pearson(&xs, &ys).expect("defined");
    assert!((r - 0.7745966692414834).abs() < 1e-12, "got {}", r);
}

#[test]
fn constant_sample_is_undefined() {
    let xs = wave(40, 0.0);
    let flat = vec![0.001; 40];
    assert_eq!(pearson(&xs, &flat), None);
    assert_eq!(pearson(&flat, &xs), None);
}

#[test]
fn too_few_or_mismatched_samples_are_undefined() {
    assert_eq!(pearson(&[], &[]), None);
    assert_eq!(pearson(&[1.0], &[2.0]), None);
    assert_eq!(pearson(&[1.0, 2.0, 3.0], &[1.0, 2.0]), None);
}

#[test]
fn align_keeps_only_common_dates() {
    let a = vec![
        ReturnPoint::new(date(2024, 1, 1), 1.0),
        ReturnPoint::new(date(2024, 1, 2), 2.0),
        ReturnPoint::new(date(2024, 1, 4), 4.0),
    ];
    let b = vec![
        ReturnPoint::new(date(2024, 1, 2), 20.0),
        ReturnPoint::new(date(2024, 1, 3), 30.0),
        ReturnPoint::new(date(2024, 1, 4), 40.0),
    ];

    let (xs, ys) = align(&a, &b);
    assert_eq!(xs, vec![2.0, 4.0]);
    assert_eq!(ys, vec![20.0, 40.0]);
}

#[test]
fn align_drops_non_finite_days() {
    let a = vec![
        ReturnPoint::new(date(2024, 1, 1), f64::NAN),
        ReturnPoint::new(date(2024, 1, 2), 2.0),
    ];
    let b = vec![
        ReturnPoint::new(date(2024, 1, 1), 1.0),
        ReturnPoint::new(date(2024, 1, 2), 3.0),
    ];

    let (xs, ys) = align(&a, &b);
    assert_eq!(xs, vec![2.0]);
    assert_eq!(ys, vec![3.0]);
}

#[test]
fn rounds_to_four_decimals() {
    assert_eq!(round4(0.556_149), 0.5561);
    assert_eq!(round4(-0.123_46), -0.1235);
    assert_eq!(round4(1.1 * 1.2), 1.32);
}
