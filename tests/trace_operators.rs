//! Per-operator checks of the forward vector evaluator: trace one operation,
//! replay with two seed directions and compare against the closed-form
//! derivative scaled by each seed.

mod common;

use adtrace::{Active64, ForwardOptions, TapeStore};
use approx::assert_relative_eq;

const TOL: f64 = 1e-12;

/// Trace `f` over one independent at `a` into a fresh store as tape 1.
fn trace_unary(a: f64, f: impl FnOnce(Active64) -> Active64) -> TapeStore<f64> {
    let _lock = common::recording_lock();
    let store = TapeStore::new();
    let mut session = store.begin_trace(1).unwrap();
    let x = session.independent(a);
    session.dependent(f(x));
    session.end_trace().unwrap();
    store
}

fn trace_binary(a: f64, b: f64, f: impl FnOnce(Active64, Active64) -> Active64) -> TapeStore<f64> {
    let _lock = common::recording_lock();
    let store = TapeStore::new();
    let mut session = store.begin_trace(1).unwrap();
    let x = session.independent(a);
    let y = session.independent(b);
    session.dependent(f(x, y));
    session.end_trace().unwrap();
    store
}

/// One dependent, `p = 2`.
fn fov(store: &TapeStore<f64>, x: &[f64], xd: &[Vec<f64>]) -> (f64, [f64; 2]) {
    let mut y = [0.0];
    let mut yd = vec![vec![0.0; 2]];
    store
        .fov_forward(1, 1, x.len(), 2, x, xd, &mut y, &mut yd)
        .unwrap();
    (y[0], [yd[0][0], yd[0][1]])
}

fn identity2() -> Vec<Vec<f64>> {
    vec![vec![1.0, 0.0], vec![0.0, 1.0]]
}

/// Unary op at `a` with seeds `[1, s]` (or `[s0, s1]`).
fn check_unary(
    a: f64,
    seeds: [f64; 2],
    f: impl FnOnce(Active64) -> Active64,
    value: f64,
    derivative: f64,
) {
    let store = trace_unary(a, f);
    let (y, yd) = fov(&store, &[a], &[seeds.to_vec()]);
    assert_relative_eq!(y, value, max_relative = TOL);
    assert_relative_eq!(yd[0], derivative * seeds[0], max_relative = TOL);
    assert_relative_eq!(yd[1], derivative * seeds[1], max_relative = TOL);
}

fn check_binary(
    a: f64,
    b: f64,
    f: impl FnOnce(Active64, Active64) -> Active64,
    value: f64,
    da: f64,
    db: f64,
) {
    let store = trace_binary(a, b, f);
    let (y, yd) = fov(&store, &[a, b], &identity2());
    assert_relative_eq!(y, value, max_relative = TOL);
    assert_relative_eq!(yd[0], da, max_relative = TOL);
    assert_relative_eq!(yd[1], db, max_relative = TOL);
}

// ── Arithmetic ──

#[test]
fn exp() {
    let a: f64 = 2.0;
    check_unary(a, [1.0, 2.0], |x| x.exp(), a.exp(), a.exp());
}

#[test]
fn mult() {
    check_binary(2.0, 3.5, |a, b| a * b, 7.0, 3.5, 2.0);
}

#[test]
fn add() {
    check_binary(2.5, 3.0, |a, b| a + b, 5.5, 1.0, 1.0);
}

#[test]
fn sub() {
    check_binary(1.5, 3.2, |a, b| a - b, 1.5 - 3.2, 1.0, -1.0);
}

#[test]
fn div() {
    let (a, b) = (0.5, 4.5);
    check_binary(a, b, |x, y| x / y, a / b, 1.0 / b, -a / (b * b));
}

// ── Trig ──

#[test]
fn tan() {
    let a: f64 = 0.7;
    let t = a.tan();
    check_unary(a, [2.0, 3.0], |x| x.tan(), t, 1.0 + t * t);
}

#[test]
fn sin() {
    let a: f64 = 1.2;
    check_unary(a, [1.0, -1.0], |x| x.sin(), a.sin(), a.cos());
}

#[test]
fn cos() {
    let a: f64 = 1.2;
    check_unary(a, [1.0, 3.0], |x| x.cos(), a.cos(), -a.sin());
}

#[test]
fn asin() {
    let a: f64 = 0.9;
    let seeds = [1.0, 1.0 + 2.7 * 4.3];
    check_unary(a, seeds, |x| x.asin(), a.asin(), 1.0 / (1.0 - a * a).sqrt());
}

#[test]
fn acos() {
    let a: f64 = 0.8;
    let seeds = [1.0, 1.0 - 1.7 * 3.4];
    check_unary(a, seeds, |x| x.acos(), a.acos(), -1.0 / (1.0 - a * a).sqrt());
}

#[test]
fn atan() {
    let a: f64 = 9.8;
    let seeds = [1.0, 1.0 - 0.7 * 4.3];
    check_unary(a, seeds, |x| x.atan(), a.atan(), 1.0 / (1.0 + a * a));
}

#[test]
fn atan2() {
    let (a, b): (f64, f64) = (12.3, 2.1);
    let denom = a * a + b * b;
    check_binary(a, b, |x, y| x.atan2(y), a.atan2(b), b / denom, -a / denom);
}

// ── Exp / Log ──

#[test]
fn sqrt() {
    let a: f64 = 2.2;
    check_unary(a, [1.0, 2.0], |x| x.sqrt(), a.sqrt(), 1.0 / (2.0 * a.sqrt()));
}

#[test]
fn log() {
    let a: f64 = 4.9;
    check_unary(a, [1.0, 6.5], |x| x.ln(), a.ln(), 1.0 / a);
}

#[test]
fn log10() {
    let a: f64 = 12.3;
    let d = 1.0 / (a * std::f64::consts::LN_10);
    check_unary(a, [1.0, 1.0 + 9.9], |x| x.log10(), a.log10(), d);
}

// ── Hyperbolic ──

#[test]
fn sinh() {
    let a: f64 = 4.0;
    let seeds = [1.0, 1.0 - 2f64.sqrt()];
    check_unary(a, seeds, |x| x.sinh(), a.sinh(), a.cosh());
}

#[test]
fn cosh() {
    let a: f64 = 4.0;
    check_unary(a, [1.0, 4.2], |x| x.cosh(), a.cosh(), a.sinh());
}

#[test]
fn tanh() {
    let a: f64 = 4.0;
    let t = a.tanh();
    check_unary(a, [1.0, 1.0 - 1.3], |x| x.tanh(), t, 1.0 - t * t);
}

#[test]
fn asinh() {
    let a: f64 = 0.6;
    let d = 1.0 / (a * a + 1.0).sqrt();
    check_unary(a, [1.0, 1.0 - 6.2], |x| x.asinh(), a.asinh(), d);
}

#[test]
fn acosh() {
    let a: f64 = 1.7;
    let d = 1.0 / (a * a - 1.0).sqrt();
    check_unary(a, [1.0, 1.0 + 3.1], |x| x.acosh(), a.acosh(), d);
}

#[test]
fn atanh() {
    let a: f64 = 0.6;
    let d = 1.0 / (1.0 - a * a);
    check_unary(a, [1.0, 1.0 + 2.2], |x| x.atanh(), a.atanh(), d);
}

// ── Unary arithmetic ──

#[test]
fn inc() {
    check_unary(5.0, [1.0, 1.0 - 4.2], |x| x.inc(), 6.0, 1.0);
}

#[test]
fn dec() {
    check_unary(5.0, [1.0, 1.0 - 4.2], |x| x.dec(), 4.0, 1.0);
}

#[test]
fn plus() {
    check_unary(1.5, [1.0, 1.0 + 0.8], |x| x.pos(), 1.5, 1.0);
}

#[test]
fn minus() {
    check_unary(1.5, [1.0, 1.0 + 0.8], |x| -x, -1.5, -1.0);
}

// ── Powers ──

#[test]
fn pow_constant_exponent() {
    let (a, e): (f64, f64) = (2.3, 3.5);
    let d = e * a.powf(e - 1.0);
    check_unary(a, [1.0, 1.5], |x| x.powf(e), a.powf(e), d);
}

#[test]
fn pow_active_base_and_exponent() {
    let (a, b): (f64, f64) = (2.3, 3.5);
    check_binary(
        a,
        b,
        |x, y| x.pow(y),
        a.powf(b),
        b * a.powf(b - 1.0),
        a.ln() * a.powf(b),
    );
}

#[test]
fn pow_constant_base() {
    let (a, e): (f64, f64) = (2.3, 3.5);
    let d = a.ln() * a.powf(e);
    check_unary(e, [1.0, 1.5], |x| Active64::const_pow(a, x), a.powf(e), d);
}

#[test]
fn pow_literal_exponent_negative_base() {
    // The literal exponent has no derivative row, so the undefined log of the
    // negative base never reaches the result.
    let store = trace_unary(-3.0, |x| x.powf(2.0));
    let (y, yd) = fov(&store, &[-3.0], &[vec![1.0, 0.5]]);
    assert_relative_eq!(y, 9.0, max_relative = TOL);
    assert_relative_eq!(yd[0], -6.0, max_relative = TOL);
    assert_relative_eq!(yd[1], -3.0, max_relative = TOL);
}

#[test]
fn ldexp_via_power_of_two() {
    let (a, b): (f64, f64) = (4.0, 3.0);
    check_binary(
        a,
        b,
        |x, y| x * Active64::const_pow(2.0, y),
        32.0,
        8.0,
        a * 2f64.ln() * 8.0,
    );
}

#[test]
fn ldexp_integer_exponent() {
    check_unary(4.0, [1.0, 2.0], |x| x.ldexp(3), 32.0, 8.0);
}

#[test]
fn ldexp_active_exponent_constant_mantissa() {
    let a = 4.0;
    let d = a * 2f64.ln() * 8.0;
    check_unary(3.0, [1.0, 2.0], |e| Active64::const_pow(2.0, e) * a, 32.0, d);
}

#[test]
fn ldexp_across_the_exponent_range() {
    let big = 2f64.powi(1023);
    check_unary(0.5, [1.0, 0.5], |x| x.ldexp(1024), big, f64::INFINITY);
    check_unary(big, [1.0, 2.0], |x| x.ldexp(-1074), 2f64.powi(-51), 5e-324);
}

#[test]
fn frexp_of_smallest_subnormal() {
    let tiny = 5e-324;
    let mut exponent = 0;
    let store = trace_unary(tiny, |x| {
        let (m, e) = x.frexp();
        exponent = e;
        m
    });
    assert_eq!(exponent, -1073);
    let (y, yd) = fov(&store, &[tiny], &[vec![1.0, 2.0]]);
    assert_eq!(y, 0.5);
    assert_eq!(yd, [f64::INFINITY, f64::INFINITY]);
    let (y, _) = fov(&store, &[3.0 * tiny], &[vec![1.0, 0.0]]);
    assert_eq!(y, 1.5);
}

#[test]
fn powi_with_most_negative_exponent() {
    check_unary(1.0, [1.0, 2.0], |x| x.powi(i32::MIN), 1.0, i32::MIN as f64);
}

// ── Nonsmooth ──

#[test]
fn fabs() {
    let store = trace_unary(1.4, |x| x.abs());
    let xd = vec![vec![1.0, 1.0 - 1.5]];

    let (y, yd) = fov(&store, &[1.4], &xd);
    assert_relative_eq!(y, 1.4, max_relative = TOL);
    assert_relative_eq!(yd[0], 1.0, max_relative = TOL);
    assert_relative_eq!(yd[1], -0.5, max_relative = TOL);

    // Away from the recording point the default policy keeps the recorded
    // branch; `Replay` follows the new operand sign.
    let (y, yd) = fov(&store, &[-5.0], &xd);
    assert_relative_eq!(y, 5.0, max_relative = TOL);
    assert_relative_eq!(yd[0], 1.0, max_relative = TOL);

    let replay = ForwardOptions::default().with_branch_policy(adtrace::BranchPolicy::Replay);
    let mut y = [0.0];
    let mut yd = vec![vec![0.0; 2]];
    store
        .fov_forward_with(&replay, 1, 1, 1, 2, &[-5.0], &xd, &mut y, &mut yd)
        .unwrap();
    assert_relative_eq!(y[0], 5.0, max_relative = TOL);
    assert_relative_eq!(yd[0][0], -1.0, max_relative = TOL);
    assert_relative_eq!(yd[0][1], 0.5, max_relative = TOL);

    // At the kink every direction picks its own one-sided derivative.
    let (y, yd) = fov(&store, &[0.0], &[vec![2.5, -3.5]]);
    assert_eq!(y, 0.0);
    assert_relative_eq!(yd[0], 2.5, max_relative = TOL);
    assert_relative_eq!(yd[1], 3.5, max_relative = TOL);
}

#[test]
fn values_match_recording_at_recording_point() {
    // Replay at the recording point reproduces the recorded dependent exactly.
    let a = 0.37;
    let mut session_value = 0.0;
    let store = trace_unary(a, |x| {
        let y = (x.sin() * x.exp() + x.powi(3)).atanh().abs();
        session_value = y.value();
        y
    });
    let (y, _) = fov(&store, &[a], &[vec![1.0, 0.0]]);
    assert_eq!(y, session_value);
}
