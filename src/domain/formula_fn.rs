//! Vectorized built-in functions.
//!
//! Every function returns an array aligned 1:1 with the input series.
//! Rolling-window functions (MA, SUM, HHV, LLV, STD, COUNT) are missing
//! while fewer than N rows are available and whenever the trailing window
//! contains a missing row. EMA and SMA are recursive and have no missing
//! head; they carry the previous value across missing inputs.

use crate::domain::error::FormulaError;
use crate::domain::formula::Func;
use crate::domain::value::Value;

/// Dispatch a resolved function call. `len` is the bar count of the series
/// under evaluation; scalar arguments broadcast to it.
pub fn call(func: Func, args: Vec<Value>, len: usize) -> Result<Value, FormulaError> {
    match func {
        Func::Ma => {
            let (x, n) = array_and_window(func, args, len)?;
            Ok(Value::Num(rolling(&x, n, |w| {
                w.iter().sum::<f64>() / w.len() as f64
            })))
        }
        Func::Ema => {
            let (x, n) = array_and_window(func, args, len)?;
            Ok(Value::Num(ema(&x, n)))
        }
        Func::Sma => {
            // SMA(X, N, M); M defaults to 1.
            if args.len() != 2 && args.len() != 3 {
                return Err(arity(func, "2 or 3 arguments", args.len()));
            }
            let mut args = args.into_iter();
            let x = args.next().expect("arity checked").into_num(len);
            let n = args.next().expect("arity checked").as_window("SMA")?;
            let m = match args.next() {
                Some(v) => v.as_window("SMA")?,
                None => 1,
            };
            Ok(Value::Num(sma(&x, n, m)))
        }
        Func::Ref => {
            let (x, n) = array_and_window_allowing_zero(func, args, len)?;
            Ok(Value::Num(shift(&x, n)))
        }
        Func::Count => {
            let (x, n) = array_and_window(func, args, len)?;
            Ok(Value::Num(rolling(&x, n, |w| {
                w.iter().filter(|&&v| v != 0.0).count() as f64
            })))
        }
        Func::Sum => {
            let (x, n) = array_and_window(func, args, len)?;
            Ok(Value::Num(rolling(&x, n, |w| w.iter().sum())))
        }
        Func::Hhv => {
            let (x, n) = array_and_window(func, args, len)?;
            Ok(Value::Num(rolling(&x, n, |w| {
                w.iter().copied().fold(f64::MIN, f64::max)
            })))
        }
        Func::Llv => {
            let (x, n) = array_and_window(func, args, len)?;
            Ok(Value::Num(rolling(&x, n, |w| {
                w.iter().copied().fold(f64::MAX, f64::min)
            })))
        }
        Func::Std => {
            let (x, n) = array_and_window(func, args, len)?;
            Ok(Value::Num(rolling(&x, n, sample_std)))
        }
        Func::If => {
            let [cond, a, b] = take_args(func, args)?;
            let cond = cond.into_bool(len);
            let a = a.into_num(len);
            let b = b.into_num(len);
            Ok(Value::Num(
                cond.iter()
                    .zip(a.iter().zip(b.iter()))
                    .map(|(&c, (&x, &y))| if c { x } else { y })
                    .collect(),
            ))
        }
        Func::Abs => {
            let [x] = take_args(func, args)?;
            Ok(Value::Num(
                x.into_num(len).iter().map(|v| v.abs()).collect(),
            ))
        }
        Func::Max => variadic_fold(func, args, len, nan_max),
        Func::Min => variadic_fold(func, args, len, nan_min),
        Func::Sqrt => {
            let [x] = take_args(func, args)?;
            Ok(Value::Num(
                x.into_num(len).iter().map(|v| v.sqrt()).collect(),
            ))
        }
        Func::Pow => {
            let [base, exp] = take_args(func, args)?;
            let base = base.into_num(len);
            let exp = exp.into_num(len);
            Ok(Value::Num(
                base.iter().zip(exp.iter()).map(|(&b, &e)| b.powf(e)).collect(),
            ))
        }
        Func::Every => {
            let (x, n) = array_and_window(func, args, len)?;
            let counts = rolling(&x, n, |w| {
                w.iter().filter(|&&v| v != 0.0).count() as f64
            });
            Ok(Value::Bool(
                counts.iter().map(|&c| c >= n as f64).collect(),
            ))
        }
        Func::Exist => {
            let (x, n) = array_and_window(func, args, len)?;
            let counts = rolling(&x, n, |w| {
                w.iter().filter(|&&v| v != 0.0).count() as f64
            });
            Ok(Value::Bool(counts.iter().map(|&c| c > 0.0).collect()))
        }
        Func::BarsLast => {
            let [cond] = take_args(func, args)?;
            Ok(Value::Num(bars_last(&cond.into_bool(len))))
        }
        Func::Cross => {
            let [a, b] = take_args(func, args)?;
            Ok(Value::Bool(cross(&a.into_num(len), &b.into_num(len))))
        }
        Func::CrossDown => {
            let [a, b] = take_args(func, args)?;
            // Mirror of CROSS with the inequality reversed.
            Ok(Value::Bool(cross_down(&a.into_num(len), &b.into_num(len))))
        }
    }
}

fn arity(func: Func, expected: &str, got: usize) -> FormulaError {
    FormulaError::BadArgument {
        func: func.name(),
        reason: format!("expected {expected}, got {got}"),
    }
}

fn take_args<const N: usize>(func: Func, args: Vec<Value>) -> Result<[Value; N], FormulaError> {
    let got = args.len();
    args.try_into().map_err(|_| FormulaError::BadArgument {
        func: func.name(),
        reason: format!("expected {N} argument(s), got {got}"),
    })
}

fn array_and_window(
    func: Func,
    args: Vec<Value>,
    len: usize,
) -> Result<(Vec<f64>, usize), FormulaError> {
    let [x, n] = take_args(func, args)?;
    Ok((x.into_num(len), n.as_window(func.name())?))
}

/// Like [`array_and_window`] but permits N = 0 (REF(X, 0) is the identity).
fn array_and_window_allowing_zero(
    func: Func,
    args: Vec<Value>,
    len: usize,
) -> Result<(Vec<f64>, usize), FormulaError> {
    let [x, n] = take_args(func, args)?;
    let n = match n {
        Value::Scalar(s) if s.is_finite() && s >= 0.0 => s as usize,
        _ => {
            return Err(FormulaError::BadArgument {
                func: func.name(),
                reason: "shift must be a non-negative numeric constant".into(),
            });
        }
    };
    Ok((x.into_num(len), n))
}

fn variadic_fold(
    func: Func,
    args: Vec<Value>,
    len: usize,
    f: fn(f64, f64) -> f64,
) -> Result<Value, FormulaError> {
    if args.is_empty() {
        return Err(arity(func, "at least 1 argument", 0));
    }
    let mut args = args.into_iter();
    let mut acc = args.next().expect("checked non-empty").into_num(len);
    for arg in args {
        let next = arg.into_num(len);
        for (a, b) in acc.iter_mut().zip(next.iter()) {
            *a = f(*a, *b);
        }
    }
    Ok(Value::Num(acc))
}

fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

fn nan_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}

/// Apply `f` over each trailing window of `n` rows. Rows with an incomplete
/// window, or a window containing a missing value, are missing.
fn rolling(data: &[f64], n: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; data.len()];
    if n == 0 || n > data.len() {
        return out;
    }
    for i in (n - 1)..data.len() {
        let window = &data[i + 1 - n..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[i] = f(window);
    }
    out
}

/// Sample standard deviation; a window of one row has no deviation.
fn sample_std(w: &[f64]) -> f64 {
    if w.len() < 2 {
        return f64::NAN;
    }
    let mean = w.iter().sum::<f64>() / w.len() as f64;
    let var = w.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (w.len() - 1) as f64;
    var.sqrt()
}

/// Exponential moving average with alpha = 2/(N+1), seeded at the first
/// non-missing value.
fn ema(data: &[f64], n: usize) -> Vec<f64> {
    let alpha = 2.0 / (n as f64 + 1.0);
    let mut out = vec![f64::NAN; data.len()];
    let mut prev = f64::NAN;
    for (i, &x) in data.iter().enumerate() {
        if x.is_nan() {
            out[i] = prev;
            continue;
        }
        prev = if prev.is_nan() {
            x
        } else {
            alpha * x + (1.0 - alpha) * prev
        };
        out[i] = prev;
    }
    out
}

/// SMA(X, N, M): `SMA[i] = (M*X[i] + (N-M)*SMA[i-1]) / N`, seeded at the
/// first non-missing value.
fn sma(data: &[f64], n: usize, m: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; data.len()];
    let mut prev = f64::NAN;
    for (i, &x) in data.iter().enumerate() {
        if x.is_nan() {
            out[i] = prev;
            continue;
        }
        prev = if prev.is_nan() {
            x
        } else {
            (m as f64 * x + (n - m) as f64 * prev) / n as f64
        };
        out[i] = prev;
    }
    out
}

/// Shift back by `n` rows; the first `n` rows are missing.
fn shift(data: &[f64], n: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; data.len()];
    if n < data.len() {
        out[n..].copy_from_slice(&data[..data.len() - n]);
    }
    out
}

/// Rows since the most recent true row; missing before the first true.
fn bars_last(cond: &[bool]) -> Vec<f64> {
    let mut out = vec![f64::NAN; cond.len()];
    let mut last_true: Option<usize> = None;
    for (i, &c) in cond.iter().enumerate() {
        if c {
            last_true = Some(i);
        }
        if let Some(t) = last_true {
            out[i] = (i - t) as f64;
        }
    }
    out
}

/// True at row i iff a was at or below b at i-1 and strictly above at i.
/// Always false at row 0; comparisons against missing rows are false.
fn cross(a: &[f64], b: &[f64]) -> Vec<bool> {
    let mut out = vec![false; a.len()];
    for i in 1..a.len() {
        out[i] = a[i - 1] <= b[i - 1] && a[i] > b[i];
    }
    out
}

fn cross_down(a: &[f64], b: &[f64]) -> Vec<bool> {
    let mut out = vec![false; a.len()];
    for i in 1..a.len() {
        out[i] = a[i - 1] >= b[i - 1] && a[i] < b[i];
    }
    out
}
