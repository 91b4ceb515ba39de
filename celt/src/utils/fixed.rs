//! Q-format fixed-point arithmetic.
//!
//! These helpers reproduce the reference integer semantics exactly: 16-bit
//! operands are truncated to `i16` before multiplying, 32-bit sums wrap, and
//! right shifts are arithmetic (flooring). Scale factors are part of the
//! bitstream contract and must not be changed.

/// 16-bit fixed-point value.
pub type Val16 = i16;
/// 32-bit fixed-point value.
pub type Val32 = i32;
/// Time or frequency domain signal, Q[`SIG_SHIFT`].
pub type Sig = i32;
/// Unit-norm band coefficient, Q14.
pub type Norm = i16;
/// Band log2 energy, Q[`DB_SHIFT`].
pub type Glog = i32;

pub const DB_SHIFT: u32 = 10;
pub const SIG_SHIFT: u32 = 12;
/// Bit costs are counted in 1/8 bit.
pub const BITRES: u32 = 3;
pub const EPSILON: i32 = 1;
pub const VERY_SMALL: i32 = 0;
pub const Q15ONE: i16 = 32767;

/// Converts a float constant to Q`bits`, truncating after adding one half.
pub const fn qconst16(x: f32, bits: u32) -> i16 {
    (0.5 + (x * (1u32 << bits) as f32) as f64) as i16
}

pub const fn qconst32(x: f32, bits: u32) -> i32 {
    (0.5 + (x * (1u32 << bits) as f32) as f64) as i32
}

#[inline]
pub fn extract16(x: i32) -> i16 {
    x as i16
}

#[inline]
pub fn add16(a: i32, b: i32) -> i16 {
    (a as i16).wrapping_add(b as i16)
}

#[inline]
pub fn sub16(a: i32, b: i32) -> i16 {
    (a as i16).wrapping_sub(b as i16)
}

#[inline]
pub fn mult16_16(a: i16, b: i16) -> i32 {
    a as i32 * b as i32
}

#[inline]
pub fn mult16_16_q14(a: i16, b: i16) -> i32 {
    mult16_16(a, b) >> 14
}

#[inline]
pub fn mult16_16_q15(a: i16, b: i16) -> i32 {
    mult16_16(a, b) >> 15
}

/// Q15 product rounded to nearest.
#[inline]
pub fn mult16_16_p15(a: i16, b: i16) -> i32 {
    (mult16_16(a, b) + 16384) >> 15
}

#[inline]
pub fn mult16_32_q15(a: i16, b: i32) -> i32 {
    ((a as i64 * b as i64) >> 15) as i32
}

#[inline]
pub fn mac16_32_q15(c: i32, a: i16, b: i32) -> i32 {
    c.wrapping_add(mult16_32_q15(a, b))
}

/// Right shift with rounding to nearest.
#[inline]
pub fn pshr32(a: i32, shift: u32) -> i32 {
    a.wrapping_add((1 << shift) >> 1) >> shift
}

/// Right shift for positive `shift`, left shift otherwise.
#[inline]
pub fn vshr32(a: i32, shift: i32) -> i32 {
    if shift > 0 {
        a >> shift
    } else {
        a << -shift
    }
}

#[inline]
pub fn half32(x: i32) -> i32 {
    x >> 1
}

#[inline]
pub fn sat16(x: i32) -> i16 {
    x.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Rounds a Q12 signal sample to a saturated 16-bit PCM word.
///
/// The rounding offset is added in 64 bits, so `i32::MAX` maps to 32767.
#[inline]
pub fn sig2word16(x: i32) -> i16 {
    ((x as i64 + (1 << (SIG_SHIFT - 1))) >> SIG_SHIFT).clamp(-32768, 32767) as i16
}

/// Integer log2 of a positive value.
#[inline]
pub fn celt_ilog2(x: i32) -> i32 {
    31 - (x as u32).leading_zeros() as i32
}

#[inline]
pub fn celt_zlog2(x: i32) -> i32 {
    if x <= 0 { 0 } else { celt_ilog2(x) }
}

pub fn celt_maxabs16(x: &[i16]) -> i32 {
    let (mut maxval, mut minval) = (0i16, 0i16);
    for &v in x {
        maxval = maxval.max(v);
        minval = minval.min(v);
    }
    (maxval as i32).max(-(minval as i32))
}

pub fn celt_maxabs32(x: &[i32]) -> i32 {
    let (mut maxval, mut minval) = (0i32, 0i32);
    for &v in x {
        maxval = maxval.max(v);
        minval = minval.min(v);
    }
    maxval.max(minval.wrapping_neg())
}

pub fn celt_inner_prod(x: &[i16], y: &[i16]) -> i32 {
    x.iter()
        .zip(y)
        .fold(0i32, |acc, (&a, &b)| acc.wrapping_add(mult16_16(a, b)))
}

/// Square root of a Q(2k) value, returned in Q(k).
pub fn celt_sqrt(x: i32) -> i32 {
    const C: [i16; 5] = [23175, 11561, -3011, 1699, -664];
    if x == 0 {
        return 0;
    } else if x >= 1_073_741_824 {
        return 32767;
    }
    let k = (celt_ilog2(x) >> 1) - 7;
    let x = vshr32(x, 2 * k);
    let n = (x - 32768) as i16;
    let rt = add16(
        C[0] as i32,
        mult16_16_q15(
            n,
            add16(
                C[1] as i32,
                mult16_16_q15(
                    n,
                    add16(
                        C[2] as i32,
                        mult16_16_q15(n, add16(C[3] as i32, mult16_16_q15(n, C[4]))),
                    ),
                ),
            ),
        ),
    );
    vshr32(rt as i32, 7 - k)
}

/// Base-2 logarithm of a Q14 value, returned in Q[`DB_SHIFT`].
pub fn celt_log2(x: i32) -> i32 {
    const C0: i32 = -6801 + (1 << (13 - DB_SHIFT));
    const C1: i32 = 15746;
    const C2: i32 = -5217;
    const C3: i32 = 2545;
    const C4: i16 = -1401;
    if x == 0 {
        return -32767;
    }
    let i = celt_ilog2(x);
    let n = (vshr32(x, i - 15) - 32768 - 16384) as i16;
    let frac = add16(
        C0,
        mult16_16_q15(
            n,
            add16(
                C1,
                mult16_16_q15(n, add16(C2, mult16_16_q15(n, add16(C3, mult16_16_q15(n, C4))))),
            ),
        ),
    );
    ((i - 13) << DB_SHIFT) + ((frac as i32) >> (14 - DB_SHIFT))
}

/// 2^x for the fractional part of a Q10 exponent, returned in Q14.
pub fn celt_exp2_frac(x: i32) -> i32 {
    const D0: i32 = 16383;
    const D1: i32 = 22804;
    const D2: i32 = 14819;
    const D3: i16 = 10204;
    let frac = (x << 4) as i16;
    add16(
        D0,
        mult16_16_q15(
            frac,
            add16(D1, mult16_16_q15(frac, add16(D2, mult16_16_q15(D3, frac)))),
        ),
    ) as i32
}

/// Approximates `2^31 / x` for positive `x`.
pub fn celt_rcp(x: i32) -> i32 {
    debug_assert!(x > 0, "celt_rcp() only defined for positive values");
    let i = celt_ilog2(x);
    let n = (vshr32(x, i - 15) - 32768) as i16;
    let mut r = add16(30840, mult16_16_q15(-15420, n));
    r = sub16(
        r as i32,
        mult16_16_q15(r, add16(mult16_16_q15(r, n), add16(r as i32, -32768) as i32)),
    );
    r = sub16(
        r as i32,
        add16(
            1,
            mult16_16_q15(r, add16(mult16_16_q15(r, n), add16(r as i32, -32768) as i32)),
        ) as i32,
    );
    vshr32(r as i32, i - 16)
}

#[test]
fn test_qconst() {
    assert_eq!(qconst16(0.8500061035, 15), 27853);
    assert_eq!(qconst16(1.0, 12), 4096);
    assert_eq!(qconst16(0.0069, 14), 113);
    assert_eq!(qconst16(0.04, 15), 1311);
    assert_eq!(qconst32(1.001, 20), 1_049_625);
    assert_eq!(qconst16(0.3066406250, 15), 10048);
}

#[test]
fn test_rounding_shifts() {
    assert_eq!(pshr32(5, 1), 3);
    assert_eq!(pshr32(-5, 1), -2);
    assert_eq!(pshr32(7, 0), 7);
    assert_eq!(vshr32(256, 4), 16);
    assert_eq!(vshr32(16, -4), 256);
    assert_eq!(mult16_32_q15(16384, -3), -2);
    assert_eq!(mult16_16_p15(16384, 3), 2);
}

#[test]
fn test_sig2word16_saturates() {
    assert_eq!(sig2word16(i32::MAX), 32767);
    assert_eq!(sig2word16(i32::MIN), -32768);
    assert_eq!(sig2word16(4096 * 1000), 1000);
    assert_eq!(sig2word16(-4096 * 1000 - 2048), -1000);
}

#[test]
fn test_log_and_sqrt() {
    assert_eq!(celt_ilog2(1), 0);
    assert_eq!(celt_ilog2(1024), 10);
    assert_eq!(celt_zlog2(0), 0);
    assert_eq!(celt_sqrt(0), 0);
    assert_eq!(celt_sqrt(1 << 30), 32767);
    assert_eq!(celt_sqrt(65536), 256);
    assert_eq!(celt_log2(16384), 0);
    assert_eq!(celt_log2(0), -32767);

    // log2(2.0) in Q10, within the approximation error
    let two = celt_log2(32768);
    assert!((two - 1024).abs() <= 2, "log2(2) = {two}");
}

#[test]
fn test_exp2_and_rcp() {
    assert_eq!(celt_exp2_frac(0), 16383);
    let half = celt_exp2_frac(512);
    // 2^0.5 in Q14
    assert!((half - 23170).abs() <= 8, "exp2(0.5) = {half}");

    let r = celt_rcp(16384);
    assert!((r - 131072).abs() <= 16, "rcp(2^14) = {r}");
    assert_eq!(celt_rcp(65536), 32767);
}
