//! ## HyperLogLog representation
//! Estimates large cardinality with `M = 2^P` registers of `W = 6` bits each.
//! This representation uses HyperLogLog++ with LogLog-Beta bias correction.
//!
//! [Original HyperLogLog++ paper](https://static.googleusercontent.com/media/research.google.com/en//pubs/archive/40671.pdf)
//!
//! A hash is routed to the register selected by its low `P` bits. The register keeps the
//! maximum rank observed, where rank is the number of leading zeros of the remaining `64 - P`
//! bits plus one.
//!
//! Slice encoding:
//! - data[..]      - stores register ranks using `W` bits per each register.
//! - data[last]    - one extra element for branchless register updates (see `set_register`).

use std::fmt::{Debug, Formatter};
use std::mem::{size_of, size_of_val};

use crate::error::CardinalityError;
use crate::representation::{decode_hash, RepresentationTrait, W};

/// `2^64`, the size of the hash space
const TWO_POW_64: f64 = 18_446_744_073_709_551_616.0;

#[derive(Clone, PartialEq, Eq)]
pub(crate) struct HyperLogLog {
    precision: u8,
    data: Vec<u32>,
}

impl HyperLogLog {
    /// `u32` slice length needed for `2^precision` registers of `W` bits plus one extra element.
    #[inline]
    pub(crate) fn slice_len(precision: u8) -> usize {
        (1usize << precision) * W / 32 + 1
    }

    /// Create new instance of `HyperLogLog` representation with all registers set to 0
    pub(crate) fn new(precision: u8) -> Result<Self, CardinalityError> {
        let len = Self::slice_len(precision);
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|source| CardinalityError::AllocationFailed {
                bytes: len * size_of::<u32>(),
                source,
            })?;
        data.resize(len, 0);
        Ok(Self { precision, data })
    }

    /// Create new instance of `HyperLogLog` representation from encoded hashes
    pub(crate) fn from_items(precision: u8, items: &[u32]) -> Result<Self, CardinalityError> {
        let mut hll = Self::new(precision)?;
        for &h in items.iter() {
            hll.insert_encoded_hash(h);
        }
        Ok(hll)
    }

    /// Restore `HyperLogLog` representation from its raw slice
    #[cfg_attr(not(feature = "with_serde"), allow(dead_code))]
    pub(crate) fn from_data(precision: u8, data: Vec<u32>) -> Result<Self, CardinalityError> {
        if data.len() != Self::slice_len(precision) {
            return Err(CardinalityError::InvalidRepresentation(
                "dense register slice has wrong length",
            ));
        }
        // registers fill whole words, the trailing word only pads reads
        if data.last().is_some_and(|&padding| padding != 0) {
            return Err(CardinalityError::InvalidRepresentation(
                "dense register padding is not zero",
            ));
        }
        let hll = Self { precision, data };
        let max_rank = hll.max_rank();
        if hll.registers().any(|rank| rank > max_rank) {
            return Err(CardinalityError::InvalidRepresentation(
                "dense register rank exceeds hash width",
            ));
        }
        Ok(hll)
    }

    /// Raw slice of packed registers
    #[cfg(feature = "with_serde")]
    #[inline]
    pub(crate) fn data(&self) -> &[u32] {
        &self.data
    }

    /// Number of registers
    #[inline]
    fn m(&self) -> usize {
        1 << self.precision
    }

    /// Largest rank a `64 - P` bit remainder can produce
    #[inline]
    fn max_rank(&self) -> u32 {
        65 - u32::from(self.precision)
    }

    /// Iterate register ranks in index order
    pub(crate) fn registers(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.m() as u32).map(move |idx| get_register(&self.data, idx))
    }

    /// Insert hash directly, without going through the sparse encoding
    #[inline]
    pub(crate) fn insert_hash(&mut self, hash: u64) {
        let idx = (hash & ((1 << self.precision) - 1)) as u32;
        let rank = (hash.leading_zeros() + 1).min(self.max_rank());
        self.update_rank(idx, rank);
    }

    /// Raise register `idx` to `new_rank` if it is currently lower
    #[inline]
    fn update_rank(&mut self, idx: u32, new_rank: u32) {
        let old_rank = get_register(&self.data, idx);
        if new_rank > old_rank {
            set_register(&mut self.data, idx, new_rank);
        }
    }

    /// Merge two `HyperLogLog` representations of the same precision.
    pub(crate) fn merge(&mut self, rhs: &HyperLogLog) {
        debug_assert_eq!(self.precision, rhs.precision);
        for idx in 0..self.m() as u32 {
            let rhs_rank = get_register(&rhs.data, idx);
            self.update_rank(idx, rhs_rank);
        }
    }

    /// Number of zero registers and harmonic sum of all registers, summed in index order so the
    /// result only depends on register contents.
    fn zeros_and_sum(&self) -> (usize, f64) {
        self.registers().fold((0, 0.0), |(zeros, sum), rank| {
            (
                zeros + usize::from(rank == 0),
                sum + 1.0 / ((1u64 << rank) as f64),
            )
        })
    }
}

impl RepresentationTrait for HyperLogLog {
    /// Insert encoded hash into `HyperLogLog` representation.
    #[inline]
    fn insert_encoded_hash(&mut self, h: u32) {
        let (idx, rank) = decode_hash(h, self.precision);
        self.update_rank(idx, rank);
    }

    /// Return cardinality estimate of `HyperLogLog` representation
    fn estimate(&self) -> u64 {
        let m = self.m() as f64;
        let (zeros, sum) = self.zeros_and_sum();

        if zeros > 0 {
            let linear = linear_counting(m, zeros as f64);
            if linear <= THRESHOLD[usize::from(self.precision) - 4] {
                return (linear + 0.5) as u64;
            }
        }

        let mut estimate = alpha(self.m()) * m * (m - zeros as f64)
            / (sum + beta_horner(zeros as f64, self.precision));

        if estimate > TWO_POW_64 / 30.0 {
            let ratio = (1.0 - estimate / TWO_POW_64).max(f64::MIN_POSITIVE);
            estimate = -TWO_POW_64 * ratio.ln();
        }
        (estimate + 0.5) as u64
    }

    /// Return memory size of `HyperLogLog`
    #[inline]
    fn size_of(&self) -> usize {
        size_of::<Self>() + size_of_val(self.data.as_slice())
    }
}

impl Debug for HyperLogLog {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "HyperLogLog {{ precision: {}, estimate: {} }}",
            self.precision,
            self.estimate()
        )
    }
}

/// Get HyperLogLog `idx` register
#[inline]
fn get_register(data: &[u32], idx: u32) -> u32 {
    let bit_idx = (idx as usize) * W;
    let u32_idx = bit_idx / 32;
    let bit_pos = bit_idx % 32;
    let bits = &data[u32_idx..u32_idx + 2];
    let bits_1 = W.min(32 - bit_pos);
    let bits_2 = W - bits_1;
    let mask_1 = (1 << bits_1) - 1;
    let mask_2 = (1 << bits_2) - 1;

    ((bits[0] >> bit_pos) & mask_1) | ((bits[1] & mask_2) << bits_1)
}

/// Set HyperLogLog `idx` register to new value `rank`
#[inline]
fn set_register(data: &mut [u32], idx: u32, new_rank: u32) {
    let bit_idx = (idx as usize) * W;
    let u32_idx = bit_idx / 32;
    let bit_pos = bit_idx % 32;
    let bits = &mut data[u32_idx..u32_idx + 2];
    let bits_1 = W.min(32 - bit_pos);
    let bits_2 = W - bits_1;
    let mask_1 = (1 << bits_1) - 1;
    let mask_2 = (1 << bits_2) - 1;

    // Unconditionally update two `u32` elements based on `new_rank` bits and masks
    bits[0] &= !(mask_1 << bit_pos);
    bits[0] |= (new_rank & mask_1) << bit_pos;
    bits[1] &= !mask_2;
    bits[1] |= (new_rank >> bits_1) & mask_2;
}

/// Linear counting estimate for `m` registers of which `zeros` are unset
#[inline]
fn linear_counting(m: f64, zeros: f64) -> f64 {
    m * (m / zeros).ln()
}

/// Empirically determined HyperLogLog++ thresholds below which linear counting is preferred,
/// indexed by `precision - 4`
const THRESHOLD: [f64; 15] = [
    10.0, 20.0, 40.0, 80.0, 220.0, 400.0, 900.0, 1800.0, 3100.0, 6500.0, 11500.0, 20000.0,
    50000.0, 120000.0, 350000.0,
];

/// Parameter for bias correction
#[inline]
fn alpha(m: usize) -> f64 {
    match m {
        16 => 0.673,
        32 => 0.697,
        64 => 0.709,
        _ => 0.7213 / (1.0 + 1.079 / (m as f64)),
    }
}
/// Computes LogLog-Beta estimate bias correction using Horner's method.
///
/// Paper: https://arxiv.org/pdf/1612.02284.pdf
/// Wikipedia: https://en.wikipedia.org/wiki/Horner%27s_method
#[inline]
fn beta_horner(z: f64, precision: u8) -> f64 {
    let beta = BETA[usize::from(precision) - 4];
    let zl = (z + 1.0).ln();
    let mut res = 0.0;
    for i in (1..8).rev() {
        res = res * zl + beta[i];
    }
    res * zl + beta[0] * z
}

/// LogLog-Beta polynomial coefficients for precision in [4..18] range.
const BETA: [[f64; 8]; 15] = [
    // p = 4
    [
        -0.582581413904517,
        -1.93530035756005,
        11.079323758035073,
        -22.131357446444323,
        22.505391846630037,
        -12.000723834917984,
        3.220579408194167,
        -0.342225302271235,
    ],
    // p = 5
    [
        -0.7518999460733967,
        -0.959003007774876,
        5.59973713221416,
        -8.209763699976552,
        6.509125489447204,
        -2.683029373432373,
        0.5612891113138221,
        -0.0463331622196545,
    ],
    // p = 6
    [
        29.825790096961963,
        -31.328708333772592,
        -10.594252303658228,
        -11.572012568909962,
        3.818875437390749,
        -2.416013032853081,
        0.4542208940970826,
        -0.0575155452020420,
    ],
    // p = 7
    [
        2.810292129082006,
        -3.9780498518175995,
        1.3162680041351582,
        -3.92524863358059,
        2.008083575394647,
        -0.7527151937556955,
        0.1265569894242751,
        -0.0109946438726240,
    ],
    // p = 8
    [
        1.0063354488755052,
        -2.005806664051124,
        1.6436974936651412,
        -2.7056080994056617,
        1.392099802442226,
        -0.4647037427218319,
        0.07384282377269775,
        -0.00578554885254223,
    ],
    // p = 9
    [
        -0.09415657458167959,
        -0.7813097592455053,
        1.7151494675071246,
        -1.7371125040651634,
        0.8644150848904892,
        -0.23819027465047218,
        0.03343448400269076,
        -0.00207858528178157,
    ],
    // p = 10
    [
        -0.25935400670790054,
        -0.5259830199980581,
        1.4893303492587684,
        -1.2964271408499357,
        0.6228475621722162,
        -0.1567232677025104,
        0.02054415903878563,
        -0.00112488483925502,
    ],
    // p = 11
    [
        -4.32325553856025e-01,
        -1.08450736399632e-01,
        6.09156550741120e-01,
        -1.65687801845180e-02,
        -7.95829341087617e-02,
        4.71830602102918e-02,
        -7.81372902346934e-03,
        5.84268708489995e-04,
    ],
    // p = 12
    [
        -3.84979202588598e-01,
        1.83162233114364e-01,
        1.30396688841854e-01,
        7.04838927629266e-02,
        -8.95893971464453e-03,
        1.13010036741605e-02,
        -1.94285569591290e-03,
        2.25435774024964e-04,
    ],
    // p = 13
    [
        -0.41655270946462997,
        -0.22146677040685156,
        0.38862131236999947,
        0.4534097974606237,
        -0.36264738324476375,
        0.12304650053558529,
        -0.0170154038455551,
        0.00102750367080838,
    ],
    // p = 14
    [
        -3.71009760230692e-01,
        9.78811941207509e-03,
        1.85796293324165e-01,
        2.03015527328432e-01,
        -1.16710521803686e-01,
        4.31106699492820e-02,
        -5.99583540511831e-03,
        4.49704299509437e-04,
    ],
    // p = 15
    [
        -0.38215145543875273,
        -0.8906940053609084,
        0.3760233577467887,
        0.9933597744068238,
        -0.6557744163831896,
        0.1833234212970361,
        -0.02241529633062872,
        0.00121399789330194,
    ],
    // p = 16
    [
        -0.3733187664375306,
        -1.41704077448123,
        0.40729184796612533,
        1.5615203390658416,
        -0.9924223353428613,
        0.2606468139948309,
        -0.03053811369682807,
        0.00155770210179105,
    ],
    // p = 17
    [
        -0.36775502299404605,
        0.5383142235137797,
        0.7697028927876792,
        0.5500258358645056,
        -0.7457558826114694,
        0.2571183578582195,
        -0.03437902606864149,
        0.00185949146371616,
    ],
    // p = 18
    [
        -0.3647962332596054,
        0.9973041232863503,
        1.5535438623008122,
        1.2593267719802892,
        -1.5332594820911016,
        0.4780104220005659,
        -0.05951025172951174,
        0.00291076804642205,
    ],
];
