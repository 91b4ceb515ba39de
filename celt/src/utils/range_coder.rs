//! Binary range coder shared by the TF resolution encode/decode paths.
//!
//! Only the primitives the analysis core consumes are provided: single
//! bits with a power-of-two probability, the bit position, and a fixed byte
//! budget. The state machine follows the standard 32-bit range coder with
//! 8-bit symbols, one bit of carry headroom and deferred carry propagation.

const SYM_BITS: u32 = 8;
const SYM_MAX: u32 = (1 << SYM_BITS) - 1;
const CODE_BITS: u32 = 32;
const CODE_TOP: u32 = 1 << (CODE_BITS - 1);
const CODE_BOT: u32 = CODE_TOP >> SYM_BITS;
const CODE_SHIFT: u32 = CODE_BITS - SYM_BITS - 1;
const CODE_EXTRA: u32 = (CODE_BITS - 2) % SYM_BITS + 1;

/// Number of bits needed to represent `x`.
#[inline]
fn ilog(x: u32) -> i32 {
    (u32::BITS - x.leading_zeros()) as i32
}

/// Encoder side of the entropy coder, as seen by the TF selector.
pub trait EntropyEncoder {
    /// Bits used so far, rounded up.
    fn tell(&self) -> u32;
    /// Declared budget in bytes.
    fn storage(&self) -> u32;
    /// Codes `bit`, where a set bit has probability `1/2^logp`.
    fn enc_bit_logp(&mut self, bit: bool, logp: u32);
}

/// Decoder side of the entropy coder.
pub trait EntropyDecoder {
    fn tell(&self) -> u32;
    fn storage(&self) -> u32;
    fn dec_bit_logp(&mut self, logp: u32) -> bool;
}

#[derive(Debug, Clone)]
pub struct RangeEncoder {
    buf: Vec<u8>,
    offs: usize,
    nbits_total: i32,
    rng: u32,
    val: u32,
    ext: u32,
    rem: i32,
    error: bool,
}

impl RangeEncoder {
    /// Creates an encoder writing at most `storage` bytes.
    pub fn new(storage: usize) -> Self {
        Self {
            buf: vec![0; storage],
            offs: 0,
            nbits_total: CODE_BITS as i32 + 1,
            rng: CODE_TOP,
            val: 0,
            ext: 0,
            rem: -1,
            error: false,
        }
    }

    /// True once a byte had to be dropped because the budget was exhausted.
    pub fn error(&self) -> bool {
        self.error
    }

    fn write_byte(&mut self, value: u32) {
        if self.offs >= self.buf.len() {
            self.error = true;
            return;
        }
        self.buf[self.offs] = value as u8;
        self.offs += 1;
    }

    fn carry_out(&mut self, c: u32) {
        if c != SYM_MAX {
            let carry = c >> SYM_BITS;
            if self.rem >= 0 {
                self.write_byte(self.rem as u32 + carry);
            }
            if self.ext > 0 {
                let sym = (SYM_MAX + carry) & SYM_MAX;
                while self.ext > 0 {
                    self.write_byte(sym);
                    self.ext -= 1;
                }
            }
            self.rem = (c & SYM_MAX) as i32;
        } else {
            self.ext += 1;
        }
    }

    fn normalize(&mut self) {
        while self.rng <= CODE_BOT {
            self.carry_out(self.val >> CODE_SHIFT);
            self.val = (self.val << SYM_BITS) & (CODE_TOP - 1);
            self.rng <<= SYM_BITS;
            self.nbits_total += SYM_BITS as i32;
        }
    }

    /// Flushes the minimum number of bytes that identify the final interval
    /// and zero-fills the rest of the budget.
    pub fn done(&mut self) {
        let mut l = CODE_BITS as i32 - ilog(self.rng);
        let mut msk = (CODE_TOP - 1) >> l;
        let mut end = self.val.wrapping_add(msk) & !msk;
        if (end | msk) >= self.val.wrapping_add(self.rng) {
            l += 1;
            msk >>= 1;
            end = self.val.wrapping_add(msk) & !msk;
        }
        while l > 0 {
            self.carry_out(end >> CODE_SHIFT);
            end = (end << SYM_BITS) & (CODE_TOP - 1);
            l -= SYM_BITS as i32;
        }
        if self.rem >= 0 || self.ext > 0 {
            self.carry_out(0);
        }
        let offs = self.offs;
        self.buf[offs..].fill(0);
    }

    /// Finishes the stream and returns the full budget-sized buffer.
    pub fn finish(mut self) -> Vec<u8> {
        self.done();
        self.buf
    }

    /// Bytes emitted so far.
    pub fn range_bytes(&self) -> usize {
        self.offs
    }
}

impl EntropyEncoder for RangeEncoder {
    fn tell(&self) -> u32 {
        (self.nbits_total - ilog(self.rng)) as u32
    }

    fn storage(&self) -> u32 {
        self.buf.len() as u32
    }

    fn enc_bit_logp(&mut self, bit: bool, logp: u32) {
        let mut r = self.rng;
        let l = self.val;
        let s = r >> logp;
        r -= s;
        if bit {
            self.val = l.wrapping_add(r);
        }
        self.rng = if bit { s } else { r };
        self.normalize();
    }
}

#[derive(Debug, Clone)]
pub struct RangeDecoder<'a> {
    buf: &'a [u8],
    offs: usize,
    nbits_total: i32,
    rng: u32,
    val: u32,
    rem: u32,
}

impl<'a> RangeDecoder<'a> {
    /// Starts decoding `buf`; the whole slice is the declared budget.
    pub fn new(buf: &'a [u8]) -> Self {
        let mut dec = Self {
            buf,
            offs: 0,
            nbits_total: (CODE_BITS + 1
                - ((CODE_BITS - CODE_EXTRA) / SYM_BITS) * SYM_BITS) as i32,
            rng: 1 << CODE_EXTRA,
            val: 0,
            rem: 0,
        };
        dec.rem = dec.read_byte();
        dec.val = dec.rng - 1 - (dec.rem >> (SYM_BITS - CODE_EXTRA));
        dec.normalize();
        dec
    }

    fn read_byte(&mut self) -> u32 {
        match self.buf.get(self.offs) {
            Some(&b) => {
                self.offs += 1;
                b as u32
            }
            None => 0,
        }
    }

    fn normalize(&mut self) {
        while self.rng <= CODE_BOT {
            self.nbits_total += SYM_BITS as i32;
            self.rng <<= SYM_BITS;
            let mut sym = self.rem;
            self.rem = self.read_byte();
            sym = ((sym << SYM_BITS) | self.rem) >> (SYM_BITS - CODE_EXTRA);
            self.val = (self.val << SYM_BITS).wrapping_add(SYM_MAX & !sym) & (CODE_TOP - 1);
        }
    }
}

impl EntropyDecoder for RangeDecoder<'_> {
    fn tell(&self) -> u32 {
        (self.nbits_total - ilog(self.rng)) as u32
    }

    fn storage(&self) -> u32 {
        self.buf.len() as u32
    }

    fn dec_bit_logp(&mut self, logp: u32) -> bool {
        let r = self.rng;
        let d = self.val;
        let s = r >> logp;
        let ret = d < s;
        if !ret {
            self.val = d - s;
        }
        self.rng = if ret { s } else { r - s };
        self.normalize();
        ret
    }
}
