//! Two-header on-disk layout: `[N][R][code...][reloc bitmap...]`, little
//! endian. Grounded in spec.md §4.5 — the kept `original_source/image.c`
//! only slurps the file into a buffer and never parses this layout, so the
//! header/bitmap shape itself comes from the spec, not the original.

use sim_core::SimError;

/// A parsed, not-yet-relocated image: the code words and the relocation
/// bitmap, both validated against the declared word counts.
pub struct ParsedImage {
    code: Vec<u32>,
    reloc: Vec<u32>,
}

impl ParsedImage {
    /// Parse and validate a raw image buffer.
    ///
    /// Checks the buffer is at least `(2+N+R)*4` bytes and that the first
    /// code word (the parameter block's `version` field) is 1.
    pub fn parse(bytes: &[u8]) -> Result<Self, SimError> {
        if bytes.len() < 8 {
            return Err(SimError::Image(format!(
                "image of {} bytes is too short to hold an N/R header",
                bytes.len()
            )));
        }
        let n = read_word(bytes, 0);
        let r = read_word(bytes, 4);

        let total_words = 2u64 + u64::from(n) + u64::from(r);
        let required = total_words * 4;
        if (bytes.len() as u64) < required {
            return Err(SimError::Image(format!(
                "image declares N={n} code words and R={r} bitmap words, needing {required} bytes, but is only {} bytes",
                bytes.len()
            )));
        }

        let code: Vec<u32> = (0..n).map(|i| read_word(bytes, (2 + i) as usize * 4)).collect();
        let reloc: Vec<u32> = (0..r)
            .map(|i| read_word(bytes, (2 + n + i) as usize * 4))
            .collect();

        let version = code.first().copied().unwrap_or(0);
        if version != 1 {
            return Err(SimError::Image(format!(
                "parameter-block version must be 1, found {version}"
            )));
        }

        Ok(Self { code, reloc })
    }

    #[must_use]
    pub fn word_count(&self) -> u32 {
        self.code.len() as u32
    }

    #[must_use]
    pub fn code_word(&self, i: u32) -> u32 {
        self.code[i as usize]
    }

    /// Whether code word `i` carries a relocation. Bits at or past `N` in
    /// the bitmap are never consulted, even when `R*32 > N` leaves spare
    /// bits in the last bitmap word — §4.5 step 3's explicit correction of
    /// `original_source/execute.c`'s relocation loop, which over-reads by
    /// one word in that case.
    #[must_use]
    pub fn reloc_bit(&self, i: u32) -> bool {
        if i >= self.word_count() {
            return false;
        }
        let word_idx = (i / 32) as usize;
        let bit_idx = i % 32;
        self.reloc
            .get(word_idx)
            .is_some_and(|w| (w >> bit_idx) & 1 != 0)
    }
}

fn read_word(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().expect("4-byte slice"))
}
