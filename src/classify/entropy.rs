/// Bits per byte above which unidentified content is treated as ciphertext.
pub const ENCRYPTED_ENTROPY_THRESHOLD: f64 = 7.4;

/// Shannon entropy of a byte sample, in bits per byte (0.0 to 8.0).
pub fn shannon_entropy(sample: &[u8]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }
    let mut freq = [0u32; 256];
    for &b in sample {
        freq[b as usize] += 1;
    }
    let len = sample.len() as f64;
    freq.iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum()
}
