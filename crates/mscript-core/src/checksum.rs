//! Fletcher-16 checksum used to frame bootloader data chunks

/// Compute the dual running-sum checksum (modulus 255) over `bytes`.
///
/// The high byte holds the running sum of sums, the low byte the plain sum.
pub fn checksum(bytes: &[u8]) -> u16 {
    let (sum1, sum2) = bytes.iter().fold((0u16, 0u16), |(sum1, sum2), &b| {
        let sum1 = (sum1 + b as u16) % 255;
        let sum2 = (sum2 + sum1) % 255;
        (sum1, sum2)
    });
    (sum2 << 8) | sum1
}

/// Checksum rendered as 4 lowercase hex digits, as sent on the wire
pub fn checksum_hex(bytes: &[u8]) -> String {
    format!("{:04x}", checksum(bytes))
}
