/// Internet checksum (RFC 1071) over `data`.
///
/// Words are read big-endian; an odd trailing byte is treated as the high
/// byte of a zero-padded word. Callers zero the checksum field first.
pub fn compute_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum = sum.wrapping_add(u16::from_be_bytes([word[0], word[1]]) as u32);
        // Fold early so the accumulator can never overflow on huge buffers.
        if sum > 0xFFFF {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }
    }

    if let [last] = words.remainder() {
        sum += (*last as u32) << 8;
    }

    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}
