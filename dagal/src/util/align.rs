/// Rounds `current` up to the next multiple of `alignment`
///
/// An alignment of `0` leaves the value untouched.
pub fn align(current: u64, alignment: u64) -> u64 {
    if alignment == 0 || current % alignment == 0 {
        current
    } else {
        let remainder = current % alignment;
        current + alignment - remainder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align() {
        assert_eq!(align(0, 16), 0);
        assert_eq!(align(1, 16), 16);
        assert_eq!(align(16, 16), 16);
        assert_eq!(align(17, 256), 256);
        assert_eq!(align(7, 0), 7);
        assert_eq!(align(9, 3), 9);
    }
}
