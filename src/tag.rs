//! Short lowercase alphanumeric tags ("00", "01", ... "0a", ...) used to
//! keep generated function names unique. Expands to one more character
//! when the current width is exhausted.

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone)]
pub struct TagAllocator {
    /// Current tag width
    width: u32,
    /// Next value at the current width
    counter: u64,
}

impl TagAllocator {
    pub fn new() -> Self {
        Self::with_width(2)
    }

    pub fn with_width(width: u32) -> Self {
        Self {
            width: width.max(1),
            counter: 0,
        }
    }

    fn capacity(&self) -> u64 {
        (DIGITS.len() as u64).saturating_pow(self.width)
    }

    /// Allocate the next tag
    pub fn next_tag(&mut self) -> String {
        if self.counter >= self.capacity() {
            self.width += 1;
            self.counter = 0;
        }
        let tag = encode(self.counter, self.width);
        self.counter += 1;
        tag
    }
}

impl Default for TagAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Base-36 encode `num`, left-padded to `width` digits
fn encode(mut num: u64, width: u32) -> String {
    let base = DIGITS.len() as u64;
    let mut out = vec![b'0'; width as usize];
    for slot in out.iter_mut().rev() {
        *slot = DIGITS[(num % base) as usize];
        num /= base;
    }
    out.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_allocation() {
        let mut tags = TagAllocator::new();
        assert_eq!(tags.next_tag(), "00");
        assert_eq!(tags.next_tag(), "01");
        for _ in 2..10 {
            tags.next_tag();
        }
        assert_eq!(tags.next_tag(), "0a");
    }

    #[test]
    fn test_expansion() {
        let mut tags = TagAllocator::with_width(1);
        for _ in 0..36 {
            assert_eq!(tags.next_tag().len(), 1);
        }
        assert_eq!(tags.next_tag(), "00");
    }
}
