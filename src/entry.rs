use bytes::Bytes;

const MAX_VALUE: u128 = 1u128 << 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotNumeric;

/// `touch`/`append`/`prepend`/`incr`/`decr` never bump `unique`; only `Store`
/// assigns a fresh tag, when installing a brand new entry.
#[derive(Clone, Debug)]
pub struct Entry {
    pub key: Bytes,
    pub flags: u32,
    pub exptime: i64,
    pub data: Bytes,
    pub unique: u64,
}

impl Entry {
    pub fn new(key: Bytes, flags: u32, exptime: i64, data: Bytes, unique: u64) -> Self {
        Entry {
            key,
            flags,
            exptime,
            data,
            unique,
        }
    }

    pub fn is_live(&self, now: i64) -> bool {
        now < self.exptime
    }

    pub fn touch(&mut self, new_exptime: i64) {
        self.exptime = new_exptime;
    }

    pub fn append(&mut self, other: &Bytes) {
        let mut buf = Vec::with_capacity(self.data.len() + other.len());
        buf.extend_from_slice(&self.data);
        buf.extend_from_slice(other);
        self.data = Bytes::from(buf);
    }

    pub fn prepend(&mut self, other: &Bytes) {
        let mut buf = Vec::with_capacity(self.data.len() + other.len());
        buf.extend_from_slice(other);
        buf.extend_from_slice(&self.data);
        self.data = Bytes::from(buf);
    }

    /// Wraps modulo 2^64.
    pub fn incr(&mut self, step: u64) -> Result<Bytes, NotNumeric> {
        let current = parse_decimal(&self.data)?;
        let mut sum = current as u128 + step as u128;
        if sum >= MAX_VALUE {
            sum -= MAX_VALUE;
        }
        Ok(self.store_decimal(sum as u64))
    }

    /// Clamps at zero instead of wrapping.
    pub fn decr(&mut self, step: u64) -> Result<Bytes, NotNumeric> {
        let current = parse_decimal(&self.data)?;
        let next = current.saturating_sub(step);
        Ok(self.store_decimal(next))
    }

    fn store_decimal(&mut self, value: u64) -> Bytes {
        let encoded = Bytes::from(value.to_string());
        self.data = encoded.clone();
        encoded
    }
}

fn parse_decimal(data: &[u8]) -> Result<u64, NotNumeric> {
    btoi::btou(data).map_err(|_| NotNumeric)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(data: &str) -> Entry {
        Entry::new(Bytes::from("k"), 0, i64::MAX, Bytes::from(data.to_string()), 1)
    }

    #[test]
    fn touch_preserves_unique() {
        let mut e = entry("x");
        let before = e.unique;
        e.touch(500);
        assert_eq!(e.exptime, 500);
        assert_eq!(e.unique, before);
    }

    #[test]
    fn append_preserves_unique_and_concatenates() {
        let mut e = entry("foo");
        let before = e.unique;
        e.append(&Bytes::from("bar"));
        assert_eq!(&e.data[..], b"foobar");
        assert_eq!(e.unique, before);
    }

    #[test]
    fn prepend_concatenates_in_front() {
        let mut e = entry("bar");
        e.prepend(&Bytes::from("foo"));
        assert_eq!(&e.data[..], b"foobar");
    }

    #[test]
    fn incr_wraps_modulo_2_64() {
        let mut e = entry("18446744073709551610");
        let result = e.incr(10).unwrap();
        assert_eq!(&result[..], b"4");
        assert_eq!(&e.data[..], b"4");
    }

    #[test]
    fn decr_clamps_at_zero() {
        let mut e = entry("3");
        let result = e.decr(10).unwrap();
        assert_eq!(&result[..], b"0");
    }

    #[test]
    fn incr_on_non_numeric_fails_without_mutating() {
        let mut e = entry("abc");
        assert!(e.incr(1).is_err());
        assert_eq!(&e.data[..], b"abc");
    }
}
