//! The [`Wire`] trait and the building blocks shared by all payload encodings.
use crate::{
    chain::{ChainReader, Datagram, DatagramChain},
    error::{ChainError, ReadError},
};

/// Longest string, in bytes, that is put on the wire. Longer strings are cut.
pub const MAX_STRING_LEN: usize = 255;

/// A value that is packed into a datagram chain as one or more records.
///
/// `unpack` must mirror `pack` exactly, record by record.
pub trait Wire: Sized {
    fn pack(&self, chain: &mut DatagramChain);

    fn unpack(reader: &mut ChainReader<'_>) -> Result<Self, ReadError>;
}

/// Cuts `value` at the first NUL and to at most [`MAX_STRING_LEN`] bytes,
/// respecting character boundaries.
pub fn clamp_str(value: &str) -> &str {
    let value = value.split('\0').next().unwrap_or_default();
    if value.len() <= MAX_STRING_LEN {
        return value;
    }
    let mut end = MAX_STRING_LEN;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Packed size of a string field, including its terminator.
pub fn str_size(value: &str) -> usize {
    clamp_str(value).len() + 1
}

/// Encodes an optional index, with `u16::MAX` standing for "none".
pub(crate) fn option_to_u16(value: Option<u16>) -> u16 {
    value.unwrap_or(u16::MAX)
}

pub(crate) fn option_from_u16(value: u16) -> Option<u16> {
    (value != u16::MAX).then_some(value)
}

pub(crate) fn bool_from_u8(field: &'static str, value: u8) -> Result<bool, ReadError> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        tag => Err(ReadError::InvalidTag { field, tag }),
    }
}

/// Lists are a count record followed by the records of every element.
impl<T: Wire> Wire for Vec<T> {
    fn pack(&self, chain: &mut DatagramChain) {
        chain.record(4, |p| p.pack_u32(self.len() as u32));
        for item in self {
            item.pack(chain);
        }
    }

    fn unpack(reader: &mut ChainReader<'_>) -> Result<Self, ReadError> {
        let count = reader.begin_record()?.unpack_u32()?;
        // The count is untrusted; let the chain bound the allocation instead.
        let mut items = Vec::new();
        for _ in 0..count {
            items.push(T::unpack(reader)?);
        }
        Ok(items)
    }
}

impl Wire for u32 {
    fn pack(&self, chain: &mut DatagramChain) {
        chain.record(4, |p| p.pack_u32(*self));
    }

    fn unpack(reader: &mut ChainReader<'_>) -> Result<Self, ReadError> {
        reader.begin_record()?.unpack_u32()
    }
}

impl Wire for u16 {
    fn pack(&self, chain: &mut DatagramChain) {
        chain.record(2, |p| p.pack_u16(*self));
    }

    fn unpack(reader: &mut ChainReader<'_>) -> Result<Self, ReadError> {
        reader.begin_record()?.unpack_u16()
    }
}

/// Packs `value` into a fresh chain. Mostly useful for tests and tools.
pub fn to_datagrams<T: Wire>(value: &T) -> Result<Vec<Datagram>, ChainError> {
    let mut chain = DatagramChain::new();
    value.pack(&mut chain);
    chain.finish()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chain::Reassembler;

    #[test]
    fn clamp_respects_char_boundaries() {
        let long = "ä".repeat(200);
        let clamped = clamp_str(&long);
        assert_eq!(clamped.len(), 254);
        assert_eq!(clamp_str("crate\0junk"), "crate");
        assert_eq!(str_size("abc"), 4);
    }

    #[test]
    fn nested_lists_span_datagrams() {
        let value: Vec<Vec<u32>> = (0..20).map(|i| (0..100).map(|j| i * j).collect()).collect();
        let datagrams = to_datagrams(&value).unwrap();
        assert!(datagrams.len() > 1);

        let mut reassembler = Reassembler::new();
        for datagram in datagrams {
            reassembler.insert(datagram);
        }
        assert_eq!(reassembler.decode::<Vec<Vec<u32>>>(), Ok(value));
    }

    #[test]
    fn prefix_of_list_does_not_decode() {
        let value: Vec<u32> = (0..1000).collect();
        let datagrams = to_datagrams(&value).unwrap();
        let mut reassembler = Reassembler::new();
        reassembler.insert(datagrams[0].clone());
        assert_eq!(
            reassembler.decode::<Vec<u32>>(),
            Err(ReadError::IncompleteChain)
        );
    }
}
