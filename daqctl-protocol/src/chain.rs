//! Fragmentation of long record sequences into MTU-sized datagrams, and the inverse.
//!
//! Every datagram starts with a fixed header:
//!
//! ```text
//! [magic/version: u32][entry_count: u8][sequence_id: u8][packed records...]
//! ```
//!
//! A record is a group of fields written in one call to [`DatagramChain::record`].
//! Records never straddle datagrams, so every datagram can be decoded on its own,
//! and the entry count of each datagram equals the number of records it holds.
use std::collections::{BTreeMap, btree_map::Entry};
use std::fmt::Debug;

use crate::error::{ChainError, ReadError};
use crate::pack::{Packer, Unpacker};
use crate::wire::Wire;

/// UDP payload of a datagram on a 1500 byte Ethernet MTU.
pub const MAX_DATAGRAM_SIZE: usize = 1472;
pub const HEADER_SIZE: usize = 6;
pub const MAX_PAYLOAD_SIZE: usize = MAX_DATAGRAM_SIZE - HEADER_SIZE;
/// `"CTL"` followed by the protocol version.
pub const MAGIC_VERSION: u32 = 0x4354_4C01;
pub const MAX_ENTRIES: u8 = u8::MAX;
/// Sequence ids are a single byte.
pub const MAX_CHAIN_LEN: usize = 256;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DatagramHeader {
    pub entry_count: u8,
    pub sequence_id: u8,
}

/// One fixed-capacity datagram of a chain.
///
/// The entry count is tracked next to the payload and only serialized when the
/// datagram is encoded, so the header never has to be patched after the fact.
#[derive(Clone)]
pub struct Datagram {
    header: DatagramHeader,
    payload: [u8; MAX_PAYLOAD_SIZE],
    len: usize,
}

impl Datagram {
    pub fn new(sequence_id: u8) -> Datagram {
        Datagram {
            header: DatagramHeader {
                entry_count: 0,
                sequence_id,
            },
            payload: [0; MAX_PAYLOAD_SIZE],
            len: 0,
        }
    }

    pub fn header(&self) -> DatagramHeader {
        self.header
    }

    pub fn sequence_id(&self) -> u8 {
        self.header.sequence_id
    }

    pub fn entry_count(&self) -> u8 {
        self.header.entry_count
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len]
    }

    /// Encoded size including the header.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.len
    }

    /// A datagram without entries is the "no data" answer.
    pub fn is_empty(&self) -> bool {
        self.header.entry_count == 0
    }

    fn fits(&self, size: usize) -> bool {
        MAX_PAYLOAD_SIZE - self.len >= size && self.header.entry_count < MAX_ENTRIES
    }

    /// Serializes header and payload into `out`, returning the bytes to send.
    pub fn encode<'b>(&self, out: &'b mut [u8; MAX_DATAGRAM_SIZE]) -> &'b [u8] {
        let mut packer = Packer::new(&mut out[..HEADER_SIZE]);
        packer.pack_u32(MAGIC_VERSION);
        packer.pack_u8(self.header.entry_count);
        packer.pack_u8(self.header.sequence_id);
        out[HEADER_SIZE..self.encoded_len()].copy_from_slice(self.payload());
        &out[..self.encoded_len()]
    }

    pub fn parse(bytes: &[u8]) -> Result<Datagram, ReadError> {
        if bytes.len() < HEADER_SIZE || bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(ReadError::InvalidDatagramSize(bytes.len()));
        }
        let mut unpacker = Unpacker::new(&bytes[..HEADER_SIZE]);
        let magic = unpacker.unpack_u32()?;
        if magic != MAGIC_VERSION {
            return Err(ReadError::InvalidMagic(magic));
        }
        let entry_count = unpacker.unpack_u8()?;
        let sequence_id = unpacker.unpack_u8()?;

        let mut datagram = Datagram::new(sequence_id);
        datagram.header.entry_count = entry_count;
        datagram.len = bytes.len() - HEADER_SIZE;
        datagram.payload[..datagram.len].copy_from_slice(&bytes[HEADER_SIZE..]);
        Ok(datagram)
    }
}

impl Debug for Datagram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datagram")
            .field("header", &self.header)
            .field("len", &self.len)
            .finish()
    }
}

impl PartialEq for Datagram {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.payload() == other.payload()
    }
}

impl Eq for Datagram {}

/// Ordered, append-only sequence of datagrams being filled by a producer.
///
/// Only the last datagram is open for new records.
#[derive(Debug)]
pub struct DatagramChain {
    nodes: Vec<Datagram>,
    limit: usize,
}

impl Default for DatagramChain {
    fn default() -> Self {
        DatagramChain::new()
    }
}

impl DatagramChain {
    pub fn new() -> DatagramChain {
        DatagramChain::with_limit(MAX_CHAIN_LEN)
    }

    /// Creates a chain that refuses to finish with more than `limit` datagrams.
    pub fn with_limit(limit: usize) -> DatagramChain {
        DatagramChain {
            nodes: Vec::new(),
            limit: limit.clamp(1, MAX_CHAIN_LEN),
        }
    }

    /// Number of datagrams opened so far.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Packs one record of at most `size` bytes.
    ///
    /// The record goes into the open datagram if it has room, otherwise a new
    /// datagram is started for it.
    ///
    /// # Panics
    ///
    /// Panics if `size` exceeds [`MAX_PAYLOAD_SIZE`], or if `pack` writes more
    /// than `size` bytes.
    pub fn record(&mut self, size: usize, pack: impl FnOnce(&mut Packer<'_>)) {
        assert!(
            size <= MAX_PAYLOAD_SIZE,
            "Record of {} bytes can never fit a datagram payload of {} bytes",
            size,
            MAX_PAYLOAD_SIZE
        );
        if !self.nodes.last().is_some_and(|node| node.fits(size)) {
            let sequence_id = (self.nodes.len() % MAX_CHAIN_LEN) as u8;
            self.nodes.push(Datagram::new(sequence_id));
        }
        let last = self.nodes.len() - 1;
        let node = &mut self.nodes[last];
        let start = node.len;
        let mut packer = Packer::new(&mut node.payload[start..start + size]);
        pack(&mut packer);
        node.len += packer.position();
        node.header.entry_count += 1;
    }

    /// Closes the chain and returns its datagrams in sequence order.
    ///
    /// An empty chain yields a single empty datagram.
    pub fn finish(self) -> Result<Vec<Datagram>, ChainError> {
        if self.nodes.len() > self.limit {
            return Err(ChainError::TooManyDatagrams {
                count: self.nodes.len(),
                limit: self.limit,
            });
        }
        if self.nodes.is_empty() {
            return Ok(vec![Datagram::new(0)]);
        }
        Ok(self.nodes)
    }
}

/// Collects the datagrams of one response, keyed by sequence id.
#[derive(Debug, Default)]
pub struct Reassembler {
    nodes: BTreeMap<u8, Datagram>,
}

impl Reassembler {
    pub fn new() -> Reassembler {
        Reassembler::default()
    }

    /// Stores a datagram. Returns `false` for a duplicate sequence id.
    pub fn insert(&mut self, datagram: Datagram) -> bool {
        match self.nodes.entry(datagram.sequence_id()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(datagram);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of datagrams received without a gap, starting at sequence id 0.
    pub fn contiguous(&self) -> usize {
        self.nodes
            .keys()
            .enumerate()
            .take_while(|(expected, id)| *expected == usize::from(**id))
            .count()
    }

    /// Reader over the contiguous prefix of the chain.
    pub fn reader(&self) -> ChainReader<'_> {
        ChainReader::new(self.nodes.values().take(self.contiguous()).collect())
    }

    /// Decodes one complete `T` spanning exactly the contiguous prefix.
    pub fn decode<T: Wire>(&self) -> Result<T, ReadError> {
        let mut reader = self.reader();
        let value = T::unpack(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}

/// Walks the records of an ordered chain of datagrams.
#[derive(Debug)]
pub struct ChainReader<'a> {
    nodes: Vec<&'a Datagram>,
    index: usize,
    current: Unpacker<'a>,
    records: u8,
}

impl<'a> ChainReader<'a> {
    pub fn new(nodes: Vec<&'a Datagram>) -> ChainReader<'a> {
        let current = Unpacker::new(nodes.first().copied().map(Datagram::payload).unwrap_or(&[]));
        ChainReader {
            nodes,
            index: 0,
            current,
            records: 0,
        }
    }

    fn close_node(&self) -> Result<(), ReadError> {
        match self.nodes.get(self.index) {
            Some(node) if node.entry_count() != self.records => Err(ReadError::EntryCountMismatch {
                sequence_id: node.sequence_id(),
                expected: node.entry_count(),
                got: self.records,
            }),
            _ => Ok(()),
        }
    }

    /// Starts the next record and returns the unpacker to read its fields from.
    ///
    /// Moves on to the next datagram once the current one is exhausted.
    pub fn begin_record(&mut self) -> Result<&mut Unpacker<'a>, ReadError> {
        while self.current.is_empty() {
            self.close_node()?;
            self.index += 1;
            let node: &'a Datagram = self
                .nodes
                .get(self.index)
                .copied()
                .ok_or(ReadError::IncompleteChain)?;
            self.current = Unpacker::new(node.payload());
            self.records = 0;
        }
        let node = self.nodes[self.index];
        if self.records == node.entry_count() {
            return Err(ReadError::EntryCountMismatch {
                sequence_id: node.sequence_id(),
                expected: node.entry_count(),
                got: self.records.saturating_add(1),
            });
        }
        self.records += 1;
        Ok(&mut self.current)
    }

    /// Verifies that the chain was consumed exactly.
    pub fn finish(&self) -> Result<(), ReadError> {
        let node = self.nodes.get(self.index).ok_or(ReadError::IncompleteChain)?;
        if !self.current.is_empty() {
            return Err(ReadError::TrailingData {
                sequence_id: node.sequence_id(),
            });
        }
        self.close_node()?;
        match self.nodes.get(self.index + 1) {
            Some(next) => Err(ReadError::TrailingData {
                sequence_id: next.sequence_id(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pack_words(chain: &mut DatagramChain, count: u32) {
        for i in 0..count {
            chain.record(8, |p| {
                p.pack_u32(i);
                p.pack_u32(!i);
            });
        }
    }

    fn read_words(reader: &mut ChainReader<'_>, count: u32) -> Result<Vec<u32>, ReadError> {
        let mut words = Vec::new();
        for _ in 0..count {
            let record = reader.begin_record()?;
            let word = record.unpack_u32()?;
            assert_eq!(record.unpack_u32()?, !word);
            words.push(word);
        }
        Ok(words)
    }

    #[test]
    fn empty_chain_is_single_empty_datagram() {
        let datagrams = DatagramChain::new().finish().unwrap();
        assert_eq!(datagrams.len(), 1);
        assert!(datagrams[0].is_empty());
        assert_eq!(datagrams[0].sequence_id(), 0);
    }

    #[test]
    fn encoded_header_layout() {
        let mut chain = DatagramChain::new();
        chain.record(2, |p| p.pack_u16(0xbeef));
        let datagrams = chain.finish().unwrap();
        let mut out = [0u8; MAX_DATAGRAM_SIZE];
        let bytes = datagrams[0].encode(&mut out);
        assert_eq!(bytes, &[0x43, 0x54, 0x4c, 0x01, 1, 0, 0xbe, 0xef]);
        assert_eq!(Datagram::parse(bytes).unwrap(), datagrams[0]);
    }

    #[test]
    fn oversize_payload_fragments() {
        // 8 byte records: 183 fit into one payload
        let count = 1000;
        let mut chain = DatagramChain::new();
        pack_words(&mut chain, count);
        let datagrams = chain.finish().unwrap();
        assert!(datagrams.len() >= 2);

        let per_node = (MAX_PAYLOAD_SIZE / 8) as u32;
        let mut total = 0u32;
        for (i, datagram) in datagrams.iter().enumerate() {
            assert_eq!(datagram.sequence_id() as usize, i);
            assert_eq!(datagram.payload().len(), datagram.entry_count() as usize * 8);
            assert!(u32::from(datagram.entry_count()) <= per_node);
            total += u32::from(datagram.entry_count());
        }
        assert_eq!(total, count);

        let mut reassembler = Reassembler::new();
        for datagram in datagrams.into_iter().rev() {
            let mut out = [0u8; MAX_DATAGRAM_SIZE];
            assert!(reassembler.insert(Datagram::parse(datagram.encode(&mut out)).unwrap()));
        }
        let mut reader = reassembler.reader();
        let words = read_words(&mut reader, count).unwrap();
        reader.finish().unwrap();
        assert_eq!(words, (0..count).collect::<Vec<_>>());
    }

    #[test]
    fn entry_limit_opens_new_datagram() {
        let mut chain = DatagramChain::new();
        for _ in 0..300 {
            chain.record(1, |p| p.pack_u8(7));
        }
        let datagrams = chain.finish().unwrap();
        assert_eq!(datagrams.len(), 2);
        assert_eq!(datagrams[0].entry_count(), MAX_ENTRIES);
        assert_eq!(datagrams[1].entry_count(), 45);
    }

    #[test]
    fn gap_stops_the_reader() {
        let mut chain = DatagramChain::new();
        pack_words(&mut chain, 500);
        let datagrams = chain.finish().unwrap();
        assert_eq!(datagrams.len(), 3);

        let mut reassembler = Reassembler::new();
        reassembler.insert(datagrams[0].clone());
        reassembler.insert(datagrams[2].clone());
        assert_eq!(reassembler.contiguous(), 1);
        assert_eq!(
            read_words(&mut reassembler.reader(), 500),
            Err(ReadError::IncompleteChain)
        );

        assert!(reassembler.insert(datagrams[1].clone()));
        assert!(!reassembler.insert(datagrams[1].clone()));
        assert_eq!(reassembler.contiguous(), 3);
        assert_eq!(read_words(&mut reassembler.reader(), 500).unwrap().len(), 500);
    }

    #[test]
    fn trailing_records_are_detected() {
        let mut chain = DatagramChain::new();
        pack_words(&mut chain, 3);
        let datagrams = chain.finish().unwrap();
        let mut reassembler = Reassembler::new();
        reassembler.insert(datagrams[0].clone());
        let mut reader = reassembler.reader();
        read_words(&mut reader, 2).unwrap();
        assert_eq!(
            reader.finish(),
            Err(ReadError::TrailingData { sequence_id: 0 })
        );
    }

    #[test]
    fn lying_entry_count_is_detected() {
        let mut chain = DatagramChain::new();
        pack_words(&mut chain, 2);
        let datagrams = chain.finish().unwrap();
        let mut out = [0u8; MAX_DATAGRAM_SIZE];
        let len = datagrams[0].encode(&mut out).len();
        out[4] = 3;

        let mut reassembler = Reassembler::new();
        reassembler.insert(Datagram::parse(&out[..len]).unwrap());
        let mut reader = reassembler.reader();
        read_words(&mut reader, 2).unwrap();
        assert_eq!(
            reader.finish(),
            Err(ReadError::EntryCountMismatch {
                sequence_id: 0,
                expected: 3,
                got: 2
            })
        );
    }

    #[test]
    fn chain_limit_is_enforced() {
        let mut chain = DatagramChain::with_limit(2);
        pack_words(&mut chain, 500);
        assert_eq!(
            chain.finish(),
            Err(ChainError::TooManyDatagrams { count: 3, limit: 2 })
        );
    }

    #[test]
    fn parse_rejects_foreign_datagrams() {
        assert_eq!(
            Datagram::parse(&[1, 2, 3]),
            Err(ReadError::InvalidDatagramSize(3))
        );
        assert_eq!(
            Datagram::parse(&[0xde, 0xad, 0xbe, 0xef, 0, 0]),
            Err(ReadError::InvalidMagic(0xdead_beef))
        );
    }

    #[test]
    #[should_panic(expected = "can never fit")]
    fn oversize_record_panics() {
        DatagramChain::new().record(MAX_PAYLOAD_SIZE + 1, |_| {});
    }
}
