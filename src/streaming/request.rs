//! Pooled streaming requests
//!
//! A request travels main thread → worker → main thread as a `Box`, so
//! whoever holds the box owns the buffers. Buffers are sized once to the
//! declared payload sizes and reused for every chunk afterwards.

use bitflags::bitflags;

use crate::terrain::{PayloadKind, TerrainHeader};

bitflags! {
    /// Set of payloads requested for a chunk
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PayloadKinds: u8 {
        const HEIGHTMAP = 1 << 0;
        const NORMAL_MAP = 1 << 1;
        const CONTROL_MAP = 1 << 2;
    }
}

impl PayloadKinds {
    /// Iterate the individual kinds in the set
    pub fn kinds(self) -> impl Iterator<Item = PayloadKind> {
        PayloadKind::ALL
            .into_iter()
            .filter(move |&kind| self.contains(PayloadKinds::from(kind)))
    }
}

impl From<PayloadKind> for PayloadKinds {
    fn from(kind: PayloadKind) -> Self {
        match kind {
            PayloadKind::Heightmap => PayloadKinds::HEIGHTMAP,
            PayloadKind::NormalMap => PayloadKinds::NORMAL_MAP,
            PayloadKind::ControlMap => PayloadKinds::CONTROL_MAP,
        }
    }
}

/// A chunk read request and, once completed, its result.
///
/// `T` is the caller's token, handed back with the completion.
pub struct StreamingRequest<T> {
    pub(crate) kinds: PayloadKinds,
    pub(crate) filled: PayloadKinds,
    pub(crate) chunk_index: u32,
    pub(crate) buffers: [Vec<u8>; 3],
    pub(crate) token: Option<T>,
    pub(crate) error: Option<std::io::Error>,
}

impl<T> StreamingRequest<T> {
    fn new(sizes: [usize; 3]) -> Self {
        Self {
            kinds: PayloadKinds::empty(),
            filled: PayloadKinds::empty(),
            chunk_index: 0,
            buffers: sizes.map(|size| vec![0u8; size]),
            token: None,
            error: None,
        }
    }

    pub fn chunk_index(&self) -> u32 {
        self.chunk_index
    }

    /// Kinds that were requested
    pub fn kinds(&self) -> PayloadKinds {
        self.kinds
    }

    /// Payload bytes of `kind`, if it was requested and read successfully
    pub fn try_get(&self, kind: PayloadKind) -> Option<&[u8]> {
        if self.filled.contains(PayloadKinds::from(kind)) {
            Some(&self.buffers[kind.index()])
        } else {
            None
        }
    }

    pub fn try_get_heightmap(&self) -> Option<&[u8]> {
        self.try_get(PayloadKind::Heightmap)
    }

    pub fn try_get_normal_map(&self) -> Option<&[u8]> {
        self.try_get(PayloadKind::NormalMap)
    }

    pub fn try_get_control_map(&self) -> Option<&[u8]> {
        self.try_get(PayloadKind::ControlMap)
    }

    /// Read failure, if any. Kinds read before the failure stay available.
    pub fn error(&self) -> Option<&std::io::Error> {
        self.error.as_ref()
    }

    /// True when every requested kind was read
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.filled == self.kinds
    }
}

/// Free list of request objects
pub(crate) struct RequestPool<T> {
    free: Vec<Box<StreamingRequest<T>>>,
    capacity: usize,
    sizes: [usize; 3],
    allocated: usize,
}

impl<T> RequestPool<T> {
    pub(crate) fn new(header: &TerrainHeader, capacity: usize) -> Self {
        Self {
            free: Vec::with_capacity(capacity),
            capacity,
            sizes: PayloadKind::ALL.map(|kind| header.payload_size(kind) as usize),
            allocated: 0,
        }
    }

    /// Pop a free request (or allocate one) and fill in the target
    pub(crate) fn acquire(&mut self, kinds: PayloadKinds, chunk_index: u32, token: T) -> Box<StreamingRequest<T>> {
        let mut request = self.free.pop().unwrap_or_else(|| {
            self.allocated += 1;
            log::trace!("Allocating streaming request #{}", self.allocated);
            Box::new(StreamingRequest::new(self.sizes))
        });
        request.kinds = kinds;
        request.filled = PayloadKinds::empty();
        request.chunk_index = chunk_index;
        request.token = Some(token);
        request.error = None;
        request
    }

    /// Return a request; dropped if the free list is already full
    pub(crate) fn release(&mut self, mut request: Box<StreamingRequest<T>>) {
        request.token = None;
        request.error = None;
        if self.free.len() < self.capacity {
            self.free.push(request);
        } else {
            self.allocated -= 1;
        }
    }

    /// Requests currently alive (free or in flight)
    pub(crate) fn allocated(&self) -> usize {
        self.allocated
    }

    pub(crate) fn free_count(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> TerrainHeader {
        TerrainHeader::new(8, 9, 32, 1.0, 10.0, 2)
    }

    #[test]
    fn test_kinds_iteration() {
        let kinds = PayloadKinds::HEIGHTMAP | PayloadKinds::CONTROL_MAP;
        let listed: Vec<_> = kinds.kinds().collect();
        assert_eq!(listed, vec![PayloadKind::Heightmap, PayloadKind::ControlMap]);
        assert_eq!(PayloadKinds::all().kinds().count(), 3);
        assert_eq!(PayloadKinds::empty().kinds().count(), 0);
    }

    #[test]
    fn test_buffers_sized_to_payloads() {
        let mut pool = RequestPool::<u32>::new(&header(), 4);
        let request = pool.acquire(PayloadKinds::HEIGHTMAP, 3, 7);
        assert_eq!(request.buffers[0].len(), 81 * 2);
        assert_eq!(request.buffers[1].len(), 81 * 2);
        assert_eq!(request.buffers[2].len(), 81 * 4);
        assert_eq!(request.token, Some(7));
        assert_eq!(request.chunk_index(), 3);
    }

    #[test]
    fn test_try_get_only_filled_kinds() {
        let mut pool = RequestPool::<()>::new(&header(), 4);
        let mut request = pool.acquire(PayloadKinds::HEIGHTMAP | PayloadKinds::NORMAL_MAP, 0, ());
        assert!(request.try_get_heightmap().is_none());

        request.filled = PayloadKinds::HEIGHTMAP;
        assert!(request.try_get_heightmap().is_some());
        assert!(request.try_get_normal_map().is_none());
        assert!(request.try_get_control_map().is_none());
        assert!(!request.is_complete());

        request.filled |= PayloadKinds::NORMAL_MAP;
        assert!(request.is_complete());
    }

    #[test]
    fn test_pool_reuse_and_capacity() {
        let mut pool = RequestPool::<u8>::new(&header(), 1);
        let a = pool.acquire(PayloadKinds::all(), 0, 1);
        let b = pool.acquire(PayloadKinds::all(), 1, 2);
        assert_eq!(pool.allocated(), 2);

        pool.release(a);
        pool.release(b);
        // Only one fits in the free list
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.allocated(), 1);

        let c = pool.acquire(PayloadKinds::HEIGHTMAP, 5, 3);
        assert_eq!(pool.allocated(), 1);
        assert_eq!(c.kinds(), PayloadKinds::HEIGHTMAP);
        assert!(c.error().is_none());
    }
}
