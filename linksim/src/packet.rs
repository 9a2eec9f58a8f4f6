use bytes::Bytes;

/// A packet travelling over a link. The engine only reads its size and identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    id: u64,
    payload: Bytes,
}

impl Packet {
    /// A packet carrying `payload`. `id` only needs to be unique to the caller.
    pub fn new(id: u64, payload: impl Into<Bytes>) -> Self {
        Self { id, payload: payload.into() }
    }

    /// A packet of `len` zero bytes.
    pub fn zeroed(id: u64, len: usize) -> Self {
        Self::new(id, vec![0u8; len])
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Size in bits.
    #[inline]
    pub fn size_bits(&self) -> u64 {
        self.payload.len() as u64 * 8
    }
}
