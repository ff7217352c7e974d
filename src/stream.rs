//! Allocation-free, streaming encoding of UTF-8 input.
//!
//! This module encodes text that arrives in chunks, such as from network
//! sockets or file readers, without buffering the whole input and without
//! holding onto previous chunks.
//!
//! # Key Features
//!
//! - **Streaming Encoding**: The main type, [`EncodeStream`], processes byte
//!   slices incrementally.
//! - **Zero Heap Allocations**: A multi-byte character split across two chunks
//!   is "stitched" together in a 4-byte buffer on the stack.
//! - **Data-Source Agnostic**: You push byte slices as you receive them, so
//!   input buffers can be reused. Or hand a [`ChunkSource`] to
//!   [`encode_from_source`](EncodeStream::encode_from_source) and let it pull.
//! - **Validation**: Invalid UTF-8 is reported with its position in the
//!   stream, and encoding resumes after the bad bytes.
//!
//! # How It Works
//!
//! [`encode_next`](EncodeStream::encode_next) returns a tuple:
//!
//! 1.  An `Option<Result<Fragment, DecodeError>>` for the character that
//!     straddled the boundary between the previous chunk and this one. It is
//!     `Some(_)` only if the previous chunk ended in the middle of a character.
//! 2.  An [`EncodeNext`] iterator over the encoded tokens of the rest of the
//!     chunk. Drain it: an incomplete character at the end of the chunk is
//!     only saved once the iterator reaches it.
//!
//! After the last chunk, call [`finish`](EncodeStream::finish) to detect input
//! that ended inside a character.
//!
//! # Example
//!
//! ```rust
//! use context_escape::{codec::HTML, stream::EncodeStream};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // "<café>" with the two bytes of 'é' split across chunks.
//!     let parts = [b"<caf\xC3".as_slice(), b"\xA9>".as_slice()];
//!
//!     let mut encoder = EncodeStream::new(&HTML);
//!     let mut html = String::new();
//!
//!     for part in parts {
//!         let (boundary, rest) = encoder.try_encode_next(part)?;
//!
//!         // 1. The character that spanned the boundary, already encoded.
//!         if let Some(fragment) = boundary {
//!             html.push_str(&fragment);
//!         }
//!
//!         // 2. The rest of the current part.
//!         for token in rest {
//!             html.push_str(token?.as_str());
//!         }
//!     }
//!
//!     // Always call finish() to detect a truncated character at the end.
//!     encoder.finish()?;
//!
//!     assert_eq!(html, "&#60;caf&#233;&#62;");
//!     Ok(())
//! }
//! ```

use core::{convert::Infallible, str};
#[cfg(feature = "std")]
use std::vec::Vec;

use crate::{
    DecodeError, DecodeErrorKind, InvalidUtf8Error,
    codec::Codec,
    format::Fragment,
    token::{EncodeTokens, EncodedToken},
};

/// Bytes of a character whose end has not arrived yet.
#[derive(Debug, Clone, Copy, Default)]
struct Pending {
    // The longest UTF-8 sequence is 4 bytes; at most 3 are ever pending.
    buf: [u8; 4],
    len: u8,
}

/// A streaming encoder that operates over UTF-8 byte slices.
///
/// See the [module-level documentation](self) for examples and more details.
#[derive(Debug, Clone)]
#[must_use = "EncodeStream does nothing unless consumed"]
pub struct EncodeStream<C> {
    codec: C,
    pending: Pending,
    /// Bytes fed so far, pending ones included.
    consumed: usize,
}

impl<C: Codec> EncodeStream<C> {
    /// Creates a new `EncodeStream` that encodes with `codec`.
    #[inline]
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            pending: Pending::default(),
            consumed: 0,
        }
    }

    /// The codec this stream encodes with.
    #[inline]
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Processes the next byte slice, returning a fallible result.
    ///
    /// This is a convenience wrapper around [`EncodeStream::encode_next`] that
    /// hoists a boundary error into the outer `Result`, so `?` covers both.
    #[inline]
    pub fn try_encode_next<'a, 'b, I: AsRef<[u8]> + ?Sized>(
        &'a mut self,
        next_part: &'b I,
    ) -> Result<(Option<Fragment>, EncodeNext<'a, 'b, C>), DecodeError> {
        let (boundary, rest) = self.encode_next(next_part);
        Ok((boundary.transpose()?, rest))
    }

    /// Processes the next byte slice in the stream.
    ///
    /// Returns the encoded form of the character that spanned the boundary from
    /// the *previous* slice (if any), and an iterator over the rest of this one.
    ///
    /// If the pending bytes and the start of this slice do not form a valid
    /// character, the boundary is an error and the pending bytes are discarded.
    /// The iterator resumes after the invalid sequence, so the errors reported
    /// do not depend on where the input was split.
    pub fn encode_next<'a, 'b, I: AsRef<[u8]> + ?Sized>(
        &'a mut self,
        next_part: &'b I,
    ) -> (Option<Result<Fragment, DecodeError>>, EncodeNext<'a, 'b, C>) {
        let part = next_part.as_ref();
        let (boundary, rest) = self.stitch(part);
        self.consumed += part.len();

        let boundary = boundary.map(|r| r.map(|c| encode_char(&self.codec, c)));
        let (valid, tail) = split_valid(rest);

        let iterator = EncodeNext {
            tokens: EncodeTokens::new(&self.codec, valid),
            tail,
            end: self.consumed,
            pending: &mut self.pending,
        };

        (boundary, iterator)
    }

    /// Completes a pending character with the first bytes of `part`.
    fn stitch<'b>(&mut self, part: &'b [u8]) -> (Option<Result<char, DecodeError>>, &'b [u8]) {
        let old_len = self.pending.len as usize;
        if old_len == 0 {
            return (None, part);
        }

        let width = utf8_width(self.pending.buf[0]);
        let to_copy = width.saturating_sub(old_len).min(part.len());
        self.pending.buf[old_len..old_len + to_copy].copy_from_slice(&part[..to_copy]);
        self.pending.len += to_copy as u8;

        let offset = self.consumed - old_len;
        match str::from_utf8(&self.pending.buf[..self.pending.len as usize]) {
            Ok(s) => {
                self.pending.len = 0;
                match s.chars().next() {
                    Some(c) => (Some(Ok(c)), &part[to_copy..]),
                    None => (None, &part[to_copy..]),
                }
            }
            Err(e) => match e.error_len() {
                // Still short, and everything we had was taken.
                None => (None, &part[to_copy..]),
                Some(len) => {
                    self.pending.len = 0;
                    let err = DecodeError {
                        kind: DecodeErrorKind::InvalidUtf8(InvalidUtf8Error { len: len as u8 }),
                        offset,
                    };
                    // Bytes of this part that belong to the bad sequence are not
                    // reported again.
                    (Some(Err(err)), &part[len.saturating_sub(old_len)..])
                }
            },
        }
    }

    /// Finalizes the stream, checking for a truncated character.
    ///
    /// This method **must** be called after all slices have been processed.
    /// It consumes the `EncodeStream`, preventing further use.
    pub fn finish(self) -> Result<(), DecodeError> {
        if self.pending.len > 0 {
            return Err(DecodeError {
                kind: DecodeErrorKind::UnexpectedEof,
                offset: self.consumed - self.pending.len as usize,
            });
        }
        Ok(())
    }

    /// Discards the bytes of any incomplete character.
    ///
    /// **Warning**: calling `finish()` right after `clear()` returns `Ok(())`
    /// even if the input was truncated.
    pub fn clear(&mut self) {
        self.pending.len = 0;
    }

    /// Encodes a stream of byte chunks from a source function to a destination
    /// function.
    ///
    /// `src` returns `Some(Ok(chunk))` for data, `Some(Err(e))` for a source
    /// error, and `None` at the end of the stream. `dst` receives every
    /// [`EncodedToken`] in order.
    ///
    /// # Errors
    ///
    /// - [`EncodeFnError::Src`] if `src` returns an error.
    /// - [`EncodeFnError::Encode`] if the input is not valid UTF-8, or ends
    ///   inside a character.
    /// - [`EncodeFnError::Dst`] if `dst` returns an error.
    ///
    /// ```
    /// use context_escape::{codec::CSS, stream::EncodeStream};
    /// use std::convert::Infallible;
    ///
    /// let mut parts = ["a b", "|c"].into_iter();
    /// let mut css = String::new();
    ///
    /// EncodeStream::new(&CSS)
    ///     .encode_from_fn::<_, _, Infallible, Infallible, _>(
    ///         || parts.next().map(Ok),
    ///         |token| {
    ///             css.push_str(token.as_str());
    ///             Ok(())
    ///         },
    ///     )
    ///     .unwrap();
    ///
    /// assert_eq!(css, "a\\20 b\\7c c");
    /// ```
    pub fn encode_from_fn<Src, Dst, SrcError, DstError, B>(
        self,
        src: Src,
        dst: Dst,
    ) -> Result<(), EncodeFnError<SrcError, DstError>>
    where
        Src: FnMut() -> Option<Result<B, SrcError>>,
        Dst: FnMut(EncodedToken<'_>) -> Result<(), DstError>,
        B: AsRef<[u8]>,
    {
        self.encode_from_source(FnMutChunkSource::new(src), dst)
    }

    /// Pulls byte chunks from a [`ChunkSource`] and passes the encoded tokens
    /// to `dst`.
    ///
    /// # Errors
    ///
    /// See [`encode_from_fn`](Self::encode_from_fn).
    pub fn encode_from_source<Src, Dst, SrcError, DstError>(
        mut self,
        mut src: Src,
        mut dst: Dst,
    ) -> Result<(), EncodeFnError<SrcError, DstError>>
    where
        Src: ChunkSource<Error = SrcError>,
        Dst: FnMut(EncodedToken<'_>) -> Result<(), DstError>,
    {
        while let Some(next) = src.next_chunk() {
            let next = next.map_err(EncodeFnError::Src)?;
            let (boundary, next) = self
                .try_encode_next(next.as_ref())
                .map_err(EncodeFnError::Encode)?;

            if let Some(fragment) = boundary {
                if !fragment.is_empty() {
                    dst(EncodedToken::Escaped(fragment)).map_err(EncodeFnError::Dst)?;
                }
            }

            for token in next {
                let token = token.map_err(EncodeFnError::Encode)?;
                dst(token).map_err(EncodeFnError::Dst)?;
            }
        }

        self.finish().map_err(EncodeFnError::Encode)
    }
}

#[inline]
fn encode_char<C: Codec>(codec: &C, c: char) -> Fragment {
    if codec.is_safe(c) {
        let mut out = Fragment::new();
        out.push_char(c);
        out
    } else {
        codec.escape(c)
    }
}

/// Length of the sequence introduced by a UTF-8 lead byte.
#[inline]
fn utf8_width(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}

/// Splits `bytes` into its longest valid UTF-8 prefix and the rest.
#[inline]
fn split_valid(bytes: &[u8]) -> (&str, &[u8]) {
    match str::from_utf8(bytes) {
        Ok(s) => (s, &[]),
        Err(e) => {
            let (valid, rest) = bytes.split_at(e.valid_up_to());
            // SAFETY: `from_utf8` validated everything before `valid_up_to`.
            (unsafe { str::from_utf8_unchecked(valid) }, rest)
        }
    }
}

/// An error that can occur during the `encode_from_source` operation.
///
/// This enum consolidates errors from the three potential points of failure:
/// reading from the source (`Src`), decoding the input (`Encode`), and writing
/// to the destination (`Dst`).
#[derive(Clone, Debug)]
pub enum EncodeFnError<Src, Dst> {
    /// The input was not valid UTF-8.
    Encode(DecodeError),
    /// An error occurred while reading from the source.
    Src(Src),
    /// An error occurred while writing to the destination.
    Dst(Dst),
}

impl<Src, Dst: core::fmt::Display> core::fmt::Display for EncodeFnError<Src, Dst>
where
    Src: core::fmt::Display,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EncodeFnError::Encode(e) => write!(f, "encode error: {e}"),
            EncodeFnError::Src(e) => write!(f, "source error: {e}"),
            EncodeFnError::Dst(e) => write!(f, "destination error: {e}"),
        }
    }
}

#[cfg(feature = "std")]
impl<Src, Dst> std::error::Error for EncodeFnError<Src, Dst>
where
    Src: std::error::Error + 'static,
    Dst: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EncodeFnError::Encode(e) => Some(e),
            EncodeFnError::Src(e) => Some(e),
            EncodeFnError::Dst(e) => Some(e),
        }
    }
}

impl From<EncodeFnError<Infallible, Infallible>> for DecodeError {
    fn from(value: EncodeFnError<Infallible, Infallible>) -> Self {
        match value {
            EncodeFnError::Encode(e) => e,
            EncodeFnError::Src(i) => match i {},
            EncodeFnError::Dst(i) => match i {},
        }
    }
}

/// An iterator over the encoded parts of a single byte slice.
///
/// This struct is created by [`EncodeStream::encode_next`].
#[must_use = "iterators are lazy and do nothing unless consumed"]
#[derive(Debug)]
pub struct EncodeNext<'a, 'b, C> {
    tokens: EncodeTokens<'b, &'a C>,
    /// Bytes after the valid prefix: empty, invalid, or a truncated character.
    tail: &'b [u8],
    /// Stream offset of the end of this slice.
    end: usize,
    pending: &'a mut Pending,
}

impl<'b, C: Codec> Iterator for EncodeNext<'_, 'b, C> {
    type Item = Result<EncodedToken<'b>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(token) = self.tokens.next() {
            return Some(Ok(token));
        }
        if self.tail.is_empty() {
            return None;
        }

        let tail = self.tail;
        let offset = self.end - tail.len();
        match str::from_utf8(tail).map_err(|e| e.error_len()) {
            // Truncated at the end of the slice; wait for the next one.
            Err(None) | Ok(_) => {
                debug_assert!(tail.len() < self.pending.buf.len(), "{tail:?}");
                let n = tail.len().min(self.pending.buf.len());
                self.pending.buf[..n].copy_from_slice(&tail[..n]);
                self.pending.len = n as u8;
                self.tail = &[];
                None
            }
            Err(Some(len)) => {
                let (valid, tail) = split_valid(&tail[len..]);
                self.tokens = EncodeTokens::new(*self.tokens.codec(), valid);
                self.tail = tail;
                Some(Err(DecodeError {
                    kind: DecodeErrorKind::InvalidUtf8(InvalidUtf8Error { len: len as u8 }),
                    offset,
                }))
            }
        }
    }
}

// =============================================================================
// Traits
// =============================================================================

/// A source of byte chunks.
///
/// A simple closure (`FnMut() -> Option<Result<B, E>>`) cannot hand out slices
/// that borrow from its own internal buffer, since the returned slice would
/// need to outlive the call. This trait makes the source a mutable object whose
/// chunks live until the next call instead.
pub trait ChunkSource {
    /// The type of error that can occur when reading a chunk.
    type Error;

    /// The type of chunk returned.
    type Chunk<'a>: AsRef<[u8]> + 'a
    where
        Self: 'a;

    /// Get the next chunk of bytes.
    ///
    /// Returns `None` when the source is exhausted, `Some(Ok(bytes))` for a
    /// chunk, or `Some(Err(e))` if an error occurred. The chunk is valid until
    /// the next call to `next_chunk` or until the source is dropped.
    fn next_chunk<'a>(&'a mut self) -> Option<Result<Self::Chunk<'a>, Self::Error>>;
}

impl<T> ChunkSource for &mut T
where
    T: ChunkSource,
{
    type Error = T::Error;

    type Chunk<'a>
        = T::Chunk<'a>
    where
        Self: 'a;

    #[inline]
    fn next_chunk<'a>(&'a mut self) -> Option<Result<Self::Chunk<'a>, Self::Error>> {
        (*self).next_chunk()
    }
}

/// A `ChunkSource` that reads from any `std::io::Read` type.
///
/// Chunks are read into the given buffer, so its length sets the chunk size.
///
/// ```
/// use context_escape::{codec::JAVASCRIPT_STRING, stream::{EncodeStream, ReadChunkSource}};
///
/// let input = std::io::Cursor::new("say \"hi\"\n");
/// let mut js = String::new();
///
/// EncodeStream::new(&JAVASCRIPT_STRING)
///     .encode_from_source(ReadChunkSource::new(input, [0u8; 4]), |token| {
///         js.push_str(token.as_str());
///         Ok::<_, std::convert::Infallible>(())
///     })
///     .unwrap();
///
/// assert_eq!(js, "say \\u0022hi\\u0022\\n");
/// ```
#[cfg(feature = "std")]
pub struct ReadChunkSource<R, B> {
    reader: R,
    buffer: B,
}

#[cfg(feature = "std")]
impl<R, B> ReadChunkSource<R, B> {
    /// Creates a new `ReadChunkSource` with the given reader and buffer.
    pub fn new(reader: R, buffer: B) -> Self {
        Self { reader, buffer }
    }
}

#[cfg(feature = "std")]
impl<R> ReadChunkSource<R, Vec<u8>> {
    /// Creates a new `ReadChunkSource` with a zeroed buffer of `capacity` bytes.
    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        ReadChunkSource::new(reader, std::vec![0; capacity])
    }
}

#[cfg(feature = "std")]
impl<R, B> ChunkSource for ReadChunkSource<R, B>
where
    R: std::io::Read,
    B: AsMut<[u8]>,
{
    type Error = std::io::Error;
    type Chunk<'a>
        = &'a [u8]
    where
        Self: 'a;

    #[inline]
    fn next_chunk<'a>(&'a mut self) -> Option<Result<Self::Chunk<'a>, Self::Error>> {
        let buffer = self.buffer.as_mut();
        loop {
            match self.reader.read(buffer) {
                Ok(0) => return None,
                Ok(n) => return Some(Ok(&buffer[..n])),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// A `ChunkSource` implementation that wraps a mutable closure (`FnMut`).
pub struct FnMutChunkSource<'s, F, B, E>
where
    F: FnMut() -> Option<Result<B, E>>,
    B: AsRef<[u8]> + 's,
{
    closure: F,
    // Ties the chunk type to `'s` without holding a reference.
    _phantom: core::marker::PhantomData<&'s ()>,
}

impl<'s, F, B, E> FnMutChunkSource<'s, F, B, E>
where
    F: FnMut() -> Option<Result<B, E>>,
    B: AsRef<[u8]> + 's,
{
    /// Creates a new `FnMutChunkSource`.
    pub fn new(closure: F) -> Self {
        FnMutChunkSource {
            closure,
            _phantom: core::marker::PhantomData,
        }
    }
}

impl<'s, F, B, E> ChunkSource for FnMutChunkSource<'s, F, B, E>
where
    F: FnMut() -> Option<Result<B, E>>,
    B: AsRef<[u8]> + 's,
{
    type Error = E;
    type Chunk<'a>
        = B
    where
        Self: 'a;

    fn next_chunk<'a>(&'a mut self) -> Option<Result<Self::Chunk<'a>, Self::Error>> {
        (self.closure)()
    }
}
