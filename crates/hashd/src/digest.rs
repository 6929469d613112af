use base64::{Engine as _, prelude::BASE64_STANDARD};
use sha2::{Digest as _, Sha512};

/// Length in characters of every string returned by [`digest`].
///
/// A SHA-512 hash is 64 bytes, which pads out to 88 base64 characters.
pub const DIGEST_LEN: usize = 88;

/// Hashes `input` with SHA-512 and encodes the hash as standard, padded
/// base64.
///
/// This is a pure function: the same input always yields the same output and
/// every input, including an empty one, is accepted.
///
/// # Example
/// ```
/// let encoded = hashd::digest(b"angryMonkey");
/// assert_eq!(
///     encoded,
///     "ZEHhWB65gUlzdVwtDQArEyx+KVLzp/aTaRaPlBzYRIFj6vjFdqEb0Q5B8zVKCZ0vKbZPZklJz0Fd7su2A+gf7Q=="
/// );
/// ```
pub fn digest(input: &[u8]) -> String {
    let hash = Sha512::digest(input);
    BASE64_STANDARD.encode(hash)
}
