/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Hashing the input on its way into the parser, so generated output can
//! say which dump it came from.

use std::io::{self, BufReader, Read};

use hex;
use sha1::{Digest, Sha1};

use collect::TrustedCerts;
use {read_trusted, Error};

/// Passes reads through, feeding every byte read into a digest.
pub struct HashReader<R, D> {
    inner: R,
    digest: D,
}

impl<R: Read, D: Digest> HashReader<R, D> {
    pub fn new(inner: R, digest: D) -> Self {
        HashReader {
            inner: inner,
            digest: digest,
        }
    }

    /// Hex digest of everything read so far.
    pub fn finish_hex(self) -> String {
        hex::encode(self.digest.finalize())
    }
}

impl<R: Read, D: Digest> Read for HashReader<R, D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.digest.update(&buf[..n]);
        Ok(n)
    }
}

/// Like `read_trusted_certs`, also returning the SHA-1 of the input.
///
/// Everything up to the end of the input is read, so the hash covers the
/// whole dump.
pub fn read_trusted_certs_with_sha1<R: Read>(src: R) -> Result<(TrustedCerts, String), Error> {
    let mut buffered = BufReader::new(HashReader::new(src, Sha1::new()));
    let certs = read_trusted(&mut buffered)?;
    Ok((certs, buffered.into_inner().finish_hex()))
}
