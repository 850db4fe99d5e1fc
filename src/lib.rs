/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Extracts the trusted root certificates from NSS's `certdata.txt`.
//!
//! The pipeline is pull-based: `reader::AttrIter` scans attributes,
//! `reader::RawObjectIter` groups them into objects,
//! `structured::resolve_trust` works out what each trust object grants, and
//! `collect::extract_trusted_certs` pairs certificates with their trust by
//! label.  `read_trusted_certs` runs all of it.
//!
//! Format drift (no `BEGINDATA`, broken multiline values, trust codes nobody
//! has heard of) fails the parse.  Individual certificates that are
//! untrusted, distrusted or don't decode are left out without an error.

extern crate hex;
#[macro_use]
extern crate nom;
#[macro_use]
extern crate quick_error;
extern crate sha1;
extern crate tracing;
extern crate x509_parser;

pub mod collect;
pub mod digest;
pub mod reader;
pub mod structured;
pub mod syntax;

pub use collect::{Cert, DecodeError, ParsedCertificate, TrustedCerts};
pub use reader::{ParseError, ParseErrorKind, RawObject};
pub use structured::{TrustError, TrustLevel, TrustMap, Usage};

use std::io;
use std::io::BufRead;

use tracing::debug;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        IOError(err: io::Error) {
            from()
            description("I/O error")
            display("I/O error: {}", err)
            cause(err)
        }
        ParseError(err: ParseError) {
            from()
            description("parse error")
            display("parse error: {}", err)
            cause(err)
        }
        TrustError(err: TrustError) {
            from()
            description("bad trust object")
            display("bad trust object: {}", err)
            cause(err)
        }
    }
}

/// Reads every object of a dump.
pub fn read_objects<I: BufRead>(src: I) -> Result<Vec<RawObject>, Error> {
    reader::RawObjectIter::new(src).collect()
}

/// Runs the whole pipeline over a dump.
pub fn read_trusted<I: BufRead>(src: I) -> Result<TrustedCerts, Error> {
    let objects = read_objects(src)?;
    let trust = structured::resolve_trust(&objects)?;
    let certs = TrustedCerts::from_objects(&objects, &trust);
    debug!(objects = objects.len(), trusted_labels = trust.len(), certs = certs.len(),
           "read certdata");
    Ok(certs)
}

/// The certificates of a dump that are trusted as issuers for some purpose,
/// in dump order.
pub fn read_trusted_certs<I: BufRead>(src: I) -> Result<Vec<Cert>, Error> {
    read_trusted(src).map(TrustedCerts::into_vec)
}
