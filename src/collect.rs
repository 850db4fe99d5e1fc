/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::ops::Deref;

use hex;
use tracing::{debug, trace};
use x509_parser::error::X509Error;
use x509_parser::nom;
use x509_parser::parse_x509_certificate;

use reader::RawObject;
use structured::{self, Blob, ObjClass, TrustLevel, TrustMap, Usage};

pub const VALUE_KEY: &'static str = "CKA_VALUE";

quick_error! {
    #[derive(Debug)]
    pub enum DecodeError {
        Truncated {
            description("certificate is truncated")
            display("certificate is truncated")
        }
        TrailingBytes(count: usize) {
            description("trailing bytes after certificate")
            display("{} trailing bytes after certificate", count)
        }
        X509(err: X509Error) {
            from()
            description("malformed certificate")
            display("malformed certificate: {}", err)
        }
    }
}

/// The parts of a decoded X.509 certificate worth keeping around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCertificate {
    /// X.509 version as encoded, so 2 for a v3 certificate.
    pub version: u32,
    pub serial: Blob,
    pub subject: String,
    pub issuer: String,
    pub issuer_organization: Option<String>,
    /// Validity bounds in seconds since the Unix epoch.
    pub not_before: i64,
    pub not_after: i64,
}

impl ParsedCertificate {
    /// Decodes a DER certificate.  Trailing bytes after the certificate
    /// count as a failure.
    pub fn from_der(der: &[u8]) -> Result<ParsedCertificate, DecodeError> {
        let cert = match parse_x509_certificate(der) {
            Ok((rest, _)) if !rest.is_empty() => {
                return Err(DecodeError::TrailingBytes(rest.len()));
            }
            Ok((_, cert)) => cert,
            Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => return Err(err.into()),
            Err(nom::Err::Incomplete(_)) => return Err(DecodeError::Truncated),
        };
        let issuer_organization = cert.issuer()
            .iter_organization()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .map(str::to_owned);
        Ok(ParsedCertificate {
            version: cert.version().0,
            serial: Blob::new(cert.raw_serial().to_vec()),
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            issuer_organization: issuer_organization,
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
        })
    }
}

/// A certificate from the dump that is trusted for at least one purpose.
#[derive(Debug, Clone)]
pub struct Cert {
    pub label: String,
    pub der: Blob,
    pub parsed: ParsedCertificate,
    pub trust: TrustLevel,
}

impl Cert {
    /// The raw serial number as colon-separated hex, as `certdata.txt`
    /// comments print it.
    pub fn serial_hex(&self) -> String {
        self.parsed.serial.chunks(1)
            .map(hex::encode)
            .collect::<Vec<_>>()
            .join(":")
    }
}

/// Joins certificate objects with the trust map, keeping input order.
///
/// Certificates are skipped, not reported, when their label has no entry
/// in `trust` or their value does not decode.  Some certificates in the
/// upstream data (negative serial numbers, for one) are known to trip up
/// X.509 decoders, and one of them must not take the rest down with it.
pub fn extract_trusted_certs(objects: &[RawObject], trust: &TrustMap) -> Vec<Cert> {
    let mut certs = Vec::new();
    for obj in objects {
        if ObjClass::of(obj) != ObjClass::Certificate {
            continue;
        }
        let label = match structured::label(obj) {
            Some(label) => label,
            None => {
                debug!("skipping certificate without a label");
                continue;
            }
        };
        let level = match trust.get(label) {
            Some(level) => *level,
            None => {
                debug!(label = label, "skipping certificate without trust");
                continue;
            }
        };
        let der = match obj.get(VALUE_KEY).and_then(|v| v.as_bytes()) {
            Some(der) => der,
            None => {
                debug!(label = label, "skipping certificate without a binary value");
                continue;
            }
        };
        let parsed = match ParsedCertificate::from_der(der) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(label = label, error = %err,
                       "skipping certificate that does not decode");
                continue;
            }
        };
        trace!(label = label, trust = %level, "trusted certificate");
        certs.push(Cert {
            label: label.to_owned(),
            der: Blob::new(der.to_vec()),
            parsed: parsed,
            trust: level,
        });
    }
    certs
}

/// The trusted certificates of one dump, in dump order.
#[derive(Debug, Clone)]
pub struct TrustedCerts {
    certs: Box<[Cert]>,
}

impl TrustedCerts {
    pub fn from_objects(objects: &[RawObject], trust: &TrustMap) -> Self {
        TrustedCerts {
            certs: extract_trusted_certs(objects, trust).into_boxed_slice(),
        }
    }

    pub fn certs(&self) -> &[Cert] {
        &self.certs
    }

    pub fn into_vec(self) -> Vec<Cert> {
        self.certs.into_vec()
    }

    /// Certificates trusted for at least every purpose in `level`.
    pub fn by_trust(&self, level: TrustLevel) -> Vec<&Cert> {
        self.certs.iter().filter(|cert| cert.trust.contains(level)).collect()
    }

    pub fn trusted_for(&self, usage: Usage) -> Vec<&Cert> {
        self.by_trust(TrustLevel::from(usage))
    }
}

impl Deref for TrustedCerts {
    type Target = [Cert];
    fn deref(&self) -> &[Cert] {
        &self.certs
    }
}

impl From<Vec<Cert>> for TrustedCerts {
    fn from(certs: Vec<Cert>) -> Self {
        TrustedCerts { certs: certs.into_boxed_slice() }
    }
}
