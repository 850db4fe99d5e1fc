/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::result;

use tracing::debug;

use reader::{RawObject, CLASS_KEY};

pub const LABEL_KEY: &'static str = "CKA_LABEL";
pub const SERVER_AUTH_KEY: &'static str = "CKA_TRUST_SERVER_AUTH";
pub const EMAIL_PROTECTION_KEY: &'static str = "CKA_TRUST_EMAIL_PROTECTION";
pub const CODE_SIGNING_KEY: &'static str = "CKA_TRUST_CODE_SIGNING";

// This is basically just to have a custom Debug impl that adds an &.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Blob(Vec<u8>);

impl Blob {
    pub fn new(bytes: Vec<u8>) -> Self {
        Blob(bytes)
    }
}

impl Deref for Blob {
    type Target = Vec<u8>;
    fn deref(&self) -> &Vec<u8> {
        &self.0
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        // This ignores the provided "alternate" flag; printing one
        // `u8` per line for a blob that might be several kB, which is
        // what `{:#?}` would do here, is not an improvement in human
        // readability.
        write!(fmt, "&{:?}", self.0)
    }
}

/// One entry of the closed `CK_TRUST` vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrustCode {
    Distrust,
    MustVerify,
    TrustedDelegator,
}

impl TrustCode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "CKT_NSS_NOT_TRUSTED" => Some(TrustCode::Distrust),
            "CKT_NSS_MUST_VERIFY_TRUST" => Some(TrustCode::MustVerify),
            "CKT_NSS_TRUSTED_DELEGATOR" => Some(TrustCode::TrustedDelegator),
            _ => None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    TlsServer,
    Email,
    CodeSigning,
}

/// The purposes a certificate may issue for.  No bits set means no trust.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TrustLevel {
    pub server: bool,
    pub email: bool,
    pub code_signing: bool,
}

impl TrustLevel {
    pub fn is_empty(&self) -> bool {
        !(self.server || self.email || self.code_signing)
    }

    pub fn is_trusted_for(&self, usage: Usage) -> bool {
        match usage {
            Usage::TlsServer => self.server,
            Usage::Email => self.email,
            Usage::CodeSigning => self.code_signing,
        }
    }

    /// True if every purpose set in `other` is also set here.
    pub fn contains(&self, other: TrustLevel) -> bool {
        (self.server || !other.server) &&
            (self.email || !other.email) &&
            (self.code_signing || !other.code_signing)
    }
}

impl From<Usage> for TrustLevel {
    fn from(usage: Usage) -> Self {
        TrustLevel {
            server: usage == Usage::TlsServer,
            email: usage == Usage::Email,
            code_signing: usage == Usage::CodeSigning,
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names = [(self.server, "server"),
                     (self.email, "email"),
                     (self.code_signing, "code_signing")];
        let set: Vec<&str> = names.iter().filter(|n| n.0).map(|n| n.1).collect();
        if set.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&set.join("+"))
        }
    }
}

quick_error!{
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum TrustError {
        MissingKey(key: &'static str, label: Option<String>) {
            description("missing key in trust object")
            display("trust object {:?} has no {}", label, key)
        }
        UnknownTrustCode(key: &'static str, got: String) {
            description("unknown trust level")
            display("unknown trust level {:?} referenced by {}", got, key)
        }
        ConflictingTrust(label: String) {
            description("conflicting trust declarations")
            display("conflicting trust declarations for {:?}", label)
        }
    }
}

pub type Result<T> = result::Result<T, TrustError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjClass {
    Certificate,
    Trust,
    Other,
}

impl ObjClass {
    pub fn of(obj: &RawObject) -> ObjClass {
        match obj.get(CLASS_KEY).and_then(|v| v.as_text()) {
            Some("CKO_CERTIFICATE") => ObjClass::Certificate,
            Some("CKO_NSS_TRUST") => ObjClass::Trust,
            // CKO_NSS_BUILTIN_ROOT_LIST, and anything else nobody asked about.
            _ => ObjClass::Other,
        }
    }
}

pub fn label(obj: &RawObject) -> Option<&str> {
    obj.get(LABEL_KEY).and_then(|v| v.as_text())
}

fn take_trust_code(obj: &RawObject, key: &'static str) -> Result<TrustCode> {
    match obj.get(key) {
        None => Err(TrustError::MissingKey(key, label(obj).map(str::to_owned))),
        Some(val) => {
            let got = val.as_text().unwrap_or_else(|| val.get_type());
            TrustCode::from_str(got)
                .ok_or_else(|| TrustError::UnknownTrustCode(key, got.to_owned()))
        }
    }
}

/// Reads one trust object.  `None` means the object grants nothing: either
/// some purpose is explicitly distrusted, which vetoes the whole
/// declaration, or no purpose is a trusted delegator.
pub fn trust_level(obj: &RawObject) -> Result<Option<TrustLevel>> {
    let server = take_trust_code(obj, SERVER_AUTH_KEY)?;
    let email = take_trust_code(obj, EMAIL_PROTECTION_KEY)?;
    let code_signing = take_trust_code(obj, CODE_SIGNING_KEY)?;
    let codes = [server, email, code_signing];
    if codes.contains(&TrustCode::Distrust) {
        return Ok(None);
    }
    let level = TrustLevel {
        server: server == TrustCode::TrustedDelegator,
        email: email == TrustCode::TrustedDelegator,
        code_signing: code_signing == TrustCode::TrustedDelegator,
    };
    Ok(if level.is_empty() { None } else { Some(level) })
}

pub type TrustMap = HashMap<String, TrustLevel>;

/// Maps each label to the purposes its trust object grants.
///
/// Labels whose trust object grants nothing are left out.  A label may be
/// declared more than once only if every declaration comes to the same
/// result.
pub fn resolve_trust(objects: &[RawObject]) -> Result<TrustMap> {
    let mut seen: HashMap<&str, Option<TrustLevel>> = HashMap::new();
    for obj in objects {
        if ObjClass::of(obj) != ObjClass::Trust {
            continue;
        }
        let name = match label(obj) {
            Some(name) => name,
            None => return Err(TrustError::MissingKey(LABEL_KEY, None)),
        };
        let level = trust_level(obj)?;
        if level.is_none() {
            debug!(label = name, "trust object grants no purpose");
        }
        if let Some(previous) = seen.insert(name, level) {
            if previous != level {
                return Err(TrustError::ConflictingTrust(name.to_owned()));
            }
        }
    }
    Ok(seen.into_iter()
        .filter_map(|(name, level)| level.map(|level| (name.to_owned(), level)))
        .collect())
}
