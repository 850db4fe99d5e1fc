/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use super::Error;
use syntax::{self, Attr, Key, Value, BEGINDATA, END, MULTILINE_PREFIX, OCTAL_SUFFIX, UTF8_TYPE};

use std::collections::HashMap;
use std::fmt;
use std::io::BufRead;
use std::str;

use tracing::trace;

pub const CLASS_KEY: &'static str = "CKA_CLASS";

pub type LineNumber = usize;

quick_error! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ParseErrorKind {
        MissingBeginData {
            description("BEGINDATA line not found")
            display("BEGINDATA line not found in certdata input")
        }
        UnterminatedMultiline(field: Key) {
            description("unexpected end of input in multiline value")
            display("unexpected end of input in multiline value of {}", field)
        }
        BadOctal(field: Key) {
            description("malformed octal escape")
            display("malformed octal escape in value of {}", field)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Line the error was detected on, counting from 1.
    pub line: LineNumber,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(line: LineNumber, kind: ParseErrorKind) -> Self {
        ParseError {
            line: line,
            kind: kind,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

impl ::std::error::Error for ParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    Data,
    Done,
}

/// Scans the attributes of a `certdata.txt` dump, one per call to `next`.
///
/// After an error has been returned the iterator yields nothing more.
pub struct AttrIter<I: BufRead> {
    src: I,
    line: LineNumber,
    state: State,
}

impl<I: BufRead> AttrIter<I> {
    pub fn new(src: I) -> Self {
        AttrIter {
            src: src,
            line: 0,
            state: State::Preamble,
        }
    }

    /// The number of the last line read.
    pub fn line_number(&self) -> LineNumber {
        self.line
    }

    fn error(&self, kind: ParseErrorKind) -> Error {
        ParseError::new(self.line, kind).into()
    }

    // Lines stay bytes until they turn into values; the preamble, comments
    // and undecoded multiline bodies need not be UTF-8.
    fn next_line(&mut self) -> Result<Option<Vec<u8>>, Error> {
        let mut buf = Vec::new();
        if self.src.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        self.line += 1;
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        Ok(Some(buf))
    }

    fn skip_preamble(&mut self) -> Result<(), Error> {
        while let Some(line) = self.next_line()? {
            if line == BEGINDATA.as_bytes() {
                trace!(line = self.line, "found BEGINDATA");
                return Ok(());
            }
        }
        Err(self.error(ParseErrorKind::MissingBeginData))
    }

    // Feeds each line up to the END marker to `process`.
    fn read_multiline<F>(&mut self, field: &str, mut process: F) -> Result<(), Error>
        where F: FnMut(&[u8]) -> Result<(), ParseErrorKind>
    {
        while let Some(line) = self.next_line()? {
            if line == END.as_bytes() {
                return Ok(());
            }
            if let Err(kind) = process(&line) {
                return Err(self.error(kind));
            }
        }
        Err(self.error(ParseErrorKind::UnterminatedMultiline(field.to_owned())))
    }

    fn read_multiline_octal(&mut self, field: &str) -> Result<Vec<u8>, Error> {
        let mut bytes = Vec::new();
        self.read_multiline(field, |line| {
            match str::from_utf8(line).ok().and_then(syntax::decode_octal_line) {
                Some(decoded) => {
                    bytes.extend_from_slice(&decoded);
                    Ok(())
                }
                None => Err(ParseErrorKind::BadOctal(field.to_owned())),
            }
        })?;
        Ok(bytes)
    }

    fn read_multiline_generic(&mut self, field: &str) -> Result<String, Error> {
        let mut lines = Vec::new();
        self.read_multiline(field, |line| {
            lines.push(String::from_utf8_lossy(line).into_owned());
            Ok(())
        })?;
        Ok(lines.join("\n"))
    }

    fn scan_attr(&mut self) -> Result<Option<Attr>, Error> {
        if self.state == State::Preamble {
            self.skip_preamble()?;
            self.state = State::Data;
        }
        while let Some(raw) = self.next_line()? {
            if raw.is_empty() || raw[0] == b'#' {
                continue;
            }
            let line = String::from_utf8_lossy(&raw);
            let (field, type_tag, inline) = match syntax::split_line(&line) {
                Some(parts) => parts,
                None => {
                    trace!(line = self.line, "skipping line without field and type");
                    continue;
                }
            };
            let value = if type_tag == UTF8_TYPE {
                Value::String(inline.map(syntax::unquote).unwrap_or_default())
            } else if type_tag.starts_with(MULTILINE_PREFIX) {
                if &type_tag[MULTILINE_PREFIX.len()..] == OCTAL_SUFFIX {
                    Value::Binary(self.read_multiline_octal(field)?)
                } else {
                    let text = self.read_multiline_generic(field)?;
                    Value::Multiline(type_tag.to_owned(), text)
                }
            } else {
                Value::Token(type_tag.to_owned(), inline.unwrap_or("").to_owned())
            };
            return Ok(Some((field.to_owned(), value)));
        }
        Ok(None)
    }
}

impl<I: BufRead> Iterator for AttrIter<I> {
    type Item = Result<Attr, Error>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.state == State::Done {
            return None;
        }
        match self.scan_attr() {
            Ok(Some(attr)) => Some(Ok(attr)),
            Ok(None) => {
                self.state = State::Done;
                None
            }
            Err(err) => {
                self.state = State::Done;
                Some(Err(err))
            }
        }
    }
}

pub type RawObject = HashMap<Key, Value>;

/// Groups attributes into objects.  Every `CKA_CLASS` attribute starts a
/// new object; it is held in `pending` until the previous object has been
/// handed out.
pub struct RawObjectIter<I: BufRead> {
    inner: AttrIter<I>,
    pending: Option<Attr>,
    done: bool,
}

impl<I: BufRead> RawObjectIter<I> {
    pub fn new(src: I) -> Self {
        RawObjectIter {
            inner: AttrIter::new(src),
            pending: None,
            done: false,
        }
    }

    pub fn line_number(&self) -> LineNumber {
        self.inner.line_number()
    }

    fn finish<T>(&mut self, res: T) -> T {
        self.done = true;
        res
    }
}

impl<I: BufRead> Iterator for RawObjectIter<I> {
    type Item = Result<RawObject, Error>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut acc = HashMap::new();
        match self.pending.take() {
            Some((key, value)) => {
                acc.insert(key, value);
            }
            None => loop {
                match self.inner.next() {
                    None => return self.finish(None),
                    Some(Err(err)) => return self.finish(Some(Err(err))),
                    Some(Ok((key, value))) => {
                        if key == CLASS_KEY {
                            acc.insert(key, value);
                            break;
                        }
                        trace!(field = %key, "discarding attribute outside of any object");
                    }
                }
            },
        }
        loop {
            match self.inner.next() {
                None => return self.finish(Some(Ok(acc))),
                Some(Err(err)) => return self.finish(Some(Err(err))),
                Some(Ok(attr)) => {
                    if attr.0 == CLASS_KEY {
                        self.pending = Some(attr);
                        return Some(Ok(acc));
                    }
                    acc.insert(attr.0, attr.1);
                }
            }
        }
    }
}
