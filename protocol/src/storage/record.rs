//! Grade records — the payload of every block.
//!
//! A record is created by the caller without an identifier; the chain
//! assigns a UUID v4 the first time the record is appended. Once a record is
//! inside a mined block it is never modified again, and its identifier is
//! what the resolver uses to tell "already merged" from "new".

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{GENESIS_LABEL, GENESIS_RECORD_BOOK};
use crate::crypto::hash::sha256_hex;

/// A single student-grade entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Assigned on first append. `None` only for records that never went
    /// through `Chain::append` (the genesis record, caller-built drafts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub full_name: String,
    /// Record-book (gradebook) number.
    pub record_book: String,
    pub group: String,
    pub subject: String,
    pub course: u32,
    /// Expected range is 2–5. Not enforced.
    pub grade: u8,
    /// Mandatory from the soft fork on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructor: Option<String>,
}

impl Record {
    /// Build a record without identifier or instructor.
    pub fn new(
        full_name: impl Into<String>,
        record_book: impl Into<String>,
        group: impl Into<String>,
        subject: impl Into<String>,
        course: u32,
        grade: u8,
    ) -> Self {
        Self {
            id: None,
            full_name: full_name.into(),
            record_book: record_book.into(),
            group: group.into(),
            subject: subject.into(),
            course,
            grade,
            instructor: None,
        }
    }

    /// Attach an instructor name.
    pub fn with_instructor(mut self, instructor: impl Into<String>) -> Self {
        self.instructor = Some(instructor.into());
        self
    }

    /// Attach a fixed identifier (used when replaying records between chains).
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    /// The placeholder record carried by every genesis block.
    pub fn genesis() -> Self {
        Self::new(
            GENESIS_LABEL,
            GENESIS_RECORD_BOOK,
            GENESIS_LABEL,
            GENESIS_LABEL,
            0,
            0,
        )
    }

    /// Assign a fresh identifier if the record has none. Returns the id.
    pub fn ensure_id(&mut self) -> Uuid {
        *self.id.get_or_insert_with(Uuid::new_v4)
    }

    /// `true` if an instructor is present and not blank.
    pub fn has_instructor(&self) -> bool {
        self.instructor
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty())
    }

    /// Case-insensitive substring match over the searchable text fields.
    ///
    /// `needle` must already be lowercased.
    pub fn matches_keyword(&self, needle: &str) -> bool {
        [
            self.full_name.as_str(),
            self.record_book.as_str(),
            self.group.as_str(),
            self.subject.as_str(),
            self.instructor.as_deref().unwrap_or(""),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
    }

    /// Append the canonical byte encoding of this record to `buf`.
    ///
    /// Strings are length-prefixed and integers are little-endian, so two
    /// different records can never share an encoding.
    pub fn write_canonical(&self, buf: &mut Vec<u8>) {
        match self.id {
            Some(id) => {
                buf.push(1);
                buf.extend_from_slice(id.as_bytes());
            }
            None => buf.push(0),
        }
        put_str(buf, &self.full_name);
        put_str(buf, &self.record_book);
        put_str(buf, &self.group);
        put_str(buf, &self.subject);
        buf.extend_from_slice(&self.course.to_le_bytes());
        buf.push(self.grade);
        match &self.instructor {
            Some(name) => {
                buf.push(1);
                put_str(buf, name);
            }
            None => buf.push(0),
        }
    }

    /// SHA-256 leaf hash of this record, as used by the Merkle tree.
    pub fn leaf_hash(&self) -> String {
        let mut buf = Vec::with_capacity(128);
        self.write_canonical(&mut buf);
        sha256_hex(&buf)
    }
}

/// Length-prefixed (u32 LE) string encoding.
pub(crate) fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}
