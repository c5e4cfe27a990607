//! Referrer entity.
//!
//! Keyed by `(url, ref_id)` on a unique composite index with the url column
//! leading, so the common lookup — just the url — is a prefix query. Case
//! folding is the caller's job: loaders lowercase the url before insert and
//! servers lowercase before lookup; the cache itself never folds case.

use core::cmp::Ordering;

use crate::arena::{AllocError, IpcString};
use crate::segment::Segment;

use super::{IndexSpec, IndexTag, LookupKey, Record};

/// Owned referrer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Referer {
    /// Referrer url, lowercased by the caller.
    pub url: String,
    /// Referrer id.
    pub ref_id: u32,
}

impl Referer {
    /// Convenience constructor.
    pub fn new(url: impl Into<String>, ref_id: u32) -> Self {
        Referer {
            url: url.into(),
            ref_id,
        }
    }
}

/// Indexed fields supplied on insert; `ref_id` is taken from the payload.
#[derive(Clone, Debug)]
pub struct RefererKey {
    /// Referrer url, lowercased by the caller.
    pub url: String,
}

/// Segment-resident referrer record.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct RefererEntity {
    url: IpcString,
    ref_id: u32,
    _pad: u32,
}

fn cmp_url(a: &RefererEntity, b: &RefererEntity, seg: &Segment) -> Ordering {
    seg.str_of(&a.url)
        .cmp(seg.str_of(&b.url))
        .then_with(|| a.ref_id.cmp(&b.ref_id))
}

/// Unique composite index `(url, ref_id)`.
#[derive(Clone, Copy, Debug)]
pub struct ByUrl;

impl IndexTag for ByUrl {
    type Record = RefererEntity;
    const ORDINAL: usize = 0;
}

// SAFETY: #[repr(C)], scalar and IpcString fields only.
unsafe impl Record for RefererEntity {
    type Key = RefererKey;
    type Payload = Referer;

    const INDEXES: &'static [IndexSpec<Self>] = &[IndexSpec {
        name: "url",
        unique: true,
        cmp: cmp_url,
    }];

    fn store(key: &RefererKey, payload: &Referer, segment: &mut Segment) -> Result<Self, AllocError> {
        let url = segment.alloc_str(&key.url)?;
        Ok(RefererEntity {
            url,
            ref_id: payload.ref_id,
            _pad: 0,
        })
    }

    fn retrieve(&self, segment: &Segment) -> Referer {
        Referer {
            url: segment.str_of(&self.url).to_owned(),
            ref_id: self.ref_id,
        }
    }

    fn destroy(&self, segment: &mut Segment) {
        segment.free_str(&self.url);
    }
}

impl LookupKey<ByUrl> for str {
    fn cmp_record(&self, rec: &RefererEntity, seg: &Segment) -> Ordering {
        self.cmp(seg.str_of(&rec.url))
    }
}

impl LookupKey<ByUrl> for String {
    fn cmp_record(&self, rec: &RefererEntity, seg: &Segment) -> Ordering {
        self.as_str().cmp(seg.str_of(&rec.url))
    }
}

impl<'a> LookupKey<ByUrl> for (&'a str, u32) {
    fn cmp_record(&self, rec: &RefererEntity, seg: &Segment) -> Ordering {
        self.0
            .cmp(seg.str_of(&rec.url))
            .then_with(|| self.1.cmp(&rec.ref_id))
    }
}
