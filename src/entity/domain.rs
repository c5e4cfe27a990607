//! Domain entity.
//!
//! Keyed by `(name, dom_id)` on a unique composite index; lookups by the
//! host name alone are prefix queries. Callers lowercase the name on both
//! sides, and extract the host from a full url before lookup — the cache
//! never parses urls.

use core::cmp::Ordering;

use crate::arena::{AllocError, IpcString};
use crate::segment::Segment;

use super::{IndexSpec, IndexTag, LookupKey, Record};

/// Owned domain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Domain {
    /// Domain name, lowercased by the caller.
    pub name: String,
    /// Domain id.
    pub dom_id: u32,
}

impl Domain {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, dom_id: u32) -> Self {
        Domain {
            name: name.into(),
            dom_id,
        }
    }
}

/// Indexed fields supplied on insert; `dom_id` is taken from the payload.
#[derive(Clone, Debug)]
pub struct DomainKey {
    /// Domain name, lowercased by the caller.
    pub name: String,
}

/// Segment-resident domain record.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct DomainEntity {
    name: IpcString,
    dom_id: u32,
    _pad: u32,
}

fn cmp_name(a: &DomainEntity, b: &DomainEntity, seg: &Segment) -> Ordering {
    seg.str_of(&a.name)
        .cmp(seg.str_of(&b.name))
        .then_with(|| a.dom_id.cmp(&b.dom_id))
}

/// Unique composite index `(name, dom_id)`.
#[derive(Clone, Copy, Debug)]
pub struct ByName;

impl IndexTag for ByName {
    type Record = DomainEntity;
    const ORDINAL: usize = 0;
}

// SAFETY: #[repr(C)], scalar and IpcString fields only.
unsafe impl Record for DomainEntity {
    type Key = DomainKey;
    type Payload = Domain;

    const INDEXES: &'static [IndexSpec<Self>] = &[IndexSpec {
        name: "name",
        unique: true,
        cmp: cmp_name,
    }];

    fn store(key: &DomainKey, payload: &Domain, segment: &mut Segment) -> Result<Self, AllocError> {
        let name = segment.alloc_str(&key.name)?;
        Ok(DomainEntity {
            name,
            dom_id: payload.dom_id,
            _pad: 0,
        })
    }

    fn retrieve(&self, segment: &Segment) -> Domain {
        Domain {
            name: segment.str_of(&self.name).to_owned(),
            dom_id: self.dom_id,
        }
    }

    fn destroy(&self, segment: &mut Segment) {
        segment.free_str(&self.name);
    }
}

impl LookupKey<ByName> for str {
    fn cmp_record(&self, rec: &DomainEntity, seg: &Segment) -> Ordering {
        self.cmp(seg.str_of(&rec.name))
    }
}

impl LookupKey<ByName> for String {
    fn cmp_record(&self, rec: &DomainEntity, seg: &Segment) -> Ordering {
        self.as_str().cmp(seg.str_of(&rec.name))
    }
}

impl<'a> LookupKey<ByName> for (&'a str, u32) {
    fn cmp_record(&self, rec: &DomainEntity, seg: &Segment) -> Ordering {
        self.0
            .cmp(seg.str_of(&rec.name))
            .then_with(|| self.1.cmp(&rec.dom_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_retrieve_roundtrip() {
        let mut seg = Segment::from_heap(vec![0; 8 * 1024]);
        seg.ensure_initialized();
        let domain = Domain::new("adnetwork.example", 99);
        let key = DomainKey {
            name: domain.name.clone(),
        };
        let rec = DomainEntity::store(&key, &domain, &mut seg).unwrap();
        assert_eq!(rec.retrieve(&seg), domain);
        rec.destroy(&mut seg);
    }
}
