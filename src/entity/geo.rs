//! Geo-to-ad entity: which creatives are eligible for a geo id.
//!
//! Keyed by `(geo_id, ad_id)` on a unique composite index; the serving path
//! looks up by `geo_id` alone to enumerate eligible creatives.

use core::cmp::Ordering;

use crate::arena::{AllocError, IpcString};
use crate::segment::Segment;

use super::{IndexSpec, IndexTag, LookupKey, Record};

/// Owned geo-to-ad mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeoAd {
    /// Geo id the creative is eligible in.
    pub geo_id: u32,
    /// Eligible creative id.
    pub ad_id: String,
}

impl GeoAd {
    /// Convenience constructor.
    pub fn new(geo_id: u32, ad_id: impl Into<String>) -> Self {
        GeoAd {
            geo_id,
            ad_id: ad_id.into(),
        }
    }
}

/// Indexed fields supplied on insert; `ad_id` is taken from the payload.
#[derive(Clone, Copy, Debug)]
pub struct GeoKey {
    /// Geo id.
    pub geo_id: u32,
}

/// Segment-resident mapping record.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct GeoEntity {
    geo_id: u32,
    _pad: u32,
    ad_id: IpcString,
}

fn cmp_geo(a: &GeoEntity, b: &GeoEntity, seg: &Segment) -> Ordering {
    a.geo_id
        .cmp(&b.geo_id)
        .then_with(|| seg.str_of(&a.ad_id).cmp(seg.str_of(&b.ad_id)))
}

/// Unique composite index `(geo_id, ad_id)`.
#[derive(Clone, Copy, Debug)]
pub struct ByGeoId;

impl IndexTag for ByGeoId {
    type Record = GeoEntity;
    const ORDINAL: usize = 0;
}

// SAFETY: #[repr(C)], scalar and IpcString fields only.
unsafe impl Record for GeoEntity {
    type Key = GeoKey;
    type Payload = GeoAd;

    const INDEXES: &'static [IndexSpec<Self>] = &[IndexSpec {
        name: "geo_id",
        unique: true,
        cmp: cmp_geo,
    }];

    fn store(key: &GeoKey, payload: &GeoAd, segment: &mut Segment) -> Result<Self, AllocError> {
        let ad_id = segment.alloc_str(&payload.ad_id)?;
        Ok(GeoEntity {
            geo_id: key.geo_id,
            _pad: 0,
            ad_id,
        })
    }

    fn retrieve(&self, segment: &Segment) -> GeoAd {
        GeoAd {
            geo_id: self.geo_id,
            ad_id: segment.str_of(&self.ad_id).to_owned(),
        }
    }

    fn destroy(&self, segment: &mut Segment) {
        segment.free_str(&self.ad_id);
    }
}

impl LookupKey<ByGeoId> for u32 {
    fn cmp_record(&self, rec: &GeoEntity, _seg: &Segment) -> Ordering {
        self.cmp(&rec.geo_id)
    }
}

impl<'a> LookupKey<ByGeoId> for (u32, &'a str) {
    fn cmp_record(&self, rec: &GeoEntity, seg: &Segment) -> Ordering {
        self.0
            .cmp(&rec.geo_id)
            .then_with(|| self.1.cmp(seg.str_of(&rec.ad_id)))
    }
}
