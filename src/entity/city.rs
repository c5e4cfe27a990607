//! City/country geo entity.
//!
//! The one multi-index container in the stack: three declared indices over
//! the same records —
//!
//! 1. non-unique by city,
//! 2. non-unique by country,
//! 3. unique composite `(city, country)`, whose lexicographic ordering also
//!    answers city-prefix queries.
//!
//! Callers lowercase city and country on both the insert and lookup sides.

use core::cmp::Ordering;

use crate::arena::{AllocError, IpcString};
use crate::segment::Segment;

use super::{IndexSpec, IndexTag, LookupKey, Record};

/// Owned city/country geo row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeoCity {
    /// Resolved geo id.
    pub geo_id: u32,
    /// City name, lowercased by the caller.
    pub city: String,
    /// Country name, lowercased by the caller.
    pub country: String,
}

impl GeoCity {
    /// Convenience constructor.
    pub fn new(geo_id: u32, city: impl Into<String>, country: impl Into<String>) -> Self {
        GeoCity {
            geo_id,
            city: city.into(),
            country: country.into(),
        }
    }
}

/// Indexed fields supplied on insert; `geo_id` is taken from the payload.
#[derive(Clone, Debug)]
pub struct CityCountryKey {
    /// City name, lowercased by the caller.
    pub city: String,
    /// Country name, lowercased by the caller.
    pub country: String,
}

/// Segment-resident city/country record.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct CityCountryEntity {
    city: IpcString,
    country: IpcString,
    geo_id: u32,
    _pad: u32,
}

fn cmp_city(a: &CityCountryEntity, b: &CityCountryEntity, seg: &Segment) -> Ordering {
    seg.str_of(&a.city).cmp(seg.str_of(&b.city))
}

fn cmp_country(a: &CityCountryEntity, b: &CityCountryEntity, seg: &Segment) -> Ordering {
    seg.str_of(&a.country).cmp(seg.str_of(&b.country))
}

fn cmp_city_country(a: &CityCountryEntity, b: &CityCountryEntity, seg: &Segment) -> Ordering {
    seg.str_of(&a.city)
        .cmp(seg.str_of(&b.city))
        .then_with(|| seg.str_of(&a.country).cmp(seg.str_of(&b.country)))
}

/// Non-unique index by city.
#[derive(Clone, Copy, Debug)]
pub struct ByCity;

impl IndexTag for ByCity {
    type Record = CityCountryEntity;
    const ORDINAL: usize = 0;
}

/// Non-unique index by country.
#[derive(Clone, Copy, Debug)]
pub struct ByCountry;

impl IndexTag for ByCountry {
    type Record = CityCountryEntity;
    const ORDINAL: usize = 1;
}

/// Unique composite index `(city, country)`.
#[derive(Clone, Copy, Debug)]
pub struct ByCityCountry;

impl IndexTag for ByCityCountry {
    type Record = CityCountryEntity;
    const ORDINAL: usize = 2;
}

// SAFETY: #[repr(C)], scalar and IpcString fields only.
unsafe impl Record for CityCountryEntity {
    type Key = CityCountryKey;
    type Payload = GeoCity;

    const INDEXES: &'static [IndexSpec<Self>] = &[
        IndexSpec {
            name: "city",
            unique: false,
            cmp: cmp_city,
        },
        IndexSpec {
            name: "country",
            unique: false,
            cmp: cmp_country,
        },
        IndexSpec {
            name: "city_country",
            unique: true,
            cmp: cmp_city_country,
        },
    ];

    fn store(
        key: &CityCountryKey,
        payload: &GeoCity,
        segment: &mut Segment,
    ) -> Result<Self, AllocError> {
        let city = segment.alloc_str(&key.city)?;
        let country = match segment.alloc_str(&key.country) {
            Ok(s) => s,
            Err(e) => {
                segment.free_str(&city);
                return Err(e);
            }
        };
        Ok(CityCountryEntity {
            city,
            country,
            geo_id: payload.geo_id,
            _pad: 0,
        })
    }

    fn retrieve(&self, segment: &Segment) -> GeoCity {
        GeoCity {
            geo_id: self.geo_id,
            city: segment.str_of(&self.city).to_owned(),
            country: segment.str_of(&self.country).to_owned(),
        }
    }

    fn destroy(&self, segment: &mut Segment) {
        segment.free_str(&self.city);
        segment.free_str(&self.country);
    }
}

impl LookupKey<ByCity> for str {
    fn cmp_record(&self, rec: &CityCountryEntity, seg: &Segment) -> Ordering {
        self.cmp(seg.str_of(&rec.city))
    }
}

impl LookupKey<ByCity> for String {
    fn cmp_record(&self, rec: &CityCountryEntity, seg: &Segment) -> Ordering {
        self.as_str().cmp(seg.str_of(&rec.city))
    }
}

impl LookupKey<ByCountry> for str {
    fn cmp_record(&self, rec: &CityCountryEntity, seg: &Segment) -> Ordering {
        self.cmp(seg.str_of(&rec.country))
    }
}

impl LookupKey<ByCountry> for String {
    fn cmp_record(&self, rec: &CityCountryEntity, seg: &Segment) -> Ordering {
        self.as_str().cmp(seg.str_of(&rec.country))
    }
}

/// City-only prefix over the composite index.
impl LookupKey<ByCityCountry> for str {
    fn cmp_record(&self, rec: &CityCountryEntity, seg: &Segment) -> Ordering {
        self.cmp(seg.str_of(&rec.city))
    }
}

impl<'a> LookupKey<ByCityCountry> for (&'a str, &'a str) {
    fn cmp_record(&self, rec: &CityCountryEntity, seg: &Segment) -> Ordering {
        self.0
            .cmp(seg.str_of(&rec.city))
            .then_with(|| self.1.cmp(seg.str_of(&rec.country)))
    }
}
