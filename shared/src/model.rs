use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use crate::ordering::Ordered;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid coordinate: lat={0}, lon={1}")]
    InvalidCoordinate(f64, f64),
    #[error("invalid color {0:?}, expected #RRGGBB")]
    InvalidColor(String),
    #[error("unknown list icon {0:?}")]
    UnknownIcon(String),
    #[error("invalid slug {0:?}")]
    InvalidSlug(String),
    #[error("{0} cannot be empty")]
    Empty(&'static str),
    #[error("list {list} does not belong to trip {trip}")]
    ListOutsideTrip { list: String, trip: String },
    #[error("routing supports at most {max} locations, list has {count}")]
    RoutingLimit { count: usize, max: usize },
    #[error("list {0} is still being created")]
    ListUnconfirmed(String),
}

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Fresh client-side id; the remote store may keep or replace it.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(TripId);
typed_id!(ListId);
typed_id!(LocationId);
typed_id!(UserId);

/// Unix timestamp in milliseconds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    pub fn now() -> Self {
        Self(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        )
    }
}

// --- Coordinates: validated, NaN-safe ---

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LatLon {
    lat: f64,
    lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Result<Self, ValidationError> {
        if !lat.is_finite()
            || !lon.is_finite()
            || !(-90.0..=90.0).contains(&lat)
            || !(-180.0..=180.0).contains(&lon)
        {
            return Err(ValidationError::InvalidCoordinate(lat, lon));
        }
        Ok(Self { lat, lon })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }
}

impl PartialEq for LatLon {
    fn eq(&self, other: &Self) -> bool {
        self.lat.to_bits() == other.lat.to_bits() && self.lon.to_bits() == other.lon.to_bits()
    }
}

impl Eq for LatLon {}

// --- List decoration ---

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HexColor(String);

impl HexColor {
    /// Swatches offered by the list color picker.
    pub const PALETTE: [&'static str; 10] = [
        "#FF6467", "#FDC745", "#05DF72", "#51A2FF", "#C27AFF", "#FF637E", "#FF8904", "#31D492",
        "#42D3F2", "#A684FF",
    ];

    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        let valid = s.len() == 7
            && s.starts_with('#')
            && s[1..].chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(ValidationError::InvalidColor(s));
        }
        Ok(Self(s.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for HexColor {
    fn default() -> Self {
        Self(Self::PALETTE[0].to_string())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListIcon {
    #[default]
    ListOrdered,
    Camera,
    CarFront,
    CircleParking,
    BusFront,
    Ship,
    Utensils,
    ShoppingCart,
    Coffee,
    Wine,
}

impl ListIcon {
    pub const ALL: [ListIcon; 10] = [
        Self::ListOrdered,
        Self::Camera,
        Self::CarFront,
        Self::CircleParking,
        Self::BusFront,
        Self::Ship,
        Self::Utensils,
        Self::ShoppingCart,
        Self::Coffee,
        Self::Wine,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Self::ListOrdered => "list-ordered",
            Self::Camera => "camera",
            Self::CarFront => "car-front",
            Self::CircleParking => "circle-parking",
            Self::BusFront => "bus-front",
            Self::Ship => "ship",
            Self::Utensils => "utensils",
            Self::ShoppingCart => "shopping-cart",
            Self::Coffee => "coffee",
            Self::Wine => "wine",
        }
    }
}

impl FromStr for ListIcon {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|icon| icon.tag() == s)
            .ok_or_else(|| ValidationError::UnknownIcon(s.to_string()))
    }
}

impl fmt::Display for ListIcon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// --- Shareable trip slug ---

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slug(String);

impl Slug {
    const ALPHABET: &'static [u8] =
        b"useandom-26T198340PX75pxJACKVERYMINDBUSHWOLF_GQZbfghjklqvwyzrict";

    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        if s.is_empty() || !s.bytes().all(|b| Self::ALPHABET.contains(&b)) {
            return Err(ValidationError::InvalidSlug(s));
        }
        Ok(Self(s))
    }

    /// Random URL-safe slug. Collisions surface as a failed remote insert.
    pub fn generate(len: usize) -> Self {
        let mut rng = rand::thread_rng();
        let s = (0..len)
            .map(|_| char::from(Self::ALPHABET[rng.gen_range(0..Self::ALPHABET.len())]))
            .collect();
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// --- Field-level patches ---

/// Bitmask of the fields a patch touches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FieldSet(u16);

impl FieldSet {
    pub const EMPTY: Self = Self(0);
    pub const MAX_FIELDS: u8 = 16;

    #[must_use]
    pub const fn with(self, field: u8) -> Self {
        Self(self.0 | (1 << field))
    }

    pub const fn contains(self, field: u8) -> bool {
        self.0 & (1 << field) != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = u8> {
        (0..Self::MAX_FIELDS).filter(move |f| self.contains(*f))
    }
}

impl FromIterator<u8> for FieldSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

pub trait FieldPatch:
    Clone + fmt::Debug + Default + PartialEq + Serialize + Send + Sync + 'static
{
    type Target;

    fn fields(&self) -> FieldSet;

    fn apply_to(&self, target: &mut Self::Target);

    /// The values `target` currently holds for the fields this patch sets.
    fn capture(&self, target: &Self::Target) -> Self;

    #[must_use]
    fn restrict(&self, fields: FieldSet) -> Self;

    /// Fold a newer patch over this one; the newer value wins per field.
    #[must_use]
    fn merge(self, newer: Self) -> Self;

    fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }
}

macro_rules! field_patch {
    (
        $(#[$meta:meta])*
        $patch:ident => $target:ty {
            $($bit:literal => $field:ident : $ty:ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
        pub struct $patch {
            $(
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
        }

        impl $patch {
            $(
                #[must_use]
                pub fn $field(mut self, value: $ty) -> Self {
                    self.$field = Some(value);
                    self
                }
            )*
        }

        impl FieldPatch for $patch {
            type Target = $target;

            fn fields(&self) -> FieldSet {
                let mut set = FieldSet::EMPTY;
                $(
                    if self.$field.is_some() {
                        set = set.with($bit);
                    }
                )*
                set
            }

            fn apply_to(&self, target: &mut $target) {
                $(
                    if let Some(value) = &self.$field {
                        target.$field = value.clone();
                    }
                )*
            }

            fn capture(&self, target: &$target) -> Self {
                Self {
                    $($field: self.$field.as_ref().map(|_| target.$field.clone()),)*
                }
            }

            fn restrict(&self, fields: FieldSet) -> Self {
                Self {
                    $($field: if fields.contains($bit) { self.$field.clone() } else { None },)*
                }
            }

            fn merge(self, newer: Self) -> Self {
                Self {
                    $($field: newer.$field.or(self.$field),)*
                }
            }
        }
    };
}

// --- Entities ---

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Trip,
    List,
    Location,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Trip => "trip",
            Self::List => "list",
            Self::Location => "location",
        })
    }
}

/// How a fetched scope lands in the in-memory collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchMerge {
    /// The fetched records become the whole collection.
    Replace,
    /// Only records of the fetched scope are swapped out.
    ByScope,
}

pub trait Entity: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    type Id: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;
    /// Key a remote `select` is issued for.
    type Scope: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;
    type Patch: FieldPatch<Target = Self>;

    const KIND: EntityKind;
    const FETCH_MERGE: FetchMerge;

    fn id(&self) -> &Self::Id;
    fn set_id(&mut self, id: Self::Id);
    fn scope(&self) -> &Self::Scope;
    fn created_at(&self) -> UnixTimeMs;
    fn set_created_at(&mut self, at: UnixTimeMs);

    /// Take over the fields the remote store is authoritative for. Everything
    /// else stays local so a confirmation never erases a newer edit.
    fn adopt_canonical(&mut self, canonical: &Self) {
        self.set_id(canonical.id().clone());
        self.set_created_at(canonical.created_at());
    }
}

/// An entity ranked by `display_order` among the siblings sharing a parent.
pub trait Ranked: Entity + Ordered<Key = <Self as Entity>::Id> {
    type Parent: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    fn parent(&self) -> &Self::Parent;
    fn order_patch(order: u32) -> Self::Patch;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub user_id: UserId,
    pub title: String,
    pub notes: String,
    pub slug: Slug,
    pub image_url: Option<String>,
    pub center: LatLon,
    pub created_at: UnixTimeMs,
}

field_patch! {
    /// Editable trip fields.
    TripPatch => Trip {
        0 => title: String,
        1 => notes: String,
        2 => image_url: Option<String>,
        3 => center: LatLon,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct List {
    pub id: ListId,
    pub trip_id: TripId,
    pub name: String,
    pub color: HexColor,
    pub icon: ListIcon,
    pub routing: bool,
    pub display_order: u32,
    pub created_at: UnixTimeMs,
}

field_patch! {
    ListPatch => List {
        0 => name: String,
        1 => color: HexColor,
        2 => icon: ListIcon,
        3 => routing: bool,
        4 => display_order: u32,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    /// Denormalized from the owning list for per-trip queries.
    pub trip_id: TripId,
    pub list_id: ListId,
    pub name: String,
    pub address: String,
    pub notes: String,
    pub position: LatLon,
    pub display_order: u32,
    pub created_at: UnixTimeMs,
}

field_patch! {
    LocationPatch => Location {
        0 => notes: String,
        1 => list_id: ListId,
        2 => display_order: u32,
        3 => name: String,
        4 => address: String,
    }
}

impl Entity for Trip {
    type Id = TripId;
    type Scope = UserId;
    type Patch = TripPatch;

    const KIND: EntityKind = EntityKind::Trip;
    const FETCH_MERGE: FetchMerge = FetchMerge::Replace;

    fn id(&self) -> &TripId {
        &self.id
    }
    fn set_id(&mut self, id: TripId) {
        self.id = id;
    }
    fn scope(&self) -> &UserId {
        &self.user_id
    }
    fn created_at(&self) -> UnixTimeMs {
        self.created_at
    }
    fn set_created_at(&mut self, at: UnixTimeMs) {
        self.created_at = at;
    }
}

impl Entity for List {
    type Id = ListId;
    type Scope = TripId;
    type Patch = ListPatch;

    const KIND: EntityKind = EntityKind::List;
    const FETCH_MERGE: FetchMerge = FetchMerge::ByScope;

    fn id(&self) -> &ListId {
        &self.id
    }
    fn set_id(&mut self, id: ListId) {
        self.id = id;
    }
    fn scope(&self) -> &TripId {
        &self.trip_id
    }
    fn created_at(&self) -> UnixTimeMs {
        self.created_at
    }
    fn set_created_at(&mut self, at: UnixTimeMs) {
        self.created_at = at;
    }
}

impl Entity for Location {
    type Id = LocationId;
    type Scope = TripId;
    type Patch = LocationPatch;

    const KIND: EntityKind = EntityKind::Location;
    const FETCH_MERGE: FetchMerge = FetchMerge::ByScope;

    fn id(&self) -> &LocationId {
        &self.id
    }
    fn set_id(&mut self, id: LocationId) {
        self.id = id;
    }
    fn scope(&self) -> &TripId {
        &self.trip_id
    }
    fn created_at(&self) -> UnixTimeMs {
        self.created_at
    }
    fn set_created_at(&mut self, at: UnixTimeMs) {
        self.created_at = at;
    }
}

impl Ordered for List {
    type Key = ListId;

    fn key(&self) -> &ListId {
        &self.id
    }
    fn display_order(&self) -> u32 {
        self.display_order
    }
    fn set_display_order(&mut self, order: u32) {
        self.display_order = order;
    }
}

impl Ranked for List {
    type Parent = TripId;

    fn parent(&self) -> &TripId {
        &self.trip_id
    }
    fn order_patch(order: u32) -> ListPatch {
        ListPatch::default().display_order(order)
    }
}

impl Ordered for Location {
    type Key = LocationId;

    fn key(&self) -> &LocationId {
        &self.id
    }
    fn display_order(&self) -> u32 {
        self.display_order
    }
    fn set_display_order(&mut self, order: u32) {
        self.display_order = order;
    }
}

impl Ranked for Location {
    type Parent = ListId;

    fn parent(&self) -> &ListId {
        &self.list_id
    }
    fn order_patch(order: u32) -> LocationPatch {
        LocationPatch::default().display_order(order)
    }
}

// --- Creation payloads ---

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewTrip {
    pub user_id: UserId,
    pub title: String,
    pub notes: String,
    pub center: LatLon,
}

impl NewTrip {
    pub fn into_trip(self, slug: Slug) -> Trip {
        Trip {
            id: TripId::generate(),
            user_id: self.user_id,
            title: self.title,
            notes: self.notes,
            slug,
            image_url: None,
            center: self.center,
            created_at: UnixTimeMs::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewList {
    pub trip_id: TripId,
    pub name: String,
    pub color: HexColor,
    pub icon: ListIcon,
    pub routing: bool,
}

impl NewList {
    pub fn into_list(self, display_order: u32) -> List {
        List {
            id: ListId::generate(),
            trip_id: self.trip_id,
            name: self.name,
            color: self.color,
            icon: self.icon,
            routing: self.routing,
            display_order,
            created_at: UnixTimeMs::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewLocation {
    pub trip_id: TripId,
    pub list_id: ListId,
    pub name: String,
    pub address: String,
    pub notes: String,
    pub position: LatLon,
}

impl NewLocation {
    pub fn into_location(self, display_order: u32) -> Location {
        Location {
            id: LocationId::generate(),
            trip_id: self.trip_id,
            list_id: self.list_id,
            name: self.name,
            address: self.address,
            notes: self.notes,
            position: self.position,
            display_order,
            created_at: UnixTimeMs::now(),
        }
    }
}
