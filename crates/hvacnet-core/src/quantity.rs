//! # Quantities
//!
//! A physical attribute value with its dimension carried in the type:
//! lengths are `uom` lengths, powers are `uom` powers and so on. The
//! engine works in SI values; unit tags exist only in the network document
//! and are resolved there by `Quantity::parse`.

use serde::{Deserialize, Serialize};
use std::fmt;
use uom::si::area::{square_meter, square_millimeter};
use uom::si::f64::{Area, Length, MassRate, Power, ThermodynamicTemperature, VolumeRate};
use uom::si::length::{meter, millimeter};
use uom::si::mass_rate::kilogram_per_second;
use uom::si::power::{kilowatt, watt};
use uom::si::thermodynamic_temperature::{degree_celsius, kelvin};
use uom::si::volume_rate::{cubic_meter_per_hour, cubic_meter_per_second, liter_per_second};

/// Physical dimension of a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Length,
    Area,
    Power,
    VolumeRate,
    MassRate,
    Temperature,
}

impl Dimension {
    /// Unit tag of the SI base unit, used when writing documents.
    #[must_use]
    pub fn si_symbol(self) -> &'static str {
        match self {
            Self::Length => "m",
            Self::Area => "m2",
            Self::Power => "W",
            Self::VolumeRate => "m3/s",
            Self::MassRate => "kg/s",
            Self::Temperature => "K",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Length => "length",
            Self::Area => "area",
            Self::Power => "power",
            Self::VolumeRate => "volume rate",
            Self::MassRate => "mass rate",
            Self::Temperature => "temperature",
        };
        f.write_str(name)
    }
}

/// A dimensioned attribute value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Quantity {
    Length(Length),
    Area(Area),
    Power(Power),
    VolumeRate(VolumeRate),
    MassRate(MassRate),
    Temperature(ThermodynamicTemperature),
}

impl Quantity {
    #[must_use]
    pub fn mm(value: f64) -> Self {
        Self::Length(Length::new::<millimeter>(value))
    }

    #[must_use]
    pub fn square_meter(value: f64) -> Self {
        Self::Area(Area::new::<square_meter>(value))
    }

    #[must_use]
    pub fn watt(value: f64) -> Self {
        Self::Power(Power::new::<watt>(value))
    }

    #[must_use]
    pub fn celsius(value: f64) -> Self {
        Self::Temperature(ThermodynamicTemperature::new::<degree_celsius>(value))
    }

    /// Resolve a document unit tag.
    ///
    /// Returns `None` for unknown tags.
    #[must_use]
    pub fn parse(value: f64, unit: &str) -> Option<Self> {
        let quantity = match unit {
            "mm" => Self::mm(value),
            "m" => Self::Length(Length::new::<meter>(value)),
            "mm2" => Self::Area(Area::new::<square_millimeter>(value)),
            "m2" => Self::square_meter(value),
            "W" => Self::watt(value),
            "kW" => Self::Power(Power::new::<kilowatt>(value)),
            "m3/s" => Self::VolumeRate(VolumeRate::new::<cubic_meter_per_second>(value)),
            "l/s" => Self::VolumeRate(VolumeRate::new::<liter_per_second>(value)),
            "m3/h" => Self::VolumeRate(VolumeRate::new::<cubic_meter_per_hour>(value)),
            "kg/s" => Self::MassRate(MassRate::new::<kilogram_per_second>(value)),
            "K" => Self::Temperature(ThermodynamicTemperature::new::<kelvin>(value)),
            "degC" => Self::celsius(value),
            _ => return None,
        };
        Some(quantity)
    }

    /// Rebuild a quantity of `dimension` from its SI value.
    #[must_use]
    pub fn from_si(dimension: Dimension, value: f64) -> Self {
        match dimension {
            Dimension::Length => Self::Length(Length::new::<meter>(value)),
            Dimension::Area => Self::square_meter(value),
            Dimension::Power => Self::watt(value),
            Dimension::VolumeRate => {
                Self::VolumeRate(VolumeRate::new::<cubic_meter_per_second>(value))
            }
            Dimension::MassRate => Self::MassRate(MassRate::new::<kilogram_per_second>(value)),
            Dimension::Temperature => {
                Self::Temperature(ThermodynamicTemperature::new::<kelvin>(value))
            }
        }
    }

    /// Value in the SI base unit of its dimension.
    #[must_use]
    pub fn si_value(self) -> f64 {
        match self {
            Self::Length(q) => q.get::<meter>(),
            Self::Area(q) => q.get::<square_meter>(),
            Self::Power(q) => q.get::<watt>(),
            Self::VolumeRate(q) => q.get::<cubic_meter_per_second>(),
            Self::MassRate(q) => q.get::<kilogram_per_second>(),
            Self::Temperature(q) => q.get::<kelvin>(),
        }
    }

    #[must_use]
    pub fn dimension(self) -> Dimension {
        match self {
            Self::Length(_) => Dimension::Length,
            Self::Area(_) => Dimension::Area,
            Self::Power(_) => Dimension::Power,
            Self::VolumeRate(_) => Dimension::VolumeRate,
            Self::MassRate(_) => Dimension::MassRate,
            Self::Temperature(_) => Dimension::Temperature,
        }
    }

    #[must_use]
    pub fn length(self) -> Option<Length> {
        match self {
            Self::Length(q) => Some(q),
            _ => None,
        }
    }

    #[must_use]
    pub fn area(self) -> Option<Area> {
        match self {
            Self::Area(q) => Some(q),
            _ => None,
        }
    }
}

impl From<Length> for Quantity {
    fn from(q: Length) -> Self {
        Self::Length(q)
    }
}

impl From<Area> for Quantity {
    fn from(q: Area) -> Self {
        Self::Area(q)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.si_value(), self.dimension().si_symbol())
    }
}
