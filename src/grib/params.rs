//! Parameter and level tables.
//!
//! Only the subset of the ECMWF tables needed to name the fields the model
//! writes is carried here; anything else gets a synthetic `paramD.C.N` name.

use std::fmt;

/// Vertical coordinate a record is defined on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LevelType {
    /// Ground or water surface.
    Surface,
    /// Mean sea level.
    MeanSea,
    /// Fixed height above ground (2 m, 10 m).
    HeightAboveGround,
    /// Whole atmosphere as a single layer (column integrals).
    EntireAtmosphere,
    /// Soil layer below the land surface.
    DepthBelowLandLayer,
    /// Isobaric surface, level in hPa.
    Isobaric,
    /// Hybrid sigma-pressure model level.
    Hybrid,
    /// Potential vorticity surface.
    PotentialVorticity,
    /// Anything else, by edition and code.
    Other {
        /// GRIB edition the code belongs to.
        edition: u8,
        /// Raw level-type code.
        code: u16,
    },
}

impl LevelType {
    /// Map a GRIB1 `indicatorOfTypeOfLevel`.
    pub fn from_grib1(code: u8) -> Self {
        match code {
            1 => Self::Surface,
            100 => Self::Isobaric,
            102 => Self::MeanSea,
            105 => Self::HeightAboveGround,
            109 => Self::Hybrid,
            112 => Self::DepthBelowLandLayer,
            117 => Self::PotentialVorticity,
            200 => Self::EntireAtmosphere,
            _ => Self::Other {
                edition: 1,
                code: u16::from(code),
            },
        }
    }

    /// Map a GRIB2 `typeOfFirstFixedSurface`.
    pub fn from_grib2(code: u8) -> Self {
        match code {
            1 => Self::Surface,
            8 | 10 => Self::EntireAtmosphere,
            100 => Self::Isobaric,
            101 => Self::MeanSea,
            103 => Self::HeightAboveGround,
            105 => Self::Hybrid,
            106 => Self::DepthBelowLandLayer,
            109 => Self::PotentialVorticity,
            _ => Self::Other {
                edition: 2,
                code: u16::from(code),
            },
        }
    }

    /// Coarse class used to partition streams, if the level type has one.
    pub fn class(self) -> Option<LevelClass> {
        match self {
            Self::Surface
            | Self::MeanSea
            | Self::HeightAboveGround
            | Self::EntireAtmosphere
            | Self::DepthBelowLandLayer => Some(LevelClass::Surface),
            Self::Isobaric => Some(LevelClass::Pressure),
            Self::Hybrid => Some(LevelClass::Model),
            Self::PotentialVorticity => Some(LevelClass::PotentialVorticity),
            Self::Other { .. } => None,
        }
    }

    /// Parse the ecCodes-style `typeOfLevel` name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "surface" => Some(Self::Surface),
            "meanSea" => Some(Self::MeanSea),
            "heightAboveGround" => Some(Self::HeightAboveGround),
            "entireAtmosphere" => Some(Self::EntireAtmosphere),
            "depthBelowLandLayer" => Some(Self::DepthBelowLandLayer),
            "isobaricInhPa" => Some(Self::Isobaric),
            "hybrid" => Some(Self::Hybrid),
            "potentialVorticity" => Some(Self::PotentialVorticity),
            _ => None,
        }
    }
}

impl fmt::Display for LevelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Surface => write!(f, "surface"),
            Self::MeanSea => write!(f, "meanSea"),
            Self::HeightAboveGround => write!(f, "heightAboveGround"),
            Self::EntireAtmosphere => write!(f, "entireAtmosphere"),
            Self::DepthBelowLandLayer => write!(f, "depthBelowLandLayer"),
            Self::Isobaric => write!(f, "isobaricInhPa"),
            Self::Hybrid => write!(f, "hybrid"),
            Self::PotentialVorticity => write!(f, "potentialVorticity"),
            Self::Other { edition, code } => write!(f, "grib{}:{}", edition, code),
        }
    }
}

/// Coarse vertical bucket used when splitting streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LevelClass {
    /// Single-level fields.
    Surface,
    /// Pressure levels.
    Pressure,
    /// Model levels.
    Model,
    /// Potential vorticity levels.
    PotentialVorticity,
}

impl LevelClass {
    /// Short tag used in staging file names.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Surface => "sfc",
            Self::Pressure => "pl",
            Self::Model => "ml",
            Self::PotentialVorticity => "pv",
        }
    }
}

impl fmt::Display for LevelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// ECMWF local table 128 (GRIB1 `table2Version` 128, GRIB2 discipline 192).
fn ecmwf_table_128(number: u8) -> Option<&'static str> {
    let name = match number {
        31 => "ci",
        34 => "sst",
        78 => "tclw",
        79 => "tciw",
        129 => "z",
        130 => "t",
        131 => "u",
        132 => "v",
        133 => "q",
        134 => "sp",
        135 => "w",
        136 => "tcw",
        137 => "tcwv",
        138 => "vo",
        139 => "stl1",
        141 => "sd",
        142 => "lsp",
        143 => "cp",
        144 => "sf",
        146 => "sshf",
        147 => "slhf",
        151 => "msl",
        152 => "lnsp",
        155 => "d",
        157 => "r",
        164 => "tcc",
        165 => "10u",
        166 => "10v",
        167 => "2t",
        168 => "2d",
        169 => "ssrd",
        172 => "lsm",
        175 => "strd",
        176 => "ssr",
        177 => "str",
        186 => "lcc",
        187 => "mcc",
        188 => "hcc",
        228 => "tp",
        235 => "skt",
        246 => "clwc",
        247 => "ciwc",
        248 => "cc",
        _ => return None,
    };
    Some(name)
}

/// Short name of a GRIB1 field.
pub fn grib1_short_name(table_version: u8, parameter: u8) -> String {
    let known = if table_version == 128 {
        ecmwf_table_128(parameter)
    } else {
        None
    };
    known
        .map(str::to_string)
        .unwrap_or_else(|| format!("param{}.{}", table_version, parameter))
}

/// Short name of a GRIB2 field. Near-surface temperature and wind share their
/// parameter codes with the upper-air fields and are told apart by the level.
pub fn grib2_short_name(
    discipline: u8,
    category: u8,
    number: u8,
    level_type: LevelType,
    level: i64,
) -> String {
    let near_surface = |height: i64| level_type == LevelType::HeightAboveGround && level == height;
    let known = match (discipline, category, number) {
        (0, 0, 0) if near_surface(2) => Some("2t"),
        (0, 0, 0) => Some("t"),
        (0, 0, 6) if near_surface(2) => Some("2d"),
        (0, 0, 17) => Some("skt"),
        (0, 1, 0) => Some("q"),
        (0, 1, 8) => Some("tp"),
        (0, 1, 9) => Some("lsp"),
        (0, 1, 10) => Some("cp"),
        (0, 1, 64) => Some("tcwv"),
        (0, 1, 83) => Some("clwc"),
        (0, 1, 84) => Some("ciwc"),
        (0, 2, 2) if near_surface(10) => Some("10u"),
        (0, 2, 2) => Some("u"),
        (0, 2, 3) if near_surface(10) => Some("10v"),
        (0, 2, 3) => Some("v"),
        (0, 2, 8) => Some("w"),
        (0, 2, 12) => Some("vo"),
        (0, 2, 13) => Some("d"),
        (0, 3, 0) => Some("sp"),
        (0, 3, 1) => Some("msl"),
        (0, 3, 4) => Some("z"),
        (0, 3, 5) => Some("gh"),
        (0, 6, 1) => Some("tcc"),
        (0, 6, 32) => Some("cc"),
        (2, 0, 0) => Some("lsm"),
        (10, 2, 0) => Some("ci"),
        (10, 3, 0) => Some("sst"),
        (192, 128, n) => ecmwf_table_128(n),
        _ => None,
    };
    known
        .map(str::to_string)
        .unwrap_or_else(|| format!("param{}.{}.{}", discipline, category, number))
}
