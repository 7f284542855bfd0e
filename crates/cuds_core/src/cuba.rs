//! The CUBA key enumeration.
//!
//! [`Cuba`] is the closed set of quantities an entity can carry. Each key has:
//!
//! - a stable upper-case name (`"DENSITY"`), used as the column name when the
//!   key is persisted;
//! - a dense index (`0..Cuba::COUNT`), used as the bit position in presence
//!   masks of fixed-schema tables;
//! - a canonical [`ValueType`], the column layout reserved for the key in
//!   fixed-schema tables.
//!
//! The name → key lookup table is built once per process.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::CudsError;
use crate::value::{AttributeValue, ScalarKind, ValueType};

macro_rules! cuba_keys {
    (@ty $kind:ident) => {
        ValueType::scalar(ScalarKind::$kind)
    };
    (@ty $kind:ident $len:literal) => {
        ValueType::vector(ScalarKind::$kind, $len)
    };
    ($( $variant:ident => $name:literal : $kind:ident $( [$len:literal] )? ),+ $(,)?) => {
        /// A CUBA attribute key.
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub enum Cuba {
            $( $variant ),+
        }

        impl Cuba {
            /// Every key, in index order.
            pub const ALL: &'static [Cuba] = &[ $( Cuba::$variant ),+ ];

            /// The persisted upper-case name of this key.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $( Cuba::$variant => $name ),+
                }
            }

            /// The column layout reserved for this key in fixed-schema tables.
            #[must_use]
            pub const fn canonical_type(self) -> ValueType {
                match self {
                    $( Cuba::$variant => cuba_keys!(@ty $kind $( $len )?) ),+
                }
            }
        }
    };
}

cuba_keys! {
    Direction => "DIRECTION": Float64[3],
    Status => "STATUS": Int32,
    Label => "LABEL": Int32,
    MaterialId => "MATERIAL_ID": Int32,
    ChemicalSpecie => "CHEMICAL_SPECIE": Str,
    MaterialType => "MATERIAL_TYPE": Int32,
    ShapeCenter => "SHAPE_CENTER": Float64[3],
    ShapeLength => "SHAPE_LENGTH": Float64[3],
    ShapeRadius => "SHAPE_RADIUS": Float64,
    ShapeSide => "SHAPE_SIDE": Float64,
    CrystalStorage => "CRYSTAL_STORAGE": Str,
    NameUc => "NAME_UC": Str,
    LatticeVectors => "LATTICE_VECTORS": Float64[9],
    Occupancy => "OCCUPANCY": Float64,
    BondLabel => "BOND_LABEL": Str,
    BondType => "BOND_TYPE": Int32,
    Velocity => "VELOCITY": Float64[3],
    Acceleration => "ACCELERATION": Float64[3],
    NumberOfPoints => "NUMBER_OF_POINTS": Int32[3],
    Radius => "RADIUS": Float64,
    Size => "SIZE": Float64[3],
    Mass => "MASS": Float64,
    Volume => "VOLUME": Float64,
    AngularVelocity => "ANGULAR_VELOCITY": Float64[3],
    AngularAcceleration => "ANGULAR_ACCELERATION": Float64[3],
    SimulationDomainDimensions => "SIMULATION_DOMAIN_DIMENSIONS": Float64[3],
    SimulationDomainOrigin => "SIMULATION_DOMAIN_ORIGIN": Float64[3],
    DynamicViscosity => "DYNAMIC_VISCOSITY": Float64,
    KinematicViscosity => "KINEMATIC_VISCOSITY": Float64,
    DiffusionCoefficient => "DIFFUSION_COEFFICIENT": Float64,
    ProbabilityCoefficient => "PROBABILITY_COEFFICIENT": Float64,
    FrictionCoefficient => "FRICTION_COEFFICIENT": Float64,
    ScalingCoefficient => "SCALING_COEFFICIENT": Float64,
    EquationOfStateCoefficient => "EQUATION_OF_STATE_COEFFICIENT": Float64,
    ContactAngle => "CONTACT_ANGLE": Float64,
    Amphiphilicity => "AMPHIPHILICITY": Float64,
    PhaseInteractionStrength => "PHASE_INTERACTION_STRENGTH": Float64,
    HamakerConstant => "HAMAKER_CONSTANT": Float64,
    ZetaPotential => "ZETA_POTENTIAL": Float64,
    IonValenceEffect => "ION_VALENCE_EFFECT": Float64,
    DebyeLength => "DEBYE_LENGTH": Float64,
    SmoothingLength => "SMOOTHING_LENGTH": Float64,
    LatticeSpacing => "LATTICE_SPACING": Float64,
    TimeStep => "TIME_STEP": Float64,
    NumberOfTimeSteps => "NUMBER_OF_TIME_STEPS": Int64,
    Force => "FORCE": Float64[3],
    Torque => "TORQUE": Float64[3],
    Density => "DENSITY": Float64,
    Concentration => "CONCENTRATION": Float64,
    Pressure => "PRESSURE": Float64,
    Temperature => "TEMPERATURE": Float64,
    Distribution => "DISTRIBUTION": Float64[3],
    OrderParameter => "ORDER_PARAMETER": Float64,
    OriginalPosition => "ORIGINAL_POSITION": Float64[3],
    DeltaDisplacement => "DELTA_DISPLACEMENT": Float64[3],
    ExternalAppliedForce => "EXTERNAL_APPLIED_FORCE": Float64[3],
    EulerAngles => "EULER_ANGLES": Float64[3],
    Sphericity => "SPHERICITY": Float64,
    YoungModulus => "YOUNG_MODULUS": Float64,
    PoissonRatio => "POISSON_RATIO": Float64,
    LnOfRestitutionCoefficient => "LN_OF_RESTITUTION_COEFFICIENT": Float64,
    RollingFriction => "ROLLING_FRICTION": Float64,
    VolumeFraction => "VOLUME_FRACTION": Float64,
}

impl Cuba {
    /// Number of keys in the enumeration.
    pub const COUNT: usize = Self::ALL.len();

    /// Dense index of this key, `0..Cuba::COUNT`.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The key at a dense index.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Look a key up by its persisted name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        static BY_NAME: OnceLock<HashMap<&'static str, Cuba>> = OnceLock::new();
        BY_NAME
            .get_or_init(|| Self::ALL.iter().map(|&key| (key.name(), key)).collect())
            .get(name)
            .copied()
    }

    /// Returns `true` if `value` has this key's canonical type.
    #[must_use]
    pub fn accepts(self, value: &AttributeValue) -> bool {
        value.value_type() == self.canonical_type()
    }
}

impl fmt::Display for Cuba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Cuba {
    type Err = CudsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix("CUBA.").unwrap_or(s);
        Self::from_name(name).ok_or_else(|| CudsError::InvalidKey(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_dense() {
        for (i, key) in Cuba::ALL.iter().enumerate() {
            assert_eq!(key.index(), i);
            assert_eq!(Cuba::from_index(i), Some(*key));
        }
        assert_eq!(Cuba::from_index(Cuba::COUNT), None);
    }

    #[test]
    fn test_fits_a_64_bit_mask() {
        assert!(Cuba::COUNT <= 64);
    }

    #[test]
    fn test_name_roundtrip() {
        for &key in Cuba::ALL {
            assert_eq!(Cuba::from_name(key.name()), Some(key));
        }
    }

    #[test]
    fn test_parse_accepts_prefixed_names() {
        assert_eq!("DENSITY".parse::<Cuba>().unwrap(), Cuba::Density);
        assert_eq!("CUBA.VELOCITY".parse::<Cuba>().unwrap(), Cuba::Velocity);
    }

    #[test]
    fn test_parse_rejects_unknown_names() {
        let err = "NAME".parse::<Cuba>().unwrap_err();
        assert_eq!(err, CudsError::InvalidKey("NAME".to_string()));
    }

    #[test]
    fn test_canonical_types() {
        assert_eq!(
            Cuba::Velocity.canonical_type(),
            ValueType::vector(ScalarKind::Float64, 3)
        );
        assert!(Cuba::Label.accepts(&AttributeValue::Int32(3)));
        assert!(!Cuba::Label.accepts(&AttributeValue::Float64(3.0)));
    }

    #[test]
    fn test_key_serialization_roundtrip() {
        let bytes = rmp_serde::to_vec(&Cuba::Temperature).unwrap();
        let restored: Cuba = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(restored, Cuba::Temperature);
    }
}
