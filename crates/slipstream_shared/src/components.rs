//! # Game Components
//!
//! Every networked component and its wire layout. Field order on the wire
//! is declaration order; all numbers are little-endian.
//!
//! | component     | layout                                            |
//! |---------------|---------------------------------------------------|
//! | `Position`    | 3 x f32                                           |
//! | `Rotation`    | 4 x f32 (x, y, z, w)                              |
//! | `Velocity`    | 3 x f32                                           |
//! | `CarBody`     | u32 model hash, u32 len + UTF-8 color, f32 mass   |
//! | `RocketMotor` | f32 fuel, f32 thrust                              |
//! | `ChunkData`   | 3 x i32 coord, u32 count + count x f32 heights    |
//!
//! `VisualState` is client-only and never crosses the wire.

use serde::{Deserialize, Serialize};
use slipstream_core::Component;
use slipstream_net::{ComponentRegistry, NetComponent, ProtocolResult, SymbolEnum, WireReader, WireWriter};

use crate::math::{Quaternion, Vec3};

/// World-space position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(pub Vec3);

impl Component for Position {}

impl NetComponent for Position {
    const NAME: &'static str = "Position";

    fn encode(&self, writer: &mut WireWriter) {
        self.0.encode(writer);
    }

    fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Vec3::decode(reader).map(Self)
    }
}

/// Orientation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rotation(pub Quaternion);

impl Component for Rotation {}

impl NetComponent for Rotation {
    const NAME: &'static str = "Rotation";

    fn encode(&self, writer: &mut WireWriter) {
        self.0.encode(writer);
    }

    fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Quaternion::decode(reader).map(Self)
    }
}

/// Linear velocity in units per second.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Velocity(pub Vec3);

impl Component for Velocity {}

impl NetComponent for Velocity {
    const NAME: &'static str = "Velocity";

    fn encode(&self, writer: &mut WireWriter) {
        self.0.encode(writer);
    }

    fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Vec3::decode(reader).map(Self)
    }
}

/// Car chassis model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CarModel {
    /// Light two-seater.
    #[default]
    Roadster,
    /// Rally hatchback.
    Rally,
    /// Heavy pickup.
    Truck,
}

impl SymbolEnum for CarModel {
    const ENUM_NAME: &'static str = "CarModel";
    const VARIANTS: &'static [Self] = &[Self::Roadster, Self::Rally, Self::Truck];

    fn symbol(self) -> &'static str {
        match self {
            Self::Roadster => "ROADSTER",
            Self::Rally => "RALLY",
            Self::Truck => "TRUCK",
        }
    }
}

/// Static description of a car. Sent on creation only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CarBody {
    /// Chassis model.
    pub model: CarModel,
    /// Paint color name.
    pub color: String,
    /// Mass in kilograms.
    pub mass: f32,
}

impl Default for CarBody {
    fn default() -> Self {
        Self {
            model: CarModel::Roadster,
            color: "white".to_owned(),
            mass: 1000.0,
        }
    }
}

impl Component for CarBody {}

impl NetComponent for CarBody {
    const NAME: &'static str = "CarBody";

    fn encode(&self, writer: &mut WireWriter) {
        writer.write_symbol(self.model);
        writer.write_str(&self.color);
        writer.write_f32(self.mass);
    }

    fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            model: reader.read_symbol()?,
            color: reader.read_string()?,
            mass: reader.read_f32()?,
        })
    }
}

/// Rocket propulsion state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RocketMotor {
    /// Seconds of burn left.
    pub fuel: f32,
    /// Acceleration while burning.
    pub thrust: f32,
}

impl RocketMotor {
    /// True once the fuel is gone.
    #[must_use]
    pub fn is_spent(&self) -> bool {
        self.fuel <= 0.0
    }
}

impl Component for RocketMotor {}

impl NetComponent for RocketMotor {
    const NAME: &'static str = "RocketMotor";

    fn encode(&self, writer: &mut WireWriter) {
        writer.write_f32(self.fuel);
        writer.write_f32(self.thrust);
    }

    fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            fuel: reader.read_f32()?,
            thrust: reader.read_f32()?,
        })
    }
}

/// Terrain heightfield for one chunk.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkData {
    /// Chunk grid coordinate.
    pub coord: [i32; 3],
    /// Row-major height samples.
    pub heights: Vec<f32>,
}

impl Component for ChunkData {}

impl NetComponent for ChunkData {
    const NAME: &'static str = "ChunkData";

    fn encode(&self, writer: &mut WireWriter) {
        for c in self.coord {
            writer.write_i32(c);
        }
        writer.write_f32_list(&self.heights);
    }

    fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            coord: [reader.read_i32()?, reader.read_i32()?, reader.read_i32()?],
            heights: reader.read_f32_list()?,
        })
    }
}

/// Client-side presentation state. Never replicated.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VisualState {
    /// Position the mirror had last frame.
    pub last_position: Vec3,
    /// Seconds since the mirror last moved.
    pub since_moved: f32,
    /// Draw an outline (the locally driven car).
    pub highlighted: bool,
}

impl Component for VisualState {}

/// Registry of every networked game component.
#[must_use]
pub fn game_components() -> ComponentRegistry {
    ComponentRegistry::new()
        .with::<Position>()
        .with::<Rotation>()
        .with::<Velocity>()
        .with::<CarBody>()
        .with::<RocketMotor>()
        .with::<ChunkData>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use slipstream_core::symbol_hash;
    use slipstream_net::{component_hash, ProtocolError};

    #[test]
    fn test_car_body_layout() {
        let body = CarBody {
            model: CarModel::Rally,
            color: "teal".to_owned(),
            mass: 1250.0,
        };
        let mut writer = WireWriter::new();
        body.encode(&mut writer);

        let bytes = writer.as_slice();
        assert_eq!(bytes.len(), 4 + 4 + 4 + 4);
        assert_eq!(&bytes[..4], &symbol_hash("RALLY").to_le_bytes());
        assert_eq!(&bytes[8..12], b"teal");

        let mut reader = WireReader::new(bytes);
        assert_eq!(CarBody::decode(&mut reader), Ok(body));
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn test_chunk_heights_travel_as_float_list() {
        let chunk = ChunkData {
            coord: [-1, 0, 4],
            heights: vec![0.0, 0.5, 1.0, 1.5],
        };
        let mut writer = WireWriter::new();
        chunk.encode(&mut writer);
        assert_eq!(writer.len(), 12 + 4 + 16);

        let mut reader = WireReader::new(writer.as_slice());
        assert_eq!(ChunkData::decode(&mut reader), Ok(chunk));
    }

    #[test]
    fn test_unknown_car_model_is_rejected() {
        let mut writer = WireWriter::new();
        writer.write_u32(symbol_hash("HOVERCRAFT"));
        writer.write_str("red");
        writer.write_f32(1.0);

        let mut reader = WireReader::new(writer.as_slice());
        assert!(matches!(
            CarBody::decode(&mut reader),
            Err(ProtocolError::UnknownVariant { enum_name: "CarModel", .. })
        ));
    }

    #[test]
    fn test_game_components_registered() {
        let components = game_components();
        assert_eq!(components.len(), 6);
        assert!(components.contains(component_hash::<CarBody>()));
        assert_eq!(components.name_of(component_hash::<Position>()), Some("Position"));
    }
}
