//! Game events shared between client and server.
//!
//! The SERVER emits them from gameplay systems.
//! The CLIENT uses them for one-shot feedback (particles, sounds).
//!
//! | event                 | kind | layout                                  |
//! |-----------------------|------|-----------------------------------------|
//! | `CollisionEvent`      | 0    | 3 x f32 position, f32 impulse, surface  |
//! | `SoundCueEvent`       | 1    | 3 x f32 position, cue hash, f32 volume  |
//! | `RocketLaunchedEvent` | 2    | u32 rocket wire id, 3 x f32 origin      |

use slipstream_net::{EventDispatcher, NetEvent, ProtocolResult, SymbolEnum, WireReader, WireWriter};

use crate::math::Vec3;

/// What a car hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Surface {
    /// Another car.
    Car,
    /// Track barrier.
    Barrier,
    /// Terrain.
    Ground,
}

impl SymbolEnum for Surface {
    const ENUM_NAME: &'static str = "Surface";
    const VARIANTS: &'static [Self] = &[Self::Car, Self::Barrier, Self::Ground];

    fn symbol(self) -> &'static str {
        match self {
            Self::Car => "CAR",
            Self::Barrier => "BARRIER",
            Self::Ground => "GROUND",
        }
    }
}

/// Audio sample to play.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SoundCue {
    /// Tyre screech.
    Skid,
    /// Impact.
    Crash,
    /// Rocket ignition.
    Ignition,
}

impl SymbolEnum for SoundCue {
    const ENUM_NAME: &'static str = "SoundCue";
    const VARIANTS: &'static [Self] = &[Self::Skid, Self::Crash, Self::Ignition];

    fn symbol(self) -> &'static str {
        match self {
            Self::Skid => "SKID",
            Self::Crash => "CRASH",
            Self::Ignition => "IGNITION",
        }
    }
}

/// Two bodies touched.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollisionEvent {
    /// Contact point.
    pub position: Vec3,
    /// Impulse magnitude.
    pub impulse: f32,
    /// What was hit.
    pub surface: Surface,
}

impl NetEvent for CollisionEvent {
    const KIND: u8 = 0;
    const NAME: &'static str = "Collision";

    fn encode(&self, writer: &mut WireWriter) {
        self.position.encode(writer);
        writer.write_f32(self.impulse);
        writer.write_symbol(self.surface);
    }

    fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            position: Vec3::decode(reader)?,
            impulse: reader.read_f32()?,
            surface: reader.read_symbol()?,
        })
    }
}

/// A sound should play at a point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SoundCueEvent {
    /// Emitter position.
    pub position: Vec3,
    /// Sample.
    pub cue: SoundCue,
    /// 0.0 to 1.0.
    pub volume: f32,
}

impl NetEvent for SoundCueEvent {
    const KIND: u8 = 1;
    const NAME: &'static str = "SoundCue";

    fn encode(&self, writer: &mut WireWriter) {
        self.position.encode(writer);
        writer.write_symbol(self.cue);
        writer.write_f32(self.volume);
    }

    fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            position: Vec3::decode(reader)?,
            cue: reader.read_symbol()?,
            volume: reader.read_f32()?,
        })
    }
}

/// A rocket left the pad.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RocketLaunchedEvent {
    /// Server wire ID of the rocket entity.
    pub rocket: u32,
    /// Launch point.
    pub origin: Vec3,
}

impl NetEvent for RocketLaunchedEvent {
    const KIND: u8 = 2;
    const NAME: &'static str = "RocketLaunched";

    fn encode(&self, writer: &mut WireWriter) {
        writer.write_u32(self.rocket);
        self.origin.encode(writer);
    }

    fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            rocket: reader.read_u32()?,
            origin: Vec3::decode(reader)?,
        })
    }
}

/// Declares every game event on a client dispatcher.
pub fn register_game_events(dispatcher: &mut EventDispatcher) {
    dispatcher.register::<CollisionEvent>();
    dispatcher.register::<SoundCueEvent>();
    dispatcher.register::<RocketLaunchedEvent>();
}
