//! # Entity Types & Blueprint Config
//!
//! Initial component values for every entity type, loaded from TOML and
//! turned into the factories the [`EntityTypeRegistry`] runs on
//! instantiation. Server and clients load the same document, so a type hash
//! on the wire rebuilds the same shape on both ends.
//!
//! ```toml
//! [RACE_CAR]
//! position = [0.0, 0.0, 0.0]
//! rotation = [0.0, 0.0, 0.0, 1.0]
//! velocity = [0.0, 0.0, 0.0]
//! car = { model = "RALLY", color = "red", mass = 1200.0 }
//!
//! [SIMPLE_ROCKET]
//! position = [0.0, 0.0, 0.0]
//! velocity = [0.0, 0.0, 0.0]
//! rocket = { fuel = 2.0, thrust = 30.0 }
//! ```
//!
//! Components are attached in a fixed order: position, rotation, velocity,
//! car, rocket, chunk. Absent keys attach nothing.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use slipstream_core::{Component, ComponentFactory, EntityId, EntityTypeId, EntityTypeRegistry, World};
use slipstream_net::config::read;
use slipstream_net::{ConfigError, ConfigResult, ReplicationGroup};

use crate::components::{CarBody, ChunkData, Position, RocketMotor, Rotation, Velocity};
use crate::math::{Quaternion, Vec3};

/// Player-driven car.
pub const RACE_CAR: &str = "RACE_CAR";
/// Fire-and-forget rocket.
pub const SIMPLE_ROCKET: &str = "SIMPLE_ROCKET";
/// Static terrain chunk.
pub const WORLD_CHUNK: &str = "WORLD_CHUNK";

/// [`RACE_CAR`] type ID.
pub const RACE_CAR_TYPE: EntityTypeId = EntityTypeId::of(RACE_CAR);
/// [`SIMPLE_ROCKET`] type ID.
pub const SIMPLE_ROCKET_TYPE: EntityTypeId = EntityTypeId::of(SIMPLE_ROCKET);
/// [`WORLD_CHUNK`] type ID.
pub const WORLD_CHUNK_TYPE: EntityTypeId = EntityTypeId::of(WORLD_CHUNK);

/// Side length of a chunk heightfield.
pub const CHUNK_SAMPLES: usize = 4;

/// Initial component values for one entity type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EntityBlueprint {
    /// Attaches [`Position`].
    pub position: Option<Vec3>,
    /// Attaches [`Rotation`].
    pub rotation: Option<Quaternion>,
    /// Attaches [`Velocity`].
    pub velocity: Option<Vec3>,
    /// Attaches [`CarBody`].
    pub car: Option<CarBody>,
    /// Attaches [`RocketMotor`].
    pub rocket: Option<RocketMotor>,
    /// Attaches [`ChunkData`].
    pub chunk: Option<ChunkData>,
}

fn factory<C: Component + Clone>(value: C) -> ComponentFactory {
    Box::new(move |world: &mut World, id: EntityId| world.insert(id, value.clone()))
}

impl EntityBlueprint {
    /// Number of components this blueprint attaches.
    #[must_use]
    pub fn component_count(&self) -> usize {
        [
            self.position.is_some(),
            self.rotation.is_some(),
            self.velocity.is_some(),
            self.car.is_some(),
            self.rocket.is_some(),
            self.chunk.is_some(),
        ]
        .into_iter()
        .filter(|&present| present)
        .count()
    }

    /// Component factories in attach order.
    #[must_use]
    pub fn factories(&self) -> Vec<ComponentFactory> {
        let mut factories = Vec::with_capacity(self.component_count());
        if let Some(position) = self.position {
            factories.push(factory(Position(position)));
        }
        if let Some(rotation) = self.rotation {
            factories.push(factory(Rotation(rotation)));
        }
        if let Some(velocity) = self.velocity {
            factories.push(factory(Velocity(velocity)));
        }
        if let Some(car) = &self.car {
            factories.push(factory(car.clone()));
        }
        if let Some(rocket) = self.rocket {
            factories.push(factory(rocket));
        }
        if let Some(chunk) = &self.chunk {
            factories.push(factory(chunk.clone()));
        }
        factories
    }

    fn validate(&self, name: &str) -> ConfigResult<()> {
        if self.component_count() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "blueprint",
                reason: format!("{name} attaches no components"),
            });
        }
        if let Some(car) = &self.car {
            if car.mass <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: "car.mass",
                    reason: format!("{name}: {} is not positive", car.mass),
                });
            }
        }
        if let Some(rocket) = &self.rocket {
            if rocket.fuel < 0.0 || rocket.thrust < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: "rocket",
                    reason: format!("{name}: fuel and thrust must not be negative"),
                });
            }
        }
        if let Some(chunk) = &self.chunk {
            if chunk.heights.len() != CHUNK_SAMPLES * CHUNK_SAMPLES {
                return Err(ConfigError::InvalidValue {
                    field: "chunk.heights",
                    reason: format!(
                        "{name}: expected {} samples, got {}",
                        CHUNK_SAMPLES * CHUNK_SAMPLES,
                        chunk.heights.len()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Blueprints for every entity type, keyed by symbolic name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlueprintConfig {
    types: BTreeMap<String, EntityBlueprint>,
}

impl Default for BlueprintConfig {
    /// The stock racing content: one car, one rocket, one flat chunk.
    fn default() -> Self {
        let mut types = BTreeMap::new();
        types.insert(
            RACE_CAR.to_owned(),
            EntityBlueprint {
                position: Some(Vec3::ZERO),
                rotation: Some(Quaternion::IDENTITY),
                velocity: Some(Vec3::ZERO),
                car: Some(CarBody::default()),
                ..EntityBlueprint::default()
            },
        );
        types.insert(
            SIMPLE_ROCKET.to_owned(),
            EntityBlueprint {
                position: Some(Vec3::ZERO),
                velocity: Some(Vec3::ZERO),
                rocket: Some(RocketMotor {
                    fuel: 2.0,
                    thrust: 30.0,
                }),
                ..EntityBlueprint::default()
            },
        );
        types.insert(
            WORLD_CHUNK.to_owned(),
            EntityBlueprint {
                chunk: Some(ChunkData {
                    coord: [0, 0, 0],
                    heights: vec![0.0; CHUNK_SAMPLES * CHUNK_SAMPLES],
                }),
                ..EntityBlueprint::default()
            },
        );
        Self { types }
    }
}

impl BlueprintConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for syntax or schema errors and
    /// [`ConfigError::InvalidValue`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        for (name, blueprint) in &config.types {
            blueprint.validate(name)?;
        }
        Ok(config)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// As [`from_toml_str`](Self::from_toml_str), plus [`ConfigError::Io`].
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let config = Self::from_toml_str(&read(path.as_ref())?)?;
        tracing::info!(
            path = %path.as_ref().display(),
            types = config.types.len(),
            "loaded blueprints"
        );
        Ok(config)
    }

    /// The blueprint for `name`, if configured.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EntityBlueprint> {
        self.types.get(name)
    }

    /// Iterates `(name, blueprint)` in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntityBlueprint)> {
        self.types.iter().map(|(name, blueprint)| (name.as_str(), blueprint))
    }

    /// Number of configured entity types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True if no entity type is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Component factories for `name`, in attach order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBlueprint`] if `name` is not configured.
    pub fn read_entity_blueprint(&self, name: &str) -> ConfigResult<Vec<ComponentFactory>> {
        self.get(name)
            .map(EntityBlueprint::factories)
            .ok_or_else(|| ConfigError::UnknownBlueprint(name.to_owned()))
    }
}

/// Registers every configured entity type.
///
/// # Errors
///
/// Returns [`ConfigError::UnknownBlueprint`] if one of the stock types
/// ([`RACE_CAR`], [`SIMPLE_ROCKET`], [`WORLD_CHUNK`]) is missing.
///
/// # Panics
///
/// Panics if two configured names hash to the same entity type.
pub fn register_entity_types(config: &BlueprintConfig) -> ConfigResult<EntityTypeRegistry> {
    let mut registry = EntityTypeRegistry::new();
    for name in [RACE_CAR, SIMPLE_ROCKET, WORLD_CHUNK] {
        registry.register_type(name, config.read_entity_blueprint(name)?);
    }
    for (name, blueprint) in config.iter() {
        if !matches!(name, RACE_CAR | SIMPLE_ROCKET | WORLD_CHUNK) {
            registry.register_type(name, blueprint.factories());
        }
    }
    Ok(registry)
}

/// Replication groups for the racing content.
///
/// - `cars`: pose and velocity every update, body on creation
/// - `rockets`: position, velocity and motor every update
/// - `chunks`: heightfield on creation only
#[must_use]
pub fn racing_groups() -> Vec<ReplicationGroup> {
    vec![
        ReplicationGroup::new("cars")
            .replicate::<Position>()
            .replicate::<Rotation>()
            .replicate::<Velocity>()
            .create_only::<CarBody>(),
        ReplicationGroup::new("rockets")
            .replicate::<Position>()
            .replicate::<Velocity>()
            .replicate::<RocketMotor>(),
        ReplicationGroup::new("chunks").create_only::<ChunkData>(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{game_components, CarModel};

    const CUSTOM: &str = r#"
        [RACE_CAR]
        position = [0.0, 0.5, 0.0]
        rotation = [0.0, 0.0, 0.0, 1.0]
        velocity = [0.0, 0.0, 0.0]
        car = { model = "TRUCK", color = "orange", mass = 2400.0 }

        [SIMPLE_ROCKET]
        position = [0.0, 0.0, 0.0]
        velocity = [0.0, 0.0, 0.0]
        rocket = { fuel = 1.0, thrust = 12.0 }

        [WORLD_CHUNK]
        chunk = { coord = [0, 0, 0], heights = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0] }

        [CONE]
        position = [3.0, 0.0, 3.0]
    "#;

    #[test]
    fn test_stock_types_registered() {
        let registry = register_entity_types(&BlueprintConfig::default()).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.name_of(RACE_CAR_TYPE), Some(RACE_CAR));
        assert!(registry.contains(SIMPLE_ROCKET_TYPE));
        assert!(registry.contains(WORLD_CHUNK_TYPE));
    }

    #[test]
    fn test_toml_values_reach_instantiated_entity() {
        let config = BlueprintConfig::from_toml_str(CUSTOM).unwrap();
        let registry = register_entity_types(&config).unwrap();
        assert_eq!(registry.len(), 4);

        let mut world = World::new();
        let car = registry.instantiate(&mut world, RACE_CAR_TYPE);
        assert_eq!(world.get::<Position>(car).0, Vec3::new(0.0, 0.5, 0.0));
        assert_eq!(world.get::<CarBody>(car).model, CarModel::Truck);
        assert_eq!(world.get::<CarBody>(car).color, "orange");
        assert!(!world.has::<RocketMotor>(car));

        let cone = registry.instantiate_named(&mut world, "CONE");
        assert!(world.has::<Position>(cone));
        assert!(!world.has::<Velocity>(cone));
    }

    #[test]
    fn test_unknown_blueprint() {
        let config = BlueprintConfig::default();
        assert_eq!(config.read_entity_blueprint(RACE_CAR).unwrap().len(), 4);
        assert!(matches!(
            config.read_entity_blueprint("HOVERCRAFT"),
            Err(ConfigError::UnknownBlueprint(name)) if name == "HOVERCRAFT"
        ));
    }

    #[test]
    fn test_missing_stock_type_is_an_error() {
        let config = BlueprintConfig::from_toml_str("[CONE]\nposition = [0.0, 0.0, 0.0]").unwrap();
        assert!(matches!(
            register_entity_types(&config),
            Err(ConfigError::UnknownBlueprint(_))
        ));
    }

    #[test]
    fn test_invalid_blueprints_rejected() {
        assert!(matches!(
            BlueprintConfig::from_toml_str("[RACE_CAR]\ncar = { mass = 0.0 }"),
            Err(ConfigError::InvalidValue { field: "car.mass", .. })
        ));
        assert!(matches!(
            BlueprintConfig::from_toml_str("[EMPTY]"),
            Err(ConfigError::InvalidValue { field: "blueprint", .. })
        ));
        assert!(matches!(
            BlueprintConfig::from_toml_str("[RACE_CAR]\nwings = 2"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_groups_select_by_shape() {
        let registry = register_entity_types(&BlueprintConfig::default()).unwrap();
        let components = game_components();
        let mut world = World::new();
        let car = registry.instantiate(&mut world, RACE_CAR_TYPE);
        let rocket = registry.instantiate(&mut world, SIMPLE_ROCKET_TYPE);
        let chunk = registry.instantiate(&mut world, WORLD_CHUNK_TYPE);

        let groups = racing_groups();
        assert_eq!(groups[0].matching(&world, &components), vec![car]);
        assert_eq!(groups[1].matching(&world, &components), vec![rocket]);
        assert_eq!(groups[2].matching(&world, &components), vec![chunk]);
        assert!(groups[2].update_components().is_empty());
    }
}
