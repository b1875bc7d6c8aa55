//! Bevy-facing runtime: components and systems that drive a
//! [`ParticleContext`] from the ECS.

use bevy::prelude::*;
use std::collections::HashMap;

use crate::asset::ParticleFxAsset;
use crate::context::ParticleContext;
use crate::pool::InstanceHandle;
use crate::prototype::PrototypeHandle;

/// Component that plays a particle effect at the entity's transform.
#[derive(Component)]
pub struct ParticleEffect {
    /// Handle to the effect description asset.
    pub handle: Handle<ParticleFxAsset>,
    /// Start spawning as soon as the instance is created. Defaults to `true`.
    pub auto_start: bool,
}

impl ParticleEffect {
    pub fn new(handle: Handle<ParticleFxAsset>) -> Self {
        Self {
            handle,
            auto_start: true,
        }
    }
}

/// Links an entity to its running instance once the asset is ready.
#[derive(Component)]
pub struct EffectInstance {
    pub instance: InstanceHandle,
}

/// Resource wrapping the particle runtime for ECS-driven effects.
///
/// The wrapped [`ParticleContext`] stays fully usable directly, e.g. for
/// render constants or vertex generation from the host's render code.
#[derive(Resource)]
pub struct ParticleFxContext {
    pub context: ParticleContext,
    prototypes: HashMap<AssetId<ParticleFxAsset>, PrototypeHandle>,
    by_entity: HashMap<Entity, InstanceHandle>,
}

impl ParticleFxContext {
    pub fn new(max_instance_count: u32, max_particle_count: u32) -> Self {
        Self {
            context: ParticleContext::new(max_instance_count, max_particle_count),
            prototypes: HashMap::new(),
            by_entity: HashMap::new(),
        }
    }

    /// Instance handle owned by an entity, if its effect has been set up.
    pub fn instance_of(&self, entity: Entity) -> Option<InstanceHandle> {
        self.by_entity.get(&entity).copied()
    }
}

/// Creates instances for entities whose effect asset has finished loading.
pub(crate) fn setup_particle_effects(
    mut commands: Commands,
    assets: Res<Assets<ParticleFxAsset>>,
    mut fx: ResMut<ParticleFxContext>,
    query: Query<(Entity, &ParticleEffect), Without<EffectInstance>>,
) {
    for (entity, effect) in query.iter() {
        let Some(asset) = assets.get(&effect.handle) else {
            continue;
        };
        let ParticleFxContext {
            context,
            prototypes,
            by_entity,
        } = &mut *fx;
        let prototype = *prototypes
            .entry(effect.handle.id())
            .or_insert_with(|| context.new_prototype(asset));
        let Some(instance) = context.create_instance(prototype, None) else {
            continue;
        };
        if effect.auto_start {
            context.start_instance(instance);
        }
        by_entity.insert(entity, instance);
        commands.entity(entity).insert(EffectInstance { instance });
    }
}

/// Pushes entity transforms into the particle runtime.
pub(crate) fn sync_effect_transforms(
    mut fx: ResMut<ParticleFxContext>,
    query: Query<(&EffectInstance, &GlobalTransform)>,
) {
    for (effect, transform) in query.iter() {
        let (scale, rotation, translation) = transform.to_scale_rotation_translation();
        fx.context.set_position(effect.instance, translation);
        fx.context.set_rotation(effect.instance, rotation);
        fx.context.set_scale(effect.instance, scale.x);
    }
}

/// Ticks the particle runtime once per frame.
pub(crate) fn update_particle_context(mut fx: ResMut<ParticleFxContext>, time: Res<Time>) {
    fx.context.update(time.delta_secs(), None);
}

/// Destroys instances whose entity went away.
pub(crate) fn cleanup_particle_effects(
    mut fx: ResMut<ParticleFxContext>,
    query: Query<(), With<EffectInstance>>,
) {
    let ParticleFxContext {
        context, by_entity, ..
    } = &mut *fx;
    by_entity.retain(|entity, instance| {
        if query.contains(*entity) {
            true
        } else {
            context.destroy_instance(*instance);
            false
        }
    });
}
