pub use crate::asset::{
    BlendMode, EmissionSpace, EmitterData, EmitterKey, EmitterProperty, EmitterShape,
    ModifierData, ModifierKey, ModifierKind, ModifierProperty, ParticleFxAsset, ParticleKey,
    ParticleProperty, ParticleOrientation, PlayMode, SizeMode, SplinePoint,
};
pub use crate::{
    AnimPlayback, AnimationData, CindersPlugin, EffectInstance, EmitterRenderData,
    EmitterState, EmitterStateChangedFn, FetchAnimationResult, GenerateVertexDataResult,
    InstanceHandle, InstanceStats, MaterialRef, ParticleContext, ParticleEffect,
    ParticleFxContext, ParticleVertexLayout, PrototypeHandle, SortKey, Stats, TextureRef,
    TileSourceRef, vertex_buffer_size,
};
