//! Flip-book animation data fetched from the host, and the cursor that maps
//! particle age to a tile index.

use std::sync::Arc;

use crate::asset::SizeMode;
use crate::render_data::{TextureRef, TileSourceRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnimPlayback {
    #[default]
    None,
    OnceForward,
    OnceBackward,
    OncePingPong,
    LoopForward,
    LoopBackward,
    LoopPingPong,
}

/// Animation metadata filled in by the host's fetch callback.
///
/// The per-tile arrays are shared slices so a host-side cache can hand them
/// out without copying; the core only reads them during the same frame's
/// vertex generation. `tex_coords` holds one UV quad (4 corner pairs) per
/// tile, `tex_dims` one width/height pair per tile.
///
/// `struct_size` must be set to [`AnimationData::STRUCT_SIZE`] by the
/// callback (use [`AnimationData::new`]); the core checks it to catch hosts
/// compiled against a different layout.
#[derive(Debug, Clone, Default)]
pub struct AnimationData {
    pub texture: Option<TextureRef>,
    pub tex_coords: Arc<[[f32; 8]]>,
    pub tex_dims: Arc<[[f32; 2]]>,
    pub playback: AnimPlayback,
    pub tile_width: u32,
    pub tile_height: u32,
    pub start_tile: u32,
    pub end_tile: u32,
    pub fps: u32,
    pub hflip: bool,
    pub vflip: bool,
    pub struct_size: u32,
}

impl AnimationData {
    pub const STRUCT_SIZE: u32 = std::mem::size_of::<Self>() as u32;

    pub fn new() -> Self {
        Self {
            struct_size: Self::STRUCT_SIZE,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchAnimationResult {
    Ok,
    NotFound,
    Error,
}

/// Host callback resolving `(tile_source, animation_id_hash)` into
/// [`AnimationData`].
pub type FetchAnimationFn<'a> =
    dyn FnMut(TileSourceRef, u64, &mut AnimationData) -> FetchAnimationResult + 'a;

/// Per-emitter state change callback; receives the instance's number of
/// awake emitters, the emitter id hash and the new state.
pub type EmitterStateChangedFn =
    Box<dyn FnMut(u32, u64, crate::instance::EmitterState) + Send + Sync>;

/// Precomputed per-emitter animation selection state for one frame.
pub(crate) struct AnimCursor {
    pub start_tile: u32,
    /// Number of distinct tiles in the strip.
    pub interval: u32,
    /// Cursor period; doubled (minus the two endpoints) for ping-pong.
    pub tile_count: u32,
    pub playing: bool,
    pub auto_size: bool,
    once: bool,
    backward: bool,
    inv_anim_length: f32,
}

impl AnimCursor {
    pub fn new(anim: &AnimationData, size_mode: SizeMode) -> Self {
        let interval = anim.end_tile.saturating_sub(anim.start_tile);
        let mut tile_count = interval;
        let playing = anim.playback != AnimPlayback::None && tile_count > 1;
        let auto_size = size_mode == SizeMode::Auto && !anim.tex_dims.is_empty() && playing;
        let once = matches!(
            anim.playback,
            AnimPlayback::OnceForward | AnimPlayback::OnceBackward | AnimPlayback::OncePingPong
        );
        let backward = matches!(
            anim.playback,
            AnimPlayback::OnceBackward | AnimPlayback::LoopBackward
        );
        let ping_pong = matches!(
            anim.playback,
            AnimPlayback::OncePingPong | AnimPlayback::LoopPingPong
        );
        if ping_pong {
            tile_count = 1.max(tile_count * 2 - 2);
        }
        let inv_anim_length = anim.fps as f32 / tile_count as f32;
        Self {
            start_tile: anim.start_tile,
            interval,
            tile_count,
            playing,
            auto_size,
            once,
            backward,
            inv_anim_length,
        }
    }

    /// Tile index relative to `start_tile` for a particle of the given age.
    ///
    /// `half_dt` offsets the cursor so tiles are sampled at the frame
    /// center. "Once" playback stretches the strip over the particle's
    /// lifetime; loop modes advance at the animation's FPS.
    pub fn tile(&self, max_life_time: f32, time_left: f32, oo_max_life_time: f32, half_dt: f32) -> u32 {
        let anim_cursor = max_life_time - time_left - half_dt;
        let anim_t = if self.once {
            anim_cursor * oo_max_life_time
        } else {
            anim_cursor * self.inv_anim_length
        };
        let mut tile = (self.tile_count as f32 * anim_t) as u32;
        tile %= self.tile_count;
        if tile >= self.interval {
            tile = (self.interval - 1) * 2 - tile;
        }
        if self.backward {
            tile = self.tile_count - tile - 1;
        }
        tile
    }
}
