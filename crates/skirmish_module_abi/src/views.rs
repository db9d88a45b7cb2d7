//! Marshalled record types copied across the module memory boundary.
//!
//! Nothing in here is shared by reference: the host serializes a view into
//! the module's arena, or deserializes one the module staged there. Vector
//! triples travel as packed little-endian floats instead; these records are
//! for everything with structure.

use serde::{Deserialize, Serialize};

/// Number of bytes in a snapshot's area-visibility mask.
pub const AREA_MASK_BYTES: usize = 32;

/// Player state carried by every snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStateView {
    pub client_num: i32,
    pub origin: [f32; 3],
    pub velocity: [f32; 3],
    pub view_angles: [f32; 3],
    pub ground_entity: i32,
    pub health: i32,
    pub weapon: i32,
}

/// One entity as carried in a snapshot's entity window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityStateView {
    pub number: i32,
    pub entity_type: i32,
    pub origin: [f32; 3],
    pub angles: [f32; 3],
    pub model: i32,
    pub event: i32,
}

/// A retrievable snapshot as handed to a module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotView {
    pub flags: i32,
    pub server_time: i64,
    pub ping: i32,
    /// Sequence of the last reliable command known when this snapshot was
    /// built.
    pub server_command_sequence: i32,
    pub area_mask: Vec<u8>,
    pub player_state: PlayerStateView,
    pub entities: Vec<EntityStateView>,
}

/// One locally generated input command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCmdView {
    pub server_time: i32,
    pub angles: [i32; 3],
    pub buttons: i32,
    pub forward_move: i32,
    pub right_move: i32,
    pub up_move: i32,
    pub weapon: i32,
}

/// Module-side mirror of a registered cvar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CvarView {
    /// Host-assigned handle; 0 means the registration was refused.
    pub handle: i32,
    pub modification_count: i32,
    pub value: f32,
    pub integer: i32,
    pub string: String,
}

/// Renderer configuration, fixed for the lifetime of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlConfigView {
    pub renderer: String,
    pub vendor: String,
    pub width: i32,
    pub height: i32,
    pub window_aspect: f32,
    pub stereo_enabled: bool,
}

/// One occupied configuration-string slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigStringEntry {
    pub index: u32,
    pub value: String,
}

/// The configuration-string table as handed to a module: occupied slots
/// only, in ascending index order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameStateView {
    pub strings: Vec<ConfigStringEntry>,
}

/// Result of a box or capsule trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceResultView {
    pub all_solid: bool,
    pub start_solid: bool,
    pub fraction: f32,
    pub end_pos: [f32; 3],
    pub plane_normal: [f32; 3],
    pub surface_flags: i32,
    pub contents: i32,
    pub entity_num: i32,
}

/// An entity staged by the module for scene submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneEntityView {
    pub model: i32,
    pub origin: [f32; 3],
    pub rotation: [f32; 3],
    pub skin: i32,
    pub shader_rgba: [u8; 4],
    pub frame: i32,
}

/// Scene parameters for a render pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDefView {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub fov_x: f32,
    pub fov_y: f32,
    pub view_origin: [f32; 3],
    pub view_axis: [[f32; 3]; 3],
    pub time: i32,
    pub flags: i32,
}

/// Font registration result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FontView {
    pub name: String,
    pub glyph_scale: f32,
    pub glyph_count: i32,
}

/// Decal projection request for [`crate::HostOp::MarkFragments`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkFragmentsRequest {
    pub points: Vec<[f32; 3]>,
    pub projection: [f32; 3],
    pub max_points: i32,
    pub max_fragments: i32,
}

/// One projected decal fragment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkFragmentView {
    pub first_point: i32,
    pub num_points: i32,
    pub points: Vec<[f32; 3]>,
}

/// Wall-clock reading for [`crate::HostOp::RealTime`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealTimeView {
    pub unix_seconds: i64,
}
