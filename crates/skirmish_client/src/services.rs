//! Black-box subsystem interfaces consumed by the trap dispatcher.
//!
//! Rendering, audio, collision, screen, and file access are external
//! collaborators; the dispatcher treats them as already correct and only
//! marshals arguments in and results out. The no-op defaults keep a core
//! usable headless and under test.

use std::collections::BTreeMap;

use skirmish_module_abi::views::{
    FontView, MarkFragmentView, MarkFragmentsRequest, SceneDefView, SceneEntityView,
    TraceResultView,
};
use skirmish_module_abi::ModuleRole;

use crate::snapshot::StoredSnapshot;
use skirmish_module_abi::views::EntityStateView;

pub trait RenderService {
    fn load_world(&mut self, name: &str);
    fn register_model(&mut self, name: &str) -> i32;
    fn register_skin(&mut self, name: &str) -> i32;
    /// `mip` distinguishes world shaders from UI pics.
    fn register_shader(&mut self, name: &str, mip: bool) -> i32;
    fn register_font(&mut self, name: &str, point_size: i32) -> FontView;
    fn clear_scene(&mut self);
    /// `extended` selects the appended scene-add variant.
    fn add_entity(&mut self, entity: &SceneEntityView, extended: bool);
    fn add_polys(&mut self, shader: i32, verts: &[[f32; 3]], poly_count: i32);
    fn light_for_point(&self, point: [f32; 3]) -> Option<([f32; 3], [f32; 3], [f32; 3])>;
    fn add_light(&mut self, origin: [f32; 3], intensity: f32, rgb: [f32; 3], additive: bool);
    fn add_linear_light(&mut self, start: [f32; 3], end: [f32; 3], intensity: f32, rgb: [f32; 3]);
    fn render_scene(&mut self, def: &SceneDefView);
    fn set_color(&mut self, rgba: Option<[f32; 4]>);
    #[allow(clippy::too_many_arguments)]
    fn draw_stretch_pic(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        s1: f32,
        t1: f32,
        s2: f32,
        t2: f32,
        shader: i32,
    );
    fn model_bounds(&self, model: i32) -> ([f32; 3], [f32; 3]);
    fn lerp_tag(
        &self,
        model: i32,
        start_frame: i32,
        end_frame: i32,
        frac: f32,
        tag_name: &str,
    ) -> Option<([f32; 3], [[f32; 3]; 3])>;
    fn remap_shader(&mut self, old_shader: &str, new_shader: &str, time_offset: &str);
    fn next_entity_token(&mut self) -> Option<String>;
    fn in_pvs(&self, a: [f32; 3], b: [f32; 3]) -> bool;
    fn mark_fragments(&self, request: &MarkFragmentsRequest) -> Vec<MarkFragmentView>;
}

pub trait SoundService {
    fn start(&mut self, origin: Option<[f32; 3]>, entity: i32, channel: i32, sfx: i32);
    fn start_local(&mut self, sfx: i32, channel: i32);
    fn clear_loops(&mut self, kill_all: bool);
    /// `real` loops keep playing through portals.
    fn add_loop(&mut self, entity: i32, origin: [f32; 3], velocity: [f32; 3], sfx: i32, real: bool);
    fn stop_loop(&mut self, entity: i32);
    fn update_entity(&mut self, entity: i32, origin: [f32; 3]);
    fn respatialize(&mut self, entity: i32, origin: [f32; 3], axis: [[f32; 3]; 3], in_water: bool);
    fn register(&mut self, name: &str, compressed: bool) -> i32;
    fn start_background(&mut self, intro: &str, looped: &str);
    fn stop_background(&mut self);
}

pub trait CollisionService {
    fn load_map(&mut self, name: &str);
    fn inline_model_count(&self) -> i32;
    fn inline_model(&self, index: i32) -> i32;
    /// `capsule` threads the shape discriminator through the shared
    /// implementation.
    fn temp_model(&mut self, mins: [f32; 3], maxs: [f32; 3], capsule: bool) -> i32;
    fn point_contents(&self, point: [f32; 3], model: i32) -> i32;
    fn transformed_point_contents(
        &self,
        point: [f32; 3],
        model: i32,
        origin: [f32; 3],
        angles: [f32; 3],
    ) -> i32;
    #[allow(clippy::too_many_arguments)]
    fn trace(
        &self,
        start: [f32; 3],
        end: [f32; 3],
        mins: [f32; 3],
        maxs: [f32; 3],
        model: i32,
        contents_mask: i32,
        capsule: bool,
    ) -> TraceResultView;
    #[allow(clippy::too_many_arguments)]
    fn transformed_trace(
        &self,
        start: [f32; 3],
        end: [f32; 3],
        mins: [f32; 3],
        maxs: [f32; 3],
        model: i32,
        contents_mask: i32,
        origin: [f32; 3],
        angles: [f32; 3],
        capsule: bool,
    ) -> TraceResultView;
}

/// Repaint hook for lengthy loads. Implementations must only repaint;
/// pumping the outer event loop here could tear down the module that is
/// still on the call stack.
pub trait ScreenService {
    fn update_screen(&mut self);
}

/// Open modes for [`VfsService::open`].
pub const FS_MODE_READ: i32 = 0;
pub const FS_MODE_WRITE: i32 = 1;
pub const FS_MODE_APPEND: i32 = 2;

/// Virtual file access. Handles are owned by the opening module's role and
/// bulk-closed when that module shuts down.
pub trait VfsService {
    /// Returns `(handle, length)`; a zero handle with length -1 means the
    /// open failed.
    fn open(&mut self, owner: ModuleRole, path: &str, mode: i32) -> (i32, i32);
    fn read(&mut self, handle: i32, len: usize) -> Vec<u8>;
    fn write(&mut self, handle: i32, bytes: &[u8]) -> i32;
    fn seek(&mut self, handle: i32, offset: i32, origin: i32) -> i32;
    fn close(&mut self, handle: i32);
    fn close_all(&mut self, owner: ModuleRole);
}

/// Demo playback message source.
pub enum DemoMessage {
    Snapshot {
        snapshot: StoredSnapshot,
        entities: Vec<EntityStateView>,
    },
    End,
}

pub trait DemoFeed {
    fn read_message(&mut self) -> DemoMessage;
}

pub struct HostServices {
    pub render: Box<dyn RenderService>,
    pub sound: Box<dyn SoundService>,
    pub collision: Box<dyn CollisionService>,
    pub screen: Box<dyn ScreenService>,
    pub vfs: Box<dyn VfsService>,
    pub demo_feed: Option<Box<dyn DemoFeed>>,
}

impl Default for HostServices {
    fn default() -> Self {
        Self {
            render: Box::new(NullRender),
            sound: Box::new(NullSound),
            collision: Box::new(NullCollision),
            screen: Box::new(NullScreen),
            vfs: Box::new(MemoryVfs::new()),
            demo_feed: None,
        }
    }
}

pub struct NullRender;

impl RenderService for NullRender {
    fn load_world(&mut self, _name: &str) {}
    fn register_model(&mut self, _name: &str) -> i32 {
        0
    }
    fn register_skin(&mut self, _name: &str) -> i32 {
        0
    }
    fn register_shader(&mut self, _name: &str, _mip: bool) -> i32 {
        0
    }
    fn register_font(&mut self, name: &str, _point_size: i32) -> FontView {
        FontView {
            name: name.to_string(),
            ..FontView::default()
        }
    }
    fn clear_scene(&mut self) {}
    fn add_entity(&mut self, _entity: &SceneEntityView, _extended: bool) {}
    fn add_polys(&mut self, _shader: i32, _verts: &[[f32; 3]], _poly_count: i32) {}
    fn light_for_point(&self, _point: [f32; 3]) -> Option<([f32; 3], [f32; 3], [f32; 3])> {
        None
    }
    fn add_light(&mut self, _origin: [f32; 3], _intensity: f32, _rgb: [f32; 3], _additive: bool) {}
    fn add_linear_light(
        &mut self,
        _start: [f32; 3],
        _end: [f32; 3],
        _intensity: f32,
        _rgb: [f32; 3],
    ) {
    }
    fn render_scene(&mut self, _def: &SceneDefView) {}
    fn set_color(&mut self, _rgba: Option<[f32; 4]>) {}
    fn draw_stretch_pic(
        &mut self,
        _x: f32,
        _y: f32,
        _w: f32,
        _h: f32,
        _s1: f32,
        _t1: f32,
        _s2: f32,
        _t2: f32,
        _shader: i32,
    ) {
    }
    fn model_bounds(&self, _model: i32) -> ([f32; 3], [f32; 3]) {
        ([0.0; 3], [0.0; 3])
    }
    fn lerp_tag(
        &self,
        _model: i32,
        _start_frame: i32,
        _end_frame: i32,
        _frac: f32,
        _tag_name: &str,
    ) -> Option<([f32; 3], [[f32; 3]; 3])> {
        None
    }
    fn remap_shader(&mut self, _old_shader: &str, _new_shader: &str, _time_offset: &str) {}
    fn next_entity_token(&mut self) -> Option<String> {
        None
    }
    fn in_pvs(&self, _a: [f32; 3], _b: [f32; 3]) -> bool {
        false
    }
    fn mark_fragments(&self, _request: &MarkFragmentsRequest) -> Vec<MarkFragmentView> {
        Vec::new()
    }
}

pub struct NullSound;

impl SoundService for NullSound {
    fn start(&mut self, _origin: Option<[f32; 3]>, _entity: i32, _channel: i32, _sfx: i32) {}
    fn start_local(&mut self, _sfx: i32, _channel: i32) {}
    fn clear_loops(&mut self, _kill_all: bool) {}
    fn add_loop(
        &mut self,
        _entity: i32,
        _origin: [f32; 3],
        _velocity: [f32; 3],
        _sfx: i32,
        _real: bool,
    ) {
    }
    fn stop_loop(&mut self, _entity: i32) {}
    fn update_entity(&mut self, _entity: i32, _origin: [f32; 3]) {}
    fn respatialize(
        &mut self,
        _entity: i32,
        _origin: [f32; 3],
        _axis: [[f32; 3]; 3],
        _in_water: bool,
    ) {
    }
    fn register(&mut self, _name: &str, _compressed: bool) -> i32 {
        0
    }
    fn start_background(&mut self, _intro: &str, _looped: &str) {}
    fn stop_background(&mut self) {}
}

pub struct NullCollision;

impl CollisionService for NullCollision {
    fn load_map(&mut self, _name: &str) {}
    fn inline_model_count(&self) -> i32 {
        0
    }
    fn inline_model(&self, _index: i32) -> i32 {
        0
    }
    fn temp_model(&mut self, _mins: [f32; 3], _maxs: [f32; 3], _capsule: bool) -> i32 {
        0
    }
    fn point_contents(&self, _point: [f32; 3], _model: i32) -> i32 {
        0
    }
    fn transformed_point_contents(
        &self,
        _point: [f32; 3],
        _model: i32,
        _origin: [f32; 3],
        _angles: [f32; 3],
    ) -> i32 {
        0
    }
    fn trace(
        &self,
        _start: [f32; 3],
        end: [f32; 3],
        _mins: [f32; 3],
        _maxs: [f32; 3],
        _model: i32,
        _contents_mask: i32,
        _capsule: bool,
    ) -> TraceResultView {
        TraceResultView {
            fraction: 1.0,
            end_pos: end,
            ..TraceResultView::default()
        }
    }
    fn transformed_trace(
        &self,
        _start: [f32; 3],
        end: [f32; 3],
        _mins: [f32; 3],
        _maxs: [f32; 3],
        _model: i32,
        _contents_mask: i32,
        _origin: [f32; 3],
        _angles: [f32; 3],
        _capsule: bool,
    ) -> TraceResultView {
        TraceResultView {
            fraction: 1.0,
            end_pos: end,
            ..TraceResultView::default()
        }
    }
}

pub struct NullScreen;

impl ScreenService for NullScreen {
    fn update_screen(&mut self) {}
}

struct MemoryFile {
    owner: ModuleRole,
    path: String,
    data: Vec<u8>,
    cursor: usize,
    writable: bool,
}

/// In-memory virtual filesystem, the default backing for the file traps.
pub struct MemoryVfs {
    files: BTreeMap<String, Vec<u8>>,
    open: BTreeMap<i32, MemoryFile>,
    next_handle: i32,
}

impl Default for MemoryVfs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryVfs {
    pub fn new() -> Self {
        Self {
            files: BTreeMap::new(),
            open: BTreeMap::new(),
            next_handle: 1,
        }
    }

    pub fn insert(&mut self, path: impl Into<String>, data: Vec<u8>) {
        self.files.insert(path.into(), data);
    }

    pub fn contents(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }
}

impl VfsService for MemoryVfs {
    fn open(&mut self, owner: ModuleRole, path: &str, mode: i32) -> (i32, i32) {
        let (data, writable) = match mode {
            FS_MODE_READ => match self.files.get(path) {
                Some(data) => (data.clone(), false),
                None => return (0, -1),
            },
            FS_MODE_WRITE => (Vec::new(), true),
            FS_MODE_APPEND => (self.files.get(path).cloned().unwrap_or_default(), true),
            _ => return (0, -1),
        };
        let handle = self.next_handle;
        self.next_handle += 1;
        let len = data.len() as i32;
        let cursor = if mode == FS_MODE_APPEND { data.len() } else { 0 };
        self.open.insert(
            handle,
            MemoryFile {
                owner,
                path: path.to_string(),
                data,
                cursor,
                writable,
            },
        );
        (handle, len)
    }

    fn read(&mut self, handle: i32, len: usize) -> Vec<u8> {
        let Some(file) = self.open.get_mut(&handle) else {
            return Vec::new();
        };
        let end = (file.cursor + len).min(file.data.len());
        let out = file.data[file.cursor..end].to_vec();
        file.cursor = end;
        out
    }

    fn write(&mut self, handle: i32, bytes: &[u8]) -> i32 {
        let Some(file) = self.open.get_mut(&handle) else {
            return 0;
        };
        if !file.writable {
            return 0;
        }
        file.data.truncate(file.cursor);
        file.data.extend_from_slice(bytes);
        file.cursor = file.data.len();
        bytes.len() as i32
    }

    fn seek(&mut self, handle: i32, offset: i32, origin: i32) -> i32 {
        let Some(file) = self.open.get_mut(&handle) else {
            return -1;
        };
        let base = match origin {
            0 => 0i64,
            1 => file.cursor as i64,
            2 => file.data.len() as i64,
            _ => return -1,
        };
        let target = (base + offset as i64).clamp(0, file.data.len() as i64);
        file.cursor = target as usize;
        0
    }

    fn close(&mut self, handle: i32) {
        if let Some(file) = self.open.remove(&handle) {
            if file.writable {
                self.files.insert(file.path, file.data);
            }
        }
    }

    fn close_all(&mut self, owner: ModuleRole) {
        let handles: Vec<i32> = self
            .open
            .iter()
            .filter(|(_, file)| file.owner == owner)
            .map(|(&handle, _)| handle)
            .collect();
        for handle in handles {
            self.close(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_vfs_round_trips_files() {
        let mut vfs = MemoryVfs::new();
        let (handle, _) = vfs.open(ModuleRole::GameClient, "scores.txt", FS_MODE_WRITE);
        assert!(handle > 0);
        vfs.write(handle, b"12:7");
        vfs.close(handle);

        let (handle, len) = vfs.open(ModuleRole::GameClient, "scores.txt", FS_MODE_READ);
        assert_eq!(len, 4);
        assert_eq!(vfs.read(handle, 16), b"12:7");
        vfs.close(handle);
    }

    #[test]
    fn close_all_releases_only_the_owner_handles() {
        let mut vfs = MemoryVfs::new();
        let (client, _) = vfs.open(ModuleRole::GameClient, "a.txt", FS_MODE_WRITE);
        let (ui, _) = vfs.open(ModuleRole::Ui, "b.txt", FS_MODE_WRITE);
        vfs.write(client, b"client");
        vfs.write(ui, b"ui");

        vfs.close_all(ModuleRole::GameClient);
        assert_eq!(vfs.contents("a.txt"), Some(&b"client"[..]));
        assert_eq!(vfs.contents("b.txt"), None);
        assert_eq!(vfs.write(ui, b"!"), 1);
    }

    #[test]
    fn missing_files_fail_to_open_for_reading() {
        let mut vfs = MemoryVfs::new();
        assert_eq!(vfs.open(ModuleRole::Ui, "absent", FS_MODE_READ), (0, -1));
    }
}
