//! Simulo scripting API. Everything here is in scope for `game.rs`.
//!
//! A program declares a `Game` type:
//! ```rust
//! pub struct Game { /* state */ }
//!
//! impl Game {
//!     pub fn new() -> Self { /* ... */ }
//!
//!     /// `delta` is the time since the previous frame, in seconds.
//!     pub fn update(&mut self, delta: f32) { /* ... */ }
//!
//!     /// A tracked person appeared, moved (`Some`) or left the view (`None`).
//!     /// `id` stays stable while the person is tracked.
//!     pub fn on_pose_update(&mut self, id: u32, pose: Option<&Pose>) { /* ... */ }
//! }
//! ```
//!
//! Viewport coordinates are in pixels with the origin at the top-left.

/// Handle to an object drawn on the projection surface.
///
/// Dropping the handle leaves the object in place; `delete` removes it and
/// invalidates every copy of the handle.
#[derive(Clone, Copy)]
pub struct GameObject(u32);

#[allow(dead_code)]
impl GameObject {
    /// Spawn a 1x1 pixel object at `(x, y)`. Use `set_scale` to size it.
    pub fn new(x: f32, y: f32, material: &Material) -> Self {
        GameObject(unsafe { simulo_create_object(x, y, material.0) })
    }

    pub fn x(&self) -> f32 {
        unsafe { simulo_get_object_x(self.0) }
    }

    pub fn y(&self) -> f32 {
        unsafe { simulo_get_object_y(self.0) }
    }

    pub fn set_position(&self, x: f32, y: f32) {
        unsafe { simulo_set_object_position(self.0, x, y) }
    }

    /// Width and height in pixels.
    pub fn set_scale(&self, x: f32, y: f32) {
        unsafe { simulo_set_object_scale(self.0, x, y) }
    }

    pub fn delete(&self) {
        unsafe { simulo_delete_object(self.0) }
    }
}

/// A solid color, components in `0.0..=1.0`. Create materials once and
/// reuse them.
pub struct Material(u32);

#[allow(dead_code)]
impl Material {
    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Material(unsafe { simulo_create_material(r, g, b) })
    }
}

/// Uniform random number in `[0, 1)`.
#[allow(dead_code)]
pub fn random_float() -> f32 {
    unsafe { simulo_random() }
}

#[allow(dead_code)]
pub fn window_width() -> i32 {
    unsafe { simulo_window_width() }
}

#[allow(dead_code)]
pub fn window_height() -> i32 {
    unsafe { simulo_window_height() }
}

const KEYPOINTS: usize = 17;

type PoseData = [f32; KEYPOINTS * 2];

/// Body keypoints of one tracked person, in viewport coordinates.
#[derive(Clone)]
pub struct Pose(PoseData);

#[allow(dead_code)]
impl Pose {
    pub fn nose(&self) -> (f32, f32) { self.keypoint(0) }
    pub fn left_eye(&self) -> (f32, f32) { self.keypoint(1) }
    pub fn right_eye(&self) -> (f32, f32) { self.keypoint(2) }
    pub fn left_ear(&self) -> (f32, f32) { self.keypoint(3) }
    pub fn right_ear(&self) -> (f32, f32) { self.keypoint(4) }
    pub fn left_shoulder(&self) -> (f32, f32) { self.keypoint(5) }
    pub fn right_shoulder(&self) -> (f32, f32) { self.keypoint(6) }
    pub fn left_elbow(&self) -> (f32, f32) { self.keypoint(7) }
    pub fn right_elbow(&self) -> (f32, f32) { self.keypoint(8) }
    pub fn left_wrist(&self) -> (f32, f32) { self.keypoint(9) }
    pub fn right_wrist(&self) -> (f32, f32) { self.keypoint(10) }
    pub fn left_hip(&self) -> (f32, f32) { self.keypoint(11) }
    pub fn right_hip(&self) -> (f32, f32) { self.keypoint(12) }
    pub fn left_knee(&self) -> (f32, f32) { self.keypoint(13) }
    pub fn right_knee(&self) -> (f32, f32) { self.keypoint(14) }
    pub fn left_ankle(&self) -> (f32, f32) { self.keypoint(15) }
    pub fn right_ankle(&self) -> (f32, f32) { self.keypoint(16) }

    fn keypoint(&self, index: usize) -> (f32, f32) {
        (self.0[index * 2], self.0[index * 2 + 1])
    }
}

static mut GAME: Option<crate::game::Game> = None;
static mut POSE_BUFFER: PoseData = [0.0; KEYPOINTS * 2];

#[no_mangle]
#[allow(static_mut_refs)]
pub extern "C" fn init(_root: u32) {
    unsafe {
        GAME = Some(crate::game::Game::new());
        simulo_set_pose_buffer(POSE_BUFFER.as_mut_ptr());
    }
}

#[no_mangle]
#[allow(static_mut_refs)]
pub extern "C" fn update(delta: f32) {
    unsafe {
        if let Some(game) = GAME.as_mut() {
            game.update(delta);
        }
    }
}

#[no_mangle]
#[allow(static_mut_refs)]
pub extern "C" fn pose(id: u32, alive: bool) {
    unsafe {
        if let Some(game) = GAME.as_mut() {
            if alive {
                game.on_pose_update(id, Some(&Pose(POSE_BUFFER)));
            } else {
                game.on_pose_update(id, None);
            }
        }
    }
}

extern "C" {
    fn simulo_set_pose_buffer(data: *mut f32);
    fn simulo_create_object(x: f32, y: f32, material: u32) -> u32;
    fn simulo_set_object_position(id: u32, x: f32, y: f32);
    fn simulo_set_object_scale(id: u32, x: f32, y: f32);
    fn simulo_get_object_x(id: u32) -> f32;
    fn simulo_get_object_y(id: u32) -> f32;
    fn simulo_delete_object(id: u32);
    fn simulo_random() -> f32;
    fn simulo_window_width() -> i32;
    fn simulo_window_height() -> i32;
    fn simulo_create_material(r: f32, g: f32, b: f32) -> u32;
}
