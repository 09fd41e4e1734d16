// THEORY:
// The `Scene` is the read-only geometry of the installation as far as tracking is
// concerned: where every camera is mounted and which way it faces. Cameras sit on
// stands, so a camera's world pose is its stand's pose composed with its own pose
// relative to the stand.
//
// The tracking engine consumes the scene in exactly two ways:
// 1.  **Ray construction**: a `MotionEvent` reports an angle in the camera frame.
//     `segment_for` turns it into a world-space segment that starts at the camera
//     and runs a fixed nominal length along that angle.
// 2.  **Spawn suppression**: `camera_positions` lists every mounting position, so
//     that a new focal point is never spawned directly under a camera.
//
// Loading the full installation (heads, texts, behaviors) belongs to the host;
// here we only accept the subset needed for cameras.

use crate::core_modules::Vec2;
use crate::error::{Result, TrackingError};
use nalgebra::{Isometry2, Point2, Rotation2};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// A planar pose: position in meters and rotation in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub rot: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, rot: f64) -> Self {
        Self { x, y, rot }
    }

    pub fn isometry(&self) -> Isometry2<f64> {
        Isometry2::new(Vec2::new(self.x, self.y), self.rot.to_radians())
    }
}

/// Motion reported by a camera, as an angle (degrees) in the camera's own frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionEvent {
    pub camera_name: String,
    pub angle: f64,
}

impl MotionEvent {
    pub fn new(camera_name: impl Into<String>, angle: f64) -> Self {
        Self {
            camera_name: camera_name.into(),
            angle,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Camera {
    pub name: String,
    pub stand: Option<String>,
    /// Camera frame to world frame.
    pub world: Isometry2<f64>,
}

impl Camera {
    pub fn position(&self) -> Vec2 {
        self.world.translation.vector
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CameraSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub pos: Pose,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StandSpec {
    pub name: String,
    pub pos: Pose,
    #[serde(default)]
    pub camera_names: Vec<String>,
}

/// The serialized form of a scene. Cameras only exist once a stand mounts them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneDocument {
    #[serde(default)]
    pub stands: Vec<StandSpec>,
    #[serde(default)]
    pub cameras: Vec<CameraSpec>,
    #[serde(default)]
    pub camera_sensitivity: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Scene {
    cameras: BTreeMap<String, Camera>,
    camera_sensitivity: Option<f64>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let doc: SceneDocument = serde_json::from_str(json)?;
        Self::build(doc)
    }

    pub fn build(doc: SceneDocument) -> Result<Self> {
        let defined: HashMap<&str, &CameraSpec> =
            doc.cameras.iter().map(|c| (c.name.as_str(), c)).collect();

        let mut scene = Scene {
            cameras: BTreeMap::new(),
            camera_sensitivity: doc.camera_sensitivity,
        };

        for stand in &doc.stands {
            for name in &stand.camera_names {
                let spec = defined.get(name.as_str()).ok_or_else(|| {
                    TrackingError::InvalidScene(format!(
                        "stand {} mounts undefined camera {name}",
                        stand.name
                    ))
                })?;
                scene.insert_camera(name, Some(stand.name.clone()), stand.pos, spec.pos);
            }
        }

        Ok(scene)
    }

    /// Mounts a camera at `camera` relative to a stand at `stand`.
    pub fn with_camera(mut self, name: &str, stand: Pose, camera: Pose) -> Self {
        self.insert_camera(name, None, stand, camera);
        self
    }

    pub fn with_camera_sensitivity(mut self, sensitivity: f64) -> Self {
        self.camera_sensitivity = Some(sensitivity);
        self
    }

    fn insert_camera(&mut self, name: &str, stand_name: Option<String>, stand: Pose, camera: Pose) {
        self.cameras.insert(
            name.to_string(),
            Camera {
                name: name.to_string(),
                stand: stand_name,
                world: stand.isometry() * camera.isometry(),
            },
        );
    }

    pub fn camera(&self, name: &str) -> Option<&Camera> {
        self.cameras.get(name)
    }

    pub fn cameras(&self) -> impl Iterator<Item = &Camera> {
        self.cameras.values()
    }

    /// World-space mounting position of every camera.
    pub fn camera_positions(&self) -> Vec<Vec2> {
        self.cameras.values().map(Camera::position).collect()
    }

    /// Scene-level override of the nudge fraction; unset or zero means "use the default".
    pub fn camera_sensitivity(&self) -> Option<f64> {
        self.camera_sensitivity.filter(|s| *s != 0.0)
    }

    /// World-space segment from the reporting camera along the event's angle.
    pub fn segment_for(&self, event: &MotionEvent, ray_length: f64) -> Result<(Vec2, Vec2)> {
        let camera = self
            .camera(&event.camera_name)
            .ok_or_else(|| TrackingError::UnknownCamera(event.camera_name.clone()))?;
        if !event.angle.is_finite() {
            return Err(TrackingError::NonFiniteInput {
                context: "motion event angle",
            });
        }

        let local = Rotation2::new(event.angle.to_radians()) * Vec2::new(ray_length, 0.0);
        let p0 = camera.world * Point2::<f64>::origin();
        let p1 = camera.world * Point2::from(local);

        Ok((p0.coords, p1.coords))
    }
}
