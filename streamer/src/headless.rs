//! Renderer without a display: a pinhole camera over the WGS84 globe that
//! records markers in memory. Used by the probe binary and tests.

use std::collections::HashMap;

use crate::geometry::{Cartographic, ScreenPoint, Vec3, ViewRectangle, ViewportSize};
use crate::renderer::{MarkerHandle, MarkerSpec, SceneRenderer};

const METERS_PER_DEGREE: f64 = 111_320.0;

#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessMarker {
    pub spec: MarkerSpec,
    pub marker_visible: bool,
    pub label_visible: bool,
}

#[derive(Debug)]
pub struct HeadlessRenderer {
    markers: HashMap<MarkerHandle, HeadlessMarker>,
    next_handle: u64,
    view: Option<ViewRectangle>,
    position: Vec3,
    forward: Vec3,
    up: Vec3,
    fov_y: f64,
    viewport: ViewportSize,
    render_requests: usize,
}

impl HeadlessRenderer {
    pub fn new(width: f64, height: f64) -> Self {
        let mut renderer = Self {
            markers: HashMap::new(),
            next_handle: 1,
            view: None,
            position: Vec3::default(),
            forward: Vec3::new(-1.0, 0.0, 0.0),
            up: Vec3::new(0.0, 0.0, 1.0),
            fov_y: 60f64.to_radians(),
            viewport: ViewportSize { width, height },
            render_requests: 0,
        };
        renderer.look_at(0.0, 0.0, 20_000_000.0);
        renderer
    }

    /// Points the camera straight down from `altitude` meters above
    /// (`lon`, `lat`) and derives the matching view rectangle.
    pub fn look_at(&mut self, lon: f64, lat: f64, altitude: f64) {
        let target = Cartographic::new(lon, lat, 0.0);
        let (east, north) = target.east_north();
        let up_normal = east.cross(north).normalized();

        self.position = Cartographic::new(lon, lat, altitude).to_world();
        self.forward = -up_normal;
        self.up = north;

        let half_height_m = altitude * (self.fov_y / 2.0).tan();
        let half_width_m = half_height_m * self.aspect();
        let half_lat = half_height_m / METERS_PER_DEGREE;
        let half_lon = half_width_m / (METERS_PER_DEGREE * lat.to_radians().cos().max(1e-6));
        self.view = Some(ViewRectangle::new(
            wrap_lon(lon - half_lon.min(180.0)),
            (lat - half_lat).max(-90.0),
            wrap_lon(lon + half_lon.min(180.0)),
            (lat + half_lat).min(90.0),
        ));
    }

    /// Overrides the view rectangle reported to the streamer.
    pub fn set_view_rectangle(&mut self, view: Option<ViewRectangle>) {
        self.view = view;
    }

    pub fn set_camera(&mut self, position: Vec3, forward: Vec3, up: Vec3) {
        self.position = position;
        self.forward = forward.normalized();
        self.up = up.normalized();
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.viewport = ViewportSize { width, height };
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn visible_marker_count(&self) -> usize {
        self.markers.values().filter(|m| m.marker_visible).count()
    }

    pub fn marker(&self, id: &str) -> Option<&HeadlessMarker> {
        self.markers.values().find(|m| m.spec.id == id)
    }

    pub fn markers(&self) -> impl Iterator<Item = &HeadlessMarker> {
        self.markers.values()
    }

    pub fn render_requests(&self) -> usize {
        self.render_requests
    }

    fn aspect(&self) -> f64 {
        if self.viewport.height > 0.0 {
            self.viewport.width / self.viewport.height
        } else {
            1.0
        }
    }
}

impl SceneRenderer for HeadlessRenderer {
    fn add_marker(&mut self, marker: MarkerSpec) -> MarkerHandle {
        let handle = MarkerHandle(self.next_handle);
        self.next_handle += 1;
        let label_visible = marker.show_label;
        self.markers.insert(
            handle,
            HeadlessMarker {
                spec: marker,
                marker_visible: true,
                label_visible,
            },
        );
        handle
    }

    fn remove_marker(&mut self, handle: MarkerHandle) {
        self.markers.remove(&handle);
    }

    fn set_marker_visibility(&mut self, handle: MarkerHandle, marker: bool, label: bool) {
        if let Some(entry) = self.markers.get_mut(&handle) {
            entry.marker_visible = marker;
            entry.label_visible = label;
        }
    }

    fn project_to_screen(&self, position: Cartographic) -> Option<ScreenPoint> {
        let offset = position.to_world() - self.position;
        let depth = offset.dot(self.forward);
        if depth <= 0.0 {
            return None;
        }
        let right = self.forward.cross(self.up).normalized();
        let up = right.cross(self.forward);
        let focal = (self.viewport.height / 2.0) / (self.fov_y / 2.0).tan();

        Some(ScreenPoint {
            x: self.viewport.width / 2.0 + focal * offset.dot(right) / depth,
            y: self.viewport.height / 2.0 - focal * offset.dot(up) / depth,
        })
    }

    fn current_view_rectangle(&self) -> Option<ViewRectangle> {
        self.view
    }

    fn camera_position(&self) -> Vec3 {
        self.position
    }

    fn camera_forward(&self) -> Vec3 {
        self.forward
    }

    fn viewport_size(&self) -> ViewportSize {
        self.viewport
    }

    fn request_render(&mut self) {
        self.render_requests += 1;
    }
}

fn wrap_lon(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else if lon < -180.0 {
        lon + 360.0
    } else {
        lon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_below_camera_projects_to_center() {
        let mut renderer = HeadlessRenderer::new(1280.0, 720.0);
        renderer.look_at(139.8, 35.6, 50_000.0);

        let p = renderer
            .project_to_screen(Cartographic::new(139.8, 35.6, 0.0))
            .unwrap();
        assert!((p.x - 640.0).abs() < 1.0, "x = {}", p.x);
        assert!((p.y - 360.0).abs() < 1.0, "y = {}", p.y);
    }

    #[test]
    fn east_is_right_and_north_is_up() {
        let mut renderer = HeadlessRenderer::new(1280.0, 720.0);
        renderer.look_at(139.8, 35.6, 50_000.0);

        let east = renderer
            .project_to_screen(Cartographic::new(139.9, 35.6, 0.0))
            .unwrap();
        let north = renderer
            .project_to_screen(Cartographic::new(139.8, 35.7, 0.0))
            .unwrap();
        assert!(east.x > 640.0);
        assert!(north.y < 360.0);
    }

    #[test]
    fn look_at_derives_view_rectangle() {
        let mut renderer = HeadlessRenderer::new(1000.0, 1000.0);
        renderer.look_at(0.0, 0.0, 100_000.0);
        let view = renderer.current_view_rectangle().unwrap();
        assert!(view.west < 0.0 && view.east > 0.0);
        assert!(view.south < 0.0 && view.north > 0.0);
        assert!((view.east - view.west - (view.north - view.south)).abs() < 1e-9);
    }

    #[test]
    fn markers_are_recorded_and_removed() {
        let mut renderer = HeadlessRenderer::new(800.0, 600.0);
        let handle = renderer.add_marker(MarkerSpec {
            id: "r1".into(),
            position: Cartographic::new(0.0, 0.0, 500.0),
            icon: "data/icon/flags/megaphone.png".into(),
            label: "flood".into(),
            show_label: false,
        });
        assert_eq!(renderer.marker_count(), 1);
        assert!(!renderer.marker("r1").unwrap().label_visible);

        renderer.set_marker_visibility(handle, false, false);
        assert_eq!(renderer.visible_marker_count(), 0);

        renderer.remove_marker(handle);
        assert_eq!(renderer.marker_count(), 0);
    }
}
