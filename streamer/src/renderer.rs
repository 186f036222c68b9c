use crate::geometry::{Cartographic, ScreenPoint, Vec3, ViewRectangle, ViewportSize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerHandle(pub u64);

/// Billboard plus optional label placed for one report.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSpec {
    pub id: String,
    pub position: Cartographic,
    pub icon: String,
    pub label: String,
    pub show_label: bool,
}

/// Host scene the streamer draws into.
///
/// All calls are made while the streamer holds its renderer lock, so
/// implementations never see concurrent access.
pub trait SceneRenderer: Send + 'static {
    fn add_marker(&mut self, marker: MarkerSpec) -> MarkerHandle;
    fn remove_marker(&mut self, handle: MarkerHandle);
    fn set_marker_visibility(&mut self, handle: MarkerHandle, marker: bool, label: bool);
    /// Window coordinates of a world position, `None` when it does not project.
    fn project_to_screen(&self, position: Cartographic) -> Option<ScreenPoint>;
    /// Geographic extent of the current view, `None` when the globe is not in view.
    fn current_view_rectangle(&self) -> Option<ViewRectangle>;
    fn camera_position(&self) -> Vec3;
    fn camera_forward(&self) -> Vec3;
    fn viewport_size(&self) -> ViewportSize;
    fn request_render(&mut self) {}
}
