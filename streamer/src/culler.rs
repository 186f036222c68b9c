use std::collections::HashSet;

use crate::geometry::{Cartographic, ScreenPoint, Vec3, ViewportSize};
use crate::renderer::{MarkerHandle, SceneRenderer};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullSettings {
    pub margin_px: f64,
    pub suppress_labels: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visibility {
    pub marker: bool,
    pub label: bool,
}

impl Visibility {
    pub const HIDDEN: Self = Self {
        marker: false,
        label: false,
    };
}

/// One rendered report as seen by a cull pass.
#[derive(Debug, Clone, Copy)]
pub struct CullTarget<'a> {
    pub id: &'a str,
    pub handle: MarkerHandle,
    pub position: Cartographic,
    pub world: Vec3,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CullStats {
    pub shown: usize,
    pub hidden: usize,
}

pub fn is_in_front(camera_position: Vec3, camera_forward: Vec3, world: Vec3) -> bool {
    (world - camera_position).dot(camera_forward) >= 0.0
}

pub fn is_on_screen(point: Option<ScreenPoint>, viewport: ViewportSize, margin_px: f64) -> bool {
    let Some(point) = point else {
        return false;
    };
    point.x.is_finite()
        && point.y.is_finite()
        && point.x >= -margin_px
        && point.x <= viewport.width + margin_px
        && point.y >= -margin_px
        && point.y <= viewport.height + margin_px
}

/// Visibility of a single marker. The text filter wins over geometry.
pub fn marker_visibility<R: SceneRenderer + ?Sized>(
    renderer: &R,
    target: &CullTarget<'_>,
    filter: Option<&HashSet<String>>,
    settings: CullSettings,
) -> Visibility {
    if filter.is_some_and(|ids| !ids.contains(target.id)) {
        return Visibility::HIDDEN;
    }
    if !is_in_front(renderer.camera_position(), renderer.camera_forward(), target.world) {
        return Visibility::HIDDEN;
    }
    let projected = renderer.project_to_screen(target.position);
    if !is_on_screen(projected, renderer.viewport_size(), settings.margin_px) {
        return Visibility::HIDDEN;
    }
    Visibility {
        marker: true,
        label: !settings.suppress_labels,
    }
}

/// Recomputes visibility of every target. Never adds or removes markers.
pub fn cull_markers<'a, R: SceneRenderer + ?Sized>(
    renderer: &mut R,
    targets: impl IntoIterator<Item = CullTarget<'a>>,
    filter: Option<&HashSet<String>>,
    settings: CullSettings,
) -> CullStats {
    let mut stats = CullStats::default();
    for target in targets {
        let visibility = marker_visibility(&*renderer, &target, filter, settings);
        renderer.set_marker_visibility(target.handle, visibility.marker, visibility.label);
        if visibility.marker {
            stats.shown += 1;
        } else {
            stats.hidden += 1;
        }
    }
    stats
}
