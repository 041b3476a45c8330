//! View transform for pan/zoom.

use kurbo::{Affine, Point, Rect, Size, Vec2};

/// Default zoom multiplier for one wheel tick.
pub const ZOOM_STEP: f64 = 1.1;

/// Affine world-to-screen transform made of a scale and a translation.
///
/// Panning and zooming happen in screen space, so the point under the cursor
/// stays fixed while zooming. The inverse maps screen points back to world
/// space for hit-testing and for zoom-independent drag deltas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    matrix: Affine,
    /// Host-imposed zoom bounds. `None` means unclamped.
    limits: Option<(f64, f64)>,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            matrix: Affine::IDENTITY,
            limits: None,
        }
    }
}

impl ViewTransform {
    /// Create an identity transform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transform that scales world space by `scale` and then
    /// translates it by `offset` (in screen units).
    pub fn from_parts(offset: Vec2, scale: f64) -> Self {
        Self {
            matrix: Affine::translate(offset) * Affine::scale(scale),
            limits: None,
        }
    }

    /// Clamp future zooms to `[min, max]`.
    pub fn with_limits(mut self, min: f64, max: f64) -> Self {
        self.limits = Some((min.min(max), max.max(min)));
        self
    }

    /// Set or remove the zoom bounds.
    pub fn set_limits(&mut self, limits: Option<(f64, f64)>) {
        self.limits = limits.map(|(min, max)| (min.min(max), max.max(min)));
    }

    pub fn limits(&self) -> Option<(f64, f64)> {
        self.limits
    }

    /// The world-to-screen matrix.
    pub fn matrix(&self) -> Affine {
        self.matrix
    }

    /// The screen-to-world matrix.
    pub fn inverse(&self) -> Affine {
        self.matrix.inverse()
    }

    /// A copy of this transform mapping screen to world.
    pub fn inverted(&self) -> Self {
        Self {
            matrix: self.inverse(),
            limits: None,
        }
    }

    /// Horizontal scale factor (the zoom level).
    pub fn scale(&self) -> f64 {
        self.matrix.as_coeffs()[0]
    }

    /// Translation component in screen units.
    pub fn offset(&self) -> Vec2 {
        let coeffs = self.matrix.as_coeffs();
        Vec2::new(coeffs[4], coeffs[5])
    }

    /// Convert a screen point to world coordinates.
    pub fn screen_to_world(&self, screen_point: Point) -> Point {
        self.inverse() * screen_point
    }

    /// Convert a world point to screen coordinates.
    pub fn world_to_screen(&self, world_point: Point) -> Point {
        self.matrix * world_point
    }

    /// Map a screen rectangle to the world rectangle it covers.
    pub fn screen_rect_to_world(&self, rect: Rect) -> Rect {
        self.inverse().transform_rect_bbox(rect)
    }

    /// Apply `other` after this transform.
    pub fn compose(&mut self, other: Affine) {
        self.matrix = other * self.matrix;
    }

    /// Pan by a delta in screen coordinates.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.compose(Affine::translate((dx, dy)));
    }

    /// A copy panned by `delta` screen units.
    pub fn translated(&self, delta: Vec2) -> Self {
        let mut moved = *self;
        moved.translate(delta.x, delta.y);
        moved
    }

    /// Scale about a screen point: translate(-p), scale(s), translate(p).
    ///
    /// Ignores the zoom limits; see [`zoom_at`](Self::zoom_at).
    pub fn scale_about_point(&mut self, sx: f64, sy: f64, px: f64, py: f64) {
        let pivot = Vec2::new(px, py);
        let scale = Affine::scale_non_uniform(sx, sy);
        self.compose(Affine::translate(pivot) * scale * Affine::translate(-pivot));
    }

    /// Zoom by `factor`, keeping `screen_point` fixed and honoring the limits.
    ///
    /// Returns `false` if the zoom level did not change.
    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) -> bool {
        let current = self.scale();
        let mut target = current * factor;
        if let Some((min, max)) = self.limits {
            target = target.clamp(min, max);
        }
        if current.abs() < f64::EPSILON {
            return false;
        }
        let effective = target / current;
        if (effective - 1.0).abs() < 1e-12 {
            return false;
        }
        self.scale_about_point(effective, effective, screen_point.x, screen_point.y);
        true
    }

    /// Zoom in by one step of `step` around `screen_point`.
    pub fn zoom_in(&mut self, screen_point: Point, step: f64) -> bool {
        self.zoom_at(screen_point, step)
    }

    /// Zoom out by one step of `step` around `screen_point`.
    pub fn zoom_out(&mut self, screen_point: Point, step: f64) -> bool {
        self.zoom_at(screen_point, 1.0 / step)
    }

    /// Reset to identity, keeping the limits.
    pub fn reset(&mut self) {
        self.matrix = Affine::IDENTITY;
    }

    /// Fit the transform to show `bounds` centered in `viewport`.
    pub fn fit_to_bounds(&mut self, bounds: Rect, viewport: Size, padding: f64) {
        if bounds.is_zero_area() {
            self.reset();
            return;
        }

        let padded_viewport = Size::new(
            (viewport.width - padding * 2.0).max(1.0),
            (viewport.height - padding * 2.0).max(1.0),
        );

        let scale_x = padded_viewport.width / bounds.width();
        let scale_y = padded_viewport.height / bounds.height();
        let mut zoom = scale_x.min(scale_y);
        if let Some((min, max)) = self.limits {
            zoom = zoom.clamp(min, max);
        }

        // Center the bounds in the viewport
        let bounds_center = bounds.center();
        let viewport_center = Point::new(viewport.width / 2.0, viewport.height / 2.0);
        let offset = Vec2::new(
            viewport_center.x - bounds_center.x * zoom,
            viewport_center.y - bounds_center.y * zoom,
        );
        self.matrix = Affine::translate(offset) * Affine::scale(zoom);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_point_eq(actual: Point, expected: Point) {
        let distance = (actual - expected).hypot();
        assert!(distance < 1e-9, "{actual:?} != {expected:?}");
    }

    #[test]
    fn test_identity() {
        let view = ViewTransform::new();
        let screen = Point::new(100.0, 200.0);
        assert_point_eq(view.screen_to_world(screen), screen);
        assert!((view.scale() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_screen_to_world_with_offset() {
        let view = ViewTransform::from_parts(Vec2::new(50.0, 100.0), 1.0);
        let world = view.screen_to_world(Point::new(100.0, 200.0));
        assert_point_eq(world, Point::new(50.0, 100.0));
    }

    #[test]
    fn test_screen_to_world_with_zoom() {
        let view = ViewTransform::from_parts(Vec2::ZERO, 2.0);
        let world = view.screen_to_world(Point::new(100.0, 200.0));
        assert_point_eq(world, Point::new(50.0, 100.0));
    }

    #[test]
    fn test_roundtrip_conversion() {
        let view = ViewTransform::from_parts(Vec2::new(30.0, -20.0), 1.5);
        let original = Point::new(123.0, 456.0);
        let back = view.world_to_screen(view.screen_to_world(original));
        assert_point_eq(back, original);
    }

    #[test]
    fn test_translate_accumulates() {
        let mut view = ViewTransform::new();
        view.translate(10.0, 20.0);
        view.translate(5.0, 0.0);
        assert_eq!(view.offset(), Vec2::new(15.0, 20.0));
    }

    #[test]
    fn test_scale_about_point_keeps_pivot_fixed() {
        let mut view = ViewTransform::from_parts(Vec2::new(40.0, 10.0), 1.2);
        let pivot = Point::new(200.0, 150.0);
        let world_under_pivot = view.screen_to_world(pivot);

        view.scale_about_point(1.1, 1.1, pivot.x, pivot.y);

        assert!((view.scale() - 1.32).abs() < 1e-9);
        assert_point_eq(view.world_to_screen(world_under_pivot), pivot);
    }

    #[test]
    fn test_zoom_in_then_out_restores() {
        let mut view = ViewTransform::from_parts(Vec2::new(7.0, 3.0), 1.0);
        let before = view;
        let cursor = Point::new(64.0, 48.0);
        assert!(view.zoom_in(cursor, ZOOM_STEP));
        assert!(view.zoom_out(cursor, ZOOM_STEP));

        assert!((view.scale() - before.scale()).abs() < 1e-9);
        assert!((view.offset() - before.offset()).hypot() < 1e-9);
    }

    #[test]
    fn test_zoom_is_unclamped_by_default() {
        let mut view = ViewTransform::new();
        for _ in 0..100 {
            view.zoom_in(Point::ZERO, 2.0);
        }
        assert!(view.scale() > 1e20);
    }

    #[test]
    fn test_zoom_clamp() {
        let mut view = ViewTransform::new().with_limits(0.1, 10.0);
        view.zoom_at(Point::ZERO, 0.001);
        assert!((view.scale() - 0.1).abs() < 1e-9);

        view.zoom_at(Point::ZERO, 1000.0);
        assert!((view.scale() - 10.0).abs() < 1e-9);
        assert!(!view.zoom_at(Point::ZERO, 2.0));
    }

    #[test]
    fn test_screen_rect_to_world() {
        let view = ViewTransform::from_parts(Vec2::new(10.0, 10.0), 2.0);
        let world = view.screen_rect_to_world(Rect::new(10.0, 10.0, 50.0, 30.0));
        assert_eq!(world, Rect::new(0.0, 0.0, 20.0, 10.0));
    }

    #[test]
    fn test_fit_to_bounds_centers() {
        let mut view = ViewTransform::new();
        let bounds = Rect::new(0.0, 0.0, 100.0, 50.0);
        view.fit_to_bounds(bounds, Size::new(400.0, 400.0), 0.0);

        assert!((view.scale() - 4.0).abs() < 1e-9);
        let center = view.world_to_screen(bounds.center());
        assert_point_eq(center, Point::new(200.0, 200.0));
    }
}
