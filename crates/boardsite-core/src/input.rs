//! Pointer input: turns pointer samples into strokes and erase gestures.

use crate::config::{ClientConfig, SamplingConfig};
use crate::geometry::{Hitbox, HitboxParams, SmoothingParams, compute_hitboxes, round_points, smooth_polyline};
use crate::stroke::{PageId, Stroke, StrokeKind, StrokeStyle};
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// The device that produced a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerKind {
    Mouse,
    Touch,
    /// Stylus input, gated like touch.
    Pen,
}

/// The active drawing tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Tool {
    pub kind: StrokeKind,
    pub style: StrokeStyle,
}

/// A segment to draw immediately as live feedback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewSegment {
    pub from: Point,
    pub to: Point,
}

/// The result of a finished pointer gesture.
#[derive(Debug, Clone)]
pub enum Gesture {
    /// A new stroke to commit.
    Stroke(Stroke),
    /// Erase every stroke on the page intersecting `hitbox`.
    Erase { page_id: PageId, hitbox: Hitbox },
    /// A selection rectangle.
    Select { page_id: PageId, bounds: Rect },
}

#[derive(Debug, Clone)]
struct ActiveGesture {
    page_id: PageId,
    pointer: PointerKind,
    erasing: bool,
    origin: Point,
    last: Point,
    /// Moves since the last accepted sample.
    sample_count: usize,
    points: Vec<f64>,
}

/// Drawing input state machine. Idle until a pointer goes down.
#[derive(Debug, Clone)]
pub struct DrawInput {
    pub tool: Tool,
    sampling: SamplingConfig,
    smoothing: SmoothingParams,
    eraser_hitbox: HitboxParams,
    active: Option<ActiveGesture>,
}

impl DrawInput {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            tool: Tool::default(),
            sampling: config.sampling,
            smoothing: config.smoothing,
            eraser_hitbox: config.eraser_hitbox,
            active: None,
        }
    }

    /// Whether a gesture is in progress.
    pub fn is_drawing(&self) -> bool {
        self.active.is_some()
    }

    /// Whether the gesture in progress erases.
    pub fn is_erasing(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.erasing)
    }

    /// Start a gesture on `page_id`. The right button always erases.
    pub fn pointer_down(&mut self, page_id: impl Into<PageId>, pos: Point, pointer: PointerKind, button: MouseButton) {
        if button == MouseButton::Middle {
            return;
        }
        let erasing = button == MouseButton::Right || self.tool.kind == StrokeKind::Eraser;
        self.active = Some(ActiveGesture {
            page_id: page_id.into(),
            pointer,
            erasing,
            origin: pos,
            last: pos,
            sample_count: 1,
            points: vec![pos.x, pos.y],
        });
    }

    /// Feed a pointer move. Returns the preview segment for accepted samples.
    pub fn pointer_move(&mut self, pos: Point) -> Option<PreviewSegment> {
        let sampling = self.sampling;
        let active = self.active.as_mut()?;
        let min_samples = match active.pointer {
            PointerKind::Mouse => sampling.mouse_min_samples,
            PointerKind::Touch | PointerKind::Pen => sampling.touch_min_samples,
        };

        active.sample_count += 1;
        let moved = (pos - active.last).hypot2();
        if moved <= sampling.min_move_dist_sq && active.sample_count <= min_samples {
            return None;
        }

        let from = active.last;
        active.points.extend([pos.x, pos.y]);
        active.last = pos;
        active.sample_count = 1;
        (!active.erasing).then_some(PreviewSegment { from, to: pos })
    }

    /// Finish the gesture. Mouse input adds the release point.
    ///
    /// Returns `None` when idle or when the gesture has too few points.
    pub fn pointer_up(&mut self, pos: Option<Point>) -> Option<Gesture> {
        let mut active = self.active.take()?;
        if let (PointerKind::Mouse, Some(pos)) = (active.pointer, pos) {
            active.points.extend([pos.x, pos.y]);
            active.last = pos;
        }
        self.finish(active)
    }

    /// The pointer left the drawing surface.
    pub fn pointer_leave(&mut self, pos: Option<Point>) -> Option<Gesture> {
        self.pointer_up(pos)
    }

    /// Drop the gesture in progress.
    pub fn cancel(&mut self) {
        self.active = None;
    }

    fn finish(&self, active: ActiveGesture) -> Option<Gesture> {
        if active.points.len() < 4 {
            log::debug!("Dropping gesture with a single sample");
            return None;
        }

        let freehand = active.erasing || self.tool.kind == StrokeKind::Pen;
        let mut points = if freehand {
            smooth_polyline(&active.points, self.smoothing.tension, false, self.smoothing.segments)
        } else {
            vec![active.origin.x, active.origin.y, active.last.x, active.last.y]
        };
        round_points(&mut points);

        if active.erasing {
            return Some(Gesture::Erase {
                hitbox: compute_hitboxes(&points, &self.eraser_hitbox),
                page_id: active.page_id,
            });
        }
        match self.tool.kind {
            StrokeKind::Select => Some(Gesture::Select {
                page_id: active.page_id,
                bounds: Rect::from_points(active.origin, active.last),
            }),
            kind => Some(Gesture::Stroke(Stroke::new(
                kind,
                active.page_id,
                self.tool.style.clone(),
                points,
            ))),
        }
    }
}
