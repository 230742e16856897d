//! Stroke definitions: one drawn shape on a page.

use crate::geometry::{Hitbox, HitboxParams, compute_hitboxes, is_valid_coordinate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a stroke.
pub type StrokeId = String;

/// Unique identifier for a page.
pub type PageId = String;

/// Number of ellipse outline samples used for circle hitboxes.
const CIRCLE_OUTLINE_SAMPLES: usize = 32;

/// The kind of a stroke. `Eraser` only marks delete instructions on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrokeKind {
    #[default]
    Pen,
    Line,
    Rectangle,
    Circle,
    Select,
    Eraser,
}

impl StrokeKind {
    /// Whether a stroke of this kind is kept in a page.
    pub fn is_persisted(self) -> bool {
        !matches!(self, StrokeKind::Select | StrokeKind::Eraser)
    }
}

/// Visual style of a stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrokeStyle {
    /// CSS color string.
    pub color: String,
    pub width: f64,
    pub opacity: f64,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: "#000000".to_string(),
            width: 3.0,
            opacity: 1.0,
        }
    }
}

/// Offset and scale applied on top of the raw points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StrokeTransform {
    pub x: f64,
    pub y: f64,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl Default for StrokeTransform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }
}

impl StrokeTransform {
    /// Map raw flat points into page space.
    pub fn apply(&self, points: &[f64]) -> Vec<f64> {
        points
            .chunks_exact(2)
            .flat_map(|p| [self.x + p[0] * self.scale_x, self.y + p[1] * self.scale_y])
            .collect()
    }
}

/// A stroke as stored in a page and sent over the wire.
///
/// `id` and `page_id` default to empty strings when absent from incoming
/// JSON so that malformed entries can be detected and dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    #[serde(default)]
    pub id: StrokeId,
    #[serde(default)]
    pub page_id: PageId,
    /// Author, stamped by the session before sending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: StrokeKind,
    #[serde(default)]
    pub style: StrokeStyle,
    /// Flat `[x0, y0, x1, y1, ...]` coordinates.
    #[serde(default)]
    pub points: Vec<f64>,
    #[serde(flatten)]
    pub transform: StrokeTransform,
    /// Cached pixel hitbox, recomputed from `points` and never serialized.
    #[serde(skip)]
    pub hitboxes: Option<Hitbox>,
}

impl Stroke {
    /// Create a stroke with a fresh id.
    pub fn new(kind: StrokeKind, page_id: impl Into<PageId>, style: StrokeStyle, points: Vec<f64>) -> Self {
        Self {
            id: generate_stroke_id(),
            page_id: page_id.into(),
            user_id: None,
            kind,
            style,
            points,
            transform: StrokeTransform::default(),
            hitboxes: None,
        }
    }

    /// Both routing keys are present.
    pub fn has_identity(&self) -> bool {
        !self.id.is_empty() && !self.page_id.is_empty()
    }

    /// At least two complete points, no dangling coordinate, and every
    /// coordinate finite and within `MAX_COORDINATE`.
    pub fn has_geometry(&self) -> bool {
        self.points.len() >= 4
            && self.points.len() % 2 == 0
            && self.points.iter().all(|&v| is_valid_coordinate(v))
    }

    /// Whether this stroke may be committed to a page.
    pub fn is_valid(&self) -> bool {
        self.has_identity() && self.has_geometry() && self.kind.is_persisted()
    }

    /// Reference used for delete instructions and undo bookkeeping.
    pub fn reference(&self) -> StrokeRef {
        StrokeRef {
            id: self.id.clone(),
            page_id: self.page_id.clone(),
        }
    }

    /// Points in page space, with the transform applied.
    pub fn page_points(&self) -> Vec<f64> {
        self.transform.apply(&self.points)
    }

    /// Outline that is rasterized for hit-testing.
    fn outline(&self) -> Vec<f64> {
        let pts = self.page_points();
        if pts.len() < 4 {
            return pts;
        }
        let (x1, y1) = (pts[0], pts[1]);
        let (x2, y2) = (pts[pts.len() - 2], pts[pts.len() - 1]);

        match self.kind {
            StrokeKind::Pen => pts,
            StrokeKind::Line => vec![x1, y1, x2, y2],
            StrokeKind::Rectangle => vec![x1, y1, x2, y1, x2, y2, x1, y2, x1, y1],
            StrokeKind::Circle => {
                let (cx, cy) = ((x1 + x2) / 2.0, (y1 + y2) / 2.0);
                let (rx, ry) = ((x2 - x1).abs() / 2.0, (y2 - y1).abs() / 2.0);
                (0..=CIRCLE_OUTLINE_SAMPLES)
                    .flat_map(|i| {
                        let a = i as f64 / CIRCLE_OUTLINE_SAMPLES as f64 * std::f64::consts::TAU;
                        [cx + rx * a.cos(), cy + ry * a.sin()]
                    })
                    .collect()
            }
            StrokeKind::Select | StrokeKind::Eraser => Vec::new(),
        }
    }

    /// Compute and cache the pixel hitbox.
    pub fn calculate_hitboxes(&mut self, params: &HitboxParams) {
        let outline = self.outline();
        let hitbox = match self.kind {
            StrokeKind::Pen => compute_hitboxes(&outline, params),
            // Shape outlines have few vertices; every one of them counts.
            StrokeKind::Line | StrokeKind::Rectangle | StrokeKind::Circle => {
                compute_hitboxes(&outline, &HitboxParams { skip: 1, ..*params })
            }
            StrokeKind::Select | StrokeKind::Eraser => Hitbox::new(),
        };
        self.hitboxes = Some(hitbox);
    }

    /// Whether any cached hitbox pixel lies in `other`.
    pub fn intersects(&self, other: &Hitbox) -> bool {
        match &self.hitboxes {
            Some(own) if own.len() <= other.len() => own.iter().any(|px| other.contains(px)),
            Some(own) => other.iter().any(|px| own.contains(px)),
            None => false,
        }
    }
}

/// Identifies a stroke within the board.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeRef {
    pub id: StrokeId,
    pub page_id: PageId,
}

impl From<&Stroke> for StrokeRef {
    fn from(stroke: &Stroke) -> Self {
        stroke.reference()
    }
}

/// Generate a collision-resistant stroke id.
pub fn generate_stroke_id() -> StrokeId {
    Uuid::new_v4().simple().to_string()
}
